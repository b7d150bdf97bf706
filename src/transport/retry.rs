//! Reconnection backoff.
//!
//! Two schedules are used: exponential for the relay socket and linear for
//! the parent-side supervisor that rebuilds whole transports.

use std::time::Duration;

use crate::core::{
    RELAY_BACKOFF_MULTIPLIER, RELAY_INITIAL_BACKOFF, RELAY_MAX_BACKOFF, RELAY_MAX_RECONNECTS,
    SUPERVISOR_DELAY_STEP, SUPERVISOR_MAX_ATTEMPTS,
};

/// Delay growth between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// `initial × multiplier^(attempt-1)`, capped at `max`.
    Exponential {
        /// First delay.
        initial: Duration,
        /// Growth factor.
        multiplier: u32,
        /// Cap.
        max: Duration,
    },
    /// `step × attempt`.
    Linear {
        /// Delay unit.
        step: Duration,
    },
}

/// A bounded retry schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay growth.
    pub backoff: Backoff,
    /// Attempts before giving up.
    pub max_attempts: u32,
}

impl RetryPolicy {
    /// Relay socket schedule: 1s, 2s, 4s, 8s, 16s.
    pub fn relay() -> Self {
        Self {
            backoff: Backoff::Exponential {
                initial: RELAY_INITIAL_BACKOFF,
                multiplier: RELAY_BACKOFF_MULTIPLIER,
                max: RELAY_MAX_BACKOFF,
            },
            max_attempts: RELAY_MAX_RECONNECTS,
        }
    }

    /// Supervisor schedule: 2s, 4s, 6s, 8s, 10s.
    pub fn supervisor() -> Self {
        Self {
            backoff: Backoff::Linear {
                step: SUPERVISOR_DELAY_STEP,
            },
            max_attempts: SUPERVISOR_MAX_ATTEMPTS,
        }
    }

    /// A schedule that never retries.
    pub fn never() -> Self {
        Self {
            backoff: Backoff::Linear {
                step: Duration::ZERO,
            },
            max_attempts: 0,
        }
    }

    /// Delay before 1-based `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        match self.backoff {
            Backoff::Exponential {
                initial,
                multiplier,
                max,
            } => {
                let factor = multiplier.saturating_pow(attempt - 1);
                initial.saturating_mul(factor).min(max)
            }
            Backoff::Linear { step } => step.saturating_mul(attempt),
        }
    }
}

/// Attempt counter over a [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryState {
    policy: RetryPolicy,
    attempts: u32,
}

impl RetryState {
    /// Start counting from zero.
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
        }
    }

    /// Consume one attempt.
    ///
    /// Returns the 1-based attempt number and its delay, or `None` once the
    /// schedule is exhausted.
    pub fn next_attempt(&mut self) -> Option<(u32, Duration)> {
        if self.is_exhausted() {
            return None;
        }
        self.attempts += 1;
        Some((self.attempts, self.policy.delay_for(self.attempts)))
    }

    /// Reset after a successful open.
    pub fn on_success(&mut self) {
        self.attempts = 0;
    }

    /// Attempts consumed since the last success.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// No attempts left.
    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.policy.max_attempts
    }
}
