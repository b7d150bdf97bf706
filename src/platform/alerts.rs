//! Alert delivery.

use async_trait::async_trait;
use tracing::info;

/// What an alert is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    /// The listener heard noise above the threshold.
    Noise,
    /// The parent gave up reconnecting to the listener.
    ConnectionLost,
    /// The peer ended the session.
    SessionEnded,
}

/// Alert content.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertPayload {
    /// Session the alert belongs to.
    pub room_id: String,
    /// Noise level, for noise alerts.
    pub level: Option<f64>,
    /// Human-readable text.
    pub message: String,
}

/// Platform notification delivery.
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Deliver one alert. Delivery failures are the sink's concern.
    async fn send_alert(&self, kind: AlertKind, payload: AlertPayload);
}

/// Sink that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAlerts;

#[async_trait]
impl AlertSink for LogAlerts {
    async fn send_alert(&self, kind: AlertKind, payload: AlertPayload) {
        info!(
            ?kind,
            room_id = %payload.room_id,
            level = ?payload.level,
            "{}",
            payload.message
        );
    }
}
