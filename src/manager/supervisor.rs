//! Rebuilds a lost transport on the parent side.
//!
//! The relay transport retries its own socket; the supervisor sits one level
//! above and replaces the whole transport once it has given up.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::manager::{Link, ManagerError, ManagerEvent, ManagerInner};
use crate::platform::{AlertKind, AlertPayload};
use crate::transport::{ConnectionStatus, RetryState};

/// A running supervisor task.
pub(super) struct Supervision {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Supervision {
    /// Wait for the task to observe its cancellation.
    pub(super) async fn join(self) {
        let _ = self.task.await;
    }
}

/// Start supervising `link`, replacing any previous supervisor.
///
/// Ignored if the transport of `generation` has been replaced meanwhile.
pub(super) fn start(inner: &Arc<ManagerInner>, link: Link, generation: u64) {
    let mut slot = inner.supervisor.lock();
    if !inner.is_current(generation) {
        return;
    }
    let cancel = CancellationToken::new();
    let task = tokio::spawn(run(inner.clone(), link, cancel.clone()));
    if let Some(previous) = slot.replace(Supervision { cancel, task }) {
        previous.cancel.cancel();
    }
}

/// Cancel the running supervisor, if any, and stop new ones from starting.
pub(super) fn cancel(inner: &ManagerInner) -> Option<Supervision> {
    let mut slot = inner.supervisor.lock();
    inner.invalidate();
    let supervision = slot.take()?;
    supervision.cancel.cancel();
    Some(supervision)
}

async fn run(inner: Arc<ManagerInner>, link: Link, cancel: CancellationToken) {
    let mut retry = RetryState::new(inner.config.supervisor_policy);
    info!(room_id = %link.session.room_id, "transport lost, rebuilding");

    while let Some((attempt, delay)) = retry.next_attempt() {
        inner.set_status(ConnectionStatus::Connecting);
        inner.emit(ManagerEvent::Reconnecting { attempt, delay });
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }

        let Some(_guard) = inner.try_begin() else {
            debug!("connection attempt already in flight, supervisor stands down");
            return;
        };
        let mut status = inner.subscribe_status();
        match inner.establish(link.clone(), Some(&cancel)).await {
            Ok(()) => {}
            Err(ManagerError::Cancelled) => return,
            Err(e) => {
                warn!(attempt, error = %e, "rebuild failed");
                continue;
            }
        }

        // A relay transport may still be working through its own schedule.
        let settled = tokio::select! {
            _ = cancel.cancelled() => return,
            settled = status.wait_for(|s| {
                matches!(s, ConnectionStatus::Connected | ConnectionStatus::Failed)
            }) => settled.map(|s| *s),
        };
        match settled {
            Ok(ConnectionStatus::Connected) => {
                info!(attempt, "transport rebuilt");
                return;
            }
            Ok(_) => warn!(attempt, "rebuilt transport failed"),
            Err(_) => return,
        }
    }

    if cancel.is_cancelled() {
        return;
    }
    warn!(room_id = %link.session.room_id, "giving up on the listener");
    inner.set_status(ConnectionStatus::Failed);
    let payload = AlertPayload {
        room_id: link.session.room_id.clone(),
        level: None,
        message: "Lost connection to the baby monitor".into(),
    };
    inner
        .alerts
        .send_alert(AlertKind::ConnectionLost, payload)
        .await;
}
