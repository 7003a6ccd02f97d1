//! Best-effort "availability changed" signals for live calendar viewers.
//!
//! Events carry only the affected user id; subscribers re-fetch. Delivery is
//! at-most-once with no retry and no ordering guarantee.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityChanged {
    pub user_id: Uuid,
}

/// Receives a signal after a committed change to a user's availability.
pub trait ChangeNotifier {
    fn availability_changed(&self, event: AvailabilityChanged);
}

/// Fans events out over a `tokio` broadcast channel.
///
/// Sending never blocks. With no subscribers the event is dropped; a lagging
/// subscriber loses the oldest events.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<AvailabilityChanged>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AvailabilityChanged> {
        self.tx.subscribe()
    }
}

impl ChangeNotifier for BroadcastNotifier {
    fn availability_changed(&self, event: AvailabilityChanged) {
        if self.tx.send(event).is_err() {
            debug!(user_id = %event.user_id, "no subscribers, change notification dropped");
        }
    }
}

/// Logs each change and delivers nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl ChangeNotifier for TracingNotifier {
    fn availability_changed(&self, event: AvailabilityChanged) {
        info!(user_id = %event.user_id, "availability-updated");
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl ChangeNotifier for NoopNotifier {
    fn availability_changed(&self, _event: AvailabilityChanged) {}
}

impl<N: ChangeNotifier + ?Sized> ChangeNotifier for &N {
    fn availability_changed(&self, event: AvailabilityChanged) {
        (**self).availability_changed(event);
    }
}
