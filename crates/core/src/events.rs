//! Typed notifications published by the redemption and sync engines.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::redemption::{ErrorReason, RedemptionStatus};
use crate::sync::ResourceKind;

const DEFAULT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CheckinEvent {
    /// A scan was decided locally and recorded for upload.
    RedemptionRecorded {
        secret: String,
        list_id: i64,
        status: RedemptionStatus,
        nonce: String,
    },
    /// A scan was rejected locally.
    RedemptionRejected {
        secret: String,
        list_id: i64,
        reason: ErrorReason,
    },
    /// A catalog page was merged.
    CatalogPageMerged {
        resource: ResourceKind,
        records: usize,
    },
    PushCompleted {
        uploaded: usize,
        remaining: i64,
    },
    PullCompleted {
        records: usize,
    },
    SyncFailed {
        message: String,
    },
}

/// Consumer side of the event bus.
pub trait CheckinEventSink: Send + Sync {
    fn emit(&self, event: CheckinEvent);
}

/// Drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpEventSink;

impl CheckinEventSink for NoOpEventSink {
    fn emit(&self, _event: CheckinEvent) {}
}

/// Fans events out to any number of subscribers.
///
/// Emitting never blocks; slow subscribers observe `RecvError::Lagged`.
#[derive(Debug, Clone)]
pub struct BroadcastEventSink {
    sender: broadcast::Sender<CheckinEvent>,
}

impl BroadcastEventSink {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CheckinEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl CheckinEventSink for BroadcastEventSink {
    fn emit(&self, event: CheckinEvent) {
        // No subscribers is not an error.
        let _ = self.sender.send(event);
    }
}
