use std::sync::Arc;

use tokio::sync::Notify;

/// Wakes the background sync loop early.
///
/// Requests coalesce: several calls before the loop wakes cause one cycle.
#[derive(Debug, Clone, Default)]
pub struct SyncTrigger {
    notify: Arc<Notify>,
}

impl SyncTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Never blocks.
    pub fn request(&self) {
        self.notify.notify_one();
    }

    pub async fn notified(&self) {
        self.notify.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn request_before_wait_is_not_lost() {
        let trigger = SyncTrigger::new();
        trigger.request();
        trigger.request();
        tokio::time::timeout(Duration::from_millis(100), trigger.notified())
            .await
            .expect("stored permit wakes the waiter");
    }
}
