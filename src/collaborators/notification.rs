//! Outbound push-notification collaborator. Best-effort: failures are logged
//! and never propagate back into the plugin chain or dispatcher.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn push(&self, tenant_id: u64, profile_id: Option<u64>, title: &str, body: &str);
}

#[async_trait]
impl<T: NotificationDispatcher + ?Sized> NotificationDispatcher for Arc<T> {
    async fn push(&self, tenant_id: u64, profile_id: Option<u64>, title: &str, body: &str) {
        (**self).push(tenant_id, profile_id, title, body).await;
    }
}

/// Reference implementation: records every push in order, for tests to
/// assert against, and logs through `tracing` like a real dispatcher would.
pub struct InMemoryNotificationDispatcher {
    sent: Mutex<Vec<(u64, Option<u64>, String, String)>>,
    count: AtomicUsize,
}

impl Default for InMemoryNotificationDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryNotificationDispatcher {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            count: AtomicUsize::new(0),
        }
    }

    pub fn sent_count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    pub async fn sent(&self) -> Vec<(u64, Option<u64>, String, String)> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl NotificationDispatcher for InMemoryNotificationDispatcher {
    async fn push(&self, tenant_id: u64, profile_id: Option<u64>, title: &str, body: &str) {
        tracing::info!(tenant_id, ?profile_id, title, "notification dispatched");
        self.sent
            .lock()
            .await
            .push((tenant_id, profile_id, title.to_string(), body.to_string()));
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_pushes_in_order() {
        let dispatcher = InMemoryNotificationDispatcher::new();
        dispatcher.push(1, Some(2), "retry", "attempt 1 failed").await;
        dispatcher.push(1, Some(2), "retry", "attempt 2 failed").await;
        assert_eq!(dispatcher.sent_count(), 2);
        let sent = dispatcher.sent().await;
        assert_eq!(sent[0].3, "attempt 1 failed");
        assert_eq!(sent[1].3, "attempt 2 failed");
    }
}
