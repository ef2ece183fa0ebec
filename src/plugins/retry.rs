use super::{OperationContext, Plugin, PluginKind};
use crate::collaborators::NotificationDispatcher;
use crate::errors::CoreError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Grounded on `retry_plugin.py`: retries the wrapped operation up to
/// `attempts` additional times with a fixed backoff delay, optionally
/// notifying on each failure. The counter resets on success so a later
/// operation gets the full budget again.
pub struct RetryPlugin {
    name: String,
    attempts: u32,
    delay: Duration,
    notify_on_error: bool,
    notifier: Arc<dyn NotificationDispatcher>,
    remaining: u32,
}

impl RetryPlugin {
    pub fn new(
        name: String,
        attempts: u32,
        delay_ms: u64,
        notify_on_error: bool,
        notifier: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        Self {
            name,
            attempts,
            delay: Duration::from_millis(delay_ms),
            notify_on_error,
            notifier,
            remaining: attempts,
        }
    }
}

#[async_trait]
impl Plugin for RetryPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> PluginKind {
        PluginKind::Retry
    }

    async fn on_success(&mut self, _ctx: &OperationContext) {
        self.remaining = self.attempts;
    }

    async fn on_error(&mut self, ctx: &OperationContext, err: &CoreError) -> bool {
        if !err.is_retryable() || self.remaining == 0 {
            self.remaining = self.attempts;
            return false;
        }
        self.remaining -= 1;
        if self.notify_on_error {
            self.notifier
                .push(
                    ctx.tenant_id,
                    Some(ctx.profile_id),
                    "operation retry",
                    &format!("{} failed, retrying: {err}", ctx.operation),
                )
                .await;
        }
        tokio::time::sleep(self.delay).await;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::InMemoryNotificationDispatcher;
    use crate::driver::{BrowserDriver, FingerprintDescriptor, MockBrowserDriver, Viewport};
    use crate::errors::DriverError;

    fn descriptor() -> FingerprintDescriptor {
        FingerprintDescriptor {
            platform: "linux".into(),
            browser_family: "chromium".into(),
            viewport: Viewport { width: 1280, height: 720 },
            locale: "en-US".into(),
            timezone: "UTC".into(),
            proxy: None,
            opaque: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn exhausts_after_configured_attempts() {
        let notifier = Arc::new(InMemoryNotificationDispatcher::new());
        let mut plugin = RetryPlugin::new("retry".into(), 2, 0, true, notifier.clone());
        let driver = MockBrowserDriver;
        let handle = driver.open(&descriptor(), true).await.unwrap();
        let page = handle.active_page().await.unwrap();
        let ctx = OperationContext {
            handle,
            page,
            operation: "click",
            tenant_id: 1,
            profile_id: 1,
        };
        let err = CoreError::DriverOperationFailed(DriverError::Transient("boom".into()));

        assert!(plugin.on_error(&ctx, &err).await);
        assert!(plugin.on_error(&ctx, &err).await);
        assert!(!plugin.on_error(&ctx, &err).await);
        assert_eq!(notifier.sent_count(), 2);
    }

    #[tokio::test]
    async fn success_resets_remaining_attempts() {
        let notifier = Arc::new(InMemoryNotificationDispatcher::new());
        let mut plugin = RetryPlugin::new("retry".into(), 1, 0, false, notifier);
        let driver = MockBrowserDriver;
        let handle = driver.open(&descriptor(), true).await.unwrap();
        let page = handle.active_page().await.unwrap();
        let ctx = OperationContext {
            handle,
            page,
            operation: "click",
            tenant_id: 1,
            profile_id: 1,
        };
        let err = CoreError::DriverOperationFailed(DriverError::Transient("boom".into()));
        assert!(plugin.on_error(&ctx, &err).await);
        plugin.on_success(&ctx).await;
        assert!(plugin.on_error(&ctx, &err).await);
    }
}
