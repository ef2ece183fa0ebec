//! The plugin operation chain (SPEC_FULL.md §4.2).
//!
//! Mirrors the teacher's `Tool` trait / `Arc<dyn Tool>` registry shape, but
//! plugins hold per-session mutable counters (RandomWait's probabilities,
//! Retry's attempt count) so the chain owns `Box<dyn Plugin>` instead of
//! sharing instances across sessions.

mod log;
mod page_limit;
mod random_wait;
mod retry;

pub use log::LogPlugin;
pub use page_limit::PageLimitPlugin;
pub use random_wait::RandomWaitPlugin;
pub use retry::RetryPlugin;

use crate::collaborators::PluginSpec;
use crate::driver::{BrowserHandle, Page};
use crate::errors::CoreError;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginKind {
    Log,
    PageLimit,
    RandomWait,
    Retry,
}

/// Everything a hook needs: the driver handle (for page-count/closure
/// lookups) and the active page the operation targets.
pub struct OperationContext {
    pub handle: Arc<dyn BrowserHandle>,
    pub page: Arc<dyn Page>,
    pub operation: &'static str,
    pub tenant_id: u64,
    pub profile_id: u64,
}

/// The capability set every plugin implements. No inheritance hierarchy —
/// a plugin that has nothing to do at a hook point just returns immediately.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;
    fn kind(&self) -> PluginKind;

    async fn before_exec(&mut self, _ctx: &OperationContext) -> Result<(), CoreError> {
        Ok(())
    }
    async fn on_exec(&mut self, _ctx: &OperationContext) {}
    async fn on_success(&mut self, _ctx: &OperationContext) {}
    /// Returning `true` tells the chain to retry the operation instead of
    /// surfacing `err`. Only the Retry plugin ever returns `true`.
    async fn on_error(&mut self, _ctx: &OperationContext, _err: &CoreError) -> bool {
        false
    }
    async fn after_exec(&mut self, _ctx: &OperationContext) {}
}

/// Materializes enabled `PluginSpec`s into live plugin instances, in the
/// originating implementation's fixed order (Log, PageLimit, RandomWait,
/// Retry — Retry outermost so it re-runs through waits and limits).
pub fn materialize(
    specs: &[PluginSpec],
    notifier: Arc<dyn crate::collaborators::NotificationDispatcher>,
) -> Vec<Box<dyn Plugin>> {
    let mut plugins: Vec<Box<dyn Plugin>> = Vec::new();
    for spec in specs {
        if !spec.enabled() {
            continue;
        }
        match spec {
            PluginSpec::Log { name, level, .. } => {
                plugins.push(Box::new(LogPlugin::new(name.clone(), *level)));
            }
            PluginSpec::PageLimit { name, max_pages, .. } => {
                plugins.push(Box::new(PageLimitPlugin::new(name.clone(), *max_pages)));
            }
            PluginSpec::RandomWait {
                name,
                min_wait_ms,
                mid_wait_ms,
                max_wait_ms,
                long_interval,
                mid_interval,
                base_long_prob,
                base_mid_prob,
                growth,
                ..
            } => {
                plugins.push(Box::new(RandomWaitPlugin::new(
                    name.clone(),
                    *min_wait_ms,
                    *mid_wait_ms,
                    *max_wait_ms,
                    *long_interval,
                    *mid_interval,
                    *base_long_prob,
                    *base_mid_prob,
                    *growth,
                )));
            }
            PluginSpec::Retry {
                name,
                attempts,
                delay_ms,
                notify_on_error,
                ..
            } => {
                plugins.push(Box::new(RetryPlugin::new(
                    name.clone(),
                    *attempts,
                    *delay_ms,
                    *notify_on_error,
                    notifier.clone(),
                )));
            }
        }
    }
    plugins
}

/// Orders materialized plugins so Retry is innermost in the `Vec` (and thus
/// outermost in execution, since the chain always runs declared order for
/// `before/on_exec/on_success/on_error` and reverse order for `after_exec`
/// — Retry additionally owns the retry loop itself, see `PluginChain::run`).
pub struct PluginChain {
    plugins: Vec<Box<dyn Plugin>>,
}

impl PluginChain {
    pub fn new(
        specs: &[PluginSpec],
        notifier: Arc<dyn crate::collaborators::NotificationDispatcher>,
    ) -> Self {
        Self {
            plugins: materialize(specs, notifier),
        }
    }

    pub fn kinds(&self) -> Vec<PluginKind> {
        self.plugins.iter().map(|p| p.kind()).collect()
    }

    /// Runs `op` through the full before/exec/success/error/after hook
    /// sequence described in SPEC_FULL.md §4.2, looping when a Retry plugin
    /// signals a retry.
    pub async fn run<F, Fut, T>(&mut self, ctx: OperationContext, mut op: F) -> Result<T, CoreError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, CoreError>>,
    {
        loop {
            for plugin in self.plugins.iter_mut() {
                plugin.before_exec(&ctx).await?;
            }
            for plugin in self.plugins.iter_mut() {
                plugin.on_exec(&ctx).await;
            }

            let result = op().await;

            let retry = match &result {
                Ok(_) => {
                    for plugin in self.plugins.iter_mut() {
                        plugin.on_success(&ctx).await;
                    }
                    false
                }
                Err(err) => {
                    let mut should_retry = false;
                    for plugin in self.plugins.iter_mut() {
                        if plugin.on_error(&ctx, err).await {
                            should_retry = true;
                        }
                    }
                    should_retry
                }
            };

            for plugin in self.plugins.iter_mut().rev() {
                plugin.after_exec(&ctx).await;
            }

            if !retry {
                return result;
            }
        }
    }
}
