use super::{OperationContext, Plugin, PluginKind};
use crate::errors::CoreError;
use async_trait::async_trait;

/// Closes the oldest open page before an operation if the context is at
/// capacity. Grounded on `page_limit_plugin.py`: closure errors are logged
/// but never fail the outer operation.
pub struct PageLimitPlugin {
    name: String,
    max_pages: u32,
}

impl PageLimitPlugin {
    pub fn new(name: String, max_pages: u32) -> Self {
        Self { name, max_pages }
    }
}

#[async_trait]
impl Plugin for PageLimitPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> PluginKind {
        PluginKind::PageLimit
    }

    async fn before_exec(&mut self, ctx: &OperationContext) -> Result<(), CoreError> {
        let pages = ctx.handle.pages().await;
        if pages.len() as u32 >= self.max_pages {
            if let Some(oldest) = pages.first() {
                if let Err(e) = oldest.close().await {
                    tracing::warn!(plugin = %self.name, error = %e, "failed to close oldest page");
                }
            }
        }
        Ok(())
    }
}
