use super::{OperationContext, Plugin, PluginKind};
use crate::collaborators::LogLevel;
use crate::errors::CoreError;
use async_trait::async_trait;
use std::time::Instant;

/// Registers hooks at every lifecycle point but only logs; it never affects
/// dispatch outcome.
pub struct LogPlugin {
    name: String,
    level: LogLevel,
    started_at: Option<Instant>,
}

impl LogPlugin {
    pub fn new(name: String, level: LogLevel) -> Self {
        Self {
            name,
            level,
            started_at: None,
        }
    }

    fn emit(&self, operation: &str, message: &str) {
        match self.level {
            LogLevel::Debug => tracing::debug!(plugin = %self.name, operation, message),
            LogLevel::Info => tracing::info!(plugin = %self.name, operation, message),
            LogLevel::Warn => tracing::warn!(plugin = %self.name, operation, message),
        }
    }
}

#[async_trait]
impl Plugin for LogPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> PluginKind {
        PluginKind::Log
    }

    async fn before_exec(&mut self, ctx: &OperationContext) -> Result<(), CoreError> {
        self.started_at = Some(Instant::now());
        self.emit(ctx.operation, "starting");
        Ok(())
    }

    async fn on_success(&mut self, ctx: &OperationContext) {
        let elapsed = self.started_at.map(|t| t.elapsed());
        self.emit(ctx.operation, &format!("completed in {elapsed:?}"));
    }

    async fn on_error(&mut self, ctx: &OperationContext, err: &CoreError) -> bool {
        self.emit(ctx.operation, &format!("failed: {err}"));
        false
    }

    async fn after_exec(&mut self, ctx: &OperationContext) {
        let elapsed = self.started_at.take().map(|t| t.elapsed());
        self.emit(ctx.operation, &format!("duration {elapsed:?}"));
    }
}
