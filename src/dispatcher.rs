//! The command dispatcher (SPEC_FULL.md §4.3): single entry point for every
//! operator command, arbitrating priority/manual-mode state before handing
//! the operation to the plugin chain. Grounded on the teacher's
//! `ConversationRuntime::run`/`execute_effect` event-loop shape — here one
//! dispatch call plays the role of one processed event.

use crate::errors::CoreError;
use crate::plugins::OperationContext;
use crate::safety::ScriptSafetyChecker;
use crate::session::{transition, Event as LifecycleEvent, LifecycleState, Priority, SessionKey, SessionPool, TransitionError};
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum CommandKind {
    Click { x: f64, y: f64 },
    Fill { selector: String, text: String },
    Hover { selector: String },
    Press { key: String },
    Screenshot { quality: u8 },
    Evaluate { code: String },
    Navigate { url: String },
    GetBrowserInfo,
}

#[derive(Debug, Clone)]
pub struct Command {
    pub kind: CommandKind,
    pub priority: Priority,
    pub require_manual: bool,
    pub interrupt_automation: bool,
}

impl Command {
    pub fn new(kind: CommandKind) -> Self {
        Self {
            kind,
            priority: Priority::Normal,
            require_manual: false,
            interrupt_automation: false,
        }
    }
}

pub struct CommandDispatcher {
    pool: Arc<SessionPool>,
    safety: ScriptSafetyChecker,
}

impl From<TransitionError> for CoreError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::ManualModeRequired => CoreError::ManualModeRequired,
            TransitionError::PriorityConflict { requested, current } => {
                CoreError::PriorityConflict { requested, current }
            }
            TransitionError::SessionTerminal => CoreError::PageClosed,
        }
    }
}

impl CommandDispatcher {
    pub fn new(pool: Arc<SessionPool>) -> Self {
        Self {
            pool,
            safety: ScriptSafetyChecker::default(),
        }
    }

    /// Dispatches one command against `key`. Two commands against the same
    /// session serialize through the session's own mutex (FIFO arrival
    /// order); two commands against different sessions never block each
    /// other.
    pub async fn dispatch(&self, key: SessionKey, command: Command) -> Result<Value, CoreError> {
        let session = self.pool.get(key).await.ok_or(CoreError::SessionNotFound(key))?;
        let mut guard = session.lock().await;

        let now = Utc::now();
        transition(
            &mut guard.state,
            LifecycleEvent::CommandGate {
                priority: command.priority,
                require_manual: command.require_manual,
                interrupt_automation: command.interrupt_automation,
                now,
            },
        )?;

        if let CommandKind::Evaluate { code } = &command.kind {
            let verdict = self.safety.check(code, true);
            if !verdict.safe_to_run {
                return Err(CoreError::ScriptUnsafe(verdict.risks.join("; ")));
            }
        }

        let page = guard
            .handle
            .active_page()
            .await
            .map_err(CoreError::DriverOperationFailed)?;
        let operation = command.kind.name();
        let paused = guard.state.lifecycle == LifecycleState::Paused;

        let result = if paused {
            run_operation(&page, &command.kind).await.map_err(CoreError::DriverOperationFailed)
        } else {
            let ctx = OperationContext {
                handle: guard.handle.clone(),
                page: page.clone(),
                operation,
                tenant_id: key.tenant_id,
                profile_id: key.profile_id,
            };
            guard
                .chain
                .run(ctx, || run_operation(&page, &command.kind))
                .await
                .map_err(|e| match e {
                    CoreError::DriverOperationFailed(source) if is_page_closed(&source.to_string()) => {
                        CoreError::PageClosed
                    }
                    other => other,
                })
        };
        result
    }
}

fn is_page_closed(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("page closed") || lower.contains("context closed")
}

impl CommandKind {
    fn name(&self) -> &'static str {
        match self {
            CommandKind::Click { .. } => "click",
            CommandKind::Fill { .. } => "fill",
            CommandKind::Hover { .. } => "hover",
            CommandKind::Press { .. } => "press",
            CommandKind::Screenshot { .. } => "screenshot",
            CommandKind::Evaluate { .. } => "evaluate",
            CommandKind::Navigate { .. } => "navigate",
            CommandKind::GetBrowserInfo => "get_browser_info",
        }
    }
}

async fn run_operation(
    page: &Arc<dyn crate::driver::Page>,
    kind: &CommandKind,
) -> Result<Value, crate::errors::DriverError> {
    match kind {
        CommandKind::Click { x, y } => {
            page.click(*x, *y).await?;
            Ok(Value::Null)
        }
        CommandKind::Fill { selector, text } => {
            page.fill(selector, text).await?;
            Ok(Value::Null)
        }
        CommandKind::Hover { selector } => {
            page.hover(selector).await?;
            Ok(Value::Null)
        }
        CommandKind::Press { key } => {
            page.press(key).await?;
            Ok(Value::Null)
        }
        CommandKind::Screenshot { quality } => {
            let bytes = page.screenshot(*quality, None).await?;
            Ok(serde_json::json!({ "bytes_base64_len": bytes.len() }))
        }
        CommandKind::Evaluate { code } => page.evaluate(code).await,
        CommandKind::Navigate { url } => {
            page.goto(url).await?;
            Ok(Value::Null)
        }
        CommandKind::GetBrowserInfo => {
            let viewport = page.viewport().await;
            Ok(serde_json::json!({ "width": viewport.width, "height": viewport.height }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{
        FingerprintProfile, InMemoryFingerprintStore, InMemoryNotificationDispatcher, InMemoryPluginConfigStore,
    };
    use crate::config::Config;
    use crate::driver::MockBrowserDriver;
    use crate::session::CreateOptions;

    async fn dispatcher_with_session(key: SessionKey) -> (CommandDispatcher, Arc<SessionPool>) {
        let fingerprints = InMemoryFingerprintStore::new();
        fingerprints
            .insert(FingerprintProfile {
                tenant_id: key.tenant_id,
                profile_id: key.profile_id,
                descriptor: crate::collaborators::default_descriptor(),
            })
            .await;
        let pool = Arc::new(SessionPool::new(
            Arc::new(MockBrowserDriver),
            Arc::new(fingerprints),
            Arc::new(InMemoryPluginConfigStore::new()),
            Arc::new(InMemoryNotificationDispatcher::new()),
            Config::default(),
        ));
        pool.create(key, CreateOptions::default()).await.unwrap();
        (CommandDispatcher::new(pool.clone()), pool)
    }

    #[tokio::test]
    async fn unsafe_script_never_reaches_driver() {
        let key = SessionKey::new(1, 1);
        let (dispatcher, _pool) = dispatcher_with_session(key).await;
        let cmd = Command::new(CommandKind::Evaluate {
            code: "eval('2+2')".into(),
        });
        let err = dispatcher.dispatch(key, cmd).await.unwrap_err();
        assert!(matches!(err, CoreError::ScriptUnsafe(_)));
    }

    #[tokio::test]
    async fn manual_required_without_manual_mode_fails() {
        let key = SessionKey::new(2, 2);
        let (dispatcher, _pool) = dispatcher_with_session(key).await;
        let mut cmd = Command::new(CommandKind::Click { x: 0.0, y: 0.0 });
        cmd.require_manual = true;
        let err = dispatcher.dispatch(key, cmd).await.unwrap_err();
        assert!(matches!(err, CoreError::ManualModeRequired));
    }

    #[tokio::test]
    async fn interrupt_automation_pauses_session() {
        let key = SessionKey::new(3, 3);
        let (dispatcher, pool) = dispatcher_with_session(key).await;
        let mut cmd = Command::new(CommandKind::Click { x: 0.0, y: 0.0 });
        cmd.priority = Priority::High;
        cmd.interrupt_automation = true;
        dispatcher.dispatch(key, cmd).await.unwrap();
        let session = pool.get(key).await.unwrap();
        let guard = session.lock().await;
        assert!(guard.state.manual_mode);
        assert_eq!(guard.state.lifecycle, LifecycleState::Paused);
    }

    #[tokio::test]
    async fn unknown_session_fails() {
        let key = SessionKey::new(9, 9);
        let pool = Arc::new(SessionPool::new(
            Arc::new(MockBrowserDriver),
            Arc::new(InMemoryFingerprintStore::new()),
            Arc::new(InMemoryPluginConfigStore::new()),
            Arc::new(InMemoryNotificationDispatcher::new()),
            Config::default(),
        ));
        let dispatcher = CommandDispatcher::new(pool);
        let err = dispatcher
            .dispatch(key, Command::new(CommandKind::GetBrowserInfo))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::SessionNotFound(_)));
    }
}
