//! Thin HTTP transport adapter (SPEC_FULL.md §4.10). Pure protocol
//! translation: handlers deserialize a request, call exactly one
//! dispatcher/pool/coordinator method, and map the result to a response. No
//! session, plugin, or lifecycle logic lives in this layer.

mod handlers;
mod types;

pub use handlers::create_router;
#[allow(unused_imports)]
pub use types::*;

use crate::collaborators::{
    InMemoryFingerprintStore, InMemoryNotificationDispatcher, InMemoryPluginConfigStore,
};
use crate::config::Config;
use crate::dispatcher::CommandDispatcher;
use crate::driver::MockBrowserDriver;
use crate::lifecycle::LifecycleGate;
use crate::live_stream::LiveStreamManager;
use crate::safety::ScriptSafetyChecker;
use crate::scheduler::Scheduler;
use crate::session::SessionPool;
use crate::sweeper::Sweeper;
use crate::webrtc::WebRtcCoordinator;
use std::sync::Arc;

/// Application state shared across handlers — the composition root wiring
/// the pool, dispatcher, sweeper, and WebRTC coordinator together.
#[derive(Clone)]
pub struct AppState {
    pub pool: Arc<SessionPool>,
    pub dispatcher: Arc<CommandDispatcher>,
    pub lifecycle: Arc<LifecycleGate>,
    pub live_stream: Arc<LiveStreamManager>,
    pub webrtc: Arc<WebRtcCoordinator>,
    pub safety: Arc<ScriptSafetyChecker>,
    pub scheduler: Arc<Scheduler>,
    pub config: Config,
}

impl AppState {
    /// Wires every long-lived service and starts the sweeper job on the
    /// scheduler. The real `BrowserDriver`/`FingerprintStore`/
    /// `PluginConfigStore` are out of scope (SPEC_FULL.md §6.2); this
    /// composition root defaults to the in-memory reference collaborators so
    /// the service runs standalone.
    pub async fn new(config: Config) -> Self {
        let pool = Arc::new(SessionPool::new(
            Arc::new(MockBrowserDriver),
            Arc::new(InMemoryFingerprintStore::new()),
            Arc::new(InMemoryPluginConfigStore::new()),
            Arc::new(InMemoryNotificationDispatcher::new()),
            config.clone(),
        ));
        let dispatcher = Arc::new(CommandDispatcher::new(pool.clone()));
        let live_stream = Arc::new(LiveStreamManager::new(pool.clone()));
        let lifecycle = Arc::new(LifecycleGate::new(pool.clone(), live_stream.clone()));
        let webrtc = Arc::new(WebRtcCoordinator::new(live_stream.clone()));
        let safety = Arc::new(ScriptSafetyChecker::default());

        let scheduler = Arc::new(Scheduler::new());
        let sweeper = Arc::new(Sweeper::new(pool.clone(), live_stream.clone(), config.live_stream_timeout));
        scheduler
            .add(
                "sweeper",
                config.sweep_interval,
                Arc::new(move || {
                    let sweeper = sweeper.clone();
                    Box::pin(async move {
                        sweeper.tick().await;
                    })
                }),
            )
            .await;

        Self {
            pool,
            dispatcher,
            lifecycle,
            live_stream,
            webrtc,
            safety,
            scheduler,
            config,
        }
    }
}
