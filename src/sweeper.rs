//! The sweeper (SPEC_FULL.md §4.5): periodic enforcement of idle/heartbeat
//! policies, plus reaping stale live-stream entries. Runs as a named job on
//! the `Scheduler`.

use crate::live_stream::LiveStreamManager;
use crate::session::SessionPool;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

pub struct Sweeper {
    pool: Arc<SessionPool>,
    live_stream: Arc<LiveStreamManager>,
    live_stream_timeout: Duration,
}

impl Sweeper {
    pub fn new(pool: Arc<SessionPool>, live_stream: Arc<LiveStreamManager>, live_stream_timeout: Duration) -> Self {
        Self {
            pool,
            live_stream,
            live_stream_timeout,
        }
    }

    /// One sweep pass: released-session keys returned for logging/metrics.
    pub async fn tick(&self) -> Vec<crate::session::SessionKey> {
        let released = self.pool.apply_sweep(Utc::now()).await;
        let reaped = self.live_stream.reap_stale(self.live_stream_timeout).await;
        if !released.is_empty() {
            tracing::info!(count = released.len(), "sweeper released sessions");
        }
        if !reaped.is_empty() {
            tracing::info!(count = reaped.len(), "sweeper reaped stale live streams");
        }
        released
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
    use crate::session::{CreateOptions, SessionKey};

    #[tokio::test]
    async fn sweep_never_releases_an_observed_session_end_to_end() {
        let key = SessionKey::new(1, 1);
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
        let session = pool.create(key, CreateOptions::default()).await.unwrap();
        {
            let mut guard = session.lock().await;
            guard.state.clients.insert("c1".into(), Utc::now());
        }
        let live_stream = Arc::new(LiveStreamManager::new(pool.clone()));
        let sweeper = Sweeper::new(pool.clone(), live_stream, Duration::from_secs(60));
        let released = sweeper.tick().await;
        assert!(released.is_empty());
        assert!(pool.get(key).await.is_some());
    }
}
