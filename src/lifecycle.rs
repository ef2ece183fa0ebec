//! Heartbeat & lifecycle gate (SPEC_FULL.md §4.4): client observability and
//! manual/automation transitions. Kept distinct from the command dispatcher
//! because heartbeats never create sessions and never execute operations.

use crate::errors::CoreError;
use crate::live_stream::LiveStreamManager;
use crate::session::{transition, Event, Priority, SessionKey, SessionPool};
use chrono::Utc;
use std::sync::Arc;

pub struct LifecycleGate {
    pool: Arc<SessionPool>,
    live_stream: Arc<LiveStreamManager>,
}

impl LifecycleGate {
    pub fn new(pool: Arc<SessionPool>, live_stream: Arc<LiveStreamManager>) -> Self {
        Self { pool, live_stream }
    }

    /// Never creates a session — a heartbeat against an unknown key is
    /// simply a miss.
    pub async fn heartbeat(&self, key: SessionKey, client_id: String) -> Result<(), CoreError> {
        let session = self.pool.get(key).await.ok_or(CoreError::SessionNotFound(key))?;
        let now = Utc::now();
        {
            let mut guard = session.lock().await;
            transition(&mut guard.state, Event::Heartbeat { client_id, now }).expect("heartbeat never fails");
        }
        if self.live_stream.is_registered(key).await {
            self.live_stream.heartbeat(key).await;
        }
        Ok(())
    }

    pub async fn start_manual(&self, key: SessionKey, priority: Priority) -> Result<(), CoreError> {
        let session = self.pool.get(key).await.ok_or(CoreError::SessionNotFound(key))?;
        let now = Utc::now();
        let mut guard = session.lock().await;
        transition(&mut guard.state, Event::StartManual { priority, now })?;
        Ok(())
    }

    pub async fn resume_automation(&self, key: SessionKey, force: bool) -> Result<(), CoreError> {
        let session = self.pool.get(key).await.ok_or(CoreError::SessionNotFound(key))?;
        let now = Utc::now();
        let mut guard = session.lock().await;
        transition(&mut guard.state, Event::ResumeAutomation { force, now })?;
        Ok(())
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

    async fn gate_with_session(key: SessionKey) -> (LifecycleGate, Arc<SessionPool>) {
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
        let live_stream = Arc::new(LiveStreamManager::new(pool.clone()));
        (LifecycleGate::new(pool.clone(), live_stream), pool)
    }

    #[tokio::test]
    async fn heartbeat_on_unknown_session_is_a_miss_not_a_create() {
        let key = SessionKey::new(9, 9);
        let fingerprints = InMemoryFingerprintStore::new();
        let pool = Arc::new(SessionPool::new(
            Arc::new(MockBrowserDriver),
            Arc::new(fingerprints),
            Arc::new(InMemoryPluginConfigStore::new()),
            Arc::new(InMemoryNotificationDispatcher::new()),
            Config::default(),
        ));
        let live_stream = Arc::new(LiveStreamManager::new(pool.clone()));
        let gate = LifecycleGate::new(pool.clone(), live_stream);
        let err = gate.heartbeat(key, "c1".into()).await.unwrap_err();
        assert!(matches!(err, CoreError::SessionNotFound(_)));
        assert!(pool.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn start_manual_then_resume_round_trips() {
        let key = SessionKey::new(1, 1);
        let (gate, pool) = gate_with_session(key).await;
        gate.start_manual(key, Priority::High).await.unwrap();
        {
            let session = pool.get(key).await.unwrap();
            assert!(session.lock().await.state.manual_mode);
        }
        gate.resume_automation(key, false).await.unwrap();
        let session = pool.get(key).await.unwrap();
        assert!(!session.lock().await.state.manual_mode);
    }
}
