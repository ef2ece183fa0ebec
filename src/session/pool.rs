//! The session pool (SPEC_FULL.md §4.1): global registry of live
//! `BrowserSession`s keyed by `(tenantID, profileID)`, grounded on the
//! teacher's `BrowserSessionManager` double-checked-locking `get_session`
//! and RAII-activity-stamping guard, generalized to per-tenant keys and a
//! full lifecycle state machine.

use super::state::{transition, CleanupPolicy, Effect, SessionState};
use super::types::{LifecycleState, Priority, SessionKey};
use crate::collaborators::{FingerprintStore, NotificationDispatcher, PluginConfigStore};
use crate::config::Config;
use crate::driver::{BrowserDriver, BrowserHandle};
use crate::errors::CoreError;
use crate::plugins::{PluginChain, PluginKind};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

pub struct BrowserSession {
    pub state: SessionState,
    pub handle: Arc<dyn BrowserHandle>,
    pub chain: PluginChain,
}

#[derive(Debug, Clone)]
pub struct CreateOptions {
    pub headless: bool,
    pub cleanup_policy: Option<CleanupPolicy>,
    pub expires_in: Option<std::time::Duration>,
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self {
            headless: true,
            cleanup_policy: None,
            expires_in: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub key: SessionKey,
    pub lifecycle: LifecycleState,
    pub manual_mode: bool,
    pub current_priority: Priority,
    pub client_count: usize,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub plugins: Vec<PluginKind>,
}

pub struct SessionPool {
    sessions: RwLock<HashMap<SessionKey, Arc<Mutex<BrowserSession>>>>,
    /// One lock per key, held across the whole create path so two concurrent
    /// `Create` calls for the same key never both pass `Initializing`.
    create_locks: Mutex<HashMap<SessionKey, Arc<Mutex<()>>>>,
    driver: Arc<dyn BrowserDriver>,
    fingerprint_store: Arc<dyn FingerprintStore>,
    plugin_config_store: Arc<dyn PluginConfigStore>,
    notifier: Arc<dyn NotificationDispatcher>,
    config: Config,
}

impl SessionPool {
    pub fn new(
        driver: Arc<dyn BrowserDriver>,
        fingerprint_store: Arc<dyn FingerprintStore>,
        plugin_config_store: Arc<dyn PluginConfigStore>,
        notifier: Arc<dyn NotificationDispatcher>,
        config: Config,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            create_locks: Mutex::new(HashMap::new()),
            driver,
            fingerprint_store,
            plugin_config_store,
            notifier,
            config,
        }
    }

    async fn create_lock_for(&self, key: SessionKey) -> Arc<Mutex<()>> {
        let mut locks = self.create_locks.lock().await;
        locks.entry(key).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    pub async fn get(&self, key: SessionKey) -> Option<Arc<Mutex<BrowserSession>>> {
        let sessions = self.sessions.read().await;
        sessions.get(&key).cloned()
    }

    /// Creates a session, or — if one already exists for `key` — returns it
    /// rather than erroring (SPEC_FULL.md §7: `SessionAlreadyExists` is
    /// reconciled, not surfaced).
    pub async fn create(&self, key: SessionKey, opts: CreateOptions) -> Result<Arc<Mutex<BrowserSession>>, CoreError> {
        if let Some(existing) = self.get(key).await {
            return Ok(existing);
        }

        let create_lock = self.create_lock_for(key).await;
        let _guard = create_lock.lock().await;

        // Re-check after acquiring the per-key lock: another task may have
        // finished creating the session while we waited.
        if let Some(existing) = self.get(key).await {
            return Ok(existing);
        }

        let profile = self.fingerprint_store.load(key.tenant_id, key.profile_id).await?;

        if self.fingerprint_store.count(key.tenant_id).await > self.config.fingerprint_limit_per_tenant {
            return Err(CoreError::FingerprintLimitExceeded { tenant_id: key.tenant_id });
        }

        let specs = self.plugin_config_store.load_plugins(key.tenant_id, key.profile_id).await;

        let handle = self
            .driver
            .open(&profile.descriptor, opts.headless)
            .await
            .map_err(|source| CoreError::DriverOpenFailed { key, source })?;

        let cleanup_policy = opts.cleanup_policy.unwrap_or(CleanupPolicy {
            max_idle: self.config.session_idle_timeout,
            max_no_heartbeat: self.config.heartbeat_timeout,
        });
        let expires_at = opts.expires_in.map(|d| Utc::now() + chrono::Duration::from_std(d).unwrap_or_default());

        let mut state = SessionState::new(key, cleanup_policy, expires_at);
        transition(&mut state, super::state::Event::DriverReady).expect("DriverReady never fails");

        let chain = PluginChain::new(&specs, self.notifier.clone());
        let session = Arc::new(Mutex::new(BrowserSession { state, handle, chain }));

        self.sessions.write().await.insert(key, session.clone());
        Ok(session)
    }

    pub async fn get_or_create(
        &self,
        key: SessionKey,
        opts: CreateOptions,
    ) -> Result<Arc<Mutex<BrowserSession>>, CoreError> {
        self.create(key, opts).await
    }

    /// Releases a session: transitions to `Terminating`, closes the driver
    /// handle, transitions to `Terminated`, and removes it from the map.
    /// Driver close failures are logged and suppressed — the entry is
    /// removed regardless so no orphan state survives.
    pub async fn release(&self, key: SessionKey, _force: bool) -> Result<(), CoreError> {
        let session = {
            let mut sessions = self.sessions.write().await;
            sessions.remove(&key)
        };
        let Some(session) = session else {
            return Err(CoreError::SessionNotFound(key));
        };

        let mut guard = session.lock().await;
        transition(&mut guard.state, super::state::Event::BeginTerminate).ok();
        if let Err(e) = guard.handle.close().await {
            tracing::warn!(%key, error = %e, "driver close failed during release");
        }
        transition(&mut guard.state, super::state::Event::Terminated).ok();
        Ok(())
    }

    pub async fn snapshot(&self) -> Vec<SessionStatus> {
        let sessions = self.sessions.read().await;
        let mut out = Vec::with_capacity(sessions.len());
        for session in sessions.values() {
            let guard = session.lock().await;
            out.push(SessionStatus {
                key: guard.state.key,
                lifecycle: guard.state.lifecycle,
                manual_mode: guard.state.manual_mode,
                current_priority: guard.state.current_priority,
                client_count: guard.state.clients.len(),
                created_at: guard.state.created_at,
                last_activity: guard.state.last_activity,
                last_heartbeat: guard.state.last_heartbeat,
                expires_at: guard.state.expires_at,
                plugins: guard.chain.kinds(),
            });
        }
        out
    }

    /// Applies a sweep tick to every session, returning the keys that were
    /// released as a result. Used by the `Sweeper` (§4.5) — kept on the pool
    /// so release stays atomic with the map removal.
    pub async fn apply_sweep(&self, now: DateTime<Utc>) -> Vec<SessionKey> {
        let keys: Vec<SessionKey> = self.sessions.read().await.keys().copied().collect();
        let mut released = Vec::new();
        for key in keys {
            let Some(session) = self.get(key).await else { continue };
            let effects = {
                let mut guard = session.lock().await;
                match transition(&mut guard.state, super::state::Event::SweepTick { now }) {
                    Ok(effects) => effects,
                    Err(_) => continue,
                }
            };
            let mut should_release = None;
            for effect in effects {
                match effect {
                    Effect::ForceResumeAutomation => {
                        let mut guard = session.lock().await;
                        transition(&mut guard.state, super::state::Event::ResumeAutomation { force: true, now }).ok();
                    }
                    Effect::ReleaseForHeartbeatTimeout | Effect::ReleaseForIdleTimeout | Effect::ReleaseForExpiry => {
                        should_release = Some(effect);
                    }
                }
            }
            if should_release.is_some() {
                if self.release(key, false).await.is_ok() {
                    released.push(key);
                }
            }
        }
        released
    }

    pub fn driver(&self) -> &Arc<dyn BrowserDriver> {
        &self.driver
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{
        FingerprintProfile, InMemoryFingerprintStore, InMemoryNotificationDispatcher, InMemoryPluginConfigStore,
    };
    use crate::driver::MockBrowserDriver;

    async fn pool_with_profile(key: SessionKey) -> SessionPool {
        let fingerprints = InMemoryFingerprintStore::new();
        fingerprints
            .insert(FingerprintProfile {
                tenant_id: key.tenant_id,
                profile_id: key.profile_id,
                descriptor: crate::collaborators::default_descriptor(),
            })
            .await;
        SessionPool::new(
            Arc::new(MockBrowserDriver),
            Arc::new(fingerprints),
            Arc::new(InMemoryPluginConfigStore::new()),
            Arc::new(InMemoryNotificationDispatcher::new()),
            Config::default(),
        )
    }

    #[tokio::test]
    async fn create_is_idempotent_for_same_key() {
        let key = SessionKey::new(1, 1);
        let pool = pool_with_profile(key).await;
        let a = pool.create(key, CreateOptions::default()).await.unwrap();
        let b = pool.create(key, CreateOptions::default()).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn concurrent_create_yields_single_session() {
        let key = SessionKey::new(2, 2);
        let pool = Arc::new(pool_with_profile(key).await);
        let mut handles = Vec::new();
        for _ in 0..8 {
            let pool = pool.clone();
            handles.push(tokio::spawn(async move { pool.create(key, CreateOptions::default()).await.unwrap() }));
        }
        let mut sessions = Vec::new();
        for h in handles {
            sessions.push(h.await.unwrap());
        }
        for s in &sessions[1..] {
            assert!(Arc::ptr_eq(&sessions[0], s));
        }
        assert_eq!(pool.sessions.read().await.len(), 1);
    }

    #[tokio::test]
    async fn create_missing_profile_fails() {
        let key = SessionKey::new(3, 3);
        let pool = SessionPool::new(
            Arc::new(MockBrowserDriver),
            Arc::new(InMemoryFingerprintStore::new()),
            Arc::new(InMemoryPluginConfigStore::new()),
            Arc::new(InMemoryNotificationDispatcher::new()),
            Config::default(),
        );
        let err = pool.create(key, CreateOptions::default()).await.unwrap_err();
        assert!(matches!(err, CoreError::ProfileNotFound { .. }));
    }

    #[tokio::test]
    async fn release_removes_from_pool() {
        let key = SessionKey::new(4, 4);
        let pool = pool_with_profile(key).await;
        pool.create(key, CreateOptions::default()).await.unwrap();
        pool.release(key, false).await.unwrap();
        assert!(pool.get(key).await.is_none());
    }

    #[tokio::test]
    async fn sweep_releases_sessions_past_heartbeat_timeout() {
        let key = SessionKey::new(5, 5);
        let pool = pool_with_profile(key).await;
        let session = pool.create(key, CreateOptions::default()).await.unwrap();
        {
            let mut guard = session.lock().await;
            guard.state.last_heartbeat = Utc::now() - chrono::Duration::seconds(120);
        }
        let released = pool.apply_sweep(Utc::now()).await;
        assert_eq!(released, vec![key]);
        assert!(pool.get(key).await.is_none());
    }
}
