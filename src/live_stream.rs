//! Live stream registry (SPEC_FULL.md §4.6): tracks outbound MJPEG/WebRTC
//! bindings per session and produces MJPEG frames on demand. Grounded on
//! `live_service.py`'s `get_plugined_session` / stream registry shape.

use crate::driver::Page;
use crate::errors::CoreError;
use crate::session::{SessionKey, SessionPool};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    Mjpeg,
    WebRtc,
}

#[derive(Debug, Clone)]
pub struct StreamParams {
    pub fps: u32,
    pub quality: u8,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl Default for StreamParams {
    fn default() -> Self {
        Self {
            fps: 15,
            quality: 80,
            width: None,
            height: None,
        }
    }
}

struct StreamEntry {
    kind: StreamKind,
    params: StreamParams,
    last_heartbeat: DateTime<Utc>,
}

/// One MJPEG multipart frame, ready for the transport adapter to write
/// verbatim: `--frame\r\nContent-Type: image/jpeg\r\nContent-Length: N\r\n\r\n<bytes>\r\n`.
pub struct MjpegFrame {
    pub jpeg: Vec<u8>,
}

pub struct LiveStreamManager {
    pool: Arc<SessionPool>,
    entries: RwLock<HashMap<SessionKey, StreamEntry>>,
}

impl LiveStreamManager {
    pub fn new(pool: Arc<SessionPool>) -> Self {
        Self {
            pool,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn register(&self, key: SessionKey, kind: StreamKind, params: StreamParams) {
        self.entries.write().await.insert(
            key,
            StreamEntry {
                kind,
                params,
                last_heartbeat: Utc::now(),
            },
        );
    }

    pub async fn unregister(&self, key: SessionKey) {
        self.entries.write().await.remove(&key);
    }

    pub async fn heartbeat(&self, key: SessionKey) {
        if let Some(entry) = self.entries.write().await.get_mut(&key) {
            entry.last_heartbeat = Utc::now();
        }
    }

    pub async fn is_registered(&self, key: SessionKey) -> bool {
        self.entries.read().await.contains_key(&key)
    }

    /// Pulls one screenshot from the session's active page and wraps it as
    /// an MJPEG frame. When the registered params request a width/height,
    /// the frame is downscaled to that size whenever it differs from the
    /// page's current viewport.
    pub async fn next_frame(&self, key: SessionKey) -> Result<MjpegFrame, CoreError> {
        let (quality, requested_size) = {
            let entries = self.entries.read().await;
            entries
                .get(&key)
                .map(|e| (e.params.quality, e.params.width.zip(e.params.height)))
                .unwrap_or((80, None))
        };
        let session = self.pool.get(key).await.ok_or(CoreError::SessionNotFound(key))?;
        let guard = session.lock().await;
        let page: Arc<dyn Page> = guard.handle.active_page().await.map_err(CoreError::DriverOperationFailed)?;

        let size = match requested_size {
            Some((width, height)) => {
                let viewport = page.viewport().await;
                (width != viewport.width || height != viewport.height).then_some((width, height))
            }
            None => None,
        };

        let jpeg = page.screenshot(quality, size).await.map_err(CoreError::DriverOperationFailed)?;
        Ok(MjpegFrame { jpeg })
    }

    /// Releases any entry whose owning session is gone or whose own
    /// heartbeat has exceeded `timeout`. Called by the sweeper.
    pub async fn reap_stale(&self, timeout: std::time::Duration) -> Vec<SessionKey> {
        let now = Utc::now();
        let keys: Vec<SessionKey> = { self.entries.read().await.keys().copied().collect() };
        let mut reaped = Vec::new();
        for key in keys {
            let stale_heartbeat = {
                let entries = self.entries.read().await;
                entries.get(&key).map(|e| {
                    now.signed_duration_since(e.last_heartbeat).to_std().unwrap_or_default() > timeout
                })
            };
            let session_gone = self.pool.get(key).await.is_none();
            if session_gone || stale_heartbeat == Some(true) {
                self.unregister(key).await;
                reaped.push(key);
            }
        }
        reaped
    }

    pub async fn kind_of(&self, key: SessionKey) -> Option<StreamKind> {
        self.entries.read().await.get(&key).map(|e| e.kind)
    }

    /// Every registered entry, for the admin snapshot route.
    pub async fn snapshot(&self) -> Vec<(SessionKey, StreamKind)> {
        self.entries.read().await.iter().map(|(k, e)| (*k, e.kind)).collect()
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

    async fn pool_with_session(key: SessionKey) -> Arc<SessionPool> {
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
        pool
    }

    #[tokio::test]
    async fn next_frame_produces_jpeg_bytes() {
        let key = SessionKey::new(1, 1);
        let pool = pool_with_session(key).await;
        let manager = LiveStreamManager::new(pool);
        manager.register(key, StreamKind::Mjpeg, StreamParams::default()).await;
        let frame = manager.next_frame(key).await.unwrap();
        assert_eq!(&frame.jpeg[0..3], &[0xFF, 0xD8, 0xFF]);
    }

    #[tokio::test]
    async fn reap_stale_removes_old_entries() {
        let key = SessionKey::new(2, 2);
        let pool = pool_with_session(key).await;
        let manager = LiveStreamManager::new(pool);
        manager.register(key, StreamKind::Mjpeg, StreamParams::default()).await;
        {
            let mut entries = manager.entries.write().await;
            entries.get_mut(&key).unwrap().last_heartbeat = Utc::now() - chrono::Duration::seconds(120);
        }
        let reaped = manager.reap_stale(std::time::Duration::from_secs(60)).await;
        assert_eq!(reaped, vec![key]);
        assert!(!manager.is_registered(key).await);
    }
}
