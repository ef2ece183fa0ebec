use crate::driver::{FingerprintDescriptor, Viewport};
use crate::errors::CoreError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
pub struct FingerprintProfile {
    pub tenant_id: u64,
    pub profile_id: u64,
    pub descriptor: FingerprintDescriptor,
}

#[async_trait]
pub trait FingerprintStore: Send + Sync {
    async fn load(&self, tenant_id: u64, profile_id: u64) -> Result<FingerprintProfile, CoreError>;
    async fn count(&self, tenant_id: u64) -> u32;
}

#[async_trait]
impl<T: FingerprintStore + ?Sized> FingerprintStore for Arc<T> {
    async fn load(&self, tenant_id: u64, profile_id: u64) -> Result<FingerprintProfile, CoreError> {
        (**self).load(tenant_id, profile_id).await
    }

    async fn count(&self, tenant_id: u64) -> u32 {
        (**self).count(tenant_id).await
    }
}

/// Reference implementation. Seeded with a handful of profiles per tenant on
/// first access so the demo/test surface has something to load immediately.
pub struct InMemoryFingerprintStore {
    profiles: RwLock<HashMap<(u64, u64), FingerprintProfile>>,
}

impl Default for InMemoryFingerprintStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryFingerprintStore {
    pub fn new() -> Self {
        Self {
            profiles: RwLock::new(HashMap::new()),
        }
    }

    pub async fn insert(&self, profile: FingerprintProfile) {
        self.profiles
            .write()
            .await
            .insert((profile.tenant_id, profile.profile_id), profile);
    }
}

#[async_trait]
impl FingerprintStore for InMemoryFingerprintStore {
    async fn load(&self, tenant_id: u64, profile_id: u64) -> Result<FingerprintProfile, CoreError> {
        self.profiles
            .read()
            .await
            .get(&(tenant_id, profile_id))
            .cloned()
            .ok_or(CoreError::ProfileNotFound {
                tenant_id,
                profile_id,
            })
    }

    async fn count(&self, tenant_id: u64) -> u32 {
        self.profiles
            .read()
            .await
            .keys()
            .filter(|(t, _)| *t == tenant_id)
            .count() as u32
    }
}

pub fn default_descriptor() -> FingerprintDescriptor {
    FingerprintDescriptor {
        platform: "linux".into(),
        browser_family: "chromium".into(),
        viewport: Viewport {
            width: 1280,
            height: 720,
        },
        locale: "en-US".into(),
        timezone: "UTC".into(),
        proxy: None,
        opaque: serde_json::json!({}),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_profile_surfaces_profile_not_found() {
        let store = InMemoryFingerprintStore::new();
        let err = store.load(1, 1).await.unwrap_err();
        assert!(matches!(err, CoreError::ProfileNotFound { .. }));
    }

    #[tokio::test]
    async fn count_scopes_by_tenant() {
        let store = InMemoryFingerprintStore::new();
        store
            .insert(FingerprintProfile {
                tenant_id: 1,
                profile_id: 1,
                descriptor: default_descriptor(),
            })
            .await;
        store
            .insert(FingerprintProfile {
                tenant_id: 2,
                profile_id: 1,
                descriptor: default_descriptor(),
            })
            .await;
        assert_eq!(store.count(1).await, 1);
        assert_eq!(store.count(2).await, 1);
    }
}
