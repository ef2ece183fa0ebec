use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Plugin configuration tagged union (SPEC_FULL.md §3 "Plugin Configuration").
/// Each enabled spec is materialized by the session into a stateful plugin
/// instance for the session's lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PluginSpec {
    Log {
        name: String,
        enabled: bool,
        level: LogLevel,
    },
    PageLimit {
        name: String,
        enabled: bool,
        max_pages: u32,
    },
    RandomWait {
        name: String,
        enabled: bool,
        min_wait_ms: u64,
        mid_wait_ms: u64,
        max_wait_ms: u64,
        long_interval: u32,
        mid_interval: u32,
        base_long_prob: f64,
        base_mid_prob: f64,
        growth: f64,
    },
    Retry {
        name: String,
        enabled: bool,
        attempts: u32,
        delay_ms: u64,
        notify_on_error: bool,
    },
}

impl PluginSpec {
    pub fn enabled(&self) -> bool {
        match self {
            PluginSpec::Log { enabled, .. } => *enabled,
            PluginSpec::PageLimit { enabled, .. } => *enabled,
            PluginSpec::RandomWait { enabled, .. } => *enabled,
            PluginSpec::Retry { enabled, .. } => *enabled,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            PluginSpec::Log { name, .. } => name,
            PluginSpec::PageLimit { name, .. } => name,
            PluginSpec::RandomWait { name, .. } => name,
            PluginSpec::Retry { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
}

/// Default plugin set, matching the originating implementation's
/// `default_plugin_config.py` ordering (Log, PageLimit, RandomWait, Retry).
pub fn default_plugin_specs() -> Vec<PluginSpec> {
    vec![
        PluginSpec::Log {
            name: "log".into(),
            enabled: true,
            level: LogLevel::Info,
        },
        PluginSpec::PageLimit {
            name: "page_limit".into(),
            enabled: true,
            max_pages: 5,
        },
        PluginSpec::RandomWait {
            name: "random_wait".into(),
            enabled: true,
            min_wait_ms: 500,
            mid_wait_ms: 2000,
            max_wait_ms: 5000,
            long_interval: 20,
            mid_interval: 5,
            base_long_prob: 0.05,
            base_mid_prob: 0.15,
            growth: 0.02,
        },
        PluginSpec::Retry {
            name: "retry".into(),
            enabled: true,
            attempts: 3,
            delay_ms: 1000,
            notify_on_error: true,
        },
    ]
}

#[async_trait]
pub trait PluginConfigStore: Send + Sync {
    async fn load_plugins(&self, tenant_id: u64, profile_id: u64) -> Vec<PluginSpec>;
}

#[async_trait]
impl<T: PluginConfigStore + ?Sized> PluginConfigStore for Arc<T> {
    async fn load_plugins(&self, tenant_id: u64, profile_id: u64) -> Vec<PluginSpec> {
        (**self).load_plugins(tenant_id, profile_id).await
    }
}

/// Reference implementation: per-profile overrides layered on top of the
/// tenant default set; falls back to `default_plugin_specs()` when nothing
/// has been configured.
pub struct InMemoryPluginConfigStore {
    overrides: RwLock<HashMap<(u64, u64), Vec<PluginSpec>>>,
}

impl Default for InMemoryPluginConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryPluginConfigStore {
    pub fn new() -> Self {
        Self {
            overrides: RwLock::new(HashMap::new()),
        }
    }

    pub async fn set(&self, tenant_id: u64, profile_id: u64, specs: Vec<PluginSpec>) {
        self.overrides
            .write()
            .await
            .insert((tenant_id, profile_id), specs);
    }
}

#[async_trait]
impl PluginConfigStore for InMemoryPluginConfigStore {
    async fn load_plugins(&self, tenant_id: u64, profile_id: u64) -> Vec<PluginSpec> {
        self.overrides
            .read()
            .await
            .get(&(tenant_id, profile_id))
            .cloned()
            .unwrap_or_else(default_plugin_specs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn falls_back_to_defaults() {
        let store = InMemoryPluginConfigStore::new();
        let specs = store.load_plugins(1, 1).await;
        assert_eq!(specs.len(), 4);
    }

    #[tokio::test]
    async fn override_replaces_default() {
        let store = InMemoryPluginConfigStore::new();
        store
            .set(
                1,
                1,
                vec![PluginSpec::Log {
                    name: "log".into(),
                    enabled: true,
                    level: LogLevel::Debug,
                }],
            )
            .await;
        let specs = store.load_plugins(1, 1).await;
        assert_eq!(specs.len(), 1);
    }
}
