//! Out-of-scope external collaborators, given in-memory reference
//! implementations so the crate builds, runs, and tests standalone
//! (SPEC_FULL.md §4.11). Production deployments swap these for real stores;
//! the seam is the trait, not the struct.

mod fingerprint_store;
mod notification;
mod plugin_config_store;

pub use fingerprint_store::{default_descriptor, FingerprintProfile, FingerprintStore, InMemoryFingerprintStore};
pub use notification::{InMemoryNotificationDispatcher, NotificationDispatcher};
pub use plugin_config_store::{InMemoryPluginConfigStore, PluginConfigStore, PluginSpec};
