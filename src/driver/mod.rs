//! `BrowserDriver`: the abstract external collaborator that actually drives a
//! browser. The core never depends on a concrete engine directly — it calls
//! through this trait, following the async-trait-plus-`Arc`-blanket-impl shape
//! the rest of the external collaborators in this crate use.

mod chromiumoxide_driver;
mod mock;

pub use chromiumoxide_driver::ChromiumoxideDriver;
pub use mock::MockBrowserDriver;

use crate::errors::DriverError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct FingerprintDescriptor {
    pub platform: String,
    pub browser_family: String,
    pub viewport: Viewport,
    pub locale: String,
    pub timezone: String,
    pub proxy: Option<String>,
    /// Opaque payload consumed verbatim by the driver; the core never reads it.
    pub opaque: serde_json::Value,
}

/// Handle to a single open page/tab within a session's browser context.
#[async_trait]
pub trait Page: Send + Sync {
    async fn goto(&self, url: &str) -> Result<(), DriverError>;
    async fn click(&self, x: f64, y: f64) -> Result<(), DriverError>;
    async fn fill(&self, selector: &str, text: &str) -> Result<(), DriverError>;
    async fn hover(&self, selector: &str) -> Result<(), DriverError>;
    async fn press(&self, key: &str) -> Result<(), DriverError>;
    async fn evaluate(&self, code: &str) -> Result<serde_json::Value, DriverError>;
    /// `size`, when given, requests a downscaled capture at that pixel size
    /// instead of the page's native viewport resolution.
    async fn screenshot(&self, quality: u8, size: Option<(u32, u32)>) -> Result<Vec<u8>, DriverError>;
    async fn viewport(&self) -> Viewport;
    /// Stable identity within the owning context's page list, oldest-first.
    fn id(&self) -> &str;
    async fn close(&self) -> Result<(), DriverError>;
    fn is_closed(&self) -> bool;
}

/// An open browser context bound to one fingerprint.
#[async_trait]
pub trait BrowserHandle: Send + Sync {
    /// All currently open pages, oldest first (insertion order).
    async fn pages(&self) -> Vec<Arc<dyn Page>>;
    /// The currently focused/active page, creating one if none exists.
    async fn active_page(&self) -> Result<Arc<dyn Page>, DriverError>;
    async fn close(&self) -> Result<(), DriverError>;
}

#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn open(
        &self,
        fingerprint: &FingerprintDescriptor,
        headless: bool,
    ) -> Result<Arc<dyn BrowserHandle>, DriverError>;
}

#[async_trait]
impl<T: BrowserDriver + ?Sized> BrowserDriver for Arc<T> {
    async fn open(
        &self,
        fingerprint: &FingerprintDescriptor,
        headless: bool,
    ) -> Result<Arc<dyn BrowserHandle>, DriverError> {
        (**self).open(fingerprint, headless).await
    }
}

pub(crate) fn default_timeout() -> Duration {
    Duration::from_secs(15)
}
