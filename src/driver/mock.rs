//! In-memory reference `BrowserDriver`.
//!
//! Lets the whole pool/dispatcher/sweeper/webrtc stack run and be tested
//! without a real browser binary. Pages preserve insertion order so
//! `PageLimit`'s "close the oldest page" has a well-defined target, matching
//! the resolved open question in SPEC_FULL.md §9.

use super::{BrowserDriver, BrowserHandle, FingerprintDescriptor, Page, Viewport};
use crate::errors::DriverError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

pub struct MockBrowserDriver;

#[async_trait]
impl BrowserDriver for MockBrowserDriver {
    async fn open(
        &self,
        fingerprint: &FingerprintDescriptor,
        _headless: bool,
    ) -> Result<Arc<dyn BrowserHandle>, DriverError> {
        let handle = MockHandle {
            viewport: fingerprint.viewport.clone(),
            pages: RwLock::new(Vec::new()),
            next_id: std::sync::atomic::AtomicU64::new(0),
        };
        Ok(Arc::new(handle))
    }
}

struct MockHandle {
    viewport: Viewport,
    pages: RwLock<Vec<Arc<MockPage>>>,
    next_id: std::sync::atomic::AtomicU64,
}

#[async_trait]
impl BrowserHandle for MockHandle {
    async fn pages(&self) -> Vec<Arc<dyn Page>> {
        self.pages
            .read()
            .await
            .iter()
            .filter(|p| !p.is_closed())
            .map(|p| p.clone() as Arc<dyn Page>)
            .collect()
    }

    async fn active_page(&self) -> Result<Arc<dyn Page>, DriverError> {
        {
            let pages = self.pages.read().await;
            if let Some(p) = pages.iter().rev().find(|p| !p.is_closed()) {
                return Ok(p.clone() as Arc<dyn Page>);
            }
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let page = Arc::new(MockPage {
            id: format!("page-{id}"),
            url: RwLock::new(String::from("about:blank")),
            viewport: self.viewport.clone(),
            closed: AtomicBool::new(false),
        });
        self.pages.write().await.push(page.clone());
        Ok(page)
    }

    async fn close(&self) -> Result<(), DriverError> {
        for page in self.pages.read().await.iter() {
            let _ = page.close().await;
        }
        Ok(())
    }
}

struct MockPage {
    id: String,
    url: RwLock<String>,
    viewport: Viewport,
    closed: AtomicBool,
}

#[async_trait]
impl Page for MockPage {
    async fn goto(&self, url: &str) -> Result<(), DriverError> {
        if self.is_closed() {
            return Err(DriverError::PageClosed(self.id.clone()));
        }
        *self.url.write().await = url.to_string();
        Ok(())
    }

    async fn click(&self, _x: f64, _y: f64) -> Result<(), DriverError> {
        if self.is_closed() {
            return Err(DriverError::PageClosed(self.id.clone()));
        }
        Ok(())
    }

    async fn fill(&self, _selector: &str, _text: &str) -> Result<(), DriverError> {
        if self.is_closed() {
            return Err(DriverError::PageClosed(self.id.clone()));
        }
        Ok(())
    }

    async fn hover(&self, _selector: &str) -> Result<(), DriverError> {
        if self.is_closed() {
            return Err(DriverError::PageClosed(self.id.clone()));
        }
        Ok(())
    }

    async fn press(&self, _key: &str) -> Result<(), DriverError> {
        if self.is_closed() {
            return Err(DriverError::PageClosed(self.id.clone()));
        }
        Ok(())
    }

    async fn evaluate(&self, code: &str) -> Result<serde_json::Value, DriverError> {
        if self.is_closed() {
            return Err(DriverError::PageClosed(self.id.clone()));
        }
        Ok(serde_json::json!({ "evaluated": code }))
    }

    async fn screenshot(&self, _quality: u8, _size: Option<(u32, u32)>) -> Result<Vec<u8>, DriverError> {
        if self.is_closed() {
            return Err(DriverError::PageClosed(self.id.clone()));
        }
        // JPEG magic bytes followed by a nonce so tests can tell frames apart.
        let mut bytes = vec![0xFF, 0xD8, 0xFF];
        bytes.extend_from_slice(self.id.as_bytes());
        Ok(bytes)
    }

    async fn viewport(&self) -> Viewport {
        self.viewport.clone()
    }

    fn id(&self) -> &str {
        &self.id
    }

    async fn close(&self) -> Result<(), DriverError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> FingerprintDescriptor {
        FingerprintDescriptor {
            platform: "linux".into(),
            browser_family: "chromium".into(),
            viewport: Viewport { width: 1280, height: 720 },
            locale: "en-US".into(),
            timezone: "UTC".into(),
            proxy: None,
            opaque: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn active_page_creates_on_first_call() {
        let driver = MockBrowserDriver;
        let handle = driver.open(&descriptor(), true).await.unwrap();
        assert!(handle.pages().await.is_empty());
        let page = handle.active_page().await.unwrap();
        page.goto("https://example.com").await.unwrap();
        assert_eq!(handle.pages().await.len(), 1);
        assert_eq!(page.id(), "page-0");
    }

    #[tokio::test]
    async fn closed_page_rejects_operations() {
        let driver = MockBrowserDriver;
        let handle = driver.open(&descriptor(), true).await.unwrap();
        let page = handle.active_page().await.unwrap();
        page.close().await.unwrap();
        assert!(page.click(0.0, 0.0).await.is_err());
    }

    #[tokio::test]
    async fn pages_preserve_insertion_order() {
        let driver = MockBrowserDriver;
        let handle = driver.open(&descriptor(), true).await.unwrap();
        // active_page reuses the most recent open page, so force two distinct
        // pages by closing between calls.
        let p0 = handle.active_page().await.unwrap();
        p0.close().await.unwrap();
        let p1 = handle.active_page().await.unwrap();
        assert_eq!(p1.id(), "page-1");
    }
}
