//! Concrete `BrowserDriver` backed by `chromiumoxide`, the real-browser
//! adapter behind the trait seam. Mirrors the CDP call shapes the teacher's
//! `tools/browser/tools.rs` uses (`goto`, `evaluate`, `ScreenshotParams`).

use super::{BrowserDriver, BrowserHandle, FingerprintDescriptor, Page, Viewport};
use crate::errors::DriverError;
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::page::{CaptureScreenshotFormat, Viewport as CdpViewport};
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser, BrowserConfig};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::RwLock;

pub struct ChromiumoxideDriver;

#[async_trait]
impl BrowserDriver for ChromiumoxideDriver {
    async fn open(
        &self,
        fingerprint: &FingerprintDescriptor,
        headless: bool,
    ) -> Result<Arc<dyn BrowserHandle>, DriverError> {
        let mut builder = BrowserConfig::builder()
            .window_size(
                fingerprint.viewport.width as u32,
                fingerprint.viewport.height as u32,
            )
            .user_agent(fingerprint.browser_family.clone());

        if !headless {
            builder = builder.with_head();
        }
        if let Some(proxy) = &fingerprint.proxy {
            builder = builder.arg(format!("--proxy-server={proxy}"));
        }

        let config = builder
            .build()
            .map_err(|e| DriverError::OpenFailed(e.to_string()))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| DriverError::OpenFailed(e.to_string()))?;

        // The CDP event loop must be polled continuously or the browser
        // connection stalls; spawn it detached for the handle's lifetime.
        tokio::spawn(async move { while handler.next().await.is_some() {} });

        Ok(Arc::new(ChromiumoxideHandle {
            browser,
            viewport: fingerprint.viewport.clone(),
            pages: RwLock::new(Vec::new()),
        }))
    }
}

struct ChromiumoxideHandle {
    browser: Browser,
    viewport: Viewport,
    pages: RwLock<Vec<Arc<ChromiumoxidePage>>>,
}

#[async_trait]
impl BrowserHandle for ChromiumoxideHandle {
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
        let inner = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| DriverError::OpenFailed(e.to_string()))?;
        let id = inner.target_id().to_string();
        let page = Arc::new(ChromiumoxidePage {
            inner,
            id,
            viewport: self.viewport.clone(),
            closed: std::sync::atomic::AtomicBool::new(false),
        });
        self.pages.write().await.push(page.clone());
        Ok(page)
    }

    async fn close(&self) -> Result<(), DriverError> {
        for page in self.pages.read().await.iter() {
            let _ = page.close().await;
        }
        self.browser
            .clone()
            .close()
            .await
            .map_err(|e| DriverError::OpenFailed(e.to_string()))?;
        Ok(())
    }
}

struct ChromiumoxidePage {
    inner: chromiumoxide::Page,
    id: String,
    viewport: Viewport,
    closed: std::sync::atomic::AtomicBool,
}

#[async_trait]
impl Page for ChromiumoxidePage {
    async fn goto(&self, url: &str) -> Result<(), DriverError> {
        self.inner
            .goto(url)
            .await
            .map_err(|e| DriverError::classify(e.to_string()))?;
        Ok(())
    }

    async fn click(&self, x: f64, y: f64) -> Result<(), DriverError> {
        self.inner
            .evaluate(format!(
                "document.elementFromPoint({x},{y})?.dispatchEvent(new MouseEvent('click', {{bubbles:true}}))"
            ))
            .await
            .map_err(|e| DriverError::classify(e.to_string()))?;
        Ok(())
    }

    async fn fill(&self, selector: &str, text: &str) -> Result<(), DriverError> {
        let elem = self
            .inner
            .find_element(selector)
            .await
            .map_err(|e| DriverError::classify(e.to_string()))?;
        elem.click()
            .await
            .map_err(|e| DriverError::classify(e.to_string()))?;
        elem.type_str(text)
            .await
            .map_err(|e| DriverError::classify(e.to_string()))?;
        Ok(())
    }

    async fn hover(&self, selector: &str) -> Result<(), DriverError> {
        let elem = self
            .inner
            .find_element(selector)
            .await
            .map_err(|e| DriverError::classify(e.to_string()))?;
        elem.hover()
            .await
            .map_err(|e| DriverError::classify(e.to_string()))?;
        Ok(())
    }

    async fn press(&self, key: &str) -> Result<(), DriverError> {
        self.inner
            .keyboard()
            .press_key(key)
            .await
            .map_err(|e| DriverError::classify(e.to_string()))?;
        Ok(())
    }

    async fn evaluate(&self, code: &str) -> Result<serde_json::Value, DriverError> {
        let result = self
            .inner
            .evaluate(code)
            .await
            .map_err(|e| DriverError::classify(e.to_string()))?;
        result
            .into_value()
            .map_err(|e| DriverError::EvaluationFailed(e.to_string()))
    }

    async fn screenshot(&self, quality: u8, size: Option<(u32, u32)>) -> Result<Vec<u8>, DriverError> {
        let mut builder = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Jpeg)
            .quality(quality as i64);

        if let Some((width, height)) = size {
            if width != self.viewport.width || height != self.viewport.height {
                let scale = width as f64 / self.viewport.width as f64;
                builder = builder.clip(CdpViewport {
                    x: 0.0,
                    y: 0.0,
                    width: self.viewport.width as f64,
                    height: self.viewport.height as f64,
                    scale,
                });
            }
        }

        let params = builder.build();
        self.inner
            .screenshot(params)
            .await
            .map_err(|e| DriverError::ScreenshotFailed(e.to_string()))
    }

    async fn viewport(&self) -> Viewport {
        self.viewport.clone()
    }

    fn id(&self) -> &str {
        &self.id
    }

    async fn close(&self) -> Result<(), DriverError> {
        self.closed
            .store(true, std::sync::atomic::Ordering::SeqCst);
        self.inner
            .close()
            .await
            .map_err(|e| DriverError::classify(e.to_string()))?;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(std::sync::atomic::Ordering::SeqCst)
    }
}
