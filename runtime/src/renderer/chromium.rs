// Copyright 2026 Xupopter Contributors
// SPDX-License-Identifier: Apache-2.0

//! Chromium-based renderer using chromiumoxide.

use super::{
    property_script, BrowserLauncher, NavigationResult, RenderContext, Renderer, JSON_LD_SELECTOR,
};
use crate::recipe::Property;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Polling interval while waiting for a selector to appear.
const SELECTOR_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Reads the main document's HTTP status from the Navigation Timing API.
const STATUS_SCRIPT: &str = "(() => { \
    const nav = performance.getEntriesByType('navigation')[0]; \
    return nav && nav.responseStatus ? nav.responseStatus : 0; \
})()";

/// Find the Chromium binary path.
pub fn find_chromium(explicit: Option<&Path>) -> Option<PathBuf> {
    // 1. Configured path
    if let Some(path) = explicit {
        if path.exists() {
            return Some(path.to_path_buf());
        }
    }

    // 2. ~/.xupopter/chromium/
    if let Some(home) = dirs::home_dir() {
        let candidates = if cfg!(target_os = "macos") {
            vec![
                home.join(".xupopter/chromium/chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".xupopter/chromium/chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".xupopter/chromium/chrome"),
            ]
        } else {
            vec![
                home.join(".xupopter/chromium/chrome-linux64/chrome"),
                home.join(".xupopter/chromium/chrome"),
            ]
        };
        for c in candidates {
            if c.exists() {
                return Some(c);
            }
        }
    }

    // 3. System PATH
    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 4. Common macOS location
    if cfg!(target_os = "macos") {
        let common =
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Launches headless Chromium instances for the browser manager.
pub struct ChromiumLauncher {
    executable: PathBuf,
    user_data_dir: Option<PathBuf>,
}

impl ChromiumLauncher {
    pub fn new(executable: PathBuf) -> Self {
        Self {
            executable,
            user_data_dir: None,
        }
    }

    /// Persist the browser profile under `dir` instead of a throwaway one.
    pub fn with_user_data_dir(mut self, dir: PathBuf) -> Self {
        self.user_data_dir = Some(dir);
        self
    }
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self) -> Result<Arc<dyn Renderer>> {
        let renderer =
            ChromiumRenderer::launch(&self.executable, self.user_data_dir.as_deref()).await?;
        Ok(Arc::new(renderer))
    }
}

/// Chromium-based renderer.
pub struct ChromiumRenderer {
    browser: Mutex<Browser>,
    handler: JoinHandle<()>,
    active_count: Arc<AtomicUsize>,
}

impl ChromiumRenderer {
    /// Launch a headless Chromium instance.
    pub async fn launch(executable: &Path, user_data_dir: Option<&Path>) -> Result<Self> {
        let mut builder = BrowserConfig::builder()
            .chrome_executable(executable)
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--ignore-certificate-errors");
        if let Some(dir) = user_data_dir {
            builder = builder.user_data_dir(dir);
        }
        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        // Drive the CDP connection until the browser goes away
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        tracing::info!("launched Chromium from {}", executable.display());

        Ok(Self {
            browser: Mutex::new(browser),
            handler,
            active_count: Arc::new(AtomicUsize::new(0)),
        })
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        let page = self
            .browser
            .lock()
            .await
            .new_page("about:blank")
            .await
            .context("failed to create new page")?;

        self.active_count.fetch_add(1, Ordering::Relaxed);

        Ok(Box::new(ChromiumContext {
            page,
            active_count: Arc::clone(&self.active_count),
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        let mut browser = self.browser.lock().await;
        if let Err(e) = browser.close().await {
            tracing::warn!("Chromium did not close cleanly: {e}");
        }
        let _ = browser.wait().await;
        self.handler.abort();
        Ok(())
    }

    fn active_contexts(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }
}

/// A single Chromium page context.
pub struct ChromiumContext {
    page: Page,
    active_count: Arc<AtomicUsize>,
}

#[async_trait]
impl RenderContext for ChromiumContext {
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult> {
        let start = Instant::now();

        let result =
            tokio::time::timeout(Duration::from_millis(timeout_ms), self.page.goto(url)).await;

        let load_time_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(_)) => {
                let status: u16 = self
                    .page
                    .evaluate(STATUS_SCRIPT)
                    .await
                    .ok()
                    .and_then(|r| r.into_value().ok())
                    .unwrap_or(0);

                let final_url = self
                    .page
                    .url()
                    .await
                    .unwrap_or_default()
                    .map(|u| u.to_string())
                    .unwrap_or_else(|| url.to_string());

                Ok(NavigationResult {
                    final_url,
                    // Unknown status (e.g. data: URLs) counts as success
                    status: if status == 0 { 200 } else { status },
                    load_time_ms,
                })
            }
            Ok(Err(e)) => bail!("navigation to {url} failed: {e}"),
            Err(_) => bail!("navigation to {url} timed out after {timeout_ms}ms"),
        }
    }

    async fn click(&mut self, selector: &str) -> Result<()> {
        let element = self
            .page
            .find_element(selector)
            .await
            .with_context(|| format!("no element matches {selector}"))?;
        element
            .click()
            .await
            .with_context(|| format!("failed to click {selector}"))?;
        Ok(())
    }

    async fn type_text(&mut self, selector: &str, text: &str) -> Result<()> {
        let element = self
            .page
            .find_element(selector)
            .await
            .with_context(|| format!("no element matches {selector}"))?;
        element
            .click()
            .await
            .with_context(|| format!("failed to focus {selector}"))?;
        element
            .type_str(text)
            .await
            .with_context(|| format!("failed to type into {selector}"))?;
        Ok(())
    }

    async fn screenshot(&self, path: &Path) -> Result<()> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Jpeg)
            .full_page(true)
            .build();
        self.page
            .save_screenshot(params, path)
            .await
            .with_context(|| format!("failed to save screenshot to {}", path.display()))?;
        Ok(())
    }

    async fn content(&self) -> Result<String> {
        self.page.content().await.context("failed to get HTML")
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<bool> {
        let script = format!(
            "document.querySelector({}) !== null",
            serde_json::Value::String(selector.to_string())
        );
        let deadline = Instant::now() + timeout;

        loop {
            let found: bool = self
                .page
                .evaluate(script.as_str())
                .await
                .context("selector check failed")?
                .into_value()
                .map_err(|e| anyhow::anyhow!("failed to convert selector check: {e:?}"))?;
            if found {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(SELECTOR_POLL_INTERVAL).await;
        }
    }

    async fn query_property(
        &self,
        selector: &str,
        property: &Property,
    ) -> Result<Vec<serde_json::Value>> {
        let result = self
            .page
            .evaluate(property_script(selector, property))
            .await
            .with_context(|| format!("failed to read {} from {selector}", property.as_str()))?;

        result
            .into_value()
            .map_err(|e| anyhow::anyhow!("failed to convert extracted values: {e:?}"))
    }

    async fn json_ld(&self) -> Result<Vec<String>> {
        let script = format!(
            "Array.from(document.querySelectorAll({})).map((el) => el.textContent || '')",
            serde_json::Value::String(JSON_LD_SELECTOR.to_string())
        );
        let result = self
            .page
            .evaluate(script)
            .await
            .context("failed to read structured data")?;

        result
            .into_value()
            .map_err(|e| anyhow::anyhow!("failed to convert structured data: {e:?}"))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.active_count.fetch_sub(1, Ordering::Relaxed);
        self.page.close().await.context("failed to close page")?;
        Ok(())
    }
}
