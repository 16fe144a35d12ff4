// Copyright 2026 Xupopter Contributors
// SPDX-License-Identifier: Apache-2.0

//! Renderer abstraction for browser-based recipe execution.
//!
//! Defines the `Renderer` and `RenderContext` traits that abstract over
//! the browser engine (Chromium via chromiumoxide, or the HTTP-only
//! snapshot renderer when no browser is installed).

pub mod chromium;
pub mod lifecycle;
pub mod snapshot;

#[cfg(test)]
pub(crate) mod scripted;

use crate::recipe::Property;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Selector matching embedded structured data (JSON-LD) elements.
pub const JSON_LD_SELECTOR: &str = r#"script[type="application/ld+json"]"#;

/// Result of navigating to a URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationResult {
    /// The final URL after any redirects.
    pub final_url: String,
    /// HTTP status code of the main document.
    pub status: u16,
    /// Time taken to load the page in milliseconds.
    pub load_time_ms: u64,
}

/// A browser engine that can create rendering contexts.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Create a new browser context (tab).
    async fn new_context(&self) -> Result<Box<dyn RenderContext>>;
    /// Shut down the browser engine.
    async fn shutdown(&self) -> Result<()>;
    /// Number of currently active contexts.
    fn active_contexts(&self) -> usize;
}

/// A single browser context (tab) a recipe runs against.
#[async_trait]
pub trait RenderContext: Send + Sync {
    /// Navigate to a URL with a timeout.
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult>;
    /// Click the first element matching `selector`.
    async fn click(&mut self, selector: &str) -> Result<()>;
    /// Type literal text into the first element matching `selector`.
    async fn type_text(&mut self, selector: &str, text: &str) -> Result<()>;
    /// Capture a full-page JPEG screenshot to `path`.
    async fn screenshot(&self, path: &Path) -> Result<()>;
    /// Get the full page HTML.
    async fn content(&self) -> Result<String>;
    /// Wait until `selector` matches at least one element.
    ///
    /// Returns `Ok(false)` when the wait timed out, which callers treat as a
    /// recoverable condition rather than an error.
    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<bool>;
    /// Read `property` from every element matching `selector`, in document order.
    async fn query_property(
        &self,
        selector: &str,
        property: &Property,
    ) -> Result<Vec<serde_json::Value>>;
    /// Raw text of every JSON-LD element on the page.
    async fn json_ld(&self) -> Result<Vec<String>>;
    /// Close this context.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Launches a fresh browser engine on demand.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Arc<dyn Renderer>>;
}

/// Build the in-page script reading `property` from every match of `selector`.
///
/// Arguments are embedded as JSON string literals so arbitrary selectors
/// cannot break out of the script.
pub(crate) fn property_script(selector: &str, property: &Property) -> String {
    let sel = serde_json::Value::String(selector.to_string());
    let prop = serde_json::Value::String(property.as_str().to_string());
    format!(
        "Array.from(document.querySelectorAll({sel})).map((el) => {{ \
             const prop = {prop}; \
             let val; \
             if (prop === 'text') {{ val = el.innerText; }} \
             else if (prop === 'html') {{ val = el.innerHTML; }} \
             else {{ val = el[prop]; if (val === undefined) {{ val = el.getAttribute(prop); }} }} \
             return val === undefined ? null : val; \
         }})"
    )
}
