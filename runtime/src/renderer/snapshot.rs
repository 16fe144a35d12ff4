// Copyright 2026 Xupopter Contributors
// SPDX-License-Identifier: Apache-2.0

//! HTTP-only renderer used when Chromium is unavailable.
//!
//! Pages are fetched with the plain HTTP client and queried with `scraper`.
//! Non-interactive recipes (navigate, extract, jsonschema, save-html) work;
//! click, input and screenshot blocks fail and abort the run.
//!
//! `scraper`'s types are `!Send`, so every DOM walk happens inside a
//! synchronous helper and never lives across an await point.

use super::{BrowserLauncher, NavigationResult, RenderContext, Renderer, JSON_LD_SELECTOR};
use crate::acquisition::http_client::HttpClient;
use crate::recipe::Property;
use anyhow::{bail, Result};
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Launches [`SnapshotRenderer`]s.
pub struct SnapshotLauncher {
    client: HttpClient,
}

impl SnapshotLauncher {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BrowserLauncher for SnapshotLauncher {
    async fn launch(&self) -> Result<Arc<dyn Renderer>> {
        tracing::info!("using HTTP-only snapshot renderer");
        Ok(Arc::new(SnapshotRenderer::new(self.client.clone())))
    }
}

/// Renderer that serves static HTML snapshots.
pub struct SnapshotRenderer {
    client: HttpClient,
    active_count: Arc<AtomicUsize>,
}

impl SnapshotRenderer {
    pub fn new(client: HttpClient) -> Self {
        Self {
            client,
            active_count: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl Renderer for SnapshotRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        self.active_count.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(SnapshotContext {
            client: self.client.clone(),
            html: None,
            active_count: Arc::clone(&self.active_count),
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    fn active_contexts(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }
}

/// A page context holding the last fetched document.
pub struct SnapshotContext {
    client: HttpClient,
    html: Option<String>,
    active_count: Arc<AtomicUsize>,
}

impl SnapshotContext {
    fn document(&self) -> Result<&str> {
        match self.html.as_deref() {
            Some(html) => Ok(html),
            None => bail!("no page loaded"),
        }
    }
}

#[async_trait]
impl RenderContext for SnapshotContext {
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult> {
        let start = Instant::now();
        let resp = match tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            self.client.get(url),
        )
        .await
        {
            Ok(resp) => resp?,
            Err(_) => bail!("navigation to {url} timed out after {timeout_ms}ms"),
        };

        self.html = Some(resp.text());
        Ok(NavigationResult {
            final_url: resp.final_url,
            status: resp.status,
            load_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn click(&mut self, selector: &str) -> Result<()> {
        bail!("cannot click {selector}: interactive actions need a browser")
    }

    async fn type_text(&mut self, selector: &str, _text: &str) -> Result<()> {
        bail!("cannot type into {selector}: interactive actions need a browser")
    }

    async fn screenshot(&self, _path: &Path) -> Result<()> {
        bail!("screenshots need a browser")
    }

    async fn content(&self) -> Result<String> {
        Ok(self.document()?.to_string())
    }

    async fn wait_for_selector(&self, selector: &str, _timeout: Duration) -> Result<bool> {
        // A static document never changes, so one check is final.
        Ok(!select_property(self.document()?, selector, &Property::Html)?.is_empty())
    }

    async fn query_property(&self, selector: &str, property: &Property) -> Result<Vec<Value>> {
        select_property(self.document()?, selector, property)
    }

    async fn json_ld(&self) -> Result<Vec<String>> {
        let values = select_property(self.document()?, JSON_LD_SELECTOR, &Property::Html)?;
        Ok(values
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.active_count.fetch_sub(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Read `property` from every element of `html` matching `selector`.
pub fn select_property(html: &str, selector: &str, property: &Property) -> Result<Vec<Value>> {
    let sel = match Selector::parse(selector) {
        Ok(sel) => sel,
        Err(e) => bail!("invalid selector {selector}: {e:?}"),
    };
    let document = Html::parse_document(html);

    Ok(document
        .select(&sel)
        .map(|el| match property {
            Property::Text => Value::String(element_text(&el)),
            Property::Html => Value::String(el.inner_html()),
            Property::Attribute(name) => el
                .value()
                .attr(name)
                .map(|v| Value::String(v.to_string()))
                .unwrap_or(Value::Null),
        })
        .collect())
}

/// Visible text content of an element, trimmed and whitespace-collapsed.
fn element_text(el: &ElementRef<'_>) -> String {
    el.text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
