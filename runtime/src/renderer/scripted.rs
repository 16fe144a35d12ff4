// Copyright 2026 Xupopter Contributors
// SPDX-License-Identifier: Apache-2.0

//! In-memory renderer serving scripted pages, for tests.

use super::lifecycle::BrowserManager;
use super::{BrowserLauncher, NavigationResult, RenderContext, Renderer};
use crate::acquisition::cache::RetrievalCache;
use crate::acquisition::http_client::HttpClient;
use crate::crawler::artifacts::ArtifactStore;
use crate::crawler::{Engine, EngineSettings};
use crate::recipe::Property;
use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One scripted page.
#[derive(Debug, Clone)]
pub(crate) struct ScriptedPage {
    status: u16,
    html: String,
    /// selector -> elements, each element a map of property -> value
    elements: HashMap<String, Vec<Map<String, Value>>>,
    /// selector -> URL the click leads to
    links: HashMap<String, String>,
    json_ld: Vec<String>,
}

impl ScriptedPage {
    pub fn new(html: &str) -> Self {
        Self {
            status: 200,
            html: html.to_string(),
            elements: HashMap::new(),
            links: HashMap::new(),
            json_ld: Vec::new(),
        }
    }

    pub fn status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Elements whose `text` property is each given string.
    pub fn texts(self, selector: &str, texts: &[&str]) -> Self {
        let elements = texts
            .iter()
            .map(|t| {
                let mut el = Map::new();
                el.insert("text".into(), Value::String(t.to_string()));
                el
            })
            .collect();
        self.elements(selector, elements)
    }

    pub fn elements(mut self, selector: &str, elements: Vec<Map<String, Value>>) -> Self {
        self.elements.insert(selector.to_string(), elements);
        self
    }

    pub fn link(mut self, selector: &str, url: &str) -> Self {
        self.links.insert(selector.to_string(), url.to_string());
        self
    }

    pub fn json_ld(mut self, raw: &str) -> Self {
        self.json_ld.push(raw.to_string());
        self
    }
}

#[derive(Default)]
struct ScriptState {
    log: Vec<String>,
    active: usize,
    max_active: usize,
    shutdowns: usize,
}

/// Renderer whose pages are declared up front.
pub(crate) struct ScriptedRenderer {
    pages: Arc<HashMap<String, ScriptedPage>>,
    state: Arc<Mutex<ScriptState>>,
    delay: Duration,
}

impl ScriptedRenderer {
    pub fn new() -> Self {
        Self {
            pages: Arc::new(HashMap::new()),
            state: Arc::new(Mutex::new(ScriptState::default())),
            delay: Duration::ZERO,
        }
    }

    pub fn page(mut self, url: &str, page: ScriptedPage) -> Self {
        Arc::make_mut(&mut self.pages).insert(url.to_string(), page);
        self
    }

    /// Make every navigation take `delay`.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Every action performed so far, e.g. `navigate https://a.test`.
    pub fn log(&self) -> Vec<String> {
        self.state.lock().unwrap().log.clone()
    }

    pub fn max_active(&self) -> usize {
        self.state.lock().unwrap().max_active
    }

    pub fn active(&self) -> usize {
        self.state.lock().unwrap().active
    }

    pub fn shutdowns(&self) -> usize {
        self.state.lock().unwrap().shutdowns
    }
}

#[async_trait]
impl Renderer for ScriptedRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        let mut state = self.state.lock().unwrap();
        state.active += 1;
        state.max_active = state.max_active.max(state.active);
        Ok(Box::new(ScriptedContext {
            pages: Arc::clone(&self.pages),
            state: Arc::clone(&self.state),
            delay: self.delay,
            current: None,
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        self.state.lock().unwrap().shutdowns += 1;
        Ok(())
    }

    fn active_contexts(&self) -> usize {
        self.active()
    }
}

struct ScriptedContext {
    pages: Arc<HashMap<String, ScriptedPage>>,
    state: Arc<Mutex<ScriptState>>,
    delay: Duration,
    current: Option<String>,
}

impl ScriptedContext {
    fn record(&self, entry: String) {
        self.state.lock().unwrap().log.push(entry);
    }

    fn page(&self) -> Result<&ScriptedPage> {
        match self.current.as_ref().and_then(|url| self.pages.get(url)) {
            Some(page) => Ok(page),
            None => bail!("no page loaded"),
        }
    }

    fn open(&mut self, url: &str) -> Result<u16> {
        let Some(page) = self.pages.get(url) else {
            bail!("net::ERR_NAME_NOT_RESOLVED at {url}");
        };
        self.current = Some(url.to_string());
        Ok(page.status)
    }
}

#[async_trait]
impl RenderContext for ScriptedContext {
    async fn navigate(&mut self, url: &str, _timeout_ms: u64) -> Result<NavigationResult> {
        self.record(format!("navigate {url}"));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let status = self.open(url)?;
        Ok(NavigationResult {
            final_url: url.to_string(),
            status,
            load_time_ms: self.delay.as_millis() as u64,
        })
    }

    async fn click(&mut self, selector: &str) -> Result<()> {
        self.record(format!("click {selector}"));
        let target = self.page()?.links.get(selector).cloned();
        match target {
            Some(url) => self.open(&url).map(|_| ()),
            None => bail!("no element matches {selector}"),
        }
    }

    async fn type_text(&mut self, selector: &str, text: &str) -> Result<()> {
        self.page()?;
        self.record(format!("type {selector} {text}"));
        Ok(())
    }

    async fn screenshot(&self, path: &Path) -> Result<()> {
        self.page()?;
        self.record(format!("screenshot {}", path.display()));
        std::fs::write(path, b"\xff\xd8\xff")?;
        Ok(())
    }

    async fn content(&self) -> Result<String> {
        Ok(self.page()?.html.clone())
    }

    async fn wait_for_selector(&self, selector: &str, _timeout: Duration) -> Result<bool> {
        let page = self.page()?;
        let found = if selector == super::JSON_LD_SELECTOR {
            !page.json_ld.is_empty()
        } else {
            page.links.contains_key(selector)
                || page.elements.get(selector).is_some_and(|els| !els.is_empty())
        };
        Ok(found)
    }

    async fn query_property(&self, selector: &str, property: &Property) -> Result<Vec<Value>> {
        let page = self.page()?;
        Ok(page
            .elements
            .get(selector)
            .map(|els| {
                els.iter()
                    .map(|el| el.get(property.as_str()).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn json_ld(&self) -> Result<Vec<String>> {
        Ok(self.page()?.json_ld.clone())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.active -= 1;
        state.log.push("close".to_string());
        Ok(())
    }
}

/// Launcher handing out the same scripted renderer on every launch.
pub(crate) struct ScriptedLauncher {
    renderer: Arc<ScriptedRenderer>,
    launches: AtomicUsize,
}

impl ScriptedLauncher {
    pub fn new(renderer: ScriptedRenderer) -> Self {
        Self {
            renderer: Arc::new(renderer),
            launches: AtomicUsize::new(0),
        }
    }

    pub fn renderer(&self) -> &Arc<ScriptedRenderer> {
        &self.renderer
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserLauncher for ScriptedLauncher {
    async fn launch(&self) -> Result<Arc<dyn Renderer>> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        let renderer: Arc<dyn Renderer> = self.renderer.clone();
        Ok(renderer)
    }
}

/// Engine over `renderer` with short timeouts, writing under `dir`.
pub(crate) fn scripted_engine(
    renderer: ScriptedRenderer,
    dir: &Path,
) -> (Arc<Engine>, Arc<ScriptedLauncher>) {
    let launcher = Arc::new(ScriptedLauncher::new(renderer));
    let browser = Arc::new(BrowserManager::new(
        launcher.clone(),
        Duration::from_secs(60),
    ));
    let cache = Arc::new(RetrievalCache::new(
        dir.join("cache"),
        HttpClient::new(5000).unwrap(),
    ));
    let engine = Engine::new(browser, cache, ArtifactStore::new(dir.join("public")))
        .with_settings(EngineSettings {
            selector_timeout: Duration::from_millis(10),
            navigation_timeout: Duration::from_secs(1),
            settle_delay: Duration::from_millis(1),
        });
    (Arc::new(engine), launcher)
}
