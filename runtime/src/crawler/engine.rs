// Copyright 2026 Xupopter Contributors
// SPDX-License-Identifier: Apache-2.0

//! Recipe interpreter.
//!
//! A recipe is executed as an instruction array with an explicit program
//! counter. `paginate` rewrites the counter to its target block; a
//! `start/file` block ends interpretation with a fan-out continuation that
//! [`Engine::run`] resolves by running one batch sub-run per listed URL.
//!
//! Failures come in three tiers:
//! - selector waits that time out, and exhausted pagination, are logged and
//!   the next block runs;
//! - any other block failure aborts the run ([`RunStatus::Aborted`]);
//! - an unresolved pagination target is a malformed recipe and surfaces as
//!   [`EngineError`].
//!
//! The page is closed after every run, whatever its outcome.

use super::artifacts::ArtifactStore;
use super::buffer::{Checkpoint, ExtractionBuffer, Record};
use crate::acquisition::cache::RetrievalCache;
use crate::recipe::{BlockAction, ExpectedOutput, Recipe, StartKind, StartSource};
use crate::renderer::lifecycle::{BrowserLease, BrowserManager};
use crate::renderer::{RenderContext, JSON_LD_SELECTOR};
use anyhow::bail;
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Timing knobs for recipe execution.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Bounded wait for `extract` / `jsonschema` targets.
    pub selector_timeout: Duration,
    /// Page load timeout for `start/url`.
    pub navigation_timeout: Duration,
    /// Pause after clicking a pagination control.
    pub settle_delay: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            selector_timeout: Duration::from_secs(30),
            navigation_timeout: Duration::from_secs(30),
            settle_delay: Duration::from_secs(5),
        }
    }
}

/// Errors that end a run without being absorbed into its report.
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("paginate block '{block}' targets unknown block '{target}'")]
    UnresolvedPaginationTarget { block: String, target: String },

    #[error("browser unavailable: {0:#}")]
    BrowserUnavailable(anyhow::Error),
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    /// The start page answered 404; nothing was produced.
    NotFound,
    Aborted(String),
}

/// Summary of one top-level run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub recipe_id: String,
    pub origin: StartKind,
    #[serde(flatten)]
    pub status: RunStatus,
    /// Records produced (batch lines for file-origin recipes).
    pub records: usize,
    /// Result document or batch stream, when one was written.
    pub artifact: Option<PathBuf>,
    pub elapsed_ms: u64,
}

/// What interpreting a recipe on one page produced.
enum Outcome {
    Finished { result: Value, records: usize },
    NotFound,
    Aborted(String),
    FanOut(String),
}

/// Status, record count and artifact of a settled run.
type Settled = (RunStatus, usize, Option<PathBuf>);

/// Executes recipes against the shared browser.
pub struct Engine {
    browser: Arc<BrowserManager>,
    cache: Arc<RetrievalCache>,
    artifacts: ArtifactStore,
    settings: EngineSettings,
}

impl Engine {
    pub fn new(
        browser: Arc<BrowserManager>,
        cache: Arc<RetrievalCache>,
        artifacts: ArtifactStore,
    ) -> Self {
        Self {
            browser,
            cache,
            artifacts,
            settings: EngineSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    /// Run a recipe to completion.
    pub async fn run(&self, recipe: &Recipe) -> Result<RunReport, EngineError> {
        let started = Instant::now();
        info!("running recipe {} ({})", recipe.name, recipe.id);

        let lease = self
            .browser
            .acquire()
            .await
            .map_err(EngineError::BrowserUnavailable)?;

        let (status, records, artifact) = match self.execute(&lease, recipe, false).await? {
            Outcome::FanOut(source) => self.fan_out(&lease, recipe, &source).await?,
            Outcome::Finished { result, records } => {
                match self.artifacts.write_result(&recipe.id, &result).await {
                    Ok(path) => (RunStatus::Completed, records, Some(path)),
                    Err(e) => {
                        error!("recipe {}: {e:#}", recipe.id);
                        (RunStatus::Aborted(format!("{e:#}")), records, None)
                    }
                }
            }
            Outcome::NotFound => (RunStatus::NotFound, 0, None),
            Outcome::Aborted(reason) => (RunStatus::Aborted(reason), 0, None),
        };

        Ok(RunReport {
            recipe_id: recipe.id.clone(),
            origin: recipe.origin(),
            status,
            records,
            artifact,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Run each URL of the list at `source` as a batch sub-run, one after another.
    async fn fan_out(
        &self,
        lease: &BrowserLease,
        recipe: &Recipe,
        source: &str,
    ) -> Result<Settled, EngineError> {
        info!("downloading URL list {source}");
        let list = match self.cache.fetch(source, true).await {
            Ok(Some(list)) => list,
            Ok(None) => {
                let reason = format!("invalid URL list location {source}");
                return Ok((RunStatus::Aborted(reason), 0, None));
            }
            Err(e) => {
                error!("recipe {}: {e:#}", recipe.id);
                return Ok((RunStatus::Aborted(format!("{e:#}")), 0, None));
            }
        };

        let mut batch = match self.artifacts.batch(&recipe.id).await {
            Ok(batch) => batch,
            Err(e) => return Ok((RunStatus::Aborted(format!("{e:#}")), 0, None)),
        };

        let urls: Vec<&str> = list
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();
        info!("recipe {}: {} URLs to crawl", recipe.id, urls.len());

        for (i, url) in urls.iter().enumerate() {
            let child = recipe.with_start_url(url);
            match self.execute(lease, &child, true).await? {
                Outcome::Finished { result, .. } => {
                    if let Err(e) = batch.append(&result).await {
                        error!("recipe {}: {e:#}", recipe.id);
                        return Ok((RunStatus::Aborted(format!("{e:#}")), batch.lines(), None));
                    }
                }
                Outcome::NotFound => info!("batch entry {i} ({url}) not found, skipped"),
                Outcome::Aborted(reason) => warn!("batch entry {i} ({url}) aborted: {reason}"),
                Outcome::FanOut(_) => warn!("batch entry {i} ({url}) tried to fan out again"),
            }
        }

        let settled = match batch.finish().await {
            Ok((path, lines)) => (RunStatus::Completed, lines, Some(path)),
            Err(e) => (RunStatus::Aborted(format!("{e:#}")), 0, None),
        };
        if let Err(e) = self.cache.evict(source).await {
            warn!("could not evict URL list {source}: {e:#}");
        }
        Ok(settled)
    }

    /// Interpret `recipe` on a fresh page and close the page afterwards.
    async fn execute(
        &self,
        lease: &BrowserLease,
        recipe: &Recipe,
        batch_entry: bool,
    ) -> Result<Outcome, EngineError> {
        let mut page = match lease.new_context().await {
            Ok(page) => page,
            Err(e) => {
                error!("recipe {}: could not open a page: {e:#}", recipe.id);
                return Ok(Outcome::Aborted(format!("{e:#}")));
            }
        };

        let result = self.interpret(page.as_mut(), recipe, batch_entry).await;

        if let Err(e) = page.close().await {
            warn!("recipe {}: failed to close page: {e:#}", recipe.id);
        }

        match result {
            Ok(outcome) => Ok(outcome),
            Err(e) => match e.downcast::<EngineError>() {
                Ok(fatal) => {
                    error!("recipe {}: {fatal}", recipe.id);
                    Err(fatal)
                }
                Err(e) => {
                    error!("crawler error in recipe {}: {e:#}", recipe.id);
                    Ok(Outcome::Aborted(format!("{e:#}")))
                }
            },
        }
    }

    async fn interpret(
        &self,
        page: &mut dyn RenderContext,
        recipe: &Recipe,
        batch_entry: bool,
    ) -> anyhow::Result<Outcome> {
        self.artifacts.prepare(&recipe.id).await?;

        let mut buffer = ExtractionBuffer::new();
        let mut page_number = 1;
        let mut pc = 0;

        while let Some(block) = recipe.blocks.get(pc) {
            match &block.action {
                BlockAction::Start(StartSource::Url(url)) => {
                    info!("going to {url}");
                    let timeout_ms = self.settings.navigation_timeout.as_millis() as u64;
                    let nav = page.navigate(url, timeout_ms).await?;
                    if nav.status == 404 {
                        info!("page not found: {url}");
                        return Ok(Outcome::NotFound);
                    }
                }
                BlockAction::Start(StartSource::File(source)) => {
                    if batch_entry {
                        bail!("block '{}' starts a nested URL list", block.id);
                    }
                    return Ok(Outcome::FanOut(source.clone()));
                }
                BlockAction::Input { selector, text } => {
                    info!("writing {text} on {selector}");
                    page.type_text(selector, text).await?;
                }
                BlockAction::Click { selector } => {
                    info!("clicking on {selector}");
                    page.click(selector).await?;
                }
                BlockAction::Screenshot => {
                    info!("screenshotting");
                    let path = self.artifacts.screenshot_path(&recipe.id, pc);
                    page.screenshot(&path).await?;
                }
                BlockAction::SaveHtml => {
                    info!("saving html");
                    let html = page.content().await?;
                    self.artifacts.write_document(&recipe.id, &html).await?;
                }
                BlockAction::JsonSchema { schema_type } => {
                    info!("looking for json schema of type {schema_type}");
                    self.json_schema(page, recipe, schema_type, &mut buffer)
                        .await?;
                }
                BlockAction::Paginate {
                    selector,
                    start_block,
                } => {
                    if buffer.checkpoint() == Checkpoint::Exhausted {
                        info!("no more pages to crawl");
                        pc += 1;
                        continue;
                    }
                    let target = recipe.position(start_block).ok_or_else(|| {
                        EngineError::UnresolvedPaginationTarget {
                            block: block.id.clone(),
                            target: start_block.clone(),
                        }
                    })?;

                    if let Some(next) = selector {
                        if !page
                            .wait_for_selector(next, self.settings.selector_timeout)
                            .await?
                        {
                            info!("no {next} control, last page reached");
                            pc += 1;
                            continue;
                        }
                        page_number += 1;
                        info!("moving to page {page_number}");
                        page.click(next).await?;
                        tokio::time::sleep(self.settings.settle_delay).await;
                    }
                    pc = target;
                    continue;
                }
                BlockAction::Extract {
                    selector,
                    property,
                    name,
                } => {
                    info!("extracting {} from {selector}", property.as_str());
                    if page
                        .wait_for_selector(selector, self.settings.selector_timeout)
                        .await?
                    {
                        let values = page.query_property(selector, property).await?;
                        buffer.write_column(name, values);
                    } else {
                        info!("failed to find {selector}");
                    }
                }
            }
            pc += 1;
        }

        let records = buffer.len();
        let result = match recipe.expected_output {
            ExpectedOutput::Item => buffer.into_item(),
            ExpectedOutput::List => buffer.into_list(),
        };
        info!("recipe {} finished with {records} results", recipe.name);
        Ok(Outcome::Finished { result, records })
    }

    /// Store the first structured-data document of `schema_type` as record 0.
    async fn json_schema(
        &self,
        page: &dyn RenderContext,
        recipe: &Recipe,
        schema_type: &str,
        buffer: &mut ExtractionBuffer,
    ) -> anyhow::Result<()> {
        if !page
            .wait_for_selector(JSON_LD_SELECTOR, self.settings.selector_timeout)
            .await?
        {
            info!("failed to find {JSON_LD_SELECTOR}");
            return Ok(());
        }

        for raw in page.json_ld().await? {
            let mut record: Record = match serde_json::from_str(&raw) {
                Ok(Value::Object(record)) => record,
                Ok(_) => continue,
                Err(e) => {
                    warn!("skipping malformed JSON-LD: {e}");
                    continue;
                }
            };
            if !declares_type(&record, schema_type) {
                continue;
            }
            if let Some(source) = recipe.start_source() {
                record.insert("url".into(), Value::String(source.location().to_string()));
            }
            buffer.set_record(0, record);
            break;
        }
        Ok(())
    }
}

/// Whether a JSON-LD document's `@type` is, or includes, `schema_type`.
fn declares_type(record: &Record, schema_type: &str) -> bool {
    match record.get("@type") {
        Some(Value::String(t)) => t == schema_type,
        Some(Value::Array(types)) => types.iter().any(|t| t.as_str() == Some(schema_type)),
        _ => false,
    }
}
