// Copyright 2026 Xupopter Contributors
// SPDX-License-Identifier: Apache-2.0

//! Job sequencer: FIFO intake with at most one recipe running at a time.
//!
//! [`Sequencer::add_recipe`] validates and enqueues synchronously. The first
//! recipe to arrive at an idle sequencer spawns the consumer task, which
//! pops and awaits one run after another and exits once the queue drains.
//! File-origin runs are then uploaded to object storage and announced
//! through the dispatcher.

use crate::audit::{AuditEvent, AuditLogger};
use crate::crawler::{Engine, RunReport, RunStatus};
use crate::dispatch::{Dispatcher, Notification};
use crate::events::{now_timestamp, CrawlEvent, EventBus};
use crate::recipe::{Recipe, RecipeError, StartKind};
use crate::storage::ObjectStore;
use serde::Serialize;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;
use tracing::{error, info, warn};

/// Queue contents at one instant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueSnapshot {
    pub running: Option<String>,
    pub queued: Vec<String>,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Recipe>,
    consuming: bool,
    running: Option<String>,
}

struct Inner {
    engine: Arc<Engine>,
    events: Arc<EventBus>,
    storage: Option<Arc<dyn ObjectStore>>,
    dispatcher: Option<Arc<Dispatcher>>,
    ledger: Option<Mutex<AuditLogger>>,
    queue: Mutex<QueueState>,
    idle: Notify,
}

/// Cheaply cloneable handle to the sequencer.
#[derive(Clone)]
pub struct Sequencer {
    inner: Arc<Inner>,
}

/// Wires the sequencer's collaborators.
pub struct SequencerBuilder {
    engine: Arc<Engine>,
    events: Option<Arc<EventBus>>,
    storage: Option<Arc<dyn ObjectStore>>,
    dispatcher: Option<Arc<Dispatcher>>,
    ledger: Option<AuditLogger>,
}

impl SequencerBuilder {
    pub fn events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Where file-origin batch streams are uploaded.
    pub fn storage(mut self, storage: Arc<dyn ObjectStore>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Who is told about uploaded batches.
    pub fn dispatcher(mut self, dispatcher: Arc<Dispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn ledger(mut self, ledger: AuditLogger) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn build(self) -> Sequencer {
        Sequencer {
            inner: Arc::new(Inner {
                engine: self.engine,
                events: self.events.unwrap_or_else(|| Arc::new(EventBus::new(64))),
                storage: self.storage,
                dispatcher: self.dispatcher,
                ledger: self.ledger.map(Mutex::new),
                queue: Mutex::new(QueueState::default()),
                idle: Notify::new(),
            }),
        }
    }
}

impl Sequencer {
    pub fn builder(engine: Arc<Engine>) -> SequencerBuilder {
        SequencerBuilder {
            engine,
            events: None,
            storage: None,
            dispatcher: None,
            ledger: None,
        }
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.inner.events
    }

    /// Validate and enqueue a recipe, starting the consumer if it is idle.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn add_recipe(&self, recipe: Recipe) -> Result<(), RecipeError> {
        recipe.validate()?;

        let recipe_id = recipe.id.clone();
        let (start_consumer, queue_len) = {
            let mut queue = self.inner.lock_queue();
            queue.pending.push_back(recipe);
            let start = !queue.consuming;
            queue.consuming = true;
            (start, queue.pending.len())
        };

        info!("new recipe added: {recipe_id} ({queue_len} queued)");
        self.inner.events.emit(CrawlEvent::RecipeQueued {
            recipe_id,
            queue_len,
            timestamp: now_timestamp(),
        });

        if start_consumer {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move { inner.consume().await });
        }
        Ok(())
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        let queue = self.inner.lock_queue();
        QueueSnapshot {
            running: queue.running.clone(),
            queued: queue.pending.iter().map(|r| r.id.clone()).collect(),
        }
    }

    pub fn is_idle(&self) -> bool {
        let queue = self.inner.lock_queue();
        !queue.consuming && queue.pending.is_empty()
    }

    /// Wait until the queue is empty and no recipe is running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }
}

impl Inner {
    fn lock_queue(&self) -> MutexGuard<'_, QueueState> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn consume(&self) {
        loop {
            let recipe = {
                let mut queue = self.lock_queue();
                match queue.pending.pop_front() {
                    Some(recipe) => {
                        queue.running = Some(recipe.id.clone());
                        recipe
                    }
                    None => {
                        queue.running = None;
                        queue.consuming = false;
                        break;
                    }
                }
            };
            self.process(&recipe).await;
        }

        info!("queue drained");
        self.events.emit(CrawlEvent::QueueIdle);
        self.idle.notify_waiters();
    }

    async fn process(&self, recipe: &Recipe) {
        self.events.emit(CrawlEvent::RecipeStarted {
            recipe_id: recipe.id.clone(),
            name: recipe.name.clone(),
            timestamp: now_timestamp(),
        });

        let report = match self.engine.run(recipe).await {
            Ok(report) => report,
            Err(e) => {
                error!("recipe {} failed: {e}", recipe.id);
                self.events.emit(CrawlEvent::RecipeFailed {
                    recipe_id: recipe.id.clone(),
                    error: e.to_string(),
                });
                let origin = origin_label(recipe.origin());
                self.record(AuditEvent::new(&recipe.id, origin, "failed"));
                return;
            }
        };

        self.events.emit(CrawlEvent::RecipeFinished {
            recipe_id: report.recipe_id.clone(),
            status: status_label(&report.status).to_string(),
            records: report.records,
            elapsed_ms: report.elapsed_ms,
        });

        let mut upload = None;
        if report.origin == StartKind::File && report.status == RunStatus::Completed {
            if let Some(artifact) = &report.artifact {
                upload = self.publish_batch(&recipe.id, artifact).await;
            }
        }

        self.record(ledger_entry(&report, upload));
    }

    /// Upload a batch stream and announce it. Returns the public URL.
    async fn publish_batch(&self, recipe_id: &str, artifact: &Path) -> Option<String> {
        let storage = self.storage.as_ref()?;

        let bytes = match tokio::fs::read(artifact).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("could not read batch {}: {e}", artifact.display());
                return None;
            }
        };
        let url = match storage.upload(&format!("{recipe_id}.jsonl"), bytes).await {
            Ok(url) => url,
            Err(e) => {
                warn!("upload of batch for {recipe_id} failed: {e:#}");
                return None;
            }
        };

        let batch = uuid::Uuid::new_v4().to_string();
        self.events.emit(CrawlEvent::BatchUploaded {
            recipe_id: recipe_id.to_string(),
            batch: batch.clone(),
            url: url.clone(),
        });

        if let Some(dispatcher) = &self.dispatcher {
            let notification = Notification {
                parent: recipe_id.to_string(),
                batch,
                url: url.clone(),
            };
            if let Err(e) = dispatcher.notify(&notification).await {
                warn!("notification for {recipe_id} failed: {e}");
                self.events.emit(CrawlEvent::NotificationFailed {
                    recipe_id: recipe_id.to_string(),
                    error: e.to_string(),
                });
            }
        }
        Some(url)
    }

    fn record(&self, event: AuditEvent) {
        let Some(ledger) = &self.ledger else {
            return;
        };
        let mut ledger = ledger.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = ledger.log(&event) {
            warn!("could not write run ledger: {e:#}");
        }
    }
}

fn ledger_entry(report: &RunReport, upload: Option<String>) -> AuditEvent {
    let mut event = AuditEvent::new(
        &report.recipe_id,
        origin_label(report.origin),
        status_label(&report.status),
    );
    event.records = report.records;
    event.artifact = report.artifact.as_ref().map(|p| p.display().to_string());
    event.upload = upload;
    event.duration_ms = report.elapsed_ms;
    event
}

fn origin_label(origin: StartKind) -> &'static str {
    match origin {
        StartKind::Url => "url",
        StartKind::File => "file",
    }
}

pub fn status_label(status: &RunStatus) -> &'static str {
    match status {
        RunStatus::Completed => "completed",
        RunStatus::NotFound => "not_found",
        RunStatus::Aborted(_) => "aborted",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{BrokerChannel, BrokerConnector};
    use crate::renderer::scripted::{
        scripted_engine, ScriptedLauncher, ScriptedPage, ScriptedRenderer,
    };
    use crate::storage::LocalObjectStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Default)]
    struct Outbox {
        published: Arc<Mutex<Vec<String>>>,
    }

    struct OutboxChannel {
        published: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl BrokerConnector for Outbox {
        async fn connect(&self) -> anyhow::Result<Box<dyn BrokerChannel>> {
            Ok(Box::new(OutboxChannel {
                published: Arc::clone(&self.published),
            }))
        }
    }

    #[async_trait]
    impl BrokerChannel for OutboxChannel {
        async fn declare_queue(&mut self, _queue: &str) -> anyhow::Result<()> {
            Ok(())
        }

        async fn publish(&mut self, _queue: &str, payload: &[u8]) -> anyhow::Result<()> {
            self.published
                .lock()
                .unwrap()
                .push(String::from_utf8_lossy(payload).into_owned());
            Ok(())
        }

        async fn close(self: Box<Self>) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn engine(renderer: ScriptedRenderer, dir: &TempDir) -> (Arc<Engine>, Arc<ScriptedLauncher>) {
        scripted_engine(renderer, dir.path())
    }

    fn url_recipe(id: &str, url: &str) -> Recipe {
        serde_json::from_value(json!({
            "id": id,
            "name": id,
            "blocks": [
                {"id": "s", "type": "start", "details": {"type": "url", "source": url}},
                {"id": "t", "type": "extract", "details": {"selector": "h1", "property": "text", "name": "title"}}
            ]
        }))
        .unwrap()
    }

    fn ledger_ids(path: &Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str::<AuditEvent>(l).unwrap().recipe_id)
            .collect()
    }

    #[tokio::test]
    async fn test_invalid_recipe_is_never_queued() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, _) = engine(ScriptedRenderer::new(), &dir);
        let sequencer = Sequencer::builder(engine).build();

        let mut recipe = url_recipe("r1", "https://shop.test/");
        recipe.blocks.clear();
        assert_eq!(sequencer.add_recipe(recipe), Err(RecipeError::NoBlocks));
        assert!(sequencer.is_idle());
        assert_eq!(sequencer.snapshot(), QueueSnapshot::default());
    }

    #[tokio::test]
    async fn test_dot_prefixed_id_is_never_queued() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, _) = engine(ScriptedRenderer::new(), &dir);
        let sequencer = Sequencer::builder(engine).build();

        let recipe: Recipe = serde_json::from_value(json!({
            "id": ".hidden",
            "name": "hidden",
            "blocks": [
                {"id": "s", "type": "start", "details": {"type": "file", "source": "https://lists.test/urls.txt"}},
                {"id": "t", "type": "extract", "details": {"selector": "h1", "property": "text", "name": "title"}}
            ]
        }))
        .unwrap();
        assert_eq!(
            sequencer.add_recipe(recipe),
            Err(RecipeError::UnsafeId(".hidden".into()))
        );
        assert!(sequencer.is_idle());
        assert_eq!(sequencer.snapshot(), QueueSnapshot::default());
    }

    #[tokio::test]
    async fn test_runs_in_order_one_at_a_time() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = ScriptedRenderer::new()
            .page("https://shop.test/", ScriptedPage::new("").texts("h1", &["x"]))
            .delay(Duration::from_millis(20));
        let (engine, launcher) = engine(renderer, &dir);
        let ledger_path = dir.path().join("runs.jsonl");
        let sequencer = Sequencer::builder(engine)
            .ledger(AuditLogger::open(&ledger_path).unwrap())
            .build();
        let mut events = sequencer.events().subscribe();

        for id in ["r1", "r2", "r3"] {
            sequencer
                .add_recipe(url_recipe(id, "https://shop.test/"))
                .unwrap();
        }
        assert_eq!(sequencer.snapshot().queued, vec!["r1", "r2", "r3"]);

        sequencer.wait_idle().await;

        assert_eq!(launcher.renderer().max_active(), 1);
        assert_eq!(ledger_ids(&ledger_path), vec!["r1", "r2", "r3"]);

        let mut started = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let CrawlEvent::RecipeStarted { recipe_id, .. } = event {
                started.push(recipe_id);
            }
        }
        assert_eq!(started, vec!["r1", "r2", "r3"]);
    }

    #[tokio::test]
    async fn test_snapshot_shows_running_recipe() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = ScriptedRenderer::new()
            .page("https://shop.test/", ScriptedPage::new("").texts("h1", &["x"]))
            .delay(Duration::from_millis(50));
        let (engine, _) = engine(renderer, &dir);
        let sequencer = Sequencer::builder(engine).build();

        sequencer.add_recipe(url_recipe("r1", "https://shop.test/")).unwrap();
        sequencer.add_recipe(url_recipe("r2", "https://shop.test/")).unwrap();

        while sequencer.snapshot().running.is_none() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert_eq!(
            sequencer.snapshot(),
            QueueSnapshot {
                running: Some("r1".into()),
                queued: vec!["r2".into()],
            }
        );
        sequencer.wait_idle().await;
        assert!(sequencer.is_idle());
    }

    #[tokio::test]
    async fn test_consumer_restarts_after_draining() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = ScriptedRenderer::new()
            .page("https://shop.test/", ScriptedPage::new("").texts("h1", &["x"]));
        let (engine, _) = engine(renderer, &dir);
        let ledger_path = dir.path().join("runs.jsonl");
        let sequencer = Sequencer::builder(engine)
            .ledger(AuditLogger::open(&ledger_path).unwrap())
            .build();

        sequencer.add_recipe(url_recipe("r1", "https://shop.test/")).unwrap();
        sequencer.wait_idle().await;
        sequencer.add_recipe(url_recipe("r2", "https://shop.test/")).unwrap();
        sequencer.wait_idle().await;

        assert_eq!(ledger_ids(&ledger_path), vec!["r1", "r2"]);
    }

    #[tokio::test]
    async fn test_file_origin_is_uploaded_and_announced() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("https://shop.test/p/1\nhttps://shop.test/p/2\n"),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let renderer = ScriptedRenderer::new()
            .page("https://shop.test/p/1", ScriptedPage::new("").texts("h1", &["one"]))
            .page("https://shop.test/p/2", ScriptedPage::new("").texts("h1", &["two"]));
        let (engine, _) = engine(renderer, &dir);

        let outbox = Arc::new(Outbox::default());
        let store = Arc::new(LocalObjectStore::new(
            dir.path().join("bucket"),
            "https://files.test/xupopter",
        ));
        let sequencer = Sequencer::builder(engine)
            .storage(store)
            .dispatcher(Arc::new(Dispatcher::new(outbox.clone())))
            .build();

        let recipe: Recipe = serde_json::from_value(json!({
            "id": "batch-1",
            "name": "products",
            "blocks": [
                {"id": "s", "type": "start", "details": {"type": "file", "source": format!("{}/urls.txt", server.uri())}},
                {"id": "t", "type": "extract", "details": {"selector": "h1", "property": "text", "name": "title"}}
            ],
            "expectedOutput": "item"
        }))
        .unwrap();
        sequencer.add_recipe(recipe).unwrap();
        sequencer.wait_idle().await;

        let uploaded = std::fs::read_to_string(dir.path().join("bucket/batch-1.jsonl")).unwrap();
        assert_eq!(uploaded, "{\"title\":\"one\"}\n{\"title\":\"two\"}\n");

        let published = outbox.published.lock().unwrap().clone();
        assert_eq!(published.len(), 1);
        let message: serde_json::Value = serde_json::from_str(&published[0]).unwrap();
        assert_eq!(message["parent"], "batch-1");
        assert_eq!(message["url"], "https://files.test/xupopter/batch-1.jsonl");
        assert!(uuid::Uuid::parse_str(message["batch"].as_str().unwrap()).is_ok());
    }

    #[tokio::test]
    async fn test_url_origin_is_not_uploaded() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = ScriptedRenderer::new()
            .page("https://shop.test/", ScriptedPage::new("").texts("h1", &["x"]));
        let (engine, _) = engine(renderer, &dir);
        let outbox = Arc::new(Outbox::default());
        let sequencer = Sequencer::builder(engine)
            .storage(Arc::new(LocalObjectStore::new(
                dir.path().join("bucket"),
                "https://files.test",
            )))
            .dispatcher(Arc::new(Dispatcher::new(outbox.clone())))
            .build();

        sequencer.add_recipe(url_recipe("r1", "https://shop.test/")).unwrap();
        sequencer.wait_idle().await;

        assert!(outbox.published.lock().unwrap().is_empty());
        assert!(!dir.path().join("bucket").exists());
    }
}
