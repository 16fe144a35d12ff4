// Copyright 2026 Xupopter Contributors
// SPDX-License-Identifier: Apache-2.0

//! End-to-end runs over the static HTML renderer against a mock site.

use anyhow::Result;
use assert_json_diff::assert_json_eq;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use xupopter_runtime::acquisition::cache::RetrievalCache;
use xupopter_runtime::acquisition::http_client::HttpClient;
use xupopter_runtime::audit::{AuditEvent, AuditLogger};
use xupopter_runtime::crawler::artifacts::ArtifactStore;
use xupopter_runtime::crawler::{Engine, EngineSettings, RunStatus};
use xupopter_runtime::dispatch::{BrokerChannel, BrokerConnector, Dispatcher};
use xupopter_runtime::recipe::Recipe;
use xupopter_runtime::renderer::lifecycle::BrowserManager;
use xupopter_runtime::renderer::snapshot::SnapshotLauncher;
use xupopter_runtime::sequencer::Sequencer;
use xupopter_runtime::storage::LocalObjectStore;

const LISTING: &str = r#"<html><head>
<script type="application/ld+json">{"@type": "Product", "name": "Lamp", "url": "https://elsewhere.test/lamp"}</script>
</head><body>
<ul>
  <li class="item"><a href="/p/1">First
     item</a></li>
  <li class="item"><a href="/p/2">Second item</a></li>
</ul>
</body></html>"#;

fn product(name: &str) -> String {
    format!(
        r#"<html><head><script type="application/ld+json">{{"@type": ["Thing", "Product"], "name": "{name}"}}</script></head><body></body></html>"#
    )
}

fn engine(dir: &tempfile::TempDir) -> Arc<Engine> {
    let client = HttpClient::new(5_000).unwrap();
    let browser = Arc::new(BrowserManager::new(
        Arc::new(SnapshotLauncher::new(client.clone())),
        Duration::from_secs(60),
    ));
    let cache = Arc::new(RetrievalCache::new(dir.path().join("cache"), client));
    let engine = Engine::new(browser, cache, ArtifactStore::new(dir.path().join("public")))
        .with_settings(EngineSettings {
            selector_timeout: Duration::from_millis(50),
            navigation_timeout: Duration::from_secs(5),
            settle_delay: Duration::from_millis(1),
        });
    Arc::new(engine)
}

fn recipe(value: Value) -> Recipe {
    serde_json::from_value(value).unwrap()
}

async fn site() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/list"))
        .respond_with(ResponseTemplate::new(200).set_body_string(LISTING))
        .mount(&server)
        .await;
    for (route, name) in [("/p/1", "Lamp"), ("/p/2", "Chair")] {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_string(product(name)))
            .mount(&server)
            .await;
    }
    server
}

#[tokio::test]
async fn test_url_recipe_extracts_columns() {
    let server = site().await;
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(&dir);

    let report = engine
        .run(&recipe(json!({
            "id": "listing",
            "blocks": [
                {"id": "s", "type": "start", "details": {"type": "url", "source": format!("{}/list", server.uri())}},
                {"id": "t", "type": "extract", "details": {"selector": ".item a", "property": "text", "name": "title"}},
                {"id": "h", "type": "extract", "details": {"selector": ".item a", "property": "href", "name": "link"}},
                {"id": "x", "type": "extract", "details": {"selector": ".missing", "property": "text", "name": "never"}},
                {"id": "d", "type": "save-html"}
            ]
        })))
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.records, 2);
    let result: Value =
        serde_json::from_str(&std::fs::read_to_string(report.artifact.unwrap()).unwrap()).unwrap();
    assert_json_eq!(
        result,
        json!([
            {"title": "First item", "link": "/p/1"},
            {"title": "Second item", "link": "/p/2"}
        ])
    );
    assert!(dir.path().join("public/listing/document.html").exists());
}

#[tokio::test]
async fn test_jsonschema_item_recipe() {
    let server = site().await;
    let dir = tempfile::tempdir().unwrap();
    let source = format!("{}/list", server.uri());

    let report = engine(&dir)
        .run(&recipe(json!({
            "id": "schema",
            "expectedOutput": "item",
            "blocks": [
                {"id": "s", "type": "start", "details": {"type": "url", "source": source}},
                {"id": "j", "type": "jsonschema", "details": {"type": "Product"}}
            ]
        })))
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    let result: Value =
        serde_json::from_str(&std::fs::read_to_string(report.artifact.unwrap()).unwrap()).unwrap();
    assert_eq!(result["name"], "Lamp");
    assert_eq!(result["url"], source.as_str());
}

#[tokio::test]
async fn test_missing_page_reports_not_found() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    let report = engine(&dir)
        .run(&recipe(json!({
            "id": "gone",
            "blocks": [
                {"id": "s", "type": "start", "details": {"type": "url", "source": format!("{}/gone", server.uri())}},
                {"id": "t", "type": "extract", "details": {"selector": "h1", "property": "text", "name": "t"}}
            ]
        })))
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::NotFound);
    assert!(report.artifact.is_none());
    assert!(!dir.path().join("public/gone/result.json").exists());
}

#[tokio::test]
async fn test_interactive_block_aborts_without_browser() {
    let server = site().await;
    let dir = tempfile::tempdir().unwrap();

    let report = engine(&dir)
        .run(&recipe(json!({
            "id": "clicky",
            "blocks": [
                {"id": "s", "type": "start", "details": {"type": "url", "source": format!("{}/list", server.uri())}},
                {"id": "c", "type": "click", "details": {"selector": ".item a"}}
            ]
        })))
        .await
        .unwrap();

    assert!(matches!(report.status, RunStatus::Aborted(_)));
}

type Published = Arc<Mutex<Vec<(String, Value)>>>;

/// Broker double that records every published payload.
#[derive(Clone, Default)]
struct Outbox {
    published: Published,
}

struct OutboxChannel(Published);

#[async_trait]
impl BrokerConnector for Outbox {
    async fn connect(&self) -> Result<Box<dyn BrokerChannel>> {
        Ok(Box::new(OutboxChannel(Arc::clone(&self.published))))
    }
}

#[async_trait]
impl BrokerChannel for OutboxChannel {
    async fn declare_queue(&mut self, _queue: &str) -> Result<()> {
        Ok(())
    }

    async fn publish(&mut self, queue: &str, payload: &[u8]) -> Result<()> {
        let value = serde_json::from_slice(payload)?;
        self.0
            .lock()
            .unwrap()
            .push((queue.to_string(), value));
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_file_recipe_uploads_and_announces_batch() {
    let server = site().await;
    Mock::given(method("GET"))
        .and(path("/urls.txt"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(format!("{0}/p/1\n\n{0}/p/2\n", server.uri())),
        )
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let outbox = Outbox::default();
    let connector: Arc<dyn BrokerConnector> = Arc::new(outbox.clone());
    let ledger_path = dir.path().join("runs.jsonl");
    let sequencer = Sequencer::builder(engine(&dir))
        .storage(Arc::new(LocalObjectStore::new(
            dir.path().join("storage"),
            "http://files.test/storage/",
        )))
        .dispatcher(Arc::new(Dispatcher::with_queue(connector, "imports")))
        .ledger(AuditLogger::open(&ledger_path).unwrap())
        .build();

    sequencer
        .add_recipe(recipe(json!({
            "id": "catalog",
            "expectedOutput": "item",
            "blocks": [
                {"id": "s", "type": "start", "details": {"type": "file", "source": format!("{}/urls.txt", server.uri())}},
                {"id": "j", "type": "jsonschema", "details": {"type": "Product"}}
            ]
        })))
        .unwrap();
    sequencer.wait_idle().await;

    let uploaded = std::fs::read_to_string(dir.path().join("storage/catalog.jsonl")).unwrap();
    let names: Vec<String> = uploaded
        .lines()
        .map(|l| serde_json::from_str::<Value>(l).unwrap()["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, ["Lamp", "Chair"]);

    let published = outbox.published.lock().unwrap().clone();
    assert_eq!(published.len(), 1);
    let (queue, message) = &published[0];
    assert_eq!(queue, "imports");
    assert_eq!(message["parent"], "catalog");
    assert_eq!(message["url"], "http://files.test/storage/catalog.jsonl");
    assert!(uuid::Uuid::parse_str(message["batch"].as_str().unwrap()).is_ok());

    let ledger: Vec<AuditEvent> = std::fs::read_to_string(&ledger_path)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].status, "completed");
    assert_eq!(ledger[0].records, 2);
    assert_eq!(
        ledger[0].upload.as_deref(),
        Some("http://files.test/storage/catalog.jsonl")
    );
}
