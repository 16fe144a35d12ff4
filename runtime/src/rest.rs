// Copyright 2026 Xupopter Contributors
// SPDX-License-Identifier: Apache-2.0

//! HTTP intake and artifact API.
//!
//! `POST /api/crawl` validates a recipe and queues it on the [`Sequencer`].
//! Progress streams over SSE from `/api/events`; run artifacts are served
//! from the public folder and uploaded batches from the storage folder.

use crate::events::{self, CrawlEvent};
use crate::recipe::Recipe;
use crate::sequencer::{QueueSnapshot, Sequencer};
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use std::convert::Infallible;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;

pub const QUEUED_REPLY: &str = "Added to Queue";

/// State shared by every handler.
pub struct AppState {
    pub sequencer: Sequencer,
    /// Run artifacts, one directory per recipe.
    pub public_dir: PathBuf,
    /// Uploaded batch streams, served under `/storage` when set.
    pub storage_dir: Option<PathBuf>,
}

/// Build the axum Router with all endpoints.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut app = Router::new()
        .route("/api/health", get(health))
        .route("/api/crawl", post(crawl))
        .route("/api/queue", get(queue))
        .route("/api/events", get(events_sse))
        .route("/public", get(public_file));
    if let Some(dir) = &state.storage_dir {
        app = app.nest_service("/storage", ServeDir::new(dir));
    }
    app.layer(cors).with_state(state)
}

/// Start the API server on the given port.
pub async fn start(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("server started on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> &'static str {
    "ALIVE"
}

async fn crawl(State(state): State<Arc<AppState>>, body: String) -> Response {
    let recipe = match Recipe::from_json(&body) {
        Ok(recipe) => recipe,
        Err(e) => {
            tracing::warn!("rejected crawl request: {e}");
            return (StatusCode::BAD_REQUEST, format!("invalid recipe: {e}")).into_response();
        }
    };
    match state.sequencer.add_recipe(recipe) {
        Ok(()) => QUEUED_REPLY.into_response(),
        Err(e) => {
            tracing::warn!("rejected crawl request: {e}");
            (StatusCode::BAD_REQUEST, format!("invalid recipe: {e}")).into_response()
        }
    }
}

async fn queue(State(state): State<Arc<AppState>>) -> Json<QueueSnapshot> {
    Json(state.sequencer.snapshot())
}

#[derive(Deserialize)]
struct EventsParams {
    recipe: Option<String>,
}

/// SSE stream of sequencer events, optionally narrowed to one recipe.
async fn events_sse(
    Query(params): Query<EventsParams>,
    State(state): State<Arc<AppState>>,
) -> Sse<impl futures::Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.sequencer.events().subscribe();
    let recipe_filter = params.recipe;

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Some(ref recipe_id) = recipe_filter {
                        if !events::event_matches_recipe(&event, recipe_id) {
                            continue;
                        }
                    }
                    if let Ok(json) = serde_json::to_string::<CrawlEvent>(&event) {
                        yield Ok(Event::default().data(json));
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublicParams {
    file_name: Option<String>,
}

/// Download one file from the public folder.
async fn public_file(
    Query(params): Query<PublicParams>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let Some(name) = params.file_name.filter(|n| !n.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "missing fileName").into_response();
    };
    let Some(relative) = contained_path(&name) else {
        return (StatusCode::BAD_REQUEST, "invalid fileName").into_response();
    };

    let path = state.public_dir.join(relative);
    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            let file_name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("download")
                .to_string();
            (
                [
                    (header::CONTENT_TYPE, content_type(&path).to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename=\"{file_name}\""),
                    ),
                ],
                bytes,
            )
                .into_response()
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            (StatusCode::NOT_FOUND, "no such file").into_response()
        }
        Err(e) => {
            tracing::error!("failed to read {}: {e}", path.display());
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// `name` as a relative path that cannot leave its base directory.
fn contained_path(name: &str) -> Option<PathBuf> {
    let path = Path::new(name);
    path.components()
        .all(|c| matches!(c, Component::Normal(_)))
        .then(|| path.to_path_buf())
}

fn content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => "application/json",
        Some("jsonl") => "application/x-ndjson",
        Some("html") => "text/html; charset=utf-8",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    }
}
