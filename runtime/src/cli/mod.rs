// Copyright 2026 Xupopter Contributors
// SPDX-License-Identifier: Apache-2.0

//! CLI subcommand implementations for the xupopter binary.

pub mod cache_cmd;
pub mod doctor;
pub mod fetch_cmd;
pub mod output;
pub mod run_cmd;
pub mod serve;

use crate::acquisition::cache::RetrievalCache;
use crate::acquisition::http_client::HttpClient;
use crate::config::RuntimeConfig;
use crate::crawler::artifacts::ArtifactStore;
use crate::crawler::Engine;
use crate::renderer::chromium::{find_chromium, ChromiumLauncher};
use crate::renderer::lifecycle::BrowserManager;
use crate::renderer::snapshot::SnapshotLauncher;
use crate::renderer::BrowserLauncher;
use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence; otherwise this crate logs at `info`
/// (`debug` with `verbose`).
pub fn init_logging(json: bool, verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("xupopter_runtime={level}")));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// The collaborators every command that runs recipes needs.
pub struct Services {
    pub browser: Arc<BrowserManager>,
    pub cache: Arc<RetrievalCache>,
    pub engine: Arc<Engine>,
}

impl Services {
    pub fn build(config: &RuntimeConfig) -> Result<Self> {
        let client = HttpClient::new(config.http_timeout_ms)?;
        let browser = Arc::new(BrowserManager::new(
            launcher(config, client.clone()),
            config.browser_idle,
        ));
        let cache = Arc::new(RetrievalCache::new(config.cache_dir.clone(), client));
        let engine = Engine::new(
            Arc::clone(&browser),
            Arc::clone(&cache),
            ArtifactStore::new(config.public_dir.clone()),
        )
        .with_settings(config.engine_settings());

        Ok(Self {
            browser,
            cache,
            engine: Arc::new(engine),
        })
    }
}

/// Chromium when one can be found, else the static HTML fallback.
fn launcher(config: &RuntimeConfig, client: HttpClient) -> Arc<dyn BrowserLauncher> {
    match find_chromium(config.chromium_path.as_deref()) {
        Some(path) => {
            info!("using Chromium at {}", path.display());
            Arc::new(ChromiumLauncher::new(path).with_user_data_dir(config.browser_profile_dir.clone()))
        }
        None => {
            warn!("Chromium not found; falling back to static HTML rendering");
            warn!("click, input and screenshot blocks will abort their runs");
            Arc::new(SnapshotLauncher::new(client))
        }
    }
}
