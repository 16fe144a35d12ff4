// Copyright 2026 Xupopter Contributors
// SPDX-License-Identifier: Apache-2.0

//! Retrieval cache maintenance.

use super::output;
use crate::acquisition::cache::RetrievalCache;
use crate::acquisition::http_client::HttpClient;
use crate::config::RuntimeConfig;
use anyhow::{Context, Result};

/// Clear the entries of one URL's host, or the whole cache.
pub async fn run_clear(config: RuntimeConfig, url: Option<&str>) -> Result<()> {
    match url {
        Some(url) => {
            let cache = RetrievalCache::new(
                config.cache_dir,
                HttpClient::new(config.http_timeout_ms)?,
            );
            cache.clean_host(url).await?;
            if !output::is_quiet() {
                eprintln!("  {} Cleared cache for {url}", output::mark(true));
            }
        }
        None => {
            let dir = config.cache_dir;
            if dir.exists() {
                tokio::fs::remove_dir_all(&dir)
                    .await
                    .with_context(|| format!("failed to remove {}", dir.display()))?;
            }
            if !output::is_quiet() {
                eprintln!("  {} Cleared {}", output::mark(true), dir.display());
            }
        }
    }
    Ok(())
}
