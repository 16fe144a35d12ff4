// Copyright 2026 Xupopter Contributors
// SPDX-License-Identifier: Apache-2.0

//! Fetch a URL through the retrieval cache.

use crate::acquisition::cache::RetrievalCache;
use crate::acquisition::http_client::HttpClient;
use crate::config::RuntimeConfig;
use anyhow::{bail, Result};

/// Print the body of `url`, cached unless `no_cache`.
pub async fn run(config: RuntimeConfig, url: &str, no_cache: bool) -> Result<()> {
    let client = HttpClient::new(config.http_timeout_ms)?;
    let cache = RetrievalCache::new(config.cache_dir, client);
    match cache.fetch(url, !no_cache).await? {
        Some(body) => {
            print!("{body}");
            Ok(())
        }
        None => bail!("not a valid URL: {url}"),
    }
}
