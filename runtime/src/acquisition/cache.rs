// Copyright 2026 Xupopter Contributors
// SPDX-License-Identifier: Apache-2.0

//! Retrieval cache: fetch a URL at most once and serve repeats from disk.
//!
//! ## Layout
//!
//! Every URL maps to `<root>/<host>/<path+query>` where the characters
//! `? . : /` are replaced by `_` in both components. Entries never expire;
//! they stay until [`RetrievalCache::evict`] or
//! [`RetrievalCache::clean_host`] removes them.

use super::http_client::HttpClient;
use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use std::io::Read;
use std::path::{Path, PathBuf};
use url::Url;

/// gzip member header: magic bytes plus the deflate method.
const GZIP_MAGIC: [u8; 3] = [0x1f, 0x8b, 0x08];

/// Content-addressed HTTP response store backed by the filesystem.
pub struct RetrievalCache {
    /// Base directory for cached responses.
    root: PathBuf,
    client: HttpClient,
}

impl RetrievalCache {
    pub fn new(root: PathBuf, client: HttpClient) -> Self {
        Self { root, client }
    }

    /// Cache directory path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Deterministic cache path for `url`, or `None` if it has no host.
    pub fn cache_path(&self, url: &Url) -> Option<PathBuf> {
        let host = url.host_str().filter(|h| !h.is_empty())?;
        let mut rest = url.path().to_string();
        if let Some(query) = url.query() {
            rest.push('?');
            rest.push_str(query);
        }
        Some(self.root.join(sanitize(host)).join(sanitize(&rest)))
    }

    /// Per-host directory holding every cached entry of `url`'s host.
    pub fn host_dir(&self, url: &Url) -> Option<PathBuf> {
        self.cache_path(url)
            .and_then(|p| p.parent().map(Path::to_path_buf))
    }

    /// Fetch `url`, reading from and writing to the cache when `use_cache`.
    ///
    /// Malformed URLs are logged and yield `Ok(None)` without touching the
    /// network. Network failures and non-2xx responses are errors.
    pub async fn fetch(&self, url: &str, use_cache: bool) -> Result<Option<String>> {
        let Some((parsed, path)) = self.resolve(url) else {
            tracing::error!("could not do the request: invalid url: {url}");
            return Ok(None);
        };

        if use_cache && tokio::fs::try_exists(&path).await.unwrap_or(false) {
            tracing::info!("HTTP response from cache: {}", path.display());
            let cached = tokio::fs::read(&path)
                .await
                .with_context(|| format!("failed to read cache entry {}", path.display()))?;
            return Ok(Some(String::from_utf8_lossy(&cached).into_owned()));
        }

        tracing::info!("HTTP request for: {parsed}");
        let resp = self.client.get_ok(parsed.as_str()).await?;

        let body = if is_gzip(&resp.body) {
            tracing::debug!("HTTP response is gzip: {parsed}");
            gunzip(&resp.body).with_context(|| format!("failed to gunzip {parsed}"))?
        } else {
            resp.text()
        };

        if use_cache {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("failed to create cache dir {}", parent.display()))?;
            }
            tokio::fs::write(&path, body.as_bytes())
                .await
                .with_context(|| format!("failed to write cache entry {}", path.display()))?;
            tracing::debug!("HTTP response cached at {}", path.display());
        }

        Ok(Some(body))
    }

    /// Remove the cached entry of `url`.
    pub async fn evict(&self, url: &str) -> Result<()> {
        if let Some((_, path)) = self.resolve(url) {
            remove_path(&path).await?;
        }
        Ok(())
    }

    /// Remove every cached entry of `url`'s host.
    pub async fn clean_host(&self, url: &str) -> Result<()> {
        let dir = Url::parse(url).ok().and_then(|u| self.host_dir(&u));
        if let Some(dir) = dir {
            remove_path(&dir).await?;
            tracing::info!("cleared cache for {}", dir.display());
        }
        Ok(())
    }

    fn resolve(&self, url: &str) -> Option<(Url, PathBuf)> {
        let parsed = Url::parse(url).ok()?;
        let path = self.cache_path(&parsed)?;
        Some((parsed, path))
    }
}

fn sanitize(component: &str) -> String {
    component.replace(['?', '.', ':', '/'], "_")
}

fn is_gzip(body: &[u8]) -> bool {
    body.len() >= GZIP_MAGIC.len() && body[..GZIP_MAGIC.len()] == GZIP_MAGIC
}

fn gunzip(body: &[u8]) -> Result<String> {
    let mut decoded = Vec::new();
    GzDecoder::new(body).read_to_end(&mut decoded)?;
    Ok(String::from_utf8_lossy(&decoded).into_owned())
}

async fn remove_path(path: &Path) -> Result<()> {
    let meta = match tokio::fs::metadata(path).await {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    let removed = if meta.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    };
    removed.with_context(|| format!("failed to remove {}", path.display()))
}
