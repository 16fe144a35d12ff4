// Copyright 2026 Xupopter Contributors
// SPDX-License-Identifier: Apache-2.0

//! Object storage for finished batch streams.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Bucket-like store that hands back a public URL for every upload.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` under `name`, returning the object's public URL.
    async fn upload(&self, name: &str, bytes: Vec<u8>) -> Result<String>;
}

/// Object store backed by a local directory served under `public_base`.
pub struct LocalObjectStore {
    dir: PathBuf,
    public_base: String,
}

impl LocalObjectStore {
    pub fn new(dir: PathBuf, public_base: &str) -> Self {
        Self {
            dir,
            public_base: public_base.trim_end_matches('/').to_string(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Public URL of the object called `name`.
    pub fn public_url(&self, name: &str) -> String {
        format!("{}/{name}", self.public_base)
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn upload(&self, name: &str, bytes: Vec<u8>) -> Result<String> {
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            anyhow::bail!("invalid object name {name:?}");
        }
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("failed to create {}", self.dir.display()))?;
        let path = self.dir.join(name);
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("failed to upload {}", path.display()))?;
        tracing::info!("file uploaded to storage: {name}");
        Ok(self.public_url(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upload_returns_public_url() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path().join("bucket"), "https://files.test/xupopter/");

        let url = store.upload("r1.jsonl", b"{}\n".to_vec()).await.unwrap();
        assert_eq!(url, "https://files.test/xupopter/r1.jsonl");
        assert_eq!(
            std::fs::read(dir.path().join("bucket/r1.jsonl")).unwrap(),
            b"{}\n"
        );
    }

    #[tokio::test]
    async fn test_upload_rejects_nested_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path().to_path_buf(), "http://localhost");
        assert!(store.upload("../escape", Vec::new()).await.is_err());
    }
}
