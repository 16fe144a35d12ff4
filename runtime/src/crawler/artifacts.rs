// Copyright 2026 Xupopter Contributors
// SPDX-License-Identifier: Apache-2.0

//! Per-recipe artifact layout under the public directory.
//!
//! ```text
//! <public>/<recipe id>/result.json          result document (or NDJSON batch)
//! <public>/<recipe id>/screenshot_<n>.jpg   screenshot taken by block n
//! <public>/<recipe id>/document.html        last saved page HTML
//! ```

use anyhow::{Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

pub const RESULT_FILE: &str = "result.json";
pub const DOCUMENT_FILE: &str = "document.html";

/// Filesystem layout of everything a run produces.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn recipe_dir(&self, recipe_id: &str) -> PathBuf {
        self.root.join(recipe_id)
    }

    pub fn result_path(&self, recipe_id: &str) -> PathBuf {
        self.recipe_dir(recipe_id).join(RESULT_FILE)
    }

    pub fn screenshot_path(&self, recipe_id: &str, block_index: usize) -> PathBuf {
        self.recipe_dir(recipe_id)
            .join(format!("screenshot_{block_index}.jpg"))
    }

    pub fn document_path(&self, recipe_id: &str) -> PathBuf {
        self.recipe_dir(recipe_id).join(DOCUMENT_FILE)
    }

    /// Create the recipe's directory if it does not exist yet.
    pub async fn prepare(&self, recipe_id: &str) -> Result<PathBuf> {
        let dir = self.recipe_dir(recipe_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("failed to create {}", dir.display()))?;
        Ok(dir)
    }

    /// Write the pretty-printed result document.
    pub async fn write_result(&self, recipe_id: &str, result: &Value) -> Result<PathBuf> {
        self.prepare(recipe_id).await?;
        let path = self.result_path(recipe_id);
        let json = serde_json::to_string_pretty(result)?;
        tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }

    /// Persist a page's HTML.
    pub async fn write_document(&self, recipe_id: &str, html: &str) -> Result<PathBuf> {
        self.prepare(recipe_id).await?;
        let path = self.document_path(recipe_id);
        tokio::fs::write(&path, html)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }

    /// Start a fresh NDJSON batch at the recipe's result path, replacing any
    /// previous result.
    pub async fn batch(&self, recipe_id: &str) -> Result<BatchWriter> {
        self.prepare(recipe_id).await?;
        let path = self.result_path(recipe_id);
        let file = tokio::fs::File::create(&path)
            .await
            .with_context(|| format!("failed to create batch {}", path.display()))?;
        Ok(BatchWriter {
            path,
            file,
            lines: 0,
        })
    }
}

/// Appends one JSON document per line.
pub struct BatchWriter {
    path: PathBuf,
    file: tokio::fs::File,
    lines: usize,
}

impl BatchWriter {
    pub async fn append(&mut self, value: &Value) -> Result<()> {
        let mut line = serde_json::to_vec(value)?;
        line.push(b'\n');
        self.file
            .write_all(&line)
            .await
            .with_context(|| format!("failed to append to {}", self.path.display()))?;
        self.lines += 1;
        Ok(())
    }

    pub fn lines(&self) -> usize {
        self.lines
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush and close the stream, returning its path and line count.
    pub async fn finish(mut self) -> Result<(PathBuf, usize)> {
        self.file.flush().await?;
        Ok((self.path, self.lines))
    }
}
