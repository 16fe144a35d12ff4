// Copyright 2026 Xupopter Contributors
// SPDX-License-Identifier: Apache-2.0

//! JSONL run ledger: append-only log of every finished run.
//!
//! Features:
//! - Append-only JSONL format for easy parsing
//! - Automatic log rotation when file exceeds `MAX_LOG_SIZE` (100MB)
//! - Rotated files named `.1`, `.2`, etc. (max 5 rotations)

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Maximum ledger size before rotation (100 MB).
const MAX_LOG_SIZE: u64 = 100 * 1024 * 1024;

/// Maximum number of rotated ledger files to keep.
const MAX_ROTATIONS: u32 = 5;

/// One ledger line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEvent {
    pub timestamp: String,
    pub recipe_id: String,
    pub origin: String,
    pub status: String,
    pub records: usize,
    pub artifact: Option<String>,
    /// Public URL of the uploaded batch, for file-origin runs.
    pub upload: Option<String>,
    pub duration_ms: u64,
}

impl AuditEvent {
    pub fn new(recipe_id: &str, origin: &str, status: &str) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            recipe_id: recipe_id.to_string(),
            origin: origin.to_string(),
            status: status.to_string(),
            records: 0,
            artifact: None,
            upload: None,
            duration_ms: 0,
        }
    }
}

/// Append-only JSONL ledger with automatic rotation.
pub struct AuditLogger {
    file: File,
    path: PathBuf,
    max_size: u64,
    /// Approximate current size (may drift slightly; re-checked on rotation).
    current_size: u64,
}

impl AuditLogger {
    /// Open or create the ledger file.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open run ledger: {}", path.display()))?;

        let current_size = file.metadata().map(|m| m.len()).unwrap_or(0);

        Ok(Self {
            file,
            path: path.to_path_buf(),
            max_size: MAX_LOG_SIZE,
            current_size,
        })
    }

    /// Rotate once the file reaches `bytes` instead of the default 100 MB.
    pub fn with_max_size(mut self, bytes: u64) -> Self {
        self.max_size = bytes;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event.
    pub fn log(&mut self, event: &AuditEvent) -> Result<()> {
        if self.current_size >= self.max_size {
            self.rotate()?;
        }

        let json = serde_json::to_string(event)?;
        writeln!(self.file, "{json}").context("failed to append to run ledger")?;
        self.current_size += json.len() as u64 + 1;
        Ok(())
    }

    /// Rotate ledger files: runs.jsonl → runs.jsonl.1, .1 → .2, etc.
    fn rotate(&mut self) -> Result<()> {
        self.file.flush()?;

        // The oldest generation falls off the end.
        let oldest = rotation_path(&self.path, MAX_ROTATIONS);
        if oldest.exists() {
            let _ = std::fs::remove_file(&oldest);
        }
        for i in (1..MAX_ROTATIONS).rev() {
            let from = rotation_path(&self.path, i);
            if from.exists() {
                let _ = std::fs::rename(&from, rotation_path(&self.path, i + 1));
            }
        }
        let _ = std::fs::rename(&self.path, rotation_path(&self.path, 1));

        self.file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .context("failed to reopen run ledger after rotation")?;
        self.current_size = 0;

        Ok(())
    }
}

/// Build path for a rotated ledger file: `runs.jsonl.1`, `runs.jsonl.2`, etc.
fn rotation_path(base: &Path, index: u32) -> PathBuf {
    let name = format!(
        "{}.{index}",
        base.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("runs.jsonl")
    );
    base.with_file_name(name)
}
