// Copyright 2026 Xupopter Contributors
// SPDX-License-Identifier: Apache-2.0

//! Environment readiness check.

use super::output::{self, mark};
use crate::config::RuntimeConfig;
use crate::renderer::chromium::find_chromium;
use anyhow::Result;
use std::path::Path;

/// Check Chromium availability, writable directories and broker settings.
pub async fn run(config: RuntimeConfig) -> Result<()> {
    let chromium = find_chromium(config.chromium_path.as_deref());
    let dirs = [
        ("public", &config.public_dir),
        ("cache", &config.cache_dir),
        ("storage", &config.storage_dir),
    ];
    let writable: Vec<(&str, &Path, bool)> = dirs
        .iter()
        .map(|(name, dir)| (*name, dir.as_path(), is_writable(dir)))
        .collect();

    if output::is_json() {
        output::print_json(&serde_json::json!({
            "chromium": chromium,
            "directories": writable
                .iter()
                .map(|(name, dir, ok)| serde_json::json!({"name": name, "path": dir, "writable": ok}))
                .collect::<Vec<_>>(),
            "broker": config.broker.as_ref().map(|b| &b.notify_queue),
            "port": config.port,
        }));
        return Ok(());
    }

    println!("xupopter doctor");
    println!("===============");
    println!();
    match &chromium {
        Some(path) => println!("{} Chromium found: {}", mark(true), path.display()),
        None => println!(
            "{} Chromium NOT found; recipes run on static HTML only",
            mark(false)
        ),
    }
    for (name, dir, ok) in &writable {
        println!("{} {name} directory: {}", mark(*ok), dir.display());
    }
    match &config.broker {
        Some(broker) => println!(
            "{} Broker configured, notifications to '{}'",
            mark(true),
            broker.notify_queue
        ),
        None => println!("[--] No broker configured; batch notifications disabled"),
    }
    println!("[--] HTTP port: {}", config.port);

    println!();
    let ready = writable.iter().all(|(_, _, ok)| *ok);
    println!("Status: {}", if ready { "READY" } else { "NOT READY" });
    Ok(())
}

fn is_writable(dir: &Path) -> bool {
    if std::fs::create_dir_all(dir).is_err() {
        return false;
    }
    let marker = dir.join(".xupopter-doctor");
    let ok = std::fs::write(&marker, b"ok").is_ok();
    let _ = std::fs::remove_file(&marker);
    ok
}
