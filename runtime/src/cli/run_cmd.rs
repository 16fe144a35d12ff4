// Copyright 2026 Xupopter Contributors
// SPDX-License-Identifier: Apache-2.0

//! Execute one recipe in the foreground.

use super::output;
use super::Services;
use crate::config::RuntimeConfig;
use crate::crawler::{RunReport, RunStatus};
use crate::recipe::Recipe;
use anyhow::{Context, Result};
use std::path::Path;

/// Run the recipe at `path` and print its report.
pub async fn run(config: RuntimeConfig, path: &Path) -> Result<()> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let recipe = Recipe::from_json(&text)
        .with_context(|| format!("{} is not a recipe", path.display()))?;
    recipe.validate()?;

    let services = Services::build(&config)?;
    let report = services.engine.run(&recipe).await;
    let _ = services.browser.shutdown().await;
    let report = report?;

    if output::is_json() {
        output::print_json(&report);
    } else if !output::is_quiet() {
        print_summary(&report);
    }
    Ok(())
}

fn print_summary(report: &RunReport) {
    let ok = report.status == RunStatus::Completed;
    let status = match &report.status {
        RunStatus::Completed => "completed".to_string(),
        RunStatus::NotFound => "page not found".to_string(),
        RunStatus::Aborted(reason) => format!("aborted: {reason}"),
    };
    eprintln!(
        "  {} {} {status} in {}ms ({} records)",
        output::mark(ok),
        report.recipe_id,
        report.elapsed_ms,
        report.records
    );
    if let Some(artifact) = &report.artifact {
        eprintln!("  Result: {}", artifact.display());
    }
}
