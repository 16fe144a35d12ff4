// Copyright 2026 Xupopter Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use xupopter_runtime::cli;
use xupopter_runtime::config::RuntimeConfig;

#[derive(Parser)]
#[command(
    name = "xupopter",
    about = "Xupopter: recipe-driven web extraction",
    version,
    after_help = "Run 'xupopter <command> --help' for details on each command."
)]
struct Cli {
    /// Output results as JSON (machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Suppress non-essential output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API and run queued recipes
    Serve {
        /// Port to listen on (default 8089, or XUPOPTER_PORT)
        #[arg(long)]
        port: Option<u16>,
        /// Also consume recipes from the broker's jobs queue
        #[arg(long)]
        consume_jobs: bool,
    },
    /// Run a single recipe file and print its report
    Run {
        /// Path to a recipe JSON document
        recipe: PathBuf,
    },
    /// Fetch a URL through the retrieval cache
    Fetch {
        url: String,
        /// Bypass the cache for this request
        #[arg(long)]
        no_cache: bool,
    },
    /// Manage the retrieval cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Check environment and diagnose issues
    Doctor,
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Clear cached responses for one URL's host, or everything
    Clear { url: Option<String> },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.json {
        std::env::set_var("XUPOPTER_JSON", "1");
    }
    if cli.quiet {
        std::env::set_var("XUPOPTER_QUIET", "1");
    }

    let mut config = RuntimeConfig::from_env();
    cli::init_logging(cli.log_json || config.log_json, cli.verbose);

    let result = match cli.command {
        Commands::Serve { port, consume_jobs } => {
            if let Some(port) = port {
                config.port = port;
            }
            cli::serve::run(config, consume_jobs).await
        }
        Commands::Run { recipe } => cli::run_cmd::run(config, &recipe).await,
        Commands::Fetch { url, no_cache } => cli::fetch_cmd::run(config, &url, no_cache).await,
        Commands::Cache { action } => match action {
            CacheAction::Clear { url } => cli::cache_cmd::run_clear(config, url.as_deref()).await,
        },
        Commands::Doctor => cli::doctor::run(config).await,
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "xupopter", &mut std::io::stdout());
            Ok(())
        }
    };

    // Consistent exit codes: 0=success, 1=error
    if let Err(e) = &result {
        if cli::output::is_json() {
            cli::output::print_json(&serde_json::json!({
                "error": true,
                "message": format!("{e:#}"),
            }));
        } else if !cli::output::is_quiet() {
            eprintln!("  Error: {e:#}");
        }
        std::process::exit(1);
    }

    result
}
