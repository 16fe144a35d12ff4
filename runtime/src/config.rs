// Copyright 2026 Xupopter Contributors
// SPDX-License-Identifier: Apache-2.0

//! Runtime configuration from `XUPOPTER_*` and `RABBITMQ_*` environment variables.

use crate::crawler::EngineSettings;
use crate::dispatch::amqp::amqp_uri;
use crate::dispatch::DEFAULT_QUEUE;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 8089;
const DEFAULT_BROWSER_IDLE_SECS: u64 = 15 * 60;
const DEFAULT_SELECTOR_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_NAVIGATION_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_SETTLE_DELAY_MS: u64 = 5_000;
const DEFAULT_HTTP_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_AMQP_PORT: u16 = 5672;

/// Where batch notifications go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerConfig {
    pub uri: String,
    pub notify_queue: String,
    /// Queue to consume inbound recipes from, if any.
    pub jobs_queue: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Root for everything the runtime writes (`~/.xupopter`).
    pub home: PathBuf,
    pub public_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub storage_dir: PathBuf,
    pub storage_base_url: String,
    pub ledger_path: PathBuf,
    pub browser_profile_dir: PathBuf,
    pub chromium_path: Option<PathBuf>,
    pub port: u16,
    pub browser_idle: Duration,
    pub selector_timeout: Duration,
    pub navigation_timeout: Duration,
    pub settle_delay: Duration,
    pub http_timeout_ms: u64,
    pub log_json: bool,
    pub broker: Option<BrokerConfig>,
}

impl RuntimeConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let env = Env(lookup);

        let home = env.path("XUPOPTER_HOME").unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("/tmp"))
                .join(".xupopter")
        });
        let port = env.parse("XUPOPTER_PORT").unwrap_or(DEFAULT_PORT);

        Self {
            public_dir: env.path("XUPOPTER_PUBLIC_DIR").unwrap_or_else(|| home.join("public")),
            cache_dir: env.path("XUPOPTER_CACHE_DIR").unwrap_or_else(|| home.join("cache")),
            storage_dir: env
                .path("XUPOPTER_STORAGE_DIR")
                .unwrap_or_else(|| home.join("storage")),
            storage_base_url: env
                .string("XUPOPTER_STORAGE_URL")
                .unwrap_or_else(|| format!("http://127.0.0.1:{port}/storage")),
            ledger_path: env
                .path("XUPOPTER_LEDGER")
                .unwrap_or_else(|| home.join("runs.jsonl")),
            browser_profile_dir: home.join("crawler"),
            chromium_path: env.path("XUPOPTER_CHROMIUM_PATH"),
            port,
            browser_idle: Duration::from_secs(
                env.parse("XUPOPTER_BROWSER_IDLE_SECS")
                    .unwrap_or(DEFAULT_BROWSER_IDLE_SECS),
            ),
            selector_timeout: Duration::from_millis(
                env.parse("XUPOPTER_SELECTOR_TIMEOUT_MS")
                    .unwrap_or(DEFAULT_SELECTOR_TIMEOUT_MS),
            ),
            navigation_timeout: Duration::from_millis(
                env.parse("XUPOPTER_NAVIGATION_TIMEOUT_MS")
                    .unwrap_or(DEFAULT_NAVIGATION_TIMEOUT_MS),
            ),
            settle_delay: Duration::from_millis(
                env.parse("XUPOPTER_SETTLE_DELAY_MS")
                    .unwrap_or(DEFAULT_SETTLE_DELAY_MS),
            ),
            http_timeout_ms: env
                .parse("XUPOPTER_HTTP_TIMEOUT_MS")
                .unwrap_or(DEFAULT_HTTP_TIMEOUT_MS),
            log_json: env.flag("XUPOPTER_LOG_JSON"),
            broker: broker_config(&env),
            home,
        }
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            selector_timeout: self.selector_timeout,
            navigation_timeout: self.navigation_timeout,
            settle_delay: self.settle_delay,
        }
    }
}

/// `XUPOPTER_AMQP_URL` wins; otherwise the `RABBITMQ_*` parts, when a host is set.
fn broker_config<F: Fn(&str) -> Option<String>>(env: &Env<F>) -> Option<BrokerConfig> {
    let uri = match env.string("XUPOPTER_AMQP_URL") {
        Some(uri) => uri,
        None => {
            let host = env.string("RABBITMQ_SERVICE_NAME")?;
            amqp_uri(
                &env.string("RABBITMQ_USER").unwrap_or_else(|| "guest".into()),
                &env.string("RABBITMQ_PASSWORD").unwrap_or_else(|| "guest".into()),
                &host,
                env.parse("RABBITMQ_PORT").unwrap_or(DEFAULT_AMQP_PORT),
                &env.string("RABBITMQ_VIRTUAL_HOST").unwrap_or_else(|| "/".into()),
            )
        }
    };
    Some(BrokerConfig {
        uri,
        notify_queue: env
            .string("XUPOPTER_NOTIFY_QUEUE")
            .unwrap_or_else(|| DEFAULT_QUEUE.to_string()),
        jobs_queue: env.string("XUPOPTER_JOBS_QUEUE"),
    })
}

/// Typed accessors over a variable source. Empty values count as unset.
struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.0)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn path(&self, name: &str) -> Option<PathBuf> {
        self.string(name).map(PathBuf::from)
    }

    fn parse<T: std::str::FromStr>(&self, name: &str) -> Option<T> {
        self.string(name).and_then(|v| v.parse().ok())
    }

    fn flag(&self, name: &str) -> bool {
        matches!(
            self.string(name).as_deref(),
            Some("1") | Some("true") | Some("yes")
        )
    }
}
