// Copyright 2026 Xupopter Contributors
// SPDX-License-Identifier: Apache-2.0

//! Run the long-lived extraction service.

use super::Services;
use crate::audit::AuditLogger;
use crate::config::RuntimeConfig;
use crate::dispatch::amqp::AmqpConnector;
use crate::dispatch::Dispatcher;
use crate::events::EventBus;
use crate::intake;
use crate::rest::{self, AppState};
use crate::sequencer::Sequencer;
use crate::storage::LocalObjectStore;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Serve the HTTP API until interrupted.
pub async fn run(config: RuntimeConfig, consume_jobs: bool) -> Result<()> {
    info!("starting xupopter v{}", env!("CARGO_PKG_VERSION"));

    for dir in [&config.public_dir, &config.cache_dir, &config.storage_dir] {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }

    let services = Services::build(&config)?;
    let ledger = AuditLogger::open(&config.ledger_path)?;
    let storage = LocalObjectStore::new(config.storage_dir.clone(), &config.storage_base_url);

    let mut builder = Sequencer::builder(Arc::clone(&services.engine))
        .events(Arc::new(EventBus::new(256)))
        .storage(Arc::new(storage))
        .ledger(ledger);
    match &config.broker {
        Some(broker) => {
            info!("batch notifications go to queue {}", broker.notify_queue);
            let connector = Arc::new(AmqpConnector::new(broker.uri.clone()));
            builder = builder.dispatcher(Arc::new(Dispatcher::with_queue(
                connector,
                &broker.notify_queue,
            )));
        }
        None => warn!("no broker configured; batch notifications are disabled"),
    }
    let sequencer = builder.build();

    if consume_jobs {
        let jobs = config
            .broker
            .as_ref()
            .and_then(|b| b.jobs_queue.as_ref().map(|q| (b.uri.clone(), q.clone())));
        match jobs {
            Some((uri, queue)) => {
                let sequencer = sequencer.clone();
                tokio::spawn(async move {
                    if let Err(e) = intake::consume_jobs(&uri, &queue, sequencer).await {
                        error!("job consumer stopped: {e:#}");
                    }
                });
            }
            None => warn!("--consume-jobs needs a broker and XUPOPTER_JOBS_QUEUE; ignoring"),
        }
    }

    let state = Arc::new(AppState {
        sequencer,
        public_dir: config.public_dir.clone(),
        storage_dir: Some(config.storage_dir.clone()),
    });

    tokio::select! {
        result = rest::start(config.port, state) => result?,
        _ = tokio::signal::ctrl_c() => info!("received shutdown signal"),
    }

    if let Err(e) = services.browser.shutdown().await {
        warn!("browser shutdown failed: {e:#}");
    }
    info!("xupopter stopped");
    Ok(())
}
