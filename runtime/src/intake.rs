// Copyright 2026 Xupopter Contributors
// SPDX-License-Identifier: Apache-2.0

//! Inbound recipes from a broker queue.
//!
//! Each delivery is acknowledged before it is parsed, so a malformed job is
//! dropped rather than redelivered forever.

use crate::recipe::Recipe;
use crate::sequencer::Sequencer;
use anyhow::{Context, Result};
use futures::StreamExt;
use lapin::options::{BasicAckOptions, BasicConsumeOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::{Connection, ConnectionProperties};
use tracing::{info, warn};

const CONSUMER_TAG: &str = "xupopter";

/// Consume recipe jobs from `queue` until the connection closes.
pub async fn consume_jobs(uri: &str, queue: &str, sequencer: Sequencer) -> Result<()> {
    let connection = Connection::connect(uri, ConnectionProperties::default())
        .await
        .context("failed to open AMQP connection")?;
    let channel = connection
        .create_channel()
        .await
        .context("failed to open AMQP channel")?;
    channel
        .queue_declare(
            queue,
            QueueDeclareOptions {
                durable: true,
                ..QueueDeclareOptions::default()
            },
            FieldTable::default(),
        )
        .await
        .with_context(|| format!("failed to declare queue {queue}"))?;

    let mut consumer = channel
        .basic_consume(
            queue,
            CONSUMER_TAG,
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await
        .with_context(|| format!("failed to consume from {queue}"))?;
    info!("consuming recipe jobs from {queue}");

    while let Some(delivery) = consumer.next().await {
        let delivery = delivery.context("job consumer failed")?;
        delivery
            .ack(BasicAckOptions::default())
            .await
            .context("failed to ack job")?;
        if let Err(e) = accept_job(&sequencer, &delivery.data) {
            warn!("rejected job from {queue}: {e:#}");
        }
    }

    info!("job consumer on {queue} stopped");
    Ok(())
}

/// Parse one job payload and hand it to the sequencer.
pub fn accept_job(sequencer: &Sequencer, payload: &[u8]) -> Result<String> {
    let text = std::str::from_utf8(payload).context("job payload is not UTF-8")?;
    let recipe = Recipe::from_json(text).context("job payload is not a recipe")?;
    let id = recipe.id.clone();
    sequencer.add_recipe(recipe)?;
    Ok(id)
}
