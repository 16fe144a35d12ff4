// Copyright 2026 Xupopter Contributors
// SPDX-License-Identifier: Apache-2.0

//! AMQP 0.9.1 broker binding (lapin).

use super::{BrokerChannel, BrokerConnector};
use anyhow::{Context, Result};
use async_trait::async_trait;
use lapin::options::{BasicPublishOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};

/// Persistent delivery mode.
const PERSISTENT: u8 = 2;

/// Build an `amqp://` URI from its parts.
///
/// `virtual_host` is appended verbatim, so it carries its own leading `/`.
pub fn amqp_uri(user: &str, password: &str, host: &str, port: u16, virtual_host: &str) -> String {
    format!("amqp://{user}:{password}@{host}:{port}{virtual_host}")
}

/// Opens one AMQP connection and channel per burst.
pub struct AmqpConnector {
    uri: String,
}

impl AmqpConnector {
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into() }
    }
}

#[async_trait]
impl BrokerConnector for AmqpConnector {
    async fn connect(&self) -> Result<Box<dyn BrokerChannel>> {
        let connection = Connection::connect(&self.uri, ConnectionProperties::default())
            .await
            .context("failed to open AMQP connection")?;
        let channel = connection
            .create_channel()
            .await
            .context("failed to open AMQP channel")?;
        tracing::debug!("AMQP channel {} open", channel.id());
        Ok(Box::new(AmqpChannel {
            connection,
            channel,
        }))
    }
}

struct AmqpChannel {
    connection: Connection,
    channel: Channel,
}

#[async_trait]
impl BrokerChannel for AmqpChannel {
    async fn declare_queue(&mut self, queue: &str) -> Result<()> {
        self.channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .with_context(|| format!("failed to declare queue {queue}"))?;
        Ok(())
    }

    async fn publish(&mut self, queue: &str, payload: &[u8]) -> Result<()> {
        let confirm = self
            .channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default().with_delivery_mode(PERSISTENT),
            )
            .await
            .with_context(|| format!("failed to publish to {queue}"))?;
        confirm
            .await
            .with_context(|| format!("broker rejected message for {queue}"))?;
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.channel
            .close(200, "bye")
            .await
            .context("failed to close AMQP channel")?;
        self.connection
            .close(200, "bye")
            .await
            .context("failed to close AMQP connection")?;
        Ok(())
    }
}
