// Copyright 2026 Xupopter Contributors
// SPDX-License-Identifier: Apache-2.0

//! Outbound notifications over a message broker.
//!
//! The [`Dispatcher`] walks the connection through
//! `Disconnected → Connecting → Connected → Disconnecting → Disconnected`
//! for every burst of messages. The caller that finds it disconnected
//! becomes the drainer: it connects, publishes every queued message in
//! submission order, one at a time, and tears the connection down once
//! the queue is empty. Everyone else only enqueues. No connection is kept
//! idle between bursts and nothing survives a restart.

pub mod amqp;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Queue that receives batch notifications.
pub const DEFAULT_QUEUE: &str = "updateDataImport";

/// Broker connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

#[derive(thiserror::Error, Debug)]
pub enum DispatchError {
    #[error("could not connect to broker: {0:#}")]
    Connect(anyhow::Error),

    #[error("message not dispatched: {message}: {reason:#}")]
    Publish {
        message: String,
        reason: anyhow::Error,
    },
}

/// Opens broker channels.
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn BrokerChannel>>;
}

/// An open broker channel.
#[async_trait]
pub trait BrokerChannel: Send {
    /// Declare a durable queue. Declaring an existing queue is a no-op.
    async fn declare_queue(&mut self, queue: &str) -> Result<()>;
    async fn publish(&mut self, queue: &str, payload: &[u8]) -> Result<()>;
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Payload announcing a finished batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    /// Recipe the batch belongs to.
    pub parent: String,
    /// Run identifier of the batch.
    pub batch: String,
    /// Public location of the uploaded batch stream.
    pub url: String,
}

struct DispatchState {
    state: ConnectionState,
    pending: VecDeque<String>,
    in_flight: bool,
}

/// Connection-state-machine publisher with submission-order queueing.
pub struct Dispatcher {
    connector: Arc<dyn BrokerConnector>,
    queue: String,
    inner: Mutex<DispatchState>,
}

impl Dispatcher {
    pub fn new(connector: Arc<dyn BrokerConnector>) -> Self {
        Self::with_queue(connector, DEFAULT_QUEUE)
    }

    pub fn with_queue(connector: Arc<dyn BrokerConnector>, queue: &str) -> Self {
        Self {
            connector,
            queue: queue.to_string(),
            inner: Mutex::new(DispatchState {
                state: ConnectionState::Disconnected,
                pending: VecDeque::new(),
                in_flight: false,
            }),
        }
    }

    pub fn queue_name(&self) -> &str {
        &self.queue
    }

    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    /// Messages waiting for a publish slot.
    pub fn pending(&self) -> usize {
        self.lock().pending.len()
    }

    /// Whether a publish is currently outstanding.
    pub fn in_flight(&self) -> bool {
        self.lock().in_flight
    }

    /// Serialize and dispatch a batch notification.
    pub async fn notify(&self, notification: &Notification) -> Result<(), DispatchError> {
        let payload =
            serde_json::to_string(notification).map_err(|e| DispatchError::Publish {
                message: format!("{notification:?}"),
                reason: e.into(),
            })?;
        self.dispatch(payload).await
    }

    /// Submit a message.
    ///
    /// Returns once the message is queued behind a connection another caller
    /// is already driving, or, for the caller that starts the connection,
    /// once the whole queue has been flushed. A publish failure tears the
    /// connection down and is reported to the caller driving it. Messages
    /// queued behind the failed one stay pending until the next `dispatch`
    /// starts a new burst.
    pub async fn dispatch(&self, message: String) -> Result<(), DispatchError> {
        {
            let mut inner = self.lock();
            inner.pending.push_back(message);
            if inner.state != ConnectionState::Disconnected {
                debug!(
                    "broker busy ({:?}), {} message(s) queued",
                    inner.state,
                    inner.pending.len()
                );
                return Ok(());
            }
            inner.state = ConnectionState::Connecting;
        }
        self.drain().await
    }

    async fn drain(&self) -> Result<(), DispatchError> {
        loop {
            let mut channel = match self.connector.connect().await {
                Ok(channel) => channel,
                Err(e) => {
                    self.set_state(ConnectionState::Disconnected);
                    return Err(DispatchError::Connect(e));
                }
            };
            self.set_state(ConnectionState::Connected);

            while let Some(message) = self.next_message() {
                let sent = match channel.declare_queue(&self.queue).await {
                    Ok(()) => channel.publish(&self.queue, message.as_bytes()).await,
                    Err(e) => Err(e),
                };
                if let Err(reason) = sent {
                    self.teardown(channel).await;
                    self.finish_publish();
                    self.set_state(ConnectionState::Disconnected);
                    let stranded = self.pending();
                    if stranded > 0 {
                        warn!("{stranded} message(s) stay queued until the next dispatch");
                    }
                    return Err(DispatchError::Publish { message, reason });
                }
                self.finish_publish();
                info!("message dispatched: {message}");
            }

            self.teardown(channel).await;

            let drained = {
                let mut inner = self.lock();
                if inner.pending.is_empty() {
                    inner.state = ConnectionState::Disconnected;
                    true
                } else {
                    // A burst arrived while the connection was closing.
                    inner.state = ConnectionState::Connecting;
                    false
                }
            };
            if drained {
                return Ok(());
            }
        }
    }

    async fn teardown(&self, channel: Box<dyn BrokerChannel>) {
        self.set_state(ConnectionState::Disconnecting);
        if let Err(e) = channel.close().await {
            warn!("broker connection did not close cleanly: {e:#}");
        }
    }

    fn next_message(&self) -> Option<String> {
        let mut inner = self.lock();
        let message = inner.pending.pop_front();
        inner.in_flight = message.is_some();
        message
    }

    fn finish_publish(&self) {
        self.lock().in_flight = false;
    }

    fn set_state(&self, state: ConnectionState) {
        self.lock().state = state;
    }

    fn lock(&self) -> MutexGuard<'_, DispatchState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
