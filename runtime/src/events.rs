// Copyright 2026 Xupopter Contributors
// SPDX-License-Identifier: Apache-2.0

//! Event bus: typed progress events from the sequencer.
//!
//! The EventBus is a `tokio::sync::broadcast` channel carrying
//! [`CrawlEvent`] values. The REST SSE endpoint and the CLI subscribe
//! independently. With no subscribers, events are dropped.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Every event the runtime emits. Serialized to JSON for SSE.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CrawlEvent {
    /// A recipe passed validation and joined the queue.
    RecipeQueued {
        recipe_id: String,
        queue_len: usize,
        timestamp: String,
    },
    /// The sequencer handed a recipe to the engine.
    RecipeStarted {
        recipe_id: String,
        name: String,
        timestamp: String,
    },
    /// A run ended (completed, not found, or aborted).
    RecipeFinished {
        recipe_id: String,
        status: String,
        records: usize,
        elapsed_ms: u64,
    },
    /// A run failed on a malformed recipe or a missing browser.
    RecipeFailed {
        recipe_id: String,
        error: String,
    },
    /// A batch stream reached object storage.
    BatchUploaded {
        recipe_id: String,
        batch: String,
        url: String,
    },
    /// The downstream notification could not be delivered.
    NotificationFailed {
        recipe_id: String,
        error: String,
    },
    /// The queue drained and the consumer stopped.
    QueueIdle,
}

impl CrawlEvent {
    /// The recipe an event concerns, if any.
    pub fn recipe_id(&self) -> Option<&str> {
        match self {
            Self::RecipeQueued { recipe_id, .. }
            | Self::RecipeStarted { recipe_id, .. }
            | Self::RecipeFinished { recipe_id, .. }
            | Self::RecipeFailed { recipe_id, .. }
            | Self::BatchUploaded { recipe_id, .. }
            | Self::NotificationFailed { recipe_id, .. } => Some(recipe_id),
            Self::QueueIdle => None,
        }
    }
}

/// The central event bus.
pub struct EventBus {
    sender: broadcast::Sender<CrawlEvent>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all subscribers. Silently ignores if no subscribers.
    pub fn emit(&self, event: CrawlEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to receive all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<CrawlEvent> {
        self.sender.subscribe()
    }
}

/// Check if an event concerns a specific recipe. Queue-wide events match all.
pub fn event_matches_recipe(event: &CrawlEvent, recipe_id: &str) -> bool {
    event.recipe_id().map_or(true, |id| id == recipe_id)
}

/// RFC 3339 timestamp for the current time.
pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}
