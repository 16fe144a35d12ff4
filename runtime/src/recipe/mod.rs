// Copyright 2026 Xupopter Contributors
// SPDX-License-Identifier: Apache-2.0

//! Recipe model: the declarative description of one extraction task.
//!
//! Inbound documents carry loosely typed `{id, type, details}` blocks. They
//! are converted into the closed [`BlockAction`] enum exactly once, while
//! deserializing, so the crawler never has to second-guess a payload.

mod raw;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub use raw::RawBlock;

/// Errors raised while ingesting or validating a recipe.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RecipeError {
    #[error("recipe id is empty")]
    EmptyId,

    #[error("recipe id '{0}' cannot name an artifact directory")]
    UnsafeId(String),

    #[error("recipe has no blocks")]
    NoBlocks,

    #[error("first block '{0}' does not declare a detail type")]
    MissingStartType(String),

    #[error("duplicate block id '{0}'")]
    DuplicateBlock(String),

    #[error("block '{block}' has unknown type '{kind}'")]
    UnknownBlockType { block: String, kind: String },

    #[error("block '{block}' is missing detail '{detail}'")]
    MissingDetail { block: String, detail: &'static str },

    #[error("block '{block}' has invalid detail '{detail}': {reason}")]
    InvalidDetail {
        block: String,
        detail: &'static str,
        reason: String,
    },
}

/// Shape of the produced result document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpectedOutput {
    /// One record per matched element.
    #[default]
    List,
    /// All records folded into a single record.
    Item,
}

/// Where a `start` block takes its input from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartSource {
    /// Navigate to a single page.
    Url(String),
    /// Download a newline-delimited list of URLs and crawl each one.
    File(String),
}

impl StartSource {
    /// The URL carried by either variant.
    pub fn location(&self) -> &str {
        match self {
            Self::Url(s) | Self::File(s) => s,
        }
    }

    /// The kind of start, without the payload.
    pub fn kind(&self) -> StartKind {
        match self {
            Self::Url(_) => StartKind::Url,
            Self::File(_) => StartKind::File,
        }
    }
}

/// Discriminant of [`StartSource`], used to route post-processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartKind {
    Url,
    File,
}

/// Which value an `extract` block reads from each matched element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Property {
    /// Rendered text.
    Text,
    /// Inner markup.
    Html,
    /// A raw element property or attribute (`src`, `href`, `value`, ...).
    Attribute(String),
}

impl Property {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "text" => Self::Text,
            "html" => Self::Html,
            other => Self::Attribute(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Text => "text",
            Self::Html => "html",
            Self::Attribute(name) => name,
        }
    }
}

/// One typed action step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockAction {
    Start(StartSource),
    Input {
        selector: String,
        text: String,
    },
    Click {
        selector: String,
    },
    Screenshot,
    SaveHtml,
    JsonSchema {
        schema_type: String,
    },
    Paginate {
        selector: Option<String>,
        start_block: String,
    },
    Extract {
        selector: String,
        property: Property,
        name: String,
    },
}

impl BlockAction {
    /// The `details.type` value a block declares, if its kind has one.
    pub fn detail_type(&self) -> Option<&str> {
        match self {
            Self::Start(StartSource::Url(_)) => Some("url"),
            Self::Start(StartSource::File(_)) => Some("file"),
            Self::JsonSchema { schema_type } => Some(schema_type),
            _ => None,
        }
    }

    /// Wire name of the block type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Start(_) => "start",
            Self::Input { .. } => "input",
            Self::Click { .. } => "click",
            Self::Screenshot => "screenshot",
            Self::SaveHtml => "save-html",
            Self::JsonSchema { .. } => "jsonschema",
            Self::Paginate { .. } => "paginate",
            Self::Extract { .. } => "extract",
        }
    }
}

/// A recipe block: identifier plus typed action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawBlock", into = "RawBlock")]
pub struct Block {
    pub id: String,
    pub action: BlockAction,
}

/// A named, ordered sequence of blocks defining one extraction task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipe {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub blocks: Vec<Block>,
    #[serde(default)]
    pub expected_output: ExpectedOutput,
}

impl Recipe {
    /// Parse a recipe document from JSON.
    pub fn from_json(input: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(input)?)
    }

    /// Check the intake invariants. Invalid recipes must never be queued.
    pub fn validate(&self) -> Result<(), RecipeError> {
        if self.id.trim().is_empty() {
            return Err(RecipeError::EmptyId);
        }
        if self.id.starts_with('.') || self.id.contains(['/', '\\']) {
            return Err(RecipeError::UnsafeId(self.id.clone()));
        }
        let first = self.blocks.first().ok_or(RecipeError::NoBlocks)?;
        if first.action.detail_type().is_none() {
            return Err(RecipeError::MissingStartType(first.id.clone()));
        }

        let mut seen = HashSet::with_capacity(self.blocks.len());
        for block in &self.blocks {
            if !seen.insert(block.id.as_str()) {
                return Err(RecipeError::DuplicateBlock(block.id.clone()));
            }
        }
        Ok(())
    }

    /// Index of the block with the given identifier.
    pub fn position(&self, block_id: &str) -> Option<usize> {
        self.blocks.iter().position(|b| b.id == block_id)
    }

    /// The first `start` block's source, if the recipe has one.
    pub fn start_source(&self) -> Option<&StartSource> {
        self.blocks.iter().find_map(|b| match &b.action {
            BlockAction::Start(source) => Some(source),
            _ => None,
        })
    }

    /// How the recipe obtains its pages.
    pub fn origin(&self) -> StartKind {
        self.start_source()
            .map(StartSource::kind)
            .unwrap_or(StartKind::Url)
    }

    /// Structural copy of this recipe whose first block navigates to `url`.
    ///
    /// Used to expand a file-origin recipe into one sub-recipe per listed URL.
    pub fn with_start_url(&self, url: &str) -> Self {
        let mut copy = self.clone();
        if let Some(first) = copy.blocks.first_mut() {
            first.action = BlockAction::Start(StartSource::Url(url.to_string()));
        }
        copy
    }
}
