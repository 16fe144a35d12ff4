// Copyright 2026 Xupopter Contributors
// SPDX-License-Identifier: Apache-2.0

//! Wire form of a block and its conversion into [`Block`].

use super::{Block, BlockAction, Property, RecipeError, StartSource};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// A block exactly as it appears in an inbound recipe document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawBlock {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub details: Value,
}

impl RawBlock {
    fn optional(&self, key: &'static str) -> Result<Option<String>, RecipeError> {
        match self.details.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(other) => Err(RecipeError::InvalidDetail {
                block: self.id.clone(),
                detail: key,
                reason: format!("expected a string, got {other}"),
            }),
        }
    }

    fn required(&self, key: &'static str) -> Result<String, RecipeError> {
        self.optional(key)?.ok_or_else(|| RecipeError::MissingDetail {
            block: self.id.clone(),
            detail: key,
        })
    }
}

impl TryFrom<RawBlock> for Block {
    type Error = RecipeError;

    fn try_from(raw: RawBlock) -> Result<Self, Self::Error> {
        let action = match raw.kind.as_str() {
            "start" => {
                let source = raw.required("source")?;
                match raw.required("type")?.as_str() {
                    "url" => BlockAction::Start(StartSource::Url(source)),
                    "file" => BlockAction::Start(StartSource::File(source)),
                    other => {
                        return Err(RecipeError::InvalidDetail {
                            block: raw.id,
                            detail: "type",
                            reason: format!("expected 'url' or 'file', got '{other}'"),
                        })
                    }
                }
            }
            "input" => BlockAction::Input {
                selector: raw.required("selector")?,
                text: raw.required("text")?,
            },
            "click" => BlockAction::Click {
                selector: raw.required("selector")?,
            },
            "screenshot" => BlockAction::Screenshot,
            "save-html" | "saveHtml" => BlockAction::SaveHtml,
            "jsonschema" | "jsonSchema" => BlockAction::JsonSchema {
                schema_type: raw.required("type")?,
            },
            "paginate" => BlockAction::Paginate {
                selector: raw.optional("selector")?,
                start_block: raw.required("startBlock")?,
            },
            "extract" => BlockAction::Extract {
                selector: raw.required("selector")?,
                property: Property::parse(&raw.required("property")?),
                name: raw.required("name")?,
            },
            other => {
                return Err(RecipeError::UnknownBlockType {
                    block: raw.id.clone(),
                    kind: other.to_string(),
                })
            }
        };

        Ok(Block { id: raw.id, action })
    }
}

impl From<Block> for RawBlock {
    fn from(block: Block) -> Self {
        let kind = block.action.type_name().to_string();
        let details = match block.action {
            BlockAction::Start(source) => json!({
                "type": source.kind(),
                "source": source.location(),
            }),
            BlockAction::Input { selector, text } => json!({ "selector": selector, "text": text }),
            BlockAction::Click { selector } => json!({ "selector": selector }),
            BlockAction::Screenshot | BlockAction::SaveHtml => Value::Null,
            BlockAction::JsonSchema { schema_type } => json!({ "type": schema_type }),
            BlockAction::Paginate {
                selector,
                start_block,
            } => {
                let mut details = Map::new();
                if let Some(selector) = selector {
                    details.insert("selector".into(), Value::String(selector));
                }
                details.insert("startBlock".into(), Value::String(start_block));
                Value::Object(details)
            }
            BlockAction::Extract {
                selector,
                property,
                name,
            } => json!({
                "selector": selector,
                "property": property.as_str(),
                "name": name,
            }),
        };

        RawBlock {
            id: block.id,
            kind,
            details,
        }
    }
}
