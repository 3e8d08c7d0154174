//! Compilation of bulk intents into the store's batch instruction sequence.
//!
//! A bulk request is a flat list of action headers, each followed by its body when
//! the action has one. [`compile_bulk`] builds that list from typed [`BulkItem`]s,
//! coercing every payload against the collection schema on the way.
//!
//! # Example
//!
//! ```ignore
//! use indexlayer::bulk::{compile_bulk, BulkItem};
//! use serde_json::json;
//!
//! let instructions = compile_bulk(
//!     &[
//!         BulkItem::create("1", json!({ "title": "first" })),
//!         BulkItem::update("2", json!({})),
//!         BulkItem::delete("3"),
//!     ],
//!     &schema,
//! )?;
//!
//! // create header + body, then the delete header. The empty update is elided.
//! assert_eq!(instructions.len(), 3);
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    coerce::{coerce_value, project_output},
    error::IndexStoreResult,
    schema::FieldSchema,
};

/// A single create, update or delete intent.
///
/// Deserializes from `{"type": "create", "_id": "1", "doc": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BulkItem {
    /// Index a new document. Fails per item if the id already exists.
    Create {
        #[serde(rename = "_id")]
        id: String,
        doc: Value,
    },
    /// Merge the supplied fields into an existing document.
    Update {
        #[serde(rename = "_id")]
        id: String,
        doc: Value,
    },
    /// Remove a document.
    Delete {
        #[serde(rename = "_id")]
        id: String,
    },
}

impl BulkItem {
    pub fn create(id: impl Into<String>, doc: Value) -> Self {
        BulkItem::Create { id: id.into(), doc }
    }

    pub fn update(id: impl Into<String>, doc: Value) -> Self {
        BulkItem::Update { id: id.into(), doc }
    }

    pub fn delete(id: impl Into<String>) -> Self {
        BulkItem::Delete { id: id.into() }
    }

    pub fn id(&self) -> &str {
        match self {
            BulkItem::Create { id, .. } | BulkItem::Update { id, .. } | BulkItem::Delete { id } => id,
        }
    }
}

/// Action header of a bulk instruction pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkAction {
    Create {
        #[serde(rename = "_id")]
        id: String,
    },
    Update {
        #[serde(rename = "_id")]
        id: String,
    },
    Delete {
        #[serde(rename = "_id")]
        id: String,
    },
}

impl BulkAction {
    pub fn id(&self) -> &str {
        match self {
            BulkAction::Create { id } | BulkAction::Update { id } | BulkAction::Delete { id } => id,
        }
    }

    /// Name of the action as it appears on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            BulkAction::Create { .. } => "create",
            BulkAction::Update { .. } => "update",
            BulkAction::Delete { .. } => "delete",
        }
    }

    /// Whether the action is followed by a body line.
    pub fn has_body(&self) -> bool {
        !matches!(self, BulkAction::Delete { .. })
    }
}

/// One line of a bulk request.
///
/// Serializes to the store's line shapes: `{"create":{"_id":"1"}}`, the document
/// itself, `{"doc":{...}}` for partial updates, and `{"delete":{"_id":"3"}}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum BulkInstruction {
    /// Action header.
    Action(BulkAction),
    /// Partial document body of an update.
    PartialDocument { doc: Map<String, Value> },
    /// Full document body of a create.
    Document(Map<String, Value>),
}

/// Flattens bulk intents into the store's instruction sequence.
///
/// Input order is preserved and every header is immediately followed by its body.
/// An update whose payload coerces to nothing emits no instructions at all.
///
/// # Errors
///
/// Returns [`IndexStoreError::InvalidDocument`](crate::error::IndexStoreError::InvalidDocument)
/// if any payload cannot be coerced into the schema. Nothing is emitted in that case.
pub fn compile_bulk(items: &[BulkItem], schema: &FieldSchema) -> IndexStoreResult<Vec<BulkInstruction>> {
    let mut instructions = Vec::with_capacity(items.len() * 2);

    for item in items {
        match item {
            BulkItem::Delete { id } => {
                instructions.push(BulkInstruction::Action(BulkAction::Delete { id: id.clone() }));
            }
            BulkItem::Create { id, doc } => {
                let data = coerce_value(doc, schema)?;

                instructions.push(BulkInstruction::Action(BulkAction::Create { id: id.clone() }));
                instructions.push(BulkInstruction::Document(project_output(&data, schema)));
            }
            BulkItem::Update { id, doc } => {
                let data = coerce_value(doc, schema)?;

                if data.is_empty() {
                    tracing::trace!(id = %id, "skipping empty bulk update");
                    continue;
                }

                instructions.push(BulkInstruction::Action(BulkAction::Update { id: id.clone() }));
                instructions.push(BulkInstruction::PartialDocument {
                    doc: project_output(&data, schema),
                });
            }
        }
    }

    Ok(instructions)
}
