//! Decoded subgraph payloads.

use crate::checkpoint::{parse_checkpoint, Checkpoint};
use crate::entity::Entity;
use crate::error::{ProtocolError, ProtocolResult};
use crate::kind::{EntityKind, Shape};
use serde_json::{json, Map, Value};
use tracing::warn;

/// A full snapshot or delta returned by the remote source.
///
/// Holds the raw top-level fields of the GraphQL `data` object plus the
/// checkpoint visible at fetch time. Records are extracted per kind on
/// demand; missing fields simply yield no records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Payload {
    checkpoint: Option<Checkpoint>,
    fields: Map<String, Value>,
}

impl Payload {
    /// Creates an empty payload.
    pub fn new(checkpoint: Option<Checkpoint>) -> Self {
        Self {
            checkpoint,
            fields: Map::new(),
        }
    }

    /// Decodes a GraphQL `data` object.
    ///
    /// The checkpoint is read from `_meta.block.number`; its absence is not
    /// an error here; the caller decides whether it is required.
    pub fn from_data(data: Value) -> ProtocolResult<Self> {
        let Value::Object(mut fields) = data else {
            return Err(ProtocolError::InvalidData("data is not an object".into()));
        };
        let checkpoint = fields
            .remove("_meta")
            .as_ref()
            .and_then(|meta| meta.get("block"))
            .and_then(|block| block.get("number"))
            .and_then(parse_checkpoint);
        Ok(Self { checkpoint, fields })
    }

    /// Sets a raw field.
    pub fn with_field(mut self, name: &str, value: Value) -> Self {
        self.fields.insert(name.to_owned(), value);
        self
    }

    /// Returns the checkpoint reported alongside the data.
    pub fn checkpoint(&self) -> Option<Checkpoint> {
        self.checkpoint
    }

    /// Returns a raw field.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Returns true if the payload carries any field feeding `kind`.
    pub fn contains(&self, kind: EntityKind) -> bool {
        let spec = kind.spec();
        match spec.shape {
            Shape::Collection | Shape::Singleton => self.fields.contains_key(spec.field),
            Shape::Series(_) => self
                .array("tokens")
                .iter()
                .any(|token| token.get(spec.field).is_some()),
        }
    }

    /// Extracts the records of a collection or series kind.
    ///
    /// Elements without a string `id` are dropped with a warning. For a
    /// singleton kind this returns the singleton, if any, as a one-element
    /// vector.
    pub fn records(&self, kind: EntityKind) -> Vec<Entity> {
        let spec = kind.spec();
        match spec.shape {
            Shape::Collection => entities(kind, self.array(spec.field)),
            Shape::Series(_) => {
                let mut out = Vec::new();
                for token in self.array("tokens") {
                    let Some(rows) = token.get(spec.field).and_then(Value::as_array) else {
                        continue;
                    };
                    let parent = json!({
                        "id": token.get("id").cloned().unwrap_or(Value::Null),
                        "symbol": token.get("symbol").cloned().unwrap_or(Value::Null),
                        "name": token.get("name").cloned().unwrap_or(Value::Null),
                    });
                    out.extend(
                        entities(kind, rows)
                            .into_iter()
                            .map(|row| row.with_field("token", parent.clone())),
                    );
                }
                out
            }
            Shape::Singleton => self.singleton(kind).into_iter().collect(),
        }
    }

    /// Extracts a singleton kind.
    pub fn singleton(&self, kind: EntityKind) -> Option<Entity> {
        let value = self.fields.get(kind.spec().field)?;
        let candidate = match value {
            Value::Array(items) => items.first()?.clone(),
            Value::Null => return None,
            other => other.clone(),
        };
        let entity = Entity::from_value(candidate);
        if entity.is_none() {
            warn!(kind = %kind, "dropping singleton without string id");
        }
        entity
    }

    /// Counts records across all top-level fields, for logging.
    pub fn record_count(&self) -> usize {
        self.fields
            .values()
            .map(|value| match value {
                Value::Array(items) => items.len(),
                Value::Null => 0,
                _ => 1,
            })
            .sum()
    }

    fn array(&self, field: &str) -> &[Value] {
        self.fields
            .get(field)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

fn entities(kind: EntityKind, values: &[Value]) -> Vec<Entity> {
    let mut dropped = 0usize;
    let out: Vec<Entity> = values
        .iter()
        .filter_map(|value| {
            let entity = Entity::from_value(value.clone());
            if entity.is_none() {
                dropped += 1;
            }
            entity
        })
        .collect();
    if dropped > 0 {
        warn!(kind = %kind, dropped, "dropping records without string id");
    }
    out
}
