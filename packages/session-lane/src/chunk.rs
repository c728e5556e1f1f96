//! Producer output units.
//!
//! Producers emit either a bare value or a (content, metadata) pair. The shape
//! is decided once, where the producer's output is first observed, and every
//! later stage matches on the variant.

use serde_json::{json, Value};

/// One unit of incremental output from a streaming producer.
#[derive(Debug, Clone, PartialEq)]
pub enum Chunk {
    /// A bare value.
    Value(Value),
    /// Content with attached metadata.
    WithMeta { content: Value, meta: Value },
}

impl Chunk {
    pub fn value(value: impl Into<Value>) -> Self {
        Chunk::Value(value.into())
    }

    pub fn with_meta(content: impl Into<Value>, meta: impl Into<Value>) -> Self {
        Chunk::WithMeta {
            content: content.into(),
            meta: meta.into(),
        }
    }

    /// Classify output from an untyped producer that emits raw JSON.
    ///
    /// A JSON array of exactly two elements is a (content, metadata) pair;
    /// anything else is a bare value. Typed producers build [`Chunk::value`]
    /// or [`Chunk::with_meta`] directly and never go through this.
    pub fn from_raw(raw: Value) -> Self {
        match raw {
            Value::Array(mut items) if items.len() == 2 => {
                let meta = items.pop().unwrap_or(Value::Null);
                let content = items.pop().unwrap_or(Value::Null);
                Chunk::WithMeta { content, meta }
            }
            other => Chunk::Value(other),
        }
    }

    /// The content part, whichever shape this chunk has.
    pub fn content(&self) -> &Value {
        match self {
            Chunk::Value(value) => value,
            Chunk::WithMeta { content, .. } => content,
        }
    }

    pub fn meta(&self) -> Option<&Value> {
        match self {
            Chunk::Value(_) => None,
            Chunk::WithMeta { meta, .. } => Some(meta),
        }
    }

    /// Payload carried by a `chunk` frame.
    pub fn payload(&self) -> Value {
        match self {
            Chunk::Value(value) => json!({ "chunk": value }),
            Chunk::WithMeta { content, meta } => json!({ "chunk": content, "meta": meta }),
        }
    }
}

impl From<(Value, Value)> for Chunk {
    fn from((content, meta): (Value, Value)) -> Self {
        Chunk::WithMeta { content, meta }
    }
}

impl From<Value> for Chunk {
    fn from(value: Value) -> Self {
        Chunk::Value(value)
    }
}
