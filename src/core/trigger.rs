//! Trigger events and the mutable record they carry

use crate::core::{EntityId, SourceId, TriggerKey};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// How a trigger's reactions are invoked and what the caller reads back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TriggerType {
    /// Fire-and-observe: every interested holder reacts, nothing is read back
    Implicit,
    /// Invoked on one holder; the result is ignored
    Explicit,
    /// Invoked on one holder; reactions mutate the record the caller reads back
    ExplicitData,
    /// Broadcast: every interested holder rewrites fields of one shared
    /// record in turn, producing a negotiated final value
    DataOverride,
}

/// A single dispatch of a named event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    pub key: TriggerKey,
    pub kind: TriggerType,
    /// What caused the event
    pub source: SourceId,
    /// Holder the trigger was aimed at (`None` for broadcasts)
    pub holder: Option<EntityId>,
}

impl Trigger {
    pub fn new(key: impl Into<TriggerKey>, kind: TriggerType, source: SourceId) -> Self {
        Trigger {
            key: key.into(),
            kind,
            source,
            holder: None,
        }
    }

    pub fn aimed_at(mut self, holder: EntityId) -> Self {
        self.holder = Some(holder);
        self
    }
}

/// Free-form field record passed through a dispatch
///
/// Explicit-data and data-override reactions rewrite fields in place; the
/// caller reads the negotiated values afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriggerData {
    fields: Map<String, Value>,
}

impl TriggerData {
    pub fn new() -> Self {
        TriggerData { fields: Map::new() }
    }

    /// Builder-style field setter
    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.set(field, value);
        self
    }

    pub fn set(&mut self, field: &str, value: impl Into<Value>) {
        self.fields.insert(field.to_string(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn get_i64(&self, field: &str) -> Option<i64> {
        self.fields.get(field).and_then(Value::as_i64)
    }

    pub fn get_bool(&self, field: &str) -> Option<bool> {
        self.fields.get(field).and_then(Value::as_bool)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    /// Entity ids travel as plain integers
    pub fn get_entity(&self, field: &str) -> Option<EntityId> {
        self.get_i64(field)
            .and_then(|raw| u32::try_from(raw).ok())
            .map(EntityId::new)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}
