//! Core runtime types: identities, provenance, sourced values, triggers

pub mod entity;
pub mod source;
pub mod sourced_value;
pub mod trigger;
pub mod types;

pub use entity::{EntityId, EntityStore, GameEntity};
pub use source::{SourceArena, SourceId};
pub use sourced_value::{SourcedValue, SourcedValueCollection};
pub use trigger::{Trigger, TriggerData, TriggerType};
pub use types::{AbilityName, CommandName, TriggerKey};
