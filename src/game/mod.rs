//! Duel state, abilities, ongoing effects and trigger dispatch

pub mod ability;
pub mod dispatch;
pub mod effects;
pub mod logger;
pub mod reference;
pub mod state;

pub use ability::{Ability, AbilityBuilder, AbilityCatalogue, ReactionFn};
pub use effects::{EffectId, EffectTrigger, OngoingEffect, OngoingEffectManager};
pub use logger::{FlowLogger, LogEntry, OutputMode, VerbosityLevel};
pub use reference::{
    AbilityEntity, AbilityRefId, AbilityReference, ReactionOrigin, ReactionScope, TriggerReaction,
};
pub use state::{DuelEntity, DuelLifecycle, DuelState, Notification};
