//! Content-defined abilities
//!
//! An ability is a bundle of trigger reactions. Rather than one trait
//! object per content card, each ability is a capability table: a list of
//! (trigger type, trigger key) entries mapped to registered closures, plus
//! an optional comparator used to order it against other abilities that
//! react to the same trigger. Content packages build abilities with
//! [`AbilityBuilder`] and register them in an [`AbilityCatalogue`].

use crate::core::{AbilityName, Trigger, TriggerData, TriggerKey, TriggerType};
use crate::game::reference::{AbilityReference, ReactionScope};
use crate::game::DuelState;
use crate::Result;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

/// Reaction body shared by abilities and ongoing effects
pub type ReactionFn =
    Arc<dyn Fn(&mut DuelState, &ReactionScope<'_>, &mut TriggerData) -> Result<()> + Send + Sync>;

/// Extra guard evaluated when matching a trigger
pub type ConditionFn = Arc<dyn Fn(&DuelState, &AbilityReference, &Trigger) -> bool + Send + Sync>;

/// Ordering contribution of one side of a comparison. Negative sorts
/// `this` first, positive sorts `other` first.
pub type CompareFn =
    Arc<dyn Fn(&DuelState, &AbilityReference, &AbilityReference) -> i32 + Send + Sync>;

const MISSING_NAME: &str = "Missing";
const MISSING_DESCRIPTION: &str = "This ability could not be found.";

#[derive(Clone)]
struct AbilityReaction {
    kind: TriggerType,
    key: TriggerKey,
    condition: Option<ConditionFn>,
    handler: ReactionFn,
}

/// A bundle of trigger reactions attachable to an entity
pub struct Ability {
    name: AbilityName,
    description: String,
    parameters: Vec<String>,
    reactions: Vec<AbilityReaction>,
    comparator: Option<CompareFn>,
    missing: bool,
}

impl Ability {
    pub fn builder(name: impl Into<AbilityName>) -> AbilityBuilder {
        AbilityBuilder {
            ability: Ability {
                name: name.into(),
                description: String::new(),
                parameters: Vec::new(),
                reactions: Vec::new(),
                comparator: None,
                missing: false,
            },
        }
    }

    /// Sentinel for a catalogue lookup that found nothing. It never reacts
    /// and compares neutrally.
    pub fn missing() -> Self {
        Ability {
            name: AbilityName::new(MISSING_NAME),
            description: MISSING_DESCRIPTION.to_string(),
            parameters: Vec::new(),
            reactions: Vec::new(),
            comparator: None,
            missing: true,
        }
    }

    pub fn name(&self) -> &AbilityName {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn parameters(&self) -> &[String] {
        &self.parameters
    }

    pub fn is_missing(&self) -> bool {
        self.missing
    }

    /// Trigger keys this ability reacts to, per trigger type
    pub fn reacts_to(&self, kind: TriggerType, key: &TriggerKey) -> bool {
        self.reactions
            .iter()
            .any(|reaction| reaction.kind == kind && reaction.key == *key)
    }

    /// Classify a trigger for one holder. Returns the reaction body if this
    /// ability reacts to it.
    pub fn check_trigger(
        &self,
        state: &DuelState,
        reference: &AbilityReference,
        trigger: &Trigger,
    ) -> Option<ReactionFn> {
        self.reactions
            .iter()
            .filter(|reaction| reaction.kind == trigger.kind && reaction.key == trigger.key)
            .find(|reaction| {
                reaction
                    .condition
                    .as_ref()
                    .map_or(true, |condition| condition(state, reference, trigger))
            })
            .map(|reaction| Arc::clone(&reaction.handler))
    }

    /// This ability's side of an ordering decision (0 when it has no opinion)
    pub fn compare(&self, state: &DuelState, this: &AbilityReference, other: &AbilityReference) -> i32 {
        self.comparator
            .as_ref()
            .map_or(0, |comparator| comparator(state, this, other))
    }
}

impl fmt::Debug for Ability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ability")
            .field("name", &self.name)
            .field("reactions", &self.reactions.len())
            .field("has_comparator", &self.comparator.is_some())
            .field("missing", &self.missing)
            .finish()
    }
}

/// Builder for [`Ability`]
pub struct AbilityBuilder {
    ability: Ability,
}

impl AbilityBuilder {
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.ability.description = description.into();
        self
    }

    pub fn parameter(mut self, parameter: impl Into<String>) -> Self {
        self.ability.parameters.push(parameter.into());
        self
    }

    /// React to `key` dispatched as `kind`
    pub fn on<F>(self, kind: TriggerType, key: impl Into<TriggerKey>, handler: F) -> Self
    where
        F: Fn(&mut DuelState, &ReactionScope<'_>, &mut TriggerData) -> Result<()> + Send + Sync + 'static,
    {
        self.push(kind, key.into(), None, Arc::new(handler))
    }

    /// React to `key` only when `condition` holds for the holder
    pub fn on_if<C, F>(self, kind: TriggerType, key: impl Into<TriggerKey>, condition: C, handler: F) -> Self
    where
        C: Fn(&DuelState, &AbilityReference, &Trigger) -> bool + Send + Sync + 'static,
        F: Fn(&mut DuelState, &ReactionScope<'_>, &mut TriggerData) -> Result<()> + Send + Sync + 'static,
    {
        self.push(kind, key.into(), Some(Arc::new(condition)), Arc::new(handler))
    }

    fn push(
        mut self,
        kind: TriggerType,
        key: TriggerKey,
        condition: Option<ConditionFn>,
        handler: ReactionFn,
    ) -> Self {
        self.ability.reactions.push(AbilityReaction {
            kind,
            key,
            condition,
            handler,
        });
        self
    }

    pub fn compare_with<F>(mut self, comparator: F) -> Self
    where
        F: Fn(&DuelState, &AbilityReference, &AbilityReference) -> i32 + Send + Sync + 'static,
    {
        self.ability.comparator = Some(Arc::new(comparator));
        self
    }

    pub fn build(self) -> Ability {
        self.ability
    }
}

/// Name to ability lookup supplied by a content package
#[derive(Clone, Debug)]
pub struct AbilityCatalogue {
    abilities: FxHashMap<AbilityName, Arc<Ability>>,
    missing: Arc<Ability>,
}

impl AbilityCatalogue {
    pub fn new() -> Self {
        AbilityCatalogue {
            abilities: FxHashMap::default(),
            missing: Arc::new(Ability::missing()),
        }
    }

    /// Register an ability under its own name, replacing any previous one
    pub fn register(&mut self, ability: Ability) -> Arc<Ability> {
        let ability = Arc::new(ability);
        self.abilities
            .insert(ability.name().clone(), Arc::clone(&ability));
        ability
    }

    pub fn get(&self, name: &str) -> Option<Arc<Ability>> {
        self.abilities.get(&AbilityName::new(name)).cloned()
    }

    /// Look up an ability, degrading to the shared Missing sentinel
    pub fn resolve(&self, name: &str) -> Arc<Ability> {
        self.get(name).unwrap_or_else(|| Arc::clone(&self.missing))
    }

    pub fn len(&self) -> usize {
        self.abilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.abilities.is_empty()
    }
}

impl Default for AbilityCatalogue {
    fn default() -> Self {
        Self::new()
    }
}
