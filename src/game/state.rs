//! Duel state owned by the game-loop thread
//!
//! Everything a command or reaction may touch lives here and is passed
//! explicitly as `&mut DuelState`; there is no per-thread "current duel".

use crate::core::{
    AbilityName, EntityId, EntityStore, GameEntity, SourceArena, SourceId, SourcedValueCollection,
};
use crate::flow::FlowConfig;
use crate::game::ability::{Ability, AbilityCatalogue};
use crate::game::effects::{EffectId, OngoingEffectManager};
use crate::game::logger::{FlowLogger, VerbosityLevel};
use crate::game::reference::{AbilityEntity, AbilityRefId, AbilityReference};
use crate::{DuelError, Result};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha12Rng;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// An ability-holding participant (player, card, token)
#[derive(Debug, Clone)]
pub struct DuelEntity {
    id: EntityId,
    name: String,
    source: SourceId,
    attributes: FxHashMap<String, i64>,
    abilities: Vec<AbilityReference>,
}

impl DuelEntity {
    pub fn source(&self) -> SourceId {
        self.source
    }

    pub fn attribute(&self, name: &str) -> i64 {
        self.attributes.get(name).copied().unwrap_or(0)
    }

    /// First reference to an ability with this name
    pub fn find_ability(&self, name: &AbilityName) -> Option<&AbilityReference> {
        self.abilities
            .iter()
            .find(|reference| reference.ability().name() == name)
    }
}

impl GameEntity for DuelEntity {
    fn id(&self) -> EntityId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl AbilityEntity for DuelEntity {
    fn holder_id(&self) -> EntityId {
        self.id
    }

    fn ability_refs(&self) -> &[AbilityReference] {
        &self.abilities
    }

    fn ability_refs_mut(&mut self) -> &mut Vec<AbilityReference> {
        &mut self.abilities
    }
}

/// Where the duel is in its life
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DuelLifecycle {
    NotStarted,
    Ongoing,
    Finished,
}

/// Outbound event for whatever transport is attached
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: String,
    pub entity: Option<EntityId>,
    pub payload: Value,
}

/// Complete duel state
pub struct DuelState {
    pub entities: EntityStore<DuelEntity>,
    pub sources: SourceArena,
    pub effects: OngoingEffectManager,
    pub catalogue: AbilityCatalogue,
    /// Random number generator for tie-breaks (seeded for reproducible duels)
    pub rng: ChaCha12Rng,
    facts: FxHashMap<String, SourcedValueCollection<String>>,
    root_source: SourceId,
    next_ability_ref: u32,
    lifecycle: DuelLifecycle,
    winner: Option<EntityId>,
    turn: u32,
    outbox: Vec<Notification>,
    logger: Arc<FlowLogger>,
}

impl DuelState {
    pub fn new() -> Self {
        let mut sources = SourceArena::new();
        let root_source = sources.root("duel");
        DuelState {
            entities: EntityStore::new(),
            sources,
            effects: OngoingEffectManager::new(),
            catalogue: AbilityCatalogue::new(),
            rng: ChaCha12Rng::seed_from_u64(0),
            facts: FxHashMap::default(),
            root_source,
            next_ability_ref: 0,
            lifecycle: DuelLifecycle::NotStarted,
            winner: None,
            turn: 0,
            outbox: Vec::new(),
            logger: Arc::new(FlowLogger::new()),
        }
    }

    /// Seed and logger taken from a flow configuration
    pub fn from_config(config: &FlowConfig) -> Self {
        let mut state = Self::new().with_logger(Arc::new(config.build_logger()));
        state.seed_rng(config.seed);
        state
    }

    pub fn with_logger(mut self, logger: Arc<FlowLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_catalogue(mut self, catalogue: AbilityCatalogue) -> Self {
        self.catalogue = catalogue;
        self
    }

    pub fn seed_rng(&mut self, seed: u64) {
        self.rng = ChaCha12Rng::seed_from_u64(seed);
    }

    pub fn logger(&self) -> &Arc<FlowLogger> {
        &self.logger
    }

    /// Source standing for the duel itself (system-issued changes)
    pub fn root_source(&self) -> SourceId {
        self.root_source
    }

    // ---------------------------------------------------------------------
    // Entities
    // ---------------------------------------------------------------------

    pub fn add_entity(&mut self, name: impl Into<String>) -> EntityId {
        let name = name.into();
        let id = self.entities.next_id();
        let source = self.sources.root(format!("entity {name}"));
        self.entities.insert(
            id,
            DuelEntity {
                id,
                name,
                source,
                attributes: FxHashMap::default(),
                abilities: Vec::new(),
            },
        );
        id
    }

    pub fn entity(&self, id: EntityId) -> Result<&DuelEntity> {
        self.entities.get(id)
    }

    pub fn entity_mut(&mut self, id: EntityId) -> Result<&mut DuelEntity> {
        self.entities.get_mut(id)
    }

    /// Remove an entity from the duel. Its abilities and anything chained
    /// to its source stop being valid.
    pub fn remove_entity(&mut self, id: EntityId) -> Result<DuelEntity> {
        let entity = self
            .entities
            .remove(id)
            .ok_or(DuelError::EntityNotFound(id.as_u32()))?;
        self.sources.invalidate(entity.source)?;
        self.end_orphaned_effects()?;
        Ok(entity)
    }

    pub fn attribute(&self, id: EntityId, name: &str) -> Result<i64> {
        Ok(self.entity(id)?.attribute(name))
    }

    pub fn set_attribute(&mut self, id: EntityId, name: &str, value: i64) -> Result<()> {
        self.entity_mut(id)?.attributes.insert(name.to_string(), value);
        Ok(())
    }

    /// Add `delta` to an attribute and return the new value
    pub fn adjust_attribute(&mut self, id: EntityId, name: &str, delta: i64) -> Result<i64> {
        let entity = self.entity_mut(id)?;
        let value = entity.attributes.entry(name.to_string()).or_insert(0);
        *value = value.saturating_add(delta);
        Ok(*value)
    }

    // ---------------------------------------------------------------------
    // Abilities
    // ---------------------------------------------------------------------

    /// Bind an ability to a holder. The new reference gets its own source,
    /// chained to the holder's.
    pub fn attach_ability(&mut self, holder: EntityId, ability: Arc<Ability>) -> Result<AbilityRefId> {
        let holder_source = self.entity(holder)?.source;
        let source = self
            .sources
            .chained(holder_source, format!("ability {}", ability.name()))?;
        let id = AbilityRefId::new(self.next_ability_ref);
        self.next_ability_ref += 1;

        self.logger.categorized(
            VerbosityLevel::Verbose,
            "dispatch",
            &format!("attach {} to entity {holder} as ability {id}", ability.name()),
        );
        self.entity_mut(holder)?
            .add_ability(AbilityReference::new(id, holder, source, ability));
        Ok(id)
    }

    /// Attach an ability by catalogue name. Unknown names attach the inert
    /// Missing ability instead of failing.
    pub fn grant_ability(&mut self, holder: EntityId, name: &str) -> Result<AbilityRefId> {
        let ability = self.catalogue.resolve(name);
        if ability.is_missing() {
            self.logger.categorized(
                VerbosityLevel::Normal,
                "dispatch",
                &format!("ability '{name}' not found, attaching placeholder to entity {holder}"),
            );
        }
        self.attach_ability(holder, ability)
    }

    /// Remove an ability reference. Its source is invalidated so reactions
    /// already collected for it are skipped.
    pub fn detach_ability(&mut self, holder: EntityId, id: AbilityRefId) -> Result<AbilityReference> {
        let reference = self
            .entity_mut(holder)?
            .remove_ability(id)
            .ok_or(DuelError::AbilityRefNotFound(id.as_u32()))?;
        self.sources.invalidate(reference.source())?;
        self.end_orphaned_effects()?;
        Ok(reference)
    }

    pub fn ability_ref(&self, holder: EntityId, id: AbilityRefId) -> Result<&AbilityReference> {
        self.entity(holder)?
            .ability_refs()
            .iter()
            .find(|reference| reference.id() == id)
            .ok_or(DuelError::AbilityRefNotFound(id.as_u32()))
    }

    pub fn ability_ref_mut(&mut self, holder: EntityId, id: AbilityRefId) -> Result<&mut AbilityReference> {
        self.entity_mut(holder)?
            .ability_refs_mut()
            .iter_mut()
            .find(|reference| reference.id() == id)
            .ok_or(DuelError::AbilityRefNotFound(id.as_u32()))
    }

    // ---------------------------------------------------------------------
    // Ongoing effects
    // ---------------------------------------------------------------------

    /// Create an ongoing effect whose source is chained to `origin`
    pub fn create_effect(
        &mut self,
        owner: EntityId,
        origin: SourceId,
        context: impl Into<String>,
        set_active: bool,
    ) -> Result<EffectId> {
        let context = context.into();
        self.entity(owner)?;
        let source = self.sources.chained(origin, format!("effect {context}"))?;
        let id = self.effects.create(owner, source, context, set_active);
        Ok(id)
    }

    /// End an effect: deregister it, invalidate its source and drop it
    pub fn end_effect(&mut self, id: EffectId) -> Result<()> {
        let effect = self
            .effects
            .remove(id)
            .ok_or(DuelError::EffectNotFound(id.as_u32()))?;
        self.sources.invalidate(effect.source())?;
        self.logger.categorized(
            VerbosityLevel::Verbose,
            "dispatch",
            &format!("effect {id} ({}) ended", effect.context()),
        );
        Ok(())
    }

    /// End every effect whose source chain is no longer valid. Such an
    /// effect can never react again, including to its own cleanup trigger.
    pub fn end_orphaned_effects(&mut self) -> Result<usize> {
        let orphaned: Vec<EffectId> = self
            .effects
            .ids()
            .into_iter()
            .filter(|id| {
                self.effects
                    .get(*id)
                    .is_ok_and(|effect| !self.sources.is_valid(effect.source()))
            })
            .collect();
        for &id in &orphaned {
            self.end_effect(id)?;
        }
        Ok(orphaned.len())
    }

    // ---------------------------------------------------------------------
    // Sourced facts
    // ---------------------------------------------------------------------

    pub fn assert_fact(&mut self, fact: &str, source: SourceId, value: impl Into<String>) {
        self.facts
            .entry(fact.to_string())
            .or_default()
            .add(source, value.into());
    }

    pub fn retract_fact(&mut self, fact: &str, source: SourceId, value: &str) {
        if let Some(values) = self.facts.get_mut(fact) {
            values.remove(source, &value.to_string());
            if values.is_empty() {
                self.facts.remove(fact);
            }
        }
    }

    pub fn fact(&self, fact: &str) -> Option<&SourcedValueCollection<String>> {
        self.facts.get(fact)
    }

    /// Most-asserted value of a fact; ties are broken with the duel RNG
    pub fn resolve_fact(&mut self, fact: &str, fallback: &str) -> String {
        let Some(values) = self.facts.get(fact) else {
            return fallback.to_string();
        };
        let rng = &mut self.rng;
        values.get_most_sourced_value(fallback.to_string(), |tied| {
            tied[rng.gen_range(0..tied.len())].clone()
        })
    }

    /// Drop assertions whose sources are no longer valid
    pub fn prune_facts(&mut self) {
        let sources = &self.sources;
        for values in self.facts.values_mut() {
            values.prune_invalid(sources);
        }
        self.facts.retain(|_, values| !values.is_empty());
    }

    // ---------------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------------

    pub fn start(&mut self) {
        if self.lifecycle == DuelLifecycle::NotStarted {
            self.lifecycle = DuelLifecycle::Ongoing;
            self.turn = 1;
            self.logger
                .categorized(VerbosityLevel::Minimal, "lifecycle", "duel started");
        }
    }

    pub fn lifecycle(&self) -> DuelLifecycle {
        self.lifecycle
    }

    pub fn is_ongoing(&self) -> bool {
        self.lifecycle == DuelLifecycle::Ongoing
    }

    pub fn is_finished(&self) -> bool {
        self.lifecycle == DuelLifecycle::Finished
    }

    pub fn not_finished(&self) -> bool {
        !self.is_finished()
    }

    pub fn finish(&mut self, winner: Option<EntityId>) {
        if self.is_finished() {
            return;
        }
        self.lifecycle = DuelLifecycle::Finished;
        self.winner = winner;
        let message = match winner {
            Some(id) => format!("duel finished, winner: entity {id}"),
            None => "duel finished without a winner".to_string(),
        };
        self.logger
            .categorized(VerbosityLevel::Minimal, "lifecycle", &message);
        let turn = self.turn;
        self.notify("finished", winner, serde_json::json!({ "turn": turn }));
    }

    pub fn winner(&self) -> Option<EntityId> {
        self.winner
    }

    /// Release ongoing effects and stale facts once the loop has ended
    pub fn cleanup_on_game_finished(&mut self) {
        for effect in self.effects.drain() {
            if let Err(err) = self.sources.invalidate(effect.source()) {
                self.logger.categorized(
                    VerbosityLevel::Verbose,
                    "lifecycle",
                    &format!("effect {} cleanup: {err}", effect.id()),
                );
            }
        }
        self.prune_facts();
        self.logger
            .categorized(VerbosityLevel::Minimal, "lifecycle", "duel state cleaned up");
    }

    pub fn turn(&self) -> u32 {
        self.turn
    }

    pub fn advance_turn(&mut self) -> u32 {
        self.turn += 1;
        self.turn
    }

    // ---------------------------------------------------------------------
    // Outbound notifications
    // ---------------------------------------------------------------------

    pub fn notify(&mut self, kind: &str, entity: Option<EntityId>, payload: Value) {
        self.outbox.push(Notification {
            kind: kind.to_string(),
            entity,
            payload,
        });
    }

    pub fn notifications(&self) -> &[Notification] {
        &self.outbox
    }

    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.outbox)
    }
}

impl Default for DuelState {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DuelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuelState")
            .field("entities", &self.entities.len())
            .field("sources", &self.sources.len())
            .field("effects", &self.effects.len())
            .field("lifecycle", &self.lifecycle)
            .field("turn", &self.turn)
            .field("winner", &self.winner)
            .finish()
    }
}
