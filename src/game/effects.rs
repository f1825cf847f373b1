//! Ongoing effects and their registry
//!
//! An ongoing effect is a persistent modifier ("prevent all damage until
//! end of turn") that reacts to triggers independently of any ability. Each
//! effect has two key-to-reaction maps: implicit reactions run during
//! fire-and-observe passes, explicit ones during explicit, explicit-data and
//! data-override passes.

use crate::core::{EntityId, SourceId, TriggerData, TriggerKey};
use crate::game::ability::ReactionFn;
use crate::game::reference::ReactionScope;
use crate::game::DuelState;
use crate::{DuelError, Result};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EffectId(u32);

impl EffectId {
    pub fn new(id: u32) -> Self {
        EffectId(id)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for EffectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which of an effect's reaction maps a trigger lands in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectTrigger {
    Implicit,
    Explicit,
}

/// A persistent, independently triggerable modifier
pub struct OngoingEffect {
    id: EffectId,
    /// What created the effect, for logs
    context: String,
    owner: EntityId,
    source: SourceId,
    implicit: FxHashMap<TriggerKey, ReactionFn>,
    explicit: FxHashMap<TriggerKey, ReactionFn>,
    implicit_active: bool,
    explicit_active: bool,
}

impl OngoingEffect {
    fn new(id: EffectId, context: String, owner: EntityId, source: SourceId, active: bool) -> Self {
        OngoingEffect {
            id,
            context,
            owner,
            source,
            implicit: FxHashMap::default(),
            explicit: FxHashMap::default(),
            implicit_active: active,
            explicit_active: active,
        }
    }

    pub fn id(&self) -> EffectId {
        self.id
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn owner(&self) -> EntityId {
        self.owner
    }

    pub fn source(&self) -> SourceId {
        self.source
    }

    /// Active only while both halves are active
    pub fn is_active(&self) -> bool {
        self.explicit_active && self.implicit_active
    }

    /// Sets both halves to `active`
    pub fn set_active(&mut self, active: bool) {
        self.explicit_active = active;
        self.implicit_active = active;
    }

    pub fn set_explicit_active(&mut self, active: bool) {
        self.explicit_active = active;
    }

    pub fn set_implicit_active(&mut self, active: bool) {
        self.implicit_active = active;
    }

    pub fn is_explicit_active(&self) -> bool {
        self.explicit_active
    }

    pub fn is_implicit_active(&self) -> bool {
        self.implicit_active
    }

    fn map(&self, kind: EffectTrigger) -> &FxHashMap<TriggerKey, ReactionFn> {
        match kind {
            EffectTrigger::Implicit => &self.implicit,
            EffectTrigger::Explicit => &self.explicit,
        }
    }

    fn map_mut(&mut self, kind: EffectTrigger) -> &mut FxHashMap<TriggerKey, ReactionFn> {
        match kind {
            EffectTrigger::Implicit => &mut self.implicit,
            EffectTrigger::Explicit => &mut self.explicit,
        }
    }

    /// Register a reaction; one per key, so a later registration replaces
    /// the earlier one.
    pub fn add_trigger<F>(&mut self, kind: EffectTrigger, key: impl Into<TriggerKey>, handler: F)
    where
        F: Fn(&mut DuelState, &ReactionScope<'_>, &mut TriggerData) -> Result<()> + Send + Sync + 'static,
    {
        self.map_mut(kind).insert(key.into(), Arc::new(handler));
    }

    pub fn remove_trigger(&mut self, kind: EffectTrigger, key: &TriggerKey) -> bool {
        self.map_mut(kind).remove(key).is_some()
    }

    pub fn reaction(&self, kind: EffectTrigger, key: &TriggerKey) -> Option<ReactionFn> {
        self.map(kind).get(key).cloned()
    }
}

impl fmt::Debug for OngoingEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OngoingEffect")
            .field("id", &self.id)
            .field("context", &self.context)
            .field("owner", &self.owner)
            .field("implicit_keys", &self.implicit.keys().collect::<Vec<_>>())
            .field("explicit_keys", &self.explicit.keys().collect::<Vec<_>>())
            .field("implicit_active", &self.implicit_active)
            .field("explicit_active", &self.explicit_active)
            .finish()
    }
}

/// Owns every ongoing effect and tracks which ones are registered (live)
#[derive(Debug, Default)]
pub struct OngoingEffectManager {
    effects: FxHashMap<EffectId, OngoingEffect>,
    registered: FxHashSet<EffectId>,
    next_id: u32,
}

impl OngoingEffectManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an effect. It registers itself unless created inactive.
    pub fn create(
        &mut self,
        owner: EntityId,
        source: SourceId,
        context: impl Into<String>,
        set_active: bool,
    ) -> EffectId {
        let id = EffectId::new(self.next_id);
        self.next_id += 1;
        self.effects
            .insert(id, OngoingEffect::new(id, context.into(), owner, source, set_active));
        if set_active {
            self.registered.insert(id);
        }
        id
    }

    pub fn get(&self, id: EffectId) -> Result<&OngoingEffect> {
        self.effects
            .get(&id)
            .ok_or(DuelError::EffectNotFound(id.as_u32()))
    }

    pub fn get_mut(&mut self, id: EffectId) -> Result<&mut OngoingEffect> {
        self.effects
            .get_mut(&id)
            .ok_or(DuelError::EffectNotFound(id.as_u32()))
    }

    pub fn register(&mut self, id: EffectId) -> Result<()> {
        self.get(id)?;
        self.registered.insert(id);
        Ok(())
    }

    /// Returns false if the effect was not registered
    pub fn deregister(&mut self, id: EffectId) -> bool {
        self.registered.remove(&id)
    }

    pub fn is_registered(&self, id: EffectId) -> bool {
        self.registered.contains(&id)
    }

    /// Deregister and drop an effect
    pub fn remove(&mut self, id: EffectId) -> Option<OngoingEffect> {
        self.registered.remove(&id);
        self.effects.remove(&id)
    }

    /// Registered effects whose active flag is set, in creation order
    pub fn get_active_effects(&self) -> Vec<EffectId> {
        let mut active: Vec<EffectId> = self
            .registered
            .iter()
            .filter(|id| self.effects.get(*id).is_some_and(OngoingEffect::is_active))
            .copied()
            .collect();
        active.sort_unstable();
        active
    }

    /// Every owned effect, registered or not, in creation order
    pub fn ids(&self) -> Vec<EffectId> {
        let mut ids: Vec<EffectId> = self.effects.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn registered_count(&self) -> usize {
        self.registered.len()
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    /// Deregister and hand back every effect, oldest first (duel cleanup)
    pub fn drain(&mut self) -> Vec<OngoingEffect> {
        self.registered.clear();
        let mut drained: Vec<OngoingEffect> = self.effects.drain().map(|(_, effect)| effect).collect();
        drained.sort_unstable_by_key(OngoingEffect::id);
        drained
    }
}
