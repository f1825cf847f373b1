//! Ability instances bound to holders, and the reactions they produce
//!
//! An [`AbilityReference`] binds one shared [`Ability`] to one holder
//! entity. Matching a reference against a [`Trigger`] yields a
//! [`TriggerReaction`] attributed to the reference's own source, so a
//! reaction queued earlier in a pass is skipped once its reference has been
//! removed.

use crate::core::{EntityId, SourceId, Trigger, TriggerData};
use crate::game::ability::{Ability, ReactionFn};
use crate::game::effects::EffectId;
use crate::game::DuelState;
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Identity of one ability instance within a duel
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AbilityRefId(u32);

impl AbilityRefId {
    pub fn new(id: u32) -> Self {
        AbilityRefId(id)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for AbilityRefId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One ability bound to one holder
#[derive(Clone)]
pub struct AbilityReference {
    id: AbilityRefId,
    holder: EntityId,
    source: SourceId,
    ability: Arc<Ability>,
    /// Disabled references never react
    pub enabled: bool,
    /// Free-form per-instance state owned by the ability's handlers
    pub scratch: Map<String, Value>,
}

impl AbilityReference {
    pub fn new(id: AbilityRefId, holder: EntityId, source: SourceId, ability: Arc<Ability>) -> Self {
        AbilityReference {
            id,
            holder,
            source,
            ability,
            enabled: true,
            scratch: Map::new(),
        }
    }

    pub fn id(&self) -> AbilityRefId {
        self.id
    }

    pub fn holder(&self) -> EntityId {
        self.holder
    }

    pub fn source(&self) -> SourceId {
        self.source
    }

    pub fn ability(&self) -> &Arc<Ability> {
        &self.ability
    }

    /// Match this instance against a trigger
    pub fn get_reaction(&self, state: &DuelState, trigger: &Trigger) -> Option<TriggerReaction> {
        self.ability
            .check_trigger(state, self, trigger)
            .map(|handler| TriggerReaction {
                source: self.source,
                origin: ReactionOrigin::Ability {
                    holder: self.holder,
                    reference: self.id,
                },
                handler,
            })
    }

    /// Ordering between two references reacting to the same trigger.
    ///
    /// Each side's comparator contributes from its own point of view and the
    /// two contributions are subtracted, so
    /// `compare_to(a, b) == -compare_to(b, a)` holds even when only one
    /// side has an opinion. Widened to i64 so the difference cannot overflow.
    pub fn compare_to(state: &DuelState, x: &AbilityReference, y: &AbilityReference) -> i64 {
        i64::from(x.ability.compare(state, x, y)) - i64::from(y.ability.compare(state, y, x))
    }
}

impl fmt::Debug for AbilityReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AbilityReference")
            .field("id", &self.id)
            .field("holder", &self.holder)
            .field("source", &self.source)
            .field("ability", self.ability.name())
            .field("enabled", &self.enabled)
            .finish()
    }
}

/// Where a reaction came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionOrigin {
    Ability {
        holder: EntityId,
        reference: AbilityRefId,
    },
    Effect {
        owner: EntityId,
        effect: EffectId,
    },
}

/// What a running reaction knows about itself
#[derive(Debug)]
pub struct ReactionScope<'a> {
    pub origin: ReactionOrigin,
    pub source: SourceId,
    pub trigger: &'a Trigger,
}

impl ReactionScope<'_> {
    /// Entity the reacting ability or effect belongs to
    pub fn holder(&self) -> EntityId {
        match self.origin {
            ReactionOrigin::Ability { holder, .. } => holder,
            ReactionOrigin::Effect { owner, .. } => owner,
        }
    }
}

/// A matched reaction waiting to run
#[derive(Clone)]
pub struct TriggerReaction {
    pub source: SourceId,
    pub origin: ReactionOrigin,
    handler: ReactionFn,
}

impl TriggerReaction {
    pub fn new(source: SourceId, origin: ReactionOrigin, handler: ReactionFn) -> Self {
        TriggerReaction {
            source,
            origin,
            handler,
        }
    }

    pub fn invoke(&self, state: &mut DuelState, trigger: &Trigger, data: &mut TriggerData) -> Result<()> {
        let scope = ReactionScope {
            origin: self.origin,
            source: self.source,
            trigger,
        };
        (self.handler)(state, &scope, data)
    }
}

impl fmt::Debug for TriggerReaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TriggerReaction")
            .field("source", &self.source)
            .field("origin", &self.origin)
            .finish()
    }
}

/// Collect reactions from `references` and order them.
///
/// Stable insertion sort: content comparators are not required to be
/// transitive, and references nobody cares about keep insertion order.
pub fn ordered_reactions<'a, I>(state: &DuelState, references: I, trigger: &Trigger) -> Vec<TriggerReaction>
where
    I: IntoIterator<Item = &'a AbilityReference>,
{
    let mut matched: Vec<(&AbilityReference, TriggerReaction)> = Vec::new();
    for reference in references.into_iter().filter(|reference| reference.enabled) {
        let Some(reaction) = reference.get_reaction(state, trigger) else {
            continue;
        };
        let mut pos = matched.len();
        while pos > 0 && AbilityReference::compare_to(state, reference, matched[pos - 1].0) < 0 {
            pos -= 1;
        }
        matched.insert(pos, (reference, reaction));
    }
    matched.into_iter().map(|(_, reaction)| reaction).collect()
}

/// `Ordering` view of [`AbilityReference::compare_to`]
pub fn compare_references(state: &DuelState, x: &AbilityReference, y: &AbilityReference) -> Ordering {
    AbilityReference::compare_to(state, x, y).cmp(&0)
}

/// Capability every ability-holding entity provides
///
/// The two trigger entry points (`Trigger`/`DataTrigger`) need mutable
/// access to the whole duel while a holder is borrowed from it, so they
/// live on [`DuelState`] (`trigger`, `data_trigger`) and use this trait to
/// enumerate the holder's abilities.
pub trait AbilityEntity {
    fn holder_id(&self) -> EntityId;

    fn ability_refs(&self) -> &[AbilityReference];

    fn ability_refs_mut(&mut self) -> &mut Vec<AbilityReference>;

    fn add_ability(&mut self, reference: AbilityReference) {
        self.ability_refs_mut().push(reference);
    }

    fn remove_ability(&mut self, id: AbilityRefId) -> Option<AbilityReference> {
        let refs = self.ability_refs_mut();
        let pos = refs.iter().position(|reference| reference.id() == id)?;
        Some(refs.remove(pos))
    }

    /// All enabled reactions to `trigger`, ordered by `compare_to`
    fn get_reactions(&self, state: &DuelState, trigger: &Trigger) -> Vec<TriggerReaction> {
        ordered_reactions(state, self.ability_refs(), trigger)
    }
}
