//! Trigger dispatch passes
//!
//! Each pass first collects every matching reaction (holder abilities, then
//! active ongoing effects) while the state is borrowed immutably, then runs
//! them one by one with `&mut DuelState`. A reaction whose source has been
//! invalidated by an earlier reaction in the same pass is skipped, and an
//! ongoing effect met with an invalid source is ended on the spot.

/// Conditional dispatch logging that compiles away without `verbose-logging`
macro_rules! log_dispatch {
    ($state:expr, $($arg:tt)*) => {
        #[cfg(feature = "verbose-logging")]
        {
            $state.logger().categorized(
                $crate::game::logger::VerbosityLevel::Verbose,
                "dispatch",
                &format!($($arg)*),
            );
        }
        #[cfg(not(feature = "verbose-logging"))]
        {
            let _ = &$state;
        }
    };
}

use crate::core::{EntityId, SourceId, Trigger, TriggerData, TriggerKey, TriggerType};
use crate::game::effects::EffectTrigger;
use crate::game::reference::{ordered_reactions, AbilityEntity, ReactionOrigin, TriggerReaction};
use crate::game::DuelState;
use crate::Result;

impl DuelState {
    /// All enabled reactions of one holder to `trigger`, in dispatch order
    pub fn get_reactions(&self, holder: EntityId, trigger: &Trigger) -> Result<Vec<TriggerReaction>> {
        Ok(self.entity(holder)?.get_reactions(self, trigger))
    }

    /// Explicit trigger on one holder. Reactions run; nothing is read back.
    pub fn trigger(&mut self, holder: EntityId, key: impl Into<TriggerKey>, mut data: TriggerData) -> Result<()> {
        let source = self.entity(holder)?.source();
        let trigger = Trigger::new(key, TriggerType::Explicit, source).aimed_at(holder);
        let reactions = self.holder_reactions(holder, &trigger)?;
        self.run_reactions(reactions, &trigger, &mut data)
    }

    /// Explicit-data trigger on one holder. Reactions rewrite `data`, which
    /// the caller reads afterwards.
    pub fn data_trigger(&mut self, holder: EntityId, key: impl Into<TriggerKey>, data: &mut TriggerData) -> Result<()> {
        let source = self.entity(holder)?.source();
        let trigger = Trigger::new(key, TriggerType::ExplicitData, source).aimed_at(holder);
        let reactions = self.holder_reactions(holder, &trigger)?;
        self.run_reactions(reactions, &trigger, data)
    }

    /// Fire-and-observe broadcast to every holder and every active effect
    pub fn implicit_trigger(&mut self, key: impl Into<TriggerKey>, cause: SourceId, mut data: TriggerData) -> Result<()> {
        let trigger = Trigger::new(key, TriggerType::Implicit, cause);
        let mut reactions = Vec::new();
        for (_, entity) in self.entities.iter() {
            reactions.extend(entity.get_reactions(self, &trigger));
        }
        reactions.extend(self.effect_reactions(EffectTrigger::Implicit, &trigger.key));
        self.run_reactions(reactions, &trigger, &mut data)
    }

    /// Broadcast where every interested holder rewrites the shared record in
    /// turn. Holder reactions are ordered across all holders together; active
    /// effects get the last word.
    pub fn data_override(&mut self, key: impl Into<TriggerKey>, cause: SourceId, data: &mut TriggerData) -> Result<()> {
        let trigger = Trigger::new(key, TriggerType::DataOverride, cause);
        let mut reactions = ordered_reactions(
            self,
            self.entities.iter().flat_map(|(_, entity)| entity.ability_refs()),
            &trigger,
        );
        reactions.extend(self.effect_reactions(EffectTrigger::Explicit, &trigger.key));
        self.run_reactions(reactions, &trigger, data)
    }

    fn holder_reactions(&self, holder: EntityId, trigger: &Trigger) -> Result<Vec<TriggerReaction>> {
        let mut reactions = self.get_reactions(holder, trigger)?;
        reactions.extend(self.effect_reactions(EffectTrigger::Explicit, &trigger.key));
        Ok(reactions)
    }

    /// Reactions of the active effects to `key`; the active list is read once
    fn effect_reactions(&self, kind: EffectTrigger, key: &TriggerKey) -> Vec<TriggerReaction> {
        self.effects
            .get_active_effects()
            .into_iter()
            .filter_map(|id| {
                let effect = self.effects.get(id).ok()?;
                let handler = effect.reaction(kind, key)?;
                Some(TriggerReaction::new(
                    effect.source(),
                    ReactionOrigin::Effect {
                        owner: effect.owner(),
                        effect: id,
                    },
                    handler,
                ))
            })
            .collect()
    }

    fn run_reactions(&mut self, reactions: Vec<TriggerReaction>, trigger: &Trigger, data: &mut TriggerData) -> Result<()> {
        log_dispatch!(self, "{:?} '{}': {} reaction(s)", trigger.kind, trigger.key, reactions.len());
        for reaction in reactions {
            if !self.sources.is_valid(reaction.source) {
                log_dispatch!(self, "skip {:?}: source {} no longer valid", reaction.origin, reaction.source);
                if let ReactionOrigin::Effect { effect, .. } = reaction.origin {
                    if self.effects.get(effect).is_ok() {
                        self.end_effect(effect)?;
                    }
                }
                continue;
            }
            reaction.invoke(self, trigger, data)?;
        }
        Ok(())
    }
}
