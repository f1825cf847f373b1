//! Built-in sample content package
//!
//! A handful of abilities and commands for a life-total duel. The binary,
//! the integration tests and the benchmarks all run against this package.
//!
//! Abilities:
//! - **Armor**: damage dealt to the holder is reduced by 1
//! - **Amplify**: damage dealt by the holder is doubled; applies before Armor
//! - **Thorns**: whenever the holder is damaged, the attacker loses 1 life
//! - **Vigor**: healing received by the holder is increased by 2
//! - **Chronicle**: counts how often the holder was healed
//!
//! Commands take positional JSON arguments:
//! `attack [attacker, target, amount]`, `heal [target, amount]`,
//! `grant [holder, ability]`, `revoke [holder, ability]`, `fog [owner]`,
//! `end_turn []`, `concede [player]`, `assert_fact [fact, value]`,
//! `retract_fact [fact, value]`, `announce_fact [fact, fallback]`.

use crate::core::{AbilityName, EntityId, SourceId, TriggerData, TriggerType};
use crate::flow::{CommandCatalogue, FlowConfig, Submitter};
use crate::game::reference::ReactionOrigin;
use crate::game::{Ability, AbilityCatalogue, DuelState, EffectTrigger, VerbosityLevel};
use crate::{DuelError, Result};
use serde_json::{json, Value};

pub const STARTING_LIFE: i64 = 20;
pub const LIFE: &str = "life";

// -------------------------------------------------------------------------
// Argument parsing
// -------------------------------------------------------------------------

fn arg<'a>(args: &'a [Value], index: usize, name: &str) -> Result<&'a Value> {
    args.get(index)
        .ok_or_else(|| DuelError::InvalidArgument(format!("missing argument {index} ({name})")))
}

pub fn arg_i64(args: &[Value], index: usize, name: &str) -> Result<i64> {
    arg(args, index, name)?
        .as_i64()
        .ok_or_else(|| DuelError::InvalidArgument(format!("{name} must be an integer")))
}

pub fn arg_str<'a>(args: &'a [Value], index: usize, name: &str) -> Result<&'a str> {
    arg(args, index, name)?
        .as_str()
        .ok_or_else(|| DuelError::InvalidArgument(format!("{name} must be a string")))
}

pub fn arg_entity(args: &[Value], index: usize, name: &str) -> Result<EntityId> {
    let raw = arg_i64(args, index, name)?;
    u32::try_from(raw)
        .map(EntityId::new)
        .map_err(|_| DuelError::InvalidArgument(format!("{name} is not an entity id: {raw}")))
}

/// Source a submitter's assertions are attributed to
fn submitter_source(state: &DuelState, submitter: Submitter) -> Result<SourceId> {
    match submitter {
        Submitter::System => Ok(state.root_source()),
        Submitter::Player(id) => Ok(state.entity(id)?.source()),
    }
}

// -------------------------------------------------------------------------
// Abilities
// -------------------------------------------------------------------------

fn armor() -> Ability {
    Ability::builder("Armor")
        .description("Damage dealt to this entity is reduced by 1.")
        .parameter("reduction=1")
        .on(TriggerType::DataOverride, "modify_damage", |_, scope, data| {
            if data.get_entity("target") == Some(scope.holder()) {
                let amount = data.get_i64("amount").unwrap_or(0);
                data.set("amount", (amount - 1).max(0));
            }
            Ok(())
        })
        .build()
}

fn amplify() -> Ability {
    Ability::builder("Amplify")
        .description("Damage dealt by this entity is doubled.")
        .parameter("factor=2")
        .on(TriggerType::DataOverride, "modify_damage", |_, scope, data| {
            if data.get_entity("attacker") == Some(scope.holder()) {
                let amount = data.get_i64("amount").unwrap_or(0);
                data.set("amount", amount.saturating_mul(2));
            }
            Ok(())
        })
        // Double first, then let armor subtract
        .compare_with(|_, _, other| if other.ability().name().as_str() == "Armor" { -1 } else { 0 })
        .build()
}

fn thorns() -> Ability {
    Ability::builder("Thorns")
        .description("Whenever this entity is damaged, the attacker loses 1 life.")
        .on_if(
            TriggerType::Implicit,
            "damaged",
            |state, reference, _| state.attribute(reference.holder(), LIFE).is_ok_and(|life| life > 0),
            |state, scope, data| {
                let holder = scope.holder();
                let (Some(target), Some(attacker)) = (data.get_entity("target"), data.get_entity("attacker")) else {
                    return Ok(());
                };
                if target != holder || attacker == holder {
                    return Ok(());
                }
                let life = state.adjust_attribute(attacker, LIFE, -1)?;
                state.notify("thorns", Some(attacker), json!({ "from": holder, "life": life }));
                if life <= 0 {
                    state.finish(Some(holder));
                }
                Ok(())
            },
        )
        .build()
}

fn vigor() -> Ability {
    Ability::builder("Vigor")
        .description("Healing received by this entity is increased by 2.")
        .on(TriggerType::ExplicitData, "heal_amount", |_, _, data| {
            let amount = data.get_i64("amount").unwrap_or(0);
            data.set("amount", amount + 2);
            Ok(())
        })
        .build()
}

fn chronicle() -> Ability {
    Ability::builder("Chronicle")
        .description("Counts how often this entity was healed.")
        .on(TriggerType::Explicit, "healed", |state, scope, _| {
            if let ReactionOrigin::Ability { holder, reference } = scope.origin {
                let reference = state.ability_ref_mut(holder, reference)?;
                let heals = reference.scratch.get("heals").and_then(Value::as_i64).unwrap_or(0);
                reference.scratch.insert("heals".to_string(), json!(heals + 1));
            }
            Ok(())
        })
        .build()
}

pub fn sample_abilities() -> AbilityCatalogue {
    let mut catalogue = AbilityCatalogue::new();
    for ability in [armor(), amplify(), thorns(), vigor(), chronicle()] {
        catalogue.register(ability);
    }
    catalogue
}

// -------------------------------------------------------------------------
// Commands
// -------------------------------------------------------------------------

fn attack(state: &mut DuelState, _: Submitter, args: &[Value]) -> Result<()> {
    let attacker = arg_entity(args, 0, "attacker")?;
    let target = arg_entity(args, 1, "target")?;
    let requested = arg_i64(args, 2, "amount")?;
    let cause = state.entity(attacker)?.source();
    state.entity(target)?;

    let mut damage = TriggerData::new()
        .with("attacker", attacker.as_u32())
        .with("target", target.as_u32())
        .with("amount", requested);
    state.data_override("modify_damage", cause, &mut damage)?;

    let amount = damage.get_i64("amount").unwrap_or(0).max(0);
    let life = state.adjust_attribute(target, LIFE, -amount)?;
    state.notify(
        "damage",
        Some(target),
        json!({
            "attacker": attacker,
            "requested": requested,
            "amount": amount,
            "prevented": damage.get_bool("prevented").unwrap_or(false),
            "life": life,
        }),
    );

    if amount > 0 {
        let damaged = TriggerData::new()
            .with("attacker", attacker.as_u32())
            .with("target", target.as_u32())
            .with("amount", amount);
        state.implicit_trigger("damaged", cause, damaged)?;
    }
    if life <= 0 {
        state.finish(Some(attacker));
    }
    Ok(())
}

fn heal(state: &mut DuelState, _: Submitter, args: &[Value]) -> Result<()> {
    let target = arg_entity(args, 0, "target")?;
    let mut data = TriggerData::new().with("amount", arg_i64(args, 1, "amount")?);
    state.data_trigger(target, "heal_amount", &mut data)?;

    let amount = data.get_i64("amount").unwrap_or(0).max(0);
    let life = state.adjust_attribute(target, LIFE, amount)?;
    state.notify("healed", Some(target), json!({ "amount": amount, "life": life }));
    state.trigger(target, "healed", data)
}

fn grant(state: &mut DuelState, _: Submitter, args: &[Value]) -> Result<()> {
    let holder = arg_entity(args, 0, "holder")?;
    let name = arg_str(args, 1, "ability")?;
    let id = state.grant_ability(holder, name)?;
    let granted = state.ability_ref(holder, id)?.ability().name().clone();
    state.notify("granted", Some(holder), json!({ "ability": granted }));
    Ok(())
}

fn revoke(state: &mut DuelState, _: Submitter, args: &[Value]) -> Result<()> {
    let holder = arg_entity(args, 0, "holder")?;
    let name = AbilityName::new(arg_str(args, 1, "ability")?);
    let id = state
        .entity(holder)?
        .find_ability(&name)
        .map(|reference| reference.id())
        .ok_or_else(|| DuelError::InvalidArgument(format!("entity {holder} has no ability {name}")))?;
    state.detach_ability(holder, id)?;
    state.notify("revoked", Some(holder), json!({ "ability": name }));
    Ok(())
}

/// Prevent all damage until the turn ends
fn fog(state: &mut DuelState, _: Submitter, args: &[Value]) -> Result<()> {
    let owner = arg_entity(args, 0, "owner")?;
    let origin = state.entity(owner)?.source();
    let id = state.create_effect(owner, origin, "Fog", true)?;
    let effect = state.effects.get_mut(id)?;
    effect.add_trigger(EffectTrigger::Explicit, "modify_damage", |_, _, data| {
        data.set("amount", 0);
        data.set("prevented", true);
        Ok(())
    });
    effect.add_trigger(EffectTrigger::Implicit, "turn_ended", |state, scope, _| {
        if let ReactionOrigin::Effect { effect, .. } = scope.origin {
            state.end_effect(effect)?;
        }
        Ok(())
    });
    state.notify("fog", Some(owner), json!({ "effect": id }));
    Ok(())
}

fn end_turn(state: &mut DuelState, _: Submitter, _: &[Value]) -> Result<()> {
    let turn = state.turn();
    let root = state.root_source();
    state.implicit_trigger("turn_ended", root, TriggerData::new().with("turn", turn))?;
    let next = state.advance_turn();
    state.notify("turn", None, json!({ "ended": turn, "current": next }));
    Ok(())
}

fn concede(state: &mut DuelState, _: Submitter, args: &[Value]) -> Result<()> {
    let player = arg_entity(args, 0, "player")?;
    state.entity(player)?;
    let winner = state
        .entities
        .iter()
        .find(|(id, entity)| *id != player && entity.attribute(LIFE) > 0)
        .map(|(id, _)| id);
    state.notify("conceded", Some(player), Value::Null);
    state.finish(winner);
    Ok(())
}

fn assert_fact(state: &mut DuelState, submitter: Submitter, args: &[Value]) -> Result<()> {
    let fact = arg_str(args, 0, "fact")?;
    let value = arg_str(args, 1, "value")?;
    let source = submitter_source(state, submitter)?;
    state.assert_fact(fact, source, value);
    Ok(())
}

fn retract_fact(state: &mut DuelState, submitter: Submitter, args: &[Value]) -> Result<()> {
    let fact = arg_str(args, 0, "fact")?;
    let value = arg_str(args, 1, "value")?;
    let source = submitter_source(state, submitter)?;
    state.retract_fact(fact, source, value);
    Ok(())
}

fn announce_fact(state: &mut DuelState, _: Submitter, args: &[Value]) -> Result<()> {
    let fact = arg_str(args, 0, "fact")?.to_string();
    let fallback = arg_str(args, 1, "fallback")?;
    let value = state.resolve_fact(&fact, fallback);
    state.notify("fact", None, json!({ "fact": fact, "value": value }));
    Ok(())
}

pub fn sample_commands() -> CommandCatalogue {
    CommandCatalogue::new()
        .with("attack", attack)
        .with("heal", heal)
        .with("grant", grant)
        .with("revoke", revoke)
        .with("fog", fog)
        .with("end_turn", end_turn)
        .with("concede", concede)
        .with("assert_fact", assert_fact)
        .with("retract_fact", retract_fact)
        .with("announce_fact", announce_fact)
}

/// A duel with the sample abilities and one entity per name at starting life
pub fn sample_duel(config: &FlowConfig, names: &[&str]) -> Result<(DuelState, Vec<EntityId>)> {
    let mut state = DuelState::from_config(config).with_catalogue(sample_abilities());
    let mut players = Vec::with_capacity(names.len());
    for name in names {
        let id = state.add_entity(*name);
        state.set_attribute(id, LIFE, STARTING_LIFE)?;
        players.push(id);
    }
    state.logger().categorized(
        VerbosityLevel::Verbose,
        "lifecycle",
        &format!("sample duel with {} entities", players.len()),
    );
    Ok((state, players))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::OutputMode;
    use crate::game::reference::AbilityEntity;

    fn duel() -> (DuelState, EntityId, EntityId, CommandCatalogue) {
        let config = FlowConfig::default().with_output_mode(OutputMode::Memory);
        let (state, players) = sample_duel(&config, &["Alice", "Bob"]).unwrap();
        (state, players[0], players[1], sample_commands())
    }

    fn run(state: &mut DuelState, commands: &CommandCatalogue, name: &str, args: Value) -> Result<()> {
        let args = args.as_array().cloned().unwrap_or_default();
        (commands.resolve(name)?)(state, Submitter::System, &args)
    }

    #[test]
    fn test_plain_attack() {
        let (mut state, alice, bob, commands) = duel();
        run(&mut state, &commands, "attack", json!([alice, bob, 3])).unwrap();
        assert_eq!(state.attribute(bob, LIFE).unwrap(), 17);
        assert_eq!(state.notifications()[0].kind, "damage");
    }

    #[test]
    fn test_heal_with_vigor_and_chronicle() {
        let (mut state, alice, _, commands) = duel();
        run(&mut state, &commands, "grant", json!([alice, "Vigor"])).unwrap();
        run(&mut state, &commands, "grant", json!([alice, "Chronicle"])).unwrap();

        run(&mut state, &commands, "heal", json!([alice, 1])).unwrap();
        run(&mut state, &commands, "heal", json!([alice, 1])).unwrap();
        assert_eq!(state.attribute(alice, LIFE).unwrap(), STARTING_LIFE + 6);

        let chronicle = state
            .entity(alice)
            .unwrap()
            .find_ability(&AbilityName::new("Chronicle"))
            .unwrap();
        assert_eq!(chronicle.scratch.get("heals"), Some(&json!(2)));
    }

    #[test]
    fn test_revoke_unknown_ability_is_an_error() {
        let (mut state, alice, _, commands) = duel();
        assert!(matches!(
            run(&mut state, &commands, "revoke", json!([alice, "Armor"])),
            Err(DuelError::InvalidArgument(_))
        ));
        run(&mut state, &commands, "grant", json!([alice, "Armor"])).unwrap();
        run(&mut state, &commands, "revoke", json!([alice, "Armor"])).unwrap();
        assert!(state.entity(alice).unwrap().ability_refs().is_empty());
    }

    #[test]
    fn test_bad_arguments() {
        let (mut state, alice, _, commands) = duel();
        assert!(matches!(
            run(&mut state, &commands, "attack", json!([alice])),
            Err(DuelError::InvalidArgument(_))
        ));
        assert!(matches!(
            run(&mut state, &commands, "attack", json!([alice, -1, 2])),
            Err(DuelError::InvalidArgument(_))
        ));
        assert!(matches!(
            run(&mut state, &commands, "heal", json!([99, 2])),
            Err(DuelError::EntityNotFound(99))
        ));
    }

    #[test]
    fn test_facts_follow_submitters() {
        let (mut state, alice, bob, commands) = duel();
        let args = |value: &str| vec![json!("weather"), json!(value)];
        let submit = commands.resolve("assert_fact").unwrap();
        submit(&mut state, Submitter::Player(alice), &args("rain")).unwrap();
        submit(&mut state, Submitter::Player(bob), &args("rain")).unwrap();
        submit(&mut state, Submitter::System, &args("sun")).unwrap();

        run(&mut state, &commands, "announce_fact", json!(["weather", "clear"])).unwrap();
        assert_eq!(
            state.notifications().last().unwrap().payload,
            json!({ "fact": "weather", "value": "rain" })
        );

        // Alice leaves; her assertion goes with her
        state.remove_entity(alice).unwrap();
        state.prune_facts();
        assert_eq!(state.fact("weather").unwrap().source_count(&"rain".to_string()), 1);
    }

    #[test]
    fn test_concede_picks_surviving_opponent() {
        let (mut state, alice, bob, commands) = duel();
        state.start();
        run(&mut state, &commands, "concede", json!([alice])).unwrap();
        assert!(state.is_finished());
        assert_eq!(state.winner(), Some(bob));
    }
}
