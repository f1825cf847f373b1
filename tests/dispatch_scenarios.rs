//! Ability and ongoing-effect scenarios driven through the sample commands
//!
//! Commands run directly on the test thread; the duel thread is not needed
//! to observe dispatch order.

use duel_flow::core::{AbilityName, EntityId, Trigger, TriggerKey, TriggerType};
use duel_flow::flow::{CommandCatalogue, FlowConfig, Submitter};
use duel_flow::game::{DuelState, OutputMode};
use duel_flow::sample::{sample_commands, sample_duel, LIFE, STARTING_LIFE};
use duel_flow::Result;
use serde_json::{json, Value};
use similar_asserts::assert_eq;

struct Duel {
    state: DuelState,
    commands: CommandCatalogue,
    alice: EntityId,
    bob: EntityId,
}

impl Duel {
    fn new() -> Result<Self> {
        Self::with_seed(0)
    }

    fn with_seed(seed: u64) -> Result<Self> {
        let config = FlowConfig::default()
            .with_output_mode(OutputMode::Memory)
            .with_seed(seed);
        let (mut state, players) = sample_duel(&config, &["Alice", "Bob"])?;
        state.start();
        Ok(Duel {
            state,
            commands: sample_commands(),
            alice: players[0],
            bob: players[1],
        })
    }

    fn run_as(&mut self, submitter: Submitter, name: &str, args: Value) -> Result<()> {
        let action = self.commands.resolve(name)?;
        let args = args.as_array().cloned().unwrap_or_default();
        action(&mut self.state, submitter, &args)
    }

    fn run(&mut self, name: &str, args: Value) -> Result<()> {
        self.run_as(Submitter::System, name, args)
    }

    fn life(&self, id: EntityId) -> Result<i64> {
        self.state.attribute(id, LIFE)
    }

    fn last_payload(&self, kind: &str) -> Option<Value> {
        self.state
            .notifications()
            .iter()
            .rev()
            .find(|notification| notification.kind == kind)
            .map(|notification| notification.payload.clone())
    }
}

#[test]
fn test_amplify_applies_before_armor_regardless_of_holder_order() -> Result<()> {
    let mut duel = Duel::new()?;
    // Alice (added first) wears the armor, so insertion order alone would
    // subtract before doubling
    duel.run("grant", json!([duel.alice, "Armor"]))?;
    duel.run("grant", json!([duel.bob, "Amplify"]))?;

    duel.run("attack", json!([duel.bob, duel.alice, 3]))?;
    // 3 * 2 - 1, not (3 - 1) * 2
    assert_eq!(duel.life(duel.alice)?, STARTING_LIFE - 5);

    // Amplify only doubles its holder's own damage
    duel.run("attack", json!([duel.alice, duel.bob, 3]))?;
    assert_eq!(duel.life(duel.bob)?, STARTING_LIFE - 3);
    Ok(())
}

#[test]
fn test_armor_never_heals() -> Result<()> {
    let mut duel = Duel::new()?;
    duel.run("grant", json!([duel.bob, "Armor"]))?;
    duel.run("attack", json!([duel.alice, duel.bob, 1]))?;

    assert_eq!(duel.life(duel.bob)?, STARTING_LIFE);
    assert_eq!(
        duel.last_payload("damage"),
        Some(json!({
            "attacker": duel.alice,
            "requested": 1,
            "amount": 0,
            "prevented": false,
            "life": STARTING_LIFE,
        }))
    );
    Ok(())
}

#[test]
fn test_fog_prevents_damage_until_turn_ends() -> Result<()> {
    let mut duel = Duel::new()?;
    duel.run("grant", json!([duel.bob, "Amplify"]))?;
    duel.run("fog", json!([duel.alice]))?;
    assert_eq!(duel.state.effects.get_active_effects().len(), 1);

    // The effect speaks last, after every ability has had its say
    duel.run("attack", json!([duel.bob, duel.alice, 5]))?;
    assert_eq!(duel.life(duel.alice)?, STARTING_LIFE);
    assert_eq!(duel.last_payload("damage").unwrap()["prevented"], json!(true));

    duel.run("end_turn", json!([]))?;
    assert!(duel.state.effects.is_empty());
    assert_eq!(duel.state.turn(), 2);

    duel.run("attack", json!([duel.bob, duel.alice, 5]))?;
    assert_eq!(duel.life(duel.alice)?, STARTING_LIFE - 10);
    Ok(())
}

#[test]
fn test_fog_ends_when_its_caster_leaves() -> Result<()> {
    let mut duel = Duel::new()?;
    duel.run("fog", json!([duel.alice]))?;
    let effect = duel.state.effects.get_active_effects()[0];
    let effect_source = duel.state.effects.get(effect)?.source();

    duel.state.remove_entity(duel.alice)?;
    assert!(!duel.state.sources.is_valid(effect_source));
    assert!(duel.state.effects.get(effect).is_err());
    assert!(duel.state.effects.get_active_effects().is_empty());

    for _ in 0..5 {
        duel.run("end_turn", json!([]))?;
    }
    assert!(duel.state.effects.is_empty());

    duel.run("attack", json!([duel.bob, duel.bob, 2]))?;
    assert_eq!(duel.life(duel.bob)?, STARTING_LIFE - 2);
    Ok(())
}

#[test]
fn test_thorns_strikes_back() -> Result<()> {
    let mut duel = Duel::new()?;
    duel.run("grant", json!([duel.bob, "Thorns"]))?;

    duel.run("attack", json!([duel.alice, duel.bob, 2]))?;
    assert_eq!(duel.life(duel.bob)?, STARTING_LIFE - 2);
    assert_eq!(duel.life(duel.alice)?, STARTING_LIFE - 1);
    assert_eq!(
        duel.last_payload("thorns"),
        Some(json!({ "from": duel.bob, "life": STARTING_LIFE - 1 }))
    );

    // Fully prevented damage is not "damaged"
    duel.run("fog", json!([duel.bob]))?;
    duel.run("attack", json!([duel.alice, duel.bob, 2]))?;
    assert_eq!(duel.life(duel.alice)?, STARTING_LIFE - 1);
    Ok(())
}

#[test]
fn test_thorns_can_finish_the_duel() -> Result<()> {
    let mut duel = Duel::new()?;
    duel.run("grant", json!([duel.bob, "Thorns"]))?;
    duel.state.set_attribute(duel.alice, LIFE, 1)?;

    duel.run("attack", json!([duel.alice, duel.bob, 2]))?;
    assert!(duel.state.is_finished());
    assert_eq!(duel.state.winner(), Some(duel.bob));
    Ok(())
}

#[test]
fn test_revoked_ability_stops_reacting() -> Result<()> {
    let mut duel = Duel::new()?;
    duel.run("grant", json!([duel.bob, "Armor"]))?;
    duel.run("revoke", json!([duel.bob, "Armor"]))?;

    duel.run("attack", json!([duel.alice, duel.bob, 3]))?;
    assert_eq!(duel.life(duel.bob)?, STARTING_LIFE - 3);
    Ok(())
}

#[test]
fn test_missing_ability_is_inert() -> Result<()> {
    let mut duel = Duel::new()?;
    duel.run("grant", json!([duel.alice, "Chainmail of Nowhere"]))?;
    assert_eq!(
        duel.last_payload("granted"),
        Some(json!({ "ability": "Missing" }))
    );

    let entity = duel.state.entity(duel.alice)?;
    let missing = entity
        .find_ability(&AbilityName::new("Missing"))
        .expect("placeholder attached");
    assert!(missing.ability().is_missing());
    assert_eq!(missing.ability().description(), "This ability could not be found.");

    let source = duel.state.root_source();
    for kind in [
        TriggerType::Implicit,
        TriggerType::Explicit,
        TriggerType::ExplicitData,
        TriggerType::DataOverride,
    ] {
        for key in ["modify_damage", "damaged", "heal_amount", "healed", "anything"] {
            let trigger = Trigger::new(TriggerKey::new(key), kind, source);
            assert!(duel.state.get_reactions(duel.alice, &trigger)?.is_empty());
        }
    }

    duel.run("attack", json!([duel.bob, duel.alice, 4]))?;
    assert_eq!(duel.life(duel.alice)?, STARTING_LIFE - 4);
    Ok(())
}

#[test]
fn test_heal_reads_back_vigor_bonus() -> Result<()> {
    let mut duel = Duel::new()?;
    duel.run("grant", json!([duel.alice, "Vigor"]))?;
    duel.run("heal", json!([duel.alice, 3]))?;
    duel.run("heal", json!([duel.bob, 3]))?;

    assert_eq!(duel.life(duel.alice)?, STARTING_LIFE + 5);
    assert_eq!(duel.life(duel.bob)?, STARTING_LIFE + 3);
    Ok(())
}

#[test]
fn test_fact_majority_and_seeded_tie_break() -> Result<()> {
    let resolve_tie = |seed: u64| -> Result<Value> {
        let mut duel = Duel::with_seed(seed)?;
        let (alice, bob) = (Submitter::Player(duel.alice), Submitter::Player(duel.bob));
        duel.run_as(alice, "assert_fact", json!(["arena", "volcano"]))?;
        duel.run_as(bob, "assert_fact", json!(["arena", "glacier"]))?;
        duel.run("announce_fact", json!(["arena", "plains"]))?;
        Ok(duel.last_payload("fact").unwrap()["value"].clone())
    };

    // Same seed, same winner
    let first = resolve_tie(7)?;
    assert_eq!(resolve_tie(7)?, first);
    assert!(first == json!("volcano") || first == json!("glacier"));

    let mut duel = Duel::new()?;
    let alice = Submitter::Player(duel.alice);
    duel.run("announce_fact", json!(["arena", "plains"]))?;
    assert_eq!(duel.last_payload("fact").unwrap()["value"], json!("plains"));

    duel.run_as(alice, "assert_fact", json!(["arena", "volcano"]))?;
    duel.run("assert_fact", json!(["arena", "volcano"]))?;
    duel.run_as(Submitter::Player(duel.bob), "assert_fact", json!(["arena", "glacier"]))?;
    duel.run("announce_fact", json!(["arena", "plains"]))?;
    assert_eq!(duel.last_payload("fact").unwrap()["value"], json!("volcano"));

    duel.run_as(alice, "retract_fact", json!(["arena", "volcano"]))?;
    duel.run("retract_fact", json!(["arena", "volcano"]))?;
    duel.run("announce_fact", json!(["arena", "plains"]))?;
    assert_eq!(duel.last_payload("fact").unwrap()["value"], json!("glacier"));
    Ok(())
}
