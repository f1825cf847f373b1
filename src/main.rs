//! Duel Flow - Main Binary
//!
//! Runs the sample content package with several simulated remote players
//! submitting commands concurrently to one duel thread.

use clap::{Parser, Subcommand};
use duel_flow::{
    core::{EntityId, GameEntity},
    flow::{DuelFlow, FlowCommandHandler, FlowConfig, Submitter},
    game::{OutputMode, VerbosityLevel},
    sample::{sample_commands, sample_duel, LIFE},
    DuelError, Result,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha12Rng;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Abilities handed out round-robin to simulated players
const SIMULATION_ABILITIES: [&str; 3] = ["Armor", "Amplify", "Thorns"];

#[derive(Parser)]
#[command(name = "duel")]
#[command(about = "Duel Flow - rules runtime for turn-based card duels", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate a duel between concurrently submitting players
    Simulate {
        /// JSON flow configuration (flags below override it)
        #[arg(long, value_name = "CONFIG_FILE")]
        config: Option<PathBuf>,

        /// Number of simulated players
        #[arg(long, short = 'p', default_value_t = 2)]
        players: usize,

        /// Attacks submitted per player
        #[arg(long, short = 'r', default_value_t = 20)]
        rounds: usize,

        /// Set random seed for deterministic testing
        #[arg(long)]
        seed: Option<u64>,

        /// Verbosity level for output (0=silent, 1=minimal, 2=normal, 3=verbose)
        #[arg(long, short = 'v')]
        verbosity: Option<VerbosityLevel>,

        /// Staleness timeout for queued commands, in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Print duel notifications as JSON lines
        #[arg(long)]
        print_json: bool,
    },

    /// Print the default configuration as JSON
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate {
            config,
            players,
            rounds,
            seed,
            verbosity,
            timeout_ms,
            print_json,
        } => {
            let mut flow_config = match config {
                Some(path) => FlowConfig::load(path)?,
                None => FlowConfig::default(),
            };
            if let Some(seed) = seed {
                flow_config = flow_config.with_seed(seed);
            }
            if let Some(verbosity) = verbosity {
                flow_config = flow_config.with_verbosity(verbosity);
            }
            if let Some(timeout_ms) = timeout_ms {
                flow_config = flow_config.with_command_timeout(Duration::from_millis(timeout_ms));
            }
            run_simulation(flow_config, players, rounds, print_json).await?
        }
        Commands::Config => println!("{}", FlowConfig::default().to_json_pretty()?),
    }

    Ok(())
}

async fn run_simulation(config: FlowConfig, players: usize, rounds: usize, print_json: bool) -> Result<()> {
    if players < 2 {
        return Err(DuelError::InvalidArgument("a duel needs at least 2 players".to_string()));
    }

    let names: Vec<String> = (1..=players).map(|i| format!("Player {i}")).collect();
    let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let (mut state, ids) = sample_duel(&config, &name_refs)?;
    for (i, &id) in ids.iter().enumerate() {
        state.grant_ability(id, SIMULATION_ABILITIES[i % SIMULATION_ABILITIES.len()])?;
    }

    let mut flow = DuelFlow::new(state, sample_commands(), &config);
    let (winner_tx, winner_rx) = tokio::sync::oneshot::channel();
    flow.on_finished(move |state| {
        // Receiver gone means nobody is listening any more
        let _ = winner_tx.send(state.winner());
    });
    flow.start()?;

    let mut submitters = Vec::with_capacity(ids.len());
    for (i, &attacker) in ids.iter().enumerate() {
        let handler = Arc::clone(flow.handler());
        let target = ids[(i + 1) % ids.len()];
        let seed = config.seed.wrapping_add(i as u64);
        submitters.push(tokio::spawn(submit_attacks(handler, attacker, target, rounds, seed)));
    }

    for round in 0..rounds {
        tokio::time::sleep(Duration::from_millis(10)).await;
        if round % 5 == 4 {
            flow.enqueue_command(Submitter::System, "end_turn", vec![])?;
        }
    }
    for submitter in submitters {
        submitter
            .await
            .map_err(|err| DuelError::InvalidAction(format!("submitter task failed: {err}")))?;
    }

    // Let the duel thread drain what is left before stopping it
    let handler = Arc::clone(flow.handler());
    for _ in 0..200 {
        if handler.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    flow.stop();

    let mut state = tokio::task::spawn_blocking(move || flow.into_state())
        .await
        .map_err(|err| DuelError::InvalidAction(format!("duel thread join failed: {err}")))??;
    let winner = winner_rx.await.ok().flatten();

    if config.output_mode == OutputMode::Memory {
        state.logger().flush_buffer();
    }
    if print_json {
        for notification in state.drain_notifications() {
            println!("{}", serde_json::to_string(&notification)?);
        }
    }

    println!("=== Duel Summary ===");
    println!("Turn: {}", state.turn());
    match winner {
        Some(id) => println!("Winner: {}", state.entity(id)?.name()),
        None => println!("Winner: none"),
    }
    for &id in &ids {
        let entity = state.entity(id)?;
        println!("  {}: {} life", entity.name(), entity.attribute(LIFE));
    }
    println!("Stats: {}", serde_json::to_string(&handler.stats())?);
    Ok(())
}

async fn submit_attacks(
    handler: Arc<FlowCommandHandler>,
    attacker: EntityId,
    target: EntityId,
    rounds: usize,
    seed: u64,
) {
    let mut rng = ChaCha12Rng::seed_from_u64(seed);
    for _ in 0..rounds {
        let amount: i64 = rng.gen_range(1..=4);
        if let Err(err) = handler.enqueue_command(
            Submitter::Player(attacker),
            "attack",
            vec![json!(attacker), json!(target), json!(amount)],
        ) {
            eprintln!("player {attacker}: {err}");
            return;
        }
        tokio::time::sleep(Duration::from_millis(rng.gen_range(1..=8))).await;
    }
}
