//! Command scheduling and the duel thread

pub mod command;
pub mod config;
pub mod duel_flow;
pub mod handler;

pub use command::{
    CommandCatalogue, CommandFn, CommandOutcome, CommandReference, PendingCommand, Submitter,
};
pub use config::{FlowConfig, DEFAULT_COMMAND_TIMEOUT_MS};
pub use duel_flow::{DuelFlow, FinishedCallback};
pub use handler::{FlowCommandHandler, FlowStats, FlowStatsSnapshot};
