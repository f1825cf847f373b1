//! Error types for the duel runtime

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DuelError {
    #[error("Entity not found: {0}")]
    EntityNotFound(u32),

    #[error("Source not found: {0}")]
    SourceNotFound(u32),

    #[error("Re-parenting source {child} under {parent} would create a cycle")]
    SourceCycle { child: u32, parent: u32 },

    #[error("Ongoing effect not found: {0}")]
    EffectNotFound(u32),

    #[error("Ability reference not found: {0}")]
    AbilityRefNotFound(u32),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid game action: {0}")]
    InvalidAction(String),

    #[error("Failed to spawn duel thread: {0}")]
    ThreadSpawn(std::io::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for DuelError {
    fn from(err: serde_json::Error) -> Self {
        DuelError::SerializationError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DuelError>;
