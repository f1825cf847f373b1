//! Duel Flow - rules runtime for turn-based card duels
//!
//! Content packages attach abilities that react to named triggers on
//! entities, while a scheduler serializes commands submitted from any
//! thread onto one authoritative game-loop thread.

pub mod core;
pub mod error;
pub mod flow;
pub mod game;
pub mod sample;

pub use error::{DuelError, Result};
