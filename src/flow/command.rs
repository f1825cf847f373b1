//! Commands: who submitted them, how they are ordered, and how they run

use crate::core::{CommandName, EntityId};
use crate::game::DuelState;
use crate::{DuelError, Result};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Who a command came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Submitter {
    /// The duel itself; outranks every player and is never deduplicated
    System,
    Player(EntityId),
}

impl Submitter {
    pub fn is_system(&self) -> bool {
        matches!(self, Submitter::System)
    }

    /// Lower ranks run first
    pub fn rank(&self) -> u8 {
        match self {
            Submitter::System => 0,
            Submitter::Player(_) => 1,
        }
    }

    /// The entity a player command acts for
    pub fn player(&self) -> Option<EntityId> {
        match self {
            Submitter::System => None,
            Submitter::Player(id) => Some(*id),
        }
    }
}

impl fmt::Display for Submitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Submitter::System => write!(f, "system"),
            Submitter::Player(id) => write!(f, "player {id}"),
        }
    }
}

/// Queue key of a pending command.
///
/// Ordered by submitter rank, then arrival time, then a per-handler
/// sequence number so two entries never compare equal. Per-player
/// replacement is tracked by the handler's player index, not by key equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandReference {
    pub submitter: Submitter,
    pub time: Instant,
    seq: u64,
}

impl CommandReference {
    pub fn new(submitter: Submitter, time: Instant, seq: u64) -> Self {
        CommandReference {
            submitter,
            time,
            seq,
        }
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }
}

impl Ord for CommandReference {
    fn cmp(&self, other: &Self) -> Ordering {
        self.submitter
            .rank()
            .cmp(&other.submitter.rank())
            .then_with(|| self.time.cmp(&other.time))
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for CommandReference {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A command body. Receives the duel state, the submitter and the raw
/// untyped arguments.
pub type CommandFn = Arc<dyn Fn(&mut DuelState, Submitter, &[Value]) -> Result<()> + Send + Sync>;

/// Name to command lookup supplied by a content package
#[derive(Clone, Default)]
pub struct CommandCatalogue {
    commands: FxHashMap<CommandName, CommandFn>,
}

impl CommandCatalogue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<CommandName>, action: F)
    where
        F: Fn(&mut DuelState, Submitter, &[Value]) -> Result<()> + Send + Sync + 'static,
    {
        self.commands.insert(name.into(), Arc::new(action));
    }

    /// Builder-style [`register`](Self::register)
    pub fn with<F>(mut self, name: impl Into<CommandName>, action: F) -> Self
    where
        F: Fn(&mut DuelState, Submitter, &[Value]) -> Result<()> + Send + Sync + 'static,
    {
        self.register(name, action);
        self
    }

    pub fn resolve(&self, name: &str) -> Result<CommandFn> {
        self.commands
            .get(&CommandName::new(name))
            .cloned()
            .ok_or_else(|| DuelError::UnknownCommand(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(&CommandName::new(name))
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<CommandName> {
        let mut names: Vec<CommandName> = self.commands.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl fmt::Debug for CommandCatalogue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandCatalogue")
            .field("commands", &self.names())
            .finish()
    }
}

/// How a dequeued command ended
#[derive(Debug)]
pub enum CommandOutcome {
    Executed,
    /// Attempted too long after it was enqueued; the action never ran
    Stale { elapsed: Duration },
    Failed(DuelError),
    Panicked(String),
}

impl CommandOutcome {
    pub fn is_executed(&self) -> bool {
        matches!(self, CommandOutcome::Executed)
    }
}

/// A resolved command waiting in the queue
pub struct PendingCommand {
    pub name: CommandName,
    pub submitter: Submitter,
    pub args: Vec<Value>,
    pub enqueued_at: Instant,
    action: CommandFn,
}

impl PendingCommand {
    pub fn new(name: CommandName, submitter: Submitter, args: Vec<Value>, enqueued_at: Instant, action: CommandFn) -> Self {
        PendingCommand {
            name,
            submitter,
            args,
            enqueued_at,
            action,
        }
    }

    /// Time spent in the queue as of `now`
    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.enqueued_at)
    }

    /// Run the action unless it has been waiting `timeout` or longer.
    /// Panics are not caught here.
    pub fn run(self, state: &mut DuelState, now: Instant, timeout: Duration) -> CommandOutcome {
        let elapsed = self.elapsed(now);
        if elapsed >= timeout {
            return CommandOutcome::Stale { elapsed };
        }
        match (self.action)(state, self.submitter, &self.args) {
            Ok(()) => CommandOutcome::Executed,
            Err(err) => CommandOutcome::Failed(err),
        }
    }
}

impl fmt::Debug for PendingCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingCommand")
            .field("name", &self.name)
            .field("submitter", &self.submitter)
            .field("args", &self.args)
            .finish()
    }
}
