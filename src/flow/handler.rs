//! Thread-safe command intake
//!
//! Any thread may enqueue; exactly one thread (the duel thread) waits and
//! dequeues. One mutex guards the ordered queue, the per-player index and
//! the readiness flag, so the emptiness check in
//! [`FlowCommandHandler::wait_until_command_ready`] and the flag reset can
//! never interleave with an enqueue.

use crate::core::{CommandName, EntityId};
use crate::flow::command::{
    CommandCatalogue, CommandOutcome, CommandReference, PendingCommand, Submitter,
};
use crate::flow::config::FlowConfig;
use crate::game::logger::{FlowLogger, VerbosityLevel};
use crate::game::DuelState;
use crate::Result;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[derive(Default)]
struct QueueState {
    pending: BTreeMap<CommandReference, PendingCommand>,
    /// Queue key of each player's single pending command
    by_player: FxHashMap<EntityId, CommandReference>,
    ready: bool,
    /// Sticky: once set, waits return immediately
    shutdown: bool,
    next_seq: u64,
}

/// Running counters, updated without taking the queue lock
#[derive(Debug, Default)]
pub struct FlowStats {
    enqueued: AtomicU64,
    replaced: AtomicU64,
    executed: AtomicU64,
    stale: AtomicU64,
    failed: AtomicU64,
    rejected: AtomicU64,
}

/// Point-in-time copy of [`FlowStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowStatsSnapshot {
    pub enqueued: u64,
    /// Pending commands discarded because their player submitted again
    pub replaced: u64,
    pub executed: u64,
    pub stale: u64,
    /// Commands that returned an error or panicked
    pub failed: u64,
    /// Enqueues refused because the command name was unknown
    pub rejected: u64,
}

impl FlowStats {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> FlowStatsSnapshot {
        FlowStatsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            replaced: self.replaced.load(Ordering::Relaxed),
            executed: self.executed.load(Ordering::Relaxed),
            stale: self.stale.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

/// Priority-ordered, per-player deduplicated command queue
pub struct FlowCommandHandler {
    catalogue: CommandCatalogue,
    queue: Mutex<QueueState>,
    ready_signal: Condvar,
    timeout: Duration,
    logger: Arc<FlowLogger>,
    stats: FlowStats,
}

impl FlowCommandHandler {
    pub fn new(catalogue: CommandCatalogue, timeout: Duration, logger: Arc<FlowLogger>) -> Self {
        FlowCommandHandler {
            catalogue,
            queue: Mutex::new(QueueState::default()),
            ready_signal: Condvar::new(),
            timeout,
            logger,
            stats: FlowStats::default(),
        }
    }

    pub fn from_config(catalogue: CommandCatalogue, config: &FlowConfig, logger: Arc<FlowLogger>) -> Self {
        Self::new(catalogue, config.command_timeout(), logger)
    }

    pub fn catalogue(&self) -> &CommandCatalogue {
        &self.catalogue
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn logger(&self) -> &Arc<FlowLogger> {
        &self.logger
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a command arriving now
    pub fn enqueue_command(&self, submitter: Submitter, name: &str, args: Vec<Value>) -> Result<()> {
        self.enqueue_command_at(submitter, name, args, Instant::now())
    }

    /// Queue a command with an explicit arrival time.
    ///
    /// Unknown names are rejected and nothing is queued. A player's new
    /// command replaces that player's pending one; system commands never
    /// replace each other.
    pub fn enqueue_command_at(&self, submitter: Submitter, name: &str, args: Vec<Value>, now: Instant) -> Result<()> {
        let action = match self.catalogue.resolve(name) {
            Ok(action) => action,
            Err(err) => {
                FlowStats::bump(&self.stats.rejected);
                self.logger.categorized(
                    VerbosityLevel::Normal,
                    "failure",
                    &format!("{submitter} submitted unknown command '{name}'"),
                );
                return Err(err);
            }
        };

        let replaced = {
            let mut queue = self.lock();
            let reference = CommandReference::new(submitter, now, queue.next_seq);
            queue.next_seq += 1;

            let mut replaced = None;
            if let Some(player) = submitter.player() {
                if let Some(previous) = queue.by_player.insert(player, reference) {
                    replaced = queue.pending.remove(&previous);
                }
            }
            queue.pending.insert(
                reference,
                PendingCommand::new(CommandName::new(name), submitter, args, now, action),
            );
            queue.ready = true;
            replaced
        };
        self.ready_signal.notify_all();

        FlowStats::bump(&self.stats.enqueued);
        if let Some(previous) = replaced {
            FlowStats::bump(&self.stats.replaced);
            self.logger.categorized(
                VerbosityLevel::Verbose,
                "command",
                &format!("{submitter}: '{name}' replaces pending '{}'", previous.name),
            );
        } else {
            self.logger.categorized(
                VerbosityLevel::Verbose,
                "command",
                &format!("{submitter}: '{name}' queued"),
            );
        }
        Ok(())
    }

    /// Block until a command is pending, the state is forced ready, or the
    /// handler is shut down. Returns immediately if something is queued.
    pub fn wait_until_command_ready(&self) {
        let mut queue = self.lock();
        if !queue.pending.is_empty() || queue.shutdown {
            return;
        }
        queue.ready = false;
        while !queue.ready && !queue.shutdown {
            queue = self
                .ready_signal
                .wait(queue)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like [`wait_until_command_ready`](Self::wait_until_command_ready) but
    /// gives up after `limit`. Returns false on timeout.
    pub fn wait_until_command_ready_for(&self, limit: Duration) -> bool {
        let Some(deadline) = Instant::now().checked_add(limit) else {
            self.wait_until_command_ready();
            return true;
        };
        let mut queue = self.lock();
        if !queue.pending.is_empty() || queue.shutdown {
            return true;
        }
        queue.ready = false;
        while !queue.ready && !queue.shutdown {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .ready_signal
                .wait_timeout(queue, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            queue = guard;
        }
        true
    }

    /// Wake the waiting thread even with an empty queue
    pub fn force_ready_state(&self) {
        self.lock().ready = true;
        self.ready_signal.notify_all();
    }

    /// Make every current and future wait return immediately
    pub fn shutdown(&self) {
        {
            let mut queue = self.lock();
            queue.shutdown = true;
            queue.ready = true;
        }
        self.ready_signal.notify_all();
    }

    pub fn is_shut_down(&self) -> bool {
        self.lock().shutdown
    }

    /// Pop and run the highest-priority command, if any
    pub fn dequeue_command_and_run(&self, state: &mut DuelState) -> Option<CommandOutcome> {
        self.dequeue_command_and_run_at(state, Instant::now())
    }

    /// Pop the highest-priority command and run it as of `now`.
    ///
    /// The queue lock is released before the command runs. Errors and
    /// panics from the command are logged and reported, never propagated.
    pub fn dequeue_command_and_run_at(&self, state: &mut DuelState, now: Instant) -> Option<CommandOutcome> {
        let command = {
            let mut queue = self.lock();
            let (reference, command) = queue.pending.pop_first()?;
            if let Some(player) = reference.submitter.player() {
                if queue.by_player.get(&player) == Some(&reference) {
                    queue.by_player.remove(&player);
                }
            }
            command
        };

        let name = command.name.clone();
        let submitter = command.submitter;
        let timeout = self.timeout;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| command.run(state, now, timeout)))
            .unwrap_or_else(|payload| CommandOutcome::Panicked(panic_message(payload.as_ref())));

        self.record(&name, submitter, &outcome);
        Some(outcome)
    }

    fn record(&self, name: &CommandName, submitter: Submitter, outcome: &CommandOutcome) {
        match outcome {
            CommandOutcome::Executed => {
                FlowStats::bump(&self.stats.executed);
                self.logger.categorized(
                    VerbosityLevel::Normal,
                    "command",
                    &format!("{submitter}: '{name}' executed"),
                );
            }
            CommandOutcome::Stale { elapsed } => {
                FlowStats::bump(&self.stats.stale);
                self.logger.categorized(
                    VerbosityLevel::Normal,
                    "stale",
                    &format!("{submitter}: '{name}' dropped after {}ms", elapsed.as_millis()),
                );
            }
            CommandOutcome::Failed(err) => {
                FlowStats::bump(&self.stats.failed);
                self.logger.categorized(
                    VerbosityLevel::Normal,
                    "failure",
                    &format!("{submitter}: '{name}' failed: {err}"),
                );
            }
            CommandOutcome::Panicked(message) => {
                FlowStats::bump(&self.stats.failed);
                self.logger.categorized(
                    VerbosityLevel::Normal,
                    "failure",
                    &format!("{submitter}: '{name}' panicked: {message}"),
                );
            }
        }
    }

    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().pending.is_empty()
    }

    /// Names of pending commands in execution order
    pub fn pending_names(&self) -> Vec<(Submitter, CommandName)> {
        self.lock()
            .pending
            .values()
            .map(|command| (command.submitter, command.name.clone()))
            .collect()
    }

    /// Drop every pending command; returns how many were dropped
    pub fn clear_pending(&self) -> usize {
        let mut queue = self.lock();
        queue.by_player.clear();
        let dropped = queue.pending.len();
        queue.pending.clear();
        dropped
    }

    pub fn stats(&self) -> FlowStatsSnapshot {
        self.stats.snapshot()
    }
}

impl std::fmt::Debug for FlowCommandHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowCommandHandler")
            .field("pending", &self.pending_count())
            .field("timeout", &self.timeout)
            .field("stats", &self.stats())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DuelError;
    use serde_json::json;
    use std::sync::mpsc;
    use std::thread;

    const ALICE: Submitter = Submitter::Player(EntityId::new(0));
    const BOB: Submitter = Submitter::Player(EntityId::new(1));

    /// Commands append "<submitter>:<name>:<arg>" to a shared trail
    fn recording_handler() -> (FlowCommandHandler, Arc<Mutex<Vec<String>>>) {
        let trail = Arc::new(Mutex::new(Vec::new()));
        let mut catalogue = CommandCatalogue::new();
        for name in ["x", "y", "z"] {
            let trail = Arc::clone(&trail);
            catalogue.register(name, move |_, submitter, args| {
                let arg = args.first().cloned().unwrap_or(Value::Null);
                trail.lock().unwrap().push(format!("{submitter}:{name}:{arg}"));
                Ok(())
            });
        }
        catalogue.register("fail", |_, _, _| Err(DuelError::InvalidAction("broken".into())));
        catalogue.register("boom", |_, _, _| panic!("command exploded"));
        let handler = FlowCommandHandler::new(
            catalogue,
            Duration::from_millis(1000),
            Arc::new(FlowLogger::capturing()),
        );
        (handler, trail)
    }

    fn drain(handler: &FlowCommandHandler, state: &mut DuelState, now: Instant) -> Vec<CommandOutcome> {
        std::iter::from_fn(|| handler.dequeue_command_and_run_at(state, now)).collect()
    }

    #[test]
    fn test_new_command_replaces_players_pending_one() {
        let (handler, trail) = recording_handler();
        let mut state = DuelState::new();
        let t0 = Instant::now();

        handler.enqueue_command_at(ALICE, "x", vec![json!(1)], t0).unwrap();
        handler.enqueue_command_at(ALICE, "y", vec![json!(2)], t0).unwrap();
        assert_eq!(handler.pending_count(), 1);

        drain(&handler, &mut state, t0);
        assert_eq!(*trail.lock().unwrap(), vec!["player 0:y:2".to_string()]);
        assert_eq!(handler.stats().replaced, 1);
        assert_eq!(handler.stats().executed, 1);
    }

    #[test]
    fn test_system_commands_accumulate_and_run_first() {
        let (handler, trail) = recording_handler();
        let mut state = DuelState::new();
        let t0 = Instant::now();

        handler.enqueue_command_at(BOB, "x", vec![json!("bob")], t0).unwrap();
        handler
            .enqueue_command_at(Submitter::System, "y", vec![json!(1)], t0 + Duration::from_millis(5))
            .unwrap();
        handler
            .enqueue_command_at(Submitter::System, "y", vec![json!(2)], t0 + Duration::from_millis(6))
            .unwrap();
        handler
            .enqueue_command_at(ALICE, "z", vec![json!("alice")], t0 + Duration::from_millis(1))
            .unwrap();
        assert_eq!(handler.pending_count(), 4);

        drain(&handler, &mut state, t0 + Duration::from_millis(10));
        assert_eq!(
            *trail.lock().unwrap(),
            vec![
                "system:y:1".to_string(),
                "system:y:2".to_string(),
                "player 1:x:\"bob\"".to_string(),
                "player 0:z:\"alice\"".to_string(),
            ]
        );
    }

    #[test]
    fn test_stale_command_is_dropped_unexecuted() {
        let (handler, trail) = recording_handler();
        let mut state = DuelState::new();
        let t0 = Instant::now();

        handler.enqueue_command_at(ALICE, "x", vec![], t0).unwrap();
        let outcome = handler
            .dequeue_command_and_run_at(&mut state, t0 + Duration::from_millis(1200))
            .unwrap();

        assert!(matches!(outcome, CommandOutcome::Stale { .. }));
        assert!(trail.lock().unwrap().is_empty());
        assert_eq!(handler.stats().stale, 1);
        assert_eq!(handler.logger().logs_in("stale").len(), 1);
    }

    #[test]
    fn test_unknown_command_fails_closed() {
        let (handler, _) = recording_handler();
        let result = handler.enqueue_command(ALICE, "teleport", vec![]);

        assert!(matches!(result, Err(DuelError::UnknownCommand(_))));
        assert!(handler.is_empty());
        assert_eq!(handler.stats().rejected, 1);
        assert_eq!(handler.stats().enqueued, 0);
    }

    #[test]
    fn test_failures_and_panics_do_not_escape() {
        let (handler, trail) = recording_handler();
        let mut state = DuelState::new();
        let t0 = Instant::now();

        handler.enqueue_command_at(Submitter::System, "fail", vec![], t0).unwrap();
        handler.enqueue_command_at(Submitter::System, "boom", vec![], t0).unwrap();
        handler.enqueue_command_at(Submitter::System, "x", vec![], t0).unwrap();

        let outcomes = drain(&handler, &mut state, t0);
        assert!(matches!(outcomes[0], CommandOutcome::Failed(_)));
        assert!(matches!(&outcomes[1], CommandOutcome::Panicked(msg) if msg == "command exploded"));
        assert!(outcomes[2].is_executed());
        assert_eq!(trail.lock().unwrap().len(), 1);
        assert_eq!(handler.stats().failed, 2);
        assert_eq!(handler.logger().logs_in("failure").len(), 2);
    }

    #[test]
    fn test_wait_returns_immediately_when_pending() {
        let (handler, _) = recording_handler();
        handler.enqueue_command(ALICE, "x", vec![]).unwrap();
        handler.wait_until_command_ready();
        assert!(handler.wait_until_command_ready_for(Duration::from_millis(1)));
    }

    #[test]
    fn test_wait_times_out_on_empty_queue() {
        let (handler, _) = recording_handler();
        assert!(!handler.wait_until_command_ready_for(Duration::from_millis(20)));
    }

    #[test]
    fn test_enqueue_from_another_thread_wakes_waiter() {
        let (handler, _) = recording_handler();
        let handler = Arc::new(handler);
        let (done_tx, done_rx) = mpsc::channel();

        let waiter = {
            let handler = Arc::clone(&handler);
            thread::spawn(move || {
                handler.wait_until_command_ready();
                done_tx.send(()).unwrap();
            })
        };

        handler.enqueue_command(BOB, "x", vec![]).unwrap();
        done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        waiter.join().unwrap();
    }

    #[test]
    fn test_force_ready_unblocks_empty_wait() {
        let (handler, _) = recording_handler();
        let handler = Arc::new(handler);
        let (done_tx, done_rx) = mpsc::channel();

        let waiter = {
            let handler = Arc::clone(&handler);
            thread::spawn(move || {
                handler.wait_until_command_ready();
                done_tx.send(()).unwrap();
            })
        };

        // A signal sent before the waiter resets the flag is lost, so keep
        // signalling until it reports back
        let mut woke = false;
        for _ in 0..500 {
            handler.force_ready_state();
            if done_rx.recv_timeout(Duration::from_millis(10)).is_ok() {
                woke = true;
                break;
            }
        }
        assert!(woke);
        waiter.join().unwrap();
        assert!(handler.is_empty());
    }

    #[test]
    fn test_shutdown_is_sticky() {
        let (handler, _) = recording_handler();
        handler.shutdown();
        assert!(handler.is_shut_down());
        handler.wait_until_command_ready();
        handler.wait_until_command_ready();
    }

    #[test]
    fn test_unbounded_wait_limit_does_not_overflow() {
        let (handler, _) = recording_handler();
        handler.shutdown();
        assert!(handler.wait_until_command_ready_for(Duration::MAX));

        let (handler, _) = recording_handler();
        let handler = Arc::new(handler);
        let (done_tx, done_rx) = mpsc::channel();
        let waiter = {
            let handler = Arc::clone(&handler);
            thread::spawn(move || {
                let ready = handler.wait_until_command_ready_for(Duration::MAX);
                done_tx.send(ready).unwrap();
            })
        };

        handler.enqueue_command(ALICE, "x", vec![]).unwrap();
        assert!(done_rx.recv_timeout(Duration::from_secs(5)).unwrap());
        waiter.join().unwrap();
    }

    #[test]
    fn test_concurrent_players_keep_one_entry_each() {
        let (handler, trail) = recording_handler();
        let handler = Arc::new(handler);

        let workers: Vec<_> = (0..8u32)
            .map(|player| {
                let handler = Arc::clone(&handler);
                thread::spawn(move || {
                    let submitter = Submitter::Player(EntityId::new(player));
                    for round in 0..50 {
                        handler.enqueue_command(submitter, "x", vec![json!(round)]).unwrap();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(handler.pending_count(), 8);
        let stats = handler.stats();
        assert_eq!(stats.enqueued, 400);
        assert_eq!(stats.replaced, 392);

        // Each player's survivor is its last submission
        let mut state = DuelState::new();
        let outcomes = drain(&handler, &mut state, Instant::now());
        assert_eq!(outcomes.len(), 8);
        assert!(outcomes.iter().all(CommandOutcome::is_executed));
        assert!(trail.lock().unwrap().iter().all(|entry| entry.ends_with(":x:49")));
    }

    #[test]
    fn test_clear_pending_resets_player_index() {
        let (handler, _) = recording_handler();
        handler.enqueue_command(ALICE, "x", vec![]).unwrap();
        handler.enqueue_command(Submitter::System, "x", vec![]).unwrap();
        assert_eq!(handler.clear_pending(), 2);

        handler.enqueue_command(ALICE, "y", vec![]).unwrap();
        assert_eq!(handler.stats().replaced, 0);
        assert_eq!(
            handler.pending_names(),
            vec![(ALICE, CommandName::new("y"))]
        );
    }
}
