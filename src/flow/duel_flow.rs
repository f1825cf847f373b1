//! The duel thread
//!
//! `DuelFlow` moves the [`DuelState`] onto one dedicated thread, which is
//! then the only writer of that state. Other threads reach it solely by
//! enqueueing commands on the shared [`FlowCommandHandler`].

use crate::flow::command::{CommandCatalogue, Submitter};
use crate::flow::config::FlowConfig;
use crate::flow::handler::FlowCommandHandler;
use crate::game::logger::{FlowLogger, VerbosityLevel};
use crate::game::DuelState;
use crate::{DuelError, Result};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Invoked on the duel thread once the loop has ended and state is cleaned up
pub type FinishedCallback = Box<dyn FnOnce(&DuelState) + Send>;

/// Owns the duel thread and its lifecycle
pub struct DuelFlow {
    handler: Arc<FlowCommandHandler>,
    stopped: Arc<AtomicBool>,
    /// Present until `start` hands the state to the thread
    pending_state: Option<DuelState>,
    on_finished: Option<FinishedCallback>,
    worker: Option<JoinHandle<DuelState>>,
    /// State handed back by the thread after it was joined
    finished_state: Option<DuelState>,
    thread_name: String,
    logger: Arc<FlowLogger>,
    disposed: bool,
}

impl DuelFlow {
    /// The flow logs through the state's logger
    pub fn new(state: DuelState, commands: CommandCatalogue, config: &FlowConfig) -> Self {
        let logger = Arc::clone(state.logger());
        DuelFlow {
            handler: Arc::new(FlowCommandHandler::from_config(
                commands,
                config,
                Arc::clone(&logger),
            )),
            stopped: Arc::new(AtomicBool::new(false)),
            pending_state: Some(state),
            on_finished: None,
            worker: None,
            finished_state: None,
            thread_name: config.thread_name.clone(),
            logger,
            disposed: false,
        }
    }

    /// Register a callback run when the duel loop ends. Ignored once started.
    pub fn on_finished<F>(&mut self, callback: F)
    where
        F: FnOnce(&DuelState) + Send + 'static,
    {
        self.on_finished = Some(Box::new(callback));
    }

    /// Shared intake; clone the `Arc` to submit from other threads
    pub fn handler(&self) -> &Arc<FlowCommandHandler> {
        &self.handler
    }

    pub fn enqueue_command(&self, submitter: Submitter, name: &str, args: Vec<Value>) -> Result<()> {
        self.handler.enqueue_command(submitter, name, args)
    }

    /// Spawn the duel thread. Starting twice is a logged no-op.
    pub fn start(&mut self) -> Result<()> {
        if self.disposed {
            return Err(DuelError::InvalidAction("duel flow already disposed".to_string()));
        }
        let Some(state) = self.pending_state.take() else {
            self.logger
                .categorized(VerbosityLevel::Normal, "lifecycle", "duel flow already started");
            return Ok(());
        };

        let handler = Arc::clone(&self.handler);
        let stopped = Arc::clone(&self.stopped);
        let on_finished = self.on_finished.take();
        let worker = thread::Builder::new()
            .name(self.thread_name.clone())
            .spawn(move || run_duel(state, &handler, &stopped, on_finished))
            .map_err(DuelError::ThreadSpawn)?;

        self.worker = Some(worker);
        self.logger.categorized(
            VerbosityLevel::Minimal,
            "lifecycle",
            &format!("duel thread '{}' started", self.thread_name),
        );
        Ok(())
    }

    /// Ask the loop to end after the command in flight. Stopping twice is a
    /// logged no-op.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            self.logger
                .categorized(VerbosityLevel::Normal, "lifecycle", "duel flow already stopped");
            return;
        }
        self.handler.shutdown();
        self.logger
            .categorized(VerbosityLevel::Minimal, "lifecycle", "duel flow stopping");
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|worker| !worker.is_finished())
    }

    /// Wait for the duel thread to end and borrow the final state. Does not
    /// stop the loop; call [`stop`](Self::stop) first to end an unfinished duel.
    pub fn join(&mut self) -> Result<&DuelState> {
        self.join_worker()?;
        self.finished_state
            .as_ref()
            .ok_or_else(|| DuelError::InvalidAction("duel flow was never started".to_string()))
    }

    /// Stop, join and take the state back. An unstarted flow returns its
    /// initial state.
    pub fn into_state(mut self) -> Result<DuelState> {
        self.stop();
        self.join_worker()?;
        self.finished_state
            .take()
            .or_else(|| self.pending_state.take())
            .ok_or_else(|| DuelError::InvalidAction("duel state is no longer available".to_string()))
    }

    fn join_worker(&mut self) -> Result<()> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        match worker.join() {
            Ok(state) => {
                self.finished_state = Some(state);
                Ok(())
            }
            Err(_) => {
                self.logger
                    .categorized(VerbosityLevel::Minimal, "failure", "duel thread panicked");
                Err(DuelError::InvalidAction("duel thread panicked".to_string()))
            }
        }
    }

    /// Stop and join. Safe to call any number of times; `Drop` calls it too.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        if !self.is_stopped() {
            self.stop();
        }
        if let Err(err) = self.join_worker() {
            self.logger.categorized(
                VerbosityLevel::Minimal,
                "failure",
                &format!("dispose: {err}"),
            );
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}

impl Drop for DuelFlow {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for DuelFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuelFlow")
            .field("thread_name", &self.thread_name)
            .field("running", &self.is_running())
            .field("stopped", &self.is_stopped())
            .field("disposed", &self.disposed)
            .field("handler", &self.handler)
            .finish()
    }
}

/// Body of the duel thread
fn run_duel(
    mut state: DuelState,
    handler: &FlowCommandHandler,
    stopped: &AtomicBool,
    on_finished: Option<FinishedCallback>,
) -> DuelState {
    state.start();
    while !stopped.load(Ordering::SeqCst) && state.not_finished() {
        handler.wait_until_command_ready();
        if stopped.load(Ordering::SeqCst) || state.is_finished() {
            break;
        }
        handler.dequeue_command_and_run(&mut state);
    }

    let left = handler.pending_count();
    if left > 0 {
        state.logger().categorized(
            VerbosityLevel::Normal,
            "lifecycle",
            &format!("duel loop ended with {left} command(s) pending"),
        );
    }
    state.cleanup_on_game_finished();
    if let Some(callback) = on_finished {
        callback(&state);
    }
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::EntityId;
    use std::sync::mpsc;
    use std::time::{Duration, Instant};

    fn quiet_state() -> DuelState {
        DuelState::new().with_logger(Arc::new(FlowLogger::capturing()))
    }

    fn counting_commands(holder: EntityId) -> CommandCatalogue {
        CommandCatalogue::new()
            .with("bump", move |state, _, _| {
                state.adjust_attribute(holder, "bumps", 1)?;
                Ok(())
            })
            .with("finish", |state, _, _| {
                state.finish(None);
                Ok(())
            })
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn test_finish_command_ends_loop_and_runs_callback() {
        let mut state = quiet_state();
        let holder = state.add_entity("Alice");
        let mut flow = DuelFlow::new(state, counting_commands(holder), &FlowConfig::default());
        let (tx, rx) = mpsc::channel();
        flow.on_finished(move |state| {
            tx.send(state.is_finished()).unwrap();
        });

        flow.enqueue_command(Submitter::System, "bump", vec![]).unwrap();
        flow.enqueue_command(Submitter::System, "finish", vec![]).unwrap();
        flow.start().unwrap();

        assert!(rx.recv_timeout(Duration::from_secs(5)).unwrap());
        let state = flow.join().unwrap();
        assert!(state.is_finished());
        assert_eq!(state.attribute(holder, "bumps").unwrap(), 1);
    }

    #[test]
    fn test_stop_with_empty_queue_terminates() {
        let mut flow = DuelFlow::new(quiet_state(), CommandCatalogue::new(), &FlowConfig::default());
        flow.start().unwrap();
        assert!(wait_for(|| flow.is_running()));

        flow.stop();
        let state = flow.join().unwrap();
        assert!(state.is_ongoing());
        assert!(!flow.is_running());
    }

    #[test]
    fn test_double_start_and_stop_are_logged_no_ops() {
        let state = quiet_state();
        let logger = Arc::clone(state.logger());
        let mut flow = DuelFlow::new(state, CommandCatalogue::new(), &FlowConfig::default());

        flow.start().unwrap();
        flow.start().unwrap();
        flow.stop();
        flow.stop();
        flow.join().unwrap();

        let lifecycle: Vec<String> = logger
            .logs_in("lifecycle")
            .into_iter()
            .map(|entry| entry.message)
            .collect();
        assert!(lifecycle.contains(&"duel flow already started".to_string()));
        assert!(lifecycle.contains(&"duel flow already stopped".to_string()));
    }

    #[test]
    fn test_dispose_is_idempotent() {
        let mut flow = DuelFlow::new(quiet_state(), CommandCatalogue::new(), &FlowConfig::default());
        flow.start().unwrap();
        flow.dispose();
        flow.dispose();
        assert!(flow.is_disposed());
        assert!(flow.start().is_err());
        // Drop runs dispose once more
    }

    #[test]
    fn test_unstarted_flow_returns_initial_state() {
        let mut state = quiet_state();
        state.add_entity("Alice");
        let flow = DuelFlow::new(state, CommandCatalogue::new(), &FlowConfig::default());
        let state = flow.into_state().unwrap();
        assert_eq!(state.entities.len(), 1);
        assert!(!state.is_ongoing());
    }

    #[test]
    fn test_commands_from_many_threads_run_on_duel_thread() {
        let mut state = quiet_state();
        let holder = state.add_entity("Counter");
        let players: Vec<EntityId> = (0..4).map(|i| state.add_entity(format!("P{i}"))).collect();
        let (tx, rx) = mpsc::channel();
        let commands = counting_commands(holder).with("whoami", move |_, _, _| {
            tx.send(thread::current().name().map(str::to_string)).unwrap();
            Ok(())
        });

        let config = FlowConfig::default().with_thread_name("duel-test");
        let mut flow = DuelFlow::new(state, commands, &config);
        flow.start().unwrap();

        let submitters: Vec<_> = players
            .iter()
            .map(|&player| {
                let handler = Arc::clone(flow.handler());
                thread::spawn(move || {
                    handler
                        .enqueue_command(Submitter::Player(player), "bump", vec![])
                        .unwrap();
                })
            })
            .collect();
        for submitter in submitters {
            submitter.join().unwrap();
        }
        flow.enqueue_command(Submitter::System, "whoami", vec![]).unwrap();

        let handler = Arc::clone(flow.handler());
        assert!(wait_for(|| handler.stats().executed == 5));
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap().as_deref(),
            Some("duel-test")
        );

        let state = flow.into_state().unwrap();
        assert_eq!(state.attribute(holder, "bumps").unwrap(), 4);
    }
}
