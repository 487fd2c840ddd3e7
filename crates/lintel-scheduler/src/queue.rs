//! Pending command queue
//!
//! Entries are kept in a `BTreeMap` keyed by `(rank, sequence)`, so iterating
//! the map visits commands in dequeue order. Readiness is re-evaluated on
//! every pass by scanning that order for the first ready entry and removing
//! only that one; not-ready entries stay where they are.
//!
//! Before a command is handed out the queue tidies up around it:
//! - entries that stayed not ready past the expiration delay are dropped
//! - an `UnregisterModule(M)` purges queued analyses of `M` and every queued
//!   file event
//! - a batchable analysis absorbs every other queued batchable analysis of
//!   the same module
//!
//! Every entry removed by the queue itself has its cancel signal raised
//! exactly once.

use crate::analyze::AnalyzeCommand;
use crate::command::{Command, CommandId};
use crate::telemetry;
use lintel_metrics::MetricsRegistry;
use parking_lot::{Condvar, Mutex};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Position of an entry in the total dequeue order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct QueueKey {
    rank: u8,
    sequence: CommandId,
}

impl QueueKey {
    fn of(command: &Command) -> Self {
        Self {
            rank: command.kind().rank(),
            sequence: command.id(),
        }
    }
}

struct QueuedCommand {
    command: Command,
    queued_at: Instant,
}

#[derive(Default)]
struct QueueState {
    entries: BTreeMap<QueueKey, QueuedCommand>,
    closed: bool,
    /// Bumped every time non-analysis commands are cleared
    generation: u64,
}

impl QueueState {
    /// First ready entry in dequeue order
    fn first_ready(&self) -> Option<QueueKey> {
        self.entries
            .iter()
            .find(|(_, queued)| queued.command.is_ready())
            .map(|(key, _)| *key)
    }

    /// Remove matching entries, in dequeue order
    fn extract<F>(&mut self, mut predicate: F) -> Vec<QueuedCommand>
    where
        F: FnMut(&QueuedCommand) -> bool,
    {
        let keys: Vec<QueueKey> = self
            .entries
            .iter()
            .filter(|(_, queued)| predicate(queued))
            .map(|(key, _)| *key)
            .collect();
        keys.into_iter()
            .filter_map(|key| self.entries.remove(&key))
            .collect()
    }
}

/// Thread-safe priority queue of commands with a single blocking consumer.
///
/// Producers never block beyond the short critical section of an insert.
/// The queue is unbounded.
pub struct AnalysisQueue {
    state: Mutex<QueueState>,
    available: Condvar,
    expiration_delay: Duration,
    metrics: Arc<MetricsRegistry>,
}

impl AnalysisQueue {
    /// Create an empty queue
    pub fn new(expiration_delay: Duration, metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            available: Condvar::new(),
            expiration_delay,
            metrics,
        }
    }

    /// Enqueue a command and wake the consumer.
    ///
    /// Posting an automatic analysis first removes and cancels every queued
    /// automatic analysis similar to it. Posting into a closed queue cancels
    /// the command instead.
    pub fn post(&self, command: Command) {
        let mut state = self.state.lock();
        if state.closed {
            tracing::debug!(command = %command, "queue closed, cancelling command");
            command.cancel();
            return;
        }

        if let Some(analysis) = command.as_analyze() {
            self.supersede_similar(&mut state, analysis);
        }

        state
            .entries
            .insert(QueueKey::of(&command), QueuedCommand {
                command,
                queued_at: Instant::now(),
            });
        self.publish_depth(&state);
        drop(state);
        self.available.notify_one();
    }

    fn supersede_similar(&self, state: &mut QueueState, newer: &AnalyzeCommand) {
        if !newer.trigger().supersedes_similar() {
            return;
        }
        let outdated = state.extract(|queued| {
            queued.command.as_analyze().is_some_and(|existing| {
                existing.trigger() == newer.trigger() && existing.is_similar_to(newer)
            })
        });
        if outdated.is_empty() {
            return;
        }
        tracing::debug!(
            removed = outdated.len(),
            module = %newer.module_key(),
            "cancelling outdated automatic analyses"
        );
        self.metrics
            .increment(telemetry::COMMANDS_SUPERSEDED, outdated.len() as u64);
        cancel_all(&outdated);
    }

    /// Ask the consumer to re-evaluate readiness of queued commands
    pub fn wake_up(&self) {
        // The consumer checks readiness and parks under this lock
        let _state = self.state.lock();
        self.available.notify_all();
    }

    /// Block until a ready command is available and return it, tidied up.
    ///
    /// Returns `None` once the queue is closed. Must only be called from a
    /// single consumer thread.
    pub fn take_next_command(&self) -> Option<Command> {
        self.take_next_with_generation().map(|(command, _)| command)
    }

    /// Like [take_next_command](Self::take_next_command), also returning the
    /// queue generation the command was taken in
    pub(crate) fn take_next_with_generation(&self) -> Option<(Command, u64)> {
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return None;
            }
            self.discard_cancelled(&mut state);

            let selected = state
                .first_ready()
                .and_then(|key| state.entries.remove(&key));
            if let Some(selected) = selected {
                let command = self.tidy_up(&mut state, selected);
                self.publish_depth(&state);
                return Some((command, state.generation));
            }

            self.available.wait(&mut state);
        }
    }

    fn discard_cancelled(&self, state: &mut QueueState) {
        let discarded = state.extract(|queued| queued.command.is_cancelled());
        if discarded.is_empty() {
            return;
        }
        for queued in &discarded {
            tracing::debug!(command = %queued.command, "discarding cancelled command");
        }
        self.metrics
            .increment(telemetry::COMMANDS_DISCARDED, discarded.len() as u64);
        self.publish_depth(state);
    }

    fn tidy_up(&self, state: &mut QueueState, selected: QueuedCommand) -> Command {
        self.expire_stale(state);
        let command = selected.command;
        match command {
            Command::UnregisterModule(_) => {
                self.purge_for_unregister(state, &command);
                command
            }
            Command::Analyze(analysis) if analysis.trigger().is_batchable() => {
                Command::Analyze(self.batch(state, analysis))
            }
            other => other,
        }
    }

    fn expire_stale(&self, state: &mut QueueState) {
        let now = Instant::now();
        let delay = self.expiration_delay;
        let expired = state.extract(|queued| {
            !queued.command.is_ready() && now.saturating_duration_since(queued.queued_at) > delay
        });
        if expired.is_empty() {
            return;
        }
        for queued in &expired {
            tracing::debug!(command = %queued.command, "command expired before becoming ready");
        }
        self.metrics
            .increment(telemetry::COMMANDS_EXPIRED, expired.len() as u64);
        cancel_all(&expired);
    }

    fn purge_for_unregister(&self, state: &mut QueueState, unregister: &Command) {
        let module = unregister.module_key();
        let purged = state.extract(|queued| match &queued.command {
            Command::Analyze(analysis) => analysis.module_key() == module,
            Command::NotifyModuleEvent(_) => true,
            _ => false,
        });
        if purged.is_empty() {
            return;
        }
        tracing::debug!(
            module = %module,
            removed = purged.len(),
            "purged analyses and file events ahead of module removal"
        );
        self.metrics
            .increment(telemetry::COMMANDS_PURGED, purged.len() as u64);
        cancel_all(&purged);
    }

    fn batch(&self, state: &mut QueueState, selected: AnalyzeCommand) -> AnalyzeCommand {
        let absorbed = state.extract(|queued| {
            queued
                .command
                .as_analyze()
                .is_some_and(|other| selected.can_batch_with(other))
        });
        if absorbed.is_empty() {
            return selected;
        }
        cancel_all(&absorbed);
        self.metrics
            .increment(telemetry::COMMANDS_MERGED, absorbed.len() as u64);

        let others: Vec<AnalyzeCommand> = absorbed
            .into_iter()
            .filter_map(|queued| match queued.command {
                Command::Analyze(analysis) => Some(analysis),
                _ => None,
            })
            .collect();
        let merged = AnalyzeCommand::fold(selected, others);
        tracing::debug!(command = %merged, "batched analyses");
        merged
    }

    /// Remove and return every queued command matching `predicate`, in
    /// dequeue order. Removed commands are not cancelled.
    pub fn remove_all<F>(&self, mut predicate: F) -> Vec<Command>
    where
        F: FnMut(&Command) -> bool,
    {
        let mut state = self.state.lock();
        let removed = state.extract(|queued| predicate(&queued.command));
        self.publish_depth(&state);
        removed.into_iter().map(|queued| queued.command).collect()
    }

    /// Remove and cancel every queued command that is not an analysis.
    ///
    /// Starts a new [generation](Self::generation): commands taken before
    /// this call carry the previous one.
    pub fn clear_all_but_analyses(&self) -> usize {
        let mut state = self.state.lock();
        let removed = state.extract(|queued| queued.command.as_analyze().is_none());
        state.generation += 1;
        self.publish_depth(&state);
        drop(state);
        cancel_all(&removed);
        removed.len()
    }

    /// Stop handing out commands and release a blocked consumer.
    ///
    /// Entries stay queued until removed with [remove_all](Self::remove_all).
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.available.notify_all();
    }

    /// Number of times [clear_all_but_analyses](Self::clear_all_but_analyses)
    /// was called
    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    /// Number of queued commands
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// True if no command is queued
    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    fn publish_depth(&self, state: &QueueState) {
        self.metrics
            .set_gauge(telemetry::QUEUE_DEPTH, state.entries.len() as i64);
    }
}

fn cancel_all(removed: &[QueuedCommand]) {
    for queued in removed {
        queued.command.cancel();
    }
}
