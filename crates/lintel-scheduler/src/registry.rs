//! Cancel handles of live commands, by identity

use crate::cancel::CancelMonitor;
use crate::command::{Command, CommandId};
use dashmap::DashMap;

/// Concurrent map from command identity to its cancel signal.
///
/// A command is live from acceptance until it has executed or has been
/// dropped by the queue. Merged analyses stay reachable under the identity
/// of every participant.
#[derive(Default)]
pub struct CommandRegistry {
    live: DashMap<CommandId, CancelMonitor>,
}

impl CommandRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking an accepted command
    pub fn track(&self, command: &Command) {
        self.live.insert(command.id(), command.cancel_monitor().clone());
    }

    /// Point every participant of a dequeued command at its cancel signal
    pub fn retarget(&self, command: &Command) {
        let monitor = command.cancel_monitor();
        match command.as_analyze() {
            Some(analysis) => {
                for id in analysis.participants() {
                    self.live.insert(*id, monitor.clone());
                }
            }
            None => {
                self.live.insert(command.id(), monitor.clone());
            }
        }
    }

    /// Raise the cancel signal of a live command.
    ///
    /// Returns false if no live command has this identity, including one
    /// the queue already dropped but [prune](Self::prune) has not forgotten.
    pub fn cancel(&self, id: CommandId) -> bool {
        match self.live.get(&id) {
            Some(monitor) if !monitor.is_cancelled() => {
                monitor.cancel();
                true
            }
            _ => false,
        }
    }

    /// Stop tracking a command and every participant merged into it
    pub fn finish(&self, command: &Command) {
        match command.as_analyze() {
            Some(analysis) => {
                for id in analysis.participants() {
                    self.live.remove(id);
                }
            }
            None => {
                self.live.remove(&command.id());
            }
        }
    }

    /// Forget commands whose cancel signal is raised
    pub fn prune(&self) {
        self.live.retain(|_, monitor| !monitor.is_cancelled());
    }

    /// Whether a command with this identity is live
    pub fn contains(&self, id: CommandId) -> bool {
        self.live.contains_key(&id)
    }

    /// Number of live commands
    pub fn len(&self) -> usize {
        self.live.len()
    }

    /// True if no command is live
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }
}
