//! Single-consumer analysis scheduler
//!
//! Producers post commands from any thread; one named worker thread takes
//! them from the [AnalysisQueue] and executes them serially against the
//! current [ExecutionContext]. Shared scheduling state (termination mode and
//! the command being executed) lives behind one mutex.

use crate::command::{Command, CommandId};
use crate::config::{EngineConfig, SchedulerConfig};
use crate::context::{ContextFactory, ExecutionContext, PluginSet};
use crate::error::{SchedulerError, SchedulerResult};
use crate::queue::AnalysisQueue;
use crate::registry::CommandRegistry;
use crate::telemetry;
use lintel_metrics::{timed, MetricsRegistry};
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TerminationMode {
    Running,
    Aborting,
}

struct SchedulerState {
    termination: TerminationMode,
    executing: Option<Arc<Command>>,
}

struct Shared {
    queue: AnalysisQueue,
    state: Mutex<SchedulerState>,
    context: RwLock<Option<Arc<dyn ExecutionContext>>>,
    /// Held by the worker while a command executes and by `reset` while the
    /// context is replaced
    execution_gate: Mutex<()>,
    factory: Box<dyn ContextFactory>,
    registry: CommandRegistry,
    metrics: Arc<MetricsRegistry>,
    worker_alive: AtomicBool,
}

/// Admission and execution engine for analysis commands.
///
/// Dropping the scheduler stops it.
pub struct AnalysisScheduler {
    shared: Arc<Shared>,
    config: SchedulerConfig,
}

impl AnalysisScheduler {
    /// Build the execution context, then start the worker thread.
    ///
    /// Fails without starting anything if the context cannot be built.
    pub fn start<F>(
        config: SchedulerConfig,
        factory: F,
        engine: &EngineConfig,
        plugins: &PluginSet,
    ) -> SchedulerResult<Self>
    where
        F: ContextFactory + 'static,
    {
        let context = factory
            .create(engine, plugins)
            .map_err(|e| SchedulerError::ContextConstruction(format!("{:#}", e)))?;

        let metrics = Arc::new(MetricsRegistry::new());
        let shared = Arc::new(Shared {
            queue: AnalysisQueue::new(config.expiration_delay(), Arc::clone(&metrics)),
            state: Mutex::new(SchedulerState {
                termination: TerminationMode::Running,
                executing: None,
            }),
            context: RwLock::new(Some(Arc::clone(&context))),
            execution_gate: Mutex::new(()),
            factory: Box::new(factory),
            registry: CommandRegistry::new(),
            metrics,
            worker_alive: AtomicBool::new(true),
        });

        let worker = Arc::clone(&shared);
        let spawned = thread::Builder::new()
            .name(config.worker_name.clone())
            .spawn(move || worker.run());
        if let Err(e) = spawned {
            shared.worker_alive.store(false, Ordering::Release);
            shared.context.write().take();
            if let Err(stop_err) = context.stop() {
                tracing::error!(error = %stop_err, "failed to stop execution context");
            }
            return Err(SchedulerError::WorkerSpawn(e.to_string()));
        }

        tracing::info!(
            worker = %config.worker_name,
            expiration_delay_ms = config.expiration_delay_ms,
            "analysis scheduler started"
        );
        Ok(Self { shared, config })
    }

    /// Submit a command. Never blocks on the worker.
    ///
    /// While the scheduler is stopping, or if its worker is gone, the command
    /// is cancelled instead of queued. A command already cancelled is
    /// dropped. A command that supersedes the one being executed cancels it
    /// and is queued all the same.
    pub fn post(&self, command: Command) {
        let shared = &self.shared;
        let mut state = shared.state.lock();
        if state.termination == TerminationMode::Aborting
            || !shared.worker_alive.load(Ordering::Acquire)
        {
            drop(state);
            tracing::warn!(command = %command, "scheduler is not running, cancelling command");
            command.cancel();
            shared.metrics.increment(telemetry::COMMANDS_REJECTED, 1);
            return;
        }

        if command.is_cancelled() {
            drop(state);
            tracing::debug!(command = %command, "dropping command cancelled before submission");
            shared.metrics.increment(telemetry::COMMANDS_DISCARDED, 1);
            return;
        }

        let preempt = state
            .executing
            .as_ref()
            .is_some_and(|executing| command.should_cancel(executing));
        if preempt {
            if let Some(executing) = state.executing.take() {
                tracing::debug!(
                    running = %executing,
                    newer = %command,
                    "cancelling running command superseded by a newer one"
                );
                executing.cancel();
                shared.metrics.increment(telemetry::COMMANDS_PREEMPTED, 1);
            }
        }

        shared.registry.track(&command);
        shared.queue.post(command);
        shared.metrics.increment(telemetry::COMMANDS_POSTED, 1);
    }

    /// Ask the worker to re-evaluate readiness of queued commands
    pub fn wake_up(&self) {
        self.shared.queue.wake_up();
    }

    /// Replace the execution context.
    ///
    /// Waits for the command being executed to return, stops the current
    /// context, builds a new one and drops every queued command that is not
    /// an analysis. Queued analyses survive and run against the new context.
    /// A command that is not an analysis and was taken off the queue before
    /// the swap is cancelled instead of executed.
    /// If building fails the scheduler keeps running without a context and
    /// cancels what it dequeues until a later reset succeeds.
    pub fn reset(&self, engine: &EngineConfig, plugins: &PluginSet) -> SchedulerResult<()> {
        let shared = &self.shared;
        if self.is_terminating() {
            return Err(SchedulerError::Terminated);
        }

        let _gate = shared.execution_gate.lock();
        if self.is_terminating() {
            return Err(SchedulerError::Terminated);
        }

        let previous = shared.context.write().take();
        if let Some(previous) = previous {
            if let Err(e) = previous.stop() {
                tracing::error!(error = %e, "failed to stop execution context");
            }
        }

        let context = shared
            .factory
            .create(engine, plugins)
            .map_err(|e| SchedulerError::ContextConstruction(format!("{:#}", e)))?;

        let state = shared.state.lock();
        if state.termination == TerminationMode::Aborting {
            drop(state);
            if let Err(e) = context.stop() {
                tracing::error!(error = %e, "failed to stop execution context");
            }
            return Err(SchedulerError::Terminated);
        }
        *shared.context.write() = Some(context);
        drop(state);

        let removed = shared.queue.clear_all_but_analyses();
        shared.registry.prune();
        tracing::info!(removed, "execution context reset");
        Ok(())
    }

    /// Stop the scheduler. Only the first call has an effect.
    ///
    /// Cancels the command being executed without waiting for it, cancels
    /// every queued command, releases the worker and stops the execution
    /// context.
    pub fn stop(&self) {
        let shared = &self.shared;
        let executing = {
            let mut state = shared.state.lock();
            if state.termination == TerminationMode::Aborting {
                return;
            }
            state.termination = TerminationMode::Aborting;
            state.executing.take()
        };
        tracing::info!("stopping analysis scheduler");

        let mut cancelled = 0;
        if let Some(executing) = executing {
            executing.cancel();
            cancelled += 1;
        }

        shared.queue.close();
        let drained = shared.queue.remove_all(|_| true);
        for command in &drained {
            command.cancel();
        }
        cancelled += drained.len();
        shared
            .metrics
            .increment(telemetry::COMMANDS_CANCELLED, cancelled as u64);
        shared.registry.prune();

        let context = shared.context.write().take();
        if let Some(context) = context {
            if let Err(e) = context.stop() {
                tracing::error!(error = %e, "failed to stop execution context");
            }
        }
        tracing::info!(cancelled, "analysis scheduler stopped");
    }

    /// Cancel a queued or running command by identity.
    ///
    /// Returns false if the command already finished or was never accepted.
    pub fn cancel(&self, id: CommandId) -> bool {
        let found = self.shared.registry.cancel(id);
        if found {
            tracing::debug!(command = %id, "command cancelled on request");
            self.shared
                .metrics
                .increment(telemetry::COMMANDS_CANCELLED, 1);
        }
        found
    }

    /// Scheduler metrics
    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.shared.metrics
    }

    /// Scheduler configuration
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Number of queued commands
    pub fn queue_len(&self) -> usize {
        self.shared.queue.len()
    }

    /// True while commands are accepted and the worker is alive
    pub fn is_running(&self) -> bool {
        !self.is_terminating() && self.shared.worker_alive.load(Ordering::Acquire)
    }

    /// True once [stop](Self::stop) was called
    pub fn is_terminating(&self) -> bool {
        self.shared.state.lock().termination == TerminationMode::Aborting
    }

    /// Identity of the command being executed, if any
    pub fn currently_executing(&self) -> Option<CommandId> {
        self.shared
            .state
            .lock()
            .executing
            .as_ref()
            .map(|command| command.id())
    }
}

impl Drop for AnalysisScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for AnalysisScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisScheduler")
            .field("worker", &self.config.worker_name)
            .field("running", &self.is_running())
            .field("queued", &self.queue_len())
            .finish()
    }
}

/// Clears the liveness flag when the worker exits, including by panic
struct WorkerAlive<'a>(&'a AtomicBool);

impl Drop for WorkerAlive<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Shared {
    fn run(&self) {
        let _alive = WorkerAlive(&self.worker_alive);
        while let Some((command, generation)) = self.queue.take_next_with_generation() {
            let command = Arc::new(command);
            {
                let mut state = self.state.lock();
                if state.termination == TerminationMode::Aborting {
                    drop(state);
                    command.cancel();
                    break;
                }
                state.executing = Some(Arc::clone(&command));
            }
            self.registry.retarget(&command);

            self.execute(&command, generation);

            {
                let mut state = self.state.lock();
                let still_marked = state
                    .executing
                    .as_ref()
                    .is_some_and(|executing| Arc::ptr_eq(executing, &command));
                if still_marked {
                    state.executing = None;
                }
            }
            self.registry.finish(&command);
            self.registry.prune();
        }
        tracing::debug!("analysis worker exiting");
    }

    fn execute(&self, command: &Command, generation: u64) {
        let _gate = self.execution_gate.lock();
        if command.as_analyze().is_none() && generation != self.queue.generation() {
            tracing::debug!(command = %command, "cancelling command taken before a reset");
            command.cancel();
            self.metrics.increment(telemetry::COMMANDS_CANCELLED, 1);
            return;
        }
        let context = self.context.read().clone();
        let Some(context) = context else {
            tracing::warn!(command = %command, "no execution context, cancelling command");
            command.cancel();
            return;
        };
        if command.is_cancelled() {
            tracing::debug!(command = %command, "skipping cancelled command");
            return;
        }

        tracing::debug!(command = %command, "executing command");
        let outcome = timed!(self.metrics, telemetry::EXECUTION_LATENCY, {
            panic::catch_unwind(AssertUnwindSafe(|| command.execute(context.as_ref())))
        });

        match outcome {
            Ok(Ok(())) => {
                self.metrics.increment(telemetry::COMMANDS_EXECUTED, 1);
            }
            Ok(Err(e)) => {
                self.metrics.increment(telemetry::COMMANDS_FAILED, 1);
                tracing::error!(command = %command, error = ?e, "command execution failed");
            }
            Err(payload) => {
                self.metrics.increment(telemetry::COMMANDS_FAILED, 1);
                tracing::error!(
                    command = %command,
                    panic = %panic_message(payload.as_ref()),
                    "command execution panicked"
                );
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
