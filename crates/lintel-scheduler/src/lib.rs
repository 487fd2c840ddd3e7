//! # lintel-scheduler
//!
//! Request-scheduling core of the lintel analysis service.
//!
//! This crate provides:
//! - A closed set of commands (module registration, file events, analyses)
//! - A priority queue with readiness checks, batching and purging
//! - A single-consumer scheduler with cooperative cancellation
//! - Replaceable execution contexts built by a caller-supplied factory
//!
//! ## Architecture
//!
//! ```text
//!   post() from any thread
//!            |
//! +----------------------+
//! |  AnalysisScheduler   |  <- termination state, preemption, cancel by id
//! +----------------------+
//!            |
//! +----------------------+
//! |    AnalysisQueue     |  <- (rank, sequence) order, tidy-up on dequeue
//! +----------------------+
//!            |
//! +----------------------+
//! |   worker thread      |  <- executes one command at a time
//! +----------------------+
//!            |
//! +----------------------+
//! |  ExecutionContext    |  <- swapped wholesale on reset
//! +----------------------+
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use lintel_scheduler::{AnalysisScheduler, AnalyzeCommand, Command, SchedulerConfig, TriggerType};
//!
//! let scheduler = AnalysisScheduler::start(SchedulerConfig::default(), factory, &engine, &plugins)?;
//! scheduler.post(Command::register_module(ModuleInfo::new("app")));
//! scheduler.post(AnalyzeCommand::new("app", TriggerType::Save, ["src/main.rs"]).into());
//! scheduler.stop();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod analyze;
mod cancel;
mod command;
mod config;
mod context;
mod error;
mod module;
mod queue;
mod registry;
mod scheduler;
pub mod telemetry;

pub use analyze::{AnalyzeCommand, TriggerType};
pub use cancel::CancelMonitor;
pub use command::{
    Command, CommandId, CommandKind, NotifyModuleEventCommand, Readiness, RegisterModuleCommand,
    UnregisterModuleCommand,
};
pub use config::{EngineConfig, SchedulerConfig, EXPIRATION_DELAY_ENV};
pub use context::{ContextFactory, ExecutionContext, PluginDescriptor, PluginSet};
pub use error::{SchedulerError, SchedulerResult};
pub use module::{FileEvent, FileEventKind, ModuleInfo, ModuleKey};
pub use queue::AnalysisQueue;
pub use registry::CommandRegistry;
pub use scheduler::AnalysisScheduler;
