//! Scheduler error types

use crate::module::ModuleKey;
use thiserror::Error;

/// Scheduler errors
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The execution context could not be built
    #[error("failed to build execution context: {0}")]
    ContextConstruction(String),

    /// The scheduler was stopped
    #[error("analysis scheduler is terminated")]
    Terminated,

    /// The consumer thread could not be started
    #[error("failed to spawn scheduler worker: {0}")]
    WorkerSpawn(String),

    /// Two analyses that cannot be coalesced were merged
    #[error("cannot merge analysis of {left} with analysis of {right}: {reason}")]
    IllegalMerge {
        /// Module of the receiving analysis
        left: ModuleKey,
        /// Module of the absorbed analysis
        right: ModuleKey,
        /// Why the merge is illegal
        reason: &'static str,
    },

    /// Invalid configuration value
    #[error("invalid configuration: {0}")]
    Config(String),

    /// IO error while loading configuration
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON configuration
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;
