//! Metric names recorded by the scheduler

/// Commands accepted by `post`
pub const COMMANDS_POSTED: &str = "scheduler.commands.posted";
/// Commands cancelled on submission because the scheduler is not running
pub const COMMANDS_REJECTED: &str = "scheduler.commands.rejected";
/// Commands whose execution returned successfully
pub const COMMANDS_EXECUTED: &str = "scheduler.commands.executed";
/// Commands whose execution returned an error or panicked
pub const COMMANDS_FAILED: &str = "scheduler.commands.failed";
/// Commands cancelled by identity or drained on stop
pub const COMMANDS_CANCELLED: &str = "scheduler.commands.cancelled";
/// Commands dropped because they were cancelled before being dequeued
pub const COMMANDS_DISCARDED: &str = "scheduler.commands.discarded";
/// Analyses folded into another one
pub const COMMANDS_MERGED: &str = "scheduler.commands.merged";
/// Commands removed by a module unregistration
pub const COMMANDS_PURGED: &str = "scheduler.commands.purged";
/// Commands that never became ready in time
pub const COMMANDS_EXPIRED: &str = "scheduler.commands.expired";
/// Queued automatic analyses replaced by a similar newer one
pub const COMMANDS_SUPERSEDED: &str = "scheduler.commands.superseded";
/// Running commands cancelled by a newer submission
pub const COMMANDS_PREEMPTED: &str = "scheduler.commands.preempted";

/// Number of queued commands
pub const QUEUE_DEPTH: &str = "scheduler.queue.depth";

/// Time spent executing a command
pub const EXECUTION_LATENCY: &str = "scheduler.execution.latency";
