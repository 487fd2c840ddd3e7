//! Scheduled commands
//!
//! A [Command] is a closed set of operational requests. Priority and
//! preemption rules are pure functions over the variant tag, so the queue
//! and the scheduler never need per-kind behaviour beyond one explicit
//! `as_analyze` check for merging and purging.

use crate::analyze::AnalyzeCommand;
use crate::cancel::CancelMonitor;
use crate::context::ExecutionContext;
use crate::module::{FileEvent, ModuleInfo, ModuleKey};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Readiness predicate, re-evaluated on every scheduling pass
pub type Readiness = Arc<dyn Fn() -> bool + Send + Sync>;

static NEXT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// Identity of a command: its arrival sequence number.
///
/// Sequence numbers are globally unique and strictly increasing in creation
/// order, which makes them the FIFO tie-break inside a priority rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CommandId(u64);

impl CommandId {
    fn next() -> Self {
        Self(NEXT_SEQUENCE.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw sequence number
    pub fn sequence_number(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Kind of a command; fixes its priority rank
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// Module registration
    RegisterModule,
    /// Module removal
    UnregisterModule,
    /// File change forwarded to a module
    NotifyModuleEvent,
    /// Analysis request
    Analyze,
}

impl CommandKind {
    /// Priority rank; lower ranks are dequeued first.
    ///
    /// Registration changes can make file events and analyses irrelevant, and
    /// file events make analyses more accurate, hence the ordering.
    pub const fn rank(self) -> u8 {
        match self {
            CommandKind::RegisterModule | CommandKind::UnregisterModule => 0,
            CommandKind::NotifyModuleEvent => 1,
            CommandKind::Analyze => 2,
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CommandKind::RegisterModule => "register-module",
            CommandKind::UnregisterModule => "unregister-module",
            CommandKind::NotifyModuleEvent => "notify-module-event",
            CommandKind::Analyze => "analyze",
        };
        f.write_str(name)
    }
}

/// State shared by every command variant
pub(crate) struct CommandHeader {
    pub(crate) id: CommandId,
    pub(crate) cancel: CancelMonitor,
    pub(crate) readiness: Option<Readiness>,
}

impl CommandHeader {
    pub(crate) fn new() -> Self {
        Self {
            id: CommandId::next(),
            cancel: CancelMonitor::new(),
            readiness: None,
        }
    }

    pub(crate) fn is_ready(&self) -> bool {
        self.readiness.as_ref().map_or(true, |ready| ready())
    }
}

/// Register a module in the execution context
pub struct RegisterModuleCommand {
    header: CommandHeader,
    module: ModuleInfo,
}

impl RegisterModuleCommand {
    /// Module being registered
    pub fn module(&self) -> &ModuleInfo {
        &self.module
    }
}

/// Remove a module from the execution context
pub struct UnregisterModuleCommand {
    header: CommandHeader,
    module_key: ModuleKey,
}

impl UnregisterModuleCommand {
    /// Module being removed
    pub fn module_key(&self) -> &ModuleKey {
        &self.module_key
    }
}

/// Forward a file change to a module
pub struct NotifyModuleEventCommand {
    header: CommandHeader,
    module_key: ModuleKey,
    event: FileEvent,
}

impl NotifyModuleEventCommand {
    /// Module the file belongs to
    pub fn module_key(&self) -> &ModuleKey {
        &self.module_key
    }

    /// The change
    pub fn event(&self) -> &FileEvent {
        &self.event
    }
}

/// A unit of scheduled work
pub enum Command {
    /// Module registration
    RegisterModule(RegisterModuleCommand),
    /// Module removal
    UnregisterModule(UnregisterModuleCommand),
    /// File change notification
    NotifyModuleEvent(NotifyModuleEventCommand),
    /// Analysis request
    Analyze(AnalyzeCommand),
}

impl Command {
    /// Create a module registration command
    pub fn register_module(module: ModuleInfo) -> Self {
        Command::RegisterModule(RegisterModuleCommand {
            header: CommandHeader::new(),
            module,
        })
    }

    /// Create a module removal command
    pub fn unregister_module(module_key: impl Into<ModuleKey>) -> Self {
        Command::UnregisterModule(UnregisterModuleCommand {
            header: CommandHeader::new(),
            module_key: module_key.into(),
        })
    }

    /// Create a file change notification
    pub fn notify_module_event(module_key: impl Into<ModuleKey>, event: FileEvent) -> Self {
        Command::NotifyModuleEvent(NotifyModuleEventCommand {
            header: CommandHeader::new(),
            module_key: module_key.into(),
            event,
        })
    }

    /// Only dequeue this command once `predicate` holds
    pub fn ready_when<F>(mut self, predicate: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.header_mut().readiness = Some(Arc::new(predicate));
        self
    }

    /// Share an existing cancel signal with this command
    pub fn with_cancel_monitor(mut self, monitor: CancelMonitor) -> Self {
        self.header_mut().cancel = monitor;
        self
    }

    fn header(&self) -> &CommandHeader {
        match self {
            Command::RegisterModule(c) => &c.header,
            Command::UnregisterModule(c) => &c.header,
            Command::NotifyModuleEvent(c) => &c.header,
            Command::Analyze(c) => &c.header,
        }
    }

    fn header_mut(&mut self) -> &mut CommandHeader {
        match self {
            Command::RegisterModule(c) => &mut c.header,
            Command::UnregisterModule(c) => &mut c.header,
            Command::NotifyModuleEvent(c) => &mut c.header,
            Command::Analyze(c) => &mut c.header,
        }
    }

    /// Command kind
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::RegisterModule(_) => CommandKind::RegisterModule,
            Command::UnregisterModule(_) => CommandKind::UnregisterModule,
            Command::NotifyModuleEvent(_) => CommandKind::NotifyModuleEvent,
            Command::Analyze(_) => CommandKind::Analyze,
        }
    }

    /// Command identity
    pub fn id(&self) -> CommandId {
        self.header().id
    }

    /// Arrival sequence number
    pub fn sequence_number(&self) -> u64 {
        self.header().id.sequence_number()
    }

    /// Whether the command may be dequeued now. Must be cheap and side-effect free.
    pub fn is_ready(&self) -> bool {
        self.header().is_ready()
    }

    /// Raise the command's cancel signal. Safe at any time, any number of times.
    pub fn cancel(&self) {
        self.header().cancel.cancel();
    }

    /// Whether the cancel signal was raised
    pub fn is_cancelled(&self) -> bool {
        self.header().cancel.is_cancelled()
    }

    /// The command's cancel signal
    pub fn cancel_monitor(&self) -> &CancelMonitor {
        &self.header().cancel
    }

    /// The analysis payload, if this is an analysis
    pub fn as_analyze(&self) -> Option<&AnalyzeCommand> {
        match self {
            Command::Analyze(analyze) => Some(analyze),
            _ => None,
        }
    }

    /// Module this command concerns
    pub fn module_key(&self) -> &ModuleKey {
        match self {
            Command::RegisterModule(c) => &c.module.key,
            Command::UnregisterModule(c) => &c.module_key,
            Command::NotifyModuleEvent(c) => &c.module_key,
            Command::Analyze(c) => c.module_key(),
        }
    }

    /// Whether posting `self` should cancel the command currently executing.
    ///
    /// A newer identical analysis supersedes the running one, and removing a
    /// module makes its running analysis pointless.
    pub fn should_cancel(&self, executing: &Command) -> bool {
        match (self, executing) {
            (Command::Analyze(newer), Command::Analyze(running)) => newer.supersedes(running),
            (Command::UnregisterModule(unregister), Command::Analyze(running)) => {
                running.module_key() == &unregister.module_key
            }
            _ => false,
        }
    }

    /// Run the command against the execution context.
    ///
    /// A command whose cancel signal is already raised does nothing.
    pub fn execute(&self, context: &dyn ExecutionContext) -> anyhow::Result<()> {
        if self.is_cancelled() {
            return Ok(());
        }
        match self {
            Command::RegisterModule(c) => context.register_module(&c.module),
            Command::UnregisterModule(c) => context.unregister_module(&c.module_key),
            Command::NotifyModuleEvent(c) => context.notify_module_event(&c.module_key, &c.event),
            Command::Analyze(c) => context.analyze(c),
        }
    }
}

impl From<AnalyzeCommand> for Command {
    fn from(command: AnalyzeCommand) -> Self {
        Command::Analyze(command)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Analyze(c) => fmt::Display::fmt(c, f),
            Command::NotifyModuleEvent(c) => write!(
                f,
                "{}{}(module={}, file={}, {:?})",
                self.kind(),
                self.id(),
                c.module_key,
                c.event.path.display(),
                c.event.kind
            ),
            _ => write!(f, "{}{}(module={})", self.kind(), self.id(), self.module_key()),
        }
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
