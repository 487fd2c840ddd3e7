//! Shared fixtures for scheduler integration tests
//!
//! [Journal] records every call made on the execution contexts it builds.
//! Analyses steer the context through extra properties: [BLOCK] keeps the
//! worker busy until the analysis is cancelled or [Journal::release] is
//! called, [FAIL] returns an error and [PANIC] panics.

#![allow(dead_code)]

use lintel_scheduler::{
    AnalysisScheduler, AnalyzeCommand, CancelMonitor, CommandId, ContextFactory, EngineConfig,
    ExecutionContext, FileEvent, ModuleInfo, ModuleKey, PluginSet, SchedulerConfig, TriggerType,
};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

pub const BLOCK: &str = "test.block";
pub const FAIL: &str = "test.fail";
pub const PANIC: &str = "test.panic";

/// One observed call on an execution context
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Register { context: usize, module: String },
    Unregister { context: usize, module: String },
    FileEvent { context: usize, module: String, path: PathBuf },
    Analyze { context: usize, module: String, files: Vec<PathBuf> },
}

impl Record {
    pub fn context(&self) -> usize {
        match self {
            Record::Register { context, .. }
            | Record::Unregister { context, .. }
            | Record::FileEvent { context, .. }
            | Record::Analyze { context, .. } => *context,
        }
    }
}

#[derive(Default)]
pub struct Journal {
    records: Mutex<Vec<Record>>,
    created: AtomicUsize,
    stops: AtomicUsize,
    fail_create: AtomicBool,
    in_flight: AtomicBool,
    released: AtomicBool,
    interrupted: AtomicUsize,
}

impl Journal {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn records(&self) -> Vec<Record> {
        self.records.lock().clone()
    }

    pub fn analyses(&self) -> Vec<Record> {
        self.records()
            .into_iter()
            .filter(|record| matches!(record, Record::Analyze { .. }))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn interrupted(&self) -> usize {
        self.interrupted.load(Ordering::SeqCst)
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Make the next context creations fail
    pub fn fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    /// Let blocking analyses return
    pub fn release(&self) {
        self.released.store(true, Ordering::SeqCst);
    }

    /// Keep blocking analyses blocked
    pub fn hold(&self) {
        self.released.store(false, Ordering::SeqCst);
    }

    fn record(&self, record: Record) {
        self.records.lock().push(record);
    }
}

pub struct RecordingFactory {
    journal: Arc<Journal>,
}

impl RecordingFactory {
    pub fn new(journal: &Arc<Journal>) -> Self {
        Self {
            journal: Arc::clone(journal),
        }
    }
}

impl ContextFactory for RecordingFactory {
    fn create(
        &self,
        _config: &EngineConfig,
        _plugins: &PluginSet,
    ) -> anyhow::Result<Arc<dyn ExecutionContext>> {
        if self.journal.fail_create.load(Ordering::SeqCst) {
            anyhow::bail!("plugin loading failed");
        }
        let generation = self.journal.created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Arc::new(RecordingContext {
            generation,
            journal: Arc::clone(&self.journal),
            stopped: AtomicBool::new(false),
        }))
    }
}

pub struct RecordingContext {
    generation: usize,
    journal: Arc<Journal>,
    stopped: AtomicBool,
}

impl ExecutionContext for RecordingContext {
    fn register_module(&self, module: &ModuleInfo) -> anyhow::Result<()> {
        self.journal.record(Record::Register {
            context: self.generation,
            module: module.key.to_string(),
        });
        Ok(())
    }

    fn unregister_module(&self, key: &ModuleKey) -> anyhow::Result<()> {
        self.journal.record(Record::Unregister {
            context: self.generation,
            module: key.to_string(),
        });
        Ok(())
    }

    fn notify_module_event(&self, key: &ModuleKey, event: &FileEvent) -> anyhow::Result<()> {
        self.journal.record(Record::FileEvent {
            context: self.generation,
            module: key.to_string(),
            path: event.path.clone(),
        });
        Ok(())
    }

    fn analyze(&self, command: &AnalyzeCommand) -> anyhow::Result<()> {
        self.journal.record(Record::Analyze {
            context: self.generation,
            module: command.module_key().to_string(),
            files: command.files().iter().cloned().collect(),
        });

        let properties = command.extra_properties();
        if properties.contains_key(FAIL) {
            anyhow::bail!("analyzer crashed on {}", command.module_key());
        }
        if properties.contains_key(PANIC) {
            panic!("analyzer panicked on {}", command.module_key());
        }
        if properties.contains_key(BLOCK) {
            self.journal.in_flight.store(true, Ordering::SeqCst);
            while !self.journal.released.load(Ordering::SeqCst) {
                if command.is_cancelled() {
                    self.journal.interrupted.fetch_add(1, Ordering::SeqCst);
                    break;
                }
                thread::sleep(Duration::from_millis(1));
            }
            self.journal.in_flight.store(false, Ordering::SeqCst);
        }
        Ok(())
    }

    fn stop(&self) -> anyhow::Result<()> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            anyhow::bail!("context {} stopped twice", self.generation);
        }
        self.journal.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn start(journal: &Arc<Journal>) -> AnalysisScheduler {
    init_tracing();
    AnalysisScheduler::start(
        SchedulerConfig::default(),
        RecordingFactory::new(journal),
        &EngineConfig::default(),
        &PluginSet::new(),
    )
    .expect("scheduler starts")
}

/// Analysis that keeps the worker busy until cancelled or released
pub fn blocking_analysis(module: &str) -> AnalyzeCommand {
    AnalyzeCommand::new(module, TriggerType::Forced, ["busy.rs"])
        .with_extra_property(BLOCK, "true")
}

/// Post a blocking analysis and wait until the worker runs it
pub fn occupy_worker(scheduler: &AnalysisScheduler, journal: &Journal, module: &str) -> Busy {
    journal.hold();
    let command = blocking_analysis(module);
    let busy = Busy {
        id: command.id(),
        monitor: command.cancel_monitor().clone(),
    };
    scheduler.post(command.into());
    assert!(
        wait_until(|| journal.is_in_flight()),
        "worker never picked up the blocking analysis"
    );
    busy
}

/// The analysis occupying the worker
pub struct Busy {
    pub id: CommandId,
    pub monitor: CancelMonitor,
}

pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

pub fn paths(names: &[&str]) -> Vec<PathBuf> {
    names.iter().map(PathBuf::from).collect()
}
