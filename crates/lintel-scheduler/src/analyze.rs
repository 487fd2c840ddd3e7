//! Analysis requests and their coalescing rules

use crate::cancel::CancelMonitor;
use crate::command::{CommandHeader, CommandId};
use crate::error::{SchedulerError, SchedulerResult};
use crate::module::ModuleKey;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Why an analysis was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    /// Editor-driven analysis while typing
    Auto,
    /// Analysis after a file was saved
    Save,
    /// Analysis of a freshly opened file
    Open,
    /// Explicit user request
    Forced,
}

impl TriggerType {
    /// Whether queued analyses with this trigger may be coalesced into one
    pub const fn is_batchable(self) -> bool {
        matches!(self, TriggerType::Auto | TriggerType::Save)
    }

    /// Whether posting an analysis with this trigger drops queued similar ones
    pub const fn supersedes_similar(self) -> bool {
        matches!(self, TriggerType::Auto)
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TriggerType::Auto => "auto",
            TriggerType::Save => "save",
            TriggerType::Open => "open",
            TriggerType::Forced => "forced",
        };
        f.write_str(name)
    }
}

/// Request to analyze a set of files of one module
pub struct AnalyzeCommand {
    pub(crate) header: CommandHeader,
    module_key: ModuleKey,
    trigger: TriggerType,
    files: BTreeSet<PathBuf>,
    extra_properties: BTreeMap<String, String>,
    /// Commands folded into this one, in ascending sequence order
    participants: Vec<CommandId>,
}

impl AnalyzeCommand {
    /// Create an analysis request
    pub fn new<I, P>(module_key: impl Into<ModuleKey>, trigger: TriggerType, files: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let header = CommandHeader::new();
        let participants = vec![header.id];
        Self {
            header,
            module_key: module_key.into(),
            trigger,
            files: files.into_iter().map(Into::into).collect(),
            extra_properties: BTreeMap::new(),
            participants,
        }
    }

    /// Add one analyzer property
    pub fn with_extra_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_properties.insert(key.into(), value.into());
        self
    }

    /// Add analyzer properties
    pub fn with_extra_properties<I, K, V>(mut self, properties: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.extra_properties
            .extend(properties.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Only dequeue this analysis once `predicate` holds
    pub fn ready_when<F>(mut self, predicate: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.header.readiness = Some(Arc::new(predicate));
        self
    }

    /// Share an existing cancel signal with this analysis
    pub fn with_cancel_monitor(mut self, monitor: CancelMonitor) -> Self {
        self.header.cancel = monitor;
        self
    }

    /// Command identity
    pub fn id(&self) -> CommandId {
        self.header.id
    }

    /// Arrival sequence number (of the earliest participant, once merged)
    pub fn sequence_number(&self) -> u64 {
        self.header.id.sequence_number()
    }

    /// Module to analyze
    pub fn module_key(&self) -> &ModuleKey {
        &self.module_key
    }

    /// Trigger of the request
    pub fn trigger(&self) -> TriggerType {
        self.trigger
    }

    /// Files to analyze
    pub fn files(&self) -> &BTreeSet<PathBuf> {
        &self.files
    }

    /// Analyzer properties
    pub fn extra_properties(&self) -> &BTreeMap<String, String> {
        &self.extra_properties
    }

    /// Identities of every request covered by this one
    pub fn participants(&self) -> &[CommandId] {
        &self.participants
    }

    /// The analysis' cancel signal
    pub fn cancel_monitor(&self) -> &CancelMonitor {
        &self.header.cancel
    }

    /// Whether the cancel signal was raised
    pub fn is_cancelled(&self) -> bool {
        self.header.cancel.is_cancelled()
    }

    /// Raise the cancel signal
    pub fn cancel(&self) {
        self.header.cancel.cancel();
    }

    /// Whether the analysis may be dequeued now
    pub fn is_ready(&self) -> bool {
        self.header.is_ready()
    }

    /// Whether `other` may be coalesced into this analysis
    pub fn can_batch_with(&self, other: &AnalyzeCommand) -> bool {
        self.trigger.is_batchable()
            && other.trigger.is_batchable()
            && self.module_key == other.module_key
    }

    /// Same module, same files and same properties
    pub fn is_similar_to(&self, other: &AnalyzeCommand) -> bool {
        self.module_key == other.module_key
            && self.files == other.files
            && self.extra_properties == other.extra_properties
    }

    /// Whether this request makes the running `other` pointless
    pub fn supersedes(&self, other: &AnalyzeCommand) -> bool {
        self.trigger == other.trigger && self.is_similar_to(other)
    }

    /// Coalesce `other` into this analysis.
    ///
    /// The result covers the union of both file sets and takes the sequence
    /// number and trigger of the earlier of the two, so it is dequeued where
    /// the earliest participant would have been. On conflicting extra
    /// properties the participant with the later sequence number wins. The
    /// receiver keeps its cancel signal and readiness predicate.
    pub fn merge_with(self, other: AnalyzeCommand) -> SchedulerResult<AnalyzeCommand> {
        if self.module_key != other.module_key {
            return Err(self.illegal_merge(&other, "different modules"));
        }
        if !self.trigger.is_batchable() || !other.trigger.is_batchable() {
            return Err(self.illegal_merge(&other, "trigger type is not batchable"));
        }
        Ok(Self::fold(self, vec![other]))
    }

    fn illegal_merge(&self, other: &AnalyzeCommand, reason: &'static str) -> SchedulerError {
        SchedulerError::IllegalMerge {
            left: self.module_key.clone(),
            right: other.module_key.clone(),
            reason,
        }
    }

    /// Fold already-validated batch members into `primary`.
    pub(crate) fn fold(primary: AnalyzeCommand, others: Vec<AnalyzeCommand>) -> AnalyzeCommand {
        let mut members: Vec<&AnalyzeCommand> =
            std::iter::once(&primary).chain(others.iter()).collect();
        members.sort_by_key(|member| member.header.id);

        let mut files = BTreeSet::new();
        let mut extra_properties = BTreeMap::new();
        let mut participants = Vec::new();
        for member in &members {
            files.extend(member.files.iter().cloned());
            extra_properties.extend(
                member
                    .extra_properties
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone())),
            );
            participants.extend(member.participants.iter().copied());
        }
        participants.sort();

        let id = members[0].header.id;
        let trigger = members[0].trigger;
        let header = CommandHeader {
            id,
            cancel: primary.header.cancel.clone(),
            readiness: primary.header.readiness.clone(),
        };

        AnalyzeCommand {
            header,
            module_key: primary.module_key.clone(),
            trigger,
            files,
            extra_properties,
            participants,
        }
    }
}

impl fmt::Display for AnalyzeCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "analyze{}(module={}, trigger={}, files={}",
            self.header.id,
            self.module_key,
            self.trigger,
            self.files.len()
        )?;
        if self.participants.len() > 1 {
            write!(f, ", merged={}", self.participants.len())?;
        }
        f.write_str(")")
    }
}

impl fmt::Debug for AnalyzeCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalyzeCommand")
            .field("id", &self.header.id)
            .field("module_key", &self.module_key)
            .field("trigger", &self.trigger)
            .field("files", &self.files)
            .field("extra_properties", &self.extra_properties)
            .field("cancel", &self.header.cancel)
            .finish()
    }
}
