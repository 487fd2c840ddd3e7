//! Workspace module identities and file events

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Identifier of a workspace module
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleKey(String);

impl ModuleKey {
    /// Create a module key
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModuleKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for ModuleKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// Description of a module handed to the execution context on registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleInfo {
    /// Module key
    pub key: ModuleKey,
    /// Root directory of the module, if it has one on disk
    #[serde(default)]
    pub base_dir: Option<PathBuf>,
}

impl ModuleInfo {
    /// Module without a base directory
    pub fn new(key: impl Into<ModuleKey>) -> Self {
        Self {
            key: key.into(),
            base_dir: None,
        }
    }
}

/// Kind of file-system change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileEventKind {
    /// File was created
    Created,
    /// File content changed
    Modified,
    /// File was deleted
    Deleted,
}

/// A file change inside a module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEvent {
    /// Changed file
    pub path: PathBuf,
    /// What happened to it
    pub kind: FileEventKind,
}

impl FileEvent {
    /// Create a file event
    pub fn new(path: impl Into<PathBuf>, kind: FileEventKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}
