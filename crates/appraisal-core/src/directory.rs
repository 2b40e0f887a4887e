//! User directory collaborator.
//!
//! The engine asks the directory for role and department attributes when a
//! caller arrives without a department, and to resolve the subject of a new
//! evaluation. `MemoryDirectory` is the in-process implementation, loadable
//! from a JSON roster:
//!
//! ```json
//! [
//!   {"id": "inst-1", "role": "instructor", "department": "CS"},
//!   {"id": "stu-1", "role": "Student", "department": "CS", "name": "Ada"}
//! ]
//! ```

use std::collections::HashMap;
use std::path::Path;

use appraisal_state::{Role, UserId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::AppraisalError;

/// One roster entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub id: UserId,
    pub role: Role,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl DirectoryEntry {
    pub fn new(id: impl Into<UserId>, role: Role, department: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role,
            department: Some(department.into()),
            name: None,
        }
    }
}

/// Errors raised by a user directory.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("directory unavailable: {0}")]
    Unavailable(String),

    #[error("invalid roster: {0}")]
    InvalidRoster(String),
}

impl From<DirectoryError> for AppraisalError {
    fn from(err: DirectoryError) -> Self {
        AppraisalError::Directory(err.to_string())
    }
}

/// Read-only roster lookup.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn lookup(&self, id: &UserId) -> Result<Option<DirectoryEntry>, DirectoryError>;
}

/// In-memory roster keyed by user id.
#[derive(Debug, Clone, Default)]
pub struct MemoryDirectory {
    entries: HashMap<UserId, DirectoryEntry>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: impl IntoIterator<Item = DirectoryEntry>) -> Self {
        let mut directory = Self::new();
        for entry in entries {
            directory.insert(entry);
        }
        directory
    }

    /// Insert or replace an entry.
    pub fn insert(&mut self, entry: DirectoryEntry) {
        self.entries.insert(entry.id.clone(), entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse a JSON array of entries. Later duplicates replace earlier ones.
    pub fn from_json(json: &str) -> Result<Self, DirectoryError> {
        let entries: Vec<DirectoryEntry> =
            serde_json::from_str(json).map_err(|e| DirectoryError::InvalidRoster(e.to_string()))?;
        Ok(Self::with_entries(entries))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, DirectoryError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            DirectoryError::Unavailable(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json(&raw)
    }
}

#[async_trait]
impl UserDirectory for MemoryDirectory {
    async fn lookup(&self, id: &UserId) -> Result<Option<DirectoryEntry>, DirectoryError> {
        Ok(self.entries.get(id).cloned())
    }
}
