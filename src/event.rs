// src/event.rs
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// What happened to a watched path.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Create,
    Write,
    Remove,
    Rename,
}

/// A file change reported by the watcher and consumed by the change router.
///
/// # Fields
/// - `path`: The file that changed.
/// - `kind`: The operation performed.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

impl ChangeEvent {
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    /// A content change: the file exists after the event.
    pub fn is_content_change(&self) -> bool {
        !matches!(self.kind, ChangeKind::Remove)
    }
}
