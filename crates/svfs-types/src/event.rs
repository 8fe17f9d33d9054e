//! Change notifications published by watchable volumes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::metadata::EntryKind;
use crate::path::VirtualPath;

/// What happened to an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    Created,
    Modified,
    Renamed,
    Deleted,
}

/// A single change observed on a volume.
///
/// For `Renamed` the path is the new location. `entry` is `Unknown` only for
/// deletes whose kind could not be recovered; the path is then file-shaped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub path: VirtualPath,
    pub entry: EntryKind,
}

impl ChangeEvent {
    /// Build an event whose path shape matches `entry`.
    pub fn new(kind: ChangeKind, path: VirtualPath, entry: EntryKind) -> Self {
        Self {
            kind,
            path: path.with_kind(entry),
            entry,
        }
    }
}

impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self.kind, self.path)
    }
}
