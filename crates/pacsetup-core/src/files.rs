//! Desired file sets and the changes needed to reach them.

use serde::{Deserialize, Serialize};

/// Desired state of a single path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileContent {
    /// The path must exist with exactly these bytes.
    Bytes(Vec<u8>),
    /// The path must not exist.
    Tombstone,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Path from the repository root, without a leading `/`.
    pub path: String,
    pub content: FileContent,
}

impl FileEntry {
    pub fn new(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            content: FileContent::Bytes(content.into()),
        }
    }

    pub fn tombstone(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: FileContent::Tombstone,
        }
    }

    /// Change that turns `current` into this entry, or `None` when it already matches.
    pub fn change_from(&self, current: Option<&[u8]>) -> Option<FileChange> {
        match (&self.content, current) {
            (FileContent::Bytes(want), Some(have)) if want.as_slice() == have => None,
            (FileContent::Bytes(want), Some(_)) => Some(FileChange::Update {
                path: self.path.clone(),
                content: want.clone(),
            }),
            (FileContent::Bytes(want), None) => Some(FileChange::Create {
                path: self.path.clone(),
                content: want.clone(),
            }),
            (FileContent::Tombstone, Some(_)) => Some(FileChange::Delete {
                path: self.path.clone(),
            }),
            (FileContent::Tombstone, None) => None,
        }
    }
}

/// Ordered set of desired files with unique paths.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredFileSet {
    entries: Vec<FileEntry>,
}

impl DesiredFileSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set, keeping the last entry for a repeated path at the position
    /// of its first occurrence.
    pub fn from_entries(entries: impl IntoIterator<Item = FileEntry>) -> Self {
        let mut set = Self::new();
        for entry in entries {
            set.insert(entry);
        }
        set
    }

    /// Set of tombstones for the given paths.
    pub fn removal<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_entries(paths.into_iter().map(FileEntry::tombstone))
    }

    pub fn insert(&mut self, entry: FileEntry) {
        let normalized = FileEntry {
            path: entry.path.trim_start_matches('/').to_string(),
            content: entry.content,
        };
        match self.entries.iter_mut().find(|e| e.path == normalized.path) {
            Some(existing) => *existing = normalized,
            None => self.entries.push(normalized),
        }
    }

    pub fn entries(&self) -> &[FileEntry] {
        &self.entries
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.path.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A single change in a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileChange {
    Create { path: String, content: Vec<u8> },
    Update { path: String, content: Vec<u8> },
    Delete { path: String },
}

impl FileChange {
    pub fn path(&self) -> &str {
        match self {
            FileChange::Create { path, .. }
            | FileChange::Update { path, .. }
            | FileChange::Delete { path } => path,
        }
    }
}
