//! Core types shared by the walker, loader and checkers.

use bids_protocol::IssueFile;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A file discovered in the dataset.
///
/// `relative_path` is canonical: rooted at the dataset, forward-slash
/// separated, always starting with `/`. Records are never mutated once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    /// Path usable to read the file (the symlink path when reached through one)
    pub absolute_path: PathBuf,
    pub relative_path: String,
    pub name: String,
    pub is_directory: bool,
    pub is_symlink: bool,
    pub is_ignored: bool,
    /// File size in bytes
    pub size: u64,
}

impl FileRecord {
    /// Record for a regular file reached at `relative_path`.
    pub fn file(absolute_path: PathBuf, relative_path: String, size: u64) -> Self {
        let name = file_name_of(&relative_path).to_string();
        Self {
            absolute_path,
            relative_path,
            name,
            is_directory: false,
            is_symlink: false,
            is_ignored: false,
            size,
        }
    }

    /// Record for a file known only by its path, e.g. from a browser listing.
    pub fn listed(raw_path: &str, size: u64) -> Self {
        let relative_path = harmonize_relative_path(raw_path);
        Self::file(PathBuf::from(raw_path), relative_path, size)
    }

    pub fn with_symlink(mut self, is_symlink: bool) -> Self {
        self.is_symlink = is_symlink;
        self
    }

    pub fn with_ignored(mut self, is_ignored: bool) -> Self {
        self.is_ignored = is_ignored;
        self
    }

    /// Directory part of the relative path, without trailing slash ("" at root).
    pub fn parent_dir(&self) -> &str {
        parent_of(&self.relative_path)
    }

    pub fn has_extension(&self, extension: &str) -> bool {
        self.name.ends_with(extension)
    }

    pub fn issue_file(&self) -> IssueFile {
        IssueFile {
            relative_path: self.relative_path.clone(),
            name: self.name.clone(),
        }
    }
}

/// Join a canonical parent path ("" for the root) and an entry name.
pub fn join_relative(parent: &str, name: &str) -> String {
    format!("{}/{}", parent.trim_end_matches('/'), name)
}

/// Convert a filesystem path below `root` to canonical form.
pub fn canonical_relative_path(root: &Path, path: &Path) -> String {
    let stripped = path.strip_prefix(root).unwrap_or(path);
    let joined = stripped
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .filter(|c| !c.is_empty() && c != "/")
        .collect::<Vec<_>>()
        .join("/");
    format!("/{}", joined)
}

/// Canonicalize a listing path.
///
/// Backslashes become forward slashes. A path without a leading separator is
/// taken to start with the dataset folder name, which is dropped
/// (`ds001/sub-01/x.nii` becomes `/sub-01/x.nii`).
pub fn harmonize_relative_path(raw: &str) -> String {
    let normalized = raw.replace('\\', "/");
    if normalized.starts_with('/') {
        return normalized;
    }
    let mut parts = normalized.split('/');
    parts.next();
    let rest = parts.collect::<Vec<_>>().join("/");
    format!("/{}", rest)
}

pub fn file_name_of(relative_path: &str) -> &str {
    relative_path.rsplit('/').next().unwrap_or(relative_path)
}

pub fn parent_of(relative_path: &str) -> &str {
    match relative_path.rfind('/') {
        Some(idx) => &relative_path[..idx],
        None => "",
    }
}
