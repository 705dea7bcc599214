//! Read-only parsed diff consumed by a review run.
//!
//! Diff parsing itself happens upstream; these types only describe its output.

use serde::{Deserialize, Serialize};

/// What happened to a file in the diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileOperation {
    Add,
    Modify,
    Delete,
    Rename,
}

impl std::fmt::Display for FileOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FileOperation::Add => "added",
            FileOperation::Modify => "modified",
            FileOperation::Delete => "deleted",
            FileOperation::Rename => "renamed",
        };
        f.write_str(s)
    }
}

/// One `@@ -old_start,old_lines +new_start,new_lines @@` hunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffHunk {
    pub old_start: u32,
    pub old_lines: u32,
    pub new_start: u32,
    pub new_lines: u32,
    /// Hunk body, including the leading ` `, `+`, `-` markers.
    pub content: String,
}

/// Added/removed line counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffStats {
    pub files_changed: usize,
    pub additions: usize,
    pub deletions: usize,
}

/// Changes to a single file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDiff {
    pub path: String,
    /// Previous path for renames.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_path: Option<String>,
    pub operation: FileOperation,
    #[serde(default)]
    pub hunks: Vec<DiffHunk>,
    /// Raw unified-diff text for this file.
    #[serde(default)]
    pub raw: String,
    #[serde(default)]
    pub additions: usize,
    #[serde(default)]
    pub deletions: usize,
}

impl FileDiff {
    /// Build a file diff from raw unified-diff text, counting `+`/`-` lines.
    pub fn from_raw(path: impl Into<String>, operation: FileOperation, raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let (additions, deletions) = count_changes(&raw);
        Self {
            path: path.into(),
            old_path: None,
            operation,
            hunks: Vec::new(),
            raw,
            additions,
            deletions,
        }
    }

    /// Mark this file as renamed from `old_path`.
    pub fn renamed_from(mut self, old_path: impl Into<String>) -> Self {
        self.old_path = Some(old_path.into());
        self.operation = FileOperation::Rename;
        self
    }

    pub fn with_hunks(mut self, hunks: Vec<DiffHunk>) -> Self {
        self.hunks = hunks;
        self
    }

    /// Number of new-side lines covered by this diff.
    ///
    /// Uses hunk headers when present and falls back to the raw text.
    pub fn line_count(&self) -> usize {
        if self.hunks.is_empty() {
            self.raw.lines().count()
        } else {
            self.hunks.iter().map(|h| h.new_lines as usize).sum()
        }
    }
}

fn count_changes(raw: &str) -> (usize, usize) {
    let mut additions = 0;
    let mut deletions = 0;
    for line in raw.lines() {
        if line.starts_with("+++") || line.starts_with("---") {
            continue;
        }
        if line.starts_with('+') {
            additions += 1;
        } else if line.starts_with('-') {
            deletions += 1;
        }
    }
    (additions, deletions)
}

/// The complete diff under review.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedDiff {
    pub files: Vec<FileDiff>,
    #[serde(default)]
    pub stats: DiffStats,
}

impl ParsedDiff {
    /// Build a diff and derive aggregate stats from its files.
    pub fn new(files: Vec<FileDiff>) -> Self {
        let stats = DiffStats {
            files_changed: files.len(),
            additions: files.iter().map(|f| f.additions).sum(),
            deletions: files.iter().map(|f| f.deletions).sum(),
        };
        Self { files, stats }
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Look up a file by its current or previous path.
    pub fn find_file(&self, path: &str) -> Option<&FileDiff> {
        let path = path.trim_start_matches("./");
        self.files
            .iter()
            .find(|f| f.path == path || f.old_path.as_deref() == Some(path))
    }

    pub fn paths(&self) -> Vec<&str> {
        self.files.iter().map(|f| f.path.as_str()).collect()
    }
}
