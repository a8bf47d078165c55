//! Core data types shared by the scanner, queue, fingerprinter, packager and
//! transport layer.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a [`FileItem`] was discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Filesystem,
    Archive,
}

/// A single discovered candidate, either a plain file on disk or a member of
/// an archive (possibly nested inside further archives).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileItem {
    /// Absolute local path. For archive members this is the path of the
    /// extracted temp file, not a path that exists inside the original
    /// container.
    pub path: PathBuf,
    pub name: String,
    pub origin: Origin,
    /// 0 at the root; N after unwrapping through N container boundaries.
    pub nested_level: u32,
    /// Joined display path, e.g. `outer.zip/middle.rar/inner.docx`. Only set
    /// when `origin == Archive`.
    pub nested_path: Option<String>,
    pub size: u64,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
    pub fingerprint: Option<String>,
}

impl FileItem {
    pub fn validate(&self) -> Result<(), &'static str> {
        match self.origin {
            Origin::Filesystem => {
                if self.nested_level != 0 {
                    return Err("filesystem-origin item must have nested_level == 0");
                }
                if self.nested_path.is_some() {
                    return Err("filesystem-origin item must not carry a nested_path");
                }
            }
            Origin::Archive => {
                if self.nested_path.is_none() {
                    return Err("archive-origin item must carry a nested_path");
                }
                if self.nested_level > 0 {
                    let seps =
                        self.nested_path.as_deref().unwrap_or("").matches(".zip/").count()
                            + self.nested_path.as_deref().unwrap_or("").matches(".rar/").count()
                            + self.nested_path.as_deref().unwrap_or("").matches(".tar.gz/").count()
                            + self.nested_path.as_deref().unwrap_or("").matches(".tgz/").count();
                    if seps == 0 {
                        return Err("nested archive item must have at least one separator");
                    }
                }
            }
        }
        Ok(())
    }
}

/// A pair of (extensions, name-regex). Matches iff the name's extension
/// (case-insensitive, no dot) is in `extensions` (or `extensions` is empty,
/// meaning "any extension") AND the full name matches `regex`.
#[derive(Debug, Clone)]
pub struct MatchRule {
    pub extensions: Vec<String>,
    pub regex: regex::Regex,
}

impl MatchRule {
    pub fn new(extensions: Vec<String>, regex: regex::Regex) -> Self {
        let extensions = extensions.into_iter().map(|e| e.to_ascii_lowercase()).collect();
        Self { extensions, regex }
    }

    pub fn matches_name(&self, name: &str) -> bool {
        let ext_ok = if self.extensions.is_empty() {
            true
        } else {
            let ext = std::path::Path::new(name)
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_ascii_lowercase());
            matches!(ext, Some(e) if self.extensions.iter().any(|want| want == &e))
        };
        ext_ok && self.regex.is_match(name)
    }
}

/// Options governing one scanner invocation.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub root_dir: PathBuf,
    pub rules: Vec<MatchRule>,
    /// -1 = unlimited, 0 = root only.
    pub depth: i64,
    pub skip_dirs: std::collections::HashSet<String>,
    /// 0 = unlimited.
    pub max_file_size: u64,
    pub scan_nested_archives: bool,
    pub max_nested_level: u32,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::new(),
            rules: Vec::new(),
            depth: -1,
            skip_dirs: std::collections::HashSet::new(),
            max_file_size: 0,
            scan_nested_archives: true,
            max_nested_level: 5,
        }
    }
}

/// The kind of condition that produced a [`ScanFailure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScanFailureKind {
    Permission,
    Read,
    ArchiveOpen,
    ArchiveMember,
    Timeout,
}

/// A non-fatal error recorded during scanning; never aborts the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanFailure {
    pub kind: ScanFailureKind,
    pub path: String,
    pub message: String,
}

/// Which stage of the processing queue an item currently sits in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Matched,
    FileStability,
    Md5,
    Packaging,
    Transport,
}

impl Stage {
    pub const ORDER: [Stage; 5] =
        [Stage::Matched, Stage::FileStability, Stage::Md5, Stage::Packaging, Stage::Transport];

    pub fn next(self) -> Option<Stage> {
        let idx = Self::ORDER.iter().position(|s| *s == self)?;
        Self::ORDER.get(idx + 1).copied()
    }
}

/// Terminal/in-flight state of a [`QueueItem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Waiting,
    Processing,
    Completed,
    Failed,
    Retrying,
}

/// A [`FileItem`] wrapped with queue bookkeeping.
#[derive(Debug, Clone)]
pub struct QueueItem {
    pub file: FileItem,
    pub stage: Stage,
    pub status: ItemStatus,
    pub attempts: u32,
    pub last_attempt: Option<DateTime<Utc>>,
    /// Earliest time this item may be retried; only meaningful when
    /// `status == Retrying`.
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
}

impl QueueItem {
    pub fn new(file: FileItem) -> Self {
        Self {
            file,
            stage: Stage::Matched,
            status: ItemStatus::Waiting,
            attempts: 0,
            last_attempt: None,
            next_attempt_at: None,
            failure_reason: None,
        }
    }
}

/// An ordered group of queue items sealed into one archive for transport.
#[derive(Debug, Clone)]
pub struct Package {
    pub name: String,
    pub members: Vec<QueueItem>,
    pub total_size: u64,
    pub local_path: Option<PathBuf>,
}

impl Package {
    pub fn new(name: String) -> Self {
        Self { name, members: Vec::new(), total_size: 0, local_path: None }
    }
}

/// Outcome of a single package upload attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportResult {
    pub success: bool,
    pub local_path: PathBuf,
    pub remote_path: String,
    pub retries: u32,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}
