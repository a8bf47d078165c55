//! Filesystem scanner: walks `ScanOptions::root_dir`, matches file names
//! against the configured rules, and recurses into matched *and*
//! unmatched* archives looking for further matches, down to
//! `max_nested_level` container boundaries.
//!
//! Archive recursion uses an explicit work queue rather than language
//! recursion, so a hostile zip-of-zips-of-zips exhausts the queue's heap
//! allocation long before it exhausts the call stack.

pub mod archive;
pub mod rules;

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use tempfile::TempDir;
use walkdir::WalkDir;

use crate::error::ScanError;
use crate::model::{FileItem, Origin, ScanFailure, ScanOptions};

use archive::{ArchiveKind, extract_all};

/// Everything a single scan run produced.
pub struct ScanOutcome {
    pub items: Vec<FileItem>,
    pub failures: Vec<ScanFailure>,
    /// Kept alive for the outcome's lifetime so extracted archive members on
    /// disk survive until the caller (the queue) has read/fingerprinted
    /// them; dropped (and thus cleaned up) once the caller is done.
    pub _temp_dirs: Vec<TempDir>,
}

/// A unit of work: either a directory to walk or an archive to open, at a
/// given nesting level (0 = not inside any archive).
enum WorkItem {
    Dir { path: PathBuf, depth: i64 },
    Archive { path: PathBuf, level: u32, nested_path_prefix: String },
}

fn to_datetime(t: SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(t)
}

/// Walk `opts.root_dir`, matching and recursing per `opts`. Never aborts on
/// a single bad entry; every failure is collected into the outcome instead.
pub fn scan(opts: &ScanOptions) -> ScanOutcome {
    let mut items = Vec::new();
    let mut failures = Vec::new();
    let mut temp_dirs = Vec::new();

    let mut queue: VecDeque<WorkItem> =
        VecDeque::from([WorkItem::Dir { path: opts.root_dir.clone(), depth: 0 }]);

    while let Some(work) = queue.pop_front() {
        match work {
            WorkItem::Dir { path, depth } => {
                scan_dir(&path, depth, opts, &mut items, &mut failures, &mut queue);
            }
            WorkItem::Archive { path, level, nested_path_prefix } => {
                scan_archive(
                    &path,
                    level,
                    &nested_path_prefix,
                    opts,
                    &mut items,
                    &mut failures,
                    &mut queue,
                    &mut temp_dirs,
                );
            }
        }
    }

    ScanOutcome { items, failures, _temp_dirs: temp_dirs }
}

fn scan_dir(
    root: &Path,
    depth: i64,
    opts: &ScanOptions,
    items: &mut Vec<FileItem>,
    failures: &mut Vec<ScanFailure>,
    queue: &mut VecDeque<WorkItem>,
) {
    // `opts.depth` counts directory descent levels below root (0 = root's
    // immediate children only); walkdir's own depth counter starts at 0 for
    // the root entry itself, so root's immediate files sit at walkdir-depth
    // 1 — offset by one to align the two.
    let max_depth =
        if opts.depth < 0 { usize::MAX } else { ((opts.depth - depth).max(0) as usize) + 1 };
    let mut walker = WalkDir::new(root).min_depth(0).max_depth(max_depth).into_iter();

    while let Some(entry) = walker.next() {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                let path = e.path().map(|p| p.display().to_string()).unwrap_or_default();
                failures.push(ScanFailure {
                    kind: crate::model::ScanFailureKind::Permission,
                    path,
                    message: e.to_string(),
                });
                continue;
            }
        };

        if entry.path() == root {
            continue;
        }

        if entry.file_type().is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                if opts.skip_dirs.contains(name) {
                    walker.skip_current_dir();
                }
            }
            continue;
        }

        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let meta = match entry.metadata() {
            Ok(m) => m,
            Err(e) => {
                failures.push(ScanFailure {
                    kind: crate::model::ScanFailureKind::Read,
                    path: path.display().to_string(),
                    message: e.to_string(),
                });
                continue;
            }
        };

        if opts.max_file_size > 0 && meta.len() > opts.max_file_size {
            continue;
        }

        let name = entry.file_name().to_string_lossy().to_string();
        let is_match = rules::matches_any(&opts.rules, &name);
        let archive_kind = ArchiveKind::detect(&name);

        if is_match {
            items.push(FileItem {
                path: path.to_path_buf(),
                name: name.clone(),
                origin: Origin::Filesystem,
                nested_level: 0,
                nested_path: None,
                size: meta.len(),
                created: meta.created().ok().map(to_datetime),
                modified: meta.modified().ok().map(to_datetime),
                fingerprint: None,
            });
        }

        // The root archive is always opened for level-0 member matching when
        // nested scanning is on, even if max_nested_level is 0 — that knob
        // only bounds recursion into archives nested *inside* this one
        // (maxNestedLevel=0 still matches at the top of a root archive).
        if archive_kind.is_some() && opts.scan_nested_archives {
            queue.push_back(WorkItem::Archive {
                path: path.to_path_buf(),
                level: 0,
                nested_path_prefix: name,
            });
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn scan_archive(
    archive_path: &Path,
    level: u32,
    nested_path_prefix: &str,
    opts: &ScanOptions,
    items: &mut Vec<FileItem>,
    failures: &mut Vec<ScanFailure>,
    queue: &mut VecDeque<WorkItem>,
    temp_dirs: &mut Vec<TempDir>,
) {
    let Some(kind) = ArchiveKind::detect(nested_path_prefix) else {
        return;
    };

    let temp_dir = match tempfile::Builder::new().prefix("packship-scan-").tempdir() {
        Ok(d) => d,
        Err(e) => {
            failures.push(ScanFailure {
                kind: crate::model::ScanFailureKind::ArchiveOpen,
                path: archive_path.display().to_string(),
                message: e.to_string(),
            });
            return;
        }
    };

    let mut member_failures = Vec::new();
    let extracted = {
        let mut on_failure = |e: ScanError| member_failures.push(e);
        extract_all(archive_path, kind, temp_dir.path(), &mut on_failure)
    };

    for e in member_failures {
        failures.push(ScanFailure { kind: e.kind(), path: e.path().to_string(), message: e.to_string() });
    }

    let extracted = match extracted {
        Ok(v) => v,
        Err(e) => {
            failures.push(ScanFailure { kind: e.kind(), path: e.path().to_string(), message: e.to_string() });
            return;
        }
    };

    for member in extracted {
        let nested_path = format!("{nested_path_prefix}/{}", member.member_name);
        let member_name = Path::new(&member.member_name)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&member.member_name)
            .to_string();

        let is_match = rules::matches_any(&opts.rules, &member_name);
        if is_match {
            items.push(FileItem {
                path: member.local_path.clone(),
                name: member_name.clone(),
                origin: Origin::Archive,
                nested_level: level,
                nested_path: Some(nested_path.clone()),
                size: member.size,
                created: None,
                modified: member.modified.map(to_datetime),
                fingerprint: None,
            });
        }

        if ArchiveKind::detect(&member_name).is_some()
            && opts.scan_nested_archives
            && level < opts.max_nested_level
        {
            queue.push_back(WorkItem::Archive {
                path: member.local_path,
                level: level + 1,
                nested_path_prefix: nested_path,
            });
        }
    }

    temp_dirs.push(temp_dir);
}
