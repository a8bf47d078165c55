//! Archive extraction. Every supported container format is reduced to the
//! same "extract everything into a temp directory, then tell me what you
//! extracted" shape so the scanner can walk the result the same way it walks
//! a plain directory, regardless of container kind.

use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::ScanError;

/// One member pulled out of a container archive.
pub struct ExtractedMember {
    /// Path of the member inside the archive, e.g. `docs/report.docx`.
    pub member_name: String,
    /// Where it was extracted to on local disk.
    pub local_path: PathBuf,
    pub size: u64,
    pub modified: Option<SystemTime>,
}

/// Archive kinds the scanner knows how to open, keyed off the file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    TarGz,
    Rar,
}

impl ArchiveKind {
    pub fn detect(name: &str) -> Option<ArchiveKind> {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".zip") {
            Some(ArchiveKind::Zip)
        } else if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            Some(ArchiveKind::TarGz)
        } else if lower.ends_with(".rar") {
            Some(ArchiveKind::Rar)
        } else {
            None
        }
    }
}

/// Extract every member of `archive_path` (detected as `kind`) into a fresh
/// subdirectory of `dest_dir`, returning their member names and extracted
/// locations. Never panics on a malformed member: individual member
/// failures are reported as `ScanError::ArchiveMember` and skipped, so one
/// corrupt entry doesn't sink the rest of the archive.
pub fn extract_all(
    archive_path: &Path,
    kind: ArchiveKind,
    dest_dir: &Path,
    on_member_failure: &mut dyn FnMut(ScanError),
) -> Result<Vec<ExtractedMember>, ScanError> {
    std::fs::create_dir_all(dest_dir).map_err(|e| {
        ScanError::ArchiveOpen(archive_path.display().to_string(), e.to_string())
    })?;

    match kind {
        ArchiveKind::Zip => extract_zip(archive_path, dest_dir, on_member_failure),
        ArchiveKind::TarGz => extract_tar_gz(archive_path, dest_dir, on_member_failure),
        ArchiveKind::Rar => extract_rar(archive_path, dest_dir, on_member_failure),
    }
}

fn safe_join(dest_dir: &Path, member_name: &str) -> Option<PathBuf> {
    let mut out = dest_dir.to_path_buf();
    for comp in Path::new(member_name).components() {
        use std::path::Component;
        match comp {
            Component::Normal(seg) => out.push(seg),
            Component::CurDir => {}
            // Reject absolute paths and `..` escapes from a hostile archive.
            _ => return None,
        }
    }
    Some(out)
}

fn extract_zip(
    archive_path: &Path,
    dest_dir: &Path,
    on_member_failure: &mut dyn FnMut(ScanError),
) -> Result<Vec<ExtractedMember>, ScanError> {
    let file = File::open(archive_path)
        .map_err(|e| ScanError::ArchiveOpen(archive_path.display().to_string(), e.to_string()))?;
    let mut zip = zip::ZipArchive::new(BufReader::new(file))
        .map_err(|e| ScanError::ArchiveOpen(archive_path.display().to_string(), e.to_string()))?;

    let mut out = Vec::new();
    for i in 0..zip.len() {
        let mut entry = match zip.by_index(i) {
            Ok(e) => e,
            Err(e) => {
                on_member_failure(ScanError::ArchiveMember(
                    archive_path.display().to_string(),
                    e.to_string(),
                ));
                continue;
            }
        };
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        let Some(dest_path) = safe_join(dest_dir, &name) else {
            on_member_failure(ScanError::ArchiveMember(name.clone(), "unsafe member path".into()));
            continue;
        };
        if let Some(parent) = dest_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let modified_time = zip_datetime_to_system_time(&entry);
        let size = entry.size();
        match File::create(&dest_path) {
            Ok(mut dst) => {
                if let Err(e) = io::copy(&mut entry, &mut dst) {
                    on_member_failure(ScanError::ArchiveMember(name, e.to_string()));
                    continue;
                }
                out.push(ExtractedMember {
                    member_name: name,
                    local_path: dest_path,
                    size,
                    modified: modified_time,
                });
            }
            Err(e) => {
                on_member_failure(ScanError::ArchiveMember(name, e.to_string()));
            }
        }
    }
    Ok(out)
}

fn zip_datetime_to_system_time(entry: &zip::read::ZipFile) -> Option<SystemTime> {
    let dt = entry.last_modified()?;
    let naive = chrono::NaiveDate::from_ymd_opt(
        dt.year() as i32,
        dt.month() as u32,
        dt.day() as u32,
    )?
    .and_hms_opt(dt.hour() as u32, dt.minute() as u32, dt.second() as u32)?;
    let utc = chrono::DateTime::<chrono::Utc>::from_naive_utc_and_offset(naive, chrono::Utc);
    Some(utc.into())
}

fn extract_tar_gz(
    archive_path: &Path,
    dest_dir: &Path,
    on_member_failure: &mut dyn FnMut(ScanError),
) -> Result<Vec<ExtractedMember>, ScanError> {
    let file = File::open(archive_path)
        .map_err(|e| ScanError::ArchiveOpen(archive_path.display().to_string(), e.to_string()))?;
    let decoder = flate2::read::GzDecoder::new(BufReader::new(file));
    let mut tar = tar::Archive::new(decoder);

    let entries = tar.entries().map_err(|e| {
        ScanError::ArchiveOpen(archive_path.display().to_string(), e.to_string())
    })?;

    let mut out = Vec::new();
    for entry in entries {
        let mut entry = match entry {
            Ok(e) => e,
            Err(e) => {
                on_member_failure(ScanError::ArchiveMember(
                    archive_path.display().to_string(),
                    e.to_string(),
                ));
                continue;
            }
        };
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let name = match entry.path() {
            Ok(p) => p.to_string_lossy().to_string(),
            Err(e) => {
                on_member_failure(ScanError::ArchiveMember(
                    archive_path.display().to_string(),
                    e.to_string(),
                ));
                continue;
            }
        };
        let Some(dest_path) = safe_join(dest_dir, &name) else {
            on_member_failure(ScanError::ArchiveMember(name.clone(), "unsafe member path".into()));
            continue;
        };
        if let Some(parent) = dest_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let size = entry.header().size().unwrap_or(0);
        let modified = entry
            .header()
            .mtime()
            .ok()
            .map(|secs| std::time::UNIX_EPOCH + std::time::Duration::from_secs(secs));
        match entry.unpack(&dest_path) {
            Ok(_) => out.push(ExtractedMember {
                member_name: name,
                local_path: dest_path,
                size,
                modified,
            }),
            Err(e) => on_member_failure(ScanError::ArchiveMember(name, e.to_string())),
        }
    }
    Ok(out)
}

#[cfg(feature = "rar")]
fn extract_rar(
    archive_path: &Path,
    dest_dir: &Path,
    on_member_failure: &mut dyn FnMut(ScanError),
) -> Result<Vec<ExtractedMember>, ScanError> {
    let mut archive = unrar::Archive::new(archive_path).open_for_processing().map_err(|e| {
        ScanError::ArchiveOpen(archive_path.display().to_string(), e.to_string())
    })?;

    let mut out = Vec::new();
    while let Some(header) =
        archive.read_header().map_err(|e| {
            ScanError::ArchiveOpen(archive_path.display().to_string(), e.to_string())
        })?
    {
        let entry = header.entry();
        let name = entry.filename.to_string_lossy().to_string();
        let is_file = !entry.is_directory();
        let size = entry.unpacked_size;

        if !is_file {
            archive = header.skip().map_err(|e| {
                ScanError::ArchiveMember(name.clone(), e.to_string())
            })?;
            continue;
        }

        let Some(dest_path) = safe_join(dest_dir, &name) else {
            on_member_failure(ScanError::ArchiveMember(name.clone(), "unsafe member path".into()));
            archive = header.skip().map_err(|e| ScanError::ArchiveMember(name, e.to_string()))?;
            continue;
        };
        if let Some(parent) = dest_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        match header.extract_to(&dest_path) {
            Ok(next) => {
                archive = next;
                out.push(ExtractedMember { member_name: name, local_path: dest_path, size, modified: None });
            }
            Err(e) => {
                on_member_failure(ScanError::ArchiveMember(name, e.to_string()));
                break;
            }
        }
    }
    Ok(out)
}

#[cfg(not(feature = "rar"))]
fn extract_rar(
    archive_path: &Path,
    _dest_dir: &Path,
    _on_member_failure: &mut dyn FnMut(ScanError),
) -> Result<Vec<ExtractedMember>, ScanError> {
    Err(ScanError::CodecUnavailable(
        archive_path.display().to_string(),
        "rar support was not compiled in (enable the `rar` feature)".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_known_extensions() {
        assert_eq!(ArchiveKind::detect("a.zip"), Some(ArchiveKind::Zip));
        assert_eq!(ArchiveKind::detect("a.tar.gz"), Some(ArchiveKind::TarGz));
        assert_eq!(ArchiveKind::detect("a.tgz"), Some(ArchiveKind::TarGz));
        assert_eq!(ArchiveKind::detect("a.rar"), Some(ArchiveKind::Rar));
        assert_eq!(ArchiveKind::detect("a.docx"), None);
    }

    #[test]
    fn safe_join_rejects_parent_escape() {
        let dest = Path::new("/tmp/extract-root");
        assert!(safe_join(dest, "../../etc/passwd").is_none());
        assert!(safe_join(dest, "docs/report.docx").is_some());
    }
}
