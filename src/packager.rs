//! Packager: groups fingerprinted items into bounded zip packages and seals
//! each one atomically (write under a temp name, rename on completion).

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::StageError;
use crate::model::{FileItem, Origin};

/// One sealed package, ready for the transport stage.
pub struct SealedPackage {
    pub local_path: PathBuf,
    pub member_count: usize,
    pub total_size: u64,
}

/// The member path an item should be given inside a package: the
/// rootDir-relative path for filesystem items, the nestedPath for archive
/// items.
pub fn member_path(item: &FileItem, root_dir: &Path) -> String {
    match item.origin {
        Origin::Archive => item.nested_path.clone().unwrap_or_else(|| item.name.clone()),
        Origin::Filesystem => item
            .path
            .strip_prefix(root_dir)
            .map(|p| p.to_string_lossy().replace('\\', "/"))
            .unwrap_or_else(|_| item.name.clone()),
    }
}

/// Splits `items` into size-bounded groups. A group seals when the next
/// member would push its running total over `max_size_bytes`, or when
/// `max_files` members have accumulated — whichever comes first. A single
/// oversized item still gets its own group rather than being dropped.
pub fn group_by_size<'a>(
    items: &'a [FileItem],
    max_size_bytes: u64,
    max_files: Option<usize>,
) -> Vec<Vec<&'a FileItem>> {
    let mut groups: Vec<Vec<&FileItem>> = Vec::new();
    let mut current: Vec<&FileItem> = Vec::new();
    let mut current_size = 0u64;

    for item in items {
        let would_exceed_size = max_size_bytes > 0 && !current.is_empty()
            && current_size + item.size > max_size_bytes;
        let would_exceed_files =
            max_files.map(|m| current.len() >= m).unwrap_or(false) && !current.is_empty();

        if would_exceed_size || would_exceed_files {
            groups.push(std::mem::take(&mut current));
            current_size = 0;
        }

        current_size += item.size;
        current.push(item);
    }
    if !current.is_empty() {
        groups.push(current);
    }
    groups
}

/// Seal one group of items into `output_dir/package_<timestamp>_<seq>.zip`.
pub fn seal_package(
    items: &[&FileItem],
    root_dir: &Path,
    output_dir: &Path,
    seq: u32,
) -> Result<SealedPackage, StageError> {
    std::fs::create_dir_all(output_dir)
        .map_err(|e| StageError::Packaging(format!("creating {}: {e}", output_dir.display())))?;

    let now = Utc::now();
    let file_name = format!("package_{}_{seq}.zip", now.format("%Y%m%d_%H%M%S"));
    let final_path = output_dir.join(&file_name);
    let temp_path = output_dir.join(format!(".{file_name}.tmp"));

    let total_size = {
        let file = std::fs::File::create(&temp_path)
            .map_err(|e| StageError::Packaging(format!("creating {}: {e}", temp_path.display())))?;
        let mut writer = ZipWriter::new(file);
        let options =
            SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        let mut total = 0u64;
        for item in items {
            let member = member_path(item, root_dir);
            writer
                .start_file(&member, options)
                .map_err(|e| StageError::Packaging(format!("{member}: {e}")))?;
            let mut src = std::fs::File::open(&item.path)
                .map_err(|e| StageError::Packaging(format!("opening {}: {e}", item.path.display())))?;
            let mut buf = Vec::with_capacity(item.size as usize);
            src.read_to_end(&mut buf)
                .map_err(|e| StageError::Packaging(format!("reading {}: {e}", item.path.display())))?;
            writer.write_all(&buf).map_err(|e| StageError::Packaging(e.to_string()))?;
            total += item.size;
        }
        writer.finish().map_err(|e| StageError::Packaging(e.to_string()))?;
        total
    };

    std::fs::rename(&temp_path, &final_path)
        .map_err(|e| StageError::Packaging(format!("sealing {}: {e}", final_path.display())))?;

    Ok(SealedPackage { local_path: final_path, member_count: items.len(), total_size })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc as ChronoUtc;

    fn item(name: &str, size: u64, path: PathBuf) -> FileItem {
        FileItem {
            path,
            name: name.to_string(),
            origin: Origin::Filesystem,
            nested_level: 0,
            nested_path: None,
            size,
            created: None,
            modified: None,
            fingerprint: Some("deadbeef".into()),
        }
    }

    #[test]
    fn groups_split_on_size_threshold() {
        let items = vec![
            item("a", 40, PathBuf::from("a")),
            item("b", 40, PathBuf::from("b")),
            item("c", 40, PathBuf::from("c")),
        ];
        let groups = group_by_size(&items, 70, None);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].len(), 2);
        assert_eq!(groups[1].len(), 1);
    }

    #[test]
    fn oversized_single_item_gets_its_own_group() {
        let items = vec![item("big", 1000, PathBuf::from("big"))];
        let groups = group_by_size(&items, 70, None);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 1);
    }

    #[test]
    fn seal_writes_a_real_zip() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("in");
        std::fs::create_dir_all(&root).unwrap();
        let file_path = root.join("report.docx");
        std::fs::write(&file_path, b"hello").unwrap();
        let item = item("report.docx", 5, file_path);

        let out_dir = dir.path().join("out");
        let sealed = seal_package(&[&item], &root, &out_dir, 0).unwrap();
        assert!(sealed.local_path.exists());
        assert_eq!(sealed.member_count, 1);

        let file = std::fs::File::open(&sealed.local_path).unwrap();
        let mut zip = zip::ZipArchive::new(file).unwrap();
        assert_eq!(zip.len(), 1);
        let _ = ChronoUtc::now();
    }
}
