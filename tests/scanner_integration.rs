//! Integration coverage for the scanner's public surface, exercised the way
//! an external caller would: through `packship::scanner::scan` and
//! `packship::model`, not the crate-internal test helpers.

use std::io::Write;

use packship::model::{MatchRule, Origin, ScanOptions};
use packship::scanner::scan;
use regex::Regex;

fn rule(ext: &str, pattern: &str) -> MatchRule {
    MatchRule::new(vec![ext.to_string()], Regex::new(pattern).unwrap())
}

fn write_zip(path: &std::path::Path, entries: &[(&str, &[u8])]) {
    let f = std::fs::File::create(path).unwrap();
    let mut w = zip::ZipWriter::new(f);
    for (name, data) in entries {
        w.start_file(*name, zip::write::SimpleFileOptions::default()).unwrap();
        w.write_all(data).unwrap();
    }
    w.finish().unwrap();
}

#[test]
fn standalone_archive_member_matches_at_level_zero() {
    let dir = tempfile::tempdir().unwrap();
    write_zip(
        &dir.path().join("standalone.zip"),
        &[("MeiTuan-standalone.docx", b"hi")],
    );

    let opts = ScanOptions {
        root_dir: dir.path().to_path_buf(),
        rules: vec![rule("docx", "^MeiTuan.*")],
        ..ScanOptions::default()
    };
    let outcome = scan(&opts);

    assert_eq!(outcome.items.len(), 1);
    assert_eq!(outcome.items[0].origin, Origin::Archive);
    assert_eq!(outcome.items[0].nested_level, 0);
    assert!(outcome.items[0].validate().is_ok());
}

#[test]
fn three_level_nesting_yields_nested_level_two() {
    let dir = tempfile::tempdir().unwrap();

    let level0 = dir.path().join("level-0.zip");
    write_zip(&level0, &[("folder-0/target.docx", b"payload")]);

    let level1 = dir.path().join("level-1.zip");
    {
        let bytes = std::fs::read(&level0).unwrap();
        write_zip(&level1, &[("folder-1/level-0.zip", &bytes)]);
    }
    std::fs::remove_file(&level0).unwrap();

    let level2 = dir.path().join("level-2.zip");
    {
        let bytes = std::fs::read(&level1).unwrap();
        write_zip(&level2, &[("folder-2/level-1.zip", &bytes)]);
    }
    std::fs::remove_file(&level1).unwrap();

    let opts = ScanOptions {
        root_dir: dir.path().to_path_buf(),
        rules: vec![rule("docx", "^target.*")],
        max_nested_level: 5,
        ..ScanOptions::default()
    };
    let outcome = scan(&opts);

    assert_eq!(outcome.items.len(), 1);
    let item = &outcome.items[0];
    assert_eq!(item.nested_level, 2);
    let path = item.nested_path.as_deref().unwrap();
    // nestedPath includes the root archive's own segment, so a
    // nested_level=k item carries k+1 `.zip/` separators.
    assert_eq!(path.matches(".zip/").count(), (item.nested_level + 1) as usize);
    assert!(path.ends_with("target.docx"));
}

#[test]
fn depth_zero_ignores_subdirectories() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("Report-root.docx"), b"a").unwrap();
    let sub = dir.path().join("sub");
    std::fs::create_dir_all(&sub).unwrap();
    std::fs::write(sub.join("Report-nested.docx"), b"b").unwrap();

    let opts = ScanOptions {
        root_dir: dir.path().to_path_buf(),
        rules: vec![rule("docx", "^Report")],
        depth: 0,
        ..ScanOptions::default()
    };
    let outcome = scan(&opts);

    assert_eq!(outcome.items.len(), 1);
    assert_eq!(outcome.items[0].name, "Report-root.docx");
}

#[test]
fn max_file_size_excludes_oversized_files() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("Report-small.docx"), vec![0u8; 10]).unwrap();
    std::fs::write(dir.path().join("Report-big.docx"), vec![0u8; 1000]).unwrap();

    let opts = ScanOptions {
        root_dir: dir.path().to_path_buf(),
        rules: vec![rule("docx", "^Report")],
        max_file_size: 100,
        ..ScanOptions::default()
    };
    let outcome = scan(&opts);

    assert_eq!(outcome.items.len(), 1);
    assert_eq!(outcome.items[0].name, "Report-small.docx");
}

#[test]
fn skip_dirs_are_not_descended() {
    let dir = tempfile::tempdir().unwrap();
    let skip = dir.path().join("node_modules");
    std::fs::create_dir_all(&skip).unwrap();
    std::fs::write(skip.join("Report-hidden.docx"), b"a").unwrap();
    std::fs::write(dir.path().join("Report-visible.docx"), b"b").unwrap();

    let mut skip_dirs = std::collections::HashSet::new();
    skip_dirs.insert("node_modules".to_string());
    let opts = ScanOptions {
        root_dir: dir.path().to_path_buf(),
        rules: vec![rule("docx", "^Report")],
        skip_dirs,
        ..ScanOptions::default()
    };
    let outcome = scan(&opts);

    assert_eq!(outcome.items.len(), 1);
    assert_eq!(outcome.items[0].name, "Report-visible.docx");
}
