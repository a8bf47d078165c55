//! End-to-end pipeline coverage through the public facade, with transport
//! disabled so the test never attempts a network connection: a disabled
//! transport must still produce an empty transport summary and open no
//! connection at all.

use packship::config::{Config, PackagingTrigger, Protocol, QueueConfig, RuleConfig, TransportOptions};

fn dry_run_config(root_dir: std::path::PathBuf, output_dir: std::path::PathBuf) -> Config {
    Config {
        root_dir,
        output_dir,
        rules: vec![RuleConfig { extensions: vec!["docx".into()], regex: "^Report".into() }],
        depth: -1,
        skip_dirs: Vec::new(),
        max_file_size: 0,
        scan_nested_archives: true,
        max_nested_level: 5,
        queue: QueueConfig {
            max_concurrent_file_checks: 2,
            max_concurrent_transfers: 2,
            stability_retry_delay_ms: 0,
            max_retries: 2,
        },
        packaging_trigger: PackagingTrigger::default(),
        transport: TransportOptions {
            enabled: false,
            protocol: Protocol::Sftp,
            host: String::new(),
            port: 22,
            username: String::new(),
            password: String::new(),
            remote_path: "/up".into(),
            retry_count: 1,
            timeout_ms: 1000,
            package_size_mb: 100,
            debug: false,
            retry_backoff_ms: 0,
        },
    }
}

#[test]
fn disabled_transport_still_scans_fingerprints_and_packages() {
    let root = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();

    for i in 0..5 {
        std::fs::write(root.path().join(format!("Report-{i}.docx")), format!("payload-{i}")).unwrap();
    }
    // Shouldn't match the rule, and shouldn't show up in the summary.
    std::fs::write(root.path().join("notes.txt"), b"irrelevant").unwrap();

    let config = dry_run_config(root.path().to_path_buf(), output.path().to_path_buf());
    let summary = packship::facade::scan_and_transport(&config, false).unwrap();

    assert_eq!(summary.processed_files, 5);
    assert!(summary.failed_items.is_empty());
    assert_eq!(summary.package_paths.len(), 1);
    assert!(summary.transport_summary.is_empty());
    assert!(summary.success, "a run with nothing to upload still counts as success");
    assert!(summary.log_file_path.exists());

    let log_contents = std::fs::read_to_string(&summary.log_file_path).unwrap();
    assert!(log_contents.contains("--- ScanAndTransport Start ---"));
    assert!(log_contents.contains("Calling scanFiles..."));
    assert!(log_contents.contains("scanFiles finished."));
    assert!(log_contents.contains("Processed: 5"));
    assert!(log_contents.contains("--- ScanAndTransport End --- Success: true"));
    let _ = std::fs::remove_file(&summary.log_file_path);

    let sidecar = output.path().join("run_summary.json");
    assert!(sidecar.exists());
}

#[test]
fn empty_root_produces_a_trivially_successful_run() {
    let root = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();

    let config = dry_run_config(root.path().to_path_buf(), output.path().to_path_buf());
    let summary = packship::facade::scan_and_transport(&config, false).unwrap();

    assert_eq!(summary.processed_files, 0);
    assert!(summary.package_paths.is_empty());
    assert!(summary.transport_summary.is_empty());
    assert!(summary.success);
    let _ = std::fs::remove_file(&summary.log_file_path);
}
