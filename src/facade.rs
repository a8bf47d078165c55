//! Public entry point: wires the scanner, processing queue, stability
//! detector, fingerprinter, packager and transport layer into one
//! `scan_and_transport` call, and writes the run's lifecycle log and JSON
//! summary sidecar.
//!
//! Every stage pulls a batch sized to its configured concurrency knob and
//! then fans it out across that many worker threads with `std::thread::scope`
//! — the same shape `fingerprint::fingerprint_batch` and the teacher's
//! channel-backed worker pools use, just inlined per stage here since each
//! stage's per-item work (and failure handling) differs.

use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;

use crate::config::Config;
use crate::model::{FileItem, Stage, TransportResult};
use crate::queue::ProcessingQueue;
use crate::{auto_concurrency, fingerprint, packager, scanner, stability, transport};

/// Outcome of one full pipeline run.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub success: bool,
    pub processed_files: usize,
    pub failed_items: Vec<FailedItem>,
    pub package_paths: Vec<PathBuf>,
    pub transport_summary: Vec<TransportResult>,
    pub log_file_path: PathBuf,
}

#[derive(Debug, Serialize)]
pub struct FailedItem {
    pub path: PathBuf,
    pub reason: String,
}

/// The run log, safe to share (by reference) across worker threads: every
/// write takes the same mutex around the underlying file handle.
struct RunLog {
    file: Mutex<std::fs::File>,
    path: PathBuf,
}

impl RunLog {
    /// Opened in the process's current working directory, per spec: the run
    /// log is a separate artifact from sealed packages, which live in
    /// `outputDir`.
    fn open() -> std::io::Result<Self> {
        let ts = Utc::now().format("%Y%m%d_%H%M%S");
        let path = std::env::current_dir()?.join(format!("scan_transport_log_{ts}.log"));
        let file = std::fs::OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { file: Mutex::new(file), path })
    }

    fn line(&self, msg: impl AsRef<str>) {
        let ts = Utc::now().to_rfc3339();
        let mut file = self.file.lock().unwrap();
        let _ = writeln!(file, "[{ts}] {}", msg.as_ref());
    }
}

/// Run the whole pipeline described by `config`: scan, wait for stability,
/// fingerprint, package, and ship. Never panics on a single file or package
/// failure — those are collected into the returned summary instead.
pub fn scan_and_transport(config: &Config, auto_size_concurrency: bool) -> anyhow::Result<RunSummary> {
    crate::util::set_backoff_ms(config.transport.retry_backoff_ms);

    let log = RunLog::open()?;
    log.line("--- ScanAndTransport Start ---");

    let scan_options = config.scan_options()?;
    log.line("Calling scanFiles...");
    let outcome = scanner::scan(&scan_options);
    log.line("scanFiles finished.");
    log.line(format!(
        "scan complete: {} matched items, {} scan failures",
        outcome.items.len(),
        outcome.failures.len()
    ));
    for f in &outcome.failures {
        log.line(format!("scan failure [{:?}] {}: {}", f.kind, f.path, f.message));
    }

    let total_size: u64 = outcome.items.iter().map(|i| i.size).sum();
    let check_concurrency = if auto_size_concurrency {
        let n = auto_concurrency::choose_auto_concurrency(outcome.items.len(), total_size);
        log.line(format!("auto-concurrency selected {n} stability/md5 workers"));
        n
    } else {
        config.queue.max_concurrent_file_checks
    };
    let transfer_concurrency = config.queue.max_concurrent_transfers;

    let queue = ProcessingQueue::new(config.queue.max_retries, config.queue.stability_retry_delay_ms);
    for item in outcome.items {
        queue.add(item);
    }
    queue.process_matched();

    let stability_delay = Duration::from_millis(config.queue.stability_retry_delay_ms);
    run_stability_stage(&queue, check_concurrency, stability_delay, &log);
    run_md5_stage(&queue, check_concurrency, &log);

    let (package_paths, transport_summary) =
        run_packaging_and_transport_stage(&queue, config, transfer_concurrency, &log);

    let failed_items: Vec<FailedItem> = queue
        .take_failed()
        .into_iter()
        .map(|qi| FailedItem {
            path: qi.file.path,
            reason: qi.failure_reason.unwrap_or_else(|| "unknown".to_string()),
        })
        .collect();

    let completed = queue.take_completed();
    let processed_files = completed.len();

    // At least one package must have shipped for a non-trivial run to count
    // as a success; a run that matched nothing has nothing to fail on.
    let success = if transport_summary.is_empty() {
        true
    } else {
        transport_summary.iter().any(|r| r.success)
    };

    log.line(format!("Processed: {processed_files}"));
    log.line(format!(
        "run finished: processed={processed_files} failed={} packages={}",
        failed_items.len(),
        package_paths.len()
    ));
    log.line(format!("--- ScanAndTransport End --- Success: {success}"));

    let summary = RunSummary {
        success,
        processed_files,
        failed_items,
        package_paths,
        transport_summary,
        log_file_path: log.path.clone(),
    };

    write_json_sidecar(&config.output_dir, &summary)?;

    Ok(summary)
}

/// `maxConcurrentFileChecks` parallel stability workers: each batch pulled
/// from the queue (already capped to `concurrency` items) is handed one
/// thread per item, so up to `concurrency` files are sampled at once.
fn run_stability_stage(queue: &ProcessingQueue, concurrency: usize, delay: Duration, log: &RunLog) {
    loop {
        queue.promote_due_retries();
        let batch = queue.next_batch(Stage::FileStability, concurrency.max(1));
        if batch.is_empty() {
            if queue.detailed_stats().by_stage[&Stage::FileStability].retrying == 0 {
                break;
            }
            std::thread::sleep(Duration::from_millis(50));
            continue;
        }
        std::thread::scope(|scope| {
            for qi in &batch {
                scope.spawn(move || match stability::check_stable(&qi.file.path, delay) {
                    Ok(true) => queue.mark_stage_success(Stage::FileStability, &qi.file.path),
                    Ok(false) => queue.retry(Stage::FileStability, &qi.file.path, "not yet stable"),
                    // A file that vanishes mid-check is never coming back; fail
                    // it immediately rather than burning the retry budget.
                    Err(e @ crate::error::StageError::NotFound(_)) => {
                        log.line(format!("stability check failed for {}: {e}", qi.file.path.display()));
                        queue.mark_failed(&qi.file.path, e.to_string());
                    }
                    Err(e) => {
                        log.line(format!("stability check failed for {}: {e}", qi.file.path.display()));
                        queue.retry(Stage::FileStability, &qi.file.path, e.to_string());
                    }
                });
            }
        });
    }
}

/// `maxConcurrentFileChecks` also bounds md5 workers (the same knob covers
/// "stability+hash workers" per spec §4.2), one thread per batch item.
fn run_md5_stage(queue: &ProcessingQueue, concurrency: usize, log: &RunLog) {
    loop {
        queue.promote_due_retries();
        let batch = queue.next_batch(Stage::Md5, concurrency.max(1));
        if batch.is_empty() {
            if queue.detailed_stats().by_stage[&Stage::Md5].retrying == 0 {
                break;
            }
            std::thread::sleep(Duration::from_millis(50));
            continue;
        }
        std::thread::scope(|scope| {
            for qi in &batch {
                scope.spawn(move || {
                    match fingerprint::fingerprint_file(&qi.file.path, qi.file.size, |_, _| {}) {
                        Ok(digest) => {
                            queue.mark_stage_success_with(Stage::Md5, &qi.file.path, |file| {
                                file.fingerprint = Some(digest);
                            });
                        }
                        Err(e) => {
                            log.line(format!("fingerprint failed for {}: {e}", qi.file.path.display()));
                            queue.retry(Stage::Md5, &qi.file.path, e.to_string());
                        }
                    }
                });
            }
        });
    }
}

/// One sealed package awaiting transport, paired with the queue items it
/// bundles (so a terminal transport outcome can be applied back to each).
struct PendingUpload<'a> {
    sealed: packager::SealedPackage,
    members: Vec<&'a FileItem>,
}

fn run_packaging_and_transport_stage(
    queue: &ProcessingQueue,
    config: &Config,
    transfer_concurrency: usize,
    log: &RunLog,
) -> (Vec<PathBuf>, Vec<TransportResult>) {
    let max_bytes = config
        .packaging_trigger
        .max_size_mb
        .map(|mb| mb * 1024 * 1024)
        .unwrap_or(config.transport.package_size_mb * 1024 * 1024);
    let max_files = config.packaging_trigger.max_files;

    let mut package_paths = Vec::new();
    let mut transport_results = Vec::new();
    let mut seq = 0u32;

    loop {
        let batch = queue.next_batch(Stage::Packaging, usize::MAX);
        if batch.is_empty() {
            break;
        }
        let files: Vec<_> = batch.iter().map(|qi| qi.file.clone()).collect();
        let groups = packager::group_by_size(&files, max_bytes, max_files);

        // Sealing stays sequential: package sequence numbers must be
        // monotonic within a run, and sealing is local disk I/O, not the
        // network operation the concurrency knob in spec §4.2 targets.
        let mut pending: Vec<PendingUpload> = Vec::new();
        for group in groups {
            match packager::seal_package(&group, &config.root_dir, &config.output_dir, seq) {
                Ok(sealed) => {
                    seq += 1;
                    log.line(format!(
                        "sealed package {} with {} members ({})",
                        sealed.local_path.display(),
                        sealed.member_count,
                        crate::util::human_bytes(sealed.total_size)
                    ));
                    package_paths.push(sealed.local_path.clone());
                    pending.push(PendingUpload { sealed, members: group });
                }
                Err(e) => {
                    log.line(format!("packaging failed: {e}"));
                    for item in &group {
                        queue.mark_failed(&item.path, e.to_string());
                    }
                }
            }
        }

        // A disabled transport is not a failure at the pipeline level: the
        // run still completes and reports, it just has nothing in the
        // transport summary and never opens a connection.
        if !config.transport.enabled {
            for upload in &pending {
                for item in &upload.members {
                    queue.mark_completed(&item.path);
                }
            }
            continue;
        }

        // `maxConcurrentTransfers` parallel upload workers, one transport
        // connection per worker per spec §5 ("not safe to share a single
        // adapter across workers") — pulled from a shared work queue the
        // same way `fingerprint::fingerprint_batch` distributes hashing work.
        let (work_tx, work_rx) = crossbeam_channel::unbounded::<usize>();
        for i in 0..pending.len() {
            work_tx.send(i).unwrap();
        }
        drop(work_tx);

        let results: Vec<Mutex<Option<TransportResult>>> =
            pending.iter().map(|_| Mutex::new(None)).collect();
        let workers = transfer_concurrency.max(1).min(pending.len().max(1));

        std::thread::scope(|scope| {
            for _ in 0..workers {
                let work_rx = work_rx.clone();
                let pending = &pending;
                let results = &results;
                scope.spawn(move || {
                    for idx in work_rx.iter() {
                        let sealed = &pending[idx].sealed;
                        let file_name = sealed
                            .local_path
                            .file_name()
                            .map(|n| n.to_string_lossy().to_string())
                            .unwrap_or_default();
                        let result =
                            transport::transfer_package(&config.transport, &sealed.local_path, &file_name);
                        *results[idx].lock().unwrap() = Some(result);
                    }
                });
            }
        });

        for (upload, result) in pending.into_iter().zip(results.into_iter()) {
            let result = result.into_inner().unwrap().expect("every pending upload gets a result");
            for item in &upload.members {
                if result.success {
                    queue.mark_completed(&item.path);
                } else {
                    queue.mark_failed(
                        &item.path,
                        result.error.clone().unwrap_or_else(|| "upload failed".to_string()),
                    );
                }
            }
            transport_results.push(result);
        }
    }

    (package_paths, transport_results)
}

fn write_json_sidecar(output_dir: &std::path::Path, summary: &RunSummary) -> anyhow::Result<()> {
    let path = output_dir.join("run_summary.json");
    let json = serde_json::to_string_pretty(summary)?;
    std::fs::write(path, json)?;
    Ok(())
}
