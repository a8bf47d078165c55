//! Exercises `packship::util::retry_operation` and the processing queue's
//! retry/backoff bookkeeping against a fake failing operation instead of a
//! real SSH server.

use std::sync::atomic::{AtomicUsize, Ordering};

use packship::model::{ItemStatus, Origin};
use packship::queue::ProcessingQueue;
use packship::util::{retry_operation, set_backoff_ms};

#[test]
fn retry_operation_retries_until_success_then_stops() {
    set_backoff_ms(0);
    let attempts = AtomicUsize::new(0);
    let result: anyhow::Result<&'static str> = retry_operation(5, |_| {
        let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if n < 4 { anyhow::bail!("simulated transient failure #{n}") } else { Ok("done") }
    });
    assert_eq!(result.unwrap(), "done");
    assert_eq!(attempts.load(Ordering::SeqCst), 4);
}

#[test]
fn retry_operation_surfaces_the_last_error_on_exhaustion() {
    set_backoff_ms(0);
    let result: anyhow::Result<()> =
        retry_operation(3, |attempt| anyhow::bail!("attempt {attempt} failed"));
    let err = result.unwrap_err();
    assert!(err.to_string().contains("attempt 2 failed"));
}

fn stub_item(path: &str) -> packship::model::FileItem {
    packship::model::FileItem {
        path: path.into(),
        name: path.to_string(),
        origin: Origin::Filesystem,
        nested_level: 0,
        nested_path: None,
        size: 10,
        created: None,
        modified: None,
        fingerprint: None,
    }
}

#[test]
fn queue_retry_deadline_moves_item_back_to_waiting_once_due() {
    let q = ProcessingQueue::new(5, 1);
    q.add(stub_item("a.docx"));
    q.process_matched();

    let batch = q.next_batch(packship::model::Stage::FileStability, 1);
    assert_eq!(batch.len(), 1);
    q.retry(packship::model::Stage::FileStability, &batch[0].file.path, "still writing");

    // Immediately after retry the item is not yet eligible for another attempt.
    assert_eq!(q.detailed_stats().by_stage[&packship::model::Stage::FileStability].waiting, 0);

    std::thread::sleep(std::time::Duration::from_millis(5));
    let promoted = q.promote_due_retries();
    assert_eq!(promoted, 1);
    assert_eq!(q.detailed_stats().by_stage[&packship::model::Stage::FileStability].waiting, 1);

    let batch2 = q.next_batch(packship::model::Stage::FileStability, 1);
    assert_eq!(batch2[0].status, ItemStatus::Processing);
    assert_eq!(batch2[0].attempts, 2);
}
