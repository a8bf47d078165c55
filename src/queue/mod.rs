//! Multi-stage processing queue: `matched → fileStability → md5 → packaging
//! → transport`. A single mutex protects all stage buffers; the bound on
//! concurrency comes from how many workers the facade spawns against
//! `nextBatch`, not from locking granularity — the same trade-off the
//! teacher makes with its worker-context structs guarded by a shared state.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Duration as ChronoDuration, Utc};

use crate::model::{FileItem, ItemStatus, QueueItem, Stage};

#[derive(Debug, Default, Clone, Copy)]
pub struct StageCounts {
    pub waiting: usize,
    pub processing: usize,
    pub retrying: usize,
}

#[derive(Debug, Default, Clone)]
pub struct Stats {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub in_flight: usize,
}

#[derive(Debug, Default, Clone)]
pub struct DetailedStats {
    pub by_stage: HashMap<Stage, StageCounts>,
    pub completed: usize,
    pub failed: usize,
}

struct State {
    /// Intake for items that matched a rule but have not yet entered the
    /// staged pipeline.
    matched_intake: VecDeque<QueueItem>,
    /// Per-stage waiting buffers, FIFO.
    waiting: HashMap<Stage, VecDeque<QueueItem>>,
    /// Items currently handed out to a worker via `next_batch`.
    processing: HashMap<Stage, Vec<QueueItem>>,
    /// Items backed off after a failed attempt, keyed by their deadline.
    retrying: Vec<QueueItem>,
    completed: Vec<QueueItem>,
    failed: Vec<QueueItem>,
}

impl State {
    fn new() -> Self {
        let mut waiting = HashMap::new();
        let mut processing = HashMap::new();
        for stage in Stage::ORDER {
            waiting.insert(stage, VecDeque::new());
            processing.insert(stage, Vec::new());
        }
        Self {
            matched_intake: VecDeque::new(),
            waiting,
            processing,
            retrying: Vec::new(),
            completed: Vec::new(),
            failed: Vec::new(),
        }
    }
}

pub struct ProcessingQueue {
    state: Mutex<State>,
    max_retries: u32,
    retry_delay: ChronoDuration,
}

impl ProcessingQueue {
    pub fn new(max_retries: u32, retry_delay_ms: u64) -> Self {
        Self {
            state: Mutex::new(State::new()),
            max_retries,
            retry_delay: ChronoDuration::milliseconds(retry_delay_ms as i64),
        }
    }

    /// Place a freshly matched file into the intake buffer.
    pub fn add(&self, file: FileItem) {
        let mut st = self.state.lock().unwrap();
        st.matched_intake.push_back(QueueItem::new(file));
    }

    /// Drain the intake into `fileStability`'s waiting buffer.
    pub fn process_matched(&self) -> usize {
        let mut st = self.state.lock().unwrap();
        let mut moved = 0;
        while let Some(mut item) = st.matched_intake.pop_front() {
            item.stage = Stage::FileStability;
            item.status = ItemStatus::Waiting;
            st.waiting.get_mut(&Stage::FileStability).unwrap().push_back(item);
            moved += 1;
        }
        moved
    }

    /// Promote any retrying items whose deadline has passed back into their
    /// stage's waiting buffer (at the tail, preserving FIFO fairness).
    pub fn promote_due_retries(&self) -> usize {
        let mut st = self.state.lock().unwrap();
        let now = Utc::now();
        let mut due = Vec::new();
        let mut still_waiting = Vec::new();
        for item in st.retrying.drain(..) {
            if item.next_attempt_at.map(|t| t <= now).unwrap_or(true) {
                due.push(item);
            } else {
                still_waiting.push(item);
            }
        }
        st.retrying = still_waiting;
        let n = due.len();
        for mut item in due {
            item.status = ItemStatus::Waiting;
            let stage = item.stage;
            st.waiting.get_mut(&stage).unwrap().push_back(item);
        }
        n
    }

    /// Hand up to `n` waiting items from `stage` to the caller, marking them
    /// processing. The caller must eventually call `mark_stage_success`,
    /// `retry`, or `mark_failed` for every item it receives.
    pub fn next_batch(&self, stage: Stage, n: usize) -> Vec<QueueItem> {
        let mut st = self.state.lock().unwrap();
        let waiting = st.waiting.get_mut(&stage).unwrap();
        let mut batch = Vec::with_capacity(n);
        for _ in 0..n {
            let Some(mut item) = waiting.pop_front() else { break };
            item.status = ItemStatus::Processing;
            item.attempts += 1;
            item.last_attempt = Some(Utc::now());
            batch.push(item.clone());
            st.processing.get_mut(&stage).unwrap().push(item);
        }
        batch
    }

    fn take_processing(st: &mut State, stage: Stage, path: &std::path::Path) -> Option<QueueItem> {
        let bucket = st.processing.get_mut(&stage)?;
        let idx = bucket.iter().position(|qi| qi.file.path == path)?;
        Some(bucket.remove(idx))
    }

    /// The item finished `stage` successfully and should advance to the next
    /// stage (or be marked completed if `stage` was the last one).
    pub fn mark_stage_success(&self, stage: Stage, path: &std::path::Path) {
        self.mark_stage_success_with(stage, path, |_| {});
    }

    /// Like `mark_stage_success`, but applies `mutate` to the item's
    /// `FileItem` first — used by the md5 stage to attach the computed
    /// fingerprint before the item advances to packaging.
    pub fn mark_stage_success_with(
        &self,
        stage: Stage,
        path: &std::path::Path,
        mutate: impl FnOnce(&mut FileItem),
    ) {
        let mut st = self.state.lock().unwrap();
        let Some(mut item) = Self::take_processing(&mut st, stage, path) else { return };
        mutate(&mut item.file);
        match stage.next() {
            Some(next_stage) => {
                item.stage = next_stage;
                item.status = ItemStatus::Waiting;
                item.attempts = 0;
                st.waiting.get_mut(&next_stage).unwrap().push_back(item);
            }
            None => {
                item.status = ItemStatus::Completed;
                st.completed.push(item);
            }
        }
    }

    /// The item failed `stage`. Retries until `max_retries` is exhausted,
    /// after which it is moved to the terminal failed bucket.
    pub fn retry(&self, stage: Stage, path: &std::path::Path, reason: impl Into<String>) {
        let mut st = self.state.lock().unwrap();
        let Some(mut item) = Self::take_processing(&mut st, stage, path) else { return };
        item.failure_reason = Some(reason.into());
        if item.attempts >= self.max_retries {
            item.status = ItemStatus::Failed;
            st.failed.push(item);
        } else {
            item.status = ItemStatus::Retrying;
            item.next_attempt_at = Some(Utc::now() + self.retry_delay);
            st.retrying.push(item);
        }
    }

    pub fn mark_completed(&self, path: &std::path::Path) {
        let mut st = self.state.lock().unwrap();
        for stage in Stage::ORDER {
            if let Some(mut item) = Self::take_processing(&mut st, stage, path) {
                item.status = ItemStatus::Completed;
                st.completed.push(item);
                return;
            }
        }
    }

    pub fn mark_failed(&self, path: &std::path::Path, reason: impl Into<String>) {
        let mut st = self.state.lock().unwrap();
        for stage in Stage::ORDER {
            if let Some(mut item) = Self::take_processing(&mut st, stage, path) {
                item.status = ItemStatus::Failed;
                item.failure_reason = Some(reason.into());
                st.failed.push(item);
                return;
            }
        }
    }

    pub fn stats(&self) -> Stats {
        let st = self.state.lock().unwrap();
        let in_flight: usize = st.processing.values().map(|v| v.len()).sum::<usize>()
            + st.waiting.values().map(|v| v.len()).sum::<usize>()
            + st.retrying.len()
            + st.matched_intake.len();
        Stats {
            total: in_flight + st.completed.len() + st.failed.len(),
            completed: st.completed.len(),
            failed: st.failed.len(),
            in_flight,
        }
    }

    pub fn detailed_stats(&self) -> DetailedStats {
        let st = self.state.lock().unwrap();
        let mut by_stage = HashMap::new();
        for stage in Stage::ORDER {
            let waiting = st.waiting.get(&stage).map(|v| v.len()).unwrap_or(0);
            let processing = st.processing.get(&stage).map(|v| v.len()).unwrap_or(0);
            let retrying = st.retrying.iter().filter(|qi| qi.stage == stage).count();
            by_stage.insert(stage, StageCounts { waiting, processing, retrying });
        }
        DetailedStats { by_stage, completed: st.completed.len(), failed: st.failed.len() }
    }

    /// True iff every stage is empty and no retry deadlines remain pending.
    pub fn is_all_done(&self) -> bool {
        let st = self.state.lock().unwrap();
        st.matched_intake.is_empty()
            && st.retrying.is_empty()
            && st.waiting.values().all(|v| v.is_empty())
            && st.processing.values().all(|v| v.is_empty())
    }

    pub fn clear(&self) {
        let mut st = self.state.lock().unwrap();
        *st = State::new();
    }

    pub fn take_completed(&self) -> Vec<QueueItem> {
        let mut st = self.state.lock().unwrap();
        std::mem::take(&mut st.completed)
    }

    pub fn take_failed(&self) -> Vec<QueueItem> {
        let mut st = self.state.lock().unwrap();
        std::mem::take(&mut st.failed)
    }

    pub fn next_retry_deadline(&self) -> Option<DateTime<Utc>> {
        let st = self.state.lock().unwrap();
        st.retrying.iter().filter_map(|qi| qi.next_attempt_at).min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Origin;
    use std::path::PathBuf;

    fn item(name: &str) -> FileItem {
        FileItem {
            path: PathBuf::from(name),
            name: name.to_string(),
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
    fn happy_path_advances_through_every_stage() {
        let q = ProcessingQueue::new(3, 0);
        q.add(item("a.docx"));
        assert_eq!(q.process_matched(), 1);

        for stage in Stage::ORDER {
            let batch = q.next_batch(stage, 10);
            assert_eq!(batch.len(), 1, "stage {stage:?} should have one waiting item");
            q.mark_stage_success(stage, &batch[0].file.path);
        }

        assert!(q.is_all_done());
        assert_eq!(q.stats().completed, 1);
    }

    #[test]
    fn retry_exhaustion_moves_to_failed() {
        // max_retries=2: the item's `attempts` counter reaches 2 on the
        // second next_batch/retry cycle, and `retry()` moves it straight to
        // `failed` right there — there is no third waiting attempt to pull.
        let q = ProcessingQueue::new(2, 0);
        q.add(item("b.docx"));
        q.process_matched();

        for i in 0..2 {
            let batch = q.next_batch(Stage::FileStability, 1);
            assert_eq!(batch.len(), 1, "expected a waiting item on attempt {i}");
            q.retry(Stage::FileStability, &batch[0].file.path, "not stable yet");
            q.promote_due_retries();
        }

        assert_eq!(q.stats().failed, 1);
        assert!(q.is_all_done());
    }

    #[test]
    fn detailed_stats_reports_by_stage() {
        let q = ProcessingQueue::new(3, 0);
        q.add(item("c.docx"));
        q.process_matched();
        let stats = q.detailed_stats();
        assert_eq!(stats.by_stage[&Stage::FileStability].waiting, 1);
        assert_eq!(stats.by_stage[&Stage::Md5].waiting, 0);
    }
}
