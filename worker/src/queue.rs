//! Priority task queue and worker pool: a binary heap keyed by
//! `(priority, created_timestamp)`, bounded by a separate admission counter,
//! drained with strictly-ordered sentinels.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, gauge, histogram};
use scraper_common::model::{ScrapeTaskState, TaskStatus};
use tokio::sync::{watch, Mutex, Semaphore};
use tokio::task::JoinHandle;

use crate::executor::TaskExecutor;

/// Waits until `drain` publishes a deadline and that deadline elapses. Never
/// resolves for a queue that isn't draining.
async fn wait_for_drain_deadline(rx: &mut watch::Receiver<Option<Instant>>) {
    loop {
        let deadline = *rx.borrow();
        match deadline {
            Some(instant) => {
                tokio::time::sleep_until(instant.into()).await;
                return;
            }
            None => {
                if rx.changed().await.is_err() {
                    futures::future::pending::<()>().await;
                }
            }
        }
    }
}

enum Entry {
    Task(ScrapeTaskState),
    /// Carries a monotonic sequence number purely to give sentinels a
    /// stable relative order among themselves; it never affects ordering
    /// against real task entries, which always sort first.
    Sentinel(u64),
}

impl Entry {
    /// `(sentinel_rank, priority, created_at_nanos, seq)`. Sentinels always
    /// rank after every real task, satisfying the "sentinel compares false
    /// for `<` against any real entry" requirement without special-casing
    /// the comparator itself.
    fn sort_key(&self) -> (u8, i64, i64, u64) {
        match self {
            Entry::Task(task) => (
                0,
                task.priority,
                task.created_at.timestamp_nanos_opt().unwrap_or(i64::MAX),
                0,
            ),
            Entry::Sentinel(seq) => (1, i64::MAX, i64::MAX, *seq),
        }
    }
}

struct HeapItem(Entry);

impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.0.sort_key() == other.0.sort_key()
    }
}
impl Eq for HeapItem {}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapItem {
    /// Reversed so `BinaryHeap` (a max-heap) pops the smallest key first.
    fn cmp(&self, other: &Self) -> Ordering {
        other.0.sort_key().cmp(&self.0.sort_key())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct QueueStats {
    pub queue_depth: usize,
    pub active_workers: usize,
    pub completed_count: u64,
    pub avg_duration_ms: f64,
}

/// Bounded priority queue plus its worker pool. `on_complete` is invoked
/// exactly once per task, from whichever worker (or the cancellation scan)
/// finalizes it; the queue holds only that callback, never a back-pointer
/// into the job service.
pub struct TaskQueue {
    max_depth: usize,
    max_concurrency: usize,
    task_timeout: Duration,
    heap: Mutex<BinaryHeap<HeapItem>>,
    entry_available: Arc<Semaphore>,
    pending: AtomicUsize,
    draining: AtomicBool,
    cancelled_jobs: Mutex<std::collections::HashSet<String>>,
    completed_count: AtomicU64,
    active_workers: AtomicUsize,
    avg_duration_ms: Mutex<f64>,
    sentinel_seq: AtomicU64,
    executor: Arc<TaskExecutor>,
    on_complete: Arc<dyn Fn(ScrapeTaskState) + Send + Sync>,
    worker_handles: Mutex<Vec<JoinHandle<()>>>,
    /// Broadcasts the drain deadline to every worker so a straggler still
    /// mid-task can force-fail its own work instead of blocking shutdown.
    drain_deadline: watch::Sender<Option<Instant>>,
}

impl TaskQueue {
    pub fn new(
        max_depth: usize,
        max_concurrency: usize,
        task_timeout: Duration,
        executor: Arc<TaskExecutor>,
        on_complete: Arc<dyn Fn(ScrapeTaskState) + Send + Sync>,
    ) -> Arc<Self> {
        let (drain_deadline, _) = watch::channel(None);
        Arc::new(Self {
            max_depth,
            max_concurrency,
            task_timeout,
            heap: Mutex::new(BinaryHeap::new()),
            entry_available: Arc::new(Semaphore::new(0)),
            pending: AtomicUsize::new(0),
            draining: AtomicBool::new(false),
            cancelled_jobs: Mutex::new(std::collections::HashSet::new()),
            completed_count: AtomicU64::new(0),
            active_workers: AtomicUsize::new(0),
            avg_duration_ms: Mutex::new(0.0),
            sentinel_seq: AtomicU64::new(0),
            executor,
            on_complete,
            worker_handles: Mutex::new(Vec::new()),
            drain_deadline,
        })
    }

    /// Fails with `queue-full` if draining or at capacity; capacity is
    /// enforced by `pending`, a separate counter, because the heap's own
    /// length can momentarily disagree with it during a cancellation scan.
    pub async fn enqueue(self: &Arc<Self>, task: ScrapeTaskState) -> Result<(), ScrapeTaskState> {
        if self.draining.load(AtomicOrdering::SeqCst) {
            return Err(task);
        }
        if self.pending.load(AtomicOrdering::SeqCst) >= self.max_depth {
            return Err(task);
        }

        let depth = self.pending.fetch_add(1, AtomicOrdering::SeqCst) + 1;
        self.heap.lock().await.push(HeapItem(Entry::Task(task)));
        self.entry_available.add_permits(1);
        gauge!("scrape_queue_depth").set(depth as f64);
        Ok(())
    }

    /// Admits every task in `tasks` or none: capacity is checked against the
    /// full batch size up front.
    pub async fn enqueue_batch(
        self: &Arc<Self>,
        tasks: Vec<ScrapeTaskState>,
    ) -> Result<(), Vec<ScrapeTaskState>> {
        if self.draining.load(AtomicOrdering::SeqCst) {
            return Err(tasks);
        }
        let current = self.pending.load(AtomicOrdering::SeqCst);
        if current + tasks.len() > self.max_depth {
            return Err(tasks);
        }

        let depth = self
            .pending
            .fetch_add(tasks.len(), AtomicOrdering::SeqCst)
            + tasks.len();
        let mut heap = self.heap.lock().await;
        let count = tasks.len();
        for task in tasks {
            heap.push(HeapItem(Entry::Task(task)));
        }
        drop(heap);
        self.entry_available.add_permits(count);
        gauge!("scrape_queue_depth").set(depth as f64);
        Ok(())
    }

    /// Marks `job_id` cancelled, scans the heap for its queued tasks,
    /// removes them, marks each failed with `"Cancelled"`, and invokes the
    /// completion callback for each. Running tasks for the job are
    /// unaffected — they finish normally.
    pub async fn cancel_job_tasks(self: &Arc<Self>, job_id: &str) {
        self.cancelled_jobs.lock().await.insert(job_id.to_string());

        let mut heap = self.heap.lock().await;
        let drained: Vec<Entry> = std::mem::take(&mut *heap).into_vec().into_iter().map(|i| i.0).collect();

        let mut kept = Vec::with_capacity(drained.len());
        let mut cancelled = Vec::new();
        for entry in drained {
            match entry {
                Entry::Task(task) if task.job_id.as_deref() == Some(job_id) => {
                    cancelled.push(task);
                }
                other => kept.push(HeapItem(other)),
            }
        }
        *heap = BinaryHeap::from(kept);
        drop(heap);

        if !cancelled.is_empty() {
            let remaining = self
                .pending
                .fetch_sub(cancelled.len(), AtomicOrdering::SeqCst)
                - cancelled.len();
            gauge!("scrape_queue_depth").set(remaining as f64);
        }

        for mut task in cancelled {
            task.mark_failed("Cancelled");
            let labels = [("outcome", "cancelled")];
            counter!("scrape_tasks_finished_total", &labels).increment(1);
            (self.on_complete)(task);
        }
    }

    pub fn start_workers(self: &Arc<Self>) {
        let mut handles = Vec::with_capacity(self.max_concurrency);
        for _ in 0..self.max_concurrency {
            let queue = Arc::clone(self);
            handles.push(tokio::spawn(async move { queue.worker_loop().await }));
        }
        // Storing the handles is best-effort bookkeeping for `drain`;
        // overwriting any previous set is fine since `start_workers` is
        // only ever called once per queue lifetime.
        if let Ok(mut guard) = self.worker_handles.try_lock() {
            *guard = handles;
        }
    }

    async fn worker_loop(self: Arc<Self>) {
        let mut drain_rx = self.drain_deadline.subscribe();
        loop {
            let Ok(_permit) = self.entry_available.acquire().await else {
                return;
            };
            std::mem::forget(_permit);

            let entry = self.heap.lock().await.pop().map(|item| item.0);
            let Some(entry) = entry else { continue };

            let mut task = match entry {
                Entry::Sentinel(_) => return,
                Entry::Task(task) => task,
            };
            let depth = self.pending.fetch_sub(1, AtomicOrdering::SeqCst) - 1;
            gauge!("scrape_queue_depth").set(depth as f64);

            let active = self.active_workers.fetch_add(1, AtomicOrdering::SeqCst) + 1;
            gauge!("scrape_active_workers").set(active as f64);
            let start = Instant::now();

            let job_cancelled = match &task.job_id {
                Some(job_id) => self.cancelled_jobs.lock().await.contains(job_id),
                None => false,
            };

            if job_cancelled {
                task.mark_failed("Cancelled");
            } else {
                tokio::select! {
                    result = tokio::time::timeout(self.task_timeout, self.executor.execute(&mut task)) => {
                        if result.is_err() {
                            task.mark_failed("worker-level execution timeout exceeded");
                        }
                    }
                    _ = wait_for_drain_deadline(&mut drain_rx) => {
                        task.mark_failed("worker cancelled during drain");
                    }
                }
            }

            let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
            self.record_duration(elapsed_ms).await;
            self.completed_count.fetch_add(1, AtomicOrdering::SeqCst);
            let active = self.active_workers.fetch_sub(1, AtomicOrdering::SeqCst) - 1;
            gauge!("scrape_active_workers").set(active as f64);

            let outcome = if task.status == TaskStatus::Failed { "failed" } else { "completed" };
            let labels = [("outcome", outcome)];
            counter!("scrape_tasks_finished_total", &labels).increment(1);
            histogram!("scrape_task_duration_ms").record(elapsed_ms);

            (self.on_complete)(task);
        }
    }

    async fn record_duration(&self, sample_ms: f64) {
        let mut avg = self.avg_duration_ms.lock().await;
        let n = self.completed_count.load(AtomicOrdering::SeqCst) as f64;
        *avg = if n <= 0.0 {
            sample_ms
        } else {
            (*avg * n + sample_ms) / (n + 1.0)
        };
    }

    /// Stops admission, posts one sentinel per worker (sorting strictly
    /// after every real entry so queued work drains first), then waits up
    /// to `timeout` for workers to exit. Any worker still mid-task when
    /// `timeout` elapses has its deadline published via `drain_deadline`,
    /// which force-fails its in-flight task (and still runs `on_complete`)
    /// so `join_all` only ever waits for the resulting clean exit, never
    /// forever.
    pub async fn drain(self: &Arc<Self>, timeout: Duration) {
        self.draining.store(true, AtomicOrdering::SeqCst);

        {
            let mut heap = self.heap.lock().await;
            for _ in 0..self.max_concurrency {
                let seq = self.sentinel_seq.fetch_add(1, AtomicOrdering::SeqCst);
                heap.push(HeapItem(Entry::Sentinel(seq)));
            }
        }
        self.entry_available
            .add_permits(self.max_concurrency);

        let _ = self.drain_deadline.send(Some(Instant::now() + timeout));

        let handles = std::mem::take(&mut *self.worker_handles.lock().await);
        // A little slack past `timeout` so a straggler that just had its
        // task force-failed still gets to unwind and exit before we give up
        // on it entirely.
        let join_budget = timeout + Duration::from_secs(1);
        let joined = tokio::time::timeout(join_budget, futures::future::join_all(handles)).await;
        if joined.is_err() {
            tracing::warn!("graceful shutdown timed out, workers did not exit in time");
        }
    }

    pub async fn get_stats(&self) -> QueueStats {
        QueueStats {
            queue_depth: self.pending.load(AtomicOrdering::SeqCst),
            active_workers: self.active_workers.load(AtomicOrdering::SeqCst),
            completed_count: self.completed_count.load(AtomicOrdering::SeqCst),
            avg_duration_ms: *self.avg_duration_ms.lock().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_always_sorts_after_real_entries() {
        let task_entry = HeapItem(Entry::Task(ScrapeTaskState::new(
            scraper_common::model::TargetType::LinkedinProfile,
            "https://example.com".into(),
            None,
            "w1".into(),
            None,
            0,
        )));
        let sentinel = HeapItem(Entry::Sentinel(0));
        // In our reversed Ord, a "smaller" key pops first; the sentinel
        // must never be judged less than a real entry.
        assert_ne!(sentinel.cmp(&task_entry), Ordering::Less);
    }

    #[test]
    fn lower_priority_value_pops_before_higher_at_equal_timestamp() {
        let mut standalone = ScrapeTaskState::new(
            scraper_common::model::TargetType::LinkedinProfile,
            "https://a.com".into(),
            None,
            "w1".into(),
            None,
            0,
        );
        let mut batch = ScrapeTaskState::new(
            scraper_common::model::TargetType::LinkedinProfile,
            "https://b.com".into(),
            None,
            "w1".into(),
            Some("job1".into()),
            5,
        );
        batch.created_at = standalone.created_at;
        standalone.id = "a".into();
        batch.id = "b".into();

        let standalone_key = Entry::Task(standalone).sort_key();
        let batch_key = Entry::Task(batch).sort_key();
        assert!(standalone_key < batch_key);
    }
}
