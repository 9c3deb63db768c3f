//! Batch fan-out, terminal-status derivation, and webhook triggering.
//!
//! Stores are mutated only from `create_job`, `cancel_job`, and
//! `update_task_result` (the queue's completion callback); workers never
//! touch them directly.

use std::collections::HashMap;
use std::sync::Arc;

use scraper_common::model::{BatchTarget, JobStatus, ScrapeJobState, ScrapeTaskState, TaskStatus};
use tokio::sync::Mutex;

use crate::queue::TaskQueue;
use crate::webhook::{JobSummary, WebhookDispatcher};

#[derive(Debug, thiserror::Error)]
pub enum JobServiceError {
    #[error("queue is full")]
    QueueFull,
    #[error("job not found")]
    JobNotFound,
    #[error("task not found")]
    TaskNotFound,
}

struct Store {
    jobs: HashMap<String, ScrapeJobState>,
    tasks: HashMap<String, ScrapeTaskState>,
}

pub struct JobService {
    queue: Arc<TaskQueue>,
    webhook: Arc<WebhookDispatcher>,
    store: Mutex<Store>,
}

impl JobService {
    pub fn new(queue: Arc<TaskQueue>, webhook: Arc<WebhookDispatcher>) -> Arc<Self> {
        Arc::new(Self {
            queue,
            webhook,
            store: Mutex::new(Store {
                jobs: HashMap::new(),
                tasks: HashMap::new(),
            }),
        })
    }

    /// Submits one standalone task (priority 0, no parent job) directly to
    /// the queue, tracked the same as a job task so `get_task` can find it.
    pub async fn submit_task(&self, task: ScrapeTaskState) -> Result<String, JobServiceError> {
        let task_id = task.id.clone();
        {
            let mut store = self.store.lock().await;
            store.tasks.insert(task_id.clone(), task.clone());
        }
        if self.queue.enqueue(task).await.is_err() {
            self.store.lock().await.tasks.remove(&task_id);
            return Err(JobServiceError::QueueFull);
        }
        Ok(task_id)
    }

    pub async fn get_task(&self, task_id: &str) -> Option<ScrapeTaskState> {
        self.store.lock().await.tasks.get(task_id).cloned()
    }

    /// Allocates a job id, constructs one task per target with the job id
    /// and a priority equal to the batch size, stores job and tasks, and
    /// enqueues all tasks atomically.
    pub async fn create_job(
        self: &Arc<Self>,
        targets: Vec<BatchTarget>,
        callback_url: Option<String>,
    ) -> Result<ScrapeJobState, JobServiceError> {
        let batch_size = targets.len() as i64;
        let tasks: Vec<ScrapeTaskState> = targets
            .into_iter()
            .map(|target| {
                // Job id is assigned below once the job itself is
                // constructed, since `ScrapeJobState::new` derives its id
                // from the task id list.
                ScrapeTaskState::new(
                    target.target_type,
                    target.target_url,
                    target.requested_fields,
                    target.workspace_id,
                    None,
                    batch_size,
                )
            })
            .collect();

        let task_ids: Vec<String> = tasks.iter().map(|t| t.id.clone()).collect();
        let job = ScrapeJobState::new(task_ids, callback_url);
        let tasks: Vec<ScrapeTaskState> = tasks
            .into_iter()
            .map(|mut task| {
                task.job_id = Some(job.id.clone());
                task
            })
            .collect();

        {
            let mut store = self.store.lock().await;
            store.jobs.insert(job.id.clone(), job.clone());
            for task in &tasks {
                store.tasks.insert(task.id.clone(), task.clone());
            }
        }

        if let Err(rejected) = self.queue.enqueue_batch(tasks).await {
            let mut store = self.store.lock().await;
            store.jobs.remove(&job.id);
            for task in &rejected {
                store.tasks.remove(&task.id);
            }
            return Err(JobServiceError::QueueFull);
        }

        Ok(job)
    }

    /// Invoked by the queue's completion callback for every task, standalone
    /// or job-bound. Updates the stored task, then (if the task has a
    /// parent job) advances the job's counters and, on reaching its
    /// terminal threshold, derives the final status and fires a webhook.
    pub async fn update_task_result(self: &Arc<Self>, task: ScrapeTaskState) {
        let job_id = task.job_id.clone();
        let task_id = task.id.clone();

        let terminal = {
            let mut store = self.store.lock().await;
            store.tasks.insert(task_id, task.clone());

            let Some(job_id) = &job_id else {
                return;
            };
            let Some(job) = store.jobs.get_mut(job_id) else {
                return;
            };

            if job.status.is_terminal() {
                // Cancelled job: outcomes still update counters but never
                // re-derive the terminal label.
                match task.status {
                    TaskStatus::Completed => job.completed_tasks += 1,
                    TaskStatus::Failed => job.failed_tasks += 1,
                    _ => {}
                }
                job.updated_at = chrono::Utc::now();
                return;
            }

            if job.status == JobStatus::Queued {
                job.status = JobStatus::Running;
            }

            match task.status {
                TaskStatus::Completed => job.completed_tasks += 1,
                TaskStatus::Failed => job.failed_tasks += 1,
                _ => {}
            }
            job.updated_at = chrono::Utc::now();

            if job.completed_tasks + job.failed_tasks >= job.total_tasks {
                job.status = if job.failed_tasks == 0 {
                    JobStatus::Completed
                } else if job.completed_tasks == 0 {
                    JobStatus::Failed
                } else {
                    JobStatus::PartiallyCompleted
                };
                Some(job.clone())
            } else {
                None
            }
        };

        if let Some(job) = terminal {
            self.fire_webhook(&job).await;
        }
    }

    /// Asks the queue to cancel queued tasks belonging to the job, sets the
    /// job status to `cancelled`, and fires a webhook. Already-running
    /// tasks continue; their outcomes still update counters via
    /// `update_task_result` but never override the `cancelled` label.
    pub async fn cancel_job(self: &Arc<Self>, job_id: &str) -> Result<ScrapeJobState, JobServiceError> {
        let already_terminal = {
            let mut store = self.store.lock().await;
            let job = store.jobs.get_mut(job_id).ok_or(JobServiceError::JobNotFound)?;
            if job.status.is_terminal() {
                true
            } else {
                job.status = JobStatus::Cancelled;
                job.updated_at = chrono::Utc::now();
                false
            }
        };

        if !already_terminal {
            self.queue.cancel_job_tasks(job_id).await;
        }

        let job = self
            .store
            .lock()
            .await
            .jobs
            .get(job_id)
            .cloned()
            .ok_or(JobServiceError::JobNotFound)?;

        if !already_terminal {
            self.fire_webhook(&job).await;
        }

        Ok(job)
    }

    pub async fn get_job(&self, job_id: &str) -> Option<ScrapeJobState> {
        self.store.lock().await.jobs.get(job_id).cloned()
    }

    /// Returns only tasks with status `completed` and a non-null result.
    pub async fn get_job_results(&self, job_id: &str) -> Option<Vec<ScrapeTaskState>> {
        let store = self.store.lock().await;
        let job = store.jobs.get(job_id)?;
        let results = job
            .task_ids
            .iter()
            .filter_map(|id| store.tasks.get(id))
            .filter(|task| task.status == TaskStatus::Completed && task.result.is_some())
            .cloned()
            .collect();
        Some(results)
    }

    async fn fire_webhook(&self, job: &ScrapeJobState) {
        let status = match job.status {
            JobStatus::Completed => "completed",
            JobStatus::PartiallyCompleted => "partially_completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Queued | JobStatus::Running => return,
        };

        let results = if job.total_tasks <= 100 {
            let store = self.store.lock().await;
            let values: Vec<serde_json::Value> = job
                .task_ids
                .iter()
                .filter_map(|id| store.tasks.get(id))
                .filter(|task| task.status == TaskStatus::Completed)
                .filter_map(|task| task.result.clone())
                .collect();
            Some(values)
        } else {
            None
        };

        let summary = JobSummary {
            total: job.total_tasks,
            completed: job.completed_tasks,
            failed: job.failed_tasks,
        };

        self.webhook
            .deliver(
                job.callback_url.as_deref(),
                &job.id,
                status,
                results.as_deref(),
                summary,
                job.total_tasks,
            )
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_status_is_completed_when_no_failures() {
        let mut job = ScrapeJobState::new(vec!["a".into(), "b".into()], None);
        job.completed_tasks = 2;
        job.failed_tasks = 0;
        let status = if job.failed_tasks == 0 {
            JobStatus::Completed
        } else if job.completed_tasks == 0 {
            JobStatus::Failed
        } else {
            JobStatus::PartiallyCompleted
        };
        assert_eq!(status, JobStatus::Completed);
    }

    #[test]
    fn terminal_status_is_partially_completed_when_mixed() {
        let completed = 1;
        let failed = 1;
        let status = if failed == 0 {
            JobStatus::Completed
        } else if completed == 0 {
            JobStatus::Failed
        } else {
            JobStatus::PartiallyCompleted
        };
        assert_eq!(status, JobStatus::PartiallyCompleted);
    }

    #[test]
    fn terminal_status_is_failed_when_all_fail() {
        let completed = 0;
        let failed = 3;
        let status = if failed == 0 {
            JobStatus::Completed
        } else if completed == 0 {
            JobStatus::Failed
        } else {
            JobStatus::PartiallyCompleted
        };
        assert_eq!(status, JobStatus::Failed);
    }
}
