use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Closed enumeration naming a supported page kind. Each value maps to
/// exactly one extractor and one output schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    LinkedinProfile,
    CompanyWebsite,
    JobPosting,
}

impl TargetType {
    /// Credential provider derived from the target type: everything before
    /// the first underscore in its wire name.
    pub fn credential_provider(&self) -> &'static str {
        match self {
            TargetType::LinkedinProfile => "linkedin",
            TargetType::CompanyWebsite => "company",
            TargetType::JobPosting => "job",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    PartiallyCompleted,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed
                | JobStatus::PartiallyCompleted
                | JobStatus::Failed
                | JobStatus::Cancelled
        )
    }
}

/// A single scraping unit.
///
/// Invariants: a task in `Completed` has a non-null result and a null error;
/// a task in `Failed` has a non-null error; `started_at` is set iff status is
/// not `Queued`; `completed_at` is set iff status is `Completed` or `Failed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeTaskState {
    pub id: String,
    pub job_id: Option<String>,
    pub target_type: TargetType,
    pub target_url: String,
    pub requested_fields: Option<Vec<String>>,
    pub workspace_id: String,
    pub status: TaskStatus,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Priority key used by the queue: 0 for standalone tasks, job size for
    /// tasks belonging to a batch.
    pub priority: i64,
}

impl ScrapeTaskState {
    pub fn new(
        target_type: TargetType,
        target_url: String,
        requested_fields: Option<Vec<String>>,
        workspace_id: String,
        job_id: Option<String>,
        priority: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            job_id,
            target_type,
            target_url,
            requested_fields,
            workspace_id,
            status: TaskStatus::Queued,
            result: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            priority,
        }
    }

    pub fn mark_running(&mut self) {
        self.status = TaskStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn mark_completed(&mut self, result: Value) {
        self.status = TaskStatus::Completed;
        self.result = Some(result);
        self.error = None;
        self.completed_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = TaskStatus::Failed;
        self.error = Some(error.into());
        self.completed_at = Some(Utc::now());
    }
}

/// A batch of tasks submitted together.
///
/// Invariant: `completed_tasks + failed_tasks <= total_tasks`; status
/// transitions monotonically toward a terminal state; once terminal, counters
/// are frozen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeJobState {
    pub id: String,
    pub task_ids: Vec<String>,
    pub status: JobStatus,
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    pub callback_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScrapeJobState {
    pub fn new(task_ids: Vec<String>, callback_url: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            total_tasks: task_ids.len(),
            task_ids,
            status: JobStatus::Queued,
            completed_tasks: 0,
            failed_tasks: 0,
            callback_url,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A single target within a batch-scrape request body.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchTarget {
    pub target_type: TargetType,
    pub target_url: String,
    pub requested_fields: Option<Vec<String>>,
    pub workspace_id: String,
}

/// Normalized location fields, shared across every target-type schema.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NormalizedLocation {
    pub city: Option<String>,
    pub state_region: Option<String>,
    pub country: Option<String>,
    pub raw: String,
}

pub type RawFields = HashMap<String, Value>;
