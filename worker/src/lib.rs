//! Task execution: the single-task pipeline, the priority queue and worker
//! pool that drive it, the batch job service built on top, the credential
//! backend client, and the outbound webhook dispatcher.

pub mod credential;
pub mod executor;
pub mod job_service;
pub mod queue;
pub mod webhook;

pub use credential::{CredentialClient, CredentialError};
pub use executor::TaskExecutor;
pub use job_service::{JobService, JobServiceError};
pub use queue::{QueueStats, TaskQueue};
pub use webhook::{JobSummary, WebhookDispatcher};
