//! Registry letting the synchronous `/scrape/sync` handler await a specific
//! task's completion without polling. The queue's single completion
//! callback notifies a waiter here in addition to updating the job service's
//! stores.

use std::collections::HashMap;

use scraper_common::model::ScrapeTaskState;
use tokio::sync::{oneshot, Mutex};

#[derive(Default)]
pub struct SyncWaiters {
    inner: Mutex<HashMap<String, oneshot::Sender<ScrapeTaskState>>>,
}

impl SyncWaiters {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, task_id: &str) -> oneshot::Receiver<ScrapeTaskState> {
        let (tx, rx) = oneshot::channel();
        self.inner.lock().await.insert(task_id.to_string(), tx);
        rx
    }

    /// Sends the completed task to its waiter, if any is still registered.
    /// A caller that already timed out and dropped its receiver is a no-op.
    pub async fn notify(&self, task: &ScrapeTaskState) {
        if let Some(tx) = self.inner.lock().await.remove(&task.id) {
            let _ = tx.send(task.clone());
        }
    }

    pub async fn cancel(&self, task_id: &str) {
        self.inner.lock().await.remove(task_id);
    }
}
