//! Recycling pool of headless Chromium instances. Instances are handed out
//! as opaque ids (`acquire`) and pages are created against that id
//! (`new_page`); `release` returns the instance to the pool, recycling it
//! once it has served too many pages, and a background watcher relaunches
//! any instance whose browser process disconnects unexpectedly.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chromiumoxide::browser::{Browser, BrowserConfigBuilder, HeadlessMode};
use chromiumoxide::page::Page;
use chromiumoxide_cdp::cdp::browser_protocol::network::ClearBrowserCookiesParams;
use futures::StreamExt;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::discovery::find_browser_executable;
use crate::profile::{create_unique_profile, BrowserProfile};
use crate::BrowserError;

const CHROMIUM_ARGS: &[&str] = &["--no-sandbox", "--disable-dev-shm-usage", "--disable-gpu"];

struct Instance {
    browser: Browser,
    handler: JoinHandle<()>,
    profile: BrowserProfile,
    pages_processed: u64,
    created_at: Instant,
}

#[derive(Debug, Clone, Copy)]
pub struct BrowserPoolStats {
    pub total: usize,
    pub available: usize,
    pub in_use: usize,
    pub pages_processed: u64,
    pub recycled_count: u64,
}

/// Shared state behind the pool. Held as `Arc<BrowserPool>` so the
/// crash-watcher background task and every caller of `acquire`/`release` can
/// reference the same instance table.
pub struct BrowserPool {
    page_limit: u64,
    launch_timeout: Duration,
    instances: Mutex<HashMap<Uuid, Instance>>,
    in_use: Mutex<std::collections::HashSet<Uuid>>,
    available_tx: mpsc::UnboundedSender<Uuid>,
    available_rx: Mutex<mpsc::UnboundedReceiver<Uuid>>,
    crash_tx: mpsc::UnboundedSender<Uuid>,
    recycled_count: AtomicU64,
    pages_processed_total: AtomicU64,
    shutting_down: AtomicBool,
}

impl BrowserPool {
    /// Launches `pool_size` browser instances and starts the crash-recovery
    /// watcher. `page_limit` is the number of pages an instance serves before
    /// it is torn down and replaced rather than reused.
    pub async fn initialize(
        pool_size: usize,
        page_limit: u64,
        launch_timeout: Duration,
    ) -> Result<Arc<Self>, BrowserError> {
        let (available_tx, available_rx) = mpsc::unbounded_channel();
        let (crash_tx, mut crash_rx) = mpsc::unbounded_channel();

        let pool = Arc::new(Self {
            page_limit,
            launch_timeout,
            instances: Mutex::new(HashMap::new()),
            in_use: Mutex::new(std::collections::HashSet::new()),
            available_tx,
            available_rx: Mutex::new(available_rx),
            crash_tx,
            recycled_count: AtomicU64::new(0),
            pages_processed_total: AtomicU64::new(0),
            shutting_down: AtomicBool::new(false),
        });

        for _ in 0..pool_size {
            let id = pool.launch_instance().await?;
            pool.available_tx
                .send(id)
                .map_err(|_| BrowserError::InstanceUnavailable("pool channel closed".into()))?;
        }

        let watcher_pool = Arc::clone(&pool);
        tokio::spawn(async move {
            while let Some(id) = crash_rx.recv().await {
                watcher_pool.handle_crash(id).await;
            }
        });

        tracing::info!(pool_size, page_limit, "browser pool initialized");
        Ok(pool)
    }

    async fn launch_instance(&self) -> Result<Uuid, BrowserError> {
        let chrome_path = find_browser_executable()?;
        let profile = create_unique_profile()?;

        let mut builder = BrowserConfigBuilder::default()
            .request_timeout(self.launch_timeout)
            .window_size(1920, 1080)
            .user_data_dir(profile.path().to_path_buf())
            .chrome_executable(chrome_path)
            .headless_mode(HeadlessMode::default());

        for arg in CHROMIUM_ARGS {
            builder = builder.arg(*arg);
        }

        let config = builder
            .build()
            .map_err(|err| BrowserError::Launch(err.to_string()))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|err| BrowserError::Launch(err.to_string()))?;

        let id = Uuid::new_v4();
        let crash_tx = self.crash_tx.clone();
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    tracing::warn!(error = %err, "browser handler event error");
                }
            }
            tracing::warn!(instance_id = %id, "browser handler stream ended, browser disconnected");
            let _ = crash_tx.send(id);
        });

        let mut instances = self.instances.lock().await;
        instances.insert(
            id,
            Instance {
                browser,
                handler,
                profile,
                pages_processed: 0,
                created_at: Instant::now(),
            },
        );

        Ok(id)
    }

    async fn handle_crash(&self, id: Uuid) {
        if self.shutting_down.load(Ordering::SeqCst) {
            return;
        }

        {
            let mut instances = self.instances.lock().await;
            instances.remove(&id);
        }
        self.in_use.lock().await.remove(&id);

        match self.launch_instance().await {
            Ok(new_id) => {
                tracing::info!(old = %id, new = %new_id, "replaced crashed browser instance");
                let _ = self.available_tx.send(new_id);
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to relaunch browser instance after crash");
            }
        }
    }

    /// Waits up to `timeout` for a free instance. Retries internally if the
    /// id handed back by the channel was meanwhile removed by crash recovery.
    pub async fn acquire(&self, timeout: Duration) -> Result<Uuid, BrowserError> {
        let deadline = Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(BrowserError::PoolExhausted);
            }

            let id = {
                let mut rx = self.available_rx.lock().await;
                tokio::time::timeout(remaining, rx.recv())
                    .await
                    .map_err(|_| BrowserError::PoolExhausted)?
                    .ok_or(BrowserError::PoolExhausted)?
            };

            if self.instances.lock().await.contains_key(&id) {
                self.in_use.lock().await.insert(id);
                return Ok(id);
            }
            // Stale id from a crashed instance already reaped; try again.
        }
    }

    /// Opens a new page against the acquired instance.
    pub async fn new_page(&self, id: Uuid, start_url: &str) -> Result<Page, BrowserError> {
        let instances = self.instances.lock().await;
        let instance = instances
            .get(&id)
            .ok_or_else(|| BrowserError::InstanceUnavailable(id.to_string()))?;
        instance
            .browser
            .new_page(start_url)
            .await
            .map_err(|err| BrowserError::InstanceUnavailable(err.to_string()))
    }

    /// Returns the instance to the pool, recycling it (tearing down and
    /// relaunching) once it has crossed the page limit.
    pub async fn release(&self, id: Uuid) {
        self.in_use.lock().await.remove(&id);
        self.pages_processed_total.fetch_add(1, Ordering::Relaxed);

        if self.shutting_down.load(Ordering::SeqCst) {
            self.close_instance(id).await;
            return;
        }

        let needs_recycling = {
            let mut instances = self.instances.lock().await;
            if let Some(instance) = instances.get_mut(&id) {
                instance.pages_processed += 1;
                instance.pages_processed >= self.page_limit
            } else {
                return;
            }
        };

        if needs_recycling {
            self.recycle_instance(id).await;
            return;
        }

        if self.clear_instance(id).await.is_err() {
            tracing::warn!(instance_id = %id, "failed to clear instance state, recycling instead of reusing");
            self.recycle_instance(id).await;
            return;
        }

        if self.available_tx.send(id).is_err() {
            tracing::warn!(instance_id = %id, "pool channel closed while releasing instance");
        }
    }

    /// Clears cookies and closes every open page on the instance before it
    /// goes back into the available pool. Any failure here is treated as
    /// the instance being compromised, so the caller recycles it instead.
    async fn clear_instance(&self, id: Uuid) -> Result<(), BrowserError> {
        let instances = self.instances.lock().await;
        let instance = instances
            .get(&id)
            .ok_or_else(|| BrowserError::InstanceUnavailable(id.to_string()))?;

        instance
            .browser
            .execute(ClearBrowserCookiesParams::default())
            .await
            .map_err(|err| BrowserError::Cdp(err.to_string()))?;

        let pages = instance
            .browser
            .pages()
            .await
            .map_err(|err| BrowserError::Cdp(err.to_string()))?;
        drop(instances);

        for page in pages {
            page.close()
                .await
                .map_err(|err| BrowserError::Cdp(err.to_string()))?;
        }

        Ok(())
    }

    async fn recycle_instance(&self, id: Uuid) {
        self.close_instance(id).await;
        self.recycled_count.fetch_add(1, Ordering::Relaxed);

        match self.launch_instance().await {
            Ok(new_id) => {
                if self.available_tx.send(new_id).is_err() {
                    tracing::warn!("pool channel closed while recycling instance");
                }
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to relaunch recycled browser instance");
            }
        }
    }

    async fn close_instance(&self, id: Uuid) {
        let instance = self.instances.lock().await.remove(&id);
        if let Some(mut instance) = instance {
            instance.handler.abort();
            if let Err(err) = instance.browser.close().await {
                tracing::warn!(instance_id = %id, error = %err, "error closing browser instance");
            }
            // profile directory cleans itself up on drop
        }
    }

    /// Signals shutdown, closes every tracked instance, and drains the
    /// available channel so no further acquires succeed.
    pub async fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);

        let ids: Vec<Uuid> = self.instances.lock().await.keys().copied().collect();
        for id in ids {
            self.close_instance(id).await;
        }

        let mut rx = self.available_rx.lock().await;
        while rx.try_recv().is_ok() {}

        tracing::info!("browser pool shut down");
    }

    pub async fn get_stats(&self) -> BrowserPoolStats {
        let instances = self.instances.lock().await;
        let in_use = self.in_use.lock().await;
        BrowserPoolStats {
            total: instances.len(),
            available: instances.len().saturating_sub(in_use.len()),
            in_use: in_use.len(),
            pages_processed: self.pages_processed_total.load(Ordering::Relaxed),
            recycled_count: self.recycled_count.load(Ordering::Relaxed),
        }
    }
}
