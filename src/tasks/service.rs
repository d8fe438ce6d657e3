//! Crawl service: triggers, cancellation and the worker pool
//!
//! Triggers create a task record and hand the crawl to a worker spawned on
//! a `TaskTracker`; they return as soon as the task exists. A semaphore
//! bounds how many crawls run at once. Each worker refreshes its task's
//! heartbeat while it lives, so recovery only fails tasks nobody runs.

use crate::config::{Config, CrawlerConfig};
use crate::crawler::{traverser_from_config, Traverser};
use crate::state::TaskStatus;
use crate::storage::{
    shared, with_storage, CrawlStrategy, LinkRecord, LogLevel, LogRecord, NewWebsite,
    SharedStorage, SqliteStorage, StorageError, TaskRecord, TaskType, WebsiteRecord,
};
use crate::tasks::runner::{record_log, CrawlJob, TaskRunner};
use crate::tasks::signals::StopSignals;
use crate::url::validate_website_url;
use crate::HarvestError;
use chrono::Utc;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::MissedTickBehavior;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

/// Message stored on tasks left active by a previous process
const INTERRUPTED_MESSAGE: &str = "Interrupted: the process running this task stopped";

/// A user-initiated crawl
#[derive(Debug, Clone)]
pub struct ManualCrawlRequest {
    pub website_id: i64,
    pub strategy: CrawlStrategy,
    /// Overrides the website's depth
    pub depth: Option<u32>,
    /// Overrides the website's link ceiling
    pub max_links: Option<u32>,
}

/// A crawl fired by an external scheduler
#[derive(Debug, Clone)]
pub struct ScheduledCrawlRequest {
    pub schedule_id: String,
    pub website_id: i64,
    pub strategy: CrawlStrategy,
}

/// Fallbacks for websites registered without explicit limits
#[derive(Debug, Clone, Copy)]
struct CrawlDefaults {
    depth: u32,
    max_links: u32,
}

/// Heartbeat cadence and the age at which an active task counts as orphaned
#[derive(Debug, Clone, Copy)]
struct Liveness {
    heartbeat: Duration,
    stale_after: Duration,
}

enum CancelOutcome {
    Cancelled,
    NotFound,
    Rejected(TaskStatus),
}

/// Entry point for registering websites and running crawl tasks
#[derive(Clone)]
pub struct CrawlService {
    storage: SharedStorage,
    runner: TaskRunner,
    signals: StopSignals,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    defaults: CrawlDefaults,
    liveness: Liveness,
}

impl CrawlService {
    /// Creates a service over existing storage and a traverser
    pub fn new(storage: SharedStorage, traverser: Traverser, config: &CrawlerConfig) -> Self {
        Self {
            runner: TaskRunner::new(storage.clone(), traverser),
            storage,
            signals: StopSignals::new(),
            permits: Arc::new(Semaphore::new(config.max_concurrent_crawls as usize)),
            tracker: TaskTracker::new(),
            defaults: CrawlDefaults {
                depth: config.default_depth,
                max_links: config.default_max_links,
            },
            liveness: Liveness {
                heartbeat: Duration::from_secs(config.heartbeat_interval_secs.max(1)),
                stale_after: Duration::from_secs(config.stale_task_secs),
            },
        }
    }

    /// Opens the configured database and builds the HTTP stack
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlService)` - Ready to accept triggers
    /// * `Err(HarvestError)` - Database or HTTP client setup failed
    pub fn from_config(config: &Config) -> Result<Self, HarvestError> {
        let storage = SqliteStorage::new(Path::new(&config.storage.database_path))?;
        let traverser = traverser_from_config(config)?;
        Ok(Self::new(shared(storage), traverser, &config.crawler))
    }

    /// The storage handle the service writes through
    pub fn storage(&self) -> &SharedStorage {
        &self.storage
    }

    /// The stop-signal registry of this process
    pub fn signals(&self) -> &StopSignals {
        &self.signals
    }

    // ===== Websites =====

    /// Records a new crawl target
    ///
    /// # Arguments
    ///
    /// * `url` - Start URL; must be http(s) with a host
    /// * `crawl_depth` - Depth budget, or the configured default
    /// * `max_links` - Link ceiling, or the configured default
    ///
    /// # Returns
    ///
    /// * `Ok(i64)` - The new website's ID
    /// * `Err(HarvestError::WebsiteExists)` - The URL is already registered
    pub fn register_website(
        &self,
        url: &str,
        crawl_depth: Option<u32>,
        max_links: Option<u32>,
    ) -> Result<i64, HarvestError> {
        let (url, domain) = validate_website_url(url)?;
        let max_links = max_links.unwrap_or(self.defaults.max_links);
        if max_links == 0 {
            return Err(HarvestError::InvalidRequest(
                "max_links must be at least 1".to_string(),
            ));
        }

        let website = NewWebsite {
            url: url.to_string(),
            domain,
            crawl_depth: crawl_depth.unwrap_or(self.defaults.depth),
            max_links,
        };

        match with_storage(&self.storage, |s| s.insert_website(&website)) {
            Ok(id) => {
                info!("Registered website {} ({})", id, website.url);
                Ok(id)
            }
            Err(StorageError::ConstraintViolation(_)) => Err(HarvestError::WebsiteExists(website.url)),
            Err(e) => Err(e.into()),
        }
    }

    pub fn list_websites(&self) -> Result<Vec<WebsiteRecord>, HarvestError> {
        Ok(with_storage(&self.storage, |s| s.list_websites())?)
    }

    pub fn get_website(&self, website_id: i64) -> Result<WebsiteRecord, HarvestError> {
        with_storage(&self.storage, |s| s.find_website(website_id))?
            .ok_or(HarvestError::WebsiteNotFound(website_id))
    }

    // ===== Triggers =====

    /// Starts a manual crawl and returns the new task's ID immediately
    ///
    /// Depth and link ceiling come from the request, else from the website.
    ///
    /// # Returns
    ///
    /// * `Ok(i64)` - The task was created and its worker spawned
    /// * `Err(HarvestError::WebsiteNotFound)` - Unknown website
    /// * `Err(HarvestError::TaskAlreadyRunning)` - The website already has an active task
    /// * `Err(HarvestError::InvalidRequest)` - `max_links` of zero
    pub fn start_manual_crawl(&self, request: ManualCrawlRequest) -> Result<i64, HarvestError> {
        if request.max_links == Some(0) {
            return Err(HarvestError::InvalidRequest(
                "max_links must be at least 1".to_string(),
            ));
        }

        let website = self.get_website(request.website_id)?;

        if with_storage(&self.storage, |s| s.find_running_task(website.id))?.is_some() {
            return Err(HarvestError::TaskAlreadyRunning {
                website_id: website.id,
            });
        }

        let task_id = match with_storage(&self.storage, |s| {
            s.insert_task(website.id, request.strategy, TaskType::Manual)
        }) {
            Ok(id) => id,
            // Lost the race against another trigger for the same website
            Err(StorageError::ConstraintViolation(_)) => {
                return Err(HarvestError::TaskAlreadyRunning {
                    website_id: website.id,
                })
            }
            Err(e) => return Err(e.into()),
        };

        self.spawn(CrawlJob {
            task_id,
            website_id: website.id,
            strategy: request.strategy,
            depth: request.depth.unwrap_or(website.crawl_depth),
            max_links: request.max_links.unwrap_or(website.max_links),
        });

        Ok(task_id)
    }

    /// Runs a crawl on behalf of an external scheduler
    ///
    /// Skips (with a warning) when the website is gone or already has an
    /// active task.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(i64))` - The task that was started
    /// * `Ok(None)` - The run was skipped
    pub fn run_scheduled_crawl(
        &self,
        request: ScheduledCrawlRequest,
    ) -> Result<Option<i64>, HarvestError> {
        let Some(website) = with_storage(&self.storage, |s| s.find_website(request.website_id))?
        else {
            warn!(
                "Schedule {}: website {} not found, skipping",
                request.schedule_id, request.website_id
            );
            return Ok(None);
        };

        if let Some(running) = with_storage(&self.storage, |s| s.find_running_task(website.id))? {
            warn!(
                "Schedule {}: website {} already has task {} ({}), skipping",
                request.schedule_id, website.id, running.id, running.status
            );
            return Ok(None);
        }

        let task_id = match with_storage(&self.storage, |s| {
            s.insert_task(website.id, request.strategy, TaskType::Scheduled)
        }) {
            Ok(id) => id,
            Err(StorageError::ConstraintViolation(_)) => {
                warn!(
                    "Schedule {}: website {} gained an active task, skipping",
                    request.schedule_id, website.id
                );
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        info!(
            "Schedule {} started task {} for website {}",
            request.schedule_id, task_id, website.id
        );

        self.spawn(CrawlJob {
            task_id,
            website_id: website.id,
            strategy: request.strategy,
            depth: website.crawl_depth,
            max_links: website.max_links,
        });

        Ok(Some(task_id))
    }

    fn spawn(&self, job: CrawlJob) {
        let token = self.signals.register(job.task_id);
        let runner = self.runner.clone();
        let signals = self.signals.clone();
        let permits = self.permits.clone();
        let heartbeat = self.liveness.heartbeat;

        self.tracker.spawn(async move {
            // The heartbeat also covers the wait for a permit
            let work = async {
                let _permit = match permits.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        error!(task_id = job.task_id, "Worker pool closed: {}", e);
                        return None;
                    }
                };
                Some(runner.run(&job, &token).await)
            };
            tokio::pin!(work);

            let mut ticker = tokio::time::interval(heartbeat);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            let outcome = loop {
                tokio::select! {
                    outcome = &mut work => break outcome,
                    _ = ticker.tick() => runner.heartbeat(job.task_id, &token),
                }
            };

            match outcome {
                Some(Ok(statistics)) => info!(
                    task_id = job.task_id,
                    "Worker finished: {} links ({} new)",
                    statistics.total_links,
                    statistics.new_links
                ),
                Some(Err(e)) => error!(task_id = job.task_id, "Worker failed: {}", e),
                None => {}
            }

            signals.clear(job.task_id);
        });
    }

    // ===== Task control =====

    /// Force-cancels a running task
    ///
    /// The stop signal and the `cancelled` status are written under the
    /// storage lock, so no reader sees one without the other.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The task is now `cancelled`
    /// * `Err(HarvestError::TaskNotFound)` - Unknown task
    /// * `Err(HarvestError::InvalidTransition)` - The task is not `running`
    pub fn cancel_task(&self, task_id: i64) -> Result<(), HarvestError> {
        let outcome = with_storage(&self.storage, |s| {
            let Some(task) = s.get_task(task_id)? else {
                return Ok(CancelOutcome::NotFound);
            };
            if task.status != TaskStatus::Running {
                return Ok(CancelOutcome::Rejected(task.status));
            }

            self.signals.request_stop(task_id);
            if s.update_task_status(task_id, TaskStatus::Cancelled, None)? {
                Ok(CancelOutcome::Cancelled)
            } else {
                Ok(CancelOutcome::Rejected(task.status))
            }
        })?;

        match outcome {
            CancelOutcome::Cancelled => {
                record_log(
                    &self.storage,
                    task_id,
                    LogLevel::Warning,
                    "Cancellation requested",
                    json!({}),
                );
                Ok(())
            }
            CancelOutcome::NotFound => Err(HarvestError::TaskNotFound(task_id)),
            CancelOutcome::Rejected(from) => Err(HarvestError::InvalidTransition {
                from,
                to: TaskStatus::Cancelled,
            }),
        }
    }

    /// Deletes a finished task together with its logs
    pub fn delete_task(&self, task_id: i64) -> Result<(), HarvestError> {
        let status = with_storage(&self.storage, |s| {
            let Some(task) = s.get_task(task_id)? else {
                return Ok(None);
            };
            if !task.status.is_active() {
                s.delete_task(task_id)?;
            }
            Ok(Some(task.status))
        })?;

        match status {
            None => Err(HarvestError::TaskNotFound(task_id)),
            Some(status) if status.is_active() => Err(HarvestError::TaskActive(task_id)),
            Some(_) => {
                info!("Deleted task {}", task_id);
                Ok(())
            }
        }
    }

    /// Fails `pending`/`running` tasks whose worker stopped beating
    ///
    /// Tasks run by a live worker, in this or any other process sharing the
    /// database, keep a fresh heartbeat and are left alone.
    pub fn recover_interrupted_tasks(&self) -> Result<usize, HarvestError> {
        let stale_after = i64::try_from(self.liveness.stale_after.as_millis()).unwrap_or(i64::MAX);
        let stale_before = Utc::now().timestamp_millis().saturating_sub(stale_after);
        let count = with_storage(&self.storage, |s| {
            s.interrupt_stale_tasks(stale_before, INTERRUPTED_MESSAGE)
        })?;
        if count > 0 {
            warn!("Marked {} interrupted task(s) as failed", count);
        }
        Ok(count)
    }

    /// Waits for every spawned worker to finish
    pub async fn shutdown(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    // ===== Queries =====

    pub fn get_task(&self, task_id: i64) -> Result<TaskRecord, HarvestError> {
        with_storage(&self.storage, |s| s.get_task(task_id))?
            .ok_or(HarvestError::TaskNotFound(task_id))
    }

    pub fn list_tasks(&self, website_id: Option<i64>) -> Result<Vec<TaskRecord>, HarvestError> {
        Ok(with_storage(&self.storage, |s| s.list_tasks(website_id))?)
    }

    pub fn task_logs(
        &self,
        task_id: i64,
        level: Option<LogLevel>,
    ) -> Result<Vec<LogRecord>, HarvestError> {
        self.get_task(task_id)?;
        Ok(with_storage(&self.storage, |s| s.list_logs(task_id, level))?)
    }

    pub fn website_links(&self, website_id: i64) -> Result<Vec<LinkRecord>, HarvestError> {
        self.get_website(website_id)?;
        Ok(with_storage(&self.storage, |s| s.list_links(website_id))?)
    }
}
