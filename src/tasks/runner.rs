//! Crawl task lifecycle
//!
//! `TaskRunner::run` drives one task from `pending` to a terminal status:
//! start, resolve the website, build the exclude set, traverse, persist the
//! discovered links, write statistics and finalize. Stop requests are
//! observed before traversal, after traversal and before every link write;
//! a task that reached any terminal status elsewhere counts as stopped.

use crate::crawler::{FetchOutcome, TraversalEntry, TraversalRequest, Traverser};
use crate::state::TaskStatus;
use crate::storage::{
    with_storage, CrawlStrategy, LinkUpsert, LogLevel, SharedStorage, StorageError,
    TaskStatistics,
};
use crate::url::extract_domain;
use crate::HarvestError;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

/// Everything a worker needs to run one task
#[derive(Debug, Clone)]
pub struct CrawlJob {
    pub task_id: i64,
    pub website_id: i64,
    pub strategy: CrawlStrategy,
    pub depth: u32,
    pub max_links: u32,
}

/// Writes a task event to tracing and to the task's persisted log
///
/// A failed append is traced and otherwise ignored.
pub(crate) fn record_log(
    storage: &SharedStorage,
    task_id: i64,
    level: LogLevel,
    message: &str,
    details: serde_json::Value,
) {
    match level {
        LogLevel::Info => info!(task_id, "{}", message),
        LogLevel::Warning => warn!(task_id, "{}", message),
        LogLevel::Error => error!(task_id, "{}", message),
    }

    if let Err(e) = with_storage(storage, |s| s.append_log(task_id, level, message, &details)) {
        warn!(task_id, "Failed to append task log: {}", e);
    }
}

/// Runs crawl tasks against shared storage
#[derive(Clone)]
pub struct TaskRunner {
    storage: SharedStorage,
    traverser: Arc<Traverser>,
}

/// How the persistence phase ended
enum Persisted {
    Finished(TaskStatistics),
    Stopped(TaskStatistics),
}

impl TaskRunner {
    pub fn new(storage: SharedStorage, traverser: Traverser) -> Self {
        Self {
            storage,
            traverser: Arc::new(traverser),
        }
    }

    /// Runs one task to completion
    ///
    /// Any error moves the task to `failed` (unless it already reached a
    /// terminal status, such as `cancelled`) and is returned to the caller.
    ///
    /// # Returns
    ///
    /// * `Ok(TaskStatistics)` - Statistics of the run; all zero if the task
    ///   was cancelled before any link was saved
    /// * `Err(HarvestError)` - The task failed
    pub async fn run(
        &self,
        job: &CrawlJob,
        token: &CancellationToken,
    ) -> Result<TaskStatistics, HarvestError> {
        match self.execute(job, token).await {
            Ok(statistics) => Ok(statistics),
            Err(e) => {
                self.fail(job, &e);
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        job: &CrawlJob,
        token: &CancellationToken,
    ) -> Result<TaskStatistics, HarvestError> {
        self.start(job)?;

        let website = with_storage(&self.storage, |s| s.find_website(job.website_id))?
            .ok_or(HarvestError::WebsiteNotFound(job.website_id))?;
        let start_url = Url::parse(&website.url)?;

        let exclude: HashSet<String> = match job.strategy {
            CrawlStrategy::Full => HashSet::new(),
            CrawlStrategy::Incremental => {
                with_storage(&self.storage, |s| s.find_link_urls(job.website_id))?
                    .into_iter()
                    .collect()
            }
        };
        debug!(
            task_id = job.task_id,
            "Excluding {} known URLs",
            exclude.len()
        );

        let entries = if self.stop_requested(job, token) {
            Vec::new()
        } else {
            self.traverser
                .traverse(
                    TraversalRequest {
                        start_url: &start_url,
                        max_depth: job.depth,
                        exclude: &exclude,
                        limit: job.max_links as usize,
                    },
                    token,
                )
                .await?
        };

        if self.stop_requested(job, token) {
            self.log(
                job.task_id,
                LogLevel::Info,
                "Crawl task stopped before saving links",
                json!({ "discovered": entries.len() }),
            );
            return Ok(TaskStatistics::default());
        }

        self.log(
            job.task_id,
            LogLevel::Info,
            "Traversal finished",
            json!({ "discovered": entries.len() }),
        );

        let statistics = match self.persist(job, &entries, token) {
            Persisted::Finished(statistics) => statistics,
            Persisted::Stopped(statistics) => {
                self.write_statistics(job, &statistics);
                self.log(
                    job.task_id,
                    LogLevel::Info,
                    "Crawl task stopped while saving links",
                    statistics_details(&statistics),
                );
                return Ok(statistics);
            }
        };

        self.write_statistics(job, &statistics);

        let completed = with_storage(&self.storage, |s| {
            s.update_task_status(job.task_id, TaskStatus::Completed, None)
        })?;

        if completed {
            self.log(
                job.task_id,
                LogLevel::Info,
                "Crawl task completed",
                statistics_details(&statistics),
            );
        } else {
            info!(
                task_id = job.task_id,
                "Task reached a terminal status before completion was recorded"
            );
        }

        Ok(statistics)
    }

    /// Moves the task from `pending` to `running`
    fn start(&self, job: &CrawlJob) -> Result<(), HarvestError> {
        let started = with_storage(&self.storage, |s| {
            s.update_task_status(job.task_id, TaskStatus::Running, None)
        })?;

        if !started {
            let current = with_storage(&self.storage, |s| s.get_task(job.task_id))?
                .map(|task| task.status)
                .ok_or(HarvestError::TaskNotFound(job.task_id))?;
            return Err(HarvestError::InvalidTransition {
                from: current,
                to: TaskStatus::Running,
            });
        }

        self.log(
            job.task_id,
            LogLevel::Info,
            "Crawl task started",
            json!({
                "website_id": job.website_id,
                "strategy": job.strategy.to_db_string(),
                "depth": job.depth,
                "max_links": job.max_links,
            }),
        );
        Ok(())
    }

    /// Saves up to `max_links` entries, stopping early on a stop request
    fn persist(
        &self,
        job: &CrawlJob,
        entries: &[TraversalEntry],
        token: &CancellationToken,
    ) -> Persisted {
        let mut statistics = TaskStatistics::default();

        for entry in entries.iter().take(job.max_links as usize) {
            if self.stop_requested(job, token) {
                return Persisted::Stopped(statistics);
            }

            let domain = Url::parse(&entry.url)
                .ok()
                .and_then(|url| extract_domain(&url))
                .unwrap_or_default();

            let link = LinkUpsert {
                website_id: job.website_id,
                task_id: job.task_id,
                url: entry.url.clone(),
                domain,
                link_type: entry.outcome.link_type(),
                status_code: entry.outcome.status_code(),
                content_type: entry.outcome.content_type().map(str::to_string),
            };

            match with_storage(&self.storage, |s| s.upsert_link(&link)) {
                Ok(is_new) => {
                    statistics.total_links += 1;
                    if entry.outcome.is_valid() {
                        statistics.valid_links += 1;
                    } else {
                        statistics.invalid_links += 1;
                    }
                    if matches!(entry.outcome, FetchOutcome::DownloadFailed { .. }) {
                        statistics.download_failed += 1;
                    }
                    if is_new {
                        statistics.new_links += 1;
                    }
                }
                Err(e) => self.log(
                    job.task_id,
                    LogLevel::Warning,
                    "Failed to save link",
                    json!({ "url": entry.url, "error": e.to_string() }),
                ),
            }
        }

        Persisted::Finished(statistics)
    }

    fn write_statistics(&self, job: &CrawlJob, statistics: &TaskStatistics) {
        if let Err(e) = with_storage(&self.storage, |s| {
            s.update_task_statistics(job.task_id, statistics)
        }) {
            self.log(
                job.task_id,
                LogLevel::Warning,
                "Failed to write task statistics",
                json!({ "error": e.to_string() }),
            );
        }
    }

    /// Refreshes the task's heartbeat
    ///
    /// Once the task is no longer active (cancelled or failed by another
    /// process, or deleted) the token is tripped so the traversal stops at
    /// its next check.
    pub fn heartbeat(&self, task_id: i64, token: &CancellationToken) {
        match with_storage(&self.storage, |s| s.touch_task(task_id)) {
            Ok(true) => {}
            Ok(false) => {
                if !token.is_cancelled() {
                    debug!(task_id, "Task no longer active, stopping its worker");
                    token.cancel();
                }
            }
            Err(e) => warn!(task_id, "Failed to refresh heartbeat: {}", e),
        }
    }

    /// Checks the in-process token, then the persisted status
    ///
    /// A terminal status written by anyone else (a cancel, or recovery in
    /// another process) trips the token so that later checks and the
    /// traversal see it too.
    fn stop_requested(&self, job: &CrawlJob, token: &CancellationToken) -> bool {
        if token.is_cancelled() {
            return true;
        }

        match with_storage(&self.storage, |s| s.get_task(job.task_id)) {
            Ok(Some(task)) if task.status.is_terminal() => {
                debug!(
                    task_id = job.task_id,
                    "Task is already {}, stopping", task.status
                );
                token.cancel();
                true
            }
            Ok(None) => {
                token.cancel();
                true
            }
            Ok(Some(_)) => false,
            Err(e) => {
                debug!(task_id = job.task_id, "Could not read task status: {}", e);
                false
            }
        }
    }

    fn fail(&self, job: &CrawlJob, err: &HarvestError) {
        let message = err.to_string();
        match with_storage(&self.storage, |s| {
            s.update_task_status(job.task_id, TaskStatus::Failed, Some(&message))
        }) {
            Ok(true) => self.log(
                job.task_id,
                LogLevel::Error,
                "Crawl task failed",
                json!({ "error": message }),
            ),
            Ok(false) => info!(
                task_id = job.task_id,
                "Task already terminal, not recording failure: {}", message
            ),
            Err(StorageError::TaskNotFound(_)) => {
                warn!(task_id = job.task_id, "Failed task no longer exists");
            }
            Err(e) => {
                warn!(task_id = job.task_id, "Could not mark task failed: {}", e);
                self.log(
                    job.task_id,
                    LogLevel::Error,
                    "Crawl task failed",
                    json!({ "error": message }),
                );
            }
        }
    }

    fn log(&self, task_id: i64, level: LogLevel, message: &str, details: serde_json::Value) {
        record_log(&self.storage, task_id, level, message, details);
    }
}

fn statistics_details(statistics: &TaskStatistics) -> serde_json::Value {
    json!({
        "total_links": statistics.total_links,
        "valid_links": statistics.valid_links,
        "invalid_links": statistics.invalid_links,
        "new_links": statistics.new_links,
        "download_failed": statistics.download_failed,
        "valid_rate": statistics.valid_rate(),
        "precision_rate": statistics.precision_rate(),
    })
}
