//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::state::TaskStatus;
use crate::storage::{
    CrawlStrategy, LinkRecord, LinkUpsert, LogLevel, LogRecord, NewWebsite, TaskRecord,
    TaskStatistics, TaskType, WebsiteRecord,
};
use thiserror::Error;

/// Errors that can occur during storage operations
///
/// Lookups that may legitimately miss return `Ok(None)`; the `*NotFound`
/// variants are raised by writes aimed at a record that does not exist.
/// Everything else is a transport failure.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Website not found: {0}")]
    WebsiteNotFound(i64),

    #[error("Task not found: {0}")]
    TaskNotFound(i64),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Storage lock poisoned")]
    Poisoned,

    #[error("SQLite error: {0}")]
    Sqlite(rusqlite::Error),
}

impl StorageError {
    /// Returns true for "not found" outcomes, false for transport failures
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::WebsiteNotFound(_) | Self::TaskNotFound(_))
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(ref failure, ref message)
                if failure.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Self::ConstraintViolation(
                    message.clone().unwrap_or_else(|| failure.to_string()),
                )
            }
            other => Self::Sqlite(other),
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// This is the contract the crawl core reads and writes through. Every
/// method is a single atomic operation against the backend; callers never
/// need cross-call transactions.
pub trait Storage {
    // ===== Websites =====

    /// Inserts a website; a duplicate URL yields `ConstraintViolation`
    fn insert_website(&mut self, website: &NewWebsite) -> StorageResult<i64>;

    /// Gets a website by ID
    fn find_website(&self, website_id: i64) -> StorageResult<Option<WebsiteRecord>>;

    /// Lists all websites ordered by ID
    fn list_websites(&self) -> StorageResult<Vec<WebsiteRecord>>;

    // ===== Tasks =====

    /// Creates a `pending` task for a website
    ///
    /// Fails with `ConstraintViolation` if the website already has a
    /// `pending` or `running` task, which makes the one-active-task rule
    /// atomic even when two triggers race.
    fn insert_task(
        &mut self,
        website_id: i64,
        strategy: CrawlStrategy,
        task_type: TaskType,
    ) -> StorageResult<i64>;

    /// Gets a task by ID
    fn get_task(&self, task_id: i64) -> StorageResult<Option<TaskRecord>>;

    /// Gets the task occupying the website's active slot (`pending` or `running`)
    fn find_running_task(&self, website_id: i64) -> StorageResult<Option<TaskRecord>>;

    /// Lists tasks, newest first, optionally restricted to one website
    fn list_tasks(&self, website_id: Option<i64>) -> StorageResult<Vec<TaskRecord>>;

    /// Moves a task to `status` if the state machine allows it
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The status was written
    /// * `Ok(false)` - The current status may not move to `status`; nothing was written
    /// * `Err(StorageError::TaskNotFound)` - No such task
    fn update_task_status(
        &mut self,
        task_id: i64,
        status: TaskStatus,
        error_message: Option<&str>,
    ) -> StorageResult<bool>;

    /// Writes aggregate statistics onto a task
    fn update_task_statistics(
        &mut self,
        task_id: i64,
        statistics: &TaskStatistics,
    ) -> StorageResult<()>;

    /// Refreshes the heartbeat of a `pending`/`running` task
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The task is still active and its heartbeat was written
    /// * `Ok(false)` - The task is missing or already terminal
    fn touch_task(&mut self, task_id: i64) -> StorageResult<bool>;

    /// Fails `pending`/`running` tasks whose heartbeat is older than
    /// `stale_before` (Unix milliseconds), returning how many were touched
    ///
    /// Tasks with a live worker in any process keep beating and are left alone.
    fn interrupt_stale_tasks(&mut self, stale_before: i64, message: &str)
        -> StorageResult<usize>;

    /// Deletes a task and its logs
    fn delete_task(&mut self, task_id: i64) -> StorageResult<()>;

    // ===== Links =====

    /// Gets every URL recorded for a website
    fn find_link_urls(&self, website_id: i64) -> StorageResult<Vec<String>>;

    /// Inserts a link or refreshes the existing `(website_id, url)` record
    ///
    /// A refresh increments `crawl_count` and updates `last_crawled_at`,
    /// the owning task and the latest classification; `first_crawled_at`
    /// is never changed.
    ///
    /// # Returns
    ///
    /// `true` if the link was newly inserted
    fn upsert_link(&mut self, link: &LinkUpsert) -> StorageResult<bool>;

    /// Gets one link by website and URL
    fn get_link(&self, website_id: i64, url: &str) -> StorageResult<Option<LinkRecord>>;

    /// Lists all links of a website ordered by URL
    fn list_links(&self, website_id: i64) -> StorageResult<Vec<LinkRecord>>;

    /// Counts the links of a website
    fn count_links(&self, website_id: i64) -> StorageResult<u64>;

    // ===== Logs =====

    /// Appends a log entry to a task
    fn append_log(
        &mut self,
        task_id: i64,
        level: LogLevel,
        message: &str,
        details: &serde_json::Value,
    ) -> StorageResult<()>;

    /// Lists a task's log entries in insertion order, optionally by level
    fn list_logs(&self, task_id: i64, level: Option<LogLevel>) -> StorageResult<Vec<LogRecord>>;
}
