//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::state::TaskStatus;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{
    CrawlStrategy, LinkRecord, LinkType, LinkUpsert, LogLevel, LogRecord, NewWebsite, TaskRecord,
    TaskStatistics, TaskType, WebsiteRecord, WebsiteStatus,
};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::time::Duration;

const WEBSITE_COLUMNS: &str = "id, url, domain, crawl_depth, max_links, status, created_at";

const TASK_COLUMNS: &str = "id, website_id, strategy, task_type, status, total_links, valid_links,
     invalid_links, new_links, download_failed, started_at, finished_at, error_message";

const LINK_COLUMNS: &str = "id, website_id, task_id, url, domain, link_type, status_code,
     content_type, crawl_count, first_crawled_at, last_crawled_at";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        // Other crawl processes may hold the write lock briefly
        conn.busy_timeout(Duration::from_secs(5))?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn current_status(&self, task_id: i64) -> StorageResult<TaskStatus> {
        let status: Option<String> = self
            .conn
            .query_row(
                "SELECT status FROM crawl_tasks WHERE id = ?1",
                params![task_id],
                |row| row.get(0),
            )
            .optional()?;

        status
            .as_deref()
            .and_then(TaskStatus::from_db_string)
            .ok_or(StorageError::TaskNotFound(task_id))
    }
}

fn website_from_row(row: &Row<'_>) -> rusqlite::Result<WebsiteRecord> {
    Ok(WebsiteRecord {
        id: row.get(0)?,
        url: row.get(1)?,
        domain: row.get(2)?,
        crawl_depth: row.get(3)?,
        max_links: row.get(4)?,
        status: WebsiteStatus::from_db_string(&row.get::<_, String>(5)?)
            .unwrap_or(WebsiteStatus::Inactive),
        created_at: row.get(6)?,
    })
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<TaskRecord> {
    Ok(TaskRecord {
        id: row.get(0)?,
        website_id: row.get(1)?,
        strategy: CrawlStrategy::from_db_string(&row.get::<_, String>(2)?)
            .unwrap_or(CrawlStrategy::Incremental),
        task_type: TaskType::from_db_string(&row.get::<_, String>(3)?)
            .unwrap_or(TaskType::Manual),
        status: TaskStatus::from_db_string(&row.get::<_, String>(4)?)
            .unwrap_or(TaskStatus::Failed),
        statistics: TaskStatistics {
            total_links: row.get::<_, i64>(5)? as u64,
            valid_links: row.get::<_, i64>(6)? as u64,
            invalid_links: row.get::<_, i64>(7)? as u64,
            new_links: row.get::<_, i64>(8)? as u64,
            download_failed: row.get::<_, i64>(9)? as u64,
        },
        started_at: row.get(10)?,
        finished_at: row.get(11)?,
        error_message: row.get(12)?,
    })
}

fn link_from_row(row: &Row<'_>) -> rusqlite::Result<LinkRecord> {
    Ok(LinkRecord {
        id: row.get(0)?,
        website_id: row.get(1)?,
        task_id: row.get(2)?,
        url: row.get(3)?,
        domain: row.get(4)?,
        link_type: LinkType::from_db_string(&row.get::<_, String>(5)?)
            .unwrap_or(LinkType::Invalid),
        status_code: row.get(6)?,
        content_type: row.get(7)?,
        crawl_count: row.get(8)?,
        first_crawled_at: row.get(9)?,
        last_crawled_at: row.get(10)?,
    })
}

impl Storage for SqliteStorage {
    // ===== Websites =====

    fn insert_website(&mut self, website: &NewWebsite) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO websites (url, domain, crawl_depth, max_links, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                website.url,
                website.domain,
                website.crawl_depth,
                website.max_links,
                WebsiteStatus::Active.to_db_string(),
                now
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn find_website(&self, website_id: i64) -> StorageResult<Option<WebsiteRecord>> {
        let sql = format!("SELECT {} FROM websites WHERE id = ?1", WEBSITE_COLUMNS);
        let website = self
            .conn
            .query_row(&sql, params![website_id], website_from_row)
            .optional()?;
        Ok(website)
    }

    fn list_websites(&self) -> StorageResult<Vec<WebsiteRecord>> {
        let sql = format!("SELECT {} FROM websites ORDER BY id", WEBSITE_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let websites = stmt
            .query_map([], website_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(websites)
    }

    // ===== Tasks =====

    fn insert_task(
        &mut self,
        website_id: i64,
        strategy: CrawlStrategy,
        task_type: TaskType,
    ) -> StorageResult<i64> {
        let now = Utc::now();
        self.conn.execute(
            "INSERT INTO crawl_tasks (website_id, strategy, task_type, status, started_at, heartbeat_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                website_id,
                strategy.to_db_string(),
                task_type.to_db_string(),
                TaskStatus::Pending.to_db_string(),
                now.to_rfc3339(),
                now.timestamp_millis()
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_task(&self, task_id: i64) -> StorageResult<Option<TaskRecord>> {
        let sql = format!("SELECT {} FROM crawl_tasks WHERE id = ?1", TASK_COLUMNS);
        let task = self
            .conn
            .query_row(&sql, params![task_id], task_from_row)
            .optional()?;
        Ok(task)
    }

    fn find_running_task(&self, website_id: i64) -> StorageResult<Option<TaskRecord>> {
        let sql = format!(
            "SELECT {} FROM crawl_tasks
             WHERE website_id = ?1 AND status IN ('pending', 'running')
             ORDER BY id DESC LIMIT 1",
            TASK_COLUMNS
        );
        let task = self
            .conn
            .query_row(&sql, params![website_id], task_from_row)
            .optional()?;
        Ok(task)
    }

    fn list_tasks(&self, website_id: Option<i64>) -> StorageResult<Vec<TaskRecord>> {
        let sql = format!(
            "SELECT {} FROM crawl_tasks
             WHERE ?1 IS NULL OR website_id = ?1
             ORDER BY id DESC",
            TASK_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let tasks = stmt
            .query_map(params![website_id], task_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tasks)
    }

    fn update_task_status(
        &mut self,
        task_id: i64,
        status: TaskStatus,
        error_message: Option<&str>,
    ) -> StorageResult<bool> {
        let current = self.current_status(task_id)?;
        if !current.can_transition_to(status) {
            return Ok(false);
        }

        let finished_at = status.is_terminal().then(|| Utc::now().to_rfc3339());

        // Compare-and-set against the status we just validated
        let updated = self.conn.execute(
            "UPDATE crawl_tasks
             SET status = ?1,
                 finished_at = COALESCE(?2, finished_at),
                 error_message = COALESCE(?3, error_message)
             WHERE id = ?4 AND status = ?5",
            params![
                status.to_db_string(),
                finished_at,
                error_message,
                task_id,
                current.to_db_string()
            ],
        )?;

        Ok(updated == 1)
    }

    fn update_task_statistics(
        &mut self,
        task_id: i64,
        statistics: &TaskStatistics,
    ) -> StorageResult<()> {
        let updated = self.conn.execute(
            "UPDATE crawl_tasks
             SET total_links = ?1, valid_links = ?2, invalid_links = ?3, new_links = ?4,
                 download_failed = ?5
             WHERE id = ?6",
            params![
                statistics.total_links as i64,
                statistics.valid_links as i64,
                statistics.invalid_links as i64,
                statistics.new_links as i64,
                statistics.download_failed as i64,
                task_id
            ],
        )?;

        if updated == 0 {
            return Err(StorageError::TaskNotFound(task_id));
        }
        Ok(())
    }

    fn touch_task(&mut self, task_id: i64) -> StorageResult<bool> {
        let updated = self.conn.execute(
            "UPDATE crawl_tasks SET heartbeat_at = ?1
             WHERE id = ?2 AND status IN ('pending', 'running')",
            params![Utc::now().timestamp_millis(), task_id],
        )?;
        Ok(updated > 0)
    }

    fn interrupt_stale_tasks(&mut self, stale_before: i64, message: &str) -> StorageResult<usize> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE crawl_tasks
             SET status = ?1, finished_at = ?2, error_message = ?3
             WHERE status IN ('pending', 'running') AND heartbeat_at < ?4",
            params![TaskStatus::Failed.to_db_string(), now, message, stale_before],
        )?;
        Ok(updated)
    }

    fn delete_task(&mut self, task_id: i64) -> StorageResult<()> {
        // Logs go with the task through ON DELETE CASCADE
        let deleted = self
            .conn
            .execute("DELETE FROM crawl_tasks WHERE id = ?1", params![task_id])?;

        if deleted == 0 {
            return Err(StorageError::TaskNotFound(task_id));
        }
        Ok(())
    }

    // ===== Links =====

    fn find_link_urls(&self, website_id: i64) -> StorageResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT url FROM crawled_links WHERE website_id = ?1")?;
        let urls = stmt
            .query_map(params![website_id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(urls)
    }

    fn upsert_link(&mut self, link: &LinkUpsert) -> StorageResult<bool> {
        let now = Utc::now().to_rfc3339();
        let crawl_count: i64 = self.conn.query_row(
            "INSERT INTO crawled_links (website_id, task_id, url, domain, link_type, status_code,
                                        content_type, crawl_count, first_crawled_at, last_crawled_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8, ?8)
             ON CONFLICT(website_id, url) DO UPDATE SET
                 task_id = excluded.task_id,
                 link_type = excluded.link_type,
                 status_code = excluded.status_code,
                 content_type = excluded.content_type,
                 crawl_count = crawled_links.crawl_count + 1,
                 last_crawled_at = excluded.last_crawled_at
             RETURNING crawl_count",
            params![
                link.website_id,
                link.task_id,
                link.url,
                link.domain,
                link.link_type.to_db_string(),
                link.status_code,
                link.content_type,
                now
            ],
            |row| row.get(0),
        )?;
        Ok(crawl_count == 1)
    }

    fn get_link(&self, website_id: i64, url: &str) -> StorageResult<Option<LinkRecord>> {
        let sql = format!(
            "SELECT {} FROM crawled_links WHERE website_id = ?1 AND url = ?2",
            LINK_COLUMNS
        );
        let link = self
            .conn
            .query_row(&sql, params![website_id, url], link_from_row)
            .optional()?;
        Ok(link)
    }

    fn list_links(&self, website_id: i64) -> StorageResult<Vec<LinkRecord>> {
        let sql = format!(
            "SELECT {} FROM crawled_links WHERE website_id = ?1 ORDER BY url",
            LINK_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let links = stmt
            .query_map(params![website_id], link_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(links)
    }

    fn count_links(&self, website_id: i64) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM crawled_links WHERE website_id = ?1",
            params![website_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    // ===== Logs =====

    fn append_log(
        &mut self,
        task_id: i64,
        level: LogLevel,
        message: &str,
        details: &serde_json::Value,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let details = serde_json::to_string(details)?;
        self.conn.execute(
            "INSERT INTO crawl_logs (task_id, level, message, details, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![task_id, level.to_db_string(), message, details, now],
        )?;
        Ok(())
    }

    fn list_logs(&self, task_id: i64, level: Option<LogLevel>) -> StorageResult<Vec<LogRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, task_id, level, message, details, created_at FROM crawl_logs
             WHERE task_id = ?1 AND (?2 IS NULL OR level = ?2)
             ORDER BY id",
        )?;

        let rows = stmt
            .query_map(params![task_id, level.map(|l| l.to_db_string())], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, task_id, level, message, details, created_at)| -> StorageResult<LogRecord> {
                Ok(LogRecord {
                    id,
                    task_id,
                    level: LogLevel::from_db_string(&level).unwrap_or(LogLevel::Info),
                    message,
                    details: serde_json::from_str(&details)?,
                    created_at,
                })
            })
            .collect()
    }
}
