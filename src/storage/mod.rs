//! Storage module for persisting crawl data
//!
//! This module is the persistence gateway of the crawl core:
//! - Website records (crawl targets)
//! - Crawl task records and their statistics
//! - Discovered links, unique per website
//! - Append-only task logs

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::state::TaskStatus;
use crate::HarvestError;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

/// Storage handle shared between the service and its crawl workers
///
/// The lock is held only for the duration of a single gateway call and never
/// across an `.await`.
pub type SharedStorage = Arc<Mutex<dyn Storage + Send>>;

/// Wraps a storage backend for sharing between workers
pub fn shared<S: Storage + Send + 'static>(storage: S) -> SharedStorage {
    Arc::new(Mutex::new(storage))
}

/// Runs one gateway call against shared storage
pub fn with_storage<T, F>(storage: &SharedStorage, f: F) -> StorageResult<T>
where
    F: FnOnce(&mut (dyn Storage + Send)) -> StorageResult<T>,
{
    let mut guard = storage.lock().map_err(|_| StorageError::Poisoned)?;
    f(&mut *guard)
}

/// Represents a website in the database
#[derive(Debug, Clone)]
pub struct WebsiteRecord {
    pub id: i64,
    pub url: String,
    pub domain: String,
    pub crawl_depth: u32,
    pub max_links: u32,
    pub status: WebsiteStatus,
    pub created_at: String,
}

/// A website about to be inserted
#[derive(Debug, Clone)]
pub struct NewWebsite {
    pub url: String,
    pub domain: String,
    pub crawl_depth: u32,
    pub max_links: u32,
}

/// Represents a crawl task in the database
#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub id: i64,
    pub website_id: i64,
    pub strategy: CrawlStrategy,
    pub task_type: TaskType,
    pub status: TaskStatus,
    pub statistics: TaskStatistics,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub error_message: Option<String>,
}

/// Aggregate counters written onto a task when it finishes persisting
///
/// A valid link is one whose body was stored, so `valid_links` doubles as
/// the successful-download count; `download_failed` counts links that
/// answered but whose artifact could not be written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskStatistics {
    pub total_links: u64,
    pub valid_links: u64,
    pub invalid_links: u64,
    pub new_links: u64,
    pub download_failed: u64,
}

impl TaskStatistics {
    /// Share of saved links that are valid (0.0 when nothing was saved)
    pub fn valid_rate(&self) -> f64 {
        ratio(self.valid_links, self.total_links)
    }

    /// Share of responding links whose body was stored
    pub fn precision_rate(&self) -> f64 {
        ratio(self.valid_links, self.valid_links + self.download_failed)
    }
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

/// Represents a discovered link in the database
#[derive(Debug, Clone)]
pub struct LinkRecord {
    pub id: i64,
    pub website_id: i64,
    /// The task that most recently touched this link; None once that task is deleted
    pub task_id: Option<i64>,
    pub url: String,
    pub domain: String,
    pub link_type: LinkType,
    pub status_code: Option<u16>,
    pub content_type: Option<String>,
    pub crawl_count: u32,
    pub first_crawled_at: String,
    pub last_crawled_at: String,
}

/// A link observation to insert or refresh
#[derive(Debug, Clone)]
pub struct LinkUpsert {
    pub website_id: i64,
    pub task_id: i64,
    pub url: String,
    pub domain: String,
    pub link_type: LinkType,
    pub status_code: Option<u16>,
    pub content_type: Option<String>,
}

/// Represents a task log entry in the database
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub id: i64,
    pub task_id: i64,
    pub level: LogLevel,
    pub message: String,
    pub details: serde_json::Value,
    pub created_at: String,
}

/// Status of a website
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebsiteStatus {
    Active,
    Inactive,
}

impl WebsiteStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "inactive" => Some(Self::Inactive),
            _ => None,
        }
    }
}

/// How a crawl treats URLs already recorded for the website
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlStrategy {
    /// Skip every URL already recorded for the website
    Incremental,
    /// No exclusions
    Full,
}

impl CrawlStrategy {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Incremental => "incremental",
            Self::Full => "full",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "incremental" => Some(Self::Incremental),
            "full" => Some(Self::Full),
            _ => None,
        }
    }
}

impl FromStr for CrawlStrategy {
    type Err = HarvestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_string(&s.trim().to_lowercase())
            .ok_or_else(|| HarvestError::InvalidStrategy(s.to_string()))
    }
}

impl fmt::Display for CrawlStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// What created a task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskType {
    Manual,
    Scheduled,
}

impl TaskType {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Scheduled => "scheduled",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "manual" => Some(Self::Manual),
            "scheduled" => Some(Self::Scheduled),
            _ => None,
        }
    }
}

/// Classification of a discovered link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkType {
    /// A response was obtained and its body was stored
    Valid,
    /// No response, or the body could not be stored
    Invalid,
}

impl LinkType {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::Invalid => "invalid",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "valid" => Some(Self::Valid),
            "invalid" => Some(Self::Invalid),
            _ => None,
        }
    }
}

/// Severity of a task log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "INFO" => Some(Self::Info),
            "WARNING" => Some(Self::Warning),
            "ERROR" => Some(Self::Error),
            _ => None,
        }
    }
}

impl FromStr for LogLevel {
    type Err = HarvestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_string(&s.trim().to_uppercase())
            .ok_or_else(|| HarvestError::InvalidRequest(format!("unknown log level '{}'", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statistics_rates() {
        let stats = TaskStatistics {
            total_links: 8,
            valid_links: 3,
            invalid_links: 5,
            new_links: 8,
            download_failed: 1,
        };
        assert_eq!(stats.valid_rate(), 0.375);
        assert_eq!(stats.precision_rate(), 0.75);

        let empty = TaskStatistics::default();
        assert_eq!(empty.valid_rate(), 0.0);
        assert_eq!(empty.precision_rate(), 0.0);
    }

    #[test]
    fn test_strategy_parse() {
        assert_eq!("full".parse::<CrawlStrategy>().unwrap(), CrawlStrategy::Full);
        assert_eq!(
            " Incremental ".parse::<CrawlStrategy>().unwrap(),
            CrawlStrategy::Incremental
        );
        assert!(matches!(
            "deep".parse::<CrawlStrategy>(),
            Err(HarvestError::InvalidStrategy(_))
        ));
    }

    #[test]
    fn test_db_string_roundtrips() {
        for s in [WebsiteStatus::Active, WebsiteStatus::Inactive] {
            assert_eq!(WebsiteStatus::from_db_string(s.to_db_string()), Some(s));
        }
        for t in [TaskType::Manual, TaskType::Scheduled] {
            assert_eq!(TaskType::from_db_string(t.to_db_string()), Some(t));
        }
        for l in [LinkType::Valid, LinkType::Invalid] {
            assert_eq!(LinkType::from_db_string(l.to_db_string()), Some(l));
        }
        for l in [LogLevel::Info, LogLevel::Warning, LogLevel::Error] {
            assert_eq!(LogLevel::from_db_string(l.to_db_string()), Some(l));
        }
    }

    #[test]
    fn test_log_level_parse_is_case_insensitive() {
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warning);
        assert!("debug".parse::<LogLevel>().is_err());
    }
}
