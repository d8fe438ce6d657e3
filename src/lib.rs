//! Linkharvest: crawl orchestration for recorded websites
//!
//! This crate records target websites, launches depth-bounded link discovery
//! runs against them, stores the discovered links and exposes progress and
//! cancellation controls for every crawl task.

pub mod config;
pub mod crawler;
pub mod state;
pub mod storage;
pub mod tasks;
pub mod url;

use thiserror::Error;

/// Main error type for Linkharvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Website not found: {0}")]
    WebsiteNotFound(i64),

    #[error("Task not found: {0}")]
    TaskNotFound(i64),

    #[error("Website {website_id} already has a running task")]
    TaskAlreadyRunning { website_id: i64 },

    #[error("Task {0} is still pending or running")]
    TaskActive(i64),

    #[error("Website URL already registered: {0}")]
    WebsiteExists(String),

    #[error("Invalid crawl strategy: {0}")]
    InvalidStrategy(String),

    #[error("Invalid task state transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::TaskStatus,
        to: state::TaskStatus,
    },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl HarvestError {
    /// Returns true if the error is a conflict with the current task state
    ///
    /// Triggers report these the way an HTTP layer reports `409 Conflict`.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::TaskAlreadyRunning { .. }
                | Self::TaskActive(_)
                | Self::WebsiteExists(_)
                | Self::InvalidTransition { .. }
        )
    }

    /// Returns true if the error means a referenced record does not exist
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::WebsiteNotFound(_) | Self::TaskNotFound(_) => true,
            Self::Storage(e) => e.is_not_found(),
            _ => false,
        }
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,
}

/// Result type alias for Linkharvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use state::TaskStatus;
pub use tasks::{CrawlService, ManualCrawlRequest, ScheduledCrawlRequest};
pub use url::{extract_domain, validate_website_url};
