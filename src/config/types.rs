use serde::Deserialize;

/// Main configuration structure for Linkharvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub storage: StorageConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Timeout applied to every single GET request (seconds)
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Maximum number of crawl tasks running at the same time
    #[serde(rename = "max-concurrent-crawls", default = "default_max_concurrent_crawls")]
    pub max_concurrent_crawls: u32,

    /// Depth used when neither the request nor the website supplies one
    #[serde(rename = "default-depth", default = "default_depth")]
    pub default_depth: u32,

    /// Link ceiling used when neither the request nor the website supplies one
    #[serde(rename = "default-max-links", default = "default_max_links")]
    pub default_max_links: u32,

    /// URL path suffixes that are never reported as links
    #[serde(rename = "excluded-extensions", default = "default_excluded_extensions")]
    pub excluded_extensions: Vec<String>,

    /// How often a worker refreshes its task's heartbeat (seconds)
    #[serde(rename = "heartbeat-interval-secs", default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    /// Age after which an active task without heartbeat counts as orphaned (seconds)
    #[serde(rename = "stale-task-secs", default = "default_stale_task")]
    pub stale_task_secs: u64,
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the user agent header: `Name/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Root directory receiving one artifact directory per crawl
    #[serde(rename = "download-dir")]
    pub download_dir: String,
}

fn default_request_timeout() -> u64 {
    10
}

fn default_max_concurrent_crawls() -> u32 {
    4
}

fn default_depth() -> u32 {
    3
}

fn default_max_links() -> u32 {
    1000
}

fn default_heartbeat_interval() -> u64 {
    10
}

fn default_stale_task() -> u64 {
    60
}

pub(crate) fn default_excluded_extensions() -> Vec<String> {
    vec![".js".to_string(), ".css".to_string()]
}
