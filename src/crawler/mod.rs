//! Crawler module for link discovery
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching with a bounded per-request timeout
//! - Link extraction from HTML, XML and feed bodies
//! - Per-crawl artifact storage
//! - Depth-bounded traversal with exclude/visited policy

mod download;
mod fetcher;
mod parser;
mod traversal;

pub use download::DownloadArea;
pub use fetcher::{build_http_client, fetch_url, FetchResult};
pub use parser::{detect_markup, extract_links, ExtractError, Markup};
pub use traversal::{FetchOutcome, TraversalEntry, TraversalRequest, Traverser};

use crate::config::Config;
use crate::url::LinkFilter;
use crate::HarvestError;
use std::path::PathBuf;
use std::time::Duration;

/// Builds a traverser from the loaded configuration
///
/// # Arguments
///
/// * `config` - The application configuration
///
/// # Returns
///
/// * `Ok(Traverser)` - Ready to walk websites
/// * `Err(HarvestError)` - The HTTP client could not be built
pub fn traverser_from_config(config: &Config) -> Result<Traverser, HarvestError> {
    let client = build_http_client(
        &config.user_agent,
        Duration::from_secs(config.crawler.request_timeout_secs),
    )?;
    let filter = LinkFilter::new(&config.crawler.excluded_extensions);
    Ok(Traverser::new(
        client,
        filter,
        PathBuf::from(&config.storage.download_dir),
    ))
}
