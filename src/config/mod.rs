//! Configuration module for Linkharvest
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use linkharvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("linkharvest.toml")).unwrap();
//! println!("Crawls will use depth {} by default", config.crawler.default_depth);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{Config, CrawlerConfig, StorageConfig, UserAgentConfig};

// Re-export parser functions
pub use parser::{load_config, parse_config};
