//! Crawl task orchestration
//!
//! - `signals`: per-task stop signals (cancellation tokens)
//! - `runner`: the lifecycle of one task, from `pending` to a terminal status
//! - `service`: triggers, cancellation, deletion and the bounded worker pool

mod runner;
mod service;
mod signals;

pub use runner::{CrawlJob, TaskRunner};
pub use service::{CrawlService, ManualCrawlRequest, ScheduledCrawlRequest};
pub use signals::StopSignals;
