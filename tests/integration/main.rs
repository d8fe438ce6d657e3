//! Integration tests for Linkharvest
//!
//! These tests run whole crawl tasks through `CrawlService` against
//! wiremock servers and an in-memory database.

mod common;
mod lifecycle_tests;
mod traversal_tests;
