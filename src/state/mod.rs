//! State module for tracking crawl task progress
//!
//! `TaskStatus` is the finite-state machine every crawl task moves through.
//! Storage consults it before writing a status so that terminal states are
//! never overwritten.

mod task_state;

pub use task_state::TaskStatus;
