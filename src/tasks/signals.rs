//! Per-task stop signals
//!
//! Each crawl task gets its own `CancellationToken`. The registry maps task
//! ids to tokens so that a cancel request arriving from outside the worker
//! can reach the token the worker polls.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

/// Registry of stop signals for tasks of this process
#[derive(Debug, Clone, Default)]
pub struct StopSignals {
    tokens: Arc<Mutex<HashMap<i64, CancellationToken>>>,
}

impl StopSignals {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<i64, CancellationToken>> {
        // The map holds no invariant a panicking holder could break
        self.tokens.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Installs a fresh token for `task_id`, replacing any stale one
    pub fn register(&self, task_id: i64) -> CancellationToken {
        let token = CancellationToken::new();
        self.lock().insert(task_id, token.clone());
        token
    }

    /// Raises the stop signal for `task_id`
    ///
    /// If no worker registered a token yet, a cancelled one is stored so
    /// `is_stopped` reports the request.
    pub fn request_stop(&self, task_id: i64) {
        self.lock()
            .entry(task_id)
            .or_insert_with(CancellationToken::new)
            .cancel();
    }

    /// Drops the signal for `task_id`
    pub fn clear(&self, task_id: i64) {
        self.lock().remove(&task_id);
    }

    pub fn is_stopped(&self, task_id: i64) -> bool {
        self.lock()
            .get(&task_id)
            .map(CancellationToken::is_cancelled)
            .unwrap_or(false)
    }

    /// Number of tasks with a live signal
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_stop_reaches_registered_token() {
        let signals = StopSignals::new();
        let token = signals.register(1);

        assert!(!signals.is_stopped(1));
        signals.request_stop(1);

        assert!(token.is_cancelled());
        assert!(signals.is_stopped(1));
    }

    #[test]
    fn test_register_replaces_stale_signal() {
        let signals = StopSignals::new();
        signals.request_stop(7);
        assert!(signals.is_stopped(7));

        let token = signals.register(7);
        assert!(!token.is_cancelled());
        assert!(!signals.is_stopped(7));
    }

    #[test]
    fn test_clear_removes_signal() {
        let signals = StopSignals::new();
        signals.register(3);
        signals.request_stop(3);
        signals.clear(3);

        assert!(!signals.is_stopped(3));
        assert!(signals.is_empty());
    }

    #[test]
    fn test_signals_are_per_task() {
        let signals = StopSignals::new();
        let first = signals.register(1);
        let second = signals.register(2);

        signals.request_stop(2);

        assert!(!first.is_cancelled());
        assert!(second.is_cancelled());
        assert_eq!(signals.len(), 2);
    }

    #[test]
    fn test_clones_share_registry() {
        let signals = StopSignals::new();
        let token = signals.register(5);
        signals.clone().request_stop(5);
        assert!(token.is_cancelled());
    }
}
