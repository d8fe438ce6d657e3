/// Task status definitions for the crawl task lifecycle
///
/// A task is created `Pending`, becomes `Running` when its worker starts and
/// ends in exactly one of `Completed`, `Failed` or `Cancelled`.
use std::fmt;

/// Represents the current status of a crawl task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    // ===== Active States =====
    /// Task record exists, worker has not started yet
    Pending,

    /// Worker is traversing or persisting
    Running,

    // ===== Terminal States =====
    /// Traversal and persistence finished without a stop request
    Completed,

    /// An error escaped traversal or persistence
    Failed,

    /// A stop was requested while the task was running
    Cancelled,
}

impl TaskStatus {
    /// Returns true if this is a terminal state (no transition leaves it)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Returns true if the task still occupies its website's single active slot
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }

    /// Returns true if the state machine allows moving from `self` to `next`
    ///
    /// | From      | To                                  |
    /// |-----------|-------------------------------------|
    /// | Pending   | Running, Failed                     |
    /// | Running   | Completed, Failed, Cancelled        |
    /// | terminal  | nothing                             |
    ///
    /// `Pending -> Failed` covers workers that die before they start and
    /// tasks orphaned by a process restart.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        match self {
            Self::Pending => matches!(next, Self::Running | Self::Failed),
            Self::Running => matches!(next, Self::Completed | Self::Failed | Self::Cancelled),
            Self::Completed | Self::Failed | Self::Cancelled => false,
        }
    }

    /// Converts the status to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parses a status from its database string representation
    ///
    /// Returns None if the string doesn't match any known status.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Returns all possible task statuses
    pub fn all_states() -> Vec<Self> {
        vec![
            Self::Pending,
            Self::Running,
            Self::Completed,
            Self::Failed,
            Self::Cancelled,
        ]
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
