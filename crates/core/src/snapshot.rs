//! The value each progress poll yields.

use serde::{Deserialize, Serialize};

use crate::candidate::Generation;

/// Status of the remote run as reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Accepted but not yet producing generations.
    NotStarted,
    Running,
    Success,
    Failed,
}

impl RunStatus {
    /// Once observed, no further polling happens for the run.
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Success | RunStatus::Failed)
    }
}

/// Result of one successful progress poll.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    pub status: RunStatus,
    /// Generations that became available since the previous poll.
    pub generations: Vec<Generation>,
    /// Generations the server had already handed out before this poll,
    /// including any whose response never reached the client.
    pub backlog: Vec<Generation>,
    /// Failure messages the server recorded for the run.
    pub exceptions: Vec<String>,
}

impl ProgressSnapshot {
    pub fn new(status: RunStatus, generations: Vec<Generation>) -> Self {
        Self {
            status,
            generations,
            backlog: Vec::new(),
            exceptions: Vec::new(),
        }
    }

    /// A response that carries no news: the run exists but nothing changed.
    pub fn empty() -> Self {
        Self::new(RunStatus::NotStarted, Vec::new())
    }

    pub fn with_backlog(mut self, backlog: Vec<Generation>) -> Self {
        self.backlog = backlog;
        self
    }

    pub fn with_exceptions(mut self, exceptions: Vec<String>) -> Self {
        self.exceptions = exceptions;
        self
    }
}
