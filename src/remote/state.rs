//! Remote job state machine
//!
//! SUBMITTED → RUNNING → {SUCCEEDED | FAILED | ABORTED}
//!
//! Service statuses are folded into these states; a job may jump straight
//! from SUBMITTED to a terminal state when polls miss the running phase.

use rebuild_protocol::BuildStatus;
use serde::{Deserialize, Serialize};

/// Lane-side view of a remote build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemoteJobState {
    Submitted,
    Running,
    Succeeded,
    Failed,
    /// Wait given up locally (cancel or timeout)
    Aborted,
}

impl RemoteJobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RemoteJobState::Succeeded | RemoteJobState::Failed | RemoteJobState::Aborted
        )
    }

    pub fn can_transition_to(&self, target: RemoteJobState) -> bool {
        match (self, target) {
            (RemoteJobState::Submitted, RemoteJobState::Running) => true,
            (RemoteJobState::Submitted, RemoteJobState::Succeeded) => true,
            (RemoteJobState::Submitted, RemoteJobState::Failed) => true,
            (RemoteJobState::Submitted, RemoteJobState::Aborted) => true,

            (RemoteJobState::Running, RemoteJobState::Succeeded) => true,
            (RemoteJobState::Running, RemoteJobState::Failed) => true,
            (RemoteJobState::Running, RemoteJobState::Aborted) => true,

            _ => false,
        }
    }
}

impl From<BuildStatus> for RemoteJobState {
    fn from(status: BuildStatus) -> Self {
        match status {
            BuildStatus::StatusUnknown | BuildStatus::Pending | BuildStatus::Queued => {
                RemoteJobState::Submitted
            }
            BuildStatus::Working => RemoteJobState::Running,
            BuildStatus::Success => RemoteJobState::Succeeded,
            BuildStatus::Failure
            | BuildStatus::InternalError
            | BuildStatus::Timeout
            | BuildStatus::Cancelled
            | BuildStatus::Expired => RemoteJobState::Failed,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RemoteStateError {
    #[error("invalid remote job transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: RemoteJobState,
        to: RemoteJobState,
    },
}

/// Tracks one remote job through observed statuses.
#[derive(Debug, Clone)]
pub struct RemoteJobTracker {
    state: RemoteJobState,
}

impl Default for RemoteJobTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteJobTracker {
    pub fn new() -> Self {
        Self {
            state: RemoteJobState::Submitted,
        }
    }

    pub fn state(&self) -> RemoteJobState {
        self.state
    }

    /// Fold in a status seen on a poll. Repeated observations are no-ops.
    pub fn observe(&mut self, status: BuildStatus) -> Result<RemoteJobState, RemoteStateError> {
        self.transition(RemoteJobState::from(status))
    }

    /// Mark the wait as abandoned locally.
    pub fn abort(&mut self) -> Result<RemoteJobState, RemoteStateError> {
        self.transition(RemoteJobState::Aborted)
    }

    fn transition(&mut self, next: RemoteJobState) -> Result<RemoteJobState, RemoteStateError> {
        if next == self.state {
            return Ok(self.state);
        }
        if !self.state.can_transition_to(next) {
            return Err(RemoteStateError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(next)
    }
}
