//! Objective state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::game::ErrorKind;

/// Status of an objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveStatus {
    /// Waiting for its turn.
    NotStarted,
    /// Being worked on, or suspended awaiting an inline child.
    InProgress,
    /// Goal met.
    Completed,
    /// Gave up.
    Failed,
    /// Cancelled from the control surface.
    Cancelled,
}

impl ObjectiveStatus {
    /// Check if this state allows transitioning to another state.
    pub fn can_transition_to(&self, target: ObjectiveStatus) -> bool {
        use ObjectiveStatus::*;

        matches!(
            (self, target),
            (NotStarted, InProgress) | (NotStarted, Cancelled) |
            (InProgress, Completed) | (InProgress, Failed) | (InProgress, Cancelled)
        )
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Check if the objective still has work ahead of it.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

impl std::fmt::Display for ObjectiveStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Classified cause of an objective failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureCause {
    /// `None` when the objective gave up for a reason of its own (e.g. a
    /// failed prerequisite) rather than an action error.
    #[serde(default)]
    pub kind: Option<ErrorKind>,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl FailureCause {
    pub fn new(kind: Option<ErrorKind>, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            at: Utc::now(),
        }
    }
}

impl std::fmt::Display for FailureCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            Some(kind) => write!(f, "{kind}: {}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}
