use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

use crate::error::ErrorKind;

/// Lifecycle of a single parse job.
///
/// The main chain is strictly forward (`Received → Downloading → Parsing → Healing →
/// Assembling → Completed`); `Failed` is reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    #[default]
    Received,
    Downloading,
    Parsing,
    Healing,
    Assembling,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    /// The only non-failure state that may follow this one.
    pub fn successor(&self) -> Option<JobState> {
        match self {
            JobState::Received => Some(JobState::Downloading),
            JobState::Downloading => Some(JobState::Parsing),
            JobState::Parsing => Some(JobState::Healing),
            JobState::Healing => Some(JobState::Assembling),
            JobState::Assembling => Some(JobState::Completed),
            JobState::Completed | JobState::Failed => None,
        }
    }

    pub fn can_transition_to(&self, next: JobState) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == JobState::Failed || self.successor() == Some(next)
    }
}

impl Display for JobState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            JobState::Received => "Received",
            JobState::Downloading => "Downloading",
            JobState::Parsing => "Parsing",
            JobState::Healing => "Healing",
            JobState::Assembling => "Assembling",
            JobState::Completed => "Completed",
            JobState::Failed => "Failed",
        };
        write!(f, "{name}")
    }
}

/// Progress events emitted by the parser service, for observers that want more than logs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JobEvent {
    /// Job id, previous state, new state
    StateChanged(Uuid, JobState, JobState),
    /// Job id, rendered non-fatal diagnostic
    Diagnostic(Uuid, String),
    /// Job id, operation name, attempt number that failed, classification
    Retrying(Uuid, String, u32, ErrorKind),
}

impl Display for JobEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            JobEvent::StateChanged(id, from, to) => write!(f, "StateChanged({id}: {from} -> {to})"),
            JobEvent::Diagnostic(id, msg) => write!(f, "Diagnostic({id}: {msg})"),
            JobEvent::Retrying(id, op, attempt, kind) => {
                write!(f, "Retrying({id}: {op} attempt {attempt}, {kind})")
            }
        }
    }
}
