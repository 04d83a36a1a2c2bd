use serde::{Deserialize, Serialize};
use std::future::Future;
use uuid::Uuid;

use crate::{
    commands::ParseRequest,
    config::RetryConfig,
    error::{ErrorKind, NetdocError},
    event::JobState,
};

/// Classified failure recorded on a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub kind: ErrorKind,
    pub detail: String,
}

impl From<&NetdocError> for JobError {
    fn from(err: &NetdocError) -> Self {
        JobError {
            kind: err.kind(),
            detail: err.to_string(),
        }
    }
}

/// One parse request moving through the job state machine.
///
/// The job id is a v5 UUID of the project and document ids, so redelivering a request yields
/// the same id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseJob {
    pub id: Uuid,
    pub request: ParseRequest,
    state: JobState,
    history: Vec<JobState>,
    error: Option<JobError>,
}

impl ParseJob {
    pub fn new(request: ParseRequest) -> Self {
        let name = format!("netdoc://{}/{}", request.project_id, request.document_id);
        ParseJob {
            id: Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes()),
            request,
            state: JobState::Received,
            history: vec![JobState::Received],
            error: None,
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    /// Every state the job has been in, oldest first.
    pub fn history(&self) -> &[JobState] {
        &self.history
    }

    pub fn error(&self) -> Option<&JobError> {
        self.error.as_ref()
    }

    pub fn output_key(&self) -> String {
        self.request.output_key()
    }

    fn transition(&mut self, next: JobState) -> Result<JobState, NetdocError> {
        if !self.state.can_transition_to(next) {
            return Err(NetdocError::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        let previous = self.state;
        self.state = next;
        self.history.push(next);
        tracing::info!("Job {} ({}): {previous} -> {next}", self.id, self.request.document_id);
        Ok(previous)
    }

    /// Move to the immediate successor state. Returns the state left.
    pub fn advance(&mut self) -> Result<JobState, NetdocError> {
        let next = self.state.successor().ok_or_else(|| NetdocError::InvalidTransition {
            from: self.state.to_string(),
            to: self.state.to_string(),
        })?;
        self.transition(next)
    }

    /// Mark the job failed with the classification of `err`. Returns the state left.
    pub fn fail(&mut self, err: &NetdocError) -> Result<JobState, NetdocError> {
        let previous = self.transition(JobState::Failed)?;
        self.error = Some(err.into());
        tracing::error!(
            "Job {} ({}) failed in {previous}: {err}",
            self.id,
            self.request.document_id
        );
        Ok(previous)
    }
}

/// Run `operation`, retrying transient failures with the policy's exponential backoff.
///
/// `on_retry` is called with the failed attempt number and its error before each sleep.
/// Permanent errors and the error of the last allowed attempt are returned as is.
pub async fn with_retry<T, F, Fut, R>(
    policy: &RetryConfig,
    operation: &str,
    mut on_retry: R,
    mut f: F,
) -> Result<T, NetdocError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, NetdocError>>,
    R: FnMut(u32, &NetdocError),
{
    let mut attempt = 1;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.backoff(attempt);
                tracing::warn!(
                    "[Retry] {operation} failed (attempt {attempt}/{}): {err}; retrying in {delay:?}",
                    policy.max_attempts
                );
                on_retry(attempt, &err);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
