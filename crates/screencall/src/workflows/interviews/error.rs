use super::domain::{InterviewId, InterviewStatus};
use super::provider::GatewayError;
use super::store::StoreError;

/// Error raised by the interview workflows.
#[derive(Debug, thiserror::Error)]
pub enum InterviewError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("interview {id} is {status}")]
    StateConflict {
        id: InterviewId,
        status: InterviewStatus,
    },
    #[error("interview {0} already has a start in progress")]
    StartPending(InterviewId),
    #[error("{operation} failed: {source}")]
    DependencyFailure {
        operation: &'static str,
        #[source]
        source: GatewayError,
    },
    #[error("not authorized: {0}")]
    Unauthorized(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl InterviewError {
    pub(crate) fn interview_not_found(id: &InterviewId) -> Self {
        Self::NotFound(format!("interview {id}"))
    }

    pub(crate) fn conflict(id: &InterviewId, status: InterviewStatus) -> Self {
        Self::StateConflict {
            id: id.clone(),
            status,
        }
    }

    /// Status carried by a `StateConflict`, used to tell candidates an interview has expired.
    pub fn conflicting_status(&self) -> Option<InterviewStatus> {
        match self {
            InterviewError::StateConflict { status, .. } => Some(*status),
            _ => None,
        }
    }
}
