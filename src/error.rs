use thiserror::Error;

use crate::state_machine::{CaseId, CaseStatus, CommandKind};

/// Errors returned synchronously to the caller of a workflow command.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("{command} is not allowed on case {case_id} in status {status}: {reason}")]
    IllegalTransition {
        case_id: CaseId,
        status: CaseStatus,
        command: CommandKind,
        reason: String,
    },

    #[error("case {case_id} is {status} and can no longer be claimed")]
    CaseNotClaimable { case_id: CaseId, status: CaseStatus },

    #[error("case {case_id} was modified concurrently after {attempts} attempt(s)")]
    ConcurrentModification { case_id: CaseId, attempts: u32 },

    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("case not found: {0}")]
    NotFound(CaseId),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Failures of the backing case store itself, as opposed to workflow outcomes.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("case already exists: {0}")]
    DuplicateCase(CaseId),

    #[error("cannot write unknown case: {0}")]
    UnknownCase(CaseId),

    #[error("store backend unavailable: {0}")]
    Backend(String),
}

/// Coarse classification of a [`WorkflowError`] so callers can decide what to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    IllegalTransition,
    CaseNotClaimable,
    ConcurrentModification,
    ValidationFailed,
    NotFound,
    Store,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::IllegalTransition => write!(f, "IllegalTransition"),
            ErrorKind::CaseNotClaimable => write!(f, "CaseNotClaimable"),
            ErrorKind::ConcurrentModification => write!(f, "ConcurrentModification"),
            ErrorKind::ValidationFailed => write!(f, "ValidationFailed"),
            ErrorKind::NotFound => write!(f, "NotFound"),
            ErrorKind::Store => write!(f, "Store"),
        }
    }
}

impl WorkflowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkflowError::IllegalTransition { .. } => ErrorKind::IllegalTransition,
            WorkflowError::CaseNotClaimable { .. } => ErrorKind::CaseNotClaimable,
            WorkflowError::ConcurrentModification { .. } => ErrorKind::ConcurrentModification,
            WorkflowError::ValidationFailed(_) => ErrorKind::ValidationFailed,
            WorkflowError::NotFound(_) => ErrorKind::NotFound,
            WorkflowError::Store(_) => ErrorKind::Store,
        }
    }

    /// True when resubmitting the same command against fresh state may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WorkflowError::ConcurrentModification { .. }
                | WorkflowError::Store(StoreError::Backend(_))
        )
    }
}
