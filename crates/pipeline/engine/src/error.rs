//! Engine error types

use pipeline_store::StorageError;
use pipeline_types::{ExecutableStatus, FlowId, ProjectId, ProjectStatus, WorkItemId};
use thiserror::Error;

/// A business rule refused the requested operation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PreconditionViolation {
    #[error("illegal status skip: {from} -> {to}")]
    IllegalSkip {
        from: ProjectStatus,
        to: ProjectStatus,
    },

    #[error("illegal status regression: {from} -> {to}")]
    IllegalRegression {
        from: ProjectStatus,
        to: ProjectStatus,
    },

    #[error("project is in terminal state: {0}")]
    TerminalState(ProjectStatus),

    #[error("project {project_id} has {count} invalid work item(s)")]
    HasInvalidItem { project_id: ProjectId, count: usize },

    #[error("project {project_id} has {remaining} work item(s) not completed")]
    NotAllComplete {
        project_id: ProjectId,
        remaining: usize,
    },

    #[error("project not found: {0}")]
    ProjectNotFound(ProjectId),

    #[error("flow not found: {flow_id} v{version}")]
    FlowNotFound { flow_id: FlowId, version: u32 },

    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("work item not found: {0}")]
    WorkItemNotFound(WorkItemId),

    #[error("callback name already registered: {0}")]
    DuplicateCallbackName(String),

    #[error("work item {item_id} is not executable (currently {status})")]
    NotExecutable {
        item_id: WorkItemId,
        status: ExecutableStatus,
    },

    #[error("work item {item_id}: {detail}")]
    InvalidItemState { item_id: WorkItemId, detail: String },
}

impl PreconditionViolation {
    /// Stable machine-readable code
    pub fn reason(&self) -> &'static str {
        match self {
            Self::IllegalSkip { .. } => "illegal_skip",
            Self::IllegalRegression { .. } => "illegal_regression",
            Self::TerminalState(_) => "terminal_state",
            Self::HasInvalidItem { .. } => "has_invalid_item",
            Self::NotAllComplete { .. } => "not_all_complete",
            Self::ProjectNotFound(_) => "project_not_found",
            Self::FlowNotFound { .. } => "flow_not_found",
            Self::NodeNotFound(_) => "node_not_found",
            Self::WorkItemNotFound(_) => "work_item_not_found",
            Self::DuplicateCallbackName(_) => "duplicate_callback_name",
            Self::NotExecutable { .. } => "not_executable",
            Self::InvalidItemState { .. } => "invalid_item_state",
        }
    }
}

/// Errors surfaced by engine entry points
#[derive(Debug, Error)]
pub enum EngineError {
    /// Opaque storage failure; the transaction was rolled back
    #[error("data access failed: {0}")]
    DataAccess(#[from] StorageError),

    #[error(transparent)]
    Precondition(#[from] PreconditionViolation),

    /// A node-start callback failed and aborted the enclosing transaction
    #[error("node-start callback '{name}' failed: {source}")]
    CallbackFailed {
        name: String,
        #[source]
        source: anyhow::Error,
    },
}

impl EngineError {
    /// The violated precondition, if that is what this error is
    pub fn precondition(&self) -> Option<&PreconditionViolation> {
        match self {
            Self::Precondition(violation) => Some(violation),
            _ => None,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Self::DataAccess(_) => "data_access",
            Self::Precondition(violation) => violation.reason(),
            Self::CallbackFailed { .. } => "callback_failed",
        }
    }
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_codes() {
        let err = PreconditionViolation::IllegalSkip {
            from: ProjectStatus::Ready,
            to: ProjectStatus::Completed,
        };
        assert_eq!(err.reason(), "illegal_skip");
        assert_eq!(err.to_string(), "illegal status skip: ready -> completed");

        let engine_err = EngineError::from(err.clone());
        assert_eq!(engine_err.reason(), "illegal_skip");
        assert_eq!(engine_err.precondition(), Some(&err));
    }

    #[test]
    fn test_storage_errors_are_data_access() {
        let err = EngineError::from(StorageError::Backend("boom".into()));
        assert_eq!(err.reason(), "data_access");
        assert!(err.precondition().is_none());
    }
}
