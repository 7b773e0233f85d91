use thiserror::Error;

/// Errors from structural tree operations.
///
/// Every editor operation works on a clone, so any of these leaves the
/// caller's definition untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("invalid branch index {index} (branch count {count})")]
    InvalidBranchIndex { index: isize, count: usize },

    #[error("block '{0}' not found")]
    BlockNotFound(String),

    #[error("block '{0}' is not a branch step")]
    NotABranchStep(String),

    #[error("the trigger cannot be removed or moved")]
    CannotRemoveTrigger,

    #[error("automation has no trigger")]
    MissingTrigger,
}

/// Errors from repository operations (used by trait definitions in autoflow-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Errors reported by the execution collaborator.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("automation '{0}' not found")]
    NotFound(String),

    #[error("execution rejected: {0}")]
    Rejected(String),

    #[error("execution request failed: {0}")]
    Request(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tree_error_display() {
        let err = TreeError::InvalidBranchIndex { index: -1, count: 2 };
        assert_eq!(err.to_string(), "invalid branch index -1 (branch count 2)");
    }

    #[test]
    fn test_repository_error_display() {
        let err = RepositoryError::Query("syntax error".to_string());
        assert_eq!(err.to_string(), "query error: syntax error");
    }

    #[test]
    fn test_execution_error_display() {
        let err = ExecutionError::NotFound("au_1".to_string());
        assert_eq!(err.to_string(), "automation 'au_1' not found");
    }
}
