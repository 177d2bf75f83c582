//! Pipeline errors

use uuid::Uuid;

use crate::ExecutionStatus;

/// Errors surfaced by the analysis pipeline and snapshot store.
///
/// Validator rejections are never expressed through this type; failing
/// generative output is an expected outcome and is returned as a value.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Project not found: {0}")]
    ProjectNotFound(Uuid),

    #[error("Execution not found: {0}")]
    ExecutionNotFound(Uuid),

    #[error("Snapshot not found: {0}")]
    SnapshotNotFound(Uuid),

    #[error("Analysis already in flight for project: execution={execution_id} status={status}")]
    AnalysisInFlight {
        execution_id: Uuid,
        status: ExecutionStatus,
    },

    #[error("Snapshot already captured for execution {execution_id}")]
    SnapshotExists { execution_id: Uuid },

    #[error("Execution {execution_id} is not in a snapshotable state: {status}")]
    ExecutionNotComplete {
        execution_id: Uuid,
        status: ExecutionStatus,
    },

    #[error("Snapshot {snapshot_id} failed checksum verification")]
    SnapshotCorrupted { snapshot_id: Uuid },

    #[error("No score was written for execution {execution_id}")]
    ScoreMissing { execution_id: Uuid },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(anyhow::Error),
}

impl From<anyhow::Error> for PipelineError {
    fn from(err: anyhow::Error) -> Self {
        PipelineError::Internal(err)
    }
}

impl PipelineError {
    /// Whether the error is a precondition failure (unknown identifier)
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            PipelineError::ProjectNotFound(_)
                | PipelineError::ExecutionNotFound(_)
                | PipelineError::SnapshotNotFound(_)
        )
    }

    /// Whether the error is a conflict the caller can resolve
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            PipelineError::AnalysisInFlight { .. }
                | PipelineError::SnapshotExists { .. }
                | PipelineError::ExecutionNotComplete { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_carries_execution_context() {
        let id = Uuid::new_v4();
        let err = PipelineError::AnalysisInFlight {
            execution_id: id,
            status: ExecutionStatus::Running,
        };
        let message = format!("{}", err);
        assert!(message.contains(&id.to_string()));
        assert!(message.contains("RUNNING"));
        assert!(err.is_conflict());
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_not_found_classification() {
        assert!(PipelineError::SnapshotNotFound(Uuid::new_v4()).is_not_found());
        assert!(!PipelineError::SnapshotCorrupted {
            snapshot_id: Uuid::new_v4()
        }
        .is_not_found());
    }
}
