//! API request and response models

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use heimdall_core::{AnalysisExecution, AnalysisOptions, PipelineError, StageRecord};

/// Request body for starting an analysis
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StartAnalysisRequest {
    /// Analysis options; defaults apply when omitted
    #[serde(default)]
    pub options: Option<AnalysisOptions>,
    /// Cancel a live run and start over
    #[serde(default)]
    pub force: bool,
}

/// Execution summary plus its ordered stage list
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionStatusResponse {
    pub execution: AnalysisExecution,
    pub stages: Vec<StageRecord>,
}

/// Query parameters for snapshot listings
#[derive(Debug, Clone, Deserialize)]
pub struct ListSnapshotsQuery {
    /// Page size, defaults to 20
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    20
}

/// Integrity check result
#[derive(Debug, Clone, Serialize)]
pub struct VerifyResponse {
    pub valid: bool,
}

/// Structured error body returned alongside non-2xx statuses
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    /// Human-readable error message
    pub error: String,
    /// Stable error code
    pub code: &'static str,
    /// Existing execution id on conflict responses
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<Uuid>,
    /// Existing execution status on conflict responses
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl ErrorBody {
    pub fn from_error(err: &PipelineError) -> Self {
        let (code, execution_id, status) = match err {
            PipelineError::ProjectNotFound(_) => ("project_not_found", None, None),
            PipelineError::ExecutionNotFound(_) => ("execution_not_found", None, None),
            PipelineError::SnapshotNotFound(_) => ("snapshot_not_found", None, None),
            PipelineError::AnalysisInFlight {
                execution_id,
                status,
            } => (
                "analysis_in_flight",
                Some(*execution_id),
                Some(status.to_string()),
            ),
            PipelineError::SnapshotExists { execution_id } => {
                ("snapshot_exists", Some(*execution_id), None)
            }
            PipelineError::ExecutionNotComplete {
                execution_id,
                status,
            } => (
                "execution_not_complete",
                Some(*execution_id),
                Some(status.to_string()),
            ),
            PipelineError::SnapshotCorrupted { .. } => ("snapshot_corrupted", None, None),
            PipelineError::ScoreMissing { .. } => ("score_missing", None, None),
            PipelineError::Serialization(_) | PipelineError::Internal(_) => {
                ("internal_error", None, None)
            }
        };

        Self {
            error: err.to_string(),
            code,
            execution_id,
            status,
        }
    }
}
