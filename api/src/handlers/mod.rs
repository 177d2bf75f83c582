//! API Handlers Module
//!
//! This module contains the request handlers for the analysis API.

use axum::{
    debug_handler,
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use heimdall_agents::{Orchestrator, StartedAnalysis};
use heimdall_core::snapshot::{compare, SnapshotDiff, SnapshotMeta, SnapshotStore};
use heimdall_core::{AnalysisExecution, PipelineError};

use crate::models::{
    ErrorBody, ExecutionStatusResponse, ListSnapshotsQuery, StartAnalysisRequest, VerifyResponse,
};

/// Shared state of the API server
pub struct ApiState {
    /// Stage orchestrator
    pub orchestrator: Orchestrator,
    /// Snapshot store
    pub snapshots: Arc<dyn SnapshotStore>,
}

/// Error response carrying a structured body
pub type ApiError = (StatusCode, Json<ErrorBody>);

/// Map a pipeline error to its HTTP representation: 404 for unknown
/// identifiers, 409 for conflicts, 422 for corrupted snapshots (distinct
/// from not-found), 500 otherwise
fn into_api_error(err: PipelineError) -> ApiError {
    let status = if err.is_not_found() {
        StatusCode::NOT_FOUND
    } else if err.is_conflict() {
        StatusCode::CONFLICT
    } else if matches!(err, PipelineError::SnapshotCorrupted { .. }) {
        StatusCode::UNPROCESSABLE_ENTITY
    } else {
        tracing::error!("Internal error: {}", err);
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(ErrorBody::from_error(&err)))
}

/// Health check endpoint
#[debug_handler]
pub async fn health_check() -> Json<HashMap<String, String>> {
    let mut response = HashMap::new();
    response.insert("status".to_string(), "healthy".to_string());
    response.insert("service".to_string(), "heimdall-api".to_string());
    Json(response)
}

/// Start an analysis for a project
#[debug_handler]
pub async fn start_analysis(
    State(state): State<Arc<ApiState>>,
    Path(project_id): Path<Uuid>,
    Json(request): Json<StartAnalysisRequest>,
) -> Result<(StatusCode, Json<StartedAnalysis>), ApiError> {
    tracing::debug!("Starting analysis for project {}", project_id);

    let options = request.options.unwrap_or_default();
    match state
        .orchestrator
        .start(project_id, options, request.force)
        .await
    {
        Ok(started) => Ok((StatusCode::ACCEPTED, Json(started))),
        Err(e) => Err(into_api_error(e)),
    }
}

/// Query an execution's status and stage list
#[debug_handler]
pub async fn get_execution(
    State(state): State<Arc<ApiState>>,
    Path(execution_id): Path<Uuid>,
) -> Result<Json<ExecutionStatusResponse>, ApiError> {
    match state.orchestrator.status(execution_id).await {
        Ok((execution, stages)) => Ok(Json(ExecutionStatusResponse { execution, stages })),
        Err(e) => Err(into_api_error(e)),
    }
}

/// List a project's executions, newest first
#[debug_handler]
pub async fn list_executions(
    State(state): State<Arc<ApiState>>,
    Path(project_id): Path<Uuid>,
) -> Json<Vec<AnalysisExecution>> {
    Json(state.orchestrator.list_executions(project_id).await)
}

/// Cancel an execution
#[debug_handler]
pub async fn cancel_execution(
    State(state): State<Arc<ApiState>>,
    Path(execution_id): Path<Uuid>,
) -> Result<Json<AnalysisExecution>, ApiError> {
    match state.orchestrator.cancel(execution_id).await {
        Ok(execution) => Ok(Json(execution)),
        Err(e) => Err(into_api_error(e)),
    }
}

/// Freeze a completed execution into a snapshot
#[debug_handler]
pub async fn capture_snapshot(
    State(state): State<Arc<ApiState>>,
    Path(execution_id): Path<Uuid>,
) -> Result<(StatusCode, Json<SnapshotMeta>), ApiError> {
    tracing::debug!("Capturing snapshot for execution {}", execution_id);

    match state.orchestrator.capture_snapshot(execution_id).await {
        Ok(meta) => Ok((StatusCode::CREATED, Json(meta))),
        Err(e) => Err(into_api_error(e)),
    }
}

/// List a project's snapshots, newest first
#[debug_handler]
pub async fn list_snapshots(
    State(state): State<Arc<ApiState>>,
    Path(project_id): Path<Uuid>,
    Query(query): Query<ListSnapshotsQuery>,
) -> Result<Json<Vec<SnapshotMeta>>, ApiError> {
    match state.snapshots.list(project_id, query.limit).await {
        Ok(metas) => Ok(Json(metas)),
        Err(e) => Err(into_api_error(e)),
    }
}

/// Verify a snapshot's integrity
#[debug_handler]
pub async fn verify_snapshot(
    State(state): State<Arc<ApiState>>,
    Path(snapshot_id): Path<Uuid>,
) -> Result<Json<VerifyResponse>, ApiError> {
    match state.snapshots.verify(snapshot_id).await {
        Ok(valid) => Ok(Json(VerifyResponse { valid })),
        Err(e) => Err(into_api_error(e)),
    }
}

/// Compare two snapshots
#[debug_handler]
pub async fn compare_snapshots(
    State(state): State<Arc<ApiState>>,
    Path((base_id, target_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<SnapshotDiff>, ApiError> {
    tracing::debug!("Comparing snapshots {} and {}", base_id, target_id);

    match compare(state.snapshots.as_ref(), base_id, target_id).await {
        Ok(diff) => Ok(Json(diff)),
        Err(e) => Err(into_api_error(e)),
    }
}
