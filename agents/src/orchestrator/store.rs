//! In-memory execution state
//!
//! Holds the executions, their stage records, and the per-execution
//! artifacts (findings, stats, options) behind one lock so conflict
//! checks and creation are atomic.

use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use heimdall_core::snapshot::SummaryStats;
use heimdall_core::{
    AnalysisExecution, AnalysisOptions, AnalysisStage, ExecutionStatus, NormalizedFinding,
    PipelineError, RevisionInfo, SeverityCounts, StageRecord, StageStatus,
};

#[derive(Default)]
struct ExecutionState {
    executions: HashMap<Uuid, AnalysisExecution>,
    stages: HashMap<Uuid, Vec<StageRecord>>,
    findings: HashMap<Uuid, Vec<NormalizedFinding>>,
    stats: HashMap<Uuid, SummaryStats>,
    options: HashMap<Uuid, AnalysisOptions>,
}

/// Store for execution records and their per-run artifacts
#[derive(Clone, Default)]
pub struct ExecutionStore {
    state: Arc<RwLock<ExecutionState>>,
}

impl ExecutionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve any active execution for the project and create a new one.
    ///
    /// Runs under a single write lock so two concurrent starts can never
    /// both pass the conflict check. Active-run handling: a run older than
    /// the staleness threshold is reaped as `Failed`; with `force_restart`
    /// a live run is marked `Cancelled`; otherwise the conflict is
    /// returned with the existing execution's id and status.
    pub async fn begin_execution(
        &self,
        project_id: Uuid,
        revision: RevisionInfo,
        options: AnalysisOptions,
        staleness_threshold_secs: u64,
        force_restart: bool,
    ) -> Result<(AnalysisExecution, Vec<StageRecord>), PipelineError> {
        let mut state = self.state.write().await;

        let active = state
            .executions
            .values()
            .find(|e| e.project_id == project_id && e.status.is_active())
            .cloned();
        if let Some(existing) = active {
            // wall-clock comparison so staleness survives process restarts
            let age = Utc::now() - existing.started_at;
            if age > Duration::seconds(staleness_threshold_secs as i64) {
                warn!(
                    "Reaping stale execution {} (started {} ago)",
                    existing.id, age
                );
                terminate(&mut state, existing.id, ExecutionStatus::Failed);
            } else if force_restart {
                info!("Force restart requested, cancelling execution {}", existing.id);
                terminate(&mut state, existing.id, ExecutionStatus::Cancelled);
            } else {
                return Err(PipelineError::AnalysisInFlight {
                    execution_id: existing.id,
                    status: existing.status,
                });
            }
        }

        let execution = AnalysisExecution {
            id: Uuid::new_v4(),
            project_id,
            status: ExecutionStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            overall_score: None,
            severity_counts: SeverityCounts::default(),
            revision,
        };
        let stages: Vec<StageRecord> = AnalysisStage::ordered()
            .into_iter()
            .map(StageRecord::pending)
            .collect();

        state.executions.insert(execution.id, execution.clone());
        state.stages.insert(execution.id, stages.clone());
        state.options.insert(execution.id, options);

        Ok((execution, stages))
    }

    pub async fn get(&self, execution_id: Uuid) -> Option<AnalysisExecution> {
        let state = self.state.read().await;
        state.executions.get(&execution_id).cloned()
    }

    /// Execution plus its ordered stage list
    pub async fn get_with_stages(
        &self,
        execution_id: Uuid,
    ) -> Option<(AnalysisExecution, Vec<StageRecord>)> {
        let state = self.state.read().await;
        let execution = state.executions.get(&execution_id)?.clone();
        let stages = state.stages.get(&execution_id).cloned().unwrap_or_default();
        Some((execution, stages))
    }

    /// Executions for a project, newest first
    pub async fn list_for_project(&self, project_id: Uuid) -> Vec<AnalysisExecution> {
        let state = self.state.read().await;
        let mut executions: Vec<AnalysisExecution> = state
            .executions
            .values()
            .filter(|e| e.project_id == project_id)
            .cloned()
            .collect();
        executions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        executions
    }

    /// Transition an execution to a terminal or running status
    pub async fn set_status(&self, execution_id: Uuid, status: ExecutionStatus) {
        let mut state = self.state.write().await;
        terminate(&mut state, execution_id, status);
    }

    /// Update a stage record. Terminal stage statuses are monotonic: once
    /// completed or failed, further updates are ignored.
    pub async fn update_stage(
        &self,
        execution_id: Uuid,
        stage: AnalysisStage,
        status: StageStatus,
        progress: u8,
        message: String,
    ) {
        let mut state = self.state.write().await;
        if let Some(stages) = state.stages.get_mut(&execution_id) {
            if let Some(record) = stages.iter_mut().find(|r| r.stage == stage) {
                if record.status.is_terminal() {
                    return;
                }
                record.status = status;
                record.progress = progress.min(100);
                record.message = message;
            }
        }
    }

    /// Write the judgment score and the final severity counts back
    pub async fn write_score(&self, execution_id: Uuid, score: f64, counts: SeverityCounts) {
        let mut state = self.state.write().await;
        if let Some(execution) = state.executions.get_mut(&execution_id) {
            execution.overall_score = Some(score);
            execution.severity_counts = counts;
        }
    }

    pub async fn set_findings(&self, execution_id: Uuid, findings: Vec<NormalizedFinding>) {
        let mut state = self.state.write().await;
        state.findings.insert(execution_id, findings);
    }

    pub async fn findings(&self, execution_id: Uuid) -> Vec<NormalizedFinding> {
        let state = self.state.read().await;
        state.findings.get(&execution_id).cloned().unwrap_or_default()
    }

    pub async fn set_stats(&self, execution_id: Uuid, stats: SummaryStats) {
        let mut state = self.state.write().await;
        state.stats.insert(execution_id, stats);
    }

    pub async fn stats(&self, execution_id: Uuid) -> SummaryStats {
        let state = self.state.read().await;
        state.stats.get(&execution_id).cloned().unwrap_or_default()
    }

    pub async fn options(&self, execution_id: Uuid) -> AnalysisOptions {
        let state = self.state.read().await;
        state
            .options
            .get(&execution_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Backdate an execution's start time, used to exercise staleness
    /// recovery without waiting
    #[cfg(test)]
    pub(crate) async fn backdate_for_test(&self, execution_id: Uuid, seconds: i64) {
        let mut state = self.state.write().await;
        if let Some(execution) = state.executions.get_mut(&execution_id) {
            execution.started_at = Utc::now() - Duration::seconds(seconds);
        }
    }
}

/// Apply a status transition. Terminal statuses are frozen: a stage
/// failure racing a cancellation cannot overwrite it.
fn terminate(state: &mut ExecutionState, execution_id: Uuid, status: ExecutionStatus) {
    if let Some(execution) = state.executions.get_mut(&execution_id) {
        if !execution.status.is_active() {
            return;
        }
        execution.status = status;
        if !status.is_active() {
            execution.completed_at = Some(Utc::now());
        }
    }
}
