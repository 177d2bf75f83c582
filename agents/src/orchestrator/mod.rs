//! Stage Orchestrator
//!
//! Drives one analysis execution through the fixed stage sequence, tracks
//! per-stage status and progress, reaps stale in-flight runs, and hands
//! the normalized findings to the judgment synthesizer before completing
//! the execution. Stage failures follow the per-stage required flag: a
//! required-stage failure aborts the run, an AI-enhancement failure leaves
//! the pipeline to complete with deterministic findings only.

use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use heimdall_core::registry::AgentRegistry;
use heimdall_core::snapshot::{SnapshotMeta, SnapshotParams, SnapshotStore, SummaryStats};
use heimdall_core::{
    AnalysisExecution, AnalysisOptions, AnalysisStage, ExecutionStatus, JudgmentSynthesizer,
    NormalizedFinding, PipelineConfig, PipelineError, ProjectProvider, ProjectRef,
    SeverityCounts, StageRecord, StageStatus,
};

mod store;

pub use store::ExecutionStore;

use crate::enrichment::Enricher;
use crate::merger::{self, FindingMerger};
use crate::models::{AnalysisAgent, AnalysisContext, RawFinding, SourceCollector, SourceInventory};
use crate::runner::AgentRunner;

/// Result of a successful start call
#[derive(Debug, Clone, Serialize)]
pub struct StartedAnalysis {
    /// Id of the newly created execution
    pub execution_id: Uuid,
    /// Status at handoff
    pub status: ExecutionStatus,
    /// The initial stage list
    pub stages: Vec<StageRecord>,
}

/// Orchestrator for analysis executions
#[derive(Clone)]
pub struct Orchestrator {
    config: PipelineConfig,
    projects: Arc<dyn ProjectProvider>,
    collector: Arc<dyn SourceCollector>,
    registry: Arc<AgentRegistry>,
    agents: Vec<Arc<dyn AnalysisAgent>>,
    merger: Arc<dyn FindingMerger>,
    judge: Arc<JudgmentSynthesizer>,
    snapshots: Arc<dyn SnapshotStore>,
    enricher: Option<Arc<Enricher>>,
    store: ExecutionStore,
}

impl Orchestrator {
    /// Create an orchestrator without AI enrichment
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: PipelineConfig,
        projects: Arc<dyn ProjectProvider>,
        collector: Arc<dyn SourceCollector>,
        registry: Arc<AgentRegistry>,
        agents: Vec<Arc<dyn AnalysisAgent>>,
        merger: Arc<dyn FindingMerger>,
        judge: Arc<JudgmentSynthesizer>,
        snapshots: Arc<dyn SnapshotStore>,
    ) -> Self {
        Self {
            config,
            projects,
            collector,
            registry,
            agents,
            merger,
            judge,
            snapshots,
            enricher: None,
            store: ExecutionStore::new(),
        }
    }

    /// Wire in the AI enrichment driver
    pub fn with_enricher(mut self, enricher: Arc<Enricher>) -> Self {
        self.enricher = Some(enricher);
        self
    }

    /// Start an analysis for a project.
    ///
    /// At most one execution per project is in flight: a healthy live run
    /// produces a conflict carrying its id, a stale run is reaped as
    /// failed, and `force_restart` cancels a live run.
    pub async fn start(
        &self,
        project_id: Uuid,
        options: AnalysisOptions,
        force_restart: bool,
    ) -> Result<StartedAnalysis, PipelineError> {
        let project = self
            .projects
            .get_project(project_id)
            .await
            .map_err(PipelineError::Internal)?
            .ok_or(PipelineError::ProjectNotFound(project_id))?;

        let (execution, stages) = self
            .store
            .begin_execution(
                project_id,
                project.revision.clone(),
                options.clone(),
                self.config.staleness_threshold_secs,
                force_restart,
            )
            .await?;

        info!(
            "Started execution {} for project {} ({})",
            execution.id, project.name, project_id
        );

        let orchestrator = self.clone();
        let execution_id = execution.id;
        tokio::spawn(async move {
            orchestrator.run_pipeline(execution_id, project, options).await;
        });

        Ok(StartedAnalysis {
            execution_id,
            status: execution.status,
            stages,
        })
    }

    /// Execution summary plus the ordered stage list
    pub async fn status(
        &self,
        execution_id: Uuid,
    ) -> Result<(AnalysisExecution, Vec<StageRecord>), PipelineError> {
        self.store
            .get_with_stages(execution_id)
            .await
            .ok_or(PipelineError::ExecutionNotFound(execution_id))
    }

    /// Executions for a project, newest first
    pub async fn list_executions(&self, project_id: Uuid) -> Vec<AnalysisExecution> {
        self.store.list_for_project(project_id).await
    }

    /// Normalized findings of an execution
    pub async fn findings(&self, execution_id: Uuid) -> Vec<NormalizedFinding> {
        self.store.findings(execution_id).await
    }

    /// Cancel an execution. Stage advancement halts at the next stage
    /// boundary; an agent call already in flight finishes but its result
    /// is discarded.
    pub async fn cancel(&self, execution_id: Uuid) -> Result<AnalysisExecution, PipelineError> {
        let execution = self
            .store
            .get(execution_id)
            .await
            .ok_or(PipelineError::ExecutionNotFound(execution_id))?;
        if execution.status.is_active() {
            self.store
                .set_status(execution_id, ExecutionStatus::Cancelled)
                .await;
            info!("Cancelled execution {}", execution_id);
        }
        self.store
            .get(execution_id)
            .await
            .ok_or(PipelineError::ExecutionNotFound(execution_id))
    }

    /// Freeze a completed execution into a snapshot
    pub async fn capture_snapshot(
        &self,
        execution_id: Uuid,
    ) -> Result<SnapshotMeta, PipelineError> {
        let execution = self
            .store
            .get(execution_id)
            .await
            .ok_or(PipelineError::ExecutionNotFound(execution_id))?;
        if execution.status != ExecutionStatus::Completed {
            return Err(PipelineError::ExecutionNotComplete {
                execution_id,
                status: execution.status,
            });
        }

        let options = self.store.options(execution_id).await;
        let model_version = match (&self.enricher, options.enable_ai) {
            (Some(enricher), true) => enricher.model_version(),
            _ => self.config.snapshot.model_version.clone(),
        };

        let params = SnapshotParams {
            project_id: execution.project_id,
            execution_id,
            revision: execution.revision.clone(),
            pipeline_version: self.config.snapshot.pipeline_version.clone(),
            ruleset_version: self.config.snapshot.ruleset_version.clone(),
            model_version,
            config: serde_json::to_value(&options)?,
            findings: self.store.findings(execution_id).await,
            stats: self.store.stats(execution_id).await,
        };
        self.snapshots.create(params).await
    }

    async fn is_cancelled(&self, execution_id: Uuid) -> bool {
        matches!(
            self.store.get(execution_id).await,
            Some(AnalysisExecution {
                status: ExecutionStatus::Cancelled,
                ..
            })
        )
    }

    /// Pair the configured agent implementations with their registry
    /// entries, enabled only, ordered by priority
    async fn agents_with_entries(
        &self,
    ) -> Vec<(Arc<dyn AnalysisAgent>, heimdall_core::registry::AgentConfigEntry)> {
        let entries = self.registry.enabled_agents().await;
        let mut paired = Vec::new();
        for entry in entries {
            match self.agents.iter().find(|agent| agent.name() == entry.name) {
                Some(agent) => paired.push((Arc::clone(agent), entry)),
                None => debug!("No implementation registered for agent '{}'", entry.name),
            }
        }
        paired
    }

    /// Drive the stage sequence for one execution
    async fn run_pipeline(
        &self,
        execution_id: Uuid,
        project: ProjectRef,
        options: AnalysisOptions,
    ) {
        let started = Instant::now();
        let runner = AgentRunner::new(self.config.max_parallel_agents);

        let mut inventory = SourceInventory::default();
        let mut raw: Vec<RawFinding> = Vec::new();
        let mut categorized = Vec::new();
        let mut findings: Vec<NormalizedFinding> = Vec::new();

        for stage in AnalysisStage::ordered() {
            if self.is_cancelled(execution_id).await {
                info!("Execution {} cancelled, halting before {}", execution_id, stage);
                return;
            }

            self.store
                .update_stage(
                    execution_id,
                    stage,
                    StageStatus::Running,
                    10,
                    format!("{} running", stage.display_name()),
                )
                .await;

            let outcome: anyhow::Result<String> = match stage {
                AnalysisStage::SourceCollection => self
                    .collector
                    .collect(&project, &options)
                    .await
                    .and_then(|collected| {
                        if collected.files.is_empty() {
                            anyhow::bail!("no source files collected");
                        }
                        let message = format!("Collected {} files", collected.files.len());
                        inventory = collected;
                        Ok(message)
                    }),
                AnalysisStage::LanguageDetection => {
                    let histogram = inventory.language_histogram();
                    Ok(format!("Detected {} languages", histogram.len()))
                }
                AnalysisStage::AstParsing => Ok(format!(
                    "Prepared {} files ({} lines) for analysis",
                    inventory.files.len(),
                    inventory.total_lines()
                )),
                AnalysisStage::StaticAnalysis => {
                    let agents = self.agents_with_entries().await;
                    let context = AnalysisContext {
                        project: project.clone(),
                        options: options.clone(),
                        inventory: inventory.clone(),
                    };
                    runner.run(&agents, &context).await.map(|reported| {
                        let message = format!(
                            "{} agents reported {} raw findings",
                            agents.len(),
                            reported.len()
                        );
                        raw = reported;
                        message
                    })
                }
                AnalysisStage::RuleParsing => {
                    raw = merger::parse_rules(std::mem::take(&mut raw));
                    Ok(format!("Parsed rule ids for {} findings", raw.len()))
                }
                AnalysisStage::Categorization => {
                    categorized = merger::categorize(&raw);
                    Ok(format!("Categorized {} findings", categorized.len()))
                }
                AnalysisStage::Normalization => self
                    .merger
                    .normalize(std::mem::take(&mut categorized))
                    .await
                    .map(|normalized| {
                        let message = format!(
                            "Normalized to {} unique findings",
                            normalized.len()
                        );
                        findings = normalized;
                        message
                    }),
                AnalysisStage::AiEnhancement => {
                    if !options.enable_ai {
                        Ok("AI enhancement disabled for this run".to_string())
                    } else {
                        match &self.enricher {
                            None => Ok("No generative client configured".to_string()),
                            Some(enricher) => {
                                enricher.enrich(&mut findings).await.map(|report| {
                                    format!(
                                        "Enriched {} findings ({} rejected, {} duplicates)",
                                        report.enriched, report.rejected, report.duplicates
                                    )
                                })
                            }
                        }
                    }
                }
            };

            match outcome {
                Ok(message) => {
                    self.store
                        .update_stage(execution_id, stage, StageStatus::Completed, 100, message)
                        .await;
                }
                Err(e) => {
                    self.store
                        .update_stage(
                            execution_id,
                            stage,
                            StageStatus::Failed,
                            100,
                            e.to_string(),
                        )
                        .await;
                    if stage.required() {
                        error!(
                            "Required stage {} failed for execution {}: {}",
                            stage, execution_id, e
                        );
                        self.store
                            .set_status(execution_id, ExecutionStatus::Failed)
                            .await;
                        return;
                    }
                    warn!(
                        "{} failed for execution {}, continuing with deterministic findings: {}",
                        stage, execution_id, e
                    );
                }
            }
        }

        if self.is_cancelled(execution_id).await {
            info!("Execution {} cancelled, discarding results", execution_id);
            return;
        }

        let counts = SeverityCounts::from_findings(&findings);
        self.store
            .set_stats(
                execution_id,
                SummaryStats {
                    severity_counts: counts,
                    files_analyzed: inventory.files.len() as u32,
                    lines_of_code: inventory.total_lines(),
                    duration_ms: started.elapsed().as_millis() as u64,
                },
            )
            .await;
        self.store.set_findings(execution_id, findings.clone()).await;

        let judgment = self.judge.synthesize(execution_id, &findings).await;
        self.store
            .write_score(execution_id, judgment.overall_score, counts)
            .await;

        // completion is gated on the score actually being present; a
        // missing score is a fatal internal error, never a hung RUNNING
        match self.store.get(execution_id).await {
            Some(execution) if execution.overall_score.is_some() => {
                self.store
                    .set_status(execution_id, ExecutionStatus::Completed)
                    .await;
                info!(
                    "Execution {} completed: score {:.1}, risk {}, {} findings",
                    execution_id,
                    judgment.overall_score,
                    judgment.risk_level,
                    findings.len()
                );
            }
            _ => {
                error!(
                    "{}",
                    PipelineError::ScoreMissing { execution_id }
                );
                self.store
                    .set_status(execution_id, ExecutionStatus::Failed)
                    .await;
            }
        }
    }
}
