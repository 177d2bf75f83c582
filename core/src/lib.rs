//! Heimdall Core Module
//!
//! The core module provides the domain model and the pipeline machinery for
//! the Heimdall code-health analysis system: executions and their stages,
//! normalized findings, generative-output validation, judgment synthesis,
//! and the snapshot store.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

pub mod config;
pub mod error;
pub mod judgment;
pub mod registry;
pub mod snapshot;
pub mod validation;

pub use config::PipelineConfig;
pub use error::PipelineError;
pub use judgment::{Judgment, JudgmentSynthesizer, RiskLevel};
pub use registry::{AgentConfigEntry, AgentRegistry};
pub use snapshot::{Snapshot, SnapshotDiff, SnapshotMeta, SnapshotStore};
pub use validation::{OutputValidator, ValidatedOutput};

/// Severity level of a finding, ordered from least to most severe
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    /// Informational only
    Info,
    /// Low severity
    Low,
    /// Medium severity
    Medium,
    /// High severity
    High,
    /// Critical severity
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "INFO"),
            Severity::Low => write!(f, "LOW"),
            Severity::Medium => write!(f, "MEDIUM"),
            Severity::High => write!(f, "HIGH"),
            Severity::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Main category a finding is bucketed under for scoring
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FindingCategory {
    /// Security vulnerabilities and unsafe patterns
    Security,
    /// Code quality and maintainability
    Quality,
    /// Architectural and structural concerns
    Architecture,
    /// Performance issues
    Performance,
    /// Everything that does not fit the categories above
    Other,
}

impl FindingCategory {
    /// Parse a raw category label; unrecognized labels fall into `Other`
    pub fn from_label(label: &str) -> Self {
        match label.to_ascii_uppercase().as_str() {
            "SECURITY" => FindingCategory::Security,
            "QUALITY" => FindingCategory::Quality,
            "ARCHITECTURE" => FindingCategory::Architecture,
            "PERFORMANCE" => FindingCategory::Performance,
            _ => FindingCategory::Other,
        }
    }

    /// All categories in scoring order
    pub fn all() -> [FindingCategory; 5] {
        [
            FindingCategory::Security,
            FindingCategory::Quality,
            FindingCategory::Architecture,
            FindingCategory::Performance,
            FindingCategory::Other,
        ]
    }
}

impl fmt::Display for FindingCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FindingCategory::Security => write!(f, "SECURITY"),
            FindingCategory::Quality => write!(f, "QUALITY"),
            FindingCategory::Architecture => write!(f, "ARCHITECTURE"),
            FindingCategory::Performance => write!(f, "PERFORMANCE"),
            FindingCategory::Other => write!(f, "OTHER"),
        }
    }
}

/// A single normalized issue produced by the analysis pipeline
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NormalizedFinding {
    /// Path of the affected file, relative to the project root
    pub file_path: String,
    /// First line of the affected range
    pub line_start: u32,
    /// Last line of the affected range
    pub line_end: u32,
    /// Severity level
    pub severity: Severity,
    /// Main category used for scoring
    pub category: FindingCategory,
    /// Optional sub-category label
    pub subcategory: Option<String>,
    /// Identifier of the rule that produced the finding
    pub rule_id: String,
    /// Human-readable description
    pub message: String,
    /// Optional suggested fix
    pub suggestion: Option<String>,
    /// Optional generative explanation, populated only after validation
    pub explanation: Option<String>,
    /// Whether the finding came from a rule engine rather than a model
    pub deterministic: bool,
}

impl NormalizedFinding {
    /// Stable identity of the finding across snapshots.
    ///
    /// Two findings sharing a fingerprint are the same issue for diffing
    /// purposes even when their message text differs.
    pub fn fingerprint(&self) -> String {
        format!("{}:{}:{}", self.file_path, self.line_start, self.rule_id)
    }
}

/// Revision metadata for the analyzed code
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RevisionInfo {
    /// Branch name
    pub branch: String,
    /// Commit hash
    pub commit: String,
    /// Optional tag
    pub tag: Option<String>,
}

/// Per-severity finding counts
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeverityCounts {
    pub critical: u32,
    pub high: u32,
    pub medium: u32,
    pub low: u32,
    pub info: u32,
}

impl SeverityCounts {
    /// Tally counts from a finding set
    pub fn from_findings(findings: &[NormalizedFinding]) -> Self {
        let mut counts = SeverityCounts::default();
        for finding in findings {
            counts.record(finding.severity);
        }
        counts
    }

    /// Record one finding of the given severity
    pub fn record(&mut self, severity: Severity) {
        match severity {
            Severity::Critical => self.critical += 1,
            Severity::High => self.high += 1,
            Severity::Medium => self.medium += 1,
            Severity::Low => self.low += 1,
            Severity::Info => self.info += 1,
        }
    }

    /// Total number of findings
    pub fn total(&self) -> u32 {
        self.critical + self.high + self.medium + self.low + self.info
    }
}

/// Status of one analysis execution
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    /// Whether the execution is still in flight
    pub fn is_active(&self) -> bool {
        matches!(self, ExecutionStatus::Pending | ExecutionStatus::Running)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionStatus::Pending => write!(f, "PENDING"),
            ExecutionStatus::Running => write!(f, "RUNNING"),
            ExecutionStatus::Completed => write!(f, "COMPLETED"),
            ExecutionStatus::Failed => write!(f, "FAILED"),
            ExecutionStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// One run of the analysis pipeline against one project revision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisExecution {
    /// Unique identifier for the execution
    pub id: Uuid,
    /// Project the execution belongs to
    pub project_id: Uuid,
    /// Current status
    pub status: ExecutionStatus,
    /// When the execution started
    pub started_at: chrono::DateTime<chrono::Utc>,
    /// When the execution reached a terminal status
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    /// Weighted overall health score, written by the judgment synthesizer
    pub overall_score: Option<f64>,
    /// Finding counts per severity
    pub severity_counts: SeverityCounts,
    /// Revision metadata for the analyzed code
    pub revision: RevisionInfo,
}

/// Pipeline stage, in fixed execution order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStage {
    SourceCollection,
    LanguageDetection,
    AstParsing,
    StaticAnalysis,
    RuleParsing,
    Categorization,
    Normalization,
    AiEnhancement,
}

impl AnalysisStage {
    /// All stages in their fixed execution order
    pub fn ordered() -> [AnalysisStage; 8] {
        [
            AnalysisStage::SourceCollection,
            AnalysisStage::LanguageDetection,
            AnalysisStage::AstParsing,
            AnalysisStage::StaticAnalysis,
            AnalysisStage::RuleParsing,
            AnalysisStage::Categorization,
            AnalysisStage::Normalization,
            AnalysisStage::AiEnhancement,
        ]
    }

    /// Whether a failure of this stage aborts the whole run.
    ///
    /// AI enhancement degrades gracefully; everything before it is required.
    pub fn required(&self) -> bool {
        !matches!(self, AnalysisStage::AiEnhancement)
    }

    /// Human-readable stage name
    pub fn display_name(&self) -> &'static str {
        match self {
            AnalysisStage::SourceCollection => "Source collection",
            AnalysisStage::LanguageDetection => "Language detection",
            AnalysisStage::AstParsing => "AST parsing",
            AnalysisStage::StaticAnalysis => "Static analysis",
            AnalysisStage::RuleParsing => "Rule parsing",
            AnalysisStage::Categorization => "Categorization",
            AnalysisStage::Normalization => "Normalization",
            AnalysisStage::AiEnhancement => "AI enhancement",
        }
    }
}

impl fmt::Display for AnalysisStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Status of one stage record
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl StageStatus {
    /// Terminal stage statuses never regress
    pub fn is_terminal(&self) -> bool {
        matches!(self, StageStatus::Completed | StageStatus::Failed)
    }
}

/// One pipeline stage within an execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRecord {
    /// Which stage this record tracks
    pub stage: AnalysisStage,
    /// Current status
    pub status: StageStatus,
    /// Progress from 0 to 100
    pub progress: u8,
    /// Human-readable status message
    pub message: String,
}

impl StageRecord {
    /// Create the initial pending record for a stage
    pub fn pending(stage: AnalysisStage) -> Self {
        Self {
            stage,
            status: StageStatus::Pending,
            progress: 0,
            message: String::new(),
        }
    }
}

/// Execution mode requested by the caller
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Analyze the full project
    #[default]
    Full,
    /// Analyze only files changed since the last execution
    Incremental,
    /// Run at the scheduled time
    Scheduled,
}

/// Options accepted when starting an analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisOptions {
    /// Whether to run the AI enhancement stage
    pub enable_ai: bool,
    /// Whether to run the slower deep-scan rule sets
    pub deep_scan: bool,
    /// Whether test sources are analyzed
    pub include_tests: bool,
    /// Execution mode
    pub mode: ExecutionMode,
    /// Optional scheduled start time
    pub scheduled_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            enable_ai: true,
            deep_scan: false,
            include_tests: false,
            mode: ExecutionMode::Full,
            scheduled_at: None,
        }
    }
}

/// A project known to the system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectRef {
    /// Unique identifier
    pub id: Uuid,
    /// Display name
    pub name: String,
    /// Filesystem path of the project root
    pub path: String,
    /// Revision currently checked out
    pub revision: RevisionInfo,
}

/// Read access to project metadata, backed by the project store collaborator
#[async_trait]
pub trait ProjectProvider: Send + Sync {
    /// Look up a project by id
    async fn get_project(&self, id: Uuid) -> anyhow::Result<Option<ProjectRef>>;
}

/// In-memory project store used for tests and single-process deployments
#[derive(Clone, Default)]
pub struct InMemoryProjectStore {
    projects: Arc<RwLock<HashMap<Uuid, ProjectRef>>>,
}

impl InMemoryProjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a project and return its id
    pub async fn insert(&self, project: ProjectRef) -> Uuid {
        let id = project.id;
        let mut projects = self.projects.write().await;
        projects.insert(id, project);
        id
    }
}

#[async_trait]
impl ProjectProvider for InMemoryProjectStore {
    async fn get_project(&self, id: Uuid) -> anyhow::Result<Option<ProjectRef>> {
        let projects = self.projects.read().await;
        Ok(projects.get(&id).cloned())
    }
}
