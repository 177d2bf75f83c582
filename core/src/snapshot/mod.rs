//! Snapshot Store Module
//!
//! A snapshot freezes one execution's inputs and outputs (revision
//! metadata, configuration, rule/tool versions, the normalized finding set,
//! and summary statistics) into an immutable, checksummed bundle. Storage
//! backends are pluggable behind the `SnapshotStore` trait; the bounded
//! in-memory store is the reference implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::{NormalizedFinding, RevisionInfo, SeverityCounts};

mod diff;
mod memory;

pub use diff::{compare, compare_snapshots, DiffSummary, FindingChange, SnapshotDiff};
pub use memory::InMemorySnapshotStore;

/// Summary statistics captured alongside the finding set
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SummaryStats {
    /// Finding counts per severity
    pub severity_counts: SeverityCounts,
    /// Number of files analyzed
    pub files_analyzed: u32,
    /// Total lines of code analyzed
    pub lines_of_code: u64,
    /// Wall-clock duration of the execution in milliseconds
    pub duration_ms: u64,
}

/// Snapshot metadata returned by listings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotMeta {
    /// Unique identifier
    pub id: Uuid,
    /// Project the snapshot belongs to
    pub project_id: Uuid,
    /// Execution the snapshot captured
    pub execution_id: Uuid,
    /// Creation timestamp
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// Revision metadata
    pub revision: RevisionInfo,
    /// Checksum over findings, configuration, and commit hash
    pub checksum: String,
    /// Summary statistics
    pub stats: SummaryStats,
}

/// An immutable capture of one execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Unique identifier
    pub id: Uuid,
    /// Project the snapshot belongs to
    pub project_id: Uuid,
    /// Execution the snapshot captured
    pub execution_id: Uuid,
    /// Creation timestamp
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// Revision metadata
    pub revision: RevisionInfo,
    /// Pipeline version that produced the snapshot
    pub pipeline_version: String,
    /// Rule set version used
    pub ruleset_version: String,
    /// Generative model version used, "none" when AI was disabled
    pub model_version: String,
    /// Full analysis configuration used
    pub config: serde_json::Value,
    /// The complete normalized finding set
    pub findings: Vec<NormalizedFinding>,
    /// Summary statistics
    pub stats: SummaryStats,
    /// Checksum over findings, configuration, and commit hash
    pub checksum: String,
}

impl Snapshot {
    /// Metadata view of the snapshot
    pub fn meta(&self) -> SnapshotMeta {
        SnapshotMeta {
            id: self.id,
            project_id: self.project_id,
            execution_id: self.execution_id,
            created_at: self.created_at,
            revision: self.revision.clone(),
            checksum: self.checksum.clone(),
            stats: self.stats.clone(),
        }
    }

    /// Recompute the checksum from the stored bundle
    pub fn recompute_checksum(&self) -> String {
        compute_checksum(&self.findings, &self.config, &self.revision.commit)
    }
}

/// Parameters for creating a snapshot
#[derive(Debug, Clone)]
pub struct SnapshotParams {
    pub project_id: Uuid,
    pub execution_id: Uuid,
    pub revision: RevisionInfo,
    pub pipeline_version: String,
    pub ruleset_version: String,
    pub model_version: String,
    pub config: serde_json::Value,
    pub findings: Vec<NormalizedFinding>,
    pub stats: SummaryStats,
}

/// The reduced finding view that participates in the checksum.
///
/// Kept as its own struct so unrelated finding fields can never drift into
/// the hash.
#[derive(Serialize)]
struct ChecksumEntry<'a> {
    file_path: &'a str,
    line_start: u32,
    rule_id: &'a str,
    severity: crate::Severity,
    message: &'a str,
}

/// Compute the snapshot checksum over the finding set, configuration, and
/// commit hash. Findings are sorted by fingerprint so set ordering never
/// leaks into the checksum.
pub fn compute_checksum(
    findings: &[NormalizedFinding],
    config: &serde_json::Value,
    commit: &str,
) -> String {
    let mut entries: Vec<ChecksumEntry<'_>> = findings
        .iter()
        .map(|f| ChecksumEntry {
            file_path: &f.file_path,
            line_start: f.line_start,
            rule_id: &f.rule_id,
            severity: f.severity,
            message: &f.message,
        })
        .collect();
    entries.sort_by(|a, b| {
        (a.file_path, a.line_start, a.rule_id).cmp(&(b.file_path, b.line_start, b.rule_id))
    });

    let mut hasher = Sha256::new();
    for entry in &entries {
        // serialization of a plain struct is infallible
        hasher.update(serde_json::to_string(entry).unwrap_or_default().as_bytes());
        hasher.update(b"\n");
    }
    hasher.update(config.to_string().as_bytes());
    hasher.update(b"\n");
    hasher.update(commit.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Storage contract for snapshots.
///
/// Durable backends must honor the same semantics as the in-memory
/// reference implementation, including duplicate-capture rejection and
/// checksum verification on load.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Persist a new snapshot; at most one per execution
    async fn create(&self, params: SnapshotParams) -> Result<SnapshotMeta, PipelineError>;

    /// List snapshot metadata for a project, newest first
    async fn list(&self, project_id: Uuid, limit: usize) -> Result<Vec<SnapshotMeta>, PipelineError>;

    /// Load a full snapshot bundle.
    ///
    /// A checksum mismatch on reload signals corruption and is returned as
    /// `PipelineError::SnapshotCorrupted`; it is never repaired.
    async fn load(&self, id: Uuid) -> Result<Snapshot, PipelineError>;

    /// Recompute the stored snapshot's checksum and compare
    async fn verify(&self, id: Uuid) -> Result<bool, PipelineError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FindingCategory, Severity};
    use serde_json::json;

    pub(super) fn finding(
        path: &str,
        line: u32,
        rule: &str,
        severity: Severity,
    ) -> NormalizedFinding {
        NormalizedFinding {
            file_path: path.to_string(),
            line_start: line,
            line_end: line,
            severity,
            category: FindingCategory::Quality,
            subcategory: None,
            rule_id: rule.to_string(),
            message: format!("{} at {}:{}", rule, path, line),
            suggestion: None,
            explanation: None,
            deterministic: true,
        }
    }

    #[test]
    fn test_checksum_is_stable() {
        let findings = vec![
            finding("a.rs", 10, "RULE1", Severity::High),
            finding("b.rs", 5, "RULE2", Severity::Low),
        ];
        let config = json!({ "enable_ai": true });
        let first = compute_checksum(&findings, &config, "abc123");
        let second = compute_checksum(&findings, &config, "abc123");
        assert_eq!(first, second);
    }

    #[test]
    fn test_checksum_ignores_finding_order() {
        let a = vec![
            finding("a.rs", 10, "RULE1", Severity::High),
            finding("b.rs", 5, "RULE2", Severity::Low),
        ];
        let b = vec![
            finding("b.rs", 5, "RULE2", Severity::Low),
            finding("a.rs", 10, "RULE1", Severity::High),
        ];
        let config = json!({});
        assert_eq!(
            compute_checksum(&a, &config, "abc"),
            compute_checksum(&b, &config, "abc")
        );
    }

    #[test]
    fn test_checksum_changes_with_severity() {
        let config = json!({});
        let high = vec![finding("a.rs", 10, "RULE1", Severity::High)];
        let critical = vec![finding("a.rs", 10, "RULE1", Severity::Critical)];
        assert_ne!(
            compute_checksum(&high, &config, "abc"),
            compute_checksum(&critical, &config, "abc")
        );
    }

    #[test]
    fn test_checksum_changes_with_commit_and_config() {
        let findings = vec![finding("a.rs", 10, "RULE1", Severity::High)];
        let base = compute_checksum(&findings, &json!({"deep_scan": false}), "abc");
        assert_ne!(
            base,
            compute_checksum(&findings, &json!({"deep_scan": false}), "def")
        );
        assert_ne!(
            base,
            compute_checksum(&findings, &json!({"deep_scan": true}), "abc")
        );
    }

    #[test]
    fn test_checksum_ignores_untracked_fields() {
        let mut with_suggestion = finding("a.rs", 10, "RULE1", Severity::High);
        with_suggestion.suggestion = Some("do it differently".to_string());
        let without = finding("a.rs", 10, "RULE1", Severity::High);
        let config = json!({});
        assert_eq!(
            compute_checksum(&[with_suggestion], &config, "abc"),
            compute_checksum(&[without], &config, "abc")
        );
    }
}
