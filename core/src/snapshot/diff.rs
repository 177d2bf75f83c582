//! Snapshot comparison
//!
//! Compares two snapshots by finding fingerprint and reports added,
//! removed, changed, and unchanged findings, plus the summary numbers
//! operators care about most: net change and critical-finding churn.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

use crate::error::PipelineError;
use crate::{NormalizedFinding, Severity};

use super::{Snapshot, SnapshotStore};

/// A finding present in both snapshots with differing tracked fields
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindingChange {
    /// Shared fingerprint `path:line:rule`
    pub fingerprint: String,
    /// Names of the fields that differ
    pub changes: Vec<String>,
    /// The finding as captured in the base snapshot
    pub before: NormalizedFinding,
    /// The finding as captured in the target snapshot
    pub after: NormalizedFinding,
}

/// The two counts operators read first, computed independently of the
/// added/removed lists
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiffSummary {
    /// Finding count delta, target minus base
    pub net_change: i64,
    /// Critical findings introduced by the target snapshot
    pub new_critical: u32,
    /// Critical findings resolved since the base snapshot
    pub resolved_critical: u32,
}

/// Full comparison result between two snapshots
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotDiff {
    /// Base snapshot id
    pub base_id: Uuid,
    /// Target snapshot id
    pub target_id: Uuid,
    /// Findings whose fingerprint exists only in the target
    pub added: Vec<NormalizedFinding>,
    /// Findings whose fingerprint exists only in the base
    pub removed: Vec<NormalizedFinding>,
    /// Findings present in both with differing tracked fields
    pub changed: Vec<FindingChange>,
    /// Findings identical on all tracked fields
    pub unchanged: u32,
    /// Headline numbers
    pub summary: DiffSummary,
}

/// Load both snapshots (integrity-checked) and compare them.
///
/// A corrupted snapshot fails the load and is never used in a comparison.
pub async fn compare(
    store: &dyn SnapshotStore,
    base_id: Uuid,
    target_id: Uuid,
) -> Result<SnapshotDiff, PipelineError> {
    let base = store.load(base_id).await?;
    let target = store.load(target_id).await?;
    Ok(compare_snapshots(&base, &target))
}

/// Compare two loaded snapshots by fingerprint
pub fn compare_snapshots(base: &Snapshot, target: &Snapshot) -> SnapshotDiff {
    let base_map = fingerprint_map(&base.findings);
    let target_map = fingerprint_map(&target.findings);

    let mut added = Vec::new();
    let mut removed = Vec::new();
    let mut changed = Vec::new();
    let mut unchanged = 0u32;

    // the critical counters are computed from the fingerprint maps in the
    // same pass, not by filtering the added/removed lists afterwards
    let mut new_critical = 0u32;
    let mut resolved_critical = 0u32;

    for (fingerprint, target_finding) in &target_map {
        match base_map.get(fingerprint) {
            None => {
                if target_finding.severity == Severity::Critical {
                    new_critical += 1;
                }
                added.push((*target_finding).clone());
            }
            Some(base_finding) => {
                let changes = changed_fields(base_finding, target_finding);
                if changes.is_empty() {
                    unchanged += 1;
                } else {
                    changed.push(FindingChange {
                        fingerprint: fingerprint.clone(),
                        changes,
                        before: (*base_finding).clone(),
                        after: (*target_finding).clone(),
                    });
                }
            }
        }
    }

    for (fingerprint, base_finding) in &base_map {
        if !target_map.contains_key(fingerprint) {
            if base_finding.severity == Severity::Critical {
                resolved_critical += 1;
            }
            removed.push((*base_finding).clone());
        }
    }

    added.sort_by_key(NormalizedFinding::fingerprint);
    removed.sort_by_key(NormalizedFinding::fingerprint);
    changed.sort_by(|a, b| a.fingerprint.cmp(&b.fingerprint));

    let summary = DiffSummary {
        net_change: target.findings.len() as i64 - base.findings.len() as i64,
        new_critical,
        resolved_critical,
    };

    debug!(
        "Compared snapshots {} -> {}: +{} -{} ~{} ={}",
        base.id,
        target.id,
        added.len(),
        removed.len(),
        changed.len(),
        unchanged
    );

    SnapshotDiff {
        base_id: base.id,
        target_id: target.id,
        added,
        removed,
        changed,
        unchanged,
        summary,
    }
}

fn fingerprint_map(findings: &[NormalizedFinding]) -> HashMap<String, &NormalizedFinding> {
    findings.iter().map(|f| (f.fingerprint(), f)).collect()
}

/// Tracked fields for change detection between two same-fingerprint findings
fn changed_fields(base: &NormalizedFinding, target: &NormalizedFinding) -> Vec<String> {
    let mut changes = Vec::new();
    if base.severity != target.severity {
        changes.push("severity".to_string());
    }
    if base.message != target.message {
        changes.push("message".to_string());
    }
    if base.suggestion != target.suggestion {
        changes.push("suggestion".to_string());
    }
    if base.explanation != target.explanation {
        changes.push("explanation".to_string());
    }
    if base.line_end != target.line_end {
        changes.push("line_end".to_string());
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::super::tests::finding;
    use super::super::{compute_checksum, SummaryStats};
    use super::*;
    use crate::RevisionInfo;
    use serde_json::json;

    fn snapshot(findings: Vec<NormalizedFinding>) -> Snapshot {
        let config = json!({ "enable_ai": false });
        let checksum = compute_checksum(&findings, &config, "abc123");
        Snapshot {
            id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            execution_id: Uuid::new_v4(),
            created_at: chrono::Utc::now(),
            revision: RevisionInfo {
                branch: "main".to_string(),
                commit: "abc123".to_string(),
                tag: None,
            },
            pipeline_version: "0.2.0".to_string(),
            ruleset_version: "builtin-1".to_string(),
            model_version: "none".to_string(),
            config,
            stats: SummaryStats::default(),
            findings,
            checksum,
        }
    }

    #[test]
    fn test_self_compare_is_empty() {
        let snap = snapshot(vec![
            finding("a.rs", 10, "RULE1", Severity::High),
            finding("b.rs", 5, "RULE2", Severity::Low),
        ]);
        let diff = compare_snapshots(&snap, &snap);
        assert!(diff.added.is_empty());
        assert!(diff.removed.is_empty());
        assert!(diff.changed.is_empty());
        assert_eq!(diff.unchanged, 2);
        assert_eq!(diff.summary.net_change, 0);
        assert_eq!(diff.summary.new_critical, 0);
        assert_eq!(diff.summary.resolved_critical, 0);
    }

    #[test]
    fn test_message_difference_is_a_change_not_a_new_finding() {
        let base = snapshot(vec![finding("a.rs", 10, "RULE1", Severity::High)]);
        let mut altered = finding("a.rs", 10, "RULE1", Severity::High);
        altered.message = "reworded description".to_string();
        let target = snapshot(vec![altered]);

        let diff = compare_snapshots(&base, &target);
        assert!(diff.added.is_empty());
        assert!(diff.removed.is_empty());
        assert_eq!(diff.changed.len(), 1);
        assert_eq!(diff.changed[0].changes, vec!["message"]);
    }

    #[test]
    fn test_severity_escalation_scenario() {
        // base: [{a.ts:10:RULE1:HIGH}]
        // target: [{a.ts:10:RULE1:CRITICAL}, {b.ts:5:RULE2:LOW}]
        let mut escalated = finding("a.ts", 10, "RULE1", Severity::Critical);
        escalated.message = finding("a.ts", 10, "RULE1", Severity::High).message;

        let base = snapshot(vec![finding("a.ts", 10, "RULE1", Severity::High)]);
        let target = snapshot(vec![escalated, finding("b.ts", 5, "RULE2", Severity::Low)]);

        let diff = compare_snapshots(&base, &target);
        assert_eq!(diff.added.len(), 1);
        assert_eq!(diff.added[0].fingerprint(), "b.ts:5:RULE2");
        assert!(diff.removed.is_empty());
        assert_eq!(diff.changed.len(), 1);
        assert_eq!(diff.changed[0].fingerprint, "a.ts:10:RULE1");
        assert_eq!(diff.changed[0].changes, vec!["severity"]);
        assert_eq!(diff.unchanged, 0);
        assert_eq!(diff.summary.net_change, 1);
    }

    #[test]
    fn test_critical_churn_counted_independently() {
        let base = snapshot(vec![
            finding("old.rs", 1, "SEC1", Severity::Critical),
            finding("keep.rs", 2, "Q1", Severity::Medium),
        ]);
        let target = snapshot(vec![
            finding("keep.rs", 2, "Q1", Severity::Medium),
            finding("new.rs", 3, "SEC2", Severity::Critical),
            finding("new.rs", 4, "SEC3", Severity::Critical),
            finding("new.rs", 5, "STYLE1", Severity::Info),
        ]);

        let diff = compare_snapshots(&base, &target);
        assert_eq!(diff.summary.new_critical, 2);
        assert_eq!(diff.summary.resolved_critical, 1);
        assert_eq!(diff.summary.net_change, 2);
        assert_eq!(diff.added.len(), 3);
        assert_eq!(diff.removed.len(), 1);
        assert_eq!(diff.unchanged, 1);
    }

    #[tokio::test]
    async fn test_compare_via_store() {
        use super::super::{InMemorySnapshotStore, SnapshotParams};
        use crate::SeverityCounts;

        let store = InMemorySnapshotStore::new(10);
        let project_id = Uuid::new_v4();

        let make_params = |findings: Vec<NormalizedFinding>| SnapshotParams {
            project_id,
            execution_id: Uuid::new_v4(),
            revision: RevisionInfo {
                branch: "main".to_string(),
                commit: "abc123".to_string(),
                tag: None,
            },
            pipeline_version: "0.2.0".to_string(),
            ruleset_version: "builtin-1".to_string(),
            model_version: "none".to_string(),
            config: json!({}),
            stats: SummaryStats {
                severity_counts: SeverityCounts::from_findings(&findings),
                ..SummaryStats::default()
            },
            findings,
        };

        let a = store
            .create(make_params(vec![finding("a.rs", 1, "R1", Severity::Low)]))
            .await
            .unwrap();
        let b = store
            .create(make_params(vec![
                finding("a.rs", 1, "R1", Severity::Low),
                finding("b.rs", 2, "R2", Severity::High),
            ]))
            .await
            .unwrap();

        let diff = compare(&store, a.id, b.id).await.unwrap();
        assert_eq!(diff.added.len(), 1);
        assert_eq!(diff.unchanged, 1);

        let missing = compare(&store, a.id, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(missing, PipelineError::SnapshotNotFound(_)));
    }
}
