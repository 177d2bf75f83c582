//! Finding Merger/Normalizer
//!
//! The merger boundary feeds the pipeline a flat list of normalized
//! findings; the pipeline treats the result as an unordered set keyed by
//! fingerprint. Rule parsing and categorization prepare the raw findings
//! before the merger reconciles them.

use async_trait::async_trait;
use std::collections::HashMap;
use tracing::debug;

use heimdall_core::{FindingCategory, NormalizedFinding};

use crate::models::RawFinding;

/// Rule id assigned when an agent reports a finding without one
const UNKNOWN_RULE: &str = "GEN-UNKNOWN";

/// Normalize rule identifiers: trimmed, uppercased, spaces collapsed to
/// dashes, empty ids replaced with a placeholder
pub fn parse_rules(mut raw: Vec<RawFinding>) -> Vec<RawFinding> {
    for finding in &mut raw {
        let normalized = finding
            .rule_id
            .trim()
            .to_ascii_uppercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("-");
        finding.rule_id = if normalized.is_empty() {
            UNKNOWN_RULE.to_string()
        } else {
            normalized
        };
    }
    raw
}

/// Resolve each raw finding's free-form category label to a main category,
/// keeping the original label as the subcategory when it carries more
/// detail than the bucket name
pub fn categorize(raw: &[RawFinding]) -> Vec<(RawFinding, FindingCategory, Option<String>)> {
    raw.iter()
        .map(|finding| {
            let category = FindingCategory::from_label(&finding.category_label);
            let subcategory = if finding.category_label.eq_ignore_ascii_case(&category.to_string())
            {
                None
            } else {
                Some(finding.category_label.clone())
            };
            (finding.clone(), category, subcategory)
        })
        .collect()
}

/// Merger/normalizer boundary
#[async_trait]
pub trait FindingMerger: Send + Sync {
    /// Reconcile categorized raw findings into the normalized set
    async fn normalize(
        &self,
        categorized: Vec<(RawFinding, FindingCategory, Option<String>)>,
    ) -> anyhow::Result<Vec<NormalizedFinding>>;
}

/// Default merger: deduplicates by fingerprint, keeping the most severe
/// report for each
pub struct DefaultMerger;

#[async_trait]
impl FindingMerger for DefaultMerger {
    async fn normalize(
        &self,
        categorized: Vec<(RawFinding, FindingCategory, Option<String>)>,
    ) -> anyhow::Result<Vec<NormalizedFinding>> {
        let total = categorized.len();
        let mut by_fingerprint: HashMap<String, NormalizedFinding> = HashMap::new();

        for (raw, category, subcategory) in categorized {
            let candidate = NormalizedFinding {
                file_path: raw.file_path,
                line_start: raw.line_start,
                line_end: raw.line_end.max(raw.line_start),
                severity: raw.severity,
                category,
                subcategory,
                rule_id: raw.rule_id,
                message: raw.message,
                suggestion: raw.suggestion,
                explanation: None,
                deterministic: true,
            };

            match by_fingerprint.entry(candidate.fingerprint()) {
                std::collections::hash_map::Entry::Vacant(slot) => {
                    slot.insert(candidate);
                }
                std::collections::hash_map::Entry::Occupied(mut slot) => {
                    if candidate.severity > slot.get().severity {
                        slot.insert(candidate);
                    }
                }
            }
        }

        let mut findings: Vec<NormalizedFinding> = by_fingerprint.into_values().collect();
        findings.sort_by_key(NormalizedFinding::fingerprint);
        debug!(
            "Normalized {} raw findings into {} unique findings",
            total,
            findings.len()
        );
        Ok(findings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heimdall_core::Severity;

    fn raw(path: &str, line: u32, rule: &str, severity: Severity, label: &str) -> RawFinding {
        RawFinding {
            agent: "quality".to_string(),
            file_path: path.to_string(),
            line_start: line,
            line_end: line,
            severity,
            category_label: label.to_string(),
            rule_id: rule.to_string(),
            message: format!("{} at {}", rule, line),
            suggestion: None,
        }
    }

    #[test]
    fn test_rule_parsing_normalizes_ids() {
        let parsed = parse_rules(vec![
            raw("a.rs", 1, "  no unwrap ", Severity::Low, "QUALITY"),
            raw("a.rs", 2, "", Severity::Low, "QUALITY"),
        ]);
        assert_eq!(parsed[0].rule_id, "NO-UNWRAP");
        assert_eq!(parsed[1].rule_id, "GEN-UNKNOWN");
    }

    #[test]
    fn test_categorization_maps_labels() {
        let raws = vec![
            raw("a.rs", 1, "R1", Severity::Low, "security"),
            raw("a.rs", 2, "R2", Severity::Low, "sql-injection"),
        ];
        let categorized = categorize(&raws);
        assert_eq!(categorized[0].1, FindingCategory::Security);
        assert_eq!(categorized[0].2, None);
        assert_eq!(categorized[1].1, FindingCategory::Other);
        assert_eq!(categorized[1].2.as_deref(), Some("sql-injection"));
    }

    #[tokio::test]
    async fn test_merge_keeps_highest_severity_per_fingerprint() {
        let raws = vec![
            raw("a.rs", 10, "R1", Severity::Medium, "QUALITY"),
            raw("a.rs", 10, "R1", Severity::High, "QUALITY"),
            raw("b.rs", 5, "R2", Severity::Low, "QUALITY"),
        ];
        let findings = DefaultMerger
            .normalize(categorize(&raws))
            .await
            .unwrap();
        assert_eq!(findings.len(), 2);
        let escalated = findings
            .iter()
            .find(|f| f.fingerprint() == "a.rs:10:R1")
            .unwrap();
        assert_eq!(escalated.severity, Severity::High);
    }

    #[tokio::test]
    async fn test_merge_output_is_deterministic() {
        let raws = vec![
            raw("b.rs", 5, "R2", Severity::Low, "QUALITY"),
            raw("a.rs", 10, "R1", Severity::Medium, "QUALITY"),
        ];
        let first = DefaultMerger.normalize(categorize(&raws)).await.unwrap();
        let second = DefaultMerger.normalize(categorize(&raws)).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first[0].fingerprint(), "a.rs:10:R1");
    }

    #[tokio::test]
    async fn test_line_end_never_precedes_line_start() {
        let mut finding = raw("a.rs", 10, "R1", Severity::Low, "QUALITY");
        finding.line_end = 3;
        let findings = DefaultMerger
            .normalize(categorize(&[finding]))
            .await
            .unwrap();
        assert_eq!(findings[0].line_end, 10);
    }
}
