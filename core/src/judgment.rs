//! Judgment Synthesis Module
//!
//! Aggregates the normalized findings of one execution into per-category
//! scores, a weighted overall health score, a qualitative risk level, and a
//! short summary with prioritized recommendations. The summary prefers a
//! generative summarizer when one is wired in and falls back to a
//! deterministic heuristic otherwise.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{FindingCategory, NormalizedFinding, Severity};

/// Maximum number of recommendations carried by a judgment
const MAX_RECOMMENDATIONS: usize = 5;

/// Score deduction per finding severity
fn severity_weight(severity: Severity) -> f64 {
    match severity {
        Severity::Critical => 25.0,
        Severity::High => 15.0,
        Severity::Medium => 5.0,
        Severity::Low => 2.0,
        Severity::Info => 0.0,
    }
}

/// Weight of each category in the overall score
fn category_weight(category: FindingCategory) -> f64 {
    match category {
        FindingCategory::Security => 0.35,
        FindingCategory::Quality => 0.25,
        FindingCategory::Architecture => 0.20,
        FindingCategory::Performance => 0.15,
        FindingCategory::Other => 0.05,
    }
}

/// Qualitative risk classification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "LOW"),
            RiskLevel::Medium => write!(f, "MEDIUM"),
            RiskLevel::High => write!(f, "HIGH"),
            RiskLevel::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// The synthesized verdict for one execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Judgment {
    /// Execution the judgment belongs to
    pub execution_id: Uuid,
    /// Weighted overall score, 0-100
    pub overall_score: f64,
    /// Score per category, 0-100
    pub category_scores: HashMap<FindingCategory, f64>,
    /// Short human-readable summary
    pub summary: String,
    /// Prioritized recommendations, at most five
    pub recommendations: Vec<String>,
    /// Qualitative risk level
    pub risk_level: RiskLevel,
    /// When the judgment was generated
    pub generated_at: chrono::DateTime<chrono::Utc>,
}

/// Generative summarizer boundary; failures fall back to the heuristic
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Produce a summary and recommendations for the given findings
    async fn summarize(
        &self,
        findings: &[NormalizedFinding],
        overall_score: f64,
        risk_level: RiskLevel,
    ) -> anyhow::Result<SummaryText>;
}

/// Summary text produced by a summarizer
#[derive(Debug, Clone)]
pub struct SummaryText {
    pub summary: String,
    pub recommendations: Vec<String>,
}

/// Compute the per-category scores for a finding set.
///
/// Every category is present in the result; a category without findings
/// scores a full 100.
pub fn compute_category_scores(
    findings: &[NormalizedFinding],
) -> HashMap<FindingCategory, f64> {
    let mut deductions: HashMap<FindingCategory, f64> = HashMap::new();
    for finding in findings {
        *deductions.entry(finding.category).or_insert(0.0) += severity_weight(finding.severity);
    }

    FindingCategory::all()
        .into_iter()
        .map(|category| {
            let deduction = deductions.get(&category).copied().unwrap_or(0.0);
            (category, (100.0 - deduction).max(0.0))
        })
        .collect()
}

/// Weighted average of the category scores, normalized by the weights of
/// the categories present in the map.
pub fn compute_overall_score(category_scores: &HashMap<FindingCategory, f64>) -> f64 {
    let mut weighted_sum = 0.0;
    let mut weight_sum = 0.0;
    for (category, score) in category_scores {
        let weight = category_weight(*category);
        weighted_sum += weight * score;
        weight_sum += weight;
    }
    if weight_sum == 0.0 {
        return 100.0;
    }
    weighted_sum / weight_sum
}

/// Classify the risk for a finding set and overall score.
///
/// A single critical security finding forces `Critical` regardless of the
/// score.
pub fn classify_risk(findings: &[NormalizedFinding], overall_score: f64) -> RiskLevel {
    let critical_security = findings.iter().any(|f| {
        f.category == FindingCategory::Security && f.severity == Severity::Critical
    });
    if critical_security {
        return RiskLevel::Critical;
    }
    if overall_score < 40.0 {
        RiskLevel::High
    } else if overall_score < 70.0 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

/// Synthesizer producing one judgment per execution
pub struct JudgmentSynthesizer {
    summarizer: Option<Arc<dyn Summarizer>>,
}

impl JudgmentSynthesizer {
    /// Heuristic-only synthesizer
    pub fn new() -> Self {
        Self { summarizer: None }
    }

    /// Synthesizer preferring the given generative summarizer
    pub fn with_summarizer(summarizer: Arc<dyn Summarizer>) -> Self {
        Self {
            summarizer: Some(summarizer),
        }
    }

    /// Aggregate the findings of one execution into a judgment
    pub async fn synthesize(
        &self,
        execution_id: Uuid,
        findings: &[NormalizedFinding],
    ) -> Judgment {
        let category_scores = compute_category_scores(findings);
        let overall_score = compute_overall_score(&category_scores);
        let risk_level = classify_risk(findings, overall_score);

        let text = match &self.summarizer {
            Some(summarizer) => {
                match summarizer.summarize(findings, overall_score, risk_level).await {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("Generative summarizer failed, using heuristic: {}", e);
                        heuristic_summary(findings, &category_scores, overall_score, risk_level)
                    }
                }
            }
            None => heuristic_summary(findings, &category_scores, overall_score, risk_level),
        };

        let mut recommendations = text.recommendations;
        recommendations.truncate(MAX_RECOMMENDATIONS);

        debug!(
            "Synthesized judgment for execution {}: score {:.1}, risk {}",
            execution_id, overall_score, risk_level
        );

        Judgment {
            execution_id,
            overall_score,
            category_scores,
            summary: text.summary,
            recommendations,
            risk_level,
            generated_at: chrono::Utc::now(),
        }
    }
}

impl Default for JudgmentSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Deterministic summary used when no generative summarizer is available
fn heuristic_summary(
    findings: &[NormalizedFinding],
    category_scores: &HashMap<FindingCategory, f64>,
    overall_score: f64,
    risk_level: RiskLevel,
) -> SummaryText {
    let (weakest, weakest_score) = category_scores
        .iter()
        .min_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(category, score)| (*category, *score))
        .unwrap_or((FindingCategory::Other, 100.0));

    let summary = format!(
        "{} findings across {} files. Overall health score {:.1}/100, risk {}. Weakest category: {} ({:.0}/100).",
        findings.len(),
        findings
            .iter()
            .map(|f| f.file_path.as_str())
            .collect::<std::collections::HashSet<_>>()
            .len(),
        overall_score,
        risk_level,
        weakest,
        weakest_score,
    );

    let mut recommendations = Vec::new();
    let critical_security = findings.iter().any(|f| {
        f.category == FindingCategory::Security && f.severity == Severity::Critical
    });
    if critical_security {
        recommendations
            .push("Fix the critical security findings before any other work".to_string());
    }

    let quality_findings = findings
        .iter()
        .filter(|f| f.category == FindingCategory::Quality)
        .count();
    if quality_findings > 10 {
        recommendations.push(format!(
            "Schedule refactoring time: {} quality findings indicate recurring debt",
            quality_findings
        ));
    }

    let architecture_score = category_scores
        .get(&FindingCategory::Architecture)
        .copied()
        .unwrap_or(100.0);
    if architecture_score < 60.0 {
        recommendations
            .push("Document the intended architecture and module boundaries".to_string());
    }

    recommendations.push("Run the analysis on every merge to keep the score current".to_string());
    recommendations.push("Track the health score trend across snapshots".to_string());
    recommendations.truncate(MAX_RECOMMENDATIONS);

    SummaryText {
        summary,
        recommendations,
    }
}
