//! AI Enhancement Stage
//!
//! Enriches high-signal findings with generative explanations and turns
//! the judgment summary over to the model when one is configured. Every
//! piece of generative output passes through the core validator before it
//! is trusted; rejected output simply leaves the finding unenriched.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use heimdall_core::judgment::{RiskLevel, SummaryText, Summarizer};
use heimdall_core::validation::{EvidencePolicy, OutputValidator, ValidatedPayload};
use heimdall_core::{FindingCategory, NormalizedFinding, Severity};

use crate::llm::GenerativeClient;

/// Upper bound on findings enriched per run, highest severity first
const MAX_ENRICHED_FINDINGS: usize = 10;

/// Outcome counters for one enrichment pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrichmentReport {
    /// Findings that received a validated explanation
    pub enriched: usize,
    /// Outputs rejected by the validator
    pub rejected: usize,
    /// Accepted outputs flagged as duplicates
    pub duplicates: usize,
}

/// Enrichment driver for the AI-enhancement stage
pub struct Enricher {
    client: Arc<dyn GenerativeClient>,
    min_confidence: f64,
    evidence_policy: EvidencePolicy,
}

impl Enricher {
    pub fn new(
        client: Arc<dyn GenerativeClient>,
        min_confidence: f64,
        evidence_policy: EvidencePolicy,
    ) -> Self {
        Self {
            client,
            min_confidence,
            evidence_policy,
        }
    }

    /// Version string of the backing model
    pub fn model_version(&self) -> String {
        self.client.model_version()
    }

    /// Enrich the most severe findings in place.
    ///
    /// The validator's duplicate-detection state lives for exactly this
    /// call, scoping it to one pipeline run. Individual failures are
    /// tolerated; an error is returned only when every attempted call
    /// failed, which marks the stage as failed while the pipeline
    /// completes with deterministic findings only.
    pub async fn enrich(
        &self,
        findings: &mut [NormalizedFinding],
    ) -> anyhow::Result<EnrichmentReport> {
        let mut validator = OutputValidator::new(self.min_confidence, self.evidence_policy);
        let mut report = EnrichmentReport::default();

        let mut candidates: Vec<usize> = (0..findings.len())
            .filter(|&i| findings[i].severity >= Severity::High)
            .collect();
        candidates.sort_by(|&a, &b| findings[b].severity.cmp(&findings[a].severity));
        candidates.truncate(MAX_ENRICHED_FINDINGS);

        if candidates.is_empty() {
            return Ok(report);
        }

        let mut attempted = 0usize;
        let mut call_failures = 0usize;
        for index in candidates {
            attempted += 1;
            let finding = &findings[index];
            let response = match self.client.complete(SYSTEM_PROMPT, &explanation_prompt(finding)).await
            {
                Ok(response) => response,
                Err(e) => {
                    warn!(
                        "Enrichment call failed for {}: {}",
                        finding.fingerprint(),
                        e
                    );
                    call_failures += 1;
                    continue;
                }
            };

            let raw = match parse_json_response(&response) {
                Some(raw) => raw,
                None => {
                    debug!("Unparseable enrichment output for {}", finding.fingerprint());
                    report.rejected += 1;
                    continue;
                }
            };

            let validated = if finding.category == FindingCategory::Security {
                validator.validate_security_advice(&raw)
            } else {
                validator.validate_explanation(&raw)
            };

            if !validated.success {
                debug!(
                    "Enrichment output rejected for {}: {}",
                    finding.fingerprint(),
                    validated.error.as_deref().unwrap_or("unknown")
                );
                report.rejected += 1;
                continue;
            }
            if validated.is_duplicate() {
                report.duplicates += 1;
            }

            let explanation = match validated.payload {
                Some(ValidatedPayload::Explanation(payload)) => payload.text,
                Some(ValidatedPayload::SecurityAdvice(payload)) => payload.recommendation,
                Some(ValidatedPayload::Improvement(payload)) => payload.direction,
                None => continue,
            };
            findings[index].explanation = Some(explanation);
            report.enriched += 1;
        }

        if call_failures == attempted {
            return Err(anyhow::anyhow!(
                "all {} enrichment calls failed",
                attempted
            ));
        }
        Ok(report)
    }
}

const SYSTEM_PROMPT: &str = "You are a code-analysis assistant. Respond with a single JSON \
object and no surrounding prose.";

fn explanation_prompt(finding: &NormalizedFinding) -> String {
    if finding.category == FindingCategory::Security {
        format!(
            "Explain the security finding below and respond with JSON fields \
             recommendation, severity, confidence, cwe, owasp, mitigation_steps.\n\
             Rule: {}\nFile: {}:{}\nMessage: {}",
            finding.rule_id, finding.file_path, finding.line_start, finding.message
        )
    } else {
        format!(
            "Explain the finding below and respond with JSON fields text, \
             root_cause, impact, confidence, evidence.\n\
             Rule: {}\nFile: {}:{}\nMessage: {}",
            finding.rule_id, finding.file_path, finding.line_start, finding.message
        )
    }
}

/// Extract a JSON object from a model response, tolerating code fences
fn parse_json_response(response: &str) -> Option<serde_json::Value> {
    let trimmed = response.trim();
    let stripped = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed);
    serde_json::from_str(stripped.trim()).ok()
}

/// Judgment summarizer backed by the generative client
pub struct LlmSummarizer {
    client: Arc<dyn GenerativeClient>,
}

impl LlmSummarizer {
    pub fn new(client: Arc<dyn GenerativeClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(
        &self,
        findings: &[NormalizedFinding],
        overall_score: f64,
        risk_level: RiskLevel,
    ) -> anyhow::Result<SummaryText> {
        let mut overview = String::new();
        for finding in findings.iter().take(30) {
            overview.push_str(&format!(
                "- [{}] {} {}\n",
                finding.severity,
                finding.fingerprint(),
                finding.message
            ));
        }

        let prompt = format!(
            "The project scored {:.1}/100 (risk {}). Findings:\n{}\n\
             Respond with JSON fields summary (one paragraph) and \
             recommendations (array of at most 5 strings, most important first).",
            overall_score, risk_level, overview
        );
        let response = self.client.complete(SYSTEM_PROMPT, &prompt).await?;
        let raw = parse_json_response(&response)
            .ok_or_else(|| anyhow::anyhow!("summarizer returned non-JSON output"))?;

        let summary = raw["summary"]
            .as_str()
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("summarizer output missing 'summary'"))?
            .to_string();
        let recommendations = raw["recommendations"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(SummaryText {
            summary,
            recommendations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct CannedClient {
        responses: Mutex<Vec<anyhow::Result<String>>>,
    }

    impl CannedClient {
        fn new(responses: Vec<anyhow::Result<String>>) -> Self {
            Self {
                responses: Mutex::new(responses),
            }
        }
    }

    #[async_trait]
    impl GenerativeClient for CannedClient {
        async fn complete(&self, _system: &str, _prompt: &str) -> anyhow::Result<String> {
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                Err(anyhow::anyhow!("no canned response left"))
            } else {
                responses.remove(0)
            }
        }

        fn model_version(&self) -> String {
            "canned/test".to_string()
        }
    }

    fn finding(severity: Severity, category: FindingCategory, line: u32) -> NormalizedFinding {
        NormalizedFinding {
            file_path: "src/db.rs".to_string(),
            line_start: line,
            line_end: line,
            severity,
            category,
            subcategory: None,
            rule_id: "R1".to_string(),
            message: "finding".to_string(),
            suggestion: None,
            explanation: None,
            deterministic: true,
        }
    }

    fn enricher(responses: Vec<anyhow::Result<String>>) -> Enricher {
        Enricher::new(
            Arc::new(CannedClient::new(responses)),
            0.6,
            EvidencePolicy::Off,
        )
    }

    #[tokio::test]
    async fn test_validated_explanation_is_applied() {
        let response = r#"{"text": "The loop indexes past the buffer end.", "confidence": 0.9}"#;
        let e = enricher(vec![Ok(response.to_string())]);
        let mut findings = vec![finding(Severity::High, FindingCategory::Quality, 10)];

        let report = e.enrich(&mut findings).await.unwrap();
        assert_eq!(report.enriched, 1);
        assert_eq!(
            findings[0].explanation.as_deref(),
            Some("The loop indexes past the buffer end.")
        );
    }

    #[tokio::test]
    async fn test_low_confidence_output_is_not_trusted() {
        let response = r#"{"text": "Maybe something is wrong here.", "confidence": 0.2}"#;
        let e = enricher(vec![Ok(response.to_string())]);
        let mut findings = vec![finding(Severity::Critical, FindingCategory::Quality, 10)];

        let report = e.enrich(&mut findings).await.unwrap();
        assert_eq!(report.enriched, 0);
        assert_eq!(report.rejected, 1);
        assert!(findings[0].explanation.is_none());
    }

    #[tokio::test]
    async fn test_security_findings_use_advisory_shape() {
        let response = r#"```json
{"recommendation": "Use parameterized queries.", "severity": "CRITICAL", "confidence": 0.95, "cwe": "CWE-89"}
```"#;
        let e = enricher(vec![Ok(response.to_string())]);
        let mut findings = vec![finding(Severity::Critical, FindingCategory::Security, 42)];

        let report = e.enrich(&mut findings).await.unwrap();
        assert_eq!(report.enriched, 1);
        assert_eq!(
            findings[0].explanation.as_deref(),
            Some("Use parameterized queries.")
        );
    }

    #[tokio::test]
    async fn test_low_severity_findings_are_skipped() {
        let e = enricher(vec![]);
        let mut findings = vec![
            finding(Severity::Low, FindingCategory::Quality, 1),
            finding(Severity::Info, FindingCategory::Other, 2),
        ];
        let report = e.enrich(&mut findings).await.unwrap();
        assert_eq!(report, EnrichmentReport::default());
    }

    #[tokio::test]
    async fn test_total_provider_failure_is_an_error() {
        let e = enricher(vec![
            Err(anyhow::anyhow!("connection refused")),
            Err(anyhow::anyhow!("connection refused")),
        ]);
        let mut findings = vec![
            finding(Severity::High, FindingCategory::Quality, 1),
            finding(Severity::High, FindingCategory::Quality, 2),
        ];
        assert!(e.enrich(&mut findings).await.is_err());
    }

    #[tokio::test]
    async fn test_partial_failure_degrades_without_error() {
        let response = r#"{"text": "Valid explanation text.", "confidence": 0.8}"#;
        let e = enricher(vec![
            Err(anyhow::anyhow!("timeout")),
            Ok(response.to_string()),
        ]);
        let mut findings = vec![
            finding(Severity::High, FindingCategory::Quality, 1),
            finding(Severity::High, FindingCategory::Quality, 2),
        ];
        let report = e.enrich(&mut findings).await.unwrap();
        assert_eq!(report.enriched, 1);
    }

    #[tokio::test]
    async fn test_summarizer_parses_model_output() {
        let response = r#"{"summary": "Mostly healthy with one hot spot.", "recommendations": ["Fix the SQL injection", "Add tests"]}"#;
        let summarizer = LlmSummarizer::new(Arc::new(CannedClient::new(vec![Ok(
            response.to_string()
        )])));
        let text = summarizer.summarize(&[], 82.0, RiskLevel::Low).await.unwrap();
        assert_eq!(text.summary, "Mostly healthy with one hot spot.");
        assert_eq!(text.recommendations.len(), 2);
    }

    #[tokio::test]
    async fn test_summarizer_rejects_non_json() {
        let summarizer = LlmSummarizer::new(Arc::new(CannedClient::new(vec![Ok(
            "I think the project is fine.".to_string(),
        )])));
        assert!(summarizer.summarize(&[], 90.0, RiskLevel::Low).await.is_err());
    }
}
