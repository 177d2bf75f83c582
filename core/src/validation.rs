//! AI Output Validation Module
//!
//! This module validates raw generative output before the pipeline trusts
//! it. Three enrichment payload shapes are supported (explanation,
//! improvement, security advisory); each is checked structurally, gated on a
//! minimum confidence, and screened for near-duplicate text via content
//! hashing. Rejection is an expected outcome and is always returned as a
//! value, never as an error.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashSet;

use crate::Severity;

/// How the normalized primary text is reduced before hashing
const HASH_PREFIX_CHARS: usize = 160;

/// Policy for enrichment payloads that carry no evidence references
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EvidencePolicy {
    /// Evidence references are not checked
    Off,
    /// Missing evidence produces a warning
    Permissive,
    /// Missing evidence rejects the payload
    Strict,
}

/// Development effort estimated for an improvement
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EffortLevel {
    Low,
    Medium,
    High,
}

impl EffortLevel {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "low" => Some(EffortLevel::Low),
            "medium" => Some(EffortLevel::Medium),
            "high" => Some(EffortLevel::High),
            _ => None,
        }
    }
}

/// Validated explanation payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExplanationPayload {
    /// Explanation text
    pub text: String,
    /// Optional root-cause description
    pub root_cause: Option<String>,
    /// Optional impact description
    pub impact: Option<String>,
    /// Model confidence between 0 and 1
    pub confidence: f64,
    /// References backing the explanation (file paths, rule docs)
    pub evidence: Vec<String>,
}

/// Validated improvement payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImprovementPayload {
    /// Direction of the suggested change
    pub direction: String,
    /// Estimated effort
    pub effort: EffortLevel,
    /// Suggested priority
    pub priority: EffortLevel,
    /// Model confidence between 0 and 1
    pub confidence: f64,
}

/// Validated security advisory payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SecurityAdvicePayload {
    /// Recommended remediation
    pub recommendation: String,
    /// Severity claimed by the advisory
    pub severity: Severity,
    /// Model confidence between 0 and 1
    pub confidence: f64,
    /// Optional CWE reference
    pub cwe: Option<String>,
    /// Optional OWASP reference
    pub owasp: Option<String>,
    /// Concrete mitigation steps
    pub mitigation_steps: Vec<String>,
}

/// Structured payload accepted by the validator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidatedPayload {
    Explanation(ExplanationPayload),
    Improvement(ImprovementPayload),
    SecurityAdvice(SecurityAdvicePayload),
}

/// The validator's judgment over one piece of generative output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatedOutput {
    /// Whether the payload was accepted
    pub success: bool,
    /// Confidence reported by the payload, 0 when structurally absent
    pub confidence: f64,
    /// Structured payload when accepted
    pub payload: Option<ValidatedPayload>,
    /// Non-fatal warnings (missing evidence, duplicate text)
    pub warnings: Vec<String>,
    /// Rejection reason when not accepted
    pub error: Option<String>,
}

impl ValidatedOutput {
    fn accepted(confidence: f64, payload: ValidatedPayload, warnings: Vec<String>) -> Self {
        Self {
            success: true,
            confidence,
            payload: Some(payload),
            warnings,
            error: None,
        }
    }

    fn rejected(confidence: f64, reason: String) -> Self {
        Self {
            success: false,
            confidence,
            payload: None,
            warnings: Vec::new(),
            error: Some(reason),
        }
    }

    /// Whether the duplicate warning was raised
    pub fn is_duplicate(&self) -> bool {
        self.warnings.iter().any(|w| w.starts_with("duplicate"))
    }
}

/// Validator for generative enrichment output.
///
/// The seen-hash set is the only state; it is scoped to one pipeline run
/// and must not be shared across runs or projects.
pub struct OutputValidator {
    min_confidence: f64,
    evidence_policy: EvidencePolicy,
    seen_hashes: HashSet<String>,
}

impl OutputValidator {
    /// Create a validator with the given confidence minimum and policy
    pub fn new(min_confidence: f64, evidence_policy: EvidencePolicy) -> Self {
        Self {
            min_confidence,
            evidence_policy,
            seen_hashes: HashSet::new(),
        }
    }

    /// Clear accumulated duplicate-detection state
    pub fn reset(&mut self) {
        self.seen_hashes.clear();
    }

    /// Validate a raw explanation payload
    pub fn validate_explanation(&mut self, raw: &Value) -> ValidatedOutput {
        let text = match required_text(raw, "text") {
            Ok(text) => text,
            Err(reason) => return ValidatedOutput::rejected(0.0, reason),
        };
        let confidence = match required_confidence(raw) {
            Ok(confidence) => confidence,
            Err(reason) => return ValidatedOutput::rejected(0.0, reason),
        };
        if confidence < self.min_confidence {
            return self.reject_low_confidence(confidence);
        }

        let evidence = string_list(raw, "evidence");
        let mut warnings = Vec::new();
        if evidence.is_empty() {
            match self.evidence_policy {
                EvidencePolicy::Off => {}
                EvidencePolicy::Permissive => {
                    warnings.push("missing evidence references".to_string());
                }
                EvidencePolicy::Strict => {
                    return ValidatedOutput::rejected(
                        confidence,
                        "field 'evidence': required by policy but absent".to_string(),
                    );
                }
            }
        }

        self.check_duplicate(&text, &mut warnings);

        let payload = ValidatedPayload::Explanation(ExplanationPayload {
            text,
            root_cause: optional_text(raw, "root_cause"),
            impact: optional_text(raw, "impact"),
            confidence,
            evidence,
        });
        ValidatedOutput::accepted(confidence, payload, warnings)
    }

    /// Validate a raw improvement payload
    pub fn validate_improvement(&mut self, raw: &Value) -> ValidatedOutput {
        let direction = match required_text(raw, "direction") {
            Ok(direction) => direction,
            Err(reason) => return ValidatedOutput::rejected(0.0, reason),
        };
        let effort = match required_enum(raw, "effort") {
            Ok(effort) => effort,
            Err(reason) => return ValidatedOutput::rejected(0.0, reason),
        };
        let priority = match required_enum(raw, "priority") {
            Ok(priority) => priority,
            Err(reason) => return ValidatedOutput::rejected(0.0, reason),
        };
        let confidence = match required_confidence(raw) {
            Ok(confidence) => confidence,
            Err(reason) => return ValidatedOutput::rejected(0.0, reason),
        };
        if confidence < self.min_confidence {
            return self.reject_low_confidence(confidence);
        }

        let mut warnings = Vec::new();
        self.check_duplicate(&direction, &mut warnings);

        let payload = ValidatedPayload::Improvement(ImprovementPayload {
            direction,
            effort,
            priority,
            confidence,
        });
        ValidatedOutput::accepted(confidence, payload, warnings)
    }

    /// Validate a raw security advisory payload
    pub fn validate_security_advice(&mut self, raw: &Value) -> ValidatedOutput {
        let recommendation = match required_text(raw, "recommendation") {
            Ok(recommendation) => recommendation,
            Err(reason) => return ValidatedOutput::rejected(0.0, reason),
        };
        let severity = match raw.get("severity") {
            Some(value) => match serde_json::from_value::<Severity>(value.clone()) {
                Ok(severity) => severity,
                Err(_) => {
                    return ValidatedOutput::rejected(
                        0.0,
                        format!("field 'severity': unrecognized value {}", value),
                    )
                }
            },
            None => return ValidatedOutput::rejected(0.0, "field 'severity': missing".to_string()),
        };
        let confidence = match required_confidence(raw) {
            Ok(confidence) => confidence,
            Err(reason) => return ValidatedOutput::rejected(0.0, reason),
        };
        if confidence < self.min_confidence {
            return self.reject_low_confidence(confidence);
        }

        let cwe = optional_text(raw, "cwe");
        let owasp = optional_text(raw, "owasp");
        let mut warnings = Vec::new();
        if cwe.is_none() && owasp.is_none() {
            warnings.push("no CWE or OWASP reference".to_string());
        }

        self.check_duplicate(&recommendation, &mut warnings);

        let payload = ValidatedPayload::SecurityAdvice(SecurityAdvicePayload {
            recommendation,
            severity,
            confidence,
            cwe,
            owasp,
            mitigation_steps: string_list(raw, "mitigation_steps"),
        });
        ValidatedOutput::accepted(confidence, payload, warnings)
    }

    fn reject_low_confidence(&self, confidence: f64) -> ValidatedOutput {
        ValidatedOutput::rejected(
            confidence,
            format!(
                "confidence {:.2} below minimum {:.2}",
                confidence, self.min_confidence
            ),
        )
    }

    /// Flag near-identical text and record the hash of accepted output
    fn check_duplicate(&mut self, primary_text: &str, warnings: &mut Vec<String>) {
        let hash = normalization_hash(primary_text);
        if self.seen_hashes.contains(&hash) {
            warnings.push("duplicate of previously seen output".to_string());
        } else {
            self.seen_hashes.insert(hash);
        }
    }
}

/// Hash of the whitespace-collapsed, lowercased text, reduced to a fixed
/// prefix plus the normalized length so long texts stay cheap to compare.
pub fn normalization_hash(text: &str) -> String {
    let normalized = text
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    let prefix: String = normalized.chars().take(HASH_PREFIX_CHARS).collect();

    let mut hasher = Sha256::new();
    hasher.update(prefix.as_bytes());
    hasher.update(normalized.chars().count().to_le_bytes());
    format!("{:x}", hasher.finalize())
}

fn required_text(raw: &Value, field: &str) -> Result<String, String> {
    match raw.get(field) {
        Some(Value::String(text)) if !text.trim().is_empty() => Ok(text.clone()),
        Some(Value::String(_)) => Err(format!("field '{}': must not be empty", field)),
        Some(other) => Err(format!(
            "field '{}': expected string, got {}",
            field, other
        )),
        None => Err(format!("field '{}': missing", field)),
    }
}

fn optional_text(raw: &Value, field: &str) -> Option<String> {
    raw.get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

fn required_confidence(raw: &Value) -> Result<f64, String> {
    match raw.get("confidence").and_then(Value::as_f64) {
        Some(confidence) if (0.0..=1.0).contains(&confidence) => Ok(confidence),
        Some(confidence) => Err(format!(
            "field 'confidence': must be between 0 and 1, got {}",
            confidence
        )),
        None => Err("field 'confidence': missing or not a number".to_string()),
    }
}

fn required_enum(raw: &Value, field: &str) -> Result<EffortLevel, String> {
    match raw.get(field).and_then(Value::as_str) {
        Some(value) => EffortLevel::parse(value)
            .ok_or_else(|| format!("field '{}': expected low|medium|high, got '{}'", field, value)),
        None => Err(format!("field '{}': missing", field)),
    }
}

fn string_list(raw: &Value, field: &str) -> Vec<String> {
    raw.get(field)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn validator() -> OutputValidator {
        OutputValidator::new(0.6, EvidencePolicy::Permissive)
    }

    #[test]
    fn test_explanation_accepted() {
        let mut v = validator();
        let result = v.validate_explanation(&json!({
            "text": "The query concatenates user input into SQL.",
            "root_cause": "missing parameterization",
            "confidence": 0.9,
            "evidence": ["src/db.rs:42"]
        }));
        assert!(result.success);
        assert!(result.warnings.is_empty());
        match result.payload {
            Some(ValidatedPayload::Explanation(payload)) => {
                assert_eq!(payload.evidence.len(), 1);
                assert_eq!(payload.root_cause.as_deref(), Some("missing parameterization"));
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[test]
    fn test_structural_rejection_names_field() {
        let mut v = validator();
        let result = v.validate_explanation(&json!({ "confidence": 0.9 }));
        assert!(!result.success);
        assert!(result.error.unwrap().contains("field 'text'"));

        let result = v.validate_explanation(&json!({ "text": 42, "confidence": 0.9 }));
        assert!(result.error.unwrap().contains("expected string"));
    }

    #[test]
    fn test_confidence_boundary() {
        let mut v = validator();
        let at_minimum = v.validate_explanation(&json!({
            "text": "exactly at the gate",
            "confidence": 0.6
        }));
        assert!(at_minimum.success);

        let below = v.validate_explanation(&json!({
            "text": "just under the gate",
            "confidence": 0.6 - 1e-9
        }));
        assert!(!below.success);
        assert!(below.error.unwrap().contains("below minimum"));
    }

    #[test]
    fn test_missing_evidence_permissive_warns() {
        let mut v = validator();
        let result = v.validate_explanation(&json!({
            "text": "no evidence attached",
            "confidence": 0.8
        }));
        assert!(result.success);
        assert!(result
            .warnings
            .iter()
            .any(|w| w.contains("missing evidence")));
    }

    #[test]
    fn test_missing_evidence_strict_rejects() {
        let mut v = OutputValidator::new(0.6, EvidencePolicy::Strict);
        let result = v.validate_explanation(&json!({
            "text": "no evidence attached",
            "confidence": 0.8
        }));
        assert!(!result.success);
        assert!(result.error.unwrap().contains("evidence"));
    }

    #[test]
    fn test_duplicate_warning_on_second_submission_only() {
        let mut v = validator();
        let first = v.validate_explanation(&json!({
            "text": "Unchecked  index   access in loop",
            "confidence": 0.9,
            "evidence": ["a.rs:1"]
        }));
        assert!(first.success);
        assert!(!first.is_duplicate());

        // whitespace and casing variations still count as the same text
        let second = v.validate_explanation(&json!({
            "text": "unchecked index access in LOOP",
            "confidence": 0.9,
            "evidence": ["a.rs:1"]
        }));
        assert!(second.success);
        assert!(second.is_duplicate());
    }

    #[test]
    fn test_rejected_output_does_not_record_hash() {
        let mut v = validator();
        let rejected = v.validate_explanation(&json!({
            "text": "low confidence text",
            "confidence": 0.1
        }));
        assert!(!rejected.success);

        // same text later at acceptable confidence is not a duplicate
        let accepted = v.validate_explanation(&json!({
            "text": "low confidence text",
            "confidence": 0.9,
            "evidence": ["b.rs:2"]
        }));
        assert!(accepted.success);
        assert!(!accepted.is_duplicate());
    }

    #[test]
    fn test_reset_clears_duplicate_state() {
        let mut v = validator();
        let payload = json!({
            "text": "repeated across runs",
            "confidence": 0.9,
            "evidence": ["c.rs:3"]
        });
        assert!(!v.validate_explanation(&payload).is_duplicate());
        v.reset();
        assert!(!v.validate_explanation(&payload).is_duplicate());
    }

    #[test]
    fn test_improvement_requires_known_effort() {
        let mut v = validator();
        let result = v.validate_improvement(&json!({
            "direction": "extract the parsing logic into its own module",
            "effort": "gigantic",
            "priority": "high",
            "confidence": 0.8
        }));
        assert!(!result.success);
        assert!(result.error.unwrap().contains("field 'effort'"));

        let result = v.validate_improvement(&json!({
            "direction": "extract the parsing logic into its own module",
            "effort": "medium",
            "priority": "high",
            "confidence": 0.8
        }));
        assert!(result.success);
    }

    #[test]
    fn test_security_advice_reference_warning() {
        let mut v = validator();
        let without_refs = v.validate_security_advice(&json!({
            "recommendation": "use parameterized queries",
            "severity": "HIGH",
            "confidence": 0.9,
            "mitigation_steps": ["replace string concatenation"]
        }));
        assert!(without_refs.success);
        assert!(without_refs
            .warnings
            .iter()
            .any(|w| w.contains("CWE or OWASP")));

        let with_cwe = v.validate_security_advice(&json!({
            "recommendation": "escape shell arguments",
            "severity": "CRITICAL",
            "confidence": 0.9,
            "cwe": "CWE-78"
        }));
        assert!(with_cwe.success);
        assert!(!with_cwe.warnings.iter().any(|w| w.contains("CWE or OWASP")));
    }

    #[test]
    fn test_normalization_hash_stability() {
        assert_eq!(
            normalization_hash("Some  Text\nhere"),
            normalization_hash("some text here")
        );
        assert_ne!(
            normalization_hash("some text here"),
            normalization_hash("some other text here")
        );
    }
}
