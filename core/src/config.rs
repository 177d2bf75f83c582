//! Configuration Management Module
//!
//! This module provides configuration for the analysis pipeline, including
//! file-based configuration, environment variable integration, and
//! validation.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

use crate::validation::EvidencePolicy;

/// Main pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Seconds after which an in-flight execution is considered stale
    pub staleness_threshold_secs: u64,
    /// Maximum number of analysis agents running concurrently
    pub max_parallel_agents: usize,
    /// Whether the AI enhancement stage runs by default
    pub enable_ai: bool,
    /// Validator settings
    pub validator: ValidatorConfig,
    /// Snapshot store settings
    pub snapshot: SnapshotConfig,
    /// Registry cache time-to-live in seconds
    pub registry_ttl_secs: u64,
    /// API server settings
    pub api: ApiConfig,
}

/// AI output validator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorConfig {
    /// Minimum confidence required to trust generative output
    pub min_confidence: f64,
    /// How missing evidence references are treated
    pub evidence_policy: EvidencePolicy,
}

/// Snapshot store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Maximum snapshots retained by the in-memory backend
    pub capacity: usize,
    /// Pipeline version string recorded in every snapshot
    pub pipeline_version: String,
    /// Rule set version string recorded in every snapshot
    pub ruleset_version: String,
    /// Model version string recorded in every snapshot
    pub model_version: String,
}

/// API server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Host to bind
    pub host: String,
    /// Port to bind
    pub port: u16,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            staleness_threshold_secs: 600,
            max_parallel_agents: 4,
            enable_ai: true,
            validator: ValidatorConfig {
                min_confidence: 0.6,
                evidence_policy: EvidencePolicy::Permissive,
            },
            snapshot: SnapshotConfig {
                capacity: 100,
                pipeline_version: env!("CARGO_PKG_VERSION").to_string(),
                ruleset_version: "builtin-1".to_string(),
                model_version: "none".to_string(),
            },
            registry_ttl_secs: 60,
            api: ApiConfig {
                host: "127.0.0.1".to_string(),
                port: 8090,
            },
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a TOML file, falling back to defaults when
    /// the file does not exist, then apply environment overrides.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let mut config = if path.exists() {
            let content = fs::read_to_string(path)?;
            let config: PipelineConfig = toml::from_str(&content)?;
            debug!("Loaded pipeline configuration from {}", path.display());
            config
        } else {
            warn!(
                "Configuration file {} not found, using defaults",
                path.display()
            );
            PipelineConfig::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var("HEIMDALL_STALENESS_THRESHOLD_SECS") {
            if let Ok(secs) = value.parse() {
                self.staleness_threshold_secs = secs;
            }
        }

        if let Ok(value) = std::env::var("HEIMDALL_MAX_PARALLEL_AGENTS") {
            if let Ok(count) = value.parse() {
                self.max_parallel_agents = count;
            }
        }

        if let Ok(value) = std::env::var("HEIMDALL_ENABLE_AI") {
            self.enable_ai = matches!(value.to_lowercase().as_str(), "1" | "true" | "yes");
        }

        if let Ok(value) = std::env::var("HEIMDALL_MIN_CONFIDENCE") {
            if let Ok(confidence) = value.parse() {
                self.validator.min_confidence = confidence;
            }
        }

        if let Ok(value) = std::env::var("HEIMDALL_API_HOST") {
            self.api.host = value;
        }

        if let Ok(value) = std::env::var("HEIMDALL_API_PORT") {
            if let Ok(port) = value.parse() {
                self.api.port = port;
            }
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.staleness_threshold_secs == 0 {
            return Err(anyhow!("staleness_threshold_secs must be greater than 0"));
        }

        if self.max_parallel_agents == 0 {
            return Err(anyhow!("max_parallel_agents must be greater than 0"));
        }

        if !(0.0..=1.0).contains(&self.validator.min_confidence) {
            return Err(anyhow!(
                "min_confidence must be between 0.0 and 1.0, got {}",
                self.validator.min_confidence
            ));
        }

        if self.snapshot.capacity == 0 {
            return Err(anyhow!("snapshot capacity must be greater than 0"));
        }

        Ok(())
    }
}
