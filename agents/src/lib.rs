//! Heimdall Agents Module
//!
//! The agents module provides the analysis-agent boundary and the stage
//! orchestrator for the Heimdall pipeline. Agents report raw findings, the
//! merger normalizes them, the enrichment driver adds validated generative
//! explanations, and the orchestrator sequences it all per execution.

pub mod enrichment;
pub mod llm;
pub mod merger;
pub mod models;
pub mod orchestrator;
pub mod runner;

pub use enrichment::{Enricher, EnrichmentReport, LlmSummarizer};
pub use llm::{GenerativeClient, HttpGenerativeClient, LLMProvider, LLMProviderConfig};
pub use merger::{categorize, parse_rules, DefaultMerger, FindingMerger};
pub use models::{
    AnalysisAgent, AnalysisContext, FsSourceCollector, RawFinding, SourceCollector, SourceFile,
    SourceInventory, StaticSourceCollector,
};
pub use orchestrator::{ExecutionStore, Orchestrator, StartedAnalysis};
pub use runner::AgentRunner;
