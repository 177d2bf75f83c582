//! Heimdall server binary
//!
//! Wires the analysis pipeline together and serves the HTTP API: in-memory
//! project and snapshot stores, the built-in agent registry, and an
//! optional local LLM for enrichment and summaries.

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use heimdall_agents::{
    DefaultMerger, Enricher, FsSourceCollector, HttpGenerativeClient, LLMProviderConfig,
    LlmSummarizer, Orchestrator,
};
use heimdall_api::ApiServer;
use heimdall_core::registry::AgentRegistry;
use heimdall_core::snapshot::{InMemorySnapshotStore, SnapshotStore};
use heimdall_core::{
    InMemoryProjectStore, JudgmentSynthesizer, PipelineConfig, ProjectRef, RevisionInfo,
};

#[derive(Parser)]
#[command(name = "heimdall", version, about = "Code-health analysis pipeline server")]
struct Args {
    /// Path to the configuration file
    #[arg(long, default_value = "heimdall.toml")]
    config: String,

    /// Seed a demo project with the given name at startup
    #[arg(long)]
    project: Option<String>,

    /// Enable generative enrichment via the configured local model
    #[arg(long)]
    llm: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = PipelineConfig::load(&args.config)?;

    let projects = InMemoryProjectStore::new();
    if let Some(name) = &args.project {
        let id = projects
            .insert(ProjectRef {
                id: Uuid::new_v4(),
                name: name.clone(),
                path: std::env::current_dir()?.display().to_string(),
                revision: RevisionInfo {
                    branch: "main".to_string(),
                    commit: "workdir".to_string(),
                    tag: None,
                },
            })
            .await;
        info!("Seeded project '{}' with id {}", name, id);
    }

    let snapshots: Arc<dyn SnapshotStore> =
        Arc::new(InMemorySnapshotStore::new(config.snapshot.capacity));
    let registry = Arc::new(AgentRegistry::with_builtin(config.registry_ttl_secs));

    let judge = if args.llm {
        let client = Arc::new(HttpGenerativeClient::new(LLMProviderConfig::default())?);
        Arc::new(JudgmentSynthesizer::with_summarizer(Arc::new(
            LlmSummarizer::new(client),
        )))
    } else {
        Arc::new(JudgmentSynthesizer::new())
    };

    let mut orchestrator = Orchestrator::new(
        config.clone(),
        Arc::new(projects),
        Arc::new(FsSourceCollector),
        registry,
        // agent implementations are registered by the embedding deployment;
        // the standalone server starts with none
        Vec::new(),
        Arc::new(DefaultMerger),
        judge,
        snapshots.clone(),
    );

    if args.llm && config.enable_ai {
        let client = Arc::new(HttpGenerativeClient::new(LLMProviderConfig::default())?);
        orchestrator = orchestrator.with_enricher(Arc::new(Enricher::new(
            client,
            config.validator.min_confidence,
            config.validator.evidence_policy,
        )));
    }

    let server = ApiServer::new(config.api.clone(), orchestrator, snapshots);
    server.start().await
}
