//! Concurrent agent invocation
//!
//! Runs the enabled analysis agents for the static-analysis stage. Agents
//! run concurrently up to a configured parallelism factor; each invocation
//! is bounded by the agent's configured timeout and retried within its
//! retry budget. The stage boundary is a barrier: all agents report before
//! the combined result is returned.

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use heimdall_core::registry::AgentConfigEntry;

use crate::models::{AnalysisAgent, AnalysisContext, RawFinding};

/// Runner for the static-analysis stage
pub struct AgentRunner {
    max_parallel: usize,
}

impl AgentRunner {
    /// Create a runner with the given parallelism bound
    pub fn new(max_parallel: usize) -> Self {
        Self {
            max_parallel: max_parallel.max(1),
        }
    }

    /// Run all agents and combine their raw findings.
    ///
    /// Any agent that exhausts its retry budget fails the whole stage; the
    /// remaining agents still run to completion first so the failure
    /// message reflects the full picture.
    pub async fn run(
        &self,
        agents: &[(Arc<dyn AnalysisAgent>, AgentConfigEntry)],
        context: &AnalysisContext,
    ) -> anyhow::Result<Vec<RawFinding>> {
        let prepared: Vec<(Arc<dyn AnalysisAgent>, AgentConfigEntry)> = agents.to_vec();
        let mut futures = Vec::with_capacity(prepared.len());
        for (agent, entry) in prepared {
            futures.push(run_one(agent, entry, context));
        }
        let results: Vec<(String, anyhow::Result<Vec<RawFinding>>)> = stream::iter(futures)
            .buffer_unordered(self.max_parallel)
            .collect()
            .await;

        let mut findings = Vec::new();
        let mut failures = Vec::new();
        for (name, result) in results {
            match result {
                Ok(agent_findings) => {
                    debug!("Agent '{}' reported {} findings", name, agent_findings.len());
                    findings.extend(agent_findings);
                }
                Err(e) => failures.push(format!("{}: {}", name, e)),
            }
        }

        if !failures.is_empty() {
            return Err(anyhow::anyhow!(
                "{} agent(s) failed: {}",
                failures.len(),
                failures.join("; ")
            ));
        }
        Ok(findings)
    }
}

/// Run a single agent to completion, pairing the result with its name
async fn run_one(
    agent: Arc<dyn AnalysisAgent>,
    entry: AgentConfigEntry,
    context: &AnalysisContext,
) -> (String, anyhow::Result<Vec<RawFinding>>) {
    let result = run_with_budget(agent.as_ref(), &entry, context).await;
    (entry.name, result)
}

/// Invoke one agent under its configured timeout, retrying transient
/// failures up to the retry budget
async fn run_with_budget(
    agent: &dyn AnalysisAgent,
    entry: &AgentConfigEntry,
    context: &AnalysisContext,
) -> anyhow::Result<Vec<RawFinding>> {
    let timeout = Duration::from_secs(entry.timeout_secs);
    let attempts = entry.retry_budget + 1;

    let mut last_error = None;
    for attempt in 1..=attempts {
        match tokio::time::timeout(timeout, agent.analyze(context)).await {
            Ok(Ok(findings)) => return Ok(findings),
            Ok(Err(e)) => {
                warn!(
                    "Agent '{}' attempt {}/{} failed: {}",
                    entry.name, attempt, attempts, e
                );
                last_error = Some(e);
            }
            Err(_) => {
                warn!(
                    "Agent '{}' attempt {}/{} timed out after {}s",
                    entry.name, attempt, attempts, entry.timeout_secs
                );
                last_error = Some(anyhow::anyhow!(
                    "timed out after {}s",
                    entry.timeout_secs
                ));
            }
        }
    }

    Err(last_error.unwrap_or_else(|| anyhow::anyhow!("agent produced no result")))
}
