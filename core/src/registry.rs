//! Agent Registry Module
//!
//! Holds the per-agent execution configuration (priority, timeout, retry
//! budget, enablement) behind a short-lived cache. Entries come from a
//! backing store via a provider trait; a two-tier provider falls back to the
//! built-in agent list when the store is unreachable.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::FindingCategory;

/// Registry record for one analysis agent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentConfigEntry {
    /// Stable agent name
    pub name: String,
    /// Human-readable display name
    pub display_name: String,
    /// Category the agent's findings default to
    pub category: FindingCategory,
    /// Scheduling priority, lower runs first
    pub priority: u32,
    /// Whether the agent participates in analysis runs
    pub enabled: bool,
    /// Per-invocation timeout in seconds
    pub timeout_secs: u64,
    /// Retries allowed after a transient failure
    pub retry_budget: u32,
    /// Optional prompt reference for generative agents
    pub prompt_ref: Option<String>,
    /// Optional model reference for generative agents
    pub model_ref: Option<String>,
}

impl AgentConfigEntry {
    fn builtin(
        name: &str,
        display_name: &str,
        category: FindingCategory,
        priority: u32,
    ) -> Self {
        Self {
            name: name.to_string(),
            display_name: display_name.to_string(),
            category,
            priority,
            enabled: true,
            timeout_secs: 30,
            retry_budget: 2,
            prompt_ref: None,
            model_ref: None,
        }
    }
}

/// The hard-coded agent set used when no backing store is reachable
pub fn builtin_entries() -> Vec<AgentConfigEntry> {
    vec![
        AgentConfigEntry::builtin(
            "structural",
            "Structural Analyzer",
            FindingCategory::Architecture,
            10,
        ),
        AgentConfigEntry::builtin("quality", "Quality Analyzer", FindingCategory::Quality, 20),
        AgentConfigEntry::builtin(
            "security",
            "Security Analyzer",
            FindingCategory::Security,
            30,
        ),
        AgentConfigEntry::builtin(
            "dependency",
            "Dependency Analyzer",
            FindingCategory::Security,
            40,
        ),
        AgentConfigEntry::builtin("style", "Style Analyzer", FindingCategory::Quality, 50),
        AgentConfigEntry::builtin("test", "Test Analyzer", FindingCategory::Quality, 60),
    ]
}

/// Source of agent configuration entries
#[async_trait]
pub trait AgentConfigProvider: Send + Sync {
    /// Load all entries from the backing store
    async fn load_entries(&self) -> anyhow::Result<Vec<AgentConfigEntry>>;
}

/// Provider serving a fixed entry list
pub struct StaticConfigProvider {
    entries: Vec<AgentConfigEntry>,
}

impl StaticConfigProvider {
    pub fn new(entries: Vec<AgentConfigEntry>) -> Self {
        Self { entries }
    }

    /// Provider serving the built-in agent set
    pub fn builtin() -> Self {
        Self::new(builtin_entries())
    }
}

#[async_trait]
impl AgentConfigProvider for StaticConfigProvider {
    async fn load_entries(&self) -> anyhow::Result<Vec<AgentConfigEntry>> {
        Ok(self.entries.clone())
    }
}

/// Two-tier provider: a primary backing store with a static fallback.
///
/// Selected at construction so the fallback path is testable on its own
/// rather than living in a catch block.
pub struct TwoTierProvider {
    primary: Arc<dyn AgentConfigProvider>,
    fallback: Vec<AgentConfigEntry>,
}

impl TwoTierProvider {
    pub fn new(primary: Arc<dyn AgentConfigProvider>, fallback: Vec<AgentConfigEntry>) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl AgentConfigProvider for TwoTierProvider {
    async fn load_entries(&self) -> anyhow::Result<Vec<AgentConfigEntry>> {
        match self.primary.load_entries().await {
            Ok(entries) => Ok(entries),
            Err(e) => {
                warn!("Agent config store unreachable, using fallback: {}", e);
                Ok(self.fallback.clone())
            }
        }
    }
}

struct CacheState {
    loaded_at: DateTime<Utc>,
    entries: Vec<AgentConfigEntry>,
}

/// Read-through cache over an agent configuration provider.
///
/// Refresh-on-expiry is safe to race: concurrent refreshes each write the
/// freshly loaded entries and the last write wins.
pub struct AgentRegistry {
    provider: Arc<dyn AgentConfigProvider>,
    ttl: Duration,
    cache: RwLock<Option<CacheState>>,
}

impl AgentRegistry {
    /// Create a registry over the given provider
    pub fn new(provider: Arc<dyn AgentConfigProvider>, ttl_secs: u64) -> Self {
        Self {
            provider,
            ttl: Duration::seconds(ttl_secs as i64),
            cache: RwLock::new(None),
        }
    }

    /// Registry over the built-in agent set only
    pub fn with_builtin(ttl_secs: u64) -> Self {
        Self::new(Arc::new(StaticConfigProvider::builtin()), ttl_secs)
    }

    /// All entries, refreshing the cache when expired
    pub async fn entries(&self) -> Vec<AgentConfigEntry> {
        {
            let cache = self.cache.read().await;
            if let Some(state) = cache.as_ref() {
                if Utc::now() - state.loaded_at < self.ttl {
                    return state.entries.clone();
                }
            }
        }

        self.refresh().await
    }

    /// Enabled entries sorted by priority, lowest first
    pub async fn enabled_agents(&self) -> Vec<AgentConfigEntry> {
        let mut entries: Vec<_> = self
            .entries()
            .await
            .into_iter()
            .filter(|entry| entry.enabled)
            .collect();
        entries.sort_by_key(|entry| entry.priority);
        entries
    }

    /// Look up one entry by name
    pub async fn get(&self, name: &str) -> Option<AgentConfigEntry> {
        self.entries()
            .await
            .into_iter()
            .find(|entry| entry.name == name)
    }

    /// Drop the cached entries, forcing a reload on next access
    pub async fn clear(&self) {
        let mut cache = self.cache.write().await;
        *cache = None;
    }

    async fn refresh(&self) -> Vec<AgentConfigEntry> {
        let entries = match self.provider.load_entries().await {
            Ok(entries) => entries,
            Err(e) => {
                // providers are expected to supply their own fallback; an
                // error here leaves the registry with the built-in set
                warn!("Agent config refresh failed, using built-in set: {}", e);
                builtin_entries()
            }
        };

        debug!("Refreshed agent registry with {} entries", entries.len());
        let mut cache = self.cache.write().await;
        *cache = Some(CacheState {
            loaded_at: Utc::now(),
            entries: entries.clone(),
        });
        entries
    }
}
