//! Bounded in-memory snapshot store, the reference backend

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::PipelineError;

use super::{compute_checksum, Snapshot, SnapshotMeta, SnapshotParams, SnapshotStore};

struct StoreState {
    snapshots: HashMap<Uuid, Snapshot>,
    /// One snapshot per execution; duplicate captures are rejected
    by_execution: HashMap<Uuid, Uuid>,
}

/// In-memory snapshot store with a bounded capacity.
///
/// When full, the oldest snapshot by creation time is evicted.
pub struct InMemorySnapshotStore {
    capacity: usize,
    state: Arc<RwLock<StoreState>>,
}

impl InMemorySnapshotStore {
    /// Create a store retaining at most `capacity` snapshots
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Arc::new(RwLock::new(StoreState {
                snapshots: HashMap::new(),
                by_execution: HashMap::new(),
            })),
        }
    }

    /// Number of snapshots currently retained
    pub async fn len(&self) -> usize {
        self.state.read().await.snapshots.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Flip one stored finding's severity without updating the checksum,
    /// simulating on-disk corruption
    #[cfg(test)]
    pub(crate) async fn corrupt_for_test(&self, id: Uuid) {
        let mut state = self.state.write().await;
        if let Some(snapshot) = state.snapshots.get_mut(&id) {
            if let Some(finding) = snapshot.findings.first_mut() {
                finding.severity = crate::Severity::Info;
            }
        }
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn create(&self, params: SnapshotParams) -> Result<SnapshotMeta, PipelineError> {
        // the write lock serializes concurrent create calls for the same
        // execution; the second caller observes the index entry and is
        // rejected instead of silently duplicating the capture
        let mut state = self.state.write().await;

        if state.by_execution.contains_key(&params.execution_id) {
            return Err(PipelineError::SnapshotExists {
                execution_id: params.execution_id,
            });
        }

        let checksum = compute_checksum(&params.findings, &params.config, &params.revision.commit);
        let snapshot = Snapshot {
            id: Uuid::new_v4(),
            project_id: params.project_id,
            execution_id: params.execution_id,
            created_at: chrono::Utc::now(),
            revision: params.revision,
            pipeline_version: params.pipeline_version,
            ruleset_version: params.ruleset_version,
            model_version: params.model_version,
            config: params.config,
            findings: params.findings,
            stats: params.stats,
            checksum,
        };
        let meta = snapshot.meta();

        if state.snapshots.len() >= self.capacity {
            let oldest = state
                .snapshots
                .values()
                .min_by_key(|s| s.created_at)
                .map(|s| (s.id, s.execution_id));
            if let Some((id, execution_id)) = oldest {
                warn!("Snapshot store at capacity, evicting oldest snapshot {}", id);
                state.snapshots.remove(&id);
                state.by_execution.remove(&execution_id);
            }
        }

        state.by_execution.insert(meta.execution_id, meta.id);
        state.snapshots.insert(meta.id, snapshot);

        info!(
            "Captured snapshot {} for execution {} ({} findings)",
            meta.id,
            meta.execution_id,
            meta.stats.severity_counts.total()
        );
        Ok(meta)
    }

    async fn list(
        &self,
        project_id: Uuid,
        limit: usize,
    ) -> Result<Vec<SnapshotMeta>, PipelineError> {
        let state = self.state.read().await;
        let mut metas: Vec<SnapshotMeta> = state
            .snapshots
            .values()
            .filter(|s| s.project_id == project_id)
            .map(Snapshot::meta)
            .collect();
        metas.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        metas.truncate(limit);
        Ok(metas)
    }

    async fn load(&self, id: Uuid) -> Result<Snapshot, PipelineError> {
        let snapshot = {
            let state = self.state.read().await;
            state
                .snapshots
                .get(&id)
                .cloned()
                .ok_or(PipelineError::SnapshotNotFound(id))?
        };

        if snapshot.recompute_checksum() != snapshot.checksum {
            return Err(PipelineError::SnapshotCorrupted { snapshot_id: id });
        }
        debug!("Loaded snapshot {}", id);
        Ok(snapshot)
    }

    async fn verify(&self, id: Uuid) -> Result<bool, PipelineError> {
        let state = self.state.read().await;
        let snapshot = state
            .snapshots
            .get(&id)
            .ok_or(PipelineError::SnapshotNotFound(id))?;
        Ok(snapshot.recompute_checksum() == snapshot.checksum)
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::finding;
    use super::super::SummaryStats;
    use super::*;
    use crate::{RevisionInfo, Severity, SeverityCounts};
    use serde_json::json;

    fn params(project_id: Uuid, execution_id: Uuid) -> SnapshotParams {
        let findings = vec![finding("a.rs", 10, "RULE1", Severity::High)];
        SnapshotParams {
            project_id,
            execution_id,
            revision: RevisionInfo {
                branch: "main".to_string(),
                commit: "abc123".to_string(),
                tag: None,
            },
            pipeline_version: "0.2.0".to_string(),
            ruleset_version: "builtin-1".to_string(),
            model_version: "none".to_string(),
            config: json!({ "enable_ai": false }),
            stats: SummaryStats {
                severity_counts: SeverityCounts::from_findings(&findings),
                files_analyzed: 1,
                lines_of_code: 120,
                duration_ms: 900,
            },
            findings,
        }
    }

    #[tokio::test]
    async fn test_create_load_verify_roundtrip() {
        let store = InMemorySnapshotStore::new(10);
        let meta = store
            .create(params(Uuid::new_v4(), Uuid::new_v4()))
            .await
            .unwrap();

        let loaded = store.load(meta.id).await.unwrap();
        assert_eq!(loaded.checksum, meta.checksum);
        assert!(store.verify(meta.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_capture_rejected() {
        let store = InMemorySnapshotStore::new(10);
        let project_id = Uuid::new_v4();
        let execution_id = Uuid::new_v4();

        store.create(params(project_id, execution_id)).await.unwrap();
        let err = store
            .create(params(project_id, execution_id))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::SnapshotExists { .. }));
    }

    #[tokio::test]
    async fn test_list_newest_first_with_limit() {
        let store = InMemorySnapshotStore::new(10);
        let project_id = Uuid::new_v4();
        let mut metas = Vec::new();
        for _ in 0..3 {
            metas.push(
                store
                    .create(params(project_id, Uuid::new_v4()))
                    .await
                    .unwrap(),
            );
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        let listed = store.list(project_id, 2).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, metas[2].id);
        assert_eq!(listed[1].id, metas[1].id);

        // other projects see nothing
        let other = store.list(Uuid::new_v4(), 10).await.unwrap();
        assert!(other.is_empty());
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest() {
        let store = InMemorySnapshotStore::new(2);
        let project_id = Uuid::new_v4();
        let first = store
            .create(params(project_id, Uuid::new_v4()))
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store
            .create(params(project_id, Uuid::new_v4()))
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store
            .create(params(project_id, Uuid::new_v4()))
            .await
            .unwrap();

        assert_eq!(store.len().await, 2);
        let err = store.load(first.id).await.unwrap_err();
        assert!(matches!(err, PipelineError::SnapshotNotFound(_)));

        // the evicted execution slot is free again
        assert!(store
            .create(params(project_id, first.execution_id))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_corrupted_snapshot_detected_never_repaired() {
        let store = InMemorySnapshotStore::new(10);
        let meta = store
            .create(params(Uuid::new_v4(), Uuid::new_v4()))
            .await
            .unwrap();
        store.corrupt_for_test(meta.id).await;

        assert!(!store.verify(meta.id).await.unwrap());
        let err = store.load(meta.id).await.unwrap_err();
        assert!(matches!(err, PipelineError::SnapshotCorrupted { .. }));

        // verifying again still reports corruption; nothing was repaired
        assert!(!store.verify(meta.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_snapshot_is_not_found() {
        let store = InMemorySnapshotStore::new(2);
        let err = store.load(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, PipelineError::SnapshotNotFound(_)));
        let err = store.verify(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, PipelineError::SnapshotNotFound(_)));
    }
}
