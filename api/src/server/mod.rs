//! API Server Module
//!
//! This module contains the server setup for the analysis API.

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use heimdall_agents::Orchestrator;
use heimdall_core::config::ApiConfig;
use heimdall_core::snapshot::SnapshotStore;

use crate::handlers::{
    cancel_execution, capture_snapshot, compare_snapshots, get_execution, health_check,
    list_executions, list_snapshots, start_analysis, verify_snapshot, ApiState,
};

/// Main API server
pub struct ApiServer {
    /// Server configuration
    config: ApiConfig,
    /// Shared state
    state: Arc<ApiState>,
}

impl ApiServer {
    /// Create a new API server
    pub fn new(
        config: ApiConfig,
        orchestrator: Orchestrator,
        snapshots: Arc<dyn SnapshotStore>,
    ) -> Self {
        let state = Arc::new(ApiState {
            orchestrator,
            snapshots,
        });
        Self { config, state }
    }

    /// Build the application router
    pub fn router(&self) -> Router {
        Router::new()
            .route("/api/health", get(health_check))
            // Analysis operations
            .route("/api/projects/:id/analyze", post(start_analysis))
            .route("/api/projects/:id/executions", get(list_executions))
            .route("/api/executions/:id", get(get_execution))
            .route("/api/executions/:id/cancel", post(cancel_execution))
            // Snapshot operations
            .route("/api/executions/:id/snapshot", post(capture_snapshot))
            .route("/api/projects/:id/snapshots", get(list_snapshots))
            .route("/api/snapshots/:id/verify", get(verify_snapshot))
            .route("/api/snapshots/:base/compare/:target", get(compare_snapshots))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone())
    }

    /// Start serving
    pub async fn start(&self) -> Result<()> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        info!("Starting Heimdall API server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, self.router()).await?;
        Ok(())
    }
}
