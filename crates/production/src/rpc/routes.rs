//! Route configuration for the RPC API.

use super::handlers::*;
use super::state::RpcState;
use axum::{
    routing::{get, post},
    Router,
};

/// Create the full router with all RPC routes.
pub fn create_router(state: RpcState) -> Router {
    Router::new()
        // Health & readiness probes (no prefix)
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        // Metrics (no prefix, for Prometheus scraping)
        .route("/metrics", get(metrics_handler))
        // API v1 routes
        .nest("/api/v1", api_v1_routes())
        .with_state(state)
}

/// Create the `/api/v1` router.
fn api_v1_routes() -> Router<RpcState> {
    Router::new()
        // Method-dispatch endpoint for wallets and tooling
        .route("/rpc", post(rpc_handler))
        // Status endpoint
        .route("/status", get(status_handler))
        // Explorer reads
        .route("/blocks/{height}", get(get_block_handler))
        .route("/transactions/{hash}", get(get_transaction_handler))
        .route("/batches", get(list_batches_handler))
        .route("/batches/{id}", get(get_batch_handler))
        // Operator path out of the Failed batch state
        .route("/batches/{id}/resubmit", post(resubmit_batch_handler))
}
