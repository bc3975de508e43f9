//! Router configuration for the control-plane read surface.

use crate::handlers;
use crate::state::AppState;
use axum::{routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the read-only API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health and index
        .route("/health", get(handlers::health_check))
        .route("/controlplane/list", get(handlers::list_states))
        // Per-PAC control-plane state
        .route("/controlplane/state/:pac_id", get(handlers::get_state))
        .route("/controlplane/state/:pac_id/acks", get(handlers::get_acks))
        .route(
            "/controlplane/state/:pac_id/acks/:agent_id",
            get(handlers::get_ack_by_agent),
        )
        .route("/controlplane/state/:pac_id/wraps", get(handlers::get_wraps))
        .route(
            "/controlplane/state/:pac_id/settlement",
            get(handlers::get_settlement),
        )
        .route(
            "/controlplane/state/:pac_id/audit",
            get(handlers::get_audit_trail),
        )
        .route(
            "/controlplane/state/:pac_id/governance-summary",
            get(handlers::get_governance_summary),
        )
        // Settlement readiness verdict
        .route(
            "/controlplane/settlement-readiness/:pac_id",
            get(handlers::get_settlement_readiness),
        )
        .route(
            "/controlplane/settlement-readiness/:pac_id/blocking-reasons",
            get(handlers::get_blocking_reasons),
        )
        .fallback(handlers::fallback)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any))
        .with_state(state)
}
