//! Request handlers for the control-plane read surface.

use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::{Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use pac_store::StoreError;
use pac_types::{AgentId, PacId};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

/// Read-surface errors mapped to HTTP status codes.
pub struct ServiceError(StoreError);

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            StoreError::NotFound(_)
            | StoreError::AckNotFound { .. }
            | StoreError::WrapNotFound { .. }
            | StoreError::BerNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::CONFLICT,
        };
        (status, Json(json!({ "detail": self.0.to_string() }))).into_response()
    }
}

/// Service health and store reach.
pub async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": "pac-control-plane",
        "tracked_pacs": state.store.len(),
        "timestamp": Utc::now(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub offset: usize,
    pub limit: Option<usize>,
}

/// List all tracked PACs.
pub async fn list_states(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Json<serde_json::Value> {
    let all = state.store.list();
    let total = all.len();
    let limit = params.limit.unwrap_or(20).clamp(1, 100);
    let items: Vec<_> = all.into_iter().skip(params.offset).take(limit).collect();
    Json(json!({ "items": items, "total": total }))
}

/// Complete control-plane state for one PAC.
pub async fn get_state(
    State(state): State<AppState>,
    Path(pac_id): Path<String>,
) -> Result<Response, ServiceError> {
    let snapshot = state.store.snapshot(&PacId::new(pac_id))?;
    Ok(Json(snapshot).into_response())
}

/// All ACKs for a PAC, with the effective-state summary.
pub async fn get_acks(
    State(state): State<AppState>,
    Path(pac_id): Path<String>,
) -> Result<Response, ServiceError> {
    let snapshot = state.store.snapshot(&PacId::new(pac_id))?;
    Ok(Json(json!({
        "pac_id": snapshot.pac_id,
        "acks": snapshot.agent_acks,
        "summary": snapshot.ack_summary,
    }))
    .into_response())
}

/// One agent's ACK record.
pub async fn get_ack_by_agent(
    State(state): State<AppState>,
    Path((pac_id, agent_id)): Path<(String, String)>,
) -> Result<Response, ServiceError> {
    let ack = state
        .store
        .ack(&PacId::new(pac_id), &AgentId::new(agent_id))?;
    Ok(Json(ack).into_response())
}

/// Multi-agent WRAP aggregation status.
pub async fn get_wraps(
    State(state): State<AppState>,
    Path(pac_id): Path<String>,
) -> Result<Response, ServiceError> {
    let set = state.store.wrap_set(&PacId::new(pac_id))?;
    let is_complete = set.is_complete();
    let missing_agents = set.missing_agents();
    let all_valid = set.all_valid();
    Ok(Json(json!({
        "pac_id": set.pac_id,
        "expected_agents": set.expected_agents,
        "is_complete": is_complete,
        "missing_agents": missing_agents,
        "all_valid": all_valid,
        "aggregation_started_at": set.aggregation_started_at,
        "aggregation_completed_at": set.aggregation_completed_at,
        "set_hash": set.set_hash,
        "collected_wraps": set.collected,
    }))
    .into_response())
}

/// Settlement eligibility view for one PAC.
pub async fn get_settlement(
    State(state): State<AppState>,
    Path(pac_id): Path<String>,
) -> Result<Response, ServiceError> {
    let pac_id = PacId::new(pac_id);
    let snapshot = state.store.snapshot(&pac_id)?;
    let verdict = state.store.verdict(&pac_id)?;
    Ok(Json(json!({
        "pac_id": pac_id,
        "eligibility": verdict.status,
        "is_eligible": verdict.is_eligible(),
        "blocking_reasons": verdict.blocking_reasons,
        "ack_summary": snapshot.ack_summary,
        "lifecycle_state": snapshot.lifecycle_state,
    }))
    .into_response())
}

/// Complete transition audit trail for one PAC.
pub async fn get_audit_trail(
    State(state): State<AppState>,
    Path(pac_id): Path<String>,
) -> Result<Response, ServiceError> {
    let snapshot = state.store.snapshot(&PacId::new(pac_id))?;
    let total_transitions = snapshot.state_transitions.len();
    Ok(Json(json!({
        "pac_id": snapshot.pac_id,
        "transitions": snapshot.state_transitions,
        "total_transitions": total_transitions,
        "current_state": snapshot.lifecycle_state,
        "created_at": snapshot.created_at,
        "updated_at": snapshot.updated_at,
    }))
    .into_response())
}

/// Governance summary: every gate rolled into one report.
pub async fn get_governance_summary(
    State(state): State<AppState>,
    Path(pac_id): Path<String>,
) -> Result<Response, ServiceError> {
    let pac_id = PacId::new(pac_id);
    let snapshot = state.store.snapshot(&pac_id)?;
    let verdict = state.store.verdict(&pac_id)?;
    let checklist = state.store.checklist(&pac_id)?;
    let latency = state.store.latency_report(&pac_id)?;
    Ok(Json(json!({
        "pac_id": pac_id,
        "lifecycle_state": snapshot.lifecycle_state,
        "gates": verdict.gates,
        "settlement_eligibility": verdict.status,
        "closure_checklist": checklist,
        "ack_latency": latency,
    }))
    .into_response())
}

/// The settlement readiness verdict, recomputed per request.
pub async fn get_settlement_readiness(
    State(state): State<AppState>,
    Path(pac_id): Path<String>,
) -> Result<Response, ServiceError> {
    let verdict = state.store.verdict(&PacId::new(pac_id))?;
    Ok(Json(verdict).into_response())
}

/// Only the blocking reasons, for the eligibility panel.
pub async fn get_blocking_reasons(
    State(state): State<AppState>,
    Path(pac_id): Path<String>,
) -> Result<Response, ServiceError> {
    let verdict = state.store.verdict(&PacId::new(pac_id))?;
    let is_blocked = !verdict.is_eligible();
    let blocking_count = verdict.blocking_reasons.len();
    Ok(Json(json!({
        "pac_id": verdict.pac_id,
        "status": verdict.status,
        "is_blocked": is_blocked,
        "blocking_count": blocking_count,
        "blocking_reasons": verdict.blocking_reasons,
        "computation": {
            "computed_at": verdict.computed_at,
            "computed_by": verdict.computed_by,
            "method": verdict.method,
        },
    }))
    .into_response())
}

/// Fallback: unknown GETs are 404; any mutation method is 405.
///
/// The read surface is fail-closed — no write reaches the store from here.
pub async fn fallback(method: Method, uri: Uri) -> Response {
    if method == Method::GET {
        (
            StatusCode::NOT_FOUND,
            Json(json!({ "detail": format!("no such endpoint: {uri}") })),
        )
            .into_response()
    } else {
        warn!(%method, %uri, "mutation rejected on read-only surface");
        (
            StatusCode::METHOD_NOT_ALLOWED,
            Json(json!({
                "detail": "control-plane endpoints are read-only; mutations not permitted"
            })),
        )
            .into_response()
    }
}
