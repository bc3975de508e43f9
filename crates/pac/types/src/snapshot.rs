//! Point-in-time read shapes consumed by the presentation layer.

use crate::ack::{AckSummary, AgentAck};
use crate::ber::ExecutionReport;
use crate::ids::{AgentId, PacId};
use crate::lifecycle::{LifecycleState, StateTransition};
use crate::settlement::SettlementStatus;
use crate::wrap::WrapArtifact;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The complete control-plane state of one PAC, assembled at read time.
///
/// This is an owned, immutable snapshot: it never aliases store state, so
/// readers need no locking and concurrent writes to other PACs are invisible.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ControlPlaneSnapshot {
    pub pac_id: PacId,
    pub runtime_id: String,
    pub lifecycle_state: LifecycleState,
    pub agent_acks: BTreeMap<AgentId, AgentAck>,
    pub wraps: BTreeMap<AgentId, WrapArtifact>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ber: Option<ExecutionReport>,
    pub settlement_eligibility: SettlementStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settlement_block_reason: Option<String>,
    pub ack_summary: AckSummary,
    pub state_transitions: Vec<StateTransition>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Compact per-PAC entry for the listing endpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ControlPlaneIndexEntry {
    pub pac_id: PacId,
    pub runtime_id: String,
    pub lifecycle_state: LifecycleState,
    pub settlement_eligibility: SettlementStatus,
    pub acks_acknowledged: usize,
    pub acks_total: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
