//! Agent acknowledgment records and summary statistics.

use crate::ids::{AckId, AgentId, PacId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stored acknowledgment states.
///
/// `TIMEOUT` is what the store records when an overdue PENDING ack is
/// observed and the lifecycle reacts to it; readers must not wait for that —
/// overdue-ness is derived at read time from `deadline_at`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AckState {
    Pending,
    Acknowledged,
    Rejected,
    Timeout,
}

/// One agent's explicit acknowledgment of a PAC.
///
/// Invariants:
/// - `latency_ms` is non-null iff `state == Acknowledged`.
/// - `rejection_reason` is present only if `state == Rejected`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentAck {
    pub ack_id: AckId,
    pub pac_id: PacId,
    pub agent_id: AgentId,
    pub agent_name: String,
    pub order_id: String,
    pub state: AckState,
    pub requested_at: DateTime<Utc>,
    pub deadline_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acknowledged_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    /// Opaque evidence hash supplied by the acknowledging runtime.
    pub ack_hash: String,
}

/// Latency statistics over acknowledged records only.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencyStats {
    pub min_ms: Option<u64>,
    pub avg_ms: Option<u64>,
    pub max_ms: Option<u64>,
}

/// Per-state counts over a PAC's acknowledgment set.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckSummary {
    pub total: usize,
    pub acknowledged: usize,
    pub pending: usize,
    pub rejected: usize,
    pub timeout: usize,
    pub latency: LatencyStats,
}

impl AckSummary {
    /// True iff every requested ack was explicitly acknowledged.
    ///
    /// An empty ack set is never complete — absence of evidence is not
    /// evidence of acknowledgment.
    pub fn all_acknowledged(&self) -> bool {
        self.total > 0 && self.acknowledged == self.total
    }
}
