//! PAC lifecycle states and the append-only transition log.

use crate::ids::PacId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Deterministic PAC lifecycle states.
///
/// The happy path is strictly ordered:
/// `DRAFT → ACK_PENDING → EXECUTING → WRAP_PENDING → WRAP_SUBMITTED →
/// WRAP_VALIDATED → BER_ISSUED → SETTLED`.
///
/// The failure states are terminal: once entered they are never exited and
/// the record is retained for audit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    Draft,
    AckPending,
    Executing,
    WrapPending,
    WrapSubmitted,
    WrapValidated,
    BerIssued,
    Settled,

    AckTimeout,
    AckRejected,
    ExecutionFailed,
    WrapRejected,
    SettlementBlocked,
}

impl LifecycleState {
    /// Terminal states accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecycleState::Settled) || self.is_failed()
    }

    /// Failed terminal states block settlement unconditionally.
    pub fn is_failed(&self) -> bool {
        matches!(
            self,
            LifecycleState::AckTimeout
                | LifecycleState::AckRejected
                | LifecycleState::ExecutionFailed
                | LifecycleState::WrapRejected
                | LifecycleState::SettlementBlocked
        )
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleState::Draft => "DRAFT",
            LifecycleState::AckPending => "ACK_PENDING",
            LifecycleState::Executing => "EXECUTING",
            LifecycleState::WrapPending => "WRAP_PENDING",
            LifecycleState::WrapSubmitted => "WRAP_SUBMITTED",
            LifecycleState::WrapValidated => "WRAP_VALIDATED",
            LifecycleState::BerIssued => "BER_ISSUED",
            LifecycleState::Settled => "SETTLED",
            LifecycleState::AckTimeout => "ACK_TIMEOUT",
            LifecycleState::AckRejected => "ACK_REJECTED",
            LifecycleState::ExecutionFailed => "EXECUTION_FAILED",
            LifecycleState::WrapRejected => "WRAP_REJECTED",
            LifecycleState::SettlementBlocked => "SETTLEMENT_BLOCKED",
        };
        write!(f, "{s}")
    }
}

/// One immutable entry in a PAC's transition log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: LifecycleState,
    pub to: LifecycleState,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
    pub actor: String,
}

/// A governed unit of delegated agent work.
///
/// Invariants:
/// - `transitions` is append-only and conforms to the lifecycle transition
///   table; replaying it from `DRAFT` reproduces `lifecycle_state`.
/// - `updated_at >= created_at`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Pac {
    pub id: PacId,
    pub runtime_id: String,
    pub lifecycle_state: LifecycleState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub transitions: Vec<StateTransition>,
}

impl Pac {
    /// Create a new PAC in `DRAFT` with an empty transition log.
    pub fn new(id: PacId, runtime_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            runtime_id: runtime_id.into(),
            lifecycle_state: LifecycleState::Draft,
            created_at: now,
            updated_at: now,
            transitions: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_states_are_terminal() {
        for state in [
            LifecycleState::AckTimeout,
            LifecycleState::AckRejected,
            LifecycleState::ExecutionFailed,
            LifecycleState::WrapRejected,
            LifecycleState::SettlementBlocked,
        ] {
            assert!(state.is_terminal());
            assert!(state.is_failed());
        }
    }

    #[test]
    fn settled_is_terminal_but_not_failed() {
        assert!(LifecycleState::Settled.is_terminal());
        assert!(!LifecycleState::Settled.is_failed());
    }

    #[test]
    fn wire_form_is_screaming_snake() {
        let json = serde_json::to_string(&LifecycleState::AckPending).unwrap();
        assert_eq!(json, "\"ACK_PENDING\"");
        let back: LifecycleState = serde_json::from_str("\"WRAP_SUBMITTED\"").unwrap();
        assert_eq!(back, LifecycleState::WrapSubmitted);
    }

    #[test]
    fn new_pac_starts_in_draft() {
        let pac = Pac::new(PacId::new("PAC-001"), "runtime-1", Utc::now());
        assert_eq!(pac.lifecycle_state, LifecycleState::Draft);
        assert!(pac.transitions.is_empty());
        assert_eq!(pac.created_at, pac.updated_at);
    }
}
