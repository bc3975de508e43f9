//! Execution report (BER) records.

use crate::ids::{AgentId, BerId, PacId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// BER issuance states.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BerState {
    NotEligible,
    Eligible,
    Pending,
    Issued,
    Challenged,
    Revoked,
}

/// BER finality. Settlement requires `FINAL`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BerFinality {
    Final,
    Provisional,
}

/// The execution report attesting that a PAC's work completed.
///
/// Invariant: `settlement_eligible` is true only when `state == Issued` and
/// `finality == Final`. A challenged or revoked BER never becomes eligible
/// again; a corrected PAC produces a new BER.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub ber_id: BerId,
    pub pac_id: PacId,
    /// Opaque hash of the WRAP set this report attests, copied at issuance.
    pub wrap_set_hash: String,
    pub state: BerState,
    pub finality: BerFinality,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ledger_commit_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<AgentId>,
    pub settlement_eligible: bool,
    /// Opaque integrity hash supplied by the issuing runtime.
    pub ber_hash: String,
}

impl ExecutionReport {
    /// True iff this report, on its own, permits settlement.
    pub fn is_settlement_eligible(&self) -> bool {
        self.state == BerState::Issued && self.finality == BerFinality::Final
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(state: BerState, finality: BerFinality) -> ExecutionReport {
        ExecutionReport {
            ber_id: BerId::generate(),
            pac_id: PacId::new("PAC-1"),
            wrap_set_hash: "ws".into(),
            state,
            finality,
            ledger_commit_hash: None,
            issued_at: None,
            issuer: None,
            settlement_eligible: false,
            ber_hash: "h".into(),
        }
    }

    #[test]
    fn only_issued_final_is_eligible() {
        assert!(report(BerState::Issued, BerFinality::Final).is_settlement_eligible());
        assert!(!report(BerState::Issued, BerFinality::Provisional).is_settlement_eligible());
        assert!(!report(BerState::Eligible, BerFinality::Final).is_settlement_eligible());
        assert!(!report(BerState::Challenged, BerFinality::Final).is_settlement_eligible());
        assert!(!report(BerState::Revoked, BerFinality::Final).is_settlement_eligible());
    }
}
