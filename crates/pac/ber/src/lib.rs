//! PAC BER Issuer.
//!
//! The execution report (BER) attests that a PAC's work completed. Issuance
//! is gated on a five-way conjunction over the acknowledgment summary and
//! the collected WRAP set; challenge and revocation are one-way exits that
//! permanently clear settlement eligibility. A corrected PAC produces a new
//! BER — a challenged or revoked report is never reinstated.

#![deny(unsafe_code)]

use chrono::{DateTime, Utc};
use pac_types::{
    AckSummary, AgentId, BerFinality, BerId, BerState, ExecutionReport, MultiAgentWrapSet, PacId,
    ValidationState,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

/// BER write errors. All abort the requested write.
#[derive(Debug, Error)]
pub enum BerError {
    #[error("BER {ber_id} cannot be issued from state {state:?}; ELIGIBLE required")]
    NotIssuable { ber_id: BerId, state: BerState },

    #[error("BER {ber_id} is terminal in state {state:?}; challenge and revocation are one-way")]
    Terminal { ber_id: BerId, state: BerState },

    #[error("BER {ber_id} cannot be finalized from state {state:?}; ISSUED required")]
    NotFinalizable { ber_id: BerId, state: BerState },
}

/// The five issuance preconditions, named for reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssuanceCheck {
    AllAcksAcknowledged,
    NoRejectedAcks,
    NoTimedOutAcks,
    HasValidWrap,
    NoFailedWraps,
}

/// Outcome of the issuance precondition, with every failed check listed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuanceEligibility {
    pub eligible: bool,
    pub failed_checks: Vec<IssuanceCheck>,
}

/// Evaluate the BER issuance precondition.
///
/// All five checks are required; any failure yields `NOT_ELIGIBLE`. The
/// acknowledgment summary must already reflect effective states (overdue
/// PENDING counted as timeout) — callers summarize at read time.
pub fn eligible_for_issuance(
    summary: &AckSummary,
    wrap_set: &MultiAgentWrapSet,
) -> IssuanceEligibility {
    let mut failed = Vec::new();

    if !summary.all_acknowledged() {
        failed.push(IssuanceCheck::AllAcksAcknowledged);
    }
    if summary.rejected > 0 {
        failed.push(IssuanceCheck::NoRejectedAcks);
    }
    if summary.timeout > 0 {
        failed.push(IssuanceCheck::NoTimedOutAcks);
    }
    if !wrap_set
        .collected
        .values()
        .any(|wrap| wrap.validation_state == ValidationState::Valid)
    {
        failed.push(IssuanceCheck::HasValidWrap);
    }
    if wrap_set
        .collected
        .values()
        .any(|wrap| wrap.validation_state.is_rejected())
    {
        failed.push(IssuanceCheck::NoFailedWraps);
    }

    IssuanceEligibility {
        eligible: failed.is_empty(),
        failed_checks: failed,
    }
}

/// Draft a BER for a PAC, in `ELIGIBLE` or `NOT_ELIGIBLE` per the
/// precondition. Drafts are provisional and never settlement-eligible.
pub fn draft(pac_id: PacId, summary: &AckSummary, wrap_set: &MultiAgentWrapSet) -> ExecutionReport {
    let eligibility = eligible_for_issuance(summary, wrap_set);
    let state = if eligibility.eligible {
        BerState::Eligible
    } else {
        warn!(pac_id = %pac_id, failed = ?eligibility.failed_checks, "BER not eligible");
        BerState::NotEligible
    };

    ExecutionReport {
        ber_id: BerId::generate(),
        pac_id,
        wrap_set_hash: String::new(),
        state,
        finality: BerFinality::Provisional,
        ledger_commit_hash: None,
        issued_at: None,
        issuer: None,
        settlement_eligible: false,
        ber_hash: String::new(),
    }
}

/// Issue an ELIGIBLE BER: stamps issuer and `issued_at` and copies the
/// WRAP-set hash the report attests.
pub fn issue(
    ber: &mut ExecutionReport,
    issuer: AgentId,
    wrap_set: &MultiAgentWrapSet,
    now: DateTime<Utc>,
) -> Result<(), BerError> {
    match ber.state {
        BerState::Eligible => {
            ber.state = BerState::Issued;
            ber.issuer = Some(issuer);
            ber.issued_at = Some(now);
            ber.wrap_set_hash = wrap_set.set_hash.clone();
            info!(ber_id = %ber.ber_id, pac_id = %ber.pac_id, "BER issued");
            Ok(())
        }
        BerState::Challenged | BerState::Revoked => Err(BerError::Terminal {
            ber_id: ber.ber_id.clone(),
            state: ber.state,
        }),
        state => Err(BerError::NotIssuable {
            ber_id: ber.ber_id.clone(),
            state,
        }),
    }
}

/// Finalize an ISSUED BER against its ledger commit.
///
/// Finality flips to FINAL and, per the settlement invariant, the report
/// becomes settlement-eligible only in this state.
pub fn finalize(
    ber: &mut ExecutionReport,
    ledger_commit_hash: impl Into<String>,
) -> Result<(), BerError> {
    match ber.state {
        BerState::Issued => {
            ber.finality = BerFinality::Final;
            ber.ledger_commit_hash = Some(ledger_commit_hash.into());
            ber.settlement_eligible = ber.is_settlement_eligible();
            info!(ber_id = %ber.ber_id, "BER finalized");
            Ok(())
        }
        BerState::Challenged | BerState::Revoked => Err(BerError::Terminal {
            ber_id: ber.ber_id.clone(),
            state: ber.state,
        }),
        state => Err(BerError::NotFinalizable {
            ber_id: ber.ber_id.clone(),
            state,
        }),
    }
}

/// Challenge an ISSUED BER. One-way: settlement eligibility clears
/// immediately and the report never returns to ISSUED.
pub fn challenge(ber: &mut ExecutionReport) -> Result<(), BerError> {
    one_way_exit(ber, BerState::Challenged)
}

/// Revoke an ISSUED BER. One-way, like [`challenge`].
pub fn revoke(ber: &mut ExecutionReport) -> Result<(), BerError> {
    one_way_exit(ber, BerState::Revoked)
}

fn one_way_exit(ber: &mut ExecutionReport, target: BerState) -> Result<(), BerError> {
    match ber.state {
        BerState::Issued => {
            ber.state = target;
            ber.settlement_eligible = false;
            warn!(ber_id = %ber.ber_id, pac_id = %ber.pac_id, state = ?target, "BER invalidated");
            Ok(())
        }
        BerState::Challenged | BerState::Revoked => Err(BerError::Terminal {
            ber_id: ber.ber_id.clone(),
            state: ber.state,
        }),
        state => Err(BerError::NotIssuable {
            ber_id: ber.ber_id.clone(),
            state,
        }),
    }
}
