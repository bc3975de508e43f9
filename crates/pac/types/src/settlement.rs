//! Settlement verdict types: gates, blocking reasons, and the binary verdict.

use crate::ids::{PacId, VerdictId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The eight settlement gates, in evaluation order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GateId {
    AckAll,
    AckNoReject,
    AckNoTimeout,
    WrapValid,
    WrapNoInvalid,
    BerIssued,
    BerValid,
    LifecycleOk,
}

impl GateId {
    pub const ALL: [GateId; 8] = [
        GateId::AckAll,
        GateId::AckNoReject,
        GateId::AckNoTimeout,
        GateId::WrapValid,
        GateId::WrapNoInvalid,
        GateId::BerIssued,
        GateId::BerValid,
        GateId::LifecycleOk,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GateId::AckAll => "ack-all",
            GateId::AckNoReject => "ack-no-reject",
            GateId::AckNoTimeout => "ack-no-timeout",
            GateId::WrapValid => "wrap-valid",
            GateId::WrapNoInvalid => "wrap-no-invalid",
            GateId::BerIssued => "ber-issued",
            GateId::BerValid => "ber-valid",
            GateId::LifecycleOk => "lifecycle-ok",
        }
    }
}

impl fmt::Display for GateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of a single gate evaluation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateResult {
    pub id: GateId,
    pub passed: bool,
    pub blocking: bool,
    pub detail: String,
}

/// Stable, enumerated reason codes for blocked settlement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    MissingAck,
    AckTimeout,
    AckRejected,
    AckLatencyExceeded,
    MissingWrap,
    WrapValidationFailed,
    BerNotIssued,
    BerChallenged,
    BerRevoked,
    BerFinalityProvisional,
    LedgerCommitPending,
    GovernanceViolation,
}

/// Display-ordering severity. Never consulted by eligibility math.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
}

/// Which artifact a blocking reason points back to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonSource {
    Ack,
    Wrap,
    Ber,
    Ledger,
    Lifecycle,
}

/// One enumerated reason blocking settlement, with its source evidence.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockingReason {
    pub code: ReasonCode,
    pub severity: Severity,
    pub description: String,
    pub source: ReasonSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_ref: Option<String>,
    pub detected_at: DateTime<Utc>,
}

/// Binary settlement status. There is no third state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettlementStatus {
    Eligible,
    Blocked,
}

/// How a verdict was computed. Only one method exists; the field is on the
/// wire so consumers can verify no manual path produced the verdict.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComputationMethod {
    Deterministic,
}

/// The settlement verdict for a PAC: a recomputed projection, never stored
/// as authoritative and never overridable by a human actor.
///
/// Invariant: `blocking_reasons` is empty iff `status == Eligible`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementVerdict {
    pub verdict_id: VerdictId,
    pub pac_id: PacId,
    pub status: SettlementStatus,
    pub blocking_reasons: Vec<BlockingReason>,
    pub gates: Vec<GateResult>,
    pub computed_at: DateTime<Utc>,
    pub computed_by: String,
    pub method: ComputationMethod,
}

impl SettlementVerdict {
    pub fn is_eligible(&self) -> bool {
        self.status == SettlementStatus::Eligible
    }
}
