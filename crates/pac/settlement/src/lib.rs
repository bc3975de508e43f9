//! PAC Settlement Evaluator.
//!
//! The single authoritative implementation of settlement eligibility: eight
//! named gates folded into a binary verdict. Everything else in the system —
//! the store's snapshot field, the HTTP surface, the governance summary —
//! reads this function's output and never reimplements the gate logic.
//!
//! `evaluate` is a pure function over an immutable snapshot plus an explicit
//! `now`: no I/O, no hidden state, no override path. Identical input yields
//! byte-identical output, so the verdict can be recomputed on every read
//! without a cache.

#![deny(unsafe_code)]

use chrono::{DateTime, Utc};
use pac_ack::effective_state;
use pac_types::{
    AckState, AgentAck, BerState, BlockingReason, ComputationMethod, ExecutionReport, GateId,
    GateResult, MultiAgentWrapSet, Pac, ReasonCode, ReasonSource, SettlementStatus,
    SettlementVerdict, Severity, VerdictId,
};
use tracing::debug;

/// The immutable snapshot `evaluate` consumes.
///
/// Absence is explicit: a PAC with no WRAP set or no BER evaluates those
/// gates as failed, never as passing.
#[derive(Clone, Copy, Debug)]
pub struct EvaluationInput<'a> {
    pub pac: &'a Pac,
    pub acks: &'a [AgentAck],
    pub wrap_set: Option<&'a MultiAgentWrapSet>,
    pub ber: Option<&'a ExecutionReport>,
}

/// Evaluate the eight settlement gates and fold them into a binary verdict.
///
/// `status == ELIGIBLE` iff every gate passes; otherwise the verdict carries
/// one [`BlockingReason`] per failed gate, ordered by severity for display.
/// Severity never changes the binary outcome.
pub fn evaluate(input: &EvaluationInput<'_>, now: DateTime<Utc>) -> SettlementVerdict {
    let mut gates = Vec::with_capacity(GateId::ALL.len());
    let mut reasons = Vec::new();

    for gate_id in GateId::ALL {
        let outcome = evaluate_gate(gate_id, input, now);
        if !outcome.result.passed {
            if let Some(reason) = outcome.reason {
                reasons.push(reason);
            }
        }
        gates.push(outcome.result);
    }

    // Severity orders the display list only; stable sort keeps gate order
    // within a severity band.
    reasons.sort_by_key(|reason| reason.severity);

    let status = fold_gates(&gates);
    debug!(pac_id = %input.pac.id, ?status, blocked_by = reasons.len(), "settlement verdict");

    SettlementVerdict {
        verdict_id: verdict_id_for(input, now),
        pac_id: input.pac.id.clone(),
        status,
        blocking_reasons: reasons,
        gates,
        computed_at: now,
        computed_by: "settlement-evaluator".to_string(),
        method: ComputationMethod::Deterministic,
    }
}

/// Binary fold: ELIGIBLE iff every gate passed.
pub fn fold_gates(gates: &[GateResult]) -> SettlementStatus {
    if gates.iter().all(|gate| gate.passed) {
        SettlementStatus::Eligible
    } else {
        SettlementStatus::Blocked
    }
}

/// Verdict ids are derived from the evaluated input, not generated, so the
/// evaluator stays pure.
fn verdict_id_for(input: &EvaluationInput<'_>, now: DateTime<Utc>) -> VerdictId {
    VerdictId::new(format!(
        "VERDICT-{}-{}",
        input.pac.id,
        now.timestamp_millis()
    ))
}

struct GateOutcome {
    result: GateResult,
    reason: Option<BlockingReason>,
}

fn evaluate_gate(gate_id: GateId, input: &EvaluationInput<'_>, now: DateTime<Utc>) -> GateOutcome {
    match gate_id {
        GateId::AckAll => gate_ack_all(input, now),
        GateId::AckNoReject => gate_ack_no_reject(input, now),
        GateId::AckNoTimeout => gate_ack_no_timeout(input, now),
        GateId::WrapValid => gate_wrap_valid(input, now),
        GateId::WrapNoInvalid => gate_wrap_no_invalid(input, now),
        GateId::BerIssued => gate_ber_issued(input, now),
        GateId::BerValid => gate_ber_valid(input, now),
        GateId::LifecycleOk => gate_lifecycle_ok(input, now),
    }
}

fn pass(id: GateId, detail: impl Into<String>) -> GateOutcome {
    GateOutcome {
        result: GateResult {
            id,
            passed: true,
            blocking: true,
            detail: detail.into(),
        },
        reason: None,
    }
}

#[allow(clippy::too_many_arguments)]
fn fail(
    id: GateId,
    detail: impl Into<String>,
    code: ReasonCode,
    severity: Severity,
    source: ReasonSource,
    source_ref: Option<String>,
    description: impl Into<String>,
    now: DateTime<Utc>,
) -> GateOutcome {
    GateOutcome {
        result: GateResult {
            id,
            passed: false,
            blocking: true,
            detail: detail.into(),
        },
        reason: Some(BlockingReason {
            code,
            severity,
            description: description.into(),
            source,
            source_ref,
            detected_at: now,
        }),
    }
}

fn agents_in_state(input: &EvaluationInput<'_>, state: AckState, now: DateTime<Utc>) -> Vec<String> {
    input
        .acks
        .iter()
        .filter(|ack| effective_state(ack, now) == state)
        .map(|ack| format!("{} ({})", ack.agent_id, ack.agent_name))
        .collect()
}

fn gate_ack_all(input: &EvaluationInput<'_>, now: DateTime<Utc>) -> GateOutcome {
    let summary = pac_ack::summarize(input.acks, now);
    if summary.all_acknowledged() {
        return pass(
            GateId::AckAll,
            format!("{}/{} acks acknowledged", summary.acknowledged, summary.total),
        );
    }

    let description = if summary.total == 0 {
        "no acknowledgment was requested; an empty ack set never passes".to_string()
    } else {
        let pending = agents_in_state(input, AckState::Pending, now);
        let mut description = format!(
            "{}/{} acks acknowledged",
            summary.acknowledged, summary.total
        );
        if !pending.is_empty() {
            description.push_str(&format!("; pending: {}", pending.join(", ")));
        }
        description
    };
    fail(
        GateId::AckAll,
        format!("{}/{} acks acknowledged", summary.acknowledged, summary.total),
        ReasonCode::MissingAck,
        Severity::Critical,
        ReasonSource::Ack,
        None,
        description,
        now,
    )
}

fn gate_ack_no_reject(input: &EvaluationInput<'_>, now: DateTime<Utc>) -> GateOutcome {
    let rejected: Vec<String> = input
        .acks
        .iter()
        .filter(|ack| ack.state == AckState::Rejected)
        .map(|ack| {
            let why = ack.rejection_reason.as_deref().unwrap_or("no reason given");
            format!("{}: {}", ack.agent_id, why)
        })
        .collect();

    if rejected.is_empty() {
        return pass(GateId::AckNoReject, "no rejected acks");
    }
    fail(
        GateId::AckNoReject,
        format!("{} rejected ack(s)", rejected.len()),
        ReasonCode::AckRejected,
        Severity::Critical,
        ReasonSource::Ack,
        None,
        format!("ack rejected by {}", rejected.join("; ")),
        now,
    )
}

fn gate_ack_no_timeout(input: &EvaluationInput<'_>, now: DateTime<Utc>) -> GateOutcome {
    // Effective states: an overdue PENDING ack is a timeout at read time.
    let timed_out = agents_in_state(input, AckState::Timeout, now);
    if timed_out.is_empty() {
        return pass(GateId::AckNoTimeout, "no timed-out acks");
    }
    fail(
        GateId::AckNoTimeout,
        format!("{} timed-out ack(s)", timed_out.len()),
        ReasonCode::AckTimeout,
        Severity::High,
        ReasonSource::Ack,
        None,
        format!("ack deadline passed for {}", timed_out.join(", ")),
        now,
    )
}

fn gate_wrap_valid(input: &EvaluationInput<'_>, now: DateTime<Utc>) -> GateOutcome {
    let Some(set) = input.wrap_set else {
        return fail(
            GateId::WrapValid,
            "no wrap set",
            ReasonCode::MissingWrap,
            Severity::Critical,
            ReasonSource::Wrap,
            None,
            "no WRAP set configured for this PAC",
            now,
        );
    };

    if !set.is_complete() {
        let missing: Vec<String> = set
            .missing_agents()
            .into_iter()
            .map(|agent| agent.to_string())
            .collect();
        return fail(
            GateId::WrapValid,
            format!(
                "{}/{} wraps collected",
                set.collected.len(),
                set.expected_agents.len()
            ),
            ReasonCode::MissingWrap,
            Severity::Critical,
            ReasonSource::Wrap,
            Some(set.set_hash.clone()),
            format!("missing WRAP from {}", missing.join(", ")),
            now,
        );
    }

    let valid_count = set
        .collected
        .values()
        .filter(|wrap| wrap.validation_state == pac_types::ValidationState::Valid)
        .count();
    if valid_count == 0 {
        return fail(
            GateId::WrapValid,
            "no valid wrap collected",
            ReasonCode::MissingWrap,
            Severity::Critical,
            ReasonSource::Wrap,
            Some(set.set_hash.clone()),
            "WRAP set complete but no collected WRAP is VALID",
            now,
        );
    }
    pass(
        GateId::WrapValid,
        format!("{valid_count} valid wrap(s) collected"),
    )
}

fn gate_wrap_no_invalid(input: &EvaluationInput<'_>, now: DateTime<Utc>) -> GateOutcome {
    let failed: Vec<String> = input
        .wrap_set
        .map(|set| {
            set.collected
                .values()
                .filter(|wrap| wrap.validation_state.is_rejected())
                .map(|wrap| format!("{}: {:?}", wrap.agent_id, wrap.validation_state))
                .collect()
        })
        .unwrap_or_default();

    if failed.is_empty() {
        return pass(GateId::WrapNoInvalid, "no failed wraps");
    }
    let source_ref = input.wrap_set.map(|set| set.set_hash.clone());
    fail(
        GateId::WrapNoInvalid,
        format!("{} failed wrap(s)", failed.len()),
        ReasonCode::WrapValidationFailed,
        Severity::High,
        ReasonSource::Wrap,
        source_ref,
        format!("WRAP validation failed for {}", failed.join("; ")),
        now,
    )
}

fn gate_ber_issued(input: &EvaluationInput<'_>, now: DateTime<Utc>) -> GateOutcome {
    match input.ber {
        Some(ber) if ber.state == BerState::Issued => {
            pass(GateId::BerIssued, format!("BER {} issued", ber.ber_id))
        }
        Some(ber) => fail(
            GateId::BerIssued,
            format!("BER state is {:?}", ber.state),
            ReasonCode::BerNotIssued,
            Severity::High,
            ReasonSource::Ber,
            Some(ber.ber_id.to_string()),
            format!("BER {} is {:?}, not ISSUED", ber.ber_id, ber.state),
            now,
        ),
        None => fail(
            GateId::BerIssued,
            "no BER",
            ReasonCode::BerNotIssued,
            Severity::High,
            ReasonSource::Ber,
            None,
            "BER not yet issued",
            now,
        ),
    }
}

fn gate_ber_valid(input: &EvaluationInput<'_>, now: DateTime<Utc>) -> GateOutcome {
    match input.ber {
        Some(ber) if ber.state == BerState::Challenged => fail(
            GateId::BerValid,
            "BER challenged",
            ReasonCode::BerChallenged,
            Severity::High,
            ReasonSource::Ber,
            Some(ber.ber_id.to_string()),
            format!("BER {} is under challenge", ber.ber_id),
            now,
        ),
        Some(ber) if ber.state == BerState::Revoked => fail(
            GateId::BerValid,
            "BER revoked",
            ReasonCode::BerRevoked,
            Severity::High,
            ReasonSource::Ber,
            Some(ber.ber_id.to_string()),
            format!("BER {} was revoked", ber.ber_id),
            now,
        ),
        // Absence is already caught by ber-issued; this gate only asserts
        // no challenge/revocation happened.
        _ => pass(GateId::BerValid, "BER not challenged or revoked"),
    }
}

fn gate_lifecycle_ok(input: &EvaluationInput<'_>, now: DateTime<Utc>) -> GateOutcome {
    let state = input.pac.lifecycle_state;
    if !state.is_failed() {
        return pass(GateId::LifecycleOk, format!("lifecycle is {state}"));
    }
    fail(
        GateId::LifecycleOk,
        format!("lifecycle is {state}"),
        ReasonCode::GovernanceViolation,
        Severity::Critical,
        ReasonSource::Lifecycle,
        None,
        format!("PAC is in failed terminal state {state}"),
        now,
    )
}
