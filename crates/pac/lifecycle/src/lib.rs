//! PAC Lifecycle - the trigger-driven finite state machine.
//!
//! Transitions are accepted only when the trigger matches one of the current
//! state's defined out-edges. Anything else is rejected with the original
//! state preserved and the attempt logged, never silently ignored and never
//! appended to history. Accepted transitions append exactly one immutable
//! [`StateTransition`] record; history is never rewritten, so replaying the
//! log from `DRAFT` always reproduces the current state.

#![deny(unsafe_code)]

use chrono::{DateTime, Utc};
use pac_types::{LifecycleState, Pac, StateTransition};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

/// Events the lifecycle reacts to.
///
/// Trigger names mirror the governance events produced by the acknowledgment
/// ledger, the WRAP registry, and the BER issuer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// PAC dispatched to its agents; acknowledgment window opens.
    Dispatch,
    AllAcksAcknowledged,
    AnyAckTimeout,
    AnyAckRejected,
    ExecutionCompleted,
    ExecutionFailed,
    WrapSubmitted,
    WrapValidated,
    WrapRejected,
    BerIssued,
    GovernanceViolation,
    Settled,
}

/// Lifecycle errors. Only invalid writes surface here; validation failures
/// and blocked gates are domain data elsewhere.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("invalid transition: trigger {trigger:?} not accepted from {from}")]
    InvalidTransition {
        from: LifecycleState,
        trigger: Trigger,
    },

    #[error("replay diverged: log entry starts from {found} but replayed state is {expected}")]
    ReplayDivergence {
        expected: LifecycleState,
        found: LifecycleState,
    },

    #[error("replay contains edge {from} -> {to} that is not in the transition table")]
    ReplayInvalidEdge {
        from: LifecycleState,
        to: LifecycleState,
    },
}

/// The defined out-edges of a lifecycle state.
///
/// Terminal states have no out-edges; no trigger moves them.
pub fn out_edges(state: LifecycleState) -> &'static [(Trigger, LifecycleState)] {
    use LifecycleState::*;
    match state {
        Draft => &[(Trigger::Dispatch, AckPending)],
        AckPending => &[
            (Trigger::AllAcksAcknowledged, Executing),
            (Trigger::AnyAckTimeout, AckTimeout),
            (Trigger::AnyAckRejected, AckRejected),
        ],
        Executing => &[
            (Trigger::ExecutionCompleted, WrapPending),
            (Trigger::ExecutionFailed, ExecutionFailed),
        ],
        WrapPending => &[(Trigger::WrapSubmitted, WrapSubmitted)],
        WrapSubmitted => &[
            (Trigger::WrapValidated, WrapValidated),
            (Trigger::WrapRejected, WrapRejected),
        ],
        WrapValidated => &[
            (Trigger::BerIssued, BerIssued),
            (Trigger::GovernanceViolation, SettlementBlocked),
        ],
        BerIssued => &[
            (Trigger::Settled, Settled),
            (Trigger::GovernanceViolation, SettlementBlocked),
        ],
        Settled | AckTimeout | AckRejected | ExecutionFailed | WrapRejected
        | SettlementBlocked => &[],
    }
}

/// Resolve the target state for a trigger from the given state, if defined.
pub fn target_for(state: LifecycleState, trigger: Trigger) -> Option<LifecycleState> {
    out_edges(state)
        .iter()
        .find(|(t, _)| *t == trigger)
        .map(|(_, to)| *to)
}

/// Whether `from -> to` is an edge of the transition table under any trigger.
pub fn is_valid_edge(from: LifecycleState, to: LifecycleState) -> bool {
    out_edges(from).iter().any(|(_, target)| *target == to)
}

/// Apply a trigger to a PAC.
///
/// On success appends one immutable transition record with the
/// caller-supplied reason and actor, advances `lifecycle_state`, bumps
/// `updated_at`, and returns the new state. On rejection the PAC is
/// untouched and nothing is appended.
pub fn transition(
    pac: &mut Pac,
    trigger: Trigger,
    reason: impl Into<String>,
    actor: impl Into<String>,
    now: DateTime<Utc>,
) -> Result<LifecycleState, LifecycleError> {
    let from = pac.lifecycle_state;
    let Some(to) = target_for(from, trigger) else {
        warn!(
            pac_id = %pac.id,
            state = %from,
            ?trigger,
            "rejected lifecycle trigger"
        );
        return Err(LifecycleError::InvalidTransition { from, trigger });
    };

    pac.transitions.push(StateTransition {
        from,
        to,
        timestamp: now,
        reason: reason.into(),
        actor: actor.into(),
    });
    pac.lifecycle_state = to;
    pac.updated_at = now;

    info!(pac_id = %pac.id, from = %from, to = %to, "lifecycle transition");
    Ok(to)
}

/// Replay a transition log from `DRAFT` and return the resulting state.
///
/// The log is authoritative: each entry must start from the replayed state
/// and follow a table edge. A log that fails replay indicates store
/// corruption, not a domain condition.
pub fn replay(transitions: &[StateTransition]) -> Result<LifecycleState, LifecycleError> {
    let mut current = LifecycleState::Draft;
    for record in transitions {
        if record.from != current {
            return Err(LifecycleError::ReplayDivergence {
                expected: current,
                found: record.from,
            });
        }
        if !is_valid_edge(record.from, record.to) {
            return Err(LifecycleError::ReplayInvalidEdge {
                from: record.from,
                to: record.to,
            });
        }
        current = record.to;
    }
    Ok(current)
}
