//! PAC Acknowledgment Ledger.
//!
//! Every agent must explicitly acknowledge a PAC before execution. This
//! crate owns the ACK record lifecycle: a PENDING record per requested
//! agent, a single resolving write (acknowledge or reject), and read-time
//! deadline derivation. There is no background timer — an overdue PENDING
//! ack *is* a timeout whenever a reader derives state after the deadline,
//! which keeps repeated evaluation consistent without scheduling.

#![deny(unsafe_code)]

use chrono::{DateTime, Duration, Utc};
use pac_types::{AckId, AckState, AckSummary, AgentAck, AgentId, LatencyStats, PacId};
use thiserror::Error;
use tracing::{debug, info};

/// Maximum acknowledged latency considered healthy for settlement reporting.
pub const ACK_LATENCY_THRESHOLD_MS: u64 = 5000;

/// Acknowledgment ledger errors. Both abort the requested write.
#[derive(Debug, Error)]
pub enum AckError {
    #[error("ack {0} already resolved; records leave PENDING exactly once")]
    AlreadyResolved(AckId),

    #[error("ack {0} is not past its deadline; timeout cannot be recorded")]
    NotOverdue(AckId),
}

/// The resolving outcome of a PENDING ack.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AckOutcome {
    Acknowledged { latency_ms: u64 },
    Rejected { reason: String },
}

/// Create a PENDING acknowledgment request for one agent.
pub fn request_ack(
    pac_id: PacId,
    agent_id: AgentId,
    agent_name: impl Into<String>,
    order_id: impl Into<String>,
    deadline: Duration,
    now: DateTime<Utc>,
) -> AgentAck {
    let ack = AgentAck {
        ack_id: AckId::generate(),
        pac_id,
        agent_id,
        agent_name: agent_name.into(),
        order_id: order_id.into(),
        state: AckState::Pending,
        requested_at: now,
        deadline_at: now + deadline,
        acknowledged_at: None,
        rejection_reason: None,
        latency_ms: None,
        ack_hash: String::new(),
    };
    debug!(ack_id = %ack.ack_id, agent = %ack.agent_id, "ack requested");
    ack
}

/// Resolve a PENDING ack with the agent's explicit response.
///
/// Fails with [`AckError::AlreadyResolved`] once the record has left
/// PENDING; the store relies on this to make exactly one of two racing
/// writes win.
pub fn record_ack(
    ack: &mut AgentAck,
    outcome: AckOutcome,
    now: DateTime<Utc>,
) -> Result<(), AckError> {
    if ack.state != AckState::Pending {
        return Err(AckError::AlreadyResolved(ack.ack_id.clone()));
    }

    match outcome {
        AckOutcome::Acknowledged { latency_ms } => {
            ack.state = AckState::Acknowledged;
            ack.acknowledged_at = Some(now);
            ack.latency_ms = Some(latency_ms);
            info!(ack_id = %ack.ack_id, agent = %ack.agent_id, latency_ms, "ack acknowledged");
        }
        AckOutcome::Rejected { reason } => {
            ack.state = AckState::Rejected;
            ack.rejection_reason = Some(reason);
            info!(ack_id = %ack.ack_id, agent = %ack.agent_id, "ack rejected");
        }
    }
    Ok(())
}

/// Mark an observed-overdue PENDING ack as TIMEOUT in the store.
///
/// This is the store reacting to an observation, not a timer firing;
/// readers never need it because [`effective_state`] derives the same
/// answer.
pub fn record_timeout(ack: &mut AgentAck, now: DateTime<Utc>) -> Result<(), AckError> {
    if ack.state != AckState::Pending {
        return Err(AckError::AlreadyResolved(ack.ack_id.clone()));
    }
    if now <= ack.deadline_at {
        return Err(AckError::NotOverdue(ack.ack_id.clone()));
    }
    ack.state = AckState::Timeout;
    info!(ack_id = %ack.ack_id, agent = %ack.agent_id, "ack timed out");
    Ok(())
}

/// True iff the ack is PENDING and its deadline has passed.
///
/// Read-time derivation: repeated evaluation with the same `now` is
/// consistent, and no stored state changes.
pub fn is_overdue(ack: &AgentAck, now: DateTime<Utc>) -> bool {
    ack.state == AckState::Pending && now > ack.deadline_at
}

/// The state a reader must treat this ack as having at `now`.
///
/// Maps overdue PENDING to TIMEOUT; everything else is the stored state.
pub fn effective_state(ack: &AgentAck, now: DateTime<Utc>) -> AckState {
    if is_overdue(ack, now) {
        AckState::Timeout
    } else {
        ack.state
    }
}

/// Summarize an acknowledgment set at `now`.
///
/// Counts effective states (overdue PENDING counts as timeout) and computes
/// latency min/avg/max over ACKNOWLEDGED records only.
pub fn summarize<'a>(
    acks: impl IntoIterator<Item = &'a AgentAck>,
    now: DateTime<Utc>,
) -> AckSummary {
    let mut summary = AckSummary::default();
    let mut latencies: Vec<u64> = Vec::new();

    for ack in acks {
        summary.total += 1;
        match effective_state(ack, now) {
            AckState::Pending => summary.pending += 1,
            AckState::Acknowledged => {
                summary.acknowledged += 1;
                if let Some(latency) = ack.latency_ms {
                    latencies.push(latency);
                }
            }
            AckState::Rejected => summary.rejected += 1,
            AckState::Timeout => summary.timeout += 1,
        }
    }

    if !latencies.is_empty() {
        let sum: u64 = latencies.iter().sum();
        summary.latency = LatencyStats {
            min_ms: latencies.iter().min().copied(),
            avg_ms: Some(sum / latencies.len() as u64),
            max_ms: latencies.iter().max().copied(),
        };
    }
    summary
}

/// Latency eligibility report for the governance summary surface.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LatencyEligibility {
    pub eligible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub threshold_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_latency_ms: Option<u64>,
}

/// Check acknowledged latencies against the settlement reporting threshold.
///
/// Reporting only — this is not one of the settlement gates. Absent latency
/// data the answer is ineligible (fail closed).
pub fn latency_within_threshold(summary: &AckSummary) -> LatencyEligibility {
    match summary.latency.max_ms {
        None => LatencyEligibility {
            eligible: false,
            reason: Some("no ack latency data available".into()),
            threshold_ms: ACK_LATENCY_THRESHOLD_MS,
            max_latency_ms: None,
        },
        Some(max) if max <= ACK_LATENCY_THRESHOLD_MS => LatencyEligibility {
            eligible: true,
            reason: None,
            threshold_ms: ACK_LATENCY_THRESHOLD_MS,
            max_latency_ms: Some(max),
        },
        Some(max) => LatencyEligibility {
            eligible: false,
            reason: Some(format!(
                "max ack latency {max}ms exceeds threshold {ACK_LATENCY_THRESHOLD_MS}ms"
            )),
            threshold_ms: ACK_LATENCY_THRESHOLD_MS,
            max_latency_ms: Some(max),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_ack(now: DateTime<Utc>) -> AgentAck {
        request_ack(
            PacId::new("PAC-1"),
            AgentId::new("GID-01"),
            "cody",
            "ORDER-1",
            Duration::seconds(300),
            now,
        )
    }

    #[test]
    fn request_creates_pending_with_deadline() {
        let now = Utc::now();
        let ack = pending_ack(now);
        assert_eq!(ack.state, AckState::Pending);
        assert_eq!(ack.deadline_at, now + Duration::seconds(300));
        assert!(ack.latency_ms.is_none());
    }

    #[test]
    fn acknowledge_stamps_latency() {
        let now = Utc::now();
        let mut ack = pending_ack(now);
        record_ack(&mut ack, AckOutcome::Acknowledged { latency_ms: 120 }, now).unwrap();
        assert_eq!(ack.state, AckState::Acknowledged);
        assert_eq!(ack.latency_ms, Some(120));
        assert_eq!(ack.acknowledged_at, Some(now));
        assert!(ack.rejection_reason.is_none());
    }

    #[test]
    fn reject_records_reason_without_latency() {
        let now = Utc::now();
        let mut ack = pending_ack(now);
        record_ack(
            &mut ack,
            AckOutcome::Rejected {
                reason: "scope conflict".into(),
            },
            now,
        )
        .unwrap();
        assert_eq!(ack.state, AckState::Rejected);
        assert_eq!(ack.rejection_reason.as_deref(), Some("scope conflict"));
        assert!(ack.latency_ms.is_none());
    }

    #[test]
    fn second_resolution_fails_already_resolved() {
        let now = Utc::now();
        let mut ack = pending_ack(now);
        record_ack(&mut ack, AckOutcome::Acknowledged { latency_ms: 50 }, now).unwrap();

        let second = record_ack(
            &mut ack,
            AckOutcome::Rejected {
                reason: "late".into(),
            },
            now,
        );
        assert!(matches!(second, Err(AckError::AlreadyResolved(_))));
        // The first outcome stands.
        assert_eq!(ack.state, AckState::Acknowledged);
    }

    #[test]
    fn overdue_is_derived_not_stored() {
        let now = Utc::now();
        let ack = pending_ack(now);

        assert!(!is_overdue(&ack, now));
        let after_deadline = now + Duration::seconds(301);
        assert!(is_overdue(&ack, after_deadline));
        // Stored state never changed.
        assert_eq!(ack.state, AckState::Pending);
        assert_eq!(effective_state(&ack, after_deadline), AckState::Timeout);
    }

    #[test]
    fn deadline_boundary_is_exclusive() {
        let now = Utc::now();
        let ack = pending_ack(now);
        assert!(!is_overdue(&ack, ack.deadline_at));
        assert!(is_overdue(&ack, ack.deadline_at + Duration::milliseconds(1)));
    }

    #[test]
    fn summary_counts_effective_states() {
        let now = Utc::now();
        let mut acked = pending_ack(now);
        record_ack(&mut acked, AckOutcome::Acknowledged { latency_ms: 120 }, now).unwrap();
        let overdue = pending_ack(now - Duration::seconds(600));

        let summary = summarize([&acked, &overdue], now);
        assert_eq!(summary.total, 2);
        assert_eq!(summary.acknowledged, 1);
        assert_eq!(summary.pending, 0);
        assert_eq!(summary.timeout, 1);
    }

    #[test]
    fn latency_stats_cover_acknowledged_only() {
        let now = Utc::now();
        let mut a = pending_ack(now);
        record_ack(&mut a, AckOutcome::Acknowledged { latency_ms: 150 }, now).unwrap();
        let mut b = pending_ack(now);
        record_ack(&mut b, AckOutcome::Acknowledged { latency_ms: 320 }, now).unwrap();
        let pending = pending_ack(now);

        let summary = summarize([&a, &b, &pending], now);
        assert_eq!(summary.latency.min_ms, Some(150));
        assert_eq!(summary.latency.max_ms, Some(320));
        assert_eq!(summary.latency.avg_ms, Some(235));
    }

    #[test]
    fn empty_set_has_no_latency() {
        let empty: [&AgentAck; 0] = [];
        let summary = summarize(empty, Utc::now());
        assert_eq!(summary.total, 0);
        assert_eq!(summary.latency, LatencyStats::default());
        assert!(!summary.all_acknowledged());
    }

    #[test]
    fn latency_threshold_fails_closed_without_data() {
        let check = latency_within_threshold(&AckSummary::default());
        assert!(!check.eligible);
        assert!(check.reason.is_some());
    }

    #[test]
    fn latency_threshold_binds_max() {
        let now = Utc::now();
        let mut slow = pending_ack(now);
        record_ack(&mut slow, AckOutcome::Acknowledged { latency_ms: 6000 }, now).unwrap();
        let summary = summarize([&slow], now);
        let check = latency_within_threshold(&summary);
        assert!(!check.eligible);
        assert_eq!(check.max_latency_ms, Some(6000));
    }

    #[test]
    fn record_timeout_requires_overdue_pending() {
        let now = Utc::now();
        let mut ack = pending_ack(now);
        assert!(record_timeout(&mut ack, now).is_err());

        let late = now + Duration::seconds(600);
        record_timeout(&mut ack, late).unwrap();
        assert_eq!(ack.state, AckState::Timeout);
        assert!(matches!(
            record_timeout(&mut ack, late),
            Err(AckError::AlreadyResolved(_))
        ));
    }
}
