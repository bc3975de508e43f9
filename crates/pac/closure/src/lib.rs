//! PAC Closure - reporting-side governance records.
//!
//! The review gate, self-review attestation, and positive-closure checklist
//! roll the control plane's gates into a checklist view for operators. This
//! is strictly downstream reporting: the settlement evaluator never reads
//! anything defined here, so checklist presentation can evolve without
//! touching eligibility math.

#![deny(unsafe_code)]

use chrono::{DateTime, Utc};
use pac_types::{
    AckSummary, AgentId, BerState, ExecutionReport, MultiAgentWrapSet, PacId, ValidationState,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

fn gate_token(prefix: &str) -> String {
    format!(
        "{prefix}-{}",
        Uuid::new_v4().simple().to_string()[..8].to_uppercase()
    )
}

/// Review gate result.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewResult {
    Pass,
    Fail,
}

/// One named review pass-condition and its observed status.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassCondition {
    pub condition: String,
    pub status: Option<bool>,
}

/// The WRAP review gate (RG-01): a reviewer's structural pass over the
/// collected WRAP set before BER issuance.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReviewGate {
    pub gate_id: String,
    pub pac_id: PacId,
    pub reviewer: AgentId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ReviewResult>,
    pub pass_conditions: Vec<PassCondition>,
    pub fail_reasons: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluated_at: Option<DateTime<Utc>>,
}

impl ReviewGate {
    pub fn new(pac_id: PacId, reviewer: AgentId) -> Self {
        Self {
            gate_id: gate_token("RG01"),
            pac_id,
            reviewer,
            result: None,
            pass_conditions: Vec::new(),
            fail_reasons: Vec::new(),
            evaluated_at: None,
        }
    }

    /// Evaluate the review pass-conditions against the collected WRAP set.
    ///
    /// Conditions: every expected WRAP present, every collected WRAP VALID.
    /// Re-evaluation replaces the previous result; the gate records only
    /// the latest review.
    pub fn evaluate(&mut self, wrap_set: &MultiAgentWrapSet, now: DateTime<Utc>) -> ReviewResult {
        self.evaluated_at = Some(now);
        self.fail_reasons.clear();

        if !wrap_set.is_complete() {
            let missing: Vec<String> = wrap_set
                .missing_agents()
                .into_iter()
                .map(|agent| agent.to_string())
                .collect();
            self.fail_reasons
                .push(format!("missing WRAPs from agents: {}", missing.join(", ")));
        }

        let invalid: Vec<String> = wrap_set
            .collected
            .values()
            .filter(|wrap| wrap.validation_state != ValidationState::Valid)
            .map(|wrap| format!("{} ({:?})", wrap.agent_id, wrap.validation_state))
            .collect();
        if !invalid.is_empty() {
            self.fail_reasons
                .push(format!("invalid WRAPs from agents: {}", invalid.join(", ")));
        }

        self.pass_conditions = vec![
            PassCondition {
                condition: "all_wraps_present".into(),
                status: Some(wrap_set.is_complete()),
            },
            PassCondition {
                condition: "wrap_schema_valid".into(),
                status: Some(wrap_set.all_valid()),
            },
        ];

        let result = if self.fail_reasons.is_empty() {
            ReviewResult::Pass
        } else {
            ReviewResult::Fail
        };
        self.result = Some(result);
        info!(gate_id = %self.gate_id, pac_id = %self.pac_id, ?result, "review gate evaluated");
        result
    }
}

/// The reviewer's own attestation that the review itself was clean: no
/// override, no scope drift, no unresolved violations.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SelfReviewAttestation {
    pub gate_id: String,
    pub pac_id: PacId,
    pub attested: bool,
    pub violations: Vec<String>,
    pub no_override: bool,
    pub no_drift: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attested_at: Option<DateTime<Utc>>,
}

impl SelfReviewAttestation {
    pub fn new(pac_id: PacId) -> Self {
        Self {
            gate_id: gate_token("SRG01"),
            pac_id,
            attested: false,
            violations: Vec::new(),
            no_override: false,
            no_drift: false,
            attested_at: None,
        }
    }

    /// Record the attestation. Valid only when every mandatory claim holds
    /// and no violations are declared.
    pub fn attest(
        &mut self,
        violations: Vec<String>,
        no_override: bool,
        no_drift: bool,
        now: DateTime<Utc>,
    ) -> bool {
        self.attested_at = Some(now);
        self.no_override = no_override;
        self.no_drift = no_drift;
        self.violations = violations;
        self.attested = no_override && no_drift && self.violations.is_empty();
        self.attested
    }
}

/// Attestation that the WRAP set and BER were committed to the governance
/// ledger. Hashes are opaque references supplied by the ledger writer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedgerCommitAttestation {
    pub attestation_id: String,
    pub pac_id: PacId,
    pub wrap_hashes: Vec<String>,
    pub ber_hash: String,
    pub committed_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ledger_block: Option<String>,
}

impl LedgerCommitAttestation {
    pub fn new(
        pac_id: PacId,
        wrap_hashes: Vec<String>,
        ber_hash: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            attestation_id: gate_token("ATTEST"),
            pac_id,
            wrap_hashes,
            ber_hash: ber_hash.into(),
            committed_at: now,
            ledger_block: None,
        }
    }
}

/// Status of a single closure-checklist item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChecklistItemStatus {
    Pass,
    Fail,
    Provisional,
    Pending,
}

/// The six closure conditions, under their wire names.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistItems {
    #[serde(rename = "PAG-01_ACKS_COMPLETE")]
    pub acks_complete: ChecklistItemStatus,
    #[serde(rename = "ALL_REQUIRED_WRAPS")]
    pub all_required_wraps: ChecklistItemStatus,
    #[serde(rename = "RG-01")]
    pub review_gate: ChecklistItemStatus,
    #[serde(rename = "SELF_REVIEW")]
    pub self_review: ChecklistItemStatus,
    #[serde(rename = "BER_ISSUED")]
    pub ber_issued: ChecklistItemStatus,
    #[serde(rename = "LEDGER_COMMIT")]
    pub ledger_commit: ChecklistItemStatus,
}

impl ChecklistItems {
    fn all(&self) -> [ChecklistItemStatus; 6] {
        [
            self.acks_complete,
            self.all_required_wraps,
            self.review_gate,
            self.self_review,
            self.ber_issued,
            self.ledger_commit,
        ]
    }
}

/// The positive-closure checklist for one PAC.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClosureChecklist {
    pub checklist_id: String,
    pub pac_id: PacId,
    pub items: ChecklistItems,
    pub overall_status: ChecklistItemStatus,
    pub evaluated_at: DateTime<Utc>,
}

/// Everything the checklist reads. All references are to immutable
/// snapshots; absence maps to PENDING, explicit negatives to FAIL.
#[derive(Clone, Copy, Debug)]
pub struct ChecklistInputs<'a> {
    pub ack_summary: &'a AckSummary,
    pub wrap_set: Option<&'a MultiAgentWrapSet>,
    pub review: Option<&'a ReviewGate>,
    pub self_review: Option<&'a SelfReviewAttestation>,
    pub ber: Option<&'a ExecutionReport>,
    pub ledger: Option<&'a LedgerCommitAttestation>,
}

/// Build the closure checklist.
///
/// `LEDGER_COMMIT` is the only item that may be PROVISIONAL: an issued but
/// non-final BER whose commit has not landed yet. Overall status is PASS
/// iff every item is PASS — PROVISIONAL counts as not-yet-PASS.
pub fn evaluate_checklist(
    pac_id: PacId,
    inputs: &ChecklistInputs<'_>,
    now: DateTime<Utc>,
) -> ClosureChecklist {
    use ChecklistItemStatus::*;

    let acks_complete = if inputs.ack_summary.rejected > 0 || inputs.ack_summary.timeout > 0 {
        Fail
    } else if inputs.ack_summary.all_acknowledged() {
        Pass
    } else {
        Pending
    };

    let all_required_wraps = match inputs.wrap_set {
        None => Pending,
        Some(set) if !set.is_complete() => Pending,
        Some(set) if set.all_valid() => Pass,
        Some(_) => Fail,
    };

    let review_gate = match inputs.review.and_then(|gate| gate.result) {
        None => Pending,
        Some(ReviewResult::Pass) => Pass,
        Some(ReviewResult::Fail) => Fail,
    };

    let self_review = match inputs.self_review {
        None => Pending,
        Some(attestation) if attestation.attested_at.is_none() => Pending,
        Some(attestation) if attestation.attested => Pass,
        Some(_) => Fail,
    };

    let ber_issued = match inputs.ber {
        None => Pending,
        Some(ber) => match ber.state {
            BerState::Issued => Pass,
            BerState::Challenged | BerState::Revoked => Fail,
            _ => Pending,
        },
    };

    let ledger_commit = if inputs.ledger.is_some() {
        Pass
    } else {
        match inputs.ber {
            Some(ber)
                if ber.state == BerState::Issued
                    && ber.finality == pac_types::BerFinality::Provisional =>
            {
                Provisional
            }
            _ => Pending,
        }
    };

    let items = ChecklistItems {
        acks_complete,
        all_required_wraps,
        review_gate,
        self_review,
        ber_issued,
        ledger_commit,
    };

    let overall_status = if items.all().iter().all(|status| *status == Pass) {
        Pass
    } else if items.all().iter().any(|status| *status == Fail) {
        Fail
    } else {
        Pending
    };

    ClosureChecklist {
        checklist_id: gate_token("CHECKLIST"),
        pac_id,
        items,
        overall_status,
        evaluated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pac_ack::{record_ack, request_ack, summarize, AckOutcome};
    use pac_types::{AgentAck, BerFinality};

    fn acked(agent: &str) -> AgentAck {
        let now = Utc::now();
        let mut ack = request_ack(
            PacId::new("PAC-1"),
            AgentId::new(agent),
            agent,
            "ORDER-1",
            Duration::seconds(300),
            now,
        );
        record_ack(&mut ack, AckOutcome::Acknowledged { latency_ms: 90 }, now).unwrap();
        ack
    }

    fn valid_set(agents: &[&str]) -> MultiAgentWrapSet {
        let now = Utc::now();
        let mut set = MultiAgentWrapSet::new(
            PacId::new("PAC-1"),
            agents.iter().map(|a| AgentId::new(*a)),
            now,
        );
        for agent in agents {
            let mut wrap = pac_wrap::submit(
                PacId::new("PAC-1"),
                AgentId::new(*agent),
                vec!["outcome".into()],
                now,
            );
            wrap.validation_state = ValidationState::Valid;
            pac_wrap::add_wrap(&mut set, wrap, now).unwrap();
        }
        set
    }

    fn issued_ber(set: &MultiAgentWrapSet, summary: &AckSummary, finality: BerFinality) -> ExecutionReport {
        let mut ber = pac_ber::draft(PacId::new("PAC-1"), summary, set);
        pac_ber::issue(&mut ber, AgentId::new("GID-00"), set, Utc::now()).unwrap();
        if finality == BerFinality::Final {
            pac_ber::finalize(&mut ber, "commit-1").unwrap();
        }
        ber
    }

    #[test]
    fn review_gate_passes_complete_valid_set() {
        let set = valid_set(&["GID-01", "GID-02"]);
        let mut gate = ReviewGate::new(PacId::new("PAC-1"), AgentId::new("GID-00"));
        assert_eq!(gate.evaluate(&set, Utc::now()), ReviewResult::Pass);
        assert!(gate.fail_reasons.is_empty());
        assert_eq!(gate.pass_conditions.len(), 2);
    }

    #[test]
    fn review_gate_fails_incomplete_set_with_reasons() {
        let now = Utc::now();
        let mut set = MultiAgentWrapSet::new(
            PacId::new("PAC-1"),
            [AgentId::new("GID-01"), AgentId::new("GID-02")],
            now,
        );
        let mut wrap = pac_wrap::submit(
            PacId::new("PAC-1"),
            AgentId::new("GID-01"),
            vec!["outcome".into()],
            now,
        );
        wrap.validation_state = ValidationState::Invalid;
        pac_wrap::add_wrap(&mut set, wrap, now).unwrap();

        let mut gate = ReviewGate::new(PacId::new("PAC-1"), AgentId::new("GID-00"));
        assert_eq!(gate.evaluate(&set, now), ReviewResult::Fail);
        assert_eq!(gate.fail_reasons.len(), 2);
    }

    #[test]
    fn attestation_requires_every_claim() {
        let mut attestation = SelfReviewAttestation::new(PacId::new("PAC-1"));
        assert!(!attestation.attest(vec![], true, false, Utc::now()));
        assert!(!attestation.attest(vec!["late wrap".into()], true, true, Utc::now()));
        assert!(attestation.attest(vec![], true, true, Utc::now()));
    }

    #[test]
    fn checklist_all_pass() {
        let now = Utc::now();
        let acks = vec![acked("GID-01")];
        let summary = summarize(&acks, now);
        let set = valid_set(&["GID-01"]);
        let mut review = ReviewGate::new(PacId::new("PAC-1"), AgentId::new("GID-00"));
        review.evaluate(&set, now);
        let mut self_review = SelfReviewAttestation::new(PacId::new("PAC-1"));
        self_review.attest(vec![], true, true, now);
        let ber = issued_ber(&set, &summary, BerFinality::Final);
        let ledger = LedgerCommitAttestation::new(PacId::new("PAC-1"), vec!["wh".into()], "bh", now);

        let checklist = evaluate_checklist(
            PacId::new("PAC-1"),
            &ChecklistInputs {
                ack_summary: &summary,
                wrap_set: Some(&set),
                review: Some(&review),
                self_review: Some(&self_review),
                ber: Some(&ber),
                ledger: Some(&ledger),
            },
            now,
        );
        assert_eq!(checklist.overall_status, ChecklistItemStatus::Pass);
        assert!(checklist
            .items
            .all()
            .iter()
            .all(|s| *s == ChecklistItemStatus::Pass));
    }

    #[test]
    fn provisional_ledger_commit_is_not_yet_pass() {
        let now = Utc::now();
        let acks = vec![acked("GID-01")];
        let summary = summarize(&acks, now);
        let set = valid_set(&["GID-01"]);
        let mut review = ReviewGate::new(PacId::new("PAC-1"), AgentId::new("GID-00"));
        review.evaluate(&set, now);
        let mut self_review = SelfReviewAttestation::new(PacId::new("PAC-1"));
        self_review.attest(vec![], true, true, now);
        // Issued but provisional, no ledger attestation yet.
        let ber = issued_ber(&set, &summary, BerFinality::Provisional);

        let checklist = evaluate_checklist(
            PacId::new("PAC-1"),
            &ChecklistInputs {
                ack_summary: &summary,
                wrap_set: Some(&set),
                review: Some(&review),
                self_review: Some(&self_review),
                ber: Some(&ber),
                ledger: None,
            },
            now,
        );
        assert_eq!(
            checklist.items.ledger_commit,
            ChecklistItemStatus::Provisional
        );
        assert_ne!(checklist.overall_status, ChecklistItemStatus::Pass);
    }

    #[test]
    fn empty_inputs_are_pending_not_failed() {
        let now = Utc::now();
        let summary = AckSummary::default();
        let checklist = evaluate_checklist(
            PacId::new("PAC-1"),
            &ChecklistInputs {
                ack_summary: &summary,
                wrap_set: None,
                review: None,
                self_review: None,
                ber: None,
                ledger: None,
            },
            now,
        );
        assert_eq!(checklist.overall_status, ChecklistItemStatus::Pending);
        assert_eq!(checklist.items.acks_complete, ChecklistItemStatus::Pending);
    }

    #[test]
    fn rejected_ack_fails_the_checklist() {
        let now = Utc::now();
        let summary = AckSummary {
            total: 2,
            acknowledged: 1,
            rejected: 1,
            ..Default::default()
        };
        let checklist = evaluate_checklist(
            PacId::new("PAC-1"),
            &ChecklistInputs {
                ack_summary: &summary,
                wrap_set: None,
                review: None,
                self_review: None,
                ber: None,
                ledger: None,
            },
            now,
        );
        assert_eq!(checklist.items.acks_complete, ChecklistItemStatus::Fail);
        assert_eq!(checklist.overall_status, ChecklistItemStatus::Fail);
    }

    #[test]
    fn checklist_wire_names_match_governance_vocabulary() {
        let now = Utc::now();
        let summary = AckSummary::default();
        let checklist = evaluate_checklist(
            PacId::new("PAC-1"),
            &ChecklistInputs {
                ack_summary: &summary,
                wrap_set: None,
                review: None,
                self_review: None,
                ber: None,
                ledger: None,
            },
            now,
        );
        let json = serde_json::to_value(&checklist).unwrap();
        let items = &json["items"];
        assert!(items.get("PAG-01_ACKS_COMPLETE").is_some());
        assert!(items.get("ALL_REQUIRED_WRAPS").is_some());
        assert!(items.get("RG-01").is_some());
        assert!(items.get("SELF_REVIEW").is_some());
        assert!(items.get("BER_ISSUED").is_some());
        assert!(items.get("LEDGER_COMMIT").is_some());
    }
}
