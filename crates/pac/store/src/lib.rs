//! PAC Store - the owning control-plane state store.
//!
//! This is the only place records are created or mutated; every write path
//! of the external interface lands on a method here. Entries live in a
//! `DashMap` keyed by PAC id, and each write locks its single entry, so
//! conflicting writes to the same PAC serialize and exactly one of two
//! racing resolutions wins (the loser observes `AlreadyResolved`). Reads
//! assemble owned point-in-time snapshots and never hold a lock across
//! component calls, so evaluation runs concurrently with writes to other
//! PACs.
//!
//! Store methods advance the PAC lifecycle as a side effect of the writes
//! that justify it: the last acknowledgment applies
//! `all_acks_acknowledged`, a rejected one applies `any_ack_rejected`, and
//! so on. Nothing is ever deleted; terminal records are retained for audit.

#![deny(unsafe_code)]

use chrono::{Duration, Utc};
use dashmap::DashMap;
use pac_ack::{AckError, AckOutcome};
use pac_ber::BerError;
use pac_closure::{
    evaluate_checklist, ChecklistInputs, ClosureChecklist, LedgerCommitAttestation, ReviewGate,
    ReviewResult, SelfReviewAttestation,
};
use pac_lifecycle::{LifecycleError, Trigger};
use pac_settlement::EvaluationInput;
use pac_types::{
    AckState, AgentAck, AgentId, ControlPlaneIndexEntry, ControlPlaneSnapshot, ExecutionReport,
    LifecycleState, MultiAgentWrapSet, Pac, PacId, SettlementStatus, SettlementVerdict,
    ValidationState,
};
use pac_wrap::{ContentRules, WrapError};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::info;

/// Store errors: the caller-facing write failures of the control plane.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("PAC not found: {0}")]
    NotFound(PacId),

    #[error("PAC already exists: {0}")]
    AlreadyExists(PacId),

    #[error("no ACK requested for agent {agent} on PAC {pac_id}")]
    AckNotFound { pac_id: PacId, agent: AgentId },

    #[error("no WRAP collected from agent {agent} on PAC {pac_id}")]
    WrapNotFound { pac_id: PacId, agent: AgentId },

    #[error("no BER exists for PAC {0}")]
    BerNotFound(PacId),

    #[error("PAC {pac_id} is not eligible for settlement: {reasons:?}")]
    SettlementBlocked {
        pac_id: PacId,
        reasons: Vec<pac_types::ReasonCode>,
    },

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Ack(#[from] AckError),

    #[error(transparent)]
    Wrap(#[from] WrapError),

    #[error(transparent)]
    Ber(#[from] BerError),
}

/// Everything the store holds for one PAC.
#[derive(Clone, Debug)]
struct PacEntry {
    pac: Pac,
    acks: BTreeMap<AgentId, AgentAck>,
    wrap_set: MultiAgentWrapSet,
    ber: Option<ExecutionReport>,
    review: Option<ReviewGate>,
    self_review: Option<SelfReviewAttestation>,
    ledger: Option<LedgerCommitAttestation>,
}

impl PacEntry {
    /// Apply a lifecycle reaction if the current state defines the edge.
    ///
    /// Event-reaction triggers (ack resolved, wrap validated) may arrive
    /// after the PAC already reached a terminal state; the record write
    /// stands and the terminal state is preserved. Direct operations
    /// (dispatch, settle) call `pac_lifecycle::transition` instead and
    /// fail on an undefined edge.
    fn react(
        &mut self,
        trigger: Trigger,
        reason: impl Into<String>,
        actor: &str,
        now: chrono::DateTime<Utc>,
    ) -> Result<(), LifecycleError> {
        if pac_lifecycle::target_for(self.pac.lifecycle_state, trigger).is_some() {
            pac_lifecycle::transition(&mut self.pac, trigger, reason, actor, now)?;
        }
        Ok(())
    }

    fn verdict(&self) -> SettlementVerdict {
        let acks: Vec<AgentAck> = self.acks.values().cloned().collect();
        pac_settlement::evaluate(
            &EvaluationInput {
                pac: &self.pac,
                acks: &acks,
                wrap_set: Some(&self.wrap_set),
                ber: self.ber.as_ref(),
            },
            Utc::now(),
        )
    }
}

/// The in-memory control-plane store.
pub struct ControlPlaneStore {
    entries: DashMap<PacId, PacEntry>,
    content_rules: ContentRules,
}

impl ControlPlaneStore {
    pub fn new() -> Self {
        Self::with_rules(ContentRules::default())
    }

    /// Create a store that validates WRAP content against `rules`.
    pub fn with_rules(content_rules: ContentRules) -> Self {
        Self {
            entries: DashMap::new(),
            content_rules,
        }
    }

    // ── write boundary ──────────────────────────────────────────────

    /// Create a PAC in DRAFT with its fixed expected-agent set.
    pub fn create_pac(
        &self,
        pac_id: PacId,
        runtime_id: impl Into<String>,
        expected_agents: Vec<AgentId>,
    ) -> Result<(), StoreError> {
        if self.entries.contains_key(&pac_id) {
            return Err(StoreError::AlreadyExists(pac_id));
        }
        let now = Utc::now();
        let entry = PacEntry {
            pac: Pac::new(pac_id.clone(), runtime_id, now),
            acks: BTreeMap::new(),
            wrap_set: MultiAgentWrapSet::new(pac_id.clone(), expected_agents, now),
            ber: None,
            review: None,
            self_review: None,
            ledger: None,
        };
        info!(pac_id = %pac_id, "PAC created");
        self.entries.insert(pac_id, entry);
        Ok(())
    }

    /// Dispatch a PAC: request an ACK from every named agent and open the
    /// acknowledgment window.
    pub fn dispatch(
        &self,
        pac_id: &PacId,
        agents: &[(AgentId, String, String)],
        deadline: Duration,
        actor: &str,
    ) -> Result<(), StoreError> {
        let mut entry = self.entry_mut(pac_id)?;
        let now = Utc::now();
        pac_lifecycle::transition(
            &mut entry.pac,
            Trigger::Dispatch,
            "PAC dispatched to agents",
            actor,
            now,
        )?;
        for (agent_id, agent_name, order_id) in agents {
            let ack = pac_ack::request_ack(
                pac_id.clone(),
                agent_id.clone(),
                agent_name.clone(),
                order_id.clone(),
                deadline,
                now,
            );
            entry.acks.insert(agent_id.clone(), ack);
        }
        Ok(())
    }

    /// Record an agent's explicit ACK response.
    ///
    /// The resolving write is the serialization point: a second resolution
    /// for the same agent fails with `AlreadyResolved`. Completing the set
    /// advances the lifecycle to EXECUTING; a rejection fails it.
    pub fn record_ack(
        &self,
        pac_id: &PacId,
        agent_id: &AgentId,
        outcome: AckOutcome,
    ) -> Result<(), StoreError> {
        let mut entry = self.entry_mut(pac_id)?;
        let now = Utc::now();
        let rejected = matches!(outcome, AckOutcome::Rejected { .. });

        let ack = entry
            .acks
            .get_mut(agent_id)
            .ok_or_else(|| StoreError::AckNotFound {
                pac_id: pac_id.clone(),
                agent: agent_id.clone(),
            })?;
        pac_ack::record_ack(ack, outcome, now)?;

        if rejected {
            entry.react(
                Trigger::AnyAckRejected,
                format!("agent {agent_id} rejected the PAC"),
                agent_id.as_str(),
                now,
            )?;
        } else if entry
            .acks
            .values()
            .all(|ack| ack.state == AckState::Acknowledged)
        {
            entry.react(
                Trigger::AllAcksAcknowledged,
                "all agents acknowledged",
                agent_id.as_str(),
                now,
            )?;
        }
        Ok(())
    }

    /// Record an observed ACK timeout for an overdue PENDING record and
    /// fail the PAC. This is an observation write, not a timer.
    pub fn record_ack_timeout(&self, pac_id: &PacId, agent_id: &AgentId) -> Result<(), StoreError> {
        let mut entry = self.entry_mut(pac_id)?;
        let now = Utc::now();
        let ack = entry
            .acks
            .get_mut(agent_id)
            .ok_or_else(|| StoreError::AckNotFound {
                pac_id: pac_id.clone(),
                agent: agent_id.clone(),
            })?;
        pac_ack::record_timeout(ack, now)?;
        entry.react(
            Trigger::AnyAckTimeout,
            format!("agent {agent_id} failed to acknowledge before the deadline"),
            "control-plane",
            now,
        )?;
        Ok(())
    }

    /// Record that execution finished and the WRAP window opened.
    pub fn execution_completed(&self, pac_id: &PacId, actor: &str) -> Result<(), StoreError> {
        let mut entry = self.entry_mut(pac_id)?;
        pac_lifecycle::transition(
            &mut entry.pac,
            Trigger::ExecutionCompleted,
            "execution completed",
            actor,
            Utc::now(),
        )?;
        Ok(())
    }

    /// Record an execution failure reported by an agent.
    pub fn execution_failed(
        &self,
        pac_id: &PacId,
        actor: &str,
        reason: impl Into<String>,
    ) -> Result<(), StoreError> {
        let mut entry = self.entry_mut(pac_id)?;
        pac_lifecycle::transition(
            &mut entry.pac,
            Trigger::ExecutionFailed,
            reason,
            actor,
            Utc::now(),
        )?;
        Ok(())
    }

    /// Accept a WRAP submission from an agent.
    ///
    /// `wrap_hash` is the submitter's opaque integrity reference. The first
    /// accepted submission moves the lifecycle to WRAP_SUBMITTED.
    pub fn submit_wrap(
        &self,
        pac_id: &PacId,
        agent_id: &AgentId,
        artifact_refs: Vec<String>,
        wrap_hash: impl Into<String>,
    ) -> Result<(), StoreError> {
        let mut entry = self.entry_mut(pac_id)?;
        let now = Utc::now();
        let mut wrap = pac_wrap::submit(pac_id.clone(), agent_id.clone(), artifact_refs, now);
        wrap.wrap_hash = wrap_hash.into();
        pac_wrap::add_wrap(&mut entry.wrap_set, wrap, now)?;

        if entry.pac.lifecycle_state == LifecycleState::WrapPending {
            pac_lifecycle::transition(
                &mut entry.pac,
                Trigger::WrapSubmitted,
                format!("WRAP submitted by {agent_id}"),
                agent_id.as_str(),
                now,
            )?;
        }
        Ok(())
    }

    /// Validate a collected WRAP against the acknowledgment set and the
    /// store's content rules.
    ///
    /// Validation outcomes are data. The lifecycle reacts only at the
    /// edges: a failed WRAP rejects the PAC; a complete all-valid set
    /// advances it to WRAP_VALIDATED.
    pub fn validate_wrap(
        &self,
        pac_id: &PacId,
        agent_id: &AgentId,
    ) -> Result<ValidationState, StoreError> {
        let mut entry = self.entry_mut(pac_id)?;
        let now = Utc::now();
        let acks: Vec<AgentAck> = entry.acks.values().cloned().collect();

        let wrap = entry
            .wrap_set
            .collected
            .get_mut(agent_id)
            .ok_or_else(|| StoreError::WrapNotFound {
                pac_id: pac_id.clone(),
                agent: agent_id.clone(),
            })?;
        let state = pac_wrap::validate(wrap, &acks, &self.content_rules, now);

        if state.is_rejected() {
            entry.react(
                Trigger::WrapRejected,
                format!("WRAP from {agent_id} failed validation: {state:?}"),
                "wrap-registry",
                now,
            )?;
        } else if entry.wrap_set.all_valid() {
            entry.react(
                Trigger::WrapValidated,
                "all expected WRAPs validated",
                "wrap-registry",
                now,
            )?;
        }
        Ok(state)
    }

    /// Issue the BER for a PAC.
    ///
    /// Drafts the report against the current ACK summary and WRAP set; if
    /// the five-way precondition fails, the NOT_ELIGIBLE draft is retained
    /// and the call fails closed.
    pub fn issue_ber(&self, pac_id: &PacId, issuer: AgentId) -> Result<(), StoreError> {
        let mut entry = self.entry_mut(pac_id)?;
        let now = Utc::now();
        let summary = pac_ack::summarize(entry.acks.values(), now);
        let mut ber = pac_ber::draft(pac_id.clone(), &summary, &entry.wrap_set);

        if ber.state != pac_types::BerState::Eligible {
            // The NOT_ELIGIBLE draft is retained as audit data; the call
            // still fails closed.
            let err = BerError::NotIssuable {
                ber_id: ber.ber_id.clone(),
                state: ber.state,
            };
            entry.ber = Some(ber);
            return Err(err.into());
        }

        // Out-of-order issuance is rejected before any record is written.
        if pac_lifecycle::target_for(entry.pac.lifecycle_state, Trigger::BerIssued).is_none() {
            return Err(StoreError::Lifecycle(LifecycleError::InvalidTransition {
                from: entry.pac.lifecycle_state,
                trigger: Trigger::BerIssued,
            }));
        }

        pac_ber::issue(&mut ber, issuer, &entry.wrap_set, now)?;
        entry.ber = Some(ber);
        pac_lifecycle::transition(
            &mut entry.pac,
            Trigger::BerIssued,
            "execution report issued",
            "ber-issuer",
            now,
        )?;
        Ok(())
    }

    /// Record the ledger commit for an issued BER and finalize it.
    pub fn record_ledger_commit(
        &self,
        pac_id: &PacId,
        ledger_commit_hash: impl Into<String>,
    ) -> Result<(), StoreError> {
        let mut entry = self.entry_mut(pac_id)?;
        let now = Utc::now();
        let hash = ledger_commit_hash.into();

        let wrap_hashes: Vec<String> = entry
            .wrap_set
            .collected
            .values()
            .map(|wrap| wrap.wrap_hash.clone())
            .collect();
        let ber = entry
            .ber
            .as_mut()
            .ok_or_else(|| StoreError::BerNotFound(pac_id.clone()))?;
        pac_ber::finalize(ber, hash.clone())?;
        let ber_hash = ber.ber_hash.clone();

        entry.ledger = Some(LedgerCommitAttestation::new(
            pac_id.clone(),
            wrap_hashes,
            ber_hash,
            now,
        ));
        info!(pac_id = %pac_id, "ledger commit recorded");
        Ok(())
    }

    /// Challenge the issued BER. Blocks settlement permanently for this
    /// report.
    pub fn challenge_ber(&self, pac_id: &PacId) -> Result<(), StoreError> {
        self.invalidate_ber(pac_id, true)
    }

    /// Revoke the issued BER. One-way, like a challenge.
    pub fn revoke_ber(&self, pac_id: &PacId) -> Result<(), StoreError> {
        self.invalidate_ber(pac_id, false)
    }

    fn invalidate_ber(&self, pac_id: &PacId, challenge: bool) -> Result<(), StoreError> {
        let mut entry = self.entry_mut(pac_id)?;
        let now = Utc::now();
        let ber = entry
            .ber
            .as_mut()
            .ok_or_else(|| StoreError::BerNotFound(pac_id.clone()))?;
        let reason = if challenge {
            pac_ber::challenge(ber)?;
            "BER challenged"
        } else {
            pac_ber::revoke(ber)?;
            "BER revoked"
        };
        entry.react(Trigger::GovernanceViolation, reason, "ber-issuer", now)?;
        Ok(())
    }

    /// Settle a PAC. Gated on the settlement verdict recomputed at the
    /// moment of the write: a BLOCKED verdict fails the call and leaves
    /// the lifecycle where it was.
    pub fn settle(&self, pac_id: &PacId, actor: &str) -> Result<(), StoreError> {
        let mut entry = self.entry_mut(pac_id)?;
        let verdict = entry.verdict();
        if verdict.status != SettlementStatus::Eligible {
            return Err(StoreError::SettlementBlocked {
                pac_id: pac_id.clone(),
                reasons: verdict.blocking_reasons.iter().map(|r| r.code).collect(),
            });
        }
        pac_lifecycle::transition(
            &mut entry.pac,
            Trigger::Settled,
            "settlement committed",
            actor,
            Utc::now(),
        )?;
        Ok(())
    }

    /// Run the WRAP review gate.
    pub fn run_review(&self, pac_id: &PacId, reviewer: AgentId) -> Result<ReviewResult, StoreError> {
        let mut entry = self.entry_mut(pac_id)?;
        let now = Utc::now();
        let mut gate = entry
            .review
            .take()
            .unwrap_or_else(|| ReviewGate::new(pac_id.clone(), reviewer));
        let result = gate.evaluate(&entry.wrap_set, now);
        entry.review = Some(gate);
        Ok(result)
    }

    /// Record the reviewer's self-review attestation.
    pub fn attest_self_review(
        &self,
        pac_id: &PacId,
        violations: Vec<String>,
        no_override: bool,
        no_drift: bool,
    ) -> Result<bool, StoreError> {
        let mut entry = self.entry_mut(pac_id)?;
        let now = Utc::now();
        let mut attestation = entry
            .self_review
            .take()
            .unwrap_or_else(|| SelfReviewAttestation::new(pac_id.clone()));
        let attested = attestation.attest(violations, no_override, no_drift, now);
        entry.self_review = Some(attestation);
        Ok(attested)
    }

    // ── read boundary ───────────────────────────────────────────────

    /// Assemble the complete control-plane snapshot for one PAC.
    ///
    /// The snapshot is owned data; the entry lock is released before the
    /// settlement verdict is computed.
    pub fn snapshot(&self, pac_id: &PacId) -> Result<ControlPlaneSnapshot, StoreError> {
        let entry = self.entry_cloned(pac_id)?;
        let now = Utc::now();
        let acks: Vec<AgentAck> = entry.acks.values().cloned().collect();
        let summary = pac_ack::summarize(&acks, now);
        let verdict = pac_settlement::evaluate(
            &EvaluationInput {
                pac: &entry.pac,
                acks: &acks,
                wrap_set: Some(&entry.wrap_set),
                ber: entry.ber.as_ref(),
            },
            now,
        );
        let block_reason = verdict
            .blocking_reasons
            .first()
            .map(|reason| reason.description.clone());

        Ok(ControlPlaneSnapshot {
            pac_id: entry.pac.id.clone(),
            runtime_id: entry.pac.runtime_id.clone(),
            lifecycle_state: entry.pac.lifecycle_state,
            agent_acks: entry.acks,
            wraps: entry.wrap_set.collected.clone(),
            ber: entry.ber,
            settlement_eligibility: verdict.status,
            settlement_block_reason: block_reason,
            ack_summary: summary,
            state_transitions: entry.pac.transitions,
            created_at: entry.pac.created_at,
            updated_at: entry.pac.updated_at,
        })
    }

    /// Recompute the settlement verdict for one PAC. Never cached.
    pub fn verdict(&self, pac_id: &PacId) -> Result<SettlementVerdict, StoreError> {
        Ok(self.entry_cloned(pac_id)?.verdict())
    }

    /// Build the positive-closure checklist for one PAC.
    pub fn checklist(&self, pac_id: &PacId) -> Result<ClosureChecklist, StoreError> {
        let entry = self.entry_cloned(pac_id)?;
        let now = Utc::now();
        let summary = pac_ack::summarize(entry.acks.values(), now);
        Ok(evaluate_checklist(
            pac_id.clone(),
            &ChecklistInputs {
                ack_summary: &summary,
                wrap_set: Some(&entry.wrap_set),
                review: entry.review.as_ref(),
                self_review: entry.self_review.as_ref(),
                ber: entry.ber.as_ref(),
                ledger: entry.ledger.as_ref(),
            },
            now,
        ))
    }

    /// ACK latency report for one PAC.
    pub fn latency_report(&self, pac_id: &PacId) -> Result<pac_ack::LatencyEligibility, StoreError> {
        let entry = self.entry_cloned(pac_id)?;
        let summary = pac_ack::summarize(entry.acks.values(), Utc::now());
        Ok(pac_ack::latency_within_threshold(&summary))
    }

    /// Index of all tracked PACs, ordered by id.
    pub fn list(&self) -> Vec<ControlPlaneIndexEntry> {
        let now = Utc::now();
        let mut entries: Vec<ControlPlaneIndexEntry> = self
            .entries
            .iter()
            .map(|entry| {
                let summary = pac_ack::summarize(entry.acks.values(), now);
                ControlPlaneIndexEntry {
                    pac_id: entry.pac.id.clone(),
                    runtime_id: entry.pac.runtime_id.clone(),
                    lifecycle_state: entry.pac.lifecycle_state,
                    settlement_eligibility: entry.verdict().status,
                    acks_acknowledged: summary.acknowledged,
                    acks_total: summary.total,
                    created_at: entry.pac.created_at,
                    updated_at: entry.pac.updated_at,
                }
            })
            .collect();
        entries.sort_by(|a, b| a.pac_id.cmp(&b.pac_id));
        entries
    }

    /// Fetch one agent's ACK record.
    pub fn ack(&self, pac_id: &PacId, agent_id: &AgentId) -> Result<AgentAck, StoreError> {
        let entry = self.entry_cloned(pac_id)?;
        entry
            .acks
            .get(agent_id)
            .cloned()
            .ok_or_else(|| StoreError::AckNotFound {
                pac_id: pac_id.clone(),
                agent: agent_id.clone(),
            })
    }

    /// Fetch the multi-agent WRAP set.
    pub fn wrap_set(&self, pac_id: &PacId) -> Result<MultiAgentWrapSet, StoreError> {
        Ok(self.entry_cloned(pac_id)?.wrap_set)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry_mut(
        &self,
        pac_id: &PacId,
    ) -> Result<dashmap::mapref::one::RefMut<'_, PacId, PacEntry>, StoreError> {
        self.entries
            .get_mut(pac_id)
            .ok_or_else(|| StoreError::NotFound(pac_id.clone()))
    }

    fn entry_cloned(&self, pac_id: &PacId) -> Result<PacEntry, StoreError> {
        self.entries
            .get(pac_id)
            .map(|entry| entry.clone())
            .ok_or_else(|| StoreError::NotFound(pac_id.clone()))
    }
}

impl Default for ControlPlaneStore {
    fn default() -> Self {
        Self::new()
    }
}
