//! WRAP artifacts and multi-agent aggregation.
//!
//! A WRAP is the execution-artifact bundle an agent submits after doing the
//! work. Validation outcomes are domain data, not errors: a failed WRAP is a
//! retained record in `INVALID`/`SCHEMA_ERROR`/`MISSING_ACK`, never an
//! exception path.

use crate::ids::{AgentId, PacId, WrapId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// WRAP validation states.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationState {
    /// Expected but not yet submitted.
    Pending,
    /// Submitted, validation not yet run.
    Submitted,
    Valid,
    Invalid,
    SchemaError,
    MissingAck,
}

impl ValidationState {
    /// A submitted WRAP that failed validation in any way.
    pub fn is_rejected(&self) -> bool {
        matches!(
            self,
            ValidationState::Invalid | ValidationState::SchemaError | ValidationState::MissingAck
        )
    }
}

/// An agent-submitted execution artifact bundle.
///
/// Invariant: `validation_errors` is empty iff the WRAP is `Valid` or has
/// not been validated yet.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WrapArtifact {
    pub wrap_id: WrapId,
    pub pac_id: PacId,
    pub agent_id: AgentId,
    pub submitted_at: DateTime<Utc>,
    pub validation_state: ValidationState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validated_at: Option<DateTime<Utc>>,
    pub artifact_refs: Vec<String>,
    pub validation_errors: Vec<String>,
    pub schema_version: String,
    /// Opaque integrity hash supplied by the submitting runtime.
    pub wrap_hash: String,
}

/// Multi-agent WRAP collection for a single PAC.
///
/// The expected-agent set is fixed at creation; completeness and validity
/// are derived from the collected map, never stored.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MultiAgentWrapSet {
    pub pac_id: PacId,
    pub expected_agents: BTreeSet<AgentId>,
    pub collected: BTreeMap<AgentId, WrapArtifact>,
    pub aggregation_started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregation_completed_at: Option<DateTime<Utc>>,
    /// Opaque hash over the collected set, supplied by the store.
    pub set_hash: String,
}

impl MultiAgentWrapSet {
    pub fn new(
        pac_id: PacId,
        expected_agents: impl IntoIterator<Item = AgentId>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            pac_id,
            expected_agents: expected_agents.into_iter().collect(),
            collected: BTreeMap::new(),
            aggregation_started_at: now,
            aggregation_completed_at: None,
            set_hash: String::new(),
        }
    }

    /// All expected agents have submitted a WRAP.
    pub fn is_complete(&self) -> bool {
        self.expected_agents
            .iter()
            .all(|agent| self.collected.contains_key(agent))
    }

    /// Expected agents with no collected WRAP yet.
    pub fn missing_agents(&self) -> Vec<AgentId> {
        self.expected_agents
            .iter()
            .filter(|agent| !self.collected.contains_key(*agent))
            .cloned()
            .collect()
    }

    /// Complete and every collected WRAP is `VALID`.
    pub fn all_valid(&self) -> bool {
        self.is_complete()
            && self
                .collected
                .values()
                .all(|wrap| wrap.validation_state == ValidationState::Valid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wrap(agent: &str, state: ValidationState) -> WrapArtifact {
        WrapArtifact {
            wrap_id: WrapId::generate(),
            pac_id: PacId::new("PAC-1"),
            agent_id: AgentId::new(agent),
            submitted_at: Utc::now(),
            validation_state: state,
            validated_at: None,
            artifact_refs: vec!["src/main.rs".into()],
            validation_errors: vec![],
            schema_version: "1.0".into(),
            wrap_hash: "h".into(),
        }
    }

    fn set_of(expected: &[&str]) -> MultiAgentWrapSet {
        MultiAgentWrapSet::new(
            PacId::new("PAC-1"),
            expected.iter().map(|a| AgentId::new(*a)),
            Utc::now(),
        )
    }

    #[test]
    fn empty_set_is_incomplete() {
        let set = set_of(&["GID-01", "GID-02"]);
        assert!(!set.is_complete());
        assert_eq!(set.missing_agents().len(), 2);
        assert!(!set.all_valid());
    }

    #[test]
    fn completeness_requires_every_expected_agent() {
        let mut set = set_of(&["GID-01", "GID-02"]);
        set.collected
            .insert(AgentId::new("GID-01"), wrap("GID-01", ValidationState::Valid));
        assert!(!set.is_complete());
        assert_eq!(set.missing_agents(), vec![AgentId::new("GID-02")]);

        set.collected
            .insert(AgentId::new("GID-02"), wrap("GID-02", ValidationState::Valid));
        assert!(set.is_complete());
        assert!(set.all_valid());
    }

    #[test]
    fn completeness_is_monotonic_under_resubmission() {
        let mut set = set_of(&["GID-01"]);
        set.collected
            .insert(AgentId::new("GID-01"), wrap("GID-01", ValidationState::Valid));
        assert!(set.is_complete());

        // Replacing an already-satisfied agent's WRAP cannot undo completeness.
        set.collected
            .insert(AgentId::new("GID-01"), wrap("GID-01", ValidationState::Invalid));
        assert!(set.is_complete());
        assert!(!set.all_valid());
    }

    #[test]
    fn all_valid_requires_completeness() {
        let mut set = set_of(&["GID-01", "GID-02"]);
        set.collected
            .insert(AgentId::new("GID-01"), wrap("GID-01", ValidationState::Valid));
        // One valid WRAP out of two expected: not all_valid.
        assert!(!set.all_valid());
    }

    #[test]
    fn rejected_states_are_classified() {
        assert!(ValidationState::Invalid.is_rejected());
        assert!(ValidationState::SchemaError.is_rejected());
        assert!(ValidationState::MissingAck.is_rejected());
        assert!(!ValidationState::Valid.is_rejected());
        assert!(!ValidationState::Submitted.is_rejected());
    }
}
