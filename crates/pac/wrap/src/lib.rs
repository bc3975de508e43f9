//! PAC WRAP Registry.
//!
//! Agents submit WRAP artifact bundles after execution; validation runs a
//! fixed-order check pipeline and records the outcome as domain data. The
//! ordering is a deterministic tie-break: structural problems win over
//! authorization problems, which win over content problems, so the same
//! defective WRAP always reports the same state.

#![deny(unsafe_code)]

use chrono::{DateTime, Utc};
use pac_types::{
    AckState, AgentAck, AgentId, MultiAgentWrapSet, PacId, ValidationState, WrapArtifact, WrapId,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// Schema version accepted by the validator.
pub const SUPPORTED_SCHEMA_VERSION: &str = "1.0";

/// Registry errors. Validation failures are not errors; only writes that
/// cannot be accepted at all surface here.
#[derive(Debug, Error)]
pub enum WrapError {
    #[error("unexpected WRAP from agent {agent} for PAC {pac_id}; not in the expected set")]
    UnexpectedAgent { pac_id: PacId, agent: AgentId },
}

/// Content rules applied in the third validation tier.
///
/// Each required block must appear among the WRAP's artifact references.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ContentRules {
    pub required_blocks: Vec<String>,
}

impl ContentRules {
    pub fn requiring(blocks: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            required_blocks: blocks.into_iter().map(Into::into).collect(),
        }
    }
}

/// Create a SUBMITTED WRAP artifact for an agent.
pub fn submit(
    pac_id: PacId,
    agent_id: AgentId,
    artifact_refs: Vec<String>,
    now: DateTime<Utc>,
) -> WrapArtifact {
    let wrap = WrapArtifact {
        wrap_id: WrapId::generate(),
        pac_id,
        agent_id,
        submitted_at: now,
        validation_state: ValidationState::Submitted,
        validated_at: None,
        artifact_refs,
        validation_errors: Vec::new(),
        schema_version: SUPPORTED_SCHEMA_VERSION.to_string(),
        wrap_hash: String::new(),
    };
    debug!(wrap_id = %wrap.wrap_id, agent = %wrap.agent_id, "wrap submitted");
    wrap
}

/// Validate a submitted WRAP against the acknowledgment set and content
/// rules.
///
/// Checks run in fixed precedence and stop at the first failing tier:
///
/// 1. schema conformance → `SCHEMA_ERROR`
/// 2. the submitting agent's ACK must be ACKNOWLEDGED → `MISSING_ACK`
/// 3. content rules → `INVALID` with the accumulated error list
///
/// A WRAP with both a schema error and a missing ACK reports
/// `SCHEMA_ERROR`. Outcomes are recorded on the artifact and returned;
/// nothing here is an `Err`.
pub fn validate(
    wrap: &mut WrapArtifact,
    acks: &[AgentAck],
    rules: &ContentRules,
    now: DateTime<Utc>,
) -> ValidationState {
    let mut errors = schema_errors(wrap);
    let state = if !errors.is_empty() {
        ValidationState::SchemaError
    } else if !has_acknowledged_ack(wrap, acks) {
        errors.push(format!(
            "no acknowledged ACK for agent {}; WRAP not authorized",
            wrap.agent_id
        ));
        ValidationState::MissingAck
    } else {
        errors = content_errors(wrap, rules);
        if errors.is_empty() {
            ValidationState::Valid
        } else {
            ValidationState::Invalid
        }
    };

    wrap.validation_state = state;
    wrap.validation_errors = errors;
    wrap.validated_at = Some(now);
    info!(wrap_id = %wrap.wrap_id, agent = %wrap.agent_id, state = ?state, "wrap validated");
    state
}

fn schema_errors(wrap: &WrapArtifact) -> Vec<String> {
    let mut errors = Vec::new();
    if wrap.schema_version != SUPPORTED_SCHEMA_VERSION {
        errors.push(format!(
            "unsupported schema version: {} (expected {SUPPORTED_SCHEMA_VERSION})",
            wrap.schema_version
        ));
    }
    if wrap.artifact_refs.is_empty() {
        errors.push("artifact_refs must not be empty".to_string());
    }
    for (index, artifact_ref) in wrap.artifact_refs.iter().enumerate() {
        if artifact_ref.trim().is_empty() {
            errors.push(format!("artifact_refs[{index}] is blank"));
        }
    }
    errors
}

fn has_acknowledged_ack(wrap: &WrapArtifact, acks: &[AgentAck]) -> bool {
    acks.iter().any(|ack| {
        ack.pac_id == wrap.pac_id
            && ack.agent_id == wrap.agent_id
            && ack.state == AckState::Acknowledged
    })
}

fn content_errors(wrap: &WrapArtifact, rules: &ContentRules) -> Vec<String> {
    rules
        .required_blocks
        .iter()
        .filter(|block| !wrap.artifact_refs.iter().any(|r| r == *block))
        .map(|block| format!("missing required block: {block}"))
        .collect()
}

/// Add a collected WRAP to a multi-agent set.
///
/// Rejects WRAPs from agents outside the expected set and stamps
/// `aggregation_completed_at` the moment the set becomes complete.
pub fn add_wrap(
    set: &mut MultiAgentWrapSet,
    wrap: WrapArtifact,
    now: DateTime<Utc>,
) -> Result<(), WrapError> {
    if !set.expected_agents.contains(&wrap.agent_id) {
        return Err(WrapError::UnexpectedAgent {
            pac_id: set.pac_id.clone(),
            agent: wrap.agent_id,
        });
    }
    set.collected.insert(wrap.agent_id.clone(), wrap);
    if set.is_complete() && set.aggregation_completed_at.is_none() {
        set.aggregation_completed_at = Some(now);
        info!(pac_id = %set.pac_id, "wrap set complete");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pac_ack::{record_ack, request_ack, AckOutcome};

    fn acknowledged_ack(pac: &str, agent: &str) -> AgentAck {
        let now = Utc::now();
        let mut ack = request_ack(
            PacId::new(pac),
            AgentId::new(agent),
            agent,
            "ORDER-1",
            Duration::seconds(300),
            now,
        );
        record_ack(&mut ack, AckOutcome::Acknowledged { latency_ms: 100 }, now).unwrap();
        ack
    }

    fn submitted_wrap(agent: &str, refs: &[&str]) -> WrapArtifact {
        submit(
            PacId::new("PAC-1"),
            AgentId::new(agent),
            refs.iter().map(|r| r.to_string()).collect(),
            Utc::now(),
        )
    }

    #[test]
    fn valid_wrap_passes_all_tiers() {
        let acks = vec![acknowledged_ack("PAC-1", "GID-01")];
        let mut wrap = submitted_wrap("GID-01", &["outcome", "src/lib.rs"]);
        let state = validate(
            &mut wrap,
            &acks,
            &ContentRules::requiring(["outcome"]),
            Utc::now(),
        );
        assert_eq!(state, ValidationState::Valid);
        assert!(wrap.validation_errors.is_empty());
        assert!(wrap.validated_at.is_some());
    }

    #[test]
    fn schema_error_wins_over_missing_ack() {
        // No ACK at all and an empty ref list: structural issue must win.
        let mut wrap = submitted_wrap("GID-01", &[]);
        let state = validate(&mut wrap, &[], &ContentRules::default(), Utc::now());
        assert_eq!(state, ValidationState::SchemaError);
        assert!(!wrap.validation_errors.is_empty());
    }

    #[test]
    fn missing_ack_blocks_unauthorized_wrap() {
        let mut wrap = submitted_wrap("GID-01", &["outcome"]);
        let state = validate(&mut wrap, &[], &ContentRules::default(), Utc::now());
        assert_eq!(state, ValidationState::MissingAck);
        assert_eq!(wrap.validation_errors.len(), 1);
    }

    #[test]
    fn pending_ack_does_not_authorize() {
        let pending = request_ack(
            PacId::new("PAC-1"),
            AgentId::new("GID-01"),
            "cody",
            "ORDER-1",
            Duration::seconds(300),
            Utc::now(),
        );
        let mut wrap = submitted_wrap("GID-01", &["outcome"]);
        let state = validate(&mut wrap, &[pending], &ContentRules::default(), Utc::now());
        assert_eq!(state, ValidationState::MissingAck);
    }

    #[test]
    fn content_violations_accumulate() {
        let acks = vec![acknowledged_ack("PAC-1", "GID-01")];
        let mut wrap = submitted_wrap("GID-01", &["src/lib.rs"]);
        let state = validate(
            &mut wrap,
            &acks,
            &ContentRules::requiring(["outcome", "summary"]),
            Utc::now(),
        );
        assert_eq!(state, ValidationState::Invalid);
        assert_eq!(
            wrap.validation_errors,
            vec![
                "missing required block: outcome".to_string(),
                "missing required block: summary".to_string(),
            ]
        );
    }

    #[test]
    fn validation_is_deterministic_for_the_same_input() {
        let acks = vec![acknowledged_ack("PAC-1", "GID-01")];
        let rules = ContentRules::requiring(["outcome"]);
        let now = Utc::now();

        let mut first = submitted_wrap("GID-01", &["src/lib.rs"]);
        let mut second = first.clone();
        validate(&mut first, &acks, &rules, now);
        validate(&mut second, &acks, &rules, now);
        assert_eq!(first.validation_state, second.validation_state);
        assert_eq!(first.validation_errors, second.validation_errors);
    }

    #[test]
    fn unexpected_agent_is_rejected_from_the_set() {
        let mut set = MultiAgentWrapSet::new(
            PacId::new("PAC-1"),
            [AgentId::new("GID-01")],
            Utc::now(),
        );
        let wrap = submitted_wrap("GID-99", &["outcome"]);
        let result = add_wrap(&mut set, wrap, Utc::now());
        assert!(matches!(result, Err(WrapError::UnexpectedAgent { .. })));
        assert!(set.collected.is_empty());
    }

    #[test]
    fn completion_is_stamped_once() {
        let mut set = MultiAgentWrapSet::new(
            PacId::new("PAC-1"),
            [AgentId::new("GID-01"), AgentId::new("GID-02")],
            Utc::now(),
        );
        add_wrap(&mut set, submitted_wrap("GID-01", &["a"]), Utc::now()).unwrap();
        assert!(set.aggregation_completed_at.is_none());

        let completion = Utc::now();
        add_wrap(&mut set, submitted_wrap("GID-02", &["b"]), completion).unwrap();
        assert_eq!(set.aggregation_completed_at, Some(completion));

        // A resubmission after completion does not move the stamp.
        add_wrap(&mut set, submitted_wrap("GID-01", &["a2"]), Utc::now()).unwrap();
        assert_eq!(set.aggregation_completed_at, Some(completion));
    }
}
