//! PAC Types - the shared domain model of the governance control plane.
//!
//! A PAC is a governed unit of delegated agent work. Everything the control
//! plane tracks about it — lifecycle, acknowledgments, WRAP artifacts, the
//! execution report, and the settlement verdict — is defined here as plain
//! immutable data. Components consume and produce these types; none of them
//! carries behavior beyond derived predicates.

#![deny(unsafe_code)]

pub mod ack;
pub mod ber;
pub mod ids;
pub mod lifecycle;
pub mod settlement;
pub mod snapshot;
pub mod wrap;

pub use ack::{AckState, AgentAck, AckSummary, LatencyStats};
pub use ber::{BerFinality, BerState, ExecutionReport};
pub use ids::{AckId, AgentId, BerId, PacId, VerdictId, WrapId};
pub use lifecycle::{LifecycleState, Pac, StateTransition};
pub use settlement::{
    BlockingReason, ComputationMethod, GateId, GateResult, ReasonCode, ReasonSource,
    SettlementStatus, SettlementVerdict, Severity,
};
pub use snapshot::{ControlPlaneIndexEntry, ControlPlaneSnapshot};
pub use wrap::{MultiAgentWrapSet, ValidationState, WrapArtifact};
