//! PAC Service - the read-only control-plane HTTP surface.
//!
//! Every endpoint is a GET over an owned snapshot; verdict endpoints
//! recompute per request and are never cached. Mutations do not exist on
//! this surface: any write method answers 405, fail closed. The write
//! boundary is the store API, reachable only by the owning runtime.

#![deny(unsafe_code)]

pub mod handlers;
pub mod router;
pub mod state;

pub use router::create_router;
pub use state::AppState;
