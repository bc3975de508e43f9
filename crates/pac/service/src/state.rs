//! Shared service state.

use pac_store::ControlPlaneStore;
use std::sync::Arc;

/// Application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ControlPlaneStore>,
}

impl AppState {
    pub fn new(store: Arc<ControlPlaneStore>) -> Self {
        Self { store }
    }
}
