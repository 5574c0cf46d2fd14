//! Application state for the API server

use crate::TransferManager;

/// Shared application state accessible to all route handlers
///
/// Cloned per request; the manager is a bundle of `Arc`s.
#[derive(Clone)]
pub struct AppState {
    /// Transfer manager backing every handler
    pub manager: TransferManager,
}

impl AppState {
    /// Create a new AppState
    pub fn new(manager: TransferManager) -> Self {
        Self { manager }
    }
}
