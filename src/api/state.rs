//! Application state for the front door

use crate::relay::RelayHandle;

/// Shared application state accessible to all route handlers
///
/// This struct is cloned for each request and gives read access to what the
/// poll loop publishes.
#[derive(Clone)]
pub struct AppState {
    /// Read side of the relay
    pub relay: RelayHandle,
}

impl AppState {
    /// Create a new AppState
    pub fn new(relay: RelayHandle) -> Self {
        Self { relay }
    }
}
