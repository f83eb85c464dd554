//! Application state management

use musetalk_core::LipSyncService;
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<LipSyncService>,
}

impl AppState {
    pub fn new(service: LipSyncService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}
