use std::sync::Arc;

use ghpm_core::Synchronizer;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub sync: Arc<Synchronizer>,
}

impl AppState {
    pub fn new(sync: Synchronizer) -> Self {
        Self {
            sync: Arc::new(sync),
        }
    }
}
