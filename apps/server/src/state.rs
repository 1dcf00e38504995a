use std::sync::Arc;

use pulseboard_service::{CycleState, EventBus, TargetStore};

use crate::auth::Credentials;

/// Shared handler state
pub struct AppState {
    pub store: Arc<dyn TargetStore>,
    pub bus: Arc<EventBus>,
    pub cycle: Arc<CycleState>,
    pub credentials: Option<Credentials>,
}
