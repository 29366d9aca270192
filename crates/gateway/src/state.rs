use std::sync::Arc;

use fm_domain::config::Config;

use crate::runtime::AgentService;

/// Shared application state passed to all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub service: Arc<AgentService>,
}
