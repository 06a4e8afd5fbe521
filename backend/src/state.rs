use std::sync::Arc;

use crate::{config::Config, services::session::SessionService};

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionService>,
    pub config: Config,
}

impl AppState {
    pub fn new(sessions: SessionService, config: Config) -> Self {
        Self {
            sessions: Arc::new(sessions),
            config,
        }
    }
}
