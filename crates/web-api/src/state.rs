use std::sync::Arc;

use application::{ChatRepository, SessionDispatcher};
use config::SessionConfig;

#[derive(Clone)]
pub struct AppState {
    pub repository: Arc<ChatRepository>,
    pub dispatcher: Arc<SessionDispatcher>,
    pub session: SessionConfig,
}

impl AppState {
    pub fn new(dispatcher: Arc<SessionDispatcher>, session: SessionConfig) -> Self {
        Self {
            repository: dispatcher.repository().clone(),
            dispatcher,
            session,
        }
    }
}
