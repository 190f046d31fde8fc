use std::sync::Arc;

use crate::config::Config;
use crate::session::{EventPublisher, ParticipantRegistry, SessionHandle};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub session: SessionHandle,
    /// Read directly by the API; only the session actor writes it.
    pub participants: Arc<ParticipantRegistry>,
    pub events: EventPublisher,
}

impl AppState {
    pub fn new(
        config: Config,
        session: SessionHandle,
        participants: Arc<ParticipantRegistry>,
        events: EventPublisher,
    ) -> Self {
        Self {
            config: Arc::new(config),
            session,
            participants,
            events,
        }
    }
}
