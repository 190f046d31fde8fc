pub mod actor;
pub mod events;
pub mod manager;
pub mod registry;
pub mod relay;
pub mod switch;

pub use actor::{spawn_session, ActorSettings, SessionHandle};
pub use events::{EventPublisher, SessionEvent};
pub use manager::{JoinOutcome, SessionManager};
pub use registry::ParticipantRegistry;
pub use relay::RelayNegotiator;
pub use switch::{SwitchController, SwitchOutcome};
