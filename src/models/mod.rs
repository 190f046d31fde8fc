pub mod participant;
pub mod relay;
pub mod requests;
pub mod session;

pub use participant::Participant;
pub use relay::{
    MediaKind, MediaKinds, RelayDecision, RelayRequest, RelayRole, RelayState, StopReason,
};
pub use requests::{
    CreateRelayRequest, ExpireRelayResponse, JoinSessionRequest, SetMediaRequest,
    SwitchRoomRequest,
};
pub use session::{LifecycleState, MediaEnabled, Session, SessionSnapshot};
