use serde::{Deserialize, Serialize};

/// Where the local participant stands with respect to its home room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Disconnected,
    Joining,
    Joined,
    Leaving,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaEnabled {
    pub mic: bool,
    pub camera: bool,
}

/// The local participant's membership in exactly one home room.
///
/// `room_id` and `auth_token` always describe the last *confirmed* room; a
/// switch replaces them together only once the server has confirmed it.
#[derive(Debug, Clone)]
pub struct Session {
    pub room_id: String,
    pub auth_token: String,
    pub local_participant_id: String,
    pub display_name: String,
    pub media_enabled: MediaEnabled,
    pub lifecycle_state: LifecycleState,
}

impl Session {
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            room_id: String::new(),
            auth_token: String::new(),
            local_participant_id: String::new(),
            display_name: display_name.into(),
            media_enabled: MediaEnabled::default(),
            lifecycle_state: LifecycleState::Disconnected,
        }
    }

    pub fn is_joined(&self) -> bool {
        self.lifecycle_state == LifecycleState::Joined
    }

    /// Swap the home room in place, keeping the connection and the local identity.
    pub fn replace_room(&mut self, room_id: String, auth_token: String) -> String {
        self.auth_token = auth_token;
        std::mem::replace(&mut self.room_id, room_id)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            room_id: (!self.room_id.is_empty()).then(|| self.room_id.clone()),
            local_participant_id: (!self.local_participant_id.is_empty())
                .then(|| self.local_participant_id.clone()),
            display_name: self.display_name.clone(),
            media_enabled: self.media_enabled,
            lifecycle_state: self.lifecycle_state,
        }
    }
}

/// Read-only view of the session handed to the UI layer. Never carries the token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub room_id: Option<String>,
    pub local_participant_id: Option<String>,
    pub display_name: String,
    pub media_enabled: MediaEnabled,
    pub lifecycle_state: LifecycleState,
}
