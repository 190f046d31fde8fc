use serde::{Deserialize, Serialize};

use crate::models::MediaKind;

/// POST /session/join body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinSessionRequest {
    pub room_id: String,
    pub token: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// POST /session/switch body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchRoomRequest {
    pub room_id: String,
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetMediaRequest {
    #[serde(default)]
    pub mic: bool,
    #[serde(default)]
    pub camera: bool,
}

/// POST /relays body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRelayRequest {
    pub destination_room_id: String,
    pub token: String,
    #[serde(default = "default_kinds")]
    pub kinds: Vec<MediaKind>,
}

fn default_kinds() -> Vec<MediaKind> {
    vec![MediaKind::Video, MediaKind::Audio]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpireRelayResponse {
    pub request_id: String,
    pub expired: bool,
}
