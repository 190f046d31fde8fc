use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{MediaKinds, Participant, RelayDecision, StopReason};

/// Wrapper for all signaling messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalingMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl SignalingMessage {
    pub fn new(msg_type: &str, payload: serde_json::Value) -> Self {
        Self {
            msg_type: msg_type.to_string(),
            request_id: None,
            payload,
        }
    }

    pub fn with_request_id(mut self, request_id: Option<String>) -> Self {
        self.request_id = request_id;
        self
    }

    /// Build a message from a typed payload
    pub fn typed<T: Serialize>(msg_type: &str, payload: &T) -> Result<Self> {
        Ok(Self::new(msg_type, serde_json::to_value(payload)?))
    }

    fn require_request_id(&self) -> Result<String> {
        self.request_id.clone().ok_or_else(|| {
            AppError::InvalidInput(format!("{} message without request_id", self.msg_type))
        })
    }

    fn decode<T: for<'de> Deserialize<'de>>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

// ==================== Client -> Server Messages ====================

/// join_room message payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRoomPayload {
    pub room_id: String,
    pub token: String,
    pub display: String,
}

/// switch_room message payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchRoomPayload {
    pub target_room_id: String,
    pub token: String,
}

/// relay_request message payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayRequestPayload {
    pub destination_room_id: String,
    pub token: String,
    pub kinds: MediaKinds,
}

/// relay_decision message payload (destination side)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayDecisionPayload {
    pub decision: RelayDecision,
}

/// media_state message payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaStatePayload {
    pub mic: bool,
    pub camera: bool,
}

// ==================== Server -> Client Messages ====================

/// joined / switch_confirmed payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSnapshotPayload {
    pub room_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant_id: Option<String>,
    #[serde(default)]
    pub participants: Vec<Participant>,
}

/// join_rejected / switch_rejected payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectedPayload {
    pub reason: String,
}

/// relay_request_received payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayRequestReceivedPayload {
    pub source_room_id: String,
    pub requester_participant_id: String,
    pub requester_display_name: String,
    pub kinds: MediaKinds,
}

/// relay_stopped payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayStoppedPayload {
    pub reason: StopReason,
}

/// relay_error payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayErrorPayload {
    #[serde(default)]
    pub diagnostic: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantJoinedPayload {
    pub participant: Participant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantLeftPayload {
    pub participant_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaStateChangedPayload {
    pub participant_id: String,
    pub mic: bool,
    pub camera: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    #[serde(default)]
    pub code: u16,
    #[serde(default)]
    pub message: String,
}

/// Reasons the server gives for refusing a join or a switch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomRejection {
    InvalidToken,
    RoomUnreachable,
    Other(String),
}

impl RoomRejection {
    pub fn parse(reason: &str) -> Self {
        match reason {
            "invalid_token" => RoomRejection::InvalidToken,
            "room_unreachable" => RoomRejection::RoomUnreachable,
            other => RoomRejection::Other(other.to_string()),
        }
    }
}

impl From<RoomRejection> for AppError {
    fn from(rejection: RoomRejection) -> Self {
        match rejection {
            RoomRejection::InvalidToken => {
                AppError::InvalidToken("Token not valid for room".to_string())
            }
            RoomRejection::RoomUnreachable => {
                AppError::Unreachable("Room unreachable".to_string())
            }
            RoomRejection::Other(reason) => AppError::Rejected(reason),
        }
    }
}

/// Typed view of an inbound signaling message
#[derive(Debug, Clone)]
pub enum InboundEvent {
    Joined(RoomSnapshotPayload),
    JoinRejected(RoomRejection),
    SwitchConfirmed(RoomSnapshotPayload),
    SwitchRejected(RoomRejection),
    RelayRequestReceived {
        request_id: String,
        request: RelayRequestReceivedPayload,
    },
    RelayResponse {
        request_id: String,
        decision: RelayDecision,
    },
    RelayStarted { request_id: String },
    RelayStopped { request_id: String, reason: StopReason },
    RelayError {
        request_id: String,
        diagnostic: serde_json::Value,
    },
    ParticipantJoined(Participant),
    ParticipantLeft { participant_id: String },
    MediaStateChanged(MediaStateChangedPayload),
    LeftRoom,
    Pong,
    Error(ErrorPayload),
}

impl TryFrom<&SignalingMessage> for InboundEvent {
    type Error = AppError;

    fn try_from(msg: &SignalingMessage) -> Result<Self> {
        let event = match msg.msg_type.as_str() {
            msg_types::JOINED => InboundEvent::Joined(msg.decode()?),
            msg_types::JOIN_REJECTED => {
                let p: RejectedPayload = msg.decode()?;
                InboundEvent::JoinRejected(RoomRejection::parse(&p.reason))
            }
            msg_types::SWITCH_CONFIRMED => InboundEvent::SwitchConfirmed(msg.decode()?),
            msg_types::SWITCH_REJECTED => {
                let p: RejectedPayload = msg.decode()?;
                InboundEvent::SwitchRejected(RoomRejection::parse(&p.reason))
            }
            msg_types::RELAY_REQUEST_RECEIVED => InboundEvent::RelayRequestReceived {
                request_id: msg.require_request_id()?,
                request: msg.decode()?,
            },
            msg_types::RELAY_RESPONSE => {
                let p: RelayDecisionPayload = msg.decode()?;
                InboundEvent::RelayResponse {
                    request_id: msg.require_request_id()?,
                    decision: p.decision,
                }
            }
            msg_types::RELAY_STARTED => InboundEvent::RelayStarted {
                request_id: msg.require_request_id()?,
            },
            msg_types::RELAY_STOPPED => {
                let p: RelayStoppedPayload = msg.decode()?;
                InboundEvent::RelayStopped {
                    request_id: msg.require_request_id()?,
                    reason: p.reason,
                }
            }
            msg_types::RELAY_ERROR => {
                let p: RelayErrorPayload = msg.decode()?;
                InboundEvent::RelayError {
                    request_id: msg.require_request_id()?,
                    diagnostic: p.diagnostic,
                }
            }
            msg_types::PARTICIPANT_JOINED => {
                let p: ParticipantJoinedPayload = msg.decode()?;
                InboundEvent::ParticipantJoined(p.participant)
            }
            msg_types::PARTICIPANT_LEFT => {
                let p: ParticipantLeftPayload = msg.decode()?;
                InboundEvent::ParticipantLeft {
                    participant_id: p.participant_id,
                }
            }
            msg_types::MEDIA_STATE_CHANGED => InboundEvent::MediaStateChanged(msg.decode()?),
            msg_types::LEFT_ROOM => InboundEvent::LeftRoom,
            msg_types::PONG => InboundEvent::Pong,
            msg_types::ERROR => InboundEvent::Error(msg.decode()?),
            other => {
                return Err(AppError::InvalidInput(format!(
                    "Unknown message type: {}",
                    other
                )))
            }
        };
        Ok(event)
    }
}

/// Message types enum for matching
pub mod msg_types {
    // Client -> Server
    pub const JOIN_ROOM: &str = "join_room";
    pub const SWITCH_ROOM: &str = "switch_room";
    pub const RELAY_REQUEST: &str = "relay_request";
    pub const RELAY_DECISION: &str = "relay_decision";
    pub const RELAY_STOP: &str = "relay_stop";
    pub const MEDIA_STATE: &str = "media_state";
    pub const LEAVE: &str = "leave";
    pub const PING: &str = "ping";

    // Server -> Client
    pub const JOINED: &str = "joined";
    pub const JOIN_REJECTED: &str = "join_rejected";
    pub const SWITCH_CONFIRMED: &str = "switch_confirmed";
    pub const SWITCH_REJECTED: &str = "switch_rejected";
    pub const RELAY_REQUEST_RECEIVED: &str = "relay_request_received";
    pub const RELAY_RESPONSE: &str = "relay_response";
    pub const RELAY_STARTED: &str = "relay_started";
    pub const RELAY_STOPPED: &str = "relay_stopped";
    pub const RELAY_ERROR: &str = "relay_error";
    pub const PARTICIPANT_JOINED: &str = "participant_joined";
    pub const PARTICIPANT_LEFT: &str = "participant_left";
    pub const MEDIA_STATE_CHANGED: &str = "media_state_changed";
    pub const LEFT_ROOM: &str = "left_room";
    pub const ERROR: &str = "error";
    pub const PONG: &str = "pong";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MediaKind;
    use serde_json::json;

    #[test]
    fn test_envelope_shape() {
        let msg = SignalingMessage::new(msg_types::RELAY_STOP, json!({}))
            .with_request_id(Some("req-1".to_string()));

        let text = serde_json::to_string(&msg).unwrap();
        assert_eq!(text, r#"{"type":"relay_stop","request_id":"req-1","payload":{}}"#);
    }

    #[test]
    fn test_decode_relay_request_received() {
        let text = r#"{
            "type": "relay_request_received",
            "request_id": "req-9",
            "payload": {
                "source_room_id": "room-a",
                "requester_participant_id": "user-1",
                "requester_display_name": "Alice",
                "kinds": ["video"]
            }
        }"#;
        let msg: SignalingMessage = serde_json::from_str(text).unwrap();

        match InboundEvent::try_from(&msg).unwrap() {
            InboundEvent::RelayRequestReceived {
                request_id,
                request,
            } => {
                assert_eq!(request_id, "req-9");
                assert_eq!(request.source_room_id, "room-a");
                assert!(request.kinds.contains(MediaKind::Video));
                assert!(!request.kinds.contains(MediaKind::Audio));
            }
            other => panic!("Wrong event: {:?}", other),
        }
    }

    #[test]
    fn test_relay_message_without_request_id_is_rejected() {
        let msg = SignalingMessage::new(msg_types::RELAY_STARTED, json!({}));
        assert!(InboundEvent::try_from(&msg).is_err());
    }

    #[test]
    fn test_relay_request_with_no_kinds_is_malformed() {
        let msg = SignalingMessage::new(
            msg_types::RELAY_REQUEST_RECEIVED,
            json!({
                "source_room_id": "room-a",
                "requester_participant_id": "user-1",
                "requester_display_name": "Alice",
                "kinds": []
            }),
        )
        .with_request_id(Some("req-1".to_string()));

        assert!(InboundEvent::try_from(&msg).is_err());
    }

    #[test]
    fn test_switch_rejection_reasons() {
        let msg = SignalingMessage::new(
            msg_types::SWITCH_REJECTED,
            json!({ "reason": "invalid_token" }),
        );
        match InboundEvent::try_from(&msg).unwrap() {
            InboundEvent::SwitchRejected(rejection) => {
                assert_eq!(rejection, RoomRejection::InvalidToken);
                assert!(matches!(AppError::from(rejection), AppError::InvalidToken(_)));
            }
            other => panic!("Wrong event: {:?}", other),
        }

        assert_eq!(
            RoomRejection::parse("room_unreachable"),
            RoomRejection::RoomUnreachable
        );
        assert_eq!(
            RoomRejection::parse("room_full"),
            RoomRejection::Other("room_full".to_string())
        );
    }

    #[test]
    fn test_unknown_type() {
        let msg = SignalingMessage::new("subscribe_offer", json!({}));
        assert!(InboundEvent::try_from(&msg).is_err());
    }
}
