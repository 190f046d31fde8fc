use serde::Serialize;
use tokio::sync::broadcast;

use crate::models::{MediaKinds, Participant, RelayRequest, RelayState, StopReason};

/// Notifications published to the UI layer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    RoomJoined {
        room_id: String,
        participant_id: String,
    },
    JoinFailed {
        room_id: String,
        reason: String,
    },
    RoomChanged {
        previous_room_id: String,
        room_id: String,
    },
    SwitchFailed {
        target_room_id: String,
        reason: String,
    },
    RoomLeft {
        room_id: String,
    },
    Disconnected,
    ParticipantsChanged {
        participants: Vec<Participant>,
    },
    RelayStateChanged {
        request_id: String,
        state: RelayState,
    },
    RelayRequestReceived {
        request_id: String,
        source_room_id: String,
        requester_participant_id: String,
        requester_display_name: String,
        kinds: MediaKinds,
    },
    RelayResponse {
        request_id: String,
        destination_room_id: String,
        state: RelayState,
    },
    RelayStarted {
        request_id: String,
        room_id: String,
        kinds: MediaKinds,
    },
    RelayStopped {
        request_id: String,
        room_id: String,
        reason: StopReason,
    },
    RelayError {
        request_id: String,
        room_id: String,
        diagnostic: serde_json::Value,
    },
}

impl SessionEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            SessionEvent::RoomJoined { .. } => "room_joined",
            SessionEvent::JoinFailed { .. } => "join_failed",
            SessionEvent::RoomChanged { .. } => "room_changed",
            SessionEvent::SwitchFailed { .. } => "switch_failed",
            SessionEvent::RoomLeft { .. } => "room_left",
            SessionEvent::Disconnected => "disconnected",
            SessionEvent::ParticipantsChanged { .. } => "participants_changed",
            SessionEvent::RelayStateChanged { .. } => "relay_state_changed",
            SessionEvent::RelayRequestReceived { .. } => "relay_request_received",
            SessionEvent::RelayResponse { .. } => "relay_response",
            SessionEvent::RelayStarted { .. } => "relay_started",
            SessionEvent::RelayStopped { .. } => "relay_stopped",
            SessionEvent::RelayError { .. } => "relay_error",
        }
    }

    /// The peer room a relay event refers to, from this participant's point of view
    pub(crate) fn relay_room(relay: &RelayRequest) -> String {
        match relay.role {
            crate::models::RelayRole::Requester => relay.destination_room_id.clone(),
            crate::models::RelayRole::Destination => relay.source_room_id.clone(),
        }
    }
}

/// Publishing side of the UI event channel
#[derive(Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, event: SessionEvent) {
        tracing::trace!(event = event.event_type(), "Publishing session event");
        // No subscribers is fine; the UI may not be attached yet.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }
}
