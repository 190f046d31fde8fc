use serde::Serialize;
use tokio::sync::oneshot;

use crate::error::{AppError, Result};
use crate::models::Session;
use crate::session::events::{EventPublisher, SessionEvent};
use crate::session::registry::{mark_local, ParticipantRegistry};
use crate::session::relay::RelayNegotiator;
use crate::signaling::{
    msg_types, RoomRejection, RoomSnapshotPayload, SignalingMessage, SignalingTransport,
    SwitchRoomPayload,
};

/// Result of a confirmed switch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SwitchOutcome {
    pub previous_room_id: String,
    pub room_id: String,
    pub participant_count: usize,
    /// Requested relays dropped because their source room is gone
    pub invalidated_relays: usize,
}

struct PendingSwitch {
    target_room_id: String,
    token: String,
    reply: oneshot::Sender<Result<SwitchOutcome>>,
}

/// Moves the session to another room over the existing signaling connection.
///
/// At most one switch is in flight. The session keeps its current room until
/// the server confirms, so a rejected or abandoned switch leaves it untouched.
#[derive(Default)]
pub struct SwitchController {
    pending: Option<PendingSwitch>,
}

impl SwitchController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn target(&self) -> Option<&str> {
        self.pending.as_ref().map(|p| p.target_room_id.as_str())
    }

    /// Send the switch request. The returned receiver resolves once the new
    /// room's participant snapshot has arrived, or with the failure reason.
    pub fn switch_to(
        &mut self,
        session: &Session,
        target_room_id: &str,
        token: &str,
        transport: &dyn SignalingTransport,
    ) -> Result<oneshot::Receiver<Result<SwitchOutcome>>> {
        let target_room_id = target_room_id.trim();
        if target_room_id.is_empty() {
            return Err(AppError::InvalidInput("Target room ID is required".to_string()));
        }
        if token.is_empty() {
            return Err(AppError::InvalidInput("Token is required".to_string()));
        }
        if let Some(pending) = &self.pending {
            return Err(AppError::AlreadyInProgress(format!(
                "Already switching to room {}",
                pending.target_room_id
            )));
        }
        if !session.is_joined() {
            return Err(AppError::InvalidState(
                "Must be joined to a room to switch".to_string(),
            ));
        }
        if target_room_id == session.room_id {
            return Err(AppError::InvalidInput(format!(
                "Already in room {}",
                target_room_id
            )));
        }

        transport.send(SignalingMessage::typed(
            msg_types::SWITCH_ROOM,
            &SwitchRoomPayload {
                target_room_id: target_room_id.to_string(),
                token: token.to_string(),
            },
        )?)?;

        tracing::info!(
            from = %session.room_id,
            to = %target_room_id,
            "Switch requested"
        );

        let (reply, rx) = oneshot::channel();
        self.pending = Some(PendingSwitch {
            target_room_id: target_room_id.to_string(),
            token: token.to_string(),
            reply,
        });
        Ok(rx)
    }

    /// Apply a server confirmation: replace the room in place, reload the
    /// participant view and drop relays anchored at the old room.
    pub fn on_confirmed(
        &mut self,
        snapshot: RoomSnapshotPayload,
        session: &mut Session,
        registry: &ParticipantRegistry,
        relays: &mut RelayNegotiator,
        events: &EventPublisher,
    ) -> Result<SwitchOutcome> {
        let Some(pending) = self.pending.take_if(|p| p.target_room_id == snapshot.room_id) else {
            let detail = match &self.pending {
                Some(p) => format!(
                    "Switch confirmed for room {} while switching to {}",
                    snapshot.room_id, p.target_room_id
                ),
                None => format!("Unexpected switch confirmation for room {}", snapshot.room_id),
            };
            return Err(AppError::Stale(detail));
        };

        let previous_room_id = session.replace_room(pending.target_room_id, pending.token);
        registry.replace_all(mark_local(
            snapshot.participants,
            &session.local_participant_id,
        ));
        let invalidated_relays = relays.invalidate_source(&previous_room_id, events);

        let outcome = SwitchOutcome {
            previous_room_id: previous_room_id.clone(),
            room_id: session.room_id.clone(),
            participant_count: registry.len(),
            invalidated_relays,
        };

        tracing::info!(
            from = %previous_room_id,
            to = %session.room_id,
            participants = outcome.participant_count,
            invalidated_relays,
            "Switched room"
        );

        events.publish(SessionEvent::RoomChanged {
            previous_room_id,
            room_id: session.room_id.clone(),
        });
        events.publish(SessionEvent::ParticipantsChanged {
            participants: registry.all(),
        });

        let _ = pending.reply.send(Ok(outcome.clone()));
        Ok(outcome)
    }

    pub fn on_rejected(&mut self, rejection: RoomRejection, events: &EventPublisher) -> Result<()> {
        let pending = self
            .pending
            .take()
            .ok_or_else(|| AppError::Stale("Switch rejection with no switch in flight".to_string()))?;

        let error = AppError::from(rejection);

        tracing::warn!(target_room_id = %pending.target_room_id, error = %error, "Switch rejected");

        events.publish(SessionEvent::SwitchFailed {
            target_room_id: pending.target_room_id,
            reason: error.code().to_string(),
        });
        let _ = pending.reply.send(Err(error));
        Ok(())
    }

    /// Give up on the in-flight switch without touching the session.
    pub fn abandon(&mut self, error: AppError, events: &EventPublisher) -> bool {
        let Some(pending) = self.pending.take() else {
            return false;
        };

        tracing::warn!(target_room_id = %pending.target_room_id, error = %error, "Switch abandoned");

        events.publish(SessionEvent::SwitchFailed {
            target_room_id: pending.target_room_id,
            reason: error.code().to_string(),
        });
        let _ = pending.reply.send(Err(error));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LifecycleState, MediaKind, Participant, RelayState};
    use crate::signaling::ChannelTransport;

    fn joined_session(room_id: &str) -> Session {
        let mut session = Session::new("Alice");
        session.room_id = room_id.to_string();
        session.auth_token = "token-a".to_string();
        session.local_participant_id = "user-1".to_string();
        session.lifecycle_state = LifecycleState::Joined;
        session
    }

    fn snapshot(room_id: &str, ids: &[&str]) -> RoomSnapshotPayload {
        RoomSnapshotPayload {
            room_id: room_id.to_string(),
            participant_id: None,
            participants: ids.iter().map(|id| Participant::new(*id, *id)).collect(),
        }
    }

    #[test]
    fn test_switch_round_trip() {
        let (transport, mut wire) = ChannelTransport::pair();
        let events = EventPublisher::new(16);
        let registry = ParticipantRegistry::new();
        registry.upsert(Participant::new("old-peer", "Old"));
        let mut relays = RelayNegotiator::new();
        let mut session = joined_session("room-a");
        let mut controller = SwitchController::new();

        let mut rx = controller
            .switch_to(&session, "room-b", "token-b", &transport)
            .unwrap();
        let sent = wire.try_recv().unwrap();
        assert_eq!(sent.msg_type, msg_types::SWITCH_ROOM);
        assert_eq!(sent.payload["target_room_id"], "room-b");

        controller
            .on_confirmed(
                snapshot("room-b", &["user-1", "peer-b"]),
                &mut session,
                &registry,
                &mut relays,
                &events,
            )
            .unwrap();

        assert_eq!(session.room_id, "room-b");
        assert_eq!(session.auth_token, "token-b");
        assert_eq!(registry.len(), 2);
        assert!(registry.get("old-peer").is_none());
        assert!(registry.get("user-1").unwrap().is_local);
        assert!(controller.target().is_none());

        let outcome = rx.try_recv().unwrap().unwrap();
        assert_eq!(outcome.previous_room_id, "room-a");
        assert_eq!(outcome.participant_count, 2);
    }

    #[test]
    fn test_second_switch_fails_fast() {
        let (transport, mut wire) = ChannelTransport::pair();
        let session = joined_session("room-a");
        let mut controller = SwitchController::new();

        let _first = controller.switch_to(&session, "room-b", "t", &transport).unwrap();
        let second = controller.switch_to(&session, "room-c", "t", &transport);

        assert!(matches!(second, Err(AppError::AlreadyInProgress(_))));
        assert_eq!(controller.target(), Some("room-b"));
        assert!(wire.try_recv().is_ok());
        assert!(wire.try_recv().is_err());
    }

    #[test]
    fn test_rejection_leaves_session_unchanged() {
        let (transport, _wire) = ChannelTransport::pair();
        let events = EventPublisher::new(16);
        let session = joined_session("room-a");
        let mut controller = SwitchController::new();

        let mut rx = controller.switch_to(&session, "room-b", "bad", &transport).unwrap();
        controller
            .on_rejected(RoomRejection::InvalidToken, &events)
            .unwrap();

        assert_eq!(session.room_id, "room-a");
        assert!(matches!(rx.try_recv().unwrap(), Err(AppError::InvalidToken(_))));
        assert!(controller.target().is_none());
    }

    #[test]
    fn test_unexpected_confirmation_is_stale() {
        let events = EventPublisher::new(16);
        let registry = ParticipantRegistry::new();
        let mut relays = RelayNegotiator::new();
        let mut session = joined_session("room-a");
        let mut controller = SwitchController::new();

        let result = controller.on_confirmed(
            snapshot("room-b", &["x"]),
            &mut session,
            &registry,
            &mut relays,
            &events,
        );

        assert!(matches!(result, Err(AppError::Stale(_))));
        assert_eq!(session.room_id, "room-a");
        assert!(registry.is_empty());
    }

    #[test]
    fn test_confirmation_for_other_room_keeps_switch_pending() {
        let (transport, _wire) = ChannelTransport::pair();
        let events = EventPublisher::new(16);
        let registry = ParticipantRegistry::new();
        let mut relays = RelayNegotiator::new();
        let mut session = joined_session("room-a");
        let mut controller = SwitchController::new();
        let _rx = controller.switch_to(&session, "room-b", "t", &transport).unwrap();

        let result = controller.on_confirmed(
            snapshot("room-z", &[]),
            &mut session,
            &registry,
            &mut relays,
            &events,
        );

        assert!(matches!(result, Err(AppError::Stale(_))));
        assert_eq!(controller.target(), Some("room-b"));
    }

    #[test]
    fn test_switch_invalidates_relays_from_old_room() {
        let (transport, _wire) = ChannelTransport::pair();
        let events = EventPublisher::new(16);
        let registry = ParticipantRegistry::new();
        let mut relays = RelayNegotiator::new();
        let mut session = joined_session("room-a");
        let mut controller = SwitchController::new();

        let relay = relays
            .request(&session, "room-c", "t", vec![MediaKind::Video], &transport, &events)
            .unwrap();
        let _rx = controller.switch_to(&session, "room-b", "t", &transport).unwrap();

        let outcome = controller
            .on_confirmed(snapshot("room-b", &[]), &mut session, &registry, &mut relays, &events)
            .unwrap();

        assert_eq!(outcome.invalidated_relays, 1);
        assert!(relays.get(&relay.request_id).is_none());
        assert_eq!(relays.live_count(), 0);
        // A fresh request from the new room is allowed
        let renewed = relays
            .request(&session, "room-c", "t", vec![MediaKind::Video], &transport, &events)
            .unwrap();
        assert_eq!(renewed.source_room_id, "room-b");
        assert_eq!(renewed.state, RelayState::Pending);
    }

    #[test]
    fn test_switch_requires_joined_session() {
        let (transport, _wire) = ChannelTransport::pair();
        let mut controller = SwitchController::new();
        let session = Session::new("Alice");

        assert!(matches!(
            controller.switch_to(&session, "room-b", "t", &transport),
            Err(AppError::InvalidState(_))
        ));
        assert!(matches!(
            controller.switch_to(&joined_session("room-a"), "  ", "t", &transport),
            Err(AppError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_abandon() {
        let (transport, _wire) = ChannelTransport::pair();
        let events = EventPublisher::new(16);
        let session = joined_session("room-a");
        let mut controller = SwitchController::new();
        let mut rx = controller.switch_to(&session, "room-b", "t", &transport).unwrap();

        assert!(controller.abandon(AppError::Unreachable("timed out".to_string()), &events));
        assert!(!controller.abandon(AppError::Unreachable("again".to_string()), &events));
        assert!(matches!(rx.try_recv().unwrap(), Err(AppError::Unreachable(_))));
    }
}
