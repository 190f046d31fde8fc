use std::sync::Arc;

use serde::Serialize;
use tokio::sync::oneshot;

use crate::error::{AppError, Result};
use crate::models::{
    LifecycleState, MediaEnabled, MediaKind, Participant, RelayRequest, Session,
    SessionSnapshot,
};
use crate::session::events::{EventPublisher, SessionEvent};
use crate::session::registry::{mark_local, ParticipantRegistry};
use crate::session::relay::RelayNegotiator;
use crate::session::switch::{SwitchController, SwitchOutcome};
use crate::signaling::{
    msg_types, InboundEvent, JoinRoomPayload, MediaStatePayload, RoomRejection,
    RoomSnapshotPayload, SignalingMessage, SignalingTransport,
};

/// Result of a confirmed join
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoinOutcome {
    pub room_id: String,
    pub participant_id: String,
    pub participant_count: usize,
}

struct PendingJoin {
    room_id: String,
    token: String,
    reply: oneshot::Sender<Result<JoinOutcome>>,
}

/// Owns the session, the participant registry and every in-flight
/// negotiation, and is the only writer to the signaling transport.
///
/// Not thread-safe on its own: the session actor serializes every call.
pub struct SessionManager {
    session: Session,
    registry: Arc<ParticipantRegistry>,
    relays: RelayNegotiator,
    switch: SwitchController,
    pending_join: Option<PendingJoin>,
    transport: Arc<dyn SignalingTransport>,
    events: EventPublisher,
}

impl SessionManager {
    pub fn new(
        display_name: impl Into<String>,
        transport: Arc<dyn SignalingTransport>,
        registry: Arc<ParticipantRegistry>,
        events: EventPublisher,
    ) -> Self {
        Self {
            session: Session::new(display_name),
            registry,
            relays: RelayNegotiator::new(),
            switch: SwitchController::new(),
            pending_join: None,
            transport,
            events,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.session.snapshot()
    }

    pub fn participants(&self) -> Vec<Participant> {
        self.registry.all()
    }

    pub fn relays(&self) -> Vec<RelayRequest> {
        self.relays.all()
    }

    pub fn relay(&self, request_id: &str) -> Option<RelayRequest> {
        self.relays.get(request_id).cloned()
    }

    // ==================== Room membership ====================

    pub fn join(
        &mut self,
        room_id: &str,
        token: &str,
        display_name: Option<&str>,
    ) -> Result<oneshot::Receiver<Result<JoinOutcome>>> {
        let room_id = room_id.trim();
        if room_id.is_empty() {
            return Err(AppError::InvalidInput("Room ID is required".to_string()));
        }
        if token.is_empty() {
            return Err(AppError::InvalidInput("Token is required".to_string()));
        }
        match self.session.lifecycle_state {
            LifecycleState::Disconnected => {}
            LifecycleState::Joining => {
                return Err(AppError::AlreadyInProgress("Join already in progress".to_string()))
            }
            state => {
                return Err(AppError::InvalidState(format!(
                    "Cannot join while {:?}",
                    state
                )))
            }
        }

        if let Some(display) = display_name.map(str::trim).filter(|d| !d.is_empty()) {
            self.session.display_name = display.to_string();
        }

        self.send(SignalingMessage::typed(
            msg_types::JOIN_ROOM,
            &JoinRoomPayload {
                room_id: room_id.to_string(),
                token: token.to_string(),
                display: self.session.display_name.clone(),
            },
        )?)?;

        self.session.lifecycle_state = LifecycleState::Joining;

        tracing::info!(room_id = %room_id, display = %self.session.display_name, "Joining room");

        let (reply, rx) = oneshot::channel();
        self.pending_join = Some(PendingJoin {
            room_id: room_id.to_string(),
            token: token.to_string(),
            reply,
        });
        Ok(rx)
    }

    /// Leave the home room. Undecided inbound requests are discarded and every
    /// other relay touching the room is stopped.
    pub fn leave(&mut self) -> Result<()> {
        if self.session.lifecycle_state != LifecycleState::Joined {
            return Err(AppError::InvalidState("Not joined to a room".to_string()));
        }
        if let Some(target) = self.switch.target() {
            return Err(AppError::AlreadyInProgress(format!(
                "Switch to room {} in progress",
                target
            )));
        }

        let room_id = self.session.room_id.clone();
        let sent = self.send(SignalingMessage::new(msg_types::LEAVE, serde_json::json!({})));

        let stopped = self.relays.leave_room(&room_id, &self.events);
        self.registry.clear();
        self.events.publish(SessionEvent::ParticipantsChanged {
            participants: Vec::new(),
        });

        tracing::info!(room_id = %room_id, stopped_relays = stopped, "Leaving room");

        match sent {
            Ok(()) => self.session.lifecycle_state = LifecycleState::Leaving,
            // Nobody will confirm; we are out of the room either way.
            Err(e) => {
                tracing::warn!(error = %e, "Leave not delivered");
                self.finish_leave();
            }
        }
        Ok(())
    }

    pub fn set_media(&mut self, mic: bool, camera: bool) -> Result<MediaEnabled> {
        if !self.session.is_joined() {
            return Err(AppError::InvalidState("Not joined to a room".to_string()));
        }

        self.send(SignalingMessage::typed(
            msg_types::MEDIA_STATE,
            &MediaStatePayload { mic, camera },
        )?)?;

        self.session.media_enabled = MediaEnabled { mic, camera };
        if self
            .registry
            .set_media(&self.session.local_participant_id, mic, camera)
        {
            self.publish_participants();
        }
        Ok(self.session.media_enabled)
    }

    /// Keepalive. Skipped unless joined.
    pub fn ping(&self) -> Result<()> {
        if !self.session.is_joined() {
            return Ok(());
        }
        self.send(SignalingMessage::new(msg_types::PING, serde_json::json!({})))
    }

    // ==================== Switching ====================

    pub fn switch_to(
        &mut self,
        target_room_id: &str,
        token: &str,
    ) -> Result<oneshot::Receiver<Result<SwitchOutcome>>> {
        self.switch
            .switch_to(&self.session, target_room_id, token, self.transport.as_ref())
    }

    /// Drop the in-flight switch, e.g. when the caller's deadline passes.
    pub fn abandon_switch(&mut self, error: AppError) -> bool {
        self.switch.abandon(error, &self.events)
    }

    // ==================== Relays ====================

    pub fn request_relay(
        &mut self,
        destination_room_id: &str,
        token: &str,
        kinds: Vec<MediaKind>,
    ) -> Result<RelayRequest> {
        self.relays.request(
            &self.session,
            destination_room_id,
            token,
            kinds,
            self.transport.as_ref(),
            &self.events,
        )
    }

    pub fn stop_relay(&mut self, request_id: &str) -> Result<RelayRequest> {
        self.relays
            .stop(request_id, self.transport.as_ref(), &self.events)
    }

    pub fn accept_relay(&mut self, request_id: &str) -> Result<RelayRequest> {
        self.relays
            .accept(request_id, self.transport.as_ref(), &self.events)
    }

    pub fn reject_relay(&mut self, request_id: &str) -> Result<RelayRequest> {
        self.relays
            .reject(request_id, self.transport.as_ref(), &self.events)
    }

    pub fn expire_relay(&mut self, request_id: &str) -> bool {
        self.relays.expire(request_id, &self.events)
    }

    // ==================== Inbound ====================

    /// Route one inbound message. Stale or malformed messages are logged and
    /// dropped without touching any state; the error is returned for callers
    /// that care.
    pub fn handle_inbound(&mut self, msg: SignalingMessage) -> Result<()> {
        tracing::debug!(
            msg_type = %msg.msg_type,
            request_id = ?msg.request_id,
            "Received signaling message"
        );

        let result = InboundEvent::try_from(&msg).and_then(|event| self.dispatch(event));
        if let Err(e) = &result {
            tracing::warn!(
                msg_type = %msg.msg_type,
                request_id = ?msg.request_id,
                error = %e,
                "Dropped signaling message"
            );
        }
        result
    }

    fn dispatch(&mut self, event: InboundEvent) -> Result<()> {
        match event {
            InboundEvent::Joined(snapshot) => self.on_joined(snapshot),
            InboundEvent::JoinRejected(rejection) => self.on_join_rejected(rejection),
            InboundEvent::SwitchConfirmed(snapshot) => self
                .switch
                .on_confirmed(
                    snapshot,
                    &mut self.session,
                    &self.registry,
                    &mut self.relays,
                    &self.events,
                )
                .map(|_| ()),
            InboundEvent::SwitchRejected(rejection) => {
                self.switch.on_rejected(rejection, &self.events)
            }
            InboundEvent::RelayRequestReceived {
                request_id,
                request,
            } => self
                .relays
                .on_request_received(&self.session, request_id, request, &self.events),
            InboundEvent::RelayResponse {
                request_id,
                decision,
            } => self.relays.on_response(&request_id, decision, &self.events),
            InboundEvent::RelayStarted { request_id } => {
                self.relays.on_started(&request_id, &self.events)
            }
            InboundEvent::RelayStopped { request_id, reason } => {
                self.relays.on_stopped(&request_id, reason, &self.events)
            }
            InboundEvent::RelayError {
                request_id,
                diagnostic,
            } => self.relays.on_error(&request_id, diagnostic, &self.events),
            InboundEvent::ParticipantJoined(participant) => self.on_participant_joined(participant),
            InboundEvent::ParticipantLeft { participant_id } => {
                self.require_joined("participant_left")?;
                self.registry.remove(&participant_id).ok_or_else(|| {
                    AppError::Stale(format!("Unknown participant {}", participant_id))
                })?;
                self.publish_participants();
                Ok(())
            }
            InboundEvent::MediaStateChanged(change) => {
                self.require_joined("media_state_changed")?;
                if !self
                    .registry
                    .set_media(&change.participant_id, change.mic, change.camera)
                {
                    return Err(AppError::Stale(format!(
                        "Unknown participant {}",
                        change.participant_id
                    )));
                }
                if change.participant_id == self.session.local_participant_id {
                    self.session.media_enabled = MediaEnabled {
                        mic: change.mic,
                        camera: change.camera,
                    };
                }
                self.publish_participants();
                Ok(())
            }
            InboundEvent::LeftRoom => {
                if self.session.lifecycle_state != LifecycleState::Leaving {
                    return Err(AppError::Stale("left_room while not leaving".to_string()));
                }
                self.finish_leave();
                Ok(())
            }
            InboundEvent::Pong => Ok(()),
            InboundEvent::Error(err) => {
                tracing::warn!(code = err.code, message = %err.message, "Signaling server error");
                Ok(())
            }
        }
    }

    fn on_joined(&mut self, snapshot: RoomSnapshotPayload) -> Result<()> {
        let Some(pending) = self
            .pending_join
            .take_if(|p| p.room_id == snapshot.room_id)
        else {
            return Err(AppError::Stale(format!(
                "Unexpected join confirmation for room {}",
                snapshot.room_id
            )));
        };

        let Some(participant_id) = snapshot.participant_id else {
            self.session.lifecycle_state = LifecycleState::Disconnected;
            let error = AppError::Internal("Join confirmation without participant id".to_string());
            let _ = pending.reply.send(Err(error.clone()));
            return Err(error);
        };

        self.session.room_id = pending.room_id;
        self.session.auth_token = pending.token;
        self.session.local_participant_id = participant_id;
        self.session.lifecycle_state = LifecycleState::Joined;

        let participants = mark_local(snapshot.participants, &self.session.local_participant_id);
        if let Some(local) = participants.iter().find(|p| p.is_local) {
            self.session.media_enabled = MediaEnabled {
                mic: local.mic_on,
                camera: local.webcam_on,
            };
        }
        self.registry.replace_all(participants);
        self.relays.prune_terminal();

        let outcome = JoinOutcome {
            room_id: self.session.room_id.clone(),
            participant_id: self.session.local_participant_id.clone(),
            participant_count: self.registry.len(),
        };

        tracing::info!(
            room_id = %outcome.room_id,
            participant_id = %outcome.participant_id,
            participants = outcome.participant_count,
            "Joined room"
        );

        self.events.publish(SessionEvent::RoomJoined {
            room_id: outcome.room_id.clone(),
            participant_id: outcome.participant_id.clone(),
        });
        self.publish_participants();
        let _ = pending.reply.send(Ok(outcome));
        Ok(())
    }

    fn on_join_rejected(&mut self, rejection: RoomRejection) -> Result<()> {
        let pending = self
            .pending_join
            .take()
            .ok_or_else(|| AppError::Stale("Join rejection with no join in flight".to_string()))?;

        self.session.lifecycle_state = LifecycleState::Disconnected;
        let error = AppError::from(rejection);

        tracing::warn!(room_id = %pending.room_id, error = %error, "Join rejected");

        self.events.publish(SessionEvent::JoinFailed {
            room_id: pending.room_id,
            reason: error.code().to_string(),
        });
        let _ = pending.reply.send(Err(error));
        Ok(())
    }

    fn on_participant_joined(&mut self, participant: Participant) -> Result<()> {
        self.require_joined("participant_joined")?;
        let mut participant = participant;
        participant.is_local = participant.participant_id == self.session.local_participant_id;

        tracing::debug!(participant_id = %participant.participant_id, "Participant joined");

        self.registry.upsert(participant);
        self.publish_participants();
        Ok(())
    }

    fn finish_leave(&mut self) {
        let room_id = std::mem::take(&mut self.session.room_id);
        self.session.auth_token.clear();
        self.session.lifecycle_state = LifecycleState::Disconnected;
        let pruned = self.relays.prune_terminal();

        tracing::info!(room_id = %room_id, pruned_relays = pruned, "Left room");

        self.events.publish(SessionEvent::RoomLeft { room_id });
    }

    /// The signaling connection is gone. Every pending operation fails and the
    /// session falls back to its last confirmed room, now disconnected.
    pub fn on_transport_closed(&mut self) {
        tracing::warn!(room_id = %self.session.room_id, "Signaling transport closed");

        self.relays.on_transport_closed(&self.events);
        self.switch.abandon(
            AppError::TransportFailure("Signaling connection closed".to_string()),
            &self.events,
        );
        if let Some(pending) = self.pending_join.take() {
            let _ = pending.reply.send(Err(AppError::TransportFailure(
                "Signaling connection closed".to_string(),
            )));
        }

        self.session.lifecycle_state = LifecycleState::Disconnected;
        self.registry.clear();
        self.events.publish(SessionEvent::ParticipantsChanged {
            participants: Vec::new(),
        });
        self.events.publish(SessionEvent::Disconnected);
    }

    fn require_joined(&self, what: &str) -> Result<()> {
        if self.session.is_joined() {
            Ok(())
        } else {
            Err(AppError::Stale(format!("{} while not in a room", what)))
        }
    }

    fn publish_participants(&self) {
        self.events.publish(SessionEvent::ParticipantsChanged {
            participants: self.registry.all(),
        });
    }

    fn send(&self, msg: SignalingMessage) -> Result<()> {
        tracing::debug!(msg_type = %msg.msg_type, request_id = ?msg.request_id, "Sending signaling message");
        self.transport.send(msg)
    }
}
