use std::collections::{HashMap, HashSet};

use crate::error::{AppError, Result};
use crate::models::{
    MediaKind, MediaKinds, RelayDecision, RelayRequest, RelayRole, RelayState, Session,
    StopReason,
};
use crate::session::events::{EventPublisher, SessionEvent};
use crate::signaling::{
    msg_types, RelayDecisionPayload, RelayRequestPayload, RelayRequestReceivedPayload,
    SignalingMessage, SignalingTransport,
};

/// Drives the request/accept/reject/start/stop handshake for every relay this
/// participant takes part in, on either end.
///
/// Requests are keyed by `request_id`. A destination-side request that is
/// still Pending is the pending decision; rejecting it discards the entry.
#[derive(Default)]
pub struct RelayNegotiator {
    relays: HashMap<String, RelayRequest>,
    /// Relays stopped locally whose stop the transport has not yet echoed
    unconfirmed_stops: HashSet<String>,
}

impl RelayNegotiator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, request_id: &str) -> Option<&RelayRequest> {
        self.relays.get(request_id)
    }

    /// All known relays, oldest first
    pub fn all(&self) -> Vec<RelayRequest> {
        let mut all: Vec<RelayRequest> = self.relays.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        all
    }

    pub fn live_count(&self) -> usize {
        self.relays.values().filter(|r| r.is_live()).count()
    }

    // ==================== Requester side ====================

    /// Propose relaying this participant's media into `destination_room_id`.
    ///
    /// Returns as soon as the request is on the wire; the destination's
    /// decision arrives later as an inbound event.
    pub fn request(
        &mut self,
        session: &Session,
        destination_room_id: &str,
        token: &str,
        kinds: Vec<MediaKind>,
        transport: &dyn SignalingTransport,
        events: &EventPublisher,
    ) -> Result<RelayRequest> {
        let destination_room_id = destination_room_id.trim();
        if destination_room_id.is_empty() {
            return Err(AppError::InvalidInput(
                "Destination room ID is required".to_string(),
            ));
        }
        let kinds = MediaKinds::new(kinds)?;
        if !session.is_joined() {
            return Err(AppError::InvalidState(
                "Must be joined to a room to request a relay".to_string(),
            ));
        }
        if destination_room_id == session.room_id {
            return Err(AppError::InvalidInput(
                "Cannot relay into the current room".to_string(),
            ));
        }
        if let Some(existing) = self.relays.values().find(|r| {
            r.role == RelayRole::Requester
                && r.is_live()
                && r.source_room_id == session.room_id
                && r.destination_room_id == destination_room_id
        }) {
            return Err(AppError::AlreadyInProgress(format!(
                "Relay {} to room {} is {}",
                existing.request_id, destination_room_id, existing.state
            )));
        }

        let mut relay = RelayRequest::outbound(
            session.room_id.clone(),
            destination_room_id.to_string(),
            session.local_participant_id.clone(),
            session.display_name.clone(),
            kinds,
        );

        let msg = SignalingMessage::typed(
            msg_types::RELAY_REQUEST,
            &RelayRequestPayload {
                destination_room_id: relay.destination_room_id.clone(),
                token: token.to_string(),
                kinds: relay.kinds.clone(),
            },
        )?
        .with_request_id(Some(relay.request_id.clone()));

        if let Err(e) = transport.send(msg) {
            relay.fail(e.to_string())?;
            publish_error(events, &relay, serde_json::Value::String(e.to_string()));
            self.relays.insert(relay.request_id.clone(), relay);
            return Err(e);
        }

        tracing::info!(
            request_id = %relay.request_id,
            source_room_id = %relay.source_room_id,
            destination_room_id = %relay.destination_room_id,
            "Relay requested"
        );

        publish_state(events, &relay);
        self.relays.insert(relay.request_id.clone(), relay.clone());
        Ok(relay)
    }

    /// Stop an Accepted or Active relay from either end.
    ///
    /// The relay is marked Stopped right away; a later transport report for
    /// it reconciles the outcome.
    pub fn stop(
        &mut self,
        request_id: &str,
        transport: &dyn SignalingTransport,
        events: &EventPublisher,
    ) -> Result<RelayRequest> {
        let relay = self
            .relays
            .get_mut(request_id)
            .ok_or_else(|| AppError::NotFound(format!("Relay {} not found", request_id)))?;

        if !matches!(relay.state, RelayState::Accepted | RelayState::Active) {
            return Err(AppError::InvalidState(format!(
                "Relay {} is {} and cannot be stopped",
                request_id, relay.state
            )));
        }

        transport.send(
            SignalingMessage::new(msg_types::RELAY_STOP, serde_json::json!({}))
                .with_request_id(Some(request_id.to_string())),
        )?;

        relay.stop(StopReason::LocalStop)?;
        self.unconfirmed_stops.insert(request_id.to_string());

        tracing::info!(request_id = %request_id, "Relay stopped locally");

        let relay = relay.clone();
        publish_state(events, &relay);
        publish_stopped(events, &relay, StopReason::LocalStop);
        Ok(relay)
    }

    /// Local cancellation of a request nobody answered, treated as a
    /// transport failure. Returns false when there was nothing to expire.
    pub fn expire(&mut self, request_id: &str, events: &EventPublisher) -> bool {
        let Some(relay) = self.relays.get_mut(request_id) else {
            return false;
        };
        if relay.role != RelayRole::Requester || relay.state != RelayState::Pending {
            return false;
        }
        if relay.fail("timed out waiting for destination").is_err() {
            return false;
        }

        tracing::warn!(request_id = %request_id, "Relay request expired");

        let relay = relay.clone();
        publish_error(events, &relay, serde_json::Value::String("timed out".to_string()));
        true
    }

    // ==================== Destination side ====================

    /// Record an inbound proposal as a pending decision for the host.
    pub fn on_request_received(
        &mut self,
        session: &Session,
        request_id: String,
        request: RelayRequestReceivedPayload,
        events: &EventPublisher,
    ) -> Result<()> {
        if !session.is_joined() {
            return Err(AppError::Stale(format!(
                "Relay request {} while not in a room",
                request_id
            )));
        }
        if self.relays.contains_key(&request_id) {
            return Err(AppError::Stale(format!(
                "Duplicate relay request {}",
                request_id
            )));
        }

        let now = chrono::Utc::now();
        let relay = RelayRequest {
            request_id: request_id.clone(),
            role: RelayRole::Destination,
            source_room_id: request.source_room_id,
            destination_room_id: session.room_id.clone(),
            requester_participant_id: request.requester_participant_id,
            requester_display_name: request.requester_display_name,
            kinds: request.kinds,
            state: RelayState::Pending,
            stop_reason: None,
            diagnostic: None,
            created_at: now,
            updated_at: now,
        };

        tracing::info!(
            request_id = %request_id,
            source_room_id = %relay.source_room_id,
            requester = %relay.requester_display_name,
            "Relay request received"
        );

        events.publish(SessionEvent::RelayRequestReceived {
            request_id: relay.request_id.clone(),
            source_room_id: relay.source_room_id.clone(),
            requester_participant_id: relay.requester_participant_id.clone(),
            requester_display_name: relay.requester_display_name.clone(),
            kinds: relay.kinds.clone(),
        });
        self.relays.insert(request_id, relay);
        Ok(())
    }

    /// Accept a pending inbound request and get ready to receive its media.
    pub fn accept(
        &mut self,
        request_id: &str,
        transport: &dyn SignalingTransport,
        events: &EventPublisher,
    ) -> Result<RelayRequest> {
        self.pending_decision(request_id)?;
        send_decision(transport, request_id, RelayDecision::Accepted)?;

        let relay = self
            .relays
            .get_mut(request_id)
            .ok_or_else(|| AppError::Internal(format!("Relay {} vanished", request_id)))?;
        relay.transition(RelayState::Accepted)?;

        tracing::info!(request_id = %request_id, kinds = ?relay.kinds, "Relay request accepted");

        let relay = relay.clone();
        publish_state(events, &relay);
        Ok(relay)
    }

    /// Reject a pending inbound request and discard everything held for it.
    pub fn reject(
        &mut self,
        request_id: &str,
        transport: &dyn SignalingTransport,
        events: &EventPublisher,
    ) -> Result<RelayRequest> {
        self.pending_decision(request_id)?;
        send_decision(transport, request_id, RelayDecision::Rejected)?;

        let mut relay = self
            .relays
            .remove(request_id)
            .ok_or_else(|| AppError::Internal(format!("Relay {} vanished", request_id)))?;
        relay.transition(RelayState::Rejected)?;

        tracing::info!(request_id = %request_id, "Relay request rejected");

        publish_state(events, &relay);
        Ok(relay)
    }

    fn pending_decision(&self, request_id: &str) -> Result<()> {
        match self.relays.get(request_id) {
            Some(r) if r.role == RelayRole::Destination && r.state == RelayState::Pending => Ok(()),
            Some(r) if r.role == RelayRole::Destination => Err(AppError::Usage(format!(
                "Relay request {} was already decided ({})",
                request_id, r.state
            ))),
            _ => Err(AppError::Usage(format!(
                "No pending decision for relay request {}",
                request_id
            ))),
        }
    }

    // ==================== Transport reports ====================

    pub fn on_response(
        &mut self,
        request_id: &str,
        decision: RelayDecision,
        events: &EventPublisher,
    ) -> Result<()> {
        let relay = self.live_relay(request_id)?;
        if relay.role != RelayRole::Requester || relay.state != RelayState::Pending {
            return Err(AppError::Stale(format!(
                "Response for relay {} in state {}",
                request_id, relay.state
            )));
        }

        let next = match decision {
            RelayDecision::Accepted => RelayState::Accepted,
            RelayDecision::Rejected => RelayState::Rejected,
        };
        relay.transition(next)?;

        tracing::info!(request_id = %request_id, decision = ?decision, "Relay response");

        let relay = relay.clone();
        events.publish(SessionEvent::RelayResponse {
            request_id: relay.request_id.clone(),
            destination_room_id: relay.destination_room_id.clone(),
            state: relay.state,
        });
        publish_state(events, &relay);
        Ok(())
    }

    pub fn on_started(&mut self, request_id: &str, events: &EventPublisher) -> Result<()> {
        let relay = self.live_relay(request_id)?;
        if relay.state != RelayState::Accepted {
            return Err(AppError::Stale(format!(
                "Start for relay {} in state {}",
                request_id, relay.state
            )));
        }
        relay.transition(RelayState::Active)?;

        tracing::info!(request_id = %request_id, "Relay media flowing");

        let relay = relay.clone();
        publish_state(events, &relay);
        events.publish(SessionEvent::RelayStarted {
            request_id: relay.request_id.clone(),
            room_id: SessionEvent::relay_room(&relay),
            kinds: relay.kinds.clone(),
        });
        Ok(())
    }

    pub fn on_stopped(
        &mut self,
        request_id: &str,
        reason: StopReason,
        events: &EventPublisher,
    ) -> Result<()> {
        if self.unconfirmed_stops.remove(request_id) {
            tracing::debug!(request_id = %request_id, "Local relay stop confirmed");
            return Ok(());
        }

        let relay = self.live_relay(request_id)?;
        if !matches!(relay.state, RelayState::Accepted | RelayState::Active) {
            return Err(AppError::Stale(format!(
                "Stop for relay {} in state {}",
                request_id, relay.state
            )));
        }
        relay.stop(reason)?;

        tracing::info!(request_id = %request_id, reason = ?reason, "Relay stopped");

        let relay = relay.clone();
        publish_state(events, &relay);
        publish_stopped(events, &relay, reason);
        Ok(())
    }

    pub fn on_error(
        &mut self,
        request_id: &str,
        diagnostic: serde_json::Value,
        events: &EventPublisher,
    ) -> Result<()> {
        // The transport disagrees with an optimistic local stop.
        if self.unconfirmed_stops.remove(request_id) {
            if let Some(relay) = self.relays.get_mut(request_id) {
                relay.state = RelayState::Errored;
                relay.stop_reason = Some(StopReason::Error);
                relay.diagnostic = Some(diagnostic.to_string());
                relay.updated_at = chrono::Utc::now();

                tracing::warn!(request_id = %request_id, "Locally stopped relay reported failed");

                let relay = relay.clone();
                publish_error(events, &relay, diagnostic);
                return Ok(());
            }
        }

        let relay = self.live_relay(request_id)?;
        relay.fail(diagnostic.to_string())?;

        tracing::warn!(request_id = %request_id, diagnostic = %diagnostic, "Relay failed");

        let relay = relay.clone();
        publish_error(events, &relay, diagnostic);
        Ok(())
    }

    fn live_relay(&mut self, request_id: &str) -> Result<&mut RelayRequest> {
        match self.relays.get_mut(request_id) {
            Some(relay) if relay.is_live() => Ok(relay),
            Some(relay) => Err(AppError::Stale(format!(
                "Relay {} already {}",
                request_id, relay.state
            ))),
            None => Err(AppError::Stale(format!("Unknown relay {}", request_id))),
        }
    }

    // ==================== Room-scoped cleanup ====================

    /// Leaving `room_id`: undecided inbound requests for it are discarded
    /// and every other live relay touching it is stopped. Returns how many
    /// relays were stopped.
    pub fn leave_room(&mut self, room_id: &str, events: &EventPublisher) -> usize {
        let before = self.relays.len();
        self.relays.retain(|_, r| {
            !(r.role == RelayRole::Destination
                && r.state == RelayState::Pending
                && r.destination_room_id == room_id)
        });
        let discarded = before - self.relays.len();
        if discarded > 0 {
            tracing::info!(room_id = %room_id, discarded, "Pending relay decisions discarded");
        }

        let mut stopped = 0;
        for relay in self.relays.values_mut() {
            if relay.is_live() && relay.touches(room_id) && relay.stop(StopReason::Disconnect).is_ok() {
                publish_state(events, relay);
                publish_stopped(events, relay, StopReason::Disconnect);
                stopped += 1;
            }
        }
        stopped
    }

    /// Forget every relay that reached a terminal state. Returns how many
    /// were dropped.
    pub fn prune_terminal(&mut self) -> usize {
        let before = self.relays.len();
        self.relays.retain(|_, r| r.is_live());
        let relays = &self.relays;
        self.unconfirmed_stops.retain(|id| relays.contains_key(id));
        before - self.relays.len()
    }

    /// Drop every relay this participant requested out of `old_room_id`.
    ///
    /// Relays received as destination are keyed by their destination room and
    /// are left alone.
    pub fn invalidate_source(&mut self, old_room_id: &str, events: &EventPublisher) -> usize {
        let stale: Vec<String> = self
            .relays
            .values()
            .filter(|r| r.role == RelayRole::Requester && r.source_room_id == old_room_id)
            .map(|r| r.request_id.clone())
            .collect();

        for request_id in &stale {
            if let Some(mut relay) = self.relays.remove(request_id) {
                if relay.is_live() && relay.stop(StopReason::RoomSwitched).is_ok() {
                    publish_state(events, &relay);
                    publish_stopped(events, &relay, StopReason::RoomSwitched);
                }
            }
            self.unconfirmed_stops.remove(request_id);
        }
        stale.len()
    }

    /// The signaling connection is gone; nothing in flight can complete.
    pub fn on_transport_closed(&mut self, events: &EventPublisher) {
        let live: Vec<String> = self
            .relays
            .values()
            .filter(|r| r.is_live())
            .map(|r| r.request_id.clone())
            .collect();

        for request_id in live {
            let Some(relay) = self.relays.get_mut(&request_id) else {
                continue;
            };
            if relay.state == RelayState::Active {
                if relay.stop(StopReason::Disconnect).is_ok() {
                    let relay = relay.clone();
                    publish_state(events, &relay);
                    publish_stopped(events, &relay, StopReason::Disconnect);
                }
            } else if relay.fail("transport closed").is_ok() {
                let relay = relay.clone();
                publish_error(
                    events,
                    &relay,
                    serde_json::Value::String("transport closed".to_string()),
                );
            }
        }
        self.unconfirmed_stops.clear();
    }
}

fn send_decision(
    transport: &dyn SignalingTransport,
    request_id: &str,
    decision: RelayDecision,
) -> Result<()> {
    let msg = SignalingMessage::typed(msg_types::RELAY_DECISION, &RelayDecisionPayload { decision })?
        .with_request_id(Some(request_id.to_string()));
    transport.send(msg)
}

fn publish_state(events: &EventPublisher, relay: &RelayRequest) {
    events.publish(SessionEvent::RelayStateChanged {
        request_id: relay.request_id.clone(),
        state: relay.state,
    });
}

fn publish_error(events: &EventPublisher, relay: &RelayRequest, diagnostic: serde_json::Value) {
    publish_state(events, relay);
    events.publish(SessionEvent::RelayError {
        request_id: relay.request_id.clone(),
        room_id: SessionEvent::relay_room(relay),
        diagnostic,
    });
}

fn publish_stopped(events: &EventPublisher, relay: &RelayRequest, reason: StopReason) {
    events.publish(SessionEvent::RelayStopped {
        request_id: relay.request_id.clone(),
        room_id: SessionEvent::relay_room(relay),
        reason,
    });
}
