use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::{MediaEnabled, MediaKind, RelayRequest, SessionSnapshot};
use crate::session::manager::{JoinOutcome, SessionManager};
use crate::session::switch::SwitchOutcome;
use crate::signaling::SignalingMessage;

type Reply<T> = oneshot::Sender<T>;

/// Requests served by the session actor
pub enum Command {
    Join {
        room_id: String,
        token: String,
        display_name: Option<String>,
        reply: Reply<Result<oneshot::Receiver<Result<JoinOutcome>>>>,
    },
    Leave {
        reply: Reply<Result<()>>,
    },
    SetMedia {
        mic: bool,
        camera: bool,
        reply: Reply<Result<MediaEnabled>>,
    },
    Switch {
        target_room_id: String,
        token: String,
        reply: Reply<Result<oneshot::Receiver<Result<SwitchOutcome>>>>,
    },
    AbandonSwitch {
        error: AppError,
        reply: Reply<bool>,
    },
    RequestRelay {
        destination_room_id: String,
        token: String,
        kinds: Vec<MediaKind>,
        reply: Reply<Result<RelayRequest>>,
    },
    StopRelay {
        request_id: String,
        reply: Reply<Result<RelayRequest>>,
    },
    AcceptRelay {
        request_id: String,
        reply: Reply<Result<RelayRequest>>,
    },
    RejectRelay {
        request_id: String,
        reply: Reply<Result<RelayRequest>>,
    },
    /// `reply` is absent when a request timer fires
    ExpireRelay {
        request_id: String,
        reply: Option<Reply<bool>>,
    },
    Snapshot {
        reply: Reply<SessionSnapshot>,
    },
    Relays {
        reply: Reply<Vec<RelayRequest>>,
    },
    Relay {
        request_id: String,
        reply: Reply<Option<RelayRequest>>,
    },
}

/// Cloneable front door to the session actor
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
    switch_timeout: Option<Duration>,
}

impl SessionHandle {
    async fn call<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(command(reply))
            .map_err(|_| AppError::Internal("Session actor stopped".to_string()))?;
        rx.await
            .map_err(|_| AppError::Internal("Session actor dropped the request".to_string()))
    }

    /// Join `room_id` and wait for the server's answer.
    pub async fn join(
        &self,
        room_id: &str,
        token: &str,
        display_name: Option<&str>,
    ) -> Result<JoinOutcome> {
        let confirmation = self
            .call(|reply| Command::Join {
                room_id: room_id.to_string(),
                token: token.to_string(),
                display_name: display_name.map(str::to_string),
                reply,
            })
            .await??;

        confirmation.await.map_err(|_| connection_lost())?
    }

    pub async fn leave(&self) -> Result<()> {
        self.call(|reply| Command::Leave { reply }).await?
    }

    pub async fn set_media(&self, mic: bool, camera: bool) -> Result<MediaEnabled> {
        self.call(|reply| Command::SetMedia { mic, camera, reply })
            .await?
    }

    /// Switch the home room and wait for confirmation, bounded by the
    /// configured switch timeout if there is one.
    pub async fn switch_to(&self, target_room_id: &str, token: &str) -> Result<SwitchOutcome> {
        let mut confirmation = self
            .call(|reply| Command::Switch {
                target_room_id: target_room_id.to_string(),
                token: token.to_string(),
                reply,
            })
            .await??;

        let Some(limit) = self.switch_timeout else {
            return confirmation.await.map_err(|_| connection_lost())?;
        };

        match tokio::time::timeout(limit, &mut confirmation).await {
            Ok(result) => result.map_err(|_| connection_lost())?,
            Err(_) => {
                let error = AppError::Unreachable(format!(
                    "No answer switching to room {} after {:?}",
                    target_room_id, limit
                ));
                let abandoned = self
                    .call(|reply| Command::AbandonSwitch {
                        error: error.clone(),
                        reply,
                    })
                    .await?;
                if abandoned {
                    Err(error)
                } else {
                    // The answer raced the deadline.
                    confirmation.await.map_err(|_| connection_lost())?
                }
            }
        }
    }

    pub async fn request_relay(
        &self,
        destination_room_id: &str,
        token: &str,
        kinds: Vec<MediaKind>,
    ) -> Result<RelayRequest> {
        self.call(|reply| Command::RequestRelay {
            destination_room_id: destination_room_id.to_string(),
            token: token.to_string(),
            kinds,
            reply,
        })
        .await?
    }

    pub async fn stop_relay(&self, request_id: &str) -> Result<RelayRequest> {
        self.call(|reply| Command::StopRelay {
            request_id: request_id.to_string(),
            reply,
        })
        .await?
    }

    pub async fn accept_relay(&self, request_id: &str) -> Result<RelayRequest> {
        self.call(|reply| Command::AcceptRelay {
            request_id: request_id.to_string(),
            reply,
        })
        .await?
    }

    pub async fn reject_relay(&self, request_id: &str) -> Result<RelayRequest> {
        self.call(|reply| Command::RejectRelay {
            request_id: request_id.to_string(),
            reply,
        })
        .await?
    }

    /// Give up waiting on a Pending outbound relay. Returns false when
    /// there was nothing to expire.
    pub async fn expire_relay(&self, request_id: &str) -> Result<bool> {
        self.call(|reply| Command::ExpireRelay {
            request_id: request_id.to_string(),
            reply: Some(reply),
        })
        .await
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot> {
        self.call(|reply| Command::Snapshot { reply }).await
    }

    pub async fn relays(&self) -> Result<Vec<RelayRequest>> {
        self.call(|reply| Command::Relays { reply }).await
    }

    pub async fn relay(&self, request_id: &str) -> Result<Option<RelayRequest>> {
        self.call(|reply| Command::Relay {
            request_id: request_id.to_string(),
            reply,
        })
        .await
    }
}

fn connection_lost() -> AppError {
    AppError::TransportFailure("Session ended before the server answered".to_string())
}

/// Timing knobs for the actor, taken from [`Config`]
#[derive(Debug, Clone, Copy)]
pub struct ActorSettings {
    pub relay_request_timeout: Option<Duration>,
    pub switch_timeout: Option<Duration>,
    pub ping_interval: Duration,
}

impl From<&Config> for ActorSettings {
    fn from(config: &Config) -> Self {
        Self {
            relay_request_timeout: config.relay_request_timeout,
            switch_timeout: config.switch_timeout,
            ping_interval: config.ping_interval,
        }
    }
}

/// Spawn the task owning `manager`.
///
/// The task runs until every [`SessionHandle`] is dropped. When `inbound`
/// closes the manager is told the transport is gone, and commands keep
/// being served against the disconnected session.
pub fn spawn_session(
    manager: SessionManager,
    inbound: mpsc::UnboundedReceiver<SignalingMessage>,
    settings: ActorSettings,
) -> (SessionHandle, JoinHandle<()>) {
    let (commands, rx) = mpsc::unbounded_channel();
    let timer_tx = commands.downgrade();

    let task = tokio::spawn(run(manager, rx, inbound, timer_tx, settings));

    let handle = SessionHandle {
        commands,
        switch_timeout: settings.switch_timeout,
    };
    (handle, task)
}

async fn run(
    mut manager: SessionManager,
    mut commands: mpsc::UnboundedReceiver<Command>,
    mut inbound: mpsc::UnboundedReceiver<SignalingMessage>,
    timer_tx: mpsc::WeakUnboundedSender<Command>,
    settings: ActorSettings,
) {
    let mut keepalive = tokio::time::interval(settings.ping_interval);
    keepalive.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    keepalive.tick().await;

    let mut connected = true;

    tracing::info!("Session actor started");

    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else { break };
                handle_command(&mut manager, command, &timer_tx, settings);
            }
            msg = inbound.recv(), if connected => {
                match msg {
                    Some(msg) => {
                        // Stale and malformed messages are already logged.
                        let _ = manager.handle_inbound(msg);
                    }
                    None => {
                        connected = false;
                        manager.on_transport_closed();
                    }
                }
            }
            _ = keepalive.tick(), if connected => {
                if let Err(e) = manager.ping() {
                    tracing::warn!(error = %e, "Keepalive failed");
                }
            }
        }
    }

    tracing::info!("Session actor stopped");
}

fn handle_command(
    manager: &mut SessionManager,
    command: Command,
    timer_tx: &mpsc::WeakUnboundedSender<Command>,
    settings: ActorSettings,
) {
    // A dropped reply only means the caller stopped waiting.
    match command {
        Command::Join {
            room_id,
            token,
            display_name,
            reply,
        } => {
            let _ = reply.send(manager.join(&room_id, &token, display_name.as_deref()));
        }
        Command::Leave { reply } => {
            let _ = reply.send(manager.leave());
        }
        Command::SetMedia { mic, camera, reply } => {
            let _ = reply.send(manager.set_media(mic, camera));
        }
        Command::Switch {
            target_room_id,
            token,
            reply,
        } => {
            let _ = reply.send(manager.switch_to(&target_room_id, &token));
        }
        Command::AbandonSwitch { error, reply } => {
            let _ = reply.send(manager.abandon_switch(error));
        }
        Command::RequestRelay {
            destination_room_id,
            token,
            kinds,
            reply,
        } => {
            let result = manager.request_relay(&destination_room_id, &token, kinds);
            if let (Ok(relay), Some(limit)) = (&result, settings.relay_request_timeout) {
                arm_relay_timer(timer_tx.clone(), relay.request_id.clone(), limit);
            }
            let _ = reply.send(result);
        }
        Command::StopRelay { request_id, reply } => {
            let _ = reply.send(manager.stop_relay(&request_id));
        }
        Command::AcceptRelay { request_id, reply } => {
            let _ = reply.send(manager.accept_relay(&request_id));
        }
        Command::RejectRelay { request_id, reply } => {
            let _ = reply.send(manager.reject_relay(&request_id));
        }
        Command::ExpireRelay { request_id, reply } => {
            let expired = manager.expire_relay(&request_id);
            if let Some(reply) = reply {
                let _ = reply.send(expired);
            }
        }
        Command::Snapshot { reply } => {
            let _ = reply.send(manager.snapshot());
        }
        Command::Relays { reply } => {
            let _ = reply.send(manager.relays());
        }
        Command::Relay { request_id, reply } => {
            let _ = reply.send(manager.relay(&request_id));
        }
    }
}

fn arm_relay_timer(
    timer_tx: mpsc::WeakUnboundedSender<Command>,
    request_id: String,
    limit: Duration,
) {
    tokio::spawn(async move {
        tokio::time::sleep(limit).await;
        if let Some(tx) = timer_tx.upgrade() {
            tracing::debug!(request_id = %request_id, "Relay request timer fired");
            let _ = tx.send(Command::ExpireRelay {
                request_id,
                reply: None,
            });
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::models::{LifecycleState, RelayState};
    use crate::session::events::{EventPublisher, SessionEvent};
    use crate::session::registry::ParticipantRegistry;
    use crate::signaling::{msg_types, ChannelTransport};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tokio_test::assert_ok;

    struct TestSession {
        handle: SessionHandle,
        wire: mpsc::UnboundedReceiver<SignalingMessage>,
        inbound: mpsc::UnboundedSender<SignalingMessage>,
        events: EventPublisher,
    }

    fn settings() -> ActorSettings {
        ActorSettings {
            relay_request_timeout: None,
            switch_timeout: None,
            ping_interval: Duration::from_secs(3600),
        }
    }

    fn start(settings: ActorSettings) -> TestSession {
        let (transport, wire) = ChannelTransport::pair();
        let (inbound, inbound_rx) = mpsc::unbounded_channel();
        let events = EventPublisher::new(64);
        let manager = SessionManager::new(
            "Alice",
            Arc::new(transport),
            Arc::new(ParticipantRegistry::new()),
            events.clone(),
        );
        let (handle, _task) = spawn_session(manager, inbound_rx, settings);
        TestSession {
            handle,
            wire,
            inbound,
            events,
        }
    }

    fn server(msg_type: &str, payload: serde_json::Value) -> SignalingMessage {
        SignalingMessage::new(msg_type, payload)
    }

    async fn join(t: &mut TestSession, room_id: &str) {
        let handle = t.handle.clone();
        let room = room_id.to_string();
        let pending = tokio::spawn(async move { handle.join(&room, "token", None).await });

        let sent = t.wire.recv().await.unwrap();
        assert_eq!(sent.msg_type, msg_types::JOIN_ROOM);
        t.inbound
            .send(server(
                msg_types::JOINED,
                json!({
                    "room_id": room_id,
                    "participant_id": "user-1",
                    "participants": [{ "participant_id": "user-1", "display_name": "Alice" }]
                }),
            ))
            .unwrap();

        let outcome = assert_ok!(pending.await.unwrap());
        assert_eq!(outcome.room_id, room_id);
    }

    #[tokio::test]
    async fn test_join_and_switch_through_handle() {
        let mut t = start(settings());
        join(&mut t, "room-a").await;

        let handle = t.handle.clone();
        let switching = tokio::spawn(async move { handle.switch_to("room-b", "token-b").await });

        let sent = t.wire.recv().await.unwrap();
        assert_eq!(sent.msg_type, msg_types::SWITCH_ROOM);
        assert_eq!(sent.payload["target_room_id"], "room-b");

        t.inbound
            .send(server(msg_types::SWITCH_CONFIRMED, json!({ "room_id": "room-b" })))
            .unwrap();

        let outcome = switching.await.unwrap().unwrap();
        assert_eq!(outcome.previous_room_id, "room-a");
        assert_eq!(outcome.room_id, "room-b");

        let snapshot = t.handle.snapshot().await.unwrap();
        assert_eq!(snapshot.room_id.as_deref(), Some("room-b"));
    }

    #[tokio::test]
    async fn test_switch_timeout_keeps_current_room() {
        let mut t = start(ActorSettings {
            switch_timeout: Some(Duration::from_millis(50)),
            ..settings()
        });
        join(&mut t, "room-a").await;
        let mut events = t.events.subscribe();

        let result = t.handle.switch_to("room-b", "token-b").await;
        assert!(matches!(result, Err(AppError::Unreachable(_))));

        let snapshot = t.handle.snapshot().await.unwrap();
        assert_eq!(snapshot.room_id.as_deref(), Some("room-a"));
        assert_eq!(snapshot.lifecycle_state, LifecycleState::Joined);

        match events.recv().await.unwrap() {
            SessionEvent::SwitchFailed { target_room_id, .. } => {
                assert_eq!(target_room_id, "room-b")
            }
            other => panic!("Unexpected event: {:?}", other),
        }

        // A late confirmation no longer applies.
        t.inbound
            .send(server(msg_types::SWITCH_CONFIRMED, json!({ "room_id": "room-b" })))
            .unwrap();
        let snapshot = t.handle.snapshot().await.unwrap();
        assert_eq!(snapshot.room_id.as_deref(), Some("room-a"));
    }

    #[tokio::test]
    async fn test_relay_request_timer_expires_pending() {
        let mut t = start(ActorSettings {
            relay_request_timeout: Some(Duration::from_millis(30)),
            ..settings()
        });
        join(&mut t, "room-a").await;

        let relay = t
            .handle
            .request_relay("room-b", "token-b", vec![MediaKind::Video])
            .await
            .unwrap();
        assert_eq!(relay.state, RelayState::Pending);

        tokio::time::sleep(Duration::from_millis(150)).await;

        let relay = t.handle.relay(&relay.request_id).await.unwrap().unwrap();
        assert_eq!(relay.state, RelayState::Errored);
        assert!(!t.handle.expire_relay(&relay.request_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_transport_close_fails_pending_join() {
        let mut t = start(settings());

        let handle = t.handle.clone();
        let pending = tokio::spawn(async move { handle.join("room-a", "token", None).await });
        t.wire.recv().await.unwrap();

        drop(t.inbound);

        let result = pending.await.unwrap();
        assert!(matches!(result, Err(AppError::TransportFailure(_))));

        let snapshot = t.handle.snapshot().await.unwrap();
        assert_eq!(snapshot.lifecycle_state, LifecycleState::Disconnected);
    }

    #[tokio::test]
    async fn test_commands_are_validated_before_sending() {
        let mut t = start(settings());

        let result = t.handle.request_relay("room-b", "t", vec![MediaKind::Audio]).await;
        assert!(matches!(result, Err(AppError::InvalidState(_))));
        assert!(matches!(t.handle.leave().await, Err(AppError::InvalidState(_))));
        assert!(t.wire.try_recv().is_err());
    }
}
