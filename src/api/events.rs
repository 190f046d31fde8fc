use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use crate::session::EventPublisher;
use crate::state::AppState;

/// Event stream routes
pub fn event_routes() -> Router<AppState> {
    Router::new().route("/ws/events", get(events_upgrade))
}

/// GET /ws/events - Stream session events as JSON text frames
async fn events_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| stream_events(socket, state.events))
}

async fn stream_events(socket: WebSocket, events: EventPublisher) {
    let conn_id = Uuid::new_v4().to_string();
    tracing::info!(conn_id = %conn_id, "Event stream connected");

    let mut stream = BroadcastStream::new(events.subscribe());
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let send_conn_id = conn_id.clone();
    let mut send_task = tokio::spawn(async move {
        while let Some(item) = stream.next().await {
            let event = match item {
                Ok(event) => event,
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    tracing::warn!(conn_id = %send_conn_id, skipped, "Event stream lagging");
                    continue;
                }
            };
            match serde_json::to_string(&event) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(e) => tracing::error!(error = %e, "Failed to encode session event"),
            }
        }
    });

    // Only watch for the client going away
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(Message::Close(_)) | Err(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    tracing::info!(conn_id = %conn_id, "Event stream disconnected");
}
