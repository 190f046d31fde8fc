use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::error::{AppError, Result};
use crate::signaling::{ChannelTransport, SignalingMessage};

/// A live signaling connection split into its two halves
pub struct SignalingConnection {
    pub transport: ChannelTransport,
    pub inbound: mpsc::UnboundedReceiver<SignalingMessage>,
    pub tasks: SocketTasks,
}

/// The reader and writer tasks pumping the socket
pub struct SocketTasks {
    send_task: JoinHandle<()>,
    recv_task: JoinHandle<()>,
}

impl SocketTasks {
    pub fn abort(&self) {
        self.send_task.abort();
        self.recv_task.abort();
    }
}

/// Connect to the signaling server over WebSocket.
///
/// The inbound channel closes when the socket does, which the session actor
/// treats as a transport failure.
pub async fn connect(url: &str) -> Result<SignalingConnection> {
    let (socket, _response) = connect_async(url)
        .await
        .map_err(|e| AppError::Unreachable(format!("Signaling connect failed: {}", e)))?;

    tracing::info!(url = %url, "Signaling connected");

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (transport, mut outbound) = ChannelTransport::pair();
    let (inbound_tx, inbound) = mpsc::unbounded_channel::<SignalingMessage>();

    // Task for writing messages to the server
    let send_task = tokio::spawn(async move {
        while let Some(msg) = outbound.recv().await {
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(e) => tracing::error!(error = %e, "Failed to encode signaling message"),
            }
        }
        let _ = ws_sender.close().await;
    });

    // Task for reading messages from the server
    let recv_task = tokio::spawn(async move {
        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(Message::Text(text)) => {
                    match serde_json::from_str::<SignalingMessage>(text.as_str()) {
                        Ok(msg) => {
                            if inbound_tx.send(msg).is_err() {
                                break;
                            }
                        }
                        Err(e) => tracing::warn!(error = %e, "Dropping malformed signaling frame"),
                    }
                }
                Ok(Message::Close(_)) => {
                    tracing::info!("Signaling close received");
                    break;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Signaling socket error");
                    break;
                }
                _ => {}
            }
        }
        tracing::info!("Signaling disconnected");
    });

    Ok(SignalingConnection {
        transport,
        inbound,
        tasks: SocketTasks {
            send_task,
            recv_task,
        },
    })
}
