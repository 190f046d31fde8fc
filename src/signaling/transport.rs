use tokio::sync::mpsc;

use crate::error::{AppError, Result};
use crate::signaling::SignalingMessage;

/// Outbound half of the signaling connection.
///
/// Only the session actor writes to it, so implementations need not order
/// concurrent senders.
pub trait SignalingTransport: Send + Sync {
    fn send(&self, msg: SignalingMessage) -> Result<()>;
}

/// Transport backed by an unbounded channel drained by the socket writer task
#[derive(Clone)]
pub struct ChannelTransport {
    sender: mpsc::UnboundedSender<SignalingMessage>,
}

impl ChannelTransport {
    pub fn new(sender: mpsc::UnboundedSender<SignalingMessage>) -> Self {
        Self { sender }
    }

    /// A transport plus the receiving end, for wiring up writers and tests
    pub fn pair() -> (Self, mpsc::UnboundedReceiver<SignalingMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl SignalingTransport for ChannelTransport {
    fn send(&self, msg: SignalingMessage) -> Result<()> {
        self.sender
            .send(msg)
            .map_err(|_| AppError::TransportFailure("Signaling connection closed".to_string()))
    }
}
