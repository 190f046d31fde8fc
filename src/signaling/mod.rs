pub mod client;
pub mod messages;
pub mod transport;

pub use client::{connect, SignalingConnection, SocketTasks};
pub use messages::*;
pub use transport::{ChannelTransport, SignalingTransport};
