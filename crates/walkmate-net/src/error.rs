use thiserror::Error;

use walkmate_shared::{ChatRoomId, WireError};

#[derive(Error, Debug)]
pub enum NetError {
    #[error("Failed to connect to broker: {0}")]
    Connect(String),

    #[error("Broker handshake failed: {0}")]
    Handshake(String),

    #[error("Broker rejected the session: {0}")]
    Rejected(String),

    #[error("Long-poll transport error: {0}")]
    Poll(String),

    #[error("Transport closed")]
    TransportClosed,

    #[error("Channel is not connected")]
    NotConnected,

    #[error("Channel command queue is full")]
    QueueFull,

    #[error("Channel task has shut down")]
    ChannelClosed,

    #[error("Message belongs to room {got}, channel is bound to room {expected}")]
    WrongRoom {
        expected: ChatRoomId,
        got: ChatRoomId,
    },

    #[error("Wire error: {0}")]
    Wire(#[from] WireError),
}
