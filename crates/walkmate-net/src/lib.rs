// Realtime chat channel: STOMP over WebSocket with a long-poll fallback,
// one topic per chat room.

pub mod channel;
pub mod error;
pub mod messages;
pub mod polling;
pub mod transport;

pub use channel::{
    spawn_channel, ChannelCommand, ChannelConfig, ChannelHandle, ChannelNotification,
    ConnectionState,
};
pub use error::NetError;
pub use messages::{decode_message_frame, publish_frame, subscribe_frame};
pub use polling::{poll_url_for, LongPollConnector};
pub use transport::{Connection, Connector, FallbackConnector, WebSocketConnector};
