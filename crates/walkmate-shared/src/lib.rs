//! Types shared by the walk-session crates: identifiers, the chat and
//! location wire models, and the STOMP frame codec.

pub mod constants;
pub mod error;
pub mod protocol;
pub mod stomp;
pub mod types;

pub use error::{FrameError, WireError};
pub use protocol::{
    BoardSummary, ChatMessage, ChatRoomParticipants, LocationPush, LocationSample, MessageType,
};
pub use types::{BoardId, ChatRoomId, Coordinate, Role, UserId};
