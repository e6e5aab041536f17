use tracing::{debug, warn};

use walkmate_shared::constants::CHAT_SEND_DESTINATION;
use walkmate_shared::stomp::{Command, Frame};
use walkmate_shared::{ChatMessage, ChatRoomId, WireError};

/// Id of the single subscription a channel holds.
pub const SUBSCRIPTION_ID: &str = "sub-0";

pub fn subscribe_frame(room: ChatRoomId) -> Frame {
    Frame::subscribe(SUBSCRIPTION_ID, &room.to_topic())
}

/// Encode a chat event as a STOMP SEND frame to the shared send destination.
pub fn publish_frame(message: &ChatMessage) -> Result<Frame, WireError> {
    Ok(Frame::send_json(CHAT_SEND_DESTINATION, message.to_json()?))
}

/// Extracts the chat event carried by a MESSAGE frame on `room`'s topic.
///
/// Frames for other destinations, or whose body does not belong to `room`,
/// are logged and skipped.
pub fn decode_message_frame(frame: &Frame, room: ChatRoomId) -> Option<ChatMessage> {
    if frame.command != Command::Message {
        return None;
    }

    let destination = frame.get_header("destination").unwrap_or_default();
    if ChatRoomId::from_topic(destination) != Some(room) {
        debug!(destination = %destination, room = %room, "Ignoring frame for another topic");
        return None;
    }

    match ChatMessage::from_json(&frame.body) {
        Ok(msg) if msg.chat_room_id() == room => Some(msg),
        Ok(msg) => {
            warn!(
                room = %room,
                got = %msg.chat_room_id(),
                "Dropping message addressed to another room"
            );
            None
        }
        Err(e) => {
            warn!(room = %room, error = %e, "Failed to decode chat message");
            None
        }
    }
}
