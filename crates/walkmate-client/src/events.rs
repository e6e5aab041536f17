//! Events the walk views send to the host UI.

use std::fmt;

use tokio::sync::mpsc;

use walkmate_shared::{BoardId, ChatMessage, ChatRoomId, MessageType, UserId};

use crate::path::RenderedPath;
use crate::session::{ControlState, Phase};

/// Destinations the views ask the host to navigate to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Board detail page; safe fallback for trade resources.
    Board(BoardId),
    /// List of the user's chat rooms; safe fallback for chat resources.
    ChatList,
    ChatRoom {
        board_id: BoardId,
        chat_room_id: ChatRoomId,
    },
    Tracking {
        board_id: BoardId,
        chat_room_id: ChatRoomId,
    },
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::Board(board) => write!(f, "/trade/{board}"),
            Route::ChatList => f.write_str("/chat"),
            Route::ChatRoom {
                board_id,
                chat_room_id,
            } => write!(f, "/trade/{board_id}/chat/{chat_room_id}"),
            Route::Tracking {
                board_id,
                chat_room_id,
            } => write!(f, "/trade/{board_id}/chat/{chat_room_id}/walk"),
        }
    }
}

/// Follow-up a chat message offers to the user viewing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageAction {
    /// The walk is being tracked; open the map.
    ViewMap,
    /// The walk is over; rate the walker.
    LeaveReview,
}

impl MessageAction {
    /// Only the participant on the other side of a LOCATION or REVIEW event
    /// is offered an action.
    pub fn for_viewer(message: &ChatMessage, viewer: UserId) -> Option<Self> {
        if message.write_user_id() == viewer {
            return None;
        }
        match message.kind() {
            MessageType::Location => Some(Self::ViewMap),
            MessageType::Review => Some(Self::LeaveReview),
            MessageType::Text | MessageType::Image => None,
        }
    }
}

/// A chat message together with the follow-up it offers the viewer.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatEntry {
    pub message: ChatMessage,
    pub action: Option<MessageAction>,
}

impl ChatEntry {
    pub fn for_viewer(message: ChatMessage, viewer: UserId) -> Self {
        let action = MessageAction::for_viewer(&message, viewer);
        Self { message, action }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    /// Chat history fetched on mount, oldest first.
    HistoryLoaded(Vec<ChatEntry>),
    MessageAppended {
        message: ChatMessage,
        action: Option<MessageAction>,
    },
    ConnectionChanged {
        connected: bool,
    },
    PhaseChanged(Phase),
    ControlChanged(ControlState),
    PathRendered(RenderedPath),
    Navigate(Route),
    /// Authorization failed; the view did not mount.
    Redirect(Route),
}

pub type UiSender = mpsc::UnboundedSender<UiEvent>;
pub type UiReceiver = mpsc::UnboundedReceiver<UiEvent>;

pub fn ui_channel() -> (UiSender, UiReceiver) {
    mpsc::unbounded_channel()
}

pub fn emit_event(ui: &UiSender, event: UiEvent) {
    if let Err(e) = ui.send(event) {
        tracing::warn!(event = ?e.0, "UI receiver gone, dropping event");
    }
}
