//! Chat room view: history on mount, then live messages from the channel.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use walkmate_net::{spawn_channel, ChannelHandle, ChannelNotification, ConnectionState, NetError};
use walkmate_shared::{BoardId, ChatMessage, ChatRoomId, MessageType, UserId};

use crate::error::{ClientError, Result};
use crate::events::{emit_event, ChatEntry, MessageAction, Route, UiEvent, UiSender};
use crate::guard::GuardRequest;
use crate::state::WalkContext;

pub struct ChatRoomView {
    board_id: BoardId,
    room: ChatRoomId,
    viewer: UserId,
    channel: ChannelHandle,
    messages: Arc<Mutex<Vec<ChatMessage>>>,
    ui: UiSender,
    pump: Option<JoinHandle<()>>,
}

impl ChatRoomView {
    /// Authorize, load history and open the room's channel.
    ///
    /// A caller who is not a participant gets a [`UiEvent::Redirect`] and
    /// `ClientError::Unauthorized`; nothing else is started.
    pub async fn mount(
        ctx: &WalkContext,
        board_id: BoardId,
        room: ChatRoomId,
        ui: UiSender,
    ) -> Result<Self> {
        let grant = match ctx.guard().authorize(GuardRequest::chat(board_id, room)).await {
            Ok(grant) => grant,
            Err(ClientError::Unauthorized { redirect }) => {
                emit_event(&ui, UiEvent::Redirect(redirect));
                return Err(ClientError::Unauthorized { redirect });
            }
            Err(e) => return Err(e),
        };

        let mut history = match ctx.api.chat_history(board_id, room).await {
            Ok(history) => history,
            Err(e) => {
                warn!(room = %room, error = %e, "Failed to load chat history");
                Vec::new()
            }
        };
        // server sends newest first
        history.reverse();
        debug!(room = %room, count = history.len(), "Chat history loaded");
        let entries = history
            .iter()
            .cloned()
            .map(|message| ChatEntry::for_viewer(message, grant.caller))
            .collect();
        emit_event(&ui, UiEvent::HistoryLoaded(entries));

        let (channel, notifications) =
            spawn_channel(ctx.connector.clone(), room, ctx.config.channel_config());
        let messages = Arc::new(Mutex::new(history));
        let pump = tokio::spawn(pump_notifications(
            notifications,
            messages.clone(),
            grant.caller,
            ui.clone(),
        ));

        info!(room = %room, viewer = %grant.caller, "Chat room mounted");
        Ok(Self {
            board_id,
            room,
            viewer: grant.caller,
            channel,
            messages,
            ui,
            pump: Some(pump),
        })
    }

    pub fn board_id(&self) -> BoardId {
        self.board_id
    }

    pub fn room(&self) -> ChatRoomId {
        self.room
    }

    pub fn viewer(&self) -> UserId {
        self.viewer
    }

    /// History followed by live messages, in receive order.
    pub fn messages(&self) -> Result<Vec<ChatMessage>> {
        self.messages
            .lock()
            .map(|m| m.clone())
            .map_err(|e| ClientError::LockPoisoned(e.to_string()))
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_connected()
    }

    /// Resolves once the channel has subscribed to the room topic.
    pub async fn wait_connected(&self) -> Result<()> {
        let mut state = self.channel.watch_state();
        state
            .wait_for(|s| *s == ConnectionState::Connected)
            .await
            .map_err(|_| ClientError::TransportUnavailable(NetError::ChannelClosed))?;
        Ok(())
    }

    pub fn send_text(&self, text: &str) -> Result<()> {
        self.send(MessageType::Text, text)
    }

    /// `url` points at an already uploaded image.
    pub fn send_image(&self, url: &str) -> Result<()> {
        self.send(MessageType::Image, url)
    }

    /// Publish a chat message. Session events (LOCATION, REVIEW) are only
    /// published by the tracking view.
    pub fn send(&self, kind: MessageType, body: &str) -> Result<()> {
        if !matches!(kind, MessageType::Text | MessageType::Image) {
            return Err(ClientError::UnsupportedMessageType);
        }
        let message = ChatMessage::new(self.room, kind, body, self.viewer);
        self.channel.publish(message)?;
        Ok(())
    }

    /// Follow a [`MessageAction::ViewMap`] offer to the walk tracking view.
    pub fn open_map(&self) {
        emit_event(
            &self.ui,
            UiEvent::Navigate(Route::Tracking {
                board_id: self.board_id,
                chat_room_id: self.room,
            }),
        );
    }

    /// Close the channel. Safe to call repeatedly.
    pub fn unmount(&mut self) {
        if let Some(pump) = self.pump.take() {
            self.channel.deactivate();
            pump.abort();
            info!(room = %self.room, "Chat room unmounted");
        }
    }
}

impl Drop for ChatRoomView {
    fn drop(&mut self) {
        self.unmount();
    }
}

async fn pump_notifications(
    mut notifications: mpsc::Receiver<ChannelNotification>,
    messages: Arc<Mutex<Vec<ChatMessage>>>,
    viewer: UserId,
    ui: UiSender,
) {
    while let Some(notification) = notifications.recv().await {
        match notification {
            ChannelNotification::MessageReceived(message) => {
                match messages.lock() {
                    Ok(mut list) => list.push(message.clone()),
                    Err(e) => warn!(error = %e, "Message list lock poisoned"),
                }
                let action = MessageAction::for_viewer(&message, viewer);
                emit_event(&ui, UiEvent::MessageAppended { message, action });
            }
            ChannelNotification::Connected => {
                emit_event(&ui, UiEvent::ConnectionChanged { connected: true });
            }
            ChannelNotification::Disconnected { reason } => {
                debug!(reason = %reason, "Chat channel down");
                emit_event(&ui, UiEvent::ConnectionChanged { connected: false });
            }
        }
    }
}
