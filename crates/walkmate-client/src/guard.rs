//! Participant check run before any walk view mounts.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use walkmate_shared::{BoardId, ChatRoomId, ChatRoomParticipants, UserId};

use crate::api::WalkApi;
use crate::error::{ClientError, Result};
use crate::events::Route;
use crate::identity::IdentitySource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// Trade pages: the board and its walk tracking view.
    Trade,
    Chat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardRequest {
    pub kind: ResourceKind,
    pub board_id: BoardId,
    /// `None` for trade pages not yet tied to a chat room; only the board
    /// owner may open those.
    pub chat_room_id: Option<ChatRoomId>,
}

impl GuardRequest {
    pub fn trade(board_id: BoardId, chat_room_id: Option<ChatRoomId>) -> Self {
        Self {
            kind: ResourceKind::Trade,
            board_id,
            chat_room_id,
        }
    }

    pub fn chat(board_id: BoardId, chat_room_id: ChatRoomId) -> Self {
        Self {
            kind: ResourceKind::Chat,
            board_id,
            chat_room_id: Some(chat_room_id),
        }
    }

    /// Where to send a caller who fails the check.
    pub fn fallback(&self) -> Route {
        match self.kind {
            ResourceKind::Trade => Route::Board(self.board_id),
            ResourceKind::Chat => Route::ChatList,
        }
    }
}

/// Proof that `caller` passed the guard for one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grant {
    pub caller: UserId,
    pub board_id: BoardId,
    pub chat_room_id: Option<ChatRoomId>,
    /// Present when the check went through a chat room.
    pub participants: Option<ChatRoomParticipants>,
}

#[derive(Clone)]
pub struct AccessGuard {
    api: Arc<dyn WalkApi>,
    identity: Arc<dyn IdentitySource>,
    retry_interval: Duration,
    max_attempts: u32,
}

impl AccessGuard {
    pub fn new(
        api: Arc<dyn WalkApi>,
        identity: Arc<dyn IdentitySource>,
        retry_interval: Duration,
        max_attempts: u32,
    ) -> Self {
        Self {
            api,
            identity,
            retry_interval,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Fails closed: an unresolved identity or a backend error is treated
    /// the same as a non-participant.
    pub async fn authorize(&self, request: GuardRequest) -> Result<Grant> {
        let deny = || ClientError::Unauthorized {
            redirect: request.fallback(),
        };

        let Some(caller) = self.resolve_identity().await else {
            warn!(
                board = %request.board_id,
                attempts = self.max_attempts,
                "Identity never resolved, denying access"
            );
            return Err(deny());
        };

        let grant = match request.chat_room_id {
            Some(room) => {
                let participants = match self.api.chat_room_participants(request.board_id, room).await {
                    Ok(p) => p,
                    Err(e) => {
                        warn!(board = %request.board_id, room = %room, error = %e, "Participant lookup failed");
                        return Err(deny());
                    }
                };
                if !participants.contains(caller) {
                    warn!(caller = %caller, board = %request.board_id, room = %room, "Caller is not a participant");
                    return Err(deny());
                }
                Grant {
                    caller,
                    board_id: request.board_id,
                    chat_room_id: Some(room),
                    participants: Some(participants),
                }
            }
            None => {
                let board = match self.api.board_summary(request.board_id).await {
                    Ok(b) => b,
                    Err(e) => {
                        warn!(board = %request.board_id, error = %e, "Board lookup failed");
                        return Err(deny());
                    }
                };
                if board.write_user_id != caller {
                    warn!(caller = %caller, board = %request.board_id, "Caller does not own the board");
                    return Err(deny());
                }
                Grant {
                    caller,
                    board_id: request.board_id,
                    chat_room_id: None,
                    participants: None,
                }
            }
        };

        info!(caller = %caller, board = %request.board_id, kind = ?request.kind, "Access granted");
        Ok(grant)
    }

    async fn resolve_identity(&self) -> Option<UserId> {
        for attempt in 1..=self.max_attempts {
            if let Some(user) = self.identity.current_user() {
                return Some(user);
            }
            debug!(attempt, "Identity not resolved yet");
            if attempt < self.max_attempts {
                tokio::time::sleep(self.retry_interval).await;
            }
        }
        None
    }
}
