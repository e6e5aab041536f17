//! REST calls the walk core makes against the marketplace backend.

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::debug;

use walkmate_shared::{
    BoardId, BoardSummary, ChatMessage, ChatRoomId, ChatRoomParticipants, Coordinate, LocationPush,
    LocationSample,
};

use crate::error::ApiError;

/// The backend surface used by the guard, the sync engine and the chat view.
#[async_trait]
pub trait WalkApi: Send + Sync + 'static {
    /// `GET /trade/{boardId}/chat-rooms/{chatRoomId}`
    async fn chat_room_participants(
        &self,
        board: BoardId,
        room: ChatRoomId,
    ) -> Result<ChatRoomParticipants, ApiError>;

    /// `GET /trade/{boardId}`
    async fn board_summary(&self, board: BoardId) -> Result<BoardSummary, ApiError>;

    /// `POST /trade/{boardId}/chat-rooms/{chatRoomId}/locations`
    async fn push_location(
        &self,
        board: BoardId,
        room: ChatRoomId,
        position: Coordinate,
    ) -> Result<(), ApiError>;

    /// `GET /trade/{boardId}/chat-rooms/{chatRoomId}/locations`, oldest first.
    async fn fetch_locations(
        &self,
        board: BoardId,
        room: ChatRoomId,
    ) -> Result<Vec<LocationSample>, ApiError>;

    /// `GET /trade/{postId}/chat-rooms/{roomId}/messages`, in server order
    /// (newest first).
    async fn chat_history(
        &self,
        board: BoardId,
        room: ChatRoomId,
    ) -> Result<Vec<ChatMessage>, ApiError>;
}

pub mod paths {
    use walkmate_shared::{BoardId, ChatRoomId};

    pub fn board(board: BoardId) -> String {
        format!("/trade/{board}")
    }

    pub fn chat_room(board: BoardId, room: ChatRoomId) -> String {
        format!("/trade/{board}/chat-rooms/{room}")
    }

    pub fn locations(board: BoardId, room: ChatRoomId) -> String {
        format!("/trade/{board}/chat-rooms/{room}/locations")
    }

    pub fn messages(board: BoardId, room: ChatRoomId) -> String {
        format!("/trade/{board}/chat-rooms/{room}/messages")
    }
}

/// `reqwest`-backed [`WalkApi`].
#[derive(Debug, Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
    access_token: Option<String>,
}

impl RestClient {
    pub fn new(base_url: impl Into<String>, access_token: Option<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, access_token)
    }

    pub fn with_client(
        http: reqwest::Client,
        base_url: impl Into<String>,
        access_token: Option<String>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http,
            base_url,
            access_token,
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, format!("{}{}", self.base_url, path));
        match &self.access_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder, path: &str) -> Result<Response, ApiError> {
        let resp = builder.send().await?;
        let status = resp.status();
        debug!(path, status = status.as_u16(), "API response");
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                path: path.to_string(),
            });
        }
        Ok(resp)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let resp = self.send(self.request(Method::GET, path), path).await?;
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl WalkApi for RestClient {
    async fn chat_room_participants(
        &self,
        board: BoardId,
        room: ChatRoomId,
    ) -> Result<ChatRoomParticipants, ApiError> {
        self.get_json(&paths::chat_room(board, room)).await
    }

    async fn board_summary(&self, board: BoardId) -> Result<BoardSummary, ApiError> {
        self.get_json(&paths::board(board)).await
    }

    async fn push_location(
        &self,
        board: BoardId,
        room: ChatRoomId,
        position: Coordinate,
    ) -> Result<(), ApiError> {
        let path = paths::locations(board, room);
        let body = LocationPush::from(position);
        self.send(self.request(Method::POST, &path).json(&body), &path)
            .await?;
        Ok(())
    }

    async fn fetch_locations(
        &self,
        board: BoardId,
        room: ChatRoomId,
    ) -> Result<Vec<LocationSample>, ApiError> {
        self.get_json(&paths::locations(board, room)).await
    }

    async fn chat_history(
        &self,
        board: BoardId,
        room: ChatRoomId,
    ) -> Result<Vec<ChatMessage>, ApiError> {
        self.get_json(&paths::messages(board, room)).await
    }
}
