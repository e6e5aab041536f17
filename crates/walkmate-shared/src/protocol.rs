use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::WireError;
use crate::types::{ChatRoomId, Coordinate, UserId};

/// What a chat event means to the receiving view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    /// Plain text, rendered inline
    Text,
    /// Image URL, rendered inline
    Image,
    /// Tracking is available; the peer may open the map
    Location,
    /// The walk has ended; the peer is prompted for a rating
    Review,
}

/// A chat event published on a room's topic.
///
/// Fields are private: a message is immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    chat_room_id: ChatRoomId,
    #[serde(rename = "type")]
    kind: MessageType,
    message: String,
    write_user_id: UserId,
    #[serde(with = "flexible_timestamp")]
    created_at: DateTime<Utc>,
}

impl ChatMessage {
    /// Build a message stamped with the current time.
    pub fn new(
        chat_room_id: ChatRoomId,
        kind: MessageType,
        message: impl Into<String>,
        write_user_id: UserId,
    ) -> Self {
        Self::with_timestamp(chat_room_id, kind, message, write_user_id, Utc::now())
    }

    pub fn with_timestamp(
        chat_room_id: ChatRoomId,
        kind: MessageType,
        message: impl Into<String>,
        write_user_id: UserId,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            chat_room_id,
            kind,
            message: message.into(),
            write_user_id,
            created_at,
        }
    }

    pub fn chat_room_id(&self) -> ChatRoomId {
        self.chat_room_id
    }

    pub fn kind(&self) -> MessageType {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn write_user_id(&self) -> UserId {
        self.write_user_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// JSON body for a STOMP SEND frame.
    pub fn to_json(&self) -> Result<String, WireError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(body: &str) -> Result<Self, WireError> {
        Ok(serde_json::from_str(body)?)
    }
}

/// One observation of the walker's position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationSample {
    pub chat_room_id: ChatRoomId,
    #[serde(deserialize_with = "number_or_string::deserialize")]
    pub latitude: f64,
    #[serde(deserialize_with = "number_or_string::deserialize")]
    pub longitude: f64,
    #[serde(with = "flexible_timestamp")]
    pub created_at: DateTime<Utc>,
}

impl LocationSample {
    pub fn new(chat_room_id: ChatRoomId, position: Coordinate, created_at: DateTime<Utc>) -> Self {
        Self {
            chat_room_id,
            latitude: position.latitude,
            longitude: position.longitude,
            created_at,
        }
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }
}

/// Request body of `POST .../locations`. The backend expects strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationPush {
    pub latitude: String,
    pub longitude: String,
}

impl From<Coordinate> for LocationPush {
    fn from(c: Coordinate) -> Self {
        Self {
            latitude: c.latitude.to_string(),
            longitude: c.longitude.to_string(),
        }
    }
}

/// The two registered parties of a chat room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRoomParticipants {
    /// Author of the board (job poster)
    pub write_user_id: UserId,
    /// User who asked to take the job
    pub request_user_id: UserId,
}

impl ChatRoomParticipants {
    pub fn contains(&self, user: UserId) -> bool {
        user == self.write_user_id || user == self.request_user_id
    }

    /// The participant that is not `user`, if `user` is one of the two.
    pub fn peer_of(&self, user: UserId) -> Option<UserId> {
        if user == self.write_user_id {
            Some(self.request_user_id)
        } else if user == self.request_user_id {
            Some(self.write_user_id)
        } else {
            None
        }
    }
}

/// The subset of `GET /trade/{boardId}` the walk core reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardSummary {
    pub write_user_id: UserId,
}

/// Accepts RFC 3339 as well as zone-less ISO-8601 local date-times (read as UTC).
pub mod flexible_timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&ts.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| de::Error::custom(format!("invalid timestamp: {raw}")))
    }

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return Some(ts.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }
}

mod number_or_string {
    use serde::{de, Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(n),
            Raw::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| de::Error::custom(format!("invalid coordinate: {s}"))),
        }
    }
}
