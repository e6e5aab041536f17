use serde::{Deserialize, Serialize};

use crate::constants::{CHAT_TOPIC_PREFIX, FALLBACK_LATITUDE, FALLBACK_LONGITUDE};

// Marketplace user id as issued by the backend
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A trade board (job posting).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct BoardId(pub i64);

impl std::fmt::Display for BoardId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct ChatRoomId(pub i64);

impl ChatRoomId {
    /// Broadcast topic both participants of this room subscribe to.
    pub fn to_topic(&self) -> String {
        format!("{CHAT_TOPIC_PREFIX}{}", self.0)
    }

    /// Inverse of [`ChatRoomId::to_topic`].
    pub fn from_topic(topic: &str) -> Option<Self> {
        topic
            .strip_prefix(CHAT_TOPIC_PREFIX)
            .and_then(|id| id.parse().ok())
            .map(Self)
    }
}

impl std::fmt::Display for ChatRoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which side of the walk the local user is on.
///
/// Derived once from the board owner and never stored server-side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Posted the job; observes the walker's path.
    Owner,
    /// Hired to walk; drives the session and pushes samples.
    Walker,
}

impl Role {
    pub fn derive(caller: UserId, board_owner: UserId) -> Self {
        if caller == board_owner {
            Self::Owner
        } else {
            Self::Walker
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub const FALLBACK: Coordinate = Coordinate {
        latitude: FALLBACK_LATITUDE,
        longitude: FALLBACK_LONGITUDE,
    };

    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}
