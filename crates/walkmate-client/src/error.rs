use thiserror::Error;

use walkmate_net::NetError;

use crate::events::Route;
use crate::geolocation::GeolocationError;

/// Errors from the REST backend.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Server responded {status} for {path}")]
    Status { status: u16, path: String },
}

#[derive(Error, Debug)]
pub enum ClientError {
    /// The caller is not one of the two participants. The view must not
    /// render and the host must navigate to `redirect`.
    #[error("Not a participant of this session, redirecting to {redirect}")]
    Unauthorized { redirect: Route },

    #[error("Realtime transport unavailable: {0}")]
    TransportUnavailable(#[from] NetError),

    #[error("Geolocation unavailable: {0}")]
    GeolocationUnavailable(#[from] GeolocationError),

    #[error("Location sync request failed: {0}")]
    SyncRequestFailed(ApiError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Only text and image messages can be sent from the chat view")]
    UnsupportedMessageType,

    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;
