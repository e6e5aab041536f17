//! Walk-session core: access guard, chat room and walk tracking views.
//!
//! Hosts build a [`WalkContext`] once and mount [`ChatRoomView`] or
//! [`TrackingView`] per screen. Views report to the host through
//! [`UiEvent`]s and tear everything down on `unmount` or drop.

pub mod api;
pub mod chat;
pub mod config;
pub mod error;
pub mod events;
pub mod geolocation;
pub mod guard;
pub mod identity;
pub mod path;
pub mod session;
pub mod state;
pub mod sync;
pub mod tracking;

#[cfg(test)]
pub(crate) mod test_support;

use tracing_subscriber::{fmt, EnvFilter};

pub use api::{RestClient, WalkApi};
pub use chat::ChatRoomView;
pub use config::ClientConfig;
pub use error::{ApiError, ClientError, Result};
pub use events::{ui_channel, ChatEntry, MessageAction, Route, UiEvent, UiReceiver, UiSender};
pub use geolocation::{GeolocationError, PositionSource};
pub use guard::{AccessGuard, Grant, GuardRequest, ResourceKind};
pub use identity::{IdentitySource, SharedIdentity};
pub use path::{Bounds, MapSurface, PathRenderer, RenderedPath};
pub use session::{ControlState, Phase, SessionMachine};
pub use state::WalkContext;
pub use sync::LocationSync;
pub use tracking::TrackingView;

/// Install the global `tracing` subscriber. `RUST_LOG` overrides the
/// default filter.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("walkmate_client=debug,walkmate_net=debug,warn"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    tracing::info!("Walk-session core logging initialised");
}
