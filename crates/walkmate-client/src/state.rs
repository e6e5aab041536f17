//! Collaborators shared by every mounted walk view.
//!
//! A [`WalkContext`] is built once by the host and cloned into each view;
//! all members are cheap `Arc` handles.

use std::sync::Arc;

use walkmate_net::{Connector, FallbackConnector, LongPollConnector, WebSocketConnector};

use crate::api::{RestClient, WalkApi};
use crate::config::ClientConfig;
use crate::geolocation::PositionSource;
use crate::guard::AccessGuard;
use crate::identity::IdentitySource;

#[derive(Clone)]
pub struct WalkContext {
    /// Marketplace REST backend.
    pub api: Arc<dyn WalkApi>,

    /// The authenticated user. May resolve after the view is mounted.
    pub identity: Arc<dyn IdentitySource>,

    /// Opens broker connections for the chat channel.
    pub connector: Arc<dyn Connector>,

    /// Device positioning, only read on the walker side.
    pub positions: Arc<dyn PositionSource>,

    pub config: ClientConfig,
}

impl WalkContext {
    /// Production wiring: `reqwest` for REST; WebSocket for the broker,
    /// falling back to long-polling when the WebSocket cannot connect.
    pub fn from_config(
        config: ClientConfig,
        identity: Arc<dyn IdentitySource>,
        positions: Arc<dyn PositionSource>,
    ) -> Self {
        let api = RestClient::new(config.api_base_url.clone(), config.access_token.clone());
        let connector = FallbackConnector::new(
            Arc::new(WebSocketConnector::new(config.broker_url.clone())),
            Arc::new(LongPollConnector::new(config.poll_url.clone())),
        );
        Self {
            api: Arc::new(api),
            identity,
            connector: Arc::new(connector),
            positions,
            config,
        }
    }

    pub fn guard(&self) -> AccessGuard {
        AccessGuard::new(
            self.api.clone(),
            self.identity.clone(),
            self.config.guard_retry_interval,
            self.config.guard_max_attempts,
        )
    }
}
