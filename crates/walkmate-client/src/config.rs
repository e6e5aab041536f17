//! Client configuration loaded from environment variables.
//!
//! Every setting has a default so the client can start with zero
//! configuration against a local backend.

use std::time::Duration;

use walkmate_net::{poll_url_for, ChannelConfig};
use walkmate_shared::constants::{
    DEFAULT_API_BASE_URL, DEFAULT_BROKER_URL, GEOLOCATION_TIMEOUT_SECS, GUARD_MAX_ATTEMPTS,
    GUARD_RETRY_INTERVAL_MS, RECONNECT_DELAY_MS, STOMP_HANDSHAKE_TIMEOUT_SECS, SYNC_INTERVAL_SECS,
};

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// REST API base URL.
    /// Env: `WALKMATE_API_BASE_URL`
    pub api_base_url: String,

    /// STOMP broker WebSocket URL.
    /// Env: `WALKMATE_BROKER_URL`
    pub broker_url: String,

    /// Long-poll endpoint used when the WebSocket cannot connect.
    /// Env: `WALKMATE_POLL_URL`
    /// Default: the broker URL with an `http(s)` scheme.
    pub poll_url: String,

    /// Bearer token for REST calls and the STOMP CONNECT frame.
    /// Env: `WALKMATE_ACCESS_TOKEN`
    /// Default: none (anonymous).
    pub access_token: Option<String>,

    /// Location push/pull cadence.
    /// Env: `WALKMATE_SYNC_INTERVAL_SECS`
    pub sync_interval: Duration,

    /// Channel reconnect delay.
    /// Env: `WALKMATE_RECONNECT_DELAY_MS`
    pub reconnect_delay: Duration,

    /// One-shot geolocation timeout.
    /// Env: `WALKMATE_GEOLOCATION_TIMEOUT_SECS`
    pub geolocation_timeout: Duration,

    /// Interval between access-guard identity checks.
    /// Env: `WALKMATE_GUARD_RETRY_INTERVAL_MS`
    pub guard_retry_interval: Duration,

    /// Identity checks before the guard gives up.
    /// Env: `WALKMATE_GUARD_MAX_ATTEMPTS`
    pub guard_max_attempts: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            broker_url: DEFAULT_BROKER_URL.to_string(),
            poll_url: poll_url_for(DEFAULT_BROKER_URL),
            access_token: None,
            sync_interval: Duration::from_secs(SYNC_INTERVAL_SECS),
            reconnect_delay: Duration::from_millis(RECONNECT_DELAY_MS),
            geolocation_timeout: Duration::from_secs(GEOLOCATION_TIMEOUT_SECS),
            guard_retry_interval: Duration::from_millis(GUARD_RETRY_INTERVAL_MS),
            guard_max_attempts: GUARD_MAX_ATTEMPTS,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup("WALKMATE_API_BASE_URL") {
            config.api_base_url = url.trim_end_matches('/').to_string();
        }

        if let Some(url) = lookup("WALKMATE_BROKER_URL") {
            config.poll_url = poll_url_for(&url);
            config.broker_url = url;
        }

        if let Some(url) = lookup("WALKMATE_POLL_URL") {
            config.poll_url = url;
        }

        if let Some(token) = lookup("WALKMATE_ACCESS_TOKEN") {
            if !token.is_empty() {
                config.access_token = Some(token);
            }
        }

        if let Some(secs) = parse_positive(&lookup, "WALKMATE_SYNC_INTERVAL_SECS") {
            config.sync_interval = Duration::from_secs(secs);
        }

        if let Some(ms) = parse_positive(&lookup, "WALKMATE_RECONNECT_DELAY_MS") {
            config.reconnect_delay = Duration::from_millis(ms);
        }

        if let Some(secs) = parse_positive(&lookup, "WALKMATE_GEOLOCATION_TIMEOUT_SECS") {
            config.geolocation_timeout = Duration::from_secs(secs);
        }

        if let Some(ms) = parse_positive(&lookup, "WALKMATE_GUARD_RETRY_INTERVAL_MS") {
            config.guard_retry_interval = Duration::from_millis(ms);
        }

        if let Some(n) = parse_positive(&lookup, "WALKMATE_GUARD_MAX_ATTEMPTS") {
            config.guard_max_attempts = u32::try_from(n).unwrap_or(u32::MAX);
        }

        config
    }

    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            access_token: self.access_token.clone(),
            reconnect_delay: self.reconnect_delay,
            handshake_timeout: Duration::from_secs(STOMP_HANDSHAKE_TIMEOUT_SECS),
        }
    }
}

fn parse_positive(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<u64> {
    let raw = lookup(key)?;
    match raw.trim().parse::<u64>() {
        Ok(n) if n > 0 => Some(n),
        _ => {
            tracing::warn!(key, value = %raw, "Invalid value, using default");
            None
        }
    }
}
