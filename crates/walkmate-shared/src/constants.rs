/// Interval between location pushes (WALKER) or pulls (OWNER), in seconds
pub const SYNC_INTERVAL_SECS: u64 = 10;

/// One-shot device geolocation timeout in seconds
pub const GEOLOCATION_TIMEOUT_SECS: u64 = 10;

/// Delay before the channel reconnects after losing the broker, in milliseconds
pub const RECONNECT_DELAY_MS: u64 = 5_000;

/// How long to wait for the broker's CONNECTED frame, in seconds
pub const STOMP_HANDSHAKE_TIMEOUT_SECS: u64 = 10;

/// STOMP protocol version negotiated with the broker
pub const STOMP_VERSION: &str = "1.2";

/// Broker destination every participant publishes to
pub const CHAT_SEND_DESTINATION: &str = "/app/chat/send";

/// Prefix of the per-room broadcast topic
pub const CHAT_TOPIC_PREFIX: &str = "/topic/chat/";

/// Position substituted when the device cannot provide one (Seoul City Hall)
pub const FALLBACK_LATITUDE: f64 = 37.5665;
pub const FALLBACK_LONGITUDE: f64 = 126.9780;

/// Prompt published as a REVIEW message when the walker ends the walk
pub const REVIEW_PROMPT: &str = "The walk has ended. Please leave a review for your walker!";

/// Body of the LOCATION message published when the walker starts the walk
pub const LOCATION_START_NOTICE: &str = "The walk has started. Tap to follow it on the map.";

/// Access guard identity re-check interval in milliseconds
pub const GUARD_RETRY_INTERVAL_MS: u64 = 300;

/// Access guard identity re-check cap
pub const GUARD_MAX_ATTEMPTS: u32 = 10;

/// Default REST API base URL (local development)
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8080";

/// Default STOMP-over-WebSocket broker URL (local development)
pub const DEFAULT_BROKER_URL: &str = "ws://localhost:8080/ws";
