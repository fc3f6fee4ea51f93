//! Session configuration.

use std::time::Duration;

use crate::clock::{DEFAULT_SMOOTHING_STEPS, DEFAULT_SMOOTHING_WINDOW};
use crate::error::{Result, SessionError};
use crate::error_codes::ErrorCode;
use crate::queue::DEFAULT_PENDING_QUEUE_CAPACITY;
use crate::reconnect::{DEFAULT_MAX_ATTEMPTS, DEFAULT_RECONNECT_DELAY};

/// Gateway used when neither a gateway URL nor a proxy is configured.
pub const DEFAULT_GATEWAY_URL: &str = "wss://mppclone.com:8443";

/// Display name used by [`SessionConfig::from_env`] when none is set.
pub const DEFAULT_USERNAME: &str = "Anonymous";

/// Room used by [`SessionConfig::from_env`] when none is set.
pub const DEFAULT_ROOM: &str = "lobby";

/// Default capacity of the bounded event channel.
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default interval between heartbeats.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(20);

/// Interval used for the keep-alive ticker when it is enabled without an
/// explicit value.
pub const DEFAULT_KEEP_ALIVE_INTERVAL: Duration = Duration::from_millis(200);

/// Default timeout for the graceful shutdown.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Configuration for a [`RoomClient`](crate::RoomClient).
///
/// # Example
///
/// ```
/// use piano_room_client::SessionConfig;
/// use std::time::Duration;
///
/// let config = SessionConfig::new("Alice", "lobby")
///     .with_auth_token("secret")
///     .with_reconnect_delay(Duration::from_secs(2));
/// assert_eq!(config.username, "Alice");
/// assert_eq!(config.max_reconnect_attempts, 3);
/// ```
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Display name sent during the handshake.
    pub username: String,
    /// Room joined during the handshake.
    pub room: String,
    /// Token sent with the handshake, if the server requires one.
    pub auth_token: Option<String>,
    /// Gateway URL (`ws://` or `wss://`).
    pub gateway_url: String,
    /// Proxy endpoint; when set it is used instead of `gateway_url`.
    pub proxy_endpoint: Option<String>,
    /// Interval between heartbeats. Defaults to **20 seconds**.
    pub heartbeat_interval: Duration,
    /// Interval of the keep-alive ticker that reports the cursor position.
    /// Disabled (`None`) by default.
    pub keep_alive_interval: Option<Duration>,
    /// Reconnection attempts before giving up. Defaults to **3**.
    pub max_reconnect_attempts: u32,
    /// Delay between reconnection attempts. Defaults to **5 seconds**.
    pub reconnect_delay: Duration,
    /// Sub-ticks per clock smoothing run. Defaults to **50**, minimum 1.
    pub clock_smoothing_steps: u32,
    /// Duration of a clock smoothing run. Defaults to **1 second**.
    pub clock_smoothing_window: Duration,
    /// Capacity of the bounded event channel.
    ///
    /// When the consumer falls behind, events are dropped with a warning
    /// instead of stalling the session. `Disconnected` and `Terminated` are
    /// always delivered. Defaults to **256**, minimum 1.
    pub event_channel_capacity: usize,
    /// Bound on traffic held until ready. Defaults to **1024**, minimum 1.
    pub pending_queue_capacity: usize,
    /// Time [`RoomClient::destroy`](crate::RoomClient::destroy) waits for the
    /// session task before aborting it. Defaults to **1 second**.
    pub shutdown_timeout: Duration,
}

impl SessionConfig {
    /// Create a configuration with the given identity and default tuning.
    pub fn new(username: impl Into<String>, room: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            room: room.into(),
            auth_token: None,
            gateway_url: DEFAULT_GATEWAY_URL.to_string(),
            proxy_endpoint: None,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            keep_alive_interval: None,
            max_reconnect_attempts: DEFAULT_MAX_ATTEMPTS,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            clock_smoothing_steps: DEFAULT_SMOOTHING_STEPS,
            clock_smoothing_window: DEFAULT_SMOOTHING_WINDOW,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            pending_queue_capacity: DEFAULT_PENDING_QUEUE_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// Build a configuration from the environment.
    ///
    /// | Variable            | Field            |
    /// |---------------------|------------------|
    /// | `PIANO_USERNAME`    | `username`       |
    /// | `PIANO_ROOM`        | `room`           |
    /// | `PIANO_TOKEN`       | `auth_token`     |
    /// | `PIANO_GATEWAY_URL` | `gateway_url`    |
    /// | `PIANO_PROXY`       | `proxy_endpoint` |
    ///
    /// Unset or empty variables keep their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut config = Self::new(
            get("PIANO_USERNAME").unwrap_or_else(|| DEFAULT_USERNAME.to_string()),
            get("PIANO_ROOM").unwrap_or_else(|| DEFAULT_ROOM.to_string()),
        );
        config.auth_token = get("PIANO_TOKEN");
        if let Some(url) = get("PIANO_GATEWAY_URL") {
            config.gateway_url = url;
        }
        config.proxy_endpoint = get("PIANO_PROXY");
        config
    }

    #[must_use]
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    #[must_use]
    pub fn with_gateway_url(mut self, url: impl Into<String>) -> Self {
        self.gateway_url = url.into();
        self
    }

    #[must_use]
    pub fn with_proxy_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.proxy_endpoint = Some(endpoint.into());
        self
    }

    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Enable the keep-alive ticker.
    #[must_use]
    pub fn with_keep_alive_interval(mut self, interval: Duration) -> Self {
        self.keep_alive_interval = Some(interval);
        self
    }

    #[must_use]
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Set the smoothing run shape. `steps` below 1 are clamped to 1.
    #[must_use]
    pub fn with_clock_smoothing(mut self, steps: u32, window: Duration) -> Self {
        self.clock_smoothing_steps = steps.max(1);
        self.clock_smoothing_window = window;
        self
    }

    /// Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    /// Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_pending_queue_capacity(mut self, capacity: usize) -> Self {
        self.pending_queue_capacity = capacity.max(1);
        self
    }

    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// The endpoint to open: the proxy when configured, else the gateway.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidArgument`] unless the endpoint is a
    /// non-empty `ws://` or `wss://` URL.
    pub fn resolve_endpoint(&self) -> Result<String> {
        let endpoint = self
            .proxy_endpoint
            .as_deref()
            .unwrap_or(&self.gateway_url)
            .trim();

        let has_host = endpoint
            .strip_prefix("wss://")
            .or_else(|| endpoint.strip_prefix("ws://"))
            .is_some_and(|rest| !rest.is_empty());

        if has_host {
            Ok(endpoint.to_string())
        } else {
            Err(SessionError::invalid_argument(ErrorCode::GatewayUnresolved))
        }
    }
}
