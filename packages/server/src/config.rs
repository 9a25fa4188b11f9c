//! Server configuration.

use std::time::Duration;

use hiroba_shared::{Transport, protocol::DEFAULT_PORT};

/// Default name of the room served by an instance.
pub const DEFAULT_ROOM_NAME: &str = "Hiroba Room";

/// Default idle window after which a silent UDP client is evicted.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Settings of one server instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host address to bind to (e.g., "0.0.0.0")
    pub host: String,
    /// Port to bind to; `0` picks a free port
    pub port: u16,
    /// Human-readable name of the single room
    pub room_name: String,
    pub transport: Transport,
    /// UDP only: evict clients silent for longer than this, `None` disables
    pub idle_timeout: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            room_name: DEFAULT_ROOM_NAME.to_string(),
            transport: Transport::Tcp,
            idle_timeout: Some(DEFAULT_IDLE_TIMEOUT),
        }
    }
}

impl ServerConfig {
    /// Configuration listening on `127.0.0.1` with an OS-assigned port.
    pub fn local(transport: Transport, room_name: impl Into<String>) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            room_name: room_name.into(),
            transport,
            ..Self::default()
        }
    }

    /// Interval of the idle sweep: half the idle window.
    pub fn sweep_period(&self) -> Option<Duration> {
        self.idle_timeout
            .filter(|idle| !idle.is_zero())
            .map(|idle| (idle / 2).max(Duration::from_millis(10)))
    }
}
