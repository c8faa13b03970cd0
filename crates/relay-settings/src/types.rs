//! Settings type definitions.
//!
//! Field names are camelCase in `settings.json`. Every section is
//! `#[serde(default)]`, so a partial file only overrides what it names.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root settings type.
///
/// ```json
/// {
///   "server": { "port": 7000 },
///   "broker": { "logCapacity": 5000 },
///   "logging": { "json": true }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    pub server: ServerSettings,
    pub broker: BrokerSettings,
    pub logging: LoggingSettings,
    pub hook: HookSettings,
}

/// HTTP listener and request-level timeouts.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    pub port: u16,
    /// Decision wait when the request names no timeout.
    pub permission_timeout_ms: u64,
    /// Response poll wait when the request names no timeout.
    pub response_timeout_ms: u64,
    /// Upper bound for any caller-supplied timeout.
    pub max_timeout_ms: u64,
    /// Interval between WebSocket pings.
    pub ws_ping_interval_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6567,
            permission_timeout_ms: 30_000,
            response_timeout_ms: 100,
            max_timeout_ms: 600_000,
            ws_ping_interval_ms: 30_000,
        }
    }
}

impl ServerSettings {
    /// `host:port` for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn permission_timeout(&self) -> Duration {
        Duration::from_millis(self.permission_timeout_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn max_timeout(&self) -> Duration {
        Duration::from_millis(self.max_timeout_ms)
    }
}

/// Sizing of the in-memory broker.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct BrokerSettings {
    /// Events retained before the oldest is evicted.
    pub log_capacity: usize,
    /// Notifications buffered per observer before it starts lagging.
    pub notification_buffer: usize,
    /// Events sent to a new observer in its snapshot.
    pub snapshot_events: usize,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            log_capacity: 1000,
            notification_buffer: 256,
            snapshot_events: 100,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive; `RUST_LOG` takes precedence.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Agent-side hook client.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct HookSettings {
    /// Base URL of the relay server.
    pub bridge_url: String,
    /// How long the hook waits for a permission decision.
    pub permission_timeout_ms: u64,
    /// Timeout for posting an event.
    pub post_timeout_ms: u64,
    /// Server-side wait when polling for a response.
    pub response_poll_ms: u64,
    /// Client-side timeout for the response poll request.
    pub response_request_timeout_ms: u64,
}

impl Default for HookSettings {
    fn default() -> Self {
        Self {
            bridge_url: "http://localhost:6567".to_string(),
            permission_timeout_ms: 30_000,
            post_timeout_ms: 2_000,
            response_poll_ms: 100,
            response_request_timeout_ms: 1_000,
        }
    }
}
