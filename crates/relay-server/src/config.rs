//! Server configuration.

use std::time::Duration;

use relay_core::BrokerConfig;
use relay_settings::RelaySettings;

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Bind address.
    pub host: String,
    /// Port to listen on. 0 picks a free port.
    pub port: u16,
    /// Decision wait when the request names none.
    pub permission_timeout: Duration,
    /// Response poll wait when the request names none.
    pub response_timeout: Duration,
    /// Ceiling for caller-supplied timeouts.
    pub max_timeout: Duration,
    /// WebSocket ping interval.
    pub ws_ping_interval: Duration,
    /// Events returned by the message listing when no limit is given.
    pub default_list_limit: usize,
    /// Request body ceiling for event ingestion.
    pub max_body_bytes: usize,
    pub broker: BrokerConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            permission_timeout: Duration::from_secs(30),
            response_timeout: Duration::from_millis(100),
            max_timeout: Duration::from_secs(600),
            ws_ping_interval: Duration::from_secs(30),
            default_list_limit: 100,
            max_body_bytes: 10 * 1024 * 1024,
            broker: BrokerConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_settings(settings: &RelaySettings) -> Self {
        let server = &settings.server;
        Self {
            host: server.host.clone(),
            port: server.port,
            permission_timeout: server.permission_timeout(),
            response_timeout: server.response_timeout(),
            max_timeout: server.max_timeout(),
            ws_ping_interval: Duration::from_millis(server.ws_ping_interval_ms.max(1)),
            broker: BrokerConfig {
                log_capacity: settings.broker.log_capacity,
                notification_buffer: settings.broker.notification_buffer,
                snapshot_events: settings.broker.snapshot_events,
                ..BrokerConfig::default()
            },
            ..Self::default()
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Interpret a `timeout` query value in milliseconds. Missing, zero or
    /// unparseable values take `default`; everything is capped at
    /// `max_timeout`.
    pub fn resolve_timeout(&self, raw: Option<&str>, default: Duration) -> Duration {
        let requested = raw
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .unwrap_or(default);
        requested.min(self.max_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = ServerConfig::default();
        assert_eq!(c.port, 0);
        assert_eq!(c.permission_timeout, Duration::from_millis(30_000));
        assert_eq!(c.response_timeout, Duration::from_millis(100));
        assert_eq!(c.bind_addr(), "127.0.0.1:0");
    }

    #[test]
    fn from_settings_copies_values() {
        let mut s = RelaySettings::default();
        s.server.port = 7000;
        s.server.permission_timeout_ms = 5_000;
        s.broker.log_capacity = 42;
        let c = ServerConfig::from_settings(&s);
        assert_eq!(c.port, 7000);
        assert_eq!(c.permission_timeout, Duration::from_secs(5));
        assert_eq!(c.broker.log_capacity, 42);
        assert_eq!(c.broker.snapshot_events, 100);
    }

    #[test]
    fn timeout_resolution() {
        let c = ServerConfig::default();
        let d = Duration::from_millis(250);
        assert_eq!(c.resolve_timeout(None, d), d);
        assert_eq!(c.resolve_timeout(Some("abc"), d), d);
        assert_eq!(c.resolve_timeout(Some("0"), d), d);
        assert_eq!(c.resolve_timeout(Some("-5"), d), d);
        assert_eq!(c.resolve_timeout(Some("50"), d), Duration::from_millis(50));
        assert_eq!(
            c.resolve_timeout(Some("999999999"), d),
            Duration::from_secs(600)
        );
    }
}
