//! # Probe and Metrics Endpoint Settings
//!
//! Where the operator serves `/metrics`, `/healthz` and `/readyz`, and how
//! long startup waits for that listener before the controllers are started.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `METRICS_PORT` | 5000 |
//! | `SERVER_STARTUP_TIMEOUT_SECS` | 10 |
//! | `SERVER_POLL_INTERVAL_MS` | 50 |

use crate::constants::{
    DEFAULT_METRICS_PORT, DEFAULT_SERVER_POLL_INTERVAL_MS, DEFAULT_SERVER_STARTUP_TIMEOUT_SECS,
};
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub metrics_port: u16,
    /// Startup fails if the listener is not bound within this window
    pub startup_timeout: Duration,
    /// Never zero and never longer than `startup_timeout`
    pub poll_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key/value source, ignoring values that do not parse
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        fn parsed<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
            value
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(default)
        }

        let metrics_port = parsed(lookup("METRICS_PORT"), DEFAULT_METRICS_PORT);
        let startup_timeout = Duration::from_secs(parsed(
            lookup("SERVER_STARTUP_TIMEOUT_SECS"),
            DEFAULT_SERVER_STARTUP_TIMEOUT_SECS,
        ));
        let poll_interval = Duration::from_millis(parsed(
            lookup("SERVER_POLL_INTERVAL_MS"),
            DEFAULT_SERVER_POLL_INTERVAL_MS,
        ));

        let floor = Duration::from_millis(1);
        Self {
            metrics_port,
            startup_timeout,
            poll_interval: poll_interval.clamp(floor, startup_timeout.max(floor)),
        }
    }

    /// Listen on every interface so kubelet probes reach the pod IP
    pub fn bind_address(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.metrics_port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> ServerConfig {
        let values: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| values.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.metrics_port, 5000);
        assert_eq!(config.startup_timeout, Duration::from_secs(10));
        assert_eq!(config.poll_interval, Duration::from_millis(50));
        assert_eq!(config.bind_address().to_string(), "0.0.0.0:5000");
    }

    #[test]
    fn test_overrides_and_unparsable_values() {
        let config = from_pairs(&[
            ("METRICS_PORT", " 9090 "),
            ("SERVER_STARTUP_TIMEOUT_SECS", "thirty"),
        ]);
        assert_eq!(config.metrics_port, 9090);
        assert_eq!(config.startup_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_poll_interval_is_bounded() {
        let zero = from_pairs(&[("SERVER_POLL_INTERVAL_MS", "0")]);
        assert_eq!(zero.poll_interval, Duration::from_millis(1));

        let long = from_pairs(&[
            ("SERVER_STARTUP_TIMEOUT_SECS", "1"),
            ("SERVER_POLL_INTERVAL_MS", "5000"),
        ]);
        assert_eq!(long.poll_interval, Duration::from_secs(1));
    }
}
