//! Client configuration and endpoint derivation.

use std::time::Duration;

/// Default API host.
pub const DEFAULT_HOST: &str = "ws.xtb.com";

/// Server-imposed minimum spacing between outbound requests on one socket.
pub const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(200);

/// Default socket dial timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default period of the background keep-alive loop.
pub const DEFAULT_KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(10);

/// Trading environment, selecting both endpoint suffixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TradingMode {
    /// Demo account endpoints
    #[default]
    Demo,
    /// Real-money account endpoints
    Real,
}

impl TradingMode {
    /// Path suffix of the request/response endpoint.
    #[inline]
    pub fn rpc_suffix(self) -> &'static str {
        match self {
            Self::Demo => "demo",
            Self::Real => "real",
        }
    }

    /// Path suffix of the streaming endpoint.
    #[inline]
    pub fn stream_suffix(self) -> &'static str {
        match self {
            Self::Demo => "demoStream",
            Self::Real => "realStream",
        }
    }
}

impl std::fmt::Display for TradingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.rpc_suffix())
    }
}

/// Connection configuration consumed by the client facade.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API host, without scheme or path.
    pub host: String,
    /// Trading environment.
    pub mode: TradingMode,
    /// Minimum spacing between outbound requests on one socket.
    ///
    /// Values below [`MIN_REQUEST_INTERVAL`] risk server-side disconnects.
    pub request_interval: Duration,
    /// Socket dial timeout.
    pub connect_timeout: Duration,
    /// Period of the background keep-alive loop; `Duration::ZERO` disables it.
    pub keep_alive_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            mode: TradingMode::Demo,
            request_interval: MIN_REQUEST_INTERVAL,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            keep_alive_interval: DEFAULT_KEEP_ALIVE_INTERVAL,
        }
    }
}

impl ClientConfig {
    /// Creates a configuration for the given trading mode with defaults.
    pub fn new(mode: TradingMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// URL of the request/response endpoint.
    pub fn rpc_url(&self) -> String {
        format!("wss://{}/{}", self.host, self.mode.rpc_suffix())
    }

    /// URL of the streaming endpoint.
    pub fn stream_url(&self) -> String {
        format!("wss://{}/{}", self.host, self.mode.stream_suffix())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.host, DEFAULT_HOST);
        assert_eq!(config.mode, TradingMode::Demo);
        assert_eq!(config.request_interval, Duration::from_millis(200));
    }

    #[test]
    fn demo_urls() {
        let config = ClientConfig::new(TradingMode::Demo);
        assert_eq!(config.rpc_url(), "wss://ws.xtb.com/demo");
        assert_eq!(config.stream_url(), "wss://ws.xtb.com/demoStream");
    }

    #[test]
    fn real_urls() {
        let config = ClientConfig {
            host: "ws.example.com".to_string(),
            mode: TradingMode::Real,
            ..ClientConfig::default()
        };
        assert_eq!(config.rpc_url(), "wss://ws.example.com/real");
        assert_eq!(config.stream_url(), "wss://ws.example.com/realStream");
    }
}
