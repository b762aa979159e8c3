//! Session and listener configuration
//!
//! Loaded from TOML with every field optional. Durations are written in
//! milliseconds:
//!
//! ```toml
//! bind_address = "0.0.0.0:9001"
//! accept_error_backoff = 50
//!
//! [session]
//! connect_timeout = 30000
//! user_agent = "my-service"
//! ```

use crate::{Result, TransportError};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;

/// Per-session timeouts, handshake decoration and protocol limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Name resolution deadline
    #[serde(with = "duration_ms")]
    pub resolve_timeout: Duration,
    /// Deadline shared by all candidate addresses
    #[serde(with = "duration_ms")]
    pub connect_timeout: Duration,
    /// WebSocket upgrade deadline
    #[serde(with = "duration_ms")]
    pub handshake_timeout: Duration,
    /// User-Agent sent with the client upgrade request
    pub user_agent: String,
    /// Request target of the client upgrade request
    pub path: String,
    /// Largest reassembled message accepted from the peer
    pub max_message_size: usize,
    /// Largest single frame accepted from the peer
    pub max_frame_size: usize,
    /// Disable Nagle on the underlying TCP stream
    pub tcp_nodelay: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            resolve_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(30),
            handshake_timeout: Duration::from_secs(30),
            user_agent: format!("ipc/{} websocket-client-async", env!("CARGO_PKG_VERSION")),
            path: "/".to_string(),
            max_message_size: 64 * 1024 * 1024, // 64MB
            max_frame_size: 16 * 1024 * 1024,   // 16MB
            tcp_nodelay: true,
        }
    }
}

impl SessionConfig {
    /// Reject values that would make a session unusable
    pub fn validate(&self) -> Result<()> {
        if self.resolve_timeout.is_zero() {
            return Err(TransportError::configuration(
                "resolve timeout must be non-zero",
                Some("resolve_timeout"),
            ));
        }
        if self.connect_timeout.is_zero() {
            return Err(TransportError::configuration(
                "connect timeout must be non-zero",
                Some("connect_timeout"),
            ));
        }
        if self.handshake_timeout.is_zero() {
            return Err(TransportError::configuration(
                "handshake timeout must be non-zero",
                Some("handshake_timeout"),
            ));
        }
        if self.max_frame_size == 0 || self.max_message_size == 0 {
            return Err(TransportError::configuration(
                "message and frame size limits must be non-zero",
                Some("max_message_size"),
            ));
        }
        if self.max_frame_size > self.max_message_size {
            return Err(TransportError::configuration(
                format!(
                    "max frame size {} exceeds max message size {}",
                    self.max_frame_size, self.max_message_size
                ),
                Some("max_frame_size"),
            ));
        }
        if !self.path.starts_with('/') {
            return Err(TransportError::configuration(
                format!("request path {:?} must start with '/'", self.path),
                Some("path"),
            ));
        }
        Ok(())
    }

    /// Protocol-layer limits for the WebSocket stream
    pub(crate) fn websocket_config(&self) -> WebSocketConfig {
        WebSocketConfig {
            max_message_size: Some(self.max_message_size),
            max_frame_size: Some(self.max_frame_size),
            ..Default::default()
        }
    }
}

/// Listener bind address, accept loop tuning and the config handed to every
/// inbound session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Local address to bind to
    pub bind_address: SocketAddr,
    /// Pause after a transient accept failure before accepting again
    #[serde(with = "duration_ms")]
    pub accept_error_backoff: Duration,
    /// Configuration for spawned sessions
    pub session: SessionConfig,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 0)),
            accept_error_backoff: Duration::from_millis(10),
            session: SessionConfig::default(),
        }
    }
}

impl ListenerConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)
            .map_err(|e| TransportError::configuration(format!("invalid TOML: {}", e), None))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            TransportError::io(format!("Failed to read config file {:?}", path), e)
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        self.session.validate()
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = ListenerConfig::default();
        config.validate().unwrap();
        assert_eq!(config.session.connect_timeout, Duration::from_secs(30));
        assert!(config.session.user_agent.contains("websocket-client-async"));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = ListenerConfig::from_toml_str(
            r#"
            bind_address = "0.0.0.0:9001"
            accept_error_backoff = 250

            [session]
            connect_timeout = 5000
            user_agent = "probe"
            "#,
        )
        .unwrap();

        assert_eq!(config.bind_address.port(), 9001);
        assert_eq!(config.accept_error_backoff, Duration::from_millis(250));
        assert_eq!(config.session.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.session.user_agent, "probe");
        assert_eq!(config.session.handshake_timeout, Duration::from_secs(30));
        assert_eq!(config.session.path, "/");
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let err = ListenerConfig::from_toml_str("[session]\nhandshake_timeout = 0\n").unwrap_err();
        match err {
            TransportError::Configuration { field, .. } => {
                assert_eq!(field.as_deref(), Some("handshake_timeout"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_frame_larger_than_message_rejected() {
        let config = SessionConfig {
            max_message_size: 1024,
            max_frame_size: 4096,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_toml_rejected() {
        let err = ListenerConfig::from_toml_str("bind_address = 12").unwrap_err();
        assert!(matches!(err, TransportError::Configuration { .. }));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[session]\npath = \"/chat\"").unwrap();

        let config = ListenerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.session.path, "/chat");
    }

    #[test]
    fn test_toml_round_trip_keeps_millis() {
        let config = ListenerConfig::default();
        let text = toml::to_string(&config).unwrap();
        assert!(text.contains("accept_error_backoff = 10"));
        assert_eq!(ListenerConfig::from_toml_str(&text).unwrap(), config);
    }
}
