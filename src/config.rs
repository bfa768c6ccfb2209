use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::messages::{DEVICE_PORT, HEADER_LEN, MAX_FRAME_LEN};

/// Error produced when client configuration fails validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("device port must be non-zero")]
    ZeroPort,
    #[error("receive timeout must be non-zero")]
    ZeroTimeout,
    #[error("max datagram size must be between {min} and {max} bytes, got {got}")]
    DatagramSizeOutOfRange { min: usize, max: usize, got: usize },
    #[error("config parse error: {0}")]
    Parse(String),
}

/// Connection settings for a single device.
///
/// Deserializes from JSON with every field optional; missing fields take the
/// defaults below.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Remote UDP port of the device.
    pub port: u16,
    /// Local endpoint the client socket binds to.
    pub local_addr: SocketAddr,
    /// Deadline for every receive, handshake included.
    pub recv_timeout_ms: u64,
    /// Receive buffer size; larger datagrams are truncated by the OS.
    pub max_datagram_size: usize,
    /// Reject replies whose echoed `id` differs from the request id.
    pub verify_message_id: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            port: DEVICE_PORT,
            local_addr: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)),
            recv_timeout_ms: 5_000,
            max_datagram_size: 4096,
            verify_message_id: false,
        }
    }
}

impl ClientConfig {
    /// Parses and validates a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_local_addr(mut self, local_addr: SocketAddr) -> Self {
        self.local_addr = local_addr;
        self
    }

    pub fn with_recv_timeout(mut self, timeout: Duration) -> Self {
        self.recv_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_max_datagram_size(mut self, size: usize) -> Self {
        self.max_datagram_size = size;
        self
    }

    pub fn with_message_id_verification(mut self, enabled: bool) -> Self {
        self.verify_message_id = enabled;
        self
    }

    pub fn recv_timeout(&self) -> Duration {
        Duration::from_millis(self.recv_timeout_ms)
    }

    /// Checks every field against the protocol limits.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::ZeroPort);
        }
        if self.recv_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.max_datagram_size < HEADER_LEN || self.max_datagram_size > MAX_FRAME_LEN {
            return Err(ConfigError::DatagramSizeOutOfRange {
                min: HEADER_LEN,
                max: MAX_FRAME_LEN,
                got: self.max_datagram_size,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ClientConfig::default();
        assert_eq!(config.port, 54321);
        assert_eq!(config.recv_timeout(), Duration::from_secs(5));
        assert!(!config.verify_message_id);
        config.validate().unwrap();
    }

    #[test]
    fn json_fills_missing_fields() {
        let config =
            ClientConfig::from_json_str(r#"{"recv_timeout_ms": 250, "verify_message_id": true}"#)
                .unwrap();
        assert_eq!(config.recv_timeout(), Duration::from_millis(250));
        assert!(config.verify_message_id);
        assert_eq!(config.port, DEVICE_PORT);
    }

    #[test]
    fn huge_timeout_saturates() {
        let config = ClientConfig::default().with_recv_timeout(Duration::MAX);
        assert_eq!(config.recv_timeout_ms, u64::MAX);
        config.validate().unwrap();
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(matches!(
            ClientConfig::default().with_port(0).validate(),
            Err(ConfigError::ZeroPort)
        ));
        assert!(matches!(
            ClientConfig::default()
                .with_recv_timeout(Duration::ZERO)
                .validate(),
            Err(ConfigError::ZeroTimeout)
        ));
        assert!(matches!(
            ClientConfig::default().with_max_datagram_size(16).validate(),
            Err(ConfigError::DatagramSizeOutOfRange { .. })
        ));
        assert!(matches!(
            ClientConfig::from_json_str("{not json"),
            Err(ConfigError::Parse(_))
        ));
    }
}
