use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::message::Message;

const DEFAULT_KEEP_ALIVE_SECS: u16 = 10;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Protocol and carrier used to reach the hub
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// AMQP over TLS on TCP
    AmqpTcp,
    /// AMQP over a secure WebSocket
    #[serde(rename = "amqp_websocket")]
    AmqpWebSocket,
    /// MQTT over TLS on TCP
    MqttTcp,
    /// MQTT over a secure WebSocket
    #[serde(rename = "mqtt_websocket")]
    MqttWebSocket,
    /// HTTPS requests
    Http,
}

impl TransportKind {
    /// Whether the protocol is tunnelled through a WebSocket
    pub fn is_websocket(self) -> bool {
        matches!(self, TransportKind::AmqpWebSocket | TransportKind::MqttWebSocket)
    }

    /// Port the hub listens on for this transport
    pub fn default_port(self) -> u16 {
        match self {
            TransportKind::AmqpTcp => 5671,
            TransportKind::MqttTcp => 8883,
            TransportKind::AmqpWebSocket | TransportKind::MqttWebSocket | TransportKind::Http => {
                443
            }
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransportKind::AmqpTcp => "amqp_tcp",
            TransportKind::AmqpWebSocket => "amqp_websocket",
            TransportKind::MqttTcp => "mqtt_tcp",
            TransportKind::MqttWebSocket => "mqtt_websocket",
            TransportKind::Http => "http",
        })
    }
}

/// Protocol specific settings, never inspected by the router
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    /// Overrides the transport's default port
    pub port: Option<u16>,
    /// MQTT keep alive interval in seconds
    pub keep_alive_secs: u16,
    /// Upper bound on a single connection attempt
    pub connect_timeout_secs: u64,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            port: None,
            keep_alive_secs: DEFAULT_KEEP_ALIVE_SECS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
        }
    }
}

impl TransportSettings {
    pub(crate) fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// One configured way of connecting to the hub
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TransportCandidate {
    /// Protocol to connect with
    pub kind: TransportKind,
    /// Settings handed to the protocol implementation
    #[serde(default)]
    pub settings: TransportSettings,
}

impl TransportCandidate {
    /// Candidate with default settings
    pub fn new(kind: TransportKind) -> Self {
        Self {
            kind,
            settings: TransportSettings::default(),
        }
    }

    /// Replace the settings for this candidate
    pub fn with_settings(mut self, settings: TransportSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Port to connect to, honouring any override
    pub fn port(&self) -> u16 {
        self.settings.port.unwrap_or_else(|| self.kind.default_port())
    }
}

impl From<TransportKind> for TransportCandidate {
    fn from(kind: TransportKind) -> Self {
        TransportCandidate::new(kind)
    }
}

/// A single attempted or established connection over one transport.
///
/// Once [`is_usable`](ConnectionHandle::is_usable) returns false it never returns true
/// again; a new handle has to be created to reconnect.
#[async_trait]
pub trait ConnectionHandle: Send + Sync {
    /// Transport this handle connects with
    fn kind(&self) -> TransportKind;

    /// Establish the underlying connection.
    ///
    /// Fails with [`IoTHubError::Cancelled`](crate::IoTHubError::Cancelled) when `cancel`
    /// fires before the connection completes.
    async fn open(&mut self, cancel: &CancellationToken) -> crate::Result<()>;

    /// False once the handle has faulted or been closed. Never touches the network.
    fn is_usable(&self) -> bool;

    /// Release the underlying resources. Safe to call repeatedly and on handles that
    /// were never opened.
    async fn dispose(&mut self) -> crate::Result<()>;

    /// Send a device to cloud message
    async fn send_message(&self, message: Message) -> crate::Result<()>;

    /// Check the connection is still alive
    async fn ping(&self) -> crate::Result<()> {
        Ok(())
    }
}

/// Binds a transport candidate to a concrete protocol implementation
pub trait HandleFactory: Send + Sync {
    /// Handle type produced for every candidate
    type Handle: ConnectionHandle;

    /// Create an unopened handle for `candidate`
    fn create(&self, candidate: &TransportCandidate) -> Self::Handle;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_override_wins_over_default() {
        let candidate = TransportCandidate::new(TransportKind::MqttTcp);
        assert_eq!(candidate.port(), 8883);

        let candidate = candidate.with_settings(TransportSettings {
            port: Some(1883),
            ..Default::default()
        });
        assert_eq!(candidate.port(), 1883);
    }

    #[test]
    fn websocket_transports_use_https_port() {
        assert!(TransportKind::MqttWebSocket.is_websocket());
        assert!(!TransportKind::AmqpTcp.is_websocket());
        assert_eq!(TransportKind::AmqpWebSocket.default_port(), 443);
        assert_eq!(TransportKind::AmqpTcp.default_port(), 5671);
    }

    #[test]
    fn display_matches_configuration_names() {
        assert_eq!(TransportKind::MqttWebSocket.to_string(), "mqtt_websocket");
        assert_eq!(TransportKind::Http.to_string(), "http");
    }
}
