//! Protocol dispatch for the transport candidates a client is configured with.

use std::fmt;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::IoTHubError;
#[cfg(feature = "http-transport")]
use crate::http_transport::HttpHandle;
use crate::message::Message;
use crate::mqtt_transport::MqttHandle;
use crate::token::TokenProvider;
use crate::transport::{ConnectionHandle, HandleFactory, TransportCandidate, TransportKind};

/// Stand-in for a transport this build cannot speak. Opening it always reports
/// [`IoTHubError::TransportUnsupported`] so the router moves on to the next candidate.
#[derive(Debug, Clone)]
pub struct UnsupportedHandle {
    kind: TransportKind,
    reason: &'static str,
}

impl UnsupportedHandle {
    /// Handle for `kind` that always fails to open, giving `reason`
    pub fn new(kind: TransportKind, reason: &'static str) -> Self {
        Self { kind, reason }
    }
}

#[async_trait]
impl ConnectionHandle for UnsupportedHandle {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    async fn open(&mut self, _cancel: &CancellationToken) -> crate::Result<()> {
        Err(IoTHubError::TransportUnsupported {
            kind: self.kind,
            reason: self.reason.to_owned(),
        })
    }

    fn is_usable(&self) -> bool {
        false
    }

    async fn dispose(&mut self) -> crate::Result<()> {
        Ok(())
    }

    async fn send_message(&self, _message: Message) -> crate::Result<()> {
        Err(IoTHubError::NotConnected)
    }
}

/// Connection handle for any of the supported protocols
#[derive(Debug)]
pub enum ProtocolHandle {
    /// MQTT over TCP
    Mqtt(MqttHandle),
    /// HTTPS
    #[cfg(feature = "http-transport")]
    Http(HttpHandle),
    /// Transport not available in this build
    Unsupported(UnsupportedHandle),
}

macro_rules! dispatch {
    ($handle:expr, $inner:ident => $body:expr) => {
        match $handle {
            ProtocolHandle::Mqtt($inner) => $body,
            #[cfg(feature = "http-transport")]
            ProtocolHandle::Http($inner) => $body,
            ProtocolHandle::Unsupported($inner) => $body,
        }
    };
}

#[async_trait]
impl ConnectionHandle for ProtocolHandle {
    fn kind(&self) -> TransportKind {
        dispatch!(self, h => h.kind())
    }

    async fn open(&mut self, cancel: &CancellationToken) -> crate::Result<()> {
        dispatch!(self, h => h.open(cancel).await)
    }

    fn is_usable(&self) -> bool {
        dispatch!(self, h => h.is_usable())
    }

    async fn dispose(&mut self) -> crate::Result<()> {
        dispatch!(self, h => h.dispose().await)
    }

    async fn send_message(&self, message: Message) -> crate::Result<()> {
        dispatch!(self, h => h.send_message(message).await)
    }

    async fn ping(&self) -> crate::Result<()> {
        dispatch!(self, h => h.ping().await)
    }
}

/// Creates handles that connect a device to an IoT hub
#[derive(Clone)]
pub struct DefaultHandleFactory {
    hub_name: String,
    device_id: String,
    token_source: TokenProvider,
}

impl fmt::Debug for DefaultHandleFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultHandleFactory")
            .field("hub_name", &self.hub_name)
            .field("device_id", &self.device_id)
            .finish()
    }
}

impl DefaultHandleFactory {
    /// Factory connecting `device_id` to `hub_name`, authenticating with `token_source`
    pub fn new(
        hub_name: impl Into<String>,
        device_id: impl Into<String>,
        token_source: TokenProvider,
    ) -> Self {
        Self {
            hub_name: hub_name.into(),
            device_id: device_id.into(),
            token_source,
        }
    }
}

impl HandleFactory for DefaultHandleFactory {
    type Handle = ProtocolHandle;

    fn create(&self, candidate: &TransportCandidate) -> ProtocolHandle {
        match candidate.kind {
            TransportKind::MqttTcp => ProtocolHandle::Mqtt(MqttHandle::new(
                &self.hub_name,
                &self.device_id,
                self.token_source.clone(),
                candidate,
            )),
            #[cfg(feature = "http-transport")]
            TransportKind::Http => ProtocolHandle::Http(HttpHandle::new(
                &self.hub_name,
                &self.device_id,
                self.token_source.clone(),
                candidate,
            )),
            #[cfg(not(feature = "http-transport"))]
            TransportKind::Http => ProtocolHandle::Unsupported(UnsupportedHandle::new(
                TransportKind::Http,
                "built without the http-transport feature",
            )),
            TransportKind::AmqpTcp | TransportKind::AmqpWebSocket => ProtocolHandle::Unsupported(
                UnsupportedHandle::new(candidate.kind, "no AMQP implementation available"),
            ),
            TransportKind::MqttWebSocket => ProtocolHandle::Unsupported(UnsupportedHandle::new(
                candidate.kind,
                "no WebSocket implementation available",
            )),
        }
    }
}
