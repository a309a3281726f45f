use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::handle::DefaultHandleFactory;
use crate::message::Message;
use crate::router::TransportRouter;
use crate::token::TokenSource;
use crate::transport::{ConnectionHandle, HandleFactory, TransportCandidate, TransportKind};

/// Client for communicating with IoT hub
///
/// Owns a single [`TransportRouter`]; every operation first makes sure a usable
/// connection exists, falling back through the configured transports as needed.
#[derive(Debug)]
pub struct IoTHubClient<F: HandleFactory = DefaultHandleFactory> {
    device_id: String,
    router: TransportRouter<F>,
}

impl IoTHubClient {
    /// Create a new IoT Hub device client and connect using the first workable transport
    ///
    /// # Arguments
    ///
    /// * `hub_name` - The IoT hub resource name
    /// * `device_id` - The registered device to connect as
    /// * `token_source` - The token source to provide authentication
    /// * `transports` - Transports to try, most preferred first
    ///
    /// # Example
    /// ```no_run
    /// use azure_iot_transport::{DeviceKeyTokenSource, IoTHubClient, TransportKind};
    ///
    /// #[tokio::main]
    /// async fn main() -> azure_iot_transport::Result<()> {
    ///     let iothub_hostname = "iothubname.azure-devices.net";
    ///     let device_id = "MyDeviceId";
    ///     let token_source =
    ///         DeviceKeyTokenSource::new(iothub_hostname, device_id, "VGhlQWNjZXNzS2V5")?;
    ///
    ///     let client = IoTHubClient::new(
    ///         iothub_hostname,
    ///         device_id.into(),
    ///         token_source,
    ///         vec![TransportKind::MqttWebSocket.into(), TransportKind::MqttTcp.into()],
    ///     )
    ///     .await?;
    ///
    ///     assert_eq!(client.transport(), Some(TransportKind::MqttTcp));
    ///     Ok(())
    /// }
    /// ```
    pub async fn new<TS>(
        hub_name: &str,
        device_id: String,
        token_source: TS,
        transports: Vec<TransportCandidate>,
    ) -> crate::Result<IoTHubClient>
    where
        TS: TokenSource + Sync + Send + 'static,
    {
        let factory = DefaultHandleFactory::new(hub_name, device_id.clone(), Arc::new(token_source));
        let mut client = IoTHubClient::with_factory(device_id, transports, factory)?;
        client.open(&CancellationToken::new()).await?;
        Ok(client)
    }
}

impl<F: HandleFactory> IoTHubClient<F> {
    /// Create a client around a custom handle factory. No connection is made until the
    /// first call that needs one.
    pub fn with_factory(
        device_id: String,
        transports: Vec<TransportCandidate>,
        factory: F,
    ) -> crate::Result<Self> {
        Ok(Self {
            device_id,
            router: TransportRouter::new(transports, factory)?,
        })
    }

    /// The device this client connects as
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Transport of the current connection, if any
    pub fn transport(&self) -> Option<TransportKind> {
        self.router.active_transport()
    }

    /// Make sure the client is connected, returning the transport in use
    pub async fn open(&mut self, cancel: &CancellationToken) -> crate::Result<TransportKind> {
        let handle = self.router.open(cancel).await?;
        Ok(handle.kind())
    }

    /// Send a device to cloud message for this device to the IoT Hub
    pub async fn send_message(
        &mut self,
        message: Message,
        cancel: &CancellationToken,
    ) -> crate::Result<()> {
        let handle = self.router.open(cancel).await?;
        handle.send_message(message).await
    }

    /// Check the connection is alive, connecting first if needed
    pub async fn ping(&mut self, cancel: &CancellationToken) -> crate::Result<()> {
        let handle = self.router.open(cancel).await?;
        handle.ping().await
    }

    /// Disconnect from the hub
    pub async fn close(&mut self) {
        self.router.close().await;
    }
}
