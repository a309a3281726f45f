use std::marker::PhantomData;
use std::sync::Arc;

use thiserror::Error;

use crate::config::ClientConfig;
use crate::token::{parse_connection_string, DeviceKeyTokenSource, TokenError, TokenProvider};
use crate::transport::{TransportCandidate, TransportKind};
use crate::{DefaultHandleFactory, IoTHubClient};

impl IoTHubClient {
    /// Get a builder for the IoT hub client
    pub fn builder() -> IoTHubClientBuilder<IoTHubClientBuilderUninitializedHubDetails> {
        IoTHubClientBuilder::default()
    }
}

/// Error related to building the client
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum IoTHubClientBuilderError {
    /// Uninitialized field
    #[error("{0} must be initialized")]
    UninitializedField(&'static str),
    /// Error initializing the hub client
    #[error("An error occurred intializing the IoT Hub Client {0}")]
    ClientError(#[from] crate::IoTHubError),
}

/// The client builder has no initialized fields and requires the hub name and device id
#[derive(Debug)]
pub struct IoTHubClientBuilderUninitializedHubDetails;
/// The client builder has hub and device details and can have the token source initialized
#[derive(Debug)]
pub struct IoTHubClientBuilderInitializedHubDetails;
/// The client builder has all fields required to be built
#[derive(Debug)]
pub struct IoTHubClientBuilderInitializedTokenSource;

/// Builder object for the IoT Hub Client
pub struct IoTHubClientBuilder<T> {
    iothub_hostname: Option<String>,
    device_id: Option<String>,
    token_source: Option<TokenProvider>,
    transports: Vec<TransportCandidate>,
    _phantom: PhantomData<T>,
}

impl<T> std::fmt::Debug for IoTHubClientBuilder<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IoTHubClientBuilder")
            .field("iothub_hostname", &self.iothub_hostname)
            .field("device_id", &self.device_id)
            .field("transports", &self.transports)
            .finish()
    }
}

impl Default for IoTHubClientBuilder<IoTHubClientBuilderUninitializedHubDetails> {
    fn default() -> IoTHubClientBuilder<IoTHubClientBuilderUninitializedHubDetails> {
        Self {
            iothub_hostname: None,
            device_id: None,
            token_source: None,
            transports: vec![TransportCandidate::new(TransportKind::MqttTcp)],
            _phantom: Default::default(),
        }
    }
}

impl<T> IoTHubClientBuilder<T> {
    /// Transports to try, most preferred first. Defaults to MQTT over TCP.
    pub fn transports<I>(mut self, transports: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<TransportCandidate>,
    {
        self.transports = transports.into_iter().map(Into::into).collect();
        self
    }

    fn advance<U>(self) -> IoTHubClientBuilder<U> {
        IoTHubClientBuilder {
            iothub_hostname: self.iothub_hostname,
            device_id: self.device_id,
            token_source: self.token_source,
            transports: self.transports,
            _phantom: Default::default(),
        }
    }
}

impl IoTHubClientBuilder<IoTHubClientBuilderInitializedTokenSource> {
    /// Build the IoT hub client without connecting
    pub fn build_lazy(self) -> Result<IoTHubClient, IoTHubClientBuilderError> {
        let Some(iothub_hostname) = self.iothub_hostname else {
            return Err(IoTHubClientBuilderError::UninitializedField(
                "iothub_hostname",
            ));
        };

        let Some(device_id) = self.device_id else {
            return Err(IoTHubClientBuilderError::UninitializedField("device_id"));
        };

        let Some(token_source) = self.token_source else {
            return Err(IoTHubClientBuilderError::UninitializedField("token_source"));
        };

        let factory = DefaultHandleFactory::new(iothub_hostname, device_id.clone(), token_source);
        Ok(IoTHubClient::with_factory(
            device_id,
            self.transports,
            factory,
        )?)
    }

    /// Build the IoT hub client and connect
    pub async fn build(self) -> Result<IoTHubClient, IoTHubClientBuilderError> {
        let mut client = self.build_lazy()?;
        client
            .open(&tokio_util::sync::CancellationToken::new())
            .await?;
        Ok(client)
    }
}

impl IoTHubClientBuilder<IoTHubClientBuilderUninitializedHubDetails> {
    /// Set the values for the IoT hub hostname and device id
    pub fn iothub_details<T>(
        self,
        iothub_hostname: T,
        device_id: T,
    ) -> IoTHubClientBuilder<IoTHubClientBuilderInitializedHubDetails>
    where
        T: ToString,
    {
        IoTHubClientBuilder {
            iothub_hostname: Some(iothub_hostname.to_string()),
            device_id: Some(device_id.to_string()),
            ..self.advance()
        }
    }

    /// Set the values for the IoT hub hostname and device id and access key from the connection
    /// string
    pub fn connection_string<T>(
        self,
        connection_string: T,
    ) -> Result<IoTHubClientBuilder<IoTHubClientBuilderInitializedTokenSource>, TokenError>
    where
        T: AsRef<str>,
    {
        let (hub_name, device_id, key) = parse_connection_string(connection_string)?;
        self.iothub_details(hub_name, device_id).access_key(key)
    }

    /// Take hub details, access key and transports from loaded configuration
    pub fn from_config(
        self,
        config: ClientConfig,
    ) -> Result<IoTHubClientBuilder<IoTHubClientBuilderInitializedTokenSource>, TokenError> {
        self.iothub_details(config.hostname, config.device_id)
            .access_key(config.shared_access_key)
            .map(|builder| builder.transports(config.transports))
    }
}

impl IoTHubClientBuilder<IoTHubClientBuilderInitializedHubDetails> {
    /// The the device access key
    pub fn access_key<T>(
        self,
        access_key: T,
    ) -> Result<IoTHubClientBuilder<IoTHubClientBuilderInitializedTokenSource>, TokenError>
    where
        T: AsRef<str>,
    {
        let token_source = DeviceKeyTokenSource::new(
            self.iothub_hostname.as_deref().unwrap_or_default(),
            self.device_id.as_deref().unwrap_or_default(),
            access_key.as_ref(),
        )?;

        Ok(IoTHubClientBuilder {
            token_source: Some(Arc::new(token_source)),
            ..self.advance()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_string_builds_lazy_client() {
        let client = IoTHubClient::builder()
            .connection_string(
                "HostName=hub.azure-devices.net;DeviceId=dev;SharedAccessKey=a2V5",
            )
            .unwrap()
            .build_lazy()
            .unwrap();

        assert_eq!(client.device_id(), "dev");
        assert_eq!(client.transport(), None);
    }

    #[test]
    fn empty_transport_list_is_rejected() {
        let result = IoTHubClient::builder()
            .iothub_details("hub.azure-devices.net", "dev")
            .access_key("a2V5")
            .unwrap()
            .transports(Vec::<TransportKind>::new())
            .build_lazy();

        assert!(matches!(
            result,
            Err(IoTHubClientBuilderError::ClientError(
                crate::IoTHubError::NoCandidates
            ))
        ));
    }

    #[test]
    fn missing_token_source_is_uninitialized() {
        let builder = IoTHubClientBuilder::<IoTHubClientBuilderInitializedTokenSource> {
            iothub_hostname: Some("hub.azure-devices.net".to_owned()),
            device_id: Some("dev".to_owned()),
            token_source: None,
            transports: vec![TransportKind::MqttTcp.into()],
            _phantom: Default::default(),
        };

        assert!(matches!(
            builder.build_lazy(),
            Err(IoTHubClientBuilderError::UninitializedField("token_source"))
        ));
    }

    #[test]
    fn bad_access_key_is_rejected() {
        let result = IoTHubClient::builder()
            .iothub_details("hub.azure-devices.net", "dev")
            .access_key("not base64!");

        assert!(result.is_err());
    }
}
