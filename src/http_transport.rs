use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use hyper::{client::HttpConnector, header, Body, Client, Method, Request, StatusCode};
use hyper_tls::HttpsConnector;
use tokio_util::sync::CancellationToken;

use crate::error::IoTHubError;
use crate::message::{Message, CONTENT_TYPE};
use crate::token::TokenProvider;
use crate::transport::{ConnectionHandle, TransportCandidate, TransportKind, TransportSettings};

const API_VERSION: &str = "2019-03-30";
const APP_PROPERTY_PREFIX: &str = "iothub-app-";
const MESSAGE_ID_HEADER: &str = "iothub-messageid";

/// Device to cloud messaging over HTTPS requests
pub struct HttpHandle {
    hub_name: String,
    device_id: String,
    token_source: TokenProvider,
    settings: TransportSettings,
    port: u16,
    client: Option<Client<HttpsConnector<HttpConnector>>>,
    usable: AtomicBool,
    disposed: bool,
}

impl fmt::Debug for HttpHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpHandle")
            .field("hub_name", &self.hub_name)
            .field("device_id", &self.device_id)
            .field("port", &self.port)
            .field("usable", &self.is_usable())
            .finish()
    }
}

impl HttpHandle {
    pub(crate) fn new(
        hub_name: &str,
        device_id: &str,
        token_source: TokenProvider,
        candidate: &TransportCandidate,
    ) -> Self {
        Self {
            hub_name: hub_name.to_owned(),
            device_id: device_id.to_owned(),
            token_source,
            settings: candidate.settings.clone(),
            port: candidate.port(),
            client: None,
            usable: AtomicBool::new(false),
            disposed: false,
        }
    }

    fn events_uri(&self) -> String {
        format!(
            "https://{}:{}/devices/{}/messages/events?api-version={}",
            self.hub_name, self.port, self.device_id, API_VERSION
        )
    }

    fn sas(&self) -> crate::Result<String> {
        let expiry = Utc::now() + Duration::days(1);
        Ok(self.token_source.get(&expiry)?)
    }
}

#[async_trait]
impl ConnectionHandle for HttpHandle {
    fn kind(&self) -> TransportKind {
        TransportKind::Http
    }

    async fn open(&mut self, cancel: &CancellationToken) -> crate::Result<()> {
        if self.disposed {
            return Err(IoTHubError::NotConnected);
        }
        if cancel.is_cancelled() {
            return Err(IoTHubError::Cancelled);
        }
        if self.client.is_some() {
            return Ok(());
        }

        // Requests are stateless, so opening only proves credentials can be produced
        self.sas()?;

        let https = HttpsConnector::new();
        self.client = Some(Client::builder().build::<_, Body>(https));
        self.usable.store(true, Ordering::SeqCst);

        Ok(())
    }

    fn is_usable(&self) -> bool {
        self.usable.load(Ordering::SeqCst)
    }

    async fn dispose(&mut self) -> crate::Result<()> {
        self.disposed = true;
        self.usable.store(false, Ordering::SeqCst);
        self.client = None;
        Ok(())
    }

    async fn send_message(&self, message: Message) -> crate::Result<()> {
        let client = match &self.client {
            Some(client) if self.is_usable() => client,
            _ => return Err(IoTHubError::NotConnected),
        };

        let content_type = message
            .system_properties
            .get(CONTENT_TYPE)
            .map(String::as_str)
            .unwrap_or("application/json");

        let mut req = Request::builder()
            .method(Method::POST)
            .uri(self.events_uri())
            .header(header::CONTENT_TYPE, content_type)
            .header(header::AUTHORIZATION, self.sas()?);

        if let Some(message_id) = message.message_id() {
            req = req.header(MESSAGE_ID_HEADER, message_id);
        }
        for (key, value) in message.properties() {
            req = req.header(format!("{}{}", APP_PROPERTY_PREFIX, key).as_str(), value.as_str());
        }

        let req = req
            .body(Body::from(message.body.clone()))
            .map_err(|e| IoTHubError::Protocol(format!("Invalid request {}", e)))?;

        let res = tokio::time::timeout(self.settings.connect_timeout(), client.request(req))
            .await
            .map_err(|_| IoTHubError::Timeout)??;

        debug!("Response: {}", res.status());

        match res.status() {
            status if status.is_success() => Ok(()),
            status if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN => {
                warn!("Hub rejected credentials ({}), marking connection unusable", status);
                self.usable.store(false, Ordering::SeqCst);
                Err(IoTHubError::HttpStatus(status.as_u16()))
            }
            status => Err(IoTHubError::HttpStatus(status.as_u16())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::SasTokenSource;
    use std::sync::Arc;

    fn handle() -> HttpHandle {
        HttpHandle::new(
            "myiothub.azure-devices.net",
            "FirstDevice",
            Arc::new(SasTokenSource::new("SharedAccessSignature sr=x")),
            &TransportCandidate::new(TransportKind::Http),
        )
    }

    #[test]
    fn events_uri_targets_device() {
        assert_eq!(
            handle().events_uri(),
            "https://myiothub.azure-devices.net:443/devices/FirstDevice/messages/events?api-version=2019-03-30"
        );
    }

    #[tokio::test]
    async fn open_then_dispose() {
        let mut handle = handle();
        handle.open(&CancellationToken::new()).await.unwrap();
        assert!(handle.is_usable());

        handle.dispose().await.unwrap();
        handle.dispose().await.unwrap();
        assert!(!handle.is_usable());

        let err = handle.send_message(Message::new(vec![])).await.unwrap_err();
        assert!(matches!(err, IoTHubError::NotConnected));
    }

    #[tokio::test]
    async fn open_respects_cancellation() {
        let mut handle = handle();
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert!(handle.open(&cancel).await.unwrap_err().is_cancelled());
        assert!(!handle.is_usable());
    }
}
