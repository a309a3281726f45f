use std::sync::Arc;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac, NewMac};
use sha2::Sha256;
use thiserror::Error;

const DEVICEID_KEY: &str = "DeviceId";
const HOSTNAME_KEY: &str = "HostName";
const SHAREDACCESSKEY_KEY: &str = "SharedAccessKey";

/// Errors producing shared access signatures
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TokenError {
    /// The connection string lacks a required component
    #[error("Connection string is missing required parameter {0}")]
    ConnectionStringMissingRequiredParameter(&'static str),
    /// The device key is not valid base64
    #[error("Device key is not valid base64: {0}")]
    InvalidKey(#[from] base64::DecodeError),
    /// Signing failed
    #[error("Unable to sign token")]
    Signing,
}

/// Source of shared access signatures presented when connecting
pub trait TokenSource {
    /// Produce a token valid until `expiry`
    fn get(&self, expiry: &DateTime<Utc>) -> Result<String, TokenError>;
}

/// Shareable token source used by the transport handles
pub type TokenProvider = Arc<dyn TokenSource + Send + Sync>;

/// A fixed, pre-generated shared access signature
#[derive(Debug, Clone)]
pub struct SasTokenSource {
    sas: String,
}

impl SasTokenSource {
    ///
    pub fn new(sas: impl Into<String>) -> Self {
        Self { sas: sas.into() }
    }
}

impl TokenSource for SasTokenSource {
    fn get(&self, _: &DateTime<Utc>) -> Result<String, TokenError> {
        Ok(self.sas.clone())
    }
}

/// Generates signatures from the device's symmetric key
#[derive(Debug, Clone)]
pub struct DeviceKeyTokenSource {
    resource_uri: String,
    key: Vec<u8>,
}

impl DeviceKeyTokenSource {
    /// Fails if `key` is not base64
    pub fn new(hub: &str, device_id: &str, key: &str) -> Result<Self, TokenError> {
        Ok(Self {
            resource_uri: format!("{}/devices/{}", hub, device_id),
            key: base64::decode(key)?,
        })
    }
}

/// Split a device connection string into hub hostname, device id and access key
pub fn parse_connection_string(
    connection_string: impl AsRef<str>,
) -> Result<(String, String, String), TokenError> {
    let mut key = None;
    let mut device_id = None;
    let mut hub = None;

    for part in connection_string.as_ref().split(';') {
        // Keys are base64 and may themselves end in '='
        if let Some((name, value)) = part.split_once('=') {
            match name {
                SHAREDACCESSKEY_KEY => key = Some(value.to_owned()),
                DEVICEID_KEY => device_id = Some(value.to_owned()),
                HOSTNAME_KEY => hub = Some(value.to_owned()),
                _ => (), // Ignore extraneous component in the connection string
            }
        }
    }

    let hub = hub.ok_or(TokenError::ConnectionStringMissingRequiredParameter(
        HOSTNAME_KEY,
    ))?;
    let device_id = device_id.ok_or(TokenError::ConnectionStringMissingRequiredParameter(
        DEVICEID_KEY,
    ))?;
    let key = key.ok_or(TokenError::ConnectionStringMissingRequiredParameter(
        SHAREDACCESSKEY_KEY,
    ))?;

    Ok((hub, device_id, key))
}

impl TokenSource for DeviceKeyTokenSource {
    fn get(&self, expiry: &DateTime<Utc>) -> Result<String, TokenError> {
        let expiry_timestamp = expiry.timestamp();

        const FRAGMENT: &percent_encoding::AsciiSet = &percent_encoding::CONTROLS.add(b'/');

        let resource_uri =
            percent_encoding::utf8_percent_encode(&self.resource_uri, FRAGMENT).to_string();
        let to_sign = format!("{}\n{}", resource_uri, expiry_timestamp);

        let token = generate_token(&self.key, &to_sign)?;

        let sas = format!(
            "SharedAccessSignature sr={}&{}&se={}",
            resource_uri, token, expiry_timestamp
        );

        trace!("Using device key token: {}", sas);

        Ok(sas)
    }
}

fn generate_token(key: &[u8], message: &str) -> Result<String, TokenError> {
    let mut mac = Hmac::<Sha256>::new_varkey(key).map_err(|_| TokenError::Signing)?;
    mac.update(message.as_bytes());
    let signature = base64::encode(mac.finalize().into_bytes());

    serde_urlencoded::to_string(&[("sig", signature)]).map_err(|_| TokenError::Signing)
}
