//! Transport selection for Azure IoT Hub device clients
//!
//! A device can usually reach its hub over several protocols. This crate takes an ordered
//! list of [`TransportCandidate`]s and opens a connection with the first one that works,
//! handing back a protocol agnostic [`ConnectionHandle`].
//!
//! Falling back is deliberately conservative: only a transport reporting that it is
//! unsupported lets the [`TransportRouter`] move on to the next candidate. Timeouts,
//! refused credentials and network failures on a supported transport are returned
//! straight away.
//!
//! ## Feature flags
//!
//! - `http-transport`: Enables the HTTPS transport (on by default). Without it, HTTP
//!   candidates are reported as unsupported.
//!
//! # Examples
//!
//! ```no_run
//! use azure_iot_transport::{IoTHubClient, Message, TransportKind};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = IoTHubClient::builder()
//!         .connection_string("HostName=iothubname.azure-devices.net;DeviceId=MyDeviceId;SharedAccessKey=VGhlQWNjZXNzS2V5")?
//!         .transports([TransportKind::AmqpTcp, TransportKind::MqttTcp, TransportKind::Http])
//!         .build()
//!         .await?;
//!
//!     let cancel = CancellationToken::new();
//!     let msg = Message::builder()
//!         .set_body(b"Hello, world!".to_vec())
//!         .set_message_id("1".to_owned())
//!         .build();
//!
//!     client.send_message(msg, &cancel).await?;
//!     client.close().await;
//!     Ok(())
//! }
//! ```

#![warn(missing_debug_implementations, rust_2018_idioms, missing_docs)]

#[macro_use]
extern crate log;

/// SDK package version
pub const SDK_VERSION: &str = std::env!("CARGO_PKG_VERSION");

/// The IoT Hub client
pub mod client;
mod client_builder;
/// File and environment configuration
pub mod config;
/// Errors
pub mod error;
pub mod failure;
pub mod handle;
#[cfg(feature = "http-transport")]
pub(crate) mod http_transport;
/// Message types for communicating with the IoT Hub
pub mod message;
pub(crate) mod mqtt_transport;
/// Transport router
pub mod router;
/// Shared access signature generation
pub mod token;
/// Transport types
pub mod transport;

pub use client::IoTHubClient;
pub use client_builder::{
    IoTHubClientBuilder, IoTHubClientBuilderError, IoTHubClientBuilderInitializedHubDetails,
    IoTHubClientBuilderInitializedTokenSource, IoTHubClientBuilderUninitializedHubDetails,
};
pub use crate::config::ClientConfig;
pub use error::{CandidateError, ExhaustedError, IoTHubError};
pub use failure::{classify, FailureClass};
pub use handle::{DefaultHandleFactory, ProtocolHandle, UnsupportedHandle};
#[cfg(feature = "http-transport")]
pub use http_transport::HttpHandle;
pub use message::{Message, MessageBuilder};
pub use mqtt_transport::MqttHandle;
pub use router::TransportRouter;
pub use token::{DeviceKeyTokenSource, SasTokenSource, TokenError, TokenProvider, TokenSource};
pub use transport::{
    ConnectionHandle, HandleFactory, TransportCandidate, TransportKind, TransportSettings,
};

/// Result type for IoT hub operations
pub type Result<T> = std::result::Result<T, IoTHubError>;
