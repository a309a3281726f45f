use ::config::{ConfigError, Environment, File, FileFormat};
use serde::Deserialize;

use crate::transport::{TransportCandidate, TransportKind};

const ENV_PREFIX: &str = "IOTHUB";

fn default_transports() -> Vec<TransportCandidate> {
    vec![TransportCandidate::new(TransportKind::MqttTcp)]
}

/// Device connection settings
///
/// ```toml
/// hostname = "iothubname.azure-devices.net"
/// device_id = "MyDeviceId"
/// shared_access_key = "TheAccessKey"
///
/// [[transports]]
/// kind = "mqtt_websocket"
///
/// [[transports]]
/// kind = "mqtt_tcp"
/// settings = { keep_alive_secs = 30 }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// IoT hub hostname
    pub hostname: String,
    /// Registered device to connect as
    pub device_id: String,
    /// Device symmetric key
    pub shared_access_key: String,
    /// Transports to try, most preferred first
    #[serde(default = "default_transports")]
    pub transports: Vec<TransportCandidate>,
}

impl ClientConfig {
    /// Load from a configuration file, with `IOTHUB_*` environment variables taking
    /// precedence over values in the file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let mut cfg = ::config::Config::default();
        cfg.merge(File::with_name(path))?;
        cfg.merge(Environment::with_prefix(ENV_PREFIX))?;
        cfg.try_into()
    }

    /// Parse configuration held in memory
    pub fn parse(contents: &str, format: FileFormat) -> Result<Self, ConfigError> {
        let mut cfg = ::config::Config::default();
        cfg.merge(File::from_str(contents, format))?;
        cfg.try_into()
    }
}
