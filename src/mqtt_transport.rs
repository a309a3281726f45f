use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use mqtt::control::variable_header::ConnectReturnCode;
use mqtt::packet::*;
use mqtt::topic_name::TopicNameError;
use mqtt::Encodable;
use mqtt::TopicName;
use tokio::io::{AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_native_tls::{TlsConnector, TlsStream};
use tokio_util::sync::CancellationToken;

use crate::error::IoTHubError;
use crate::message::Message;
use crate::token::TokenProvider;
use crate::transport::{ConnectionHandle, TransportCandidate, TransportKind, TransportSettings};

const API_VERSION: &str = "2018-06-30";

fn cloud_bound_messages_topic(device_id: &str) -> String {
    format!("devices/{}/messages/events/", device_id)
}

fn encode_error<E: fmt::Debug>(err: E) -> IoTHubError {
    IoTHubError::Protocol(format!("Failed to encode packet {:?}", err))
}

async fn tls_connect(iot_hub: &str, port: u16) -> crate::Result<TlsStream<TcpStream>> {
    let socket = TcpStream::connect((iot_hub, port)).await?;

    trace!("Connected to tcp socket {:?}", socket);

    let cx = TlsConnector::from(
        native_tls::TlsConnector::builder()
            .min_protocol_version(Some(native_tls::Protocol::Tlsv12))
            .build()?,
    );

    let socket = cx.connect(iot_hub, socket).await?;

    trace!("Connected tls context {:?}", cx);

    Ok(socket)
}

async fn mqtt_connect(
    iot_hub: &str,
    port: u16,
    device_id: &str,
    keep_alive: u16,
    username: String,
    password: String,
) -> crate::Result<TlsStream<TcpStream>> {
    let mut socket = tls_connect(iot_hub, port).await?;

    let mut conn = ConnectPacket::new(device_id);
    conn.set_client_identifier(device_id);
    conn.set_clean_session(false);
    conn.set_keep_alive(keep_alive);
    conn.set_user_name(Some(username));
    conn.set_password(Some(password));

    let mut buf = Vec::new();
    conn.encode(&mut buf).map_err(encode_error)?;
    socket.write_all(&buf[..]).await?;

    let packet = VariablePacket::parse(&mut socket).await;

    trace!("PACKET {:?}", packet);
    match packet {
        Ok(VariablePacket::ConnackPacket(connack)) => {
            if connack.connect_return_code() != ConnectReturnCode::ConnectionAccepted {
                return Err(IoTHubError::ConnectionRefused(format!(
                    "{:?}",
                    connack.connect_return_code()
                )));
            }
        }
        Ok(pck) => {
            return Err(IoTHubError::Protocol(format!(
                "Unexpected packet received after connect {:?}",
                pck
            )))
        }
        Err(err) => {
            return Err(IoTHubError::Protocol(format!(
                "Error decoding connack packet {:?}",
                err
            )))
        }
    }

    Ok(socket)
}

fn build_topic_name(
    base_topic: &TopicName,
    message: &Message,
) -> Result<TopicName, TopicNameError> {
    let capacity = message.system_properties.len() + message.properties.len();
    let mut props = std::collections::HashMap::with_capacity(capacity);
    props.extend(message.system_properties.iter());
    props.extend(message.properties.iter());

    // if we reuse the base_topic string as the target for the serializer,
    // we end up with an extra ampersand before the key/value pairs
    let encoded = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(props.iter())
        .finish();
    TopicName::new(format!("{}{}", base_topic.to_string(), encoded))
}

struct MqttConnection {
    write_socket: Mutex<WriteHalf<TlsStream<TcpStream>>>,
    read_socket: Mutex<ReadHalf<TlsStream<TcpStream>>>,
    d2c_topic: TopicName,
}

/// MQTT 3.1.1 connection over TLS on TCP
pub struct MqttHandle {
    hub_name: String,
    device_id: String,
    token_source: TokenProvider,
    settings: TransportSettings,
    port: u16,
    connection: Option<MqttConnection>,
    usable: AtomicBool,
    disposed: bool,
}

impl fmt::Debug for MqttHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MqttHandle")
            .field("hub_name", &self.hub_name)
            .field("device_id", &self.device_id)
            .field("port", &self.port)
            .field("connected", &self.connection.is_some())
            .field("usable", &self.is_usable())
            .finish()
    }
}

impl MqttHandle {
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
            connection: None,
            usable: AtomicBool::new(false),
            disposed: false,
        }
    }

    fn connection(&self) -> crate::Result<&MqttConnection> {
        match &self.connection {
            Some(connection) if self.is_usable() => Ok(connection),
            _ => Err(IoTHubError::NotConnected),
        }
    }

    async fn write_packet(&self, buf: &[u8]) -> crate::Result<()> {
        let connection = self.connection()?;
        let result = connection.write_socket.lock().await.write_all(buf).await;
        if let Err(e) = result {
            warn!("MQTT write failed, marking connection unusable: {}", e);
            self.usable.store(false, Ordering::SeqCst);
            return Err(e.into());
        }
        Ok(())
    }

    async fn await_pingresp(&self) -> crate::Result<()> {
        let connection = self.connection()?;
        let mut socket = connection.read_socket.lock().await;
        loop {
            match VariablePacket::parse(&mut *socket).await {
                Ok(VariablePacket::PingrespPacket(..)) => {
                    info!("Receiving PINGRESP from broker ..");
                    return Ok(());
                }
                Ok(packet) => trace!("Ignoring PACKET {:?} while waiting for PINGRESP", packet),
                Err(err) => {
                    return Err(IoTHubError::Protocol(format!(
                        "Error in receiving packet {:?}",
                        err
                    )))
                }
            }
        }
    }
}

#[async_trait]
impl ConnectionHandle for MqttHandle {
    fn kind(&self) -> TransportKind {
        TransportKind::MqttTcp
    }

    async fn open(&mut self, cancel: &CancellationToken) -> crate::Result<()> {
        if self.disposed {
            return Err(IoTHubError::NotConnected);
        }
        if self.connection.is_some() {
            return Ok(());
        }

        let user_name = format!(
            "{}/{}/?api-version={}",
            self.hub_name, self.device_id, API_VERSION
        );

        let expiry = Utc::now() + Duration::days(1);
        trace!("Generating token that will expire at {}", expiry);
        let token = self.token_source.get(&expiry)?;

        let attempt = mqtt_connect(
            &self.hub_name,
            self.port,
            &self.device_id,
            self.settings.keep_alive_secs,
            user_name,
            token,
        );

        let socket = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(IoTHubError::Cancelled),
            result = tokio::time::timeout(self.settings.connect_timeout(), attempt) => {
                result.map_err(|_| IoTHubError::Timeout)??
            }
        };

        let (read_socket, write_socket) = tokio::io::split(socket);
        let d2c_topic = TopicName::new(cloud_bound_messages_topic(&self.device_id))
            .map_err(|e| IoTHubError::Protocol(format!("Invalid device topic {:?}", e)))?;

        self.connection = Some(MqttConnection {
            write_socket: Mutex::new(write_socket),
            read_socket: Mutex::new(read_socket),
            d2c_topic,
        });
        self.usable.store(true, Ordering::SeqCst);

        Ok(())
    }

    fn is_usable(&self) -> bool {
        self.usable.load(Ordering::SeqCst)
    }

    async fn dispose(&mut self) -> crate::Result<()> {
        if self.disposed {
            return Ok(());
        }
        self.disposed = true;
        self.usable.store(false, Ordering::SeqCst);

        let connection = match self.connection.take() {
            Some(connection) => connection,
            None => return Ok(()),
        };

        trace!("Sending DISCONNECT to broker");
        let mut buf = Vec::new();
        DisconnectPacket::new()
            .encode(&mut buf)
            .map_err(encode_error)?;

        let mut socket = connection.write_socket.lock().await;
        socket.write_all(&buf).await?;
        socket.shutdown().await?;

        Ok(())
    }

    async fn send_message(&self, message: Message) -> crate::Result<()> {
        let connection = self.connection()?;
        let full_topic = build_topic_name(&connection.d2c_topic, &message)
            .map_err(|e| IoTHubError::Protocol(format!("Invalid message topic {:?}", e)))?;
        trace!("Sending message {:?} to topic {:?}", message, full_topic);
        let publish_packet =
            PublishPacket::new(full_topic, QoSWithPacketIdentifier::Level0, message.body);
        let mut buf = Vec::new();
        publish_packet.encode(&mut buf).map_err(encode_error)?;

        self.write_packet(&buf).await
    }

    async fn ping(&self) -> crate::Result<()> {
        info!("Sending PINGREQ to broker");

        let mut buf = Vec::new();
        PingreqPacket::new().encode(&mut buf).map_err(encode_error)?;
        self.write_packet(&buf).await?;

        let wait = std::time::Duration::from_secs(self.settings.keep_alive_secs.into());
        match tokio::time::timeout(wait, self.await_pingresp()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                self.usable.store(false, Ordering::SeqCst);
                Err(e)
            }
            Err(_) => {
                warn!("No PINGRESP within {:?}, marking connection unusable", wait);
                self.usable.store(false, Ordering::SeqCst);
                Err(IoTHubError::Timeout)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::SasTokenSource;
    use std::sync::Arc;

    fn handle() -> MqttHandle {
        MqttHandle::new(
            "myiothub.azure-devices.net",
            "FirstDevice",
            Arc::new(SasTokenSource::new("SharedAccessSignature sr=x")),
            &TransportCandidate::new(TransportKind::MqttTcp),
        )
    }

    #[test]
    fn content_type_is_appended_to_topic_name() {
        let message = Message::builder()
            .set_body(vec![])
            .set_content_type("application/json".to_owned())
            .build();

        let base_topic = TopicName::new("topic/").unwrap();

        let topic_with_properties = build_topic_name(&base_topic, &message).unwrap().to_string();

        assert_eq!("topic/%24.ct=application%2Fjson", topic_with_properties);
    }

    #[test]
    fn message_id_is_appended_to_topic_name() {
        let message = Message::builder()
            .set_body(vec![])
            .set_message_id("id".to_owned())
            .build();

        let base_topic = TopicName::new("topic/").unwrap();

        let topic_with_properties = build_topic_name(&base_topic, &message).unwrap().to_string();

        assert_eq!("topic/%24.mid=id", topic_with_properties);
    }

    #[test]
    fn no_system_properties() {
        let message = Message::new(vec![]);
        let base_topic = TopicName::new("topic/").unwrap();
        let actual = build_topic_name(&base_topic, &message).unwrap();
        assert_eq!(base_topic, actual);
    }

    #[test]
    fn app_properties_are_appended_to_topic_name() {
        let message = Message::builder()
            .set_body(vec![])
            .add_message_property("foo".to_owned(), "bar".to_owned())
            .build();

        let base_topic = TopicName::new("topic/").unwrap();

        let topic_with_properties = build_topic_name(&base_topic, &message).unwrap().to_string();

        assert_eq!("topic/foo=bar", topic_with_properties);
    }

    #[test]
    fn unopened_handle_is_not_usable() {
        let handle = handle();
        assert!(!handle.is_usable());
        assert_eq!(handle.kind(), TransportKind::MqttTcp);
        assert_eq!(handle.port, 8883);
    }

    #[tokio::test]
    async fn send_before_open_is_rejected() {
        let handle = handle();
        let err = handle.send_message(Message::new(vec![1])).await.unwrap_err();
        assert!(matches!(err, IoTHubError::NotConnected));
    }

    #[tokio::test]
    async fn dispose_is_idempotent_and_blocks_reopen() {
        let mut handle = handle();
        handle.dispose().await.unwrap();
        handle.dispose().await.unwrap();

        let err = handle.open(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, IoTHubError::NotConnected));
    }

    #[tokio::test]
    async fn cancelled_token_aborts_open() {
        let mut handle = handle();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = handle.open(&cancel).await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(!handle.is_usable());
    }
}
