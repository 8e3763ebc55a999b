//! ESP-IDF MQTT transport.
//!
//! Implements [`MqttTransport`] over `esp_idf_svc::mqtt::client`. The
//! esp-mqtt component owns its own socket and task, so the phases map as:
//!
//! | Operation           | ESP-IDF                                    |
//! |---------------------|--------------------------------------------|
//! | `connect`           | TCP reachability probe of the broker       |
//! | `establish_session` | `EspMqttClient::new_cb` (sends CONNECT)    |
//! | `publish`           | `EspMqttClient::publish`                   |
//! | `subscribe`         | `EspMqttClient::subscribe`                 |
//! | `disconnect`        | client teardown (DISCONNECT + stop)        |
//! | `close`             | forget the probed connection               |
//!
//! Client events arrive on the esp-mqtt task and are forwarded to the
//! [`SessionLink`] callbacks.

use core::time::Duration;
use std::net::{SocketAddr, SocketAddrV4, TcpStream};

use esp_idf_svc::mqtt::client::{
    Details, EspMqttClient, EspMqttEvent, EventPayload, MqttClientConfiguration, QoS as EspQoS,
};
use log::{debug, error, info, warn};

use crate::config::AgentConfig;
use crate::error::TransportError;
use crate::pubsub::link::SessionLink;
use crate::pubsub::queue::QoS;
use crate::pubsub::transport::{MqttTransport, OutboundMessage, PacketType};

pub struct EspMqttTransport {
    broker: SocketAddrV4,
    connect_timeout: Duration,
    link: &'static SessionLink,
    reachable: bool,
    client: Option<EspMqttClient<'static>>,
}

impl EspMqttTransport {
    pub fn new(config: &AgentConfig, link: &'static SessionLink) -> Self {
        Self {
            broker: SocketAddrV4::new(config.broker_addr, config.broker_port),
            connect_timeout: Duration::from_millis(u64::from(config.net_init_timeout_ms)),
            link,
            reachable: false,
            client: None,
        }
    }

    fn client(&mut self) -> Result<&mut EspMqttClient<'static>, TransportError> {
        self.client.as_mut().ok_or(TransportError::NotConnected)
    }
}

fn esp_qos(qos: QoS) -> EspQoS {
    match qos {
        QoS::AtMostOnce => EspQoS::AtMostOnce,
        QoS::AtLeastOnce => EspQoS::AtLeastOnce,
        QoS::ExactlyOnce => EspQoS::ExactlyOnce,
    }
}

/// Message ids are 16-bit on the wire; esp-mqtt widens them.
fn packet_id(id: u32) -> u16 {
    id as u16
}

fn forward_event(link: &SessionLink, event: &EspMqttEvent<'_>) {
    match event.payload() {
        EventPayload::Connected(session_present) => {
            debug!("mqtt: CONNACK (session present: {session_present})");
            link.on_connect();
        }
        EventPayload::Disconnected => link.on_disconnect(),
        EventPayload::Subscribed(id) => {
            let _ = link.on_subscribe_ack(packet_id(id), &[]);
        }
        EventPayload::Unsubscribed(id) => {
            let _ = link.on_unsubscribe_ack(packet_id(id));
        }
        EventPayload::Published(id) => {
            let _ = link.on_publish_ack(packet_id(id), PacketType::Puback);
        }
        EventPayload::Received {
            id,
            topic: Some(topic),
            data,
            details: Details::Complete,
        } => {
            let _ = link.on_publish_received(packet_id(id), PacketType::Publish, topic, data);
        }
        EventPayload::Received { id, .. } => {
            warn!("mqtt: fragmented message {id} dropped");
        }
        EventPayload::Error(e) => {
            error!("mqtt: client error: {e:?}");
            link.on_malformed(0);
        }
        _ => {}
    }
}

impl MqttTransport for EspMqttTransport {
    type Error = TransportError;

    fn connect(&mut self) -> Result<(), TransportError> {
        let stream = TcpStream::connect_timeout(&SocketAddr::V4(self.broker), self.connect_timeout)
            .map_err(|e| TransportError::Connect(e.raw_os_error().unwrap_or(-1)))?;
        drop(stream);
        self.reachable = true;
        info!("mqtt: broker {} reachable", self.broker);
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.client = None;
        self.reachable = false;
        debug!("mqtt: transport closed");
        Ok(())
    }

    fn establish_session(&mut self, credential: &str, clean_session: bool) -> Result<(), TransportError> {
        if !self.reachable {
            return Err(TransportError::NotConnected);
        }
        // A retry replaces the previous client and its half-open session.
        self.client = None;

        let url = format!("mqtt://{}", self.broker);
        let conf = MqttClientConfiguration {
            client_id: Some(credential),
            username: Some(credential),
            disable_clean_session: !clean_session,
            ..Default::default()
        };
        let link = self.link;
        let client = EspMqttClient::new_cb(&url, &conf, move |event| forward_event(link, &event))
            .map_err(|e| TransportError::Session(e.code()))?;
        self.client = Some(client);
        debug!("mqtt: CONNECT sent to {url}");
        Ok(())
    }

    fn publish(&mut self, message: &OutboundMessage<'_>) -> Result<(), TransportError> {
        let client = self.client()?;
        client
            .publish(message.topic, esp_qos(message.qos), false, message.payload)
            .map(|_| ())
            .map_err(|e| TransportError::Publish(e.code()))
    }

    fn subscribe(&mut self, _packet_id: u16, topic: &str, qos: QoS) -> Result<(), TransportError> {
        // esp-mqtt assigns its own message id.
        let client = self.client()?;
        client
            .subscribe(topic, esp_qos(qos))
            .map(|_| ())
            .map_err(|e| TransportError::Subscribe(e.code()))
    }

    fn disconnect(&mut self) -> Result<(), TransportError> {
        match self.client.take() {
            Some(client) => {
                drop(client);
                info!("mqtt: session closed");
                Ok(())
            }
            None => Err(TransportError::NotConnected),
        }
    }
}
