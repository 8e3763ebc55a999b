//! MQTT transport abstraction.
//!
//! The session state machine is generic over [`MqttTransport`]; the wire
//! protocol itself lives behind it (the ESP-IDF client on hardware, scripted
//! mocks in tests). Results coming back from the broker are reported through
//! the callbacks on [`super::link::SessionLink`] rather than through return
//! values, because they arrive on the transport's own task.

use super::queue::QoS;

/// A payload ready for the wire.
#[derive(Debug, Clone, Copy)]
pub struct OutboundMessage<'a> {
    pub topic: &'a str,
    pub payload: &'a [u8],
    pub qos: QoS,
    pub packet_id: u16,
}

pub trait MqttTransport {
    type Error: core::fmt::Debug;

    /// Open the network connection to the broker.
    fn connect(&mut self) -> Result<(), Self::Error>;

    /// Tear down the network connection.
    fn close(&mut self) -> Result<(), Self::Error>;

    /// Send CONNECT with the device credential. Acceptance is reported
    /// asynchronously through `SessionLink::on_connect`.
    fn establish_session(&mut self, credential: &str, clean_session: bool) -> Result<(), Self::Error>;

    fn publish(&mut self, message: &OutboundMessage<'_>) -> Result<(), Self::Error>;

    fn subscribe(&mut self, packet_id: u16, topic: &str, qos: QoS) -> Result<(), Self::Error>;

    /// Send DISCONNECT; the socket stays open until [`close`](Self::close).
    fn disconnect(&mut self) -> Result<(), Self::Error>;
}

/// MQTT control packet types, by their fixed-header code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    Connect = 1,
    Connack = 2,
    Publish = 3,
    Puback = 4,
    Pubrec = 5,
    Pubrel = 6,
    Pubcomp = 7,
    Subscribe = 8,
    Suback = 9,
    Unsubscribe = 10,
    Unsuback = 11,
    Pingreq = 12,
    Pingresp = 13,
    Disconnect = 14,
}

impl PacketType {
    pub fn from_u8(code: u8) -> Option<Self> {
        Some(match code {
            1 => Self::Connect,
            2 => Self::Connack,
            3 => Self::Publish,
            4 => Self::Puback,
            5 => Self::Pubrec,
            6 => Self::Pubrel,
            7 => Self::Pubcomp,
            8 => Self::Subscribe,
            9 => Self::Suback,
            10 => Self::Unsubscribe,
            11 => Self::Unsuback,
            12 => Self::Pingreq,
            13 => Self::Pingresp,
            14 => Self::Disconnect,
            _ => return None,
        })
    }

    /// Acknowledgements that complete an outbound publish.
    pub fn is_publish_ack(self) -> bool {
        matches!(self, Self::Puback | Self::Pubrec | Self::Pubcomp)
    }
}
