//! MQTT-SN v1.2 protocol implementation for embedded systems.
//!
//! MQTT-SN (MQTT for Sensor Networks) adapts the MQTT publish-subscribe
//! model to datagram transports and devices that cannot afford a TCP stack.
//! The two defining differences from MQTT proper:
//!
//! - **Frames, not streams**: every message is one self-contained datagram
//!   with a 1-byte length prefix.
//! - **Topic ids, not topic strings**: a 16-bit topic id, negotiated with
//!   the gateway through REGISTER/REGACK or assigned in SUBACK, replaces the
//!   topic string in PUBLISH frames.
//!
//! # Module layout
//!
//! - [`frame`] — the wire codec: a typed [`Frame`](frame::Frame) enum with
//!   allocation-free encode/decode
//! - [`topics`] — the topic-name ⇄ topic-id registry
//! - [`pending`] — the in-flight message table (retry, backoff, retirement)
//! - [`queue`] — the SPSC inbound packet queue
//! - [`client`] — the [`Client`](client::Client) state machine tying it all
//!   together
//!
//! # Usage
//!
//! ```rust,no_run
//! # use tinysn::network::UdpSocket;
//! # use tinysn::time::{Clock, Delay};
//! use tinysn::network::application::mqttsn::client::{Client, Options};
//! use tinysn::network::application::mqttsn::QoS;
//!
//! # fn demo<S: UdpSocket, P: Clock + Delay>(socket: S, platform: P) -> Result<(), tinysn::network::error::Error> {
//! let mut client = Client::new(socket, platform, "192.168.1.10:1884")?;
//! client.connect(Options {
//!     client_id: "pico-cam-01",
//!     keep_alive_seconds: 60,
//!     clean_session: true,
//! })?;
//!
//! client.publish("sensors/temp", b"23.5", QoS::AtLeastOnce)?;
//! while let Some(message) = client.poll()? {
//!     // route by message.topic
//! }
//! # Ok(())
//! # }
//! ```

/// Frame codec: typed encode/decode of MQTT-SN v1.2 messages.
pub mod frame;

/// Topic-name ⇄ topic-id registry.
pub mod topics;

/// Pending-message table for in-flight acknowledged sends.
pub mod pending;

/// Inbound packet queue (single producer, single consumer).
pub mod queue;

/// The MQTT-SN client state machine.
pub mod client;

// Message type codes, MQTT-SN v1.2 §5.2.1. The client emits and consumes a
// subset; the rest are declared so ingress can classify them.
/// ADVERTISE message type.
pub const MSG_ADVERTISE: u8 = 0x00;
/// SEARCHGW message type.
pub const MSG_SEARCHGW: u8 = 0x01;
/// GWINFO message type.
pub const MSG_GWINFO: u8 = 0x02;
/// CONNECT message type.
pub const MSG_CONNECT: u8 = 0x04;
/// CONNACK message type.
pub const MSG_CONNACK: u8 = 0x05;
/// WILLTOPICREQ message type.
pub const MSG_WILLTOPICREQ: u8 = 0x06;
/// WILLTOPIC message type.
pub const MSG_WILLTOPIC: u8 = 0x07;
/// WILLMSGREQ message type.
pub const MSG_WILLMSGREQ: u8 = 0x08;
/// WILLMSG message type.
pub const MSG_WILLMSG: u8 = 0x09;
/// REGISTER message type.
pub const MSG_REGISTER: u8 = 0x0A;
/// REGACK message type.
pub const MSG_REGACK: u8 = 0x0B;
/// PUBLISH message type.
pub const MSG_PUBLISH: u8 = 0x0C;
/// PUBACK message type.
pub const MSG_PUBACK: u8 = 0x0D;
/// PUBCOMP message type.
pub const MSG_PUBCOMP: u8 = 0x0E;
/// PUBREC message type.
pub const MSG_PUBREC: u8 = 0x0F;
/// PUBREL message type.
pub const MSG_PUBREL: u8 = 0x10;
/// SUBSCRIBE message type.
pub const MSG_SUBSCRIBE: u8 = 0x12;
/// SUBACK message type.
pub const MSG_SUBACK: u8 = 0x13;
/// UNSUBSCRIBE message type.
pub const MSG_UNSUBSCRIBE: u8 = 0x14;
/// UNSUBACK message type.
pub const MSG_UNSUBACK: u8 = 0x15;
/// PINGREQ message type.
pub const MSG_PINGREQ: u8 = 0x16;
/// PINGRESP message type.
pub const MSG_PINGRESP: u8 = 0x17;
/// DISCONNECT message type.
pub const MSG_DISCONNECT: u8 = 0x18;

/// Protocol id carried in CONNECT; MQTT-SN v1.2 fixes this at 0x01.
pub const PROTOCOL_ID: u8 = 0x01;

/// Largest frame the short length form can describe.
pub const MAX_FRAME: usize = 255;

/// Size of the raw datagram buffers the client moves around.
pub const MAX_PACKET: usize = 256;

/// Longest topic name the registry accepts.
pub const MAX_TOPIC_LEN: usize = 64;

/// Largest PUBLISH payload: [`MAX_FRAME`] minus the 7-byte PUBLISH overhead
/// (length, type, flags, topic id, msg id).
pub const MAX_PAYLOAD: usize = MAX_FRAME - 7;

/// Quality of Service levels for MQTT-SN messages.
///
/// QoS defines the delivery guarantee for a specific message. Higher levels
/// cost more round trips with the gateway and more client state.
///
/// # Examples
///
/// ```rust
/// use tinysn::network::application::mqttsn::QoS;
///
/// assert_eq!(QoS::AtMostOnce as u8, 0);
/// assert_eq!(QoS::AtLeastOnce as u8, 1);
/// assert_eq!(QoS::ExactlyOnce as u8, 2);
/// ```
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum QoS {
    /// **QoS 0**: at most once. Fire and forget; the datagram may be lost.
    AtMostOnce = 0,
    /// **QoS 1**: at least once. Acknowledged by PUBACK; duplicates possible.
    AtLeastOnce = 1,
    /// **QoS 2**: exactly once. Full PUBREC/PUBREL/PUBCOMP handshake.
    ExactlyOnce = 2,
}

impl QoS {
    /// Decodes the two QoS bits of a flags byte. `0b11` (the reserved "QoS
    /// -1" of MQTT-SN) is not supported and yields `None`.
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits & 0x03 {
            0 => Some(QoS::AtMostOnce),
            1 => Some(QoS::AtLeastOnce),
            2 => Some(QoS::ExactlyOnce),
            _ => None,
        }
    }
}

/// Return codes carried in CONNACK, REGACK, SUBACK and PUBACK.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ReturnCode {
    /// 0x00 — accepted.
    Accepted,
    /// 0x01 — rejected: congestion.
    Congestion,
    /// 0x02 — rejected: invalid topic id.
    InvalidTopicId,
    /// 0x03 — rejected: not supported.
    NotSupported,
}

impl ReturnCode {
    /// Decodes a return-code byte; codes outside the v1.2 table are treated
    /// as malformed by the caller.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(ReturnCode::Accepted),
            0x01 => Some(ReturnCode::Congestion),
            0x02 => Some(ReturnCode::InvalidTopicId),
            0x03 => Some(ReturnCode::NotSupported),
            _ => None,
        }
    }

    /// The wire byte for this code.
    pub fn as_u8(self) -> u8 {
        match self {
            ReturnCode::Accepted => 0x00,
            ReturnCode::Congestion => 0x01,
            ReturnCode::InvalidTopicId => 0x02,
            ReturnCode::NotSupported => 0x03,
        }
    }
}

/// How a PUBLISH/SUBSCRIBE frame identifies its topic (flag bits 0–1).
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum TopicIdType {
    /// A normal, gateway-assigned 16-bit topic id.
    Normal = 0,
    /// A pre-defined topic id, fixed by out-of-band agreement.
    Predefined = 1,
    /// A two-character short topic name carried in the id field.
    Short = 2,
}

impl TopicIdType {
    /// Decodes the two topic-id-type bits of a flags byte; `0b11` is
    /// reserved.
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits & 0x03 {
            0 => Some(TopicIdType::Normal),
            1 => Some(TopicIdType::Predefined),
            2 => Some(TopicIdType::Short),
            _ => None,
        }
    }
}

/// The MQTT-SN flags byte.
///
/// Layout (bit 7 to bit 0): DUP, QoS (2 bits), retain, will, clean session,
/// topic id type (2 bits). The client never sets DUP itself; retransmissions
/// go out byte-identical to the original frame.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Flags {
    /// Duplicate delivery marker.
    pub dup: bool,
    /// Requested/granted Quality of Service.
    pub qos: QoS,
    /// Retain flag.
    pub retain: bool,
    /// Will flag (CONNECT only; unsupported here, always encoded clear).
    pub will: bool,
    /// Clean-session flag (CONNECT and SUBSCRIBE).
    pub clean_session: bool,
    /// How the topic field is to be interpreted.
    pub topic_id_type: TopicIdType,
}

impl Flags {
    /// Flags for a plain frame: QoS 0, nothing set, normal topic id.
    pub const fn plain() -> Self {
        Self {
            dup: false,
            qos: QoS::AtMostOnce,
            retain: false,
            will: false,
            clean_session: false,
            topic_id_type: TopicIdType::Normal,
        }
    }

    /// Flags for a PUBLISH at the given QoS with a normal topic id.
    pub fn publish(qos: QoS) -> Self {
        Self {
            qos,
            ..Self::plain()
        }
    }

    /// Encodes to the wire byte.
    pub fn encode(self) -> u8 {
        let mut byte = (self.qos as u8) << 5;
        if self.dup {
            byte |= 0x80;
        }
        if self.retain {
            byte |= 0x10;
        }
        if self.will {
            byte |= 0x08;
        }
        if self.clean_session {
            byte |= 0x04;
        }
        byte | self.topic_id_type as u8
    }

    /// Decodes a wire byte; `None` for reserved QoS or topic-id-type values.
    pub fn decode(byte: u8) -> Option<Self> {
        Some(Self {
            dup: byte & 0x80 != 0,
            qos: QoS::from_bits((byte >> 5) & 0x03)?,
            retain: byte & 0x10 != 0,
            will: byte & 0x08 != 0,
            clean_session: byte & 0x04 != 0,
            topic_id_type: TopicIdType::from_bits(byte & 0x03)?,
        })
    }
}

impl Default for Flags {
    fn default() -> Self {
        Self::plain()
    }
}
