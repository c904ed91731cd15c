//! MQTT-SN v1.2 frame codec.
//!
//! Every MQTT-SN message is one datagram: a 1-byte length field (counting
//! itself), a message-type byte, then per-type fields with all multi-byte
//! integers big-endian. This module turns those datagrams into the typed
//! [`Frame`] enum and back.
//!
//! The codec is pure and never allocates: decoded frames borrow their
//! strings and payloads from the input buffer, and encoders write into a
//! caller-supplied buffer. Only the short length form is supported — frames
//! that would exceed 255 bytes are refused on encode and rejected on ingress.
//!
//! Field access goes through explicit byte accessors ([`read_u16_be`],
//! [`write_u16_be`]) rather than any struct-layout tricks, so the codec is
//! endian-agnostic and free of alignment traps.

#![deny(unsafe_code)]

use super::{
    Flags, MAX_FRAME, MSG_CONNACK, MSG_CONNECT, MSG_DISCONNECT, MSG_PINGREQ, MSG_PINGRESP,
    MSG_PUBACK, MSG_PUBCOMP, MSG_PUBLISH, MSG_PUBREC, MSG_PUBREL, MSG_REGACK, MSG_REGISTER,
    MSG_SUBACK, MSG_SUBSCRIBE, PROTOCOL_ID, TopicIdType,
};
use crate::network::error::Error;

/// Reads a big-endian `u16` at `offset`. The caller guarantees bounds.
#[inline]
pub fn read_u16_be(buf: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([buf[offset], buf[offset + 1]])
}

/// Writes a big-endian `u16` at `offset`. The caller guarantees bounds.
#[inline]
pub fn write_u16_be(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_be_bytes());
}

/// The topic field of a SUBSCRIBE frame.
///
/// Subscription by name is the only form this client emits; id and
/// short-name forms are parsed for completeness.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum TopicRef<'a> {
    /// A full topic name (topic-id-type 0 on the wire for SUBSCRIBE).
    Name(&'a str),
    /// A pre-defined 16-bit topic id.
    Id(u16),
    /// A two-character short topic name.
    Short([u8; 2]),
}

/// A decoded MQTT-SN frame.
///
/// Variants mirror the v1.2 message set this client exchanges with the
/// gateway; fields are listed in wire order. Borrowed fields point into the
/// buffer the frame was decoded from.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Frame<'a> {
    /// CONNECT: open a session with the gateway.
    Connect {
        /// Flags byte; only `clean_session` is meaningful here.
        flags: Flags,
        /// Keep-alive duration in seconds.
        duration: u16,
        /// Client identifier (1..=249 bytes).
        client_id: &'a str,
    },
    /// CONNACK: gateway's answer to CONNECT.
    Connack {
        /// 0x00 accepted, otherwise the rejection reason.
        return_code: u8,
    },
    /// REGISTER: bind a topic name to a topic id (either direction).
    Register {
        /// Topic id; 0 when the client is asking for an assignment.
        topic_id: u16,
        /// Message id correlating the REGACK.
        msg_id: u16,
        /// The topic name being registered.
        topic_name: &'a str,
    },
    /// REGACK: answer to REGISTER.
    Regack {
        /// The assigned (or echoed) topic id.
        topic_id: u16,
        /// Echo of the REGISTER's message id.
        msg_id: u16,
        /// 0x00 accepted, otherwise the rejection reason.
        return_code: u8,
    },
    /// PUBLISH: application payload on a topic id.
    Publish {
        /// Flags: QoS, retain, DUP, topic-id type.
        flags: Flags,
        /// Topic id (interpretation per `flags.topic_id_type`).
        topic_id: u16,
        /// Message id; 0 for QoS 0.
        msg_id: u16,
        /// Application payload.
        payload: &'a [u8],
    },
    /// PUBACK: QoS 1 acknowledgment (or rejection at any QoS).
    Puback {
        /// Echo of the PUBLISH's topic id.
        topic_id: u16,
        /// Echo of the PUBLISH's message id.
        msg_id: u16,
        /// 0x00 accepted, otherwise the rejection reason.
        return_code: u8,
    },
    /// PUBREC: first leg of the QoS 2 handshake.
    Pubrec {
        /// Echo of the PUBLISH's message id.
        msg_id: u16,
    },
    /// PUBREL: second leg of the QoS 2 handshake.
    Pubrel {
        /// Echo of the PUBLISH's message id.
        msg_id: u16,
    },
    /// PUBCOMP: final leg of the QoS 2 handshake.
    Pubcomp {
        /// Echo of the PUBLISH's message id.
        msg_id: u16,
    },
    /// SUBSCRIBE: request messages for a topic.
    Subscribe {
        /// Flags: requested QoS and topic-id type.
        flags: Flags,
        /// Message id correlating the SUBACK.
        msg_id: u16,
        /// Topic name or id being subscribed.
        topic: TopicRef<'a>,
    },
    /// SUBACK: answer to SUBSCRIBE.
    Suback {
        /// Flags: granted QoS.
        flags: Flags,
        /// Assigned topic id; 0 for wildcard filters.
        topic_id: u16,
        /// Echo of the SUBSCRIBE's message id.
        msg_id: u16,
        /// 0x00 accepted, otherwise the rejection reason.
        return_code: u8,
    },
    /// PINGREQ: keep-alive probe.
    Pingreq,
    /// PINGRESP: keep-alive answer.
    Pingresp,
    /// DISCONNECT: session teardown; a duration would request sleep state.
    Disconnect {
        /// Sleep duration in seconds, if the peer requested sleeping state.
        duration: Option<u16>,
    },
}

impl<'a> Frame<'a> {
    /// Encodes the frame into `buf`, returning the number of bytes written.
    ///
    /// The first byte of the output always equals the total encoded length.
    ///
    /// # Errors
    ///
    /// * [`Error::PayloadTooLarge`] — the frame would exceed the 255-byte
    ///   short form
    /// * [`Error::NoMem`] — `buf` is too small for the frame
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize, Error> {
        let len = self.encoded_len();
        if len > MAX_FRAME {
            return Err(Error::PayloadTooLarge);
        }
        if buf.len() < len {
            return Err(Error::NoMem);
        }

        buf[0] = len as u8;
        match *self {
            Frame::Connect {
                flags,
                duration,
                client_id,
            } => {
                buf[1] = MSG_CONNECT;
                buf[2] = flags.encode();
                buf[3] = PROTOCOL_ID;
                write_u16_be(buf, 4, duration);
                buf[6..len].copy_from_slice(client_id.as_bytes());
            }
            Frame::Connack { return_code } => {
                buf[1] = MSG_CONNACK;
                buf[2] = return_code;
            }
            Frame::Register {
                topic_id,
                msg_id,
                topic_name,
            } => {
                buf[1] = MSG_REGISTER;
                write_u16_be(buf, 2, topic_id);
                write_u16_be(buf, 4, msg_id);
                buf[6..len].copy_from_slice(topic_name.as_bytes());
            }
            Frame::Regack {
                topic_id,
                msg_id,
                return_code,
            } => {
                buf[1] = MSG_REGACK;
                write_u16_be(buf, 2, topic_id);
                write_u16_be(buf, 4, msg_id);
                buf[6] = return_code;
            }
            Frame::Publish {
                flags,
                topic_id,
                msg_id,
                payload,
            } => {
                buf[1] = MSG_PUBLISH;
                buf[2] = flags.encode();
                write_u16_be(buf, 3, topic_id);
                write_u16_be(buf, 5, msg_id);
                buf[7..len].copy_from_slice(payload);
            }
            Frame::Puback {
                topic_id,
                msg_id,
                return_code,
            } => {
                buf[1] = MSG_PUBACK;
                write_u16_be(buf, 2, topic_id);
                write_u16_be(buf, 4, msg_id);
                buf[6] = return_code;
            }
            Frame::Pubrec { msg_id } => {
                buf[1] = MSG_PUBREC;
                write_u16_be(buf, 2, msg_id);
            }
            Frame::Pubrel { msg_id } => {
                buf[1] = MSG_PUBREL;
                write_u16_be(buf, 2, msg_id);
            }
            Frame::Pubcomp { msg_id } => {
                buf[1] = MSG_PUBCOMP;
                write_u16_be(buf, 2, msg_id);
            }
            Frame::Subscribe {
                flags,
                msg_id,
                topic,
            } => {
                buf[1] = MSG_SUBSCRIBE;
                buf[2] = flags.encode();
                write_u16_be(buf, 3, msg_id);
                match topic {
                    TopicRef::Name(name) => buf[5..len].copy_from_slice(name.as_bytes()),
                    TopicRef::Id(id) => write_u16_be(buf, 5, id),
                    TopicRef::Short(short) => buf[5..7].copy_from_slice(&short),
                }
            }
            Frame::Suback {
                flags,
                topic_id,
                msg_id,
                return_code,
            } => {
                buf[1] = MSG_SUBACK;
                buf[2] = flags.encode();
                write_u16_be(buf, 3, topic_id);
                write_u16_be(buf, 5, msg_id);
                buf[7] = return_code;
            }
            Frame::Pingreq => buf[1] = MSG_PINGREQ,
            Frame::Pingresp => buf[1] = MSG_PINGRESP,
            Frame::Disconnect { duration } => {
                buf[1] = MSG_DISCONNECT;
                if let Some(seconds) = duration {
                    write_u16_be(buf, 2, seconds);
                }
            }
        }
        Ok(len)
    }

    /// Total encoded length of this frame, including the length byte.
    pub fn encoded_len(&self) -> usize {
        match *self {
            Frame::Connect { client_id, .. } => 6 + client_id.len(),
            Frame::Connack { .. } => 3,
            Frame::Register { topic_name, .. } => 6 + topic_name.len(),
            Frame::Regack { .. } => 7,
            Frame::Publish { payload, .. } => 7 + payload.len(),
            Frame::Puback { .. } => 7,
            Frame::Pubrec { .. } | Frame::Pubrel { .. } | Frame::Pubcomp { .. } => 4,
            Frame::Subscribe { topic, .. } => match topic {
                TopicRef::Name(name) => 5 + name.len(),
                TopicRef::Id(_) | TopicRef::Short(_) => 7,
            },
            Frame::Suback { .. } => 8,
            Frame::Pingreq | Frame::Pingresp => 2,
            Frame::Disconnect { duration } => {
                if duration.is_some() {
                    4
                } else {
                    2
                }
            }
        }
    }

    /// Decodes one frame from `buf`.
    ///
    /// # Errors
    ///
    /// [`Error::Malformed`] for a short header, a length byte that does not
    /// match the datagram, an unknown or unsupported message type, an
    /// invalid flag combination, a wrong protocol id, or non-UTF-8 topic
    /// text.
    pub fn decode(buf: &'a [u8]) -> Result<Frame<'a>, Error> {
        if buf.len() < 2 {
            return Err(Error::Malformed);
        }
        let len = buf[0] as usize;
        if len != buf.len() || len < 2 {
            return Err(Error::Malformed);
        }

        match buf[1] {
            MSG_CONNECT => {
                if len < 6 {
                    return Err(Error::Malformed);
                }
                let flags = Flags::decode(buf[2]).ok_or(Error::Malformed)?;
                if buf[3] != PROTOCOL_ID {
                    return Err(Error::Malformed);
                }
                let client_id =
                    core::str::from_utf8(&buf[6..len]).map_err(|_| Error::Malformed)?;
                Ok(Frame::Connect {
                    flags,
                    duration: read_u16_be(buf, 4),
                    client_id,
                })
            }
            MSG_CONNACK => {
                if len != 3 {
                    return Err(Error::Malformed);
                }
                Ok(Frame::Connack {
                    return_code: buf[2],
                })
            }
            MSG_REGISTER => {
                if len < 7 {
                    return Err(Error::Malformed);
                }
                let topic_name =
                    core::str::from_utf8(&buf[6..len]).map_err(|_| Error::Malformed)?;
                Ok(Frame::Register {
                    topic_id: read_u16_be(buf, 2),
                    msg_id: read_u16_be(buf, 4),
                    topic_name,
                })
            }
            MSG_REGACK => {
                if len != 7 {
                    return Err(Error::Malformed);
                }
                Ok(Frame::Regack {
                    topic_id: read_u16_be(buf, 2),
                    msg_id: read_u16_be(buf, 4),
                    return_code: buf[6],
                })
            }
            MSG_PUBLISH => {
                if len < 7 {
                    return Err(Error::Malformed);
                }
                let flags = Flags::decode(buf[2]).ok_or(Error::Malformed)?;
                Ok(Frame::Publish {
                    flags,
                    topic_id: read_u16_be(buf, 3),
                    msg_id: read_u16_be(buf, 5),
                    payload: &buf[7..len],
                })
            }
            MSG_PUBACK => {
                if len != 7 {
                    return Err(Error::Malformed);
                }
                Ok(Frame::Puback {
                    topic_id: read_u16_be(buf, 2),
                    msg_id: read_u16_be(buf, 4),
                    return_code: buf[6],
                })
            }
            MSG_PUBREC | MSG_PUBREL | MSG_PUBCOMP => {
                if len != 4 {
                    return Err(Error::Malformed);
                }
                let msg_id = read_u16_be(buf, 2);
                Ok(match buf[1] {
                    MSG_PUBREC => Frame::Pubrec { msg_id },
                    MSG_PUBREL => Frame::Pubrel { msg_id },
                    _ => Frame::Pubcomp { msg_id },
                })
            }
            MSG_SUBSCRIBE => {
                if len < 6 {
                    return Err(Error::Malformed);
                }
                let flags = Flags::decode(buf[2]).ok_or(Error::Malformed)?;
                let msg_id = read_u16_be(buf, 3);
                let topic = match flags.topic_id_type {
                    TopicIdType::Normal => TopicRef::Name(
                        core::str::from_utf8(&buf[5..len]).map_err(|_| Error::Malformed)?,
                    ),
                    TopicIdType::Predefined => {
                        if len != 7 {
                            return Err(Error::Malformed);
                        }
                        TopicRef::Id(read_u16_be(buf, 5))
                    }
                    TopicIdType::Short => {
                        if len != 7 {
                            return Err(Error::Malformed);
                        }
                        TopicRef::Short([buf[5], buf[6]])
                    }
                };
                Ok(Frame::Subscribe {
                    flags,
                    msg_id,
                    topic,
                })
            }
            MSG_SUBACK => {
                if len != 8 {
                    return Err(Error::Malformed);
                }
                let flags = Flags::decode(buf[2]).ok_or(Error::Malformed)?;
                Ok(Frame::Suback {
                    flags,
                    topic_id: read_u16_be(buf, 3),
                    msg_id: read_u16_be(buf, 5),
                    return_code: buf[7],
                })
            }
            MSG_PINGREQ => {
                if len != 2 {
                    return Err(Error::Malformed);
                }
                Ok(Frame::Pingreq)
            }
            MSG_PINGRESP => {
                if len != 2 {
                    return Err(Error::Malformed);
                }
                Ok(Frame::Pingresp)
            }
            MSG_DISCONNECT => match len {
                2 => Ok(Frame::Disconnect { duration: None }),
                4 => Ok(Frame::Disconnect {
                    duration: Some(read_u16_be(buf, 2)),
                }),
                _ => Err(Error::Malformed),
            },
            _ => Err(Error::Malformed),
        }
    }
}
