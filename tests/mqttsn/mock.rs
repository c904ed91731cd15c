//! Test doubles: a hand-advanced clock and a scripted MQTT-SN gateway.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use tinysn::network::UdpSocket;
use tinysn::network::application::mqttsn::frame::{Frame, TopicRef};
use tinysn::network::application::mqttsn::{Flags, QoS};
use tinysn::time::{Clock, Delay};

/// A clock where sleeping is what makes time pass, so bounded waits
/// terminate deterministically.
#[derive(Clone)]
pub struct FakeClock {
    now: Rc<Cell<u32>>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            now: Rc::new(Cell::new(0)),
        }
    }

    pub fn advance(&self, ms: u32) {
        self.now.set(self.now.get().wrapping_add(ms));
    }
}

impl Clock for FakeClock {
    fn now_ms(&self) -> u32 {
        self.now.get()
    }
}

impl Delay for FakeClock {
    fn delay_ms(&mut self, ms: u32) {
        self.advance(ms);
    }
}

/// Knobs and observable state of the scripted gateway.
pub struct GatewayState {
    /// Every datagram the client sent, in order.
    pub wire: Vec<Vec<u8>>,
    /// Datagrams queued for the client to receive.
    pub inbox: VecDeque<Vec<u8>>,
    /// Topic bindings the gateway has assigned.
    pub registry: HashMap<String, u16>,
    next_topic_id: u16,
    /// Return code for the next CONNACK.
    pub connack_code: u8,
    /// Swallow this many QoS 1 PUBLISHes without a PUBACK.
    pub drop_pubacks: u32,
    /// Stop reacting entirely (timeout scenarios).
    pub silent: bool,
    /// Leave PINGREQ unanswered.
    pub suppress_pingresp: bool,
    /// Raw frame delivered right before the next PUBACK, to exercise
    /// dispatch during an ACK wait.
    pub publish_before_puback: Option<Vec<u8>>,
}

impl GatewayState {
    fn assign_topic_id(&mut self, name: &str) -> u16 {
        if let Some(&id) = self.registry.get(name) {
            return id;
        }
        let id = self.next_topic_id;
        self.next_topic_id += 1;
        self.registry.insert(name.to_string(), id);
        id
    }

    fn push(&mut self, frame: &Frame<'_>) {
        let mut buf = [0u8; 256];
        let len = frame.encode(&mut buf).unwrap();
        self.inbox.push_back(buf[..len].to_vec());
    }

    fn react(&mut self, datagram: &[u8]) {
        let Ok(frame) = Frame::decode(datagram) else {
            return;
        };
        match frame {
            Frame::Connect { .. } => {
                let code = self.connack_code;
                self.push(&Frame::Connack { return_code: code });
            }
            Frame::Register {
                msg_id, topic_name, ..
            } => {
                let topic_id = self.assign_topic_id(topic_name);
                self.push(&Frame::Regack {
                    topic_id,
                    msg_id,
                    return_code: 0,
                });
            }
            Frame::Subscribe {
                msg_id,
                topic: TopicRef::Name(name),
                ..
            } => {
                let topic_id = self.assign_topic_id(name);
                self.push(&Frame::Suback {
                    flags: Flags::plain(),
                    topic_id,
                    msg_id,
                    return_code: 0,
                });
            }
            Frame::Publish {
                flags,
                topic_id,
                msg_id,
                ..
            } => match flags.qos {
                QoS::AtLeastOnce => {
                    if self.drop_pubacks > 0 {
                        self.drop_pubacks -= 1;
                        return;
                    }
                    if let Some(raw) = self.publish_before_puback.take() {
                        self.inbox.push_back(raw);
                    }
                    self.push(&Frame::Puback {
                        topic_id,
                        msg_id,
                        return_code: 0,
                    });
                }
                QoS::ExactlyOnce => self.push(&Frame::Pubrec { msg_id }),
                QoS::AtMostOnce => {}
            },
            Frame::Pubrel { msg_id } => self.push(&Frame::Pubcomp { msg_id }),
            Frame::Pingreq => {
                if !self.suppress_pingresp {
                    self.push(&Frame::Pingresp);
                }
            }
            _ => {}
        }
    }
}

/// Client-side half: hand this to `Client::new`.
pub struct GatewaySocket {
    state: Rc<RefCell<GatewayState>>,
}

/// Test-side half: inspect the wire, queue inbound frames, set knobs.
pub struct GatewayHandle {
    state: Rc<RefCell<GatewayState>>,
}

/// Creates a connected socket/handle pair.
pub fn gateway() -> (GatewaySocket, GatewayHandle) {
    let state = Rc::new(RefCell::new(GatewayState {
        wire: Vec::new(),
        inbox: VecDeque::new(),
        registry: HashMap::new(),
        next_topic_id: 1,
        connack_code: 0,
        drop_pubacks: 0,
        silent: false,
        suppress_pingresp: false,
        publish_before_puback: None,
    }));
    (
        GatewaySocket {
            state: state.clone(),
        },
        GatewayHandle { state },
    )
}

impl UdpSocket for GatewaySocket {
    type Error = ();

    fn send_to(&mut self, _remote: &str, buf: &[u8]) -> Result<usize, Self::Error> {
        let mut state = self.state.borrow_mut();
        state.wire.push(buf.to_vec());
        if !state.silent {
            state.react(buf);
        }
        Ok(buf.len())
    }

    fn recv(&mut self, buf: &mut [u8], _timeout_ms: u32) -> Result<usize, Self::Error> {
        let mut state = self.state.borrow_mut();
        match state.inbox.pop_front() {
            Some(datagram) => {
                buf[..datagram.len()].copy_from_slice(&datagram);
                Ok(datagram.len())
            }
            None => Ok(0),
        }
    }
}

impl GatewayHandle {
    pub fn state(&self) -> std::cell::RefMut<'_, GatewayState> {
        self.state.borrow_mut()
    }

    /// Queues a frame for the client to receive.
    pub fn push_frame(&self, frame: &Frame<'_>) {
        self.state.borrow_mut().push(frame);
    }

    /// Queues raw bytes for the client to receive.
    pub fn push_raw(&self, datagram: &[u8]) {
        self.state.borrow_mut().inbox.push_back(datagram.to_vec());
    }

    /// Message-type bytes of everything the client has sent.
    pub fn wire_types(&self) -> Vec<u8> {
        self.state
            .borrow()
            .wire
            .iter()
            .map(|frame| frame[1])
            .collect()
    }

    /// How many frames of `msg_type` the client has sent.
    pub fn count_sent(&self, msg_type: u8) -> usize {
        self.wire_types()
            .iter()
            .filter(|&&t| t == msg_type)
            .count()
    }

    /// All frames of `msg_type` the client has sent.
    pub fn sent_of_type(&self, msg_type: u8) -> Vec<Vec<u8>> {
        self.state
            .borrow()
            .wire
            .iter()
            .filter(|frame| frame[1] == msg_type)
            .cloned()
            .collect()
    }
}
