//! MQTT-SN client state machine.
//!
//! The [`Client`] owns the socket, the topic registry, the pending-message
//! table and the inbound queue, and drives the whole protocol from a
//! single-threaded cooperative loop. The shape of the API follows the other
//! protocol clients in this family: a borrowed [`Options`] struct to
//! connect, `publish`/`subscribe` for traffic, and a non-blocking `poll()`
//! that yields incoming [`Message`]s.
//!
//! # Blocking and dispatch
//!
//! `connect`, `subscribe`, `register_topic` and acknowledged `publish` calls
//! block in a bounded wait loop. While waiting, the client keeps decoding
//! every inbound frame: PINGREQ is answered, gateway REGISTERs are recorded
//! and acknowledged, and PUBLISH frames that arrive mid-wait are parked in a
//! small deferred queue that the next `poll()` drains first. This matters
//! under load — during a QoS 1 chunk burst, PUBACK waits and chunk receipt
//! interleave on the same socket, and a wait loop that ignored other frames
//! would starve the receiving side.
//!
//! # States
//!
//! `Disconnected → Connecting → Connected → Disconnected`. Transitions are
//! driven by [`Client::connect`], CONNACK receipt, keep-alive failure,
//! [`Client::disconnect`], or a DISCONNECT from the gateway. Only
//! `Connected` accepts subscribe/register/publish; the others answer
//! [`Error::NotConnected`].

#![deny(unsafe_code)]

use super::frame::{Frame, TopicRef};
use super::pending::{MAX_PENDING, PendingKind, PendingTable};
use super::queue::InboundQueue;
use super::topics::{TOPIC_ID_UNASSIGNED, TopicRegistry, TopicSource};
use super::{Flags, MAX_PACKET, MAX_PAYLOAD, MAX_TOPIC_LEN, QoS, TopicIdType};
use crate::network::UdpSocket;
use crate::network::error::Error;
use crate::time::{Clock, Delay};
use core::fmt::Write as _;
use heapless::{Deque, HistoryBuffer, String, Vec};

/// Bounded wait for CONNACK.
const CONNECT_WAIT_MS: u32 = 5_000;
/// Bounded wait for SUBACK.
const SUBSCRIBE_WAIT_MS: u32 = 5_000;
/// Bounded wait for REGACK.
const REGISTER_WAIT_MS: u32 = 3_000;
/// Idle delay between iterations of a wait loop.
const POLL_INTERVAL_MS: u32 = 10;
/// Pending-table key for CONNECT, which carries no msg id on the wire.
/// Ordinary allocation never produces 0.
const CONNECT_MSG_ID: u16 = 0;
/// PUBLISH frames parked while a wait loop holds the socket.
const DEFERRED_DEPTH: usize = 8;
/// Recently-seen ids kept for duplicate-PUBLISH suppression.
const DEDUP_WINDOW: usize = 16;

/// Maximum gateway address length (`host:port`).
pub const MAX_GATEWAY_ADDR: usize = 64;

/// Configuration options for the MQTT-SN connection.
///
/// # Examples
///
/// ```rust
/// use tinysn::network::application::mqttsn::client::Options;
///
/// let options = Options {
///     client_id: "pico-cam-01",
///     keep_alive_seconds: 60,
///     clean_session: true,
/// };
/// ```
#[derive(Debug, Clone)]
pub struct Options<'a> {
    /// The client identifier, unique per gateway.
    pub client_id: &'a str,
    /// Keep-alive interval in seconds; 0 disables keep-alive probing.
    pub keep_alive_seconds: u16,
    /// Whether the gateway should discard previous session state.
    pub clean_session: bool,
}

/// Connection state of the client.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ConnectionState {
    /// No session with the gateway.
    Disconnected,
    /// CONNECT sent, CONNACK outstanding.
    Connecting,
    /// Session established.
    Connected,
}

/// An incoming PUBLISH delivered to the application.
///
/// The topic id on the wire is translated back to its name through the
/// registry; an id the registry does not know is surfaced as
/// `unknown/<id>` without inserting a binding.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Message {
    /// Topic the message was published on.
    pub topic: String<MAX_TOPIC_LEN>,
    /// Application payload.
    pub payload: Vec<u8, MAX_PAYLOAD>,
    /// Delivery QoS the gateway used.
    pub qos: QoS,
    /// Wire message id (0 for QoS 0).
    pub msg_id: u16,
}

/// Read-only client statistics.
///
/// Applications see one composite result per operation; these counters hold
/// the detail for observability.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub struct ClientStats {
    /// Inbound frames dropped because they failed to parse.
    pub malformed_frames: u32,
    /// Inbound datagrams dropped by the bounded queue or deferred buffer.
    pub queue_drops: u32,
    /// Frames retransmitted by the pending-message table.
    pub retransmissions: u32,
    /// Pending entries retired with their retry budget exhausted.
    pub delivery_failures: u32,
    /// Duplicate QoS 1 PUBLISH frames whose payload was suppressed.
    pub duplicates_suppressed: u32,
}

/// An MQTT-SN v1.2 client.
///
/// Generic over the platform seams: `S` moves UDP datagrams, `P` provides
/// monotonic time and cooperative delay.
///
/// # Examples
///
/// ```rust,no_run
/// # use tinysn::network::UdpSocket;
/// # use tinysn::time::{Clock, Delay};
/// use tinysn::network::application::mqttsn::QoS;
/// use tinysn::network::application::mqttsn::client::{Client, Options};
///
/// # fn demo<S: UdpSocket, P: Clock + Delay>(socket: S, platform: P) -> Result<(), tinysn::network::error::Error> {
/// let mut client = Client::new(socket, platform, "192.168.1.10:1884")?;
/// client.connect(Options {
///     client_id: "weather-station",
///     keep_alive_seconds: 30,
///     clean_session: true,
/// })?;
///
/// let granted_id = client.subscribe("commands/reboot", QoS::AtLeastOnce)?;
/// client.publish("status", b"online", QoS::AtMostOnce)?;
///
/// while let Some(message) = client.poll()? {
///     let _ = (granted_id, message);
/// }
/// # Ok(())
/// # }
/// ```
pub struct Client<S: UdpSocket, P: Clock + Delay> {
    socket: S,
    platform: P,
    gateway: String<MAX_GATEWAY_ADDR>,
    state: ConnectionState,
    registry: TopicRegistry,
    pending: PendingTable,
    inbound: InboundQueue,
    deferred: Deque<Message, DEFERRED_DEPTH>,
    dedup: HistoryBuffer<(u16, u16), DEDUP_WINDOW>,
    next_msg_id: u16,
    keep_alive_ms: u32,
    last_send_ms: u32,
    last_pong_ms: u32,
    connack_code: Option<u8>,
    last_reject: Option<(u16, u8)>,
    last_suback: Option<(u16, u16)>,
    deferred_drops: u32,
    stats: ClientStats,
}

impl<S: UdpSocket, P: Clock + Delay> Client<S, P> {
    /// Creates a client bound to one gateway endpoint.
    ///
    /// # Errors
    ///
    /// [`Error::NoMem`] if `gateway` exceeds [`MAX_GATEWAY_ADDR`] bytes.
    pub fn new(socket: S, platform: P, gateway: &str) -> Result<Self, Error> {
        Ok(Self {
            socket,
            platform,
            gateway: String::try_from(gateway).map_err(|_| Error::NoMem)?,
            state: ConnectionState::Disconnected,
            registry: TopicRegistry::new(),
            pending: PendingTable::new(),
            inbound: InboundQueue::new(),
            deferred: Deque::new(),
            dedup: HistoryBuffer::new(),
            next_msg_id: 0,
            keep_alive_ms: 0,
            last_send_ms: 0,
            last_pong_ms: 0,
            connack_code: None,
            last_reject: None,
            last_suback: None,
            deferred_drops: 0,
            stats: ClientStats::default(),
        })
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// True while a session with the gateway is established.
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Monotonic milliseconds from the platform clock.
    pub fn now_ms(&self) -> u32 {
        self.platform.now_ms()
    }

    /// Cooperative delay through the platform.
    pub fn delay_ms(&mut self, ms: u32) {
        self.platform.delay_ms(ms);
    }

    /// Snapshot of the client statistics.
    pub fn stats(&self) -> ClientStats {
        let mut stats = self.stats;
        stats.queue_drops = self.inbound.dropped().wrapping_add(self.deferred_drops);
        stats
    }

    /// Establishes a session with the gateway.
    ///
    /// Emits CONNECT with the clean-session flag from `options` and blocks
    /// (dispatching other inbound traffic) until CONNACK arrives or 5
    /// seconds elapse. Idempotent while connected.
    ///
    /// # Errors
    ///
    /// * [`Error::Timeout`] — no CONNACK within the bounded wait
    /// * [`Error::Rejected`] — the gateway answered a non-zero return code
    /// * [`Error::IoError`] — the transport failed to send
    pub fn connect(&mut self, options: Options<'_>) -> Result<(), Error> {
        if self.state == ConnectionState::Connected {
            return Ok(());
        }

        self.state = ConnectionState::Connecting;
        self.connack_code = None;
        self.inbound.clear();
        self.pending.clear();
        self.keep_alive_ms = u32::from(options.keep_alive_seconds) * 1000;

        let frame = Frame::Connect {
            flags: Flags {
                clean_session: options.clean_session,
                ..Flags::plain()
            },
            duration: options.keep_alive_seconds,
            client_id: options.client_id,
        };
        let (buf, len) = self.encode(&frame)?;
        let now = self.platform.now_ms();
        self.pending
            .register(CONNECT_MSG_ID, PendingKind::Connect, &buf[..len], now)?;
        self.send_raw(&buf[..len])?;

        let result = self.await_pending(CONNECT_MSG_ID, Some(CONNECT_WAIT_MS));
        match result {
            Ok(()) => match self.connack_code.take() {
                Some(0) => {
                    self.state = ConnectionState::Connected;
                    self.last_pong_ms = self.platform.now_ms();
                    Ok(())
                }
                Some(code) => {
                    self.state = ConnectionState::Disconnected;
                    Err(Error::Rejected(code))
                }
                // The entry vanished without a CONNACK (peer DISCONNECT).
                None => {
                    self.state = ConnectionState::Disconnected;
                    Err(Error::Timeout)
                }
            },
            Err(error) => {
                self.state = ConnectionState::Disconnected;
                Err(error)
            }
        }
    }

    /// Subscribes to `topic` by name and returns the granted topic id
    /// (0 for wildcard filters).
    ///
    /// On success the id is recorded in the registry so subsequent inbound
    /// PUBLISH frames resolve to the topic name.
    ///
    /// # Errors
    ///
    /// [`Error::NotConnected`], [`Error::Timeout`], [`Error::Rejected`],
    /// [`Error::IoError`].
    pub fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<u16, Error> {
        self.require_connected()?;
        let msg_id = self.alloc_msg_id();
        let frame = Frame::Subscribe {
            flags: Flags {
                qos,
                ..Flags::plain()
            },
            msg_id,
            topic: TopicRef::Name(topic),
        };
        let (buf, len) = self.encode(&frame)?;
        let now = self.platform.now_ms();
        self.last_suback = None;
        self.pending
            .register(msg_id, PendingKind::Subscribe, &buf[..len], now)?;
        self.send_raw(&buf[..len])?;

        self.await_pending(msg_id, Some(SUBSCRIBE_WAIT_MS))?;
        match self.last_suback.take() {
            Some((id, topic_id)) if id == msg_id => Ok(topic_id),
            _ => Err(Error::Timeout),
        }
    }

    /// Ensures `topic` has a gateway-assigned id, registering it if needed.
    ///
    /// Idempotent: a registry hit returns the cached id without wire
    /// traffic.
    ///
    /// # Errors
    ///
    /// [`Error::NotConnected`], [`Error::Timeout`], [`Error::Rejected`],
    /// [`Error::IoError`].
    pub fn register_topic(&mut self, topic: &str) -> Result<u16, Error> {
        self.require_connected()?;
        if let Some(id) = self.registry.find_by_name(topic) {
            return Ok(id);
        }

        let msg_id = self.alloc_msg_id();
        let frame = Frame::Register {
            topic_id: TOPIC_ID_UNASSIGNED,
            msg_id,
            topic_name: topic,
        };
        let (buf, len) = self.encode(&frame)?;
        let now = self.platform.now_ms();
        self.pending
            .register(msg_id, PendingKind::Register, &buf[..len], now)?;
        self.send_raw(&buf[..len])?;

        self.await_pending(msg_id, Some(REGISTER_WAIT_MS))?;
        self.registry.find_by_name(topic).ok_or(Error::Timeout)
    }

    /// Publishes `payload` on `topic` at the requested QoS.
    ///
    /// The topic is registered first if the registry has no binding for it,
    /// so a PUBLISH never leaves the socket for an unmapped topic. QoS 0
    /// returns once the datagram is handed to the transport; QoS 1 blocks
    /// until PUBACK (retransmitting on the table's backoff schedule); QoS 2
    /// runs the full PUBREC/PUBREL/PUBCOMP handshake under the same budget.
    ///
    /// # Errors
    ///
    /// * [`Error::NotConnected`] — no session
    /// * [`Error::PayloadTooLarge`] — payload exceeds one frame
    /// * [`Error::DeliveryFailed`] — retry budget exhausted
    /// * [`Error::Rejected`] — the gateway refused the publish or the
    ///   registration it required
    /// * [`Error::Timeout`], [`Error::IoError`]
    pub fn publish(&mut self, topic: &str, payload: &[u8], qos: QoS) -> Result<(), Error> {
        self.require_connected()?;
        if payload.len() > MAX_PAYLOAD {
            return Err(Error::PayloadTooLarge);
        }
        let topic_id = self.register_topic(topic)?;

        let msg_id = match qos {
            QoS::AtMostOnce => 0,
            _ => self.alloc_msg_id(),
        };
        let frame = Frame::Publish {
            flags: Flags::publish(qos),
            topic_id,
            msg_id,
            payload,
        };
        let (buf, len) = self.encode(&frame)?;

        match qos {
            QoS::AtMostOnce => self.send_raw(&buf[..len]),
            QoS::AtLeastOnce => {
                let now = self.platform.now_ms();
                self.pending
                    .register(msg_id, PendingKind::PublishQ1, &buf[..len], now)?;
                self.send_raw(&buf[..len])?;
                self.await_pending(msg_id, None)
            }
            QoS::ExactlyOnce => {
                let now = self.platform.now_ms();
                self.pending
                    .register(msg_id, PendingKind::PublishQ2Rec, &buf[..len], now)?;
                self.send_raw(&buf[..len])?;
                self.await_pending(msg_id, None)
            }
        }
    }

    /// Drains the inbound queue without blocking.
    ///
    /// Resolves pending acknowledgments, answers PINGREQ, services gateway
    /// REGISTERs, runs the retransmission tick and the keep-alive timer,
    /// and returns the first application [`Message`] found (messages parked
    /// during a previous ACK wait come out first).
    ///
    /// # Errors
    ///
    /// [`Error::NotConnected`] once the state machine has left `Connected`
    /// (explicit disconnect, peer disconnect, or keep-alive failure).
    pub fn poll(&mut self) -> Result<Option<Message>, Error> {
        if let Some(message) = self.deferred.pop_front() {
            return Ok(Some(message));
        }
        if self.state != ConnectionState::Connected {
            return Err(Error::NotConnected);
        }

        self.pump();
        let mut delivered = None;
        while let Some(raw) = self.inbound.pop() {
            if let Some(message) = self.handle_frame(&raw) {
                delivered = Some(message);
                break;
            }
        }

        let now = self.platform.now_ms();
        let mut retired: Vec<u16, MAX_PENDING> = Vec::new();
        let resent = self
            .pending
            .tick(now, &mut self.socket, &self.gateway, &mut retired);
        if resent > 0 {
            self.stats.retransmissions += resent;
            self.last_send_ms = now;
        }
        self.stats.delivery_failures += retired.len() as u32;
        self.keepalive();

        Ok(delivered)
    }

    /// Tears the session down.
    ///
    /// Emits DISCONNECT (without a sleep duration), clears every pending
    /// entry, and moves to `Disconnected`. The topic registry is kept for
    /// reconnection reuse.
    pub fn disconnect(&mut self) -> Result<(), Error> {
        if self.state != ConnectionState::Disconnected {
            let frame = Frame::Disconnect { duration: None };
            let (buf, len) = self.encode(&frame)?;
            // Best effort; the session ends either way.
            let _ = self.socket.send_to(&self.gateway, &buf[..len]);
        }
        self.state = ConnectionState::Disconnected;
        self.pending.clear();
        Ok(())
    }

    // ---- internals -----------------------------------------------------

    fn require_connected(&self) -> Result<(), Error> {
        if self.state == ConnectionState::Connected {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }

    /// Allocates the next message id, wrapping 65535 → 1 and skipping the
    /// reserved 0.
    fn alloc_msg_id(&mut self) -> u16 {
        self.next_msg_id = match self.next_msg_id {
            u16::MAX => 1,
            n => n + 1,
        };
        self.next_msg_id
    }

    fn encode(&self, frame: &Frame<'_>) -> Result<([u8; MAX_PACKET], usize), Error> {
        let mut buf = [0u8; MAX_PACKET];
        let len = frame.encode(&mut buf)?;
        Ok((buf, len))
    }

    fn send_raw(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.socket
            .send_to(&self.gateway, bytes)
            .map_err(|_| Error::IoError)?;
        self.last_send_ms = self.platform.now_ms();
        Ok(())
    }

    fn send_frame(&mut self, frame: &Frame<'_>) -> Result<(), Error> {
        let (buf, len) = self.encode(frame)?;
        self.send_raw(&buf[..len])
    }

    /// Moves pending datagrams from the socket into the inbound queue.
    fn pump(&mut self) {
        let mut buf = [0u8; MAX_PACKET];
        while !self.inbound.is_full() {
            match self.socket.recv(&mut buf, 0) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    self.inbound.push(&buf[..n]);
                }
            }
        }
    }

    fn defer(&mut self, message: Message) {
        if self.deferred.push_back(message).is_err() {
            self.deferred_drops = self.deferred_drops.wrapping_add(1);
            #[cfg(feature = "defmt")]
            defmt::warn!("deferred queue full, dropping publish");
        }
    }

    /// Bounded wait for the pending entry carrying `msg_id` to resolve.
    ///
    /// Keeps dispatching inbound frames (PUBLISH delivery is deferred),
    /// runs the retransmission tick, and yields between iterations. With
    /// `wait_ms == None` the wait is bounded by the retry budget alone.
    fn await_pending(&mut self, msg_id: u16, wait_ms: Option<u32>) -> Result<(), Error> {
        let started = self.platform.now_ms();
        loop {
            self.pump();
            while let Some(raw) = self.inbound.pop() {
                if let Some(message) = self.handle_frame(&raw) {
                    self.defer(message);
                }
            }

            if let Some((id, code)) = self.last_reject {
                if id == msg_id {
                    self.last_reject = None;
                    return Err(Error::Rejected(code));
                }
            }
            if !self.pending.contains(msg_id) {
                return Ok(());
            }

            let now = self.platform.now_ms();
            let mut retired: Vec<u16, MAX_PENDING> = Vec::new();
            let resent = self
                .pending
                .tick(now, &mut self.socket, &self.gateway, &mut retired);
            if resent > 0 {
                self.stats.retransmissions += resent;
                self.last_send_ms = now;
            }
            if !retired.is_empty() {
                self.stats.delivery_failures += retired.len() as u32;
                if retired.contains(&msg_id) {
                    return Err(Error::DeliveryFailed);
                }
            }

            if let Some(limit) = wait_ms {
                if now.wrapping_sub(started) >= limit {
                    self.pending.remove_any(msg_id);
                    return Err(Error::Timeout);
                }
            }

            self.keepalive();
            if self.state == ConnectionState::Disconnected {
                return Err(Error::NotConnected);
            }

            self.platform.delay_ms(POLL_INTERVAL_MS);
        }
    }

    /// Half-period PINGREQ emission and missing-PINGRESP detection.
    fn keepalive(&mut self) {
        if self.state != ConnectionState::Connected || self.keep_alive_ms == 0 {
            return;
        }
        let now = self.platform.now_ms();
        if now.wrapping_sub(self.last_pong_ms) > self.keep_alive_ms.saturating_mul(2) {
            #[cfg(feature = "defmt")]
            defmt::warn!("keep-alive expired, dropping session");
            self.state = ConnectionState::Disconnected;
            self.pending.clear();
            return;
        }
        if now.wrapping_sub(self.last_send_ms) > self.keep_alive_ms / 2 {
            let _ = self.send_frame(&Frame::Pingreq);
        }
    }

    /// Decodes and dispatches one raw datagram. Returns a [`Message`] when
    /// the frame was an application PUBLISH to deliver.
    fn handle_frame(&mut self, raw: &[u8]) -> Option<Message> {
        let frame = match Frame::decode(raw) {
            Ok(frame) => frame,
            Err(_) => {
                self.stats.malformed_frames += 1;
                #[cfg(feature = "defmt")]
                defmt::warn!("malformed frame dropped ({} bytes)", raw.len());
                return None;
            }
        };

        match frame {
            Frame::Connack { return_code } => {
                self.pending.resolve(CONNECT_MSG_ID, PendingKind::Connect);
                self.connack_code = Some(return_code);
                None
            }
            Frame::Regack {
                topic_id,
                msg_id,
                return_code,
            } => {
                let name = self.pending_topic_name(msg_id, PendingKind::Register);
                if self.pending.resolve(msg_id, PendingKind::Register) {
                    if return_code == 0 {
                        if let Some(name) = name {
                            let _ = self.registry.insert_or_update(
                                &name,
                                topic_id,
                                TopicSource::GatewayRegistered,
                            );
                        }
                    } else {
                        self.last_reject = Some((msg_id, return_code));
                    }
                }
                None
            }
            Frame::Suback {
                topic_id,
                msg_id,
                return_code,
                ..
            } => {
                let name = self.pending_topic_name(msg_id, PendingKind::Subscribe);
                if self.pending.resolve(msg_id, PendingKind::Subscribe) {
                    if return_code == 0 {
                        if topic_id != TOPIC_ID_UNASSIGNED {
                            if let Some(name) = name {
                                let _ = self.registry.insert_or_update(
                                    &name,
                                    topic_id,
                                    TopicSource::SubackAssigned,
                                );
                            }
                        }
                        self.last_suback = Some((msg_id, topic_id));
                    } else {
                        self.last_reject = Some((msg_id, return_code));
                    }
                }
                None
            }
            Frame::Puback {
                msg_id,
                return_code,
                ..
            } => {
                if self.pending.resolve(msg_id, PendingKind::PublishQ1) && return_code != 0 {
                    self.last_reject = Some((msg_id, return_code));
                }
                None
            }
            Frame::Pubrec { msg_id } => {
                let pubrel = Frame::Pubrel { msg_id };
                match self.pending.kind_of(msg_id) {
                    Some(PendingKind::PublishQ2Rec) => {
                        let (buf, len) = match self.encode(&pubrel) {
                            Ok(encoded) => encoded,
                            Err(_) => return None,
                        };
                        let now = self.platform.now_ms();
                        self.pending.advance(
                            msg_id,
                            PendingKind::PublishQ2Rec,
                            PendingKind::PublishQ2Comp,
                            &buf[..len],
                            now,
                        );
                        let _ = self.send_raw(&buf[..len]);
                    }
                    // Duplicate PUBREC after we advanced: repeat the PUBREL.
                    Some(PendingKind::PublishQ2Comp) => {
                        let _ = self.send_frame(&pubrel);
                    }
                    _ => {}
                }
                None
            }
            Frame::Pubcomp { msg_id } => {
                self.pending.resolve(msg_id, PendingKind::PublishQ2Comp);
                None
            }
            // Inbound QoS 2 is delivered like QoS 0; the closing leg of the
            // peer's handshake has nothing to act on here.
            Frame::Pubrel { .. } => None,
            Frame::Publish {
                flags,
                topic_id,
                msg_id,
                payload,
            } => self.handle_publish(flags, topic_id, msg_id, payload),
            Frame::Pingreq => {
                let _ = self.send_frame(&Frame::Pingresp);
                None
            }
            Frame::Pingresp => {
                self.last_pong_ms = self.platform.now_ms();
                None
            }
            Frame::Register {
                topic_id,
                msg_id,
                topic_name,
            } => {
                // Gateway-initiated topic binding.
                let accepted = self
                    .registry
                    .insert_or_update(topic_name, topic_id, TopicSource::GatewayRegistered)
                    .is_ok();
                let _ = self.send_frame(&Frame::Regack {
                    topic_id,
                    msg_id,
                    return_code: if accepted { 0 } else { 2 },
                });
                None
            }
            Frame::Disconnect { .. } => {
                self.state = ConnectionState::Disconnected;
                self.pending.clear();
                None
            }
            // Frames only a gateway consumes.
            Frame::Connect { .. } | Frame::Subscribe { .. } => None,
        }
    }

    fn handle_publish(
        &mut self,
        flags: Flags,
        topic_id: u16,
        msg_id: u16,
        payload: &[u8],
    ) -> Option<Message> {
        // QoS 1 is acknowledged unconditionally; duplicates get a fresh
        // PUBACK but no second delivery.
        if flags.qos == QoS::AtLeastOnce {
            let _ = self.send_frame(&Frame::Puback {
                topic_id,
                msg_id,
                return_code: 0,
            });
            let key = (topic_id, msg_id);
            if self.dedup.oldest_ordered().any(|seen| *seen == key) {
                self.stats.duplicates_suppressed += 1;
                return None;
            }
            self.dedup.write(key);
        }

        let mut topic = String::new();
        match flags.topic_id_type {
            TopicIdType::Short => {
                let bytes = topic_id.to_be_bytes();
                match core::str::from_utf8(&bytes) {
                    // Short names fit by construction.
                    Ok(short) => topic.push_str(short).ok()?,
                    Err(_) => {
                        self.stats.malformed_frames += 1;
                        return None;
                    }
                }
            }
            TopicIdType::Normal | TopicIdType::Predefined => {
                match self.registry.find_by_id(topic_id) {
                    Some(name) => {
                        // Registry names are bounded by the same capacity.
                        topic.push_str(name).ok()?;
                    }
                    None => {
                        let _ = write!(topic, "unknown/{}", topic_id);
                    }
                }
            }
        }

        // Decode guarantees the payload fits MAX_PAYLOAD.
        let payload = Vec::from_slice(payload).ok()?;
        Some(Message {
            topic,
            payload,
            qos: flags.qos,
            msg_id,
        })
    }

    /// Recovers the topic name a pending REGISTER/SUBSCRIBE was sent for by
    /// decoding the stored frame (the ACK does not echo the name).
    fn pending_topic_name(
        &self,
        msg_id: u16,
        kind: PendingKind,
    ) -> Option<String<MAX_TOPIC_LEN>> {
        let bytes = self.pending.frame_of(msg_id, kind)?;
        match Frame::decode(bytes) {
            Ok(Frame::Register { topic_name, .. }) => String::try_from(topic_name).ok(),
            Ok(Frame::Subscribe {
                topic: TopicRef::Name(name),
                ..
            }) => String::try_from(name).ok(),
            _ => None,
        }
    }
}
