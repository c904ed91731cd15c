//! # Reliable block transfer over MQTT-SN
//!
//! MQTT-SN frames top out at 255 bytes, which is no way to move an image.
//! This module layers a chunked transfer protocol over ordinary PUBLISH
//! traffic: the sender splits an object into numbered chunks on a *chunk
//! topic*, the receiver reassembles them position-addressed, and losses are
//! repaired selectively — the receiver publishes `NACK:BLOCK=..,CHUNKS=..`
//! requests on a *retransmit topic* and the sender replays exactly those
//! chunks from its cache. Completion is announced on a *metadata topic*.
//!
//! ## Wire format
//!
//! Each chunk payload is an 8-byte little-endian [`ChunkHeader`] followed by
//! up to [`CHUNK_PAYLOAD`] bytes of object data, for a 128-byte chunk that
//! comfortably fits one MQTT-SN frame:
//!
//! ```text
//! { block_id: u16, part_num: u16, total_parts: u16, data_len: u16 } data...
//! ```
//!
//! `part_num` is 1-based. Up to [`MAX_CHUNKS`] chunks per block.
//!
//! ## Components
//!
//! - [`sender::BlockSender`] — chunking, pacing, the retransmission cache
//! - [`receiver::BlockReceiver`] — reassembly, NACK rounds, persistence
//! - [`nack`] — the ASCII request/summary codecs
//! - [`Endpoint`] — glue owning client + sender + receiver and routing
//!   polled messages by topic
//!
//! ## Usage
//!
//! ```rust,no_run
//! # use tinysn::network::UdpSocket;
//! # use tinysn::storage::FileSystem;
//! # use tinysn::time::{Clock, Delay};
//! use tinysn::network::application::mqttsn::QoS;
//! use tinysn::network::application::mqttsn::client::{Client, Options};
//! use tinysn::transfer::{Endpoint, Event, TransferConfig};
//!
//! # fn demo<S: UdpSocket, P: Clock + Delay, F: FileSystem>(socket: S, platform: P, fs: F) -> Result<(), tinysn::network::error::Error> {
//! let mut client = Client::new(socket, platform, "192.168.1.10:1884")?;
//! client.connect(Options {
//!     client_id: "pico-cam-01",
//!     keep_alive_seconds: 60,
//!     clean_session: true,
//! })?;
//!
//! let mut endpoint = Endpoint::new(client, fs, TransferConfig::default());
//! endpoint.subscribe_chunks(QoS::AtLeastOnce)?;
//!
//! loop {
//!     match endpoint.service()? {
//!         Some(Event::BlockReceived(block)) => { /* block.path holds the file */ }
//!         Some(Event::Message(message)) => { /* unrelated application traffic */ }
//!         _ => {}
//!     }
//! }
//! # }
//! ```

#![deny(unsafe_code)]

/// NACK and completion-summary ASCII codecs.
pub mod nack;

/// The sending side: chunking, pacing, retransmission cache.
pub mod sender;

/// The receiving side: reassembly, NACK rounds, persistence.
pub mod receiver;

use crate::network::UdpSocket;
use crate::network::application::mqttsn::client::{Client, Message};
use crate::network::application::mqttsn::{MAX_TOPIC_LEN, QoS};
use crate::network::error::Error;
use crate::storage::FileSystem;
use crate::time::{Clock, Delay};
use heapless::String;
use receiver::{BlockReceiver, CompletedBlock};
use sender::BlockSender;

/// Bytes of the chunk header.
pub const CHUNK_HEADER_LEN: usize = 8;

/// Object bytes per chunk.
pub const CHUNK_PAYLOAD: usize = 120;

/// A full chunk on the wire: header plus payload.
pub const MAX_CHUNK_WIRE: usize = CHUNK_HEADER_LEN + CHUNK_PAYLOAD;

/// Most chunks a block may consist of.
pub const MAX_CHUNKS: u16 = 1000;

/// Largest object [`sender::BlockSender::send`] accepts.
pub const MAX_OBJECT: usize = 60_000;

/// Largest file [`sender::BlockSender::send_file`] accepts.
pub const MAX_FILE: usize = 58_000;

/// Receiver assembly budget; blocks needing more are refused.
pub const RX_BUFFER: usize = 55_000;

/// Pause between consecutive chunks of the initial pass.
pub const CHUNK_PACING_MS: u32 = 10;

/// Every this many chunks, the sender pauses longer so the receiver can
/// drain.
pub const BURST_EVERY: u16 = 20;

/// The longer every-[`BURST_EVERY`]-chunks pause.
pub const BURST_PAUSE_MS: u32 = 50;

/// Pause between chunks replayed in answer to a NACK.
pub const NACK_PACING_MS: u32 = 10;

/// Chunk-arrival silence that triggers a NACK round.
pub const NACK_IDLE_MS: u32 = 3_000;

/// Progress silence after which an assembly is abandoned.
pub const ABANDON_MS: u32 = 60_000;

/// The 8-byte chunk header, little-endian on the wire.
///
/// Encoded with explicit byte accessors — no layout tricks, no alignment
/// assumptions.
///
/// # Examples
///
/// ```rust
/// use tinysn::transfer::ChunkHeader;
///
/// let header = ChunkHeader { block_id: 1, part_num: 2, total_parts: 3, data_len: 4 };
/// let mut buf = [0u8; 128];
/// header.encode(&mut buf);
/// assert_eq!(ChunkHeader::decode(&buf).unwrap(), header);
/// ```
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct ChunkHeader {
    /// Identifies the block this chunk belongs to.
    pub block_id: u16,
    /// 1-based position of this chunk within the block.
    pub part_num: u16,
    /// Number of chunks in the block.
    pub total_parts: u16,
    /// Object bytes carried by this chunk (≤ [`CHUNK_PAYLOAD`]).
    pub data_len: u16,
}

impl ChunkHeader {
    /// Writes the header into the first [`CHUNK_HEADER_LEN`] bytes of
    /// `buf`.
    pub fn encode(&self, buf: &mut [u8]) {
        buf[0..2].copy_from_slice(&self.block_id.to_le_bytes());
        buf[2..4].copy_from_slice(&self.part_num.to_le_bytes());
        buf[4..6].copy_from_slice(&self.total_parts.to_le_bytes());
        buf[6..8].copy_from_slice(&self.data_len.to_le_bytes());
    }

    /// Reads a header from the start of `buf`.
    ///
    /// # Errors
    ///
    /// [`Error::Malformed`] if `buf` is shorter than the header.
    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() < CHUNK_HEADER_LEN {
            return Err(Error::Malformed);
        }
        Ok(Self {
            block_id: u16::from_le_bytes([buf[0], buf[1]]),
            part_num: u16::from_le_bytes([buf[2], buf[3]]),
            total_parts: u16::from_le_bytes([buf[4], buf[5]]),
            data_len: u16::from_le_bytes([buf[6], buf[7]]),
        })
    }
}

/// The three topics a transfer endpoint uses.
///
/// Topics are configuration, not constants baked into the code; the
/// defaults match the original deployment's names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferConfig {
    /// Chunks travel here.
    pub chunk_topic: String<MAX_TOPIC_LEN>,
    /// Receivers publish NACKs here; senders subscribe.
    pub retransmit_topic: String<MAX_TOPIC_LEN>,
    /// Completion summaries are announced here.
    pub metadata_topic: String<MAX_TOPIC_LEN>,
}

impl TransferConfig {
    /// Builds a config from the three topic names.
    ///
    /// # Errors
    ///
    /// [`Error::NoMem`] if any name exceeds [`MAX_TOPIC_LEN`] bytes.
    pub fn new(chunk: &str, retransmit: &str, metadata: &str) -> Result<Self, Error> {
        Ok(Self {
            chunk_topic: String::try_from(chunk).map_err(|_| Error::NoMem)?,
            retransmit_topic: String::try_from(retransmit).map_err(|_| Error::NoMem)?,
            metadata_topic: String::try_from(metadata).map_err(|_| Error::NoMem)?,
        })
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        // Literals are far below the capacity.
        Self::new("pico/chunks", "pico/retransmit", "pico/block").unwrap()
    }
}

/// What one [`Endpoint::service`] iteration produced.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Event {
    /// An application message unrelated to block transfer.
    Message(Message),
    /// A block finished reassembling and was persisted.
    BlockReceived(CompletedBlock),
    /// A NACK was honored by resending this many chunks.
    ChunksResent(u16),
}

/// The application-facing glue: one client, one sender, one receiver, one
/// filesystem, and the topic routing between them.
///
/// [`Endpoint::service`] is the single place inbound traffic is routed:
/// chunk-topic messages feed the receiver, retransmit-topic messages feed
/// the sender's NACK handler, everything else is handed to the caller.
pub struct Endpoint<S: UdpSocket, P: Clock + Delay, F: FileSystem> {
    /// The MQTT-SN session everything rides on.
    pub client: Client<S, P>,
    /// The sending side.
    pub sender: BlockSender,
    /// The receiving side.
    pub receiver: BlockReceiver,
    fs: F,
    config: TransferConfig,
}

impl<S: UdpSocket, P: Clock + Delay, F: FileSystem> Endpoint<S, P, F> {
    /// Wires a connected client, a filesystem and a topic configuration
    /// into a transfer endpoint.
    pub fn new(client: Client<S, P>, fs: F, config: TransferConfig) -> Self {
        Self {
            client,
            sender: BlockSender::new(),
            receiver: BlockReceiver::new(&config),
            fs,
            config,
        }
    }

    /// The topic configuration in use.
    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Access to the filesystem seam (file enumeration and the like).
    pub fn filesystem(&mut self) -> &mut F {
        &mut self.fs
    }

    /// Subscribes to the chunk topic (receiving role).
    pub fn subscribe_chunks(&mut self, qos: QoS) -> Result<u16, Error> {
        let topic = self.config.chunk_topic.clone();
        self.client.subscribe(&topic, qos)
    }

    /// Subscribes to the retransmit topic (sending role, to hear NACKs).
    pub fn subscribe_retransmits(&mut self, qos: QoS) -> Result<u16, Error> {
        let topic = self.config.retransmit_topic.clone();
        self.client.subscribe(&topic, qos)
    }

    /// Transfers an in-memory object on the chunk topic.
    pub fn send_bytes(&mut self, data: &[u8], qos: QoS) -> Result<u16, Error> {
        let topic = self.config.chunk_topic.clone();
        self.sender.send(&mut self.client, &topic, data, qos)
    }

    /// Transfers a file on the chunk topic.
    pub fn send_file(&mut self, path: &str, qos: QoS) -> Result<u16, Error> {
        let topic = self.config.chunk_topic.clone();
        self.sender
            .send_file(&mut self.client, &mut self.fs, &topic, path, qos)
    }

    /// One iteration of the service loop.
    ///
    /// Polls the client, routes the message (if any) by topic, and runs the
    /// receiver's NACK/abandon timers. Invalid chunks and stale NACKs are
    /// counted in the component statistics rather than surfaced — transfer
    /// traffic is lossy by design and recovers by retransmission.
    ///
    /// # Errors
    ///
    /// [`Error::NotConnected`] once the underlying session is gone.
    pub fn service(&mut self) -> Result<Option<Event>, Error> {
        let event = match self.client.poll()? {
            Some(message) if message.topic == self.config.chunk_topic => {
                match self
                    .receiver
                    .process_chunk(&mut self.client, &mut self.fs, &message.payload)
                {
                    Ok(Some(completed)) => Some(Event::BlockReceived(completed)),
                    // Bad chunks are counted by the receiver and dropped.
                    Ok(None) | Err(_) => None,
                }
            }
            Some(message) if message.topic == self.config.retransmit_topic => {
                match self.sender.handle_nack(&mut self.client, &message.payload) {
                    Ok(resent) if resent > 0 => Some(Event::ChunksResent(resent)),
                    _ => None,
                }
            }
            Some(message) => Some(Event::Message(message)),
            None => None,
        };

        self.receiver.check_timeouts(&mut self.client);
        Ok(event)
    }
}
