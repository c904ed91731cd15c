//! Block-transfer sender.
//!
//! [`BlockSender`] splits an object into numbered chunks and publishes each
//! one on the chunk topic, pacing itself so the gateway's UDP buffers keep
//! up. The whole object stays cached after the initial pass, because the
//! receiver recovers losses by NACK: when a retransmit request arrives, the
//! requested chunks are rebuilt from the cache and re-published at QoS 0.
//!
//! The cache is a fixed buffer owned by the sender, valid until the next
//! transfer replaces it, [`BlockSender::reset`] releases it, or an
//! unrecoverable send error invalidates it.

#![deny(unsafe_code)]

use super::nack;
use super::{
    BURST_EVERY, BURST_PAUSE_MS, CHUNK_HEADER_LEN, CHUNK_PACING_MS, CHUNK_PAYLOAD, ChunkHeader,
    MAX_CHUNK_WIRE, MAX_CHUNKS, MAX_FILE, MAX_OBJECT, NACK_PACING_MS,
};
use crate::network::UdpSocket;
use crate::network::application::mqttsn::client::Client;
use crate::network::application::mqttsn::{MAX_TOPIC_LEN, QoS};
use crate::network::error::Error;
use crate::storage::FileSystem;
use crate::time::{Clock, Delay};
use heapless::{String, Vec};

/// Read-only sender statistics.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub struct SenderStats {
    /// Chunks published during initial transmission passes.
    pub chunks_sent: u32,
    /// Chunks whose acknowledged publish failed (left for NACK recovery).
    pub chunk_send_failures: u32,
    /// Retransmit requests honored.
    pub nacks_handled: u32,
    /// Retransmit requests for a block no longer cached.
    pub stale_nacks: u32,
    /// Chunks re-published in answer to NACKs.
    pub chunks_resent: u32,
}

/// The cached outbound object. Exactly one transfer is cached at a time;
/// starting a new one reuses the buffer in place.
#[derive(Debug)]
struct SenderCache {
    active: bool,
    block_id: u16,
    topic: String<MAX_TOPIC_LEN>,
    qos: QoS,
    total_parts: u16,
    data: Vec<u8, MAX_OBJECT>,
}

impl SenderCache {
    const fn empty() -> Self {
        Self {
            active: false,
            block_id: 0,
            topic: String::new(),
            qos: QoS::AtMostOnce,
            total_parts: 0,
            data: Vec::new(),
        }
    }
}

/// Splits objects into chunks, publishes them, and answers NACKs from its
/// cache.
///
/// The embedded cache makes this a large value (~60 KB); on target hardware
/// it belongs in a `static`, not on the stack.
#[derive(Debug)]
pub struct BlockSender {
    cache: SenderCache,
    stats: SenderStats,
}

impl Default for BlockSender {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockSender {
    /// Creates a sender with an empty cache.
    pub const fn new() -> Self {
        Self {
            cache: SenderCache::empty(),
            stats: SenderStats::default_const(),
        }
    }

    /// True while a transfer is cached for NACK service.
    pub fn is_active(&self) -> bool {
        self.cache.active
    }

    /// Block id of the cached transfer, if any.
    pub fn block_id(&self) -> Option<u16> {
        self.cache.active.then_some(self.cache.block_id)
    }

    /// Snapshot of the sender statistics.
    pub fn stats(&self) -> SenderStats {
        self.stats
    }

    /// Releases the cached object and deactivates the sender.
    pub fn reset(&mut self) {
        self.cache.active = false;
        self.cache.data.clear();
    }

    /// Transfers `data` to the peer listening on `topic`.
    ///
    /// Chunks go out in order at the requested QoS with inter-chunk pacing
    /// ([`CHUNK_PACING_MS`], plus [`BURST_PAUSE_MS`] every [`BURST_EVERY`]
    /// chunks to let the receiver drain). A chunk whose acknowledged
    /// delivery fails does not abort the transfer — the receiver's NACK
    /// round recovers it — but a dead session does.
    ///
    /// Returns the block id assigned to this transfer. The object stays
    /// cached so [`BlockSender::handle_nack`] can rebuild any chunk.
    ///
    /// # Errors
    ///
    /// * [`Error::Malformed`] — `data` is empty
    /// * [`Error::PayloadTooLarge`] — `data` exceeds [`MAX_OBJECT`] bytes or
    ///   would need more than [`MAX_CHUNKS`] chunks
    /// * [`Error::NotConnected`] — the session died mid-transfer (the cache
    ///   is invalidated)
    pub fn send<S: UdpSocket, P: Clock + Delay>(
        &mut self,
        client: &mut Client<S, P>,
        topic: &str,
        data: &[u8],
        qos: QoS,
    ) -> Result<u16, Error> {
        self.stage(topic, qos, data.len(), client.now_ms())?;
        // stage() sized the buffer to the object.
        self.cache.data.copy_from_slice(data);
        self.transmit(client)
    }

    /// Transfers the file at `path`, read through the filesystem seam.
    ///
    /// The file is staged straight into the transfer cache, measured first
    /// so oversized files are rejected before any allocation or wire
    /// traffic.
    ///
    /// # Errors
    ///
    /// As [`BlockSender::send`], plus [`Error::IoError`] for filesystem
    /// failures and [`Error::PayloadTooLarge`] for files over [`MAX_FILE`]
    /// bytes.
    pub fn send_file<S: UdpSocket, P: Clock + Delay, F: FileSystem>(
        &mut self,
        client: &mut Client<S, P>,
        fs: &mut F,
        topic: &str,
        path: &str,
        qos: QoS,
    ) -> Result<u16, Error> {
        let size = fs.size(path).map_err(|_| Error::IoError)?;
        if size > MAX_FILE {
            return Err(Error::PayloadTooLarge);
        }
        self.stage(topic, qos, size, client.now_ms())?;
        let read = fs
            .read(path, &mut self.cache.data)
            .map_err(|_| Error::IoError)?;
        if read != size {
            self.cache.active = false;
            return Err(Error::IoError);
        }
        self.transmit(client)
    }

    /// Handles a retransmit request from the receiver.
    ///
    /// Parses `NACK:BLOCK=<id>,CHUNKS=<list>`, rebuilds each requested
    /// chunk from the cache, and re-publishes it at QoS 0 with
    /// [`NACK_PACING_MS`] between chunks. A request for a block other than
    /// the cached one resends nothing.
    ///
    /// Returns the number of chunks resent.
    ///
    /// # Errors
    ///
    /// [`Error::Malformed`] if the request does not parse.
    pub fn handle_nack<S: UdpSocket, P: Clock + Delay>(
        &mut self,
        client: &mut Client<S, P>,
        request: &[u8],
    ) -> Result<u16, Error> {
        let request = nack::parse(request)?;
        if !self.cache.active || self.cache.block_id != request.block_id {
            self.stats.stale_nacks += 1;
            return Ok(0);
        }

        let topic = self.cache.topic.clone();
        let total = self.cache.total_parts;
        let mut resent: u16 = 0;
        for &(start, end) in request.items.iter() {
            for part in start..=end.min(total) {
                let mut chunk = [0u8; MAX_CHUNK_WIRE];
                let len = build_chunk(&self.cache, part, &mut chunk);
                if client
                    .publish(&topic, &chunk[..len], QoS::AtMostOnce)
                    .is_ok()
                {
                    resent += 1;
                }
                client.delay_ms(NACK_PACING_MS);
            }
        }

        self.stats.nacks_handled += 1;
        self.stats.chunks_resent += u32::from(resent);
        Ok(resent)
    }

    /// Validates the object and prepares the cache, replacing any previous
    /// transfer.
    fn stage(&mut self, topic: &str, qos: QoS, len: usize, now_ms: u32) -> Result<(), Error> {
        if len == 0 {
            return Err(Error::Malformed);
        }
        if len > MAX_OBJECT {
            return Err(Error::PayloadTooLarge);
        }
        let total_parts = len.div_ceil(CHUNK_PAYLOAD);
        if total_parts > MAX_CHUNKS as usize {
            return Err(Error::PayloadTooLarge);
        }

        self.cache.active = false;
        self.cache.topic = String::try_from(topic).map_err(|_| Error::NoMem)?;
        self.cache.qos = qos;
        self.cache.total_parts = total_parts as u16;
        self.cache.block_id = derive_block_id(now_ms);
        self.cache.data.clear();
        // len <= MAX_OBJECT, the buffer capacity.
        let _ = self.cache.data.resize(len, 0);
        self.cache.active = true;
        Ok(())
    }

    /// The initial transmission pass over the cached object.
    fn transmit<S: UdpSocket, P: Clock + Delay>(
        &mut self,
        client: &mut Client<S, P>,
    ) -> Result<u16, Error> {
        let block_id = self.cache.block_id;
        let total = self.cache.total_parts;
        let qos = self.cache.qos;
        let topic = self.cache.topic.clone();

        for part in 1..=total {
            let mut chunk = [0u8; MAX_CHUNK_WIRE];
            let len = build_chunk(&self.cache, part, &mut chunk);
            match client.publish(&topic, &chunk[..len], qos) {
                Ok(()) => self.stats.chunks_sent += 1,
                Err(Error::NotConnected) => {
                    // Unrecoverable: nobody will NACK a dead session.
                    self.reset();
                    return Err(Error::NotConnected);
                }
                // Lost chunks are the NACK loop's problem.
                Err(_) => self.stats.chunk_send_failures += 1,
            }

            client.delay_ms(CHUNK_PACING_MS);
            if part % BURST_EVERY == 0 {
                client.delay_ms(BURST_PAUSE_MS);
            }
        }
        Ok(block_id)
    }
}

impl SenderStats {
    const fn default_const() -> Self {
        Self {
            chunks_sent: 0,
            chunk_send_failures: 0,
            nacks_handled: 0,
            stale_nacks: 0,
            chunks_resent: 0,
        }
    }
}

/// Builds the wire image of one chunk (header + slice of the cached
/// object). Returns its length.
fn build_chunk(cache: &SenderCache, part: u16, out: &mut [u8; MAX_CHUNK_WIRE]) -> usize {
    let offset = (part as usize - 1) * CHUNK_PAYLOAD;
    let data_len = CHUNK_PAYLOAD.min(cache.data.len() - offset);
    let header = ChunkHeader {
        block_id: cache.block_id,
        part_num: part,
        total_parts: cache.total_parts,
        data_len: data_len as u16,
    };
    header.encode(out);
    out[CHUNK_HEADER_LEN..CHUNK_HEADER_LEN + data_len]
        .copy_from_slice(&cache.data[offset..offset + data_len]);
    CHUNK_HEADER_LEN + data_len
}

/// A block id derived from the monotonic clock; any sufficiently unique
/// nonzero value will do.
fn derive_block_id(now_ms: u32) -> u16 {
    let id = (now_ms ^ (now_ms >> 16)) as u16;
    if id == 0 { 1 } else { id }
}
