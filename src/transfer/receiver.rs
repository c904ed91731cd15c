//! Block-transfer receiver.
//!
//! [`BlockReceiver`] accepts chunks off the chunk topic, reassembles them in
//! a fixed buffer keyed by `(part_num - 1) * CHUNK_PAYLOAD`, and tracks
//! arrival in a per-part bitmap, so out-of-order and duplicate delivery cost
//! nothing. When every part is in, the object is typed by file signature,
//! written to `received/`, and announced on the metadata topic.
//!
//! Recovery is receiver-driven: once chunk arrivals stall for
//! [`NACK_IDLE_MS`] the receiver publishes a retransmit request listing the
//! holes below the highest part seen — never beyond it while the sender may
//! still be mid-pass. After the initial window elapses with at least half
//! the parts in, the horizon widens to the whole block. An assembly with no
//! progress for [`ABANDON_MS`] is abandoned.

#![deny(unsafe_code)]

use super::nack;
use super::{
    ABANDON_MS, CHUNK_HEADER_LEN, CHUNK_PAYLOAD, ChunkHeader, MAX_CHUNKS, NACK_IDLE_MS, RX_BUFFER,
    TransferConfig,
};
use crate::network::UdpSocket;
use crate::network::application::mqttsn::client::Client;
use crate::network::application::mqttsn::{MAX_TOPIC_LEN, QoS};
use crate::network::error::Error;
use crate::storage::{FileSystem, MAX_PATH};
use crate::time::{Clock, Delay};
use core::fmt::Write as _;
use heapless::{String, Vec};

/// Directory completed blocks are written into.
const RECEIVED_DIR: &str = "received";

/// Words in the per-part arrival bitmap (one bit per possible chunk).
const MASK_WORDS: usize = (MAX_CHUNKS as usize).div_ceil(32);

/// Floor of the initial-transfer window before full-horizon NACK rounds.
const INITIAL_WINDOW_FLOOR_MS: u32 = 20_000;

/// Per-part allowance added to the initial-transfer window.
const INITIAL_WINDOW_PER_PART_MS: u32 = 50;

/// Read-only receiver statistics.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub struct ReceiverStats {
    /// Chunks accepted into an assembly.
    pub chunks_received: u32,
    /// Chunks ignored because their part was already present.
    pub duplicate_chunks: u32,
    /// Chunks dropped because they failed validation.
    pub malformed_chunks: u32,
    /// Blocks refused because they exceed the assembly budget.
    pub budget_rejections: u32,
    /// Retransmit requests published.
    pub nacks_sent: u32,
    /// Blocks fully reassembled and persisted.
    pub blocks_completed: u32,
    /// Assemblies abandoned after prolonged silence.
    pub blocks_abandoned: u32,
}

/// Summary of a completed block, returned to the application and echoed on
/// the metadata topic.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct CompletedBlock {
    /// The block id.
    pub block_id: u16,
    /// Reassembled object size in bytes.
    pub size: u32,
    /// Number of chunks the block arrived in.
    pub parts: u16,
    /// Extension chosen by file-signature detection.
    pub extension: &'static str,
    /// Path the object was written to.
    pub path: String<MAX_PATH>,
}

/// The in-flight reassembly state. One assembly at a time; a chunk for a
/// different block id replaces it.
#[derive(Debug)]
struct Assembly {
    active: bool,
    block_id: u16,
    total_parts: u16,
    received_count: u16,
    highest_part_seen: u16,
    tail_len: u16,
    started_ms: u32,
    last_update_ms: u32,
    last_nack_ms: u32,
    finished_initial: bool,
    mask: [u32; MASK_WORDS],
    buffer: Vec<u8, RX_BUFFER>,
}

impl Assembly {
    const fn empty() -> Self {
        Self {
            active: false,
            block_id: 0,
            total_parts: 0,
            received_count: 0,
            highest_part_seen: 0,
            tail_len: 0,
            started_ms: 0,
            last_update_ms: 0,
            last_nack_ms: 0,
            finished_initial: false,
            mask: [0; MASK_WORDS],
            buffer: Vec::new(),
        }
    }

    fn has_part(&self, part: u16) -> bool {
        let index = part as usize - 1;
        self.mask[index / 32] & (1 << (index % 32)) != 0
    }

    fn mark_part(&mut self, part: u16) {
        let index = part as usize - 1;
        self.mask[index / 32] |= 1 << (index % 32);
    }
}

/// Reassembles chunked blocks and persists them through the filesystem
/// seam.
///
/// Like the sender, this is a large value (~55 KB of assembly buffer); on
/// target hardware it belongs in a `static`.
#[derive(Debug)]
pub struct BlockReceiver {
    assembly: Assembly,
    retransmit_topic: String<MAX_TOPIC_LEN>,
    metadata_topic: String<MAX_TOPIC_LEN>,
    stats: ReceiverStats,
}

impl BlockReceiver {
    /// Creates a receiver publishing its NACKs and completion summaries on
    /// the configured topics.
    pub fn new(config: &TransferConfig) -> Self {
        Self {
            assembly: Assembly::empty(),
            retransmit_topic: config.retransmit_topic.clone(),
            metadata_topic: config.metadata_topic.clone(),
            stats: ReceiverStats::default(),
        }
    }

    /// True while an assembly is in flight.
    pub fn is_active(&self) -> bool {
        self.assembly.active
    }

    /// `(received, total)` parts of the in-flight assembly, if any.
    pub fn progress(&self) -> Option<(u16, u16)> {
        self.assembly
            .active
            .then_some((self.assembly.received_count, self.assembly.total_parts))
    }

    /// Number of parts still missing from the in-flight assembly.
    pub fn missing_count(&self) -> u16 {
        if !self.assembly.active {
            return 0;
        }
        self.assembly.total_parts - self.assembly.received_count
    }

    /// Snapshot of the receiver statistics.
    pub fn stats(&self) -> ReceiverStats {
        self.stats
    }

    /// Processes one chunk payload from the chunk topic.
    ///
    /// A chunk for a new block id replaces the current assembly. Duplicates
    /// are ignored silently. When the chunk completes the block, the object
    /// is written to `received/block_<id><ext>` and a completion summary is
    /// published (best effort) on the metadata topic; the summary is also
    /// returned.
    ///
    /// # Errors
    ///
    /// * [`Error::Malformed`] — header, length or part validation failed
    /// * [`Error::NoMem`] — the block exceeds the assembly budget
    /// * [`Error::IoError`] — persisting the completed object failed
    pub fn process_chunk<S: UdpSocket, P: Clock + Delay, F: FileSystem>(
        &mut self,
        client: &mut Client<S, P>,
        fs: &mut F,
        payload: &[u8],
    ) -> Result<Option<CompletedBlock>, Error> {
        let header = match self.validate(payload) {
            Ok(header) => header,
            Err(error) => {
                self.stats.malformed_chunks += 1;
                return Err(error);
            }
        };
        let data = &payload[CHUNK_HEADER_LEN..CHUNK_HEADER_LEN + header.data_len as usize];
        let now = client.now_ms();

        if !self.assembly.active || self.assembly.block_id != header.block_id {
            self.start_assembly(&header, now)?;
        } else if self.assembly.total_parts != header.total_parts {
            self.stats.malformed_chunks += 1;
            return Err(Error::Malformed);
        }

        if header.part_num > self.assembly.total_parts {
            self.stats.malformed_chunks += 1;
            return Err(Error::Malformed);
        }
        if self.assembly.has_part(header.part_num) {
            self.stats.duplicate_chunks += 1;
            return Ok(None);
        }

        let offset = (header.part_num as usize - 1) * CHUNK_PAYLOAD;
        self.assembly.buffer[offset..offset + data.len()].copy_from_slice(data);
        self.assembly.mark_part(header.part_num);
        self.assembly.received_count += 1;
        self.assembly.highest_part_seen = self.assembly.highest_part_seen.max(header.part_num);
        self.assembly.last_update_ms = now;
        if header.part_num == header.total_parts {
            self.assembly.tail_len = header.data_len;
        }
        self.stats.chunks_received += 1;

        if self.assembly.received_count == self.assembly.total_parts {
            return self.finalize(client, fs, now).map(Some);
        }
        Ok(None)
    }

    /// Runs the NACK and abandon timers. Call this regularly (each service
    /// loop iteration); it does nothing while no assembly is in flight.
    pub fn check_timeouts<S: UdpSocket, P: Clock + Delay>(
        &mut self,
        client: &mut Client<S, P>,
    ) {
        if !self.assembly.active {
            return;
        }
        let now = client.now_ms();

        if now.wrapping_sub(self.assembly.last_update_ms) > ABANDON_MS {
            #[cfg(feature = "defmt")]
            defmt::warn!(
                "abandoning block {} ({}/{} parts)",
                self.assembly.block_id,
                self.assembly.received_count,
                self.assembly.total_parts
            );
            self.assembly.active = false;
            self.stats.blocks_abandoned += 1;
            return;
        }

        if !self.assembly.finished_initial {
            let window = INITIAL_WINDOW_FLOOR_MS
                .max(u32::from(self.assembly.total_parts) * INITIAL_WINDOW_PER_PART_MS);
            if now.wrapping_sub(self.assembly.started_ms) >= window
                && u32::from(self.assembly.received_count) * 2
                    >= u32::from(self.assembly.total_parts)
            {
                self.assembly.finished_initial = true;
            }
        }

        let stalled = now.wrapping_sub(self.assembly.last_update_ms) > NACK_IDLE_MS;
        let paced = now.wrapping_sub(self.assembly.last_nack_ms) >= NACK_IDLE_MS;
        if stalled && paced && self.assembly.highest_part_seen > 0 {
            // The sender may still be mid-pass; only request beyond the
            // highest part seen once the initial window has passed.
            let horizon = if self.assembly.finished_initial {
                self.assembly.total_parts
            } else {
                self.assembly.highest_part_seen
            };
            let mut text: String<{ nack::MAX_NACK_TEXT }> = String::new();
            let assembly = &self.assembly;
            let covered = nack::format_missing(
                assembly.block_id,
                horizon,
                |part| assembly.has_part(part),
                &mut text,
            );
            if covered > 0 {
                let topic = self.retransmit_topic.clone();
                if client
                    .publish(&topic, text.as_bytes(), QoS::AtMostOnce)
                    .is_ok()
                {
                    self.stats.nacks_sent += 1;
                    self.assembly.last_nack_ms = now;
                }
            }
        }
    }

    // ---- internals -----------------------------------------------------

    /// Header and length validation shared by every chunk.
    fn validate(&self, payload: &[u8]) -> Result<ChunkHeader, Error> {
        let header = ChunkHeader::decode(payload)?;
        if header.data_len as usize > CHUNK_PAYLOAD
            || payload.len() < CHUNK_HEADER_LEN + header.data_len as usize
            || header.part_num == 0
        {
            return Err(Error::Malformed);
        }
        Ok(header)
    }

    /// Replaces the current assembly with a fresh one for `header`'s block.
    fn start_assembly(&mut self, header: &ChunkHeader, now: u32) -> Result<(), Error> {
        self.assembly.active = false;
        if header.total_parts == 0 || header.total_parts > MAX_CHUNKS {
            self.stats.malformed_chunks += 1;
            return Err(Error::Malformed);
        }
        let needed = header.total_parts as usize * CHUNK_PAYLOAD;
        if needed > RX_BUFFER {
            #[cfg(feature = "defmt")]
            defmt::error!(
                "block {} needs {} bytes, over the assembly budget",
                header.block_id,
                needed
            );
            self.stats.budget_rejections += 1;
            return Err(Error::NoMem);
        }

        self.assembly.block_id = header.block_id;
        self.assembly.total_parts = header.total_parts;
        self.assembly.received_count = 0;
        self.assembly.highest_part_seen = 0;
        self.assembly.tail_len = 0;
        self.assembly.started_ms = now;
        self.assembly.last_update_ms = now;
        self.assembly.last_nack_ms = now;
        self.assembly.finished_initial = false;
        self.assembly.mask = [0; MASK_WORDS];
        self.assembly.buffer.clear();
        // needed <= RX_BUFFER, the buffer capacity.
        let _ = self.assembly.buffer.resize(needed, 0);
        self.assembly.active = true;
        Ok(())
    }

    /// Types, persists and announces the completed object, then releases
    /// the assembly.
    fn finalize<S: UdpSocket, P: Clock + Delay, F: FileSystem>(
        &mut self,
        client: &mut Client<S, P>,
        fs: &mut F,
        now: u32,
    ) -> Result<CompletedBlock, Error> {
        let size =
            (self.assembly.total_parts as usize - 1) * CHUNK_PAYLOAD + self.assembly.tail_len as usize;
        let object = &self.assembly.buffer[..size];
        let extension = detect_extension(object);

        let mut path: String<MAX_PATH> = String::new();
        // Bounded: "received/block_" + 5 digits + 4-char extension.
        let _ = write!(path, "{}/block_{}{}", RECEIVED_DIR, self.assembly.block_id, extension);

        fs.mkdir(RECEIVED_DIR).map_err(|_| Error::IoError)?;
        fs.write(&path, object).map_err(|_| Error::IoError)?;

        let completed = CompletedBlock {
            block_id: self.assembly.block_id,
            size: size as u32,
            parts: self.assembly.total_parts,
            extension,
            path,
        };

        let mut summary: String<{ nack::MAX_COMPLETION_TEXT }> = String::new();
        nack::format_completion(
            completed.block_id,
            completed.size,
            completed.parts,
            extension,
            now / 1000,
            &mut summary,
        );
        let topic = self.metadata_topic.clone();
        // Best effort: the object is already safe on storage.
        if client
            .publish(&topic, summary.as_bytes(), QoS::AtMostOnce)
            .is_err()
        {
            #[cfg(feature = "defmt")]
            defmt::warn!("completion summary for block {} not published", completed.block_id);
        }

        self.assembly.active = false;
        self.assembly.buffer.clear();
        self.stats.blocks_completed += 1;
        Ok(completed)
    }
}

/// Chooses a file extension from the object's leading signature bytes.
fn detect_extension(data: &[u8]) -> &'static str {
    if data.len() >= 3 && data[..3] == [0xFF, 0xD8, 0xFF] {
        ".jpg"
    } else if data.len() >= 4 && data[..4] == [0x89, 0x50, 0x4E, 0x47] {
        ".png"
    } else if data.len() >= 3 && data[..3] == [0x47, 0x49, 0x46] {
        ".gif"
    } else {
        ".bin"
    }
}
