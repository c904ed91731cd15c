//! Pending-message table.
//!
//! Every frame that expects a confirming reply (CONNECT, REGISTER,
//! SUBSCRIBE, and PUBLISH at QoS 1/2) parks a copy here until the reply
//! arrives. [`PendingTable::tick`] drives retransmission with exponential
//! backoff — 1 s initial timeout, doubling per attempt, four retries — and
//! retires entries whose budget is exhausted so the caller can report
//! delivery failure.
//!
//! The stored bytes serve two purposes: they are what gets retransmitted
//! (byte-identical to the original send), and for REGISTER/SUBSCRIBE they
//! let the client recover the topic name when the ACK arrives, since REGACK
//! and SUBACK do not echo it.

#![deny(unsafe_code)]

use super::MAX_PACKET;
use crate::network::UdpSocket;
use crate::network::error::Error;
use heapless::Vec;

/// Capacity of the table. One slot per concurrently-awaited reply is
/// plenty: the client blocks on one acknowledged operation at a time.
pub const MAX_PENDING: usize = 8;

/// Initial retransmission timeout.
pub const INITIAL_RETRY_MS: u32 = 1000;

/// Retransmissions before an entry is retired as failed.
pub const MAX_RETRIES: u8 = 4;

/// What reply an in-flight frame is waiting for.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum PendingKind {
    /// CONNECT awaiting CONNACK.
    Connect,
    /// REGISTER awaiting REGACK.
    Register,
    /// SUBSCRIBE awaiting SUBACK.
    Subscribe,
    /// QoS 1 PUBLISH awaiting PUBACK.
    PublishQ1,
    /// QoS 2 PUBLISH awaiting PUBREC.
    PublishQ2Rec,
    /// QoS 2 PUBREL awaiting PUBCOMP.
    PublishQ2Comp,
}

/// One in-flight frame.
#[derive(Debug)]
struct PendingMessage {
    msg_id: u16,
    kind: PendingKind,
    sent_at_ms: u32,
    retry_timeout_ms: u32,
    retry_count: u8,
    frame: Vec<u8, MAX_PACKET>,
}

/// Fixed-capacity table of frames awaiting acknowledgment.
#[derive(Debug, Default)]
pub struct PendingTable {
    slots: Vec<PendingMessage, MAX_PENDING>,
}

impl PendingTable {
    /// Creates an empty table.
    pub const fn new() -> Self {
        Self { slots: Vec::new() }
    }

    /// Parks `frame` until a reply for (`msg_id`, `kind`) arrives.
    ///
    /// # Errors
    ///
    /// * [`Error::Busy`] — an entry with the same id and kind is already in
    ///   flight
    /// * [`Error::NoMem`] — the table is full
    pub fn register(
        &mut self,
        msg_id: u16,
        kind: PendingKind,
        frame: &[u8],
        now_ms: u32,
    ) -> Result<(), Error> {
        if self
            .slots
            .iter()
            .any(|slot| slot.msg_id == msg_id && slot.kind == kind)
        {
            return Err(Error::Busy);
        }
        let mut stored = Vec::new();
        stored.extend_from_slice(frame).map_err(|_| Error::NoMem)?;
        self.slots
            .push(PendingMessage {
                msg_id,
                kind,
                sent_at_ms: now_ms,
                retry_timeout_ms: INITIAL_RETRY_MS,
                retry_count: 0,
                frame: stored,
            })
            .map_err(|_| Error::NoMem)
    }

    /// Clears the entry for (`msg_id`, `kind`). Returns whether one existed.
    pub fn resolve(&mut self, msg_id: u16, kind: PendingKind) -> bool {
        let before = self.slots.len();
        self.slots
            .retain(|slot| !(slot.msg_id == msg_id && slot.kind == kind));
        self.slots.len() != before
    }

    /// Moves an entry to the next handshake phase, replacing its stored
    /// frame and restarting its retry budget. Used for the QoS 2
    /// PUBREC → PUBREL transition.
    ///
    /// Returns `false` if no entry matched (`msg_id`, `from`).
    pub fn advance(
        &mut self,
        msg_id: u16,
        from: PendingKind,
        to: PendingKind,
        frame: &[u8],
        now_ms: u32,
    ) -> bool {
        let Some(slot) = self
            .slots
            .iter_mut()
            .find(|slot| slot.msg_id == msg_id && slot.kind == from)
        else {
            return false;
        };
        slot.kind = to;
        slot.sent_at_ms = now_ms;
        slot.retry_timeout_ms = INITIAL_RETRY_MS;
        slot.retry_count = 0;
        slot.frame.clear();
        // The replacement frame is never larger than the original PUBLISH.
        let _ = slot.frame.extend_from_slice(frame);
        true
    }

    /// True if any entry carries `msg_id`.
    pub fn contains(&self, msg_id: u16) -> bool {
        self.slots.iter().any(|slot| slot.msg_id == msg_id)
    }

    /// The phase the entry for `msg_id` is in, if any.
    pub fn kind_of(&self, msg_id: u16) -> Option<PendingKind> {
        self.slots
            .iter()
            .find(|slot| slot.msg_id == msg_id)
            .map(|slot| slot.kind)
    }

    /// The stored frame bytes for (`msg_id`, `kind`), if in flight.
    pub fn frame_of(&self, msg_id: u16, kind: PendingKind) -> Option<&[u8]> {
        self.slots
            .iter()
            .find(|slot| slot.msg_id == msg_id && slot.kind == kind)
            .map(|slot| slot.frame.as_slice())
    }

    /// Retransmits expired entries through `socket` and retires those whose
    /// budget is spent, recording their ids in `retired`.
    ///
    /// Returns the number of retransmissions performed. Transport errors on
    /// a retransmission are ignored here; the entry simply waits for its
    /// next expiry.
    pub fn tick<S: UdpSocket>(
        &mut self,
        now_ms: u32,
        socket: &mut S,
        gateway: &str,
        retired: &mut Vec<u16, MAX_PENDING>,
    ) -> u32 {
        let mut resent = 0;
        let mut index = 0;
        while index < self.slots.len() {
            let slot = &mut self.slots[index];
            if now_ms.wrapping_sub(slot.sent_at_ms) < slot.retry_timeout_ms {
                index += 1;
                continue;
            }
            if slot.retry_count >= MAX_RETRIES {
                let _ = retired.push(slot.msg_id);
                self.slots.swap_remove(index);
                continue;
            }
            let _ = socket.send_to(gateway, &slot.frame);
            slot.retry_count += 1;
            slot.retry_timeout_ms = slot.retry_timeout_ms.saturating_mul(2);
            slot.sent_at_ms = now_ms;
            resent += 1;
            index += 1;
        }
        resent
    }

    /// Drops whichever entry carries `msg_id`, regardless of phase. Used
    /// when a bounded wait gives up on it.
    pub fn remove_any(&mut self, msg_id: u16) {
        self.slots.retain(|slot| slot.msg_id != msg_id);
    }

    /// Drops every entry (used on disconnect).
    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Number of in-flight entries.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True if nothing is in flight.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
