//! Inbound packet queue.
//!
//! Received datagrams are staged here before the state machine decodes them.
//! The queue is a lock-free single-producer single-consumer ring
//! (`heapless::spsc`): the producer side is whatever pumps the socket — the
//! client's own poll loop, or a receive callback on platforms that deliver
//! datagrams asynchronously — and the consumer is the state machine. A full
//! queue drops the *new* datagram and counts it; the block-transfer NACK
//! loop recovers anything lost this way.

#![deny(unsafe_code)]

use super::MAX_PACKET;
use heapless::Vec;
use heapless::spsc::Queue;

/// Number of datagrams the queue holds.
pub const QUEUE_DEPTH: usize = 16;

/// One raw, undecoded datagram.
pub type RawPacket = Vec<u8, MAX_PACKET>;

/// A bounded FIFO of raw inbound datagrams with an overflow counter.
///
/// # Examples
///
/// ```rust
/// use tinysn::network::application::mqttsn::queue::InboundQueue;
///
/// let mut queue = InboundQueue::new();
/// assert!(queue.push(&[0x02, 0x17]));
///
/// let packet = queue.pop().unwrap();
/// assert_eq!(&packet[..], &[0x02, 0x17]);
/// assert!(queue.pop().is_none());
/// ```
pub struct InboundQueue {
    // spsc::Queue stores N-1 elements.
    ring: Queue<RawPacket, { QUEUE_DEPTH + 1 }>,
    dropped: u32,
}

impl core::fmt::Debug for InboundQueue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InboundQueue")
            .field("len", &self.ring.len())
            .field("dropped", &self.dropped)
            .finish()
    }
}

impl Default for InboundQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl InboundQueue {
    /// Creates an empty queue.
    pub const fn new() -> Self {
        Self {
            ring: Queue::new(),
            dropped: 0,
        }
    }

    /// Enqueues one datagram. Returns `false` (and counts a drop) when the
    /// queue is full or the datagram exceeds [`MAX_PACKET`] bytes.
    pub fn push(&mut self, datagram: &[u8]) -> bool {
        let Ok(packet) = RawPacket::from_slice(datagram) else {
            self.dropped = self.dropped.wrapping_add(1);
            return false;
        };
        if self.ring.enqueue(packet).is_err() {
            self.dropped = self.dropped.wrapping_add(1);
            return false;
        }
        true
    }

    /// Dequeues the oldest datagram.
    pub fn pop(&mut self) -> Option<RawPacket> {
        self.ring.dequeue()
    }

    /// Number of datagrams waiting.
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// True if nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// True if another `push` would drop.
    pub fn is_full(&self) -> bool {
        self.ring.is_full()
    }

    /// Datagrams dropped due to overflow or oversize.
    pub fn dropped(&self) -> u32 {
        self.dropped
    }

    /// Empties the queue (the drop counter is preserved).
    pub fn clear(&mut self) {
        while self.ring.dequeue().is_some() {}
    }
}
