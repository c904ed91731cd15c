//! ASCII codecs for the retransmit-request and completion messages.
//!
//! Both messages ride ordinary PUBLISH payloads:
//!
//! ```text
//! NACK:BLOCK=<u16>,CHUNKS=<list>       list := item ("," item)*
//!                                      item := <u16> | <u16> "-" <u16>
//! BLOCK_RECEIVED: ID=<u16>, SIZE=<u32>, PARTS=<u16>, TYPE=<ext>, TIME=<u32>
//! ```
//!
//! The NACK formatter coalesces consecutive missing parts into inclusive
//! ranges (`5-8`) and never overflows one PUBLISH payload: when the list
//! would not fit, it stops at the last complete item. Selective repeat
//! converges anyway — whatever was cut off is still missing next round.

#![deny(unsafe_code)]

use crate::network::error::Error;
use core::fmt::Write as _;
use heapless::{String, Vec};

/// Capacity of the NACK text buffer; fits one PUBLISH payload with room to
/// spare.
pub const MAX_NACK_TEXT: usize = 240;

/// Capacity of the completion text buffer.
pub const MAX_COMPLETION_TEXT: usize = 96;

/// Most range items a single parsed NACK yields; anything beyond is left
/// for a later round.
pub const MAX_NACK_ITEMS: usize = 32;

/// A parsed retransmit request.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct NackRequest {
    /// The block the receiver is asking about.
    pub block_id: u16,
    /// Inclusive part ranges to resend; single parts are `(n, n)`.
    pub items: Vec<(u16, u16), MAX_NACK_ITEMS>,
}

impl NackRequest {
    /// Total number of parts the request covers.
    pub fn part_count(&self) -> u32 {
        self.items
            .iter()
            .map(|(start, end)| u32::from(end.wrapping_sub(*start)) + 1)
            .sum()
    }
}

/// Formats a NACK for every part in `1..=limit` that `received` reports
/// missing. Returns the number of parts the emitted list covers.
///
/// Consecutive missing parts coalesce into ranges. If the text would exceed
/// the buffer, the list is truncated at the last complete item.
pub fn format_missing<F: Fn(u16) -> bool>(
    block_id: u16,
    limit: u16,
    received: F,
    out: &mut String<MAX_NACK_TEXT>,
) -> u16 {
    out.clear();
    // Capacity: the header is 24 bytes at most, far below MAX_NACK_TEXT.
    let _ = write!(out, "NACK:BLOCK={},CHUNKS=", block_id);

    let mut covered: u16 = 0;
    let mut first = true;
    let mut part = 1u16;
    while part <= limit {
        if received(part) {
            part += 1;
            continue;
        }
        let start = part;
        while part < limit && !received(part + 1) {
            part += 1;
        }
        let end = part;
        part += 1;

        let mut item: String<16> = String::new();
        if !first {
            let _ = item.push(',');
        }
        if start == end {
            let _ = write!(item, "{}", start);
        } else {
            let _ = write!(item, "{}-{}", start, end);
        }
        if out.push_str(&item).is_err() {
            break;
        }
        covered += end - start + 1;
        first = false;
    }
    covered
}

/// Parses a retransmit request.
///
/// Items beyond [`MAX_NACK_ITEMS`] are ignored; descending ranges and a
/// part number 0 are malformed.
///
/// # Errors
///
/// [`Error::Malformed`] if the payload is not a well-formed NACK.
pub fn parse(payload: &[u8]) -> Result<NackRequest, Error> {
    let text = core::str::from_utf8(payload).map_err(|_| Error::Malformed)?;
    let rest = text.strip_prefix("NACK:BLOCK=").ok_or(Error::Malformed)?;
    let (block_text, list) = rest.split_once(",CHUNKS=").ok_or(Error::Malformed)?;
    let block_id: u16 = block_text.parse().map_err(|_| Error::Malformed)?;

    let mut items = Vec::new();
    for item in list.split(',') {
        let (start, end) = match item.split_once('-') {
            Some((a, b)) => (
                a.parse::<u16>().map_err(|_| Error::Malformed)?,
                b.parse::<u16>().map_err(|_| Error::Malformed)?,
            ),
            None => {
                let n = item.parse::<u16>().map_err(|_| Error::Malformed)?;
                (n, n)
            }
        };
        if start == 0 || end < start {
            return Err(Error::Malformed);
        }
        if items.push((start, end)).is_err() {
            break;
        }
    }
    if items.is_empty() {
        return Err(Error::Malformed);
    }
    Ok(NackRequest { block_id, items })
}

/// Formats the completion summary published on the metadata topic.
pub fn format_completion(
    block_id: u16,
    size: u32,
    parts: u16,
    extension: &str,
    time_s: u32,
    out: &mut String<MAX_COMPLETION_TEXT>,
) {
    out.clear();
    // Fixed fields bounded well below the buffer capacity.
    let _ = write!(
        out,
        "BLOCK_RECEIVED: ID={}, SIZE={}, PARTS={}, TYPE={}, TIME={}",
        block_id, size, parts, extension, time_s
    );
}
