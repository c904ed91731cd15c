//! # Network abstraction layer for embedded systems
//!
//! This module provides the traits the MQTT-SN client needs from the
//! underlying network stack. The client is transport agnostic: anything that
//! can move UDP datagrams to and from the gateway — lwIP on a Pico W, smoltcp,
//! `std::net::UdpSocket` on a host — can drive it by implementing the
//! [`UdpSocket`] trait.
//!
//! ## Design Philosophy
//!
//! The network layer is designed around several core principles:
//!
//! - **Protocol Agnostic**: Core traits work with any underlying transport
//! - **Zero-Cost Abstractions**: Traits compile down to direct function calls
//! - **Embedded-First**: Designed for `no_std` environments with limited resources
//! - **Polled, not threaded**: the client runs on a single-threaded
//!   cooperative loop; the only blocking primitive is a bounded `recv`
//!
//! ## Architecture
//!
//! The network layer is organized into three levels:
//!
//! 1. **Core trait** ([`UdpSocket`]) — the datagram seam
//! 2. **Transport helpers** ([`transport`]) — glue for callback-driven stacks
//! 3. **Application layer** ([`application`]) — the MQTT-SN protocol itself
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use tinysn::network::UdpSocket;
//!
//! fn ping_gateway<S: UdpSocket>(socket: &mut S) -> Result<(), S::Error> {
//!     // PINGREQ: length 2, message type 0x16
//!     socket.send_to("192.168.1.10:1884", &[0x02, 0x16])?;
//!
//!     let mut response = [0u8; 64];
//!     let len = socket.recv(&mut response, 1000)?;
//!     if len > 0 {
//!         // Process PINGRESP...
//!     }
//!     Ok(())
//! }
//! ```

#![allow(missing_docs)]
#![deny(unsafe_code)]

/// Common error types for network operations
pub mod error;

/// OSI Layer 7: Application layer protocol implementations
pub mod application;

/// OSI Layer 4: Transport layer helpers
pub mod transport;

/// Re-exports of common traits for convenient importing
pub mod prelude {
    pub use super::UdpSocket;
    pub use crate::storage::FileSystem;
    pub use crate::time::{Clock, Delay};
}

/// Trait for UDP socket operations.
///
/// UDP is a connectionless protocol, so this trait uses datagram semantics
/// rather than the stream semantics of connection-based transports. The
/// MQTT-SN client holds exactly one socket and talks to exactly one remote
/// endpoint (the gateway).
///
/// # Receive semantics
///
/// `recv` has three outcomes, all of which the client relies on:
///
/// * `Ok(n)` with `n > 0` — one whole datagram was copied into `buf`
/// * `Ok(0)` — no datagram available: the timeout elapsed (`timeout_ms > 0`)
///   or there was nothing pending (`timeout_ms == 0`)
/// * `Err(e)` — the socket is unusable (not bound, no route, out of memory)
///
/// Datagrams must not be split across calls; a datagram larger than `buf`
/// should be dropped with an error rather than truncated.
///
/// # Examples
///
/// ```rust,no_run
/// use tinysn::network::UdpSocket;
///
/// fn drain<S: UdpSocket>(socket: &mut S) -> Result<u32, S::Error> {
///     let mut buf = [0u8; 256];
///     let mut count = 0;
///     // Non-blocking poll until the receive path is empty.
///     while socket.recv(&mut buf, 0)? > 0 {
///         count += 1;
///     }
///     Ok(count)
/// }
/// ```
pub trait UdpSocket {
    /// Associated error type for UDP operations
    type Error: core::fmt::Debug;

    /// Send one datagram to a remote endpoint.
    ///
    /// # Arguments
    ///
    /// * `remote` - Address of the remote endpoint, `host:port`
    /// * `buf` - Data to send
    ///
    /// # Returns
    ///
    /// * `Ok(n)` - Number of bytes sent (the whole datagram)
    /// * `Err(e)` - Send error occurred
    fn send_to(&mut self, remote: &str, buf: &[u8]) -> Result<usize, Self::Error>;

    /// Receive one datagram, waiting at most `timeout_ms` milliseconds.
    ///
    /// A timeout of 0 polls without blocking.
    ///
    /// # Arguments
    ///
    /// * `buf` - Buffer to receive the datagram into
    /// * `timeout_ms` - Maximum time to wait; 0 for a non-blocking poll
    ///
    /// # Returns
    ///
    /// * `Ok(n)` - Number of bytes received; 0 means no data within the wait
    /// * `Err(e)` - Receive error occurred
    fn recv(&mut self, buf: &mut [u8], timeout_ms: u32) -> Result<usize, Self::Error>;
}
