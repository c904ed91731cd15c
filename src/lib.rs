//! # tinysn - MQTT-SN client with reliable block transfer
//!
//! A Rust implementation of an MQTT-SN v1.2 client for memory-constrained
//! devices, together with a NACK-driven block-transfer protocol for moving
//! objects (image files, firmware, logs) far larger than a single 255-byte
//! MQTT-SN frame. The library is `no_std`, allocation-free, and talks to the
//! platform exclusively through narrow traits: a UDP socket, a monotonic
//! clock, a cooperative delay, and a filesystem.
//!
//! ## Features
//!
//! ### MQTT-SN client
//! - CONNECT / SUBSCRIBE / REGISTER / PUBLISH / PINGREQ over UDP
//! - Topic-name ⇄ topic-id registry with LRU eviction
//! - QoS 0, 1 and 2 (full PUBREC/PUBREL/PUBCOMP handshake)
//! - Retransmission with exponential backoff and a bounded retry budget
//! - Keep-alive probing and missing-PINGRESP detection
//! - Duplicate-PUBLISH suppression over a bounded id window
//!
//! ### Block transfer
//! - 128-byte chunks (8-byte header + up to 120 payload bytes), 1000 chunks
//!   per block
//! - Out-of-order reassembly via a per-part bitmap
//! - Selective repeat: the receiver NACKs exactly the missing chunks
//! - File-signature typing (.jpg/.png/.gif/.bin) and persistence through
//!   the filesystem seam
//!
//! ## Usage
//!
//! Add this to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! tinysn = "0.1.0"
//! ```
//!
//! Implement the platform seams, then:
//!
//! ```rust,no_run
//! # use tinysn::network::UdpSocket;
//! # use tinysn::storage::FileSystem;
//! # use tinysn::time::{Clock, Delay};
//! use tinysn::network::application::mqttsn::QoS;
//! use tinysn::network::application::mqttsn::client::{Client, Options};
//! use tinysn::transfer::{Endpoint, TransferConfig};
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
//! endpoint.subscribe_retransmits(QoS::AtLeastOnce)?;
//! endpoint.send_file("images/photo.jpg", QoS::AtLeastOnce)?;
//!
//! loop {
//!     endpoint.service()?;
//! }
//! # }
//! ```
//!
//! ## Execution model
//!
//! Everything runs on one cooperative loop. Acknowledged operations block in
//! bounded waits that keep dispatching unrelated inbound traffic, so chunk
//! receipt and PUBACK waits interleave on the same socket. The only
//! concurrency assumption is the inbound packet queue, which tolerates a
//! producer in callback context.
//!
//! ## Platform Support
//!
//! This library is designed to work on:
//! - Embedded microcontrollers (ARM Cortex-M, RISC-V, etc.)
//! - Linux-based IoT devices (Raspberry Pi, etc.)
//! - Any platform supporting Rust's `core` library
//!
//! ## Optional Features
//!
//! - `std`: Enable standard library support (default: disabled)
//! - `defmt`: Enable defmt logging support for embedded debugging

#![cfg_attr(not(any(feature = "std", test)), no_std)]
#![deny(missing_docs)]
#![warn(missing_debug_implementations)]
#![doc(html_root_url = "https://docs.rs/tinysn/0.1.0")]

/// Network abstraction layer: the UDP socket seam, transport helpers, and
/// the MQTT-SN protocol implementation.
pub mod network;

/// Storage abstraction layer: the filesystem seam completed blocks are
/// persisted through.
pub mod storage;

/// Time abstractions: monotonic clock and cooperative delay.
pub mod time;

/// Reliable block transfer layered over MQTT-SN publish traffic.
pub mod transfer;
