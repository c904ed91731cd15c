//! # Application Layer Network Protocols
//!
//! This module contains the application layer (OSI Layer 7) protocol this
//! crate speaks: MQTT-SN v1.2, the sensor-network variant of MQTT designed
//! for datagram transports and memory-constrained clients.
//!
//! ## Design Principles
//!
//! - **Transport Agnostic**: works with any type implementing
//!   [`UdpSocket`](crate::network::UdpSocket)
//! - **No-std Compatible**: fixed-size buffers, no heap allocation
//! - **Polled**: a single-threaded cooperative loop drives the protocol;
//!   there are no background tasks
//! - **Error Handling**: one composite error kind per public operation,
//!   detailed counters in read-only statistics
//!
//! ## Usage Pattern
//!
//! 1. Implement [`UdpSocket`](crate::network::UdpSocket) and the
//!    [`time`](crate::time) traits for your platform
//! 2. Create the [`mqttsn::client::Client`] and connect it to the gateway
//! 3. Publish, subscribe, and call `poll()` from your main loop

/// MQTT-SN v1.2 client implementation.
///
/// Provides the frame codec, topic registry, pending-message table, and the
/// client state machine for publish-subscribe messaging through an MQTT-SN
/// gateway over UDP.
pub mod mqttsn;
