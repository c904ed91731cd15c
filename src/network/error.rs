//! Common error types for network and protocol operations

/// A common error type for network and protocol operations.
///
/// This enum defines the set of errors that can occur when talking to an
/// MQTT-SN gateway or running a block transfer on top of it. It is designed
/// to be simple and portable for `no_std` environments: every public
/// operation collapses its failure modes into one of these kinds, while
/// detailed counters remain available through the read-only statistics
/// structs.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Error {
    /// A frame or payload failed to parse (short header, length mismatch,
    /// unknown message type, invalid flag combination). Inbound malformed
    /// frames are counted and dropped; this kind only surfaces when the
    /// caller hands in unparseable data directly.
    Malformed,
    /// An operation was attempted while the client is not connected to the
    /// gateway.
    NotConnected,
    /// A bounded wait elapsed without the expected acknowledgment.
    Timeout,
    /// The gateway answered with a negative return code.
    Rejected(u8),
    /// The retransmission budget was exhausted without an acknowledgment.
    DeliveryFailed,
    /// A payload (or object) exceeds what a single frame (or transfer) can
    /// carry.
    PayloadTooLarge,
    /// A fixed-capacity resource (socket, table, buffer) could not hold the
    /// request.
    NoMem,
    /// The underlying transport or filesystem reported an error.
    IoError,
    /// The operation conflicts with one that is still in progress.
    Busy,
}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Error::Malformed => defmt::write!(f, "Malformed"),
            Error::NotConnected => defmt::write!(f, "NotConnected"),
            Error::Timeout => defmt::write!(f, "Timeout"),
            Error::Rejected(code) => defmt::write!(f, "Rejected({})", code),
            Error::DeliveryFailed => defmt::write!(f, "DeliveryFailed"),
            Error::PayloadTooLarge => defmt::write!(f, "PayloadTooLarge"),
            Error::NoMem => defmt::write!(f, "NoMem"),
            Error::IoError => defmt::write!(f, "IoError"),
            Error::Busy => defmt::write!(f, "Busy"),
        }
    }
}
