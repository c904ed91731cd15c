//! Common error types for storage operations

/// A common error type for filesystem operations.
///
/// This enum defines a set of common errors that can occur when working with
/// file-backed storage (SD cards, flash filesystems). It is designed to be
/// simple and portable for `no_std` environments.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Error {
    /// The path does not exist.
    NotFound,
    /// An error occurred during a write operation.
    WriteError,
    /// An error occurred during a read operation.
    ReadError,
    /// The medium is full or the entry table has no free slot.
    NoSpace,
    /// The path already exists and the operation cannot replace it.
    AlreadyExists,
    /// The path is empty, too long, or otherwise unusable.
    InvalidPath,
    /// The storage medium is not mounted or not initialized.
    NotMounted,
}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Error::NotFound => defmt::write!(f, "NotFound"),
            Error::WriteError => defmt::write!(f, "WriteError"),
            Error::ReadError => defmt::write!(f, "ReadError"),
            Error::NoSpace => defmt::write!(f, "NoSpace"),
            Error::AlreadyExists => defmt::write!(f, "AlreadyExists"),
            Error::InvalidPath => defmt::write!(f, "InvalidPath"),
            Error::NotMounted => defmt::write!(f, "NotMounted"),
        }
    }
}
