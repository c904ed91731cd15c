//! # Storage abstraction layer for embedded systems
//!
//! This module provides the filesystem seam the block-transfer layer builds
//! on. Received blocks are persisted as files; outgoing transfers read their
//! source object from a file. Rather than binding to one filesystem library,
//! the crate consumes a narrow [`FileSystem`] trait that an SD-card driver
//! (FatFs and friends), littlefs, or a plain `std` host directory can
//! implement.
//!
//! # Design Philosophy
//!
//! - **Technology Agnostic**: the trait works with any path-addressed store
//! - **Embedded-First**: designed for `no_std`; directory listings land in
//!   bounded `heapless` collections
//! - **Whole-object operations**: the transfer layer reads and writes
//!   complete objects, so the trait exposes whole-file `read`/`write` rather
//!   than streaming handles
//!
//! # Usage Example
//!
//! ```rust,no_run
//! use tinysn::storage::FileSystem;
//!
//! fn archive<F: FileSystem>(fs: &mut F, data: &[u8]) -> Result<(), F::Error> {
//!     if !fs.exists("archive") {
//!         fs.mkdir("archive")?;
//!     }
//!     fs.write("archive/latest.bin", data)
//! }
//! ```

#![allow(missing_docs)]
#![deny(unsafe_code)]

/// Common error types for storage operations
pub mod error;

use heapless::{String, Vec};

/// Maximum path length the storage layer deals in.
pub const MAX_PATH: usize = 64;

/// Maximum number of directory entries a single listing returns.
pub const MAX_DIR_ENTRIES: usize = 16;

/// A path-addressed filesystem.
///
/// Paths are UTF-8, `/`-separated and at most [`MAX_PATH`] bytes; whether
/// they are absolute or relative to a mount point is up to the
/// implementation. All operations are whole-object: `read` fills the
/// caller's buffer with the complete file content and `write` replaces the
/// file atomically as far as the medium allows.
///
/// # Examples
///
/// ```rust,no_run
/// use tinysn::storage::FileSystem;
///
/// fn load<F: FileSystem>(fs: &mut F, path: &str, buf: &mut [u8]) -> Option<usize> {
///     let len = fs.size(path).ok()?;
///     if len > buf.len() {
///         return None;
///     }
///     fs.read(path, &mut buf[..len]).ok()
/// }
/// ```
pub trait FileSystem {
    /// Associated error type for filesystem operations
    type Error: core::fmt::Debug;

    /// Read the file at `path` into `buf`.
    ///
    /// Returns the number of bytes read, which is `min(file size, buf.len())`.
    fn read(&mut self, path: &str, buf: &mut [u8]) -> Result<usize, Self::Error>;

    /// Create or replace the file at `path` with `data`.
    fn write(&mut self, path: &str, data: &[u8]) -> Result<(), Self::Error>;

    /// Create the directory at `path`. Succeeds if it already exists.
    fn mkdir(&mut self, path: &str) -> Result<(), Self::Error>;

    /// True if a file or directory exists at `path`.
    fn exists(&mut self, path: &str) -> bool;

    /// Size in bytes of the file at `path`.
    fn size(&mut self, path: &str) -> Result<usize, Self::Error>;

    /// List the entries of the directory at `path` into `out`.
    ///
    /// Entries beyond [`MAX_DIR_ENTRIES`] are silently omitted; callers that
    /// need exhaustive listings should partition their directories.
    fn list_dir(
        &mut self,
        path: &str,
        out: &mut Vec<String<MAX_PATH>, MAX_DIR_ENTRIES>,
    ) -> Result<(), Self::Error>;
}
