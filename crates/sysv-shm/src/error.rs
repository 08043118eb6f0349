//! Error types for segment lifecycle operations.

use std::fmt;
use std::io;

/// Errors from key derivation, segment allocation, sidecar I/O, and handle
/// state transitions.
///
/// Every failure is surfaced once to the immediate caller; nothing is retried
/// or silently recovered. Variants that wrap an [`io::Error`] carry the raw
/// OS error from the syscall that failed.
#[derive(Debug)]
pub enum ShmError {
    /// The rendezvous path does not reference an existing, readable file.
    InvalidPath(io::Error),
    /// Requested segment size is below the 1-byte minimum.
    InvalidSize(usize),
    /// `ftok(3)` refused the path/discriminant pair.
    KeyDerivation(io::Error),
    /// `shmget(2)` refused to create or look up the segment.
    Allocation(io::Error),
    /// The sidecar descriptor file could not be read or written.
    Io(io::Error),
    /// The sidecar content did not parse into a descriptor.
    Marshal(serde_json::Error),
    /// The handle is already attached.
    AlreadyAttached,
    /// The handle is not attached.
    NotAttached,
    /// `shmat(2)` failed.
    Attach(io::Error),
    /// `shmdt(2)` failed; the handle stays attached.
    Detach(io::Error),
    /// Access outside the mapped region's bounds.
    OutOfBounds {
        /// Start offset of the rejected access.
        offset: usize,
        /// Length of the rejected access.
        len: usize,
        /// Size of the mapped region.
        size: usize,
    },
}

impl fmt::Display for ShmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPath(e) => write!(f, "invalid rendezvous path: {}", e),
            Self::InvalidSize(size) => {
                write!(f, "invalid segment size: {} (must be at least 1)", size)
            }
            Self::KeyDerivation(e) => write!(f, "key derivation failed: {}", e),
            Self::Allocation(e) => write!(f, "segment allocation failed: {}", e),
            Self::Io(e) => write!(f, "sidecar I/O error: {}", e),
            Self::Marshal(e) => write!(f, "sidecar content did not parse: {}", e),
            Self::AlreadyAttached => write!(f, "handle is already attached"),
            Self::NotAttached => write!(f, "handle is not attached"),
            Self::Attach(e) => write!(f, "segment attach failed: {}", e),
            Self::Detach(e) => write!(f, "segment detach failed: {}", e),
            Self::OutOfBounds { offset, len, size } => write!(
                f,
                "access of {} bytes at offset {} outside mapped region of {} bytes",
                len, offset, size
            ),
        }
    }
}

impl std::error::Error for ShmError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidPath(e)
            | Self::KeyDerivation(e)
            | Self::Allocation(e)
            | Self::Io(e)
            | Self::Attach(e)
            | Self::Detach(e) => Some(e),
            Self::Marshal(e) => Some(e),
            Self::InvalidSize(_)
            | Self::AlreadyAttached
            | Self::NotAttached
            | Self::OutOfBounds { .. } => None,
        }
    }
}
