//! Segment key derivation from a filesystem path.
//!
//! `ftok(3)` folds the file's device and inode numbers together with the low
//! eight bits of the discriminant, so the key is stable across processes and
//! invocations for as long as the file's identity is unchanged. Replacing the
//! file (same path, new inode) changes the key.

use std::ffi::CString;
use std::fs;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use crate::error::ShmError;

/// Derive the segment key for a rendezvous path.
///
/// Pure function of the file's identity and the discriminant; no side
/// effects. The path must reference an existing, readable filesystem entry.
pub fn derive_key(path: &Path, discriminant: i32) -> Result<libc::key_t, ShmError> {
    // An unreachable path is InvalidPath; only ftok itself failing on an
    // existing file is a KeyDerivation error.
    fs::metadata(path).map_err(ShmError::InvalidPath)?;

    let cpath = CString::new(path.as_os_str().as_bytes()).map_err(|_| {
        ShmError::InvalidPath(io::Error::new(
            io::ErrorKind::InvalidInput,
            "path contains an interior NUL byte",
        ))
    })?;

    // SAFETY: cpath is a valid NUL-terminated string for the duration of the
    // call; ftok only reads it.
    let key = unsafe { libc::ftok(cpath.as_ptr(), discriminant as libc::c_int) };
    if key == -1 {
        return Err(ShmError::KeyDerivation(io::Error::last_os_error()));
    }
    Ok(key)
}
