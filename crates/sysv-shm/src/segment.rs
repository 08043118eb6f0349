//! Kernel segment allocation and attach/detach syscalls.
//!
//! Thin wrappers over `shmget(2)`, `shmat(2)` and `shmdt(2)`. The raw kernel
//! error is surfaced on every failure path; nothing here retries.

use std::io;
use std::ptr::NonNull;

use libc::{c_int, c_void, key_t};

use crate::error::ShmError;
use crate::region::MappedRegion;

/// Obtain the segment bound to `key`, creating it if absent.
///
/// Create-or-get: when a segment already exists for `key` its id is returned
/// and `size`/`permissions` are not re-validated against it — the first
/// creator wins and later callers inherit whatever it made.
pub fn allocate_segment(key: key_t, size: usize, permissions: u32) -> Result<c_int, ShmError> {
    if size < 1 {
        return Err(ShmError::InvalidSize(size));
    }

    let shmflg = libc::IPC_CREAT | (permissions & 0o666) as c_int;
    // SAFETY: shmget takes no pointers and has no memory-safety preconditions.
    let segment_id = unsafe { libc::shmget(key, size, shmflg) };
    if segment_id == -1 {
        return Err(ShmError::Allocation(io::Error::last_os_error()));
    }
    Ok(segment_id)
}

/// Map the segment into this process at a kernel-chosen address.
pub(crate) fn attach_segment(segment_id: c_int, size: usize) -> Result<MappedRegion, ShmError> {
    // SAFETY: a null shmaddr lets the kernel pick the mapping location.
    let addr = unsafe { libc::shmat(segment_id, std::ptr::null(), 0) };
    if addr as isize == -1 {
        return Err(ShmError::Attach(io::Error::last_os_error()));
    }
    let Some(addr) = NonNull::new(addr) else {
        return Err(ShmError::Attach(io::Error::other(
            "shmat returned a null mapping",
        )));
    };
    // SAFETY: addr came from a successful shmat for a segment of `size` bytes.
    Ok(unsafe { MappedRegion::from_raw(addr, size) })
}

/// Unmap a previously attached region.
///
/// Zero return from `shmdt` is success; anything else surfaces the OS error.
pub(crate) fn detach_segment(region: &MappedRegion) -> Result<(), ShmError> {
    // SAFETY: the region's address came from a successful shmat and the
    // caller guarantees it has not been detached yet.
    let rc = unsafe { libc::shmdt(region.as_ptr() as *const c_void) };
    if rc != 0 {
        return Err(ShmError::Detach(io::Error::last_os_error()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::derive_key;

    fn remove(segment_id: c_int) {
        unsafe { libc::shmctl(segment_id, libc::IPC_RMID, std::ptr::null_mut()) };
    }

    #[test]
    fn test_zero_size_is_rejected() {
        let err = allocate_segment(0x5e6, 0, 0o600).unwrap_err();
        assert!(matches!(err, ShmError::InvalidSize(0)));
    }

    #[test]
    fn test_create_or_get_returns_same_segment() {
        let path = std::env::temp_dir().join(format!("sysv_shm_seg_{}", std::process::id()));
        std::fs::write(&path, b"").unwrap();
        let key = derive_key(&path, 11).unwrap();

        let first = allocate_segment(key, 4096, 0o600).unwrap();
        let second = allocate_segment(key, 4096, 0o600).unwrap();
        assert_eq!(first, second);

        remove(first);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_attach_detach_round_trip() {
        let segment_id = allocate_segment(libc::IPC_PRIVATE, 4096, 0o600).unwrap();

        let region = attach_segment(segment_id, 4096).unwrap();
        assert!(!region.as_ptr().is_null());
        assert_eq!(region.len(), 4096);
        detach_segment(&region).unwrap();

        remove(segment_id);
    }

    #[test]
    fn test_attach_bad_segment_surfaces_error() {
        let err = attach_segment(-1, 64).unwrap_err();
        assert!(matches!(err, ShmError::Attach(_)));
    }
}
