//! Bounds-checked view of an attached segment.

use std::ptr::NonNull;

use libc::c_void;

use crate::error::ShmError;

/// A segment mapped into this process's address space.
///
/// The region is a view, not an owner: it does not detach on drop and does
/// not own the kernel segment. [`SegmentHandle`](crate::SegmentHandle) drives
/// attach and detach; all access through the view is bounds-checked against
/// the size recorded at attach time.
///
/// The bytes behind the view are raw shared memory. Reads and writes race
/// with every other attached process unless the caller synchronizes the
/// contents itself.
#[derive(Debug)]
pub struct MappedRegion {
    addr: NonNull<c_void>,
    len: usize,
}

// SAFETY: the mapping is valid for the whole process, not just the thread
// that attached it. The view is deliberately not Sync: one handle, one
// thread.
unsafe impl Send for MappedRegion {}

impl MappedRegion {
    /// Build a view over an attached segment.
    ///
    /// # Safety
    ///
    /// `addr` must be the address returned by a successful `shmat(2)` for a
    /// segment of at least `len` bytes, not yet detached.
    pub(crate) unsafe fn from_raw(addr: NonNull<c_void>, len: usize) -> Self {
        Self { addr, len }
    }

    /// Base address of the mapping.
    pub fn as_ptr(&self) -> *mut u8 {
        self.addr.as_ptr().cast()
    }

    /// Size of the mapping in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the mapping is zero-sized.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn check_bounds(&self, offset: usize, len: usize) -> Result<(), ShmError> {
        let out_of_bounds = ShmError::OutOfBounds {
            offset,
            len,
            size: self.len,
        };
        match offset.checked_add(len) {
            Some(end) if end <= self.len => Ok(()),
            _ => Err(out_of_bounds),
        }
    }

    /// Copy bytes out of the region into `buf`.
    pub fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<(), ShmError> {
        self.check_bounds(offset, buf.len())?;
        // SAFETY: the range was bounds-checked against the mapping.
        unsafe {
            std::ptr::copy_nonoverlapping(self.as_ptr().add(offset), buf.as_mut_ptr(), buf.len());
        }
        Ok(())
    }

    /// Copy `bytes` into the region.
    pub fn write_at(&self, offset: usize, bytes: &[u8]) -> Result<(), ShmError> {
        self.check_bounds(offset, bytes.len())?;
        // SAFETY: the range was bounds-checked against the mapping.
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), self.as_ptr().add(offset), bytes.len());
        }
        Ok(())
    }
}
