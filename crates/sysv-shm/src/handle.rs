//! Handle lifecycle: the state machine owning one process's view of a
//! segment.
//!
//! A handle cycles `Unattached -> Attached -> Unattached` for as long as the
//! underlying segment exists. [`SegmentHandle::create`] publishes a new
//! segment through the sidecar without attaching; [`SegmentHandle::attach`]
//! maps an existing one from the sidecar; [`SegmentHandle::detach`] unmaps
//! it. Failed transitions leave the handle exactly where it was: a failed
//! attach stays unattached, a failed detach stays attached.

use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::descriptor::{SegmentDescriptor, read_descriptor, write_descriptor};
use crate::error::ShmError;
use crate::key::derive_key;
use crate::region::MappedRegion;
use crate::segment::{allocate_segment, attach_segment, detach_segment};

/// Which side of the lifecycle a handle currently sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    /// No mapping held. Initial state, and the state after every successful
    /// detach.
    Unattached,
    /// The segment is mapped into this process.
    Attached,
}

impl fmt::Display for HandleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unattached => write!(f, "unattached"),
            Self::Attached => write!(f, "attached"),
        }
    }
}

/// One process's handle on a shared memory segment.
///
/// The handle owns its own mapping only. The kernel segment persists
/// independently of any handle and stays reachable from every process that
/// knows the sidecar path; removing it is out of scope here.
///
/// Handles are single-threaded plain values: no internal synchronization,
/// no process-wide state. Construct one per logical segment.
#[derive(Debug, Default)]
pub struct SegmentHandle {
    region: Option<MappedRegion>,
    descriptor: Option<SegmentDescriptor>,
    backing_path: Option<PathBuf>,
}

impl SegmentHandle {
    /// A fresh, unattached handle with no descriptor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current lifecycle state.
    ///
    /// The mapped region exists if and only if this returns
    /// [`HandleState::Attached`].
    pub fn state(&self) -> HandleState {
        if self.region.is_some() {
            HandleState::Attached
        } else {
            HandleState::Unattached
        }
    }

    /// The mapped region, when attached.
    pub fn region(&self) -> Option<&MappedRegion> {
        self.region.as_ref()
    }

    /// The descriptor this handle created or attached through, if any.
    pub fn descriptor(&self) -> Option<&SegmentDescriptor> {
        self.descriptor.as_ref()
    }

    /// The sidecar path this handle created or attached through, if any.
    pub fn backing_path(&self) -> Option<&Path> {
        self.backing_path.as_deref()
    }

    /// Create (or get) the segment for `path` and publish its sidecar.
    ///
    /// Derives the key from `path` and `discriminant`, performs the
    /// create-or-get allocation with `permissions` (masked to `0o666`), and
    /// writes the descriptor as the sidecar's full content. The handle
    /// records the descriptor but stays unattached; call
    /// [`attach`](Self::attach) to map the segment.
    ///
    /// Creation per path is single-writer: a `create` racing another
    /// `create` or an `attach` on the same path is the caller's bug.
    pub fn create(
        &mut self,
        path: impl AsRef<Path>,
        size: usize,
        permissions: u32,
        discriminant: i32,
    ) -> Result<(), ShmError> {
        let path = path.as_ref();
        if self.region.is_some() {
            return Err(ShmError::AlreadyAttached);
        }
        if size < 1 {
            return Err(ShmError::InvalidSize(size));
        }
        let permissions = permissions & 0o666;

        // ftok needs the file on disk before the descriptor lands in it.
        File::create(path).map_err(ShmError::Io)?;

        let key = derive_key(path, discriminant)?;
        let segment_id = allocate_segment(key, size, permissions)?;

        let descriptor = SegmentDescriptor {
            key,
            size: size as u64,
            segment_id,
            permissions: Some(permissions),
            discriminant: Some(discriminant),
        };
        write_descriptor(path, &descriptor)?;

        tracing::debug!(key, segment_id, size, "segment created");
        self.descriptor = Some(descriptor);
        self.backing_path = Some(path.to_path_buf());
        Ok(())
    }

    /// Attach to the segment published at `path`.
    ///
    /// Reads the sidecar and maps the segment it names, returning the
    /// bounds-checked region view. On any failure — unreadable sidecar,
    /// unparseable content, or `shmat` refusing a stale segment id — the
    /// handle stays unattached with nothing recorded.
    pub fn attach(&mut self, path: impl AsRef<Path>) -> Result<&MappedRegion, ShmError> {
        let path = path.as_ref();
        if self.region.is_some() {
            return Err(ShmError::AlreadyAttached);
        }

        let descriptor = read_descriptor(path)?;
        if descriptor.size < 1 {
            return Err(ShmError::InvalidSize(descriptor.size as usize));
        }
        let region = attach_segment(descriptor.segment_id, descriptor.size as usize)?;

        tracing::debug!(
            segment_id = descriptor.segment_id,
            size = descriptor.size,
            "segment attached"
        );
        self.descriptor = Some(descriptor);
        self.backing_path = Some(path.to_path_buf());
        Ok(self.region.insert(region))
    }

    /// Detach from the segment, unmapping it from this process.
    ///
    /// The segment itself is left alone: it stays in the kernel and the
    /// sidecar stays on disk, so this handle (or any other process) can
    /// attach again. A failed `shmdt` leaves the handle attached.
    pub fn detach(&mut self) -> Result<(), ShmError> {
        let Some(region) = self.region.take() else {
            return Err(ShmError::NotAttached);
        };
        if let Err(err) = detach_segment(&region) {
            self.region = Some(region);
            return Err(err);
        }
        tracing::debug!(
            segment_id = self.descriptor.as_ref().map(|d| d.segment_id),
            "segment detached"
        );
        Ok(())
    }

    /// Human-readable dump of the handle's current state. Never fails.
    pub fn describe(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for SegmentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{{")?;
        writeln!(f, "\tstate: {}", self.state())?;
        match &self.backing_path {
            Some(path) => writeln!(f, "\tpath: {}", path.display())?,
            None => writeln!(f, "\tpath: (none)")?,
        }
        if let Some(descriptor) = &self.descriptor {
            writeln!(f, "\tkey: {:#x}", descriptor.key)?;
            writeln!(f, "\tsegment id: {}", descriptor.segment_id)?;
            writeln!(f, "\tsize: {}", descriptor.size)?;
            if let Some(permissions) = descriptor.permissions {
                writeln!(f, "\tpermissions: {:o}", permissions)?;
            }
            if let Some(discriminant) = descriptor.discriminant {
                writeln!(f, "\tdiscriminant: {}", discriminant)?;
            }
        }
        match &self.region {
            Some(region) => writeln!(f, "\taddr: {:p}", region.as_ptr())?,
            None => writeln!(f, "\taddr: (unmapped)")?,
        }
        write!(f, "}}")
    }
}

impl Drop for SegmentHandle {
    fn drop(&mut self) {
        // Best-effort unmap for a handle dropped while attached. The segment
        // itself stays in the kernel either way.
        if let Some(region) = self.region.take()
            && let Err(err) = detach_segment(&region)
        {
            tracing::warn!(error = %err, "failed to detach segment on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detach_on_fresh_handle_fails() {
        let mut handle = SegmentHandle::new();
        let err = handle.detach().unwrap_err();
        assert!(matches!(err, ShmError::NotAttached));
        assert_eq!(handle.state(), HandleState::Unattached);
    }

    #[test]
    fn test_zero_size_create_touches_nothing() {
        let path = std::env::temp_dir().join(format!("sysv_shm_handle_zero_{}", std::process::id()));

        let mut handle = SegmentHandle::new();
        let err = handle.create(&path, 0, 0o600, 1).unwrap_err();
        assert!(matches!(err, ShmError::InvalidSize(0)));
        assert!(!path.exists());
        assert!(handle.descriptor().is_none());
    }

    #[test]
    fn test_fresh_handle_describes_as_unattached() {
        let handle = SegmentHandle::new();
        let description = handle.describe();
        assert!(description.contains("state: unattached"));
        assert!(description.contains("addr: (unmapped)"));
    }
}
