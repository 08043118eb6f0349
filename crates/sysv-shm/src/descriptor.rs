//! The sidecar descriptor: the rendezvous record a creating process writes
//! and attaching processes read.
//!
//! The sidecar file is the only externally observable persisted state. It is
//! written completely in one operation and read in full before being
//! trusted. There is no locking around it: creation is single-writer, attach
//! is many-reader, and concurrent writers to one path race (last writer
//! wins).

use std::fs;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ShmError;

/// File mode for the sidecar when the descriptor carries no permission bits.
pub const DEFAULT_SIDECAR_MODE: u32 = 0o600;

/// Persisted identity of a segment.
///
/// Written once when the segment is created, then read by any process that
/// knows the sidecar path. Never mutated afterward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentDescriptor {
    /// Key the segment is bound to (from `ftok`).
    pub key: i32,
    /// Segment size in bytes.
    pub size: u64,
    /// Kernel segment identifier (from `shmget`).
    #[serde(rename = "segmentID")]
    pub segment_id: i32,
    /// Permission bits the segment was created with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<u32>,
    /// Discriminant distinguishing segments bound to the same path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discriminant: Option<i32>,
}

/// Serialize `descriptor` as the full content of the sidecar at `path`.
///
/// The file is created (or truncated) with mode bits from the descriptor's
/// permissions, [`DEFAULT_SIDECAR_MODE`] when absent.
pub fn write_descriptor(path: &Path, descriptor: &SegmentDescriptor) -> Result<(), ShmError> {
    let bytes = serde_json::to_vec(descriptor).map_err(ShmError::Marshal)?;
    let mode = descriptor.permissions.unwrap_or(DEFAULT_SIDECAR_MODE);

    tracing::trace!(path = %path.display(), mode, "writing sidecar");
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(mode)
        .open(path)
        .map_err(ShmError::Io)?;
    file.write_all(&bytes).map_err(ShmError::Io)?;
    Ok(())
}

/// Read the sidecar at `path` back into a descriptor.
///
/// Readers assume a fully written file; there is no partial-write detection.
pub fn read_descriptor(path: &Path) -> Result<SegmentDescriptor, ShmError> {
    tracing::trace!(path = %path.display(), "reading sidecar");
    let bytes = fs::read(path).map_err(ShmError::Io)?;
    serde_json::from_slice(&bytes).map_err(ShmError::Marshal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("sysv_shm_desc_{}_{}", tag, std::process::id()))
    }

    #[test]
    fn test_descriptor_round_trips_every_field() {
        let path = temp_path("round_trip");
        let descriptor = SegmentDescriptor {
            key: 0x0101_4a3b,
            size: 4096,
            segment_id: 42,
            permissions: Some(0o640),
            discriminant: Some(3),
        };

        write_descriptor(&path, &descriptor).unwrap();
        let read_back = read_descriptor(&path).unwrap();
        assert_eq!(read_back, descriptor);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_optional_fields_default_to_none() {
        let path = temp_path("optional");
        std::fs::write(&path, br#"{"key":1,"size":64,"segmentID":7}"#).unwrap();

        let descriptor = read_descriptor(&path).unwrap();
        assert_eq!(descriptor.key, 1);
        assert_eq!(descriptor.size, 64);
        assert_eq!(descriptor.segment_id, 7);
        assert_eq!(descriptor.permissions, None);
        assert_eq!(descriptor.discriminant, None);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_missing_sidecar_is_io_error() {
        let path = temp_path("missing");
        let err = read_descriptor(&path).unwrap_err();
        assert!(matches!(err, ShmError::Io(_)));
    }

    #[test]
    fn test_garbage_sidecar_is_marshal_error() {
        let path = temp_path("garbage");
        std::fs::write(&path, b"not a descriptor").unwrap();

        let err = read_descriptor(&path).unwrap_err();
        assert!(matches!(err, ShmError::Marshal(_)));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_sidecar_mode_follows_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let path = temp_path("mode");
        let descriptor = SegmentDescriptor {
            key: 9,
            size: 16,
            segment_id: 1,
            permissions: Some(0o600),
            discriminant: None,
        };
        write_descriptor(&path, &descriptor).unwrap();

        // Owner bits survive any reasonable umask; group/other may be masked.
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o700, 0o600);

        std::fs::remove_file(&path).ok();
    }
}
