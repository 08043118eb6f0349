//! Create a segment, attach to it from a second handle, and pass bytes
//! through the shared region.
//!
//! ```bash
//! RUST_LOG=debug cargo run --example rendezvous
//! ```

use sysv_shm::SegmentHandle;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    let path = std::env::temp_dir().join(format!("rendezvous_{}.shm", std::process::id()));

    // Publisher: create the segment and its sidecar, then attach and write.
    let mut publisher = SegmentHandle::new();
    publisher.create(&path, 4096, 0o600, 1)?;
    let region = publisher.attach(&path)?;
    region.write_at(0, b"hello through the segment")?;

    // Consumer: a second handle, knowing only the path. In real use this
    // would live in an unrelated process.
    let mut consumer = SegmentHandle::new();
    let region = consumer.attach(&path)?;
    let mut buf = [0u8; 25];
    region.read_at(0, &mut buf)?;
    println!("consumer read: {}", String::from_utf8_lossy(&buf));
    println!("{}", consumer.describe());

    consumer.detach()?;
    publisher.detach()?;

    // The segment itself outlives both handles; reclaim it here so the demo
    // leaves nothing behind (normally `ipcrm`'s job, not the library's).
    if let Some(descriptor) = consumer.descriptor() {
        unsafe { libc::shmctl(descriptor.segment_id, libc::IPC_RMID, std::ptr::null_mut()) };
    }
    std::fs::remove_file(&path).ok();
    Ok(())
}
