//! RT-safe deferred deallocation for decoded sounds
//!
//! Decoded sounds are shared between the cache (control side) and any number
//! of voices (audio thread) through `basedrop::Shared`. When the audio thread
//! drops the last reference, for example after a cache eviction while the
//! sound was still playing, the buffer is not freed in the callback. The
//! pointer is queued and freed here on a background thread.
//!
//! ```ignore
//! use basedrop::Shared;
//! use soundboard_core::engine::gc_handle;
//!
//! let asset = Shared::new(&gc_handle(), asset);
//! let for_voice = asset.clone();
//! drop(for_voice); // on the audio thread: only enqueues
//! ```

use basedrop::{Collector, Handle};
use std::sync::mpsc;
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

/// How often the collector thread frees queued allocations
const COLLECT_INTERVAL: Duration = Duration::from_millis(100);

/// Global handle for creating `Shared<T>` allocations
///
/// The `Collector` itself is `!Sync` and lives on the GC thread.
static GC_HANDLE: OnceLock<Handle> = OnceLock::new();

fn init_gc() -> Handle {
    let (tx, rx) = mpsc::channel();

    thread::Builder::new()
        .name("sound-gc".to_string())
        .spawn(move || {
            let mut collector = Collector::new();
            tx.send(collector.handle()).expect("Failed to send GC handle");

            log::info!("Sound GC thread started");

            loop {
                collector.collect();
                thread::sleep(COLLECT_INTERVAL);
            }
        })
        .expect("Failed to spawn sound GC thread");

    rx.recv().expect("Failed to receive GC handle")
}

/// Get a handle for creating `Shared<T>` allocations
///
/// The first call starts the collector thread.
pub fn gc_handle() -> Handle {
    GC_HANDLE.get_or_init(init_gc).clone()
}
