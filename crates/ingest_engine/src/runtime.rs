use std::io;

use tokio::runtime::{Builder, Runtime};

/// Single-threaded runtime that the blocking HTTP components drive with
/// `block_on`. Must not be created or dropped from inside another runtime.
pub(crate) fn blocking_runtime() -> io::Result<Runtime> {
    Builder::new_current_thread().enable_all().build()
}
