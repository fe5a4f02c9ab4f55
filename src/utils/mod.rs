// src/utils/mod.rs

pub mod binary_stream;
pub mod error;

pub use binary_stream::BinaryStream;
pub use error::{BinaryDataError, BinaryResult};

use once_cell::sync::Lazy;
use std::time::Instant;

static EPOCH: Lazy<Instant> = Lazy::new(Instant::now);

/// Milliseconds elapsed on the process-wide monotonic clock. Ping/Pong
/// timestamps are taken from this clock so round-trip math stays immune to
/// wall-clock adjustments.
pub fn monotonic_ms() -> u64 {
    EPOCH.elapsed().as_millis() as u64
}
