use std::io;

use thiserror::Error;

/// Result type for the event pipeline.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the capture loop, the emitters and the scroll queue.
///
/// `DeviceOpen` and `Setup` are fatal and abort startup; `Emit` and
/// `QueueFull` are recoverable and handled where they occur.
#[derive(Debug, Error)]
pub enum Error {
    /// The physical input device could not be opened or grabbed.
    #[error("cannot open input device {path}: {source}")]
    DeviceOpen { path: String, source: io::Error },

    /// A uinput virtual device could not be created.
    #[error("cannot create virtual {kind} device: {source}")]
    Setup { kind: &'static str, source: io::Error },

    /// A write to a virtual device failed.
    #[error("virtual device write failed: {0}")]
    Emit(#[source] io::Error),

    /// The scroll queue was at capacity; the delta was dropped.
    #[error("scroll queue full, dropped delta {0}")]
    QueueFull(i32),
}
