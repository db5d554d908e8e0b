//! Error types.
//!
//! Transport failures on the read path never reach the consumer as errors: they turn into a
//! disconnect followed by a reattach attempt. [`HidError`] is only returned from operations the
//! consumer calls directly (writes, feature reports, config loading).

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum HidError {
    #[cfg(feature = "hid")]
    #[error("hidapi: {0}")]
    Hid(#[from] hidapi::HidError),
    #[error("I/O: {0}")]
    Io(#[from] io::Error),
    #[error("failed to open device: {0}")]
    Open(String),
    #[error("no device is attached")]
    NotConnected,
    #[error("stream is closed")]
    Closed,
    #[error("operation not supported by this transport: {0}")]
    Unsupported(&'static str),
    #[error("config: {0}")]
    Config(String),
    #[error("failed to spawn reader thread: {0}")]
    Spawn(io::Error),
}

/// Outcome of a read that did not produce bytes.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    /// The epoch's token was cancelled while the read was pending.
    #[error("read cancelled")]
    Cancelled,
    /// The stream failed; the device is most likely gone.
    #[error("read failed: {0}")]
    Io(#[source] HidError),
}

pub type Result<T, E = HidError> = std::result::Result<T, E>;
