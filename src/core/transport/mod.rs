//! Transport layer for the serial links
//!
//! A link opens a [`LinkStream`] through a [`LinkOpener`]. The production
//! opener is [`SerialOpener`]; tests substitute in-memory streams.

mod serial;

pub use serial::{
    SerialConfig, SerialOpener, SerialStream, READ_TIMEOUT, TRIGGER_BAUD_RATE, ULTRASONIC_BAUD_RATE,
};

use std::io::{Read, Write};
use std::sync::Arc;
use thiserror::Error;

/// Transport error types
#[derive(Error, Debug)]
pub enum TransportError {
    /// Port not found
    #[error("Port not found: {0}")]
    PortNotFound(String),

    /// Permission denied
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Link already running
    #[error("Link already running")]
    AlreadyRunning,

    /// Interval must be positive
    #[error("Invalid interval: {0} ms")]
    InvalidInterval(u64),

    /// Link was destroyed and cannot be restarted
    #[error("Link destroyed")]
    Destroyed,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// An open, bidirectional byte stream bound to one device path.
///
/// Reads are expected to return `ErrorKind::TimedOut` (or `WouldBlock`)
/// periodically when idle so the reader loop can observe cancellation.
pub trait LinkStream: Read + Write + Send {}

impl<T: Read + Write + Send> LinkStream for T {}

/// Opens link streams
pub trait LinkOpener: Send + Sync {
    /// Open the device described by `config`
    fn open(&self, config: &SerialConfig) -> Result<Box<dyn LinkStream>, TransportError>;
}

impl<T: LinkOpener + ?Sized> LinkOpener for Arc<T> {
    fn open(&self, config: &SerialConfig) -> Result<Box<dyn LinkStream>, TransportError> {
        (**self).open(config)
    }
}

/// Whether a read error just means "no data yet"
pub(crate) fn is_idle_error(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock | std::io::ErrorKind::Interrupted
    )
}
