//! Port-specific error types.
//!
//! Device-level failures are kept separate from transport-level errors so the
//! transports can decide which conditions are fatal and which merely re-arm
//! a notification.

use thiserror::Error;

/// Errors that can occur during serial device operations.
#[derive(Debug, Error)]
pub enum PortError {
    /// The specified serial device was not found on the system.
    #[error("Serial device not found: {0}")]
    NotFound(String),

    /// An I/O error occurred during a device operation.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The requested configuration cannot be applied.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The device handle has already been closed.
    #[error("Device is closed")]
    Closed,

    /// A serialport-specific error occurred.
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),
}

impl PortError {
    /// Create a NotFound error from a device name.
    pub fn not_found(device_name: impl Into<String>) -> Self {
        Self::NotFound(device_name.into())
    }

    /// Create a Config error from a message.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Wrap the calling thread's last OS error.
    pub fn last_os_error() -> Self {
        Self::Io(std::io::Error::last_os_error())
    }

    /// True when the operation could not proceed without blocking.
    ///
    /// Interrupted calls are grouped with would-block: in both cases the
    /// transport waits for the next notification instead of failing.
    pub fn is_would_block(&self) -> bool {
        matches!(
            self,
            Self::Io(e) if matches!(
                e.kind(),
                std::io::ErrorKind::WouldBlock | std::io::ErrorKind::Interrupted
            )
        )
    }

    /// The raw OS error code behind this error, if there is one.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::Io(e) => e.raw_os_error(),
            _ => None,
        }
    }
}
