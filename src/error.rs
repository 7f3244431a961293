//! Transport-level errors and disconnect reasons.

use crate::port::PortError;
use std::fmt;
use thiserror::Error;

/// Errors returned by transport construction and the write path.
///
/// Failures that happen while the loop is driving the transport are not
/// returned to anyone; they close the transport and reach the protocol as a
/// [`DisconnectReason`].
#[derive(Debug, Error)]
pub enum TransportError {
    /// Opening or preparing the device failed.
    #[error("device error: {0}")]
    Port(#[from] PortError),

    /// The event loop refused a registration.
    #[error("event loop registration failed: {0}")]
    Register(#[source] std::io::Error),

    /// The transport has already been closed.
    #[error("transport is not connected")]
    NotConnected,
}

/// A specialized `Result` type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// OS-level detail of a device failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceFault {
    /// Raw OS error code, when the failure came from the OS.
    pub code: Option<i32>,
    pub message: String,
}

impl DeviceFault {
    pub fn new(code: Option<i32>, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<&PortError> for DeviceFault {
    fn from(err: &PortError) -> Self {
        Self::new(err.raw_os_error(), err.to_string())
    }
}

impl From<&std::io::Error> for DeviceFault {
    fn from(err: &std::io::Error) -> Self {
        Self::new(err.raw_os_error(), err.to_string())
    }
}

impl fmt::Display for DeviceFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} (os error {code})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Why a transport closed, as reported to `Protocol::connection_lost`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// `lose_connection` was called.
    ClosedByRequest,
    /// A device operation or completion query failed.
    DeviceError(DeviceFault),
    /// An overlapped write completed having transferred nothing.
    WriteFailed,
}

impl DisconnectReason {
    /// True for every reason except an explicit close.
    pub fn is_error(&self) -> bool {
        !matches!(self, Self::ClosedByRequest)
    }
}

impl From<PortError> for DisconnectReason {
    fn from(err: PortError) -> Self {
        Self::DeviceError(DeviceFault::from(&err))
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClosedByRequest => f.write_str("connection closed by request"),
            Self::DeviceError(fault) => write!(f, "device error: {fault}"),
            Self::WriteFailed => f.write_str("write failed: no bytes transferred"),
        }
    }
}
