//! Device abstraction layer for serial communication.
//!
//! Provides the port configuration plus one device trait per I/O model:
//! [`SerialDevice`] for readiness-driven descriptors and [`OverlappedDevice`]
//! for completion-driven handles, with native and mock implementations.

pub mod error;
pub mod mock;
pub mod traits;

#[cfg(unix)]
pub mod fd;

#[cfg(windows)]
pub mod com;

pub use error::PortError;
pub use mock::{Completion, MockOverlappedPort, MockSerialPort};
pub use traits::*;

#[cfg(unix)]
pub use fd::FdPort;

#[cfg(windows)]
pub use com::{ComOp, ComPort};
