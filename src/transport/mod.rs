//! Serial transports.
//!
//! [`ReadinessTransport`] drives a [`SerialDevice`](crate::port::SerialDevice)
//! from readable/writable notifications; [`CompletionTransport`] drives an
//! [`OverlappedDevice`](crate::port::OverlappedDevice) from completion
//! signals. Both implement [`Transport`](crate::protocol::Transport) and
//! [`EventHandler`](crate::reactor::EventHandler) and share nothing but the
//! port configuration.

pub mod completion;
pub mod observer;
pub mod readiness;

use std::fmt;
use std::sync::Arc;

pub use completion::{CompletionState, CompletionTransport};
pub use observer::{RecordingObserver, TracingObserver, TransportEvent, TransportObserver};
pub use readiness::ReadinessTransport;

/// The transport using the native I/O model of the current platform.
#[cfg(unix)]
pub type PlatformTransport<P, R> = ReadinessTransport<P, crate::port::FdPort, R>;

/// The transport using the native I/O model of the current platform.
#[cfg(windows)]
pub type PlatformTransport<P, R> = CompletionTransport<P, crate::port::ComPort, R>;

/// Construction-time knobs shared by both transports.
#[derive(Clone)]
pub struct TransportOptions {
    /// Capacity of each read; `None` picks the transport's default.
    pub read_buffer_size: Option<usize>,
    /// Where transport events are reported.
    pub observer: Arc<dyn TransportObserver>,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            read_buffer_size: None,
            observer: Arc::new(TracingObserver),
        }
    }
}

impl TransportOptions {
    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = Some(size);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn TransportObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub(crate) fn read_buffer_size_or(&self, default: usize) -> usize {
        self.read_buffer_size.filter(|n| *n > 0).unwrap_or(default)
    }
}

impl fmt::Debug for TransportOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportOptions")
            .field("read_buffer_size", &self.read_buffer_size)
            .finish_non_exhaustive()
    }
}
