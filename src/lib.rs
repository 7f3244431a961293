//! Serial port transport for single-threaded event loops.
//!
//! A transport owns an open serial device and a [`Protocol`], registers the
//! device with a [`Reactor`] and turns the loop's callbacks into
//! `bytes_received` and `connection_lost` calls. Two I/O models are provided:
//!
//! - [`ReadinessTransport`]: non-blocking reads and writes driven by
//!   readable/writable notifications (POSIX).
//! - [`CompletionTransport`]: overlapped reads and writes driven by completion
//!   events, with one read always outstanding and writes serialized through a
//!   FIFO queue (Windows).
//!
//! # Modules
//!
//! - `port`: device configuration and the readiness/completion device traits
//! - `reactor`: event-loop adapter contract and the native loops
//! - `protocol`: the protocol/transport interfaces
//! - `transport`: the two transport implementations and their observer hook
//! - `error`: transport errors and disconnect reasons
//! - `config`: TOML settings with environment overrides
//! - `logging`: subscriber setup for the binary

pub mod config;
pub mod error;
pub mod logging;
pub mod port;
pub mod protocol;
pub mod reactor;
pub mod transport;

// Re-export commonly used types for convenience
pub use error::{DeviceFault, DisconnectReason, TransportError, TransportResult};
pub use port::{DataBits, OverlappedDevice, Parity, PortConfig, PortError, SerialDevice, StopBits};
pub use protocol::{Protocol, Transport};
pub use reactor::{Callback, EventHandler, PlatformLoop, Reactor};
pub use transport::{
    CompletionState, CompletionTransport, PlatformTransport, ReadinessTransport, TransportOptions,
};
