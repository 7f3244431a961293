//! Core traits for serial device abstraction.
//!
//! Defines the port configuration shared by both transports and the two
//! device capability sets: [`SerialDevice`] for readiness-based I/O and
//! [`OverlappedDevice`] for completion-based I/O.

use super::error::PortError;
use crate::reactor::{Descriptor, EventHandle};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Parameters describing how the underlying device is opened.
///
/// A transport keeps its own copy and only hands out shared references, so
/// the configuration cannot change once the port is open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortConfig {
    /// Baud rate (bits per second).
    pub baud_rate: u32,

    /// Number of data bits per character.
    pub byte_size: DataBits,

    /// Parity checking mode.
    pub parity: Parity,

    /// Number of stop bits.
    pub stop_bits: StopBits,

    /// Inter-byte read timeout, interpreted by the device driver.
    pub timeout: Option<Duration>,

    /// XON/XOFF software flow control.
    pub soft_flow_control: bool,

    /// RTS/CTS hardware flow control.
    pub hard_flow_control: bool,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            byte_size: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            timeout: None,
            soft_flow_control: false,
            hard_flow_control: false,
        }
    }
}

impl PortConfig {
    /// Create a configuration with the given baud rate and 8N1 framing.
    pub fn with_baud_rate(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            ..Self::default()
        }
    }

    /// Check that the parameters describe a line setting a UART can produce.
    pub fn validate(&self) -> Result<(), PortError> {
        if self.baud_rate == 0 {
            return Err(PortError::config("baud rate must be non-zero"));
        }
        match (self.stop_bits, self.byte_size) {
            (StopBits::OnePointFive, bits) if bits != DataBits::Five => Err(PortError::config(
                format!("1.5 stop bits require 5 data bits, got {}", bits.bits()),
            )),
            (StopBits::Two, DataBits::Five) => Err(PortError::config(
                "2 stop bits cannot be combined with 5 data bits",
            )),
            _ => Ok(()),
        }
    }

    /// Flow control mode as understood by the `serialport` crate.
    pub fn flow_control(&self) -> Result<serialport::FlowControl, PortError> {
        match (self.soft_flow_control, self.hard_flow_control) {
            (false, false) => Ok(serialport::FlowControl::None),
            (true, false) => Ok(serialport::FlowControl::Software),
            (false, true) => Ok(serialport::FlowControl::Hardware),
            (true, true) => Err(PortError::config(
                "software and hardware flow control cannot both be enabled",
            )),
        }
    }
}

/// Number of data bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataBits {
    Five,
    Six,
    Seven,
    Eight,
}

impl DataBits {
    /// The bit count as a number.
    pub fn bits(self) -> u8 {
        match self {
            DataBits::Five => 5,
            DataBits::Six => 6,
            DataBits::Seven => 7,
            DataBits::Eight => 8,
        }
    }
}

impl From<DataBits> for serialport::DataBits {
    fn from(bits: DataBits) -> Self {
        match bits {
            DataBits::Five => serialport::DataBits::Five,
            DataBits::Six => serialport::DataBits::Six,
            DataBits::Seven => serialport::DataBits::Seven,
            DataBits::Eight => serialport::DataBits::Eight,
        }
    }
}

/// Parity checking modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    None,
    Odd,
    Even,
    Mark,
    Space,
}

impl TryFrom<Parity> for serialport::Parity {
    type Error = PortError;

    fn try_from(parity: Parity) -> Result<Self, Self::Error> {
        match parity {
            Parity::None => Ok(serialport::Parity::None),
            Parity::Odd => Ok(serialport::Parity::Odd),
            Parity::Even => Ok(serialport::Parity::Even),
            Parity::Mark | Parity::Space => Err(PortError::config(format!(
                "{parity:?} parity is not supported on this platform"
            ))),
        }
    }
}

/// Number of stop bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopBits {
    One,
    OnePointFive,
    Two,
}

impl TryFrom<StopBits> for serialport::StopBits {
    type Error = PortError;

    fn try_from(bits: StopBits) -> Result<Self, Self::Error> {
        match bits {
            StopBits::One => Ok(serialport::StopBits::One),
            StopBits::Two => Ok(serialport::StopBits::Two),
            StopBits::OnePointFive => Err(PortError::config(
                "1.5 stop bits are not supported on this platform",
            )),
        }
    }
}

/// A device driven by readiness notification.
///
/// Reads and writes are non-blocking: when the device cannot make progress
/// it reports an error for which [`PortError::is_would_block`] is true.
pub trait SerialDevice: std::fmt::Debug {
    /// Get the name/path of this device.
    fn name(&self) -> &str;

    /// The descriptor the event loop watches for readiness.
    fn descriptor(&self) -> Descriptor;

    /// Read available bytes into `buffer` without blocking.
    ///
    /// `Ok(0)` is not end of stream for a serial line.
    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError>;

    /// Write as many bytes of `data` as the device accepts without blocking.
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError>;

    /// Discard unread input and untransmitted output.
    fn clear_buffers(&mut self) -> Result<(), PortError>;

    /// Release the device handle. Calling this twice is not an error.
    fn close(&mut self) -> Result<(), PortError>;
}

/// Direction of an overlapped operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Read,
    Write,
}

/// An operation submitted to the OS and not yet released.
///
/// The buffer is moved in on submission and only comes back out through
/// [`OverlappedDevice::release`]; until then nothing else can reach it, which
/// is what keeps it valid while the OS may still be writing into or reading
/// from it.
#[derive(Debug)]
pub struct Outstanding<N> {
    kind: OpKind,
    event: EventHandle,
    buffer: Vec<u8>,
    native: N,
}

impl<N> Outstanding<N> {
    /// Bundle a submitted operation with the state the OS references.
    pub fn new(kind: OpKind, event: EventHandle, buffer: Vec<u8>, native: N) -> Self {
        Self {
            kind,
            event,
            buffer,
            native,
        }
    }

    pub fn kind(&self) -> OpKind {
        self.kind
    }

    /// The native event signaled when the operation finishes.
    pub fn event(&self) -> EventHandle {
        self.event
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Mutable access for the device while it collects a finished read.
    pub fn buffer_mut(&mut self) -> &mut [u8] {
        &mut self.buffer
    }

    pub fn native(&self) -> &N {
        &self.native
    }

    pub fn native_mut(&mut self) -> &mut N {
        &mut self.native
    }

    /// Split the record. Only devices should call this, from `release`.
    pub fn into_parts(self) -> (Vec<u8>, N) {
        (self.buffer, self.native)
    }
}

/// A device driven by completion notification.
pub trait OverlappedDevice: std::fmt::Debug {
    /// Per-operation OS state that must live as long as the operation.
    type Native;

    /// Get the name/path of this device.
    fn name(&self) -> &str;

    /// Discard unread input and untransmitted output.
    fn clear_buffers(&mut self) -> Result<(), PortError>;

    /// Start an asynchronous read into, or write from, `buffer`.
    fn submit(
        &mut self,
        kind: OpKind,
        buffer: Vec<u8>,
    ) -> Result<Outstanding<Self::Native>, PortError>;

    /// Number of bytes the finished operation transferred.
    ///
    /// Called once the operation's event has been signaled. For reads the
    /// transferred bytes are at the front of the operation's buffer afterwards.
    fn result(&mut self, op: &mut Outstanding<Self::Native>) -> Result<usize, PortError>;

    /// Take the buffer back, cancelling the operation first if the OS may
    /// still be using it.
    fn release(&mut self, op: Outstanding<Self::Native>) -> Vec<u8>;

    /// Release the device handle. Calling this twice is not an error.
    fn close(&mut self) -> Result<(), PortError>;
}
