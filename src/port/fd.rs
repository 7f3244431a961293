//! Non-blocking descriptor device for POSIX systems.
//!
//! Serial devices are opened and configured through the `serialport` crate;
//! after that only the raw descriptor is kept and driven with `libc` calls.

use super::error::PortError;
use super::traits::{PortConfig, SerialDevice};
use crate::reactor::Descriptor;
use std::os::fd::{AsRawFd, FromRawFd, IntoRawFd, OwnedFd, RawFd};
use std::time::Duration;

/// A readiness-driven device backed by a file descriptor.
pub struct FdPort {
    fd: Option<OwnedFd>,
    name: String,
}

impl FdPort {
    /// Open and configure a serial device.
    ///
    /// # Example
    /// ```no_run
    /// use serialtx::port::{FdPort, PortConfig};
    ///
    /// let port = FdPort::open("/dev/ttyUSB0", &PortConfig::with_baud_rate(115200))?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn open(device_name: &str, config: &PortConfig) -> Result<Self, PortError> {
        config.validate()?;

        let port = serialport::new(device_name, config.baud_rate)
            .data_bits(config.byte_size.into())
            .parity(config.parity.try_into()?)
            .stop_bits(config.stop_bits.try_into()?)
            .flow_control(config.flow_control()?)
            .timeout(config.timeout.unwrap_or(Duration::ZERO))
            .open_native()
            .map_err(|e| match e.kind() {
                serialport::ErrorKind::NoDevice => PortError::not_found(device_name),
                serialport::ErrorKind::InvalidInput => PortError::config(e.to_string()),
                _ => PortError::Serial(e),
            })?;

        // SAFETY: `into_raw_fd` hands over sole ownership of an open descriptor.
        let fd = unsafe { OwnedFd::from_raw_fd(port.into_raw_fd()) };
        Self::from_fd(device_name, fd)
    }

    /// Wrap an already open descriptor, such as one end of a pty or socket pair.
    pub fn from_fd(name: impl Into<String>, fd: OwnedFd) -> Result<Self, PortError> {
        set_nonblocking(fd.as_raw_fd())?;
        Ok(Self {
            fd: Some(fd),
            name: name.into(),
        })
    }

    pub fn is_open(&self) -> bool {
        self.fd.is_some()
    }

    fn raw(&self) -> Result<RawFd, PortError> {
        self.fd
            .as_ref()
            .map(AsRawFd::as_raw_fd)
            .ok_or(PortError::Closed)
    }
}

fn set_nonblocking(fd: RawFd) -> Result<(), PortError> {
    // SAFETY: fcntl on a descriptor we own; no pointers are passed.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(PortError::last_os_error());
    }
    // SAFETY: as above.
    let rc = unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
    if rc < 0 {
        return Err(PortError::last_os_error());
    }
    Ok(())
}

impl SerialDevice for FdPort {
    fn name(&self) -> &str {
        &self.name
    }

    fn descriptor(&self) -> Descriptor {
        Descriptor(self.fd.as_ref().map_or(-1, AsRawFd::as_raw_fd))
    }

    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError> {
        let fd = self.raw()?;
        // SAFETY: `buffer` is valid for writes of `buffer.len()` bytes.
        let n = unsafe { libc::read(fd, buffer.as_mut_ptr().cast(), buffer.len()) };
        if n < 0 {
            return Err(PortError::last_os_error());
        }
        Ok(n as usize)
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError> {
        let fd = self.raw()?;
        // SAFETY: `data` is valid for reads of `data.len()` bytes.
        let n = unsafe { libc::write(fd, data.as_ptr().cast(), data.len()) };
        if n < 0 {
            return Err(PortError::last_os_error());
        }
        Ok(n as usize)
    }

    fn clear_buffers(&mut self) -> Result<(), PortError> {
        let fd = self.raw()?;
        // SAFETY: tcflush takes only the descriptor and a queue selector.
        let rc = unsafe { libc::tcflush(fd, libc::TCIOFLUSH) };
        if rc < 0 {
            let err = std::io::Error::last_os_error();
            // Pipes and sockets have no line discipline to flush.
            if err.raw_os_error() == Some(libc::ENOTTY) {
                return Ok(());
            }
            return Err(PortError::Io(err));
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), PortError> {
        if let Some(fd) = self.fd.take() {
            // SAFETY: the descriptor is owned and is not used after this call.
            let rc = unsafe { libc::close(fd.into_raw_fd()) };
            if rc < 0 {
                return Err(PortError::last_os_error());
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for FdPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FdPort")
            .field("name", &self.name)
            .field("fd", &self.descriptor().0)
            .finish()
    }
}
