//! Overlapped COM port for Windows.
//!
//! The handle is opened with `FILE_FLAG_OVERLAPPED`; every read or write is
//! submitted with its own `OVERLAPPED` block and manual-reset event, both
//! heap-allocated and owned by the [`Outstanding`] record until release.

use super::error::PortError;
use super::traits::{OpKind, OverlappedDevice, Outstanding, Parity, PortConfig, StopBits};
use crate::reactor::EventHandle;
use std::ffi::OsStr;
use std::io;
use std::os::windows::ffi::OsStrExt;
use std::ptr;
use winapi::shared::minwindef::{DWORD, FALSE, TRUE};
use winapi::shared::winerror::{ERROR_FILE_NOT_FOUND, ERROR_IO_PENDING};
use winapi::um::commapi::{GetCommState, PurgeComm, SetCommState, SetCommTimeouts};
use winapi::um::errhandlingapi::GetLastError;
use winapi::um::fileapi::{CreateFileW, ReadFile, WriteFile, OPEN_EXISTING};
use winapi::um::handleapi::{CloseHandle, INVALID_HANDLE_VALUE};
use winapi::um::ioapiset::{CancelIoEx, GetOverlappedResult};
use winapi::um::minwinbase::OVERLAPPED;
use winapi::um::synchapi::CreateEventW;
use winapi::um::winbase::{
    COMMTIMEOUTS, DCB, DTR_CONTROL_ENABLE, EVENPARITY, FILE_FLAG_OVERLAPPED, MARKPARITY,
    NOPARITY, ODDPARITY, ONE5STOPBITS, ONESTOPBIT, PURGE_RXCLEAR, PURGE_TXCLEAR,
    RTS_CONTROL_ENABLE, RTS_CONTROL_HANDSHAKE, SPACEPARITY, TWOSTOPBITS,
};
use winapi::um::winnt::{GENERIC_READ, GENERIC_WRITE, HANDLE, MAXDWORD};

const XON: i8 = 0x11;
const XOFF: i8 = 0x13;

/// A manual-reset event closed on drop.
#[derive(Debug)]
struct OwnedEvent(HANDLE);

impl OwnedEvent {
    fn new() -> Result<Self, PortError> {
        // SAFETY: default security, manual reset, initially unsignaled, unnamed.
        let handle = unsafe { CreateEventW(ptr::null_mut(), TRUE, FALSE, ptr::null()) };
        if handle.is_null() {
            return Err(PortError::last_os_error());
        }
        Ok(Self(handle))
    }
}

impl Drop for OwnedEvent {
    fn drop(&mut self) {
        // SAFETY: the handle came from CreateEventW and is closed only here.
        unsafe {
            CloseHandle(self.0);
        }
    }
}

/// OS state referenced by one in-flight operation.
pub struct ComOp {
    overlapped: Box<OVERLAPPED>,
    _event: OwnedEvent,
}

impl std::fmt::Debug for ComOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComOp")
            .field("event", &self.overlapped.hEvent)
            .finish_non_exhaustive()
    }
}

/// A completion-driven serial device.
pub struct ComPort {
    handle: Option<HANDLE>,
    name: String,
}

impl ComPort {
    /// Open `device_name` (e.g. `COM3`) for overlapped I/O and apply `config`.
    pub fn open(device_name: &str, config: &PortConfig) -> Result<Self, PortError> {
        config.validate()?;

        let path = if device_name.starts_with(r"\\") {
            device_name.to_string()
        } else {
            format!(r"\\.\{device_name}")
        };
        let wide: Vec<u16> = OsStr::new(&path)
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();

        // SAFETY: `wide` is a NUL-terminated UTF-16 path; other pointers are null.
        let handle = unsafe {
            CreateFileW(
                wide.as_ptr(),
                GENERIC_READ | GENERIC_WRITE,
                0,
                ptr::null_mut(),
                OPEN_EXISTING,
                FILE_FLAG_OVERLAPPED,
                ptr::null_mut(),
            )
        };
        if handle == INVALID_HANDLE_VALUE {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(ERROR_FILE_NOT_FOUND as i32) {
                return Err(PortError::not_found(device_name));
            }
            return Err(PortError::Io(err));
        }

        let port = Self {
            handle: Some(handle),
            name: device_name.to_string(),
        };
        port.configure(handle, config)?;
        Ok(port)
    }

    fn configure(&self, handle: HANDLE, config: &PortConfig) -> Result<(), PortError> {
        // SAFETY: DCB is plain data; GetCommState fills it in.
        let mut dcb: DCB = unsafe { std::mem::zeroed() };
        dcb.DCBlength = std::mem::size_of::<DCB>() as DWORD;
        // SAFETY: `handle` is an open comm handle and `dcb` is writable.
        if unsafe { GetCommState(handle, &mut dcb) } == 0 {
            return Err(PortError::last_os_error());
        }

        dcb.BaudRate = config.baud_rate;
        dcb.ByteSize = config.byte_size.bits();
        dcb.Parity = match config.parity {
            Parity::None => NOPARITY,
            Parity::Odd => ODDPARITY,
            Parity::Even => EVENPARITY,
            Parity::Mark => MARKPARITY,
            Parity::Space => SPACEPARITY,
        } as u8;
        dcb.StopBits = match config.stop_bits {
            StopBits::One => ONESTOPBIT,
            StopBits::OnePointFive => ONE5STOPBITS,
            StopBits::Two => TWOSTOPBITS,
        } as u8;
        dcb.set_fBinary(1);
        dcb.set_fParity((config.parity != Parity::None) as DWORD);
        dcb.set_fOutxCtsFlow(config.hard_flow_control as DWORD);
        dcb.set_fOutxDsrFlow(0);
        dcb.set_fDtrControl(DTR_CONTROL_ENABLE);
        dcb.set_fRtsControl(if config.hard_flow_control {
            RTS_CONTROL_HANDSHAKE
        } else {
            RTS_CONTROL_ENABLE
        });
        dcb.set_fOutX(config.soft_flow_control as DWORD);
        dcb.set_fInX(config.soft_flow_control as DWORD);
        dcb.XonChar = XON;
        dcb.XoffChar = XOFF;

        // SAFETY: as above.
        if unsafe { SetCommState(handle, &mut dcb) } == 0 {
            return Err(PortError::last_os_error());
        }

        // Reads finish as soon as any byte is buffered, or with zero bytes
        // once the total timeout passes.
        let constant = config
            .timeout
            .map(|t| t.as_millis().clamp(1, (MAXDWORD - 1) as u128) as DWORD)
            .unwrap_or(MAXDWORD - 1);
        let mut timeouts = COMMTIMEOUTS {
            ReadIntervalTimeout: MAXDWORD,
            ReadTotalTimeoutMultiplier: MAXDWORD,
            ReadTotalTimeoutConstant: constant,
            WriteTotalTimeoutMultiplier: 0,
            WriteTotalTimeoutConstant: 0,
        };
        // SAFETY: as above.
        if unsafe { SetCommTimeouts(handle, &mut timeouts) } == 0 {
            return Err(PortError::last_os_error());
        }
        Ok(())
    }

    fn raw(&self) -> Result<HANDLE, PortError> {
        self.handle.ok_or(PortError::Closed)
    }
}

impl OverlappedDevice for ComPort {
    type Native = ComOp;

    fn name(&self) -> &str {
        &self.name
    }

    fn clear_buffers(&mut self) -> Result<(), PortError> {
        let handle = self.raw()?;
        // SAFETY: `handle` is an open comm handle.
        if unsafe { PurgeComm(handle, PURGE_RXCLEAR | PURGE_TXCLEAR) } == 0 {
            return Err(PortError::last_os_error());
        }
        Ok(())
    }

    fn submit(
        &mut self,
        kind: OpKind,
        mut buffer: Vec<u8>,
    ) -> Result<Outstanding<ComOp>, PortError> {
        let handle = self.raw()?;
        let event = OwnedEvent::new()?;
        // SAFETY: OVERLAPPED is plain data; all-zero is its documented initial state.
        let mut overlapped: Box<OVERLAPPED> = Box::new(unsafe { std::mem::zeroed() });
        overlapped.hEvent = event.0;

        let len = buffer.len() as DWORD;
        // SAFETY: the buffer and the boxed OVERLAPPED are moved into the
        // returned record and stay at the same heap addresses until `release`.
        let ok = unsafe {
            match kind {
                OpKind::Read => ReadFile(
                    handle,
                    buffer.as_mut_ptr().cast(),
                    len,
                    ptr::null_mut(),
                    &mut *overlapped,
                ),
                OpKind::Write => WriteFile(
                    handle,
                    buffer.as_ptr().cast(),
                    len,
                    ptr::null_mut(),
                    &mut *overlapped,
                ),
            }
        };
        if ok == 0 {
            // SAFETY: reads the calling thread's last error code.
            let code = unsafe { GetLastError() };
            if code != ERROR_IO_PENDING {
                return Err(PortError::Io(io::Error::from_raw_os_error(code as i32)));
            }
        }

        let handle = EventHandle(event.0 as isize);
        Ok(Outstanding::new(
            kind,
            handle,
            buffer,
            ComOp {
                overlapped,
                _event: event,
            },
        ))
    }

    fn result(&mut self, op: &mut Outstanding<ComOp>) -> Result<usize, PortError> {
        let handle = self.raw()?;
        let mut transferred: DWORD = 0;
        // SAFETY: the OVERLAPPED belongs to an operation issued on `handle`.
        let ok = unsafe {
            GetOverlappedResult(
                handle,
                &mut *op.native_mut().overlapped,
                &mut transferred,
                FALSE,
            )
        };
        if ok == 0 {
            return Err(PortError::last_os_error());
        }
        Ok(transferred as usize)
    }

    fn release(&mut self, mut op: Outstanding<ComOp>) -> Vec<u8> {
        if let Some(handle) = self.handle {
            let mut transferred: DWORD = 0;
            let overlapped: *mut OVERLAPPED = &mut *op.native_mut().overlapped;
            // SAFETY: cancelling a finished operation is harmless; the blocking
            // GetOverlappedResult guarantees the OS is done with the buffer
            // before it is handed back.
            unsafe {
                CancelIoEx(handle, overlapped);
                GetOverlappedResult(handle, overlapped, &mut transferred, TRUE);
            }
        }
        let (buffer, _native) = op.into_parts();
        buffer
    }

    fn close(&mut self) -> Result<(), PortError> {
        if let Some(handle) = self.handle.take() {
            // SAFETY: the handle is owned and not used after this call.
            if unsafe { CloseHandle(handle) } == 0 {
                return Err(PortError::last_os_error());
            }
        }
        Ok(())
    }
}

impl Drop for ComPort {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl std::fmt::Debug for ComPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComPort")
            .field("name", &self.name)
            .field("open", &self.handle.is_some())
            .finish()
    }
}
