//! `WaitForMultipleObjects` based completion loop.

use super::{Callback, Descriptor, EventHandle, EventHandler, Interest, Reactor, Registry, Waitable};
use std::cell::RefCell;
use std::io;
use std::time::Duration;
use tracing::trace;
use winapi::shared::winerror::WAIT_TIMEOUT;
use winapi::um::synchapi::{WaitForMultipleObjects, WaitForSingleObject};
use winapi::um::winbase::{INFINITE, WAIT_FAILED, WAIT_OBJECT_0};
use winapi::um::winnt::{HANDLE, MAXIMUM_WAIT_OBJECTS};

/// A single-threaded loop over native event objects.
///
/// Descriptor registrations are rejected: Windows serial devices are driven
/// by overlapped completion only.
#[derive(Debug, Default)]
pub struct WaitLoop {
    registry: RefCell<Registry>,
}

impl WaitLoop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live registrations.
    pub fn len(&self) -> usize {
        self.registry.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.borrow().is_empty()
    }

    /// Wait up to `timeout` (forever when `None`) for any registered event
    /// and dispatch every event found signaled. Returns the number of
    /// callbacks delivered.
    pub fn run_once(
        &self,
        handler: &mut dyn EventHandler,
        timeout: Option<Duration>,
    ) -> io::Result<usize> {
        let events: Vec<EventHandle> = self
            .registry
            .borrow()
            .entries()
            .iter()
            .filter_map(|(waitable, _)| match waitable {
                Waitable::Event(event) => Some(*event),
                Waitable::Descriptor(..) => None,
            })
            .take(MAXIMUM_WAIT_OBJECTS as usize)
            .collect();

        if events.is_empty() {
            if let Some(timeout) = timeout {
                std::thread::sleep(timeout);
            }
            return Ok(0);
        }

        let handles: Vec<HANDLE> = events.iter().map(|e| e.0 as HANDLE).collect();
        let timeout_ms = timeout
            .map(|t| t.as_millis().min((INFINITE - 1) as u128) as u32)
            .unwrap_or(INFINITE);

        // SAFETY: `handles` holds `handles.len()` event handles owned by the
        // registered transports, all valid while registered.
        let rc = unsafe {
            WaitForMultipleObjects(handles.len() as u32, handles.as_ptr(), 0, timeout_ms)
        };
        if rc == WAIT_FAILED {
            return Err(io::Error::last_os_error());
        }
        if rc == WAIT_TIMEOUT {
            return Ok(0);
        }

        let first = rc.wrapping_sub(WAIT_OBJECT_0) as usize;
        let mut signaled = Vec::new();
        for (index, event) in events.iter().enumerate() {
            let is_signaled = index == first
                // SAFETY: see above; a zero timeout only samples the state.
                || (index > first && unsafe { WaitForSingleObject(event.0 as HANDLE, 0) } == WAIT_OBJECT_0);
            if is_signaled {
                signaled.push(*event);
            }
        }

        let mut dispatched = 0;
        for event in signaled {
            let waitable = Waitable::Event(event);
            let registered = self.registry.borrow().callback(waitable);
            let Some(callback) = registered else {
                continue;
            };
            trace!(?waitable, ?callback, "dispatching");
            handler.on_event(callback);
            dispatched += 1;
        }
        Ok(dispatched)
    }

    /// Dispatch turns until nothing is registered any more.
    pub fn run(&self, handler: &mut dyn EventHandler, turn: Option<Duration>) -> io::Result<()> {
        while !self.is_empty() {
            self.run_once(handler, turn)?;
        }
        Ok(())
    }
}

impl Reactor for WaitLoop {
    fn register_readiness(
        &self,
        _descriptor: Descriptor,
        _interest: Interest,
        _callback: Callback,
    ) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "wait loop cannot watch descriptors",
        ))
    }

    fn register_completion(&self, event: EventHandle, callback: Callback) -> io::Result<()> {
        let registered = self.registry.borrow().len();
        if registered >= MAXIMUM_WAIT_OBJECTS as usize {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "too many events for one wait loop",
            ));
        }
        self.registry
            .borrow_mut()
            .insert(Waitable::Event(event), callback);
        Ok(())
    }

    fn unregister(&self, waitable: Waitable) -> bool {
        self.registry.borrow_mut().remove(waitable)
    }
}
