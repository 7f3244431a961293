//! `poll(2)` based readiness loop.

use super::{Callback, Descriptor, EventHandle, EventHandler, Interest, Reactor, Registry, Waitable};
use std::cell::RefCell;
use std::io;
use std::time::Duration;
use tracing::trace;

/// A single-threaded readiness loop over `poll(2)`.
///
/// Completion registrations are rejected: POSIX serial devices are driven
/// by readiness only.
#[derive(Debug, Default)]
pub struct PollLoop {
    registry: RefCell<Registry>,
}

impl PollLoop {
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

    /// Wait up to `timeout` (forever when `None`) and dispatch one turn of
    /// ready callbacks. Returns the number of callbacks delivered.
    ///
    /// An error or hang-up on a descriptor is delivered as
    /// [`Callback::Hangup`], after the registered callback when data is
    /// readable in the same turn.
    pub fn run_once(
        &self,
        handler: &mut dyn EventHandler,
        timeout: Option<Duration>,
    ) -> io::Result<usize> {
        let keys: Vec<(Descriptor, Interest)> = self
            .registry
            .borrow()
            .entries()
            .iter()
            .filter_map(|(waitable, _)| match waitable {
                Waitable::Descriptor(fd, interest) => Some((*fd, *interest)),
                Waitable::Event(_) => None,
            })
            .collect();

        if keys.is_empty() {
            if let Some(timeout) = timeout {
                std::thread::sleep(timeout);
            }
            return Ok(0);
        }

        let mut fds: Vec<libc::pollfd> = keys
            .iter()
            .map(|(fd, interest)| libc::pollfd {
                fd: fd.0,
                events: match interest {
                    Interest::Readable => libc::POLLIN,
                    Interest::Writable => libc::POLLOUT,
                },
                revents: 0,
            })
            .collect();

        let timeout_ms = timeout
            .map(|t| t.as_millis().min(i32::MAX as u128) as libc::c_int)
            .unwrap_or(-1);

        // SAFETY: `fds` is a valid, initialised array of `fds.len()` pollfd
        // structs that outlives the call.
        let rc = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout_ms) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(0);
            }
            return Err(err);
        }

        let mut ready = Vec::new();
        for (pfd, (fd, interest)) in fds.iter().zip(keys) {
            let revents = pfd.revents;
            if revents == 0 {
                continue;
            }
            let waitable = Waitable::Descriptor(fd, interest);
            if revents & (libc::POLLIN | libc::POLLOUT) != 0 {
                ready.push((waitable, None));
            }
            if revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0 {
                ready.push((waitable, Some(Callback::Hangup)));
            }
        }

        let mut dispatched = 0;
        for (waitable, forced) in ready {
            // Registration may have been dropped by an earlier callback this turn.
            let registered = self.registry.borrow().callback(waitable);
            let Some(callback) = registered else {
                continue;
            };
            let callback = forced.unwrap_or(callback);
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

impl Reactor for PollLoop {
    fn register_readiness(
        &self,
        descriptor: Descriptor,
        interest: Interest,
        callback: Callback,
    ) -> io::Result<()> {
        if descriptor.0 < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "negative file descriptor",
            ));
        }
        self.registry
            .borrow_mut()
            .insert(Waitable::Descriptor(descriptor, interest), callback);
        Ok(())
    }

    fn register_completion(&self, _event: EventHandle, _callback: Callback) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "poll loop cannot wait on completion events",
        ))
    }

    fn unregister(&self, waitable: Waitable) -> bool {
        self.registry.borrow_mut().remove(waitable)
    }
}
