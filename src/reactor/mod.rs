//! Event-loop adapter contract.
//!
//! A transport registers waitable objects with a [`Reactor`] together with
//! the [`Callback`] it wants delivered; the loop later hands that callback
//! back through [`EventHandler::on_event`]. Readiness loops watch
//! descriptors, completion loops watch native events.
//!
//! Reactor methods take `&self` so a transport can register and unregister
//! from inside a callback the same loop is dispatching.

pub mod mock;

#[cfg(unix)]
pub mod poll;

#[cfg(windows)]
pub mod wait;

use std::io;
use std::rc::Rc;

pub use mock::ManualReactor;

#[cfg(unix)]
pub use poll::PollLoop;

#[cfg(windows)]
pub use wait::WaitLoop;

/// The native loop for the current platform.
#[cfg(unix)]
pub type PlatformLoop = PollLoop;

/// The native loop for the current platform.
#[cfg(windows)]
pub type PlatformLoop = WaitLoop;

/// A file descriptor watched for readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Descriptor(pub i32);

/// A native event object signaled when an overlapped operation finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventHandle(pub isize);

/// Which readiness condition a descriptor registration waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interest {
    Readable,
    Writable,
}

/// Identifies what the loop should tell the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Callback {
    /// The descriptor can be read without blocking.
    Readable,
    /// The descriptor can be written without blocking.
    Writable,
    /// The descriptor reported an error or hang-up and has nothing to read.
    Hangup,
    /// The outstanding read has finished.
    ReadCompleted,
    /// The outstanding write has finished.
    WriteCompleted,
}

/// A registration key: one per descriptor interest, one per event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Waitable {
    Descriptor(Descriptor, Interest),
    Event(EventHandle),
}

/// Registration side of an event loop.
pub trait Reactor {
    /// Deliver `callback` whenever `descriptor` satisfies `interest`.
    fn register_readiness(
        &self,
        descriptor: Descriptor,
        interest: Interest,
        callback: Callback,
    ) -> io::Result<()>;

    /// Deliver `callback` once `event` is signaled.
    fn register_completion(&self, event: EventHandle, callback: Callback) -> io::Result<()>;

    /// Stop watching `waitable`. Returns false if it was not registered.
    fn unregister(&self, waitable: Waitable) -> bool;
}

/// Receiver of dispatched callbacks.
pub trait EventHandler {
    fn on_event(&mut self, callback: Callback);
}

impl<R: Reactor + ?Sized> Reactor for Rc<R> {
    fn register_readiness(
        &self,
        descriptor: Descriptor,
        interest: Interest,
        callback: Callback,
    ) -> io::Result<()> {
        (**self).register_readiness(descriptor, interest, callback)
    }

    fn register_completion(&self, event: EventHandle, callback: Callback) -> io::Result<()> {
        (**self).register_completion(event, callback)
    }

    fn unregister(&self, waitable: Waitable) -> bool {
        (**self).unregister(waitable)
    }
}

impl<R: Reactor + ?Sized> Reactor for &R {
    fn register_readiness(
        &self,
        descriptor: Descriptor,
        interest: Interest,
        callback: Callback,
    ) -> io::Result<()> {
        (**self).register_readiness(descriptor, interest, callback)
    }

    fn register_completion(&self, event: EventHandle, callback: Callback) -> io::Result<()> {
        (**self).register_completion(event, callback)
    }

    fn unregister(&self, waitable: Waitable) -> bool {
        (**self).unregister(waitable)
    }
}

/// Bookkeeping shared by the concrete loops.
///
/// Keeps registrations in insertion order so dispatch within one turn is
/// deterministic.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    entries: Vec<(Waitable, Callback)>,
}

impl Registry {
    pub(crate) fn insert(&mut self, waitable: Waitable, callback: Callback) {
        match self.entries.iter_mut().find(|(w, _)| *w == waitable) {
            Some(entry) => entry.1 = callback,
            None => self.entries.push((waitable, callback)),
        }
    }

    pub(crate) fn remove(&mut self, waitable: Waitable) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(w, _)| *w != waitable);
        self.entries.len() != before
    }

    pub(crate) fn callback(&self, waitable: Waitable) -> Option<Callback> {
        self.entries
            .iter()
            .find(|(w, _)| *w == waitable)
            .map(|(_, c)| *c)
    }

    pub(crate) fn entries(&self) -> &[(Waitable, Callback)] {
        &self.entries
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
