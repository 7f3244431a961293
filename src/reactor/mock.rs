//! Hand-driven reactor for tests.
//!
//! `ManualReactor` records registrations and delivers a callback only when the
//! test fires the corresponding waitable, which makes the ordering of
//! readiness and completion signals fully deterministic.

use super::{Callback, Descriptor, EventHandle, EventHandler, Interest, Reactor, Registry, Waitable};
use std::cell::{Cell, RefCell};
use std::io;

/// A reactor whose dispatch is driven explicitly by the caller.
///
/// # Example
/// ```
/// use serialtx::reactor::{Callback, EventHandle, EventHandler, ManualReactor, Reactor, Waitable};
///
/// struct Log(Vec<Callback>);
/// impl EventHandler for Log {
///     fn on_event(&mut self, callback: Callback) {
///         self.0.push(callback);
///     }
/// }
///
/// let reactor = ManualReactor::new();
/// reactor.register_completion(EventHandle(1), Callback::ReadCompleted).unwrap();
///
/// let mut log = Log(Vec::new());
/// assert!(reactor.fire(&mut log, Waitable::Event(EventHandle(1))));
/// assert_eq!(log.0, vec![Callback::ReadCompleted]);
/// ```
#[derive(Debug, Default)]
pub struct ManualReactor {
    registry: RefCell<Registry>,
    fail_next: Cell<bool>,
}

impl ManualReactor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next registration attempt fail.
    pub fn fail_next_registration(&self) {
        self.fail_next.set(true);
    }

    /// Whether `waitable` is currently registered.
    pub fn is_registered(&self, waitable: Waitable) -> bool {
        self.registry.borrow().callback(waitable).is_some()
    }

    /// Snapshot of all current registrations in insertion order.
    pub fn registrations(&self) -> Vec<(Waitable, Callback)> {
        self.registry.borrow().entries().to_vec()
    }

    /// Number of live registrations.
    pub fn len(&self) -> usize {
        self.registry.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.borrow().is_empty()
    }

    /// Deliver the callback registered for `waitable`.
    ///
    /// Returns false, without calling the handler, when nothing is registered.
    pub fn fire(&self, handler: &mut dyn EventHandler, waitable: Waitable) -> bool {
        let callback = self.registry.borrow().callback(waitable);
        match callback {
            Some(callback) => {
                handler.on_event(callback);
                true
            }
            None => false,
        }
    }

    /// Shorthand for firing a completion event.
    pub fn fire_event(&self, handler: &mut dyn EventHandler, event: EventHandle) -> bool {
        self.fire(handler, Waitable::Event(event))
    }

    /// Shorthand for signaling readiness on a descriptor.
    pub fn fire_ready(
        &self,
        handler: &mut dyn EventHandler,
        descriptor: Descriptor,
        interest: Interest,
    ) -> bool {
        self.fire(handler, Waitable::Descriptor(descriptor, interest))
    }

    fn check_failure(&self) -> io::Result<()> {
        if self.fail_next.replace(false) {
            return Err(io::Error::other("registration rejected"));
        }
        Ok(())
    }
}

impl Reactor for ManualReactor {
    fn register_readiness(
        &self,
        descriptor: Descriptor,
        interest: Interest,
        callback: Callback,
    ) -> io::Result<()> {
        self.check_failure()?;
        self.registry
            .borrow_mut()
            .insert(Waitable::Descriptor(descriptor, interest), callback);
        Ok(())
    }

    fn register_completion(&self, event: EventHandle, callback: Callback) -> io::Result<()> {
        self.check_failure()?;
        self.registry
            .borrow_mut()
            .insert(Waitable::Event(event), callback);
        Ok(())
    }

    fn unregister(&self, waitable: Waitable) -> bool {
        self.registry.borrow_mut().remove(waitable)
    }
}
