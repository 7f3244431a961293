//! Injected observability sink.
//!
//! Transports report what they do through a [`TransportObserver`] they are
//! given at construction instead of logging to process-wide state. The
//! default [`TracingObserver`] turns events into `tracing` records.

use crate::error::{DeviceFault, DisconnectReason};
use crate::reactor::Callback;
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

/// Something a transport did or noticed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Registered with the loop and handed to the protocol.
    Established,
    /// A read delivered this many bytes to the protocol.
    Received(usize),
    /// A read completed or returned with nothing in it.
    EmptyRead,
    /// A read of this capacity was submitted (completion model).
    ReadIssued(usize),
    /// The device took `accepted` of `requested` bytes synchronously.
    Written { requested: usize, accepted: usize },
    /// Bytes waiting for writability after a short write (readiness model).
    Buffered(usize),
    /// The write buffer emptied and write interest was dropped.
    Drained,
    /// An overlapped write of this many bytes was submitted.
    WriteIssued(usize),
    /// A write arrived while another was in flight and waits at `depth`.
    WriteQueued { len: usize, depth: usize },
    /// An overlapped write reported this many bytes transferred.
    WriteCompleted(usize),
    /// A callback arrived for a closed transport or a finished operation.
    Stray(Callback),
    /// Releasing the device handle failed; the transport is closed anyway.
    CloseFailed(DeviceFault),
    /// The transport closed for this reason.
    Closed(DisconnectReason),
}

/// Receiver of transport events.
pub trait TransportObserver {
    fn observe(&self, device: &str, event: &TransportEvent);
}

/// Emits every event as a `tracing` record.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl TransportObserver for TracingObserver {
    fn observe(&self, device: &str, event: &TransportEvent) {
        match event {
            TransportEvent::Established => info!(device, "serial transport established"),
            TransportEvent::Received(n) => trace!(device, bytes = n, "received"),
            TransportEvent::EmptyRead => trace!(device, "empty read"),
            TransportEvent::ReadIssued(capacity) => trace!(device, capacity, "read issued"),
            TransportEvent::Written {
                requested,
                accepted,
            } => trace!(device, requested, accepted, "written"),
            TransportEvent::Buffered(pending) => {
                debug!(device, pending, "write buffered until writable")
            }
            TransportEvent::Drained => debug!(device, "write buffer drained"),
            TransportEvent::WriteIssued(n) => trace!(device, bytes = n, "write issued"),
            TransportEvent::WriteQueued { len, depth } => {
                debug!(device, bytes = len, depth, "write queued behind in-flight write")
            }
            TransportEvent::WriteCompleted(n) => trace!(device, bytes = n, "write completed"),
            TransportEvent::Stray(callback) => {
                debug!(device, ?callback, "ignoring callback for finished operation")
            }
            TransportEvent::CloseFailed(fault) => {
                warn!(device, error = %fault, "closing device handle failed")
            }
            TransportEvent::Closed(reason) if reason.is_error() => {
                warn!(device, %reason, "serial transport closed")
            }
            TransportEvent::Closed(reason) => info!(device, %reason, "serial transport closed"),
        }
    }
}

/// Keeps every event in memory, for tests.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<TransportEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TransportEvent> {
        self.events.lock().clone()
    }

    /// How many recorded events satisfy `predicate`.
    pub fn count(&self, predicate: impl Fn(&TransportEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| predicate(e)).count()
    }
}

impl TransportObserver for RecordingObserver {
    fn observe(&self, _device: &str, event: &TransportEvent) {
        self.events.lock().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_observer_keeps_order() {
        let observer = RecordingObserver::new();
        observer.observe("MOCK0", &TransportEvent::Established);
        observer.observe("MOCK0", &TransportEvent::Received(3));
        observer.observe("MOCK0", &TransportEvent::Closed(DisconnectReason::ClosedByRequest));

        assert_eq!(
            observer.events(),
            vec![
                TransportEvent::Established,
                TransportEvent::Received(3),
                TransportEvent::Closed(DisconnectReason::ClosedByRequest),
            ]
        );
        assert_eq!(
            observer.count(|e| matches!(e, TransportEvent::Closed(_))),
            1
        );
    }

    #[test]
    fn test_tracing_observer_accepts_every_event() {
        let observer = TracingObserver;
        observer.observe("MOCK0", &TransportEvent::WriteQueued { len: 4, depth: 2 });
        observer.observe(
            "MOCK0",
            &TransportEvent::Closed(DisconnectReason::WriteFailed),
        );
    }
}
