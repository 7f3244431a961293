//! Shared test utilities for transport integration tests.
//!
//! - Socket-pair devices driven by the real `poll(2)` loop (unix)
//! - Helpers that drive mock completions to quiescence

#![allow(dead_code)]

use serialtx::port::{MockOverlappedPort, OpKind};
use serialtx::reactor::{EventHandler, ManualReactor};

/// Upper bound on completions a helper will fire before giving up.
pub const MAX_COMPLETIONS: usize = 10_000;

/// Fire write completions until no write is outstanding.
///
/// Returns how many completions were delivered.
pub fn drain_writes(
    reactor: &ManualReactor,
    port: &MockOverlappedPort,
    handler: &mut dyn EventHandler,
) -> usize {
    let mut fired = 0;
    while let Some(event) = port.pending_event(OpKind::Write) {
        assert!(
            reactor.fire_event(handler, event),
            "outstanding write {event:?} is not registered"
        );
        fired += 1;
        assert!(fired < MAX_COMPLETIONS, "writes never drained");
    }
    fired
}

/// Fire the outstanding read completion, if there is one.
pub fn complete_read(
    reactor: &ManualReactor,
    port: &MockOverlappedPort,
    handler: &mut dyn EventHandler,
) -> bool {
    match port.pending_event(OpKind::Read) {
        Some(event) => reactor.fire_event(handler, event),
        None => false,
    }
}

#[cfg(unix)]
pub mod unix {
    use serialtx::port::FdPort;
    use serialtx::reactor::{EventHandler, PollLoop};
    use std::io::Read;
    use std::os::fd::OwnedFd;
    use std::os::unix::net::UnixStream;
    use std::time::{Duration, Instant};

    /// How long a test waits for the loop before failing.
    pub const DEADLINE: Duration = Duration::from_secs(5);

    /// A device over one end of a socket pair, plus the other end.
    pub fn socket_port(name: &str) -> (FdPort, UnixStream) {
        let (ours, peer) = UnixStream::pair().expect("socket pair");
        let port = FdPort::from_fd(name, OwnedFd::from(ours)).expect("non-blocking descriptor");
        peer.set_read_timeout(Some(Duration::from_millis(100)))
            .expect("peer read timeout");
        (port, peer)
    }

    /// Run loop turns until `done` holds or the deadline passes.
    pub fn pump_until(
        reactor: &PollLoop,
        handler: &mut dyn EventHandler,
        mut done: impl FnMut() -> bool,
    ) -> bool {
        let start = Instant::now();
        while !done() {
            if start.elapsed() > DEADLINE {
                return false;
            }
            reactor
                .run_once(handler, Some(Duration::from_millis(20)))
                .expect("poll failed");
        }
        true
    }

    /// Read from `peer` until `len` bytes have arrived or the deadline passes.
    pub fn read_from_peer(peer: &mut UnixStream, len: usize) -> Vec<u8> {
        let start = Instant::now();
        let mut out = Vec::with_capacity(len);
        let mut buf = [0u8; 256];
        while out.len() < len && start.elapsed() < DEADLINE {
            match peer.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => out.extend_from_slice(&buf[..n]),
                Err(e)
                    if matches!(
                        e.kind(),
                        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                    ) => {}
                Err(e) => panic!("peer read failed: {e}"),
            }
        }
        out
    }
}
