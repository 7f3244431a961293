//! Recording protocol for tests.

use super::{Protocol, Transport};
use crate::error::DisconnectReason;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Default)]
struct ProtocolLog {
    established: usize,
    chunks: Vec<Vec<u8>>,
    lost: Vec<DisconnectReason>,
    greeting: Option<Vec<u8>>,
    echo: bool,
    close_after: Option<usize>,
    write_errors: usize,
}

/// A protocol that records every callback.
///
/// Clones share the same log: hand one to the transport and keep one to
/// inspect. It can also be told to greet, echo or close, to exercise the
/// transport from inside protocol callbacks.
#[derive(Debug, Clone, Default)]
pub struct RecordingProtocol {
    log: Arc<Mutex<ProtocolLog>>,
}

impl RecordingProtocol {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write `data` from `connection_established`.
    pub fn greet_with(self, data: &[u8]) -> Self {
        self.log.lock().greeting = Some(data.to_vec());
        self
    }

    /// Write every received chunk back.
    pub fn echoing(self) -> Self {
        self.log.lock().echo = true;
        self
    }

    /// Call `lose_connection` once at least `total` bytes have arrived.
    pub fn close_after(self, total: usize) -> Self {
        self.log.lock().close_after = Some(total);
        self
    }

    /// Number of `connection_established` calls.
    pub fn established(&self) -> usize {
        self.log.lock().established
    }

    /// Received chunks, one per `bytes_received` call.
    pub fn chunks(&self) -> Vec<Vec<u8>> {
        self.log.lock().chunks.clone()
    }

    /// All received bytes, concatenated.
    pub fn received(&self) -> Vec<u8> {
        self.log.lock().chunks.concat()
    }

    /// Every reason passed to `connection_lost`.
    pub fn lost(&self) -> Vec<DisconnectReason> {
        self.log.lock().lost.clone()
    }

    /// Writes from inside callbacks that the transport rejected.
    pub fn write_errors(&self) -> usize {
        self.log.lock().write_errors
    }

    fn send(&self, transport: &mut dyn Transport, data: Vec<u8>) {
        if transport.write(data).is_err() {
            self.log.lock().write_errors += 1;
        }
    }
}

impl Protocol for RecordingProtocol {
    fn connection_established(&mut self, transport: &mut dyn Transport) {
        let greeting = {
            let mut log = self.log.lock();
            log.established += 1;
            log.greeting.clone()
        };
        if let Some(greeting) = greeting {
            self.send(transport, greeting);
        }
    }

    fn bytes_received(&mut self, data: &[u8], transport: &mut dyn Transport) {
        let (echo, close) = {
            let mut log = self.log.lock();
            log.chunks.push(data.to_vec());
            let total: usize = log.chunks.iter().map(Vec::len).sum();
            (log.echo, log.close_after.is_some_and(|n| total >= n))
        };
        if echo {
            self.send(transport, data.to_vec());
        }
        if close {
            transport.lose_connection();
        }
    }

    fn connection_lost(&mut self, reason: DisconnectReason) {
        self.log.lock().lost.push(reason);
    }
}
