//! Protocol and transport interfaces.
//!
//! A transport owns its protocol and drives it from event-loop callbacks. The
//! protocol talks back through the `&mut dyn Transport` it is handed on every
//! call, so it can write or close from inside a callback.

pub mod mock;

use crate::error::{DisconnectReason, TransportResult};
use crate::port::PortConfig;
use tracing::debug;

pub use mock::RecordingProtocol;

/// Byte-stream surface shared by both transport implementations.
pub trait Transport {
    /// Queue `data` for transmission after everything written before it.
    fn write(&mut self, data: Vec<u8>) -> TransportResult<()>;

    /// Write each chunk in order.
    fn write_sequence(&mut self, chunks: Vec<Vec<u8>>) -> TransportResult<()> {
        for chunk in chunks {
            self.write(chunk)?;
        }
        Ok(())
    }

    /// Close the transport. The protocol hears about it exactly once.
    fn lose_connection(&mut self);

    fn is_connected(&self) -> bool;

    /// Settings the device was opened with.
    fn config(&self) -> &PortConfig;

    fn device_name(&self) -> &str;
}

/// Consumer of received bytes and producer of bytes to send.
pub trait Protocol {
    /// The transport is registered and about to start reading.
    fn connection_established(&mut self, _transport: &mut dyn Transport) {}

    /// A chunk of bytes arrived, in device order.
    fn bytes_received(&mut self, data: &[u8], transport: &mut dyn Transport);

    /// The transport closed; no further calls follow.
    fn connection_lost(&mut self, _reason: DisconnectReason) {}
}

/// Writes every received chunk straight back.
#[derive(Debug, Default, Clone, Copy)]
pub struct Echo;

impl Protocol for Echo {
    fn bytes_received(&mut self, data: &[u8], transport: &mut dyn Transport) {
        if let Err(e) = transport.write(data.to_vec()) {
            debug!(device = transport.device_name(), error = %e, "echo dropped");
        }
    }
}
