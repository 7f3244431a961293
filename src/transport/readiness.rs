//! Readiness-model transport.
//!
//! The descriptor stays registered for readability for the whole life of the
//! transport. Writes go straight to the device; whatever it does not accept
//! is buffered and write interest is registered until the buffer drains.

use super::observer::{TransportEvent, TransportObserver};
use super::TransportOptions;
use crate::error::{DeviceFault, DisconnectReason, TransportError, TransportResult};
use crate::port::{PortConfig, SerialDevice};
use crate::protocol::{Protocol, Transport};
use crate::reactor::{Callback, Descriptor, EventHandler, Interest, Reactor, Waitable};
use std::sync::Arc;

/// Bytes requested from the device per readable notification.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8192;

/// A serial transport driven by readable/writable notifications.
///
/// Register it with the reactor it was built with and let that loop dispatch
/// into [`EventHandler::on_event`].
pub struct ReadinessTransport<P, D, R>
where
    D: SerialDevice,
    R: Reactor,
{
    core: ReadinessCore<D, R>,
    protocol: P,
    scratch: Vec<u8>,
}

/// Everything except the protocol, so the protocol can borrow it mutably as
/// its `&mut dyn Transport`.
struct ReadinessCore<D, R>
where
    D: SerialDevice,
    R: Reactor,
{
    device: D,
    descriptor: Descriptor,
    reactor: R,
    config: PortConfig,
    observer: Arc<dyn TransportObserver>,
    connected: bool,
    /// Bytes the device has not accepted yet, oldest first, starting at
    /// `out_start`.
    out_buffer: Vec<u8>,
    out_start: usize,
    write_armed: bool,
    /// Set on close and taken when the protocol is told.
    lost: Option<DisconnectReason>,
}

impl<D, R> ReadinessCore<D, R>
where
    D: SerialDevice,
    R: Reactor,
{
    fn emit(&self, event: TransportEvent) {
        self.observer.observe(self.device.name(), &event);
    }

    fn write(&mut self, data: Vec<u8>) -> TransportResult<()> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        if data.is_empty() {
            return Ok(());
        }
        if self.pending() > 0 {
            self.out_buffer.extend_from_slice(&data);
            self.emit(TransportEvent::Buffered(self.pending()));
            return Ok(());
        }

        let accepted = match self.device.write_bytes(&data) {
            Ok(n) => n,
            Err(e) if e.is_would_block() => 0,
            Err(e) => {
                // Reported through connection_lost, not to the caller.
                self.close(e.into());
                return Ok(());
            }
        };
        self.emit(TransportEvent::Written {
            requested: data.len(),
            accepted,
        });

        if accepted < data.len() {
            self.out_buffer.extend_from_slice(&data[accepted..]);
            self.emit(TransportEvent::Buffered(self.pending()));
            self.arm_writable();
        }
        Ok(())
    }

    fn pending(&self) -> usize {
        self.out_buffer.len() - self.out_start
    }

    /// Drop the first `n` pending bytes. The consumed prefix is compacted
    /// away once it outgrows what is left.
    fn consume(&mut self, n: usize) {
        self.out_start = (self.out_start + n).min(self.out_buffer.len());
        if self.out_start == self.out_buffer.len() {
            self.out_buffer.clear();
            self.out_start = 0;
        } else if self.out_start > self.pending() {
            self.out_buffer.drain(..self.out_start);
            self.out_start = 0;
        }
    }

    fn arm_writable(&mut self) {
        if self.write_armed {
            return;
        }
        match self
            .reactor
            .register_readiness(self.descriptor, Interest::Writable, Callback::Writable)
        {
            Ok(()) => self.write_armed = true,
            Err(e) => self.close(DisconnectReason::DeviceError(DeviceFault::from(&e))),
        }
    }

    fn disarm_writable(&mut self) {
        if self.write_armed {
            self.reactor
                .unregister(Waitable::Descriptor(self.descriptor, Interest::Writable));
            self.write_armed = false;
        }
    }

    fn on_writable(&mut self) {
        if !self.connected {
            self.emit(TransportEvent::Stray(Callback::Writable));
            return;
        }
        let requested = self.pending();
        if requested == 0 {
            self.disarm_writable();
            return;
        }

        match self.device.write_bytes(&self.out_buffer[self.out_start..]) {
            Ok(n) => {
                self.emit(TransportEvent::Written {
                    requested,
                    accepted: n,
                });
                self.consume(n);
                if self.pending() == 0 {
                    self.disarm_writable();
                    self.emit(TransportEvent::Drained);
                }
            }
            Err(e) if e.is_would_block() => {}
            Err(e) => self.close(e.into()),
        }
    }

    fn close(&mut self, reason: DisconnectReason) {
        if !self.connected {
            return;
        }
        self.connected = false;

        self.reactor
            .unregister(Waitable::Descriptor(self.descriptor, Interest::Readable));
        self.disarm_writable();
        self.out_buffer.clear();
        self.out_start = 0;

        if let Err(e) = self.device.close() {
            self.emit(TransportEvent::CloseFailed(DeviceFault::from(&e)));
        }
        self.emit(TransportEvent::Closed(reason.clone()));
        self.lost = Some(reason);
    }
}

impl<D, R> Transport for ReadinessCore<D, R>
where
    D: SerialDevice,
    R: Reactor,
{
    fn write(&mut self, data: Vec<u8>) -> TransportResult<()> {
        ReadinessCore::write(self, data)
    }

    fn lose_connection(&mut self) {
        self.close(DisconnectReason::ClosedByRequest);
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn config(&self) -> &PortConfig {
        &self.config
    }

    fn device_name(&self) -> &str {
        self.device.name()
    }
}

impl<D, R> Drop for ReadinessCore<D, R>
where
    D: SerialDevice,
    R: Reactor,
{
    fn drop(&mut self) {
        if self.connected {
            self.reactor
                .unregister(Waitable::Descriptor(self.descriptor, Interest::Readable));
            self.disarm_writable();
            let _ = self.device.close();
        }
    }
}

impl<P, D, R> ReadinessTransport<P, D, R>
where
    P: Protocol,
    D: SerialDevice,
    R: Reactor,
{
    /// Take over an already open device with default options.
    pub fn with_device(
        protocol: P,
        device: D,
        config: PortConfig,
        reactor: R,
    ) -> TransportResult<Self> {
        Self::with_options(protocol, device, config, reactor, TransportOptions::default())
    }

    /// Take over an already open device.
    ///
    /// Pending device buffers are discarded, the descriptor is registered for
    /// readability and the protocol's `connection_established` runs before
    /// this returns.
    pub fn with_options(
        protocol: P,
        mut device: D,
        config: PortConfig,
        reactor: R,
        options: TransportOptions,
    ) -> TransportResult<Self> {
        config.validate()?;
        device.clear_buffers()?;

        let descriptor = device.descriptor();
        reactor
            .register_readiness(descriptor, Interest::Readable, Callback::Readable)
            .map_err(TransportError::Register)?;

        let mut transport = Self {
            core: ReadinessCore {
                device,
                descriptor,
                reactor,
                config,
                observer: options.observer.clone(),
                connected: true,
                out_buffer: Vec::new(),
                out_start: 0,
                write_armed: false,
                lost: None,
            },
            protocol,
            scratch: vec![0; options.read_buffer_size_or(DEFAULT_READ_BUFFER_SIZE)],
        };

        transport.core.emit(TransportEvent::Established);
        transport.protocol.connection_established(&mut transport.core);
        transport.finish_pending_close();
        Ok(transport)
    }

    /// Bytes accepted by `write` that the device has not taken yet.
    pub fn buffered_len(&self) -> usize {
        self.core.pending()
    }

    pub fn protocol(&self) -> &P {
        &self.protocol
    }

    pub fn protocol_mut(&mut self) -> &mut P {
        &mut self.protocol
    }

    pub fn device(&self) -> &D {
        &self.core.device
    }

    fn on_readable(&mut self) {
        if !self.core.connected {
            self.core.emit(TransportEvent::Stray(Callback::Readable));
            return;
        }
        self.read_once();
    }

    /// One non-blocking read into the scratch buffer. Returns whether any
    /// bytes were delivered.
    fn read_once(&mut self) -> bool {
        match self.core.device.read_bytes(&mut self.scratch) {
            Ok(0) => {
                self.core.emit(TransportEvent::EmptyRead);
                false
            }
            Ok(n) => {
                self.core.emit(TransportEvent::Received(n));
                self.protocol.bytes_received(&self.scratch[..n], &mut self.core);
                true
            }
            Err(e) if e.is_would_block() => false,
            Err(e) => {
                self.core.close(e.into());
                false
            }
        }
    }

    fn on_hangup(&mut self) {
        if !self.core.connected {
            self.core.emit(TransportEvent::Stray(Callback::Hangup));
            return;
        }
        // Input the device still holds is delivered before the close.
        while self.core.connected && self.read_once() {}

        // A hung-up descriptor stays readable forever without yielding data.
        self.core.close(DisconnectReason::DeviceError(DeviceFault::new(
            None,
            "device hung up",
        )));
    }

    fn finish_pending_close(&mut self) {
        if let Some(reason) = self.core.lost.take() {
            self.protocol.connection_lost(reason);
        }
    }
}

#[cfg(unix)]
impl<P, R> ReadinessTransport<P, crate::port::FdPort, R>
where
    P: Protocol,
    R: Reactor,
{
    /// Open `device_name` with `config` and start the transport.
    pub fn open(
        protocol: P,
        device_name: &str,
        config: PortConfig,
        reactor: R,
    ) -> TransportResult<Self> {
        Self::open_with_options(
            protocol,
            device_name,
            config,
            reactor,
            TransportOptions::default(),
        )
    }

    pub fn open_with_options(
        protocol: P,
        device_name: &str,
        config: PortConfig,
        reactor: R,
        options: TransportOptions,
    ) -> TransportResult<Self> {
        let device = crate::port::FdPort::open(device_name, &config)?;
        Self::with_options(protocol, device, config, reactor, options)
    }
}

impl<P, D, R> Transport for ReadinessTransport<P, D, R>
where
    P: Protocol,
    D: SerialDevice,
    R: Reactor,
{
    fn write(&mut self, data: Vec<u8>) -> TransportResult<()> {
        let result = self.core.write(data);
        self.finish_pending_close();
        result
    }

    fn lose_connection(&mut self) {
        self.core.lose_connection();
        self.finish_pending_close();
    }

    fn is_connected(&self) -> bool {
        self.core.connected
    }

    fn config(&self) -> &PortConfig {
        &self.core.config
    }

    fn device_name(&self) -> &str {
        self.core.device.name()
    }
}

impl<P, D, R> EventHandler for ReadinessTransport<P, D, R>
where
    P: Protocol,
    D: SerialDevice,
    R: Reactor,
{
    fn on_event(&mut self, callback: Callback) {
        match callback {
            Callback::Readable => self.on_readable(),
            Callback::Writable => self.core.on_writable(),
            Callback::Hangup => self.on_hangup(),
            other => self.core.emit(TransportEvent::Stray(other)),
        }
        self.finish_pending_close();
    }
}

impl<P, D, R> std::fmt::Debug for ReadinessTransport<P, D, R>
where
    D: SerialDevice,
    R: Reactor,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadinessTransport")
            .field("device", &self.core.device)
            .field("connected", &self.core.connected)
            .field("buffered", &self.core.pending())
            .finish_non_exhaustive()
    }
}
