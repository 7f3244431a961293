//! Completion-model transport.
//!
//! Exactly one read is outstanding while the transport is open, and at most
//! one write. Writes that arrive while one is in flight wait in a FIFO queue
//! and are submitted one at a time as earlier writes complete. Buffers are
//! owned by their [`Outstanding`] record from submission until the device
//! releases them.

use super::observer::{TransportEvent, TransportObserver};
use super::TransportOptions;
use crate::error::{DeviceFault, DisconnectReason, TransportError, TransportResult};
use crate::port::{OpKind, Outstanding, OverlappedDevice, PortConfig};
use crate::protocol::{Protocol, Transport};
use crate::reactor::{Callback, EventHandler, Reactor, Waitable};
use std::collections::VecDeque;
use std::sync::Arc;

/// Capacity of each overlapped read.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 4096;

/// Where a completion transport is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionState {
    /// Open with no write in flight and no read outstanding. Only seen from
    /// inside `bytes_received`, between a read completing and the next one
    /// being submitted.
    Idle,
    /// Open with the read outstanding and no write in flight.
    ReadPending,
    /// A write is in flight and nothing is queued behind it.
    WritePendingIdle,
    /// A write is in flight and more are queued.
    WritePendingQueued,
    /// Teardown is running.
    Closing,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Open,
    Closing,
    Closed,
}

/// A serial transport driven by overlapped-operation completions.
pub struct CompletionTransport<P, D, R>
where
    D: OverlappedDevice,
    R: Reactor,
{
    core: CompletionCore<D, R>,
    protocol: P,
}

struct CompletionCore<D, R>
where
    D: OverlappedDevice,
    R: Reactor,
{
    device: D,
    reactor: R,
    config: PortConfig,
    observer: Arc<dyn TransportObserver>,
    read_buffer_size: usize,
    phase: Phase,
    read: Option<Outstanding<D::Native>>,
    write: Option<Outstanding<D::Native>>,
    /// Writes waiting for the in-flight one, oldest first.
    queue: VecDeque<Vec<u8>>,
    lost: Option<DisconnectReason>,
}

fn disconnect_reason(err: TransportError) -> DisconnectReason {
    match err {
        TransportError::Port(e) => e.into(),
        TransportError::Register(e) => DisconnectReason::DeviceError(DeviceFault::from(&e)),
        TransportError::NotConnected => DisconnectReason::ClosedByRequest,
    }
}

impl<D, R> CompletionCore<D, R>
where
    D: OverlappedDevice,
    R: Reactor,
{
    fn emit(&self, event: TransportEvent) {
        self.observer.observe(self.device.name(), &event);
    }

    fn is_open(&self) -> bool {
        self.phase == Phase::Open
    }

    fn state(&self) -> CompletionState {
        match self.phase {
            Phase::Closing => CompletionState::Closing,
            Phase::Closed => CompletionState::Closed,
            Phase::Open => match (&self.write, &self.read) {
                (Some(_), _) if self.queue.is_empty() => CompletionState::WritePendingIdle,
                (Some(_), _) => CompletionState::WritePendingQueued,
                (None, Some(_)) => CompletionState::ReadPending,
                (None, None) => CompletionState::Idle,
            },
        }
    }

    /// Submit a read into `buffer`, resized to the configured capacity.
    fn issue_read(&mut self, mut buffer: Vec<u8>) -> TransportResult<()> {
        buffer.clear();
        buffer.resize(self.read_buffer_size, 0);

        let op = self.device.submit(OpKind::Read, buffer)?;
        if let Err(e) = self
            .reactor
            .register_completion(op.event(), Callback::ReadCompleted)
        {
            self.device.release(op);
            return Err(TransportError::Register(e));
        }
        self.emit(TransportEvent::ReadIssued(op.len()));
        self.read = Some(op);
        Ok(())
    }

    fn issue_write(&mut self, data: Vec<u8>) {
        let len = data.len();
        let op = match self.device.submit(OpKind::Write, data) {
            Ok(op) => op,
            Err(e) => return self.close(e.into()),
        };
        if let Err(e) = self
            .reactor
            .register_completion(op.event(), Callback::WriteCompleted)
        {
            self.device.release(op);
            return self.close(DisconnectReason::DeviceError(DeviceFault::from(&e)));
        }
        self.emit(TransportEvent::WriteIssued(len));
        self.write = Some(op);
    }

    fn write(&mut self, data: Vec<u8>) -> TransportResult<()> {
        if !self.is_open() {
            return Err(TransportError::NotConnected);
        }
        if data.is_empty() {
            return Ok(());
        }
        if self.write.is_some() {
            let len = data.len();
            self.queue.push_back(data);
            self.emit(TransportEvent::WriteQueued {
                len,
                depth: self.queue.len(),
            });
            return Ok(());
        }
        // A submission failure closes the transport and reaches the protocol
        // through connection_lost.
        self.issue_write(data);
        Ok(())
    }

    /// Collect the finished read: its buffer and how much of it was filled.
    fn complete_read(&mut self) -> Option<(Vec<u8>, usize)> {
        let mut op = match self.read.take() {
            Some(op) if self.is_open() => op,
            other => {
                self.read = other;
                self.emit(TransportEvent::Stray(Callback::ReadCompleted));
                return None;
            }
        };
        self.reactor.unregister(Waitable::Event(op.event()));

        let result = self.device.result(&mut op);
        let buffer = self.device.release(op);
        match result {
            Ok(n) => Some((buffer, n)),
            Err(e) => {
                self.close(e.into());
                None
            }
        }
    }

    fn on_write_completed(&mut self) {
        let mut op = match self.write.take() {
            Some(op) if self.is_open() => op,
            other => {
                self.write = other;
                self.emit(TransportEvent::Stray(Callback::WriteCompleted));
                return;
            }
        };
        self.reactor.unregister(Waitable::Event(op.event()));

        let result = self.device.result(&mut op);
        let mut buffer = self.device.release(op);
        match result {
            Err(e) => self.close(e.into()),
            Ok(0) => self.close(DisconnectReason::WriteFailed),
            Ok(n) => {
                self.emit(TransportEvent::WriteCompleted(n));
                if n < buffer.len() {
                    // The unsent tail goes out before anything queued.
                    buffer.drain(..n);
                    self.issue_write(buffer);
                } else if let Some(next) = self.queue.pop_front() {
                    self.issue_write(next);
                }
            }
        }
    }

    fn close(&mut self, reason: DisconnectReason) {
        if !self.is_open() {
            return;
        }
        self.phase = Phase::Closing;

        for op in [self.read.take(), self.write.take()].into_iter().flatten() {
            self.reactor.unregister(Waitable::Event(op.event()));
            self.device.release(op);
        }
        self.queue.clear();

        if let Err(e) = self.device.close() {
            self.emit(TransportEvent::CloseFailed(DeviceFault::from(&e)));
        }
        self.phase = Phase::Closed;
        self.emit(TransportEvent::Closed(reason.clone()));
        self.lost = Some(reason);
    }
}

impl<D, R> Transport for CompletionCore<D, R>
where
    D: OverlappedDevice,
    R: Reactor,
{
    fn write(&mut self, data: Vec<u8>) -> TransportResult<()> {
        CompletionCore::write(self, data)
    }

    fn lose_connection(&mut self) {
        self.close(DisconnectReason::ClosedByRequest);
    }

    fn is_connected(&self) -> bool {
        self.is_open()
    }

    fn config(&self) -> &PortConfig {
        &self.config
    }

    fn device_name(&self) -> &str {
        self.device.name()
    }
}

impl<D, R> Drop for CompletionCore<D, R>
where
    D: OverlappedDevice,
    R: Reactor,
{
    fn drop(&mut self) {
        // Buffers must not be freed while the OS may still touch them.
        for op in [self.read.take(), self.write.take()].into_iter().flatten() {
            self.reactor.unregister(Waitable::Event(op.event()));
            self.device.release(op);
        }
        if self.phase != Phase::Closed {
            let _ = self.device.close();
        }
    }
}

impl<P, D, R> CompletionTransport<P, D, R>
where
    P: Protocol,
    D: OverlappedDevice,
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
    /// Pending device buffers are discarded, the first read is submitted and
    /// registered, and the protocol's `connection_established` runs before
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

        let mut core = CompletionCore {
            device,
            reactor,
            config,
            observer: options.observer.clone(),
            read_buffer_size: options.read_buffer_size_or(DEFAULT_READ_BUFFER_SIZE),
            phase: Phase::Open,
            read: None,
            write: None,
            queue: VecDeque::new(),
            lost: None,
        };
        core.issue_read(Vec::new())?;

        let mut transport = Self { core, protocol };
        transport.core.emit(TransportEvent::Established);
        transport
            .protocol
            .connection_established(&mut transport.core);
        transport.finish_pending_close();
        Ok(transport)
    }

    pub fn state(&self) -> CompletionState {
        self.core.state()
    }

    /// Writes waiting behind the in-flight one.
    pub fn queued_writes(&self) -> usize {
        self.core.queue.len()
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

    fn on_read_completed(&mut self) {
        let Some((buffer, n)) = self.core.complete_read() else {
            return;
        };

        let n = n.min(buffer.len());
        if n == 0 {
            self.core.emit(TransportEvent::EmptyRead);
        } else {
            self.core.emit(TransportEvent::Received(n));
            self.protocol.bytes_received(&buffer[..n], &mut self.core);
        }

        if self.core.is_open() {
            if let Err(e) = self.core.issue_read(buffer) {
                self.core.close(disconnect_reason(e));
            }
        }
    }

    fn finish_pending_close(&mut self) {
        if let Some(reason) = self.core.lost.take() {
            self.protocol.connection_lost(reason);
        }
    }
}

#[cfg(windows)]
impl<P, R> CompletionTransport<P, crate::port::ComPort, R>
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
        let device = crate::port::ComPort::open(device_name, &config)?;
        Self::with_options(protocol, device, config, reactor, options)
    }
}

impl<P, D, R> Transport for CompletionTransport<P, D, R>
where
    P: Protocol,
    D: OverlappedDevice,
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
        self.core.is_open()
    }

    fn config(&self) -> &PortConfig {
        &self.core.config
    }

    fn device_name(&self) -> &str {
        self.core.device.name()
    }
}

impl<P, D, R> EventHandler for CompletionTransport<P, D, R>
where
    P: Protocol,
    D: OverlappedDevice,
    R: Reactor,
{
    fn on_event(&mut self, callback: Callback) {
        match callback {
            Callback::ReadCompleted => self.on_read_completed(),
            Callback::WriteCompleted => self.core.on_write_completed(),
            other => self.core.emit(TransportEvent::Stray(other)),
        }
        self.finish_pending_close();
    }
}

impl<P, D, R> std::fmt::Debug for CompletionTransport<P, D, R>
where
    D: OverlappedDevice,
    R: Reactor,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionTransport")
            .field("device", &self.core.device)
            .field("state", &self.core.state())
            .field("queued", &self.core.queue.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::{Completion, MockOverlappedPort};
    use crate::protocol::RecordingProtocol;
    use crate::reactor::{EventHandle, ManualReactor};
    use crate::transport::RecordingObserver;
    use pretty_assertions::assert_eq;

    type Harness<'a> =
        CompletionTransport<RecordingProtocol, MockOverlappedPort, &'a ManualReactor>;

    fn start<'a>(
        protocol: &RecordingProtocol,
        port: &MockOverlappedPort,
        reactor: &'a ManualReactor,
    ) -> (Harness<'a>, Arc<RecordingObserver>) {
        let observer = Arc::new(RecordingObserver::new());
        let transport = CompletionTransport::with_options(
            protocol.clone(),
            port.clone(),
            PortConfig::default(),
            reactor,
            TransportOptions::default().with_observer(observer.clone()),
        )
        .unwrap();
        (transport, observer)
    }

    fn read_event(port: &MockOverlappedPort) -> EventHandle {
        port.pending_event(OpKind::Read).unwrap()
    }

    fn write_event(port: &MockOverlappedPort) -> EventHandle {
        port.pending_event(OpKind::Write).unwrap()
    }

    #[test]
    fn test_construction_issues_first_read() {
        let protocol = RecordingProtocol::new();
        let port = MockOverlappedPort::new("COM3");
        let reactor = ManualReactor::new();
        let (transport, observer) = start(&protocol, &port, &reactor);

        assert!(port.was_cleared());
        assert_eq!(port.submitted(), vec![OpKind::Read]);
        assert!(reactor.is_registered(Waitable::Event(read_event(&port))));
        assert_eq!(transport.state(), CompletionState::ReadPending);
        assert_eq!(protocol.established(), 1);
        assert_eq!(
            observer.events(),
            vec![
                TransportEvent::ReadIssued(DEFAULT_READ_BUFFER_SIZE),
                TransportEvent::Established,
            ]
        );
    }

    #[test]
    fn test_first_read_failure_is_returned() {
        let port = MockOverlappedPort::new("COM3");
        port.fail_next_submit(5);
        let reactor = ManualReactor::new();

        let result = CompletionTransport::with_device(
            RecordingProtocol::new(),
            port.clone(),
            PortConfig::default(),
            &reactor,
        );
        assert!(matches!(result, Err(TransportError::Port(_))));
        assert!(port.is_closed());
    }

    #[test]
    fn test_read_registration_failure_releases_buffer() {
        let port = MockOverlappedPort::new("COM3");
        let reactor = ManualReactor::new();
        reactor.fail_next_registration();

        let result = CompletionTransport::with_device(
            RecordingProtocol::new(),
            port.clone(),
            PortConfig::default(),
            &reactor,
        );
        assert!(matches!(result, Err(TransportError::Register(_))));
        assert_eq!(port.pending_count(), 0);
        assert_eq!(port.released(), 1);
    }

    #[test]
    fn test_read_completion_delivers_and_reissues() {
        let protocol = RecordingProtocol::new();
        let port = MockOverlappedPort::new("COM3");
        let reactor = ManualReactor::new();
        let (mut transport, _) = start(&protocol, &port, &reactor);

        let first = read_event(&port);
        port.feed(b"Send A String");
        assert!(reactor.fire_event(&mut transport, first));

        assert_eq!(protocol.chunks(), vec![b"Send A String".to_vec()]);
        let second = read_event(&port);
        assert_ne!(first, second);
        assert!(!reactor.is_registered(Waitable::Event(first)));
        assert!(reactor.is_registered(Waitable::Event(second)));
        assert_eq!(port.pending_count(), 1);
    }

    #[test]
    fn test_zero_byte_read_is_benign() {
        let protocol = RecordingProtocol::new();
        let port = MockOverlappedPort::new("COM3");
        let reactor = ManualReactor::new();
        let (mut transport, observer) = start(&protocol, &port, &reactor);

        reactor.fire_event(&mut transport, read_event(&port));

        assert!(protocol.chunks().is_empty());
        assert!(transport.is_connected());
        assert_eq!(transport.state(), CompletionState::ReadPending);
        assert_eq!(observer.count(|e| *e == TransportEvent::EmptyRead), 1);
    }

    #[test]
    fn test_read_query_failure_closes() {
        let protocol = RecordingProtocol::new();
        let port = MockOverlappedPort::new("COM3");
        let reactor = ManualReactor::new();
        let (mut transport, _) = start(&protocol, &port, &reactor);

        port.script(OpKind::Read, Completion::Fail(995));
        reactor.fire_event(&mut transport, read_event(&port));

        assert_eq!(transport.state(), CompletionState::Closed);
        assert!(port.is_closed());
        assert_eq!(port.pending_count(), 0);
        match protocol.lost().as_slice() {
            [DisconnectReason::DeviceError(fault)] => assert_eq!(fault.code, Some(995)),
            other => panic!("unexpected disconnects: {other:?}"),
        }
    }

    #[test]
    fn test_writes_are_serialized_through_queue() {
        let protocol = RecordingProtocol::new();
        let port = MockOverlappedPort::new("COM3");
        let reactor = ManualReactor::new();
        let (mut transport, _) = start(&protocol, &port, &reactor);

        transport.write(b"One".to_vec()).unwrap();
        assert_eq!(transport.state(), CompletionState::WritePendingIdle);
        transport.write(b"Two".to_vec()).unwrap();
        transport.write(b"Three".to_vec()).unwrap();
        assert_eq!(transport.state(), CompletionState::WritePendingQueued);
        assert_eq!(transport.queued_writes(), 2);

        // Only one write is ever outstanding.
        assert_eq!(port.pending_count(), 2);

        reactor.fire_event(&mut transport, write_event(&port));
        reactor.fire_event(&mut transport, write_event(&port));
        assert_eq!(transport.state(), CompletionState::WritePendingIdle);
        reactor.fire_event(&mut transport, write_event(&port));

        assert_eq!(
            port.write_ops(),
            vec![b"One".to_vec(), b"Two".to_vec(), b"Three".to_vec()]
        );
        assert_eq!(transport.state(), CompletionState::ReadPending);
        assert_eq!(port.pending_event(OpKind::Write), None);
    }

    #[test]
    fn test_partial_write_reissues_tail_first() {
        let protocol = RecordingProtocol::new();
        let port = MockOverlappedPort::new("COM3");
        let reactor = ManualReactor::new();
        let (mut transport, _) = start(&protocol, &port, &reactor);

        transport.write(b"Hello".to_vec()).unwrap();
        transport.write(b"World".to_vec()).unwrap();

        port.script(OpKind::Write, Completion::Transferred(2));
        reactor.fire_event(&mut transport, write_event(&port));
        assert_eq!(transport.queued_writes(), 1);

        reactor.fire_event(&mut transport, write_event(&port));
        reactor.fire_event(&mut transport, write_event(&port));

        assert_eq!(port.written(), b"HelloWorld");
        assert_eq!(
            port.write_ops(),
            vec![b"He".to_vec(), b"llo".to_vec(), b"World".to_vec()]
        );
    }

    #[test]
    fn test_zero_byte_write_discards_queue() {
        let protocol = RecordingProtocol::new();
        let port = MockOverlappedPort::new("COM3");
        let reactor = ManualReactor::new();
        let (mut transport, _) = start(&protocol, &port, &reactor);

        transport.write(b"One".to_vec()).unwrap();
        transport.write(b"Two".to_vec()).unwrap();
        port.script(OpKind::Write, Completion::Transferred(0));
        reactor.fire_event(&mut transport, write_event(&port));

        assert_eq!(protocol.lost(), vec![DisconnectReason::WriteFailed]);
        assert_eq!(transport.queued_writes(), 0);
        assert!(port.written().is_empty());
        assert_eq!(port.submitted(), vec![OpKind::Read, OpKind::Write]);
        assert_eq!(port.pending_count(), 0);
        assert!(reactor.is_empty());
    }

    #[test]
    fn test_write_query_failure_closes_with_device_error() {
        let protocol = RecordingProtocol::new();
        let port = MockOverlappedPort::new("COM3");
        let reactor = ManualReactor::new();
        let (mut transport, _) = start(&protocol, &port, &reactor);

        transport.write(b"x".to_vec()).unwrap();
        port.script(OpKind::Write, Completion::Fail(31));
        reactor.fire_event(&mut transport, write_event(&port));

        assert!(matches!(
            protocol.lost().as_slice(),
            [DisconnectReason::DeviceError(_)]
        ));
    }

    #[test]
    fn test_submit_failure_on_write_closes() {
        let protocol = RecordingProtocol::new();
        let port = MockOverlappedPort::new("COM3");
        let reactor = ManualReactor::new();
        let (mut transport, _) = start(&protocol, &port, &reactor);

        port.fail_next_submit(6);
        assert!(transport.write(b"x".to_vec()).is_ok());

        assert!(!transport.is_connected());
        assert_eq!(protocol.lost().len(), 1);
        assert!(matches!(
            transport.write(b"y".to_vec()),
            Err(TransportError::NotConnected)
        ));
    }

    #[test]
    fn test_lose_connection_releases_everything_once() {
        let protocol = RecordingProtocol::new();
        let port = MockOverlappedPort::new("COM3");
        let reactor = ManualReactor::new();
        let (mut transport, observer) = start(&protocol, &port, &reactor);

        transport.write(b"One".to_vec()).unwrap();
        transport.write(b"Two".to_vec()).unwrap();
        let stale = write_event(&port);

        transport.lose_connection();
        transport.lose_connection();

        assert_eq!(transport.state(), CompletionState::Closed);
        assert_eq!(protocol.lost(), vec![DisconnectReason::ClosedByRequest]);
        assert_eq!(port.pending_count(), 0);
        assert_eq!(port.close_count(), 1);
        assert!(reactor.is_empty());

        // A completion racing the close is ignored.
        transport.on_event(Callback::WriteCompleted);
        assert!(!reactor.fire_event(&mut transport, stale));
        assert_eq!(observer.count(|e| matches!(e, TransportEvent::Stray(_))), 1);
    }

    #[test]
    fn test_close_from_inside_bytes_received_stops_reading() {
        let protocol = RecordingProtocol::new().close_after(1);
        let port = MockOverlappedPort::new("COM3");
        let reactor = ManualReactor::new();
        let (mut transport, _) = start(&protocol, &port, &reactor);

        port.feed(b"!");
        reactor.fire_event(&mut transport, read_event(&port));

        assert_eq!(protocol.lost(), vec![DisconnectReason::ClosedByRequest]);
        assert_eq!(port.submitted(), vec![OpKind::Read]);
        assert_eq!(port.pending_count(), 0);
    }

    #[test]
    fn test_connected_inside_bytes_received() {
        struct Probe(Vec<bool>);
        impl Protocol for Probe {
            fn bytes_received(&mut self, _data: &[u8], transport: &mut dyn Transport) {
                self.0.push(transport.is_connected());
            }
        }

        let port = MockOverlappedPort::new("COM3");
        let reactor = ManualReactor::new();
        let mut transport = CompletionTransport::with_device(
            Probe(Vec::new()),
            port.clone(),
            PortConfig::default(),
            &reactor,
        )
        .unwrap();

        port.feed(b"abc");
        let event = read_event(&port);
        reactor.fire_event(&mut transport, event);

        assert_eq!(transport.protocol().0, vec![true]);
        assert_eq!(transport.state(), CompletionState::ReadPending);
    }

    #[test]
    fn test_echo_loopback() {
        let protocol = RecordingProtocol::new().echoing();
        let port = MockOverlappedPort::new("COM3");
        let reactor = ManualReactor::new();
        let (mut transport, _) = start(&protocol, &port, &reactor);

        port.feed(b"ping");
        reactor.fire_event(&mut transport, read_event(&port));
        reactor.fire_event(&mut transport, write_event(&port));

        assert_eq!(port.written(), b"ping");
    }

    #[test]
    fn test_custom_read_buffer_size() {
        let port = MockOverlappedPort::new("COM3");
        let reactor = ManualReactor::new();
        let protocol = RecordingProtocol::new();
        let mut transport = CompletionTransport::with_options(
            protocol.clone(),
            port.clone(),
            PortConfig::default(),
            &reactor,
            TransportOptions::default().with_read_buffer_size(4),
        )
        .unwrap();

        port.feed(b"abcdef");
        reactor.fire_event(&mut transport, read_event(&port));
        reactor.fire_event(&mut transport, read_event(&port));

        assert_eq!(protocol.chunks(), vec![b"abcd".to_vec(), b"ef".to_vec()]);
    }

    #[test]
    fn test_drop_releases_outstanding_operations() {
        let port = MockOverlappedPort::new("COM3");
        let reactor = ManualReactor::new();
        let protocol = RecordingProtocol::new();
        let (mut transport, _) = start(&protocol, &port, &reactor);
        transport.write(b"pending".to_vec()).unwrap();

        drop(transport);
        assert_eq!(port.pending_count(), 0);
        assert!(port.is_closed());
        assert!(reactor.is_empty());
    }
}
