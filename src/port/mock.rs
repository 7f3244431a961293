//! Mock serial devices for testing.
//!
//! `MockSerialPort` simulates a non-blocking readiness device and
//! `MockOverlappedPort` simulates a completion device, neither requiring real
//! hardware. Both are cheap handles onto shared state, so a test keeps one
//! clone to script and inspect the device while the transport owns the other.

use super::error::PortError;
use super::traits::{OpKind, OverlappedDevice, Outstanding, SerialDevice};
use crate::reactor::{Descriptor, EventHandle};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicI32, AtomicIsize, Ordering};
use std::sync::Arc;

static NEXT_DESCRIPTOR: AtomicI32 = AtomicI32::new(1000);
static NEXT_EVENT: AtomicIsize = AtomicIsize::new(1);

/// Inner state of the mock readiness port.
#[derive(Debug, Default)]
struct MockPortState {
    /// Bytes to be returned by read operations.
    read_queue: VecDeque<u8>,
    /// Reads that return `Ok(0)` before the queue is consulted.
    empty_reads: usize,
    /// Error returned by the next read.
    read_error: Option<io::ErrorKind>,
    /// Bytes accepted by each write call, in order.
    write_log: Vec<Vec<u8>>,
    /// Maximum bytes a single write accepts; `Some(0)` means would-block.
    write_capacity: Option<usize>,
    /// Error returned by the next write.
    write_error: Option<io::ErrorKind>,
    /// Whether buffers have been cleared.
    buffers_cleared: bool,
    /// Number of `close` calls that found the port open.
    close_count: usize,
    closed: bool,
}

/// Mock readiness device.
///
/// # Example
/// ```
/// use serialtx::port::{MockSerialPort, SerialDevice};
///
/// let mut port = MockSerialPort::new("MOCK0");
/// port.enqueue_read(b"Hello, World!");
///
/// let mut buffer = [0u8; 13];
/// let n = port.read_bytes(&mut buffer).unwrap();
/// assert_eq!(&buffer[..n], b"Hello, World!");
///
/// port.write_bytes(b"Response").unwrap();
/// assert_eq!(port.written(), b"Response");
/// ```
#[derive(Clone)]
pub struct MockSerialPort {
    name: String,
    descriptor: Descriptor,
    state: Arc<Mutex<MockPortState>>,
}

impl MockSerialPort {
    /// Create a new mock port with a unique synthetic descriptor.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            descriptor: Descriptor(NEXT_DESCRIPTOR.fetch_add(1, Ordering::Relaxed)),
            state: Arc::new(Mutex::new(MockPortState::default())),
        }
    }

    /// Enqueue bytes to be returned by subsequent reads.
    pub fn enqueue_read(&self, data: &[u8]) {
        self.state.lock().read_queue.extend(data);
    }

    /// Make the next read return zero bytes without error.
    pub fn enqueue_empty_read(&self) {
        self.state.lock().empty_reads += 1;
    }

    /// Make the next read fail with `kind`.
    pub fn fail_next_read(&self, kind: io::ErrorKind) {
        self.state.lock().read_error = Some(kind);
    }

    /// Make the next write fail with `kind`.
    pub fn fail_next_write(&self, kind: io::ErrorKind) {
        self.state.lock().write_error = Some(kind);
    }

    /// Limit how many bytes each write accepts (`None` for unlimited).
    pub fn set_write_capacity(&self, capacity: Option<usize>) {
        self.state.lock().write_capacity = capacity;
    }

    /// Bytes accepted by each write call.
    pub fn get_write_log(&self) -> Vec<Vec<u8>> {
        self.state.lock().write_log.clone()
    }

    /// All bytes accepted so far, concatenated.
    pub fn written(&self) -> Vec<u8> {
        self.state.lock().write_log.concat()
    }

    /// Whether buffers have been cleared.
    pub fn was_cleared(&self) -> bool {
        self.state.lock().buffers_cleared
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// How many times the handle was actually released.
    pub fn close_count(&self) -> usize {
        self.state.lock().close_count
    }

    /// Bytes waiting to be read.
    pub fn available_bytes(&self) -> usize {
        self.state.lock().read_queue.len()
    }
}

impl SerialDevice for MockSerialPort {
    fn name(&self) -> &str {
        &self.name
    }

    fn descriptor(&self) -> Descriptor {
        self.descriptor
    }

    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(PortError::Closed);
        }
        if let Some(kind) = state.read_error.take() {
            return Err(PortError::Io(io::Error::from(kind)));
        }
        if state.empty_reads > 0 {
            state.empty_reads -= 1;
            return Ok(0);
        }
        if state.read_queue.is_empty() {
            return Err(PortError::Io(io::Error::new(
                io::ErrorKind::WouldBlock,
                "No data available",
            )));
        }

        let n = buffer.len().min(state.read_queue.len());
        for (slot, byte) in buffer.iter_mut().zip(state.read_queue.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(PortError::Closed);
        }
        if let Some(kind) = state.write_error.take() {
            return Err(PortError::Io(io::Error::from(kind)));
        }

        let n = state.write_capacity.map_or(data.len(), |cap| cap.min(data.len()));
        if n == 0 && !data.is_empty() {
            return Err(PortError::Io(io::Error::from(io::ErrorKind::WouldBlock)));
        }
        state.write_log.push(data[..n].to_vec());
        Ok(n)
    }

    fn clear_buffers(&mut self) -> Result<(), PortError> {
        let mut state = self.state.lock();
        state.read_queue.clear();
        state.buffers_cleared = true;
        Ok(())
    }

    fn close(&mut self) -> Result<(), PortError> {
        let mut state = self.state.lock();
        if !state.closed {
            state.closed = true;
            state.close_count += 1;
        }
        Ok(())
    }
}

impl std::fmt::Debug for MockSerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSerialPort")
            .field("name", &self.name)
            .field("available_bytes", &self.available_bytes())
            .finish()
    }
}

/// A scripted outcome for the next completion of one kind of operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The result query fails with this raw OS error code.
    Fail(i32),
    /// The operation reports this many bytes transferred.
    Transferred(usize),
}

#[derive(Debug, Default)]
struct OverlappedState {
    /// Operations submitted and not yet released.
    pending: Vec<(EventHandle, OpKind)>,
    /// Bytes the next reads will deliver.
    input: VecDeque<u8>,
    /// Buffers of completed writes, truncated to what was transferred.
    write_ops: Vec<Vec<u8>>,
    read_script: VecDeque<Completion>,
    write_script: VecDeque<Completion>,
    submit_error: Option<i32>,
    submitted: Vec<OpKind>,
    released: usize,
    loopback: bool,
    buffers_cleared: bool,
    close_count: usize,
    closed: bool,
}

/// Mock completion device.
///
/// Every submission gets a fresh synthetic event. By default a read
/// completion transfers whatever input has been fed (up to the buffer size)
/// and a write completion transfers the whole buffer; [`Completion`] scripts
/// override that for the next completion of a kind.
#[derive(Clone)]
pub struct MockOverlappedPort {
    name: String,
    state: Arc<Mutex<OverlappedState>>,
}

impl MockOverlappedPort {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(OverlappedState::default())),
        }
    }

    /// Echo written bytes back as input, like a wire between TX and RX.
    pub fn set_loopback(&self, enabled: bool) {
        self.state.lock().loopback = enabled;
    }

    /// Make bytes available to the outstanding and following reads.
    pub fn feed(&self, data: &[u8]) {
        self.state.lock().input.extend(data);
    }

    /// Script the result of the next completion of `kind`.
    pub fn script(&self, kind: OpKind, completion: Completion) {
        let mut state = self.state.lock();
        match kind {
            OpKind::Read => state.read_script.push_back(completion),
            OpKind::Write => state.write_script.push_back(completion),
        }
    }

    /// Make the next submission fail with a raw OS error code.
    pub fn fail_next_submit(&self, code: i32) {
        self.state.lock().submit_error = Some(code);
    }

    /// Event of the in-flight operation of `kind`, if any.
    pub fn pending_event(&self, kind: OpKind) -> Option<EventHandle> {
        self.state
            .lock()
            .pending
            .iter()
            .find(|(_, k)| *k == kind)
            .map(|(event, _)| *event)
    }

    /// Number of operations submitted and not yet released.
    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Kinds of all operations ever submitted, in order.
    pub fn submitted(&self) -> Vec<OpKind> {
        self.state.lock().submitted.clone()
    }

    /// Buffers of completed writes in completion order.
    pub fn write_ops(&self) -> Vec<Vec<u8>> {
        self.state.lock().write_ops.clone()
    }

    /// All bytes transmitted so far, concatenated.
    pub fn written(&self) -> Vec<u8> {
        self.state.lock().write_ops.concat()
    }

    /// Number of operation records handed back through `release`.
    pub fn released(&self) -> usize {
        self.state.lock().released
    }

    pub fn was_cleared(&self) -> bool {
        self.state.lock().buffers_cleared
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn close_count(&self) -> usize {
        self.state.lock().close_count
    }
}

impl OverlappedDevice for MockOverlappedPort {
    type Native = ();

    fn name(&self) -> &str {
        &self.name
    }

    fn clear_buffers(&mut self) -> Result<(), PortError> {
        let mut state = self.state.lock();
        state.input.clear();
        state.buffers_cleared = true;
        Ok(())
    }

    fn submit(&mut self, kind: OpKind, buffer: Vec<u8>) -> Result<Outstanding<()>, PortError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(PortError::Closed);
        }
        if let Some(code) = state.submit_error.take() {
            return Err(PortError::Io(io::Error::from_raw_os_error(code)));
        }

        let event = EventHandle(NEXT_EVENT.fetch_add(1, Ordering::Relaxed));
        state.pending.push((event, kind));
        state.submitted.push(kind);
        Ok(Outstanding::new(kind, event, buffer, ()))
    }

    fn result(&mut self, op: &mut Outstanding<()>) -> Result<usize, PortError> {
        let mut state = self.state.lock();
        let scripted = match op.kind() {
            OpKind::Read => state.read_script.pop_front(),
            OpKind::Write => state.write_script.pop_front(),
        };
        if let Some(Completion::Fail(code)) = scripted {
            return Err(PortError::Io(io::Error::from_raw_os_error(code)));
        }
        let limit = match scripted {
            Some(Completion::Transferred(n)) => n.min(op.len()),
            _ => op.len(),
        };

        match op.kind() {
            OpKind::Read => {
                let n = limit.min(state.input.len());
                for (slot, byte) in op.buffer_mut().iter_mut().zip(state.input.drain(..n)) {
                    *slot = byte;
                }
                Ok(n)
            }
            OpKind::Write => {
                let sent = op.buffer()[..limit].to_vec();
                if state.loopback {
                    state.input.extend(&sent);
                }
                if !sent.is_empty() {
                    state.write_ops.push(sent);
                }
                Ok(limit)
            }
        }
    }

    fn release(&mut self, op: Outstanding<()>) -> Vec<u8> {
        let mut state = self.state.lock();
        let event = op.event();
        state.pending.retain(|(e, _)| *e != event);
        state.released += 1;
        let (buffer, ()) = op.into_parts();
        buffer
    }

    fn close(&mut self) -> Result<(), PortError> {
        let mut state = self.state.lock();
        if !state.closed {
            state.closed = true;
            state.close_count += 1;
        }
        Ok(())
    }
}

impl std::fmt::Debug for MockOverlappedPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockOverlappedPort")
            .field("name", &self.name)
            .field("pending", &self.pending_count())
            .finish()
    }
}
