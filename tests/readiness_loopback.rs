//! Readiness transport over a real descriptor and the `poll(2)` loop.
//!
//! One end of a socket pair stands in for the serial line; the test plays
//! the remote device on the other end.

#![cfg(unix)]

mod common;

use common::unix::{pump_until, read_from_peer, socket_port};
use pretty_assertions::assert_eq;
use serialtx::protocol::RecordingProtocol;
use serialtx::reactor::PollLoop;
use serialtx::transport::{RecordingObserver, TransportEvent, TransportOptions};
use serialtx::{DisconnectReason, PortConfig, ReadinessTransport, Transport};
use std::io::Write;
use std::sync::Arc;

#[test]
fn receives_bytes_sent_by_the_peer() {
    let (port, mut peer) = socket_port("pair0");
    let reactor = PollLoop::new();
    let protocol = RecordingProtocol::new();
    let mut transport =
        ReadinessTransport::with_device(protocol.clone(), port, PortConfig::default(), &reactor)
            .unwrap();

    peer.write_all(b"Send A String").unwrap();

    assert!(pump_until(&reactor, &mut transport, || {
        protocol.received().len() >= 13
    }));
    assert_eq!(protocol.received(), b"Send A String");
    assert!(transport.is_connected());
}

#[test]
fn writes_reach_the_peer_in_order() {
    let (port, mut peer) = socket_port("pair1");
    let reactor = PollLoop::new();
    let mut transport = ReadinessTransport::with_device(
        RecordingProtocol::new(),
        port,
        PortConfig::default(),
        &reactor,
    )
    .unwrap();

    transport
        .write_sequence(vec![b"One".to_vec(), b"Two".to_vec(), b"Three".to_vec()])
        .unwrap();
    // A socket buffer takes eleven bytes without blocking.
    assert_eq!(transport.buffered_len(), 0);

    assert_eq!(read_from_peer(&mut peer, 11), b"OneTwoThree");
}

#[test]
fn large_write_is_buffered_and_drained() {
    let (port, mut peer) = socket_port("pair2");
    let reactor = PollLoop::new();
    let observer = Arc::new(RecordingObserver::new());
    let mut transport = ReadinessTransport::with_options(
        RecordingProtocol::new(),
        port,
        PortConfig::default(),
        &reactor,
        TransportOptions::default().with_observer(observer.clone()),
    )
    .unwrap();

    // Larger than a socket buffer, so part of it has to wait for POLLOUT.
    let payload: Vec<u8> = (0..1024 * 1024).map(|i| (i % 251) as u8).collect();
    transport.write(payload.clone()).unwrap();
    assert!(transport.buffered_len() > 0);

    let reader = std::thread::spawn(move || read_from_peer(&mut peer, payload.len()));
    assert!(pump_until(&reactor, &mut transport, || {
        transport_drained(&observer)
    }));

    let received = reader.join().unwrap();
    assert_eq!(received.len(), 1024 * 1024);
    assert!(received.iter().enumerate().all(|(i, b)| *b == (i % 251) as u8));
    assert_eq!(reactor.len(), 1);
}

fn transport_drained(observer: &RecordingObserver) -> bool {
    observer.count(|e| *e == TransportEvent::Drained) > 0
}

#[test]
fn echo_protocol_round_trip() {
    let (port, mut peer) = socket_port("pair3");
    let reactor = PollLoop::new();
    let protocol = RecordingProtocol::new().echoing();
    let mut transport =
        ReadinessTransport::with_device(protocol.clone(), port, PortConfig::default(), &reactor)
            .unwrap();

    peer.write_all(b"ping").unwrap();
    assert!(pump_until(&reactor, &mut transport, || protocol.received().len() >= 4));

    assert_eq!(read_from_peer(&mut peer, 4), b"ping");
}

#[test]
fn lose_connection_notifies_once_and_unregisters() {
    let (port, _peer) = socket_port("pair4");
    let reactor = PollLoop::new();
    let protocol = RecordingProtocol::new();
    let mut transport =
        ReadinessTransport::with_device(protocol.clone(), port, PortConfig::default(), &reactor)
            .unwrap();
    assert_eq!(reactor.len(), 1);

    transport.lose_connection();
    transport.lose_connection();

    assert_eq!(protocol.lost(), vec![DisconnectReason::ClosedByRequest]);
    assert!(reactor.is_empty());
    assert!(!transport.device().is_open());

    // The loop has nothing left to wait for.
    reactor.run(&mut transport, None).unwrap();
}

#[test]
fn peer_hangup_closes_with_device_error() {
    let (port, peer) = socket_port("pair5");
    let reactor = PollLoop::new();
    let protocol = RecordingProtocol::new();
    let mut transport =
        ReadinessTransport::with_device(protocol.clone(), port, PortConfig::default(), &reactor)
            .unwrap();

    drop(peer);
    let closed = pump_until(&reactor, &mut transport, || !protocol.lost().is_empty());
    assert!(closed);

    let lost = protocol.lost();
    assert_eq!(lost.len(), 1);
    assert!(matches!(lost[0], DisconnectReason::DeviceError(_)));
    assert!(reactor.is_empty());
}

#[test]
fn input_written_before_hangup_is_delivered() {
    let (port, mut peer) = socket_port("pair7");
    let reactor = PollLoop::new();
    let protocol = RecordingProtocol::new();
    let mut transport = ReadinessTransport::with_options(
        protocol.clone(),
        port,
        PortConfig::default(),
        &reactor,
        TransportOptions::default().with_read_buffer_size(1024),
    )
    .unwrap();

    // Several read buffers' worth, all queued in the socket before the hang-up.
    let payload: Vec<u8> = (0..6000).map(|i| (i % 233) as u8).collect();
    peer.write_all(&payload).unwrap();
    drop(peer);

    assert!(pump_until(&reactor, &mut transport, || {
        !protocol.lost().is_empty()
    }));
    assert_eq!(protocol.received(), payload);
    assert_eq!(protocol.lost().len(), 1);
    assert!(matches!(protocol.lost()[0], DisconnectReason::DeviceError(_)));
}

#[test]
fn close_from_inside_callback_stops_the_loop() {
    let (port, mut peer) = socket_port("pair6");
    let reactor = PollLoop::new();
    let protocol = RecordingProtocol::new().close_after(5);
    let mut transport =
        ReadinessTransport::with_device(protocol.clone(), port, PortConfig::default(), &reactor)
            .unwrap();

    peer.write_all(b"hello").unwrap();
    reactor.run(&mut transport, None).unwrap();

    assert_eq!(protocol.received(), b"hello");
    assert_eq!(protocol.lost(), vec![DisconnectReason::ClosedByRequest]);
}
