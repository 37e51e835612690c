//! End-to-end exchanges between a client session and a register host over
//! UDP loopback, where the transport already preserves frame boundaries.

use std::net::UdpSocket;
use std::time::Duration;

use regbus_client::{BusError, DeliveryMode};
use regbus_server::MemRegisterFile;
use regbus_tests::{connect_udp, spawn_udp_host};

const TIMEOUT: Duration = Duration::from_millis(250);

#[test]
fn write_then_read_back() {
    let addr = spawn_udp_host(MemRegisterFile::new());
    let bus = connect_udp(addr, DeliveryMode::Blocking);
    bus.write(0, 0, 42, TIMEOUT).unwrap();
    assert_eq!(bus.read(0, 0, TIMEOUT).unwrap(), 42);
}

#[test]
fn multi_word_exchange() {
    let addr = spawn_udp_host(MemRegisterFile::new());
    let bus = connect_udp(addr, DeliveryMode::Blocking);
    bus.write_multi(7, 100, &[1, 2, 3, 4], true, TIMEOUT).unwrap();
    assert_eq!(
        bus.read_multi(7, 100, 4, true, TIMEOUT).unwrap(),
        vec![1, 2, 3, 4]
    );
}

#[test]
fn timeout_against_mute_socket() {
    // A bound socket that never answers.
    let mute = UdpSocket::bind("127.0.0.1:0").unwrap();
    let bus = connect_udp(mute.local_addr().unwrap(), DeliveryMode::Blocking);
    assert!(matches!(bus.read(0, 0, TIMEOUT), Err(BusError::Timeout)));
    // Session still alive for the next attempt.
    assert!(matches!(bus.read(0, 1, TIMEOUT), Err(BusError::Timeout)));
}
