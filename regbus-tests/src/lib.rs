//! Shared plumbing for the end-to-end tests: spawn a register host on an
//! ephemeral loopback port and hand back its address.

use std::net::{SocketAddr, TcpListener, UdpSocket};
use std::thread;

use regbus_client::link::{LinkConfig, StreamLink, UdpLink};
use regbus_client::{DeliveryMode, RegisterBus};
use regbus_protocol::TagPair;
use regbus_server::RegisterFile;
use regbus_server::server::{Config, Server};

/// Serve `host` over SLIP-framed TCP on an ephemeral loopback port.
/// The server thread lives until the process exits.
pub fn spawn_tcp_host(host: impl RegisterFile + 'static) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        let server = Server::new(host, Config::default());
        let _ = server.serve(listener);
    });
    addr
}

/// Serve `host` over UDP on an ephemeral loopback port.
pub fn spawn_udp_host(host: impl RegisterFile + 'static) -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    let addr = socket.local_addr().unwrap();
    thread::spawn(move || {
        let server = Server::new(host, Config::default());
        let _ = server.serve_udp(socket);
    });
    addr
}

/// A TCP peer that accepts connections and swallows everything: commands
/// go in, nothing ever comes out.
pub fn spawn_black_hole() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            thread::spawn(move || {
                use std::io::Read;
                let mut stream = stream;
                let mut sink = [0u8; 256];
                loop {
                    match stream.read(&mut sink) {
                        Ok(0) | Err(_) => break,
                        Ok(_) => {}
                    }
                }
            });
        }
    });
    addr
}

pub fn connect_tcp(addr: SocketAddr, mode: DeliveryMode) -> RegisterBus<StreamLink> {
    let (link, frames) = StreamLink::connect(addr, LinkConfig::default()).unwrap();
    RegisterBus::new(link, frames, TagPair::default(), mode)
}

pub fn connect_udp(addr: SocketAddr, mode: DeliveryMode) -> RegisterBus<UdpLink> {
    let (link, frames) = UdpLink::connect(addr, LinkConfig::default()).unwrap();
    RegisterBus::new(link, frames, TagPair::default(), mode)
}
