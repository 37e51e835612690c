//! Datagram link adapter.
//!
//! UDP already preserves message boundaries and checksums frames in the
//! network stack, so this adapter forwards payloads verbatim in both
//! directions: no SLIP framing, no application-level frame check.

use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, SyncSender, TrySendError, sync_channel};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use super::{InboundFrame, Link, LinkConfig};

const RECV_CHUNK: usize = 2048;

struct Shared {
    socket: UdpSocket,
    run: AtomicBool,
}

/// Frame-preserving link over a connected UDP socket.
pub struct UdpLink {
    shared: Arc<Shared>,
    config: LinkConfig,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl UdpLink {
    /// Bind an ephemeral local port, connect it to the remote host, and
    /// start the inbound thread. Returns the link plus the bounded channel
    /// of inbound payloads; only datagrams from the connected peer are
    /// delivered.
    pub fn connect(
        remote: impl ToSocketAddrs,
        config: LinkConfig,
    ) -> io::Result<(UdpLink, Receiver<InboundFrame>)> {
        let remote = remote
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "no remote address"))?;
        let local: SocketAddr = if remote.is_ipv4() {
            "0.0.0.0:0".parse().unwrap()
        } else {
            "[::]:0".parse().unwrap()
        };
        let socket = UdpSocket::bind(local)?;
        socket.connect(remote)?;
        socket.set_read_timeout(Some(config.read_timeout))?;
        log::info!("Datagram link connected to {}", remote);

        let shared = Arc::new(Shared {
            socket,
            run: AtomicBool::new(true),
        });
        let (inbound, frames) = sync_channel(config.queue_depth);
        let reader = {
            let shared = shared.clone();
            thread::spawn(move || reader_loop(&shared, inbound))
        };

        let link = UdpLink {
            shared,
            config,
            reader: Mutex::new(Some(reader)),
        };
        Ok((link, frames))
    }
}

impl Link for UdpLink {
    fn send(&self, payload: &[u8]) -> io::Result<()> {
        self.shared.socket.send(payload).map(|_| ())
    }

    fn send_blocking(&self, payload: &[u8]) -> io::Result<()> {
        self.send(payload)?;
        thread::sleep(self.config.turnaround);
        Ok(())
    }

    fn close(&self) {
        if !self.shared.run.swap(false, Ordering::SeqCst) {
            return;
        }
        // No shutdown for UDP; the read timeout wakes the inbound thread.
        if let Some(handle) = self.reader.lock().unwrap().take() {
            let _ = handle.join();
        }
        log::info!("Datagram link closed");
    }
}

impl Drop for UdpLink {
    fn drop(&mut self) {
        self.close();
    }
}

fn reader_loop(shared: &Shared, inbound: SyncSender<InboundFrame>) {
    log::debug!("Datagram link receive loop start");
    let mut chunk = [0u8; RECV_CHUNK];
    while shared.run.load(Ordering::Relaxed) {
        match shared.socket.recv(&mut chunk) {
            Ok(n) => match inbound.try_send(chunk[..n].to_vec()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    log::warn!("Inbound queue full, dropping datagram")
                }
                Err(TrySendError::Disconnected(_)) => break,
            },
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock
                        | io::ErrorKind::TimedOut
                        | io::ErrorKind::Interrupted
                ) =>
            {
                // Receive timeout: poll again.
            }
            Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => {
                // ICMP unreachable from an absent peer; keep listening.
                log::debug!("Datagram link: peer unreachable");
            }
            Err(e) => {
                if shared.run.load(Ordering::Relaxed) {
                    log::error!("Datagram link receive failed: {}", e);
                }
                break;
            }
        }
    }
    log::debug!("Datagram link receive loop done");
}
