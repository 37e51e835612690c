//! Byte-stream link adapter.
//!
//! Suits any stream-style medium without message boundaries; the concrete
//! transport here is TCP, standing in for serial tunnels and similar
//! stream devices. Outbound payloads get a CRC-32 frame check and SLIP
//! framing; inbound bytes are accumulated, split at frame boundaries, and
//! verified according to the configured [FcsPolicy].

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, SyncSender, TrySendError, sync_channel};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use regbus_protocol::fcs::{FCS_LEN, FcsPolicy, append_fcs, verify_fcs};
use regbus_protocol::framing::{self, Deframer};

use super::{InboundFrame, Link, LinkConfig};

const READ_CHUNK: usize = 2048;

struct Shared {
    io: TcpStream,
    /// Serializes the writer thread and direct sends onto the stream.
    wr_lock: Mutex<()>,
    /// Pending outbound bytes, bundled by the writer thread.
    queue: Mutex<Vec<u8>>,
    run: AtomicBool,
}

/// SLIP-framed link over a connected byte stream.
pub struct StreamLink {
    shared: Arc<Shared>,
    config: LinkConfig,
    reader: Mutex<Option<JoinHandle<()>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
}

impl StreamLink {
    /// Connect to the remote host and start the reader and writer threads.
    /// Returns the link plus the bounded channel of inbound payloads.
    pub fn connect(
        addr: impl ToSocketAddrs,
        config: LinkConfig,
    ) -> io::Result<(StreamLink, Receiver<InboundFrame>)> {
        let io = TcpStream::connect(addr)?;
        io.set_nodelay(true)?;
        io.set_read_timeout(Some(config.read_timeout))?;
        log::info!("Stream link connected to {}", io.peer_addr()?);

        let shared = Arc::new(Shared {
            io,
            wr_lock: Mutex::new(()),
            queue: Mutex::new(Vec::new()),
            run: AtomicBool::new(true),
        });
        let (inbound, frames) = sync_channel(config.queue_depth);

        let reader = {
            let shared = shared.clone();
            let policy = config.fcs;
            thread::spawn(move || reader_loop(&shared, policy, inbound))
        };
        let writer = {
            let shared = shared.clone();
            let idle_wait = config.idle_wait;
            thread::spawn(move || writer_loop(&shared, idle_wait))
        };

        let link = StreamLink {
            shared,
            config,
            reader: Mutex::new(Some(reader)),
            writer: Mutex::new(Some(writer)),
        };
        Ok((link, frames))
    }

    fn encode(&self, payload: &[u8]) -> Vec<u8> {
        framing::encode(&append_fcs(payload.to_vec(), self.config.zeropad))
    }
}

impl Link for StreamLink {
    fn send(&self, payload: &[u8]) -> io::Result<()> {
        let frame = self.encode(payload);
        self.shared.queue.lock().unwrap().extend_from_slice(&frame);
        Ok(())
    }

    fn send_blocking(&self, payload: &[u8]) -> io::Result<()> {
        let frame = self.encode(payload);
        {
            let _wr = self.shared.wr_lock.lock().unwrap();
            (&self.shared.io).write_all(&frame)?;
        }
        thread::sleep(self.config.turnaround);
        Ok(())
    }

    fn close(&self) {
        if !self.shared.run.swap(false, Ordering::SeqCst) {
            return; // already closed
        }
        let _ = self.shared.io.shutdown(Shutdown::Both);
        for handle in [&self.reader, &self.writer] {
            if let Some(handle) = handle.lock().unwrap().take() {
                let _ = handle.join();
            }
        }
        log::info!("Stream link closed");
    }
}

impl Drop for StreamLink {
    fn drop(&mut self) {
        self.close();
    }
}

fn reader_loop(shared: &Shared, policy: FcsPolicy, inbound: SyncSender<InboundFrame>) {
    log::debug!("Stream link receive loop start");
    let mut deframer = Deframer::new();
    let mut chunk = [0u8; READ_CHUNK];
    while shared.run.load(Ordering::Relaxed) {
        match (&shared.io).read(&mut chunk) {
            Ok(0) => {
                log::info!("Stream link closed by peer");
                break;
            }
            Ok(n) => {
                deframer.extend(&chunk[..n]);
                while let Some(frame) = deframer.next_frame() {
                    deliver(frame, policy, &inbound);
                }
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock
                        | io::ErrorKind::TimedOut
                        | io::ErrorKind::Interrupted
                ) =>
            {
                // Read timeout: no data available, poll again.
            }
            Err(e) => {
                if shared.run.load(Ordering::Relaxed) {
                    log::error!("Stream link read failed: {}", e);
                }
                break;
            }
        }
    }
    log::debug!("Stream link receive loop done");
    // Dropping `inbound` here tells the session the link is gone.
}

fn deliver(frame: Vec<u8>, policy: FcsPolicy, inbound: &SyncSender<InboundFrame>) {
    let payload = match policy {
        FcsPolicy::Off => frame,
        FcsPolicy::Drop => match verify_fcs(&frame) {
            Ok(data) => data.to_vec(),
            Err(e) => {
                log::debug!("Dropping frame: {}", e);
                return;
            }
        },
        FcsPolicy::Warn => match verify_fcs(&frame) {
            Ok(data) => data.to_vec(),
            Err(e) => {
                log::warn!("Stream link: {}", e);
                let keep = frame.len().saturating_sub(FCS_LEN);
                frame[..keep].to_vec()
            }
        },
    };
    match inbound.try_send(payload) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => {
            log::warn!("Inbound queue full, dropping frame")
        }
        Err(TrySendError::Disconnected(_)) => {}
    }
}

fn writer_loop(shared: &Shared, idle_wait: Duration) {
    log::debug!("Stream link transmit loop start");
    while shared.run.load(Ordering::Relaxed) {
        let data = std::mem::take(&mut *shared.queue.lock().unwrap());
        if data.is_empty() {
            thread::sleep(idle_wait);
            continue;
        }
        log::debug!("Sending {} bytes", data.len());
        let _wr = shared.wr_lock.lock().unwrap();
        if let Err(e) = (&shared.io).write_all(&data) {
            if shared.run.load(Ordering::Relaxed) {
                log::error!("Stream link write failed: {}", e);
            }
            break;
        }
    }
    log::debug!("Stream link transmit loop done");
}
