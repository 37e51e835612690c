use std::io::{ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream, ToSocketAddrs, UdpSocket};
use std::time::Duration;

use crate::RegisterFile;
use regbus_protocol::fcs::{FCS_LEN, FcsPolicy, append_fcs, verify_fcs};
use regbus_protocol::framing::{self, Deframer};
use regbus_protocol::{Command, MAX_WORDS, Reply, TagPair, split_addr};

const READ_CHUNK: usize = 2048;

#[derive(Debug, Clone)]
pub struct Config {
    /// Command/reply tag pair this host answers to.
    pub tags: TagPair,
    /// Highest word count accepted per command; longer commands are
    /// answered with an error status.
    pub max_words: usize,
    /// Frame-check policy for inbound stream frames.
    pub fcs: FcsPolicy,
    /// Zero-pad outbound stream frames to the Ethernet minimum.
    pub zeropad: bool,
    /// TCP read and write timeout; an idle client is disconnected.
    pub read_write_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tags: TagPair::default(),
            max_words: MAX_WORDS,
            fcs: FcsPolicy::Drop,
            zeropad: false,
            read_write_timeout: Duration::from_secs(30),
        }
    }
}

/// Builder to create a [Server] instance and modify configuration options
///
/// # Example
///
/// ```ignore
/// use regbus_server::server::Builder;
/// use std::time::Duration;
///
/// let server = Builder::new()
///     .tags(TagPair::new(0x1234).unwrap())
///     .rw_timeout(Duration::from_secs(20))
///     .build(my_register_file);
/// ```
#[derive(Default)]
pub struct Builder {
    config: Config,
}

impl Builder {
    pub fn new() -> Builder {
        Builder::default()
    }

    /// Set the command/reply tag pair this host answers to.
    pub fn tags(mut self, tags: TagPair) -> Self {
        self.config.tags = tags;
        self
    }

    /// Set the highest word count accepted per command.
    pub fn max_words(mut self, max_words: usize) -> Self {
        self.config.max_words = max_words;
        self
    }

    /// Set the frame-check policy for inbound stream frames.
    pub fn fcs(mut self, fcs: FcsPolicy) -> Self {
        self.config.fcs = fcs;
        self
    }

    /// Zero-pad outbound stream frames to the Ethernet minimum.
    pub fn zeropad(mut self, zeropad: bool) -> Self {
        self.config.zeropad = zeropad;
        self
    }

    /// Set the TCP read and write timeout
    pub fn rw_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_write_timeout = timeout;
        self
    }

    /// Build and return the server
    pub fn build<T: RegisterFile>(self, host: T) -> Server<T> {
        Server::new(host, self.config)
    }
}

/// Generic register-bus host over a [RegisterFile] backend.
#[derive(Debug)]
pub struct Server<T: RegisterFile> {
    host: T,
    config: Config,
}

impl<T: RegisterFile> Server<T> {
    pub fn new(host: T, config: Config) -> Server<T> {
        Server { host, config }
    }

    /// Bind a TCP listener and serve SLIP-framed clients forever.
    pub fn listen(&self, addr: impl ToSocketAddrs) -> Result<(), Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(addr)?;
        log::info!("Server listening for connections");
        self.serve(listener)
    }

    /// Serve SLIP-framed clients from an already-bound listener, one
    /// connection at a time.
    pub fn serve(&self, listener: TcpListener) -> Result<(), Box<dyn std::error::Error>> {
        for stream in listener.incoming() {
            match stream {
                Ok(tcp) => {
                    if let Ok(addr) = tcp.peer_addr() {
                        log::info!("New client connection from {}", addr);
                    }
                    if let Err(e) = self.handle_client(tcp) {
                        log::error!("Client error: {}", e);
                    }
                }
                Err(e) => log::error!("Connection error: {}", e),
            }
        }
        Ok(())
    }

    /// Bind a UDP socket and answer datagram commands forever.
    pub fn listen_udp(&self, addr: impl ToSocketAddrs) -> std::io::Result<()> {
        let socket = UdpSocket::bind(addr)?;
        log::info!("Server answering datagrams");
        self.serve_udp(socket)
    }

    /// Answer datagram commands from an already-bound socket. Datagrams
    /// carry bare payloads: no SLIP framing, no frame check.
    pub fn serve_udp(&self, socket: UdpSocket) -> std::io::Result<()> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            let (n, peer) = socket.recv_from(&mut chunk)?;
            if let Some(reply) = self.process_frame(&chunk[..n]) {
                socket.send_to(&reply, peer)?;
            }
        }
    }

    fn handle_client(&self, mut tcp: TcpStream) -> std::io::Result<()> {
        tcp.set_read_timeout(Some(self.config.read_write_timeout))?;
        tcp.set_write_timeout(Some(self.config.read_write_timeout))?;

        let mut deframer = Deframer::new();
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match tcp.read(&mut chunk) {
                Ok(0) => break, // Client disconnected
                Ok(n) => {
                    deframer.extend(&chunk[..n]);
                    while let Some(frame) = deframer.next_frame() {
                        let Some(payload) = self.check_fcs(frame) else {
                            continue;
                        };
                        if let Some(reply) = self.process_frame(&payload) {
                            let framed = framing::encode(&append_fcs(reply, self.config.zeropad));
                            tcp.write_all(&framed)?;
                        }
                    }
                }
                Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => {
                    log::error!("Client read timeout, closing connection");
                    break;
                }
                Err(e)
                    if e.kind() == ErrorKind::ConnectionAborted
                        || e.kind() == ErrorKind::ConnectionReset =>
                {
                    break; // Client disconnected
                }
                Err(other) => return Err(other),
            }
        }
        Ok(())
    }

    /// Verify an inbound stream frame according to the configured policy.
    fn check_fcs(&self, frame: Vec<u8>) -> Option<Vec<u8>> {
        match self.config.fcs {
            FcsPolicy::Off => Some(frame),
            FcsPolicy::Drop => match verify_fcs(&frame) {
                Ok(payload) => Some(payload.to_vec()),
                Err(e) => {
                    log::debug!("Dropping frame: {}", e);
                    None
                }
            },
            FcsPolicy::Warn => match verify_fcs(&frame) {
                Ok(payload) => Some(payload.to_vec()),
                Err(e) => {
                    log::warn!("{}", e);
                    let keep = frame.len().saturating_sub(FCS_LEN);
                    Some(frame[..keep].to_vec())
                }
            },
        }
    }

    /// Decode one command payload and produce the reply payload, or `None`
    /// if the frame is not a command for this host.
    fn process_frame(&self, payload: &[u8]) -> Option<Vec<u8>> {
        if payload.len() < 2 {
            return None;
        }
        let tag = u16::from_be_bytes([payload[0], payload[1]]);
        if tag != self.config.tags.command() {
            log::trace!("Ignoring frame with tag 0x{:04X}", tag);
            return None;
        }
        let mut body = &payload[2..];
        let command = match Command::from_reader(&mut body) {
            Ok(command) => command,
            Err(e) => {
                log::warn!("Discarding undecodable command: {}", e);
                return None;
            }
        };
        log::debug!(
            "Received {} command: {} words at 0x{:05X}, sequence {}",
            command.opcode(),
            command.word_count(),
            command.addr(),
            command.sequence()
        );
        let reply = self.execute(&command);
        let mut out = self.config.tags.reply().to_be_bytes().to_vec();
        reply.write_to(&mut out).ok()?;
        Some(out)
    }

    /// Apply one command to the backend, resolving the addressing mode.
    fn execute(&self, command: &Command) -> Reply {
        let mut status = 0u8;
        let mut data = Vec::new();
        if command.word_count() > self.config.max_words {
            log::warn!("Rejecting command with {} words", command.word_count());
            status = 1;
            if let Command::Read { count, .. } = command {
                data = vec![0; *count as usize];
            }
        } else {
            match command {
                Command::Write {
                    increment,
                    addr,
                    data: words,
                    ..
                } => {
                    for (i, word) in words.iter().enumerate() {
                        let step = if *increment { i as u32 } else { 0 };
                        let (device, register) = split_addr(addr + step);
                        if !self.host.write(device, register, *word) {
                            status = 1;
                        }
                    }
                }
                Command::Read {
                    increment,
                    addr,
                    count,
                    ..
                } => {
                    for i in 0..*count as u32 {
                        let step = if *increment { i } else { 0 };
                        let (device, register) = split_addr(addr + step);
                        match self.host.read(device, register) {
                            Some(word) => data.push(word),
                            None => {
                                data.push(0);
                                status = 1;
                            }
                        }
                    }
                }
            }
        }
        Reply {
            opcode: command.opcode(),
            word_count: command.word_count() as u8,
            sequence: command.sequence(),
            addr: command.addr(),
            data,
            status,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::MemRegisterFile;
    use regbus_protocol::{Opcode, flat_addr};

    /// Backend with a hole: device 9 never acknowledges.
    struct Patchy(MemRegisterFile);

    impl RegisterFile for Patchy {
        fn write(&self, device: u8, register: u16, value: u32) -> bool {
            device != 9 && self.0.write(device, register, value)
        }

        fn read(&self, device: u8, register: u16) -> Option<u32> {
            if device == 9 {
                None
            } else {
                self.0.read(device, register)
            }
        }
    }

    fn server() -> Server<Patchy> {
        Server::new(Patchy(MemRegisterFile::new()), Config::default())
    }

    fn write_cmd(increment: bool, sequence: u8, addr: u32, data: Vec<u32>) -> Command {
        Command::Write {
            increment,
            sequence,
            addr,
            data,
        }
    }

    fn read_cmd(increment: bool, sequence: u8, addr: u32, count: u8) -> Command {
        Command::Read {
            increment,
            sequence,
            addr,
            count,
        }
    }

    #[test]
    fn increment_write_lands_on_consecutive_registers() {
        let server = server();
        let base = flat_addr(1, 10);
        let reply = server.execute(&write_cmd(true, 5, base, vec![7, 8, 9]));
        assert_eq!(reply.status, 0);
        assert_eq!(reply.sequence, 5);
        assert_eq!(reply.opcode, Opcode::WriteIncrement);
        let reply = server.execute(&read_cmd(true, 6, base, 3));
        assert_eq!(reply.data, vec![7, 8, 9]);
        // And individually:
        assert_eq!(server.execute(&read_cmd(false, 7, base + 2, 1)).data, vec![9]);
    }

    #[test]
    fn repeat_write_hammers_one_register() {
        let server = server();
        let addr = flat_addr(2, 0);
        let reply = server.execute(&write_cmd(false, 0, addr, vec![1, 2, 3]));
        assert_eq!(reply.status, 0);
        assert_eq!(server.execute(&read_cmd(false, 1, addr, 1)).data, vec![3]);
        // The neighbor register was never touched.
        assert_eq!(server.execute(&read_cmd(false, 2, addr + 1, 1)).data, vec![0]);
    }

    #[test]
    fn increment_crosses_device_boundary() {
        let server = server();
        let last = flat_addr(3, 1023);
        server.execute(&write_cmd(true, 0, last, vec![111, 222]));
        assert_eq!(server.execute(&read_cmd(false, 1, flat_addr(4, 0), 1)).data, vec![222]);
    }

    #[test]
    fn unacknowledged_words_set_error_status() {
        let server = server();
        let reply = server.execute(&write_cmd(false, 0, flat_addr(9, 0), vec![1]));
        assert_eq!(reply.status, 1);
        let reply = server.execute(&read_cmd(true, 1, flat_addr(9, 0), 2));
        assert_eq!(reply.status, 1);
        // Failed reads still carry the full word count, zero-filled.
        assert_eq!(reply.data, vec![0, 0]);
    }

    #[test]
    fn over_long_command_rejected_with_status() {
        let server = Builder::new().max_words(2).build(Patchy(MemRegisterFile::new()));
        let reply = server.execute(&read_cmd(true, 0, 0, 4));
        assert_eq!(reply.status, 1);
        assert_eq!(reply.data, vec![0; 4]);
        let reply = server.execute(&write_cmd(true, 1, 0, vec![1, 2, 3]));
        assert_eq!(reply.status, 1);
        // Nothing was applied.
        assert_eq!(server.execute(&read_cmd(false, 2, 0, 1)).data, vec![0]);
    }

    #[test]
    fn frame_processing_round_trip() {
        let server = server();
        let tags = TagPair::default();
        let command = write_cmd(false, 42, flat_addr(0, 1), vec![0xAB]);
        let mut frame = tags.command().to_be_bytes().to_vec();
        command.write_to(&mut frame).unwrap();
        let out = server.process_frame(&frame).unwrap();
        assert_eq!(u16::from_be_bytes([out[0], out[1]]), tags.reply());
        let mut body = &out[2..];
        let reply = Reply::from_reader(&mut body).unwrap();
        assert_eq!(reply.sequence, 42);
        assert!(reply.ok());
    }

    #[test]
    fn foreign_and_garbled_frames_ignored() {
        let server = server();
        // Reply tag, not command tag.
        let mut frame = TagPair::default().reply().to_be_bytes().to_vec();
        frame.extend_from_slice(&[0u8; 8]);
        assert!(server.process_frame(&frame).is_none());
        // Unknown opcode.
        let mut frame = TagPair::default().command().to_be_bytes().to_vec();
        frame.extend_from_slice(b"\x99\x00\x00\x00\x00\x00\x00\x00");
        assert!(server.process_frame(&frame).is_none());
        // Too short for a tag.
        assert!(server.process_frame(&[0x5C]).is_none());
    }
}
