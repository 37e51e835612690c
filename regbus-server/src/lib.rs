//! # Register-Bus Server Library
//!
//! This crate provides a foundation for implementing register-bus hosts:
//! the remote end that receives register read/write commands, applies them
//! to an actual register file, and sends the acknowledging replies.
//!
//! ## Architecture
//!
//! The crate is built around two main components:
//!
//! - **[RegisterFile] Trait**: the interface a backend must implement to
//!   expose its registers (a simulated map, a memory-mapped peripheral
//!   window, a hardware bridge, ...)
//! - **[server::Server]**: a generic server that handles transport framing,
//!   command parsing, addressing-mode execution, and reply generation
//!
//! ## How It Works
//!
//! 1. A backend implements [RegisterFile] for its register space
//! 2. The backend is wrapped in a [server::Server]
//! 3. The server listens on TCP (SLIP-framed byte stream) via
//!    [server::Server::listen] or answers UDP datagrams via
//!    [server::Server::listen_udp]
//! 4. Each command addresses `word count` registers in repeat or
//!    auto-increment mode; every word is dispatched to the backend
//! 5. One reply per command echoes the opcode, word count, sequence number
//!    and address, carries read data, and reports a status byte (zero only
//!    if every word was acknowledged)
//!
//! ## Basic Usage
//!
//! ```ignore
//! use regbus_server::MemRegisterFile;
//! use regbus_server::server::{Config, Server};
//!
//! let server = Server::new(MemRegisterFile::new(), Config::default());
//! server.listen("127.0.0.1:23553")?;
//! ```
//!
//! ## Error Handling
//!
//! Malformed or corrupt frames are dropped (per the configured frame-check
//! policy); commands addressing a failing backend produce replies with a
//! non-zero status byte rather than closing the connection. Socket errors
//! are propagated to the caller of `listen`.
//!
//! ## Logging
//!
//! This crate uses the `log` crate for diagnostics. Configure logging with
//! an implementation like `env_logger` to see client connections, decoded
//! commands, and error conditions.
//!
//! ## Thread Model
//!
//! The server processes each client connection sequentially in a single
//! thread, mirroring the one-command-in-flight discipline of the bus
//! itself. For multi-client support, run multiple server instances or wrap
//! `serve` in your own accept loop.

pub mod server;

mod memory;
pub use memory::MemRegisterFile;

/// Trait that backends implement to expose a register space.
///
/// This is the seam between the protocol server and whatever actually
/// holds the registers. Implementors receive one call per word; addressing
/// (repeat vs auto-increment) has already been resolved by the server.
///
/// Methods take `&self`; implementations use interior mutability so one
/// backend can serve several transports at once.
pub trait RegisterFile: Send + Sync {
    /// Write one word. Returns `true` if the device acknowledged it.
    fn write(&self, device: u8, register: u16, value: u32) -> bool;

    /// Read one word, or `None` if the device did not acknowledge.
    fn read(&self, device: u8, register: u16) -> Option<u32>;
}

impl<T: RegisterFile + ?Sized> RegisterFile for std::sync::Arc<T> {
    fn write(&self, device: u8, register: u16, value: u32) -> bool {
        (**self).write(device, register, value)
    }

    fn read(&self, device: u8, register: u16) -> Option<u32> {
        (**self).read(device, register)
    }
}
