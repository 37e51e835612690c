//! # Register-Bus Protocol Library
//!
//! This crate implements the wire format for issuing register read/write
//! transactions against a remote hardware register file, together with the
//! framing and integrity layers needed to carry those transactions over
//! links that provide no reliability, ordering, or message boundaries of
//! their own.
//!
//! ## Overview
//!
//! The protocol addresses up to 256 devices of 1024 registers each through a
//! flat 18-bit address (`1024 * device + register`). Four opcodes cover the
//! combinations of read/write and repeat/auto-increment addressing, and each
//! command carries a word count of one to eight 32-bit words plus a wrapping
//! sequence counter echoed by the remote host. This library implements:
//!
//! - Serialization and deserialization of [Command] and [Reply] messages
//! - SLIP byte-stuffing so frame boundaries survive arbitrary payloads
//!   ([framing])
//! - A CRC-32 frame check sequence with configurable failure policy ([fcs])
//! - Message-tag pairs distinguishing commands from replies on shared media
//!   ([TagPair])
//!
//! ## Message Format
//!
//! All messages are big-endian with a fixed eight-byte header:
//!
//! - **Command**: `opcode | count-1 | sequence | reserved | address:4 | words…`
//! - **Reply**: `opcode | count-1 | sequence | reserved | address:4 | [words…] | status`
//!
//! Write commands carry their payload words; read replies carry the fetched
//! words. Every reply terminates with a status byte, zero meaning all words
//! were acknowledged by the addressed device.
//!
//! ## Basic Usage
//!
//! ### Encoding a Command
//!
//! ```
//! use regbus_protocol::{Command, flat_addr};
//!
//! let cmd = Command::Write {
//!     increment: false,
//!     sequence: 0,
//!     addr: flat_addr(0, 0),
//!     data: vec![1],
//! };
//! let mut buffer = Vec::new();
//! cmd.write_to(&mut buffer).expect("Writing to vector shouldn't fail");
//! assert_eq!(buffer, b"\x2F\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x01");
//! ```
//!
//! ### Framing for a Byte-Stream Link
//!
//! ```
//! use regbus_protocol::{fcs, framing};
//!
//! let checked = fcs::append_fcs(b"\xC0payload".to_vec(), false);
//! let wire = framing::encode(&checked);
//! // The reserved END byte never appears except as the terminator.
//! assert_eq!(wire.iter().filter(|&&b| b == framing::END).count(), 1);
//! assert_eq!(wire.last(), Some(&framing::END));
//! ```
//!
//! ### Parsing a Reply
//!
//! ```
//! use regbus_protocol::{Opcode, Reply};
//! use std::io::Cursor;
//!
//! let wire = b"\x40\x00\x07\x00\x00\x00\x00\x05\x00\x00\x00\x2A\x00";
//! let reply = Reply::from_reader(&mut Cursor::new(wire)).expect("Reply should parse");
//! assert_eq!(reply.opcode, Opcode::ReadRepeat);
//! assert_eq!(reply.sequence, 0x07);
//! assert_eq!(reply.data, vec![42]);
//! assert!(reply.ok());
//! ```
//!
//! ## Error Handling
//!
//! Parsing uses the [error::DecodeError] type; frame-check failures are
//! reported through [fcs::FcsError] and handled according to the link's
//! [fcs::FcsPolicy].
//!
//! ## Thread Safety
//!
//! All types in this library are plain data and safe to share across
//! threads. The stateful [framing::Deframer] is single-owner by design;
//! each link keeps one per inbound stream.

pub mod protocol;
pub use protocol::*;
pub mod codec;
pub mod error;
pub mod fcs;
pub mod framing;
#[cfg(feature = "tokio")]
pub mod stream_codec;
