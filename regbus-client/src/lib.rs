//! # Register-Bus Client
//!
//! A Rust client library for issuing register read/write transactions
//! against remote hardware register hosts over unreliable, frame-oriented
//! links.
//!
//! ## Overview
//!
//! This crate provides a synchronous-looking interface to a remote register
//! file: callers invoke [RegisterBus::write] or [RegisterBus::read] and get
//! back a plain result, while underneath the session frames the command,
//! transmits it, and correlates the asynchronously-arriving reply back to
//! the waiting caller. It handles the concurrency hazards of that exchange
//! (concurrent callers, timed-out exchanges, stale and duplicate replies) so
//! device-configuration code does not have to.
//!
//! ## Architecture
//!
//! - **[link]**: adapters that move frames on and off the wire. A
//!   [link::StreamLink] speaks SLIP with a CRC-32 frame check over a byte
//!   stream; a [link::UdpLink] exchanges bare datagrams. Each runs its own
//!   inbound thread and hands received payloads to the session through a
//!   bounded channel.
//! - **[RegisterBus]**: the session. One command in flight at a time,
//!   serialized by the session lock; replies are matched by frame tag and
//!   echoed sequence number.
//! - **[periph]**: small controllers (GPO, MDIO) layered on top of the
//!   session.
//!
//! For the wire format itself, see the
//! [`regbus_protocol`](../regbus_protocol/index.html) crate.
//!
//! ## Basic Usage
//!
//! ```ignore
//! use regbus_client::{DeliveryMode, RegisterBus};
//! use regbus_client::link::{LinkConfig, StreamLink};
//! use regbus_protocol::TagPair;
//! use std::time::Duration;
//!
//! let (link, frames) = StreamLink::connect("192.168.1.42:23553", LinkConfig::default())?;
//! let bus = RegisterBus::new(link, frames, TagPair::default(), DeliveryMode::Blocking);
//!
//! let timeout = Duration::from_millis(100);
//! bus.write(0, 4, 0xDEAD_BEEF, timeout)?;
//! let value = bus.read(0, 4, timeout)?;
//! ```
//!
//! ### Fire-and-Forget Sessions
//!
//! ```ignore
//! let bus = RegisterBus::new(link, frames, TagPair::default(), DeliveryMode::FireAndForget);
//! // Returns as soon as the command is on the wire; replies are discarded.
//! bus.write(0, 4, 1, timeout)?;
//! ```
//!
//! ## Error Handling
//!
//! Operations return [BusError], which distinguishes timeouts (nothing
//! correlated arrived, so a retry may help) from negative acknowledgments
//! (the device rejected the command) and malformed replies. No failure poisons
//! the session; the next call starts from a consistent state.
//!
//! ## Thread Safety
//!
//! [RegisterBus] is `Sync`: any number of threads may issue operations on a
//! shared session. Commands serialize through the session lock, and each
//! caller observes only the reply to its own command.

pub mod link;
pub mod periph;

mod error;
mod session;

pub use error::BusError;
pub use session::{DeliveryMode, RegisterBus};
