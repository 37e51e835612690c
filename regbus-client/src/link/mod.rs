//! Link adapters between the bus session and the physical medium.
//!
//! A link accepts fully-assembled message payloads for transmission and
//! runs its own inbound loop on a background thread, delivering received
//! payloads through the bounded channel handed out at construction. The
//! session never touches sockets directly, and the inbound thread never
//! calls back into session code.

use std::io;
use std::time::Duration;

use regbus_protocol::fcs::FcsPolicy;

mod datagram;
mod stream;

pub use datagram::UdpLink;
pub use stream::StreamLink;

/// One message payload, framing and integrity layers already removed.
pub type InboundFrame = Vec<u8>;

/// Outbound interface shared by all link adapters.
pub trait Link: Send + Sync {
    /// Queue a payload for transmission by the background writer. Queued
    /// payloads may be bundled into a single write on the wire.
    fn send(&self, payload: &[u8]) -> io::Result<()>;

    /// Transmit a payload directly, then pause briefly so the remote host
    /// has bus-turnaround time before the next transmission.
    fn send_blocking(&self, payload: &[u8]) -> io::Result<()>;

    /// Stop the background threads and close the medium. Dropping the link
    /// does the same; any session waiter is released.
    fn close(&self);
}

/// Tuning knobs shared by the link adapters.
#[derive(Clone, Debug)]
pub struct LinkConfig {
    /// Frame-check policy for inbound frames (stream links only).
    pub fcs: FcsPolicy,
    /// Zero-pad outbound frames to the Ethernet minimum (stream links only).
    pub zeropad: bool,
    /// Socket read timeout; bounds how long the inbound thread sleeps
    /// between polls without busy-waiting.
    pub read_timeout: Duration,
    /// Writer-thread poll interval while the transmit queue is empty.
    pub idle_wait: Duration,
    /// Pause after a blocking send, bounding bus-turnaround time.
    pub turnaround: Duration,
    /// Depth of the bounded inbound channel. Overflow drops frames with a
    /// warning; a command/response bus should never come close.
    pub queue_depth: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            fcs: FcsPolicy::Drop,
            zeropad: false,
            read_timeout: Duration::from_millis(10),
            idle_wait: Duration::from_millis(10),
            turnaround: Duration::from_micros(100),
            queue_depth: 32,
        }
    }
}
