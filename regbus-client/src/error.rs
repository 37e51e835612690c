use std::{error::Error, fmt::Display, io};

use regbus_protocol::MAX_WORDS;

/// Errors reported by register-bus operations.
///
/// Every failure is local to the call that observed it; the session remains
/// usable afterwards.
#[derive(Debug)]
pub enum BusError {
    /// No matching reply arrived within the caller's window. Retryable; the
    /// command may or may not have reached the host.
    Timeout,
    /// A matching reply arrived with a non-zero status byte: the command
    /// reached the host and was rejected by the addressed device.
    Nack,
    /// A matching reply arrived but had the wrong shape (opcode echo or
    /// word count).
    Malformed,
    /// The session is fire-and-forget; the command was sent but its reply
    /// is intentionally discarded, so no result can be returned.
    WriteOnly,
    /// The link shut down while waiting for the reply.
    LinkClosed,
    /// Word count outside the permitted range; nothing was transmitted.
    BadWordCount { got: usize },
    /// Register address above the per-device limit; nothing was transmitted.
    BadRegister(u16),
    /// The transport failed to accept the command.
    Io(io::Error),
}

impl From<io::Error> for BusError {
    fn from(value: io::Error) -> Self {
        BusError::Io(value)
    }
}

impl Display for BusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BusError::Timeout => write!(f, "No reply from remote host"),
            BusError::Nack => write!(f, "Remote device reported an error"),
            BusError::Malformed => write!(f, "Reply has unexpected shape"),
            BusError::WriteOnly => {
                write!(f, "Session is fire-and-forget, reply discarded")
            }
            BusError::LinkClosed => write!(f, "Link closed while waiting for reply"),
            BusError::BadWordCount { got } => {
                write!(f, "Word count must be 1..={}, but got {}", MAX_WORDS, got)
            }
            BusError::BadRegister(reg) => {
                write!(f, "Register address {} out of range", reg)
            }
            BusError::Io(error) => write!(f, "{}", error),
        }
    }
}

impl Error for BusError {}
