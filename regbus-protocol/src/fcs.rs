//! Frame check sequence for byte-stream transports.
//!
//! The check is the standard reflected CRC-32 (polynomial 0xEDB88320, the
//! Ethernet FCS), appended little-endian after the payload. Datagram
//! transports skip this layer entirely since their network stack already
//! guarantees frame integrity.

use std::fmt::Display;

/// Size of the appended check, in bytes.
pub const FCS_LEN: usize = 4;

/// Minimum payload length (before the check) when zero-padding is enabled,
/// chosen so padded frames meet the 64-byte Ethernet minimum.
pub const MIN_FRAME_DATA: usize = 60;

/// What to do with an inbound frame whose check fails.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum FcsPolicy {
    /// Verify and silently drop frames that fail.
    #[default]
    Drop,
    /// Verify, log a warning on mismatch, but deliver the frame anyway.
    /// Useful for diagnostics and bridging scenarios.
    Warn,
    /// Do not verify; forward frames verbatim, check still attached.
    Off,
}

/// Compute the check value for the given payload.
pub fn crc32(payload: &[u8]) -> u32 {
    crc32fast::hash(payload)
}

/// Append the frame check to `payload`, zero-padding first to
/// [MIN_FRAME_DATA] bytes if requested. Padding is always applied before
/// the check is computed, so padded frames verify as-is on the remote end.
pub fn append_fcs(mut payload: Vec<u8>, zeropad: bool) -> Vec<u8> {
    if zeropad && payload.len() < MIN_FRAME_DATA {
        payload.resize(MIN_FRAME_DATA, 0);
    }
    let crc = crc32(&payload);
    payload.extend_from_slice(&crc.to_le_bytes());
    payload
}

/// Mismatch report from [verify_fcs].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FcsError {
    /// Frame shorter than the check itself.
    TooShort(usize),
    /// Check did not match the frame contents.
    Mismatch { received: u32, computed: u32 },
}

impl Display for FcsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FcsError::TooShort(len) => write!(f, "Frame too short for FCS ({} bytes)", len),
            FcsError::Mismatch { received, computed } => write!(
                f,
                "FCS mismatch, got 0x{:08X} expected 0x{:08X}",
                received, computed
            ),
        }
    }
}

impl std::error::Error for FcsError {}

/// Split the trailing check off `frame` and compare it against the
/// recomputed value. Returns the payload slice on success.
pub fn verify_fcs(frame: &[u8]) -> Result<&[u8], FcsError> {
    if frame.len() < FCS_LEN {
        return Err(FcsError::TooShort(frame.len()));
    }
    let (payload, check) = frame.split_at(frame.len() - FCS_LEN);
    let received = u32::from_le_bytes(check.try_into().unwrap());
    let computed = crc32(payload);
    if received == computed {
        Ok(payload)
    } else {
        Err(FcsError::Mismatch { received, computed })
    }
}
