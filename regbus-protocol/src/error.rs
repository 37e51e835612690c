use std::{
    error::Error,
    fmt::Display,
    io::{self},
};

/// Errors that may occur when decoding a message from a frame or stream.
#[derive(Debug)]
pub enum DecodeError {
    IoError(io::Error),
    UnknownOpcode(u8),
    BadWordCount { max: usize, got: usize },
}

impl From<io::Error> for DecodeError {
    fn from(value: io::Error) -> Self {
        DecodeError::IoError(value)
    }
}

impl Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::IoError(error) => write!(f, "{}", error),
            DecodeError::UnknownOpcode(op) => {
                write!(f, "Received unknown opcode 0x{:02X}", op)
            }
            DecodeError::BadWordCount { max, got } => {
                write!(f, "Word count too large! Maximum is {}, but got {}", max, got)
            }
        }
    }
}

impl Error for DecodeError {}
