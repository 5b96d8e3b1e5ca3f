//! Transport layer error types

use crate::framing::ErrorCode;

use std::fmt;

/// Transport layer result type
pub type Result<T> = std::result::Result<T, Error>;

/// Transport layer errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Reassembled length does not match the declared length, or a frame is
    /// too short to carry its header
    BadLength,

    /// Continuation frame out of order, or the sequence number wrapped
    BadSequence,

    /// Continuation without a pending initial frame, or an initial frame
    /// while a message is still pending
    UnexpectedFrame,

    /// Initial frame carries a command byte this transport does not know
    UnknownCommand(u8),

    /// Payload does not fit in one framed message
    MessageTooLarge,

    /// Maximum frame size too small to make progress
    InvalidFrameSize(usize),

    /// Request from a device that does not hold the service lock
    NotBound,

    /// Characteristic does not support the requested access
    NotPermitted,

    /// Service revision bitfield value not supported
    UnsupportedRevision,

    /// Service already closed
    Closed,
}

impl Error {
    /// Error code carried by the Error frame reporting this failure
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Error::BadLength | Error::MessageTooLarge => ErrorCode::InvalidLen,
            Error::BadSequence | Error::UnexpectedFrame => ErrorCode::InvalidSeq,
            Error::UnknownCommand(_) => ErrorCode::InvalidCmd,
            _ => ErrorCode::Other,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BadLength => write!(f, "Frame length mismatch"),
            Error::BadSequence => write!(f, "Invalid sequence number"),
            Error::UnexpectedFrame => write!(f, "Unexpected frame"),
            Error::UnknownCommand(cmd) => write!(f, "Unknown command: 0x{:02X}", cmd),
            Error::MessageTooLarge => write!(f, "Message too large"),
            Error::InvalidFrameSize(size) => write!(f, "Invalid maximum frame size: {}", size),
            Error::NotBound => write!(f, "Device does not hold the service lock"),
            Error::NotPermitted => write!(f, "Operation not permitted on characteristic"),
            Error::UnsupportedRevision => write!(f, "Unsupported service revision"),
            Error::Closed => write!(f, "Service closed"),
        }
    }
}

impl std::error::Error for Error {}
