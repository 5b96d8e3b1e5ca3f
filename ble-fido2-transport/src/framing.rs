//! FIDO over BLE framing
//!
//! Splits a (command, payload) pair into frames no larger than the
//! negotiated control point length.
//!
//! Frame Format:
//! - Initial frame: CMD(1) + HLEN(1) + LLEN(1) + DATA(max - 3)
//! - Continuation frame: SEQ(1) + DATA(max - 1)
//!
//! Initial frames always have the high bit of the first byte set (every
//! command value is >= 0x80); continuation frames carry a sequence number
//! in 0..=127 with the high bit clear.
//!
//! Spec: <https://fidoalliance.org/specs/fido-v2.2-rd-20230321/fido-client-to-authenticator-protocol-v2.2-rd-20230321.html#ble-framing>

use crate::error::{Error, Result};

/// Header bytes in front of the payload of an initial frame
pub const INIT_HEADER_LEN: usize = 3;

/// Header bytes in front of the payload of a continuation frame
pub const CONT_HEADER_LEN: usize = 1;

/// Smallest maximum frame size that still fits an initial frame header
pub const MIN_FRAME_SIZE: usize = INIT_HEADER_LEN;

/// Highest continuation sequence number
pub const MAX_SEQ: u8 = 0x7F;

/// Maximum payload size expressible in the 16-bit length field
pub const MAX_MESSAGE_SIZE: usize = u16::MAX as usize;

/// FIDO BLE commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BleCommand {
    /// Echo request, answered with the same payload
    Ping = 0x81,

    /// Authenticator is still processing (authenticator to client only)
    KeepAlive = 0x82,

    /// Encapsulated CTAP message
    Msg = 0x83,

    /// Abort the outstanding request
    Cancel = 0xBE,

    /// Error response carrying a 2-byte error code
    Error = 0xBF,
}

impl BleCommand {
    /// Convert from the raw command byte
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x81 => Some(BleCommand::Ping),
            0x82 => Some(BleCommand::KeepAlive),
            0x83 => Some(BleCommand::Msg),
            0xBE => Some(BleCommand::Cancel),
            0xBF => Some(BleCommand::Error),
            _ => None,
        }
    }

    /// Convert to the raw command byte
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

/// FIDO BLE error codes, sent in the payload of an Error frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorCode {
    /// The command in the request is unknown or invalid
    InvalidCmd = 0x01,

    /// The parameters of the command are invalid or missing
    InvalidPar = 0x02,

    /// The length of the request is invalid
    InvalidLen = 0x03,

    /// The sequence number is invalid
    InvalidSeq = 0x04,

    /// The request timed out
    ReqTimeout = 0x05,

    /// The device is busy and can't accept commands at this time
    Busy = 0x06,

    /// Other, unspecified error
    Other = 0x7F,
}

impl ErrorCode {
    /// Convert from the low byte of the wire value
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(ErrorCode::InvalidCmd),
            0x02 => Some(ErrorCode::InvalidPar),
            0x03 => Some(ErrorCode::InvalidLen),
            0x04 => Some(ErrorCode::InvalidSeq),
            0x05 => Some(ErrorCode::ReqTimeout),
            0x06 => Some(ErrorCode::Busy),
            0x7F => Some(ErrorCode::Other),
            _ => None,
        }
    }

    /// Convert to the raw error code
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Payload of the Error frame: the code as a big-endian u16
    pub fn to_payload(self) -> [u8; 2] {
        u16::from(self.to_u8()).to_be_bytes()
    }
}

/// A single BLE frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// First frame of a message
    Initial {
        command: BleCommand,
        /// Total payload length across all frames of the message
        length: u16,
        data: Vec<u8>,
    },

    /// Follow-up frame of a message
    Continuation { seq: u8, data: Vec<u8> },
}

impl Frame {
    /// Serialize the frame for a control point write or status notification
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Frame::Initial {
                command,
                length,
                data,
            } => {
                let mut bytes = Vec::with_capacity(INIT_HEADER_LEN + data.len());
                bytes.push(command.to_u8());
                bytes.extend_from_slice(&length.to_be_bytes());
                bytes.extend_from_slice(data);
                bytes
            }
            Frame::Continuation { seq, data } => {
                let mut bytes = Vec::with_capacity(CONT_HEADER_LEN + data.len());
                bytes.push(*seq);
                bytes.extend_from_slice(data);
                bytes
            }
        }
    }

    /// Payload bytes carried by this frame
    pub fn data(&self) -> &[u8] {
        match self {
            Frame::Initial { data, .. } | Frame::Continuation { data, .. } => data,
        }
    }
}

/// Split a message into an initial frame and its continuation frames
///
/// The initial frame holds up to `max_frame_size - 3` payload bytes, each
/// continuation up to `max_frame_size - 1`. With a maximum below the
/// initial header size the initial frame carries the header alone.
///
/// # Examples
///
/// ```
/// use ble_fido2_transport::framing::{split, BleCommand, Frame};
///
/// let (initial, rest) = split(BleCommand::Msg, &[0x04], 20).unwrap();
/// assert_eq!(initial.to_bytes(), vec![0x83, 0x00, 0x01, 0x04]);
/// assert!(rest.is_empty());
/// ```
pub fn split(
    command: BleCommand,
    payload: &[u8],
    max_frame_size: usize,
) -> Result<(Frame, Vec<Frame>)> {
    if max_frame_size < MIN_FRAME_SIZE {
        return Err(Error::InvalidFrameSize(max_frame_size));
    }
    if payload.len() > MAX_MESSAGE_SIZE {
        return Err(Error::MessageTooLarge);
    }

    let init_capacity = max_frame_size - INIT_HEADER_LEN;
    let cont_capacity = max_frame_size - CONT_HEADER_LEN;

    let init_len = payload.len().min(init_capacity);
    let initial = Frame::Initial {
        command,
        length: payload.len() as u16,
        data: payload[..init_len].to_vec(),
    };

    let mut continuations = Vec::new();
    for (index, chunk) in payload[init_len..].chunks(cont_capacity).enumerate() {
        if index > MAX_SEQ as usize {
            return Err(Error::MessageTooLarge);
        }
        continuations.push(Frame::Continuation {
            seq: index as u8,
            data: chunk.to_vec(),
        });
    }

    Ok((initial, continuations))
}

/// Split a message and serialize every frame, initial frame first
pub fn split_to_bytes(
    command: BleCommand,
    payload: &[u8],
    max_frame_size: usize,
) -> Result<Vec<Vec<u8>>> {
    let (initial, continuations) = split(command, payload, max_frame_size)?;
    let mut frames = Vec::with_capacity(1 + continuations.len());
    frames.push(initial.to_bytes());
    frames.extend(continuations.iter().map(Frame::to_bytes));
    Ok(frames)
}
