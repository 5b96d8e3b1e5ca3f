//! Receiver-side frame reassembly
//!
//! A [`FrameBuffer`] collects control point writes until the declared
//! payload length is reached. It holds at most one message at a time and is
//! cleared after every terminal event, so a protocol error never leaves
//! stale bytes behind for the next message.

use crate::error::Error;
use crate::framing::{BleCommand, INIT_HEADER_LEN};

/// Outcome of feeding one fragment into a [`FrameBuffer`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReassemblyResult {
    /// More continuation frames are expected
    InProgress,

    /// A full message has been reassembled
    Complete(BleCommand, Vec<u8>),

    /// The fragment violated the framing rules
    Error(Error),
}

#[derive(Debug)]
struct PendingMessage {
    command: BleCommand,
    declared_len: usize,
    data: Vec<u8>,
    next_seq: u8,
}

/// Reassembly state for one connection
#[derive(Debug, Default)]
pub struct FrameBuffer {
    pending: Option<PendingMessage>,
}

impl FrameBuffer {
    /// Create an empty frame buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a message is partially assembled
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Drop any partially assembled message
    pub fn clear(&mut self) {
        self.pending = None;
    }

    /// Feed one raw frame
    pub fn put_fragment(&mut self, fragment: &[u8]) -> ReassemblyResult {
        let result = self.accept(fragment);
        if !matches!(result, ReassemblyResult::InProgress) {
            self.clear();
        }
        result
    }

    fn accept(&mut self, fragment: &[u8]) -> ReassemblyResult {
        let Some(&first) = fragment.first() else {
            return ReassemblyResult::Error(Error::BadLength);
        };

        if first & 0x80 != 0 {
            self.accept_initial(first, fragment)
        } else {
            self.accept_continuation(first, &fragment[1..])
        }
    }

    fn accept_initial(&mut self, first: u8, fragment: &[u8]) -> ReassemblyResult {
        if self.pending.is_some() {
            tracing::debug!("initial frame while a message is pending");
            return ReassemblyResult::Error(Error::UnexpectedFrame);
        }
        if fragment.len() < INIT_HEADER_LEN {
            return ReassemblyResult::Error(Error::BadLength);
        }
        let Some(command) = BleCommand::from_u8(first) else {
            return ReassemblyResult::Error(Error::UnknownCommand(first));
        };

        let declared_len = u16::from_be_bytes([fragment[1], fragment[2]]) as usize;
        let data = &fragment[INIT_HEADER_LEN..];

        tracing::trace!(?command, declared_len, received = data.len(), "initial frame");

        self.pending = Some(PendingMessage {
            command,
            declared_len,
            data: Vec::with_capacity(declared_len),
            next_seq: 0,
        });
        self.append(data)
    }

    fn accept_continuation(&mut self, seq: u8, data: &[u8]) -> ReassemblyResult {
        let Some(pending) = self.pending.as_mut() else {
            tracing::debug!(seq, "continuation frame without initial frame");
            return ReassemblyResult::Error(Error::UnexpectedFrame);
        };

        // next_seq reaches 0x80 once 0x7F has been consumed, so a wrapped
        // counter can never match
        if seq != pending.next_seq {
            tracing::debug!(seq, expected = pending.next_seq, "out of sequence frame");
            return ReassemblyResult::Error(Error::BadSequence);
        }
        pending.next_seq += 1;

        tracing::trace!(seq, received = data.len(), "continuation frame");
        self.append(data)
    }

    fn append(&mut self, data: &[u8]) -> ReassemblyResult {
        let Some(pending) = self.pending.as_mut() else {
            return ReassemblyResult::Error(Error::UnexpectedFrame);
        };

        pending.data.extend_from_slice(data);

        if pending.data.len() > pending.declared_len {
            return ReassemblyResult::Error(Error::BadLength);
        }
        if pending.data.len() < pending.declared_len {
            return ReassemblyResult::InProgress;
        }

        match self.pending.take() {
            Some(message) => ReassemblyResult::Complete(message.command, message.data),
            None => ReassemblyResult::Error(Error::UnexpectedFrame),
        }
    }
}
