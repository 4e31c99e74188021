use std::io;
use thiserror::Error;
use crate::tcp::state::ConnectionState;

#[derive(Debug, PartialEq, Eq, Error)]
pub enum SegmentError {
    #[error("Buffer too small: expected {expected} bytes, found {found} bytes")]
    BufferTooSmall { expected: usize, found: usize },

    #[error("Bad data offset: {0} words")]
    BadDataOffset(u8),

    #[error("Segment larger than {max} bytes")]
    Oversized { max: usize },
}

#[derive(Error, Debug)]
pub enum StcpError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error), // Channel-level failure, fatal to the connection

    #[error("Segment error: {0}")]
    Segment(#[from] SegmentError),

    #[error("Network channel closed")]
    ChannelClosed,

    #[error("Handshake did not complete, stuck in {state}")]
    HandshakeIncomplete { state: ConnectionState },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}
