//! Protocol error types.

use thiserror::Error;

/// Errors that can occur while validating frames or marshaling fields.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame is too short to be valid.
    #[error("frame too short: expected at least {expected} bytes, got {actual}")]
    FrameTooShort {
        /// Expected minimum length.
        expected: usize,
        /// Actual length received.
        actual: usize,
    },

    /// Frame does not begin with the start marker.
    #[error("bad start marker: 0x{0:02X}")]
    BadStartMarker(u8),

    /// Frame does not carry the end marker at the declared offset.
    #[error("bad end marker: 0x{0:02X}")]
    BadEndMarker(u8),

    /// Declared body length exceeds the protocol maximum.
    #[error("body too long: maximum {max} bytes, declared {actual}")]
    BodyTooLong {
        /// Maximum allowed body length.
        max: usize,
        /// Declared body length.
        actual: usize,
    },

    /// Recomputed checksum does not match the frame's checksum field.
    #[error("checksum mismatch: expected 0x{expected:04X}, computed 0x{computed:04X}")]
    ChecksumMismatch {
        /// Checksum carried in the frame.
        expected: u16,
        /// Checksum recomputed over the received span.
        computed: u16,
    },

    /// A pull asked for more bytes than remain readable.
    #[error("channel underflow: requested {requested} bytes, {remaining} readable")]
    ChannelUnderflow {
        /// Bytes requested by the pull.
        requested: usize,
        /// Bytes still readable.
        remaining: usize,
    },

    /// A push did not fit the remaining writable span.
    ///
    /// The accumulated response has been flushed as a side effect; the
    /// pushed bytes were not retained.
    #[error("channel overflow: requested {requested} bytes, {remaining} writable")]
    ChannelOverflow {
        /// Bytes requested by the push.
        requested: usize,
        /// Bytes that were still writable.
        remaining: usize,
    },
}
