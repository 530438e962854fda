//! Frame encoding, validation, and stream deframing.
//!
//! Every transport carries the same envelope:
//!
//! ```text
//! +-------+----------+----------+-------+--------------------+------+
//! | start | checksum | body_len | flags | body[0..body_len]  | end  |
//! | 0xA5  | u16 LE   | u16 LE   | u8    | cmd id + payload   | 0x5A |
//! +-------+----------+----------+-------+--------------------+------+
//! ```
//!
//! The checksum is the wrapping 16-bit sum of every byte between the
//! checksum field and the end marker, i.e. the length field, the flags
//! byte, and the body. Outbound frames recompute it over exactly the
//! bytes actually written.

use bytes::{Buf, BytesMut};

use crate::constants::*;
use crate::error::ProtocolError;

// ============================================================================
// Checksum
// ============================================================================

/// Wrapping 16-bit additive checksum over `bytes`.
pub fn additive_checksum(bytes: &[u8]) -> u16 {
    bytes
        .iter()
        .fold(0u16, |acc, &b| acc.wrapping_add(b as u16))
}

// ============================================================================
// Validation
// ============================================================================

/// A validated view over an inbound frame's mutable fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameView<'a> {
    /// The flags byte as received.
    pub flags: u8,
    /// The body: command id followed by the payload.
    pub body: &'a [u8],
}

impl<'a> FrameView<'a> {
    /// The direction bits of the flags byte.
    pub fn direction(&self) -> u8 {
        self.flags & FLAG_DIRECTION_MASK
    }

    /// Whether the host asked for a reply even on side-effect commands.
    pub fn reply_requested(&self) -> bool {
        self.flags & FLAG_REPLY_REQUESTED != 0
    }

    /// The command id, if the body is non-empty.
    pub fn command_id(&self) -> Option<u8> {
        self.body.first().copied()
    }
}

/// Validate an inbound frame: markers, declared length, checksum.
///
/// Checksum is recomputed over the received span between the checksum
/// field and the end marker and compared against the frame's field.
pub fn validate_frame(raw: &[u8]) -> Result<FrameView<'_>, ProtocolError> {
    if raw.len() < FRAME_OVERHEAD {
        return Err(ProtocolError::FrameTooShort {
            expected: FRAME_OVERHEAD,
            actual: raw.len(),
        });
    }
    if raw[0] != START_MARKER {
        return Err(ProtocolError::BadStartMarker(raw[0]));
    }

    let expected = u16::from_le_bytes([raw[CHECKSUM_OFFSET], raw[CHECKSUM_OFFSET + 1]]);
    let body_len = u16::from_le_bytes([raw[LENGTH_OFFSET], raw[LENGTH_OFFSET + 1]]) as usize;
    if body_len > MAX_BODY {
        return Err(ProtocolError::BodyTooLong {
            max: MAX_BODY,
            actual: body_len,
        });
    }
    let total = FRAME_OVERHEAD + body_len;
    if raw.len() < total {
        return Err(ProtocolError::FrameTooShort {
            expected: total,
            actual: raw.len(),
        });
    }
    let end = raw[BODY_OFFSET + body_len];
    if end != END_MARKER {
        return Err(ProtocolError::BadEndMarker(end));
    }

    let computed = additive_checksum(&raw[LENGTH_OFFSET..BODY_OFFSET + body_len]);
    if computed != expected {
        return Err(ProtocolError::ChecksumMismatch { expected, computed });
    }

    Ok(FrameView {
        flags: raw[FLAGS_OFFSET],
        body: &raw[BODY_OFFSET..BODY_OFFSET + body_len],
    })
}

// ============================================================================
// Encoding
// ============================================================================

/// Encode a frame around `body`, computing length and checksum.
///
/// `body` is the command id followed by the payload; it may be empty for
/// synthesized error responses.
pub fn encode_frame(flags: u8, body: &[u8]) -> Vec<u8> {
    debug_assert!(body.len() <= MAX_BODY);
    let mut buf = Vec::with_capacity(FRAME_OVERHEAD + body.len());
    buf.push(START_MARKER);
    buf.extend_from_slice(&[0, 0]); // checksum backfilled below
    buf.extend_from_slice(&(body.len() as u16).to_le_bytes());
    buf.push(flags);
    buf.extend_from_slice(body);
    buf.push(END_MARKER);

    let checksum = additive_checksum(&buf[LENGTH_OFFSET..BODY_OFFSET + body.len()]);
    buf[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 2].copy_from_slice(&checksum.to_le_bytes());
    buf
}

// ============================================================================
// Stream Deframing
// ============================================================================

/// Accumulates a byte stream and carves complete frames out of it.
///
/// Transports deliver arbitrary chunks; the deframer scans for the start
/// marker (discarding preceding garbage), waits for the declared length,
/// and hands complete raw frames to the caller for validation.
#[derive(Debug, Default)]
pub struct StreamDeframer {
    buffer: BytesMut,
}

impl StreamDeframer {
    /// Create an empty deframer.
    pub fn new() -> Self {
        StreamDeframer {
            buffer: BytesMut::with_capacity(MAX_FRAME_SIZE),
        }
    }

    /// Append received bytes.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to carve the next complete frame off the stream.
    ///
    /// Returns the raw frame bytes (still unvalidated) or `None` if more
    /// data is needed. Garbage before the start marker and frames with an
    /// impossible declared length are skipped.
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        loop {
            // Scan to the next start marker.
            while !self.buffer.is_empty() && self.buffer[0] != START_MARKER {
                self.buffer.advance(1);
            }
            if self.buffer.len() < BODY_OFFSET {
                return None;
            }

            let body_len =
                u16::from_le_bytes([self.buffer[LENGTH_OFFSET], self.buffer[LENGTH_OFFSET + 1]])
                    as usize;
            if body_len > MAX_BODY {
                // Not a real header; resync past this marker byte.
                self.buffer.advance(1);
                continue;
            }

            let total = FRAME_OVERHEAD + body_len;
            if self.buffer.len() < total {
                return None;
            }

            return Some(self.buffer.split_to(total).to_vec());
        }
    }

    /// Number of buffered bytes.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Discard all buffered bytes.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_round_trip() {
        let body = [0x11u8, 1, 2, 3, 250, 251];
        let frame = encode_frame(DIR_POLL, &body);

        // The checksum field equals the additive sum of the finalized span.
        let field = u16::from_le_bytes([frame[CHECKSUM_OFFSET], frame[CHECKSUM_OFFSET + 1]]);
        let sum = additive_checksum(&frame[LENGTH_OFFSET..BODY_OFFSET + body.len()]);
        assert_eq!(field, sum);

        // Re-validating the frame succeeds and exposes the same body.
        let view = validate_frame(&frame).expect("frame should validate");
        assert_eq!(view.body, &body);
        assert_eq!(view.direction(), DIR_POLL);
    }

    #[test]
    fn empty_body_frame_validates() {
        let frame = encode_frame(RC_ERR << FLAG_RESPONSE_SHIFT, &[]);
        let view = validate_frame(&frame).expect("empty frame should validate");
        assert!(view.body.is_empty());
        assert_eq!(view.command_id(), None);
    }

    #[test]
    fn flipped_payload_byte_fails_checksum() {
        let mut frame = encode_frame(DIR_REQUEST, &[0x11, 42, 43]);
        frame[BODY_OFFSET + 1] ^= 0x40;
        match validate_frame(&frame) {
            Err(ProtocolError::ChecksumMismatch { .. }) => {}
            other => panic!("expected checksum mismatch, got {:?}", other),
        }
    }

    #[test]
    fn bad_markers_rejected() {
        let mut frame = encode_frame(DIR_REQUEST, &[0x11]);
        frame[0] = 0x00;
        assert!(matches!(
            validate_frame(&frame),
            Err(ProtocolError::BadStartMarker(0))
        ));

        let mut frame = encode_frame(DIR_REQUEST, &[0x11]);
        let last = frame.len() - 1;
        frame[last] = 0xFF;
        assert!(matches!(
            validate_frame(&frame),
            Err(ProtocolError::BadEndMarker(0xFF))
        ));
    }

    #[test]
    fn deframer_skips_garbage_and_splits_frames() {
        let mut deframer = StreamDeframer::new();
        let frame_a = encode_frame(DIR_REQUEST, &[0x11, 1]);
        let frame_b = encode_frame(DIR_POLL, &[0x12]);

        deframer.push(&[0x00, 0x13, 0x37]);
        deframer.push(&frame_a);
        deframer.push(&frame_b[..3]);
        assert_eq!(deframer.next_frame(), Some(frame_a.clone()));
        assert_eq!(deframer.next_frame(), None);

        deframer.push(&frame_b[3..]);
        assert_eq!(deframer.next_frame(), Some(frame_b));
        assert_eq!(deframer.next_frame(), None);
    }

    #[test]
    fn deframer_resyncs_on_impossible_length() {
        let mut deframer = StreamDeframer::new();
        // A start marker followed by a hopeless length field.
        deframer.push(&[START_MARKER, 0xFF, 0xFF, 0xFF, 0xFF, 0x00]);
        let frame = encode_frame(DIR_POLL, &[0x02]);
        deframer.push(&frame);
        assert_eq!(deframer.next_frame(), Some(frame));
    }
}
