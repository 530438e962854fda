//! The marshaling channel.
//!
//! Command handlers never touch frames or transports directly. During a
//! dispatch they are handed a [`MarshalChannel`]: a bounded byte cursor
//! over the frame body that pulls request parameters and pushes response
//! fields. Both cursors start just past the command id; the same buffer
//! serves the request and the response, so handlers pull every parameter
//! before pushing results.
//!
//! A push that does not fit the remaining writable span flushes the
//! accumulated response through the dispatch sink and fails the call.
//! The pushed bytes are not retained and the channel does not resume a
//! straddled multi-field push; callers that keep writing after a forced
//! flush must retry the failed field themselves.

use crate::constants::*;
use crate::error::ProtocolError;

/// Receiver for response frames emitted during a dispatch.
///
/// The command port supplies a sink that finalizes length/checksum/framing
/// and hands the span to the transport's raw write primitive.
pub trait FrameSink {
    /// Emit a response body (command id + accumulated payload).
    fn emit(&mut self, flags: u8, body: &[u8]);
}

/// Pull/push byte cursor over one frame body.
pub struct MarshalChannel<'a> {
    /// Scratch body buffer; `body[0]` is the command id.
    body: &'a mut [u8],
    /// Declared inbound body length (command id included).
    read_limit: usize,
    read_pos: usize,
    write_pos: usize,
    bytes_written: usize,
    /// Flags used for forced flushes mid-dispatch.
    response_flags: u8,
    sink: &'a mut dyn FrameSink,
}

impl<'a> MarshalChannel<'a> {
    /// Wrap a frame body for one dispatch.
    ///
    /// `declared_len` is the inbound body length from the frame header;
    /// both cursors start just past the command id.
    pub fn new(
        body: &'a mut [u8],
        declared_len: usize,
        response_flags: u8,
        sink: &'a mut dyn FrameSink,
    ) -> Self {
        debug_assert!(declared_len >= 1 && declared_len <= body.len());
        MarshalChannel {
            body,
            read_limit: declared_len,
            read_pos: 1,
            write_pos: 1,
            bytes_written: 0,
            response_flags,
            sink,
        }
    }

    /// The command id this dispatch was keyed on.
    pub fn command_id(&self) -> u8 {
        self.body[0]
    }

    /// Request bytes still readable.
    pub fn remaining_readable(&self) -> usize {
        self.read_limit.saturating_sub(self.read_pos)
    }

    /// Response bytes still writable.
    pub fn remaining_writable(&self) -> usize {
        self.body.len() - self.write_pos
    }

    /// Response payload bytes accumulated so far.
    pub fn bytes_written(&self) -> usize {
        self.bytes_written
    }

    // ------------------------------------------------------------------
    // Pull
    // ------------------------------------------------------------------

    /// Copy the next `out.len()` request bytes into `out`.
    ///
    /// Fails without consuming anything if fewer bytes remain.
    pub fn pull(&mut self, out: &mut [u8]) -> Result<(), ProtocolError> {
        let n = out.len();
        if self.remaining_readable() < n {
            return Err(ProtocolError::ChannelUnderflow {
                requested: n,
                remaining: self.remaining_readable(),
            });
        }
        out.copy_from_slice(&self.body[self.read_pos..self.read_pos + n]);
        self.read_pos += n;
        Ok(())
    }

    /// Pull `n` bytes into a fresh buffer.
    pub fn pull_vec(&mut self, n: usize) -> Result<Vec<u8>, ProtocolError> {
        let mut buf = vec![0u8; n];
        self.pull(&mut buf)?;
        Ok(buf)
    }

    /// Pull a `u8`.
    pub fn pull_u8(&mut self) -> Result<u8, ProtocolError> {
        let mut buf = [0u8; 1];
        self.pull(&mut buf)?;
        Ok(buf[0])
    }

    /// Pull a little-endian `u16`.
    pub fn pull_u16(&mut self) -> Result<u16, ProtocolError> {
        let mut buf = [0u8; 2];
        self.pull(&mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    /// Pull a little-endian `u32`.
    pub fn pull_u32(&mut self) -> Result<u32, ProtocolError> {
        let mut buf = [0u8; 4];
        self.pull(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    /// Pull a little-endian `i16`.
    pub fn pull_i16(&mut self) -> Result<i16, ProtocolError> {
        let mut buf = [0u8; 2];
        self.pull(&mut buf)?;
        Ok(i16::from_le_bytes(buf))
    }

    /// Pull a little-endian `f32`.
    pub fn pull_f32(&mut self) -> Result<f32, ProtocolError> {
        let mut buf = [0u8; 4];
        self.pull(&mut buf)?;
        Ok(f32::from_le_bytes(buf))
    }

    // ------------------------------------------------------------------
    // Push
    // ------------------------------------------------------------------

    /// Append `bytes` to the response payload.
    ///
    /// If the bytes do not fit, the accumulated response is flushed
    /// through the sink, the write cursor resets, and the call fails with
    /// [`ProtocolError::ChannelOverflow`]. The bytes of the failed call
    /// are not retained.
    pub fn push(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        let n = bytes.len();
        let remaining = self.remaining_writable();
        if remaining < n {
            let flushed = 1 + self.bytes_written;
            self.sink.emit(self.response_flags, &self.body[..flushed]);
            self.write_pos = 1;
            self.bytes_written = 0;
            return Err(ProtocolError::ChannelOverflow {
                requested: n,
                remaining,
            });
        }
        self.body[self.write_pos..self.write_pos + n].copy_from_slice(bytes);
        self.write_pos += n;
        self.bytes_written += n;
        Ok(())
    }

    /// Push a `u8`.
    pub fn push_u8(&mut self, value: u8) -> Result<(), ProtocolError> {
        self.push(&[value])
    }

    /// Push a little-endian `u16`.
    pub fn push_u16(&mut self, value: u16) -> Result<(), ProtocolError> {
        self.push(&value.to_le_bytes())
    }

    /// Push a little-endian `u32`.
    pub fn push_u32(&mut self, value: u32) -> Result<(), ProtocolError> {
        self.push(&value.to_le_bytes())
    }

    /// Push a little-endian `i16`.
    pub fn push_i16(&mut self, value: i16) -> Result<(), ProtocolError> {
        self.push(&value.to_le_bytes())
    }

    /// Push a little-endian `f32`.
    pub fn push_f32(&mut self, value: f32) -> Result<(), ProtocolError> {
        self.push(&value.to_le_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Sink that records every emitted body.
    #[derive(Default)]
    struct RecordingSink {
        emitted: Vec<(u8, Vec<u8>)>,
    }

    impl FrameSink for RecordingSink {
        fn emit(&mut self, flags: u8, body: &[u8]) {
            self.emitted.push((flags, body.to_vec()));
        }
    }

    fn body_with(cmd: u8, payload: &[u8]) -> [u8; MAX_BODY] {
        let mut body = [0u8; MAX_BODY];
        body[0] = cmd;
        body[1..1 + payload.len()].copy_from_slice(payload);
        body
    }

    #[test]
    fn pull_typed_fields_in_order() {
        let mut sink = RecordingSink::default();
        let mut body = body_with(0x11, &[7, 0x34, 0x12, 1, 2, 3, 4]);
        let mut chan = MarshalChannel::new(&mut body, 8, DIR_POLL, &mut sink);

        assert_eq!(chan.command_id(), 0x11);
        assert_eq!(chan.pull_u8().unwrap(), 7);
        assert_eq!(chan.pull_u16().unwrap(), 0x1234);
        assert_eq!(chan.pull_u32().unwrap(), 0x04030201);
        assert_eq!(chan.remaining_readable(), 0);
    }

    #[test]
    fn pull_underflow_leaves_cursor_unchanged() {
        let mut sink = RecordingSink::default();
        let mut body = body_with(0x11, &[1, 2]);
        let mut chan = MarshalChannel::new(&mut body, 3, DIR_POLL, &mut sink);

        assert!(matches!(
            chan.pull_u32(),
            Err(ProtocolError::ChannelUnderflow {
                requested: 4,
                remaining: 2
            })
        ));
        // The failed pull consumed nothing.
        assert_eq!(chan.pull_u16().unwrap(), 0x0201);
    }

    #[test]
    fn push_accumulates_after_command_id() {
        let mut sink = RecordingSink::default();
        let mut body = body_with(0x02, &[]);
        let mut chan = MarshalChannel::new(&mut body, 1, DIR_POLL, &mut sink);

        chan.push_u32(0xAABBCCDD).unwrap();
        chan.push_u8(9).unwrap();
        assert_eq!(chan.bytes_written(), 5);
        drop(chan);

        assert_eq!(&body[..6], &[0x02, 0xDD, 0xCC, 0xBB, 0xAA, 9]);
        assert!(sink.emitted.is_empty());
    }

    #[test]
    fn push_overflow_flushes_and_drops() {
        let mut sink = RecordingSink::default();
        let mut body = body_with(0x23, &[]);
        let mut chan = MarshalChannel::new(&mut body, 1, DIR_POLL, &mut sink);

        let fill = vec![0x55u8; MAX_PAYLOAD - 2];
        chan.push(&fill).unwrap();

        // Does not fit: the accumulated response is flushed, the call
        // fails, and the overflowing bytes appear nowhere.
        let err = chan.push(&[1, 2, 3, 4]).unwrap_err();
        assert!(matches!(err, ProtocolError::ChannelOverflow { .. }));
        assert_eq!(chan.bytes_written(), 0);

        // The channel accepts fresh pushes into the reset buffer; the
        // dropped field is not resumed.
        chan.push_u8(0xEE).unwrap();
        assert_eq!(chan.bytes_written(), 1);
        drop(chan);

        assert_eq!(sink.emitted.len(), 1);
        assert_eq!(sink.emitted[0].1.len(), 1 + fill.len());
    }
}
