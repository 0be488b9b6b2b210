use std::fmt;
use std::io;

use bytes::BytesMut;
use rmpv::Value;

use crate::frame::{Frame, MsgKind};

/// Everything that can go wrong turning bytes into a [`Frame`].
#[derive(Debug)]
pub enum DecodeError {
    /// The underlying `rmpv` value parser failed (truncated or corrupt data).
    MsgPack(io::Error),
    /// The top-level value was not a MessagePack array.
    NotAnArray(Value),
    /// The array had no elements at all.
    EmptyFrame,
    /// The first element was present but not an unsigned integer.
    InvalidKind(Value),
    /// The first element was a number but not one of the known message kinds.
    UnknownKind(u64),
    /// The first element named a kind this crate never produces or accepts
    /// (`NOTIFY`, `RESPONSE_CANCEL`).
    ReservedKind(MsgKind),
    /// The array was missing its call-id element, or it wasn't an integer.
    MissingCallId,
    /// `REQUEST`'s third element was neither a string nor an integer.
    InvalidMethodRef(Value),
    /// `REQUEST`'s args element was present but not an array.
    InvalidArgs(Value),
    /// `REQUEST`'s kwargs element was present but not a map.
    InvalidKwargs(Value),
    /// The array didn't have enough elements for its declared kind.
    Arity { kind: MsgKind, got: usize },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::MsgPack(e) => write!(f, "malformed MessagePack value: {e}"),
            DecodeError::NotAnArray(v) => write!(f, "frame is not an array: {v:?}"),
            DecodeError::EmptyFrame => write!(f, "frame array is empty"),
            DecodeError::InvalidKind(v) => write!(f, "frame kind is not an integer: {v:?}"),
            DecodeError::UnknownKind(k) => write!(f, "unknown frame kind: {k}"),
            DecodeError::ReservedKind(k) => write!(f, "reserved frame kind used on the wire: {k}"),
            DecodeError::MissingCallId => write!(f, "frame is missing its call id"),
            DecodeError::InvalidMethodRef(v) => {
                write!(f, "method reference is neither a string nor an integer: {v:?}")
            }
            DecodeError::InvalidArgs(v) => write!(f, "args element is not an array: {v:?}"),
            DecodeError::InvalidKwargs(v) => write!(f, "kwargs element is not a map: {v:?}"),
            DecodeError::Arity { kind, got } => {
                write!(f, "frame of kind {kind} has too few elements ({got})")
            }
        }
    }
}

impl std::error::Error for DecodeError {}

/// Incremental MessagePack frame decoder.
///
/// Feed it raw bytes as they arrive off the transport; it yields zero or
/// more complete [`Frame`]s. MessagePack values are self-delimiting, so no
/// length prefix is needed: `next_frame` just tries to parse one value from
/// the front of the buffer and, if the buffer doesn't yet hold a complete
/// value, leaves the buffer untouched and returns `Ok(None)` for the caller
/// to try again after the next `feed`.
#[derive(Default)]
pub struct FrameDecoder {
    buf: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append newly-received bytes to the internal buffer.
    pub fn feed(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Try to decode the next complete frame out of the buffer.
    ///
    /// Returns `Ok(None)` if the buffer doesn't contain a full MessagePack
    /// value yet (not an error: just keep feeding). Returns `Err` for data
    /// that can never become valid (e.g. an array that decodes to something
    /// other than a known frame shape).
    pub fn next_frame(&mut self) -> Result<Option<Frame>, DecodeError> {
        if self.buf.is_empty() {
            return Ok(None);
        }

        let mut cursor = &self.buf[..];
        let before = cursor.len();
        let value = match rmpv::decode::read_value(&mut cursor) {
            Ok(v) => v,
            Err(rmpv::decode::Error::InvalidMarkerRead(e))
            | Err(rmpv::decode::Error::InvalidDataRead(e))
                if e.kind() == io::ErrorKind::UnexpectedEof =>
            {
                return Ok(None);
            }
            Err(e) => return Err(DecodeError::MsgPack(io::Error::other(e.to_string()))),
        };
        let consumed = before - cursor.len();
        self.buf.advance_by(consumed);

        Frame::from_value(value).map(Some)
    }

    /// Drain every complete frame currently buffered.
    pub fn drain(&mut self) -> Result<Vec<Frame>, DecodeError> {
        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame()? {
            frames.push(frame);
        }
        Ok(frames)
    }
}

/// `BytesMut` doesn't expose an infallible "advance by N and drop the rest"
/// outside of `split_to`; this keeps call sites in `next_frame` readable.
trait AdvanceBy {
    fn advance_by(&mut self, n: usize);
}

impl AdvanceBy for BytesMut {
    fn advance_by(&mut self, n: usize) {
        let _ = self.split_to(n);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::MethodRef;

    #[test]
    fn decodes_one_frame_fed_whole() {
        let frame = Frame::RequestCancel { id: 5 };
        let mut decoder = FrameDecoder::new();
        decoder.feed(&frame.encode());
        assert_eq!(decoder.next_frame().unwrap(), Some(frame));
        assert_eq!(decoder.next_frame().unwrap(), None);
    }

    #[test]
    fn decodes_multiple_frames_from_one_feed() {
        let a = Frame::RequestStreamEnd { id: 1 };
        let b = Frame::ResponseStreamEnd { id: 2 };
        let mut bytes = a.encode();
        bytes.extend(b.encode());

        let mut decoder = FrameDecoder::new();
        decoder.feed(&bytes);
        assert_eq!(decoder.next_frame().unwrap(), Some(a));
        assert_eq!(decoder.next_frame().unwrap(), Some(b));
        assert_eq!(decoder.next_frame().unwrap(), None);
    }

    #[test]
    fn partial_frame_waits_for_more_bytes() {
        let frame = Frame::Request {
            id: 1,
            method: MethodRef::Name("uppercase".into()),
            args: vec![],
            kwargs: None,
        };
        let bytes = frame.encode();
        let (head, tail) = bytes.split_at(bytes.len() / 2);

        let mut decoder = FrameDecoder::new();
        decoder.feed(head);
        assert_eq!(decoder.next_frame().unwrap(), None);

        decoder.feed(tail);
        assert_eq!(decoder.next_frame().unwrap(), Some(frame));
    }

    #[test]
    fn frames_split_across_many_small_feeds() {
        let frame = Frame::Response {
            id: 42,
            err: None,
            result: Some(rmpv::Value::from("hello")),
        };
        let bytes = frame.encode();

        let mut decoder = FrameDecoder::new();
        for byte in &bytes[..bytes.len() - 1] {
            decoder.feed(std::slice::from_ref(byte));
            assert_eq!(decoder.next_frame().unwrap(), None);
        }
        decoder.feed(&bytes[bytes.len() - 1..]);
        assert_eq!(decoder.next_frame().unwrap(), Some(frame));
    }
}
