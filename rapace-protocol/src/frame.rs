use std::collections::BTreeMap;
use std::fmt;

use rmpv::Value;

use crate::codec::DecodeError;
use crate::CallId;

/// Stable wire values for the first element of every application frame.
///
/// `Notify` and `ResponseCancel` are reserved by the protocol but never
/// produced or consumed by this crate.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MsgKind {
    Notify = 1,
    Request = 2,
    Response = 3,
    RequestStreamChunk = 4,
    ResponseStreamChunk = 5,
    RequestStreamEnd = 6,
    ResponseStreamEnd = 7,
    RequestCancel = 8,
    ResponseCancel = 9,
}

impl MsgKind {
    fn from_u64(v: u64) -> Option<Self> {
        Some(match v {
            1 => MsgKind::Notify,
            2 => MsgKind::Request,
            3 => MsgKind::Response,
            4 => MsgKind::RequestStreamChunk,
            5 => MsgKind::ResponseStreamChunk,
            6 => MsgKind::RequestStreamEnd,
            7 => MsgKind::ResponseStreamEnd,
            8 => MsgKind::RequestCancel,
            9 => MsgKind::ResponseCancel,
            _ => return None,
        })
    }
}

impl fmt::Display for MsgKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MsgKind::Notify => "NOTIFY",
            MsgKind::Request => "REQUEST",
            MsgKind::Response => "RESPONSE",
            MsgKind::RequestStreamChunk => "REQUEST_STREAM_CHUNK",
            MsgKind::ResponseStreamChunk => "RESPONSE_STREAM_CHUNK",
            MsgKind::RequestStreamEnd => "REQUEST_STREAM_END",
            MsgKind::ResponseStreamEnd => "RESPONSE_STREAM_END",
            MsgKind::RequestCancel => "REQUEST_CANCEL",
            MsgKind::ResponseCancel => "RESPONSE_CANCEL",
        };
        f.write_str(name)
    }
}

/// A method reference on the wire: either the registered name, or the
/// method's index into the server's catalog (used when the negotiated
/// `MethodIdType` is `Num` or `StrNum`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MethodRef {
    Name(String),
    Index(u32),
}

impl From<MethodRef> for Value {
    fn from(r: MethodRef) -> Value {
        match r {
            MethodRef::Name(n) => Value::String(n.into()),
            MethodRef::Index(i) => Value::from(i),
        }
    }
}

/// One fully-decoded application frame (the handshake frames are separate,
/// see [`crate::handshake`]).
#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    Request {
        id: CallId,
        method: MethodRef,
        args: Vec<Value>,
        kwargs: Option<BTreeMap<String, Value>>,
    },
    Response {
        id: CallId,
        err: Option<String>,
        result: Option<Value>,
    },
    RequestStreamChunk {
        id: CallId,
        value: Value,
    },
    ResponseStreamChunk {
        id: CallId,
        value: Value,
    },
    RequestStreamEnd {
        id: CallId,
    },
    ResponseStreamEnd {
        id: CallId,
    },
    RequestCancel {
        id: CallId,
    },
}

impl Frame {
    pub fn id(&self) -> CallId {
        match self {
            Frame::Request { id, .. }
            | Frame::Response { id, .. }
            | Frame::RequestStreamChunk { id, .. }
            | Frame::ResponseStreamChunk { id, .. }
            | Frame::RequestStreamEnd { id }
            | Frame::ResponseStreamEnd { id }
            | Frame::RequestCancel { id } => *id,
        }
    }

    pub fn kind(&self) -> MsgKind {
        match self {
            Frame::Request { .. } => MsgKind::Request,
            Frame::Response { .. } => MsgKind::Response,
            Frame::RequestStreamChunk { .. } => MsgKind::RequestStreamChunk,
            Frame::ResponseStreamChunk { .. } => MsgKind::ResponseStreamChunk,
            Frame::RequestStreamEnd { .. } => MsgKind::RequestStreamEnd,
            Frame::ResponseStreamEnd { .. } => MsgKind::ResponseStreamEnd,
            Frame::RequestCancel { .. } => MsgKind::RequestCancel,
        }
    }

    /// Build the `rmpv::Value` that this frame packs to. Kept separate from
    /// `encode` so tests can inspect the array shape directly.
    pub fn to_value(&self) -> Value {
        match self {
            Frame::Request {
                id,
                method,
                args,
                kwargs,
            } => {
                let mut elems = vec![
                    Value::from(MsgKind::Request as u8),
                    Value::from(*id),
                    method.clone().into(),
                    Value::Array(args.clone()),
                ];
                if let Some(kwargs) = kwargs {
                    elems.push(Value::Map(
                        kwargs
                            .iter()
                            .map(|(k, v)| (Value::String(k.clone().into()), v.clone()))
                            .collect(),
                    ));
                }
                Value::Array(elems)
            }
            Frame::Response { id, err, result } => Value::Array(vec![
                Value::from(MsgKind::Response as u8),
                Value::from(*id),
                err.clone().map(Value::from).unwrap_or(Value::Nil),
                result.clone().unwrap_or(Value::Nil),
            ]),
            Frame::RequestStreamChunk { id, value } => Value::Array(vec![
                Value::from(MsgKind::RequestStreamChunk as u8),
                Value::from(*id),
                value.clone(),
            ]),
            Frame::ResponseStreamChunk { id, value } => Value::Array(vec![
                Value::from(MsgKind::ResponseStreamChunk as u8),
                Value::from(*id),
                value.clone(),
            ]),
            Frame::RequestStreamEnd { id } => Value::Array(vec![
                Value::from(MsgKind::RequestStreamEnd as u8),
                Value::from(*id),
            ]),
            Frame::ResponseStreamEnd { id } => Value::Array(vec![
                Value::from(MsgKind::ResponseStreamEnd as u8),
                Value::from(*id),
            ]),
            Frame::RequestCancel { id } => Value::Array(vec![
                Value::from(MsgKind::RequestCancel as u8),
                Value::from(*id),
            ]),
        }
    }

    /// Pack this frame into its MessagePack byte representation.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        rmpv::encode::write_value(&mut buf, &self.to_value())
            .expect("encoding into a Vec<u8> is infallible");
        buf
    }

    /// Decode a frame from an already-parsed `rmpv::Value` (one complete
    /// MessagePack array). Used by [`crate::codec::FrameDecoder`].
    pub fn from_value(value: Value) -> Result<Frame, DecodeError> {
        let elems = match value {
            Value::Array(elems) => elems,
            other => return Err(DecodeError::NotAnArray(other)),
        };

        if elems.is_empty() {
            return Err(DecodeError::EmptyFrame);
        }

        let kind_raw = elems[0]
            .as_u64()
            .ok_or_else(|| DecodeError::InvalidKind(elems[0].clone()))?;
        let kind = MsgKind::from_u64(kind_raw).ok_or(DecodeError::UnknownKind(kind_raw))?;

        let id = elems
            .get(1)
            .and_then(|v| v.as_u64())
            .ok_or(DecodeError::MissingCallId)? as CallId;

        match kind {
            MsgKind::Request => {
                let method = match elems.get(2) {
                    Some(Value::String(s)) => {
                        MethodRef::Name(s.as_str().unwrap_or_default().to_string())
                    }
                    Some(v) => match v.as_u64() {
                        Some(idx) => MethodRef::Index(idx as u32),
                        None => return Err(DecodeError::InvalidMethodRef(v.clone())),
                    },
                    None => return Err(DecodeError::Arity { kind, got: elems.len() }),
                };
                let args = match elems.get(3) {
                    Some(Value::Array(a)) => a.clone(),
                    Some(v) => return Err(DecodeError::InvalidArgs(v.clone())),
                    None => Vec::new(),
                };
                let kwargs = match elems.get(4) {
                    Some(Value::Map(m)) => Some(
                        m.iter()
                            .filter_map(|(k, v)| {
                                k.as_str().map(|k| (k.to_string(), v.clone()))
                            })
                            .collect(),
                    ),
                    Some(v) => return Err(DecodeError::InvalidKwargs(v.clone())),
                    None => None,
                };
                Ok(Frame::Request {
                    id,
                    method,
                    args,
                    kwargs,
                })
            }
            MsgKind::Response => {
                if elems.len() < 4 {
                    return Err(DecodeError::Arity { kind, got: elems.len() });
                }
                let err = match &elems[2] {
                    Value::Nil => None,
                    Value::String(s) => Some(s.as_str().unwrap_or_default().to_string()),
                    other => Some(other.to_string()),
                };
                let result = match &elems[3] {
                    Value::Nil => None,
                    v => Some(v.clone()),
                };
                Ok(Frame::Response { id, err, result })
            }
            MsgKind::RequestStreamChunk => {
                let value = elems.get(2).cloned().unwrap_or(Value::Nil);
                Ok(Frame::RequestStreamChunk { id, value })
            }
            MsgKind::ResponseStreamChunk => {
                let value = elems.get(2).cloned().unwrap_or(Value::Nil);
                Ok(Frame::ResponseStreamChunk { id, value })
            }
            MsgKind::RequestStreamEnd => Ok(Frame::RequestStreamEnd { id }),
            MsgKind::ResponseStreamEnd => Ok(Frame::ResponseStreamEnd { id }),
            MsgKind::RequestCancel => Ok(Frame::RequestCancel { id }),
            MsgKind::Notify | MsgKind::ResponseCancel => {
                Err(DecodeError::ReservedKind(kind))
            }
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Frame, DecodeError> {
        let value =
            rmpv::decode::read_value(&mut &bytes[..]).map_err(DecodeError::MsgPack)?;
        Frame::from_value(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trips_without_kwargs() {
        let frame = Frame::Request {
            id: 7,
            method: MethodRef::Name("div".into()),
            args: vec![Value::from(1), Value::from(3)],
            kwargs: None,
        };
        let bytes = frame.encode();
        let decoded = Frame::decode(&bytes).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn request_round_trips_with_kwargs() {
        let mut kwargs = BTreeMap::new();
        kwargs.insert("count".to_string(), Value::from(4));
        let frame = Frame::Request {
            id: 9,
            method: MethodRef::Index(2),
            args: vec![Value::from("bla")],
            kwargs: Some(kwargs),
        };
        let bytes = frame.encode();
        let decoded = Frame::decode(&bytes).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn response_error_round_trips() {
        let frame = Frame::Response {
            id: 3,
            err: Some("division by zero".into()),
            result: None,
        };
        let decoded = Frame::decode(&frame.encode()).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn response_success_round_trips() {
        let frame = Frame::Response {
            id: 3,
            err: None,
            result: Some(Value::F64(0.333)),
        };
        let decoded = Frame::decode(&frame.encode()).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn stream_chunk_and_end_round_trip() {
        for frame in [
            Frame::RequestStreamChunk { id: 1, value: Value::from(42) },
            Frame::ResponseStreamChunk { id: 1, value: Value::from("bla") },
            Frame::RequestStreamEnd { id: 1 },
            Frame::ResponseStreamEnd { id: 1 },
            Frame::RequestCancel { id: 1 },
        ] {
            let decoded = Frame::decode(&frame.encode()).unwrap();
            assert_eq!(decoded, frame);
        }
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let value = Value::Array(vec![Value::from(200u8), Value::from(1u32)]);
        let mut bytes = Vec::new();
        rmpv::encode::write_value(&mut bytes, &value).unwrap();
        let err = Frame::decode(&bytes).unwrap_err();
        assert!(matches!(err, DecodeError::UnknownKind(200)));
    }

    #[test]
    fn reserved_kind_is_rejected() {
        let value = Value::Array(vec![Value::from(1u8), Value::from(1u32)]);
        let mut bytes = Vec::new();
        rmpv::encode::write_value(&mut bytes, &value).unwrap();
        let err = Frame::decode(&bytes).unwrap_err();
        assert!(matches!(err, DecodeError::ReservedKind(MsgKind::Notify)));
    }

    #[test]
    fn non_array_frame_is_rejected() {
        let mut bytes = Vec::new();
        rmpv::encode::write_value(&mut bytes, &Value::from(1)).unwrap();
        let err = Frame::decode(&bytes).unwrap_err();
        assert!(matches!(err, DecodeError::NotAnArray(_)));
    }
}
