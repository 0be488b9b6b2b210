use std::fmt;

use rapace_protocol::{CallId, DecodeError, MsgKind};

/// An invalid local call shape, caught before anything touches the wire.
///
/// Raised synchronously at the call site (see §7); never sent as a frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientUsageError {
    /// The method name isn't in the server's advertised catalog.
    UnknownMethod(String),
    /// The method has no request stream parameter, but one was supplied.
    UnexpectedRequestStream(String),
    /// The method expects a request stream and none was supplied.
    MissingRequestStream(String),
    /// `.chunks()` was called on a method with no response stream.
    NotAResponseStreamingMethod(String),
    /// Every id in the negotiated call-ID range is currently in flight.
    NoCallIdsAvailable,
}

impl fmt::Display for ClientUsageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientUsageError::UnknownMethod(name) => {
                write!(f, "unknown method: {name}")
            }
            ClientUsageError::UnexpectedRequestStream(name) => {
                write!(f, "method {name} does not take a request stream")
            }
            ClientUsageError::MissingRequestStream(name) => {
                write!(f, "method {name} requires a request stream")
            }
            ClientUsageError::NotAResponseStreamingMethod(name) => {
                write!(f, "method {name} has no response stream to iterate")
            }
            ClientUsageError::NoCallIdsAvailable => {
                write!(f, "no call ids available: every id in the negotiated range is in flight")
            }
        }
    }
}

impl std::error::Error for ClientUsageError {}

/// A malformed or out-of-sequence frame (§7). On the server this is answered
/// with an error `RESPONSE` when a call id is known, and just logged
/// otherwise; on the client the reader loop aborts.
#[derive(Debug)]
pub enum ProtocolError {
    Decode(DecodeError),
    /// A frame kind arrived where the protocol forbids it (e.g. a second
    /// `REQUEST` for a call id already in the registry).
    UnexpectedFrame { id: CallId, kind: MsgKind },
    /// The handshake's first frame could not be parsed as a `ClientHello`.
    BadHello(rmp_serde::decode::Error),
    /// The client's major version does not match the server's.
    VersionMismatch { client: String, server: String },
    /// The transport closed before the handshake completed.
    ClosedDuringHandshake,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::Decode(e) => write!(f, "protocol decode error: {e}"),
            ProtocolError::UnexpectedFrame { id, kind } => {
                write!(f, "unexpected frame kind {kind} for call {id}")
            }
            ProtocolError::BadHello(e) => write!(f, "malformed client hello: {e}"),
            ProtocolError::VersionMismatch { client, server } => write!(
                f,
                "incompatible version: client={client}, server={server}"
            ),
            ProtocolError::ClosedDuringHandshake => {
                write!(f, "transport closed before the handshake completed")
            }
        }
    }
}

impl std::error::Error for ProtocolError {}

impl From<DecodeError> for ProtocolError {
    fn from(e: DecodeError) -> Self {
        ProtocolError::Decode(e)
    }
}

/// The terminal outcome of a single item pulled off a [`crate::StreamQueue`]
/// (or of an `await_result()`): either the server reported a handler
/// failure, or the call was cancelled. Not used for `ClientUsageError` or
/// `ProtocolError`, which never flow through a queue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallError {
    /// The handler on the other side returned or raised an error; this
    /// carries its stringified message (§7, `ServerReportedError`).
    ServerReported(String),
    /// The call was cancelled, locally or by the peer.
    Cancelled,
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallError::ServerReported(msg) => write!(f, "server reported error: {msg}"),
            CallError::Cancelled => write!(f, "call was cancelled"),
        }
    }
}

impl std::error::Error for CallError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_mention_the_offending_method() {
        let e = ClientUsageError::UnknownMethod("frobnicate".into());
        assert!(e.to_string().contains("frobnicate"));
    }

    #[test]
    fn call_error_display_distinguishes_variants() {
        assert!(CallError::Cancelled.to_string().contains("cancelled"));
        assert!(CallError::ServerReported("boom".into())
            .to_string()
            .contains("boom"));
    }
}
