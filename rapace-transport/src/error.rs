use std::fmt;

/// Everything that can go wrong at the transport boundary (§7,
/// `TransportClosed`). Not an RPC-level error: the dispatcher and stub
/// treat it as a signal to mass-cancel outstanding calls, not as a
/// per-call failure.
#[derive(Debug)]
pub enum TransportError {
    /// The channel was closed, locally or by the peer.
    Closed,
    /// The underlying I/O (or WebSocket) layer reported an error.
    Io(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Closed => write!(f, "transport closed"),
            TransportError::Io(msg) => write!(f, "transport I/O error: {msg}"),
        }
    }
}

impl std::error::Error for TransportError {}
