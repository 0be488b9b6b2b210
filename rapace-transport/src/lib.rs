//! The `Transport` contract (§6) and its implementations.
//!
//! The dispatcher and the client stub are both generic over `T: Transport`
//! rather than using a trait object: every method here is an `async fn`,
//! and dynamic dispatch over those would need boxing futures on every send
//! and recv. Since the single-writer discipline (§5/§9) is enforced by each
//! implementation internally, a type parameter is enough.

mod error;
#[cfg(feature = "mem")]
mod mem;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "mem")]
pub use mem::MemTransport;
#[cfg(feature = "websocket")]
pub use websocket::WebSocketTransport;

/// An ordered, duplex, message-framed channel (§6).
///
/// Implementations must guarantee in-order delivery on `recv` and must be
/// safe to `send` from the single writer task that owns them; they need
/// not be safe for concurrent `send` calls from multiple tasks (the core
/// never does that — see the single-writer discipline in §9).
pub trait Transport: Send + Sync + 'static {
    /// Send one already-framed message (one packed `rapace-protocol`
    /// frame, or concatenation thereof).
    fn send(&self, bytes: Vec<u8>) -> impl std::future::Future<Output = Result<(), TransportError>> + Send;

    /// Receive the next message, or `None` once the peer has closed the
    /// channel.
    fn recv(&self) -> impl std::future::Future<Output = Option<Vec<u8>>> + Send;

    /// Proactively close the channel from this side.
    fn close(&self);
}
