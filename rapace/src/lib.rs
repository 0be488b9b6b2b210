//! A multiplexed RPC protocol engine over any ordered, duplex,
//! message-framed transport (canonically a WebSocket).
//!
//! This crate is a thin facade over the four crates that actually
//! implement the protocol:
//!
//! - [`rapace_protocol`] — wire frame types and the MessagePack codec.
//! - [`rapace_core`] — the bounded stream queue, the call registry and
//!   call-id allocator, and the error types shared by both sides.
//! - [`rapace_transport`] — the `Transport` contract, an in-process
//!   loopback pair for tests, and an optional WebSocket implementation.
//! - [`rapace_server`] — the method registry and per-connection dispatcher.
//! - [`rapace_client`] — the handshake-driving client stub and call handle.
//!
//! See each crate's documentation for the pieces it owns; this crate just
//! re-exports the types an application needs to register methods, accept
//! connections, and make calls.

pub use rapace_protocol::{
    major_version, CallId, Frame, FrameDecoder, MethodDescriptor, MethodIdType, MsgKind, Value,
    DEFAULT_MAX_CALL_ID, DEFAULT_MIN_CALL_ID, PROTOCOL_VERSION, RESERVED_CALL_ID,
};

pub use rapace_core::{CallError, CallIdAllocator, CallRegistry, ClientUsageError, ProtocolError};

pub use rapace_transport::{Transport, TransportError};
#[cfg(feature = "mem")]
pub use rapace_transport::MemTransport;
#[cfg(feature = "websocket")]
pub use rapace_transport::WebSocketTransport;

pub use rapace_server::{Dispatcher, HandlerResult, MethodRegistry, RequestStream, ServerConfig};

pub use rapace_client::{CallHandle, CallOutcome, Client, ClientConfig, Invocation};
