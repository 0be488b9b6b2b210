//! Shared runtime pieces used by both the rapace server and client: the
//! bounded stream queue, the call registry and call-id allocator, and the
//! error types that flow through them.
//!
//! Framing and handshake types live in `rapace-protocol`; everything here
//! builds on top of that crate but knows nothing about transports, method
//! dispatch, or the handshake sequence.

mod error;
mod queue;
mod registry;

pub use error::{CallError, ClientUsageError, ProtocolError};
pub use queue::{StreamQueue, StreamQueueReceiver};
pub use registry::{CallIdAllocator, CallRegistry};

pub use rapace_protocol::{CallId, Value};
