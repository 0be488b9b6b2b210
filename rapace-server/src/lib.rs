//! Server-side half of the rapace RPC protocol: the method registry and the
//! per-connection dispatcher (§4.3, §4.4).
//!
//! A [`MethodRegistry`] is built once, then handed to a [`Dispatcher`]
//! alongside a [`rapace_transport::Transport`] for each connection. The
//! dispatcher owns the handshake, the frame-reading loop, per-call task
//! spawning, and teardown.

mod config;
mod dispatcher;
mod methods;

pub use config::ServerConfig;
pub use dispatcher::Dispatcher;
pub use methods::{HandlerResult, MethodKind, MethodRegistry, RegisteredMethod, RequestStream};
