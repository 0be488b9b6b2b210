use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use rapace_core::StreamQueueReceiver;
use rapace_protocol::{MethodDescriptor, MethodRef, Value};

/// What a handler returns on completion or failure (§4.4): `Ok(value)`
/// becomes the success payload, `Err(message)` becomes `RESPONSE`'s (or a
/// stream's) stringified error.
pub type HandlerResult = Result<Value, String>;

/// The request stream handed to a handler that declared one at
/// registration time; `None` for methods with no request stream.
pub type RequestStream = Option<StreamQueueReceiver>;

type UnaryFn = dyn Fn(Vec<Value>, Option<BTreeMap<String, Value>>, RequestStream) -> BoxFuture<'static, HandlerResult>
    + Send
    + Sync;

type StreamingFn = dyn Fn(Vec<Value>, Option<BTreeMap<String, Value>>, RequestStream) -> BoxStream<'static, HandlerResult>
    + Send
    + Sync;

/// Rust has no `inspect`-style reflection to tell a coroutine from a
/// generator; per §4.4/§9 the shape is declared explicitly at registration
/// instead. The wire behavior each produces is unchanged from the spec: one
/// `RESPONSE` for `Unary`, a `RESPONSE_STREAM_CHUNK` per item followed by
/// `RESPONSE_STREAM_END` for `Streaming`.
#[derive(Clone)]
pub enum MethodKind {
    Unary(Arc<UnaryFn>),
    Streaming(Arc<StreamingFn>),
}

/// One registered method: its wire-visible descriptor plus the Rust-side
/// handler and, if it takes a request stream, the queue capacity to use.
#[derive(Clone)]
pub struct RegisteredMethod {
    pub descriptor: MethodDescriptor,
    pub kind: MethodKind,
    pub request_stream_capacity: Option<usize>,
}

/// The server's method catalog. Built once before the dispatcher starts
/// accepting connections — registration after that point is forbidden
/// (§9, "Catalog ordering"), since the numeric method-ID encoding depends
/// on stable insertion order.
#[derive(Clone, Default)]
pub struct MethodRegistry {
    methods: Vec<RegisteredMethod>,
    by_name: HashMap<String, usize>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a unary method: one request (with optional request stream),
    /// one reply.
    pub fn register_unary<F, Fut>(
        &mut self,
        signature: impl Into<String>,
        docstring: impl Into<String>,
        has_request_stream: bool,
        request_stream_capacity: Option<usize>,
        handler: F,
    ) -> &mut Self
    where
        F: Fn(Vec<Value>, Option<BTreeMap<String, Value>>, RequestStream) -> Fut
            + Send
            + Sync
            + 'static,
        Fut: std::future::Future<Output = HandlerResult> + Send + 'static,
    {
        self.push(
            signature,
            docstring,
            has_request_stream,
            false,
            request_stream_capacity,
            MethodKind::Unary(Arc::new(move |args, kwargs, stream| {
                Box::pin(handler(args, kwargs, stream))
            })),
        )
    }

    /// Register a response-streaming method: the handler yields zero or
    /// more chunks before completing (or erroring).
    pub fn register_streaming<F, S>(
        &mut self,
        signature: impl Into<String>,
        docstring: impl Into<String>,
        has_request_stream: bool,
        request_stream_capacity: Option<usize>,
        handler: F,
    ) -> &mut Self
    where
        F: Fn(Vec<Value>, Option<BTreeMap<String, Value>>, RequestStream) -> S
            + Send
            + Sync
            + 'static,
        S: futures::Stream<Item = HandlerResult> + Send + 'static,
    {
        self.push(
            signature,
            docstring,
            has_request_stream,
            true,
            request_stream_capacity,
            MethodKind::Streaming(Arc::new(move |args, kwargs, stream| {
                Box::pin(handler(args, kwargs, stream))
            })),
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn push(
        &mut self,
        signature: impl Into<String>,
        docstring: impl Into<String>,
        has_request_stream: bool,
        has_response_stream: bool,
        request_stream_capacity: Option<usize>,
        kind: MethodKind,
    ) -> &mut Self {
        let signature = signature.into();
        let index = self.methods.len();
        self.by_name.insert(signature.clone(), index);
        self.methods.push(RegisteredMethod {
            descriptor: MethodDescriptor::new(
                signature,
                docstring,
                has_request_stream,
                has_response_stream,
            ),
            kind,
            request_stream_capacity,
        });
        self
    }

    /// The ordered catalog advertised in the handshake's `rpc_info` (P4).
    pub fn catalog(&self) -> Vec<MethodDescriptor> {
        self.methods.iter().map(|m| m.descriptor.clone()).collect()
    }

    /// Resolve a wire `method_ref` to its registered method, per §4.4: by
    /// catalog index if numeric, by name otherwise.
    pub fn resolve(&self, method_ref: &MethodRef) -> Option<&RegisteredMethod> {
        match method_ref {
            MethodRef::Index(idx) => self.methods.get(*idx as usize),
            MethodRef::Name(name) => self.by_name.get(name).and_then(|&i| self.methods.get(i)),
        }
    }
}
