use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::{Stream, StreamExt};
use rapace_core::{CallError, ClientUsageError, StreamQueue, StreamQueueReceiver};
use rapace_protocol::{CallId, Frame, MethodIdType, MethodRef, Value};
use rapace_transport::Transport;
use tokio::sync::{oneshot, Mutex as AsyncMutex};

use crate::client::{ClientCall, ClientInner};

/// The terminal outcome of `await_result()`: the unary result (or `Nil` for
/// a streaming method's final null, §4.5), a server-reported error, or
/// cancellation.
pub type CallOutcome = Result<Value, CallError>;

/// Either flavor of request stream a caller can supply (§4.5): a plain
/// synchronous iterator, or an async `Stream`. Both are drained the same
/// way once the call starts.
enum RequestStreamSource {
    Iter(Box<dyn Iterator<Item = Value> + Send>),
    Stream(std::pin::Pin<Box<dyn Stream<Item = Value> + Send>>),
}

/// Builds one invocation. Nothing is validated against the wire until
/// [`Invocation::build`] is called, and nothing is sent until the
/// resulting handle's `await_result`/`chunks` is called.
pub struct Invocation<T: Transport> {
    client: Arc<ClientInner<T>>,
    method_name: String,
    args: Vec<Value>,
    kwargs: Option<BTreeMap<String, Value>>,
    request_stream: Option<RequestStreamSource>,
}

impl<T: Transport> Invocation<T> {
    pub(crate) fn new(client: Arc<ClientInner<T>>, method_name: String) -> Self {
        Self {
            client,
            method_name,
            args: Vec::new(),
            kwargs: None,
            request_stream: None,
        }
    }

    pub fn args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    pub fn kwargs(mut self, kwargs: BTreeMap<String, Value>) -> Self {
        self.kwargs = Some(kwargs);
        self
    }

    /// Supply a request stream as a plain synchronous iterator.
    pub fn request_stream_iter(
        mut self,
        iter: impl Iterator<Item = Value> + Send + 'static,
    ) -> Self {
        self.request_stream = Some(RequestStreamSource::Iter(Box::new(iter)));
        self
    }

    /// Supply a request stream as an async `Stream`.
    pub fn request_stream(mut self, stream: impl Stream<Item = Value> + Send + 'static) -> Self {
        self.request_stream = Some(RequestStreamSource::Stream(Box::pin(stream)));
        self
    }

    /// Validate the call shape against the server's catalog (§4.5 steps
    /// 1-3) and build the lazy handle. No frame is sent here.
    pub fn build(self) -> Result<CallHandle<T>, ClientUsageError> {
        let Some((index, descriptor)) = self.client.method_index(&self.method_name) else {
            return Err(ClientUsageError::UnknownMethod(self.method_name));
        };

        if descriptor.has_request_stream && self.request_stream.is_none() {
            return Err(ClientUsageError::MissingRequestStream(self.method_name));
        }
        if !descriptor.has_request_stream && self.request_stream.is_some() {
            return Err(ClientUsageError::UnexpectedRequestStream(self.method_name));
        }

        let has_response_stream = descriptor.has_response_stream;
        let method_ref = match self.client.method_id_type {
            MethodIdType::Str => MethodRef::Name(self.method_name.clone()),
            MethodIdType::Num => MethodRef::Index(index as u32),
            MethodIdType::StrNum => {
                if self.client.config.prefer_numeric_method_ref {
                    MethodRef::Index(index as u32)
                } else {
                    MethodRef::Name(self.method_name.clone())
                }
            }
        };

        let id = self
            .client
            .allocator
            .allocate(|id| self.client.registry.contains(id))
            .ok_or(ClientUsageError::NoCallIdsAvailable)?;

        let response_queue = has_response_stream
            .then(|| StreamQueue::new(self.client.config.default_response_stream_capacity));

        Ok(CallHandle {
            inner: Arc::new(HandleInner {
                id,
                method_name: self.method_name,
                method_ref,
                args: self.args,
                kwargs: self.kwargs,
                request_stream: AsyncMutex::new(self.request_stream),
                response_queue,
                client: self.client,
                started: AtomicBool::new(false),
                start_lock: AsyncMutex::new(()),
                outcome: AsyncMutex::new(OutcomeState::NotStarted),
            }),
        })
    }
}

enum OutcomeState {
    NotStarted,
    Pending(oneshot::Receiver<CallOutcome>),
    Ready(CallOutcome),
}

struct HandleInner<T: Transport> {
    id: CallId,
    method_name: String,
    method_ref: MethodRef,
    args: Vec<Value>,
    kwargs: Option<BTreeMap<String, Value>>,
    request_stream: AsyncMutex<Option<RequestStreamSource>>,
    response_queue: Option<StreamQueue>,
    client: Arc<ClientInner<T>>,
    started: AtomicBool,
    start_lock: AsyncMutex<()>,
    outcome: AsyncMutex<OutcomeState>,
}

/// An opaque handle to one in-flight (or not-yet-started) call (§4.5/§9).
///
/// Rust has no type that is both `Future` and `Stream` the way the
/// reference implementation's handle is; this exposes the two terminal
/// operations the design notes call for instead. Both are lazy: the first
/// call to either sends the `REQUEST` frame exactly once.
pub struct CallHandle<T: Transport> {
    inner: Arc<HandleInner<T>>,
}

impl<T: Transport> Clone for CallHandle<T> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<T: Transport> CallHandle<T> {
    pub fn id(&self) -> CallId {
        self.inner.id
    }

    /// Await the unary outcome: the result value (`Nil` for a streaming
    /// method's final null), a server-reported error, or cancellation.
    /// Sends the request on first call from either this or [`Self::chunks`].
    pub async fn await_result(&self) -> CallOutcome {
        self.ensure_started().await;
        let mut state = self.inner.outcome.lock().await;
        match std::mem::replace(&mut *state, OutcomeState::NotStarted) {
            OutcomeState::Ready(outcome) => {
                *state = OutcomeState::Ready(outcome.clone());
                outcome
            }
            OutcomeState::Pending(rx) => {
                let outcome = rx.await.unwrap_or(Err(CallError::Cancelled));
                *state = OutcomeState::Ready(outcome.clone());
                outcome
            }
            OutcomeState::NotStarted => unreachable!("ensure_started installs Pending"),
        }
    }

    /// Iterate the response stream. Fails locally if the method has no
    /// response stream. Sends the request on first call from either this
    /// or [`Self::await_result`].
    pub async fn chunks(
        &self,
    ) -> Result<impl Stream<Item = Result<Value, CallError>> + 'static, ClientUsageError> {
        let queue = self.inner.response_queue.clone().ok_or_else(|| {
            ClientUsageError::NotAResponseStreamingMethod(self.inner.method_name.clone())
        })?;
        self.ensure_started().await;
        Ok(queue.into_stream())
    }

    /// Cancel synchronously: if the request was already sent, immediately
    /// fail any ongoing iteration/await locally and fire off the
    /// `REQUEST_CANCEL` frame on a background task. A handle that never
    /// started never touches the wire (P3).
    pub fn cancel(&self) {
        if !self.inner.started.load(Ordering::Acquire) {
            return;
        }
        self.cancel_locally();
        let client = self.inner.client.clone();
        let id = self.inner.id;
        tokio::spawn(async move {
            let _ = client.writer.send_frame(Frame::RequestCancel { id }).await;
        });
    }

    /// Same as [`Self::cancel`] but awaits the cancellation frame being
    /// sent.
    pub async fn async_cancel(&self) {
        if !self.inner.started.load(Ordering::Acquire) {
            return;
        }
        self.cancel_locally();
        let _ = self
            .inner
            .client
            .writer
            .send_frame(Frame::RequestCancel { id: self.inner.id })
            .await;
    }

    fn cancel_locally(&self) {
        if let Some(q) = &self.inner.response_queue {
            q.force_cancel_nowait();
        }
        if let Some(call) = self.inner.client.registry.remove(self.inner.id) {
            let _ = call.result_tx.send(Err(CallError::Cancelled));
        }
    }

    async fn ensure_started(&self) {
        let _guard = self.inner.start_lock.lock().await;
        if self.inner.started.swap(true, Ordering::AcqRel) {
            return;
        }

        let (tx, rx) = oneshot::channel();
        *self.inner.outcome.lock().await = OutcomeState::Pending(rx);
        self.inner.client.registry.insert(
            self.inner.id,
            ClientCall {
                result_tx: tx,
                response_queue: self.inner.response_queue.clone(),
            },
        );

        let frame = Frame::Request {
            id: self.inner.id,
            method: self.inner.method_ref.clone(),
            args: self.inner.args.clone(),
            kwargs: self.inner.kwargs.clone(),
        };
        let _ = self.inner.client.writer.send_frame(frame).await;

        if let Some(source) = self.inner.request_stream.lock().await.take() {
            let client = self.inner.client.clone();
            let id = self.inner.id;
            tokio::spawn(async move {
                drain_request_stream(client, id, source).await;
            });
        }
    }
}

async fn drain_request_stream<T: Transport>(
    client: Arc<ClientInner<T>>,
    id: CallId,
    source: RequestStreamSource,
) {
    match source {
        RequestStreamSource::Iter(iter) => {
            for value in iter {
                let _ = client
                    .writer
                    .send_frame(Frame::RequestStreamChunk { id, value })
                    .await;
            }
        }
        RequestStreamSource::Stream(mut stream) => {
            while let Some(value) = stream.next().await {
                let _ = client
                    .writer
                    .send_frame(Frame::RequestStreamChunk { id, value })
                    .await;
            }
        }
    }
    let _ = client
        .writer
        .send_frame(Frame::RequestStreamEnd { id })
        .await;
}
