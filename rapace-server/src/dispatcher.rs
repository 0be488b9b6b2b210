use std::sync::Arc;

use futures::StreamExt;
use rapace_core::{CallRegistry, ProtocolError, StreamQueue};
use rapace_protocol::{
    major_version, ClientHello, Frame, FrameDecoder, HandshakeError, MethodRef, ServerDescriptor,
};
use rapace_transport::{Transport, TransportError};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;

use crate::config::ServerConfig;
use crate::methods::{MethodKind, MethodRegistry};

/// Everything the dispatcher keeps for one in-flight call: the spawned
/// handler task (pinned so cleanup can cancel it, §4.3) and, if the method
/// takes a request stream, the queue feeding it.
struct ServerCall {
    handle: JoinHandle<()>,
    request_queue: Option<StreamQueue>,
}

/// Serializes every send through a single writer, per the single-writer
/// discipline (§5/§9): the reader loop and every per-call handler task
/// share one `Dispatcher`, and all of them go through this to reach the
/// transport.
struct Writer<T: Transport> {
    transport: Arc<T>,
    lock: AsyncMutex<()>,
}

impl<T: Transport> Writer<T> {
    async fn send_frame(&self, frame: Frame) -> Result<(), TransportError> {
        let _guard = self.lock.lock().await;
        self.transport.send(frame.encode()).await
    }
}

/// Drives one connection: performs the handshake, then reads and dispatches
/// frames until the transport closes (§4.4).
pub struct Dispatcher<T: Transport> {
    config: ServerConfig,
    methods: Arc<MethodRegistry>,
    writer: Arc<Writer<T>>,
    registry: Arc<CallRegistry<ServerCall>>,
}

impl<T: Transport> Dispatcher<T> {
    pub fn new(methods: MethodRegistry, config: ServerConfig, transport: Arc<T>) -> Self {
        Self {
            config,
            methods: Arc::new(methods),
            writer: Arc::new(Writer {
                transport,
                lock: AsyncMutex::new(()),
            }),
            registry: Arc::new(CallRegistry::new()),
        }
    }

    /// Run the handshake and the dispatch loop to completion. Returns once
    /// the transport has closed (or a fatal protocol error occurred) and
    /// teardown has finished.
    pub async fn serve(self) -> Result<(), ProtocolError> {
        if let Err(e) = self.handshake().await {
            self.teardown().await;
            return Err(e);
        }

        let mut decoder = FrameDecoder::new();
        loop {
            let Some(bytes) = self.writer.transport.recv().await else {
                break;
            };
            decoder.feed(&bytes);
            loop {
                match decoder.next_frame() {
                    Ok(Some(frame)) => self.handle_frame(frame).await,
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!(error = %e, "dropping malformed frame");
                        break;
                    }
                }
            }
        }

        self.teardown().await;
        Ok(())
    }

    async fn handshake(&self) -> Result<(), ProtocolError> {
        let hello_bytes = self
            .writer
            .transport
            .recv()
            .await
            .ok_or(ProtocolError::ClosedDuringHandshake)?;
        let hello = ClientHello::decode(&hello_bytes).map_err(ProtocolError::BadHello)?;

        let client_major = major_version(&hello.version);
        let server_major = major_version(&self.config.version);
        if client_major != server_major {
            let err = HandshakeError::new(format!(
                "incompatible version: server={}, client={}",
                self.config.version, hello.version
            ));
            let _ = self.writer.transport.send(err.encode()).await;
            self.writer.transport.close();
            return Err(ProtocolError::VersionMismatch {
                client: hello.version,
                server: self.config.version.clone(),
            });
        }

        let descriptor = ServerDescriptor {
            version: self.config.version.clone(),
            method_id_type: self.config.method_id_type,
            rpc_info: self.methods.catalog(),
            min_msgid: self.config.min_call_id,
            max_msgid: self.config.max_call_id,
        };
        self.writer
            .transport
            .send(descriptor.encode())
            .await
            .map_err(|_| ProtocolError::ClosedDuringHandshake)?;
        Ok(())
    }

    async fn handle_frame(&self, frame: Frame) {
        let kind = frame.kind();
        match frame {
            Frame::Request {
                id,
                method,
                args,
                kwargs,
            } => self.on_request(id, method, args, kwargs).await,
            Frame::RequestStreamChunk { id, value } => {
                if let Some(Some(q)) = self.registry.with(id, |c| c.request_queue.clone()) {
                    q.force_put_nowait(value);
                }
            }
            Frame::RequestStreamEnd { id } => {
                if let Some(Some(q)) = self.registry.with(id, |c| c.request_queue.clone()) {
                    q.force_close_nowait();
                }
            }
            Frame::RequestCancel { id } => {
                if let Some(call) = self.registry.remove(id) {
                    call.handle.abort();
                    if let Some(q) = call.request_queue {
                        q.force_cancel_nowait();
                    }
                }
            }
            Frame::Response { id, .. }
            | Frame::ResponseStreamChunk { id, .. }
            | Frame::ResponseStreamEnd { id } => {
                tracing::warn!(id, %kind, "client sent a server-only frame kind");
                self.send_error(id, "wrong message type").await;
            }
        }
    }

    async fn on_request(
        &self,
        id: rapace_protocol::CallId,
        method: MethodRef,
        args: Vec<rapace_protocol::Value>,
        kwargs: Option<std::collections::BTreeMap<String, rapace_protocol::Value>>,
    ) {
        if self.registry.contains(id) {
            let err = ProtocolError::UnexpectedFrame {
                id,
                kind: rapace_protocol::MsgKind::Request,
            };
            tracing::warn!(error = %err, "rejecting request");
            self.send_error(id, "id in use").await;
            return;
        }

        let Some(registered) = self.methods.resolve(&method) else {
            self.send_error(id, "unknown method").await;
            return;
        };

        let request_queue = if registered.descriptor.has_request_stream {
            let capacity = registered
                .request_stream_capacity
                .unwrap_or(self.config.default_request_stream_capacity);
            Some(StreamQueue::new(capacity))
        } else {
            None
        };
        let request_stream = request_queue.clone().map(StreamQueue::into_stream);

        // Reserve the id before spawning the handler task. On a
        // multi-threaded runtime a non-awaiting handler can run to
        // completion and call `registry.remove(id)` on another worker
        // before this task gets back around to inserting — if that insert
        // happened after `tokio::spawn`, the removal would race ahead of
        // it and leave a stale entry pinning the id as "in use" forever.
        // Inserting a placeholder handle first closes that window: the
        // handler's `remove(id)` always finds (and clears) a real entry,
        // whether this task has swapped in the real `JoinHandle` yet or not.
        self.registry.insert(
            id,
            ServerCall {
                handle: tokio::spawn(async {}),
                request_queue,
            },
        );

        let writer = self.writer.clone();
        let registry = self.registry.clone();

        let handle = match &registered.kind {
            MethodKind::Unary(handler) => {
                let fut = handler(args, kwargs, request_stream);
                tokio::spawn(async move {
                    let frame = match fut.await {
                        Ok(value) => Frame::Response {
                            id,
                            err: None,
                            result: Some(value),
                        },
                        Err(message) => Frame::Response {
                            id,
                            err: Some(message),
                            result: None,
                        },
                    };
                    let _ = writer.send_frame(frame).await;
                    registry.remove(id);
                })
            }
            MethodKind::Streaming(handler) => {
                let stream = handler(args, kwargs, request_stream);
                tokio::spawn(async move {
                    futures::pin_mut!(stream);
                    let mut terminal_error = None;
                    while let Some(item) = stream.next().await {
                        match item {
                            Ok(value) => {
                                let _ = writer
                                    .send_frame(Frame::ResponseStreamChunk { id, value })
                                    .await;
                            }
                            Err(message) => {
                                terminal_error = Some(message);
                                break;
                            }
                        }
                    }
                    let terminal = match terminal_error {
                        Some(message) => Frame::Response {
                            id,
                            err: Some(message),
                            result: None,
                        },
                        None => Frame::ResponseStreamEnd { id },
                    };
                    let _ = writer.send_frame(terminal).await;
                    registry.remove(id);
                })
            }
        };

        // Swap the placeholder for the real handle. If the handler already
        // finished and removed itself, this is a harmless no-op; the
        // placeholder's trivial task has either already finished too or is
        // simply dropped here undriven.
        self.registry.with(id, |call| call.handle = handle);
    }

    async fn send_error(&self, id: rapace_protocol::CallId, message: &str) {
        let _ = self
            .writer
            .send_frame(Frame::Response {
                id,
                err: Some(message.to_string()),
                result: None,
            })
            .await;
    }

    /// Mass-cancel every outstanding call task and wait for them to finish,
    /// bounded by the configured grace period (§4.4, P7). Run as its own
    /// spawned task so a cancellation of `serve()` itself can't prevent
    /// cleanup from completing ("shielded", §4.4).
    async fn teardown(&self) {
        let registry = self.registry.clone();
        let grace = self.config.teardown_grace;
        let task = tokio::spawn(async move {
            let calls = registry.drain();
            let mut handles = Vec::with_capacity(calls.len());
            for (_, call) in calls {
                call.handle.abort();
                if let Some(q) = call.request_queue {
                    q.force_cancel_nowait();
                }
                handles.push(call.handle);
            }
            let _ = tokio::time::timeout(grace, futures::future::join_all(handles)).await;
        });
        let _ = task.await;
    }
}
