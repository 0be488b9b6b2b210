use std::collections::HashMap;
use std::sync::Arc;

use rapace_core::{CallIdAllocator, CallRegistry, ProtocolError, StreamQueue};
use rapace_protocol::{
    major_version, ClientHello, Frame, FrameDecoder, MethodDescriptor, MethodIdType,
    ServerDescriptor,
};
use rapace_transport::Transport;
use tokio::sync::{oneshot, Mutex as AsyncMutex};

use crate::config::ClientConfig;
use crate::handle::{CallOutcome, Invocation};

/// Per-call state kept in the client's registry (§4.3): the channel that
/// delivers the terminal outcome to `await_result()`, and the response
/// queue if the method streams replies.
pub(crate) struct ClientCall {
    pub(crate) result_tx: oneshot::Sender<CallOutcome>,
    pub(crate) response_queue: Option<StreamQueue>,
}

/// Serializes every outbound send (§5/§9 single-writer discipline): the
/// main call path, cancellation tasks, and request-stream draining tasks
/// all share this.
pub(crate) struct Writer<T: Transport> {
    transport: Arc<T>,
    lock: AsyncMutex<()>,
}

impl<T: Transport> Writer<T> {
    pub(crate) async fn send_frame(&self, frame: Frame) -> Result<(), rapace_transport::TransportError> {
        let _guard = self.lock.lock().await;
        self.transport.send(frame.encode()).await
    }
}

/// Shared client state, referenced by the [`Client`] handle, every
/// [`crate::CallHandle`] it produces, and the reader task.
pub(crate) struct ClientInner<T: Transport> {
    pub(crate) writer: Writer<T>,
    pub(crate) registry: CallRegistry<ClientCall>,
    pub(crate) allocator: CallIdAllocator,
    pub(crate) config: ClientConfig,
    catalog: Vec<MethodDescriptor>,
    by_name: HashMap<String, usize>,
    pub(crate) method_id_type: MethodIdType,
}

impl<T: Transport> ClientInner<T> {
    pub(crate) fn method_index(&self, name: &str) -> Option<(usize, &MethodDescriptor)> {
        self.by_name.get(name).map(|&i| (i, &self.catalog[i]))
    }
}

/// A connected client stub (§4.5): performs the handshake, then exposes
/// `call()` to build a lazy [`crate::CallHandle`] for any method in the
/// server's catalog.
pub struct Client<T: Transport> {
    inner: Arc<ClientInner<T>>,
}

impl<T: Transport> Clone for Client<T> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<T: Transport> Client<T> {
    /// Run the handshake over `transport`, then spawn the reader task that
    /// will dispatch inbound frames to call handles for the lifetime of
    /// the connection.
    pub async fn connect(transport: Arc<T>, config: ClientConfig) -> Result<Self, ProtocolError> {
        let hello = ClientHello::new(config.version.clone());
        transport
            .send(hello.encode())
            .await
            .map_err(|_| ProtocolError::ClosedDuringHandshake)?;

        let bytes = transport
            .recv()
            .await
            .ok_or(ProtocolError::ClosedDuringHandshake)?;

        let descriptor = match ServerDescriptor::decode(&bytes) {
            Ok(desc) => desc,
            Err(_) => {
                let err = rapace_protocol::HandshakeError::decode(&bytes)
                    .map_err(ProtocolError::BadHello)?;
                return Err(ProtocolError::VersionMismatch {
                    client: config.version,
                    server: err.error,
                });
            }
        };

        debug_assert_eq!(
            major_version(&descriptor.version),
            major_version(&config.version),
            "server accepted our hello but sent back a mismatched major version"
        );

        let mut by_name = HashMap::with_capacity(descriptor.rpc_info.len());
        for (i, m) in descriptor.rpc_info.iter().enumerate() {
            by_name.insert(m.signature.clone(), i);
        }

        let inner = Arc::new(ClientInner {
            writer: Writer {
                transport: transport.clone(),
                lock: AsyncMutex::new(()),
            },
            registry: CallRegistry::new(),
            allocator: CallIdAllocator::new(descriptor.min_msgid, descriptor.max_msgid),
            config,
            catalog: descriptor.rpc_info,
            by_name,
            method_id_type: descriptor.method_id_type,
        });

        tokio::spawn(reader_loop(transport, inner.clone()));

        Ok(Self { inner })
    }

    /// Start building an invocation of `method_name`. Nothing is sent
    /// until [`crate::CallHandle::await_result`] or
    /// [`crate::CallHandle::chunks`] is called (§4.5 laziness, P3).
    pub fn call(&self, method_name: impl Into<String>) -> Invocation<T> {
        Invocation::new(self.inner.clone(), method_name.into())
    }

    /// The server's advertised method catalog, as received in the
    /// handshake (P4).
    pub fn catalog(&self) -> &[MethodDescriptor] {
        &self.inner.catalog
    }
}

async fn reader_loop<T: Transport>(transport: Arc<T>, inner: Arc<ClientInner<T>>) {
    let mut decoder = FrameDecoder::new();
    loop {
        let Some(bytes) = transport.recv().await else { break };
        decoder.feed(&bytes);
        loop {
            match decoder.next_frame() {
                Ok(Some(frame)) => handle_inbound(&inner, frame),
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "client reader aborting on malformed frame");
                    return;
                }
            }
        }
    }

    // Transport teardown: mass-cancel everything still outstanding (§5, P7).
    for (_, call) in inner.registry.drain() {
        if let Some(q) = &call.response_queue {
            q.force_cancel_nowait();
        }
        let _ = call.result_tx.send(Err(rapace_core::CallError::Cancelled));
    }
}

fn handle_inbound<T: Transport>(inner: &Arc<ClientInner<T>>, frame: Frame) {
    let id = frame.id();
    match frame {
        Frame::Response { err, result, .. } => {
            if let Some(call) = inner.registry.remove(id) {
                match err {
                    Some(message) => {
                        if let Some(q) = &call.response_queue {
                            q.force_error_nowait(message.clone());
                        }
                        let _ = call
                            .result_tx
                            .send(Err(rapace_core::CallError::ServerReported(message)));
                    }
                    None => {
                        let _ = call
                            .result_tx
                            .send(Ok(result.unwrap_or(rapace_protocol::Value::Nil)));
                    }
                }
            }
        }
        Frame::ResponseStreamChunk { value, .. } => {
            let _ = inner.registry.with(id, |call| {
                if let Some(q) = &call.response_queue {
                    q.force_put_nowait(value);
                }
            });
        }
        Frame::ResponseStreamEnd { .. } => {
            if let Some(call) = inner.registry.remove(id) {
                if let Some(q) = &call.response_queue {
                    q.force_close_nowait();
                }
                let _ = call.result_tx.send(Ok(rapace_protocol::Value::Nil));
            }
        }
        // The server never legitimately sends these; nothing useful to do
        // with them on the client besides ignoring them.
        Frame::Request { .. }
        | Frame::RequestStreamChunk { .. }
        | Frame::RequestStreamEnd { .. }
        | Frame::RequestCancel { .. } => {
            tracing::warn!(id, "ignoring server-sent request-shaped frame");
        }
    }
}
