use std::sync::atomic::{AtomicBool, Ordering};

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex as AsyncMutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::{Transport, TransportError};

/// A [`Transport`] over an already-established WebSocket. Binary frames
/// carry the protocol's packed MessagePack messages; any other frame kind
/// (text, ping/pong, close) is not a protocol frame and is skipped.
pub struct WebSocketTransport<S> {
    inner: AsyncMutex<WebSocketStream<S>>,
    closed: AtomicBool,
}

impl<S> WebSocketTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(ws: WebSocketStream<S>) -> Self {
        Self {
            inner: AsyncMutex::new(ws),
            closed: AtomicBool::new(false),
        }
    }
}

impl<S> Transport for WebSocketTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + Sync + 'static,
{
    async fn send(&self, bytes: Vec<u8>) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        let mut ws = self.inner.lock().await;
        ws.send(Message::Binary(bytes.into()))
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    async fn recv(&self) -> Option<Vec<u8>> {
        loop {
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            let mut ws = self.inner.lock().await;
            match ws.next().await {
                Some(Ok(Message::Binary(bytes))) => return Some(bytes.into()),
                Some(Ok(Message::Close(_))) | None => {
                    self.closed.store(true, Ordering::Release);
                    return None;
                }
                // Text/ping/pong/frame aren't protocol frames; keep reading.
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "websocket read error, closing transport");
                    self.closed.store(true, Ordering::Release);
                    return None;
                }
            }
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}
