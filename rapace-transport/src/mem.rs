use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex as AsyncMutex};

use crate::{Transport, TransportError};

const CHANNEL_CAPACITY: usize = 64;

/// An in-process loopback duplex pair. Used by the test suite, and a fine
/// choice for same-process client/server wiring where a real socket would
/// just add overhead.
#[derive(Debug)]
pub struct MemTransport {
    tx: mpsc::Sender<Vec<u8>>,
    rx: AsyncMutex<mpsc::Receiver<Vec<u8>>>,
    closed: AtomicBool,
}

impl MemTransport {
    /// Build a connected pair: whatever is sent into one side's `send` is
    /// what the other side's `recv` yields, in order.
    pub fn pair() -> (Arc<Self>, Arc<Self>) {
        let (tx_a, rx_a) = mpsc::channel(CHANNEL_CAPACITY);
        let (tx_b, rx_b) = mpsc::channel(CHANNEL_CAPACITY);

        let a = Arc::new(Self {
            tx: tx_b,
            rx: AsyncMutex::new(rx_a),
            closed: AtomicBool::new(false),
        });
        let b = Arc::new(Self {
            tx: tx_a,
            rx: AsyncMutex::new(rx_b),
            closed: AtomicBool::new(false),
        });
        (a, b)
    }
}

impl Transport for MemTransport {
    async fn send(&self, bytes: Vec<u8>) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        self.tx.send(bytes).await.map_err(|_| TransportError::Closed)
    }

    async fn recv(&self) -> Option<Vec<u8>> {
        if self.closed.load(Ordering::Acquire) {
            return None;
        }
        let mut rx = self.rx.lock().await;
        rx.recv().await
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}
