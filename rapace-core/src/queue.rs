use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use futures::Stream;
use parking_lot::Mutex;
use rapace_protocol::Value;
use tokio::sync::Notify;

use crate::error::CallError;

/// What travels through a [`StreamQueue`] slot: a real payload, or one of the
/// three sentinels described in the spec.
#[derive(Clone, Debug)]
enum Slot {
    Item(Value),
    End,
    Err(String),
    Cancelled,
}

struct Inner {
    items: Mutex<VecDeque<Slot>>,
    /// `0` means unbounded.
    capacity: usize,
    closed: Mutex<bool>,
    not_empty: Notify,
    not_full: Notify,
}

/// A bounded, single-producer/single-consumer async queue with the
/// force-put overflow policy from the spec: a full queue drops its oldest
/// element to make room for a non-blocking `force_put`, never the new
/// arrival. `capacity == 0` means unbounded (no overflow is ever possible).
#[derive(Clone)]
pub struct StreamQueue {
    inner: Arc<Inner>,
}

impl StreamQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                items: Mutex::new(VecDeque::new()),
                capacity,
                closed: Mutex::new(false),
                not_empty: Notify::new(),
                not_full: Notify::new(),
            }),
        }
    }

    fn is_full(&self, items: &VecDeque<Slot>) -> bool {
        self.inner.capacity != 0 && items.len() >= self.inner.capacity
    }

    /// Async, blocking enqueue: waits while the queue is full.
    pub async fn put(&self, value: Value) {
        loop {
            {
                let mut items = self.inner.items.lock();
                if !self.is_full(&items) {
                    items.push_back(Slot::Item(value));
                    self.inner.not_empty.notify_one();
                    return;
                }
            }
            self.inner.not_full.notified().await;
        }
    }

    /// Non-blocking enqueue. Drops the oldest element on overflow; is a
    /// no-op once the queue has been closed.
    pub fn force_put_nowait(&self, value: Value) {
        self.force_push_nowait(Slot::Item(value));
    }

    /// Inject the error sentinel: any pending/future consumer sees it once
    /// the preceding items have been drained.
    pub fn force_error_nowait(&self, message: impl Into<String>) {
        self.force_push_nowait(Slot::Err(message.into()));
    }

    /// Inject the cancellation sentinel.
    pub fn force_cancel_nowait(&self) {
        self.force_push_nowait(Slot::Cancelled);
    }

    fn force_push_nowait(&self, slot: Slot) {
        if *self.inner.closed.lock() {
            return;
        }
        let mut items = self.inner.items.lock();
        if self.is_full(&items) {
            items.pop_front();
            self.inner.not_full.notify_one();
        }
        items.push_back(slot);
        self.inner.not_empty.notify_one();
    }

    /// Async close: waits for room, then appends the end-of-stream
    /// sentinel and marks the queue closed.
    pub async fn close(&self) {
        self.put_end().await;
        *self.inner.closed.lock() = true;
    }

    async fn put_end(&self) {
        loop {
            {
                let mut items = self.inner.items.lock();
                if !self.is_full(&items) {
                    items.push_back(Slot::End);
                    self.inner.not_empty.notify_one();
                    return;
                }
            }
            self.inner.not_full.notified().await;
        }
    }

    /// Non-blocking close. Marks closed immediately so any subsequent
    /// `force_put` is a no-op, matching the reference implementation.
    pub fn force_close_nowait(&self) {
        if *self.inner.closed.lock() {
            return;
        }
        {
            let mut items = self.inner.items.lock();
            if self.is_full(&items) {
                items.pop_front();
                self.inner.not_full.notify_one();
            }
            items.push_back(Slot::End);
            self.inner.not_empty.notify_one();
        }
        *self.inner.closed.lock() = true;
    }

    pub fn closed(&self) -> bool {
        *self.inner.closed.lock()
    }

    /// Pop the next slot, waiting for one to arrive. Returns `None` once
    /// end-of-stream has been consumed; earlier calls surface items, and an
    /// error/cancellation sentinel surfaces as `Some(Err(_))`.
    pub async fn recv(&self) -> Option<Result<Value, CallError>> {
        loop {
            {
                let mut items = self.inner.items.lock();
                if let Some(slot) = items.pop_front() {
                    self.inner.not_full.notify_one();
                    return match slot {
                        Slot::Item(v) => Some(Ok(v)),
                        Slot::End => None,
                        Slot::Err(e) => Some(Err(CallError::ServerReported(e))),
                        Slot::Cancelled => Some(Err(CallError::Cancelled)),
                    };
                }
            }
            self.inner.not_empty.notified().await;
        }
    }

    /// A `futures::Stream` view over this queue's [`recv`](Self::recv).
    pub fn into_stream(self) -> StreamQueueReceiver {
        StreamQueueReceiver {
            queue: self,
            pending: None,
        }
    }
}

/// `Stream` adapter over a [`StreamQueue`], so callers use ordinary
/// `futures::StreamExt` combinators instead of a bespoke iteration API.
///
/// Holds the in-progress `recv()` future across polls rather than building
/// a fresh one each time `poll_next` is called: `recv()` awaits
/// `Notify::notified()` while the queue is empty, and that future registers
/// the polling task's waker only for as long as it's kept alive. Dropping
/// and recreating it on every poll (as a naive `pin_mut!(queue.recv())`
/// would) deregisters the waker right after `Pending` is returned, so a
/// `force_put_nowait` landing between polls calls `notify_one` with no
/// registered waiter and the consumer is never woken — a lost wakeup.
pub struct StreamQueueReceiver {
    queue: StreamQueue,
    pending: Option<BoxFuture<'static, Option<Result<Value, CallError>>>>,
}

impl Stream for StreamQueueReceiver {
    type Item = Result<Value, CallError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let fut = this.pending.get_or_insert_with(|| {
            let queue = this.queue.clone();
            Box::pin(async move { queue.recv().await })
        });
        let poll = fut.as_mut().poll(cx);
        if poll.is_ready() {
            this.pending = None;
        }
        poll
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_and_recv_preserve_order() {
        let q = StreamQueue::new(0);
        q.put(Value::from(1)).await;
        q.put(Value::from(2)).await;
        q.put(Value::from(3)).await;
        q.close().await;

        assert_eq!(q.recv().await.unwrap().unwrap(), Value::from(1));
        assert_eq!(q.recv().await.unwrap().unwrap(), Value::from(2));
        assert_eq!(q.recv().await.unwrap().unwrap(), Value::from(3));
        assert!(q.recv().await.is_none());
    }

    #[tokio::test]
    async fn force_put_overflow_drops_oldest_not_newest() {
        // Spec P5: a queue of size N receiving N+k force-puts without
        // consumer progress retains the last N values.
        let q = StreamQueue::new(2);
        q.force_put_nowait(Value::from(1));
        q.force_put_nowait(Value::from(2));
        q.force_put_nowait(Value::from(3));
        q.force_put_nowait(Value::from(4));

        assert_eq!(q.recv().await.unwrap().unwrap(), Value::from(3));
        assert_eq!(q.recv().await.unwrap().unwrap(), Value::from(4));
    }

    #[tokio::test]
    async fn force_put_after_close_is_noop() {
        let q = StreamQueue::new(0);
        q.force_close_nowait();
        q.force_put_nowait(Value::from(99));

        assert!(q.recv().await.is_none());
    }

    #[tokio::test]
    async fn error_sentinel_surfaces_as_err() {
        let q = StreamQueue::new(0);
        q.force_put_nowait(Value::from(1));
        q.force_error_nowait("boom");

        assert_eq!(q.recv().await.unwrap().unwrap(), Value::from(1));
        match q.recv().await {
            Some(Err(CallError::ServerReported(msg))) => assert_eq!(msg, "boom"),
            other => panic!("expected server error sentinel, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancellation_sentinel_surfaces_as_err() {
        let q = StreamQueue::new(0);
        q.force_cancel_nowait();
        match q.recv().await {
            Some(Err(CallError::Cancelled)) => {}
            other => panic!("expected cancellation sentinel, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn put_blocks_while_full_until_consumer_progresses() {
        let q = StreamQueue::new(1);
        q.put(Value::from(1)).await;

        let q2 = q.clone();
        let putter = tokio::spawn(async move {
            q2.put(Value::from(2)).await;
        });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!putter.is_finished());

        assert_eq!(q.recv().await.unwrap().unwrap(), Value::from(1));
        putter.await.unwrap();
        assert_eq!(q.recv().await.unwrap().unwrap(), Value::from(2));
    }

    #[tokio::test]
    async fn stream_adapter_yields_items_then_ends() {
        use futures::StreamExt;

        let q = StreamQueue::new(0);
        q.put(Value::from("a")).await;
        q.put(Value::from("b")).await;
        q.close().await;

        let items: Vec<_> = q.into_stream().map(|r| r.unwrap()).collect().await;
        assert_eq!(items, vec![Value::from("a"), Value::from("b")]);
    }
}
