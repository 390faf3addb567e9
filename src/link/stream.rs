//! Bounded FIFO byte stream.
//!
//! One instance per direction. Task-context callers use the blocking
//! `push`/`pop`, which suspend on capacity/availability. The state machine
//! uses `try_push`/`try_pop`, which never wait and move as much as they can.

use crate::link::shared::lock;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

#[derive(Debug, Default)]
struct StreamState {
    buf: VecDeque<u8>,
    closed: bool,
}

/// Fixed-capacity byte FIFO. `available() + free() == capacity()` always holds.
#[derive(Debug)]
pub struct ByteStream {
    inner: Mutex<StreamState>,
    capacity: usize,
    readable: Notify,
    writable: Notify,
}

impl ByteStream {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(StreamState {
                buf: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            capacity,
            readable: Notify::new(),
            writable: Notify::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes queued and ready to pop.
    pub fn available(&self) -> usize {
        lock(&self.inner).buf.len()
    }

    /// Room left before the stream is full.
    pub fn free(&self) -> usize {
        self.capacity - self.available()
    }

    pub fn is_empty(&self) -> bool {
        self.available() == 0
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.inner).closed
    }

    /// Stop accepting bytes and wake every waiter. Queued bytes stay poppable.
    pub fn close(&self) {
        lock(&self.inner).closed = true;
        self.readable.notify_waiters();
        self.writable.notify_waiters();
    }

    /// Non-blocking enqueue. Returns how many leading bytes of `data` fit.
    pub fn try_push(&self, data: &[u8]) -> usize {
        let n = {
            let mut state = lock(&self.inner);
            if state.closed {
                return 0;
            }
            let n = data.len().min(self.capacity - state.buf.len());
            state.buf.extend(&data[..n]);
            n
        };
        if n > 0 {
            self.readable.notify_waiters();
        }
        n
    }

    /// Non-blocking dequeue into `out`. Returns the number of bytes written.
    pub fn try_pop(&self, out: &mut [u8]) -> usize {
        let n = {
            let mut state = lock(&self.inner);
            let n = out.len().min(state.buf.len());
            for (dst, src) in out.iter_mut().zip(state.buf.drain(..n)) {
                *dst = src;
            }
            n
        };
        if n > 0 {
            self.writable.notify_waiters();
        }
        n
    }

    /// Enqueue all of `data`, waiting for room as the reader drains.
    ///
    /// Gives up when `timeout` elapses or the stream closes and returns the
    /// number of bytes that made it in. Those bytes are not rolled back.
    pub async fn push(&self, data: &[u8], timeout: Option<Duration>) -> usize {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut written = 0;

        loop {
            let notified = self.writable.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            written += self.try_push(&data[written..]);
            if written == data.len() || self.is_closed() {
                return written;
            }

            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        return written;
                    }
                }
                None => notified.await,
            }
        }
    }

    /// Dequeue up to `out.len()` bytes, waiting at most `wait` for the first one.
    ///
    /// Returns 0 on timeout, or immediately once the stream is closed and empty.
    pub async fn pop(&self, out: &mut [u8], wait: Duration) -> usize {
        let deadline = Instant::now() + wait;

        loop {
            let notified = self.readable.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let n = self.try_pop(out);
            if n > 0 || out.is_empty() || self.is_closed() {
                return n;
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return 0;
            }
        }
    }
}
