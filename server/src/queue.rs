//! Thread-safe queues between the network threads, the consensus callbacks
//! and the commit-processor worker.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::request::{RequestForSession, ResponseForSession};

/// Bounded multi-producer FIFO of incoming client requests. A push that
/// would exceed the capacity blocks the producer until space is available.
pub struct RequestsQueue {
    inner: Mutex<VecDeque<RequestForSession>>,
    not_full: Condvar,
    capacity: usize,
}

impl RequestsQueue {
    pub fn new(capacity: usize) -> Self {
        RequestsQueue {
            inner: Mutex::new(VecDeque::new()),
            not_full: Condvar::new(),
            capacity,
        }
    }

    pub fn push(&self, request: RequestForSession) {
        let mut q = self.inner.lock();
        while q.len() >= self.capacity {
            self.not_full.wait(&mut q);
        }
        q.push_back(request);
    }

    pub fn try_pop(&self) -> Option<RequestForSession> {
        let mut q = self.inner.lock();
        let popped = q.pop_front();
        if popped.is_some() {
            self.not_full.notify_one();
        }
        popped
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

/// Unbounded multi-producer FIFO, used for committed requests handed over
/// by the consensus layer.
pub struct ThreadSafeQueue<T> {
    inner: Mutex<VecDeque<T>>,
}

impl<T> ThreadSafeQueue<T> {
    pub fn new() -> Self {
        ThreadSafeQueue {
            inner: Mutex::new(VecDeque::new()),
        }
    }

    pub fn push(&self, value: T) {
        self.inner.lock().push_back(value);
    }

    pub fn try_pop(&self) -> Option<T> {
        self.inner.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl<T> Default for ThreadSafeQueue<T> {
    fn default() -> Self {
        ThreadSafeQueue::new()
    }
}

/// Responses keyed by session, consumed by the connection layer.
pub struct ResponsesQueue {
    inner: Mutex<VecDeque<ResponseForSession>>,
    available: Condvar,
}

impl ResponsesQueue {
    pub fn new() -> Self {
        ResponsesQueue {
            inner: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
        }
    }

    pub fn push(&self, response: ResponseForSession) {
        let mut q = self.inner.lock();
        q.push_back(response);
        self.available.notify_one();
    }

    pub fn try_pop(&self) -> Option<ResponseForSession> {
        self.inner.lock().pop_front()
    }

    /// Blocking pop with a deadline, for consumers that poll.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<ResponseForSession> {
        let deadline = Instant::now() + timeout;
        let mut q = self.inner.lock();
        loop {
            if let Some(response) = q.pop_front() {
                return Some(response);
            }
            if Instant::now() >= deadline {
                return None;
            }
            let _ = self.available.wait_until(&mut q, deadline);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl Default for ResponsesQueue {
    fn default() -> Self {
        ResponsesQueue::new()
    }
}
