//! Commit-ordering processor: one worker per node that interleaves locally
//! serviceable reads with committed writes while preserving each session's
//! submission order.
//!
//! Producers (network threads, consensus callbacks) only touch the queues
//! and the errors map; the per-session pending lists live on the worker's
//! stack and are never shared.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};
use tracing::{error, info, trace};

use crate::queue::{RequestsQueue, ResponsesQueue, ThreadSafeQueue};
use crate::request::{
    KeeperError, RaftResultCode, RequestForSession, ResponseForSession,
};
use crate::store::KeeperStore;

struct Shared {
    requests_queue: RequestsQueue,
    committed_queue: ThreadSafeQueue<RequestForSession>,
    errors: Mutex<HashMap<(i64, i64), (bool, RaftResultCode)>>,
    store: Arc<KeeperStore>,
    responses: Arc<ResponsesQueue>,
    shutdown_called: AtomicBool,
    wake_mutex: Mutex<()>,
    wake_cv: Condvar,
    logic_errors: AtomicU64,
}

impl Shared {
    fn wake(&self) {
        let _guard = self.wake_mutex.lock();
        self.wake_cv.notify_all();
    }

    fn logic_failure(&self, message: String) {
        error!("{}", message);
        self.logic_errors.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct CommitProcessor {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl CommitProcessor {
    pub fn new(
        store: Arc<KeeperStore>,
        responses: Arc<ResponsesQueue>,
        queue_capacity: usize,
    ) -> Self {
        let shared = Arc::new(Shared {
            requests_queue: RequestsQueue::new(queue_capacity),
            committed_queue: ThreadSafeQueue::new(),
            errors: Mutex::new(HashMap::new()),
            store,
            responses,
            shutdown_called: AtomicBool::new(false),
            wake_mutex: Mutex::new(()),
            wake_cv: Condvar::new(),
            logic_errors: AtomicU64::new(0),
        });
        let worker = {
            let shared = Arc::clone(&shared);
            std::thread::spawn(move || run(shared))
        };
        CommitProcessor {
            shared,
            worker: Some(worker),
        }
    }

    /// Enqueue a client request. Blocks while the bounded queue is full;
    /// silently dropped once shutdown has been called.
    pub fn process_request(&self, request: RequestForSession) {
        if self.shared.shutdown_called.load(Ordering::Acquire) {
            return;
        }
        self.shared.requests_queue.push(request);
        self.shared.wake();
    }

    /// Consensus callback: a write is committed and may now be applied.
    pub fn commit(&self, request: RequestForSession) {
        if self.shared.shutdown_called.load(Ordering::Acquire) {
            return;
        }
        self.shared.committed_queue.push(request);
        self.shared.wake();
    }

    /// Consensus callback: replication of a write failed.
    pub fn on_error(&self, session_id: i64, xid: i64, accepted: bool, code: RaftResultCode) {
        if self.shared.shutdown_called.load(Ordering::Acquire) {
            return;
        }
        self.shared
            .errors
            .lock()
            .insert((session_id, xid), (accepted, code));
        self.shared.wake();
    }

    /// Count of internal ordering violations the worker has logged.
    pub fn logic_errors(&self) -> u64 {
        self.shared.logic_errors.load(Ordering::SeqCst)
    }

    /// Stop the worker and answer every still-queued request with
    /// session-expired.
    pub fn shutdown(&mut self) {
        if self.shared.shutdown_called.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shared.wake();

        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("Commit processor worker panicked");
            }
        }

        while let Some(request) = self.shared.requests_queue.try_pop() {
            let mut response = request.request.make_response();
            response.zxid = 0;
            response.error = KeeperError::SessionExpired;
            self.shared.responses.push(ResponseForSession {
                session_id: request.session_id,
                response,
            });
        }
        info!("Commit processor shut down");
    }
}

impl Drop for CommitProcessor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(shared: Arc<Shared>) {
    let mut pending_requests: HashMap<i64, VecDeque<RequestForSession>> = HashMap::new();
    let mut pending_write_xids: HashMap<i64, VecDeque<i64>> = HashMap::new();

    loop {
        {
            let mut guard = shared.wake_mutex.lock();
            while !shared.shutdown_called.load(Ordering::Acquire)
                && shared.errors.lock().is_empty()
                && pending_requests.is_empty()
                && shared.requests_queue.is_empty()
                && shared.committed_queue.is_empty()
            {
                shared.wake_cv.wait(&mut guard);
            }
        }

        if shared.shutdown_called.load(Ordering::Acquire) {
            return;
        }

        drain_errors(&shared, &mut pending_requests, &mut pending_write_xids);
        drain_input(&shared, &mut pending_requests, &mut pending_write_xids);
        serve_safe_reads(&shared, &mut pending_requests, &pending_write_xids);
        apply_committed(&shared, &mut pending_requests, &mut pending_write_xids);
    }
}

fn drain_errors(
    shared: &Shared,
    pending_requests: &mut HashMap<i64, VecDeque<RequestForSession>>,
    pending_write_xids: &mut HashMap<i64, VecDeque<i64>>,
) {
    let drained: Vec<((i64, i64), (bool, RaftResultCode))> = {
        let mut errors = shared.errors.lock();
        errors.drain().collect()
    };

    for ((session_id, xid), (accepted, code)) in drained {
        trace!("error session {}, xid {}", session_id, xid);

        let mut request = None;
        if let Some(requests) = pending_requests.get_mut(&session_id) {
            if let Some(pos) = requests.iter().position(|r| r.request.xid == xid) {
                request = requests.remove(pos);
            }
            if requests.is_empty() {
                pending_requests.remove(&session_id);
            }
        }
        if let Some(write_xids) = pending_write_xids.get_mut(&session_id) {
            if let Some(pos) = write_xids.iter().position(|&x| x == xid) {
                write_xids.remove(pos);
            }
            if write_xids.is_empty() {
                pending_write_xids.remove(&session_id);
            }
        }

        match request {
            Some(request) => {
                let mut response = request.request.make_response();
                response.zxid = 0;
                response.error = if code == RaftResultCode::Timeout {
                    KeeperError::OperationTimeout
                } else {
                    KeeperError::ConnectionLoss
                };
                if !accepted {
                    trace!(
                        "request not accepted by consensus, session {}, xid {}",
                        session_id,
                        xid
                    );
                }
                shared.responses.push(ResponseForSession {
                    session_id,
                    response,
                });
            }
            None => {
                shared.logic_failure(format!(
                    "consensus error for unknown request, session {}, xid {}",
                    session_id, xid
                ));
            }
        }
    }
}

fn drain_input(
    shared: &Shared,
    pending_requests: &mut HashMap<i64, VecDeque<RequestForSession>>,
    pending_write_xids: &mut HashMap<i64, VecDeque<i64>>,
) {
    // snapshot the size: arrivals during the drain wait for the next round
    let request_size = shared.requests_queue.len();
    trace!("request_size {}", request_size);
    for _ in 0..request_size {
        let Some(request) = shared.requests_queue.try_pop() else {
            break;
        };
        if !request.request.op.is_read() {
            pending_write_xids
                .entry(request.session_id)
                .or_default()
                .push_back(request.request.xid);
        }
        pending_requests
            .entry(request.session_id)
            .or_default()
            .push_back(request);
    }
}

/// Serve, per session, every head request submitted before the earliest
/// still-outstanding write; stop at the first write head.
fn serve_safe_reads(
    shared: &Shared,
    pending_requests: &mut HashMap<i64, VecDeque<RequestForSession>>,
    pending_write_xids: &HashMap<i64, VecDeque<i64>>,
) {
    pending_requests.retain(|session_id, requests| {
        while let Some(head) = requests.front() {
            let head_write_xid = pending_write_xids
                .get(session_id)
                .and_then(|w| w.front())
                .copied();
            let servable = match head_write_xid {
                None => true,
                Some(write_xid) => head.request.xid < write_xid,
            };
            if !servable {
                break;
            }
            if !head.request.op.is_read() {
                shared.logic_failure(format!(
                    "expected a read at the head of session {}, got write xid {}",
                    session_id, head.request.xid
                ));
                break;
            }
            trace!(
                "serving read session {}, xid {}",
                session_id,
                head.request.xid
            );
            if let Some(request) = requests.pop_front() {
                shared
                    .store
                    .process_request(&shared.responses, &request.request, request.session_id);
            }
        }
        !requests.is_empty()
    });
}

fn apply_committed(
    shared: &Shared,
    pending_requests: &mut HashMap<i64, VecDeque<RequestForSession>>,
    pending_write_xids: &mut HashMap<i64, VecDeque<i64>>,
) {
    let committed_size = shared.committed_queue.len();
    trace!("committed_request_size {}", committed_size);
    for _ in 0..committed_size {
        let Some(committed) = shared.committed_queue.try_pop() else {
            break;
        };
        let session_id = committed.session_id;
        let xid = committed.request.xid;

        let head_write_xid = pending_write_xids
            .get(&session_id)
            .and_then(|w| w.front())
            .copied();

        match head_write_xid {
            None => {
                // committed on behalf of a session owned by another node
                shared
                    .store
                    .process_request(&shared.responses, &committed.request, session_id);
            }
            Some(write_xid) if write_xid == xid => {
                let pending_head_xid = pending_requests
                    .get(&session_id)
                    .and_then(|p| p.front())
                    .map(|r| r.request.xid);
                if pending_head_xid != Some(xid) {
                    shared.logic_failure(format!(
                        "session {} pending head xid {:?} does not match committed xid {}",
                        session_id, pending_head_xid, xid
                    ));
                    continue;
                }

                shared
                    .store
                    .process_request(&shared.responses, &committed.request, session_id);

                if let Some(write_xids) = pending_write_xids.get_mut(&session_id) {
                    write_xids.pop_front();
                    if write_xids.is_empty() {
                        pending_write_xids.remove(&session_id);
                    }
                }
                if let Some(requests) = pending_requests.get_mut(&session_id) {
                    requests.pop_front();
                    if requests.is_empty() {
                        pending_requests.remove(&session_id);
                    }
                }
            }
            Some(write_xid) => {
                shared.logic_failure(format!(
                    "session {} pending head write xid {} does not match committed xid {}",
                    session_id, write_xid, xid
                ));
            }
        }
    }
}
