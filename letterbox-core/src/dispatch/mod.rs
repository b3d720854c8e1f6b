//! `TaskDispatcher` runs methods on a background worker thread and
//! correlates the asynchronous replies.
//!
//! ## Threads
//!
//! ```text
//!  caller ── submit() ──► WorkerRequest ──► worker thread (MethodCatalog)
//!    ▲                                            │
//!    │ TaskHandle (oneshot)                       ▼
//!    └──────────── reply pump thread ◄── WorkerEvent::{Reply, Exited}
//! ```
//!
//! Every request carries a slot from [`slots::SlotAllocator`]. The pump looks
//! the slot up in the pending table, releases it and resolves the caller's
//! [`TaskHandle`]. Replies may arrive in any order.
//!
//! When the worker exits for any reason the pump rejects every pending task
//! with [`LetterboxError::WorkerStopped`] and closes the dispatcher. The sweep
//! runs under the same lock as submission, so no task can slip into the
//! pending table while it is in progress.
//!
//! There is no per-task timeout: a method that never returns leaves its task
//! pending until the worker exits.

pub mod slots;
pub mod worker;

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::task::{Context, Poll};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tokio::sync::{oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::error::{LetterboxError, Result};
use crate::ipc::protocol::{WorkerReply, WorkerRequest};

use self::slots::{Slot, SlotAllocator};
use self::worker::{MethodCatalog, WorkerEvent, EXIT_TERMINATED};

/// Configuration for [`TaskDispatcher`].
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Name of the worker thread; the reply pump is named `<name>-replies`.
    pub worker_name: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            worker_name: "letterbox-worker".into(),
        }
    }
}

struct PendingTask {
    method: String,
    reply: oneshot::Sender<Result<Value>>,
}

/// Everything the caller side and the reply pump share. Guarded by one lock.
struct DispatchState {
    slots: SlotAllocator,
    pending: HashMap<Slot, PendingTask>,
    registered: BTreeSet<String>,
    /// `None` once the dispatcher is shut down or the worker has exited.
    requests: Option<Sender<WorkerRequest>>,
    exit_code: Option<i32>,
}

impl DispatchState {
    fn new(requests: Sender<WorkerRequest>) -> Self {
        Self {
            slots: SlotAllocator::new(),
            pending: HashMap::new(),
            registered: BTreeSet::new(),
            requests: Some(requests),
            exit_code: None,
        }
    }

    fn submit(&mut self, method: &str, payload: Value, is_registration: bool) -> TaskHandle {
        let (tx, rx) = oneshot::channel();

        let Some(requests) = self.requests.clone() else {
            let _ = tx.send(Err(self.closed_error()));
            return TaskHandle::detached(method, rx);
        };

        let slot = self.slots.generate();
        let request = WorkerRequest {
            slot,
            method: method.to_string(),
            payload,
            is_registration,
        };
        self.pending.insert(
            slot,
            PendingTask {
                method: method.to_string(),
                reply: tx,
            },
        );

        if requests.send(request).is_err() {
            // Worker already gone; its exit event has not been processed yet.
            if let Some(task) = self.pending.remove(&slot) {
                self.slots.revoke(slot);
                let _ = task.reply.send(Err(LetterboxError::DispatcherClosed));
            }
            return TaskHandle::detached(method, rx);
        }

        debug!(slot, method, is_registration, "task submitted");
        TaskHandle {
            slot: Some(slot),
            method: method.to_string(),
            rx,
        }
    }

    fn handle_reply(&mut self, reply: WorkerReply) {
        let WorkerReply {
            slot,
            method,
            is_error,
            result,
        } = reply;

        let Some(task) = self.pending.remove(&slot) else {
            warn!(slot, method = method.as_str(), "reply for a slot with no pending task");
            return;
        };
        self.slots.revoke(slot);

        let outcome = if is_error {
            Err(LetterboxError::Remote {
                method: task.method,
                detail: result,
            })
        } else {
            Ok(result)
        };
        debug!(slot, method = method.as_str(), is_error, "task settled");
        // The caller may have dropped its handle.
        let _ = task.reply.send(outcome);
    }

    /// Reject everything outstanding and close. Returns how many tasks were rejected.
    fn reject_all(&mut self, code: i32) -> usize {
        self.requests = None;
        self.exit_code = Some(code);
        self.slots.clear();

        let pending = std::mem::take(&mut self.pending);
        let count = pending.len();
        for (_, task) in pending {
            let _ = task.reply.send(Err(LetterboxError::WorkerStopped { code }));
        }
        count
    }

    fn closed_error(&self) -> LetterboxError {
        match self.exit_code {
            Some(code) => LetterboxError::WorkerStopped { code },
            None => LetterboxError::DispatcherClosed,
        }
    }
}

type SharedState = Arc<Mutex<DispatchState>>;

/// Future resolving to the worker's reply for one task.
///
/// Returned immediately by submission; the task runs whether or not the
/// handle is polled.
#[derive(Debug)]
pub struct TaskHandle {
    slot: Option<Slot>,
    method: String,
    rx: oneshot::Receiver<Result<Value>>,
}

impl TaskHandle {
    fn detached(method: &str, rx: oneshot::Receiver<Result<Value>>) -> Self {
        Self {
            slot: None,
            method: method.to_string(),
            rx,
        }
    }

    /// Slot assigned to the task, `None` if it was rejected before sending.
    pub fn slot(&self) -> Option<Slot> {
        self.slot
    }

    pub fn method(&self) -> &str {
        &self.method
    }
}

impl Future for TaskHandle {
    type Output = Result<Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => Poll::Ready(Err(LetterboxError::DispatcherClosed)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Caller-side handle for a registered method.
#[derive(Clone)]
pub struct MethodProxy {
    name: String,
    state: SharedState,
}

impl MethodProxy {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Send `payload` to the worker; resolves with the raw reply payload.
    pub fn invoke(&self, payload: Value) -> TaskHandle {
        self.state.lock().submit(&self.name, payload, false)
    }

    /// Typed call: serialise `request`, deserialise the reply.
    pub async fn call<Req, Resp>(&self, request: &Req) -> Result<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let payload = serde_json::to_value(request)?;
        let result = self.invoke(payload).await?;
        Ok(serde_json::from_value(result)?)
    }
}

impl std::fmt::Debug for MethodProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodProxy")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Owns one worker thread and the reply pump serving it.
///
/// Dropping the dispatcher detaches the worker the same way
/// [`shutdown`](Self::shutdown) does.
pub struct TaskDispatcher {
    state: SharedState,
    terminate: Arc<AtomicBool>,
    exit_rx: watch::Receiver<Option<i32>>,
    worker: Option<JoinHandle<()>>,
}

impl TaskDispatcher {
    /// Spawn a worker serving `catalog` with the default configuration.
    pub fn spawn(catalog: MethodCatalog) -> Result<Self> {
        Self::with_config(DispatcherConfig::default(), catalog)
    }

    pub fn with_config(config: DispatcherConfig, catalog: MethodCatalog) -> Result<Self> {
        let (request_tx, request_rx) = crossbeam_channel::unbounded();
        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        let (exit_tx, exit_rx) = watch::channel(None);
        let terminate = Arc::new(AtomicBool::new(false));
        let state: SharedState = Arc::new(Mutex::new(DispatchState::new(request_tx)));

        info!(
            worker = config.worker_name.as_str(),
            implementations = ?catalog.implementations(),
            "spawning worker"
        );
        let worker = worker::spawn(
            &config.worker_name,
            catalog,
            request_rx,
            event_tx,
            Arc::clone(&terminate),
        )?;

        let pump_state = Arc::clone(&state);
        thread::Builder::new()
            .name(format!("{}-replies", config.worker_name))
            .spawn(move || pump(pump_state, event_rx, exit_tx))?;

        Ok(Self {
            state,
            terminate,
            exit_rx,
            worker: Some(worker),
        })
    }

    /// Bind `name` to the catalog entry `implementation` inside the worker and
    /// return a proxy for it.
    pub async fn register_method(&self, name: &str, implementation: &str) -> Result<MethodProxy> {
        let handle = self.state.lock().submit(
            name,
            Value::String(implementation.to_string()),
            true,
        );
        handle.await?;

        self.state.lock().registered.insert(name.to_string());
        info!(method = name, implementation, "method available");
        Ok(self.proxy(name))
    }

    /// Proxy for a method registered earlier.
    pub fn method(&self, name: &str) -> Option<MethodProxy> {
        let known = self.state.lock().registered.contains(name);
        known.then(|| self.proxy(name))
    }

    /// Like [`method`](Self::method), failing with `UnknownMethod` for names
    /// never registered.
    pub fn require_method(&self, name: &str) -> Result<MethodProxy> {
        self.method(name)
            .ok_or_else(|| LetterboxError::UnknownMethod(name.to_string()))
    }

    /// Send a call for `method` whether or not it was registered. The worker
    /// answers unknown names with an error reply.
    pub fn submit(&self, method: &str, payload: Value) -> TaskHandle {
        self.state.lock().submit(method, payload, false)
    }

    /// Names registered so far, sorted.
    pub fn registered_methods(&self) -> Vec<String> {
        self.state.lock().registered.iter().cloned().collect()
    }

    /// Number of tasks awaiting a reply.
    pub fn outstanding(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Slots currently in use, ascending.
    pub fn live_slots(&self) -> Vec<Slot> {
        self.state.lock().slots.live().to_vec()
    }

    /// `true` once no further task can be submitted.
    pub fn is_closed(&self) -> bool {
        self.state.lock().requests.is_none()
    }

    /// Exit code of the worker, once it has exited and its tasks were swept.
    pub fn exit_code(&self) -> Option<i32> {
        *self.exit_rx.borrow()
    }

    /// Detach from the worker without waiting. Requests already queued are
    /// still answered; pending tasks are not rejected.
    pub fn shutdown(mut self) {
        self.close_requests();
        self.worker.take();
        info!("dispatcher shut down");
    }

    /// Stop the worker; the returned future resolves with its exit code once
    /// it has exited. The stop request takes effect immediately, before the
    /// future is polled. The worker stops before its next request; a method
    /// already running is allowed to return. Everything still pending is
    /// rejected with `WorkerStopped`. The future must run inside a tokio
    /// runtime.
    pub fn terminate(mut self) -> impl Future<Output = i32> + Send + 'static {
        self.terminate.store(true, Ordering::Release);
        self.close_requests();
        let mut exit_rx = self.exit_rx.clone();
        let worker = self.worker.take();

        async move {
            let code = match exit_rx.wait_for(Option::is_some).await {
                Ok(code) => (*code).unwrap_or(EXIT_TERMINATED),
                Err(_) => EXIT_TERMINATED,
            };
            if let Some(worker) = worker {
                // The exit event is sent as the thread unwinds its last frame,
                // so this join is short; it still must not block the executor.
                let _ = tokio::task::spawn_blocking(move || worker.join()).await;
            }
            info!(code, "dispatcher terminated");
            code
        }
    }

    fn proxy(&self, name: &str) -> MethodProxy {
        MethodProxy {
            name: name.to_string(),
            state: Arc::clone(&self.state),
        }
    }

    fn close_requests(&self) {
        self.state.lock().requests = None;
    }
}

impl Drop for TaskDispatcher {
    fn drop(&mut self) {
        self.close_requests();
    }
}

impl std::fmt::Debug for TaskDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskDispatcher")
            .field("outstanding", &self.outstanding())
            .field("exit_code", &self.exit_code())
            .finish_non_exhaustive()
    }
}

/// Reply pump: applies worker events to the shared state until the worker exits.
fn pump(
    state: SharedState,
    events: Receiver<WorkerEvent>,
    exit_tx: watch::Sender<Option<i32>>,
) {
    for event in events.iter() {
        match event {
            WorkerEvent::Reply(reply) => state.lock().handle_reply(reply),
            WorkerEvent::Exited { code } => {
                let rejected = state.lock().reject_all(code);
                if code == worker::EXIT_CLEAN {
                    info!(rejected, "worker exited");
                } else {
                    error!(code, rejected, "worker stopped, outstanding tasks rejected");
                }
                exit_tx.send_replace(Some(code));
                return;
            }
        }
    }
}
