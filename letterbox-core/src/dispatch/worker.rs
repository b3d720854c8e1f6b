//! Worker side of the dispatcher.
//!
//! The worker runs on its own OS thread and talks to the dispatcher only
//! through channels. It owns two tables:
//!
//! - the [`MethodCatalog`]: every implementation compiled into the binary,
//!   keyed by implementation name, fixed when the worker is spawned;
//! - the bound method table: public method names bound to catalog entries by
//!   registration requests.
//!
//! A method returning `Err` produces an error reply. A method that panics
//! takes the worker down; the exit guard then reports the exit so the
//! dispatcher can reject everything still outstanding.

use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::{self, JoinHandle};

use anyhow::anyhow;
use crossbeam_channel::{Receiver, Sender};
use serde_json::Value;
use tracing::{debug, warn};

use crate::ipc::protocol::{WorkerReply, WorkerRequest};

/// A callable method implementation.
pub type MethodFn = Arc<dyn Fn(Value) -> anyhow::Result<Value> + Send + Sync>;

/// Exit code when the request channel closed normally.
pub const EXIT_CLEAN: i32 = 0;
/// Exit code after `terminate()`.
pub const EXIT_TERMINATED: i32 = 1;
/// Exit code when a method panicked.
pub const EXIT_PANICKED: i32 = 101;

/// Implementations available to the worker, by name.
#[derive(Clone, Default)]
pub struct MethodCatalog {
    entries: HashMap<String, MethodFn>,
}

impl MethodCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) an implementation.
    pub fn insert<F>(&mut self, implementation: impl Into<String>, method: F) -> &mut Self
    where
        F: Fn(Value) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.entries.insert(implementation.into(), Arc::new(method));
        self
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with<F>(mut self, implementation: impl Into<String>, method: F) -> Self
    where
        F: Fn(Value) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.insert(implementation, method);
        self
    }

    pub fn contains(&self, implementation: &str) -> bool {
        self.entries.contains_key(implementation)
    }

    /// Implementation names, sorted.
    pub fn implementations(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }

    fn get(&self, implementation: &str) -> Option<&MethodFn> {
        self.entries.get(implementation)
    }
}

impl std::fmt::Debug for MethodCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodCatalog")
            .field("implementations", &self.implementations())
            .finish()
    }
}

/// What the worker thread reports back to the dispatcher.
#[derive(Debug)]
pub(crate) enum WorkerEvent {
    Reply(WorkerReply),
    Exited { code: i32 },
}

/// Sends `Exited` when the worker thread ends, including by panic.
struct ExitGuard {
    events: Sender<WorkerEvent>,
    code: i32,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        let code = if thread::panicking() {
            EXIT_PANICKED
        } else {
            self.code
        };
        let _ = self.events.send(WorkerEvent::Exited { code });
    }
}

struct Worker {
    catalog: MethodCatalog,
    methods: HashMap<String, MethodFn>,
}

pub(crate) fn spawn(
    name: &str,
    catalog: MethodCatalog,
    requests: Receiver<WorkerRequest>,
    events: Sender<WorkerEvent>,
    terminate: Arc<AtomicBool>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new().name(name.to_string()).spawn(move || {
        let mut guard = ExitGuard {
            events: events.clone(),
            code: EXIT_PANICKED,
        };
        let mut worker = Worker {
            catalog,
            methods: HashMap::new(),
        };
        guard.code = worker.run(&requests, &events, &terminate);
    })
}

impl Worker {
    fn run(
        &mut self,
        requests: &Receiver<WorkerRequest>,
        events: &Sender<WorkerEvent>,
        terminate: &AtomicBool,
    ) -> i32 {
        for request in requests.iter() {
            if terminate.load(Ordering::Acquire) {
                debug!(slot = request.slot, "worker terminating, request dropped");
                return EXIT_TERMINATED;
            }
            let reply = self.handle(request);
            if events.send(WorkerEvent::Reply(reply)).is_err() {
                break;
            }
        }

        if terminate.load(Ordering::Acquire) {
            EXIT_TERMINATED
        } else {
            EXIT_CLEAN
        }
    }

    fn handle(&mut self, request: WorkerRequest) -> WorkerReply {
        let WorkerRequest {
            slot,
            method,
            payload,
            is_registration,
        } = request;

        let outcome = if is_registration {
            self.register(&method, &payload).map(|()| Value::Null)
        } else {
            self.execute(&method, payload)
        };

        match outcome {
            Ok(result) => WorkerReply::success(slot, method, result),
            Err(e) => {
                warn!(slot, method = method.as_str(), "task failed: {e:#}");
                WorkerReply::failure(slot, method, format!("{e:#}"))
            }
        }
    }

    fn register(&mut self, method: &str, payload: &Value) -> anyhow::Result<()> {
        let implementation = payload
            .as_str()
            .ok_or_else(|| anyhow!("registration of `{method}` must name an implementation"))?;
        let callable = self
            .catalog
            .get(implementation)
            .ok_or_else(|| anyhow!("unknown implementation: {implementation}"))?;
        self.methods.insert(method.to_string(), Arc::clone(callable));
        debug!(method, implementation, "method registered");
        Ok(())
    }

    fn execute(&self, method: &str, payload: Value) -> anyhow::Result<Value> {
        let callable = self
            .methods
            .get(method)
            .ok_or_else(|| anyhow!("unknown method: {method}"))?;
        callable(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn worker() -> Worker {
        Worker {
            catalog: MethodCatalog::new()
                .with("math.double", |v| Ok(json!(v.as_i64().unwrap_or(0) * 2)))
                .with("math.fail", |_| Err(anyhow!("nope"))),
            methods: HashMap::new(),
        }
    }

    #[test]
    fn registered_method_executes() {
        let mut w = worker();
        let reply = w.handle(WorkerRequest::registration(0, "double", "math.double"));
        assert!(!reply.is_error);

        let reply = w.handle(WorkerRequest::call(1, "double", json!(21)));
        assert_eq!(reply, WorkerReply::success(1, "double", json!(42)));
    }

    #[test]
    fn unregistered_method_is_an_error_reply() {
        let mut w = worker();
        let reply = w.handle(WorkerRequest::call(3, "double", json!(1)));
        assert!(reply.is_error);
        assert_eq!(reply.slot, 3);
        assert_eq!(reply.result, json!("unknown method: double"));
    }

    #[test]
    fn registering_unknown_implementation_fails() {
        let mut w = worker();
        let reply = w.handle(WorkerRequest::registration(0, "x", "math.missing"));
        assert!(reply.is_error);
        assert_eq!(reply.result, json!("unknown implementation: math.missing"));
    }

    #[test]
    fn method_error_becomes_error_reply() {
        let mut w = worker();
        w.handle(WorkerRequest::registration(0, "fail", "math.fail"));
        let reply = w.handle(WorkerRequest::call(1, "fail", Value::Null));
        assert!(reply.is_error);
        assert_eq!(reply.result, json!("nope"));
    }

    #[test]
    fn catalog_lists_implementations_sorted() {
        let catalog = MethodCatalog::new().with("b", |v| Ok(v)).with("a", |v| Ok(v));
        assert_eq!(catalog.implementations(), vec!["a".to_string(), "b".to_string()]);
        assert!(catalog.contains("a"));
    }
}
