//! Asynchronous invocation tracking
//!
//! `dispatch` records a Pending entry and returns at once; a background task
//! drives the invocation and reports through the entry. Pollers read snapshots.
//!
//! Locking is two-level: the table lock guards membership only, and each entry
//! has its own lock for its fields. Neither lock is held across an await, so a
//! long-running invocation never blocks pollers or other invocations.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::invocation::{AsyncInvocation, InvocationError};
use crate::orchestrator::Invoker;
use crate::registry::FunctionRegistry;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Invocation not found: {0}")]
    NotFound(String),
}

type Entry = Arc<Mutex<AsyncInvocation>>;

/// All known asynchronous invocations
#[derive(Default)]
pub struct InvocationTable {
    entries: RwLock<HashMap<String, Entry>>,
}

impl InvocationTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&self, invocation: AsyncInvocation) -> Entry {
        let id = invocation.id.clone();
        let entry = Arc::new(Mutex::new(invocation));
        self.entries.write().insert(id, entry.clone());
        entry
    }

    fn entry(&self, id: &str) -> Option<Entry> {
        self.entries.read().get(id).cloned()
    }

    /// Copy of the entry, read under its lock
    pub fn snapshot(&self, id: &str) -> Option<AsyncInvocation> {
        let entry = self.entry(id)?;
        let invocation = entry.lock().clone();
        Some(invocation)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop terminal entries that completed before `now - retention`.
    /// Pending and Running entries are kept. Returns how many were evicted.
    pub fn evict_completed(&self, retention: Duration, now: DateTime<Utc>) -> usize {
        let Ok(retention) = chrono::Duration::from_std(retention) else {
            return 0;
        };
        let cutoff = now - retention;

        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| {
            let invocation = entry.lock();
            !matches!(invocation.completed_at, Some(at) if at < cutoff)
        });
        before - entries.len()
    }
}

/// Dispatches invocations in the background and answers status polls
#[derive(Clone)]
pub struct AsyncTracker {
    table: Arc<InvocationTable>,
    registry: FunctionRegistry,
    invoker: Arc<Invoker>,
}

impl AsyncTracker {
    pub fn new(registry: FunctionRegistry, invoker: Arc<Invoker>) -> Self {
        Self {
            table: Arc::new(InvocationTable::new()),
            registry,
            invoker,
        }
    }

    pub fn table(&self) -> &InvocationTable {
        &self.table
    }

    /// Record a new invocation and start it in the background.
    ///
    /// Returns the Pending entry without waiting for the invocation.
    pub fn dispatch(
        &self,
        function_id: &str,
        payload: serde_json::Value,
        timeout: Duration,
    ) -> AsyncInvocation {
        let invocation = AsyncInvocation::new(function_id);
        let handle = invocation.clone();
        let entry = self.table.insert(invocation);

        debug!(invocation_id = %handle.id, function_id = %function_id, "Dispatched invocation");

        let task = InvocationTask {
            entry,
            function_id: function_id.to_string(),
            payload,
            timeout,
            registry: self.registry.clone(),
            invoker: self.invoker.clone(),
        };
        tokio::spawn(task.supervise());

        handle
    }

    pub fn status(&self, invocation_id: &str) -> Result<AsyncInvocation, TrackerError> {
        self.table
            .snapshot(invocation_id)
            .ok_or_else(|| TrackerError::NotFound(invocation_id.to_string()))
    }

    /// Periodically evict terminal entries older than `retention`
    pub fn spawn_reaper(&self, retention: Duration, interval: Duration) -> JoinHandle<()> {
        let table = self.table.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let evicted = table.evict_completed(retention, Utc::now());
                if evicted > 0 {
                    info!(evicted, remaining = table.len(), "Evicted finished invocations");
                }
            }
        })
    }
}

/// Background work for one invocation. Owns its entry.
struct InvocationTask {
    entry: Entry,
    function_id: String,
    payload: serde_json::Value,
    timeout: Duration,
    registry: FunctionRegistry,
    invoker: Arc<Invoker>,
}

impl InvocationTask {
    /// Run the invocation on its own task so a panic surfaces here as a
    /// `JoinError` and still resolves the entry.
    async fn supervise(self) {
        let entry = self.entry.clone();

        if let Err(e) = tokio::spawn(self.run()).await {
            let message = if e.is_panic() {
                "invocation task panicked"
            } else {
                "invocation task was cancelled"
            };

            let mut invocation = entry.lock();
            error!(invocation_id = %invocation.id, error = %e, "{}", message);
            invocation.fail(message);
        }
    }

    async fn run(self) {
        let invocation_id = {
            let mut invocation = self.entry.lock();
            invocation.mark_running();
            invocation.id.clone()
        };

        let function = match self.registry.get(&self.function_id) {
            Ok(function) => function,
            Err(_) => {
                let error = InvocationError::FunctionNotFound(self.function_id.clone());
                info!(invocation_id = %invocation_id, error = %error, "Invocation failed");
                self.entry.lock().fail(error.to_string());
                return;
            }
        };

        let outcome = self
            .invoker
            .invoke(&function, &self.payload, self.timeout)
            .await;

        let mut invocation = self.entry.lock();
        match outcome {
            Ok(result) => {
                invocation.complete(result);
            }
            Err(e) => {
                invocation.fail(e.to_string());
            }
        }
        debug!(invocation_id = %invocation_id, status = ?invocation.status, "Invocation finished");
    }
}
