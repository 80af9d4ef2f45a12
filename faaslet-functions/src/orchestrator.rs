//! Invocation orchestration
//!
//! Runs one invocation end-to-end: create a container for the function's image,
//! start it, attach, stream the JSON event into stdin, close stdin, wait for
//! exit under a deadline, and collect the combined output.
//!
//! The container is removed exactly once on every path. Removal is
//! best-effort: a failed removal is logged and never replaces the error that
//! ended the invocation.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info, warn};

use crate::function::Function;
use crate::invocation::{InvocationError, InvocationResult};
use crate::metrics::MetricsSink;
use crate::runtime::{ContainerRuntime, UnitSpec};

/// Orchestrator settings
#[derive(Debug, Clone)]
pub struct InvokerConfig {
    /// Grace period handed to the runtime when stopping a timed-out container
    pub stop_grace: Duration,
    /// Record failed invocations in the failure counter. Successful invocations
    /// are always recorded.
    pub record_failures: bool,
}

impl Default for InvokerConfig {
    fn default() -> Self {
        Self {
            stop_grace: Duration::from_secs(2),
            record_failures: false,
        }
    }
}

/// Executes invocations in ephemeral containers
pub struct Invoker {
    runtime: Arc<dyn ContainerRuntime>,
    metrics: Arc<dyn MetricsSink>,
    config: InvokerConfig,
}

impl Invoker {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        metrics: Arc<dyn MetricsSink>,
        config: InvokerConfig,
    ) -> Self {
        Self {
            runtime,
            metrics,
            config,
        }
    }

    /// Invoke `function` with `payload`, giving it at most `timeout` to exit
    pub async fn invoke<P>(
        &self,
        function: &Function,
        payload: &P,
        timeout: Duration,
    ) -> Result<InvocationResult, InvocationError>
    where
        P: Serialize + ?Sized,
    {
        let outcome = self.run(function, payload, timeout).await;

        match &outcome {
            Ok(result) => {
                info!(
                    function = %function.name,
                    function_id = %function.id,
                    duration_ms = result.duration_ms(),
                    "Invocation completed"
                );
                self.metrics
                    .observe_invocation(&function.name, result.duration);
            }
            Err(e) => {
                warn!(
                    function = %function.name,
                    function_id = %function.id,
                    kind = e.kind(),
                    error = %e,
                    "Invocation failed"
                );
                if self.config.record_failures {
                    self.metrics.observe_failure(&function.name, e.kind());
                }
            }
        }

        outcome
    }

    async fn run<P>(
        &self,
        function: &Function,
        payload: &P,
        timeout: Duration,
    ) -> Result<InvocationResult, InvocationError>
    where
        P: Serialize + ?Sized,
    {
        if function.image.trim().is_empty() {
            return Err(InvocationError::Invalid(format!(
                "function {} has no image",
                function.id
            )));
        }
        if timeout.is_zero() {
            return Err(InvocationError::Invalid(
                "timeout must be greater than zero".to_string(),
            ));
        }

        let event = serde_json::to_vec(payload).map_err(InvocationError::PayloadEncoding)?;

        let started = Instant::now();
        let Some(deadline) = started.checked_add(timeout) else {
            return Err(InvocationError::Invalid(format!(
                "timeout of {}s is out of range",
                timeout.as_secs()
            )));
        };

        let unit_id = self
            .runtime
            .create(&UnitSpec::for_function(function))
            .await
            .map_err(InvocationError::Create)?;

        let unit = UnitGuard::new(self.runtime.clone(), unit_id);
        let outcome = self.drive(unit.id(), &event, deadline, timeout).await;
        let duration = started.elapsed();
        unit.release().await;

        let output = outcome?;
        Ok(InvocationResult {
            logs: output.clone(),
            output,
            duration,
        })
    }

    /// Everything between creation and removal
    async fn drive(
        &self,
        unit_id: &str,
        event: &[u8],
        deadline: Instant,
        timeout: Duration,
    ) -> Result<String, InvocationError> {
        self.runtime
            .start(unit_id)
            .await
            .map_err(InvocationError::Start)?;

        let mut input = self
            .runtime
            .attach(unit_id)
            .await
            .map_err(InvocationError::Attach)?;

        let write = async {
            if !event.is_empty() {
                input.write_all(event).await?;
            }
            input.shutdown().await
        };
        match timeout_at(deadline, write).await {
            Ok(written) => written.map_err(InvocationError::Input)?,
            Err(_) => return Err(self.expire(unit_id, timeout).await),
        }
        drop(input);

        match timeout_at(deadline, self.runtime.wait(unit_id)).await {
            Err(_) => return Err(self.expire(unit_id, timeout).await),
            Ok(Err(e)) => return Err(InvocationError::Runtime(e)),
            Ok(Ok(exit_code)) => {
                debug!(container_id = %unit_id, exit_code, "Container exited");
            }
        }

        let logs = self
            .runtime
            .logs(unit_id)
            .await
            .map_err(InvocationError::Runtime)?;

        Ok(String::from_utf8_lossy(&logs).into_owned())
    }

    /// Deadline passed: ask the container to stop and report the timeout
    async fn expire(&self, unit_id: &str, timeout: Duration) -> InvocationError {
        warn!(
            container_id = %unit_id,
            timeout_secs = timeout.as_secs(),
            "Invocation deadline exceeded, stopping container"
        );

        if let Err(e) = self.runtime.stop(unit_id, self.config.stop_grace).await {
            warn!(container_id = %unit_id, error = %e, "Failed to stop container");
        }

        InvocationError::Timeout(timeout)
    }
}

/// Removal obligation for one created container.
///
/// `release` removes the container in place. If the guard is dropped instead
/// (the invocation future was cancelled mid-flight) removal is spawned onto the
/// current runtime.
struct UnitGuard {
    runtime: Arc<dyn ContainerRuntime>,
    unit_id: Option<String>,
}

impl UnitGuard {
    fn new(runtime: Arc<dyn ContainerRuntime>, unit_id: String) -> Self {
        Self {
            runtime,
            unit_id: Some(unit_id),
        }
    }

    fn id(&self) -> &str {
        self.unit_id.as_deref().unwrap_or_default()
    }

    async fn release(mut self) {
        if let Some(unit_id) = self.unit_id.take() {
            remove_unit(self.runtime.as_ref(), &unit_id).await;
        }
    }
}

impl Drop for UnitGuard {
    fn drop(&mut self) {
        let Some(unit_id) = self.unit_id.take() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let runtime = self.runtime.clone();
                handle.spawn(async move {
                    remove_unit(runtime.as_ref(), &unit_id).await;
                });
            }
            Err(_) => {
                error!(container_id = %unit_id, "No async runtime to remove container, leaking it");
            }
        }
    }
}

/// Best-effort removal: failures are logged, not propagated
async fn remove_unit(runtime: &dyn ContainerRuntime, unit_id: &str) {
    if let Err(e) = runtime.remove(unit_id).await {
        warn!(container_id = %unit_id, error = %e, "Failed to remove container");
    }
}
