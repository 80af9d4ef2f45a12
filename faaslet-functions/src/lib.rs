//! Function registry and container-backed invocation engine
//!
//! Functions are name + image pairs. Each invocation runs in a fresh Docker
//! container that receives the JSON event on stdin and is removed afterwards.

pub mod docker;
pub mod function;
pub mod handlers;
pub mod invocation;
pub mod metrics;
pub mod orchestrator;
pub mod registry;
pub mod router;
pub mod runtime;
pub mod tracker;

#[cfg(test)]
mod test_support;

pub use docker::{DockerRuntime, DockerRuntimeConfig};
pub use function::Function;
pub use handlers::{FunctionsConfig, FunctionsState};
pub use invocation::{AsyncInvocation, InvocationError, InvocationResult, InvocationStatus};
pub use orchestrator::{Invoker, InvokerConfig};
pub use registry::{FunctionRegistry, FunctionStore, JsonFileStore, MemoryStore};
pub use router::functions_router;
pub use runtime::{ContainerRuntime, RuntimeError, UnitInput, UnitSpec};
pub use tracker::AsyncTracker;
