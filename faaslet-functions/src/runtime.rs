//! Container runtime abstraction
//!
//! The orchestrator drives execution units through this trait so the lifecycle
//! logic can run against Docker or against an in-process double.

use async_trait::async_trait;
use std::path::Path;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWrite;

use crate::function::Function;

/// Errors reported by a container runtime
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Docker error: {0}")]
    Docker(#[from] bollard::errors::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Writable standard input of an attached execution unit.
///
/// Shutting the writer down signals end-of-input to the function.
pub type UnitInput = Pin<Box<dyn AsyncWrite + Send>>;

/// What an execution unit runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitSpec {
    pub image: String,
    pub function_id: String,
}

impl UnitSpec {
    pub fn for_function(function: &Function) -> Self {
        Self {
            image: function.image.clone(),
            function_id: function.id.clone(),
        }
    }
}

/// Lifecycle primitives of a container engine
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Create a unit with stdin open (close-once) and stdout/stderr attachable.
    /// Returns the unit's opaque ID.
    async fn create(&self, spec: &UnitSpec) -> Result<String, RuntimeError>;

    async fn start(&self, unit_id: &str) -> Result<(), RuntimeError>;

    /// Attach to the unit's standard streams, returning its input side
    async fn attach(&self, unit_id: &str) -> Result<UnitInput, RuntimeError>;

    /// Wait until the unit is no longer running and return its exit code
    async fn wait(&self, unit_id: &str) -> Result<i64, RuntimeError>;

    async fn stop(&self, unit_id: &str, grace: Duration) -> Result<(), RuntimeError>;

    /// Forcibly remove the unit
    async fn remove(&self, unit_id: &str) -> Result<(), RuntimeError>;

    /// Combined stdout/stderr of the unit, in full
    async fn logs(&self, unit_id: &str) -> Result<Vec<u8>, RuntimeError>;

    /// Image references known to the engine
    async fn list_images(&self) -> Result<Vec<String>, RuntimeError>;

    /// Load an image archive (as produced by `docker save`)
    async fn load_image(&self, archive: &Path) -> Result<(), RuntimeError>;
}
