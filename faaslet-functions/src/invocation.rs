//! Invocation results, errors and asynchronous invocation state

use chrono::{DateTime, Utc};
use faaslet_core::ErrorCode;
use serde::{Serialize, Serializer};
use std::time::Duration;
use thiserror::Error;

use crate::runtime::RuntimeError;

#[derive(Debug, Error)]
pub enum InvocationError {
    #[error("Function not found: {0}")]
    FunctionNotFound(String),

    #[error("Invalid invocation: {0}")]
    Invalid(String),

    #[error("Failed to encode payload: {0}")]
    PayloadEncoding(#[source] serde_json::Error),

    #[error("Failed to create container: {0}")]
    Create(#[source] RuntimeError),

    #[error("Failed to start container: {0}")]
    Start(#[source] RuntimeError),

    #[error("Failed to attach to container: {0}")]
    Attach(#[source] RuntimeError),

    #[error("Failed to write payload to container: {0}")]
    Input(#[source] std::io::Error),

    #[error("Container execution failed: {0}")]
    Runtime(#[source] RuntimeError),

    #[error("Invocation timed out after {}s", .0.as_secs())]
    Timeout(Duration),
}

impl InvocationError {
    /// Short name of the failure, used as a metrics label
    pub fn kind(&self) -> &'static str {
        match self {
            Self::FunctionNotFound(_) => "not_found",
            Self::Invalid(_) => "invalid",
            Self::PayloadEncoding(_) => "payload_encoding",
            Self::Create(_) => "create",
            Self::Start(_) => "start",
            Self::Attach(_) => "attach",
            Self::Input(_) => "input",
            Self::Runtime(_) => "runtime",
            Self::Timeout(_) => "timeout",
        }
    }

    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::FunctionNotFound(_) => ErrorCode::NotFound,
            Self::Invalid(_) => ErrorCode::ValidationError,
            Self::PayloadEncoding(_) => ErrorCode::PayloadEncodingError,
            Self::Create(_) => ErrorCode::CreateError,
            Self::Start(_) => ErrorCode::StartError,
            Self::Attach(_) | Self::Input(_) => ErrorCode::AttachError,
            Self::Runtime(_) => ErrorCode::RuntimeError,
            Self::Timeout(_) => ErrorCode::TimeoutError,
        }
    }
}

/// Output of a completed invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvocationResult {
    pub output: String,
    pub logs: String,
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
}

impl InvocationResult {
    pub fn duration_ms(&self) -> u64 {
        u64::try_from(self.duration.as_millis()).unwrap_or(u64::MAX)
    }
}

fn serialize_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}

/// Status of an asynchronous invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvocationStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl InvocationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// A backgrounded invocation and its outcome.
///
/// Transitions only move forward: Pending, Running, then exactly one of
/// Completed (with a result) or Failed (with an error).
#[derive(Debug, Clone, Serialize)]
pub struct AsyncInvocation {
    pub id: String,
    pub function_id: String,
    pub status: InvocationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<InvocationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl AsyncInvocation {
    pub fn new(function_id: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            function_id: function_id.into(),
            status: InvocationStatus::Pending,
            result: None,
            error: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Pending -> Running. Returns false if the entry had already moved on.
    pub fn mark_running(&mut self) -> bool {
        if self.status != InvocationStatus::Pending {
            return false;
        }
        self.status = InvocationStatus::Running;
        true
    }

    /// Move to Completed. No-op on a terminal entry.
    pub fn complete(&mut self, result: InvocationResult) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = InvocationStatus::Completed;
        self.result = Some(result);
        self.completed_at = Some(Utc::now());
        true
    }

    /// Move to Failed. No-op on a terminal entry.
    pub fn fail(&mut self, error: impl Into<String>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = InvocationStatus::Failed;
        self.error = Some(error.into());
        self.completed_at = Some(Utc::now());
        true
    }
}
