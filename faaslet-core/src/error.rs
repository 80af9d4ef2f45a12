//! API error codes and formatting

use serde::Serialize;
use thiserror::Error;

/// Error codes surfaced by the HTTP API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Request errors
    ValidationError,
    NotFound,

    // Invocation errors
    PayloadEncodingError,
    CreateError,
    StartError,
    AttachError,
    RuntimeError,
    TimeoutError,

    // Service errors
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationError => "ValidationError",
            Self::NotFound => "NotFoundError",
            Self::PayloadEncodingError => "PayloadEncodingError",
            Self::CreateError => "CreateError",
            Self::StartError => "StartError",
            Self::AttachError => "AttachError",
            Self::RuntimeError => "RuntimeError",
            Self::TimeoutError => "TimeoutError",
            Self::InternalError => "InternalError",
        }
    }

    /// Invocation failures of every kind surface as opaque 500s.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::ValidationError => 400,
            Self::NotFound => 404,
            Self::PayloadEncodingError
            | Self::CreateError
            | Self::StartError
            | Self::AttachError
            | Self::RuntimeError
            | Self::TimeoutError
            | Self::InternalError => 500,
        }
    }
}

/// Error returned to API callers
#[derive(Debug, Error)]
#[error("{}: {message}", .code.as_str())]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn http_status(&self) -> u16 {
        self.code.http_status()
    }

    /// Format as the JSON error body, `{"error": ..., "code": ...}`
    pub fn to_json(&self) -> String {
        #[derive(Serialize)]
        struct JsonError<'a> {
            error: &'a str,
            code: &'static str,
        }

        let error = JsonError {
            error: &self.message,
            code: self.code.as_str(),
        };

        serde_json::to_string(&error).unwrap_or_else(|_| {
            format!(r#"{{"error":"{}","code":"{}"}}"#, self.message, self.code.as_str())
        })
    }
}
