//! Core types for faaslet
//!
//! This crate provides the error vocabulary shared by the faaslet service crates.

pub mod error;

pub use error::{ApiError, ErrorCode};
