//! Unified error types for the engine
//!
//! This module defines error types that:
//! - Are serializable for frontend consumption
//! - Provide actionable error messages
//! - Map collaborator failures to user-friendly variants

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Engine error type for services and collaborators
///
/// All errors are serializable so they can be forwarded to a host shell.
/// Error messages should be user-friendly and actionable.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum ComposeError {
    #[error("Editor not found: {0}")]
    EditorNotFound(String),

    #[error("Attachment not found: {0}")]
    AttachmentNotFound(String),

    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("Upload cancelled")]
    Cancelled,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Draft persistence error: {0}")]
    Persistence(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    Other(String),
}

// Implement From for common error types

impl From<serde_json::Error> for ComposeError {
    fn from(err: serde_json::Error) -> Self {
        ComposeError::Parse(err.to_string())
    }
}

impl From<String> for ComposeError {
    fn from(err: String) -> Self {
        ComposeError::Other(err)
    }
}

impl From<&str> for ComposeError {
    fn from(err: &str) -> Self {
        ComposeError::Other(err.to_string())
    }
}

/// Result type alias using ComposeError
pub type Result<T> = std::result::Result<T, ComposeError>;
