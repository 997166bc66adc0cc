//! Error types for Recommends operations.
//!
//! This module provides a common `Error` type and `Result<T>` alias used across
//! all Recommends crates. Uses `thiserror` for derive macros.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors that can occur in Recommends operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// I/O error tied to a specific file.
    #[error("I/O error at {path}: {source}")]
    IoPath {
        /// The file or directory involved.
        path: PathBuf,
        /// The underlying error.
        source: std::io::Error,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A domain, provider, or stored artifact was not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A capability the caller relies on was never supplied.
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// Invalid data or format.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Storage backend failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Background task submission or execution failure.
    #[error("Task queue error: {0}")]
    TaskQueue(String),
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a not found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a not implemented error.
    pub fn not_implemented(msg: impl Into<String>) -> Self {
        Self::NotImplemented(msg.into())
    }

    /// Create an invalid data error.
    pub fn invalid_data(msg: impl Into<String>) -> Self {
        Self::InvalidData(msg.into())
    }

    /// Create a storage error.
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a task queue error.
    pub fn task_queue(msg: impl Into<String>) -> Self {
        Self::TaskQueue(msg.into())
    }

    /// Wrap an I/O error with the path it occurred on.
    pub fn io_with_path(source: std::io::Error, path: impl AsRef<Path>) -> Self {
        Self::IoPath {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Whether retrying the failed operation may succeed.
    ///
    /// Transient I/O and storage failures are retryable; programmer errors
    /// (unknown domains, missing capabilities, bad data) are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::IoPath { .. } | Self::Storage(_) | Self::TaskQueue(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type alias using Recommends' Error type.
pub type Result<T> = std::result::Result<T, Error>;
