// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Courier delivery and caching core.

use thiserror::Error;

/// The primary error type used across all Courier crates.
#[derive(Debug, Error)]
pub enum CourierError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Local storage errors (database connection, query failure, I/O).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Remote document store rejected or failed a write.
    ///
    /// `retryable` is false for permanent rejections (bad payload, permission denied).
    #[error("remote store error: {message}")]
    Remote { message: String, retryable: bool },

    /// The generation service (LLM completion or embedding) failed.
    #[error("generation error: {message}")]
    Generation {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A value could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A referenced entity does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Persisted data could not be parsed and was discarded.
    #[error("corrupted store `{store}`: {detail}")]
    Corrupted { store: String, detail: String },

    /// Operation requires connectivity but the device is offline.
    #[error("device is offline")]
    Offline,

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CourierError {
    /// Wrap any error as a storage error.
    pub fn storage<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        CourierError::Storage {
            source: Box::new(err),
        }
    }

    /// Build a transient remote error.
    pub fn remote(message: impl Into<String>) -> Self {
        CourierError::Remote {
            message: message.into(),
            retryable: true,
        }
    }

    /// Build a generation error without an underlying source.
    pub fn generation(message: impl Into<String>) -> Self {
        CourierError::Generation {
            message: message.into(),
            source: None,
        }
    }

    /// Whether retrying the failed operation may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            CourierError::Remote { retryable, .. } => *retryable,
            CourierError::Offline | CourierError::Timeout { .. } | CourierError::Storage { .. } => {
                true
            }
            _ => false,
        }
    }
}
