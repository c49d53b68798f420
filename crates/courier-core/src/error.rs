// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Courier sync engine.

use std::time::Duration;

use thiserror::Error;

/// The primary error type used across all Courier adapters and engine components.
#[derive(Debug, Error)]
pub enum CourierError {
    /// Configuration errors (invalid TOML, out-of-range values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Persistent store failure (write rejected, connection lost). Transient.
    #[error("store error: {message}")]
    Store {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The retry budget for a write or operation is spent. Terminal.
    #[error("gave up after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    /// Pub/sub transport failure (subscribe, send, track).
    #[error("transport error: {message}")]
    Transport {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// No staged operation exists with the given id.
    #[error("operation not found: {id}")]
    OperationNotFound { id: String },

    /// The entity an operation targets is not present in client state.
    #[error("{entity} not found: {id}")]
    EntityNotFound { entity: &'static str, id: String },

    /// A caller bug: mismatched confirmation, missing rollback snapshot.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// The component has shut down and no longer accepts work.
    #[error("component is shut down")]
    Shutdown,

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CourierError {
    /// Shorthand for a store error without an underlying source.
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for a transport error without an underlying source.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            source: None,
        }
    }

    /// Whether a failure is transient and worth retrying with backoff.
    ///
    /// Store, transport and timeout failures are transient. Exhausted
    /// budgets, shutdowns and programmer errors are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CourierError::Store { .. } | CourierError::Transport { .. } | CourierError::Timeout { .. }
        )
    }
}
