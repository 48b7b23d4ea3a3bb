// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Switchboard gateway.

use std::time::Duration;

use strum::Display;
use thiserror::Error;

/// The primary error type shared by every Switchboard crate.
///
/// The first six variants form the caller-facing taxonomy. The rest cover
/// ambient failures (configuration, storage, timeouts) that callers map onto
/// the same taxonomy through [`SwitchboardError::kind`].
#[derive(Debug, Error)]
pub enum SwitchboardError {
    /// A tenant, job, or configuration record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Duplicate tenant creation or an operation already in progress.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The operation needs a logged-in session.
    #[error("not authenticated: {0}")]
    Unauthenticated(String),

    /// Malformed input rejected before reaching the core.
    #[error("validation error: {0}")]
    Validation(String),

    /// Network or locked-database conditions that may succeed on retry.
    #[error("transient error: {message}")]
    Transient {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Unrecoverable failure (exhausted retries, failed dead-letter push).
    #[error("fatal error: {0}")]
    Fatal(String),

    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Coarse classification of a [`SwitchboardError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Unauthenticated,
    Validation,
    Transient,
    Fatal,
    Internal,
}

impl SwitchboardError {
    /// Shorthand for a transient error without an underlying source.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
            source: None,
        }
    }

    /// Returns the taxonomy bucket this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Unauthenticated(_) => ErrorKind::Unauthenticated,
            Self::Validation(_) | Self::Config(_) => ErrorKind::Validation,
            Self::Transient { .. } | Self::Timeout { .. } => ErrorKind::Transient,
            Self::Fatal(_) => ErrorKind::Fatal,
            Self::Storage { .. } | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether a retry of the same operation could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transient { .. } | Self::Timeout { .. } | Self::Storage { .. }
        )
    }
}
