//! Error types for the job tracker client.
//!
//! # Design
//! `NotFound` gets a dedicated variant so callers can tell "the record does
//! not exist" apart from a failed request. Store and identity-service
//! failures keep the status code and the service's own message. Validation
//! failures are raised before anything is sent.

use thiserror::Error;

/// Result type for client operations.
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors returned by the record and session layers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Input rejected client-side; no request was issued.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The requested record does not exist.
    #[error("record not found")]
    NotFound,

    /// The persistent store answered with an error.
    #[error("store error (HTTP {status}): {message}")]
    Store {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// The identity service answered with an error.
    #[error("auth error (HTTP {status}): {message}")]
    Auth { status: u16, message: String },

    /// The request never produced a response.
    #[error("transport failed: {0}")]
    Transport(String),

    #[error("deserialization failed: {0}")]
    Deserialization(String),

    #[error("serialization failed: {0}")]
    Serialization(String),

    /// A session operation was attempted from a state that does not allow it.
    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

/// Client-side input problems.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("invalid application date {0:?}, expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("unknown status {0:?}")]
    InvalidStatus(String),

    #[error("please enter both email and password")]
    MissingCredentials,

    #[error("please enter your email address")]
    MissingEmail,

    #[error("invalid or expired password reset link")]
    InvalidResetLink,

    #[error("please enter both password fields")]
    MissingPassword,

    #[error("passwords do not match")]
    PasswordMismatch,

    #[error("password must be at least {min} characters")]
    PasswordTooShort { min: usize },
}
