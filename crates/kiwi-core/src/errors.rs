//! Error types for kiwi-core.
//!
//! Errors carry a stable category plus a human-readable message. Higher layers
//! (store, executor, CLI) translate these into the uniform response envelope;
//! the core never formats remediation hints itself.

use thiserror::Error;

/// Result alias used across kiwi-core.
pub type KiwiResult<T> = Result<T, KiwiError>;

#[derive(Debug, Error)]
pub enum KiwiError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("invariant violated: {0}")]
    Invariant(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl KiwiError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        KiwiError::InvalidArgument(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        KiwiError::Parse(msg.into())
    }

    pub fn serialization(msg: impl Into<String>) -> Self {
        KiwiError::Serialization(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        KiwiError::Invariant(msg.into())
    }
}
