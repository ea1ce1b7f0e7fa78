//! kiwi-store
//!
//! Scoped artifact storage:
//! - path resolution across project and user roots (project wins)
//! - recursive search with relevance scoring
//! - advisory file locking for all write paths
//! - the sign / load / delete pipelines
//! - layered `.env` loading for process environments
//!
//! The store owns every file write in the system. Reads are safe to run
//! concurrently; writes take an exclusive advisory lock on a sibling `.lock`
//! file before read-modify-write.

pub mod envfile;
pub mod lock;
pub mod paths;
pub mod search;
pub mod store;

pub use crate::paths::{user_space, Roots};
pub use crate::store::{SignOutcome, Store};

use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} '{id}' not found")]
    NotFound { kind: String, id: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] kiwi_core::KiwiError),

    #[error("lock error on {path}: {message}")]
    Lock { path: String, message: String },
}
