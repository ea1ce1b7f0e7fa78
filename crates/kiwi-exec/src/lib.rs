//! kiwi-exec
//!
//! The execution subsystem:
//! - chain resolver: walk executor references from a leaf tool to a terminal
//!   primitive, verifying signatures and detecting cycles
//! - integrity verifier: recompute stored hashes with memoized results
//! - config merger: deep-merge chain configs, leaf wins
//! - primitives: subprocess and HTTP (sync + streaming with sinks)
//! - primitive executor: resolve, verify, merge, dispatch
//!
//! Caches live behind mutexes and are never held across awaits; a
//! long-running tool execution does not starve concurrent resolution.

pub mod chain;
pub mod executor;
pub mod http;
pub mod merge;
pub mod sink;
pub mod subprocess;
pub mod subst;
pub mod verifier;

pub use crate::chain::{ChainError, ChainLink, ChainResolver};
pub use crate::executor::{ExecutionResult, PrimitiveExecutor};
pub use crate::sink::{EventSink, ReturnSink, SINKS_PARAM};
pub use crate::verifier::IntegrityVerifier;
