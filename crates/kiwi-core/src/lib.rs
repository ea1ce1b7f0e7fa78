//! kiwi-core
//!
//! Core primitives for the kiwi artifact store:
//! - Artifact models (directives, tools, knowledge entries)
//! - Parsers (XML-in-Markdown, Python module constants, YAML front-matter)
//! - Signature strategies (per-kind signature embedding and canonical bodies)
//! - Canonical JSON encoding for deterministic hashing
//! - Unified integrity hashes with SHA-256
//! - Structural validators
//!
//! The core crate performs no network I/O and no process spawning. File reads
//! happen only through the thin `parse_*_file` helpers; everything else
//! operates on in-memory content so the higher layers (store, executor, CLI)
//! own all side effects.

pub mod artifact;
pub mod canonical;
pub mod errors;
pub mod integrity;
pub mod manager;
pub mod parse;
pub mod report;
pub mod signature;
pub mod validate;
pub mod version;

pub use crate::errors::{KiwiError, KiwiResult};

/// Marker embedded in every signature line.
/// This must remain stable across versions: signed artifacts on disk carry it.
pub const SIGNATURE_MARKER: &str = "kiwi-mcp:validated";

/// Maximum executor-chain depth accepted by resolvers.
pub const MAX_CHAIN_DEPTH: usize = 16;

/// Convenience re-exports.
pub mod prelude {
    pub use crate::artifact::{ArtifactKind, Scope, Signature, ToolType};
    pub use crate::canonical::canonical_json_bytes;
    pub use crate::integrity::{
        compute_content_hash, compute_directive_integrity, compute_knowledge_integrity,
        compute_tool_integrity, short_hash, FileEntry,
    };
    pub use crate::manager::MetadataManager;
    pub use crate::report::Envelope;
    pub use crate::signature::SignatureStrategy;
    pub use crate::validate::{ValidationManager, ValidationReport};
    pub use crate::{KiwiError, KiwiResult};
}
