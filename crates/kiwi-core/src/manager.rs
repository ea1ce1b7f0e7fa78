//! Metadata manager façade.
//!
//! One entry point for parse / hash / sign / signature extraction across all
//! three artifact kinds. All methods delegate to the kind's signature
//! strategy and the integrity primitives; nothing here touches the network or
//! rewrites files (the store layer owns file writes and locking).

use std::path::Path;

use serde_json::{json, Map, Value};

use crate::artifact::{ArtifactKind, Signature};
use crate::errors::{KiwiError, KiwiResult};
use crate::integrity::{
    compute_content_hash, compute_directive_integrity, compute_knowledge_integrity,
    compute_tool_integrity, FileEntry,
};
use crate::parse;
use crate::signature::{generate_timestamp, SignatureStrategy};

/// Manifest fields committed by a tool's integrity hash. Everything else
/// (paths, scores, scope, raw content) is transient and excluded.
const TOOL_MANIFEST_FIELDS: &[&str] = &[
    "tool_id",
    "version",
    "tool_type",
    "executor_id",
    "category",
    "description",
    "config",
    "config_schema",
    "parameters",
    "requires",
    "required_env_vars",
    "dependencies",
];

pub struct MetadataManager;

impl MetadataManager {
    /// The signature strategy for an artifact.
    pub fn strategy(kind: ArtifactKind, path: Option<&Path>) -> SignatureStrategy {
        SignatureStrategy::for_artifact(kind, path)
    }

    /// Parse an artifact file with the appropriate parser.
    pub fn parse_file(kind: ArtifactKind, path: &Path) -> KiwiResult<Value> {
        parse::parse_artifact_file(kind, path)
    }

    /// SHA-256 of the canonical body alone (no identity or metadata mixed in).
    pub fn compute_hash(
        kind: ArtifactKind,
        file_content: &str,
        path: Option<&Path>,
    ) -> KiwiResult<String> {
        let strategy = Self::strategy(kind, path);
        Ok(compute_content_hash(&strategy.canonical_content(file_content)?))
    }

    /// The unified integrity hash committing identity, version, canonical
    /// body, and metadata. This is the value embedded in signatures and
    /// recomputed by the verifier.
    pub fn compute_unified_integrity(
        kind: ArtifactKind,
        id: &str,
        version: &str,
        file_content: &str,
        path: &Path,
    ) -> KiwiResult<String> {
        let strategy = Self::strategy(kind, Some(path));
        match kind {
            ArtifactKind::Directive => {
                let xml = strategy.canonical_content(file_content)?;
                let parsed = parse::directive::parse_directive_str(file_content)?;
                let metadata = json!({
                    "category": parsed.get("category").cloned().unwrap_or(Value::Null),
                    "description": parsed.get("description").cloned().unwrap_or(Value::Null),
                    "model_tier": parsed
                        .get("model")
                        .and_then(|m| m.get("tier"))
                        .cloned()
                        .unwrap_or(Value::Null),
                });
                compute_directive_integrity(id, version, &xml, &metadata)
            }
            ArtifactKind::Knowledge => {
                let body = strategy.canonical_content(file_content)?;
                let parsed = parse::knowledge::parse_knowledge_str(file_content)?;
                let metadata = json!({
                    "category": parsed.get("category").cloned().unwrap_or(Value::Null),
                    "entry_type": parsed.get("entry_type").cloned().unwrap_or(Value::Null),
                    "tags": parsed.get("tags").cloned().unwrap_or(Value::Array(Vec::new())),
                });
                compute_knowledge_integrity(id, version, &body, &metadata)
            }
            ArtifactKind::Tool => {
                let file_name = path
                    .file_name()
                    .and_then(|f| f.to_str())
                    .ok_or_else(|| KiwiError::invalid_argument("tool path has no file name"))?;
                let parsed = parse::parse_tool_str(file_content, file_name)?;
                let manifest = stable_tool_manifest(&parsed);
                let canonical = strategy.canonical_content(file_content)?;
                let files = [FileEntry {
                    path: file_name.to_string(),
                    sha256: compute_content_hash(&canonical),
                }];
                compute_tool_integrity(id, version, &manifest, &files)
            }
        }
    }

    /// Sign content: compute the unified integrity hash and embed it.
    pub fn sign_content(
        kind: ArtifactKind,
        id: &str,
        version: &str,
        file_content: &str,
        path: &Path,
    ) -> KiwiResult<String> {
        let hash = Self::compute_unified_integrity(kind, id, version, file_content, path)?;
        Ok(Self::sign_content_with_hash(kind, file_content, &hash, Some(path)))
    }

    /// Embed a precomputed integrity hash as a fresh signature, replacing any
    /// existing signature line.
    pub fn sign_content_with_hash(
        kind: ArtifactKind,
        file_content: &str,
        hash: &str,
        path: Option<&Path>,
    ) -> String {
        let strategy = Self::strategy(kind, path);
        let line = strategy.format_signature(&generate_timestamp(), hash);
        strategy.insert_signature(file_content, &line)
    }

    /// Extract signature info without verification.
    pub fn signature_info(
        kind: ArtifactKind,
        file_content: &str,
        path: Option<&Path>,
    ) -> Option<Signature> {
        Self::strategy(kind, path).extract_signature(file_content)
    }

    /// Just the stored integrity hash; used when building chains.
    pub fn signature_hash(
        kind: ArtifactKind,
        file_content: &str,
        path: Option<&Path>,
    ) -> Option<String> {
        Self::signature_info(kind, file_content, path).map(|s| s.hash)
    }
}

/// Project the parsed tool metadata onto the committed manifest fields.
pub fn stable_tool_manifest(parsed: &Value) -> Value {
    let mut out = Map::new();
    if let Some(obj) = parsed.as_object() {
        for key in TOOL_MANIFEST_FIELDS {
            if let Some(v) = obj.get(*key) {
                if !v.is_null() {
                    out.insert((*key).to_string(), v.clone());
                }
            }
        }
    }
    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOOL: &str = "__version__ = \"1.0.0\"\n__tool_type__ = \"primitive\"\n__executor_id__ = None\n\nprint(\"hi\")\n";

    #[test]
    fn sign_embeds_unified_hash() {
        let path = Path::new("hello.py");
        let signed =
            MetadataManager::sign_content(ArtifactKind::Tool, "hello", "1.0.0", TOOL, path)
                .unwrap();

        let sig = MetadataManager::signature_info(ArtifactKind::Tool, &signed, Some(path)).unwrap();
        let expected = MetadataManager::compute_unified_integrity(
            ArtifactKind::Tool,
            "hello",
            "1.0.0",
            &signed,
            path,
        )
        .unwrap();
        assert_eq!(sig.hash, expected);
    }

    #[test]
    fn signing_is_idempotent_modulo_timestamp() {
        let path = Path::new("hello.py");
        let once =
            MetadataManager::sign_content(ArtifactKind::Tool, "hello", "1.0.0", TOOL, path)
                .unwrap();
        let twice =
            MetadataManager::sign_content(ArtifactKind::Tool, "hello", "1.0.0", &once, path)
                .unwrap();

        let h1 = MetadataManager::signature_hash(ArtifactKind::Tool, &once, Some(path)).unwrap();
        let h2 = MetadataManager::signature_hash(ArtifactKind::Tool, &twice, Some(path)).unwrap();
        assert_eq!(h1, h2);
        assert_eq!(twice.matches("kiwi-mcp:validated").count(), 1);
    }

    #[test]
    fn signature_excluded_from_its_own_hash() {
        let path = Path::new("hello.py");
        let unsigned_hash =
            MetadataManager::compute_hash(ArtifactKind::Tool, TOOL, Some(path)).unwrap();
        let signed =
            MetadataManager::sign_content(ArtifactKind::Tool, "hello", "1.0.0", TOOL, path)
                .unwrap();
        let signed_hash =
            MetadataManager::compute_hash(ArtifactKind::Tool, &signed, Some(path)).unwrap();
        assert_eq!(unsigned_hash, signed_hash);
    }

    #[test]
    fn manifest_projection_drops_transient_fields() {
        let parsed = serde_json::json!({
            "tool_id": "t",
            "version": "1.0.0",
            "tool_type": "script",
            "executor_id": "python_runtime",
            "raw": "full file content",
            "path": "/tmp/t.py",
            "score": 3,
        });
        let manifest = stable_tool_manifest(&parsed);
        assert!(manifest.get("raw").is_none());
        assert!(manifest.get("path").is_none());
        assert_eq!(manifest["tool_id"], "t");
    }
}
