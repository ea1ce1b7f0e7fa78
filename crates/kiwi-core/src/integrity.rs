//! Unified integrity hashes.
//!
//! Every hash commits an artifact's identity, version, canonical body, and
//! metadata to a single SHA-256 digest. The serialization that feeds the
//! digest is the canonical JSON form from `crate::canonical`; the key layout
//! per kind is fixed and part of the on-disk contract.

use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

use crate::canonical::canonical_json_bytes;
use crate::errors::KiwiResult;

/// SHA-256 of raw content, lowercase hex, full 64 characters.
pub fn compute_content_hash(content: &str) -> String {
    let mut h = Sha256::new();
    h.update(content.as_bytes());
    hex::encode(h.finalize())
}

/// First 12 hex characters, for display only. Integrity decisions always use
/// the full 64-character hash.
pub fn short_hash(hash: &str) -> &str {
    &hash[..hash.len().min(12)]
}

/// A file participating in a tool integrity hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub path: String,
    pub sha256: String,
}

fn hash_canonical(value: &Value) -> KiwiResult<String> {
    let bytes = canonical_json_bytes(value)?;
    let mut h = Sha256::new();
    h.update(&bytes);
    Ok(hex::encode(h.finalize()))
}

/// Integrity hash for a directive.
///
/// `xml_content` is the canonical body (the `<directive>...</directive>`
/// slice), stripped of leading/trailing whitespace by the caller's strategy.
/// `metadata` carries `category`, `description`, and `model_tier`.
pub fn compute_directive_integrity(
    name: &str,
    version: &str,
    xml_content: &str,
    metadata: &Value,
) -> KiwiResult<String> {
    hash_canonical(&json!({
        "kind": "directive",
        "id": name,
        "version": version,
        "content": xml_content,
        "metadata": metadata,
    }))
}

/// Integrity hash for a knowledge entry.
///
/// `metadata` carries `category`, `entry_type`, and `tags`; tags are sorted
/// here so callers do not have to pre-sort.
pub fn compute_knowledge_integrity(
    id: &str,
    version: &str,
    content: &str,
    metadata: &Value,
) -> KiwiResult<String> {
    let mut meta = metadata
        .as_object()
        .cloned()
        .unwrap_or_else(Map::new);
    if let Some(Value::Array(tags)) = meta.get("tags") {
        let mut sorted: Vec<Value> = tags.clone();
        sorted.sort_by(|a, b| {
            a.as_str()
                .unwrap_or_default()
                .cmp(b.as_str().unwrap_or_default())
        });
        meta.insert("tags".to_string(), Value::Array(sorted));
    }
    hash_canonical(&json!({
        "kind": "knowledge",
        "id": id,
        "version": version,
        "content": content,
        "metadata": Value::Object(meta),
    }))
}

/// Integrity hash for a tool.
///
/// `manifest` is the parsed metadata with transient fields already excluded;
/// `files` are `{path, sha256(file_without_signature)}` entries. Entries are
/// sorted by path here to guarantee a stable order.
pub fn compute_tool_integrity(
    tool_id: &str,
    version: &str,
    manifest: &Value,
    files: &[FileEntry],
) -> KiwiResult<String> {
    let mut sorted: Vec<&FileEntry> = files.iter().collect();
    sorted.sort_by(|a, b| a.path.cmp(&b.path));
    let file_values: Vec<Value> = sorted
        .into_iter()
        .map(|f| json!({"path": f.path, "sha256": f.sha256}))
        .collect();
    hash_canonical(&json!({
        "kind": "tool",
        "id": tool_id,
        "version": version,
        "manifest": manifest,
        "files": file_values,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_full_sha256() {
        let h = compute_content_hash("abc");
        assert_eq!(h.len(), 64);
        assert_eq!(
            h,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn short_hash_truncates() {
        let h = compute_content_hash("abc");
        assert_eq!(short_hash(&h), &h[..12]);
    }

    #[test]
    fn directive_hash_stable() {
        let meta = json!({"category": "core", "description": "d", "model_tier": "fast"});
        let a = compute_directive_integrity("demo", "1.0.0", "<directive/>", &meta).unwrap();
        let b = compute_directive_integrity("demo", "1.0.0", "<directive/>", &meta).unwrap();
        assert_eq!(a, b);
        let c = compute_directive_integrity("demo", "1.0.1", "<directive/>", &meta).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn knowledge_hash_sorts_tags() {
        let a = compute_knowledge_integrity(
            "note",
            "1.0.0",
            "body",
            &json!({"entry_type": "note", "tags": ["z", "a"]}),
        )
        .unwrap();
        let b = compute_knowledge_integrity(
            "note",
            "1.0.0",
            "body",
            &json!({"entry_type": "note", "tags": ["a", "z"]}),
        )
        .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn tool_hash_sorts_files() {
        let manifest = json!({"tool_type": "primitive"});
        let f1 = FileEntry {
            path: "b.py".into(),
            sha256: "1".repeat(64),
        };
        let f2 = FileEntry {
            path: "a.py".into(),
            sha256: "2".repeat(64),
        };
        let a =
            compute_tool_integrity("t", "1.0.0", &manifest, &[f1.clone(), f2.clone()]).unwrap();
        let b = compute_tool_integrity("t", "1.0.0", &manifest, &[f2, f1]).unwrap();
        assert_eq!(a, b);
    }
}
