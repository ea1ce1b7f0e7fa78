//! Integrity verification with memoization.
//!
//! `verify_single` re-reads a file, strips its signature through the kind's
//! strategy, recomputes the unified integrity hash, and compares it with the
//! stored hash. Results are memoized by stored hash in two maps:
//! - verified set: subsequent calls short-circuit to success
//! - failed set: subsequent calls replay the original error with a
//!   "Previously failed" prefix
//!
//! Both are soft caches; `invalidate` must be called for hashes affected by
//! a re-sign.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use parking_lot::Mutex;
use serde::Serialize;

use kiwi_core::artifact::ArtifactKind;
use kiwi_core::integrity::short_hash;
use kiwi_core::manager::MetadataManager;

use crate::chain::ChainLink;

/// Outcome of a single-file verification.
#[derive(Debug, Clone, Serialize)]
pub struct VerifyOutcome {
    pub success: bool,
    /// True when the result came from a memoized entry.
    pub cached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VerifyOutcome {
    fn ok(cached: bool) -> Self {
        Self {
            success: true,
            cached,
            error: None,
        }
    }

    fn fail(cached: bool, error: String) -> Self {
        Self {
            success: false,
            cached,
            error: Some(error),
        }
    }
}

/// Outcome of verifying a whole chain.
#[derive(Debug, Clone, Serialize)]
pub struct ChainVerifyOutcome {
    pub success: bool,
    pub verified_count: usize,
    pub cached_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_tool_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct VerifierStats {
    pub verified_count: usize,
    pub failed_count: usize,
}

/// Memoizing integrity verifier.
#[derive(Default)]
pub struct IntegrityVerifier {
    verified: Mutex<HashSet<String>>,
    failed: Mutex<HashMap<String, String>>,
}

impl IntegrityVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Verify one artifact file against its stored hash.
    pub fn verify_single(
        &self,
        kind: ArtifactKind,
        id: &str,
        version: &str,
        path: &Path,
        stored_hash: &str,
    ) -> VerifyOutcome {
        if self.verified.lock().contains(stored_hash) {
            return VerifyOutcome::ok(true);
        }
        if let Some(err) = self.failed.lock().get(stored_hash) {
            return VerifyOutcome::fail(true, format!("Previously failed: {err}"));
        }

        let outcome = self.verify_fresh(kind, id, version, path, stored_hash);
        match &outcome.error {
            None => {
                self.verified.lock().insert(stored_hash.to_string());
            }
            Some(err) => {
                self.failed
                    .lock()
                    .insert(stored_hash.to_string(), err.clone());
            }
        }
        outcome
    }

    fn verify_fresh(
        &self,
        kind: ArtifactKind,
        id: &str,
        version: &str,
        path: &Path,
        stored_hash: &str,
    ) -> VerifyOutcome {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                return VerifyOutcome::fail(
                    false,
                    format!("cannot read '{}': {e}", path.display()),
                )
            }
        };

        let computed =
            match MetadataManager::compute_unified_integrity(kind, id, version, &content, path) {
                Ok(h) => h,
                Err(e) => {
                    return VerifyOutcome::fail(false, format!("cannot compute integrity: {e}"))
                }
            };

        if computed == stored_hash {
            VerifyOutcome::ok(false)
        } else {
            VerifyOutcome::fail(
                false,
                format!(
                    "integrity hash mismatch for '{id}': content has been modified since last \
                     validation (stored {}.., computed {}..)",
                    short_hash(stored_hash),
                    short_hash(&computed)
                ),
            )
        }
    }

    /// Verify every link of a chain, stopping at the first failure.
    pub fn verify_chain(&self, chain: &[ChainLink]) -> ChainVerifyOutcome {
        let mut verified_count = 0;
        let mut cached_count = 0;

        for (index, link) in chain.iter().enumerate() {
            if link.content_hash.is_empty() {
                return ChainVerifyOutcome {
                    success: false,
                    verified_count,
                    cached_count,
                    failed_at: Some(index),
                    failed_tool_id: Some(link.id.clone()),
                    error: Some(format!("no integrity hash found for '{}'", link.id)),
                };
            }

            let outcome = self.verify_single(
                ArtifactKind::Tool,
                &link.id,
                &link.version,
                &link.file_path,
                &link.content_hash,
            );
            if outcome.cached {
                cached_count += 1;
            }
            if !outcome.success {
                return ChainVerifyOutcome {
                    success: false,
                    verified_count,
                    cached_count,
                    failed_at: Some(index),
                    failed_tool_id: Some(link.id.clone()),
                    error: outcome.error,
                };
            }
            verified_count += 1;
        }

        ChainVerifyOutcome {
            success: true,
            verified_count,
            cached_count,
            failed_at: None,
            failed_tool_id: None,
            error: None,
        }
    }

    /// True when a hash sits in the verified set.
    pub fn is_verified(&self, stored_hash: &str) -> bool {
        self.verified.lock().contains(stored_hash)
    }

    /// Drop a hash from both memo maps (call after a file rewrite).
    pub fn invalidate(&self, stored_hash: &str) {
        self.verified.lock().remove(stored_hash);
        self.failed.lock().remove(stored_hash);
    }

    pub fn clear_cache(&self) {
        self.verified.lock().clear();
        self.failed.lock().clear();
    }

    pub fn cache_stats(&self) -> VerifierStats {
        VerifierStats {
            verified_count: self.verified.lock().len(),
            failed_count: self.failed.lock().len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiwi_core::artifact::ToolType;
    use std::fs;
    use tempfile::TempDir;

    const TOOL: &str = "__version__ = \"1.0.0\"\n__tool_type__ = \"primitive\"\n__executor_id__ = None\n";

    fn signed_tool(dir: &Path) -> (std::path::PathBuf, String) {
        let path = dir.join("checked.py");
        let signed = kiwi_core::manager::MetadataManager::sign_content(
            ArtifactKind::Tool,
            "checked",
            "1.0.0",
            TOOL,
            &path,
        )
        .unwrap();
        fs::write(&path, &signed).unwrap();
        let hash = kiwi_core::manager::MetadataManager::signature_hash(
            ArtifactKind::Tool,
            &signed,
            Some(&path),
        )
        .unwrap();
        (path, hash)
    }

    #[test]
    fn fresh_verification_succeeds_then_caches() {
        let dir = TempDir::new().unwrap();
        let (path, hash) = signed_tool(dir.path());
        let verifier = IntegrityVerifier::new();

        let first = verifier.verify_single(ArtifactKind::Tool, "checked", "1.0.0", &path, &hash);
        assert!(first.success);
        assert!(!first.cached);

        let second = verifier.verify_single(ArtifactKind::Tool, "checked", "1.0.0", &path, &hash);
        assert!(second.success);
        assert!(second.cached);
        assert!(verifier.is_verified(&hash));
    }

    #[test]
    fn modified_content_fails_and_failure_is_cached() {
        let dir = TempDir::new().unwrap();
        let (path, hash) = signed_tool(dir.path());
        let mut content = fs::read_to_string(&path).unwrap();
        content.push_str("# tampered\n");
        fs::write(&path, content).unwrap();

        let verifier = IntegrityVerifier::new();
        let first = verifier.verify_single(ArtifactKind::Tool, "checked", "1.0.0", &path, &hash);
        assert!(!first.success);
        assert!(first.error.as_deref().unwrap().contains("modified"));

        let second = verifier.verify_single(ArtifactKind::Tool, "checked", "1.0.0", &path, &hash);
        assert!(!second.success);
        assert!(second.error.as_deref().unwrap().starts_with("Previously failed"));
    }

    #[test]
    fn wrong_stored_hash_fails() {
        let dir = TempDir::new().unwrap();
        let (path, _) = signed_tool(dir.path());
        let verifier = IntegrityVerifier::new();
        let wrong = "0".repeat(64);
        let outcome = verifier.verify_single(ArtifactKind::Tool, "checked", "1.0.0", &path, &wrong);
        assert!(!outcome.success);
        assert!(outcome.error.as_deref().unwrap().contains("mismatch"));
    }

    #[test]
    fn invalidate_forces_reverification() {
        let dir = TempDir::new().unwrap();
        let (path, hash) = signed_tool(dir.path());
        let verifier = IntegrityVerifier::new();
        verifier.verify_single(ArtifactKind::Tool, "checked", "1.0.0", &path, &hash);
        assert!(verifier.is_verified(&hash));

        verifier.invalidate(&hash);
        assert!(!verifier.is_verified(&hash));
    }

    #[test]
    fn chain_verification_stops_at_first_failure() {
        let dir = TempDir::new().unwrap();
        let (good_path, good_hash) = signed_tool(dir.path());

        let good = ChainLink {
            id: "checked".into(),
            version: "1.0.0".into(),
            tool_type: ToolType::Primitive,
            executor_id: None,
            manifest: serde_json::json!({}),
            file_path: good_path.clone(),
            content_hash: good_hash,
        };
        let bad = ChainLink {
            id: "broken".into(),
            version: "1.0.0".into(),
            tool_type: ToolType::Primitive,
            executor_id: None,
            manifest: serde_json::json!({}),
            file_path: good_path,
            content_hash: "f".repeat(64),
        };

        let verifier = IntegrityVerifier::new();
        let outcome = verifier.verify_chain(&[good, bad]);
        assert!(!outcome.success);
        assert_eq!(outcome.failed_at, Some(1));
        assert_eq!(outcome.failed_tool_id.as_deref(), Some("broken"));
        assert_eq!(outcome.verified_count, 1);
    }

    #[test]
    fn clear_cache_resets_stats() {
        let dir = TempDir::new().unwrap();
        let (path, hash) = signed_tool(dir.path());
        let verifier = IntegrityVerifier::new();
        verifier.verify_single(ArtifactKind::Tool, "checked", "1.0.0", &path, &hash);
        assert_eq!(verifier.cache_stats().verified_count, 1);

        verifier.clear_cache();
        let stats = verifier.cache_stats();
        assert_eq!(stats.verified_count, 0);
        assert_eq!(stats.failed_count, 0);
    }
}
