//! Executor chain resolution.
//!
//! Given a leaf tool id, walk `executor_id` references downward until a
//! primitive terminates the chain. Each link must carry a signature; the
//! stored hash is annotated on the link so the verifier can check it without
//! re-reading signatures. Cycles and runaway depth are hard errors.
//!
//! Resolutions are cached by leaf id. The cache is a soft cache: eviction
//! never changes behavior, only repeats work. `invalidate_tool` must be
//! called after a sign rewrites a file.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use kiwi_core::artifact::{ArtifactKind, ToolType};
use kiwi_core::manager::{stable_tool_manifest, MetadataManager};
use kiwi_core::parse;
use kiwi_core::MAX_CHAIN_DEPTH;
use kiwi_store::Roots;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("tool '{id}' not found locally")]
    NotFound { id: String },

    #[error("tool '{id}' has no signature; sign it before execution")]
    MissingSignature { id: String },

    #[error("circular dependency detected: '{id}' appears twice in the executor chain")]
    Circular { id: String },

    #[error("executor chain exceeds maximum depth of {max_depth}")]
    DepthExceeded { max_depth: usize },

    #[error("tool '{id}' has invalid metadata: {message}")]
    InvalidMetadata { id: String, message: String },

    #[error("failed to read tool '{id}': {message}")]
    Read { id: String, message: String },
}

/// One resolved link of an executor chain.
#[derive(Debug, Clone, Serialize)]
pub struct ChainLink {
    pub id: String,
    pub version: String,
    pub tool_type: ToolType,
    pub executor_id: Option<String>,
    pub manifest: Value,
    pub file_path: PathBuf,
    /// The integrity hash stored in the link's signature.
    pub content_hash: String,
}

/// Cache statistics, exposed for diagnostics.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Resolves and caches executor chains.
pub struct ChainResolver {
    roots: Roots,
    cache: Mutex<HashMap<String, Arc<Vec<ChainLink>>>>,
    stats: Mutex<CacheStats>,
}

impl ChainResolver {
    pub fn new(project: Option<&Path>) -> Self {
        Self {
            roots: Roots::new(project),
            cache: Mutex::new(HashMap::new()),
            stats: Mutex::new(CacheStats::default()),
        }
    }

    /// Resolve the chain for a leaf tool, from the cache when possible.
    pub fn resolve(&self, tool_id: &str) -> Result<Arc<Vec<ChainLink>>, ChainError> {
        if let Some(chain) = self.cache.lock().get(tool_id).cloned() {
            self.stats.lock().hits += 1;
            return Ok(chain);
        }
        self.stats.lock().misses += 1;

        let chain = Arc::new(self.resolve_uncached(tool_id)?);
        self.cache
            .lock()
            .insert(tool_id.to_string(), Arc::clone(&chain));
        Ok(chain)
    }

    /// Resolve several leaf ids; cached entries are reused, the rest are
    /// resolved individually. Failures are reported per id.
    pub fn resolve_batch(
        &self,
        tool_ids: &[&str],
    ) -> HashMap<String, Result<Arc<Vec<ChainLink>>, ChainError>> {
        tool_ids
            .iter()
            .map(|id| ((*id).to_string(), self.resolve(id)))
            .collect()
    }

    /// Drop the cached chain for one leaf id. Returns the stored hashes of
    /// the evicted links so callers can invalidate the verifier too.
    pub fn invalidate_tool(&self, tool_id: &str) -> Vec<String> {
        match self.cache.lock().remove(tool_id) {
            Some(chain) => chain.iter().map(|l| l.content_hash.clone()).collect(),
            None => Vec::new(),
        }
    }

    pub fn clear_caches(&self) {
        self.cache.lock().clear();
        *self.stats.lock() = CacheStats::default();
    }

    pub fn cache_stats(&self) -> CacheStats {
        let mut stats = *self.stats.lock();
        stats.entries = self.cache.lock().len();
        stats
    }

    fn resolve_uncached(&self, leaf_id: &str) -> Result<Vec<ChainLink>, ChainError> {
        let mut chain = Vec::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut current = leaf_id.to_string();

        loop {
            if chain.len() >= MAX_CHAIN_DEPTH {
                return Err(ChainError::DepthExceeded {
                    max_depth: MAX_CHAIN_DEPTH,
                });
            }
            if !visited.insert(current.clone()) {
                return Err(ChainError::Circular { id: current });
            }

            let link = self.load_link(&current)?;
            debug!(target: "kiwi_exec.chain", id = %link.id, tool_type = %link.tool_type, "resolved link");

            let next = link.executor_id.clone();
            let terminal = link.tool_type.is_primitive() || next.is_none();
            chain.push(link);

            if terminal {
                return Ok(chain);
            }
            current = next.unwrap();
        }
    }

    fn load_link(&self, tool_id: &str) -> Result<ChainLink, ChainError> {
        let path = self
            .roots
            .resolve(ArtifactKind::Tool, tool_id)
            .ok_or_else(|| ChainError::NotFound {
                id: tool_id.to_string(),
            })?;

        let content = std::fs::read_to_string(&path).map_err(|e| ChainError::Read {
            id: tool_id.to_string(),
            message: e.to_string(),
        })?;

        let content_hash = MetadataManager::signature_hash(ArtifactKind::Tool, &content, Some(&path))
            .ok_or_else(|| ChainError::MissingSignature {
                id: tool_id.to_string(),
            })?;

        let file_name = path
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or_default()
            .to_string();
        let parsed = parse::parse_tool_str(&content, &file_name).map_err(|e| {
            ChainError::InvalidMetadata {
                id: tool_id.to_string(),
                message: e.to_string(),
            }
        })?;

        let version = parsed
            .get("version")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let tool_type_str = parsed
            .get("tool_type")
            .and_then(Value::as_str)
            .ok_or_else(|| ChainError::InvalidMetadata {
                id: tool_id.to_string(),
                message: "tool_type is not set".to_string(),
            })?;
        let tool_type =
            ToolType::parse(tool_type_str).map_err(|e| ChainError::InvalidMetadata {
                id: tool_id.to_string(),
                message: e.to_string(),
            })?;
        let executor_id = parsed
            .get("executor_id")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_owned);

        Ok(ChainLink {
            id: tool_id.to_string(),
            version,
            tool_type,
            executor_id,
            manifest: stable_tool_manifest(&parsed),
            file_path: path,
            content_hash,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const SIG: &str = "# kiwi-mcp:validated:2026-01-01T00:00:00Z:";

    fn fake_hash(c: char) -> String {
        std::iter::repeat(c).take(64).collect()
    }

    fn write_tool(project: &Path, name: &str, tool_type: &str, executor: Option<&str>, hash: char) {
        let executor_line = match executor {
            Some(e) => format!("__executor_id__ = \"{e}\"\n"),
            None => "__executor_id__ = None\n".to_string(),
        };
        let content = format!(
            "{SIG}{}\n__version__ = \"1.0.0\"\n__tool_type__ = \"{tool_type}\"\n{executor_line}",
            fake_hash(hash)
        );
        let path = project.join(".ai/tools/t").join(format!("{name}.py"));
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn resolves_three_link_chain_in_order() {
        let project = TempDir::new().unwrap();
        write_tool(project.path(), "greet", "script", Some("python_runtime"), 'a');
        write_tool(project.path(), "python_runtime", "runtime", Some("subprocess"), 'b');
        write_tool(project.path(), "subprocess", "primitive", None, 'c');

        let resolver = ChainResolver::new(Some(project.path()));
        let chain = resolver.resolve("greet").unwrap();

        let ids: Vec<&str> = chain.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, ["greet", "python_runtime", "subprocess"]);
        assert!(chain.last().unwrap().tool_type.is_primitive());
        // Each link references the next.
        for pair in chain.windows(2) {
            assert_eq!(pair[0].executor_id.as_deref(), Some(pair[1].id.as_str()));
        }
        assert_eq!(chain[0].content_hash, fake_hash('a'));
    }

    #[test]
    fn cycle_is_rejected() {
        let project = TempDir::new().unwrap();
        write_tool(project.path(), "tool_a", "script", Some("tool_b"), 'a');
        write_tool(project.path(), "tool_b", "runtime", Some("tool_a"), 'b');

        let resolver = ChainResolver::new(Some(project.path()));
        let err = resolver.resolve("tool_a").unwrap_err();
        assert!(matches!(err, ChainError::Circular { ref id } if id == "tool_a"));
        assert!(err.to_string().to_lowercase().contains("circular"));
    }

    #[test]
    fn unsigned_link_is_rejected() {
        let project = TempDir::new().unwrap();
        let path = project.path().join(".ai/tools/t/unsigned.py");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(
            &path,
            "__version__ = \"1.0.0\"\n__tool_type__ = \"primitive\"\n__executor_id__ = None\n",
        )
        .unwrap();

        let resolver = ChainResolver::new(Some(project.path()));
        let err = resolver.resolve("unsigned").unwrap_err();
        assert!(matches!(err, ChainError::MissingSignature { .. }));
    }

    #[test]
    fn missing_executor_target_is_not_found() {
        let project = TempDir::new().unwrap();
        write_tool(project.path(), "lonely", "script", Some("ghost_runtime"), 'a');

        let resolver = ChainResolver::new(Some(project.path()));
        let err = resolver.resolve("lonely").unwrap_err();
        assert!(matches!(err, ChainError::NotFound { ref id } if id == "ghost_runtime"));
        assert!(err.to_string().contains("ghost_runtime"));
    }

    #[test]
    fn cache_hit_skips_reresolution() {
        let project = TempDir::new().unwrap();
        write_tool(project.path(), "solo", "primitive", None, 'a');

        let resolver = ChainResolver::new(Some(project.path()));
        resolver.resolve("solo").unwrap();

        // Delete the file; the cached chain still resolves.
        fs::remove_file(project.path().join(".ai/tools/t/solo.py")).unwrap();
        assert!(resolver.resolve("solo").is_ok());

        let stats = resolver.cache_stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);

        // After invalidation the miss is real.
        let evicted = resolver.invalidate_tool("solo");
        assert_eq!(evicted, vec![fake_hash('a')]);
        assert!(resolver.resolve("solo").is_err());
    }

    #[test]
    fn depth_limit_enforced() {
        let project = TempDir::new().unwrap();
        for i in 0..(MAX_CHAIN_DEPTH + 2) {
            let next = format!("link_{}", i + 1);
            write_tool(project.path(), &format!("link_{i}"), "runtime", Some(&next), 'a');
        }

        let resolver = ChainResolver::new(Some(project.path()));
        let err = resolver.resolve("link_0").unwrap_err();
        assert!(matches!(err, ChainError::DepthExceeded { .. }));
    }

    #[test]
    fn batch_uses_cache() {
        let project = TempDir::new().unwrap();
        write_tool(project.path(), "one", "primitive", None, 'a');
        write_tool(project.path(), "two", "primitive", None, 'b');

        let resolver = ChainResolver::new(Some(project.path()));
        resolver.resolve("one").unwrap();

        let results = resolver.resolve_batch(&["one", "two", "absent"]);
        assert!(results["one"].is_ok());
        assert!(results["two"].is_ok());
        assert!(results["absent"].is_err());
    }

    #[test]
    fn null_executor_on_non_primitive_terminates_chain() {
        // A tool with no executor_id terminates resolution even when its
        // type is not primitive; the executor rejects it later.
        let project = TempDir::new().unwrap();
        write_tool(project.path(), "dangling", "script", None, 'a');

        let resolver = ChainResolver::new(Some(project.path()));
        let chain = resolver.resolve("dangling").unwrap();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].executor_id, None);
    }
}
