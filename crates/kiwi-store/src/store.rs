//! Store operations: sign, load, delete, verify.
//!
//! Every operation reports through the uniform envelope. Write paths go
//! through `lock::with_lock` and rewrite files atomically (temp file +
//! rename) so a crash never leaves a half-written artifact.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;

use kiwi_core::artifact::{ArtifactKind, Scope, Signature};
use kiwi_core::manager::MetadataManager;
use kiwi_core::parse;
use kiwi_core::report::Envelope;
use kiwi_core::validate::ValidationManager;
use kiwi_core::version;

use crate::lock::with_lock;
use crate::paths::{validate_path_structure, Roots};
use crate::{StoreError, StoreResult};

/// Details of a completed sign.
#[derive(Debug, Clone, Serialize)]
pub struct SignOutcome {
    pub id: String,
    pub path: String,
    pub scope: Scope,
    pub category: String,
    pub signature: Signature,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub moved_from: Option<String>,
}

/// Scoped artifact store.
pub struct Store {
    roots: Roots,
}

impl Store {
    pub fn new(project: Option<&Path>) -> Self {
        Self {
            roots: Roots::new(project),
        }
    }

    pub fn roots(&self) -> &Roots {
        &self.roots
    }

    pub fn resolve(&self, kind: ArtifactKind, id: &str) -> Option<PathBuf> {
        self.roots.resolve(kind, id)
    }

    /// Validate and sign an artifact: structural checks, version gate,
    /// category agreement (a mismatch relocates the file), then a fresh
    /// signature embedding the unified integrity hash.
    ///
    /// `scope` pins resolution to one scope; `None` uses the normal
    /// project-first order. Pinning matters when both scopes hold the same
    /// id: without it the user-scope copy could never be signed.
    pub fn sign(&self, kind: ArtifactKind, id: &str, scope: Option<Scope>) -> Envelope {
        match self.sign_inner(kind, id, scope) {
            Ok(outcome) => {
                let mut env = Envelope::ok()
                    .with_field("signed", json!(true))
                    .with_field("id", json!(outcome.id))
                    .with_field("path", json!(outcome.path))
                    .with_field("scope", json!(outcome.scope))
                    .with_field("category", json!(outcome.category))
                    .with_field("signature", json!(outcome.signature));
                if let Some(moved) = &outcome.moved_from {
                    env = env.with_field("moved_from", json!(moved));
                }
                env
            }
            Err(envelope) => envelope,
        }
    }

    fn sign_inner(
        &self,
        kind: ArtifactKind,
        id: &str,
        scope: Option<Scope>,
    ) -> Result<SignOutcome, Envelope> {
        let resolved = match scope {
            Some(s) => self.roots.resolve_in_scope(kind, id, s),
            None => self.resolve(kind, id),
        };
        let mut path = resolved.ok_or_else(|| {
            let mut env = Envelope::not_found(kind.as_str(), id);
            if let Some(s) = scope {
                env = env.with_field("scope", json!(s));
            }
            env
        })?;
        let scope = self.roots.scope_of(&path);

        let structure = validate_path_structure(&self.roots, &path, kind, scope);
        if !structure.valid {
            return Err(Envelope::validation_failed(structure.issues)
                .with_field("path", json!(path.display().to_string()))
                .with_hint(format!(
                    "file must live under the {} root with an allowed extension",
                    kind.dir_name()
                )));
        }

        let parsed = MetadataManager::parse_file(kind, &path)
            .map_err(|e| Envelope::parse_error(e.to_string(), Vec::new()))?;

        let report = ValidationManager::validate(kind, &path, &parsed)
            .map_err(|e| Envelope::error(e.to_string()))?;
        if !report.valid {
            let mut env = Envelope::validation_failed(report.issues.clone())
                .with_field("path", json!(path.display().to_string()))
                .with_field("warnings", json!(report.warnings));
            if report.issues.iter().any(|i| i.contains("filename mismatch")) {
                if let Some(artifact_id) = parse::artifact_id(&parsed) {
                    let target = path.with_file_name(format!(
                        "{artifact_id}{}",
                        extension_of(&path)
                    ));
                    env = env.with_solution(json!({
                        "rename_command": format!("mv {} {}", path.display(), target.display()),
                        "note": "or edit the artifact id to match the filename",
                    }));
                }
            }
            return Err(env);
        }

        let version_str = parsed
            .get("version")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if !version::is_signable_version(&version_str) {
            return Err(Envelope::validation_failed(vec![format!(
                "artifact is missing a signable version (got '{version_str}')"
            )])
            .with_field("path", json!(path.display().to_string())));
        }

        // Category agreement: the metadata category must match the directory
        // path on disk; a change relocates the file.
        let mut moved_from = None;
        let disk_category = structure.category_path.clone();
        let meta_category = parsed
            .get("category")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let mut category = disk_category.clone();
        if !meta_category.is_empty() && meta_category != disk_category {
            let base = self
                .roots
                .base(kind, scope)
                .ok_or_else(|| Envelope::error("scope root unavailable"))?;
            let file_name = path
                .file_name()
                .map(|f| f.to_string_lossy().into_owned())
                .ok_or_else(|| Envelope::error("artifact path has no file name"))?;
            let target = base.join(&meta_category).join(&file_name);
            self.relocate(&path, &target)
                .map_err(|e| Envelope::error(format!("failed to relocate artifact: {e}")))?;
            info!(target: "kiwi_store", from = %path.display(), to = %target.display(), "category move on sign");
            moved_from = Some(path.display().to_string());
            path = target;
            category = meta_category;
        }

        let artifact_id = parse::artifact_id(&parsed).unwrap_or(id).to_string();
        let signature = self
            .write_signed(kind, &artifact_id, &version_str, &path)
            .map_err(|e| Envelope::error(format!("failed to sign artifact: {e}")))?;

        Ok(SignOutcome {
            id: artifact_id,
            path: path.display().to_string(),
            scope,
            category,
            signature,
            moved_from,
        })
    }

    fn relocate(&self, from: &Path, to: &Path) -> StoreResult<()> {
        with_lock(from, || {
            if let Some(parent) = to.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::rename(from, to)?;
            Ok(())
        })
    }

    fn write_signed(
        &self,
        kind: ArtifactKind,
        id: &str,
        version_str: &str,
        path: &Path,
    ) -> StoreResult<Signature> {
        with_lock(path, || {
            let content = std::fs::read_to_string(path)?;
            let hash = MetadataManager::compute_unified_integrity(
                kind,
                id,
                version_str,
                &content,
                path,
            )?;
            let signed = MetadataManager::sign_content_with_hash(kind, &content, &hash, Some(path));
            write_atomic(path, &signed)?;
            MetadataManager::signature_info(kind, &signed, Some(path)).ok_or_else(|| {
                StoreError::Core(kiwi_core::KiwiError::invariant(
                    "freshly signed content has no extractable signature",
                ))
            })
        })
    }

    /// Load an artifact: read-only when no destination is given, otherwise
    /// copy across scopes. Copying requires a signature on the source.
    pub fn load(
        &self,
        kind: ArtifactKind,
        id: &str,
        from: Scope,
        to: Option<Scope>,
    ) -> Envelope {
        let Some(path) = self.roots.resolve_in_scope(kind, id, from) else {
            return Envelope::not_found(kind.as_str(), id)
                .with_field("scope", json!(from));
        };

        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => return Envelope::error(format!("failed to read artifact: {e}")),
        };
        let parsed = match MetadataManager::parse_file(kind, &path) {
            Ok(p) => p,
            Err(e) => return Envelope::parse_error(e.to_string(), Vec::new()),
        };

        let read_only = to.is_none() || to == Some(from);
        if read_only {
            return Envelope::ok()
                .with_field("id", json!(id))
                .with_field("path", json!(path.display().to_string()))
                .with_field("scope", json!(from))
                .with_field("metadata", parsed)
                .with_field("content", json!(content));
        }
        let to = to.unwrap();

        // Copying propagates trust: only signed artifacts move across scopes.
        if MetadataManager::signature_info(kind, &content, Some(&path)).is_none() {
            return Envelope::signature_missing(kind.as_str(), id);
        }

        let category = self.roots.category_path(&path, kind, from);
        let Some(target_base) = self.roots.base(kind, to) else {
            return Envelope::error("destination scope root unavailable (missing project path?)");
        };
        let file_name = path.file_name().map(|f| f.to_string_lossy().into_owned());
        let Some(file_name) = file_name else {
            return Envelope::error("artifact path has no file name");
        };
        let target = if category.is_empty() {
            target_base.join(&file_name)
        } else {
            target_base.join(&category).join(&file_name)
        };

        let copy = with_lock(&target, || {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(&path, &target)?;
            Ok(())
        });
        match copy {
            Ok(()) => {
                info!(target: "kiwi_store", id, from = %from, to = %to, "artifact copied");
                Envelope::ok()
                    .with_field("id", json!(id))
                    .with_field("from", json!(from))
                    .with_field("to", json!(to))
                    .with_field("path", json!(target.display().to_string()))
            }
            Err(e) => Envelope::error(format!("failed to copy artifact: {e}")),
        }
    }

    /// Delete an artifact from one scope (or the first scope it resolves in).
    pub fn delete(&self, kind: ArtifactKind, id: &str, scope: Option<Scope>) -> Envelope {
        let path = match scope {
            Some(s) => self.roots.resolve_in_scope(kind, id, s),
            None => self.resolve(kind, id),
        };
        let Some(path) = path else {
            return Envelope::not_found(kind.as_str(), id);
        };

        let removed = with_lock(&path, || {
            std::fs::remove_file(&path)?;
            Ok(())
        });
        match removed {
            Ok(()) => Envelope::ok()
                .with_field("deleted", json!(true))
                .with_field("id", json!(id))
                .with_field("path", json!(path.display().to_string())),
            Err(e) => Envelope::error(format!("failed to delete artifact: {e}")),
        }
    }

    /// Recompute an artifact's integrity hash and compare with the stored
    /// signature.
    pub fn verify_file(&self, kind: ArtifactKind, id: &str) -> Envelope {
        let Some(path) = self.resolve(kind, id) else {
            return Envelope::not_found(kind.as_str(), id);
        };
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => return Envelope::error(format!("failed to read artifact: {e}")),
        };
        let Some(signature) = MetadataManager::signature_info(kind, &content, Some(&path)) else {
            return Envelope::signature_missing(kind.as_str(), id);
        };
        let parsed = match MetadataManager::parse_file(kind, &path) {
            Ok(p) => p,
            Err(e) => return Envelope::parse_error(e.to_string(), Vec::new()),
        };
        let version_str = parsed
            .get("version")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let artifact_id = parse::artifact_id(&parsed).unwrap_or(id);

        let computed = match MetadataManager::compute_unified_integrity(
            kind,
            artifact_id,
            version_str,
            &content,
            &path,
        ) {
            Ok(h) => h,
            Err(e) => return Envelope::error(format!("failed to compute integrity: {e}")),
        };

        if computed == signature.hash {
            Envelope::ok()
                .with_field("verified", json!(true))
                .with_field("id", json!(artifact_id))
                .with_field("hash", json!(signature.hash))
                .with_field("signed_at", json!(signature.timestamp))
        } else {
            Envelope::integrity_mismatch(&signature.hash, &computed)
                .with_field("path", json!(path.display().to_string()))
        }
    }

    /// Check the other scope for a newer semver of the same artifact.
    pub fn newer_version_warning(
        &self,
        kind: ArtifactKind,
        id: &str,
        current_version: &str,
        current_scope: Scope,
    ) -> Option<Value> {
        let other_scope = match current_scope {
            Scope::Project => Scope::User,
            Scope::User => Scope::Project,
        };
        let other_path = self.roots.resolve_in_scope(kind, id, other_scope)?;
        let parsed = MetadataManager::parse_file(kind, &other_path).ok()?;
        let other_version = parsed.get("version").and_then(Value::as_str)?;

        match version::compare_versions(current_version, other_version) {
            Ok(std::cmp::Ordering::Less) => Some(json!({
                "newer_version": other_version,
                "location": other_scope,
                "message": format!(
                    "a newer version {other_version} of '{id}' exists in {other_scope} scope \
                     (running {current_version})"
                ),
            })),
            _ => None,
        }
    }
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default()
}

/// Write via temp file + rename so readers never observe partial content.
fn write_atomic(path: &Path, content: &str) -> std::io::Result<()> {
    let tmp = path.with_extension("tmp-kiwi");
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, path)
}
