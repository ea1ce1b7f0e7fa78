//! Path resolution across scopes.
//!
//! Layout per scope:
//! - project: `<project>/.ai/<kind-plural>/<category...>/<id>.<ext>`
//! - user:    `${USER_SPACE:-~/.ai}/<kind-plural>/<category...>/<id>.<ext>`
//!
//! Resolution is depth-first recursive, project before user; tool resolution
//! tries extensions in the kind's fixed order.

use std::path::{Path, PathBuf};

use serde::Serialize;
use walkdir::WalkDir;

use kiwi_core::artifact::{ArtifactKind, Scope};

/// Directory name that anchors artifact storage inside a project.
pub const PROJECT_STORE_DIR: &str = ".ai";

/// The user-scope root: `$USER_SPACE` when set, else `~/.ai`.
pub fn user_space() -> PathBuf {
    match std::env::var("USER_SPACE") {
        Ok(v) if !v.is_empty() => expand_home(&v),
        _ => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".ai"),
    }
}

fn expand_home(value: &str) -> PathBuf {
    if let Some(rest) = value.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(value)
}

/// The project and user roots for one artifact kind.
#[derive(Debug, Clone)]
pub struct Roots {
    project: Option<PathBuf>,
}

impl Roots {
    pub fn new(project: Option<&Path>) -> Self {
        Self {
            project: project.map(Path::to_path_buf),
        }
    }

    pub fn project_path(&self) -> Option<&Path> {
        self.project.as_deref()
    }

    /// The base directory for a kind in a scope. Project scope requires a
    /// project path.
    pub fn base(&self, kind: ArtifactKind, scope: Scope) -> Option<PathBuf> {
        match scope {
            Scope::Project => self
                .project
                .as_ref()
                .map(|p| p.join(PROJECT_STORE_DIR).join(kind.dir_name())),
            Scope::User => Some(user_space().join(kind.dir_name())),
        }
    }

    /// Scope search order: project first, then user.
    pub fn search_scopes(&self) -> Vec<Scope> {
        if self.project.is_some() {
            vec![Scope::Project, Scope::User]
        } else {
            vec![Scope::User]
        }
    }

    /// Resolve an artifact id to its file path, first match wins.
    pub fn resolve(&self, kind: ArtifactKind, id: &str) -> Option<PathBuf> {
        for scope in self.search_scopes() {
            if let Some(found) = self.resolve_in_scope(kind, id, scope) {
                return Some(found);
            }
        }
        None
    }

    /// Resolve within a single scope.
    pub fn resolve_in_scope(&self, kind: ArtifactKind, id: &str, scope: Scope) -> Option<PathBuf> {
        let base = self.base(kind, scope)?;
        if !base.is_dir() {
            return None;
        }
        for ext in kind.extensions() {
            let file_name = format!("{id}{ext}");
            let direct = base.join(&file_name);
            if direct.is_file() {
                return Some(direct);
            }
            let found = WalkDir::new(&base)
                .sort_by_file_name()
                .into_iter()
                .filter_map(Result::ok)
                .find(|e| e.file_type().is_file() && e.file_name().to_string_lossy() == file_name);
            if let Some(entry) = found {
                return Some(entry.into_path());
            }
        }
        None
    }

    /// The scope a path belongs to, judged by its prefix.
    pub fn scope_of(&self, path: &Path) -> Scope {
        if let Some(project) = &self.project {
            if path.starts_with(project) {
                return Scope::Project;
            }
        }
        Scope::User
    }

    /// Slash-joined category fragment between the kind base and the file.
    /// Empty when the file sits directly in the base directory or outside it.
    pub fn category_path(&self, path: &Path, kind: ArtifactKind, scope: Scope) -> String {
        let Some(base) = self.base(kind, scope) else {
            return String::new();
        };
        match path.strip_prefix(&base) {
            Ok(rel) => {
                let parts: Vec<String> = rel
                    .parent()
                    .map(|p| {
                        p.components()
                            .map(|c| c.as_os_str().to_string_lossy().into_owned())
                            .collect()
                    })
                    .unwrap_or_default();
                parts.join("/")
            }
            Err(_) => String::new(),
        }
    }
}

/// Result of checking a path against the expected on-disk structure.
#[derive(Debug, Clone, Serialize)]
pub struct PathStructure {
    pub valid: bool,
    pub issues: Vec<String>,
    pub category_path: String,
    pub expected_base: String,
    pub actual_path: String,
}

/// Confirm a file lies under the expected root with an allowed extension.
pub fn validate_path_structure(
    roots: &Roots,
    path: &Path,
    kind: ArtifactKind,
    scope: Scope,
) -> PathStructure {
    let mut issues = Vec::new();

    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    if !kind.extensions().contains(&ext.as_str()) {
        issues.push(format!(
            "invalid extension '{ext}': expected one of {:?} for {kind}",
            kind.extensions()
        ));
    }

    let Some(base) = roots.base(kind, scope) else {
        issues.push("project path required for project scope".to_string());
        return PathStructure {
            valid: false,
            issues,
            category_path: String::new(),
            expected_base: String::new(),
            actual_path: path.display().to_string(),
        };
    };

    let category_path = if path.starts_with(&base) {
        roots.category_path(path, kind, scope)
    } else {
        issues.push(format!(
            "file path '{}' is not under expected base '{}'",
            path.display(),
            base.display()
        ));
        String::new()
    };

    PathStructure {
        valid: issues.is_empty(),
        issues,
        category_path,
        expected_base: base.display().to_string(),
        actual_path: path.display().to_string(),
    }
}
