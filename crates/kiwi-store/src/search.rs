//! Recursive artifact search with relevance scoring.

use std::path::Path;

use serde::Serialize;
use serde_json::Value;
use tracing::warn;
use walkdir::WalkDir;

use kiwi_core::artifact::{ArtifactKind, Scope};
use kiwi_core::parse;

use crate::paths::Roots;

/// How search results are ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortBy {
    Score,
    Name,
}

/// One search result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub name: String,
    pub description: String,
    pub scope: Scope,
    pub path: String,
    pub score: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Search for artifacts matching `query`. `scope` narrows the walk to one
/// scope; `None` searches both, project first.
///
/// Files that fail to parse are skipped with a warning; a broken artifact
/// must not hide the rest of the store.
pub fn search_artifacts(
    roots: &Roots,
    kind: ArtifactKind,
    query: &str,
    scope: Option<Scope>,
    limit: usize,
    sort_by: SortBy,
) -> Vec<SearchHit> {
    let terms: Vec<String> = query
        .to_lowercase()
        .split_whitespace()
        .map(str::to_owned)
        .collect();

    let scopes: Vec<Scope> = roots
        .search_scopes()
        .into_iter()
        .filter(|s| scope.map_or(true, |want| want == *s))
        .collect();

    let mut hits = Vec::new();
    for scope in scopes {
        let Some(base) = roots.base(kind, scope) else {
            continue;
        };
        if !base.is_dir() {
            continue;
        }
        for entry in WalkDir::new(&base)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
        {
            let path = entry.path();
            if !has_kind_extension(kind, path) {
                continue;
            }
            match parse::parse_artifact_file(kind, path) {
                Ok(parsed) => {
                    if let Some(hit) = score_artifact(&parsed, path, scope, &terms) {
                        hits.push(hit);
                    }
                }
                Err(e) => {
                    warn!(target: "kiwi_store.search", path = %path.display(), error = %e, "skipping unparseable artifact");
                }
            }
        }
    }

    match sort_by {
        SortBy::Score => hits.sort_by(|a, b| b.score.cmp(&a.score).then(a.name.cmp(&b.name))),
        SortBy::Name => hits.sort_by(|a, b| a.name.cmp(&b.name)),
    }
    hits.truncate(limit);
    hits
}

fn has_kind_extension(kind: ArtifactKind, path: &Path) -> bool {
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    kind.extensions().contains(&ext.as_str())
}

fn score_artifact(
    parsed: &Value,
    path: &Path,
    scope: Scope,
    terms: &[String],
) -> Option<SearchHit> {
    let name = parse::artifact_id(parsed)?.to_string();
    let description = parsed
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let score = score_relevance(&name, &description, terms);
    if score == 0 && !terms.is_empty() {
        return None;
    }

    Some(SearchHit {
        name,
        description,
        scope,
        path: path.display().to_string(),
        score,
        tool_type: parsed
            .get("tool_type")
            .and_then(Value::as_str)
            .map(str::to_owned),
        version: parsed
            .get("version")
            .and_then(Value::as_str)
            .map(str::to_owned),
    })
}

/// Keyword relevance: exact name match outranks name substring, which
/// outranks a description mention.
fn score_relevance(name: &str, description: &str, terms: &[String]) -> u32 {
    if terms.is_empty() {
        return 1;
    }
    let name_lc = name.to_lowercase();
    let desc_lc = description.to_lowercase();
    let mut score = 0;
    for term in terms {
        if name_lc == *term {
            score += 15;
        } else if name_lc.contains(term.as_str()) {
            score += 10;
        }
        if desc_lc.contains(term.as_str()) {
            score += 3;
        }
    }
    score
}
