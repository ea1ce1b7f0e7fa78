use std::path::Path;

use anyhow::{anyhow, Result};
use serde::Serialize;

use kiwi_core::artifact::{ArtifactKind, Scope};
use kiwi_store::search::{search_artifacts, SearchHit, SortBy};
use kiwi_store::Roots;

use crate::output;

#[derive(Debug, Serialize)]
struct SearchOut {
    status: &'static str,
    query: String,
    scope: String,
    total: usize,
    results: Vec<SearchHit>,
}

pub fn run(
    project: Option<&Path>,
    kind: &str,
    query: &str,
    scope: &str,
    limit: usize,
) -> Result<()> {
    let kind = ArtifactKind::parse(kind)?;
    let scope_filter = match scope {
        "all" => None,
        other => Some(Scope::parse(other).map_err(|_| {
            anyhow!("invalid scope '{other}': must be all, project, or user")
        })?),
    };

    let roots = Roots::new(project);
    let results = search_artifacts(&roots, kind, query, scope_filter, limit, SortBy::Score);
    output::print(&SearchOut {
        status: "ok",
        query: query.to_string(),
        scope: scope.to_string(),
        total: results.len(),
        results,
    })
}
