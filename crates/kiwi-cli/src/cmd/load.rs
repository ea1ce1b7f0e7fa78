use std::path::Path;

use anyhow::Result;

use kiwi_core::artifact::{ArtifactKind, Scope};
use kiwi_store::Store;

use crate::output;

pub fn run(
    project: Option<&Path>,
    kind: &str,
    id: &str,
    from: &str,
    to: Option<&str>,
) -> Result<()> {
    let kind = ArtifactKind::parse(kind)?;
    let from = Scope::parse(from)?;
    let to = to.map(Scope::parse).transpose()?;

    let store = Store::new(project);
    output::print(&store.load(kind, id, from, to))
}

pub fn delete(project: Option<&Path>, kind: &str, id: &str, scope: Option<&str>) -> Result<()> {
    let kind = ArtifactKind::parse(kind)?;
    let scope = scope.map(Scope::parse).transpose()?;

    let store = Store::new(project);
    output::print(&store.delete(kind, id, scope))
}
