use std::path::Path;

use anyhow::Result;

use kiwi_core::artifact::{ArtifactKind, Scope};
use kiwi_store::Store;

use crate::output;

pub fn run(project: Option<&Path>, kind: &str, id: &str, scope: Option<&str>) -> Result<()> {
    let kind = ArtifactKind::parse(kind)?;
    let scope = scope.map(Scope::parse).transpose()?;
    let store = Store::new(project);
    output::print(&store.sign(kind, id, scope))
}
