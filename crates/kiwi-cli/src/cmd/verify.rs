use std::path::Path;

use anyhow::Result;

use kiwi_core::artifact::ArtifactKind;
use kiwi_store::Store;

use crate::output;

pub fn run(project: Option<&Path>, kind: &str, id: &str) -> Result<()> {
    let kind = ArtifactKind::parse(kind)?;
    let store = Store::new(project);
    output::print(&store.verify_file(kind, id))
}
