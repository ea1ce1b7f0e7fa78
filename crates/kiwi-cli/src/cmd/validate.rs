use std::path::Path;

use anyhow::Result;
use serde_json::json;

use kiwi_core::artifact::ArtifactKind;
use kiwi_core::manager::MetadataManager;
use kiwi_core::report::Envelope;
use kiwi_core::validate::ValidationManager;
use kiwi_store::Store;

use crate::output;

pub fn run(project: Option<&Path>, kind: &str, id: &str) -> Result<()> {
    let kind = ArtifactKind::parse(kind)?;
    let store = Store::new(project);

    let Some(path) = store.resolve(kind, id) else {
        return output::print(&Envelope::not_found(kind.as_str(), id));
    };

    let envelope = match MetadataManager::parse_file(kind, &path) {
        Err(e) => Envelope::parse_error(e.to_string(), Vec::new()),
        Ok(parsed) => {
            let report = ValidationManager::validate(kind, &path, &parsed)?;
            if report.valid {
                Envelope::ok()
                    .with_field("valid", json!(true))
                    .with_field("path", json!(path.display().to_string()))
                    .with_field("warnings", json!(report.warnings))
            } else {
                Envelope::validation_failed(report.issues)
                    .with_field("path", json!(path.display().to_string()))
                    .with_field("warnings", json!(report.warnings))
            }
        }
    };
    output::print(&envelope)
}
