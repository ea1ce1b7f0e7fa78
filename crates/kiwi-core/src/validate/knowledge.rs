//! Knowledge entry validation.

use std::path::Path;

use serde_json::Value;

use crate::validate::ValidationReport;
use crate::version;

/// Filename must be `<id>.md`.
pub fn validate_filename(path: &Path, parsed: &Value) -> ValidationReport {
    let mut report = ValidationReport::ok();
    let Some(id) = parsed.get("id").and_then(Value::as_str) else {
        report.push_issue("id not found in parsed data");
        return report;
    };

    let expected = format!("{id}.md");
    let actual = path
        .file_name()
        .and_then(|f| f.to_str())
        .unwrap_or_default();
    if actual != expected {
        report.push_issue(format!(
            "filename mismatch: expected '{expected}', got '{actual}'"
        ));
    }
    report
}

/// Required fields: `id`, `title`, non-empty content, semver version.
pub fn validate_metadata(parsed: &Value) -> ValidationReport {
    let mut report = ValidationReport::ok();

    if parsed.get("id").and_then(Value::as_str).is_none() {
        report.push_issue("id is required");
    }
    if parsed.get("title").and_then(Value::as_str).is_none() {
        report.push_issue("title is required");
    }
    if parsed
        .get("content")
        .and_then(Value::as_str)
        .map(|c| c.trim().is_empty())
        .unwrap_or(true)
    {
        report.push_issue("content is required");
    }

    match parsed.get("version").and_then(Value::as_str) {
        None | Some("") | Some("0.0.0") => report.push_issue(
            "knowledge entry is missing required 'version' in YAML frontmatter; \
             add: version: \"1.0.0\"",
        ),
        Some(v) if !version::is_valid_version(v) => report.push_issue(format!(
            "invalid version format '{v}': must be semver (e.g. 1.0.0)"
        )),
        Some(_) => {}
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn valid_entry_passes() {
        let parsed = json!({
            "id": "retry_policy",
            "title": "Retry policy",
            "entry_type": "note",
            "version": "1.0.0",
            "content": "body",
        });
        let mut report = validate_filename(Path::new("/u/.ai/knowledge/ops/retry_policy.md"), &parsed);
        report.merge(validate_metadata(&parsed));
        assert!(report.valid, "issues: {:?}", report.issues);
    }

    #[test]
    fn missing_title_rejected() {
        let parsed = json!({"id": "x", "version": "1.0.0", "content": "c"});
        let report = validate_metadata(&parsed);
        assert!(report.issues.iter().any(|i| i.contains("title")));
    }

    #[test]
    fn missing_version_rejected() {
        let parsed = json!({"id": "x", "title": "t", "content": "c"});
        let report = validate_metadata(&parsed);
        assert!(report.issues.iter().any(|i| i.contains("version")));
    }
}
