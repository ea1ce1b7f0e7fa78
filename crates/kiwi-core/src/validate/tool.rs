//! Tool validation (definition-time manifest checks).

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::parse::artifact_id;
use crate::validate::ValidationReport;
use crate::version;

static CAPABILITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+$").unwrap());

const ALLOWED_EXTENSIONS: &[&str] = &["py", "sh", "yaml", "yml"];

/// Filename stem must match the tool id and the extension must be allowed.
pub fn validate_filename(path: &Path, parsed: &Value) -> ValidationReport {
    let mut report = ValidationReport::ok();
    let Some(tool_id) = artifact_id(parsed) else {
        report.push_issue("tool id (tool_id or name) not found in parsed data");
        return report;
    };

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    if !ALLOWED_EXTENSIONS.contains(&ext) {
        report.push_issue(format!(
            "unsupported file extension '.{ext}': expected one of .py, .sh, .yaml, .yml"
        ));
    }

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    if stem != tool_id {
        report.push_issue(format!(
            "filename mismatch: expected '{tool_id}.{ext}', got '{}'",
            path.file_name()
                .and_then(|f| f.to_str())
                .unwrap_or_default()
        ));
    }
    report
}

/// Manifest checks: tool_type present, executor_id required unless primitive,
/// semver version, capability grammar.
pub fn validate_metadata(parsed: &Value) -> ValidationReport {
    let mut report = ValidationReport::ok();

    if artifact_id(parsed).is_none() {
        report.push_issue("tool id (tool_id or name) is required");
    }

    let tool_type = parsed.get("tool_type").and_then(Value::as_str);
    match tool_type {
        None | Some("") => report.push_issue("tool type (tool_type) is required"),
        Some(_) => {}
    }

    match parsed.get("version").and_then(Value::as_str) {
        None | Some("") => report.push_issue(
            "tool is missing required version; add at module level: __version__ = \"1.0.0\"",
        ),
        Some("0.0.0") => {
            report.push_issue("tool version must not be the 0.0.0 placeholder")
        }
        Some(v) if !version::is_valid_version(v) => report.push_issue(format!(
            "invalid version format '{v}': must be semver (e.g. 1.0.0)"
        )),
        Some(_) => {}
    }

    // Only primitives may sit at the bottom of a chain with no executor.
    if let Some(tt) = tool_type {
        if !tt.is_empty() && tt != "primitive" {
            let executor = parsed
                .get("executor_id")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty());
            if executor.is_none() {
                report.push_issue(format!(
                    "tool type '{tt}' requires an executor_id field; \
                     non-primitive tools must reference another tool in the executor chain"
                ));
            }
        }
    }

    if let Some(requires) = parsed.get("requires").filter(|r| !r.is_null()) {
        match requires.as_array() {
            None => report.push_issue(format!(
                "'requires' field must be a list of capability strings, got {requires}"
            )),
            Some(caps) => {
                for cap in caps {
                    match cap.as_str() {
                        None => report.push_issue(format!(
                            "capability in 'requires' must be a string, got {cap}"
                        )),
                        Some(s) if !CAPABILITY_RE.is_match(s) => report.push_issue(format!(
                            "invalid capability format '{s}': \
                             must be <resource>.<action> (e.g. 'fs.read', 'tool.bash')"
                        )),
                        Some(_) => {}
                    }
                }
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_tool() -> Value {
        json!({
            "tool_id": "enrich_emails",
            "name": "enrich_emails",
            "version": "1.0.0",
            "tool_type": "script",
            "executor_id": "python_runtime",
        })
    }

    #[test]
    fn valid_tool_passes() {
        let parsed = valid_tool();
        let path = Path::new("/p/.ai/tools/enrichment/enrich_emails.py");
        let mut report = validate_filename(path, &parsed);
        report.merge(validate_metadata(&parsed));
        assert!(report.valid, "issues: {:?}", report.issues);
    }

    #[test]
    fn primitive_without_executor_passes() {
        let parsed = json!({
            "tool_id": "subprocess",
            "version": "1.0.0",
            "tool_type": "primitive",
            "executor_id": null,
        });
        let report = validate_metadata(&parsed);
        assert!(report.valid, "issues: {:?}", report.issues);
    }

    #[test]
    fn non_primitive_requires_executor() {
        let mut parsed = valid_tool();
        parsed["executor_id"] = Value::Null;
        let report = validate_metadata(&parsed);
        assert!(report
            .issues
            .iter()
            .any(|i| i.contains("requires an executor_id")));
    }

    #[test]
    fn capability_grammar_enforced() {
        let mut parsed = valid_tool();
        parsed["requires"] = json!(["fs.read", "tool.bash", "badcap"]);
        let report = validate_metadata(&parsed);
        assert_eq!(report.issues.len(), 1);
        assert!(report.issues[0].contains("badcap"));
    }

    #[test]
    fn wrong_extension_rejected() {
        let parsed = valid_tool();
        let report = validate_filename(Path::new("/x/enrich_emails.rb"), &parsed);
        assert!(report
            .issues
            .iter()
            .any(|i| i.contains("unsupported file extension")));
    }

    #[test]
    fn stem_mismatch_rejected() {
        let parsed = valid_tool();
        let report = validate_filename(Path::new("/x/other_tool.py"), &parsed);
        assert!(report.issues.iter().any(|i| i.contains("filename mismatch")));
    }
}
