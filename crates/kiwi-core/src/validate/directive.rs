//! Directive validation.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::parse::directive::extract_xml_block;
use crate::validate::ValidationReport;
use crate::version;

static NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9][a-z0-9_]*$").unwrap());
static XML_LIKE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());

const VALID_TIERS: &[&str] = &[
    "fast",
    "balanced",
    "general",
    "reasoning",
    "expert",
    "orchestrator",
];

/// Filename must be `<name>.md` and the name must be snake_case.
pub fn validate_filename(path: &Path, parsed: &Value) -> ValidationReport {
    let mut report = ValidationReport::ok();
    let Some(name) = parsed.get("name").and_then(Value::as_str) else {
        report.push_issue("directive name not found in parsed data");
        return report;
    };

    if !NAME_RE.is_match(name) {
        report.push_issue(format!(
            "invalid directive name '{name}': must be snake_case \
             (lowercase letters, numbers, underscores)"
        ));
    }

    let expected = format!("{name}.md");
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

/// Metadata checks: XML shape, permissions, model tier, version.
pub fn validate_metadata(parsed: &Value) -> ValidationReport {
    let mut report = ValidationReport::ok();

    let raw = parsed
        .get("raw")
        .and_then(Value::as_str)
        .or_else(|| parsed.get("content").and_then(Value::as_str))
        .unwrap_or_default();
    if !raw.is_empty() {
        validate_xml_shape(raw, &mut report);
    }

    validate_permissions(parsed, &mut report);
    validate_model(parsed, &mut report);

    match parsed.get("version").and_then(Value::as_str) {
        None => report.push_issue(
            "directive is missing required 'version' attribute; \
             add it to the <directive> tag: <directive name=\"...\" version=\"1.0.0\">",
        ),
        Some(v) if v == "0.0.0" => {
            report.push_issue("directive version must not be the 0.0.0 placeholder")
        }
        Some(v) if !version::is_valid_version(v) => report.push_issue(format!(
            "invalid version format '{v}': must be semver (e.g. 1.0.0, 2.1.3)"
        )),
        Some(_) => {}
    }

    report
}

/// The last non-whitespace token inside the fenced XML block must be exactly
/// `</directive>`. Content between the closing tag and the closing fence, or
/// XML-looking content after the fence, is rejected with the offending
/// substring so the author can find it.
fn validate_xml_shape(raw: &str, report: &mut ValidationReport) {
    let Some(xml) = extract_xml_block(raw) else {
        let has_open = raw.contains("<directive");
        let has_close = raw.contains("</directive>");
        if !has_open {
            report.push_issue("missing <directive> opening tag in content");
        } else if !has_close {
            report.push_issue("missing </directive> closing tag in content");
        } else {
            report.push_issue(
                "could not extract XML: <directive> and </directive> tags found but extraction failed",
            );
        }
        return;
    };

    if !xml.trim_end().ends_with("</directive>") {
        report.push_issue(
            "directive XML must end with the </directive> tag as the last element in the block",
        );
        return;
    }

    let end_tag = "</directive>";
    let Some(end_idx) = raw.rfind(end_tag) else {
        return;
    };
    let after_closing = &raw[end_idx + end_tag.len()..];

    match after_closing.find("```") {
        Some(fence) => {
            let before_fence = after_closing[..fence].trim();
            if !before_fence.is_empty() {
                report.push_issue(format!(
                    "unexpected content after code block closing tag: found {:?} \
                     between </directive> and the closing fence",
                    truncate(before_fence, 50)
                ));
            }
            let after_fence = after_closing[fence + 3..].trim();
            if !after_fence.is_empty() && XML_LIKE.is_match(after_fence) {
                report.push_issue(format!(
                    "unexpected content after code block: found {:?} after the closing fence",
                    truncate(after_fence, 100)
                ));
            }
        }
        None => {
            let trailing = after_closing.trim();
            if !trailing.is_empty() {
                report.push_issue(format!(
                    "unexpected content after code block: found {:?} after </directive>",
                    truncate(trailing, 50)
                ));
            }
        }
    }
}

fn validate_permissions(parsed: &Value, report: &mut ValidationReport) {
    let perms = parsed
        .get("permissions")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    if perms.is_empty() {
        report.push_issue("no permissions defined in directive");
        return;
    }
    for perm in &perms {
        let Some(obj) = perm.as_object() else {
            report.push_issue(format!("invalid permission format: {perm}"));
            continue;
        };
        if !obj.contains_key("tag") {
            report.push_issue("permission missing 'tag' field");
        }
        let has_attrs = obj
            .get("attrs")
            .and_then(Value::as_object)
            .map(|a| !a.is_empty())
            .unwrap_or(false);
        if !has_attrs {
            let tag = obj.get("tag").and_then(Value::as_str).unwrap_or("unknown");
            report.push_issue(format!("permission '{tag}' missing attributes"));
        }
    }
}

fn validate_model(parsed: &Value, report: &mut ValidationReport) {
    let model = parsed.get("model").filter(|m| !m.is_null());
    let Some(model) = model else {
        report.push_issue(
            "no <model> tag found in directive metadata; \
             add a <model> tag with the required 'tier' attribute inside <metadata>",
        );
        return;
    };

    match model.get("tier").and_then(Value::as_str) {
        None | Some("") => report.push_issue(
            "model tag exists but is missing the required 'tier' attribute, \
             e.g. <model tier=\"reasoning\"/>",
        ),
        Some(tier) if !VALID_TIERS.contains(&tier) => report.push_issue(format!(
            "invalid model tier '{tier}': must be one of {VALID_TIERS:?}"
        )),
        Some(_) => {}
    }

    if let Some(parallel) = model.get("parallel").and_then(Value::as_str) {
        if parallel != "true" && parallel != "false" {
            report.push_issue(format!(
                "model parallel '{parallel}' not valid: must be 'true' or 'false'"
            ));
        }
    }
    for key in ["fallback", "id"] {
        if let Some(v) = model.get(key) {
            if v.as_str().map(|s| s.trim().is_empty()).unwrap_or(true) {
                report.push_issue(format!("model {key} must be a non-empty string or omitted"));
            }
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::directive::parse_directive_str;
    use std::path::PathBuf;

    fn valid_content() -> String {
        r#"# Demo

```xml
<directive name="demo" version="1.0.0">
  <metadata>
    <description>d</description>
    <permissions>
      <allow type="read" scope="all" />
    </permissions>
    <model tier="fast" />
  </metadata>
</directive>
```
"#
        .to_string()
    }

    #[test]
    fn valid_directive_passes() {
        let parsed = parse_directive_str(&valid_content()).unwrap();
        let path = PathBuf::from("/tmp/.ai/directives/core/demo.md");
        let mut report = validate_filename(&path, &parsed);
        report.merge(validate_metadata(&parsed));
        assert!(report.valid, "issues: {:?}", report.issues);
    }

    #[test]
    fn filename_mismatch_detected() {
        let parsed = parse_directive_str(&valid_content()).unwrap();
        let report = validate_filename(Path::new("/x/other.md"), &parsed);
        assert!(!report.valid);
        assert!(report.issues[0].contains("expected 'demo.md'"));
    }

    #[test]
    fn junk_before_closing_fence_rejected() {
        let content = valid_content().replace("</directive>\n```", "</directive>\n<foo/>\n```");
        let parsed = parse_directive_str(&content).unwrap();
        let report = validate_metadata(&parsed);
        assert!(!report.valid);
        let issue = report
            .issues
            .iter()
            .find(|i| i.contains("unexpected content after code block"))
            .expect("trailing-content issue");
        assert!(issue.contains("<foo/>"));
    }

    #[test]
    fn xml_after_fence_rejected() {
        let content = format!("{}\n<stray>tag</stray>\n", valid_content());
        let parsed = parse_directive_str(&content).unwrap();
        let report = validate_metadata(&parsed);
        assert!(!report.valid);
        assert!(report
            .issues
            .iter()
            .any(|i| i.contains("after the closing fence")));
    }

    #[test]
    fn bad_tier_rejected() {
        let content = valid_content().replace("tier=\"fast\"", "tier=\"enormous\"");
        let parsed = parse_directive_str(&content).unwrap();
        let report = validate_metadata(&parsed);
        assert!(report.issues.iter().any(|i| i.contains("invalid model tier")));
    }

    #[test]
    fn empty_permissions_rejected() {
        let content = valid_content().replace(
            "<allow type=\"read\" scope=\"all\" />",
            "",
        );
        let parsed = parse_directive_str(&content).unwrap();
        let report = validate_metadata(&parsed);
        assert!(report.issues.iter().any(|i| i.contains("no permissions")));
    }

    #[test]
    fn permission_without_attrs_rejected() {
        let content = valid_content().replace(
            "<allow type=\"read\" scope=\"all\" />",
            "<allow />",
        );
        let parsed = parse_directive_str(&content).unwrap();
        let report = validate_metadata(&parsed);
        assert!(report
            .issues
            .iter()
            .any(|i| i.contains("missing attributes")));
    }

    #[test]
    fn placeholder_version_rejected() {
        let content = valid_content().replace("version=\"1.0.0\"", "version=\"0.0.0\"");
        let parsed = parse_directive_str(&content).unwrap();
        let report = validate_metadata(&parsed);
        assert!(report.issues.iter().any(|i| i.contains("0.0.0")));
    }
}
