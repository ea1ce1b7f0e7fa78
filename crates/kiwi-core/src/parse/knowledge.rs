//! Knowledge entry parsing: YAML frontmatter plus Markdown body.

use std::path::Path;

use serde_json::{Map, Value};

use crate::artifact::ArtifactKind;
use crate::errors::{KiwiError, KiwiResult};
use crate::signature::SignatureStrategy;

/// Parse a knowledge entry from full file content.
///
/// Required frontmatter: `id`, `title`, `entry_type`, `version`. Optional:
/// `category`, `tags`, `schema`. The returned `content` field is the Markdown
/// body after the frontmatter.
pub fn parse_knowledge_str(file_content: &str) -> KiwiResult<Value> {
    let strategy = SignatureStrategy::for_artifact(ArtifactKind::Knowledge, None);
    let without_sig = strategy.remove_signature(file_content);

    let (frontmatter, body) = split_frontmatter(&without_sig)
        .ok_or_else(|| KiwiError::parse("knowledge entry has no YAML frontmatter"))?;

    let fm: serde_yaml::Value = serde_yaml::from_str(frontmatter)
        .map_err(|e| KiwiError::parse(format!("invalid frontmatter: {e}")))?;
    let fm: Value = serde_json::to_value(fm)
        .map_err(|e| KiwiError::serialization(format!("failed to convert frontmatter: {e}")))?;
    let fm_obj = fm
        .as_object()
        .ok_or_else(|| KiwiError::parse("frontmatter must be a mapping"))?;

    let mut out = Map::new();
    for key in [
        "id",
        "title",
        "entry_type",
        "version",
        "category",
        "schema",
    ] {
        out.insert(
            key.to_string(),
            fm_obj.get(key).cloned().unwrap_or(Value::Null),
        );
    }
    out.insert(
        "tags".to_string(),
        fm_obj.get("tags").cloned().unwrap_or(Value::Array(Vec::new())),
    );
    out.insert(
        "name".to_string(),
        fm_obj.get("id").cloned().unwrap_or(Value::Null),
    );
    out.insert(
        "content".to_string(),
        Value::String(body.trim().to_string()),
    );
    out.insert("raw".to_string(), Value::String(file_content.to_string()));
    Ok(Value::Object(out))
}

/// Parse a knowledge file from disk.
pub fn parse_knowledge_file(path: &Path) -> KiwiResult<Value> {
    let content = std::fs::read_to_string(path)?;
    parse_knowledge_str(&content)
}

/// Split `---` delimited frontmatter from the body.
fn split_frontmatter(content: &str) -> Option<(&str, &str)> {
    let rest = content.strip_prefix("---")?;
    let end = rest.find("\n---")?;
    let frontmatter = &rest[..end];
    let body_start = end + 4;
    let body = rest.get(body_start..).unwrap_or("");
    // Skip the remainder of the closing delimiter line.
    let body = body.strip_prefix('\n').unwrap_or(body);
    Some((frontmatter, body))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"---
id: retry_policy
title: Retry policy notes
entry_type: note
version: "1.0.0"
category: ops/http
tags:
  - http
  - retries
---

Retries apply to connection errors only.
"#;

    #[test]
    fn parses_frontmatter_and_body() {
        let v = parse_knowledge_str(SAMPLE).unwrap();
        assert_eq!(v["id"], "retry_policy");
        assert_eq!(v["title"], "Retry policy notes");
        assert_eq!(v["entry_type"], "note");
        assert_eq!(v["version"], "1.0.0");
        assert_eq!(v["category"], "ops/http");
        assert_eq!(v["tags"], serde_json::json!(["http", "retries"]));
        assert_eq!(v["content"], "Retries apply to connection errors only.");
    }

    #[test]
    fn signature_line_is_ignored() {
        let signed = format!(
            "<!-- kiwi-mcp:validated:2026-01-01T00:00:00Z:{} -->\n{}",
            "c".repeat(64),
            SAMPLE
        );
        let v = parse_knowledge_str(&signed).unwrap();
        assert_eq!(v["id"], "retry_policy");
    }

    #[test]
    fn missing_frontmatter_is_parse_error() {
        let err = parse_knowledge_str("just a body\n").unwrap_err();
        assert!(err.to_string().contains("frontmatter"));
    }
}
