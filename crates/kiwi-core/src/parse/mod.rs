//! Artifact parsers.
//!
//! Every parser produces a uniform `serde_json::Value` map with at least
//! `name`, `version`, and `description`, plus kind-specific fields. The
//! dispatcher picks the concrete parser by kind and, for tools, by file
//! extension.

use std::path::Path;

use serde_json::{Map, Value};

use crate::artifact::ArtifactKind;
use crate::errors::{KiwiError, KiwiResult};

pub mod directive;
pub mod knowledge;
pub mod python;
pub mod xml;
pub mod yaml_tool;

/// Parse an artifact file by kind.
pub fn parse_artifact_file(kind: ArtifactKind, path: &Path) -> KiwiResult<Value> {
    match kind {
        ArtifactKind::Directive => directive::parse_directive_file(path),
        ArtifactKind::Knowledge => knowledge::parse_knowledge_file(path),
        ArtifactKind::Tool => parse_tool_file(path),
    }
}

/// Parse a tool file, dispatching on extension.
pub fn parse_tool_file(path: &Path) -> KiwiResult<Value> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    match ext {
        "py" => python::parse_python_tool_file(path),
        "yaml" | "yml" => yaml_tool::parse_yaml_tool_file(path),
        "sh" => parse_shell_tool_file(path),
        other => Err(KiwiError::invalid_argument(format!(
            "unsupported tool extension: .{other}"
        ))),
    }
}

/// Parse tool content already in memory, dispatching on the file name.
pub fn parse_tool_str(content: &str, file_name: &str) -> KiwiResult<Value> {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    match ext {
        "py" => python::parse_python_tool_str(content, file_name),
        "yaml" | "yml" => yaml_tool::parse_yaml_tool_str(content, file_name),
        "sh" => Ok(parse_shell_tool_str(content, file_name)),
        other => Err(KiwiError::invalid_argument(format!(
            "unsupported tool extension: .{other}"
        ))),
    }
}

fn parse_shell_tool_file(path: &Path) -> KiwiResult<Value> {
    let content = std::fs::read_to_string(path)?;
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .ok_or_else(|| KiwiError::invalid_argument("tool path has no file name"))?;
    Ok(parse_shell_tool_str(&content, name))
}

/// Shell tools carry no metadata constants; the id comes from the stem and
/// the description from the leading comment block. They stay unsignable until
/// given a version through a YAML companion manifest.
fn parse_shell_tool_str(content: &str, file_name: &str) -> Value {
    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name);

    let description = content
        .lines()
        .skip_while(|l| l.starts_with("#!") || l.contains("kiwi-mcp:validated"))
        .take_while(|l| l.starts_with('#'))
        .map(|l| l.trim_start_matches('#').trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    let mut out = Map::new();
    out.insert("name".to_string(), Value::String(stem.to_string()));
    out.insert("tool_id".to_string(), Value::String(stem.to_string()));
    out.insert("version".to_string(), Value::Null);
    out.insert("tool_type".to_string(), Value::Null);
    out.insert("executor_id".to_string(), Value::Null);
    out.insert("category".to_string(), Value::Null);
    out.insert("description".to_string(), Value::String(description));
    Value::Object(out)
}

/// Borrow a string field from a parsed artifact map.
pub fn str_field<'a>(parsed: &'a Value, key: &str) -> Option<&'a str> {
    parsed.get(key).and_then(Value::as_str)
}

/// The identity field: `tool_id` for tools, falling back to `name`/`id`.
pub fn artifact_id(parsed: &Value) -> Option<&str> {
    str_field(parsed, "tool_id")
        .or_else(|| str_field(parsed, "name"))
        .or_else(|| str_field(parsed, "id"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn dispatch_parses_each_kind_from_disk() {
        let dir = TempDir::new().unwrap();

        let directive = dir.path().join("demo.md");
        fs::write(
            &directive,
            "```xml\n<directive name=\"demo\" version=\"1.0.0\">\n<metadata><description>d</description></metadata>\n</directive>\n```\n",
        )
        .unwrap();
        let parsed = parse_artifact_file(ArtifactKind::Directive, &directive).unwrap();
        assert_eq!(parsed["name"], "demo");

        let knowledge = dir.path().join("note.md");
        fs::write(
            &knowledge,
            "---\nid: note\ntitle: Note\nentry_type: note\nversion: \"1.0.0\"\n---\n\nBody.\n",
        )
        .unwrap();
        let parsed = parse_artifact_file(ArtifactKind::Knowledge, &knowledge).unwrap();
        assert_eq!(parsed["title"], "Note");

        let tool = dir.path().join("tool.yaml");
        fs::write(&tool, "tool_id: tool\ntool_type: primitive\nversion: 1.0.0\n").unwrap();
        let parsed = parse_artifact_file(ArtifactKind::Tool, &tool).unwrap();
        assert_eq!(parsed["tool_type"], "primitive");
    }

    #[test]
    fn shell_description_from_comments() {
        let content = "#!/bin/sh\n# Sync backups\n# to the archive host.\n\necho done\n";
        let v = parse_shell_tool_str(content, "sync_backups.sh");
        assert_eq!(v["name"], "sync_backups");
        assert_eq!(v["description"], "Sync backups to the archive host.");
        assert_eq!(v["version"], Value::Null);
    }

    #[test]
    fn unknown_extension_rejected() {
        let err = parse_tool_str("", "tool.rb").unwrap_err();
        assert!(err.to_string().contains("unsupported tool extension"));
    }

    #[test]
    fn artifact_id_prefers_tool_id() {
        let v = serde_json::json!({"tool_id": "a", "name": "b"});
        assert_eq!(artifact_id(&v), Some("a"));
        let v = serde_json::json!({"id": "only"});
        assert_eq!(artifact_id(&v), Some("only"));
    }
}
