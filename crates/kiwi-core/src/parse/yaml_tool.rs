//! YAML tool parsing.
//!
//! YAML tools declare their manifest directly:
//! `tool_id`, `tool_type`, `executor_id` (optional), `category`, `version`,
//! `config` (map), `parameters` (list of `{name, required, type,
//! description?}`). The signature line is a `#` comment on the first line, so
//! the document parses with or without it.

use std::path::Path;

use serde_json::{Map, Value};

use crate::errors::{KiwiError, KiwiResult};

/// Parse a YAML tool from content. `file_name` supplies the fallback id.
pub fn parse_yaml_tool_str(file_content: &str, file_name: &str) -> KiwiResult<Value> {
    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name);

    let doc: serde_yaml::Value = serde_yaml::from_str(file_content)
        .map_err(|e| KiwiError::parse(format!("invalid YAML tool: {e}")))?;
    let doc: Value = serde_json::to_value(doc)
        .map_err(|e| KiwiError::serialization(format!("failed to convert YAML: {e}")))?;

    let obj = doc
        .as_object()
        .ok_or_else(|| KiwiError::parse("YAML tool must be a mapping at the top level"))?;

    let tool_id = obj
        .get("tool_id")
        .and_then(Value::as_str)
        .unwrap_or(stem)
        .to_string();

    let mut out = Map::new();
    out.insert("name".to_string(), Value::String(tool_id.clone()));
    out.insert("tool_id".to_string(), Value::String(tool_id));
    for key in [
        "version",
        "tool_type",
        "executor_id",
        "category",
        "description",
        "config",
        "parameters",
        "requires",
    ] {
        out.insert(
            key.to_string(),
            obj.get(key).cloned().unwrap_or(Value::Null),
        );
    }
    if out["config"].is_null() {
        out.insert("config".to_string(), Value::Object(Map::new()));
    }
    if out["parameters"].is_null() {
        out.insert("parameters".to_string(), Value::Array(Vec::new()));
    }
    Ok(Value::Object(out))
}

/// Parse a YAML tool file from disk.
pub fn parse_yaml_tool_file(path: &Path) -> KiwiResult<Value> {
    let content = std::fs::read_to_string(path)?;
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .ok_or_else(|| KiwiError::invalid_argument("tool path has no file name"))?;
    parse_yaml_tool_str(&content, name)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"tool_id: http_fetch
tool_type: api
executor_id: http_client
category: network
version: 1.0.0
config:
  url: https://api.example.com/v1/items/{item_id}
  method: GET
  timeout: 30
parameters:
  - name: item_id
    required: true
    type: string
    description: Item identifier
"#;

    #[test]
    fn parses_manifest_fields() {
        let v = parse_yaml_tool_str(SAMPLE, "http_fetch.yaml").unwrap();
        assert_eq!(v["tool_id"], "http_fetch");
        assert_eq!(v["tool_type"], "api");
        assert_eq!(v["executor_id"], "http_client");
        assert_eq!(v["version"], "1.0.0");
        assert_eq!(v["config"]["method"], "GET");
        assert_eq!(v["parameters"][0]["name"], "item_id");
    }

    #[test]
    fn signature_comment_is_tolerated() {
        let signed = format!(
            "# kiwi-mcp:validated:2026-01-01T00:00:00Z:{}\n{}",
            "b".repeat(64),
            SAMPLE
        );
        let v = parse_yaml_tool_str(&signed, "http_fetch.yaml").unwrap();
        assert_eq!(v["tool_id"], "http_fetch");
    }

    #[test]
    fn missing_tool_id_falls_back_to_stem() {
        let v = parse_yaml_tool_str("version: 1.0.0\ntool_type: api\n", "fallback.yml").unwrap();
        assert_eq!(v["tool_id"], "fallback");
        assert_eq!(v["config"], serde_json::json!({}));
    }
}
