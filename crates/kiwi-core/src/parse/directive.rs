//! Directive parsing: XML-in-Markdown.
//!
//! A directive file is Markdown with a fenced ```xml block containing a
//! single `<directive name=".." version="..">` element. The canonical body is
//! the slice from the first `<directive ...>` through the last
//! `</directive>`; everything around it (titles, prose, the fence itself) is
//! decoration and does not participate in hashing.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Map, Value};

use crate::errors::{KiwiError, KiwiResult};
use crate::parse::xml::{self, XmlNode};

static DIRECTIVE_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"<directive[^>]*>").unwrap());

/// Extract the `<directive ...> ... </directive>` slice from file content.
///
/// Uses the first opening tag and the *last* closing tag, so nested example
/// snippets inside CDATA do not truncate the body.
pub fn extract_xml_block(content: &str) -> Option<String> {
    let open = DIRECTIVE_OPEN.find(content)?;
    let end_tag = "</directive>";
    let end = content.rfind(end_tag)?;
    if end < open.start() {
        return None;
    }
    Some(content[open.start()..end + end_tag.len()].trim().to_string())
}

/// Parse a directive from full file content.
///
/// Returns a uniform map:
/// `{name, version, description, category, permissions, model, inputs,
///   input_schema, steps, mcps, parsed, content, raw}`.
pub fn parse_directive_str(file_content: &str) -> KiwiResult<Value> {
    let xml_block = extract_xml_block(file_content)
        .ok_or_else(|| KiwiError::parse("no <directive> element found in content"))?;

    let root = xml::parse_lenient(&xml_block).map_err(|e| enrich_parse_error(&xml_block, e))?;
    if root.tag != "directive" {
        return Err(KiwiError::parse(format!(
            "expected <directive> root element, got <{}>",
            root.tag
        )));
    }

    let mut out = Map::new();
    out.insert(
        "name".to_string(),
        root.attr("name").map(str::to_owned).map(Value::String).unwrap_or(Value::Null),
    );
    out.insert(
        "version".to_string(),
        root.attr("version").map(str::to_owned).map(Value::String).unwrap_or(Value::Null),
    );

    let metadata = root.child("metadata");
    out.insert(
        "description".to_string(),
        child_text(metadata, "description")
            .map(Value::String)
            .unwrap_or(Value::Null),
    );
    out.insert(
        "category".to_string(),
        child_text(metadata, "category")
            .map(Value::String)
            .unwrap_or(Value::Null),
    );
    out.insert("permissions".to_string(), parse_permissions(metadata));
    out.insert("model".to_string(), parse_model(metadata));

    let (inputs, input_schema) = parse_inputs(root.child("inputs"));
    out.insert("inputs".to_string(), inputs);
    out.insert("input_schema".to_string(), input_schema);

    out.insert("steps".to_string(), parse_steps(root.child("process")));
    out.insert("mcps".to_string(), parse_mcps(root.child("mcps")));

    out.insert("parsed".to_string(), xml::node_to_value(&root));
    out.insert("content".to_string(), Value::String(xml_block));
    out.insert("raw".to_string(), Value::String(file_content.to_string()));
    Ok(Value::Object(out))
}

/// Parse a directive file from disk.
pub fn parse_directive_file(path: &Path) -> KiwiResult<Value> {
    let content = std::fs::read_to_string(path)?;
    parse_directive_str(&content)
}

fn child_text(parent: Option<&XmlNode>, tag: &str) -> Option<String> {
    parent
        .and_then(|p| p.child(tag))
        .map(|n| n.text_trimmed().to_string())
        .filter(|s| !s.is_empty())
}

/// Permission entries are whatever tags appear under `<permissions>`; each is
/// reported as `{tag, attrs}` so validators can require non-empty attrs.
fn parse_permissions(metadata: Option<&XmlNode>) -> Value {
    let Some(perms) = metadata.and_then(|m| m.child("permissions")) else {
        return Value::Array(Vec::new());
    };
    let entries: Vec<Value> = perms
        .children
        .iter()
        .map(|p| {
            let mut attrs = Map::new();
            for (k, v) in &p.attrs {
                attrs.insert(k.clone(), Value::String(v.clone()));
            }
            json!({"tag": p.tag, "attrs": attrs})
        })
        .collect();
    Value::Array(entries)
}

fn parse_model(metadata: Option<&XmlNode>) -> Value {
    let model = metadata.and_then(|m| m.child("model").or_else(|| m.child("model_class")));
    let Some(model) = model else {
        return Value::Null;
    };
    let mut out = Map::new();
    for key in ["tier", "fallback", "parallel", "id"] {
        if let Some(v) = model.attr(key) {
            out.insert(key.to_string(), Value::String(v.to_string()));
        }
    }
    Value::Object(out)
}

fn parse_inputs(inputs: Option<&XmlNode>) -> (Value, Value) {
    let Some(inputs) = inputs else {
        return (Value::Array(Vec::new()), Value::Null);
    };
    let specs: Vec<Value> = inputs
        .children_named("input")
        .map(|n| {
            json!({
                "name": n.attr("name").unwrap_or_default(),
                "type": n.attr("type").unwrap_or("string"),
                "required": n.attr("required").map(|r| r == "true").unwrap_or(false),
            })
        })
        .collect();

    // An optional <schema> child holds a raw JSON Schema block.
    let schema = inputs
        .child("schema")
        .map(|n| n.text_trimmed())
        .filter(|s| !s.is_empty())
        .and_then(|s| serde_json::from_str::<Value>(s).ok())
        .unwrap_or(Value::Null);

    (Value::Array(specs), schema)
}

fn parse_steps(process: Option<&XmlNode>) -> Value {
    let Some(process) = process else {
        return Value::Array(Vec::new());
    };
    let steps: Vec<Value> = process
        .children_named("step")
        .map(|step| {
            let checks: Vec<Value> = step
                .child("verification")
                .map(|v| {
                    v.children_named("check")
                        .map(|c| {
                            Value::String(
                                c.attr("name")
                                    .map(str::to_owned)
                                    .unwrap_or_else(|| c.text_trimmed().to_string()),
                            )
                        })
                        .collect()
                })
                .unwrap_or_default();
            json!({
                "name": step.attr("name").unwrap_or_default(),
                "description": step.child("description").map(|n| n.text_trimmed()).unwrap_or_default(),
                "action": step.child("action").map(|n| n.text_trimmed()).unwrap_or_default(),
                "checks": checks,
            })
        })
        .collect();
    Value::Array(steps)
}

fn parse_mcps(mcps: Option<&XmlNode>) -> Value {
    let Some(mcps) = mcps else {
        return Value::Array(Vec::new());
    };
    let entries: Vec<Value> = mcps
        .children_named("mcp")
        .map(|n| {
            json!({
                "name": n.attr("name").unwrap_or_default(),
                "required": n.attr("required").map(|r| r == "true").unwrap_or(false),
                "tools": n.attr("tools").unwrap_or_default(),
                "refresh": n.attr("refresh").map(|r| r == "true").unwrap_or(false),
            })
        })
        .collect();
    Value::Array(entries)
}

/// Attach special-character fix hints to a parse error.
///
/// Bare ampersands and stray angle brackets are the overwhelmingly common
/// authoring mistakes; the enriched message suggests the entity form.
fn enrich_parse_error(xml: &str, err: KiwiError) -> KiwiError {
    let hints = special_char_hints(xml);
    if hints.is_empty() {
        return err;
    }
    KiwiError::parse(format!("{err}; possible fixes: {}", hints.join("; ")))
}

fn special_char_hints(xml: &str) -> Vec<String> {
    let mut hints = Vec::new();
    let entities = ["amp;", "lt;", "gt;", "quot;", "apos;"];
    for (i, _) in xml.match_indices('&') {
        let rest = &xml[i + 1..];
        if !entities.iter().any(|e| rest.starts_with(e)) && !rest.starts_with('#') {
            let (line, col) = xml::line_col(xml, i);
            hints.push(format!(
                "bare '&' at line {line}, column {col}: use '&amp;'"
            ));
            break;
        }
    }
    hints
}
