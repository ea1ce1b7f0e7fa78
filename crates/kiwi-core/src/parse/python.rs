//! Python tool parsing.
//!
//! Tools declare their identity through module-level constants
//! (`__version__`, `__tool_type__`, `__executor_id__`, `__category__`) plus
//! an optional `CONFIG_SCHEMA` dict literal. The parser reads those with
//! line-anchored patterns, pulls the description from the module docstring's
//! first paragraph, derives third-party dependencies from imports, and
//! collects required environment variables from `os.getenv("NAME")` calls.

use std::collections::BTreeSet;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Map, Value};

use crate::errors::{KiwiError, KiwiResult};

static STR_CONST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^(__version__|__tool_type__|__category__)\s*=\s*["']([^"']*)["']"#).unwrap()
});
static EXECUTOR_CONST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^__executor_id__\s*=\s*(None|"[^"]*"|'[^']*')"#).unwrap()
});
static CONFIG_SCHEMA_START: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^CONFIG_SCHEMA\s*=\s*\{").unwrap());
static DOCSTRING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)^\s*(?:"""(.*?)"""|'''(.*?)''')"#).unwrap()
});
static IMPORT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^(?:import\s+([\w.]+)|from\s+([\w.]+)\s+import)").unwrap());
static GETENV: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"os\.getenv\(\s*["']([A-Za-z_][A-Za-z0-9_]*)["']"#).unwrap()
});

/// Python standard-library top-level modules that never map to packages.
const STDLIB_MODULES: &[&str] = &[
    "os", "sys", "json", "time", "datetime", "pathlib", "typing", "argparse", "logging",
    "collections", "itertools", "functools", "contextlib", "io", "shlex", "subprocess",
    "importlib", "hashlib", "re", "math", "random", "string", "urllib", "http", "email",
    "concurrent", "threading", "multiprocessing", "asyncio", "queue", "abc", "dataclasses",
    "enum", "tempfile", "shutil", "textwrap", "unittest", "uuid", "base64", "csv",
];

/// Internal modules shipped alongside tools, not pip packages.
const INTERNAL_MODULES: &[&str] = &["lib"];

/// Import-name to package-name mapping for the common mismatches.
const MODULE_TO_PACKAGE: &[(&str, &str)] = &[
    ("git", "GitPython"),
    ("bs4", "beautifulsoup4"),
    ("yaml", "PyYAML"),
    ("dotenv", "python-dotenv"),
    ("sklearn", "scikit-learn"),
    ("cv2", "opencv-python"),
    ("PIL", "Pillow"),
    ("googleapiclient", "google-api-python-client"),
    ("google_auth_oauthlib", "google-auth-oauthlib"),
];

fn package_for(module: &str) -> String {
    MODULE_TO_PACKAGE
        .iter()
        .find(|(m, _)| *m == module)
        .map(|(_, p)| (*p).to_string())
        .unwrap_or_else(|| module.to_string())
}

/// Parse a Python tool from content. `file_name` supplies the id (the stem).
pub fn parse_python_tool_str(file_content: &str, file_name: &str) -> KiwiResult<Value> {
    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name);

    let mut out = Map::new();
    out.insert("name".to_string(), Value::String(stem.to_string()));
    out.insert("tool_id".to_string(), Value::String(stem.to_string()));
    out.insert("version".to_string(), Value::Null);
    out.insert("tool_type".to_string(), Value::Null);
    out.insert("executor_id".to_string(), Value::Null);
    out.insert("category".to_string(), Value::Null);
    out.insert("config_schema".to_string(), Value::Null);

    // Strip signature/shebang so line anchors see the real first lines.
    let content = strip_leading_comment_lines(file_content);

    for caps in STR_CONST.captures_iter(content) {
        let key = match &caps[1] {
            "__version__" => "version",
            "__tool_type__" => "tool_type",
            "__category__" => "category",
            _ => continue,
        };
        out.insert(key.to_string(), Value::String(caps[2].to_string()));
    }

    if let Some(caps) = EXECUTOR_CONST.captures(content) {
        let raw = &caps[1];
        let value = if raw == "None" {
            Value::Null
        } else {
            Value::String(raw[1..raw.len() - 1].to_string())
        };
        out.insert("executor_id".to_string(), value);
    }

    if let Some(m) = CONFIG_SCHEMA_START.find(content) {
        let brace_start = m.end() - 1;
        let literal = balanced_braces(&content[brace_start..])
            .ok_or_else(|| KiwiError::parse("unterminated CONFIG_SCHEMA literal"))?;
        let schema = python_literal_to_json(literal)?;
        out.insert("config_schema".to_string(), schema);
    }

    out.insert(
        "description".to_string(),
        Value::String(extract_description(content)),
    );

    let mut imports: BTreeSet<String> = BTreeSet::new();
    for caps in IMPORT.captures_iter(content) {
        let module = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str())
            .unwrap_or_default();
        if let Some(top) = module.split('.').next() {
            if !top.is_empty() {
                imports.insert(top.to_string());
            }
        }
    }
    let deps: Vec<Value> = imports
        .iter()
        .filter(|m| !STDLIB_MODULES.contains(&m.as_str()))
        .filter(|m| !INTERNAL_MODULES.contains(&m.as_str()))
        .map(|m| json!({"name": package_for(m), "version": Value::Null}))
        .collect();
    out.insert("dependencies".to_string(), Value::Array(deps));

    let mut env_vars: BTreeSet<String> = BTreeSet::new();
    for caps in GETENV.captures_iter(content) {
        env_vars.insert(caps[1].to_string());
    }
    out.insert(
        "required_env_vars".to_string(),
        Value::Array(env_vars.into_iter().map(Value::String).collect()),
    );

    Ok(Value::Object(out))
}

/// Parse a Python tool file from disk.
pub fn parse_python_tool_file(path: &Path) -> KiwiResult<Value> {
    let content = std::fs::read_to_string(path)?;
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .ok_or_else(|| KiwiError::invalid_argument("tool path has no file name"))?;
    parse_python_tool_str(&content, name)
}

/// Skip a shebang and/or signature comment at the top of the file.
fn strip_leading_comment_lines(content: &str) -> &str {
    let mut rest = content;
    for _ in 0..2 {
        if rest.starts_with("#!") || rest.starts_with("# kiwi-mcp:validated:") {
            match rest.find('\n') {
                Some(i) => rest = &rest[i + 1..],
                None => return "",
            }
        }
    }
    rest
}

/// First paragraph of the module docstring, stopping at section headers.
fn extract_description(content: &str) -> String {
    let Some(caps) = DOCSTRING.captures(content) else {
        return String::new();
    };
    let doc = caps
        .get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str())
        .unwrap_or_default();
    let mut lines = Vec::new();
    for line in doc.trim().lines() {
        let line = line.trim();
        if line.is_empty()
            || line.starts_with("Usage:")
            || line.starts_with("Args:")
            || line.starts_with("Dependencies:")
        {
            break;
        }
        lines.push(line);
    }
    lines.join(" ")
}

/// Return the balanced `{...}` slice starting at the first byte, respecting
/// string literals.
fn balanced_braces(s: &str) -> Option<&str> {
    let bytes = s.as_bytes();
    debug_assert_eq!(bytes.first(), Some(&b'{'));
    let mut depth = 0usize;
    let mut i = 0usize;
    while i < bytes.len() {
        match bytes[i] {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[..=i]);
                }
            }
            b'"' | b'\'' => {
                let quote = bytes[i];
                i += 1;
                while i < bytes.len() && bytes[i] != quote {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
            }
            b'#' => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Convert a Python literal (dict/list/str/number/bool/None) into JSON.
///
/// Supports the subset that appears in `CONFIG_SCHEMA` declarations:
/// single- and double-quoted strings, nested dicts and lists, trailing
/// commas, `True`/`False`/`None`, ints and floats.
pub fn python_literal_to_json(literal: &str) -> KiwiResult<Value> {
    let mut p = PyLiteralParser {
        bytes: literal.as_bytes(),
        src: literal,
        pos: 0,
    };
    let value = p.parse_value()?;
    p.skip_ws();
    if p.pos != p.bytes.len() {
        return Err(KiwiError::parse(format!(
            "trailing content in Python literal at byte {}",
            p.pos
        )));
    }
    Ok(value)
}

struct PyLiteralParser<'a> {
    bytes: &'a [u8],
    src: &'a str,
    pos: usize,
}

impl<'a> PyLiteralParser<'a> {
    fn skip_ws(&mut self) {
        while self.pos < self.bytes.len() {
            match self.bytes[self.pos] {
                b' ' | b'\t' | b'\n' | b'\r' => self.pos += 1,
                b'#' => {
                    while self.pos < self.bytes.len() && self.bytes[self.pos] != b'\n' {
                        self.pos += 1;
                    }
                }
                _ => break,
            }
        }
    }

    fn err(&self, msg: &str) -> KiwiError {
        KiwiError::parse(format!("{msg} at byte {} of Python literal", self.pos))
    }

    fn parse_value(&mut self) -> KiwiResult<Value> {
        self.skip_ws();
        match self.bytes.get(self.pos) {
            Some(b'{') => self.parse_dict(),
            Some(b'[') => self.parse_list(),
            Some(b'"') | Some(b'\'') => Ok(Value::String(self.parse_string()?)),
            Some(c) if c.is_ascii_digit() || *c == b'-' => self.parse_number(),
            Some(_) => self.parse_keyword(),
            None => Err(self.err("unexpected end of literal")),
        }
    }

    fn parse_dict(&mut self) -> KiwiResult<Value> {
        self.pos += 1; // '{'
        let mut map = Map::new();
        loop {
            self.skip_ws();
            match self.bytes.get(self.pos) {
                Some(b'}') => {
                    self.pos += 1;
                    return Ok(Value::Object(map));
                }
                Some(_) => {
                    let key = match self.bytes[self.pos] {
                        b'"' | b'\'' => self.parse_string()?,
                        _ => return Err(self.err("expected string key")),
                    };
                    self.skip_ws();
                    if self.bytes.get(self.pos) != Some(&b':') {
                        return Err(self.err("expected ':' after key"));
                    }
                    self.pos += 1;
                    let value = self.parse_value()?;
                    map.insert(key, value);
                    self.skip_ws();
                    if self.bytes.get(self.pos) == Some(&b',') {
                        self.pos += 1;
                    }
                }
                None => return Err(self.err("unterminated dict")),
            }
        }
    }

    fn parse_list(&mut self) -> KiwiResult<Value> {
        self.pos += 1; // '['
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            match self.bytes.get(self.pos) {
                Some(b']') => {
                    self.pos += 1;
                    return Ok(Value::Array(items));
                }
                Some(_) => {
                    items.push(self.parse_value()?);
                    self.skip_ws();
                    if self.bytes.get(self.pos) == Some(&b',') {
                        self.pos += 1;
                    }
                }
                None => return Err(self.err("unterminated list")),
            }
        }
    }

    fn parse_string(&mut self) -> KiwiResult<String> {
        let quote = self.bytes[self.pos];
        self.pos += 1;
        let mut out = String::new();
        while self.pos < self.bytes.len() {
            let b = self.bytes[self.pos];
            if b == quote {
                self.pos += 1;
                return Ok(out);
            }
            if b == b'\\' {
                self.pos += 1;
                match self.bytes.get(self.pos) {
                    Some(b'n') => out.push('\n'),
                    Some(b't') => out.push('\t'),
                    Some(b'\\') => out.push('\\'),
                    Some(&c) if c == quote => out.push(c as char),
                    Some(&c) => {
                        out.push('\\');
                        out.push(c as char);
                    }
                    None => return Err(self.err("dangling escape")),
                }
                self.pos += 1;
            } else {
                // Consume one UTF-8 character.
                let ch_len = utf8_len(b);
                out.push_str(&self.src[self.pos..self.pos + ch_len]);
                self.pos += ch_len;
            }
        }
        Err(self.err("unterminated string"))
    }

    fn parse_number(&mut self) -> KiwiResult<Value> {
        let start = self.pos;
        if self.bytes[self.pos] == b'-' {
            self.pos += 1;
        }
        let mut is_float = false;
        while self.pos < self.bytes.len() {
            match self.bytes[self.pos] {
                b'0'..=b'9' => self.pos += 1,
                b'.' | b'e' | b'E' | b'+' | b'-' if self.pos > start => {
                    is_float = true;
                    self.pos += 1;
                }
                _ => break,
            }
        }
        let text = &self.src[start..self.pos];
        if is_float {
            let f: f64 = text.parse().map_err(|_| self.err("invalid float"))?;
            serde_json::Number::from_f64(f)
                .map(Value::Number)
                .ok_or_else(|| self.err("non-finite float"))
        } else {
            let n: i64 = text.parse().map_err(|_| self.err("invalid integer"))?;
            Ok(Value::Number(n.into()))
        }
    }

    fn parse_keyword(&mut self) -> KiwiResult<Value> {
        for (kw, value) in [
            ("True", Value::Bool(true)),
            ("False", Value::Bool(false)),
            ("None", Value::Null),
        ] {
            if self.src[self.pos..].starts_with(kw) {
                self.pos += kw.len();
                return Ok(value);
            }
        }
        Err(self.err("unexpected token"))
    }
}

fn utf8_len(first: u8) -> usize {
    match first {
        0x00..=0x7f => 1,
        0xc0..=0xdf => 2,
        0xe0..=0xef => 3,
        _ => 4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"#!/usr/bin/env python3
"""Enrich emails with company data.

Fetches company metadata for each address.

Usage: enrich_emails.py <file>
"""

import os
import json
import httpx
from bs4 import BeautifulSoup

__version__ = "2.1.0"
__tool_type__ = "script"
__executor_id__ = "python_runtime"
__category__ = "enrichment"

CONFIG_SCHEMA = {
    "type": "object",
    "properties": {
        "batch_size": {"type": "integer", "default": 50},
        "strict": {"type": "boolean", "default": True},
    },
    "required": ["batch_size"],
}

API_KEY = os.getenv("ENRICH_API_KEY")
BASE_URL = os.getenv("ENRICH_BASE_URL")
"#;

    #[test]
    fn extracts_module_constants() {
        let v = parse_python_tool_str(SAMPLE, "enrich_emails.py").unwrap();
        assert_eq!(v["name"], "enrich_emails");
        assert_eq!(v["version"], "2.1.0");
        assert_eq!(v["tool_type"], "script");
        assert_eq!(v["executor_id"], "python_runtime");
        assert_eq!(v["category"], "enrichment");
    }

    #[test]
    fn executor_none_is_null() {
        let content = "__version__ = \"1.0.0\"\n__tool_type__ = \"primitive\"\n__executor_id__ = None\n";
        let v = parse_python_tool_str(content, "subprocess.py").unwrap();
        assert_eq!(v["executor_id"], Value::Null);
    }

    #[test]
    fn description_is_first_paragraph() {
        let v = parse_python_tool_str(SAMPLE, "enrich_emails.py").unwrap();
        assert_eq!(v["description"], "Enrich emails with company data.");
    }

    #[test]
    fn dependencies_mapped_and_filtered() {
        let v = parse_python_tool_str(SAMPLE, "enrich_emails.py").unwrap();
        let names: Vec<&str> = v["dependencies"]
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d["name"].as_str().unwrap())
            .collect();
        assert!(names.contains(&"httpx"));
        assert!(names.contains(&"beautifulsoup4"));
        assert!(!names.contains(&"os"));
        assert!(!names.contains(&"json"));
    }

    #[test]
    fn env_vars_sorted() {
        let v = parse_python_tool_str(SAMPLE, "enrich_emails.py").unwrap();
        assert_eq!(
            v["required_env_vars"],
            serde_json::json!(["ENRICH_API_KEY", "ENRICH_BASE_URL"])
        );
    }

    #[test]
    fn config_schema_converted_to_json() {
        let v = parse_python_tool_str(SAMPLE, "enrich_emails.py").unwrap();
        let schema = &v["config_schema"];
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["batch_size"]["default"], 50);
        assert_eq!(schema["properties"]["strict"]["default"], true);
        assert_eq!(schema["required"][0], "batch_size");
    }

    #[test]
    fn python_literal_subset() {
        let v = python_literal_to_json("{'a': [1, 2.5, None], 'b': {'c': False,},}").unwrap();
        assert_eq!(v["a"][0], 1);
        assert_eq!(v["a"][2], Value::Null);
        assert_eq!(v["b"]["c"], false);
    }

    #[test]
    fn signature_line_does_not_confuse_anchors() {
        let signed = format!(
            "# kiwi-mcp:validated:2026-01-01T00:00:00Z:{}\n{}",
            "a".repeat(64),
            "__version__ = \"1.0.0\"\n"
        );
        let v = parse_python_tool_str(&signed, "t.py").unwrap();
        assert_eq!(v["version"], "1.0.0");
    }
}
