//! Canonical JSON encoding for deterministic hashing.
//!
//! All integrity hashes are computed over the bytes produced here, never over
//! default `serde_json::to_vec` output (ordering and whitespace are not
//! guaranteed there). Rules:
//! - object keys emitted in lexical byte order
//! - compact separators, no whitespace
//! - strings NFC-normalized before escaping
//! - numbers rendered exactly as serde_json renders them
//!
//! Any change to these rules is a breaking change: artifacts signed under a
//! different canonical form will fail verification.

use serde_json::Value;
use unicode_normalization::UnicodeNormalization;

use crate::errors::{KiwiError, KiwiResult};

/// Encode a JSON value into its canonical byte form.
pub fn canonical_json_bytes(value: &Value) -> KiwiResult<Vec<u8>> {
    let mut out = String::new();
    write_value(value, &mut out)?;
    Ok(out.into_bytes())
}

/// Encode a JSON value into its canonical string form.
pub fn canonical_json_string(value: &Value) -> KiwiResult<String> {
    let mut out = String::new();
    write_value(value, &mut out)?;
    Ok(out)
}

fn write_value(value: &Value, out: &mut String) -> KiwiResult<()> {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => write_string(s, out)?,
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out)?;
            }
            out.push(']');
        }
        Value::Object(map) => {
            // serde_json map preserves insertion order; sort keys here.
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(key, out)?;
                out.push(':');
                write_value(&map[key], out)?;
            }
            out.push('}');
        }
    }
    Ok(())
}

fn write_string(s: &str, out: &mut String) -> KiwiResult<()> {
    let normalized: String = s.nfc().collect();
    let escaped = serde_json::to_string(&normalized)
        .map_err(|e| KiwiError::serialization(format!("failed to escape string: {e}")))?;
    out.push_str(&escaped);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keys_sorted_and_compact() {
        let v = json!({"b": 1, "a": {"z": true, "y": [1, 2]}});
        let s = canonical_json_string(&v).unwrap();
        assert_eq!(s, r#"{"a":{"y":[1,2],"z":true},"b":1}"#);
    }

    #[test]
    fn nfc_normalization_applied() {
        // U+0065 U+0301 (e + combining acute) normalizes to U+00E9.
        let decomposed = json!("e\u{0301}");
        let composed = json!("\u{00e9}");
        assert_eq!(
            canonical_json_bytes(&decomposed).unwrap(),
            canonical_json_bytes(&composed).unwrap()
        );
    }

    #[test]
    fn stable_across_calls() {
        let v = json!({"k": [null, false, "x"], "n": 3.5});
        assert_eq!(
            canonical_json_bytes(&v).unwrap(),
            canonical_json_bytes(&v).unwrap()
        );
    }

    #[test]
    fn newlines_preserved_in_strings() {
        let v = json!("line1\nline2\n");
        let s = canonical_json_string(&v).unwrap();
        assert_eq!(s, "\"line1\\nline2\\n\"");
    }
}
