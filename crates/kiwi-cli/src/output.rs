use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use serde_json::Value;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

static JSON_MODE: AtomicBool = AtomicBool::new(false);

pub fn init(json: bool) {
    JSON_MODE.store(json, Ordering::Relaxed);
}

pub fn is_json() -> bool {
    JSON_MODE.load(Ordering::Relaxed)
}

/// Print a serializable result. The two formats are mutually exclusive:
/// `--json` pretty-prints the value; otherwise envelopes render as a colored
/// status block. Values without a `status` field fall back to pretty JSON.
pub fn print<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_value(value)?;
    if is_json() {
        println!("{}", serde_json::to_string_pretty(&json)?);
        return Ok(());
    }

    let Some(status) = json.get("status").and_then(Value::as_str) else {
        println!("{}", serde_json::to_string_pretty(&json)?);
        return Ok(());
    };

    let mut out = StandardStream::stdout(ColorChoice::Auto);
    let color = if status == "ok" {
        Color::Green
    } else {
        Color::Red
    };
    out.set_color(ColorSpec::new().set_fg(Some(color)).set_bold(true))?;
    write!(out, "{status}")?;
    out.reset()?;
    if let Some(error) = json.get("error").and_then(Value::as_str) {
        write!(out, ": {error}")?;
    }
    writeln!(out)?;

    if let Some(details) = json.get("details").and_then(Value::as_array) {
        for detail in details {
            writeln!(out, "  - {}", detail.as_str().unwrap_or_default())?;
        }
    }
    if let Some(hint) = json.get("hint").and_then(Value::as_str) {
        writeln!(out, "  hint: {hint}")?;
    }
    if let Some(solution) = json.get("solution") {
        writeln!(out, "  solution: {}", compact(solution))?;
    }

    // Remaining payload fields, one per line, so human mode stays useful
    // without dumping the whole document.
    if let Some(obj) = json.as_object() {
        for (key, value) in obj {
            if matches!(key.as_str(), "status" | "error" | "details" | "hint" | "solution") {
                continue;
            }
            writeln!(out, "  {key}: {}", compact(value))?;
        }
    }
    Ok(())
}

fn compact(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}
