//! Uniform response envelope.
//!
//! Every public store/exec operation reports through this envelope:
//! `{status: ok|error, error?, details?, hint?, solution?, ...}`. Extra
//! payload fields flatten into the top level so callers see one flat object.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::integrity::short_hash;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Error,
}

/// The uniform result envelope.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub details: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub solution: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Envelope {
    pub fn ok() -> Self {
        Self {
            status: Status::Ok,
            error: None,
            details: Vec::new(),
            hint: None,
            solution: None,
            extra: Map::new(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            error: Some(message.into()),
            details: Vec::new(),
            hint: None,
            solution: None,
            extra: Map::new(),
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.details.push(detail.into());
        self
    }

    pub fn with_details(mut self, details: impl IntoIterator<Item = String>) -> Self {
        self.details.extend(details);
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_solution(mut self, solution: Value) -> Self {
        self.solution = Some(solution);
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }

    // Taxonomy constructors. Each pairs the error with its standard
    // remediation so callers get actionable responses for free.

    pub fn not_found(kind: &str, id: &str) -> Self {
        Self::error(format!("{kind} '{id}' not found"))
            .with_hint(format!("use 'kiwi load {kind} {id}' or create the file first"))
    }

    pub fn parse_error(message: impl Into<String>, details: Vec<String>) -> Self {
        Self::error(message.into()).with_details(details)
    }

    pub fn validation_failed(issues: Vec<String>) -> Self {
        Self::error("validation failed").with_details(issues)
    }

    pub fn signature_missing(kind: &str, id: &str) -> Self {
        Self::error(format!("{kind} '{id}' has no signature"))
            .with_hint("artifact must be validated and signed before this operation")
            .with_solution(serde_json::json!({
                "command": format!("kiwi sign {kind} {id}"),
            }))
    }

    pub fn integrity_mismatch(stored: &str, computed: &str) -> Self {
        Self::error("content has been modified since last validation")
            .with_detail(format!(
                "stored hash {}.. does not match computed {}..",
                short_hash(stored),
                short_hash(computed)
            ))
            .with_solution(serde_json::json!({
                "command": "kiwi sign <kind> <id>",
                "note": "re-sign to accept the current content",
            }))
    }

    pub fn chain_error(message: impl Into<String>) -> Self {
        Self::error(message.into())
    }

    pub fn config_validation(issues: Vec<String>) -> Self {
        Self::error("runtime parameters violate the tool's schema").with_details(issues)
    }

    pub fn primitive_execution(message: impl Into<String>) -> Self {
        Self::error(message.into())
    }
}
