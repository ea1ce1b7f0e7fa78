//! Structural validators.
//!
//! A validator answers `validate(path, parsed)` with a report of issues and
//! warnings. Validation is definition-time only: it checks that an artifact
//! file is well-formed and internally consistent. Runtime parameter checking
//! against a tool's JSON Schema happens in the executor layer.

use std::path::Path;

use serde::Serialize;
use serde_json::Value;

use crate::artifact::ArtifactKind;
use crate::errors::{KiwiError, KiwiResult};

pub mod directive;
pub mod knowledge;
pub mod tool;

/// Result of structural validation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub issues: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn ok() -> Self {
        Self {
            valid: true,
            issues: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn merge(&mut self, other: ValidationReport) {
        self.issues.extend(other.issues);
        self.warnings.extend(other.warnings);
        self.valid = self.issues.is_empty();
    }

    pub fn push_issue(&mut self, issue: impl Into<String>) {
        self.issues.push(issue.into());
        self.valid = false;
    }

    pub fn push_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    fn finish(mut self) -> Self {
        self.valid = self.issues.is_empty();
        self
    }
}

/// Unified validation entry point.
pub struct ValidationManager;

impl ValidationManager {
    /// Validate a parsed artifact against its file path.
    pub fn validate(
        kind: ArtifactKind,
        path: &Path,
        parsed: &Value,
    ) -> KiwiResult<ValidationReport> {
        let mut report = ValidationReport::ok();
        match kind {
            ArtifactKind::Directive => {
                report.merge(directive::validate_filename(path, parsed));
                report.merge(directive::validate_metadata(parsed));
            }
            ArtifactKind::Tool => {
                report.merge(tool::validate_filename(path, parsed));
                report.merge(tool::validate_metadata(parsed));
            }
            ArtifactKind::Knowledge => {
                report.merge(knowledge::validate_filename(path, parsed));
                report.merge(knowledge::validate_metadata(parsed));
            }
        }
        Ok(report.finish())
    }

    /// Map tool subtypes ("primitive", "runtime", ...) onto the tool kind.
    pub fn kind_for(item_type: &str) -> KiwiResult<ArtifactKind> {
        match item_type {
            "directive" | "tool" | "knowledge" => ArtifactKind::parse(item_type),
            "primitive" | "runtime" | "script" | "api" | "mcp_server" | "mcp_tool" | "http" => {
                Ok(ArtifactKind::Tool)
            }
            other => Err(KiwiError::invalid_argument(format!(
                "unknown item type: {other}"
            ))),
        }
    }
}
