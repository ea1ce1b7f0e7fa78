//! Artifact model.
//!
//! The three artifact kinds are a closed set. Parsed metadata travels as
//! `serde_json::Value` maps with well-known keys (`name`, `version`,
//! `description`, ...) so that parsers, validators, and the integrity layer
//! share one shape without a per-kind struct zoo.

use serde::{Deserialize, Serialize};

use crate::errors::{KiwiError, KiwiResult};

/// The kind of an authored artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Directive,
    Tool,
    Knowledge,
}

impl ArtifactKind {
    pub fn parse(s: &str) -> KiwiResult<Self> {
        match s {
            "directive" => Ok(Self::Directive),
            "tool" => Ok(Self::Tool),
            "knowledge" => Ok(Self::Knowledge),
            _ => Err(KiwiError::invalid_argument(format!(
                "unknown artifact kind: {s}"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Directive => "directive",
            Self::Tool => "tool",
            Self::Knowledge => "knowledge",
        }
    }

    /// Directory name under a scope root (`.ai/<dir_name>/...`).
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::Directive => "directives",
            Self::Tool => "tools",
            Self::Knowledge => "knowledge",
        }
    }

    /// Allowed file extensions, in resolution order.
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Self::Directive | Self::Knowledge => &[".md"],
            Self::Tool => &[".py", ".yaml", ".yml", ".sh"],
        }
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an artifact lives. Project scope shadows user scope on resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Project,
    User,
}

impl Scope {
    pub fn parse(s: &str) -> KiwiResult<Self> {
        match s {
            "project" => Ok(Self::Project),
            "user" => Ok(Self::User),
            _ => Err(KiwiError::invalid_argument(format!("unknown scope: {s}"))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::User => "user",
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tool classification. Only `Primitive` may terminate an executor chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolType {
    Primitive,
    Runtime,
    Script,
    Api,
    McpServer,
    McpTool,
    Http,
}

impl ToolType {
    pub fn parse(s: &str) -> KiwiResult<Self> {
        match s {
            "primitive" => Ok(Self::Primitive),
            "runtime" => Ok(Self::Runtime),
            "script" => Ok(Self::Script),
            "api" => Ok(Self::Api),
            "mcp_server" => Ok(Self::McpServer),
            "mcp_tool" => Ok(Self::McpTool),
            "http" => Ok(Self::Http),
            _ => Err(KiwiError::invalid_argument(format!(
                "unknown tool type: {s}"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primitive => "primitive",
            Self::Runtime => "runtime",
            Self::Script => "script",
            Self::Api => "api",
            Self::McpServer => "mcp_server",
            Self::McpTool => "mcp_tool",
            Self::Http => "http",
        }
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self, Self::Primitive)
    }
}

impl std::fmt::Display for ToolType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A signature extracted from an artifact file.
///
/// The hash is the full 64-char SHA-256 integrity hash; the timestamp is
/// informational only and excluded from all hashing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub timestamp: String,
    pub hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn kind_roundtrip() {
        for s in ["directive", "tool", "knowledge"] {
            assert_eq!(ArtifactKind::parse(s).unwrap().as_str(), s);
        }
        assert_matches!(
            ArtifactKind::parse("widget"),
            Err(KiwiError::InvalidArgument(_))
        );
    }

    #[test]
    fn tool_extensions_order() {
        assert_eq!(
            ArtifactKind::Tool.extensions(),
            &[".py", ".yaml", ".yml", ".sh"]
        );
    }

    #[test]
    fn only_primitive_terminates() {
        assert!(ToolType::Primitive.is_primitive());
        assert!(!ToolType::Runtime.is_primitive());
    }
}
