//! Signature strategies.
//!
//! Each artifact kind embeds a single signature line containing a timestamp
//! and the full integrity hash. Placement and comment syntax are
//! kind-specific:
//! - directives and knowledge entries: HTML comment on the first line
//! - Python and shell tools: `#` comment after the shebang (if present)
//! - YAML tools: `#` comment on the first line
//!
//! The strategy also extracts the canonical body: the byte slice that
//! participates in the integrity hash, with the signature (and for tools the
//! shebang) removed. The signature line is always excluded from its own hash,
//! so signing is idempotent modulo timestamp.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::artifact::{ArtifactKind, Signature};
use crate::errors::{KiwiError, KiwiResult};
use crate::parse::directive::extract_xml_block;

// Timestamps contain colons, so the timestamp group is non-greedy and the
// 64-char hash anchors the split.
static HTML_SIG_EXTRACT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^<!-- kiwi-mcp:validated:(.*?):([a-f0-9]{64}) -->").unwrap()
});
static HTML_SIG_REMOVE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^<!-- kiwi-mcp:validated:[^>]+-->\n").unwrap());
static HASH_SIG_EXTRACT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^# kiwi-mcp:validated:(.*?):([a-f0-9]{64})").unwrap());
static HASH_SIG_REMOVE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^# kiwi-mcp:validated:[^\n]+\n").unwrap());
static SHEBANG: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#!/[^\n]*\n").unwrap());

/// RFC-3339 UTC timestamp in the form `YYYY-MM-DDTHH:MM:SSZ`.
pub fn generate_timestamp() -> String {
    let now = time::OffsetDateTime::now_utc();
    let format = time::format_description::well_known::Rfc3339;
    // Rfc3339 emits fractional seconds only when non-zero; truncate to whole
    // seconds first so the signature format stays fixed-width.
    now.replace_nanosecond(0)
        .unwrap_or(now)
        .format(&format)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

/// Comment syntax used to embed a signature line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommentStyle {
    /// `<!-- ... -->` on the first line.
    Html,
    /// `# ...`, placed after the shebang when one is present.
    Hash { after_shebang: bool },
}

/// Per-kind signature operations. Constructed from the artifact kind plus,
/// for tools, the file extension.
#[derive(Debug, Clone, Copy)]
pub struct SignatureStrategy {
    kind: ArtifactKind,
    style: CommentStyle,
}

impl SignatureStrategy {
    /// Build the strategy for an artifact. `path` decides the comment syntax
    /// for tools; directives and knowledge entries ignore it.
    pub fn for_artifact(kind: ArtifactKind, path: Option<&Path>) -> Self {
        let style = match kind {
            ArtifactKind::Directive | ArtifactKind::Knowledge => CommentStyle::Html,
            ArtifactKind::Tool => {
                let ext = path
                    .and_then(|p| p.extension())
                    .and_then(|e| e.to_str())
                    .unwrap_or("py");
                match ext {
                    "yaml" | "yml" => CommentStyle::Hash {
                        after_shebang: false,
                    },
                    _ => CommentStyle::Hash { after_shebang: true },
                }
            }
        };
        Self { kind, style }
    }

    /// Extract the canonical body: the content that participates in the
    /// integrity hash.
    pub fn canonical_content(&self, file_content: &str) -> KiwiResult<String> {
        match self.kind {
            ArtifactKind::Directive => extract_xml_block(file_content)
                .map(|s| s.trim().to_string())
                .ok_or_else(|| KiwiError::parse("no XML directive found in content")),
            ArtifactKind::Tool => {
                let without_sig = self.remove_signature(file_content);
                Ok(SHEBANG.replace(&without_sig, "").into_owned())
            }
            ArtifactKind::Knowledge => {
                let without_sig = self.remove_signature(file_content);
                Ok(strip_frontmatter(&without_sig).trim().to_string())
            }
        }
    }

    /// Format a complete signature line (including trailing newline).
    pub fn format_signature(&self, timestamp: &str, hash: &str) -> String {
        match self.style {
            CommentStyle::Html => format!("<!-- kiwi-mcp:validated:{timestamp}:{hash} -->\n"),
            CommentStyle::Hash { .. } => format!("# kiwi-mcp:validated:{timestamp}:{hash}\n"),
        }
    }

    /// Extract the signature, if any.
    pub fn extract_signature(&self, file_content: &str) -> Option<Signature> {
        let (re, content) = match self.style {
            CommentStyle::Html => (&*HTML_SIG_EXTRACT, file_content),
            CommentStyle::Hash { after_shebang } => {
                let content = if after_shebang {
                    SHEBANG
                        .find(file_content)
                        .map(|m| &file_content[m.end()..])
                        .unwrap_or(file_content)
                } else {
                    file_content
                };
                (&*HASH_SIG_EXTRACT, content)
            }
        };
        re.captures(content).map(|caps| Signature {
            timestamp: caps[1].to_string(),
            hash: caps[2].to_string(),
        })
    }

    /// Insert a signature line, replacing any existing one. For tools with a
    /// shebang the signature lands on the line after it.
    pub fn insert_signature(&self, file_content: &str, signature_line: &str) -> String {
        let clean = self.remove_signature(file_content);
        match self.style {
            CommentStyle::Hash { after_shebang: true } => {
                if let Some(m) = SHEBANG.find(&clean) {
                    let (head, rest) = clean.split_at(m.end());
                    return format!("{head}{signature_line}{rest}");
                }
                format!("{signature_line}{clean}")
            }
            _ => format!("{signature_line}{clean}"),
        }
    }

    /// Remove the signature line if present; the rest of the content
    /// (including any shebang) is preserved byte-for-byte.
    pub fn remove_signature(&self, file_content: &str) -> String {
        match self.style {
            CommentStyle::Html => HTML_SIG_REMOVE.replace(file_content, "").into_owned(),
            CommentStyle::Hash { .. } => {
                if let Some(m) = SHEBANG.find(file_content) {
                    let (head, rest) = file_content.split_at(m.end());
                    let cleaned = HASH_SIG_REMOVE.replace(rest, "");
                    format!("{head}{cleaned}")
                } else {
                    HASH_SIG_REMOVE.replace(file_content, "").into_owned()
                }
            }
        }
    }
}

/// Drop YAML frontmatter (`---` delimited) from knowledge content.
fn strip_frontmatter(content: &str) -> &str {
    if !content.starts_with("---") {
        return content;
    }
    match content[3..].find("---") {
        Some(idx) => &content[3 + idx + 3..],
        None => content,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

    fn tool_strategy(name: &str) -> SignatureStrategy {
        SignatureStrategy::for_artifact(ArtifactKind::Tool, Some(Path::new(name)))
    }

    #[test]
    fn directive_signature_roundtrip() {
        let strat = SignatureStrategy::for_artifact(ArtifactKind::Directive, None);
        let content = "# Title\n\n```xml\n<directive name=\"x\" version=\"1.0.0\">\n</directive>\n```\n";
        let line = strat.format_signature("2026-01-01T00:00:00Z", HASH);
        let signed = strat.insert_signature(content, &line);

        assert!(signed.starts_with("<!-- kiwi-mcp:validated:"));
        let sig = strat.extract_signature(&signed).unwrap();
        assert_eq!(sig.hash, HASH);
        assert_eq!(sig.timestamp, "2026-01-01T00:00:00Z");
        assert_eq!(strat.remove_signature(&signed), content);
    }

    #[test]
    fn python_signature_goes_after_shebang() {
        let strat = tool_strategy("hello.py");
        let content = "#!/usr/bin/env python3\n__version__ = \"1.0.0\"\n";
        let line = strat.format_signature("2026-01-01T00:00:00Z", HASH);
        let signed = strat.insert_signature(content, &line);

        let mut lines = signed.lines();
        assert_eq!(lines.next().unwrap(), "#!/usr/bin/env python3");
        assert!(lines.next().unwrap().starts_with("# kiwi-mcp:validated:"));
        assert!(strat.extract_signature(&signed).is_some());
        assert_eq!(strat.remove_signature(&signed), content);
    }

    #[test]
    fn yaml_signature_first_line() {
        let strat = tool_strategy("fetch.yaml");
        let content = "tool_id: fetch\nversion: 1.0.0\n";
        let line = strat.format_signature("2026-01-01T00:00:00Z", HASH);
        let signed = strat.insert_signature(content, &line);
        assert!(signed.starts_with("# kiwi-mcp:validated:"));
        assert_eq!(strat.remove_signature(&signed), content);
    }

    #[test]
    fn resigning_replaces_not_appends() {
        let strat = tool_strategy("hello.py");
        let content = "__version__ = \"1.0.0\"\n";
        let line1 = strat.format_signature("2026-01-01T00:00:00Z", HASH);
        let line2 = strat.format_signature("2026-01-02T00:00:00Z", HASH);
        let signed = strat.insert_signature(&strat.insert_signature(content, &line1), &line2);
        assert_eq!(signed.matches("kiwi-mcp:validated").count(), 1);
        assert!(signed.contains("2026-01-02"));
    }

    #[test]
    fn canonical_content_excludes_signature_and_shebang() {
        let strat = tool_strategy("hello.py");
        let content = "#!/usr/bin/env python3\n__version__ = \"1.0.0\"\nprint(\"hi\")\n";
        let line = strat.format_signature("2026-01-01T00:00:00Z", HASH);
        let signed = strat.insert_signature(content, &line);

        let canonical = strat.canonical_content(&signed).unwrap();
        assert_eq!(canonical, "__version__ = \"1.0.0\"\nprint(\"hi\")\n");
        // Same canonical body with or without the signature present.
        assert_eq!(canonical, strat.canonical_content(content).unwrap());
    }

    #[test]
    fn knowledge_canonical_is_body_after_frontmatter() {
        let strat = SignatureStrategy::for_artifact(ArtifactKind::Knowledge, None);
        let content = "---\nid: note\ntitle: Note\n---\n\nThe body.\n";
        assert_eq!(strat.canonical_content(content).unwrap(), "The body.");
    }

    #[test]
    fn timestamp_shape() {
        let ts = generate_timestamp();
        assert_eq!(ts.len(), 20);
        assert!(ts.ends_with('Z'));
    }
}
