//! Lenient XML parsing for directive bodies.
//!
//! Directive XML is authored by hand and routinely contains bare `<`, `>`,
//! and `&` inside action/verification text ("check x >= y", "a < b"). A
//! strict parser rejects those, so this module implements a small lenient
//! scanner with these rules:
//! - `<` opens a tag only when followed by `/`, `!`, or a name start char;
//!   otherwise it is literal text
//! - text runs until the next tag-opening `<`; `>` and `&` in text are legal
//! - the five named entities are decoded in text and attribute values
//! - CDATA sections are captured verbatim; the literal placeholder tokens
//!   `{CDATA_OPEN}` / `{CDATA_CLOSE}` inside a CDATA section expand to
//!   `<![CDATA[` / `]]>` after extraction, enabling nested-CDATA examples
//! - comments are skipped
//!
//! Errors carry a line:column location so validators can point at the
//! offending content.

use serde_json::{Map, Value};

use crate::errors::{KiwiError, KiwiResult};

/// A parsed XML element.
#[derive(Debug, Clone, PartialEq)]
pub struct XmlNode {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    fn new(tag: String) -> Self {
        Self {
            tag,
            attrs: Vec::new(),
            text: String::new(),
            children: Vec::new(),
        }
    }

    /// First attribute value by name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// First child element by tag.
    pub fn child(&self, tag: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.tag == tag)
    }

    /// All child elements by tag.
    pub fn children_named<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a XmlNode> {
        self.children.iter().filter(move |c| c.tag == tag)
    }

    /// Trimmed element text.
    pub fn text_trimmed(&self) -> &str {
        self.text.trim()
    }
}

/// Parse a lenient XML document and return the root element.
pub fn parse_lenient(input: &str) -> KiwiResult<XmlNode> {
    let bytes = input.as_bytes();
    let mut pos = 0usize;
    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root: Option<XmlNode> = None;

    while pos < bytes.len() {
        match next_angle(bytes, pos) {
            None => {
                append_text(&mut stack, &input[pos..]);
                break;
            }
            Some(lt) => {
                if lt > pos {
                    append_text(&mut stack, &input[pos..lt]);
                }
                pos = lt;

                if input[pos..].starts_with("<!--") {
                    pos = match input[pos..].find("-->") {
                        Some(rel) => pos + rel + 3,
                        None => {
                            return Err(err_at(input, pos, "unterminated comment"));
                        }
                    };
                } else if input[pos..].starts_with("<![CDATA[") {
                    let body_start = pos + 9;
                    let rel = input[body_start..]
                        .find("]]>")
                        .ok_or_else(|| err_at(input, pos, "unterminated CDATA section"))?;
                    let raw = &input[body_start..body_start + rel];
                    append_raw_text(&mut stack, &expand_cdata_placeholders(raw));
                    pos = body_start + rel + 3;
                } else if input[pos..].starts_with("</") {
                    let gt = input[pos..]
                        .find('>')
                        .ok_or_else(|| err_at(input, pos, "unterminated closing tag"))?;
                    let name = input[pos + 2..pos + gt].trim();
                    let node = stack
                        .pop()
                        .ok_or_else(|| err_at(input, pos, &format!("unexpected closing tag </{name}>")))?;
                    if node.tag != name {
                        return Err(err_at(
                            input,
                            pos,
                            &format!("mismatched closing tag: expected </{}>, got </{name}>", node.tag),
                        ));
                    }
                    attach(&mut stack, &mut root, node);
                    pos += gt + 1;
                } else if is_tag_start(bytes, pos) {
                    match parse_open_tag(input, pos)? {
                        Some((node, self_closing, end)) => {
                            if self_closing {
                                attach(&mut stack, &mut root, node);
                            } else {
                                stack.push(node);
                            }
                            pos = end;
                        }
                        None => {
                            // No closing '>' before the next '<': literal text.
                            append_text(&mut stack, "<");
                            pos += 1;
                        }
                    }
                } else {
                    // Bare '<' in text ("a < b").
                    append_text(&mut stack, "<");
                    pos += 1;
                }
            }
        }
    }

    if let Some(open) = stack.last() {
        return Err(KiwiError::parse(format!(
            "unclosed element <{}>",
            open.tag
        )));
    }
    root.ok_or_else(|| KiwiError::parse("no XML element found"))
}

/// Convert a node to the nested `_attrs` / `_text` JSON shape used by the
/// directive parser. Repeated child tags become arrays.
pub fn node_to_value(node: &XmlNode) -> Value {
    let mut map = Map::new();
    if !node.attrs.is_empty() {
        let mut attrs = Map::new();
        for (k, v) in &node.attrs {
            attrs.insert(k.clone(), Value::String(v.clone()));
        }
        map.insert("_attrs".to_string(), Value::Object(attrs));
    }
    let text = node.text.trim();
    if !text.is_empty() {
        map.insert("_text".to_string(), Value::String(text.to_string()));
    }
    for child in &node.children {
        let value = node_to_value(child);
        match map.entry(child.tag.clone()) {
            serde_json::map::Entry::Vacant(slot) => {
                slot.insert(value);
            }
            serde_json::map::Entry::Occupied(mut slot) => match slot.get_mut() {
                Value::Array(arr) => arr.push(value),
                existing => {
                    let prev = existing.take();
                    *existing = Value::Array(vec![prev, value]);
                }
            },
        }
    }
    Value::Object(map)
}

/// 1-based line and column of a byte offset.
pub fn line_col(input: &str, pos: usize) -> (usize, usize) {
    let prefix = &input[..pos.min(input.len())];
    let line = prefix.matches('\n').count() + 1;
    let col = prefix.rfind('\n').map(|i| pos - i).unwrap_or(pos + 1);
    (line, col)
}

fn err_at(input: &str, pos: usize, msg: &str) -> KiwiError {
    let (line, col) = line_col(input, pos);
    KiwiError::parse(format!("{msg} at line {line}, column {col}"))
}

fn next_angle(bytes: &[u8], from: usize) -> Option<usize> {
    bytes[from..].iter().position(|&b| b == b'<').map(|i| from + i)
}

fn is_tag_start(bytes: &[u8], lt: usize) -> bool {
    match bytes.get(lt + 1) {
        Some(&b) => b.is_ascii_alphabetic() || b == b'_',
        None => false,
    }
}

fn attach(stack: &mut Vec<XmlNode>, root: &mut Option<XmlNode>, node: XmlNode) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => {
            if root.is_none() {
                *root = Some(node);
            }
        }
    }
}

fn append_text(stack: &mut [XmlNode], text: &str) {
    if let Some(top) = stack.last_mut() {
        top.text.push_str(&unescape_entities(text));
    }
}

fn append_raw_text(stack: &mut [XmlNode], text: &str) {
    if let Some(top) = stack.last_mut() {
        top.text.push_str(text);
    }
}

fn expand_cdata_placeholders(raw: &str) -> String {
    raw.replace("{CDATA_OPEN}", "<![CDATA[")
        .replace("{CDATA_CLOSE}", "]]>")
}

/// Parse an opening tag at `pos`. Returns `(node, self_closing, end_offset)`,
/// or `None` when no `>` closes the tag before the next `<` (the `<` is then
/// literal text).
fn parse_open_tag(input: &str, pos: usize) -> KiwiResult<Option<(XmlNode, bool, usize)>> {
    let bytes = input.as_bytes();
    let mut i = pos + 1;

    // Tag name.
    let name_start = i;
    while i < bytes.len()
        && (bytes[i].is_ascii_alphanumeric() || matches!(bytes[i], b'_' | b'-' | b'.' | b':'))
    {
        i += 1;
    }
    let name = &input[name_start..i];

    let mut node = XmlNode::new(name.to_string());

    // Attributes until '>' or '/>'; quoted values may contain '>' freely.
    loop {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        match bytes.get(i) {
            None => return Ok(None),
            Some(b'>') => return Ok(Some((node, false, i + 1))),
            Some(b'/') if bytes.get(i + 1) == Some(&b'>') => {
                return Ok(Some((node, true, i + 2)));
            }
            Some(b'<') => return Ok(None),
            Some(_) => {
                let attr_start = i;
                while i < bytes.len()
                    && (bytes[i].is_ascii_alphanumeric()
                        || matches!(bytes[i], b'_' | b'-' | b'.' | b':'))
                {
                    i += 1;
                }
                if i == attr_start {
                    // Stray character inside a tag: not a tag after all.
                    return Ok(None);
                }
                let attr_name = input[attr_start..i].to_string();
                while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                    i += 1;
                }
                if bytes.get(i) == Some(&b'=') {
                    i += 1;
                    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                        i += 1;
                    }
                    match bytes.get(i) {
                        Some(&q) if q == b'"' || q == b'\'' => {
                            i += 1;
                            let val_start = i;
                            while i < bytes.len() && bytes[i] != q {
                                i += 1;
                            }
                            if i >= bytes.len() {
                                return Err(err_at(input, val_start, "unterminated attribute value"));
                            }
                            let value = unescape_entities(&input[val_start..i]);
                            node.attrs.push((attr_name, value));
                            i += 1;
                        }
                        _ => {
                            // Bare value until whitespace or tag end.
                            let val_start = i;
                            while i < bytes.len()
                                && !bytes[i].is_ascii_whitespace()
                                && bytes[i] != b'>'
                                && bytes[i] != b'/'
                            {
                                i += 1;
                            }
                            let value = unescape_entities(&input[val_start..i]);
                            node.attrs.push((attr_name, value));
                        }
                    }
                } else {
                    // Attribute without value.
                    node.attrs.push((attr_name, String::new()));
                }
            }
        }
    }
}

fn unescape_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_nesting_and_attrs() {
        let xml = r#"<directive name="demo" version="1.0.0"><metadata><description>d</description></metadata></directive>"#;
        let root = parse_lenient(xml).unwrap();
        assert_eq!(root.tag, "directive");
        assert_eq!(root.attr("name"), Some("demo"));
        assert_eq!(
            root.child("metadata").unwrap().child("description").unwrap().text_trimmed(),
            "d"
        );
    }

    #[test]
    fn bare_special_chars_in_text() {
        let xml = "<step><action>Check if version >= 1.0.0 and x < 10 &amp; y</action></step>";
        let root = parse_lenient(xml).unwrap();
        assert_eq!(
            root.child("action").unwrap().text_trimmed(),
            "Check if version >= 1.0.0 and x < 10 & y"
        );
    }

    #[test]
    fn cdata_preserved_with_placeholder_expansion() {
        let xml = "<action><![CDATA[example: {CDATA_OPEN}raw{CDATA_CLOSE} done]]></action>";
        let root = parse_lenient(xml).unwrap();
        assert_eq!(
            root.text_trimmed(),
            "example: <![CDATA[raw]]> done"
        );
    }

    #[test]
    fn comments_skipped() {
        let xml = "<a><!-- note --><b/></a>";
        let root = parse_lenient(xml).unwrap();
        assert_eq!(root.children.len(), 1);
        assert_eq!(root.children[0].tag, "b");
    }

    #[test]
    fn repeated_children_become_array() {
        let xml = "<process><step name=\"a\"/><step name=\"b\"/></process>";
        let root = parse_lenient(xml).unwrap();
        let v = node_to_value(&root);
        let steps = v["step"].as_array().unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0]["_attrs"]["name"], "a");
    }

    #[test]
    fn mismatched_close_reports_location() {
        let xml = "<a>\n  <b></c>\n</a>";
        let err = parse_lenient(xml).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("mismatched closing tag"));
        assert!(msg.contains("line 2"));
    }

    #[test]
    fn self_closing_with_attrs() {
        let xml = r#"<model tier="reasoning" fallback="general"/>"#;
        let root = parse_lenient(xml).unwrap();
        assert_eq!(root.attr("tier"), Some("reasoning"));
        assert_eq!(root.attr("fallback"), Some("general"));
    }
}
