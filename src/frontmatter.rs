//! Frontmatter parser
//!
//! Reads the `---` delimited header block at the top of agent and command
//! documents. This is deliberately not a YAML parser: it understands
//! `key: value` scalars and a single level of `key:` / `  subkey: value`
//! nesting, which is all extension metadata uses.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Number, Value};

/// Parsed header metadata
pub type Metadata = Map<String, Value>;

/// Whole document: optional blank first line, header, then everything after
/// the closing delimiter
static DOCUMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)\A(?:\r?\n)?---\r?\n(?:(.*?)\r?\n)?---(?:\r?\n|\z)(.*)\z").unwrap()
});

/// `key: value` or `key:` at column zero
static TOP_LEVEL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([\w.-]+):(.*)$").unwrap());

/// `  subkey: value`, indented by exactly two spaces
static NESTED: Lazy<Regex> = Lazy::new(|| Regex::new(r"^ {2}([\w.-]+):(.*)$").unwrap());

/// A parsed extension document
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExtensionDocument {
    /// Header key/value pairs
    pub metadata: Metadata,
    /// Text after the header (trimmed), or the raw input when there is no header
    pub body: String,
}

impl ExtensionDocument {
    /// Whether a header block was found and produced at least one key
    pub fn has_metadata(&self) -> bool {
        !self.metadata.is_empty()
    }
}

/// Split a document into header metadata and body.
///
/// Without a well-formed header the metadata is empty and the body is the
/// input verbatim, untrimmed.
pub fn parse(raw: &str) -> ExtensionDocument {
    let Some(caps) = DOCUMENT.captures(raw) else {
        return ExtensionDocument {
            metadata: Metadata::new(),
            body: raw.to_string(),
        };
    };

    let header = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
    let body = caps.get(2).map(|m| m.as_str()).unwrap_or_default();

    ExtensionDocument {
        metadata: parse_header(header),
        body: body.trim().to_string(),
    }
}

fn parse_header(header: &str) -> Metadata {
    let mut metadata = Metadata::new();
    // Key of the most recent `key:` line still collecting indented children
    let mut open: Option<String> = None;

    for line in header.lines() {
        if let Some(caps) = NESTED.captures(line) {
            if let Some(parent) = open.as_deref() {
                if let Some(Value::Object(children)) = metadata.get_mut(parent) {
                    children.insert(caps[1].to_string(), coerce(caps[2].trim()));
                }
            }
            continue;
        }

        if let Some(caps) = TOP_LEVEL.captures(line) {
            let key = caps[1].to_string();
            let value = caps[2].trim();
            if value.is_empty() {
                // Stays `{}` when no children follow
                metadata.insert(key.clone(), Value::Object(Map::new()));
                open = Some(key);
            } else {
                metadata.insert(key, coerce(value));
                open = None;
            }
        }
    }

    metadata
}

/// Coerce a scalar: booleans, then numbers, then quoted strings, then bare text
fn coerce(value: &str) -> Value {
    match value {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }

    if let Some(number) = parse_number(value) {
        return Value::Number(number);
    }

    if let Some(inner) = strip_quotes(value) {
        return Value::String(inner.to_string());
    }

    Value::String(value.to_string())
}

fn parse_number(value: &str) -> Option<Number> {
    if value.trim().is_empty() {
        return None;
    }
    if let Ok(int) = value.parse::<i64>() {
        return Some(Number::from(int));
    }
    let float = value.parse::<f64>().ok()?;
    if !float.is_finite() {
        return None;
    }
    Number::from_f64(float)
}

fn strip_quotes(value: &str) -> Option<&str> {
    let bytes = value.as_bytes();
    if bytes.len() < 2 {
        return None;
    }
    let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
    if first == last && (first == b'"' || first == b'\'') {
        Some(&value[1..value.len() - 1])
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_no_header_returns_input_untouched() {
        let raw = "  # Title\n\nSome text  \n";
        let doc = parse(raw);
        assert!(doc.metadata.is_empty());
        assert_eq!(doc.body, raw);
    }

    #[test]
    fn test_header_after_one_leading_newline() {
        let doc = parse("\n---\ndescription: hi\n---\nHello");
        assert_eq!(doc.metadata.get("description"), Some(&json!("hi")));
        assert_eq!(doc.body, "Hello");

        let doc = parse("\r\n---\r\nmode: primary\r\n---\r\nBody");
        assert_eq!(doc.metadata.get("mode"), Some(&json!("primary")));
        assert_eq!(doc.body, "Body");
    }

    #[test]
    fn test_header_after_two_newlines_is_ignored() {
        let raw = "\n\n---\nkey: value\n---\nbody";
        let doc = parse(raw);
        assert!(doc.metadata.is_empty());
        assert_eq!(doc.body, raw);
    }

    #[test]
    fn test_header_not_at_start_is_ignored() {
        let raw = "intro\n---\nkey: value\n---\nbody";
        let doc = parse(raw);
        assert!(doc.metadata.is_empty());
        assert_eq!(doc.body, raw);
    }

    #[test]
    fn test_unclosed_header_is_ignored() {
        let raw = "---\nkey: value\nno closing line";
        let doc = parse(raw);
        assert!(!doc.has_metadata());
        assert_eq!(doc.body, raw);
    }

    #[test]
    fn test_basic_header_and_trimmed_body() {
        let doc = parse("---\ndescription: hi\n---\n\n  Hello  \n\n");
        assert_eq!(doc.metadata.get("description"), Some(&json!("hi")));
        assert_eq!(doc.body, "Hello");
    }

    #[test]
    fn test_crlf_line_endings() {
        let doc = parse("---\r\nmode: subagent\r\n---\r\nBody text\r\n");
        assert_eq!(doc.metadata.get("mode"), Some(&json!("subagent")));
        assert_eq!(doc.body, "Body text");
    }

    #[test]
    fn test_empty_header_block() {
        let doc = parse("---\n---\nonly body");
        assert!(doc.metadata.is_empty());
        assert_eq!(doc.body, "only body");
    }

    #[test]
    fn test_closing_delimiter_at_end_of_input() {
        let doc = parse("---\nname: x\n---");
        assert_eq!(doc.metadata.get("name"), Some(&json!("x")));
        assert_eq!(doc.body, "");
    }

    #[test]
    fn test_scalar_coercion() {
        let doc = parse(
            "---\nenabled: true\ndisabled: false\ntemperature: 0.2\nsteps: 12\nquoted: \"true\"\nsingle: '42'\nplain:  some words  \n---\n",
        );
        let m = &doc.metadata;
        assert_eq!(m.get("enabled"), Some(&json!(true)));
        assert_eq!(m.get("disabled"), Some(&json!(false)));
        assert_eq!(m.get("temperature"), Some(&json!(0.2)));
        assert_eq!(m.get("steps"), Some(&json!(12)));
        assert_eq!(m.get("quoted"), Some(&json!("true")));
        assert_eq!(m.get("single"), Some(&json!("42")));
        assert_eq!(m.get("plain"), Some(&json!("some words")));
    }

    #[test]
    fn test_non_finite_numbers_stay_strings() {
        let doc = parse("---\na: inf\nb: NaN\n---\n");
        assert_eq!(doc.metadata.get("a"), Some(&json!("inf")));
        assert_eq!(doc.metadata.get("b"), Some(&json!("NaN")));
    }

    #[test]
    fn test_mismatched_quotes_are_kept() {
        let doc = parse("---\nvalue: \"half'\n---\n");
        assert_eq!(doc.metadata.get("value"), Some(&json!("\"half'")));
    }

    #[test]
    fn test_nested_mapping() {
        let doc = parse("---\ntools:\n  write: false\n  bash: true\n  limit: 3\nmodel: x\n---\nbody");
        assert_eq!(
            doc.metadata.get("tools"),
            Some(&json!({"write": false, "bash": true, "limit": 3}))
        );
        assert_eq!(doc.metadata.get("model"), Some(&json!("x")));
    }

    #[test]
    fn test_key_without_value_or_children_is_empty_map() {
        let doc = parse("---\npermission:\nmode: primary\n---\n");
        assert_eq!(doc.metadata.get("permission"), Some(&json!({})));
        assert_eq!(doc.metadata.get("mode"), Some(&json!("primary")));
    }

    #[test]
    fn test_indented_lines_after_scalar_are_ignored() {
        let doc = parse("---\nmode: primary\n  stray: 1\n---\n");
        assert_eq!(doc.metadata.len(), 1);
        assert_eq!(doc.metadata.get("mode"), Some(&json!("primary")));
    }

    #[test]
    fn test_deeper_indentation_and_lists_are_ignored() {
        let doc = parse("---\ntools:\n    deep: 1\n  - item\n# comment\n---\n");
        assert_eq!(doc.metadata.get("tools"), Some(&json!({})));
        assert_eq!(doc.metadata.len(), 1);
    }

    #[test]
    fn test_url_value_keeps_colons() {
        let doc = parse("---\nhomepage: https://example.com:8080/x\n---\n");
        assert_eq!(
            doc.metadata.get("homepage"),
            Some(&json!("https://example.com:8080/x"))
        );
    }
}
