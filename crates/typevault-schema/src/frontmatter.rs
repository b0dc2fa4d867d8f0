//! Restricted property-block (front matter) parser and serializer.
//!
//! A property block is the `---`-delimited key/value preamble of a document.
//! This is **not** general YAML: the grammar is restricted to what the
//! corpus actually uses, so that `serialize` can be a left inverse of
//! `parse` over every value the grammar can produce:
//!
//! - `key: scalar`
//! - `key:` followed by indented `- item` lines (array)
//! - `key: []` (empty array)
//!
//! Scalars: booleans, `null`/`~`, integers/decimals, quoted strings (one
//! layer stripped), inline lists (`[a, b]`), wikilink tokens (`[[Name]]`,
//! preserved verbatim as strings even when quoted), and bare strings.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Delimiter line that opens and closes a property block.
pub const DELIMITER: &str = "---";

/// Keys serialized first, in this order, when present. All remaining keys
/// follow lexicographically.
pub const PREFERRED_KEY_ORDER: &[&str] = &["type", "status", "date", "parent", "tags", "aliases"];

/// A single scalar value in a property block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
}

impl Scalar {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Render without any quoting decisions (the value as a user would
    /// type it). Used for coercions, not for serialization.
    pub fn to_display_string(&self) -> String {
        match self {
            Scalar::Null => "null".to_string(),
            Scalar::Bool(b) => b.to_string(),
            Scalar::Num(n) => render_number(*n),
            Scalar::Str(s) => s.clone(),
        }
    }
}

/// A property value: a scalar or a flat array of scalars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Scalar(Scalar),
    List(Vec<Scalar>),
}

impl Value {
    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Value::Scalar(s) => Some(s),
            Value::List(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_scalar().and_then(Scalar::as_str)
    }

    /// True for the "explicitly empty" shapes: null, blank string, empty list.
    pub fn is_blank(&self) -> bool {
        match self {
            Value::Scalar(Scalar::Null) => true,
            Value::Scalar(Scalar::Str(s)) => s.trim().is_empty(),
            Value::Scalar(_) => false,
            Value::List(items) => items.is_empty(),
        }
    }
}

/// Result of parsing a document's text.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDocument {
    pub has_block: bool,
    pub properties: BTreeMap<String, Value>,
    pub body: String,
}

/// True if `s` is a single document-reference token (`[[...]]`).
pub fn is_wikilink(s: &str) -> bool {
    if s.len() < 4 || !s.starts_with("[[") || !s.ends_with("]]") {
        return false;
    }
    // An inline list of links also starts `[[` and ends `]]`; a single
    // token closes only once.
    !s[2..s.len() - 2].contains("]]")
}

/// The title a wikilink points at: inner text up to an alias (`|`) or
/// heading (`#`) marker, trimmed. Returns `None` for non-wikilinks.
pub fn wikilink_target(s: &str) -> Option<&str> {
    if !is_wikilink(s) {
        return None;
    }
    let inner = &s[2..s.len() - 2];
    let inner = inner.split(['|', '#']).next().unwrap_or(inner);
    Some(inner.trim())
}

/// Wrap a plain title in wikilink syntax.
pub fn to_wikilink(title: &str) -> String {
    format!("[[{title}]]")
}

fn is_numeric_literal(s: &str) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s);
    if digits.is_empty() {
        return false;
    }
    match digits.split_once('.') {
        None => digits.bytes().all(|b| b.is_ascii_digit()),
        Some((int, frac)) => {
            !int.is_empty()
                && !frac.is_empty()
                && int.bytes().all(|b| b.is_ascii_digit())
                && frac.bytes().all(|b| b.is_ascii_digit())
        }
    }
}

/// Parse one scalar token.
pub fn parse_scalar(raw: &str) -> Scalar {
    let s = raw.trim();
    if s.is_empty() {
        return Scalar::Str(String::new());
    }
    if is_wikilink(s) {
        return Scalar::Str(s.to_string());
    }
    if s.len() >= 2 {
        if let Some(inner) = s.strip_prefix('"').and_then(|r| r.strip_suffix('"')) {
            return Scalar::Str(inner.replace("\\\"", "\""));
        }
        if let Some(inner) = s.strip_prefix('\'').and_then(|r| r.strip_suffix('\'')) {
            return Scalar::Str(inner.to_string());
        }
    }
    match s {
        "true" => return Scalar::Bool(true),
        "false" => return Scalar::Bool(false),
        "null" | "~" => return Scalar::Null,
        _ => {}
    }
    if is_numeric_literal(s) {
        if let Ok(n) = s.parse::<f64>() {
            return Scalar::Num(n);
        }
    }
    Scalar::Str(s.to_string())
}

/// Split the inner text of an inline list at top-level commas. Wikilinks
/// and quoted segments are atomic.
fn split_inline_items(inner: &str) -> Vec<&str> {
    let mut items = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0usize;
    let bytes = inner.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        let c = b as char;
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                '"' | '\'' => quote = Some(c),
                '[' => depth += 1,
                ']' => depth = depth.saturating_sub(1),
                ',' if depth == 0 => {
                    items.push(&inner[start..i]);
                    start = i + 1;
                }
                _ => {}
            },
        }
    }
    items.push(&inner[start..]);
    items
}

/// Parse a value-position token: an inline list or a scalar.
pub fn parse_value(raw: &str) -> Value {
    let s = raw.trim();
    if s == "[]" {
        return Value::List(Vec::new());
    }
    if s.starts_with('[') && s.ends_with(']') && !is_wikilink(s) {
        let inner = &s[1..s.len() - 1];
        if inner.trim().is_empty() {
            return Value::List(Vec::new());
        }
        return Value::List(split_inline_items(inner).iter().map(|i| parse_scalar(i)).collect());
    }
    Value::Scalar(parse_scalar(s))
}

/// Parse a sequence of `key: value` / array-item lines into a property map.
///
/// This is the shared line grammar for the inside of a property block and
/// for restricted-YAML schema code blocks.
pub fn parse_block_lines(lines: &[&str]) -> BTreeMap<String, Value> {
    let mut properties = BTreeMap::new();
    let mut i = 0;
    while i < lines.len() {
        let line = lines[i].trim_end();
        i += 1;
        if line.trim().is_empty() || line.starts_with(char::is_whitespace) {
            continue;
        }
        let Some((key, rest)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let rest = rest.trim();
        if !rest.is_empty() {
            properties.insert(key.to_string(), parse_value(rest));
            continue;
        }
        // `key:` with nothing after it: either an array header or an
        // empty-string value, decided by what follows.
        let mut items = Vec::new();
        while i < lines.len() {
            let item_line = lines[i].trim_end();
            if !item_line.starts_with(char::is_whitespace) {
                break;
            }
            let trimmed = item_line.trim_start();
            if let Some(item) = trimmed.strip_prefix('-') {
                items.push(parse_scalar(item.trim()));
                i += 1;
            } else {
                break;
            }
        }
        if items.is_empty() {
            properties.insert(key.to_string(), Value::Scalar(Scalar::Str(String::new())));
        } else {
            properties.insert(key.to_string(), Value::List(items));
        }
    }
    properties
}

/// Parse a document's full text into its property block and body.
///
/// A block exists only if the document begins with a delimiter line and a
/// closing delimiter line follows; otherwise the whole text is body.
pub fn parse(text: &str) -> ParsedDocument {
    let lines: Vec<&str> = text.split('\n').collect();
    let opens = lines
        .first()
        .map(|l| l.trim_end() == DELIMITER)
        .unwrap_or(false);
    if !opens {
        return ParsedDocument {
            has_block: false,
            properties: BTreeMap::new(),
            body: text.to_string(),
        };
    }
    let close = lines
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, l)| l.trim_end() == DELIMITER)
        .map(|(i, _)| i);
    let Some(close) = close else {
        return ParsedDocument {
            has_block: false,
            properties: BTreeMap::new(),
            body: text.to_string(),
        };
    };
    let properties = parse_block_lines(&lines[1..close]);
    let body = lines[close + 1..].join("\n");
    ParsedDocument {
        has_block: true,
        properties,
        body,
    }
}

fn render_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 9.0e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

fn needs_quoting(s: &str) -> bool {
    if s.is_empty() {
        return true;
    }
    if s != s.trim() {
        return true;
    }
    if matches!(s, "true" | "false" | "null" | "~") {
        return true;
    }
    if is_numeric_literal(s) {
        return true;
    }
    s.chars()
        .any(|c| matches!(c, '[' | ']' | '{' | '}' | ':' | ',' | '#' | '"' | '\''))
}

/// Render one scalar for serialization, quoting where the grammar demands it.
pub fn render_scalar(scalar: &Scalar) -> String {
    match scalar {
        Scalar::Null => "null".to_string(),
        Scalar::Bool(b) => b.to_string(),
        Scalar::Num(n) => render_number(*n),
        Scalar::Str(s) => {
            if is_wikilink(s) {
                s.clone()
            } else if needs_quoting(s) {
                format!("\"{}\"", s.replace('"', "\\\""))
            } else {
                s.clone()
            }
        }
    }
}

/// The serialization order for a property map: preferred prefix, then the
/// remaining keys lexicographically.
pub fn ordered_keys(properties: &BTreeMap<String, Value>) -> Vec<&str> {
    let mut keys: Vec<&str> = Vec::with_capacity(properties.len());
    for preferred in PREFERRED_KEY_ORDER {
        if properties.contains_key(*preferred) {
            keys.push(preferred);
        }
    }
    for key in properties.keys() {
        if !PREFERRED_KEY_ORDER.contains(&key.as_str()) {
            keys.push(key);
        }
    }
    keys
}

/// Serialize a body and property map back into document text.
///
/// Left inverse of [`parse`] over the scalar grammar: re-parsing the output
/// yields a deep-equal property map. An empty map emits no block at all.
pub fn serialize(body: &str, properties: &BTreeMap<String, Value>) -> String {
    if properties.is_empty() {
        return body.to_string();
    }
    let mut out = String::new();
    out.push_str(DELIMITER);
    out.push('\n');
    for key in ordered_keys(properties) {
        match &properties[key] {
            Value::Scalar(s) => {
                out.push_str(key);
                out.push_str(": ");
                out.push_str(&render_scalar(s));
                out.push('\n');
            }
            Value::List(items) if items.is_empty() => {
                out.push_str(key);
                out.push_str(": []\n");
            }
            Value::List(items) => {
                out.push_str(key);
                out.push_str(":\n");
                for item in items {
                    out.push_str("  - ");
                    out.push_str(&render_scalar(item));
                    out.push('\n');
                }
            }
        }
    }
    out.push_str(DELIMITER);
    out.push('\n');
    out.push_str(body);
    out
}
