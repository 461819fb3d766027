//! Jump-to-definition support: where each node and relationship record sits
//! in the source text.
//!
//! `serde_json` does not report value positions, so this module carries its
//! own small span-tracking scanner. It is only ever asked for spans; values
//! are decoded just far enough to read ids and keys.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::debug;

use crate::ir::ContainmentKind;
use crate::schema::{self, Accessor};

const MAX_DEPTH: usize = 256;

/// 0-based position. `pos` is a byte offset, `column` counts characters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct SourcePosition {
    pub line: usize,
    pub column: usize,
    pub pos: usize,
}

/// Extent of one JSON value, from its first character to just past its last.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Span {
    pub value: SourcePosition,
    pub value_end: SourcePosition,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PositionIndex {
    pub nodes: BTreeMap<String, Span>,
    pub relationships: BTreeMap<String, Span>,
    /// JSON pointer of every indexed record, e.g. `/nodes/0` or `/nodes/api`.
    pub pointers: BTreeMap<String, Span>,
    /// Relationships that expand into one edge per target.
    pub interacts: BTreeSet<String>,
}

impl PositionIndex {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.relationships.is_empty()
    }

    /// Nodes first, then relationships. Ids of expanded interacts edges
    /// (`<relationship>-<k>`) fall back to their relationship.
    pub fn locate(&self, id: &str) -> Option<Span> {
        if let Some(span) = self.nodes.get(id).or_else(|| self.relationships.get(id)) {
            return Some(*span);
        }
        let (base, suffix) = id.rsplit_once('-')?;
        if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        if !self.interacts.contains(base) {
            return None;
        }
        self.relationships.get(base).copied()
    }

    pub fn pointer(&self, pointer: &str) -> Option<Span> {
        self.pointers.get(pointer).copied()
    }
}

/// Index node and relationship records of `text`. Text that is not valid
/// JSON yields an empty index.
pub fn build_index(text: &str) -> PositionIndex {
    let mut scanner = Scanner::new(text);
    let root = match scanner.document() {
        Ok(root) => root,
        Err(err) => {
            debug!(line = err.at.line, column = err.at.column, reason = err.reason, "source index skipped");
            return PositionIndex::default();
        }
    };
    let mut index = PositionIndex::default();
    let Spanned {
        value: Shape::Object(members),
        ..
    } = &root
    else {
        return index;
    };

    for (key, value) in members {
        match (key.as_str(), &value.value) {
            ("nodes", Shape::Array(items)) => {
                for (i, item) in items.iter().enumerate() {
                    if let Some(id) = item.string_at(&schema::NODE_ID) {
                        index.insert_node(&id, format!("/nodes/{i}"), item.span);
                    }
                }
            }
            ("nodes", Shape::Object(entries)) => {
                for (entry_key, item) in entries {
                    if !matches!(item.value, Shape::Object(_)) {
                        continue;
                    }
                    let id = item
                        .string_at(&schema::NODE_ID)
                        .unwrap_or_else(|| entry_key.clone());
                    let pointer = format!("/nodes/{}", escape_pointer_token(entry_key));
                    index.insert_node(&id, pointer, item.span);
                }
            }
            ("relationships", Shape::Array(items)) => {
                for (i, item) in items.iter().enumerate() {
                    if !matches!(item.value, Shape::Object(_)) {
                        continue;
                    }
                    let id = item
                        .string_at(&schema::RELATIONSHIP_ID)
                        .unwrap_or_else(|| format!("edge-{i}"));
                    index.pointers.insert(format!("/relationships/{i}"), item.span);
                    if item.is_interacts() {
                        index.interacts.insert(id.clone());
                    }
                    index.relationships.entry(id).or_insert(item.span);
                }
            }
            _ => {}
        }
    }
    index
}

impl PositionIndex {
    fn insert_node(&mut self, id: &str, pointer: String, span: Span) {
        self.pointers.insert(pointer, span);
        self.nodes.entry(id.to_string()).or_insert(span);
    }
}

fn escape_pointer_token(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

#[derive(Debug)]
struct Spanned {
    value: Shape,
    span: Span,
}

impl Spanned {
    fn member(&self, wanted: &str) -> Option<&Spanned> {
        let Shape::Object(members) = &self.value else {
            return None;
        };
        members
            .iter()
            .find_map(|(key, value)| (key == wanted).then_some(value))
    }

    fn lookup_path(&self, path: &[&str]) -> Option<&Spanned> {
        path.iter().try_fold(self, |current, key| current.member(key))
    }

    /// Same reading as [`Accessor::string`]: first path holding a non-empty
    /// string or a number.
    fn string_at(&self, accessor: &Accessor) -> Option<String> {
        accessor
            .paths
            .iter()
            .filter_map(|path| self.lookup_path(path))
            .find_map(|value| match &value.value {
                Shape::String(text) if !text.trim().is_empty() => Some(text.clone()),
                Shape::Number(number) => Some(number.clone()),
                _ => None,
            })
    }

    /// Containment keys take precedence over `interacts`, as in the parser.
    fn is_interacts(&self) -> bool {
        let Some(relationship_type) = schema::RELATIONSHIP_TYPE
            .paths
            .iter()
            .filter_map(|path| self.lookup_path(path))
            .find(|value| matches!(value.value, Shape::Object(_)))
        else {
            return false;
        };
        let contained = [ContainmentKind::DeployedIn, ContainmentKind::ComposedOf]
            .iter()
            .any(|kind| relationship_type.member(kind.key()).is_some());
        !contained && relationship_type.member("interacts").is_some()
    }
}

#[derive(Debug)]
enum Shape {
    Object(Vec<(String, Spanned)>),
    Array(Vec<Spanned>),
    String(String),
    /// Rendered the way `serde_json` prints the number.
    Number(String),
    Scalar,
}

#[derive(Debug)]
struct ScanError {
    at: SourcePosition,
    reason: &'static str,
}

struct Scanner<'a> {
    text: &'a str,
    at: SourcePosition,
}

impl<'a> Scanner<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            at: SourcePosition::default(),
        }
    }

    fn fail<T>(&self, reason: &'static str) -> Result<T, ScanError> {
        Err(ScanError {
            at: self.at,
            reason,
        })
    }

    fn peek(&self) -> Option<char> {
        self.text[self.at.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.at.pos += ch.len_utf8();
        if ch == '\n' {
            self.at.line += 1;
            self.at.column = 0;
        } else {
            self.at.column += 1;
        }
        Some(ch)
    }

    fn expect(&mut self, wanted: char, reason: &'static str) -> Result<(), ScanError> {
        match self.bump() {
            Some(ch) if ch == wanted => Ok(()),
            _ => self.fail(reason),
        }
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(' ' | '\t' | '\n' | '\r')) {
            self.bump();
        }
    }

    fn document(&mut self) -> Result<Spanned, ScanError> {
        if self.text.starts_with('\u{feff}') {
            self.at.pos = '\u{feff}'.len_utf8();
        }
        self.skip_whitespace();
        let root = self.value(0)?;
        self.skip_whitespace();
        if self.peek().is_some() {
            return self.fail("trailing characters");
        }
        Ok(root)
    }

    fn value(&mut self, depth: usize) -> Result<Spanned, ScanError> {
        if depth > MAX_DEPTH {
            return self.fail("nesting too deep");
        }
        let start = self.at;
        let value = match self.peek() {
            Some('{') => self.object(depth)?,
            Some('[') => self.array(depth)?,
            Some('"') => Shape::String(self.string()?),
            Some('t') => self.literal("true")?,
            Some('f') => self.literal("false")?,
            Some('n') => self.literal("null")?,
            Some('-' | '0'..='9') => self.number()?,
            _ => return self.fail("expected a value"),
        };
        Ok(Spanned {
            value,
            span: Span {
                value: start,
                value_end: self.at,
            },
        })
    }

    fn object(&mut self, depth: usize) -> Result<Shape, ScanError> {
        self.expect('{', "expected `{`")?;
        let mut members = Vec::new();
        self.skip_whitespace();
        if self.peek() == Some('}') {
            self.bump();
            return Ok(Shape::Object(members));
        }
        loop {
            self.skip_whitespace();
            if self.peek() != Some('"') {
                return self.fail("expected a key");
            }
            let key = self.string()?;
            self.skip_whitespace();
            self.expect(':', "expected `:`")?;
            self.skip_whitespace();
            let value = self.value(depth + 1)?;
            members.push((key, value));
            self.skip_whitespace();
            match self.bump() {
                Some(',') => continue,
                Some('}') => return Ok(Shape::Object(members)),
                _ => return self.fail("expected `,` or `}`"),
            }
        }
    }

    fn array(&mut self, depth: usize) -> Result<Shape, ScanError> {
        self.expect('[', "expected `[`")?;
        let mut items = Vec::new();
        self.skip_whitespace();
        if self.peek() == Some(']') {
            self.bump();
            return Ok(Shape::Array(items));
        }
        loop {
            self.skip_whitespace();
            items.push(self.value(depth + 1)?);
            self.skip_whitespace();
            match self.bump() {
                Some(',') => continue,
                Some(']') => return Ok(Shape::Array(items)),
                _ => return self.fail("expected `,` or `]`"),
            }
        }
    }

    fn string(&mut self) -> Result<String, ScanError> {
        self.expect('"', "expected `\"`")?;
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return self.fail("unterminated string"),
                Some('"') => return Ok(out),
                Some('\\') => match self.bump() {
                    Some('"') => out.push('"'),
                    Some('\\') => out.push('\\'),
                    Some('/') => out.push('/'),
                    Some('b') => out.push('\u{8}'),
                    Some('f') => out.push('\u{c}'),
                    Some('n') => out.push('\n'),
                    Some('r') => out.push('\r'),
                    Some('t') => out.push('\t'),
                    Some('u') => out.push(self.unicode_escape()?),
                    _ => return self.fail("invalid escape"),
                },
                Some(ch) if (ch as u32) < 0x20 => return self.fail("control character in string"),
                Some(ch) => out.push(ch),
            }
        }
    }

    fn hex4(&mut self) -> Result<u32, ScanError> {
        let mut code = 0u32;
        for _ in 0..4 {
            let digit = self.bump().and_then(|ch| ch.to_digit(16));
            match digit {
                Some(digit) => code = code * 16 + digit,
                None => return self.fail("invalid unicode escape"),
            }
        }
        Ok(code)
    }

    fn unicode_escape(&mut self) -> Result<char, ScanError> {
        let first = self.hex4()?;
        let code = if (0xD800..0xDC00).contains(&first) {
            if self.bump() != Some('\\') || self.bump() != Some('u') {
                return self.fail("unpaired surrogate");
            }
            let second = self.hex4()?;
            if !(0xDC00..0xE000).contains(&second) {
                return self.fail("unpaired surrogate");
            }
            0x10000 + ((first - 0xD800) << 10) + (second - 0xDC00)
        } else {
            first
        };
        match char::from_u32(code) {
            Some(ch) => Ok(ch),
            None => self.fail("invalid unicode escape"),
        }
    }

    fn literal(&mut self, word: &'static str) -> Result<Shape, ScanError> {
        if !self.text[self.at.pos..].starts_with(word) {
            return self.fail("invalid literal");
        }
        for _ in word.chars() {
            self.bump();
        }
        Ok(Shape::Scalar)
    }

    fn number(&mut self) -> Result<Shape, ScanError> {
        let start = self.at.pos;
        if self.peek() == Some('-') {
            self.bump();
        }
        match self.peek() {
            Some('0') => {
                self.bump();
            }
            Some('1'..='9') => self.digits(),
            _ => return self.fail("invalid number"),
        }
        if self.peek() == Some('.') {
            self.bump();
            if !matches!(self.peek(), Some('0'..='9')) {
                return self.fail("invalid number");
            }
            self.digits();
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            self.bump();
            if matches!(self.peek(), Some('+' | '-')) {
                self.bump();
            }
            if !matches!(self.peek(), Some('0'..='9')) {
                return self.fail("invalid number");
            }
            self.digits();
        }
        let literal = &self.text[start..self.at.pos];
        let rendered = literal
            .parse::<serde_json::Number>()
            .map(|number| number.to_string())
            .unwrap_or_else(|_| literal.to_string());
        Ok(Shape::Number(rendered))
    }

    fn digits(&mut self) {
        while matches!(self.peek(), Some('0'..='9')) {
            self.bump();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"{
  "nodes": [
    {"unique-id": "api", "name": "API"},
    {
      "unique-id": "db"
    }
  ],
  "relationships": [
    {"unique-id": "api-db", "source": "api", "target": "db"},
    {"source": "db", "target": "api"}
  ]
}"#;

    #[test]
    fn nodes_and_relationships_are_indexed() {
        let index = build_index(DOC);
        let api = index.locate("api").expect("api span");
        assert_eq!(api.value.line, 2);
        assert_eq!(api.value.column, 4);
        assert_eq!(&DOC[api.value.pos..api.value_end.pos], r#"{"unique-id": "api", "name": "API"}"#);

        let db = index.locate("db").expect("db span");
        assert_eq!((db.value.line, db.value_end.line), (3, 5));

        let rel = index.locate("api-db").expect("relationship span");
        assert_eq!(rel.value.line, 8);
        assert!(index.locate("edge-1").is_some());
        assert_eq!(index.pointer("/nodes/1"), Some(db));
    }

    #[test]
    fn object_encoded_nodes_use_keys_and_escaped_pointers() {
        let text = r#"{"nodes": {"a/b": {"name": "x"}, "c": {"id": "explicit"}}}"#;
        let index = build_index(text);
        assert!(index.locate("a/b").is_some());
        assert!(index.locate("explicit").is_some());
        assert!(index.locate("c").is_none());
        assert!(index.pointer("/nodes/a~1b").is_some());
    }

    #[test]
    fn invalid_json_gives_an_empty_index() {
        assert!(build_index(r#"{"nodes": [ {"unique-id": "a"} "#).is_empty());
        assert!(build_index("").is_empty());
        assert!(build_index("[1, 2,]").is_empty());
        assert!(build_index(r#"{"a": "\ud800"}"#).is_empty());
    }

    #[test]
    fn columns_count_characters_not_bytes() {
        let text = "{\"nodes\": [{\"name\": \"\u{e9}\u{e9}\", \"id\": \"x\"}, {\"id\": \"y\"}]}";
        let index = build_index(text);
        let y = index.locate("y").expect("y");
        assert_eq!(y.value.pos, text.find("{\"id\": \"y\"}").expect("needle"));
        assert_eq!(y.value.column, y.value.pos - 2);
    }

    #[test]
    fn escapes_and_surrogate_pairs_decode() {
        let text = r#"{"nodes": [{"unique-id": "caf\u00e9-\ud83d\ude00"}]}"#;
        let index = build_index(text);
        assert!(index.locate("caf\u{e9}-\u{1F600}").is_some());
    }

    #[test]
    fn expanded_interacts_ids_fall_back_to_relationship() {
        let text = r#"{"nodes": [], "relationships": [
            {"unique-id": "talk", "relationship-type": {"interacts": {"actor": "a", "nodes": ["b"]}}}
        ]}"#;
        let index = build_index(text);
        assert!(index.locate("talk").is_some());
        assert_eq!(index.locate("talk-2"), index.locate("talk"));
        assert!(index.locate("talk-x").is_none());
    }

    #[test]
    fn numbered_ids_do_not_borrow_other_records() {
        let text = r#"{"nodes": [{"unique-id": "api-1"}], "relationships": [
            {"unique-id": "api", "source": "api-1", "target": "api-1"},
            {"unique-id": "dep", "relationship-type": {"deployed-in": {"container": "c", "nodes": []}}}
        ]}"#;
        let index = build_index(text);
        assert!(index.locate("api-1").is_some());
        assert!(index.locate("api-2").is_none());
        assert!(index.locate("dep-0").is_none());
    }

    #[test]
    fn numeric_ids_are_indexed_like_the_parser_reads_them() {
        let text = r#"{"nodes": [{"unique-id": 42}, {"id": 7, "unique-id": ""}],
            "relationships": [{"unique-id": 9, "source": "42", "target": "7"}]}"#;
        let index = build_index(text);
        assert_eq!(index.locate("42").map(|span| span.value.column), Some(11));
        assert!(index.locate("7").is_some());
        assert!(index.locate("9").is_some());
    }
}
