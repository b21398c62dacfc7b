//! Line-oriented, indentation-driven reader for the document tree.

use once_cell::sync::Lazy;
use regex::Regex;

use super::{
    Comment, Document, DocumentError, Element, Entry, Item, Key, Layout, Mapping, Node, Pair,
    Repr, Scalar, ScalarValue, Sequence, Style,
};

static INT_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[-+]?[0-9]+$").unwrap());
static HEX_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^0x[0-9a-fA-F]+$").unwrap());
static OCT_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^0o[0-7]+$").unwrap());
static LEGACY_OCT_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^0[0-7]+$").unwrap());
static FLOAT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[-+]?(\.[0-9]+|[0-9]+(\.[0-9]*)?)([eE][-+]?[0-9]+)?$").unwrap()
});

type ParseResult<T> = Result<T, DocumentError>;

#[derive(Debug, Clone)]
struct Line {
    indent: usize,
    text: String,
    number: usize,
}

impl Line {
    fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    fn is_comment(&self) -> bool {
        self.text.starts_with('#')
    }

    fn is_trivia(&self) -> bool {
        self.is_blank() || self.is_comment()
    }

    fn is_dash(&self) -> bool {
        is_dash(&self.text)
    }

    fn raw(&self) -> String {
        format!("{}{}", " ".repeat(self.indent), self.text)
    }

    fn to_comment(&self) -> Comment {
        if self.is_blank() {
            Comment::blank()
        } else {
            Comment {
                text: self.text.clone(),
                indent: self.indent,
            }
        }
    }
}

fn is_dash(text: &str) -> bool {
    text == "-" || text.starts_with("- ")
}

/// Parse a single YAML document (without `---` separators).
pub fn parse(text: &str) -> Result<Document, DocumentError> {
    let mut parser = Parser::new(split_lines(text));
    let root = match parser.next_content() {
        Some(idx) => {
            let indent = parser.lines[idx].indent;
            Some(parser.parse_block(indent)?)
        }
        None => None,
    };

    let mut trailing = Vec::new();
    while let Some(line) = parser.lines.get(parser.pos) {
        if !line.is_trivia() {
            return Err(parser.syntax(line.number, "unexpected content after the document root"));
        }
        trailing.push(line.to_comment());
        parser.pos += 1;
    }

    Ok(Document {
        root,
        trailing,
        style: parser.style(),
    })
}

fn split_lines(text: &str) -> Vec<Line> {
    let body = text.strip_suffix('\n').unwrap_or(text);
    if body.is_empty() && text.is_empty() {
        return Vec::new();
    }
    body.split('\n')
        .enumerate()
        .map(|(i, raw)| {
            let raw = raw.strip_suffix('\r').unwrap_or(raw).trim_end();
            let content = raw.trim_start_matches(' ');
            Line {
                indent: raw.len() - content.len(),
                text: content.to_string(),
                number: i + 1,
            }
        })
        .collect()
}

struct Parser {
    lines: Vec<Line>,
    pos: usize,
    mapping_indent: Option<usize>,
    sequence_indent: Option<usize>,
}

impl Parser {
    fn new(lines: Vec<Line>) -> Self {
        Self {
            lines,
            pos: 0,
            mapping_indent: None,
            sequence_indent: None,
        }
    }

    fn style(&self) -> Style {
        let default = Style::default();
        Style {
            mapping_indent: self.mapping_indent.unwrap_or(default.mapping_indent),
            sequence_indent: self.sequence_indent.unwrap_or(default.sequence_indent),
        }
    }

    fn syntax(&self, line: usize, message: impl Into<String>) -> DocumentError {
        DocumentError::Syntax {
            line,
            message: message.into(),
        }
    }

    /// Index of the next non-comment, non-blank line at or after `pos`.
    fn next_content(&self) -> Option<usize> {
        (self.pos..self.lines.len()).find(|&i| !self.lines[i].is_trivia())
    }

    fn check_line(&self, line: &Line) -> ParseResult<()> {
        if line.text.starts_with('\t') {
            return Err(DocumentError::Tab { line: line.number });
        }
        if line.indent == 0 && (line.text == "---" || line.text == "...") {
            return Err(self.syntax(line.number, "document markers must be split before parsing"));
        }
        Ok(())
    }

    fn parse_block(&mut self, indent: usize) -> ParseResult<Node> {
        let Some(idx) = self.next_content() else {
            return Ok(null_node());
        };
        let line = self.lines[idx].clone();
        self.check_line(&line)?;
        if line.is_dash() {
            self.parse_sequence(indent)
        } else if split_key(&line.text).is_some() {
            self.parse_mapping(indent)
        } else {
            // Scalar on a line of its own; leading comments are not kept.
            self.pos = idx + 1;
            let (node, _) = self.parse_scalar(&line.text, indent.saturating_sub(1), line.number)?;
            Ok(node)
        }
    }

    fn parse_mapping(&mut self, indent: usize) -> ParseResult<Node> {
        let mut entries = Vec::new();
        while let Some(line) = self.lines.get(self.pos).cloned() {
            if line.is_trivia() {
                match self.next_content() {
                    Some(i) if self.lines[i].indent == indent && !self.lines[i].is_dash() => {
                        entries.push(Entry::Comment(line.to_comment()));
                        self.pos += 1;
                        continue;
                    }
                    _ => break,
                }
            }
            self.check_line(&line)?;
            if line.indent < indent {
                break;
            }
            if line.indent > indent {
                return Err(DocumentError::Indentation { line: line.number });
            }
            let Some((key, rest)) = split_key(&line.text) else {
                return Err(self.syntax(line.number, "expected a mapping key"));
            };
            self.pos += 1;
            let (value_part, comment) = split_comment(rest);
            let value_text = value_part.trim_start();
            let sep = value_part[..value_part.len() - value_text.len()].to_string();
            let (value, value_comment) =
                self.parse_value(value_text, indent, line.number, false)?;
            entries.push(Entry::Pair(Pair {
                key,
                value,
                sep,
                comment: value_comment.or(comment),
            }));
        }
        Ok(Node::Mapping(Mapping {
            entries,
            layout: Layout::Block {
                indent: Some(indent),
            },
        }))
    }

    fn parse_sequence(&mut self, indent: usize) -> ParseResult<Node> {
        let mut items = Vec::new();
        while let Some(line) = self.lines.get(self.pos).cloned() {
            if line.is_trivia() {
                match self.next_content() {
                    Some(i) if self.lines[i].indent == indent && self.lines[i].is_dash() => {
                        items.push(Item::Comment(line.to_comment()));
                        self.pos += 1;
                        continue;
                    }
                    _ => break,
                }
            }
            self.check_line(&line)?;
            if line.indent < indent || !line.is_dash() {
                break;
            }
            if line.indent > indent {
                return Err(DocumentError::Indentation { line: line.number });
            }

            let after = &line.text[1..];
            let rest = after.trim_start();
            let gap = after.len() - rest.len();

            if rest.is_empty() || rest.starts_with('#') {
                self.pos += 1;
                let comment = (!rest.is_empty()).then(|| after.to_string());
                let (value, _) = self.parse_value("", indent, line.number, true)?;
                items.push(Item::Value(Element {
                    value,
                    gap: 1,
                    inline: false,
                    comment,
                }));
                continue;
            }

            let content_indent = indent + 1 + gap;
            if is_dash(rest) || split_key(rest).is_some() {
                // Re-read the remainder of the dash line as the first line of a
                // nested block collection at its own column.
                self.lines[self.pos] = Line {
                    indent: content_indent,
                    text: rest.to_string(),
                    number: line.number,
                };
                let value = self.parse_block(content_indent)?;
                items.push(Item::Value(Element {
                    value,
                    gap,
                    inline: true,
                    comment: None,
                }));
            } else {
                self.pos += 1;
                let (value_part, comment) = split_comment(rest);
                let (value, value_comment) =
                    self.parse_value(value_part, indent, line.number, true)?;
                items.push(Item::Value(Element {
                    value,
                    gap,
                    inline: true,
                    comment: value_comment.or(comment),
                }));
            }
        }
        Ok(Node::Sequence(Sequence {
            items,
            layout: Layout::Block {
                indent: Some(indent),
            },
        }))
    }

    /// Parse the value following a key or dash. An empty `text` means the
    /// value is a nested block on the following lines, or null.
    fn parse_value(
        &mut self,
        text: &str,
        parent: usize,
        number: usize,
        in_sequence: bool,
    ) -> ParseResult<(Node, Option<String>)> {
        if !text.is_empty() {
            return self.parse_scalar(text, parent, number);
        }
        let Some(idx) = self.next_content() else {
            return Ok((null_node(), None));
        };
        let next = &self.lines[idx];
        let nested = next.indent > parent || (!in_sequence && next.indent == parent && next.is_dash());
        if !nested {
            return Ok((null_node(), None));
        }
        let child = next.indent;
        if !in_sequence {
            let offset = child - parent;
            if next.is_dash() {
                self.sequence_indent.get_or_insert(offset);
            } else {
                self.mapping_indent.get_or_insert(offset);
            }
        }
        Ok((self.parse_block(child)?, None))
    }

    /// Parse an inline value: block scalar header, flow collection, quoted or
    /// plain scalar. Continuation lines must be indented deeper than `parent`.
    /// Returns the node and, for values spanning lines, the comment found on
    /// the last line.
    fn parse_scalar(
        &mut self,
        text: &str,
        parent: usize,
        number: usize,
    ) -> ParseResult<(Node, Option<String>)> {
        let (text, _) = split_comment(text);
        match text.chars().next() {
            Some('|') | Some('>') => Ok((self.parse_block_scalar(text, parent, number)?, None)),
            Some('[') | Some('{') => self.parse_flow(text, parent, number),
            Some('"') | Some('\'') => self.parse_quoted(text, parent, number),
            Some('&') | Some('*') | Some('!') => Err(self.syntax(
                number,
                "anchors, aliases and tags are not supported",
            )),
            _ => Ok((self.parse_plain(text, parent), None)),
        }
    }

    /// Extend `first` with following lines until `done` accepts the text.
    /// Returns the text and the comment found after it on its last line.
    fn continuation_lines(
        &mut self,
        first: &str,
        parent: usize,
        done: impl Fn(&str) -> bool,
    ) -> (String, Option<String>) {
        let mut raw = first.to_string();
        while let Some(line) = self.lines.get(self.pos) {
            if !line.is_blank() && line.indent <= parent {
                break;
            }
            self.pos += 1;
            raw.push('\n');
            raw.push_str(&line.raw());
            if done(&raw) {
                break;
            }
        }
        match raw.rfind('\n') {
            Some(nl) => {
                let (last, comment) = split_comment(&raw[nl + 1..]);
                (format!("{}{}", &raw[..=nl], last), comment)
            }
            None => (raw, None),
        }
    }

    fn parse_flow(&mut self, text: &str, parent: usize, number: usize) -> ParseResult<(Node, Option<String>)> {
        let (raw, comment) = if flow_depth(text) > 0 {
            self.continuation_lines(text, parent, |raw| flow_depth(raw) <= 0)
        } else {
            (text.to_string(), None)
        };
        let mut node = FlowParser::new(&raw)
            .parse()
            .map_err(|message| self.syntax(number, message))?;
        let layout = Layout::Flow { raw: Some(raw) };
        match &mut node {
            Node::Mapping(m) => m.layout = layout,
            Node::Sequence(s) => s.layout = layout,
            Node::Scalar(_) => {}
        }
        Ok((node, comment))
    }

    fn parse_quoted(&mut self, text: &str, parent: usize, number: usize) -> ParseResult<(Node, Option<String>)> {
        let quote = text.chars().next().unwrap_or('"');
        let (raw, comment) = if quoted_end(text).is_none() {
            self.continuation_lines(text, parent, |raw| quoted_end(raw).is_some())
        } else {
            (text.to_string(), None)
        };
        if quoted_end(&raw) != Some(raw.len()) {
            return Err(self.syntax(number, "unterminated quoted scalar"));
        }
        let value = unquote(&raw, quote).map_err(|m| self.syntax(number, m))?;
        Ok((
            Node::Scalar(Scalar {
                value: ScalarValue::Str(value),
                repr: Repr::Inline(raw),
            }),
            comment,
        ))
    }

    fn parse_plain(&mut self, text: &str, parent: usize) -> Node {
        let mut raw = text.to_string();
        let mut folded = text.to_string();
        let mut pending_blank = 0;
        while let Some(line) = self.lines.get(self.pos + pending_blank) {
            if line.is_blank() {
                pending_blank += 1;
                continue;
            }
            if line.indent <= parent
                || line.is_comment()
                || line.text.contains(" #")
                || split_key(&line.text).is_some()
            {
                break;
            }
            for _ in 0..pending_blank {
                raw.push('\n');
                folded.push('\n');
            }
            if pending_blank == 0 {
                folded.push(' ');
            }
            raw.push('\n');
            raw.push_str(&line.raw());
            folded.push_str(&line.text);
            self.pos += pending_blank + 1;
            pending_blank = 0;
        }
        Node::Scalar(Scalar {
            value: resolve_plain(&folded),
            repr: Repr::Inline(raw),
        })
    }

    fn parse_block_scalar(&mut self, header: &str, parent: usize, number: usize) -> ParseResult<Node> {
        let mut keep = false;
        let mut strip = false;
        let mut explicit = None;
        for ch in header.chars().skip(1) {
            match ch {
                '+' => keep = true,
                '-' => strip = true,
                d if d.is_ascii_digit() && d != '0' => explicit = d.to_digit(10).map(|d| d as usize),
                _ => return Err(self.syntax(number, format!("invalid block scalar header '{header}'"))),
            }
        }

        let mut block_indent = explicit.map(|d| parent + d);
        let mut lines = Vec::new();
        while let Some(line) = self.lines.get(self.pos) {
            if line.is_blank() {
                lines.push(String::new());
                self.pos += 1;
                continue;
            }
            let indent = match block_indent {
                Some(i) => i,
                None if line.indent > parent => *block_indent.insert(line.indent),
                None => break,
            };
            if line.indent < indent {
                break;
            }
            lines.push(format!("{}{}", " ".repeat(line.indent - indent), line.text));
            self.pos += 1;
        }
        if !keep {
            while lines.last().is_some_and(String::is_empty) {
                lines.pop();
                self.pos -= 1;
            }
        }

        let mut value = if header.starts_with('>') {
            fold_lines(&lines)
        } else {
            lines.join("\n")
        };
        if !value.is_empty() && !strip {
            value.push('\n');
        }
        if strip {
            while value.ends_with('\n') {
                value.pop();
            }
        }

        Ok(Node::Scalar(Scalar {
            value: ScalarValue::Str(value),
            repr: Repr::Block {
                header: header.to_string(),
                lines,
                indent: block_indent,
            },
        }))
    }
}

fn null_node() -> Node {
    Node::Scalar(Scalar {
        value: ScalarValue::Null,
        repr: Repr::Inline(String::new()),
    })
}

fn fold_lines(lines: &[String]) -> String {
    let mut out = String::new();
    let mut pending = 0;
    let mut last_more = false;
    let mut first = true;
    for line in lines {
        if line.is_empty() {
            pending += 1;
            continue;
        }
        let more = line.starts_with(' ');
        if !first {
            if pending > 0 {
                let extra = usize::from(more || last_more);
                out.push_str(&"\n".repeat(pending + extra));
            } else if more || last_more {
                out.push('\n');
            } else {
                out.push(' ');
            }
        }
        out.push_str(line);
        first = false;
        last_more = more;
        pending = 0;
    }
    out
}

/// Split `key: rest` into the key and the text after the colon.
pub(crate) fn split_key(text: &str) -> Option<(Key, &str)> {
    if text.is_empty() || is_dash(text) || text.starts_with(['[', '{', '#', '|', '>']) {
        return None;
    }
    if text.starts_with(['"', '\'']) {
        let end = quoted_end(text)?;
        let after = &text[end..];
        let trimmed = after.trim_start();
        let colon = end + (after.len() - trimmed.len());
        if !trimmed.starts_with(':') || !(trimmed.len() == 1 || trimmed[1..].starts_with(' ')) {
            return None;
        }
        let quote = text.chars().next()?;
        let name = unquote(&text[..end], quote).ok()?;
        return Some((
            Key {
                name,
                raw: text[..colon].to_string(),
            },
            &text[colon + 1..],
        ));
    }

    let mut prev = None;
    let mut chars = text.char_indices().peekable();
    while let Some((i, ch)) = chars.next() {
        match ch {
            '#' if prev == Some(' ') => return None,
            ':' => {
                let next = chars.peek().map(|(_, c)| *c);
                if next.is_none() || next == Some(' ') {
                    let raw = &text[..i];
                    return Some((
                        Key {
                            name: raw.trim_end().to_string(),
                            raw: raw.to_string(),
                        },
                        &text[i + 1..],
                    ));
                }
            }
            _ => {}
        }
        prev = Some(ch);
    }
    None
}

/// Split a value from a trailing comment. The comment keeps the whitespace
/// that preceded it so the line can be written back unchanged.
pub(crate) fn split_comment(text: &str) -> (&str, Option<String>) {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut in_single = false;
    let mut in_double = false;
    let mut escaped = false;
    let mut prev: Option<char> = None;
    let mut last_sig: Option<char> = None;
    let mut i = 0;
    while i < chars.len() {
        let (at, ch) = chars[i];
        if in_double {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_double = false;
            }
        } else if in_single {
            if ch == '\'' {
                if chars.get(i + 1).is_some_and(|(_, c)| *c == '\'') {
                    i += 1;
                } else {
                    in_single = false;
                }
            }
        } else {
            match ch {
                '#' if prev.is_none_or(char::is_whitespace) => {
                    let value = text[..at].trim_end();
                    return (value, Some(text[value.len()..].to_string()));
                }
                '"' | '\'' if last_sig.is_none_or(|c| matches!(c, '[' | '{' | ',' | ':' | '-' | '?')) => {
                    if ch == '"' {
                        in_double = true;
                    } else {
                        in_single = true;
                    }
                }
                _ => {}
            }
        }
        prev = Some(ch);
        if !ch.is_whitespace() {
            last_sig = Some(ch);
        }
        i += 1;
    }
    (text.trim_end(), None)
}

/// Byte offset just past the closing quote of a quoted scalar at the start of `text`.
fn quoted_end(text: &str) -> Option<usize> {
    let mut chars = text.char_indices();
    let (_, quote) = chars.next()?;
    let mut escaped = false;
    let mut iter = chars.peekable();
    while let Some((i, ch)) = iter.next() {
        if quote == '"' {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                return Some(i + 1);
            }
        } else if ch == '\'' {
            if iter.peek().is_some_and(|(_, c)| *c == '\'') {
                iter.next();
            } else {
                return Some(i + 1);
            }
        }
    }
    None
}

fn fold_quoted(body: &str) -> String {
    let mut out = String::new();
    let mut first = true;
    let mut pending = 0;
    for (i, line) in body.split('\n').enumerate() {
        let line = if i == 0 { line.trim_end() } else { line.trim() };
        if line.is_empty() && i > 0 {
            pending += 1;
            continue;
        }
        if !first {
            if pending > 0 {
                out.push_str(&"\n".repeat(pending));
            } else {
                out.push(' ');
            }
        }
        out.push_str(line);
        first = false;
        pending = 0;
    }
    out
}

fn unquote(raw: &str, quote: char) -> Result<String, String> {
    let inner = raw
        .strip_prefix(quote)
        .and_then(|r| r.strip_suffix(quote))
        .ok_or_else(|| "malformed quoted scalar".to_string())?;
    let inner = if inner.contains('\n') {
        fold_quoted(inner)
    } else {
        inner.to_string()
    };
    if quote == '\'' {
        return Ok(inner.replace("''", "'"));
    }

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        let escape = chars.next().ok_or_else(|| "dangling escape".to_string())?;
        match escape {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '0' => out.push('\0'),
            ' ' => out.push(' '),
            '"' => out.push('"'),
            '/' => out.push('/'),
            '\\' => out.push('\\'),
            'x' | 'u' | 'U' => {
                let width = match escape {
                    'x' => 2,
                    'u' => 4,
                    _ => 8,
                };
                let hex: String = chars.by_ref().take(width).collect();
                let code = u32::from_str_radix(&hex, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| format!("invalid escape \\{escape}{hex}"))?;
                out.push(code);
            }
            other => return Err(format!("unknown escape \\{other}")),
        }
    }
    Ok(out)
}

/// Resolve a plain scalar with the YAML 1.2 core schema.
pub(crate) fn resolve_plain(text: &str) -> ScalarValue {
    match text {
        "" | "~" | "null" | "Null" | "NULL" => return ScalarValue::Null,
        "true" | "True" | "TRUE" => return ScalarValue::Bool(true),
        "false" | "False" | "FALSE" => return ScalarValue::Bool(false),
        ".inf" | ".Inf" | ".INF" | "+.inf" | "+.Inf" | "+.INF" => {
            return ScalarValue::Float(f64::INFINITY);
        }
        "-.inf" | "-.Inf" | "-.INF" => return ScalarValue::Float(f64::NEG_INFINITY),
        ".nan" | ".NaN" | ".NAN" => return ScalarValue::Float(f64::NAN),
        _ => {}
    }
    // Kubernetes reads YAML 1.1, where a leading zero means octal.
    if LEGACY_OCT_REGEX.is_match(text) {
        if let Ok(i) = i64::from_str_radix(&text[1..], 8) {
            return ScalarValue::Int(i);
        }
    }
    if INT_REGEX.is_match(text) {
        if let Ok(i) = text.parse::<i64>() {
            return ScalarValue::Int(i);
        }
    }
    if HEX_REGEX.is_match(text) {
        if let Ok(i) = i64::from_str_radix(&text[2..], 16) {
            return ScalarValue::Int(i);
        }
    }
    if OCT_REGEX.is_match(text) {
        if let Ok(i) = i64::from_str_radix(&text[2..], 8) {
            return ScalarValue::Int(i);
        }
    }
    if FLOAT_REGEX.is_match(text) {
        if let Ok(f) = text.parse::<f64>() {
            return ScalarValue::Float(f);
        }
    }
    ScalarValue::Str(text.to_string())
}

fn flow_depth(text: &str) -> i32 {
    let mut depth = 0;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for ch in text.chars() {
        match quote {
            Some('"') => {
                if escaped {
                    escaped = false;
                } else if ch == '\\' {
                    escaped = true;
                } else if ch == '"' {
                    quote = None;
                }
            }
            Some(q) => {
                if ch == q {
                    quote = None;
                }
            }
            None => match ch {
                '[' | '{' => depth += 1,
                ']' | '}' => depth -= 1,
                '"' | '\'' => quote = Some(ch),
                '#' => break,
                _ => {}
            },
        }
    }
    depth
}

/// Recursive-descent reader for `[..]` and `{..}` collections.
struct FlowParser {
    chars: Vec<char>,
    pos: usize,
}

impl FlowParser {
    fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            pos: 0,
        }
    }

    fn parse(mut self) -> Result<Node, String> {
        let node = self.node()?;
        self.skip_ws();
        if self.pos < self.chars.len() {
            return Err("unexpected characters after flow collection".to_string());
        }
        Ok(node)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, ch: char) -> Result<(), String> {
        self.skip_ws();
        if self.peek() == Some(ch) {
            self.pos += 1;
            Ok(())
        } else {
            Err(format!("expected '{ch}' in flow collection"))
        }
    }

    fn node(&mut self) -> Result<Node, String> {
        self.skip_ws();
        match self.peek() {
            Some('[') => self.sequence(),
            Some('{') => self.mapping(),
            Some(_) => Ok(Node::Scalar(self.scalar(false)?)),
            None => Err("unexpected end of flow collection".to_string()),
        }
    }

    fn sequence(&mut self) -> Result<Node, String> {
        self.expect('[')?;
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() == Some(']') {
                self.pos += 1;
                break;
            }
            let value = self.node()?;
            items.push(Item::Value(Element {
                value,
                gap: 1,
                inline: true,
                comment: None,
            }));
            self.skip_ws();
            match self.peek() {
                Some(',') => self.pos += 1,
                Some(']') => {}
                _ => return Err("expected ',' or ']' in flow sequence".to_string()),
            }
        }
        Ok(Node::Sequence(Sequence {
            items,
            layout: Layout::Flow { raw: None },
        }))
    }

    fn mapping(&mut self) -> Result<Node, String> {
        self.expect('{')?;
        let mut entries = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() == Some('}') {
                self.pos += 1;
                break;
            }
            let key = self.scalar(true)?;
            self.skip_ws();
            let value = if self.peek() == Some(':') {
                self.pos += 1;
                self.node()?
            } else {
                null_node()
            };
            let raw = key.inline_text();
            let name = key.value.to_string();
            entries.push(Entry::Pair(Pair {
                key: Key { name, raw },
                value,
                sep: " ".to_string(),
                comment: None,
            }));
            self.skip_ws();
            match self.peek() {
                Some(',') => self.pos += 1,
                Some('}') => {}
                _ => return Err("expected ',' or '}' in flow mapping".to_string()),
            }
        }
        Ok(Node::Mapping(Mapping {
            entries,
            layout: Layout::Flow { raw: None },
        }))
    }

    fn scalar(&mut self, is_key: bool) -> Result<Scalar, String> {
        self.skip_ws();
        let start = self.pos;
        if let Some(quote @ ('"' | '\'')) = self.peek() {
            let rest: String = self.chars[start..].iter().collect();
            let end = quoted_end(&rest).ok_or_else(|| "unterminated quoted scalar".to_string())?;
            let raw: String = rest[..end].to_string();
            self.pos += raw.chars().count();
            let value = unquote(&raw, quote)?;
            return Ok(Scalar {
                value: ScalarValue::Str(value),
                repr: Repr::Inline(raw),
            });
        }
        while let Some(ch) = self.peek() {
            if matches!(ch, ',' | ']' | '}' | '[' | '{') {
                break;
            }
            if ch == ':' {
                let next = self.chars.get(self.pos + 1).copied();
                if is_key || next.is_none_or(|c| c.is_whitespace() || matches!(c, ',' | ']' | '}')) {
                    break;
                }
            }
            self.pos += 1;
        }
        let raw: String = self.chars[start..self.pos].iter().collect::<String>().trim().to_string();
        Ok(Scalar {
            value: resolve_plain(&raw),
            repr: Repr::Inline(raw),
        })
    }
}
