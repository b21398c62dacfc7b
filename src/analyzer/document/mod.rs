//! Ordered, comment-carrying YAML document tree.
//!
//! Unlike `serde_yaml::Value`, this tree remembers everything needed to write
//! a manifest back the way it was authored: entry order, standalone comments,
//! comments trailing a key or list item, blank lines, scalar spelling and the
//! column each block collection started at. Only the block and flow shapes that
//! Kubernetes manifests use are supported (no anchors, aliases, tags or complex
//! keys).

mod parser;
mod render;

use std::fmt;
use thiserror::Error;

pub use parser::parse;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    #[error("line {line}: tab characters are not allowed in indentation")]
    Tab { line: usize },

    #[error("line {line}: unexpected indentation")]
    Indentation { line: usize },

    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },
}

/// A single parsed YAML document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub root: Option<Node>,
    /// Comments and blank lines after the last content line.
    pub trailing: Vec<Comment>,
    pub style: Style,
}

/// Indentation used when writing nodes that have no recorded position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Style {
    /// Columns a nested mapping is indented under its key.
    pub mapping_indent: usize,
    /// Columns a block sequence's dash is indented under its key (0 = compact).
    pub sequence_indent: usize,
}

impl Default for Style {
    fn default() -> Self {
        Self {
            mapping_indent: 2,
            sequence_indent: 0,
        }
    }
}

/// A standalone comment line. Blank lines are comments with empty text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub text: String,
    pub indent: usize,
}

impl Comment {
    pub fn blank() -> Self {
        Self {
            text: String::new(),
            indent: 0,
        }
    }

    pub fn is_blank(&self) -> bool {
        self.text.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Scalar(Scalar),
    Mapping(Mapping),
    Sequence(Sequence),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Layout {
    /// Block collection; `indent` is the column it was read at.
    Block { indent: Option<usize> },
    /// Flow collection; `raw` is the authored text while unmodified.
    Flow { raw: Option<String> },
}

impl Layout {
    pub fn is_flow(&self) -> bool {
        matches!(self, Layout::Flow { .. })
    }

    fn adopted(&self) -> Layout {
        match self {
            Layout::Block { .. } => Layout::Block { indent: None },
            Layout::Flow { raw } => Layout::Flow {
                raw: raw.clone().filter(|r| !r.contains('\n')),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Mapping {
    pub entries: Vec<Entry>,
    pub layout: Layout,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    Pair(Pair),
    Comment(Comment),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pair {
    pub key: Key,
    pub value: Node,
    /// Whitespace between the colon and an inline value.
    pub sep: String,
    /// Comment on the key line, including its leading whitespace.
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key {
    pub name: String,
    pub raw: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sequence {
    pub items: Vec<Item>,
    pub layout: Layout,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Value(Element),
    Comment(Comment),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub value: Node,
    /// Spaces between the dash and the value.
    pub gap: usize,
    /// Whether a block collection value starts on the dash line.
    pub inline: bool,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scalar {
    pub value: ScalarValue,
    pub repr: Repr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Repr {
    /// Plain or quoted text as written (may span lines).
    Inline(String),
    /// Literal or folded block scalar; lines are relative to `indent`.
    Block {
        header: String,
        lines: Vec<String>,
        indent: Option<usize>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl ScalarValue {
    fn canonical(&self) -> Option<String> {
        match self {
            ScalarValue::Null => None,
            ScalarValue::Bool(b) => Some(b.to_string()),
            ScalarValue::Int(i) => Some(i.to_string()),
            ScalarValue::Float(f) => Some(f.to_string()),
            ScalarValue::Str(s) => Some(s.clone()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScalarValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.canonical() {
            Some(s) => f.write_str(&s),
            None => f.write_str("null"),
        }
    }
}

impl Scalar {
    /// Value equality. Strings equal the numbers they spell, since quantities
    /// and ports may change between string and number form across a typed
    /// round trip.
    pub fn same_value(&self, other: &Scalar) -> bool {
        use ScalarValue::*;
        match (&self.value, &other.value) {
            (Null, Null) => true,
            (Bool(a), Bool(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (Float(a), Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Int(a), Float(b)) | (Float(b), Int(a)) => (*a as f64) == *b,
            (Str(s), n @ (Int(_) | Float(_))) | (n @ (Int(_) | Float(_)), Str(s)) => {
                n.canonical().as_deref() == Some(s.as_str())
            }
            (Str(a), Str(b)) => a == b,
            _ => false,
        }
    }

    fn adopted(&self) -> Scalar {
        let repr = match &self.repr {
            Repr::Inline(raw) if raw.contains('\n') => Repr::Inline(requote(&self.value)),
            Repr::Inline(raw) => Repr::Inline(raw.clone()),
            Repr::Block { header, lines, .. } => Repr::Block {
                header: header.clone(),
                lines: lines.clone(),
                indent: None,
            },
        };
        Scalar {
            value: self.value.clone(),
            repr,
        }
    }

    /// Single-line spelling for use inside flow collections.
    pub fn inline_text(&self) -> String {
        match &self.repr {
            Repr::Inline(raw) if !raw.contains('\n') => raw.clone(),
            _ => requote(&self.value),
        }
    }
}

fn requote(value: &ScalarValue) -> String {
    match value {
        ScalarValue::Str(s) => serde_json::to_string(s).unwrap_or_else(|_| format!("{s:?}")),
        other => other.to_string(),
    }
}

impl Mapping {
    pub fn pairs(&self) -> impl Iterator<Item = &Pair> {
        self.entries.iter().filter_map(|e| match e {
            Entry::Pair(p) => Some(p),
            Entry::Comment(_) => None,
        })
    }

    pub fn get(&self, name: &str) -> Option<&Node> {
        self.pairs().find(|p| p.key.name == name).map(|p| &p.value)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn pair_count(&self) -> usize {
        self.pairs().count()
    }
}

impl Sequence {
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.items.iter().filter_map(|i| match i {
            Item::Value(e) => Some(e),
            Item::Comment(_) => None,
        })
    }

    pub fn element_count(&self) -> usize {
        self.elements().count()
    }
}

impl Node {
    pub fn as_mapping(&self) -> Option<&Mapping> {
        match self {
            Node::Mapping(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&Sequence> {
        match self {
            Node::Sequence(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Node::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn get(&self, name: &str) -> Option<&Node> {
        self.as_mapping().and_then(|m| m.get(name))
    }

    /// Structural equality ignoring comments, layout and sequence order.
    pub fn semantic_eq(&self, other: &Node) -> bool {
        match (self, other) {
            (Node::Scalar(a), Node::Scalar(b)) => a.same_value(b),
            (Node::Mapping(a), Node::Mapping(b)) => {
                a.pair_count() == b.pair_count()
                    && a.pairs().all(|p| {
                        b.get(&p.key.name)
                            .is_some_and(|other| p.value.semantic_eq(other))
                    })
            }
            (Node::Sequence(a), Node::Sequence(b)) => {
                let left: Vec<&Node> = a.elements().map(|e| &e.value).collect();
                let right: Vec<&Node> = b.elements().map(|e| &e.value).collect();
                if left.len() != right.len() {
                    return false;
                }
                let mut used = vec![false; right.len()];
                left.iter().all(|l| {
                    let found = right
                        .iter()
                        .enumerate()
                        .find(|(i, r)| !used[*i] && l.semantic_eq(r))
                        .map(|(i, _)| i);
                    match found {
                        Some(i) => {
                            used[i] = true;
                            true
                        }
                        None => false,
                    }
                })
            }
            _ => false,
        }
    }

    /// Copy of this node with positions and comments stripped, for insertion
    /// into a document it was not read from.
    pub fn adopted(&self) -> Node {
        match self {
            Node::Scalar(s) => Node::Scalar(s.adopted()),
            Node::Mapping(m) => Node::Mapping(Mapping {
                entries: m
                    .pairs()
                    .map(|p| {
                        Entry::Pair(Pair {
                            key: p.key.clone(),
                            value: p.value.adopted(),
                            sep: " ".to_string(),
                            comment: None,
                        })
                    })
                    .collect(),
                layout: m.layout.adopted(),
            }),
            Node::Sequence(s) => Node::Sequence(Sequence {
                items: s
                    .elements()
                    .map(|e| {
                        Item::Value(Element {
                            value: e.value.adopted(),
                            gap: 1,
                            inline: true,
                            comment: None,
                        })
                    })
                    .collect(),
                layout: s.layout.adopted(),
            }),
        }
    }
}

impl Document {
    pub fn render(&self) -> String {
        render::render(self)
    }
}
