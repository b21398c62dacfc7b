//! Writes a document tree back to text.
//!
//! Nodes read from a document are written at the columns they were read at;
//! nodes without a recorded position are placed using the document `Style`.

use super::{
    Comment, Document, Element, Entry, Item, Layout, Mapping, Node, Pair, Repr, Sequence, Style,
};

pub(super) fn render(doc: &Document) -> String {
    let mut renderer = Renderer {
        lines: Vec::new(),
        style: doc.style,
    };
    if let Some(root) = &doc.root {
        renderer.root(root);
    }
    for comment in &doc.trailing {
        renderer.comment(comment);
    }
    if renderer.lines.is_empty() {
        return String::new();
    }
    let mut out = renderer.lines.join("\n");
    out.push('\n');
    out
}

fn pad(col: usize) -> String {
    " ".repeat(col)
}

fn block_indent(layout: &Layout) -> Option<usize> {
    match layout {
        Layout::Block { indent } => *indent,
        Layout::Flow { .. } => None,
    }
}

/// Whether the node is written as an indented block below its key or dash.
fn is_block_collection(node: &Node) -> bool {
    match node {
        Node::Mapping(m) => !m.layout.is_flow() && m.pair_count() > 0,
        Node::Sequence(s) => !s.layout.is_flow() && s.element_count() > 0,
        Node::Scalar(_) => false,
    }
}

/// Single-line text for scalars, flow collections and empty collections.
fn flow_text(node: &Node) -> String {
    match node {
        Node::Scalar(s) => s.inline_text(),
        Node::Mapping(m) => match &m.layout {
            Layout::Flow { raw: Some(raw) } => raw.clone(),
            _ => {
                let pairs: Vec<String> = m
                    .pairs()
                    .map(|p| format!("{}: {}", p.key.raw.trim_end(), flow_text(&p.value)))
                    .collect();
                if pairs.is_empty() {
                    "{}".to_string()
                } else {
                    format!("{{{}}}", pairs.join(", "))
                }
            }
        },
        Node::Sequence(s) => match &s.layout {
            Layout::Flow { raw: Some(raw) } => raw.clone(),
            _ => {
                let items: Vec<String> = s.elements().map(|e| flow_text(&e.value)).collect();
                format!("[{}]", items.join(", "))
            }
        },
    }
}

struct Renderer {
    lines: Vec<String>,
    style: Style,
}

impl Renderer {
    fn root(&mut self, node: &Node) {
        match node {
            Node::Mapping(m) if is_block_collection(node) => {
                self.mapping(m, block_indent(&m.layout).unwrap_or(0));
            }
            Node::Sequence(s) if is_block_collection(node) => {
                self.sequence(s, block_indent(&s.layout).unwrap_or(0));
            }
            Node::Scalar(s) => match &s.repr {
                Repr::Block { header, lines, indent } => {
                    self.lines.push(header.clone());
                    self.block_lines(lines, indent.unwrap_or(self.style.mapping_indent));
                }
                Repr::Inline(raw) => self.lines.push(raw.clone()),
            },
            other => self.lines.push(flow_text(other)),
        }
    }

    fn comment(&mut self, comment: &Comment) {
        if comment.is_blank() {
            self.lines.push(String::new());
        } else {
            self.lines.push(format!("{}{}", pad(comment.indent), comment.text));
        }
    }

    fn block_lines(&mut self, lines: &[String], col: usize) {
        for line in lines {
            if line.is_empty() {
                self.lines.push(String::new());
            } else {
                self.lines.push(format!("{}{}", pad(col), line));
            }
        }
    }

    fn mapping(&mut self, mapping: &Mapping, col: usize) {
        for entry in &mapping.entries {
            match entry {
                Entry::Comment(c) => self.comment(c),
                Entry::Pair(pair) => self.pair(pair, col),
            }
        }
    }

    fn pair(&mut self, pair: &Pair, col: usize) {
        let head = format!("{}{}:", pad(col), pair.key.raw);
        let comment = pair.comment.as_deref().unwrap_or("");
        let sep = if pair.sep.is_empty() { " " } else { pair.sep.as_str() };

        match &pair.value {
            Node::Scalar(s) => match &s.repr {
                Repr::Block { header, lines, indent } => {
                    self.lines.push(format!("{head}{sep}{header}{comment}"));
                    self.block_lines(lines, indent.unwrap_or(col + self.style.mapping_indent));
                }
                Repr::Inline(raw) if raw.is_empty() => {
                    self.lines.push(format!("{head}{comment}"));
                }
                Repr::Inline(raw) => self.lines.push(format!("{head}{sep}{raw}{comment}")),
            },
            node if is_block_collection(node) => {
                self.lines.push(format!("{head}{comment}"));
                match node {
                    Node::Mapping(m) => {
                        let child = block_indent(&m.layout).unwrap_or(col + self.style.mapping_indent);
                        self.mapping(m, child);
                    }
                    Node::Sequence(s) => {
                        let child = block_indent(&s.layout).unwrap_or(col + self.style.sequence_indent);
                        self.sequence(s, child);
                    }
                    Node::Scalar(_) => {}
                }
            }
            node => self.lines.push(format!("{head}{sep}{}{comment}", flow_text(node))),
        }
    }

    fn sequence(&mut self, sequence: &Sequence, col: usize) {
        for item in &sequence.items {
            match item {
                Item::Comment(c) => self.comment(c),
                Item::Value(element) => self.element(element, col),
            }
        }
    }

    fn element(&mut self, element: &Element, col: usize) {
        let dash = format!("{}-", pad(col));
        let gap = pad(element.gap.max(1));
        let comment = element.comment.as_deref().unwrap_or("");

        match &element.value {
            Node::Scalar(s) => match &s.repr {
                Repr::Block { header, lines, indent } => {
                    self.lines.push(format!("{dash}{gap}{header}{comment}"));
                    self.block_lines(lines, indent.unwrap_or(col + 2));
                }
                Repr::Inline(raw) if raw.is_empty() => self.lines.push(format!("{dash}{comment}")),
                Repr::Inline(raw) => self.lines.push(format!("{dash}{gap}{raw}{comment}")),
            },
            node if is_block_collection(node) => {
                let layout = match node {
                    Node::Mapping(m) => &m.layout,
                    Node::Sequence(s) => &s.layout,
                    Node::Scalar(_) => return,
                };
                let child = block_indent(layout).unwrap_or(col + 1 + gap.len());
                let mut nested = Renderer {
                    lines: Vec::new(),
                    style: self.style,
                };
                match node {
                    Node::Mapping(m) => nested.mapping(m, child),
                    Node::Sequence(s) => nested.sequence(s, child),
                    Node::Scalar(_) => {}
                }

                let prefix = pad(child);
                let fold = element.inline
                    && comment.is_empty()
                    && child > col
                    && nested.lines.first().is_some_and(|l| {
                        l.starts_with(&prefix) && !l[child..].starts_with(' ')
                    });
                if fold {
                    let mut lines = nested.lines.into_iter();
                    if let Some(first) = lines.next() {
                        let dash_gap = pad(child - col - 1);
                        self.lines.push(format!("{dash}{dash_gap}{}", &first[child..]));
                    }
                    self.lines.extend(lines);
                } else {
                    self.lines.push(format!("{dash}{comment}"));
                    self.lines.extend(nested.lines);
                }
            }
            node => self.lines.push(format!("{dash}{gap}{}{comment}", flow_text(node))),
        }
    }
}
