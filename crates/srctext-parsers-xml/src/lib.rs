//! In-memory document model for localization XML and a forgiving loader.
//!
//! Files are hand-edited by translators, so the loader repairs what it can
//! (unclosed or stray end tags, a literal `<` in text, broken entity
//! references, malformed attributes) instead of rejecting the file. Only input that the tokenizer
//! cannot make sense of at all is reported as an error.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use srctext_core::TransformError;

/// UTF-8 byte-order mark.
pub const BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Comment(String),
    /// Character data, already unescaped.
    Text(String),
    /// Text written without escaping angle brackets. Only bare `&` is escaped.
    Markup(String),
    CData(String),
    ProcessingInstruction(String),
    DocType(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Same tag and attributes, `text` as the only content.
    ///
    /// With `literal` the text is kept as markup instead of escaped text.
    pub fn with_text(&self, text: &str, literal: bool) -> Self {
        let children = if text.is_empty() {
            Vec::new()
        } else if literal {
            vec![Node::Markup(text.to_string())]
        } else {
            vec![Node::Text(text.to_string())]
        };
        Self {
            name: self.name.clone(),
            attributes: self.attributes.clone(),
            children,
        }
    }

    /// Concatenated direct text content (text, markup and CDATA children).
    pub fn text(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            match child {
                Node::Text(s) | Node::Markup(s) | Node::CData(s) => out.push_str(s),
                _ => {}
            }
        }
        out
    }

    #[cfg(test)]
    fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    /// Top-level nodes in order: prolog comments, doctype, the root element,
    /// trailing comments.
    pub nodes: Vec<Node>,
    /// Number of repairs the loader had to make.
    pub recoveries: usize,
}

impl Document {
    #[cfg(test)]
    fn root(&self) -> Option<&Element> {
        self.nodes.iter().find_map(|n| match n {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    /// Every node of the document in pre-order, regardless of depth.
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants {
            stack: self.nodes.iter().rev().collect(),
        }
    }
}

pub struct Descendants<'a> {
    stack: Vec<&'a Node>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        if let Node::Element(e) = node {
            self.stack.extend(e.children.iter().rev());
        }
        Some(node)
    }
}

/// Parse raw file bytes. A leading BOM is skipped; the content must be UTF-8.
pub fn load(bytes: &[u8]) -> Result<Document, TransformError> {
    let bytes = bytes.strip_prefix(BOM).unwrap_or(bytes);
    let xml = std::str::from_utf8(bytes)?;
    parse_str(xml)
}

pub fn parse_str(xml: &str) -> Result<Document, TransformError> {
    let mut tree = TreeBuilder::default();
    tree.feed(xml)?;
    tree.finish()
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// XML name check, loose enough for hand-written files: a letter, `_` or `:`
/// first, then no whitespace or markup characters.
fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_alphabetic() || first == '_' || first == ':')
        && chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | ':' | '-' | '.'))
}

/// `None` when the tag name is not a valid XML name, i.e. the `<` that opened
/// it was a literal character.
fn element_from(start: &BytesStart, recoveries: &mut usize) -> Option<Element> {
    let name = lossy(start.name().as_ref());
    if !is_valid_name(&name) {
        return None;
    }
    let mut el = Element::new(name);
    let mut attrs = start.attributes();
    attrs.with_checks(false);
    for attr in attrs {
        let Ok(attr) = attr else {
            *recoveries += 1;
            continue;
        };
        let key = lossy(attr.key.as_ref());
        let value = match attr.unescape_value() {
            Ok(v) => v.into_owned(),
            Err(_) => {
                *recoveries += 1;
                lossy(&attr.value)
            }
        };
        el.attributes.push((key, value));
    }
    Some(el)
}

#[derive(Default)]
struct TreeBuilder {
    top: Vec<Node>,
    open: Vec<Element>,
    recoveries: usize,
}

impl TreeBuilder {
    /// Tokenize `xml` and add its nodes to the tree.
    fn feed(&mut self, xml: &str) -> Result<(), TransformError> {
        let mut reader = Reader::from_str(xml);
        let config = reader.config_mut();
        config.trim_text(false);
        // mismatched and unmatched end tags are repaired by `close`
        config.check_end_names = false;
        config.allow_unmatched_ends = true;

        let mut buf = Vec::new();
        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => match element_from(&e, &mut self.recoveries) {
                    Some(el) => self.open.push(el),
                    None => self.stray_lt(format!("<{}>", lossy(&e)))?,
                },
                Ok(Event::Empty(e)) => match element_from(&e, &mut self.recoveries) {
                    Some(el) => self.push(Node::Element(el)),
                    None => self.stray_lt(format!("<{}/>", lossy(&e)))?,
                },
                Ok(Event::End(e)) => {
                    let name = lossy(e.name().as_ref());
                    self.close(&name);
                }
                Ok(Event::Text(t)) => {
                    let node = match t.unescape() {
                        Ok(v) => Node::Text(v.into_owned()),
                        Err(_) => {
                            self.recoveries += 1;
                            Node::Markup(lossy(&t))
                        }
                    };
                    self.push_text(node);
                }
                Ok(Event::CData(c)) => self.push(Node::CData(lossy(&c))),
                Ok(Event::Comment(c)) => self.push(Node::Comment(lossy(&c))),
                Ok(Event::PI(p)) => self.push(Node::ProcessingInstruction(lossy(&p))),
                Ok(Event::DocType(d)) => self.push(Node::DocType(lossy(&d))),
                Ok(Event::Decl(_)) => {}
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(TransformError::Parse {
                        position: reader.error_position(),
                        message: e.to_string(),
                    })
                }
            }
            buf.clear();
        }
        Ok(())
    }

    /// A `<` that does not start a tag. Everything up to the last `<` in the
    /// swallowed span is text; a tag the span ended with is fed back in.
    fn stray_lt(&mut self, raw: String) -> Result<(), TransformError> {
        self.recoveries += 1;
        match raw[1..].rfind('<') {
            Some(i) => {
                let (text, tag) = raw.split_at(i + 1);
                self.push_text(Node::Text(text.to_string()));
                self.feed(tag)
            }
            None => {
                self.push_text(Node::Text(raw));
                Ok(())
            }
        }
    }

    fn push(&mut self, node: Node) {
        match self.open.last_mut() {
            Some(parent) => parent.children.push(node),
            None => self.top.push(node),
        }
    }

    fn push_text(&mut self, node: Node) {
        if !self.open.is_empty() {
            self.push(node);
            return;
        }
        // text outside the root element: whitespace is formatting, anything
        // else is stray
        if let Node::Text(s) | Node::Markup(s) = &node {
            if !s.trim().is_empty() {
                self.recoveries += 1;
            }
        }
    }

    /// Close the innermost open element named `name`, implicitly closing
    /// everything opened after it. Unmatched end tags are dropped.
    fn close(&mut self, name: &str) {
        let Some(idx) = self.open.iter().rposition(|e| e.name == name) else {
            self.recoveries += 1;
            return;
        };
        self.recoveries += self.open.len() - idx - 1;
        while let Some(el) = self.open.pop() {
            let done = self.open.len() == idx;
            self.push(Node::Element(el));
            if done {
                break;
            }
        }
    }

    fn finish(mut self) -> Result<Document, TransformError> {
        self.recoveries += self.open.len();
        while let Some(el) = self.open.pop() {
            self.push(Node::Element(el));
        }
        if !self.top.iter().any(|n| matches!(n, Node::Element(_))) {
            return Err(TransformError::NoRoot);
        }
        Ok(Document {
            nodes: self.top,
            recoveries: self.recoveries,
        })
    }
}
