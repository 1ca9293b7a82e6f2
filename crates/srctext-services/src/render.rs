use quick_xml::escape::partial_escape;
use quick_xml::events::{BytesCData, BytesEnd, BytesPI, BytesStart, BytesText, Event};
use quick_xml::Writer;
use srctext_core::{EscapePolicy, Rules, TransformError};
use srctext_parsers_xml::{Document, Element, Node, BOM};

pub const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";

/// Serialize `doc` with BOM and declaration, then restore the allow-listed
/// escapes according to `rules.escape_policy`.
pub fn render(doc: &Document, rules: &Rules) -> Result<Vec<u8>, TransformError> {
    let mut w = Writer::new(Vec::new());
    let mut first = true;
    for node in &doc.nodes {
        if let Node::Text(s) | Node::Markup(s) = node {
            if s.trim().is_empty() {
                continue;
            }
        }
        if !first {
            emit(&mut w, Event::Text(BytesText::from_escaped("\n")))?;
        }
        first = false;
        write_node(&mut w, node)?;
    }
    let body =
        String::from_utf8(w.into_inner()).map_err(|e| TransformError::Write(e.to_string()))?;
    let body = restore_escapes(&body, rules);

    let mut out = Vec::with_capacity(BOM.len() + XML_DECLARATION.len() + body.len());
    out.extend_from_slice(BOM);
    out.extend_from_slice(XML_DECLARATION.as_bytes());
    out.extend_from_slice(body.as_bytes());
    Ok(out)
}

fn emit(w: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<(), TransformError> {
    w.write_event(event)
        .map_err(|e| TransformError::Write(e.to_string()))
}

/// Text nodes are escaped here so that quotes stay literal; everything else
/// is handed to the writer as raw content.
fn write_node(w: &mut Writer<Vec<u8>>, node: &Node) -> Result<(), TransformError> {
    match node {
        Node::Element(el) => write_element(w, el),
        Node::Comment(c) => emit(w, Event::Comment(BytesText::from_escaped(c.as_str()))),
        Node::Text(t) => {
            let escaped = partial_escape(t.as_str());
            emit(w, Event::Text(BytesText::from_escaped(escaped)))
        }
        Node::Markup(m) => {
            let escaped = escape_bare_ampersands(m);
            emit(w, Event::Text(BytesText::from_escaped(escaped)))
        }
        Node::CData(c) => emit(w, Event::CData(BytesCData::new(c.as_str()))),
        Node::ProcessingInstruction(p) => emit(w, Event::PI(BytesPI::new(p.as_str()))),
        Node::DocType(d) => emit(w, Event::DocType(BytesText::from_escaped(d.trim_start()))),
    }
}

fn write_element(w: &mut Writer<Vec<u8>>, el: &Element) -> Result<(), TransformError> {
    let mut start = BytesStart::new(el.name.as_str());
    for (key, value) in &el.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }
    if el.children.is_empty() {
        return emit(w, Event::Empty(start));
    }
    emit(w, Event::Start(start))?;
    for child in &el.children {
        write_node(w, child)?;
    }
    emit(w, Event::End(BytesEnd::new(el.name.as_str())))
}

/// Escape `&` unless it already starts a character or entity reference.
fn escape_bare_ampersands(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        if starts_with_reference(tail) {
            out.push('&');
        } else {
            out.push_str("&amp;");
        }
        rest = &tail[1..];
    }
    out.push_str(rest);
    out
}

fn starts_with_reference(s: &str) -> bool {
    let Some(end) = s.find(';') else {
        return false;
    };
    let name = &s[1..end];
    if let Some(num) = name.strip_prefix("#x") {
        return !num.is_empty() && num.chars().all(|c| c.is_ascii_hexdigit());
    }
    if let Some(num) = name.strip_prefix('#') {
        return !num.is_empty() && num.chars().all(|c| c.is_ascii_digit());
    }
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// Undo default escaping for allow-listed tags and operators.
pub fn restore_escapes(serialized: &str, rules: &Rules) -> String {
    let mut s = serialized.to_string();
    for tag in &rules.escape_restore_tags {
        s = s
            .replace(&format!("&lt;{tag}&gt;"), &format!("<{tag}>"))
            .replace(&format!("&lt;/{tag}&gt;"), &format!("</{tag}>"));
    }
    match rules.escape_policy {
        EscapePolicy::AllowList => {
            for op in &rules.escape_restore_operators {
                s = s.replace(op.as_str(), &op.replace("&gt;", ">"));
            }
        }
        EscapePolicy::AllGt => s = s.replace("&gt;", ">"),
    }
    s
}
