use serde::Serialize;
use srctext_core::{CommentPolicy, Rules};
use srctext_parsers_xml::{Document, Node};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PropagationReport {
    /// Marker comments seen.
    pub markers: usize,
    /// Elements whose text was replaced.
    pub applied: usize,
    /// Markers overwritten by a later marker before reaching an element.
    pub superseded: usize,
    /// Marker left pending at the end of the document.
    pub dangling: usize,
    /// Applied markers dropped from the tree.
    pub removed_comments: usize,
}

/// Text carried by a marker comment, or `None` for any other comment.
///
/// One leading space before the prefix and one space after it are optional.
/// Single-line text is trimmed; text starting with a newline is kept
/// verbatim since its indentation matters.
pub fn marker_text(comment: &str, prefix: &str) -> Option<String> {
    let body = comment.strip_prefix(' ').unwrap_or(comment);
    let rest = body.strip_prefix(prefix)?;
    let rest = rest.strip_prefix(' ').unwrap_or(rest);
    if rest.starts_with('\n') || rest.starts_with("\r\n") {
        Some(rest.to_string())
    } else {
        Some(rest.trim().to_string())
    }
}

enum Kind {
    Element,
    Marker(String),
    Inert,
}

/// One node of the flattened document. `end` is the index just past the
/// node's subtree.
struct Entry {
    kind: Kind,
    end: usize,
    action: Action,
}

enum Action {
    Keep,
    Assign(String),
    Drop,
}

/// Copy the latest marker comment text into the element that follows it.
///
/// The document is flattened in pre-order and scanned once with a single
/// pending slot; the tree is then rebuilt from the resulting plan. Replaced
/// elements are new values with the same tag and attributes and no
/// descendants.
pub fn propagate(doc: Document, rules: &Rules) -> (Document, PropagationReport) {
    let mut entries = Vec::new();
    flatten(&doc.nodes, &rules.marker_prefix, &mut entries);
    let report = plan(&mut entries, rules.comment_policy);

    let mut next = 0usize;
    let nodes = rebuild(doc.nodes, &entries, &mut next, rules);
    (
        Document {
            nodes,
            recoveries: doc.recoveries,
        },
        report,
    )
}

fn flatten(nodes: &[Node], prefix: &str, out: &mut Vec<Entry>) {
    for node in nodes {
        let idx = out.len();
        let kind = match node {
            Node::Element(_) => Kind::Element,
            Node::Comment(c) => match marker_text(c, prefix) {
                Some(text) => Kind::Marker(text),
                None => Kind::Inert,
            },
            _ => Kind::Inert,
        };
        out.push(Entry {
            kind,
            end: idx + 1,
            action: Action::Keep,
        });
        if let Node::Element(el) = node {
            flatten(&el.children, prefix, out);
            out[idx].end = out.len();
        }
    }
}

fn plan(entries: &mut [Entry], policy: CommentPolicy) -> PropagationReport {
    let mut report = PropagationReport::default();
    let mut pending: Option<(usize, String)> = None;
    let mut skip_until = 0usize;

    for idx in 0..entries.len() {
        if idx < skip_until {
            continue;
        }
        if let Kind::Marker(text) = &entries[idx].kind {
            report.markers += 1;
            if pending.replace((idx, text.clone())).is_some() {
                report.superseded += 1;
            }
            continue;
        }
        if !matches!(entries[idx].kind, Kind::Element) {
            continue;
        }
        let Some((comment_idx, text)) = pending.take() else {
            continue;
        };
        entries[idx].action = Action::Assign(text);
        skip_until = entries[idx].end;
        report.applied += 1;
        if policy == CommentPolicy::Remove {
            entries[comment_idx].action = Action::Drop;
            report.removed_comments += 1;
        }
    }
    if pending.is_some() {
        report.dangling = 1;
    }
    report
}

fn rebuild(nodes: Vec<Node>, entries: &[Entry], next: &mut usize, rules: &Rules) -> Vec<Node> {
    let mut out = Vec::with_capacity(nodes.len());
    for node in nodes {
        let entry = &entries[*next];
        *next += 1;
        match (node, &entry.action) {
            (Node::Element(el), Action::Assign(text)) => {
                *next = entry.end;
                let literal = rules.is_literal_markup(&el.name);
                out.push(Node::Element(el.with_text(text, literal)));
            }
            (Node::Element(mut el), _) => {
                let children = std::mem::take(&mut el.children);
                el.children = rebuild(children, entries, next, rules);
                out.push(Node::Element(el));
            }
            (Node::Comment(_), Action::Drop) => {}
            (node, _) => out.push(node),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use srctext_parsers_xml::{parse_str, Element};

    fn run(xml: &str, rules: &Rules) -> (Document, PropagationReport) {
        propagate(parse_str(xml).unwrap(), rules)
    }

    fn find<'a>(doc: &'a Document, name: &str) -> &'a Element {
        doc.descendants()
            .find_map(|n| match n {
                Node::Element(e) if e.name == name => Some(e),
                _ => None,
            })
            .unwrap_or_else(|| panic!("element {name} not found"))
    }

    #[test]
    fn marker_text_single_and_multi_line() {
        assert_eq!(marker_text(" EN: Hello ", "EN:").as_deref(), Some("Hello"));
        assert_eq!(
            marker_text("EN:   hello world  ", "EN:").as_deref(),
            Some("hello world")
        );
        assert_eq!(
            marker_text("EN:\n  line1\n  line2", "EN:").as_deref(),
            Some("\n  line1\n  line2")
        );
        assert_eq!(marker_text(" EN: \n  a\n", "EN:").as_deref(), Some("\n  a\n"));
        assert_eq!(marker_text("note", "EN:"), None);
        assert_eq!(marker_text("en: lower", "EN:"), None);
        assert_eq!(marker_text("  EN: two spaces", "EN:"), None);
    }

    #[test]
    fn latest_marker_wins() {
        let (doc, report) = run("<R><!--EN: A--><!--EN: B--><x/></R>", &Rules::default());
        assert_eq!(find(&doc, "x").text(), "B");
        assert_eq!(report.superseded, 1);
        assert_eq!(report.applied, 1);
    }

    #[test]
    fn top_level_markers_reach_the_root() {
        let (doc, _) = run("<!--EN: A--><!--EN: B--><x/>", &Rules::default());
        assert_eq!(find(&doc, "x").text(), "B");
    }

    #[test]
    fn plain_comment_does_not_clear_pending() {
        let (doc, _) = run("<R><!--EN: A--><!--note--><x/></R>", &Rules::default());
        assert_eq!(find(&doc, "x").text(), "A");
    }

    #[test]
    fn single_line_trim_and_multi_line_preserve() {
        let (doc, _) = run(
            "<R><!--EN:   hello world  --><x/><!--EN:\n  line1\n  line2--><y/></R>",
            &Rules::default(),
        );
        assert_eq!(find(&doc, "x").text(), "hello world");
        assert_eq!(find(&doc, "y").text(), "\n  line1\n  line2");
    }

    #[test]
    fn descendants_are_wiped() {
        let (doc, _) = run("<R><!--EN: new--><x><y>old</y>tail</x></R>", &Rules::default());
        let x = find(&doc, "x");
        assert_eq!(x.children, vec![Node::Text("new".into())]);
        assert!(doc
            .descendants()
            .all(|n| !matches!(n, Node::Element(e) if e.name == "y")));
    }

    #[test]
    fn marker_inside_wiped_subtree_is_not_applied() {
        let (doc, report) = run(
            "<R><!--EN: outer--><x><!--EN: inner--><y/></x><z/></R>",
            &Rules::default(),
        );
        assert_eq!(find(&doc, "x").text(), "outer");
        assert!(find(&doc, "z").children.is_empty());
        assert_eq!(report.applied, 1);
        assert_eq!(report.markers, 1);
    }

    #[test]
    fn marker_applies_across_nesting_levels() {
        // the target is the next element in document order, at any depth
        let (doc, _) = run("<R><!--EN: t--><Group><Item>a</Item></Group></R>", &Rules::default());
        assert_eq!(find(&doc, "Group").text(), "t");

        let (doc, _) = run(
            "<R><A>x<!--EN: t--></A><B>old</B></R>",
            &Rules::default(),
        );
        assert_eq!(find(&doc, "B").text(), "t");
    }

    #[test]
    fn dangling_marker_is_discarded() {
        let (doc, report) = run("<R><x>keep</x><!--EN: lost--></R>", &Rules::default());
        assert_eq!(find(&doc, "x").text(), "keep");
        assert_eq!(report.dangling, 1);
        assert_eq!(report.applied, 0);
        assert!(doc
            .descendants()
            .any(|n| matches!(n, Node::Comment(c) if c == "EN: lost")));
    }

    #[test]
    fn element_without_marker_is_untouched() {
        let input = parse_str("<R><x a=\"1\"/><y>t<z/></y></R>").unwrap();
        let (doc, report) = propagate(input.clone(), &Rules::default());
        assert_eq!(doc, input);
        assert_eq!(report, PropagationReport::default());
    }

    #[test]
    fn literal_markup_tags_keep_markup_text() {
        let (doc, _) = run(
            "<R><!-- EN: Hi <b>you</b> --><letterText/><!-- EN: <b>x</b> --><other/></R>",
            &Rules::default(),
        );
        assert_eq!(
            find(&doc, "letterText").children,
            vec![Node::Markup("Hi <b>you</b>".into())]
        );
        assert_eq!(
            find(&doc, "other").children,
            vec![Node::Text("<b>x</b>".into())]
        );
    }

    #[test]
    fn comment_policy_controls_marker_removal() {
        let xml = "<R><!-- EN: a --><x/><!-- note --><!-- EN: stale --><!-- EN: b --><y/><!-- EN: end --></R>";
        let (kept, _) = run(xml, &Rules::default());
        let comments = |doc: &Document| {
            doc.descendants()
                .filter(|n| matches!(n, Node::Comment(_)))
                .count()
        };
        assert_eq!(comments(&kept), 5);

        let rules = Rules {
            comment_policy: CommentPolicy::Remove,
            ..Rules::default()
        };
        let (removed, report) = run(xml, &rules);
        assert_eq!(report.removed_comments, 2);
        // plain, superseded and dangling comments stay
        assert_eq!(comments(&removed), 3);
        assert_eq!(find(&removed, "y").text(), "b");
    }

    #[test]
    fn attributes_survive_replacement() {
        let (doc, _) = run("<R><!--EN: v--><li Class=\"c\">old</li></R>", &Rules::default());
        let li = find(&doc, "li");
        assert_eq!(li.attributes, vec![("Class".to_string(), "c".to_string())]);
        assert_eq!(li.text(), "v");
    }
}
