//! Conversion of list-like paragraph runs into real lists.
//!
//! Office suites export bulleted lists as a run of `<p>` elements carrying a
//! glyph, an `mso-list` style hint, an `MsoListParagraph*` class or a hanging
//! indent. Each run becomes one `<ul>` with an `<li>` per paragraph.

use crate::dom::{self, DomElement, DomNode};
use crate::style;

const BULLET_GLYPHS: &[char] = &[
    '\u{2022}', // •
    '\u{00b7}', // ·
    '\u{25aa}', // ▪
    '\u{25cf}', // ●
    '\u{25e6}', // ◦
    '\u{25a0}', // ■
    '\u{25a1}', // □
    '\u{2023}', // ‣
    '\u{2043}', // ⁃
    '\u{25cb}', // ○
    '\u{25c6}', // ◆
    '\u{27a2}', // ➢
    '\u{f0b7}', // Symbol-font bullet
    '\u{f0a7}', // Wingdings square
    '\u{a7}',   // §, Wingdings square after font loss
];

/// ASCII markers only count when followed by whitespace.
const ASCII_MARKERS: &[char] = &['-', '*', 'o'];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListSignal {
    Glyph,
    OfficeStyle,
    HangingIndent,
}

/// Rewrite list-like runs everywhere under `nodes`, then unwrap `<p>` directly
/// inside any `<li>`.
pub(crate) fn convert_list_runs(nodes: &mut Vec<DomNode>) {
    convert_in(nodes);
    unwrap_paragraphs_in_items(nodes);
}

fn convert_in(nodes: &mut Vec<DomNode>) {
    for node in nodes.iter_mut() {
        if let DomNode::Element(el) = node {
            if !el.is("li") && !el.is("ul") && !el.is("ol") && !el.is("pre") {
                convert_in(&mut el.children);
            }
        }
    }

    let original = std::mem::take(nodes);
    let mut output: Vec<DomNode> = Vec::with_capacity(original.len());
    let mut run: Vec<(DomElement, ListSignal)> = Vec::new();
    let mut pending_blank: Vec<DomNode> = Vec::new();

    for node in original {
        match classify_node(&node) {
            Some(signal) => {
                if let DomNode::Element(el) = node {
                    // Whitespace between list paragraphs belongs to the list.
                    pending_blank.clear();
                    run.push((el, signal));
                }
            }
            None if node.is_blank_text() && !run.is_empty() => pending_blank.push(node),
            None => {
                flush_run(&mut run, &mut output);
                output.append(&mut pending_blank);
                output.push(node);
            }
        }
    }
    flush_run(&mut run, &mut output);
    output.append(&mut pending_blank);
    *nodes = output;
}

fn classify_node(node: &DomNode) -> Option<ListSignal> {
    let el = node.as_element()?;
    if !el.is("p") {
        return None;
    }
    let decls = style::parse(el.attr("style").unwrap_or_default());
    if style::has_property_prefix(&decls, "mso-list") || has_office_list_class(el) {
        return Some(ListSignal::OfficeStyle);
    }
    if starts_with_bullet(&el.text_content()) {
        return Some(ListSignal::Glyph);
    }
    if has_hanging_indent(&decls) {
        return Some(ListSignal::HangingIndent);
    }
    None
}

fn has_office_list_class(el: &DomElement) -> bool {
    el.attr("class")
        .map(|classes| {
            classes
                .split_whitespace()
                .any(|c| c.starts_with("MsoListParagraph"))
        })
        .unwrap_or(false)
}

fn flush_run(run: &mut Vec<(DomElement, ListSignal)>, output: &mut Vec<DomNode>) {
    if run.is_empty() {
        return;
    }
    // A single indented paragraph is more likely a quote than a list.
    if run.len() == 1 && run[0].1 == ListSignal::HangingIndent {
        let (el, _) = run.remove(0);
        output.push(DomNode::Element(el));
        return;
    }

    let mut list = DomElement::new("ul");
    for (paragraph, _) in run.drain(..) {
        list.children.push(DomNode::Element(paragraph_to_item(paragraph)));
    }
    output.push(DomNode::Element(list));
}

fn paragraph_to_item(paragraph: DomElement) -> DomElement {
    let DomElement {
        attrs, mut children, ..
    } = paragraph;

    remove_office_ignore_spans(&mut children);
    strip_office_declarations(&mut children);
    drop_empty_spans(&mut children);
    strip_leading_bullet(&mut children);

    let mut item = DomElement::new("li");
    item.children = children;
    for (name, value) in attrs {
        if name == "style" {
            let kept: Vec<_> = style::parse(&value)
                .into_iter()
                .filter(|d| !is_list_remnant(&d.property))
                .collect();
            if !kept.is_empty() {
                item.set_attr("style", style::render(&kept));
            }
        } else {
            item.set_attr(&name, value);
        }
    }
    item
}

fn is_list_remnant(property: &str) -> bool {
    property.starts_with("mso-")
        || property == "text-indent"
        || property == "margin-left"
        || property == "padding-left"
}

/// Word wraps the generated glyph in `<span style="mso-list:Ignore">`.
fn remove_office_ignore_spans(nodes: &mut Vec<DomNode>) {
    nodes.retain(|node| match node {
        DomNode::Element(el) => !el
            .attr("style")
            .map(|s| s.replace(' ', "").to_ascii_lowercase().contains("mso-list:ignore"))
            .unwrap_or(false),
        DomNode::Text(_) => true,
    });
    for node in nodes.iter_mut() {
        if let DomNode::Element(el) = node {
            remove_office_ignore_spans(&mut el.children);
        }
    }
}

fn strip_office_declarations(nodes: &mut [DomNode]) {
    dom::walk_mut(nodes, &mut |el: &mut DomElement| {
        let Some(value) = el.attr("style") else {
            return;
        };
        let kept: Vec<_> = style::parse(value)
            .into_iter()
            .filter(|d| !d.property.starts_with("mso-"))
            .collect();
        if kept.is_empty() {
            el.remove_attr("style");
        } else {
            el.set_attr("style", style::render(&kept));
        }
    });
}

fn drop_empty_spans(nodes: &mut Vec<DomNode>) {
    for node in nodes.iter_mut() {
        if let DomNode::Element(el) = node {
            drop_empty_spans(&mut el.children);
        }
    }
    nodes.retain(|node| match node {
        DomNode::Element(el) => !(el.is("span") && el.children.is_empty()),
        _ => true,
    });
}

/// Strip the bullet glyph and following whitespace from the first text.
/// Returns true once non-blank text has been reached.
fn strip_leading_bullet(nodes: &mut [DomNode]) -> bool {
    for node in nodes.iter_mut() {
        match node {
            DomNode::Text(text) => {
                let trimmed = text.trim_start_matches(is_space);
                if trimmed.is_empty() {
                    text.clear();
                    continue;
                }
                let rest = strip_bullet_prefix(trimmed).unwrap_or(trimmed);
                *text = rest.trim_start_matches(is_space).to_string();
                return true;
            }
            DomNode::Element(el) => {
                if strip_leading_bullet(&mut el.children) {
                    return true;
                }
            }
        }
    }
    false
}

fn starts_with_bullet(text: &str) -> bool {
    strip_bullet_prefix(text.trim_start_matches(is_space)).is_some()
}

fn strip_bullet_prefix(text: &str) -> Option<&str> {
    let mut chars = text.chars();
    let first = chars.next()?;
    if BULLET_GLYPHS.contains(&first) {
        return Some(chars.as_str());
    }
    if ASCII_MARKERS.contains(&first) {
        let rest = chars.as_str();
        if rest.starts_with(is_space) {
            return Some(rest);
        }
    }
    None
}

fn is_space(c: char) -> bool {
    c.is_whitespace() || c == '\u{a0}'
}

fn has_hanging_indent(decls: &[style::Declaration]) -> bool {
    let indent = style::value_of(decls, "text-indent").and_then(style::length_value);
    let margin = style::value_of(decls, "margin-left")
        .or_else(|| style::value_of(decls, "padding-left"))
        .and_then(style::length_value);
    matches!((indent, margin), (Some(i), Some(m)) if i < 0.0 && m > 0.0)
}

fn unwrap_paragraphs_in_items(nodes: &mut [DomNode]) {
    for node in nodes.iter_mut() {
        if let DomNode::Element(el) = node {
            if el.is("li") {
                let children = std::mem::take(&mut el.children);
                for child in children {
                    match child {
                        DomNode::Element(inner) if inner.is("p") => {
                            el.children.extend(inner.children);
                        }
                        other => el.children.push(other),
                    }
                }
            }
            unwrap_paragraphs_in_items(&mut el.children);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{parse_fragment, serialize};

    fn convert(html: &str) -> String {
        let mut nodes = parse_fragment(html);
        convert_list_runs(&mut nodes);
        serialize(&nodes)
    }

    #[test]
    fn glyph_run_becomes_one_list() {
        let html = "<p>\u{2022} one</p>\n<p>\u{2022} two</p><p>after</p>";
        assert_eq!(convert(html), "<ul><li>one</li><li>two</li></ul><p>after</p>");
    }

    #[test]
    fn office_ignore_span_is_removed() {
        let html = r#"<p class="MsoListParagraph" style="margin-left:.5in;text-indent:-.25in;mso-list:l0 level1 lfo1"><span style="mso-list:Ignore">·<span>&nbsp;&nbsp;</span></span>Alpha</p>"#;
        assert_eq!(
            convert(html),
            r#"<ul><li class="MsoListParagraph">Alpha</li></ul>"#
        );
    }

    #[test]
    fn single_hanging_indent_paragraph_is_kept() {
        let html = r#"<p style="margin-left:36pt;text-indent:-18pt">Quote</p>"#;
        assert_eq!(convert(html), html);
    }

    #[test]
    fn hanging_indent_run_converts() {
        let html = r#"<p style="margin-left:36pt;text-indent:-18pt">A</p><p style="margin-left:36pt;text-indent:-18pt;color:red">B</p>"#;
        assert_eq!(
            convert(html),
            r#"<ul><li>A</li><li style="color: red">B</li></ul>"#
        );
    }

    #[test]
    fn paragraphs_inside_items_are_unwrapped() {
        let html = "<ul><li><p>x</p></li></ul>";
        assert_eq!(convert(html), "<ul><li>x</li></ul>");
    }

    #[test]
    fn dash_needs_following_space() {
        let html = "<p>-5 degrees today</p>";
        assert_eq!(convert(html), html);
    }
}
