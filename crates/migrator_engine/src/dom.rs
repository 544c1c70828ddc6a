//! Small owned HTML tree used for rewriting.
//!
//! `scraper` documents are read-only; the sanitizer copies the parts it keeps
//! into this tree and edits it in place. Markup goes back out through the
//! html5ever serializer that scraper itself is built on.

use std::collections::HashSet;
use std::io;

use ego_tree::{NodeId, NodeRef};
use engine_logging::engine_warn;
use html5ever::serialize::{Serialize, SerializeOpts, Serializer, TraversalScope};
use html5ever::{ns, LocalName, QualName};
use scraper::node::Node;
use scraper::{ElementRef, Html};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum DomNode {
    Element(DomElement),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DomElement {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<DomNode>,
}

impl DomElement {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attrs.iter_mut().find(|(k, _)| k == name) {
            Some(slot) => slot.1 = value,
            None => self.attrs.push((name.to_string(), value)),
        }
    }

    pub fn remove_attr(&mut self, name: &str) {
        self.attrs.retain(|(k, _)| k != name);
    }

    pub fn is(&self, name: &str) -> bool {
        self.name == name
    }

    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out);
        out
    }
}

impl DomNode {
    pub fn as_element(&self) -> Option<&DomElement> {
        match self {
            DomNode::Element(el) => Some(el),
            DomNode::Text(_) => None,
        }
    }

    pub fn is_blank_text(&self) -> bool {
        matches!(self, DomNode::Text(t) if t.chars().all(char::is_whitespace))
    }
}

fn collect_text(nodes: &[DomNode], out: &mut String) {
    for node in nodes {
        match node {
            DomNode::Text(t) => out.push_str(t),
            DomNode::Element(el) => collect_text(&el.children, out),
        }
    }
}

/// Copy the children of `root` into owned nodes, leaving out elements whose
/// id is in `skip` or whose tag is in `drop_tags`. Comments and processing
/// instructions are always dropped.
pub(crate) fn copy_children(
    root: ElementRef,
    skip: &HashSet<NodeId>,
    drop_tags: &[&str],
) -> Vec<DomNode> {
    root.children()
        .filter_map(|child| copy_node(child, skip, drop_tags))
        .collect()
}

fn copy_node(node: NodeRef<Node>, skip: &HashSet<NodeId>, drop_tags: &[&str]) -> Option<DomNode> {
    match node.value() {
        Node::Text(text) => Some(DomNode::Text(text.to_string())),
        Node::Element(element) => {
            if skip.contains(&node.id()) {
                return None;
            }
            let name = element.name().to_ascii_lowercase();
            if drop_tags.contains(&name.as_str()) {
                return None;
            }
            let mut attrs: Vec<(String, String)> = element
                .attrs()
                .map(|(k, v)| (k.to_ascii_lowercase(), v.to_string()))
                .collect();
            // Attribute storage order is not guaranteed; output must be stable.
            attrs.sort_by(|a, b| a.0.cmp(&b.0));
            let element_ref = ElementRef::wrap(node)?;
            Some(DomNode::Element(DomElement {
                name,
                attrs,
                children: copy_children(element_ref, skip, drop_tags),
            }))
        }
        _ => None,
    }
}

/// Parse an HTML fragment into owned nodes.
pub(crate) fn parse_fragment(html: &str) -> Vec<DomNode> {
    let fragment = Html::parse_fragment(html);
    copy_children(fragment.root_element(), &HashSet::new(), &[])
}

/// Serialize through html5ever, which owns escaping and void-element rules.
pub(crate) fn serialize(nodes: &[DomNode]) -> String {
    let opts = SerializeOpts {
        traversal_scope: TraversalScope::ChildrenOnly(None),
        ..SerializeOpts::default()
    };
    let mut out = Vec::new();
    if let Err(err) = html5ever::serialize::serialize(&mut out, &Fragment(nodes), opts) {
        engine_warn!("HTML serialization stopped early: {}", err);
    }
    String::from_utf8_lossy(&out).into_owned()
}

struct Fragment<'a>(&'a [DomNode]);

impl Serialize for Fragment<'_> {
    fn serialize<S: Serializer>(&self, serializer: &mut S, _scope: TraversalScope) -> io::Result<()> {
        self.0.iter().try_for_each(|node| write_node(node, serializer))
    }
}

fn write_node<S: Serializer>(node: &DomNode, serializer: &mut S) -> io::Result<()> {
    match node {
        DomNode::Text(text) => serializer.write_text(text),
        DomNode::Element(el) => {
            let name = QualName::new(None, ns!(html), LocalName::from(el.name.as_str()));
            let attrs: Vec<(QualName, &str)> = el
                .attrs
                .iter()
                .map(|(k, v)| (QualName::new(None, ns!(), LocalName::from(k.as_str())), v.as_str()))
                .collect();
            serializer.start_elem(name.clone(), attrs.iter().map(|(k, v)| (k, *v)))?;
            for child in &el.children {
                write_node(child, serializer)?;
            }
            serializer.end_elem(name)
        }
    }
}

/// Visit every element depth-first, parents before children.
pub(crate) fn walk_mut(nodes: &mut [DomNode], visit: &mut dyn FnMut(&mut DomElement)) {
    for node in nodes {
        if let DomNode::Element(el) = node {
            visit(el);
            walk_mut(&mut el.children, visit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragment_round_trips_simple_markup() {
        let nodes = parse_fragment(r#"<p class="a">x &amp; y<br><img src="i.png" alt="q&quot;"></p>"#);
        assert_eq!(
            serialize(&nodes),
            r#"<p class="a">x &amp; y<br><img alt="q&quot;" src="i.png"></p>"#
        );
    }

    #[test]
    fn text_escaping_keeps_entities_and_void_tags_stay_open() {
        let mut nodes = parse_fragment("<p>a&lt;b&nbsp;c &gt; d</p>");
        if let DomNode::Element(p) = &mut nodes[0] {
            p.children.push(DomNode::Element(DomElement::new("br")));
        }
        assert_eq!(serialize(&nodes), "<p>a&lt;b&nbsp;c &gt; d<br></p>");
    }

    #[test]
    fn skip_set_and_drop_tags_remove_elements() {
        let doc = Html::parse_document("<body><p>keep</p><script>x()</script><!-- c --></body>");
        let body = doc
            .select(&scraper::Selector::parse("body").unwrap())
            .next()
            .unwrap();
        let nodes = copy_children(body, &HashSet::new(), &["script"]);
        assert_eq!(serialize(&nodes), "<p>keep</p>");
    }
}
