//! # Document Model
//!
//! An owned, acyclic tree of SVG markup. A [`Document`] owns exactly one root
//! [`Element`]; every element owns its children outright. There are no parent
//! pointers and no shared nodes, so cloning a subtree is a deep copy and a
//! document can be handed to another thread without ceremony.
//!
//! Cross references inside SVG (`href="#logo"`, `fill="url(#grad)"`) are name
//! lookups, not ownership edges. They are served by [`IdIndex`], a borrowed
//! secondary index built on demand.
//!
//! ```text
//!   markup ──[parse]──▶ Document ──[write]──▶ markup
//! ```

pub mod parse;
pub mod write;

use std::collections::HashMap;

use indexmap::IndexMap;

pub use parse::parse;
pub use write::serialize;

/// Ordered attribute map. Keys are qualified names (`xlink:href`) and unique.
pub type Attributes = IndexMap<String, String>;

/// Deepest element nesting [`parse`] accepts. Real logos stay far below it.
pub const MAX_DEPTH: usize = 256;

/// The SVG namespace URI.
pub const SVG_NS: &str = "http://www.w3.org/2000/svg";

/// A parsed markup document with a single `<svg>` root.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub root: Element,
}

/// A node in the tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
    Comment(String),
}

/// An element: tag name, attributes, ordered children.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    /// Qualified tag name as written in the source (`svg`, `sodipodi:namedview`).
    pub name: String,
    pub attributes: Attributes,
    pub children: Vec<Node>,
}

impl Document {
    pub fn new(root: Element) -> Self {
        Document { root }
    }

    /// Build the `id → element` lookup for this document.
    pub fn id_index(&self) -> IdIndex<'_> {
        IdIndex::build(&self.root)
    }
}

impl Node {
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_element_mut(&mut self) -> Option<&mut Element> {
        match self {
            Node::Element(e) => Some(e),
            _ => None,
        }
    }
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Element {
            name: name.into(),
            attributes: Attributes::new(),
            children: Vec::new(),
        }
    }

    /// Builder-style attribute setter.
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Builder-style child append.
    pub fn with_child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    /// The tag name without any namespace prefix.
    pub fn local_name(&self) -> &str {
        local_name(&self.name)
    }

    /// True when the local tag name equals `name`.
    pub fn is(&self, name: &str) -> bool {
        self.local_name() == name
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn has_attr(&self, key: &str) -> bool {
        self.attributes.contains_key(key)
    }

    /// Insert or replace an attribute, keeping its original position if present.
    pub fn set_attr(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(key.into(), value.into());
    }

    /// Remove an attribute, preserving the order of the rest.
    pub fn remove_attr(&mut self, key: &str) -> Option<String> {
        self.attributes.shift_remove(key)
    }

    /// The `href` of this element, preferring the SVG 2 spelling.
    pub fn href(&self) -> Option<&str> {
        self.attr("href").or_else(|| self.attr("xlink:href"))
    }

    /// Parse an attribute as a plain number (`"12"`, `"12.5px"`).
    pub fn attr_f64(&self, key: &str) -> Option<f64> {
        self.attr(key).and_then(parse_number)
    }

    /// Class names from the `class` attribute, in source order.
    pub fn class_names(&self) -> impl Iterator<Item = &str> {
        self.attr("class")
            .unwrap_or_default()
            .split_ascii_whitespace()
    }

    /// Direct element children, skipping text and comments.
    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(Node::as_element)
    }

    pub fn child_elements_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        self.children.iter_mut().filter_map(Node::as_element_mut)
    }

    /// All descendant elements in document order, excluding `self`.
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants {
            stack: self.child_elements().collect::<Vec<_>>().into_iter().rev().collect(),
        }
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out
    }

    /// Visit `self` and every descendant element mutably, parents first.
    pub fn walk_mut(&mut self, f: &mut impl FnMut(&mut Element)) {
        f(self);
        for child in self.child_elements_mut() {
            child.walk_mut(f);
        }
    }
}

fn collect_text(el: &Element, out: &mut String) {
    for child in &el.children {
        match child {
            Node::Text(t) => out.push_str(t),
            Node::Element(e) => collect_text(e, out),
            Node::Comment(_) => {}
        }
    }
}

/// Depth-first, document-order iterator over descendant elements.
pub struct Descendants<'a> {
    stack: Vec<&'a Element>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a Element;

    fn next(&mut self) -> Option<Self::Item> {
        let el = self.stack.pop()?;
        let mark = self.stack.len();
        self.stack.extend(el.child_elements());
        self.stack[mark..].reverse();
        Some(el)
    }
}

/// Borrowed `id → element` index. First occurrence of a duplicated id wins,
/// matching how renderers resolve `getElementById`.
#[derive(Debug, Default)]
pub struct IdIndex<'a> {
    by_id: HashMap<&'a str, &'a Element>,
}

impl<'a> IdIndex<'a> {
    pub fn build(root: &'a Element) -> Self {
        let mut by_id = HashMap::new();
        for el in std::iter::once(root).chain(root.descendants()) {
            if let Some(id) = el.attr("id") {
                by_id.entry(id).or_insert(el);
            }
        }
        IdIndex { by_id }
    }

    pub fn get(&self, id: &str) -> Option<&'a Element> {
        self.by_id.get(id).copied()
    }

    /// Resolve a same-document fragment reference such as `#logo`.
    pub fn resolve_fragment(&self, reference: &str) -> Option<&'a Element> {
        reference.trim().strip_prefix('#').and_then(|id| self.get(id))
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// Strip a namespace prefix from a qualified name.
pub fn local_name(qualified: &str) -> &str {
    qualified.rsplit_once(':').map_or(qualified, |(_, local)| local)
}

/// Parse a leading number from an SVG length or number attribute.
///
/// Accepts a trailing `px` unit. Percentages and other units are rejected;
/// callers that understand them resolve them separately.
pub fn parse_number(s: &str) -> Option<f64> {
    let s = s.trim();
    let s = s.strip_suffix("px").unwrap_or(s).trim_end();
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}
