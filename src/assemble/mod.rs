//! # Document Assembler
//!
//! Builds the canonical document around the source artwork:
//!
//! ```text
//! <svg viewBox="0 0 100 100" ...>      root, tiny-ps profile
//!   <title>                            from options, when set
//!   <defs> ...                         copied verbatim
//!   <style> ...                        copied verbatim
//!   <circle|rect id="bimi-background"> opaque background
//!   <g id="bimi-content" transform>    the untouched content
//! </svg>
//! ```
//!
//! The background is always emitted before the content so the content paints
//! on top. A document that already has this shape is recognized: its old
//! background is dropped and its content group unwrapped, so converting the
//! output again yields the same document.

use tracing::{debug, warn};

use crate::geometry::transform::parse_transform;
use crate::geometry::Frame;
use crate::layout::{format_number, Transform, CANVAS_SIZE};
use crate::model::{Attributes, Document, Element, Node, SVG_NS};
use crate::options::{ConvertOptions, Shape};
use crate::style::PRESENTATION_ATTRIBUTES;

pub const BACKGROUND_ID: &str = "bimi-background";
pub const CONTENT_ID: &str = "bimi-content";

/// Corner radius of the rounded-square background, as a fraction of the canvas.
const CORNER_RADIUS: f64 = 0.2;

/// Top-level elements that describe the document rather than draw it.
const DOCUMENT_METADATA: &[&str] = &["title", "desc", "metadata"];

/// The source document split into the parts the canonical layout needs.
#[derive(Debug, Clone, PartialEq)]
pub struct Content {
    /// `xmlns:*` declarations from the source root.
    pub namespaces: Attributes,
    pub defs: Vec<Element>,
    pub styles: Vec<Element>,
    /// A group holding the drawable content and the presentation attributes
    /// it inherited from the source root.
    pub body: Element,
    /// Transform the source root applied to everything, if any.
    pub root_transform: Option<String>,
}

impl Content {
    /// The frame the body is drawn in before the planned transform.
    pub fn frame(&self) -> Frame {
        let ctm = self
            .root_transform
            .as_deref()
            .and_then(|t| parse_transform(t).ok())
            .unwrap_or_default();
        Frame::new(ctm)
    }
}

/// Split the source root into definitions, styles and drawable content.
pub fn extract_content(root: &Element) -> Content {
    let mut content = Content {
        namespaces: Attributes::new(),
        defs: Vec::new(),
        styles: Vec::new(),
        body: Element::new("g"),
        root_transform: None,
    };

    for (key, value) in &root.attributes {
        if key.starts_with("xmlns:") {
            content.namespaces.insert(key.clone(), value.clone());
        } else if key == "transform" {
            push_transform(&mut content.root_transform, value);
        } else if is_inherited(key) {
            content.body.set_attr(key.clone(), value.clone());
        }
    }

    for child in &root.children {
        let Node::Element(el) = child else {
            content.body.children.push(child.clone());
            continue;
        };
        match el.attr("id") {
            Some(BACKGROUND_ID) => continue,
            Some(CONTENT_ID) if el.is("g") => {
                unwrap_previous_content(el, &mut content);
                continue;
            }
            _ => {}
        }
        if el.is("defs") {
            content.defs.push(el.clone());
        } else if el.is("style") {
            content.styles.push(el.clone());
        } else if DOCUMENT_METADATA.contains(&el.local_name()) || is_editor_element(el) {
            debug!(element = %el.name, "dropping top-level metadata");
        } else {
            content.body.children.push(child.clone());
        }
    }

    if let Some(t) = &content.root_transform {
        if parse_transform(t).is_err() {
            warn!(transform = %t, "ignoring unparseable root transform");
            content.root_transform = None;
        }
    }
    content
}

/// Presentation attributes on the root that descendants inherit.
fn is_inherited(key: &str) -> bool {
    key != "transform"
        && key != "display"
        && (PRESENTATION_ATTRIBUTES.contains(&key) || matches!(key, "style" | "class" | "xml:space"))
}

/// Editor bookkeeping such as `sodipodi:namedview`.
fn is_editor_element(el: &Element) -> bool {
    el.name.contains(':') && !el.name.starts_with("svg:")
}

fn push_transform(slot: &mut Option<String>, t: &str) {
    let t = t.trim();
    if t.is_empty() {
        return;
    }
    *slot = Some(match slot.take() {
        Some(existing) => format!("{existing} {t}"),
        None => t.to_string(),
    });
}

/// Take the children and attributes of a content group from an earlier run.
fn unwrap_previous_content(group: &Element, content: &mut Content) {
    for (key, value) in &group.attributes {
        match key.as_str() {
            "id" => {}
            "transform" => {
                let rest = strip_planned_prefix(value).unwrap_or(value);
                push_transform(&mut content.root_transform, rest);
            }
            _ => {
                if !content.body.has_attr(key) {
                    content.body.set_attr(key.clone(), value.clone());
                }
            }
        }
    }
    content.body.children.extend(group.children.iter().cloned());
    debug!("unwrapped content group from a previous conversion");
}

/// Drop the leading `translate(..) scale(..)` written by [`Transform::to_attribute`].
fn strip_planned_prefix(t: &str) -> Option<&str> {
    let rest = t.trim_start().strip_prefix("translate(")?;
    let rest = &rest[rest.find(')')? + 1..];
    let rest = rest.trim_start().strip_prefix("scale(")?;
    Some(rest[rest.find(')')? + 1..].trim())
}

/// The background primitive for `shape`.
pub fn background(shape: Shape, color: &str) -> Element {
    let half = format_number(CANVAS_SIZE / 2.0);
    let full = format_number(CANVAS_SIZE);
    match shape {
        Shape::Circle => Element::new("circle")
            .with_attr("id", BACKGROUND_ID)
            .with_attr("cx", half.clone())
            .with_attr("cy", half.clone())
            .with_attr("r", half)
            .with_attr("fill", color.trim()),
        Shape::RoundedSquare => {
            let radius = format_number(CANVAS_SIZE * CORNER_RADIUS);
            Element::new("rect")
                .with_attr("id", BACKGROUND_ID)
                .with_attr("x", "0")
                .with_attr("y", "0")
                .with_attr("width", full.clone())
                .with_attr("height", full)
                .with_attr("rx", radius.clone())
                .with_attr("ry", radius)
                .with_attr("fill", color.trim())
        }
    }
}

/// Build the canonical document.
pub fn assemble(content: Content, transform: &Transform, options: &ConvertOptions) -> Document {
    let size = format_number(CANVAS_SIZE);
    let mut root = Element::new("svg")
        .with_attr("xmlns", SVG_NS)
        .with_attr("version", "1.2")
        .with_attr("baseProfile", "tiny-ps");
    for (key, value) in content.namespaces {
        root.set_attr(key, value);
    }
    root.set_attr("viewBox", format!("0 0 {size} {size}"));
    root.set_attr("width", size.clone());
    root.set_attr("height", size);

    if let Some(title) = options.title() {
        root.children.push(Node::Element(
            Element::new("title").with_child(Node::Text(title.to_string())),
        ));
    }
    root.children.extend(content.defs.into_iter().map(Node::Element));
    root.children.extend(content.styles.into_iter().map(Node::Element));
    root.children.push(Node::Element(background(
        options.shape,
        &options.background_color,
    )));

    let mut transform_attr = transform.to_attribute();
    if let Some(extra) = &content.root_transform {
        transform_attr.push(' ');
        transform_attr.push_str(extra);
    }
    let mut group = Element::new("g")
        .with_attr("id", CONTENT_ID)
        .with_attr("transform", transform_attr);
    group.attributes.extend(content.body.attributes);
    group.children = content.body.children;
    root.children.push(Node::Element(group));

    Document::new(root)
}
