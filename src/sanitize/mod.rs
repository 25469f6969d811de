//! # Sanitizer
//!
//! The security boundary. A BIMI logo is rendered inside mail clients, so it
//! must never run code and never make the client fetch anything. This pass
//! runs unconditionally before any other stage looks at the content and
//! removes:
//!
//! - script-capable elements (`script`, SVG Tiny `handler`/`listener`)
//! - animation elements (`set`/`animate*` can rewrite `href` at runtime)
//! - foreign and embedded non-graphics content (`foreignObject`, `iframe`, ...)
//! - `image`/`feImage` whose source is not a self-contained raster payload
//! - `use` elements pointing outside the document
//! - `on*` event-handler attributes, `javascript:` links and links out of
//!   the document
//! - `@import` rules, and any `url()` that points outside the document, in
//!   attributes, inline styles and `<style>` blocks
//! - every comment
//!
//! Sanitizing never fails. A document with nothing to remove comes back
//! unchanged.

use base64::Engine;
use tracing::debug;

use crate::model::{Document, Element, Node};

/// Elements that can execute code.
pub const SCRIPT_ELEMENTS: &[&str] = &["script", "handler", "listener"];

/// Elements that animate attributes, including `href`.
pub const ANIMATION_ELEMENTS: &[&str] = &["animate", "animateColor", "animateMotion", "animateTransform", "set"];

/// Foreign or embedded content with no place in a vector logo.
pub const FOREIGN_ELEMENTS: &[&str] = &[
    "foreignObject",
    "iframe",
    "embed",
    "object",
    "audio",
    "video",
    "canvas",
];

/// What the sanitizer removed, by category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SanitizeReport {
    pub scripts: usize,
    pub animations: usize,
    pub foreign: usize,
    pub external_references: usize,
    pub event_handlers: usize,
    pub comments: usize,
}

impl SanitizeReport {
    pub fn total(&self) -> usize {
        self.scripts
            + self.animations
            + self.foreign
            + self.external_references
            + self.event_handlers
            + self.comments
    }
}

/// Sanitize a document, consuming it and returning the filtered tree.
pub fn sanitize(mut doc: Document) -> (Document, SanitizeReport) {
    let mut report = SanitizeReport::default();
    clean_element(&mut doc.root, &mut report);
    filter_children(&mut doc.root, &mut report);
    debug!(
        removed = report.total(),
        scripts = report.scripts,
        foreign = report.foreign,
        external = report.external_references,
        "sanitized document"
    );
    (doc, report)
}

fn filter_children(el: &mut Element, report: &mut SanitizeReport) {
    el.children.retain(|child| match child {
        Node::Comment(_) => {
            report.comments += 1;
            false
        }
        Node::Text(_) => true,
        Node::Element(e) => match classify(e) {
            Some(Removal::Script) => {
                report.scripts += 1;
                false
            }
            Some(Removal::Animation) => {
                report.animations += 1;
                false
            }
            Some(Removal::Foreign) => {
                report.foreign += 1;
                false
            }
            Some(Removal::ExternalReference) => {
                report.external_references += 1;
                false
            }
            None => true,
        },
    });

    for child in el.child_elements_mut() {
        clean_element(child, report);
        filter_children(child, report);
    }
}

enum Removal {
    Script,
    Animation,
    Foreign,
    ExternalReference,
}

fn classify(el: &Element) -> Option<Removal> {
    let name = el.local_name();
    if SCRIPT_ELEMENTS.contains(&name) {
        return Some(Removal::Script);
    }
    if ANIMATION_ELEMENTS.contains(&name) {
        return Some(Removal::Animation);
    }
    if FOREIGN_ELEMENTS.contains(&name) {
        return Some(Removal::Foreign);
    }
    match name {
        "image" | "feImage" => {
            let embedded = el.href().is_some_and(is_embedded_raster);
            // feImage may also point at an element inside the document.
            let local = name == "feImage" && el.href().is_some_and(is_fragment);
            (!embedded && !local).then_some(Removal::ExternalReference)
        }
        "use" => match el.href() {
            Some(href) if !is_fragment(href) => Some(Removal::ExternalReference),
            _ => None,
        },
        _ => None,
    }
}

/// Drop event handlers, `javascript:` links and external `url()` references
/// from a single element, and external references from `<style>` text.
fn clean_element(el: &mut Element, report: &mut SanitizeReport) {
    let mut handlers = 0;
    let mut external = 0;
    // Embedded payloads on these were already vetted by `classify`.
    let keeps_href = el.is("image") || el.is("feImage");
    el.attributes.retain(|key, value| {
        let local = crate::model::local_name(key);
        if local.len() > 2 && local.get(..2).is_some_and(|p| p.eq_ignore_ascii_case("on")) {
            handlers += 1;
            return false;
        }
        if local == "href" && is_javascript(value) {
            handlers += 1;
            return false;
        }
        if local == "href" && !keeps_href && !is_fragment(value) {
            external += 1;
            return false;
        }
        if local == "style" {
            let (kept, removed) = strip_css_references(value);
            if removed == 0 {
                return true;
            }
            external += removed;
            *value = kept;
            return !value.trim().is_empty();
        }
        if url_targets(value).iter().any(|t| !is_fragment(t)) {
            external += 1;
            return false;
        }
        true
    });

    if el.is("style") {
        for child in &mut el.children {
            if let Node::Text(text) = child {
                let (kept, removed) = strip_css_references(text);
                if removed > 0 {
                    external += removed;
                    *text = kept;
                }
            }
        }
    }

    report.event_handlers += handlers;
    report.external_references += external;
}

/// Remove `@import` rules and every declaration with a non-fragment `url()`
/// from CSS text. Returns the kept text and the number of removals.
fn strip_css_references(css: &str) -> (String, usize) {
    let mut out = String::with_capacity(css.len());
    let mut removed = 0;
    let mut rest = css;
    while !rest.is_empty() {
        let end = rest.find([';', '{', '}']).map_or(rest.len(), |i| i + 1);
        let (piece, tail) = rest.split_at(end);
        rest = tail;

        let (body, delimiter) = match piece.as_bytes().last() {
            Some(b';' | b'{' | b'}') => piece.split_at(piece.len() - 1),
            _ => (piece, ""),
        };
        let import = body.to_ascii_lowercase().contains("@import");
        if import || url_targets(body).iter().any(|t| !is_fragment(t)) {
            removed += 1;
            // Keep block structure balanced.
            if delimiter != ";" {
                out.push_str(delimiter);
            }
        } else {
            out.push_str(piece);
        }
    }
    (out, removed)
}

/// Targets of every `url(...)` in `value`, unquoted. The match is
/// case-insensitive and an unclosed `url(` runs to the end of the value.
pub fn url_targets(value: &str) -> Vec<&str> {
    let lower = value.to_ascii_lowercase();
    let mut out = Vec::new();
    let mut from = 0;
    while let Some(found) = lower[from..].find("url(") {
        let start = from + found + 4;
        let end = lower[start..].find(')').map_or(value.len(), |i| start + i);
        out.push(value[start..end].trim().trim_matches(|c| c == '"' || c == '\''));
        from = (end + 1).min(value.len());
    }
    out
}

/// A same-document reference such as `#logo`.
pub fn is_fragment(reference: &str) -> bool {
    reference.trim_start().starts_with('#')
}

fn is_javascript(value: &str) -> bool {
    let compact: String = value
        .chars()
        .filter(|c| !c.is_ascii_whitespace() && !c.is_ascii_control())
        .collect();
    compact.to_ascii_lowercase().starts_with("javascript:")
}

/// True when `src` is a `data:image/...;base64,` URI whose payload decodes
/// and carries the magic bytes of a raster format mail clients can show.
///
/// Embedded SVG is rejected: it is a second document that could carry script.
pub fn is_embedded_raster(src: &str) -> bool {
    let src = src.trim();
    let Some(rest) = src.strip_prefix("data:image/") else {
        return false;
    };
    let Some((header, payload)) = rest.split_once(',') else {
        return false;
    };
    if !header.ends_with(";base64") || header.starts_with("svg") {
        return false;
    }
    let payload: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    match base64::engine::general_purpose::STANDARD.decode(payload) {
        Ok(bytes) => is_png(&bytes) || is_jpeg(&bytes) || is_gif(&bytes) || is_webp(&bytes),
        Err(_) => false,
    }
}

fn is_png(data: &[u8]) -> bool {
    data.starts_with(&[0x89, 0x50, 0x4E, 0x47])
}

fn is_jpeg(data: &[u8]) -> bool {
    data.starts_with(&[0xFF, 0xD8])
}

fn is_gif(data: &[u8]) -> bool {
    data.starts_with(b"GIF8")
}

fn is_webp(data: &[u8]) -> bool {
    data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{parse, serialize};

    /// 1x1 transparent PNG.
    const PNG_1X1: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAQAAAC1HAwCAAAAC0lEQVR42mNkYAAAAAYAAjCB0C8AAAAASUVORK5CYII=";

    fn run(markup: &str) -> (String, SanitizeReport) {
        let (doc, report) = sanitize(parse(markup).unwrap());
        (serialize(&doc), report)
    }

    #[test]
    fn test_removes_script_anywhere() {
        let (out, report) =
            run("<svg><script>alert(1)</script><g><script>alert(2)</script><rect/></g></svg>");
        assert!(!out.contains("script"));
        assert!(out.contains("<rect/>"));
        assert_eq!(report.scripts, 2);
    }

    #[test]
    fn test_removes_foreign_object() {
        let (out, report) = run(
            r#"<svg><foreignObject><div xmlns="http://www.w3.org/1999/xhtml">x</div></foreignObject></svg>"#,
        );
        assert!(!out.contains("foreignObject"));
        assert_eq!(report.foreign, 1);
    }

    #[test]
    fn test_removes_external_image_keeps_embedded() {
        let markup = format!(
            r#"<svg xmlns:xlink="http://www.w3.org/1999/xlink"><image href="https://evil.example/a.png"/><image xlink:href="data:image/png;base64,{PNG_1X1}"/></svg>"#
        );
        let (out, report) = run(&markup);
        assert!(!out.contains("evil.example"));
        assert!(out.contains("data:image/png;base64,"));
        assert_eq!(report.external_references, 1);
    }

    #[test]
    fn test_rejects_embedded_svg_and_bad_payloads() {
        assert!(!is_embedded_raster("data:image/svg+xml;base64,PHN2Zy8+"));
        assert!(!is_embedded_raster("data:image/png;base64,!!!notbase64"));
        assert!(!is_embedded_raster("data:image/png,rawbytes"));
        assert!(!is_embedded_raster("logo.png"));
        assert!(is_embedded_raster(&format!("data:image/png;base64,{PNG_1X1}")));
    }

    #[test]
    fn test_image_without_href_is_removed() {
        let (out, _) = run("<svg><image width=\"10\" height=\"10\"/></svg>");
        assert!(!out.contains("<image"));
    }

    #[test]
    fn test_removes_comments() {
        let (out, report) = run("<svg><!-- a --><g><!-- b --></g></svg>");
        assert!(!out.contains("<!--"));
        assert_eq!(report.comments, 2);
    }

    #[test]
    fn test_strips_event_handlers_and_javascript_links() {
        let (out, report) = run(
            r#"<svg onload="alert(1)"><a href=" java script:alert(1)"><rect onclick="x()" fill="red"/></a></svg>"#,
        );
        assert!(!out.contains("onload"));
        assert!(!out.contains("onclick"));
        assert!(!out.contains("javascript"));
        assert!(out.contains(r#"fill="red""#));
        assert_eq!(report.event_handlers, 3);
    }

    #[test]
    fn test_removes_animation_and_external_use() {
        let (out, report) = run(
            r##"<svg><a href="#x"><set attributeName="href" to="javascript:alert(1)"/></a><use href="other.svg#logo"/><use href="#logo"/></svg>"##,
        );
        assert!(!out.contains("<set"));
        assert!(!out.contains("other.svg"));
        assert!(out.contains(r##"<use href="#logo"/>"##));
        assert_eq!(report.animations, 1);
        assert_eq!(report.external_references, 1);
    }

    #[test]
    fn test_strips_external_css_references() {
        let (out, report) = run(
            r##"<svg><style>@import url(https://t.example/x.css); .a { fill: url(#g); stroke: URL( 'https://t.example/p.svg#s' ) } .b { fill: red }</style><rect class="a" style="fill:url(https://evil.example/p.svg#g) red; stroke: blue"/><circle fill="url(//evil.example/g)"/><path fill="url(#ok)"/></svg>"##,
        );
        assert!(!out.contains("example"), "{out}");
        assert!(!out.contains("@import"));
        assert!(out.contains(".a { fill: url(#g);}"), "{out}");
        assert!(out.contains(".b { fill: red }"));
        assert!(out.contains(r#"style=" stroke: blue""#), "{out}");
        assert!(out.contains("<circle/>"));
        assert!(out.contains(r##"<path fill="url(#ok)"/>"##));
        assert_eq!(report.external_references, 4);
    }

    #[test]
    fn test_strips_outbound_links() {
        let (out, report) = run(r##"<svg><a href="https://brand.example"><rect/></a><a href="#top"><rect/></a></svg>"##);
        assert!(!out.contains("brand.example"));
        assert!(out.contains(r##"<a href="#top">"##));
        assert_eq!(report.external_references, 1);
    }

    #[test]
    fn test_url_targets() {
        assert_eq!(url_targets(r#"url(#a) url( "b.svg" ) URL('c')"#), vec!["#a", "b.svg", "c"]);
        assert_eq!(url_targets("url(https://x/a;b"), vec!["https://x/a;b"]);
        assert!(url_targets("red").is_empty());
    }

    #[test]
    fn test_clean_document_unchanged() {
        let markup = r#"<svg viewBox="0 0 10 10"><rect width="10" height="10" fill="blue"/></svg>"#;
        let doc = parse(markup).unwrap();
        let (clean, report) = sanitize(doc.clone());
        assert_eq!(clean, doc);
        assert_eq!(report.total(), 0);
    }
}
