//! # Validator
//!
//! Checks a document against the BIMI logo profile. Findings are data, not
//! failures: errors block BIMI eligibility, warnings are advisory. Rules run
//! in a fixed order so reports read the same way every time:
//!
//! 1. structural: one root, square viewBox, no rasters, scripts, foreign
//!    content, external references, event handlers or animation
//! 2. background: an opaque primitive covering the canvas
//! 3. safe area: content stays inside the padded square
//! 4. accessibility: a non-empty `<title>`
//! 5. size: a canvas of at least one unit
//! 6. profile: `baseProfile="tiny-ps"`, `version="1.2"`, file size
//!
//! The validator works on any document, including hand-authored ones, and
//! never panics on malformed input.

use serde::Serialize;
use tracing::debug;

use crate::geometry::{parse_view_box, resolve_length, BoundingBox, Frame, MeasurementContext, DEFAULT_BUDGET};
use crate::layout::SafeArea;
use crate::model::{parse, Document, Element};
use crate::options::ValidateOptions;
use crate::sanitize::{is_fragment, url_targets, ANIMATION_ELEMENTS, FOREIGN_ELEMENTS, SCRIPT_ELEMENTS};
use crate::style::color::{parse_paint, Paint};
use crate::style::css;

/// Recommended maximum size of a BIMI logo file.
pub const MAX_RECOMMENDED_BYTES: usize = 32 * 1024;

/// Slack for the advisory geometric rules, in canvas units.
const TOLERANCE: f64 = 0.5;

/// Ordered conformance findings.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// No blocking errors. Warnings do not affect validity.
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }
}

/// Validate markup. Unparseable input yields a single structural error.
pub fn validate_markup(markup: &str, options: &ValidateOptions) -> ValidationResult {
    let mut result = match parse(markup) {
        Ok(doc) => validate(&doc, options),
        Err(e) => {
            let mut result = ValidationResult::default();
            result.error(format!("document is not a well-formed SVG: {e}"));
            return result;
        }
    };
    if markup.len() > MAX_RECOMMENDED_BYTES {
        result.warning(format!(
            "document is {} bytes; BIMI recommends at most {} bytes",
            markup.len(),
            MAX_RECOMMENDED_BYTES
        ));
    }
    result
}

/// Validate a parsed document.
pub fn validate(doc: &Document, options: &ValidateOptions) -> ValidationResult {
    let mut result = ValidationResult::default();
    let root = &doc.root;

    let canvas = check_structure(root, &mut result);
    if let Some(canvas) = canvas {
        check_background(root, &canvas, &mut result);
        check_safe_area(doc, &canvas, options.padding_percent, &mut result);
    }
    check_title(root, &mut result);
    if let Some(canvas) = canvas {
        if canvas.width() < 1.0 || canvas.height() < 1.0 {
            result.error(format!(
                "canvas is {}x{} units; it must be at least 1x1",
                canvas.width(),
                canvas.height()
            ));
        }
    }
    check_profile(root, &mut result);

    debug!(
        errors = result.errors.len(),
        warnings = result.warnings.len(),
        "validated document"
    );
    result
}

/// Structural rules. Returns the canvas when the viewBox is usable.
fn check_structure(root: &Element, result: &mut ValidationResult) -> Option<BoundingBox> {
    let all: Vec<&Element> = std::iter::once(root).chain(root.descendants()).collect();

    let nested = all.iter().skip(1).filter(|e| e.is("svg")).count();
    if nested > 0 {
        result.error(format!(
            "document must have exactly one <svg> root; found {nested} nested <svg> element(s)"
        ));
    }

    let canvas = match root.attr("viewBox") {
        None => {
            result.error("root <svg> has no viewBox");
            None
        }
        Some(vb) => match view_box_any_size(vb) {
            None => {
                result.error(format!("viewBox \"{vb}\" is malformed"));
                None
            }
            Some(b) => {
                if (b.width() - b.height()).abs() > 1e-9 {
                    result.error(format!(
                        "viewBox must be square; it is {}x{}",
                        b.width(),
                        b.height()
                    ));
                }
                Some(b)
            }
        },
    };

    let rasters = all.iter().filter(|e| e.is("image") || e.is("feImage")).count();
    if rasters > 0 {
        result.error(format!("{rasters} raster image element(s) found; BIMI logos must be pure vector"));
    }

    if all.iter().any(|e| SCRIPT_ELEMENTS.contains(&e.local_name())) {
        result.error("script elements are not allowed");
    }

    let foreign = all.iter().filter(|e| FOREIGN_ELEMENTS.contains(&e.local_name())).count();
    if foreign > 0 {
        result.error(format!("{foreign} foreign content block(s) found (foreignObject or embedded media)"));
    }

    let external: Vec<String> = all.iter().flat_map(|e| external_references(e)).collect();
    if let Some(first) = external.first() {
        result.error(format!(
            "{} external reference(s) found, first: {first}",
            external.len()
        ));
    }

    let handlers = all
        .iter()
        .flat_map(|e| e.attributes.keys())
        .filter(|k| is_event_handler(k))
        .count();
    if handlers > 0 {
        result.error(format!("{handlers} event handler attribute(s) found"));
    }

    if all.iter().any(|e| ANIMATION_ELEMENTS.contains(&e.local_name())) {
        result.error("animation elements are not allowed");
    }

    canvas
}

/// Like [`parse_view_box`], but keeps zero and tiny sizes so the size rule
/// can report them.
fn view_box_any_size(value: &str) -> Option<BoundingBox> {
    if let Some(b) = parse_view_box(value) {
        return Some(b);
    }
    let nums: Vec<f64> = value
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<f64>().ok().filter(|v| v.is_finite()))
        .collect::<Option<_>>()?;
    match nums.as_slice() {
        &[x, y, w, h] if w >= 0.0 && h >= 0.0 => Some(BoundingBox::from_rect(x, y, w, h)),
        _ => None,
    }
}

fn is_event_handler(key: &str) -> bool {
    let local = crate::model::local_name(key);
    local.len() > 2 && local.get(..2).is_some_and(|p| p.eq_ignore_ascii_case("on"))
}

/// References on one element that would make a client fetch something.
fn external_references(el: &Element) -> Vec<String> {
    let mut out = Vec::new();
    if !el.is("image") && !el.is("feImage") {
        if let Some(href) = el.href() {
            if !is_fragment(href) {
                out.push(format!("<{} href=\"{}\">", el.name, href.trim()));
            }
        }
    }
    for (key, value) in &el.attributes {
        for target in url_targets(value) {
            if !is_fragment(target) {
                out.push(format!("{key}=\"url({target})\" on <{}>", el.name));
            }
        }
    }
    if el.is("style") {
        let sheet = el.text_content();
        if sheet.to_ascii_lowercase().contains("@import") {
            out.push("@import in <style>".to_string());
        }
        for target in url_targets(&sheet) {
            if !is_fragment(target) && !target.starts_with("data:") {
                out.push(format!("url({target}) in <style>"));
            }
        }
    }
    out
}

/// Elements that can be the background: drawn, top-level, not metadata.
fn first_drawable(root: &Element) -> Option<&Element> {
    root.child_elements().find(|e| {
        !matches!(e.local_name(), "title" | "desc" | "defs" | "style" | "metadata" | "script") && !e.name.contains(':')
    })
}

fn check_background(root: &Element, canvas: &BoundingBox, result: &mut ValidationResult) {
    let Some(bg) = first_drawable(root).filter(|e| covers_canvas(e, canvas)) else {
        result.error("no solid background covering the canvas (expected a full-canvas <rect> or <circle> before the content)");
        return;
    };

    let fill = bg.attr("fill").map(str::to_string).or_else(|| {
        bg.attr("style").and_then(|s| {
            css::parse_declarations(s)
                .into_iter()
                .find(|d| d.property == "fill")
                .map(|d| d.value)
        })
    });

    match fill.as_deref().map(parse_paint) {
        // Unset fill paints black.
        None => {}
        Some(Some(Paint::Color(c))) if c.is_opaque() => {}
        Some(Some(Paint::Color(c))) => result.error(format!(
            "background must be fully opaque; its fill has opacity {}",
            crate::layout::format_number(c.a)
        )),
        Some(Some(Paint::None)) => {
            result.error("background fill is none; it must be a solid opaque color (transparent backgrounds are not allowed)")
        }
        Some(Some(Paint::Server { .. })) => {
            result.warning("background uses a paint server; a solid color is recommended")
        }
        Some(Some(Paint::CurrentColor | Paint::Inherit)) => {
            result.warning("background color depends on inherited values; a solid color is recommended")
        }
        Some(None) => result.error(format!(
            "background fill \"{}\" is not a recognized color",
            fill.as_deref().unwrap_or_default()
        )),
    }

    for key in ["opacity", "fill-opacity"] {
        if let Some(v) = bg.attr(key).and_then(|v| v.trim().parse::<f64>().ok()) {
            if v < 1.0 {
                result.error(format!("background must be fully opaque; {key} is {v}"));
            }
        }
    }
}

fn covers_canvas(el: &Element, canvas: &BoundingBox) -> bool {
    if el.has_attr("transform") {
        return false;
    }
    let (w, h) = (canvas.width(), canvas.height());
    let len = |key: &str, reference: f64| {
        el.attr(key)
            .map_or(Some(0.0), |v| resolve_length(v, reference, 16.0))
    };
    let tol = 1e-6 * w.max(h).max(1.0);
    match el.local_name() {
        "rect" => {
            let (Some(x), Some(y), Some(rw), Some(rh)) = (len("x", w), len("y", h), len("width", w), len("height", h)) else {
                return false;
            };
            x <= canvas.min_x + tol
                && y <= canvas.min_y + tol
                && x + rw >= canvas.max_x - tol
                && y + rh >= canvas.max_y - tol
        }
        "circle" => {
            let diagonal = ((w * w + h * h) / 2.0).sqrt();
            let (Some(cx), Some(cy), Some(r)) = (len("cx", w), len("cy", h), len("r", diagonal)) else {
                return false;
            };
            let (ccx, ccy) = canvas.center();
            (cx - ccx).abs() <= 0.01 * w
                && (cy - ccy).abs() <= 0.01 * h
                && r >= w.min(h) / 2.0 - tol
        }
        _ => false,
    }
}

fn check_safe_area(doc: &Document, canvas: &BoundingBox, padding_percent: f64, result: &mut ValidationResult) {
    let background = first_drawable(&doc.root).filter(|e| covers_canvas(e, canvas));
    let mut ctx = MeasurementContext::new(doc, DEFAULT_BUDGET);
    let mut content: Option<BoundingBox> = None;
    for child in doc.root.child_elements() {
        if background.is_some_and(|bg| std::ptr::eq(bg, child)) {
            continue;
        }
        match ctx.measure(child, &Frame::default()) {
            Ok(Some(b)) => content = Some(content.map_or(b, |c| c.union(&b))),
            Ok(None) => {}
            Err(e) => {
                result.warning(format!("content could not be measured: {e}"));
                return;
            }
        }
    }
    let Some(content) = content else {
        return;
    };

    if !canvas.contains(&content, TOLERANCE) {
        result.warning("content extends outside the canvas");
        return;
    }
    let size = canvas.width().min(canvas.height());
    let safe = SafeArea::new(size, padding_percent.clamp(0.0, 45.0));
    let safe_box = BoundingBox::new(
        canvas.min_x + safe.min,
        canvas.min_y + safe.min,
        canvas.min_x + safe.max,
        canvas.min_y + safe.max,
    );
    if !safe_box.contains(&content, TOLERANCE) {
        result.warning(format!(
            "content extends outside the {}% safe area",
            crate::layout::format_number(padding_percent)
        ));
    }
}

fn check_title(root: &Element, result: &mut ValidationResult) {
    match root.child_elements().find(|e| e.is("title")) {
        None => result.warning("missing <title>; mail clients use it as the accessible name"),
        Some(t) if t.text_content().trim().is_empty() => result.warning("<title> is empty"),
        Some(_) => {}
    }
}

fn check_profile(root: &Element, result: &mut ValidationResult) {
    if root.attr("baseProfile").map(str::trim) != Some("tiny-ps") {
        result.warning("root should declare baseProfile=\"tiny-ps\"");
    }
    if root.attr("version").map(str::trim) != Some("1.2") {
        result.warning("root should declare version=\"1.2\"");
    }
    if root.has_attr("x") || root.has_attr("y") {
        result.warning("root should not carry x or y attributes");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" version="1.2" baseProfile="tiny-ps" viewBox="0 0 100 100"><title>Acme</title><circle cx="50" cy="50" r="50" fill="#fff"/><g transform="translate(25 25)"><rect width="50" height="50" fill="blue"/></g></svg>"##;

    fn check(markup: &str) -> ValidationResult {
        validate_markup(markup, &ValidateOptions::default())
    }

    #[test]
    fn test_canonical_document_is_clean() {
        let result = check(GOOD);
        assert!(result.is_valid(), "{:?}", result.errors);
        assert!(result.warnings.is_empty(), "{:?}", result.warnings);
    }

    #[test]
    fn test_unparseable_markup_is_one_error() {
        let result = check("<html><body/></html>");
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("well-formed SVG"));
        assert_eq!(check("").errors.len(), 1);
    }

    #[test]
    fn test_script_reported_once() {
        let markup = GOOD.replace("<title>", "<script>alert(1)</script><script/><title>");
        let result = check(&markup);
        let scripts: Vec<_> = result.errors.iter().filter(|e| e.contains("script")).collect();
        assert_eq!(scripts.len(), 1);
    }

    #[test]
    fn test_view_box_rules() {
        let result = check(&GOOD.replace("0 0 100 100", "0 0 100 50"));
        assert!(result.errors.iter().any(|e| e.contains("square")));
        let result = check(&GOOD.replace(r#" viewBox="0 0 100 100""#, ""));
        assert!(result.errors.iter().any(|e| e.contains("no viewBox")));
        let result = check(&GOOD.replace("0 0 100 100", "0 0 0 0"));
        assert!(result.errors.iter().any(|e| e.contains("at least 1x1")));
    }

    #[test]
    fn test_transparent_background_is_error() {
        let result = check(&GOOD.replace(r##"fill="#fff""##, r#"fill="transparent""#));
        assert!(result.errors.iter().any(|e| e.contains("opaque")));
        let result = check(&GOOD.replace(r##"fill="#fff""##, r#"fill="none""#));
        assert!(result.errors.iter().any(|e| e.contains("transparent")));
        let result = check(&GOOD.replace(r##"fill="#fff""##, r##"fill="#fff" opacity="0.5""##));
        assert!(result.errors.iter().any(|e| e.contains("opacity")));
    }

    #[test]
    fn test_missing_background_is_error() {
        let markup = GOOD.replace(r##"<circle cx="50" cy="50" r="50" fill="#fff"/>"##, "");
        assert!(check(&markup).errors.iter().any(|e| e.contains("background")));
        let small = GOOD.replace(r#"r="50""#, r#"r="20""#);
        assert!(check(&small).errors.iter().any(|e| e.contains("background")));
    }

    #[test]
    fn test_rect_background_accepted() {
        let markup = GOOD.replace(
            r##"<circle cx="50" cy="50" r="50" fill="#fff"/>"##,
            r##"<rect width="100" height="100" rx="20" fill="rgb(255,255,255)"/>"##,
        );
        assert!(check(&markup).is_valid());
    }

    #[test]
    fn test_forbidden_content_errors() {
        let markup = GOOD.replace(
            "<title>",
            r#"<image href="https://x.test/a.png"/><foreignObject/><use href="https://x.test/b.svg#c"/><set attributeName="fill"/><title>"#,
        )
        .replace("<rect ", r#"<rect onclick="go()" "#);
        let result = check(&markup);
        let joined = result.errors.join("\n");
        assert!(joined.contains("raster image"));
        assert!(joined.contains("foreign content"));
        assert!(joined.contains("external reference"));
        assert!(joined.contains("event handler"));
        assert!(joined.contains("animation"));
    }

    #[test]
    fn test_external_url_in_paint_and_style() {
        let markup = GOOD.replace(r#"fill="blue""#, r#"fill="url(https://x.test/p.svg#g)""#);
        assert!(check(&markup).errors.iter().any(|e| e.contains("external reference")));
        let markup = GOOD.replace("<title>", r#"<style>@import "x.css";</style><title>"#);
        assert!(check(&markup).errors.iter().any(|e| e.contains("external reference")));
        let markup = GOOD.replace(r#"fill="blue""#, r#"fill="url(#grad)""#);
        assert!(check(&markup).is_valid());
    }

    #[test]
    fn test_safe_area_warning() {
        let markup = GOOD.replace("translate(25 25)", "translate(2 2)");
        let result = check(&markup);
        assert!(result.is_valid());
        assert!(result.warnings.iter().any(|w| w.contains("safe area")));
        let markup = GOOD.replace("translate(25 25)", "translate(80 80)");
        assert!(check(&markup).warnings.iter().any(|w| w.contains("outside the canvas")));
    }

    #[test]
    fn test_title_warnings() {
        let result = check(&GOOD.replace("<title>Acme</title>", ""));
        assert!(result.warnings.iter().any(|w| w.contains("missing <title>")));
        let result = check(&GOOD.replace("<title>Acme</title>", "<title> </title>"));
        assert!(result.warnings.iter().any(|w| w.contains("empty")));
    }

    #[test]
    fn test_profile_warnings() {
        let markup = GOOD.replace(r#" version="1.2" baseProfile="tiny-ps""#, r#" x="0""#);
        let result = check(&markup);
        assert!(result.is_valid());
        assert_eq!(result.warnings.len(), 3);
    }

    #[test]
    fn test_oversized_markup_warning() {
        let padding = format!("<desc>{}</desc>", "x".repeat(MAX_RECOMMENDED_BYTES));
        let result = check(&GOOD.replace("<title>", &format!("{padding}<title>")));
        assert!(result.warnings.iter().any(|w| w.contains("bytes")));
    }
}
