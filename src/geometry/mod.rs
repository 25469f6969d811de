//! # Geometry Resolver
//!
//! Analytic bounding boxes for SVG content, composed through the transform
//! chain from the measured subtree down to each leaf.
//!
//! Measurement degrades in tiers instead of failing:
//!
//! ```text
//!   whole subtree ──fail──▶ each child on its own ──fail──▶ leaf excluded
//!                                                              │
//!                  nothing measurable anywhere ──▶ None (undefined box)
//! ```
//!
//! "Fail" means the subtree holds something that cannot be measured, such as
//! broken path data, an unparseable transform or a recursive `<use>`. Only
//! running out of the step budget aborts the whole computation.
//!
//! Boxes are fill geometry. Stroke width is not included, the same as a
//! renderer's `getBBox()`.

pub mod path;
pub mod text;
pub mod transform;

use tracing::{debug, warn};

use crate::error::MeasurementTimeout;
use crate::model::{Document, Element, IdIndex, Node, MAX_DEPTH};

use path::{ellipse_segments, parse_path, path_bounds, Scanner};
use text::Face;
use transform::{parse_transform, Matrix};

/// Default number of elements the resolver may visit for one conversion.
pub const DEFAULT_BUDGET: usize = 200_000;

/// Axis-aligned box. Always `max >= min` on both axes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    /// Build a box from two corners in any order.
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        BoundingBox {
            min_x: x0.min(x1),
            min_y: y0.min(y1),
            max_x: x0.max(x1),
            max_y: y0.max(y1),
        }
    }

    pub fn from_rect(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self::new(x, y, x + width, y + height)
    }

    pub fn point(x: f64, y: f64) -> Self {
        Self::new(x, y, x, y)
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    pub fn include(&mut self, x: f64, y: f64) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    /// Box of the four transformed corners.
    pub fn transform(&self, m: &Matrix) -> BoundingBox {
        let corners = [
            m.apply(self.min_x, self.min_y),
            m.apply(self.max_x, self.min_y),
            m.apply(self.min_x, self.max_y),
            m.apply(self.max_x, self.max_y),
        ];
        let mut out = BoundingBox::point(corners[0].0, corners[0].1);
        for (x, y) in &corners[1..] {
            out.include(*x, *y);
        }
        out
    }

    /// True when `other` lies inside `self`, allowing `tolerance` slack.
    pub fn contains(&self, other: &BoundingBox, tolerance: f64) -> bool {
        other.min_x >= self.min_x - tolerance
            && other.min_y >= self.min_y - tolerance
            && other.max_x <= self.max_x + tolerance
            && other.max_y <= self.max_y + tolerance
    }

    pub fn is_finite(&self) -> bool {
        [self.min_x, self.min_y, self.max_x, self.max_y]
            .iter()
            .all(|v| v.is_finite())
    }
}

fn union(acc: Option<BoundingBox>, next: Option<BoundingBox>) -> Option<BoundingBox> {
    match (acc, next) {
        (Some(a), Some(b)) => Some(a.union(&b)),
        (a, b) => a.or(b),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAnchor {
    Start,
    Middle,
    End,
}

/// Everything a leaf needs from its ancestors: the current transform matrix
/// and the inherited text properties.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    pub ctm: Matrix,
    pub font_size: f64,
    pub font_weight: u32,
    pub anchor: TextAnchor,
}

impl Frame {
    pub fn new(ctm: Matrix) -> Self {
        Frame {
            ctm,
            font_size: 16.0,
            font_weight: 400,
            anchor: TextAnchor::Start,
        }
    }

    fn then(&self, m: &Matrix) -> Frame {
        Frame {
            ctm: self.ctm.multiply(m),
            ..*self
        }
    }
}

impl Default for Frame {
    fn default() -> Self {
        Frame::new(Matrix::IDENTITY)
    }
}

/// Elements that never paint on their own.
const NON_RENDERING: &[&str] = &[
    "defs",
    "symbol",
    "clipPath",
    "mask",
    "pattern",
    "linearGradient",
    "radialGradient",
    "filter",
    "marker",
    "style",
    "script",
    "title",
    "desc",
    "metadata",
];

fn is_rendered(el: &Element) -> bool {
    !NON_RENDERING.contains(&el.local_name()) && el.attr("display").map(str::trim) != Some("none")
}

/// Recursion limit for one measurement, counted across `<use>` expansion.
const MAX_NESTING: usize = MAX_DEPTH + 64;

/// Why a subtree could not be measured in one piece.
enum Failure {
    Unmeasurable(String),
    Timeout,
}

impl From<String> for Failure {
    fn from(reason: String) -> Self {
        Failure::Unmeasurable(reason)
    }
}

/// Per-conversion measurement state. Created for one document, used for one
/// conversion, then dropped; it is never shared.
pub struct MeasurementContext<'a> {
    ids: IdIndex<'a>,
    viewport: (f64, f64),
    budget: usize,
    steps: usize,
    depth: usize,
    use_stack: Vec<String>,
}

impl<'a> MeasurementContext<'a> {
    /// A context for `doc`. Percent lengths resolve against the root
    /// viewport: its viewBox size, else `width`/`height`, else 100×100.
    pub fn new(doc: &'a Document, budget: usize) -> Self {
        let viewport = source_frame(&doc.root)
            .map(|b| (b.width(), b.height()))
            .unwrap_or((100.0, 100.0));
        MeasurementContext {
            ids: doc.id_index(),
            viewport,
            budget,
            steps: 0,
            depth: 0,
            use_stack: Vec::new(),
        }
    }

    /// Elements visited so far.
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Measure `el` as drawn in `frame`. `Ok(None)` is the undefined box.
    pub fn measure(&mut self, el: &Element, frame: &Frame) -> Result<Option<BoundingBox>, MeasurementTimeout> {
        if self.depth >= MAX_NESTING {
            warn!(element = %el.name, "excluding element nested too deep");
            return Ok(None);
        }
        self.depth += 1;
        let result = match self.whole(el, frame) {
            Ok(b) => Ok(b),
            Err(Failure::Timeout) => Err(MeasurementTimeout { budget: self.budget }),
            Err(Failure::Unmeasurable(reason)) => {
                debug!(element = %el.name, %reason, "measuring children separately");
                self.per_child(el, frame, &reason)
            }
        };
        self.depth -= 1;
        result
    }

    /// Union of the boxes of `el`'s children, each measured through the full
    /// ladder. `el`'s own transform is not applied.
    pub fn measure_children(
        &mut self,
        el: &Element,
        frame: &Frame,
    ) -> Result<Option<BoundingBox>, MeasurementTimeout> {
        let mut acc = None;
        for child in el.child_elements() {
            acc = union(acc, self.measure(child, frame)?);
        }
        Ok(acc)
    }

    fn per_child(
        &mut self,
        el: &Element,
        frame: &Frame,
        reason: &str,
    ) -> Result<Option<BoundingBox>, MeasurementTimeout> {
        let container = matches!(el.local_name(), "g" | "a" | "switch" | "svg" | "use");
        let entered = if container { self.enter(el, frame).ok() } else { None };
        let Some(inner) = entered else {
            warn!(element = %el.name, %reason, "excluding unmeasurable element");
            return Ok(None);
        };

        if el.is("use") {
            let Some((target, frame)) = self.use_target(el, &inner).ok().flatten() else {
                warn!(element = %el.name, %reason, "excluding unmeasurable element");
                return Ok(None);
            };
            let id = el.href().unwrap_or_default().trim().to_string();
            self.use_stack.push(id);
            let result = if target.is("symbol") {
                self.measure_children(target, &frame)
            } else {
                self.measure(target, &frame)
            };
            self.use_stack.pop();
            return result;
        }

        if el.is("switch") {
            return match el.child_elements().find(|c| is_rendered(c)) {
                Some(child) => self.measure(child, &inner),
                None => Ok(None),
            };
        }

        let inner = if el.is("svg") {
            inner.then(&nested_viewport(el, self.viewport))
        } else {
            inner
        };
        self.measure_children(el, &inner)
    }

    fn tick(&mut self) -> Result<(), Failure> {
        self.steps += 1;
        if self.steps > self.budget {
            return Err(Failure::Timeout);
        }
        Ok(())
    }

    /// Strict measurement: any unmeasurable descendant fails the subtree.
    fn whole(&mut self, el: &Element, frame: &Frame) -> Result<Option<BoundingBox>, Failure> {
        self.tick()?;
        if self.depth >= MAX_NESTING {
            return Err(Failure::Unmeasurable("nested too deep".to_string()));
        }
        self.depth += 1;
        let result = self.whole_element(el, frame);
        self.depth -= 1;
        result
    }

    fn whole_element(&mut self, el: &Element, frame: &Frame) -> Result<Option<BoundingBox>, Failure> {
        if !is_rendered(el) {
            return Ok(None);
        }
        let frame = self.enter(el, frame)?;

        match el.local_name() {
            "g" | "a" => self.whole_children(el, &frame),
            "switch" => match el.child_elements().find(|c| is_rendered(c)) {
                Some(child) => self.whole(child, &frame),
                None => Ok(None),
            },
            "svg" => {
                let inner = frame.then(&nested_viewport(el, self.viewport));
                self.whole_children(el, &inner)
            }
            "use" => self.whole_use(el, &frame),
            "rect" | "image" | "foreignObject" => self.rect_bounds(el, &frame),
            "circle" => {
                let r = self.length(el, "r", self.diagonal(), &frame)?.unwrap_or(0.0);
                self.ellipse_bounds(el, r, r, &frame)
            }
            "ellipse" => {
                let rx = self.length(el, "rx", self.viewport.0, &frame)?;
                let ry = self.length(el, "ry", self.viewport.1, &frame)?;
                let (rx, ry) = match (rx, ry) {
                    (Some(rx), Some(ry)) => (rx, ry),
                    (Some(r), None) | (None, Some(r)) => (r, r),
                    (None, None) => (0.0, 0.0),
                };
                self.ellipse_bounds(el, rx, ry, &frame)
            }
            "line" => {
                let x1 = self.length(el, "x1", self.viewport.0, &frame)?.unwrap_or(0.0);
                let y1 = self.length(el, "y1", self.viewport.1, &frame)?.unwrap_or(0.0);
                let x2 = self.length(el, "x2", self.viewport.0, &frame)?.unwrap_or(0.0);
                let y2 = self.length(el, "y2", self.viewport.1, &frame)?.unwrap_or(0.0);
                let (ax, ay) = frame.ctm.apply(x1, y1);
                let (bx, by) = frame.ctm.apply(x2, y2);
                Ok(Some(BoundingBox::new(ax, ay, bx, by)))
            }
            "polyline" | "polygon" => points_bounds(el.attr("points").unwrap_or_default(), &frame.ctm),
            "path" => {
                let Some(d) = el.attr("d") else {
                    return Ok(None);
                };
                let segments = parse_path(d).map_err(|e| e.to_string())?;
                Ok(path_bounds(&segments, &frame.ctm))
            }
            "text" => self.text_bounds(el, &frame),
            _ => Ok(None),
        }
    }

    fn whole_children(&mut self, el: &Element, frame: &Frame) -> Result<Option<BoundingBox>, Failure> {
        let mut acc = None;
        for child in el.child_elements() {
            acc = union(acc, self.whole(child, frame)?);
        }
        Ok(acc)
    }

    /// Apply `el`'s own transform and text properties on top of `frame`.
    fn enter(&self, el: &Element, frame: &Frame) -> Result<Frame, String> {
        let mut out = *frame;
        if let Some(t) = el.attr("transform") {
            let m = parse_transform(t).map_err(|e| e.to_string())?;
            out.ctm = out.ctm.multiply(&m);
            if !out.ctm.is_finite() {
                return Err("transform is not finite".to_string());
            }
        }
        if let Some(size) = el.attr("font-size").and_then(|v| font_size(v, frame.font_size)) {
            out.font_size = size;
        }
        if let Some(weight) = el.attr("font-weight") {
            out.font_weight = text::parse_weight(weight, frame.font_weight);
        }
        match el.attr("text-anchor").map(str::trim) {
            Some("middle") => out.anchor = TextAnchor::Middle,
            Some("end") => out.anchor = TextAnchor::End,
            Some("start") => out.anchor = TextAnchor::Start,
            _ => {}
        }
        Ok(out)
    }

    fn diagonal(&self) -> f64 {
        let (w, h) = self.viewport;
        ((w * w + h * h) / 2.0).sqrt()
    }

    /// Resolve a length attribute. Missing is `Ok(None)`, unparseable fails.
    fn length(&self, el: &Element, name: &str, reference: f64, frame: &Frame) -> Result<Option<f64>, Failure> {
        match el.attr(name) {
            None => Ok(None),
            Some(v) => resolve_length(v, reference, frame.font_size)
                .map(Some)
                .ok_or_else(|| Failure::Unmeasurable(format!("invalid {name}=\"{v}\""))),
        }
    }

    fn rect_bounds(&self, el: &Element, frame: &Frame) -> Result<Option<BoundingBox>, Failure> {
        let x = self.length(el, "x", self.viewport.0, frame)?.unwrap_or(0.0);
        let y = self.length(el, "y", self.viewport.1, frame)?.unwrap_or(0.0);
        let w = self.length(el, "width", self.viewport.0, frame)?.unwrap_or(0.0);
        let h = self.length(el, "height", self.viewport.1, frame)?.unwrap_or(0.0);
        if w < 0.0 || h < 0.0 {
            return Err(Failure::Unmeasurable(format!("negative size on <{}>", el.name)));
        }
        if w == 0.0 || h == 0.0 {
            return Ok(None);
        }
        Ok(Some(BoundingBox::from_rect(x, y, w, h).transform(&frame.ctm)))
    }

    fn ellipse_bounds(&self, el: &Element, rx: f64, ry: f64, frame: &Frame) -> Result<Option<BoundingBox>, Failure> {
        if rx < 0.0 || ry < 0.0 {
            return Err(Failure::Unmeasurable(format!("negative radius on <{}>", el.name)));
        }
        if rx == 0.0 || ry == 0.0 {
            return Ok(None);
        }
        let cx = self.length(el, "cx", self.viewport.0, frame)?.unwrap_or(0.0);
        let cy = self.length(el, "cy", self.viewport.1, frame)?.unwrap_or(0.0);
        // Axis-aligned frames have an exact closed form.
        if frame.ctm.b == 0.0 && frame.ctm.c == 0.0 {
            return Ok(Some(BoundingBox::new(cx - rx, cy - ry, cx + rx, cy + ry).transform(&frame.ctm)));
        }
        Ok(path_bounds(&ellipse_segments(cx, cy, rx, ry), &frame.ctm))
    }

    fn whole_use(&mut self, el: &Element, frame: &Frame) -> Result<Option<BoundingBox>, Failure> {
        let Some((target, inner)) = self.use_target(el, frame)? else {
            return Ok(None);
        };
        self.use_stack.push(el.href().unwrap_or_default().trim().to_string());
        let result = if target.is("symbol") {
            self.whole_children(target, &inner)
        } else {
            self.whole(target, &inner)
        };
        self.use_stack.pop();
        result
    }

    /// The element a `<use>` draws and the frame it is drawn in.
    fn use_target(&self, el: &Element, frame: &Frame) -> Result<Option<(&'a Element, Frame)>, Failure> {
        let Some(href) = el.href().map(str::trim) else {
            return Ok(None);
        };
        if self.use_stack.iter().any(|h| h == href) {
            return Err(Failure::Unmeasurable(format!("recursive reference to {href}")));
        }
        let Some(target) = self.ids.resolve_fragment(href) else {
            return Ok(None);
        };
        let x = self.length(el, "x", self.viewport.0, frame)?.unwrap_or(0.0);
        let y = self.length(el, "y", self.viewport.1, frame)?.unwrap_or(0.0);
        Ok(Some((target, frame.then(&Matrix::translate(x, y)))))
    }

    fn text_bounds(&self, el: &Element, frame: &Frame) -> Result<Option<BoundingBox>, Failure> {
        let mut pen = (
            first_coordinate(el.attr("x"), self.viewport.0, frame.font_size).unwrap_or(0.0),
            first_coordinate(el.attr("y"), self.viewport.1, frame.font_size).unwrap_or(0.0),
        );
        let mut acc = None;
        self.text_runs(el, frame, &mut pen, &mut acc)?;
        Ok(acc)
    }

    fn text_runs(
        &self,
        el: &Element,
        frame: &Frame,
        pen: &mut (f64, f64),
        acc: &mut Option<BoundingBox>,
    ) -> Result<(), Failure> {
        for child in &el.children {
            match child {
                Node::Text(t) => {
                    let run = text::collapse_whitespace(t);
                    if run.is_empty() {
                        continue;
                    }
                    let face = Face::for_weight(frame.font_weight);
                    let width = face.text_width(&run, frame.font_size);
                    let start = match frame.anchor {
                        TextAnchor::Start => pen.0,
                        TextAnchor::Middle => pen.0 - width / 2.0,
                        TextAnchor::End => pen.0 - width,
                    };
                    let local = BoundingBox::new(
                        start,
                        pen.1 - face.ascent(frame.font_size),
                        start + width,
                        pen.1 + face.descent(frame.font_size),
                    );
                    *acc = union(*acc, Some(local.transform(&frame.ctm)));
                    pen.0 = start + width;
                }
                Node::Element(span) if is_rendered(span) && matches!(span.local_name(), "tspan" | "textPath" | "a") => {
                    let inner = self.enter(span, frame)?;
                    if let Some(x) = first_coordinate(span.attr("x"), self.viewport.0, inner.font_size) {
                        pen.0 = x;
                    }
                    if let Some(y) = first_coordinate(span.attr("y"), self.viewport.1, inner.font_size) {
                        pen.1 = y;
                    }
                    pen.0 += first_coordinate(span.attr("dx"), self.viewport.0, inner.font_size).unwrap_or(0.0);
                    pen.1 += first_coordinate(span.attr("dy"), self.viewport.1, inner.font_size).unwrap_or(0.0);
                    self.text_runs(span, &inner, pen, acc)?;
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// The source document's own coordinate frame: its viewBox, else its
/// `width`/`height` from the origin. `None` when neither is usable.
pub fn source_frame(root: &Element) -> Option<BoundingBox> {
    if let Some(vb) = root.attr("viewBox").and_then(parse_view_box) {
        return Some(vb);
    }
    let w = root.attr("width").and_then(absolute_length)?;
    let h = root.attr("height").and_then(absolute_length)?;
    (w > 0.0 && h > 0.0).then(|| BoundingBox::from_rect(0.0, 0.0, w, h))
}

/// Parse `min-x min-y width height`. Non-positive sizes are rejected.
pub fn parse_view_box(value: &str) -> Option<BoundingBox> {
    let mut sc = Scanner::new(value);
    let mut nums = [0.0; 4];
    for n in &mut nums {
        *n = sc.number()?;
    }
    sc.skip_separators();
    if !sc.at_end() || nums[2] <= 0.0 || nums[3] <= 0.0 {
        return None;
    }
    Some(BoundingBox::from_rect(nums[0], nums[1], nums[2], nums[3]))
}

/// Matrix placing a nested `<svg>` viewport: `x`/`y` offset, then a
/// `xMidYMid meet` fit of its viewBox into its `width`/`height`.
fn nested_viewport(el: &Element, parent: (f64, f64)) -> Matrix {
    let x = el.attr("x").and_then(|v| resolve_length(v, parent.0, 16.0)).unwrap_or(0.0);
    let y = el.attr("y").and_then(|v| resolve_length(v, parent.1, 16.0)).unwrap_or(0.0);
    let offset = Matrix::translate(x, y);
    let Some(vb) = el.attr("viewBox").and_then(parse_view_box) else {
        return offset;
    };
    let w = el.attr("width").and_then(|v| resolve_length(v, parent.0, 16.0)).unwrap_or(parent.0);
    let h = el.attr("height").and_then(|v| resolve_length(v, parent.1, 16.0)).unwrap_or(parent.1);
    if w <= 0.0 || h <= 0.0 {
        return offset;
    }
    let s = (w / vb.width()).min(h / vb.height());
    let tx = (w - vb.width() * s) / 2.0 - vb.min_x * s;
    let ty = (h - vb.height() * s) / 2.0 - vb.min_y * s;
    offset
        .multiply(&Matrix::translate(tx, ty))
        .multiply(&Matrix::scale(s, s))
}

fn points_bounds(points: &str, ctm: &Matrix) -> Result<Option<BoundingBox>, Failure> {
    let mut sc = Scanner::new(points);
    let mut acc: Option<BoundingBox> = None;
    loop {
        sc.skip_separators();
        if sc.at_end() {
            break;
        }
        let Some(x) = sc.number() else {
            return Err(Failure::Unmeasurable(format!("bad points list at offset {}", sc.pos)));
        };
        // An odd trailing coordinate is ignored.
        let Some(y) = sc.number() else {
            break;
        };
        let (px, py) = ctm.apply(x, y);
        match acc.as_mut() {
            Some(b) => b.include(px, py),
            None => acc = Some(BoundingBox::point(px, py)),
        }
    }
    Ok(acc)
}

/// Resolve an SVG length with units against a percentage reference.
pub fn resolve_length(value: &str, reference: f64, font_size: f64) -> Option<f64> {
    let value = value.trim();
    let mut sc = Scanner::new(value);
    let n = sc.number()?;
    let factor = match value[sc.pos..].trim() {
        "" | "px" => 1.0,
        "%" => reference / 100.0,
        "pt" => 4.0 / 3.0,
        "pc" => 16.0,
        "mm" => 96.0 / 25.4,
        "cm" => 96.0 / 2.54,
        "in" => 96.0,
        "em" => font_size,
        "ex" => font_size / 2.0,
        _ => return None,
    };
    let out = n * factor;
    out.is_finite().then_some(out)
}

/// A length without a percentage reference (root `width`/`height`).
fn absolute_length(value: &str) -> Option<f64> {
    if value.trim().ends_with('%') {
        return None;
    }
    resolve_length(value, 0.0, 16.0)
}

fn font_size(value: &str, inherited: f64) -> Option<f64> {
    let size = resolve_length(value, inherited, inherited)?;
    (size >= 0.0).then_some(size)
}

/// First entry of a coordinate list such as `x="10 20 30"`.
fn first_coordinate(value: Option<&str>, reference: f64, font_size: f64) -> Option<f64> {
    let first = value?.split(|c: char| c == ',' || c.is_whitespace()).find(|s| !s.is_empty())?;
    resolve_length(first, reference, font_size)
}
