//! # Layout Planner
//!
//! Decides where the artwork goes on the 100-unit canvas.
//!
//! ## The Problem
//!
//! Source logos arrive in every coordinate system imaginable: a 2000×400
//! Illustrator artboard with the mark in one corner, a 24×24 icon grid, a
//! viewBox that starts at negative coordinates. Rewriting every coordinate in
//! the artwork would break gradients (`gradientUnits="userSpaceOnUse"`),
//! filters and relative path data.
//!
//! ## How It Works
//!
//! The content is never rewritten. We measure it, then compute a single
//! uniform scale plus a translation that puts the box's center on the center
//! of the safe area. The assembler wraps the untouched content in one group
//! carrying that transform.
//!
//! When there is nothing to measure, the source frame is centered on the
//! canvas at scale 1. Degenerate input passes through; it never produces a
//! NaN or an infinite scale.

use serde::Serialize;
use tracing::debug;

use crate::geometry::transform::Matrix;
use crate::geometry::BoundingBox;

/// Logical size of the canonical canvas.
pub const CANVAS_SIZE: f64 = 100.0;

/// The padded square inside the canvas where content must fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SafeArea {
    pub min: f64,
    pub max: f64,
}

impl SafeArea {
    pub fn new(canvas: f64, padding_percent: f64) -> Self {
        let min = canvas * padding_percent / 100.0;
        SafeArea {
            min,
            max: canvas - min,
        }
    }

    /// Width and height; the area is always square.
    pub fn size(&self) -> f64 {
        self.max - self.min
    }

    pub fn center(&self) -> f64 {
        (self.min + self.max) / 2.0
    }

    pub fn as_box(&self) -> BoundingBox {
        BoundingBox::new(self.min, self.min, self.max, self.max)
    }
}

/// Scale plus translation, applied as `translate(...) scale(...)`.
///
/// The planner only ever emits uniform scales; the separate axes exist so
/// the type can describe any transform of this shape.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transform {
    pub scale_x: f64,
    pub scale_y: f64,
    pub translate_x: f64,
    pub translate_y: f64,
}

impl Transform {
    pub fn identity() -> Self {
        Transform {
            scale_x: 1.0,
            scale_y: 1.0,
            translate_x: 0.0,
            translate_y: 0.0,
        }
    }

    pub fn is_uniform(&self) -> bool {
        (self.scale_x - self.scale_y).abs() <= f64::EPSILON * self.scale_x.abs().max(1.0)
    }

    pub fn to_matrix(&self) -> Matrix {
        Matrix::translate(self.translate_x, self.translate_y)
            .multiply(&Matrix::scale(self.scale_x, self.scale_y))
    }

    pub fn apply_box(&self, b: &BoundingBox) -> BoundingBox {
        b.transform(&self.to_matrix())
    }

    /// Render as an SVG `transform` attribute value.
    pub fn to_attribute(&self) -> String {
        let translate = format!(
            "translate({} {})",
            format_number(self.translate_x),
            format_number(self.translate_y)
        );
        if self.is_uniform() {
            format!("{translate} scale({})", format_number(self.scale_x))
        } else {
            format!(
                "{translate} scale({} {})",
                format_number(self.scale_x),
                format_number(self.scale_y)
            )
        }
    }
}

/// Fit `content` into the safe area of a `canvas`-sized square.
///
/// `source_frame` is the input's own coordinate frame (viewBox, else
/// width/height); it is centered unscaled when `content` is undefined or has
/// no area.
pub fn plan(
    content: Option<BoundingBox>,
    canvas: f64,
    padding_percent: f64,
    source_frame: Option<BoundingBox>,
) -> Transform {
    let safe = SafeArea::new(canvas, padding_percent);

    let measurable = content.filter(|b| b.is_finite() && b.width() > 1e-9 && b.height() > 1e-9);
    let Some(b) = measurable else {
        let frame = source_frame
            .filter(BoundingBox::is_finite)
            .unwrap_or_else(|| BoundingBox::new(0.0, 0.0, canvas, canvas));
        let t = Transform {
            scale_x: 1.0,
            scale_y: 1.0,
            translate_x: (canvas - frame.width()) / 2.0 - frame.min_x,
            translate_y: (canvas - frame.height()) / 2.0 - frame.min_y,
        };
        debug!(transform = %t.to_attribute(), "no measurable content, centering source frame");
        return t;
    };

    let scale = (safe.size() / b.width()).min(safe.size() / b.height());
    let (cx, cy) = b.center();
    let t = Transform {
        scale_x: scale,
        scale_y: scale,
        translate_x: safe.center() - cx * scale,
        translate_y: safe.center() - cy * scale,
    };
    debug!(
        width = b.width(),
        height = b.height(),
        scale,
        "planned content transform"
    );
    t
}

/// Format a number for markup: at most four decimals, no trailing zeros,
/// never `-0`.
pub fn format_number(v: f64) -> String {
    let rounded = (v * 10_000.0).round() / 10_000.0;
    if rounded == 0.0 {
        return "0".to_string();
    }
    let s = format!("{rounded:.4}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    s.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_safe_area() {
        let safe = SafeArea::new(100.0, 12.5);
        assert!(close(safe.min, 12.5));
        assert!(close(safe.max, 87.5));
        assert!(close(safe.size(), 75.0));
        assert!(close(safe.center(), 50.0));
    }

    #[test]
    fn test_plan_circle_logo() {
        let t = plan(Some(BoundingBox::new(5.0, 5.0, 45.0, 45.0)), 100.0, 12.5, None);
        assert!(close(t.scale_x, 1.875));
        assert!(close(t.translate_x, 3.125));
        assert!(close(t.translate_y, 3.125));
        assert_eq!(t.to_attribute(), "translate(3.125 3.125) scale(1.875)");
    }

    #[test]
    fn test_plan_preserves_aspect_ratio() {
        let b = BoundingBox::new(0.0, 0.0, 400.0, 100.0);
        let t = plan(Some(b), 100.0, 10.0, None);
        assert!(t.is_uniform());
        let placed = t.apply_box(&b);
        assert!(close(placed.width(), 80.0));
        assert!(close(placed.height(), 20.0));
        assert!(close(placed.center().0, 50.0) && close(placed.center().1, 50.0));
    }

    #[test]
    fn test_plan_contains_within_safe_area() {
        for padding in [0.0, 1.0, 12.5, 25.0, 45.0] {
            let b = BoundingBox::new(-37.0, 12.0, 1200.0, 19.5);
            let placed = plan(Some(b), 100.0, padding, None).apply_box(&b);
            assert!(SafeArea::new(100.0, padding).as_box().contains(&placed, 1e-9));
        }
    }

    #[test]
    fn test_undefined_box_centers_source_frame() {
        let frame = BoundingBox::new(0.0, 0.0, 50.0, 50.0);
        let t = plan(None, 100.0, 12.5, Some(frame));
        assert_eq!(t.scale_x, 1.0);
        assert!(close(t.translate_x, 25.0));
        assert!(close(t.translate_y, 25.0));
    }

    #[test]
    fn test_zero_area_box_falls_back() {
        let line = BoundingBox::new(0.0, 10.0, 40.0, 10.0);
        let t = plan(Some(line), 100.0, 12.5, None);
        assert_eq!(t, Transform::identity());
        assert!(!t.to_attribute().contains("NaN"));
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(3.125), "3.125");
        assert_eq!(format_number(1.0), "1");
        assert_eq!(format_number(-0.00001), "0");
        assert_eq!(format_number(2.666666), "2.6667");
        assert_eq!(format_number(-12.5), "-12.5");
    }
}
