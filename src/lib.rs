//! # Bimify
//!
//! Normalizes vector logos into BIMI-ready SVG.
//!
//! A BIMI logo is shown by mail clients next to authenticated messages, so it
//! has to follow a narrow profile: a square canvas, an opaque background, no
//! scripts, no external fetches, content inside a padded safe area. Source
//! logos follow none of this. They come out of Illustrator with artboard
//! offsets, out of Inkscape with editor metadata, out of tracing tools with
//! odd coordinate systems.
//!
//! Bimify rewrites the document's *shape* while leaving the artwork alone.
//! The content is measured analytically, then wrapped in one group with a
//! single `translate(..) scale(..)`; gradients, filters and path data are
//! never touched.
//!
//! ## Architecture
//!
//! ```text
//! SVG markup
//!       ↓
//!   [model]     — parse into an owned tree
//!       ↓
//!   [sanitize]  — drop scripts, foreign content, external references
//!       ↓
//!   [style]     — flatten class rules and inline styles onto attributes
//!       ↓
//!   [geometry]  — bounding box of the content, with fallbacks
//!       ↓
//!   [layout]    — uniform scale + translation into the safe area
//!       ↓
//!   [assemble]  — canonical root, background, content group
//!       ↓
//!   [model]     — serialize
//!       ↓
//!   [validate]  — conformance report on the result
//! ```

pub mod assemble;
pub mod error;
pub mod geometry;
pub mod layout;
pub mod model;
pub mod options;
pub mod sanitize;
pub mod style;
pub mod validate;

use rayon::prelude::*;
use serde::Serialize;
use tracing::debug;

pub use error::{ConversionError, MeasurementTimeout, ParseError};
pub use model::{parse, serialize, Document};
pub use options::{ConvertOptions, Shape, ValidateOptions};
pub use validate::{validate, validate_markup, ValidationResult};

use geometry::MeasurementContext;
use layout::CANVAS_SIZE;

/// A converted logo and the report on it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conversion {
    /// The canonical document, serialized.
    pub document: String,
    pub validation: ValidationResult,
}

/// Convert one SVG document into canonical BIMI form.
///
/// Fails only when the markup is not an SVG document, the options are
/// unusable, or measuring the content exceeds its step budget. Conformance
/// problems with the result are reported in [`Conversion::validation`].
pub fn convert(markup: &str, options: &ConvertOptions) -> Result<Conversion, ConversionError> {
    let padding = options.check()?;

    let source = model::parse(markup)?;
    let (mut source, report) = sanitize::sanitize(source);
    if report.total() > 0 {
        debug!(removed = report.total(), "sanitizer removed unsafe content");
    }
    style::resolve(&mut source);

    let content = assemble::extract_content(&source.root);
    let measured = {
        let mut ctx = MeasurementContext::new(&source, options.measurement_budget);
        let measured = ctx.measure(&content.body, &content.frame())?;
        debug!(steps = ctx.steps(), ?measured, "measured content");
        measured
    };

    let transform = layout::plan(
        measured,
        CANVAS_SIZE,
        padding,
        geometry::source_frame(&source.root),
    );
    let output = assemble::assemble(content, &transform, options);
    let document = model::serialize(&output);

    let validation = validate::validate_markup(
        &document,
        &ValidateOptions {
            padding_percent: padding,
        },
    );
    Ok(Conversion {
        document,
        validation,
    })
}

/// Convert many documents in parallel. Results come back in input order.
///
/// Conversions share nothing, so one failing input does not affect the rest.
pub fn convert_batch(
    inputs: &[&str],
    options: &ConvertOptions,
) -> Vec<Result<Conversion, ConversionError>> {
    inputs.par_iter().map(|markup| convert(markup, options)).collect()
}
