//! Structured error types for the bimify pipeline.
//!
//! Only two things can stop a conversion: markup that does not parse into an
//! SVG document, and a geometry pass that exceeds its step budget. Validation
//! findings are never errors; they travel as data in
//! [`ValidationResult`](crate::validate::ValidationResult).

use thiserror::Error;

/// The markup could not be turned into a [`Document`](crate::model::Document).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    /// No element at all (empty input, only comments or whitespace).
    #[error("no root element found")]
    MissingRoot,

    /// A root element exists but it is not `<svg>`.
    #[error("root element is <{found}>, expected <svg>")]
    NotSvg { found: String },

    /// More than one top-level element.
    #[error("markup has more than one root element")]
    MultipleRoots,

    /// Input ended while an element was still open.
    #[error("element <{name}> is never closed")]
    Unclosed { name: String },

    /// Elements nest deeper than [`MAX_DEPTH`](crate::model::MAX_DEPTH).
    #[error("elements are nested more than {limit} levels deep")]
    TooDeep { limit: usize },

    /// The XML reader rejected the input.
    #[error("malformed markup at byte {position}: {message}")]
    Malformed { position: u64, message: String },
}

/// The geometry pass ran out of steps before finishing.
///
/// Raised instead of hanging on inputs with enormous element counts or deep
/// `<use>` fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("bounding box measurement exceeded its budget of {budget} steps")]
pub struct MeasurementTimeout {
    pub budget: usize,
}

/// The unified error type returned by [`convert`](crate::convert).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConversionError {
    #[error("failed to parse source: {0}")]
    Parse(#[from] ParseError),

    #[error(transparent)]
    MeasurementTimeout(#[from] MeasurementTimeout),

    /// Options that cannot produce a canvas (e.g. a non-finite padding).
    #[error("invalid options: {0}")]
    InvalidOptions(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_wraps_into_conversion_error() {
        let err: ConversionError = ParseError::NotSvg {
            found: "html".to_string(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "failed to parse source: root element is <html>, expected <svg>"
        );
    }

    #[test]
    fn test_timeout_message_names_budget() {
        let err: ConversionError = MeasurementTimeout { budget: 10 }.into();
        assert!(err.to_string().contains("10 steps"));
    }
}
