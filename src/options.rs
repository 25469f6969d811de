//! Conversion and validation settings.
//!
//! Field names follow the camelCase JSON shape callers already use, so an
//! options object can be read straight from a config file.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ConversionError;
use crate::geometry::DEFAULT_BUDGET;

/// Padding above this would leave no room for content.
pub const MAX_PADDING_PERCENT: f64 = 45.0;

/// Recommended padding range. Values outside it are allowed but logged.
pub const RECOMMENDED_PADDING: (f64, f64) = (1.0, 25.0);

pub const DEFAULT_PADDING_PERCENT: f64 = 12.5;

/// Background primitive drawn behind the content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Shape {
    /// Full circle of radius 50, centered.
    #[default]
    Circle,
    /// Full-canvas square with 20% corner radius.
    RoundedSquare,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertOptions {
    #[serde(default = "default_background")]
    pub background_color: String,

    #[serde(default)]
    pub shape: Shape,

    /// Margin on each side, as a percentage of the canvas.
    #[serde(default = "default_padding")]
    pub padding_percent: f64,

    /// Accessible name embedded as `<title>`. Empty means none.
    #[serde(default)]
    pub title: Option<String>,

    /// Maximum number of elements the geometry pass may visit.
    #[serde(default = "default_budget")]
    pub measurement_budget: usize,
}

fn default_background() -> String {
    "#FFFFFF".to_string()
}

fn default_padding() -> f64 {
    DEFAULT_PADDING_PERCENT
}

fn default_budget() -> usize {
    DEFAULT_BUDGET
}

impl Default for ConvertOptions {
    fn default() -> Self {
        ConvertOptions {
            background_color: default_background(),
            shape: Shape::default(),
            padding_percent: default_padding(),
            title: None,
            measurement_budget: default_budget(),
        }
    }
}

impl ConvertOptions {
    /// The padding to plan with: clamped to `0..=45`.
    pub fn effective_padding(&self) -> Result<f64, ConversionError> {
        let p = self.padding_percent;
        if !p.is_finite() {
            return Err(ConversionError::InvalidOptions(format!(
                "paddingPercent must be a finite number, got {p}"
            )));
        }
        let (lo, hi) = RECOMMENDED_PADDING;
        if !(lo..=hi).contains(&p) {
            warn!(padding = p, "padding outside the recommended {lo}-{hi}% range");
        }
        Ok(p.clamp(0.0, MAX_PADDING_PERCENT))
    }

    /// The title to embed, if any. Whitespace-only titles count as absent.
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }

    /// Reject unusable options. Returns the padding to plan with.
    pub fn check(&self) -> Result<f64, ConversionError> {
        let padding = self.effective_padding()?;
        if self.background_color.trim().is_empty() {
            return Err(ConversionError::InvalidOptions(
                "backgroundColor must not be empty".to_string(),
            ));
        }
        if self.measurement_budget == 0 {
            return Err(ConversionError::InvalidOptions(
                "measurementBudget must be at least 1".to_string(),
            ));
        }
        Ok(padding)
    }
}

/// Settings for checking a document that is already in canonical form.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateOptions {
    /// Nominal padding for the advisory safe-area rule.
    #[serde(default = "default_padding")]
    pub padding_percent: f64,
}

impl Default for ValidateOptions {
    fn default() -> Self {
        ValidateOptions {
            padding_percent: DEFAULT_PADDING_PERCENT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = ConvertOptions::default();
        assert_eq!(opts.background_color, "#FFFFFF");
        assert_eq!(opts.shape, Shape::Circle);
        assert_eq!(opts.padding_percent, 12.5);
        assert!(opts.title().is_none());
    }

    #[test]
    fn test_deserialize_camel_case() {
        let opts: ConvertOptions = serde_json::from_str(
            r##"{"backgroundColor":"#000","shape":"roundedSquare","paddingPercent":10,"title":"Acme"}"##,
        )
        .unwrap();
        assert_eq!(opts.background_color, "#000");
        assert_eq!(opts.shape, Shape::RoundedSquare);
        assert_eq!(opts.padding_percent, 10.0);
        assert_eq!(opts.title(), Some("Acme"));
        assert_eq!(opts.measurement_budget, DEFAULT_BUDGET);
    }

    #[test]
    fn test_empty_object_uses_defaults() {
        let opts: ConvertOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(opts, ConvertOptions::default());
    }

    #[test]
    fn test_padding_is_clamped() {
        let mut opts = ConvertOptions {
            padding_percent: 80.0,
            ..Default::default()
        };
        assert_eq!(opts.effective_padding().unwrap(), MAX_PADDING_PERCENT);
        opts.padding_percent = -5.0;
        assert_eq!(opts.effective_padding().unwrap(), 0.0);
        opts.padding_percent = f64::NAN;
        assert!(matches!(opts.effective_padding(), Err(ConversionError::InvalidOptions(_))));
    }

    #[test]
    fn test_check_returns_clamped_padding() {
        let opts = ConvertOptions {
            padding_percent: 60.0,
            ..Default::default()
        };
        assert_eq!(opts.check().unwrap(), MAX_PADDING_PERCENT);
        assert_eq!(ConvertOptions::default().check().unwrap(), DEFAULT_PADDING_PERCENT);

        let blank = ConvertOptions {
            background_color: "  ".to_string(),
            ..Default::default()
        };
        assert!(matches!(blank.check(), Err(ConversionError::InvalidOptions(_))));
    }

    #[test]
    fn test_blank_title_is_absent() {
        let opts = ConvertOptions {
            title: Some("   ".to_string()),
            ..Default::default()
        };
        assert!(opts.title().is_none());
    }
}
