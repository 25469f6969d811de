//! Text extents without a font stack.
//!
//! Logos rarely embed fonts, and the renderer that eventually displays the
//! logo picks its own fallback anyway. Widths come from the Helvetica AFM
//! tables, which are close to Arial and to most sans-serif fallbacks.

/// Metric faces. Weights of 600 and up snap to bold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Face {
    Helvetica,
    HelveticaBold,
}

/// Ascender and descender in 1/1000 em.
const ASCENDER: f64 = 718.0;
const DESCENDER: f64 = 207.0;

/// Advance for characters outside the table.
const DEFAULT_WIDTH: u16 = 556;

/// Helvetica advance widths for U+0020..=U+007E, 1/1000 em.
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '..'/'
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, // '0'..'?'
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, // '@'..'O'
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, // 'P'..'_'
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, // '`'..'o'
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584, // 'p'..'~'
];

const HELVETICA_BOLD_WIDTHS: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278, //
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611, //
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778, //
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556, //
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611, //
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584,
];

impl Face {
    pub fn for_weight(weight: u32) -> Self {
        if weight >= 600 {
            Face::HelveticaBold
        } else {
            Face::Helvetica
        }
    }

    /// Advance width of one character in user units.
    pub fn char_width(&self, ch: char, font_size: f64) -> f64 {
        let table = match self {
            Face::Helvetica => &HELVETICA_WIDTHS,
            Face::HelveticaBold => &HELVETICA_BOLD_WIDTHS,
        };
        let code = ch as u32;
        let w = if (32..=126).contains(&code) {
            table[(code - 32) as usize]
        } else {
            DEFAULT_WIDTH
        };
        w as f64 / 1000.0 * font_size
    }

    pub fn text_width(&self, text: &str, font_size: f64) -> f64 {
        text.chars().map(|c| self.char_width(c, font_size)).sum()
    }

    pub fn ascent(&self, font_size: f64) -> f64 {
        ASCENDER / 1000.0 * font_size
    }

    pub fn descent(&self, font_size: f64) -> f64 {
        DESCENDER / 1000.0 * font_size
    }
}

/// Parse a `font-weight` value into a numeric weight.
pub fn parse_weight(value: &str, inherited: u32) -> u32 {
    match value.trim() {
        "normal" => 400,
        "bold" => 700,
        "bolder" => (inherited + 300).min(900),
        "lighter" => inherited.saturating_sub(300).max(100),
        other => other.parse().unwrap_or(inherited),
    }
}

/// Collapse whitespace runs to single spaces, as `xml:space="default"` does.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_char_widths() {
        assert!((Face::Helvetica.char_width('A', 1000.0) - 667.0).abs() < 1e-9);
        assert!((Face::Helvetica.char_width('i', 10.0) - 2.22).abs() < 1e-9);
        assert!((Face::HelveticaBold.char_width('i', 10.0) - 2.78).abs() < 1e-9);
        assert!((Face::Helvetica.char_width('é', 10.0) - 5.56).abs() < 1e-9);
    }

    #[test]
    fn test_text_width_sums_advances() {
        let w = Face::Helvetica.text_width("Hi", 100.0);
        assert!((w - (72.2 + 22.2)).abs() < 1e-9);
    }

    #[test]
    fn test_weight_snapping() {
        assert_eq!(Face::for_weight(parse_weight("bold", 400)), Face::HelveticaBold);
        assert_eq!(Face::for_weight(parse_weight("500", 400)), Face::Helvetica);
        assert_eq!(Face::for_weight(parse_weight("bolder", 400)), Face::HelveticaBold);
        assert_eq!(parse_weight("heavy", 300), 300);
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  Acme\n   Corp "), "Acme Corp");
    }
}
