//! Affine matrices and the SVG `transform` attribute.

use thiserror::Error;

use super::path::Scanner;

/// A 2D affine transform in SVG's `matrix(a b c d e f)` layout:
///
/// ```text
/// | a c e |
/// | b d f |
/// | 0 0 1 |
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Default for Matrix {
    fn default() -> Self {
        Matrix::IDENTITY
    }
}

impl Matrix {
    pub const IDENTITY: Matrix = Matrix {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    pub fn translate(tx: f64, ty: f64) -> Self {
        Matrix {
            e: tx,
            f: ty,
            ..Matrix::IDENTITY
        }
    }

    pub fn scale(sx: f64, sy: f64) -> Self {
        Matrix {
            a: sx,
            d: sy,
            ..Matrix::IDENTITY
        }
    }

    /// Rotation by `degrees`, clockwise in SVG's y-down space.
    pub fn rotate(degrees: f64) -> Self {
        let (sin, cos) = degrees.to_radians().sin_cos();
        Matrix {
            a: cos,
            b: sin,
            c: -sin,
            d: cos,
            e: 0.0,
            f: 0.0,
        }
    }

    pub fn skew_x(degrees: f64) -> Self {
        Matrix {
            c: degrees.to_radians().tan(),
            ..Matrix::IDENTITY
        }
    }

    pub fn skew_y(degrees: f64) -> Self {
        Matrix {
            b: degrees.to_radians().tan(),
            ..Matrix::IDENTITY
        }
    }

    /// `self × other`: `other` applies first, then `self`.
    pub fn multiply(&self, other: &Matrix) -> Matrix {
        Matrix {
            a: self.a * other.a + self.c * other.b,
            b: self.b * other.a + self.d * other.b,
            c: self.a * other.c + self.c * other.d,
            d: self.b * other.c + self.d * other.d,
            e: self.a * other.e + self.c * other.f + self.e,
            f: self.b * other.e + self.d * other.f + self.f,
        }
    }

    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.a * x + self.c * y + self.e,
            self.b * x + self.d * y + self.f,
        )
    }

    pub fn is_finite(&self) -> bool {
        [self.a, self.b, self.c, self.d, self.e, self.f]
            .iter()
            .all(|v| v.is_finite())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransformError {
    #[error("unknown transform function '{0}'")]
    UnknownFunction(String),
    #[error("{name}() takes {expected} arguments, got {got}")]
    Arity {
        name: String,
        expected: &'static str,
        got: usize,
    },
    #[error("malformed transform list at offset {0}")]
    Syntax(usize),
}

/// Parse a `transform` list into one matrix. Functions compose left to right,
/// so `translate(10) scale(2)` scales first and then translates.
pub fn parse_transform(s: &str) -> Result<Matrix, TransformError> {
    let bytes = s.as_bytes();
    let mut sc = Scanner::new(s);
    let mut out = Matrix::IDENTITY;

    loop {
        sc.skip_separators();
        if sc.at_end() {
            break;
        }
        let name_start = sc.pos;
        while sc.peek().is_some_and(|c| c.is_ascii_alphabetic()) {
            sc.advance();
        }
        if sc.pos == name_start {
            return Err(TransformError::Syntax(sc.pos));
        }
        let name = String::from_utf8_lossy(&bytes[name_start..sc.pos]).into_owned();

        while sc.peek().is_some_and(|c| c.is_ascii_whitespace()) {
            sc.advance();
        }
        if sc.peek() != Some(b'(') {
            return Err(TransformError::Syntax(sc.pos));
        }
        sc.advance();

        let mut args = Vec::with_capacity(6);
        loop {
            sc.skip_separators();
            match sc.peek() {
                Some(b')') => {
                    sc.advance();
                    break;
                }
                None => return Err(TransformError::Syntax(sc.pos)),
                Some(_) => match sc.number() {
                    Some(v) => args.push(v),
                    None => return Err(TransformError::Syntax(sc.pos)),
                },
            }
        }

        out = out.multiply(&function_matrix(&name, &args)?);
    }

    Ok(out)
}

fn function_matrix(name: &str, args: &[f64]) -> Result<Matrix, TransformError> {
    let arity = |expected: &'static str| TransformError::Arity {
        name: name.to_string(),
        expected,
        got: args.len(),
    };
    let m = match (name, args) {
        ("matrix", &[a, b, c, d, e, f]) => Matrix { a, b, c, d, e, f },
        ("matrix", _) => return Err(arity("6")),
        ("translate", &[tx]) => Matrix::translate(tx, 0.0),
        ("translate", &[tx, ty]) => Matrix::translate(tx, ty),
        ("translate", _) => return Err(arity("1 or 2")),
        ("scale", &[s]) => Matrix::scale(s, s),
        ("scale", &[sx, sy]) => Matrix::scale(sx, sy),
        ("scale", _) => return Err(arity("1 or 2")),
        ("rotate", &[deg]) => Matrix::rotate(deg),
        ("rotate", &[deg, cx, cy]) => Matrix::translate(cx, cy)
            .multiply(&Matrix::rotate(deg))
            .multiply(&Matrix::translate(-cx, -cy)),
        ("rotate", _) => return Err(arity("1 or 3")),
        ("skewX", &[deg]) => Matrix::skew_x(deg),
        ("skewX", _) => return Err(arity("1")),
        ("skewY", &[deg]) => Matrix::skew_y(deg),
        ("skewY", _) => return Err(arity("1")),
        _ => return Err(TransformError::UnknownFunction(name.to_string())),
    };
    Ok(m)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: (f64, f64), b: (f64, f64)) -> bool {
        (a.0 - b.0).abs() < 1e-9 && (a.1 - b.1).abs() < 1e-9
    }

    #[test]
    fn test_translate_then_scale_order() {
        let m = parse_transform("translate(10, 20) scale(2)").unwrap();
        assert!(approx(m.apply(1.0, 1.0), (12.0, 22.0)));
    }

    #[test]
    fn test_single_argument_forms() {
        assert!(approx(parse_transform("translate(5)").unwrap().apply(0.0, 0.0), (5.0, 0.0)));
        assert!(approx(parse_transform("scale(3)").unwrap().apply(1.0, 2.0), (3.0, 6.0)));
    }

    #[test]
    fn test_rotate_about_center() {
        let m = parse_transform("rotate(90 10 10)").unwrap();
        assert!(approx(m.apply(20.0, 10.0), (10.0, 20.0)));
    }

    #[test]
    fn test_matrix_and_skew() {
        let m = parse_transform("matrix(1 0 0 1 7 8)").unwrap();
        assert!(approx(m.apply(0.0, 0.0), (7.0, 8.0)));
        let k = parse_transform("skewX(45)").unwrap();
        assert!(approx(k.apply(0.0, 10.0), (10.0, 10.0)));
    }

    #[test]
    fn test_compact_and_comma_separated_lists() {
        let m = parse_transform("translate(1,1),scale(2,3)").unwrap();
        assert!(approx(m.apply(1.0, 1.0), (3.0, 4.0)));
        assert_eq!(parse_transform("  ").unwrap(), Matrix::IDENTITY);
    }

    #[test]
    fn test_malformed_transforms() {
        assert!(matches!(parse_transform("scale(1 2 3)"), Err(TransformError::Arity { .. })));
        assert!(matches!(parse_transform("wobble(1)"), Err(TransformError::UnknownFunction(_))));
        assert!(matches!(parse_transform("translate(1"), Err(TransformError::Syntax(_))));
        assert!(matches!(parse_transform("translate 1 2"), Err(TransformError::Syntax(_))));
        assert!(matches!(parse_transform("scale(a)"), Err(TransformError::Syntax(_))));
    }
}
