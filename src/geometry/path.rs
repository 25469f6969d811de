//! SVG path data: parsing into absolute segments and exact bounds.
//!
//! Supports every path command (M, L, H, V, C, S, Q, T, A, Z), absolute and
//! relative, with implicit repetition. Smooth curves are expanded with their
//! reflected control points and elliptical arcs are converted to cubic Béziers,
//! so downstream code only sees four segment kinds.
//!
//! Bounds are computed after transforming control points. An affine image of a
//! Bézier is the Bézier of the transformed control points, so solving for the
//! curve extrema in the target frame gives the exact box even under rotation
//! and skew.

use thiserror::Error;

use super::transform::Matrix;
use super::BoundingBox;

pub type Point = (f64, f64);

/// An absolute path segment. Curves store control points then the end point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Segment {
    MoveTo(Point),
    LineTo(Point),
    Quad(Point, Point),
    Cubic(Point, Point, Point),
    Close,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PathError {
    #[error("path data must begin with a moveto")]
    MissingMoveTo,
    #[error("unexpected character '{ch}' at offset {pos}")]
    UnexpectedChar { ch: char, pos: usize },
    #[error("expected a number at offset {pos}")]
    ExpectedNumber { pos: usize },
}

/// Parse path data strictly. Any syntax error fails the whole path.
pub fn parse_path(d: &str) -> Result<Vec<Segment>, PathError> {
    let mut sc = Scanner::new(d);
    let mut out = Vec::new();
    let mut pen = Pen::default();
    let mut cmd: Option<u8> = None;

    loop {
        sc.skip_separators();
        let Some(c) = sc.peek() else {
            break;
        };
        if c.is_ascii_alphabetic() {
            let pos = sc.pos;
            sc.advance();
            if cmd.is_none() && !matches!(c, b'M' | b'm') {
                return Err(PathError::MissingMoveTo);
            }
            if matches!(c, b'Z' | b'z') {
                pen.close(&mut out);
                cmd = Some(c);
                continue;
            }
            if !b"MmLlHhVvCcSsQqTtAa".contains(&c) {
                return Err(PathError::UnexpectedChar { ch: c as char, pos });
            }
            cmd = Some(c);
        } else {
            match cmd {
                None => return Err(PathError::MissingMoveTo),
                Some(b'Z' | b'z') => {
                    return Err(PathError::UnexpectedChar {
                        ch: c as char,
                        pos: sc.pos,
                    })
                }
                Some(_) if !sc.at_number_start() => {
                    return Err(PathError::UnexpectedChar {
                        ch: c as char,
                        pos: sc.pos,
                    })
                }
                Some(_) => {}
            }
        }

        let Some(active) = cmd else {
            break;
        };
        pen.segment(active, &mut sc, &mut out)?;
        // Coordinates after a moveto are implicit linetos.
        match active {
            b'M' => cmd = Some(b'L'),
            b'm' => cmd = Some(b'l'),
            _ => {}
        }
    }

    Ok(out)
}

/// Current point and reflection state while reading path data.
#[derive(Default)]
struct Pen {
    cur: Point,
    start: Point,
    last_cubic_ctrl: Option<Point>,
    last_quad_ctrl: Option<Point>,
}

impl Pen {
    fn close(&mut self, out: &mut Vec<Segment>) {
        out.push(Segment::Close);
        self.cur = self.start;
        self.last_cubic_ctrl = None;
        self.last_quad_ctrl = None;
    }

    fn segment(&mut self, cmd: u8, sc: &mut Scanner, out: &mut Vec<Segment>) -> Result<(), PathError> {
        let rel = cmd.is_ascii_lowercase();
        let (ox, oy) = if rel { self.cur } else { (0.0, 0.0) };
        let mut cubic_ctrl = None;
        let mut quad_ctrl = None;

        match cmd.to_ascii_uppercase() {
            b'M' => {
                let p = (ox + sc.expect_number()?, oy + sc.expect_number()?);
                out.push(Segment::MoveTo(p));
                self.cur = p;
                self.start = p;
            }
            b'L' => {
                let p = (ox + sc.expect_number()?, oy + sc.expect_number()?);
                out.push(Segment::LineTo(p));
                self.cur = p;
            }
            b'H' => {
                let x = sc.expect_number()? + if rel { self.cur.0 } else { 0.0 };
                let p = (x, self.cur.1);
                out.push(Segment::LineTo(p));
                self.cur = p;
            }
            b'V' => {
                let y = sc.expect_number()? + if rel { self.cur.1 } else { 0.0 };
                let p = (self.cur.0, y);
                out.push(Segment::LineTo(p));
                self.cur = p;
            }
            b'C' => {
                let c1 = (ox + sc.expect_number()?, oy + sc.expect_number()?);
                let c2 = (ox + sc.expect_number()?, oy + sc.expect_number()?);
                let p = (ox + sc.expect_number()?, oy + sc.expect_number()?);
                out.push(Segment::Cubic(c1, c2, p));
                cubic_ctrl = Some(c2);
                self.cur = p;
            }
            b'S' => {
                let c1 = reflect(self.last_cubic_ctrl, self.cur);
                let c2 = (ox + sc.expect_number()?, oy + sc.expect_number()?);
                let p = (ox + sc.expect_number()?, oy + sc.expect_number()?);
                out.push(Segment::Cubic(c1, c2, p));
                cubic_ctrl = Some(c2);
                self.cur = p;
            }
            b'Q' => {
                let c = (ox + sc.expect_number()?, oy + sc.expect_number()?);
                let p = (ox + sc.expect_number()?, oy + sc.expect_number()?);
                out.push(Segment::Quad(c, p));
                quad_ctrl = Some(c);
                self.cur = p;
            }
            b'T' => {
                let c = reflect(self.last_quad_ctrl, self.cur);
                let p = (ox + sc.expect_number()?, oy + sc.expect_number()?);
                out.push(Segment::Quad(c, p));
                quad_ctrl = Some(c);
                self.cur = p;
            }
            b'A' => {
                let rx = sc.expect_number()?;
                let ry = sc.expect_number()?;
                let angle = sc.expect_number()?;
                let large = sc.expect_flag()?;
                let sweep = sc.expect_flag()?;
                let p = (ox + sc.expect_number()?, oy + sc.expect_number()?);
                arc_to_cubics(self.cur, rx, ry, angle, large, sweep, p, out);
                self.cur = p;
            }
            _ => {}
        }

        self.last_cubic_ctrl = cubic_ctrl;
        self.last_quad_ctrl = quad_ctrl;
        Ok(())
    }
}

fn reflect(ctrl: Option<Point>, cur: Point) -> Point {
    match ctrl {
        Some((x, y)) => (2.0 * cur.0 - x, 2.0 * cur.1 - y),
        None => cur,
    }
}

/// Endpoint-parameterized elliptical arc → cubic Béziers, one per quarter turn.
#[allow(clippy::too_many_arguments)]
fn arc_to_cubics(
    from: Point,
    rx: f64,
    ry: f64,
    angle_deg: f64,
    large: bool,
    sweep: bool,
    to: Point,
    out: &mut Vec<Segment>,
) {
    if from == to {
        return;
    }
    let (mut rx, mut ry) = (rx.abs(), ry.abs());
    if rx == 0.0 || ry == 0.0 {
        out.push(Segment::LineTo(to));
        return;
    }

    let phi = angle_deg.to_radians();
    let (sin, cos) = phi.sin_cos();
    let dx2 = (from.0 - to.0) / 2.0;
    let dy2 = (from.1 - to.1) / 2.0;
    let x1p = cos * dx2 + sin * dy2;
    let y1p = -sin * dx2 + cos * dy2;

    // Scale radii up when they cannot span the endpoints.
    let lambda = (x1p * x1p) / (rx * rx) + (y1p * y1p) / (ry * ry);
    if lambda > 1.0 {
        let s = lambda.sqrt();
        rx *= s;
        ry *= s;
    }

    let num = rx * rx * ry * ry - rx * rx * y1p * y1p - ry * ry * x1p * x1p;
    let den = rx * rx * y1p * y1p + ry * ry * x1p * x1p;
    let mut coef = if den == 0.0 { 0.0 } else { (num / den).max(0.0).sqrt() };
    if large == sweep {
        coef = -coef;
    }
    let cxp = coef * rx * y1p / ry;
    let cyp = -coef * ry * x1p / rx;
    let cx = cos * cxp - sin * cyp + (from.0 + to.0) / 2.0;
    let cy = sin * cxp + cos * cyp + (from.1 + to.1) / 2.0;

    let u = ((x1p - cxp) / rx, (y1p - cyp) / ry);
    let v = ((-x1p - cxp) / rx, (-y1p - cyp) / ry);
    let theta1 = vector_angle((1.0, 0.0), u);
    let mut dtheta = vector_angle(u, v);
    if !sweep && dtheta > 0.0 {
        dtheta -= std::f64::consts::TAU;
    } else if sweep && dtheta < 0.0 {
        dtheta += std::f64::consts::TAU;
    }

    let n = (dtheta.abs() / std::f64::consts::FRAC_PI_2).ceil().max(1.0) as usize;
    let delta = dtheta / n as f64;
    let t = 4.0 / 3.0 * (delta / 4.0).tan();
    let map = |x: f64, y: f64| -> Point {
        (
            cx + rx * cos * x - ry * sin * y,
            cy + rx * sin * x + ry * cos * y,
        )
    };

    for i in 0..n {
        let a1 = theta1 + i as f64 * delta;
        let a2 = a1 + delta;
        let (s1, c1) = a1.sin_cos();
        let (s2, c2) = a2.sin_cos();
        let ctrl1 = map(c1 - t * s1, s1 + t * c1);
        let ctrl2 = map(c2 + t * s2, s2 - t * c2);
        let end = if i + 1 == n { to } else { map(c2, s2) };
        out.push(Segment::Cubic(ctrl1, ctrl2, end));
    }
}

fn vector_angle(u: Point, v: Point) -> f64 {
    (u.0 * v.1 - u.1 * v.0).atan2(u.0 * v.0 + u.1 * v.1)
}

/// Four cubic Béziers approximating an ellipse, starting at 3 o'clock.
pub fn ellipse_segments(cx: f64, cy: f64, rx: f64, ry: f64) -> Vec<Segment> {
    let k: f64 = 0.5522847498;
    let kx = rx * k;
    let ky = ry * k;

    vec![
        Segment::MoveTo((cx + rx, cy)),
        Segment::Cubic((cx + rx, cy + ky), (cx + kx, cy + ry), (cx, cy + ry)),
        Segment::Cubic((cx - kx, cy + ry), (cx - rx, cy + ky), (cx - rx, cy)),
        Segment::Cubic((cx - rx, cy - ky), (cx - kx, cy - ry), (cx, cy - ry)),
        Segment::Cubic((cx + kx, cy - ry), (cx + rx, cy - ky), (cx + rx, cy)),
        Segment::Close,
    ]
}

/// Exact bounds of a segment list in the frame `m` maps to.
///
/// A moveto on its own draws nothing and contributes nothing.
pub fn path_bounds(segments: &[Segment], m: &Matrix) -> Option<BoundingBox> {
    let mut acc: Option<BoundingBox> = None;
    let mut include = |p: Point| match acc.as_mut() {
        Some(b) => b.include(p.0, p.1),
        None => acc = Some(BoundingBox::point(p.0, p.1)),
    };

    let mut cur = m.apply(0.0, 0.0);
    let mut start = cur;
    for seg in segments {
        match *seg {
            Segment::MoveTo(p) => {
                cur = m.apply(p.0, p.1);
                start = cur;
            }
            Segment::LineTo(p) => {
                let p = m.apply(p.0, p.1);
                include(cur);
                include(p);
                cur = p;
            }
            Segment::Quad(c, p) => {
                let c = m.apply(c.0, c.1);
                let p = m.apply(p.0, p.1);
                include(cur);
                include(p);
                for t in quad_extrema(cur, c, p) {
                    include(quad_at(cur, c, p, t));
                }
                cur = p;
            }
            Segment::Cubic(c1, c2, p) => {
                let c1 = m.apply(c1.0, c1.1);
                let c2 = m.apply(c2.0, c2.1);
                let p = m.apply(p.0, p.1);
                include(cur);
                include(p);
                for t in cubic_extrema(cur, c1, c2, p) {
                    include(cubic_at(cur, c1, c2, p, t));
                }
                cur = p;
            }
            Segment::Close => {
                include(cur);
                cur = start;
            }
        }
    }
    acc
}

fn quad_extrema(p0: Point, p1: Point, p2: Point) -> Vec<f64> {
    let mut ts = Vec::with_capacity(2);
    for (a, b, c) in [(p0.0, p1.0, p2.0), (p0.1, p1.1, p2.1)] {
        let denom = a - 2.0 * b + c;
        if denom.abs() > f64::EPSILON {
            let t = (a - b) / denom;
            if t > 0.0 && t < 1.0 {
                ts.push(t);
            }
        }
    }
    ts
}

fn quad_at(p0: Point, p1: Point, p2: Point, t: f64) -> Point {
    let mt = 1.0 - t;
    (
        mt * mt * p0.0 + 2.0 * mt * t * p1.0 + t * t * p2.0,
        mt * mt * p0.1 + 2.0 * mt * t * p1.1 + t * t * p2.1,
    )
}

fn cubic_extrema(p0: Point, p1: Point, p2: Point, p3: Point) -> Vec<f64> {
    let mut ts = Vec::with_capacity(4);
    for (a0, a1, a2, a3) in [(p0.0, p1.0, p2.0, p3.0), (p0.1, p1.1, p2.1, p3.1)] {
        // Derivative / 3 = A t² + B t + C.
        let d0 = a1 - a0;
        let d1 = a2 - a1;
        let d2 = a3 - a2;
        let a = d0 - 2.0 * d1 + d2;
        let b = 2.0 * (d1 - d0);
        let c = d0;
        if a.abs() < 1e-12 {
            if b.abs() > 1e-12 {
                ts.push(-c / b);
            }
        } else {
            let disc = b * b - 4.0 * a * c;
            if disc >= 0.0 {
                let sq = disc.sqrt();
                ts.push((-b + sq) / (2.0 * a));
                ts.push((-b - sq) / (2.0 * a));
            }
        }
    }
    ts.retain(|t| *t > 0.0 && *t < 1.0);
    ts
}

fn cubic_at(p0: Point, p1: Point, p2: Point, p3: Point, t: f64) -> Point {
    let mt = 1.0 - t;
    let (w0, w1, w2, w3) = (mt * mt * mt, 3.0 * mt * mt * t, 3.0 * mt * t * t, t * t * t);
    (
        w0 * p0.0 + w1 * p1.0 + w2 * p2.0 + w3 * p3.0,
        w0 * p0.1 + w1 * p1.1 + w2 * p2.1 + w3 * p3.1,
    )
}

/// Byte scanner for SVG number lists (path data, points, transforms).
pub(crate) struct Scanner<'a> {
    bytes: &'a [u8],
    pub(crate) pos: usize,
}

impl<'a> Scanner<'a> {
    pub(crate) fn new(s: &'a str) -> Self {
        Scanner {
            bytes: s.as_bytes(),
            pos: 0,
        }
    }

    pub(crate) fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    pub(crate) fn advance(&mut self) {
        self.pos += 1;
    }

    pub(crate) fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    /// Skip whitespace and commas.
    pub(crate) fn skip_separators(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_ascii_whitespace() || c == b',' {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    pub(crate) fn at_number_start(&self) -> bool {
        matches!(self.peek(), Some(b'0'..=b'9' | b'.' | b'-' | b'+'))
    }

    /// Read one number, skipping leading separators. `1.5.5` reads as `1.5`
    /// then `.5`; `1e-3` is a single number.
    pub(crate) fn number(&mut self) -> Option<f64> {
        self.skip_separators();
        let start = self.pos;
        let mut i = self.pos;
        let at = |i: usize| self.bytes.get(i).copied();

        if matches!(at(i), Some(b'+' | b'-')) {
            i += 1;
        }
        let int_start = i;
        while matches!(at(i), Some(b'0'..=b'9')) {
            i += 1;
        }
        let mut digits = i > int_start;
        if at(i) == Some(b'.') {
            let frac_start = i + 1;
            let mut j = frac_start;
            while matches!(at(j), Some(b'0'..=b'9')) {
                j += 1;
            }
            if j > frac_start || digits {
                digits |= j > frac_start;
                i = j;
            }
        }
        if !digits {
            return None;
        }
        if matches!(at(i), Some(b'e' | b'E')) {
            let mut j = i + 1;
            if matches!(at(j), Some(b'+' | b'-')) {
                j += 1;
            }
            let exp_start = j;
            while matches!(at(j), Some(b'0'..=b'9')) {
                j += 1;
            }
            if j > exp_start {
                i = j;
            }
        }

        let text = std::str::from_utf8(&self.bytes[start..i]).ok()?;
        let value = text.parse::<f64>().ok().filter(|v| v.is_finite())?;
        self.pos = i;
        Some(value)
    }

    fn expect_number(&mut self) -> Result<f64, PathError> {
        self.number().ok_or(PathError::ExpectedNumber { pos: self.pos })
    }

    /// Arc flags are single `0`/`1` characters and may be run together.
    fn expect_flag(&mut self) -> Result<bool, PathError> {
        self.skip_separators();
        match self.peek() {
            Some(b'0') => {
                self.advance();
                Ok(false)
            }
            Some(b'1') => {
                self.advance();
                Ok(true)
            }
            _ => Err(PathError::ExpectedNumber { pos: self.pos }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    fn bounds(d: &str) -> BoundingBox {
        path_bounds(&parse_path(d).unwrap(), &Matrix::IDENTITY).unwrap()
    }

    #[test]
    fn test_parse_path_m_l_z() {
        let segs = parse_path("M 10 20 L 30 40 Z").unwrap();
        assert_eq!(
            segs,
            vec![
                Segment::MoveTo((10.0, 20.0)),
                Segment::LineTo((30.0, 40.0)),
                Segment::Close
            ]
        );
    }

    #[test]
    fn test_parse_path_relative_and_implicit_lineto() {
        let segs = parse_path("m 10 20 5 5 l 5 5 z").unwrap();
        assert_eq!(segs[0], Segment::MoveTo((10.0, 20.0)));
        assert_eq!(segs[1], Segment::LineTo((15.0, 25.0)));
        assert_eq!(segs[2], Segment::LineTo((20.0, 30.0)));
    }

    #[test]
    fn test_parse_compact_numbers() {
        let segs = parse_path("M0,0L10-5.5.5h1e1").unwrap();
        assert_eq!(segs[1], Segment::LineTo((10.0, -5.5)));
        assert_eq!(segs[2], Segment::LineTo((0.5, -5.5)));
        assert_eq!(segs.len(), 3);
        let h = parse_path("M0 0H5h1e1").unwrap();
        assert_eq!(h[2], Segment::LineTo((15.0, 0.0)));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse_path("L 10 10"), Err(PathError::MissingMoveTo));
        assert!(matches!(parse_path("M 0 0 L 10"), Err(PathError::ExpectedNumber { .. })));
        assert!(matches!(parse_path("M 0 0 X 1 1"), Err(PathError::UnexpectedChar { ch: 'X', .. })));
        assert!(matches!(parse_path("M 0 0 # 1"), Err(PathError::UnexpectedChar { .. })));
        assert_eq!(parse_path("").unwrap(), vec![]);
    }

    #[test]
    fn test_smooth_cubic_reflects_control() {
        let segs = parse_path("M0 0 C 0 10 10 10 10 0 S 20 -10 20 0").unwrap();
        assert_eq!(segs[2], Segment::Cubic((10.0, -10.0), (20.0, -10.0), (20.0, 0.0)));
    }

    #[test]
    fn test_cubic_bounds_use_extrema_not_control_points() {
        // Control points reach y=10 but the curve peaks at 7.5.
        let b = bounds("M0 0 C 0 10 10 10 10 0");
        assert!(close(b.max_y, 7.5));
        assert!(close(b.min_x, 0.0) && close(b.max_x, 10.0));
    }

    #[test]
    fn test_quad_bounds() {
        let b = bounds("M0 0 Q 5 10 10 0");
        assert!(close(b.max_y, 5.0));
    }

    #[test]
    fn test_arc_half_circle_bounds() {
        // Upper half of a circle of radius 5 centered at (5, 0).
        let b = bounds("M0 0 A 5 5 0 0 1 10 0");
        assert!(close(b.min_x, 0.0) && close(b.max_x, 10.0));
        assert!((b.min_y + 5.0).abs() < 1e-3, "min_y = {}", b.min_y);
        assert!(close(b.max_y, 0.0));
    }

    #[test]
    fn test_arc_with_packed_flags() {
        let segs = parse_path("M0 0a5 5 0 1010 0").unwrap();
        assert!(segs.len() >= 2);
        assert!(matches!(segs.last(), Some(Segment::Cubic(_, _, (x, y))) if close(*x, 10.0) && close(*y, 0.0)));
    }

    #[test]
    fn test_arc_degenerate_radius_is_line() {
        let segs = parse_path("M0 0 A 0 5 0 0 1 10 0").unwrap();
        assert_eq!(segs[1], Segment::LineTo((10.0, 0.0)));
    }

    #[test]
    fn test_bounds_under_rotation() {
        let segs = ellipse_segments(0.0, 0.0, 10.0, 10.0);
        let b = path_bounds(&segs, &Matrix::rotate(45.0)).unwrap();
        // The Bézier circle is within 0.03% of a true circle.
        assert!((b.max_x - 10.0).abs() < 0.01, "max_x = {}", b.max_x);
        assert!((b.min_y + 10.0).abs() < 0.01);
    }

    #[test]
    fn test_lone_moveto_has_no_bounds() {
        assert!(path_bounds(&parse_path("M 5 5").unwrap(), &Matrix::IDENTITY).is_none());
    }
}
