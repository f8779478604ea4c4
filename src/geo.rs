//! Planar and spherical helpers over map degrees, plus WKT output.

use std::f64::consts::PI;
use std::fmt::Write;

/// A position on the map, in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Great-circle midpoint of `a` and `b`. The first coordinate of each point
/// is read as the latitude, the second as the longitude, and the result comes
/// back in the same order.
pub fn midpoint(a: Point, b: Point) -> Point {
    let lat1 = a.x.to_radians();
    let lon1 = a.y.to_radians();
    let lat2 = b.x.to_radians();
    let lon2 = b.y.to_radians();
    let cos1 = lat1.cos();
    let cos2 = lat2.cos();
    let bx = cos2 * (lon2 - lon1).cos();
    let by = cos2 * (lon2 - lon1).sin();
    let lat3 = (lat1.sin() + lat2.sin()).atan2(((cos1 + bx) * (cos1 + bx) + by * by).sqrt());
    let lon3 = lon1 + by.atan2(cos1 + bx);
    Point::new(lat3.to_degrees(), lon3.to_degrees())
}

/// `steps` evenly spaced values from `start` to `end`, both included.
pub fn linspace(start: f64, end: f64, steps: usize) -> impl Iterator<Item = f64> {
    let step = if steps > 1 {
        (end - start) / (steps - 1) as f64
    } else {
        0.0
    };
    (0..steps).map(move |idx| {
        if steps > 1 && idx == steps - 1 {
            end
        } else {
            start + step * idx as f64
        }
    })
}

/// Arc of radius `r` around `center` between two angles in radians.
pub fn half_circle(center: Point, r: f64, start: f64, end: f64, steps: usize) -> Vec<Point> {
    linspace(start, end, steps)
        .map(|theta| Point::new(center.x + r * theta.cos(), center.y + r * theta.sin()))
        .collect()
}

/// Half of an ellipse with semi-axes `r` and `r / 6`, rotated by `alpha`
/// radians around `center`.
pub fn ellipse(center: Point, r: f64, alpha: f64, steps: usize) -> Vec<Point> {
    let a = r;
    let b = r / 6.0;
    let (sina, cosa) = alpha.sin_cos();
    linspace(0.0, PI, steps)
        .map(|theta| {
            let xs = a * theta.cos();
            let ys = b * theta.sin();
            Point::new(
                center.x + (xs * cosa - ys * sina),
                center.y + (xs * sina + ys * cosa),
            )
        })
        .collect()
}

/// Outline of a clade: the half circle facing away from the parent followed
/// by the flat ellipse closing it on the parent side. `angle` is the node
/// orientation in degrees. Returns `2 * steps` points.
pub fn clade_outline(center: Point, r: f64, angle: f64, steps: usize) -> Vec<Point> {
    let alpha = angle.to_radians();
    let mut outline = half_circle(center, r, alpha - PI / 2.0, alpha + PI / 2.0, steps);
    outline.extend(ellipse(center, r, alpha + PI / 2.0, steps));
    outline
}

pub fn centroid(points: &[Point]) -> Point {
    if points.is_empty() {
        return Point::new(0.0, 0.0);
    }
    let n = points.len() as f64;
    let (sx, sy) = points
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
    Point::new(sx / n, sy / n)
}

fn push_coords(out: &mut String, points: &[Point]) {
    for (idx, p) in points.iter().enumerate() {
        if idx > 0 {
            out.push_str(", ");
        }
        let _ = write!(out, "{:.20} {:.20}", p.x, p.y);
    }
}

pub fn point_wkt(p: Point) -> String {
    format!("POINT({:.20} {:.20})", p.x, p.y)
}

pub fn linestring_wkt(points: &[Point]) -> String {
    let mut out = String::from("LINESTRING(");
    push_coords(&mut out, points);
    out.push(')');
    out
}

/// `ring` must already be closed (first point repeated last).
pub fn polygon_wkt(ring: &[Point]) -> String {
    let mut out = String::from("POLYGON((");
    push_coords(&mut out, ring);
    out.push_str("))");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn midpoint_on_the_equator_is_the_average() {
        let mid = midpoint(Point::new(0.0, 10.0), Point::new(0.0, 30.0));
        assert!(mid.x.abs() < EPS);
        assert!((mid.y - 20.0).abs() < EPS);
    }

    #[test]
    fn midpoint_bends_away_from_the_straight_segment() {
        let a = Point::new(40.0, -20.0);
        let b = Point::new(40.0, 20.0);
        let mid = midpoint(a, b);
        assert!(mid.y.abs() < EPS);
        // Great circles between two northern points pass closer to the pole.
        assert!(mid.x > 40.0);
    }

    #[test]
    fn linspace_includes_both_ends() {
        let values: Vec<f64> = linspace(0.0, 1.0, 5).collect();
        assert_eq!(values, vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        assert_eq!(linspace(3.0, 9.0, 1).collect::<Vec<_>>(), vec![3.0]);
    }

    #[test]
    fn outline_starts_on_the_circle_and_ends_on_the_ellipse() {
        let center = Point::new(1.0, 2.0);
        let outline = clade_outline(center, 2.0, 90.0, 30);
        assert_eq!(outline.len(), 60);
        for p in &outline[..30] {
            let d = ((p.x - center.x).powi(2) + (p.y - center.y).powi(2)).sqrt();
            assert!((d - 2.0).abs() < EPS);
        }
        // Facing up, the arc runs from the right to the left through the top.
        assert!((outline[0].x - 3.0).abs() < EPS);
        assert!((outline[15].y - center.y) > 1.9);
        assert!((outline[29].x + 1.0).abs() < EPS);
        // The ellipse side stays within r / 6 of the diameter.
        for p in &outline[30..] {
            assert!(p.y <= center.y + EPS && p.y >= center.y - 2.0 / 6.0 - EPS);
        }
    }

    #[test]
    fn formats_wkt_with_twenty_digits() {
        let wkt = point_wkt(Point::new(1.5, -2.0));
        assert_eq!(wkt, "POINT(1.50000000000000000000 -2.00000000000000000000)");
        let line = linestring_wkt(&[Point::new(0.0, 0.0), Point::new(1.0, 1.0)]);
        assert!(line.starts_with("LINESTRING(0.00000000000000000000 0.00000000000000000000, 1."));
        assert!(line.ends_with(')'));
        let poly = polygon_wkt(&[Point::new(0.0, 0.0), Point::new(1.0, 0.0), Point::new(0.0, 0.0)]);
        assert!(poly.starts_with("POLYGON(("));
        assert!(poly.ends_with("))"));
    }

    #[test]
    fn centroid_of_a_square() {
        let c = centroid(&[
            Point::new(0.0, 0.0),
            Point::new(2.0, 0.0),
            Point::new(2.0, 2.0),
            Point::new(0.0, 2.0),
        ]);
        assert_eq!(c, Point::new(1.0, 1.0));
    }
}
