//! 2D polygons: hull projection and bed-area clipping
//!
//! The entity graph works almost entirely in 3D; the two places it drops to
//! 2D are convex-hull footprints (arrangement, collision pre-checks) and the
//! printable bed area minus its excluded regions. Polygons here are closed
//! implicit loops over f64 millimeter coordinates — no scaling to integer
//! grids; the Clipper2 wrapper handles precision via its type parameter.

use clipper2::*;
use nalgebra::{Point2, Vector2};

use crate::error::{Error, Result};

/// Closed 2D polygon (last point implicitly connects to the first)
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Polygon {
    /// Vertex loop in order; no closing duplicate of the first point
    pub points: Vec<Point2<f64>>,
}

impl Polygon {
    /// Empty polygon
    pub fn new() -> Self {
        Polygon::default()
    }

    /// Polygon from a point loop
    pub fn from_points(points: Vec<Point2<f64>>) -> Self {
        Polygon { points }
    }

    /// A polygon needs at least 3 points to enclose area
    pub fn is_valid(&self) -> bool {
        self.points.len() >= 3
    }

    /// Remove all points
    pub fn clear(&mut self) {
        self.points.clear();
    }

    /// Shift all points
    pub fn translate(&mut self, offset: Vector2<f64>) {
        for p in self.points.iter_mut() {
            *p += offset;
        }
    }

    /// Rotate all points about the origin
    pub fn rotate(&mut self, angle: f64) {
        let (sin, cos) = angle.sin_cos();
        for p in self.points.iter_mut() {
            let (x, y) = (p.x, p.y);
            p.x = x * cos - y * sin;
            p.y = x * sin + y * cos;
        }
    }

    /// Scale about the origin, per axis
    pub fn scale(&mut self, sx: f64, sy: f64) {
        for p in self.points.iter_mut() {
            p.x *= sx;
            p.y *= sy;
        }
    }

    /// Signed area (positive for counter-clockwise winding)
    pub fn area(&self) -> f64 {
        if !self.is_valid() {
            return 0.0;
        }
        let mut sum = 0.0;
        for i in 0..self.points.len() {
            let a = self.points[i];
            let b = self.points[(i + 1) % self.points.len()];
            sum += a.x * b.y - b.x * a.y;
        }
        0.5 * sum
    }

    /// Point-in-polygon test (even-odd ray casting); boundary points are
    /// not guaranteed either way
    pub fn contains(&self, point: Point2<f64>) -> bool {
        if !self.is_valid() {
            return false;
        }
        let mut inside = false;
        let n = self.points.len();
        let mut j = n - 1;
        for i in 0..n {
            let pi = self.points[i];
            let pj = self.points[j];
            if ((pi.y > point.y) != (pj.y > point.y))
                && (point.x < (pj.x - pi.x) * (point.y - pi.y) / (pj.y - pi.y) + pi.x)
            {
                inside = !inside;
            }
            j = i;
        }
        inside
    }
}

/// Convex hull of a 2D point cloud (monotone chain)
///
/// Returns the hull in counter-clockwise order starting from the
/// lowest-then-leftmost point; strictly collinear points are dropped.
/// Fewer than 3 input points come back unchanged.
pub fn convex_hull(points: &[Point2<f64>]) -> Polygon {
    if points.len() < 3 {
        return Polygon::from_points(points.to_vec());
    }

    let mut sorted: Vec<Point2<f64>> = points.to_vec();
    sorted.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
    sorted.dedup();
    if sorted.len() < 3 {
        return Polygon::from_points(sorted);
    }

    let cross = |o: Point2<f64>, a: Point2<f64>, b: Point2<f64>| -> f64 {
        (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
    };

    let mut lower: Vec<Point2<f64>> = Vec::new();
    for &p in &sorted {
        while lower.len() >= 2 && cross(lower[lower.len() - 2], lower[lower.len() - 1], p) <= 0.0 {
            lower.pop();
        }
        lower.push(p);
    }

    let mut upper: Vec<Point2<f64>> = Vec::new();
    for &p in sorted.iter().rev() {
        while upper.len() >= 2 && cross(upper[upper.len() - 2], upper[upper.len() - 1], p) <= 0.0 {
            upper.pop();
        }
        upper.push(p);
    }

    // Endpoints are shared between the chains
    lower.pop();
    upper.pop();
    lower.extend(upper);
    Polygon::from_points(lower)
}

fn to_path(polygon: &Polygon) -> Vec<(f64, f64)> {
    polygon.points.iter().map(|p| (p.x, p.y)).collect()
}

fn from_paths(paths: Vec<Vec<(f64, f64)>>) -> Vec<Polygon> {
    paths
        .into_iter()
        .filter(|path| path.len() >= 3)
        .map(|path| Polygon::from_points(path.into_iter().map(|(x, y)| Point2::new(x, y)).collect()))
        .collect()
}

/// Subtract `clips` from `subject` polygons
///
/// Used for the printable bed polygon minus its excluded rectangles. May
/// return zero polygons (fully clipped away) or several (subject cut into
/// pieces); degenerate sub-3-point results are dropped.
pub fn difference(subject: &[Polygon], clips: &[Polygon]) -> Result<Vec<Polygon>> {
    if subject.is_empty() {
        return Ok(Vec::new());
    }
    if clips.is_empty() {
        return Ok(subject.to_vec());
    }

    let subject_paths: Vec<Vec<(f64, f64)>> = subject.iter().map(to_path).collect();
    let clip_paths: Vec<Vec<(f64, f64)>> = clips.iter().map(to_path).collect();

    let result = clipper2::difference::<Centi>(subject_paths, clip_paths, FillRule::default())
        .map_err(|e| Error::PolygonClip(format!("{:?}", e)))?;

    let result_paths: Vec<Vec<(f64, f64)>> = result.into();
    Ok(from_paths(result_paths))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(size: f64) -> Polygon {
        Polygon::from_points(vec![
            Point2::new(0.0, 0.0),
            Point2::new(size, 0.0),
            Point2::new(size, size),
            Point2::new(0.0, size),
        ])
    }

    #[test]
    fn test_area_and_winding() {
        let sq = square(10.0);
        assert_eq!(sq.area(), 100.0);
        let mut reversed = sq.clone();
        reversed.points.reverse();
        assert_eq!(reversed.area(), -100.0);
        assert_eq!(Polygon::new().area(), 0.0);
    }

    #[test]
    fn test_contains() {
        let sq = square(10.0);
        assert!(sq.contains(Point2::new(5.0, 5.0)));
        assert!(!sq.contains(Point2::new(15.0, 5.0)));
        assert!(!sq.contains(Point2::new(-1.0, 5.0)));
    }

    #[test]
    fn test_rotate_and_scale() {
        let mut sq = square(2.0);
        sq.translate(Vector2::new(-1.0, -1.0)); // center on origin
        sq.rotate(std::f64::consts::FRAC_PI_2);
        // 90° rotation of a centered square maps it onto itself
        assert!((sq.area() - 4.0).abs() < 1e-12);
        assert!(sq.contains(Point2::new(0.9, 0.9)));
        sq.scale(2.0, 1.0);
        assert!((sq.area() - 8.0).abs() < 1e-12);
    }

    #[test]
    fn test_convex_hull_drops_interior_and_collinear() {
        let points = vec![
            Point2::new(0.0, 0.0),
            Point2::new(10.0, 0.0),
            Point2::new(10.0, 10.0),
            Point2::new(0.0, 10.0),
            Point2::new(5.0, 5.0),  // interior
            Point2::new(5.0, 0.0),  // collinear on an edge
            Point2::new(10.0, 5.0), // collinear on an edge
        ];
        let hull = convex_hull(&points);
        assert_eq!(hull.points.len(), 4);
        assert_eq!(hull.area(), 100.0); // counter-clockwise
        assert_eq!(hull.points[0], Point2::new(0.0, 0.0));
    }

    #[test]
    fn test_convex_hull_small_inputs() {
        let two = vec![Point2::new(0.0, 0.0), Point2::new(1.0, 1.0)];
        assert_eq!(convex_hull(&two).points.len(), 2);
        assert!(!convex_hull(&two).is_valid());
    }

    #[test]
    fn test_difference_cuts_corner() {
        let bed = square(100.0);
        let exclude = Polygon::from_points(vec![
            Point2::new(0.0, 0.0),
            Point2::new(20.0, 0.0),
            Point2::new(20.0, 20.0),
            Point2::new(0.0, 20.0),
        ]);
        let result = difference(&[bed], &[exclude]).unwrap();
        assert_eq!(result.len(), 1);
        let area = result[0].area().abs();
        assert!((area - 9600.0).abs() < 1.0, "area: {area}");
    }

    #[test]
    fn test_difference_empty_inputs() {
        let bed = square(100.0);
        assert!(difference(&[], &[bed.clone()]).unwrap().is_empty());
        let untouched = difference(&[bed.clone()], &[]).unwrap();
        assert_eq!(untouched.len(), 1);
        assert_eq!(untouched[0], bed);
    }
}
