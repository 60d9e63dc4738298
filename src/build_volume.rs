//! Print-volume containment classification
//!
//! A [`BuildVolume`] describes the printable space of a machine: the bed
//! outline (rectangle, circle, or an arbitrary convex outline) extruded up
//! to the maximum print height. Placed geometry is classified against it to
//! drive the per-instance printable state.
//!
//! All tests are padded by [`EPSILON`] so geometry touching a face of the
//! volume still counts as inside; slicers place objects exactly on the bed
//! and frequently exactly at the bed edge.

use nalgebra::{Matrix4, Point2, Point3, Vector2};

use crate::mesh::{BoundingBox3, TriangleMesh};
use crate::polygon::{convex_hull, Polygon};
use crate::transform::EPSILON;

/// Containment state of one piece of placed geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectState {
    /// Completely inside the printable space
    Inside,
    /// Partly inside, partly outside
    Colliding,
    /// Completely outside
    Outside,
    /// Completely below the bed surface; does not make the whole object
    /// unprintable when other volumes are still inside
    Below,
}

/// Bed outline class, detected from the configured bed polygon
///
/// The class picks the containment test: rectangles compare axis-aligned
/// boxes, circles compare squared radii, anything else falls back to a
/// point-in-convex-polygon walk.
#[derive(Debug, Clone, PartialEq)]
enum BedShape {
    Rectangle,
    Circle { center: Point2<f64>, radius: f64 },
    Convex { outline: Polygon },
}

/// Printable space of the machine
#[derive(Debug, Clone, PartialEq)]
pub struct BuildVolume {
    shape: BedShape,
    /// Bed polygon XY extents extruded to `max_print_height`
    bounding_volume: BoundingBox3,
    /// Zero means unlimited height
    max_print_height: f64,
}

impl BuildVolume {
    /// Build from the configured bed polygon and maximum print height
    ///
    /// The polygon is classified: an outline filling its own bounding box is
    /// a rectangle, points equidistant from their centroid are a
    /// discretized circle, anything else is handled through its convex
    /// hull.
    pub fn new(bed_shape: &[Point2<f64>], max_print_height: f64) -> Self {
        debug_assert!(max_print_height >= 0.0);
        let mut min = Point2::new(f64::MAX, f64::MAX);
        let mut max = Point2::new(f64::MIN, f64::MIN);
        for p in bed_shape {
            min = Point2::new(min.x.min(p.x), min.y.min(p.y));
            max = Point2::new(max.x.max(p.x), max.y.max(p.y));
        }
        if bed_shape.len() < 3 {
            min = Point2::origin();
            max = Point2::origin();
        }

        let top = if max_print_height == 0.0 {
            f64::MAX
        } else {
            max_print_height
        };
        let bounding_volume = BoundingBox3::from_min_max(
            Point3::new(min.x, min.y, 0.0),
            Point3::new(max.x, max.y, top),
        );

        let shape = classify_bed_shape(bed_shape, min, max);
        BuildVolume {
            shape,
            bounding_volume,
            max_print_height,
        }
    }

    /// The axis-aligned extents of the printable space
    pub fn bounding_volume(&self) -> &BoundingBox3 {
        &self.bounding_volume
    }

    /// Maximum print height in millimeters; zero means unlimited
    pub fn max_print_height(&self) -> f64 {
        self.max_print_height
    }

    /// Classify a mesh placed by `matrix` against the printable space
    ///
    /// With `may_be_below_print_bed`, geometry under the bed surface is
    /// reported as [`ObjectState::Below`] instead of outside, and sunk
    /// parts of partially lowered geometry do not count against it.
    pub fn object_state(
        &self,
        mesh: &TriangleMesh,
        matrix: &Matrix4<f64>,
        may_be_below_print_bed: bool,
    ) -> ObjectState {
        if mesh.is_empty() {
            return ObjectState::Inside;
        }
        let bbox = mesh.transformed_bounding_box(matrix);
        if bbox.max.z < EPSILON {
            return if may_be_below_print_bed {
                ObjectState::Below
            } else {
                ObjectState::Outside
            };
        }

        match &self.shape {
            BedShape::Rectangle => {
                let mut volume = self.bounding_volume.inflated(EPSILON);
                if self.max_print_height == 0.0 {
                    volume.max.z = f64::MAX;
                }
                if may_be_below_print_bed {
                    volume.min.z = f64::MIN;
                }
                if volume.contains(&bbox) {
                    ObjectState::Inside
                } else if volume.intersects(&bbox) {
                    ObjectState::Colliding
                } else {
                    ObjectState::Outside
                }
            }
            BedShape::Circle { center, radius } => {
                let padded_sq = (radius + EPSILON) * (radius + EPSILON);
                self.classify_vertices(mesh, matrix, may_be_below_print_bed, |p| {
                    (p - center).norm_squared() <= padded_sq
                })
            }
            BedShape::Convex { outline } => {
                self.classify_vertices(mesh, matrix, may_be_below_print_bed, |p| {
                    outline.contains(p)
                })
            }
        }
    }

    /// Per-vertex walk for the non-rectangular shapes: every vertex votes
    /// inside or outside, sunk vertices abstain when allowed below the bed
    fn classify_vertices(
        &self,
        mesh: &TriangleMesh,
        matrix: &Matrix4<f64>,
        may_be_below_print_bed: bool,
        contains_xy: impl Fn(Point2<f64>) -> bool,
    ) -> ObjectState {
        let mut inside = false;
        let mut outside = false;
        for v in &mesh.vertices {
            let p = matrix.transform_point(&Point3::new(v.x as f64, v.y as f64, v.z as f64));
            if may_be_below_print_bed && p.z < -EPSILON {
                continue;
            }
            let in_height = p.z > -EPSILON
                && (self.max_print_height == 0.0 || p.z < self.max_print_height + EPSILON);
            if in_height && contains_xy(Point2::new(p.x, p.y)) {
                inside = true;
            } else {
                outside = true;
            }
            if inside && outside {
                return ObjectState::Colliding;
            }
        }
        if inside {
            ObjectState::Inside
        } else {
            ObjectState::Outside
        }
    }
}

/// Pick the containment class for a bed polygon
fn classify_bed_shape(bed_shape: &[Point2<f64>], min: Point2<f64>, max: Point2<f64>) -> BedShape {
    if bed_shape.len() < 3 {
        return BedShape::Rectangle;
    }

    let outline = Polygon::from_points(bed_shape.to_vec());
    let bbox_area = (max.x - min.x) * (max.y - min.y);
    if bed_shape.len() >= 4 && (outline.area().abs() - bbox_area).abs() < EPSILON * bbox_area.max(1.0)
    {
        return BedShape::Rectangle;
    }

    // A circular bed arrives as a discretized polygon; recognize it by the
    // spread of the vertex distances from the centroid.
    if bed_shape.len() > 4 {
        let centroid = bed_shape
            .iter()
            .fold(Vector2::zeros(), |acc, p| acc + p.coords)
            / bed_shape.len() as f64;
        let center = Point2::from(centroid);
        let mut min_r = f64::MAX;
        let mut max_r: f64 = 0.0;
        for p in bed_shape {
            let r = (p - center).norm();
            min_r = min_r.min(r);
            max_r = max_r.max(r);
        }
        if max_r > 0.0 && (max_r - min_r) / max_r < 0.01 {
            return BedShape::Circle {
                center,
                radius: max_r,
            };
        }
    }

    BedShape::Convex {
        outline: convex_hull(bed_shape),
    }
}
