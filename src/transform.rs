//! Decomposed 3D placements
//!
//! A [`Transformation`] stores offset, XYZ Euler rotation, per-axis scale
//! and per-axis mirror as independent components and derives the homogeneous
//! matrix on demand. Keeping the components primary (instead of the matrix)
//! is what lets interactive manipulation adjust one aspect without
//! accumulating drift in the others; the matrix is a cache invalidated by
//! every setter.
//!
//! Composition order is fixed: `M = T · Rz · Ry · Rx · S(scale ∘ mirror)`.

use nalgebra::{Matrix3, Matrix4, Rotation3, Scale3, Translation3, Vector3};

/// Geometric comparison tolerance used throughout the crate, in millimeters
/// (or radians for angles)
pub const EPSILON: f64 = 1e-4;

/// Wrap an angle into `[0, 2π)`, snapping values within [`EPSILON`] of a
/// full turn back to zero
fn normalize_angle(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(std::f64::consts::TAU);
    if std::f64::consts::TAU - wrapped < EPSILON {
        0.0
    } else {
        wrapped
    }
}

/// Snap a mirror component to ±1; zero counts as un-mirrored
fn normalize_mirror(component: f64) -> f64 {
    if component == 0.0 {
        1.0
    } else {
        component.signum()
    }
}

/// Placement of a volume inside an object, or an instance on the bed
///
/// Rotation is stored as XYZ Euler angles in radians, normalized to
/// `[0, 2π)`. Scale components are strictly positive; axis flips are
/// expressed through the mirror component, which is always ±1 per axis.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Transformation {
    offset: Vector3<f64>,
    rotation: Vector3<f64>,
    scaling_factor: Vector3<f64>,
    mirror: Vector3<f64>,
    #[cfg_attr(feature = "serde", serde(skip))]
    matrix: crate::id::Cached<Matrix4<f64>>,
}

impl Default for Transformation {
    fn default() -> Self {
        Transformation {
            offset: Vector3::zeros(),
            rotation: Vector3::zeros(),
            scaling_factor: Vector3::new(1.0, 1.0, 1.0),
            mirror: Vector3::new(1.0, 1.0, 1.0),
            matrix: crate::id::Cached::new(),
        }
    }
}

impl Transformation {
    /// Identity placement
    pub fn new() -> Self {
        Transformation::default()
    }

    /// Placement consisting of a pure translation
    pub fn from_offset(offset: Vector3<f64>) -> Self {
        let mut t = Transformation::new();
        t.set_offset(offset);
        t
    }

    /// Recover components from a homogeneous matrix
    ///
    /// Mirroring cannot be attributed to a specific axis from a matrix
    /// alone; a left-handed linear part is normalized to a mirror on X.
    pub fn from_matrix(matrix: &Matrix4<f64>) -> Self {
        let mut t = Transformation::new();
        t.set_offset(matrix.fixed_view::<3, 1>(0, 3).into_owned());

        let mut linear: Matrix3<f64> = matrix.fixed_view::<3, 3>(0, 0).into_owned();
        let mut mirror = Vector3::new(1.0, 1.0, 1.0);
        if linear.column(0).dot(&linear.column(1).cross(&linear.column(2))) < 0.0 {
            mirror.x = -1.0;
            let flipped = -linear.column(0).into_owned();
            linear.set_column(0, &flipped);
        }
        t.set_mirror(mirror);

        let scale = Vector3::new(
            linear.column(0).norm(),
            linear.column(1).norm(),
            linear.column(2).norm(),
        );
        t.set_scaling_factor(scale);

        for i in 0..3 {
            let normalized = linear.column(i).normalize();
            linear.set_column(i, &normalized);
        }
        let (roll, pitch, yaw) = Rotation3::from_matrix_unchecked(linear).euler_angles();
        t.set_rotation(Vector3::new(roll, pitch, yaw));
        t
    }

    /// Translation component
    pub fn offset(&self) -> Vector3<f64> {
        self.offset
    }

    /// Set the translation component
    pub fn set_offset(&mut self, offset: Vector3<f64>) {
        if self.offset != offset {
            self.offset = offset;
            self.matrix.invalidate();
        }
    }

    /// XYZ Euler angles in radians, each in `[0, 2π)`
    pub fn rotation(&self) -> Vector3<f64> {
        self.rotation
    }

    /// Set the rotation; angles are normalized into `[0, 2π)`
    pub fn set_rotation(&mut self, rotation: Vector3<f64>) {
        let rotation = rotation.map(normalize_angle);
        if self.rotation != rotation {
            self.rotation = rotation;
            self.matrix.invalidate();
        }
    }

    /// Per-axis scale factors, all non-negative
    pub fn scaling_factor(&self) -> Vector3<f64> {
        self.scaling_factor
    }

    /// Uniform scale accessor; meaningful only when all three components
    /// match
    pub fn is_scaling_uniform(&self) -> bool {
        (self.scaling_factor.x - self.scaling_factor.y).abs() < EPSILON
            && (self.scaling_factor.x - self.scaling_factor.z).abs() < EPSILON
    }

    /// Set the per-axis scale factors
    pub fn set_scaling_factor(&mut self, scaling_factor: Vector3<f64>) {
        debug_assert!(
            scaling_factor.iter().all(|s| *s >= 0.0),
            "negative scale must be expressed through the mirror component"
        );
        if self.scaling_factor != scaling_factor {
            self.scaling_factor = scaling_factor;
            self.matrix.invalidate();
        }
    }

    /// Per-axis mirror, each component ±1
    pub fn mirror(&self) -> Vector3<f64> {
        self.mirror
    }

    /// Set the mirror; components are snapped to ±1
    pub fn set_mirror(&mut self, mirror: Vector3<f64>) {
        let mirror = mirror.map(normalize_mirror);
        if self.mirror != mirror {
            self.mirror = mirror;
            self.matrix.invalidate();
        }
    }

    /// Flip one axis of the mirror component
    pub fn toggle_mirror_axis(&mut self, axis: usize) {
        let mut mirror = self.mirror;
        mirror[axis] = -mirror[axis];
        self.set_mirror(mirror);
    }

    /// Clear the translation component
    pub fn reset_offset(&mut self) {
        self.set_offset(Vector3::zeros());
    }

    /// Clear the rotation component
    pub fn reset_rotation(&mut self) {
        self.set_rotation(Vector3::zeros());
    }

    /// Reset scaling to 1 on every axis
    pub fn reset_scaling_factor(&mut self) {
        self.set_scaling_factor(Vector3::new(1.0, 1.0, 1.0));
    }

    /// Reset mirroring to none
    pub fn reset_mirror(&mut self) {
        self.set_mirror(Vector3::new(1.0, 1.0, 1.0));
    }

    /// True iff the placement flips orientation (odd number of mirrored
    /// axes); triangle winding must be reversed when applying it to a mesh
    pub fn is_left_handed(&self) -> bool {
        let signs = self.mirror.x.signum()
            * self.mirror.y.signum()
            * self.mirror.z.signum()
            * self.scaling_factor.x.signum()
            * self.scaling_factor.y.signum()
            * self.scaling_factor.z.signum();
        signs < 0.0
    }

    /// The homogeneous matrix `T · Rz · Ry · Rx · S(scale ∘ mirror)`
    pub fn matrix(&self) -> Matrix4<f64> {
        self.matrix.get_or_compute(|| {
            let rotation = Rotation3::from_euler_angles(
                self.rotation.x,
                self.rotation.y,
                self.rotation.z,
            );
            let scale = Scale3::from(self.scaling_factor.component_mul(&self.mirror));
            Translation3::from(self.offset).to_homogeneous()
                * rotation.to_homogeneous()
                * scale.to_homogeneous()
        })
    }

    /// The matrix with the translation removed; used when transforming
    /// directions and when instances bake rotation but not placement
    pub fn matrix_no_offset(&self) -> Matrix4<f64> {
        let mut m = self.matrix();
        m[(0, 3)] = 0.0;
        m[(1, 3)] = 0.0;
        m[(2, 3)] = 0.0;
        m
    }
}

impl PartialEq for Transformation {
    fn eq(&self, other: &Self) -> bool {
        self.offset == other.offset
            && self.rotation == other.rotation
            && self.scaling_factor == other.scaling_factor
            && self.mirror == other.mirror
    }
}

/// True iff every Euler component is within 0.001 rad of a multiple of 90°
///
/// Placements satisfying this keep a world-axis-aligned box axis-aligned, so
/// per-axis scaling and rotation baking remain representable without
/// touching the mesh.
pub fn is_rotation_ninety_degrees(rotation: Vector3<f64>) -> bool {
    rotation.iter().all(|&component| {
        let mut a = component.abs() % std::f64::consts::FRAC_PI_2;
        if a > std::f64::consts::FRAC_PI_4 {
            a = std::f64::consts::FRAC_PI_2 - a;
        }
        a < 0.001
    })
}

/// Signed angle about the world Z axis taking rotation `from` to `to`
///
/// Only meaningful when the two rotations actually differ by a Z rotation;
/// any residual off-axis difference is a caller bug.
pub fn rotation_diff_z(from: Vector3<f64>, to: Vector3<f64>) -> f64 {
    let diff = Rotation3::from_euler_angles(to.x, to.y, to.z)
        * Rotation3::from_euler_angles(from.x, from.y, from.z).inverse();
    match diff.axis_angle() {
        Some((axis, angle)) => {
            debug_assert!(
                axis.x.abs() < 1e-6 && axis.y.abs() < 1e-6,
                "rotations differ by more than a Z rotation"
            );
            if axis.z < 0.0 { -angle } else { angle }
        }
        None => 0.0,
    }
}
