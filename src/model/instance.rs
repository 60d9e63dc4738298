//! Placed copies of an object
//!
//! A [`ModelInstance`] is one placement of its object on the bed: an
//! affine transformation plus print state (printable flag, position
//! relative to the build volume) and bookkeeping for the arrangement and
//! assembly views. Instances never own geometry; they apply their matrix
//! to meshes, boxes and polygons handed in by the object.

use nalgebra::{Matrix4, Point3, Rotation3, Unit, Vector2, Vector3};

use crate::id::{Cached, ObjectId};
use crate::mesh::{BoundingBox3, TriangleMesh};
use crate::polygon::Polygon;
use crate::transform::Transformation;

use super::object::ModelObject;
use super::params::PrintParams;

/// Where an instance sits relative to the printable volume. Maintained by
/// [`ModelObject::update_instances_print_volume_state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum InstancePrintVolumeState {
    /// Every model part is fully inside the printable volume
    Inside,
    /// Some parts are inside, some are not
    PartlyOutside,
    /// No part is inside
    FullyOutside,
}

impl Default for InstancePrintVolumeState {
    fn default() -> Self {
        InstancePrintVolumeState::Inside
    }
}

/// Footprint of one instance handed to the 2D bed arrangement.
///
/// `poly` is the convex footprint with the instance's XY offset and Z
/// rotation factored out; those travel separately in `translation` and
/// `rotation` so the arranger can move the piece without re-deriving the
/// polygon. All lengths are millimeters.
#[derive(Debug, Clone)]
pub struct ArrangePolygon {
    /// Convex footprint, offset- and Z-rotation-free
    pub poly: Polygon,
    /// Current XY offset of the instance
    pub translation: Vector2<f64>,
    /// Current rotation around Z
    pub rotation: f64,
    /// Extruders the object prints with, never empty
    pub extrude_ids: Vec<i32>,
    /// Bed the instance is assigned to
    pub bed_idx: usize,
}

/// One placement of a [`ModelObject`] on the bed.
#[derive(Debug, Clone)]
pub struct ModelInstance {
    id: ObjectId,
    transformation: Transformation,
    assemble_transformation: Transformation,
    offset_to_assembly: Vector3<f64>,
    assemble_initialized: bool,
    /// Position relative to the printable volume
    pub print_volume_state: InstancePrintVolumeState,
    /// User switch excluding this instance from the print
    pub printable: bool,
    /// Position assigned by the last arrangement run
    pub arrange_order: i32,
    /// Instance id recorded in the source file, 0 when generated
    pub loaded_id: usize,
    convex_hull_2d: Cached<Polygon>,
}

impl ModelInstance {
    /// Instance at the origin with identity placement
    pub fn new() -> Self {
        ModelInstance {
            id: ObjectId::next(),
            transformation: Transformation::default(),
            assemble_transformation: Transformation::default(),
            offset_to_assembly: Vector3::zeros(),
            assemble_initialized: false,
            print_volume_state: InstancePrintVolumeState::Inside,
            printable: true,
            arrange_order: 0,
            loaded_id: 0,
            convex_hull_2d: Cached::new(),
        }
    }

    /// New instance at `other`'s placement. The copy gets a fresh id and
    /// fresh runtime state: print volume state back to `Inside`, assemble
    /// transform kept but marked uninitialized, arrange order and loaded
    /// id not carried over.
    pub fn from_other(other: &ModelInstance) -> Self {
        ModelInstance {
            id: ObjectId::next(),
            transformation: other.transformation.clone(),
            assemble_transformation: other.assemble_transformation.clone(),
            offset_to_assembly: other.offset_to_assembly,
            assemble_initialized: false,
            print_volume_state: InstancePrintVolumeState::Inside,
            printable: other.printable,
            arrange_order: 0,
            loaded_id: 0,
            convex_hull_2d: Cached::new(),
        }
    }

    /// Stable identity of this instance
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Re-key the instance so a copy can coexist with its source
    pub fn set_new_unique_id(&mut self) {
        self.id = ObjectId::next();
    }

    // --- placement ---

    /// Placement of the instance on the bed
    pub fn transformation(&self) -> &Transformation {
        &self.transformation
    }

    /// Replace the placement wholesale
    pub fn set_transformation(&mut self, transformation: Transformation) {
        self.transformation = transformation;
    }

    /// Composed placement matrix
    pub fn matrix(&self) -> Matrix4<f64> {
        self.transformation.matrix()
    }

    /// Composed placement matrix without the translation
    pub fn matrix_no_offset(&self) -> Matrix4<f64> {
        self.transformation.matrix_no_offset()
    }

    /// Translation component of the placement
    pub fn offset(&self) -> Vector3<f64> {
        self.transformation.offset()
    }

    /// Set the translation component of the placement
    pub fn set_offset(&mut self, offset: Vector3<f64>) {
        self.transformation.set_offset(offset);
    }

    /// Rotation component as XYZ Euler angles
    pub fn rotation(&self) -> Vector3<f64> {
        self.transformation.rotation()
    }

    /// Set the rotation component
    pub fn set_rotation(&mut self, rotation: Vector3<f64>) {
        self.transformation.set_rotation(rotation);
    }

    /// Per-axis scale factors of the placement
    pub fn scaling_factor(&self) -> Vector3<f64> {
        self.transformation.scaling_factor()
    }

    /// Set the per-axis scale factors
    pub fn set_scaling_factor(&mut self, scaling_factor: Vector3<f64>) {
        self.transformation.set_scaling_factor(scaling_factor);
    }

    /// Mirror component of the placement
    pub fn mirror(&self) -> Vector3<f64> {
        self.transformation.mirror()
    }

    /// Set the mirror component
    pub fn set_mirror(&mut self, mirror: Vector3<f64>) {
        self.transformation.set_mirror(mirror);
    }

    /// True when the placement flips orientation (odd mirror count)
    pub fn is_left_handed(&self) -> bool {
        self.transformation.is_left_handed()
    }

    // --- assembly view ---

    /// Placement used by the assembly/exploded view
    pub fn assemble_transformation(&self) -> &Transformation {
        &self.assemble_transformation
    }

    /// Replace the assembly placement and mark it as set
    pub fn set_assemble_transformation(&mut self, transformation: Transformation) {
        self.assemble_initialized = true;
        self.assemble_transformation = transformation;
    }

    /// As [`set_assemble_transformation`](Self::set_assemble_transformation),
    /// decomposing a raw matrix
    pub fn set_assemble_from_transform(&mut self, transform: &Matrix4<f64>) {
        self.assemble_initialized = true;
        self.assemble_transformation = Transformation::from_matrix(transform);
    }

    /// Move the assembly placement without marking it as set
    pub fn set_assemble_offset(&mut self, offset: Vector3<f64>) {
        self.assemble_transformation.set_offset(offset);
    }

    /// Compose an axis/angle rotation onto the assemble rotation
    pub fn rotate_assemble(&mut self, angle: f64, axis: Vector3<f64>) {
        let rotation = Rotation3::from_axis_angle(&Unit::new_normalize(axis), angle);
        let (roll, pitch, yaw) = rotation.euler_angles();
        self.assemble_transformation
            .set_rotation(self.assemble_transformation.rotation() + Vector3::new(roll, pitch, yaw));
    }

    /// Whether an assembly placement was ever set explicitly
    pub fn is_assemble_initialized(&self) -> bool {
        self.assemble_initialized
    }

    /// Shift between bed placement and assembly placement
    pub fn offset_to_assembly(&self) -> Vector3<f64> {
        self.offset_to_assembly
    }

    /// Record the shift between bed and assembly placements
    pub fn set_offset_to_assembly(&mut self, offset: Vector3<f64>) {
        self.offset_to_assembly = offset;
    }

    // --- applying the placement to external geometry ---

    fn selected_matrix(&self, dont_translate: bool) -> Matrix4<f64> {
        if dont_translate {
            self.matrix_no_offset()
        } else {
            self.matrix()
        }
    }

    /// Transform an external mesh in place
    pub fn transform_mesh(&self, mesh: &mut TriangleMesh, dont_translate: bool) {
        mesh.transform(&self.selected_matrix(dont_translate), false);
    }

    /// Transform an external box. The result is axis-aligned again and
    /// therefore no longer snug.
    pub fn transform_bounding_box(&self, bbox: &BoundingBox3, dont_translate: bool) -> BoundingBox3 {
        bbox.transformed(&self.selected_matrix(dont_translate))
    }

    /// Transform an external point expressed as a vector from the origin
    pub fn transform_vector(&self, v: &Vector3<f64>, dont_translate: bool) -> Vector3<f64> {
        self.selected_matrix(dont_translate)
            .transform_point(&Point3::from(*v))
            .coords
    }

    /// Rotate and scale an external polygon around its own origin. The
    /// offset is not applied.
    pub fn transform_polygon(&self, polygon: &mut Polygon) {
        polygon.rotate(self.rotation().z);
        let scaling = self.scaling_factor();
        polygon.scale(scaling.x, scaling.y);
    }

    // --- print state ---

    /// Printable iff the object allows it, this instance allows it, and
    /// the instance sits fully inside the printable volume
    pub fn is_printable(&self, object: &ModelObject) -> bool {
        object.printable
            && self.printable
            && self.print_volume_state == InstancePrintVolumeState::Inside
    }

    /// World-XY convex footprint of this instance.
    ///
    /// Always re-derived from the object's cached hull under the current
    /// matrix; only the last result is stored, so callers can diff against
    /// [`cached_convex_hull_2d`](Self::cached_convex_hull_2d).
    pub fn get_convex_hull_2d(&self, object: &ModelObject) -> Polygon {
        let hull = object.convex_hull_2d(&self.matrix());
        self.convex_hull_2d.set(hull.clone());
        hull
    }

    /// Footprint from the last [`get_convex_hull_2d`](Self::get_convex_hull_2d)
    /// call, if any
    pub fn cached_convex_hull_2d(&self) -> Option<Polygon> {
        self.convex_hull_2d.get()
    }

    /// Drop the stored footprint
    pub fn invalidate_convex_hull_2d(&self) {
        self.convex_hull_2d.invalidate();
    }

    // --- arrangement ---

    /// Footprint record consumed by the bed arranger. The instance's XY
    /// offset and Z rotation are stripped from the polygon and reported
    /// separately; extruder ids are collected from the model-part volumes,
    /// defaulting to `[1]`.
    pub fn get_arrange_polygon(&self, object: &ModelObject) -> ArrangePolygon {
        let offset = self.offset();
        let rotation = self.rotation();
        let mut footprint_trafo = self.transformation.clone();
        footprint_trafo.set_offset(Vector3::new(0.0, 0.0, offset.z));
        footprint_trafo.set_rotation(Vector3::new(rotation.x, rotation.y, 0.0));
        let poly = object.convex_hull_2d(&footprint_trafo.matrix());

        let mut extrude_ids = Vec::new();
        for volume in &object.volumes {
            if volume.is_model_part() {
                extrude_ids.extend(volume.get_extruders(&object.config));
            }
        }
        if extrude_ids.is_empty() {
            extrude_ids.push(1);
        }

        ArrangePolygon {
            poly,
            translation: Vector2::new(offset.x, offset.y),
            rotation: rotation.z,
            extrude_ids,
            bed_idx: 0,
        }
    }

    /// Write an arrangement result back: Z rotation and XY offset, keeping
    /// the other components
    pub fn apply_arrange_result(&mut self, offset: Vector2<f64>, rotation: f64) {
        let mut r = self.rotation();
        r.z = rotation;
        self.set_rotation(r);
        let mut o = self.offset();
        o.x = offset.x;
        o.y = offset.y;
        self.set_offset(o);
    }

    // --- brim heuristics ---

    /// Automatic brim width. The adaptive heuristic is switched off; use
    /// [`auto_brim_width_with`](Self::auto_brim_width_with) with explicit
    /// parameters to evaluate it.
    pub fn auto_brim_width(&self) -> f64 {
        0.0
    }

    /// Adaptive brim width from the instance footprint, print speed and
    /// filament thermal length. Brims under 5mm that are also under 1.5×
    /// the thermal length are dropped entirely.
    pub fn auto_brim_width_with(
        &self,
        _delta_t: f64,
        adhesion: f64,
        object: &ModelObject,
        params: &PrintParams,
    ) -> f64 {
        let raw_bbox = object.raw_mesh_bounding_box();
        let max_speed = params.find_max_speed(object);
        let size = self.transform_bounding_box(&raw_bbox, false).size();
        let height_to_area =
            (size.z / (size.x * size.x * size.y)).max(size.z / (size.y * size.y * size.x));
        let thermal_length = size.x.hypot(size.y);
        let thermal_length_ref = params.thermal_length_of(object);

        let brim_width = adhesion
            * (height_to_area * 200.0 * max_speed / 200.0)
                .max(thermal_length * 8.0 / thermal_length_ref * size.z.min(30.0) / 30.0)
                .min(20.0)
                .min(1.5 * thermal_length);
        // small brims are omitted
        if brim_width < 5.0 && brim_width < 1.5 * thermal_length {
            0.0
        } else {
            brim_width
        }
    }
}

impl Default for ModelInstance {
    fn default() -> Self {
        ModelInstance::new()
    }
}
