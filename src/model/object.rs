//! Printable objects: volume lists, instance lists and derived geometry
//!
//! A [`ModelObject`] owns its [`ModelVolume`]s (the geometry) and its
//! [`ModelInstance`]s (the placements), plus per-object print overrides,
//! layer-range overrides and a variable layer height profile. Everything
//! expensive derived from that state lives in lazily computed caches that
//! the mutating operations invalidate; a pure translation instead shifts
//! the still-valid world-space boxes in place.
//!
//! Geometry flows through three frames: the mesh frame (vertices as
//! stored), the object frame (volume transforms applied) and the world
//! frame (instance transforms applied). `raw_*` accessors stop at the
//! object frame, everything else is world space.

use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;

use nalgebra::{Matrix4, Point3, Vector2, Vector3};

use crate::boolean::{BooleanOp, MeshBoolean};
use crate::build_volume::{BuildVolume, ObjectState};
use crate::config::{ConfigValue, ObjectConfig};
use crate::error::{Error, Result};
use crate::id::{Cached, ObjectId, Timestamp};
use crate::mesh::{BoundingBox3, TriangleMesh};
use crate::polygon::{convex_hull, Polygon};
use crate::transform::{is_rotation_ninety_degrees, rotation_diff_z, Transformation, EPSILON};

use super::instance::{InstancePrintVolumeState, ModelInstance};
use super::volume::{ModelVolume, VolumeSource, VolumeType};

/// Instances sunk no deeper than this below the bed still count as resting
/// on it and get lifted back by [`ModelObject::ensure_on_bed`].
pub const SINKING_Z_THRESHOLD: f64 = -0.001;

/// Minimal height a multi-part object must keep above the bed.
pub const SINKING_MIN_Z_THRESHOLD: f64 = 0.05;

/// Unit conversion applied by [`ModelObject::convert_units`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConversionType {
    /// Geometry authored in inches, scale up into millimeters
    FromInches,
    /// Scale millimeter geometry down to inches
    ToInches,
    /// Geometry authored in meters, scale up into millimeters
    FromMeters,
    /// Scale millimeter geometry down to meters
    ToMeters,
}

impl ConversionType {
    /// Scale factor applied to vertices and volume offsets
    pub fn factor(self) -> f64 {
        match self {
            ConversionType::FromInches => 25.4,
            ConversionType::ToInches => 0.039_370_078_7,
            ConversionType::FromMeters => 1000.0,
            ConversionType::ToMeters => 0.001,
        }
    }
}

/// Identity of the cut operation an object came from
///
/// All pieces carved from one source object carry equal cut ids; that is
/// how the pieces find their siblings again, e.g. when a whole cut set is
/// unit-converted at once. The check sum counts the parts the cut
/// produced, the connector count the plugs/dowels added to rejoin them.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CutId {
    id: ObjectId,
    check_sum: usize,
    connectors_cnt: usize,
}

impl CutId {
    /// A not-cut marker (invalid id)
    pub fn new() -> Self {
        CutId {
            id: ObjectId::invalid(),
            check_sum: 1,
            connectors_cnt: 0,
        }
    }

    /// Mark the owning object as part of a cut
    pub fn init(&mut self) {
        self.id = ObjectId::next();
    }

    /// True when the owning object is part of a cut
    pub fn is_valid(&self) -> bool {
        self.id.is_valid()
    }

    /// Back to the not-cut state
    pub fn invalidate(&mut self) {
        self.id = ObjectId::invalid();
        self.check_sum = 1;
        self.connectors_cnt = 0;
    }

    /// Two objects belong to the same cut iff all three fields agree
    pub fn is_equal(&self, other: &CutId) -> bool {
        self.id == other.id
            && self.check_sum == other.check_sum
            && self.connectors_cnt == other.connectors_cnt
    }

    /// Cut this object belongs to; invalid when not cut
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Edit counter of the cut, starts at 1
    pub fn check_sum(&self) -> usize {
        self.check_sum
    }

    /// Number of connectors placed on the cut plane
    pub fn connectors_cnt(&self) -> usize {
        self.connectors_cnt
    }

    /// Record an edit to the cut
    pub fn increase_check_sum(&mut self) {
        self.check_sum += 1;
    }

    /// Record one more connector on the cut plane
    pub fn increase_connectors_cnt(&mut self) {
        self.connectors_cnt += 1;
    }
}

impl Default for CutId {
    fn default() -> Self {
        CutId::new()
    }
}

/// Variable layer height profile painted over an object
///
/// A flat list of `(print_z, layer_height)` pairs. Identity plus timestamp
/// let consumers detect changes without diffing the data.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LayerHeightProfile {
    id: ObjectId,
    #[cfg_attr(feature = "serde", serde(skip))]
    timestamp: Timestamp,
    data: Vec<f64>,
}

impl LayerHeightProfile {
    /// Empty profile with a fresh identity
    pub fn new() -> Self {
        LayerHeightProfile {
            id: ObjectId::next(),
            timestamp: Timestamp::initial(),
            data: Vec::new(),
        }
    }

    /// Identity of this profile
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Give this profile a distinct identity
    pub fn set_new_unique_id(&mut self) {
        self.id = ObjectId::next();
    }

    /// Change counter, bumped on every mutation
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Fast-path change check against another profile
    pub fn timestamp_matches(&self, other: &LayerHeightProfile) -> bool {
        self.timestamp.matches(other.timestamp)
    }

    /// The flat `(print_z, layer_height)` pair list
    pub fn get(&self) -> &[f64] {
        &self.data
    }

    /// True iff no profile has been painted
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Replace the profile; a no-op when the data is unchanged
    pub fn set(&mut self, data: Vec<f64>) {
        if self.data != data {
            self.data = data;
            self.timestamp.touch();
        }
    }

    /// Drop the profile; registers as a change
    pub fn clear(&mut self) {
        self.data.clear();
        self.timestamp.touch();
    }

    /// Copy content and timestamp from `other`, skipping the copy when the
    /// timestamps already match; the identity is not copied
    pub fn assign(&mut self, other: &LayerHeightProfile) {
        if !self.timestamp.matches(other.timestamp) {
            self.data = other.data.clone();
            self.timestamp = other.timestamp;
        }
    }
}

impl Default for LayerHeightProfile {
    fn default() -> Self {
        LayerHeightProfile::new()
    }
}

/// One band of per-height configuration overrides
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LayerRange {
    /// Z interval `[min, max)` in object coordinates
    pub z_range: (f64, f64),
    /// Options overriding the object config inside the band
    pub config: ObjectConfig,
}

impl LayerRange {
    /// Band over `[min_z, max_z)` with an empty override set
    pub fn new(min_z: f64, max_z: f64) -> Self {
        LayerRange {
            z_range: (min_z, max_z),
            config: ObjectConfig::new(),
        }
    }
}

/// A printable object: volumes, instances, overrides and derived caches
///
/// Four bounding box caches cover the common queries: the approximate
/// world box (instances applied to the object-frame box), the exact world
/// box (per-instance tight boxes merged), the object-frame box under the
/// first instance's rotation/scaling, and the plain object-frame box. The
/// exact box additionally tracks whether just its Z slice is up to date,
/// because `min_z`/`max_z` can be refreshed much cheaper than the full
/// box. All caches are cleared by [`ModelObject::invalidate_bounding_box`].
#[derive(Debug, Clone)]
pub struct ModelObject {
    id: ObjectId,
    /// Display name, also the stem for names of split/boolean results
    pub name: String,
    /// Sub-assembly the object belongs to in the originating CAD project
    pub module_name: String,
    /// Path the object was loaded from; cleared by operations that
    /// disconnect the geometry from its source file
    pub input_file: String,
    /// The geometry; order is meaningful (see [`ModelObject::sort_volumes`])
    pub volumes: Vec<ModelVolume>,
    /// The placements; one entry per printed copy
    pub instances: Vec<ModelInstance>,
    /// Per-object print setting overrides
    pub config: ObjectConfig,
    /// Per-height-band print setting overrides
    pub layer_config_ranges: Vec<LayerRange>,
    /// Variable layer height profile
    pub layer_height_profile: LayerHeightProfile,
    /// Master printable switch; instances also carry their own
    pub printable: bool,
    /// Total translation applied by [`ModelObject::center_around_origin`],
    /// kept so the original position can be restored
    pub origin_translation: Vector3<f64>,
    /// Cut provenance; invalid when the object is not a cut piece
    pub cut_id: CutId,
    bounding_box_approx: Cached<BoundingBox3>,
    bounding_box_exact: RefCell<BoundingBox3>,
    bounding_box_exact_valid: Cell<bool>,
    min_max_z_valid: Cell<bool>,
    raw_bounding_box: Cached<BoundingBox3>,
    raw_mesh_bounding_box: Cached<BoundingBox3>,
}

impl ModelObject {
    /// An empty object with no volumes and no instances
    pub fn new() -> Self {
        ModelObject {
            id: ObjectId::next(),
            name: String::new(),
            module_name: String::new(),
            input_file: String::new(),
            volumes: Vec::new(),
            instances: Vec::new(),
            config: ObjectConfig::new(),
            layer_config_ranges: Vec::new(),
            layer_height_profile: LayerHeightProfile::new(),
            printable: true,
            origin_translation: Vector3::zeros(),
            cut_id: CutId::new(),
            bounding_box_approx: Cached::new(),
            bounding_box_exact: RefCell::new(BoundingBox3::new()),
            bounding_box_exact_valid: Cell::new(false),
            min_max_z_valid: Cell::new(false),
            raw_bounding_box: Cached::new(),
            raw_mesh_bounding_box: Cached::new(),
        }
    }

    /// Stable identity of this object
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Re-identify the object alone; children keep their ids
    pub fn set_new_unique_id(&mut self) {
        self.id = ObjectId::next();
    }

    /// Re-identify the object and all of its children
    ///
    /// Turns a [`Clone`] (an identity-preserving snapshot) into an
    /// independent entity that can live next to the original. Volume
    /// configs and paint annotations are re-keyed along with their
    /// volumes.
    pub fn assign_new_unique_ids_recursive(&mut self) {
        self.set_new_unique_id();
        self.config.set_new_unique_id();
        for volume in &mut self.volumes {
            volume.set_new_unique_id();
        }
        for instance in &mut self.instances {
            instance.set_new_unique_id();
        }
        self.layer_height_profile.set_new_unique_id();
    }

    /// Identity-preserving snapshot: every id (object, volumes, instances,
    /// configs) survives, and warm bounding-box caches come along
    pub fn from_copy(other: &ModelObject) -> ModelObject {
        other.clone()
    }

    /// Independent duplicate: a deep copy re-identified throughout, safe to
    /// keep next to the original in the same model
    pub fn from_clone(other: &ModelObject) -> ModelObject {
        let mut copy = other.clone();
        copy.assign_new_unique_ids_recursive();
        copy
    }

    /// Adopt another object's bounding-box caches
    ///
    /// For callers that rebuild the volume list of a copy but know the
    /// geometry and placements are unchanged, so the expensive boxes need
    /// not be re-derived.
    pub fn copy_transformation_caches(&mut self, other: &ModelObject) {
        self.bounding_box_approx = other.bounding_box_approx.clone();
        *self.bounding_box_exact.borrow_mut() = *other.bounding_box_exact.borrow();
        self.bounding_box_exact_valid
            .set(other.bounding_box_exact_valid.get());
        self.min_max_z_valid.set(other.min_max_z_valid.get());
        self.raw_bounding_box = other.raw_bounding_box.clone();
        self.raw_mesh_bounding_box = other.raw_mesh_bounding_box.clone();
    }

    // ------------------------------------------------------------------
    // Volume management
    // ------------------------------------------------------------------

    /// Add a model part volume; the mesh is re-centered around the volume
    /// origin and the removed offset becomes the volume's placement
    pub fn add_volume(&mut self, mesh: TriangleMesh) -> &mut ModelVolume {
        self.add_volume_with_type(mesh, VolumeType::ModelPart)
    }

    /// Add a volume of the given role (centering as [`ModelObject::add_volume`])
    pub fn add_volume_with_type(
        &mut self,
        mesh: TriangleMesh,
        volume_type: VolumeType,
    ) -> &mut ModelVolume {
        let mut volume = ModelVolume::with_type(mesh, volume_type);
        volume.center_geometry_after_creation(true);
        self.volumes.push(volume);
        self.invalidate_bounding_box();
        let idx = self.volumes.len() - 1;
        &mut self.volumes[idx]
    }

    /// Add an identity-preserving copy of `other` (shares its mesh)
    ///
    /// The copy is assumed to be centered already, so neither centering
    /// nor cache invalidation happens.
    pub fn add_volume_from(&mut self, other: &ModelVolume) -> &mut ModelVolume {
        self.volumes.push(other.clone());
        let idx = self.volumes.len() - 1;
        &mut self.volumes[idx]
    }

    /// Add a fresh-identity copy of `other` carrying `mesh` instead of
    /// `other`'s geometry; the mesh is re-centered
    pub fn add_volume_from_with_mesh(
        &mut self,
        other: &ModelVolume,
        mesh: TriangleMesh,
    ) -> &mut ModelVolume {
        let mut volume = ModelVolume::from_copy_with_mesh(other, mesh);
        volume.center_geometry_after_creation(true);
        self.volumes.push(volume);
        self.invalidate_bounding_box();
        let idx = self.volumes.len() - 1;
        &mut self.volumes[idx]
    }

    /// Add a fresh volume sharing `other`'s mesh storage, with its own
    /// name, config and placement
    pub fn add_volume_with_shared_mesh(
        &mut self,
        other: &ModelVolume,
        volume_type: VolumeType,
    ) -> &mut ModelVolume {
        let volume = ModelVolume::from_shared_mesh(other.shared_mesh(), volume_type);
        self.volumes.push(volume);
        let idx = self.volumes.len() - 1;
        &mut self.volumes[idx]
    }

    /// Remove the volume at `idx`
    ///
    /// When exactly one volume remains, its transform is collapsed into
    /// every instance and reset, so the lone volume behaves as the whole
    /// object when selected on its own.
    pub fn delete_volume(&mut self, idx: usize) {
        self.volumes.remove(idx);

        if self.volumes.len() == 1 {
            let v_t = self.volumes[0].matrix();
            for instance in &mut self.instances {
                instance.set_transformation(Transformation::from_matrix(&(instance.matrix() * v_t)));
            }
            let volume = &mut self.volumes[0];
            volume.set_transformation(Transformation::new());
            volume.set_new_unique_id();
        }

        self.invalidate_bounding_box();
    }

    /// Remove all volumes
    pub fn clear_volumes(&mut self) {
        tracing::warn!(
            object = %self.name,
            volumes = self.volumes.len(),
            id = self.id.as_u64(),
            "Deleting all volumes of an object"
        );
        self.volumes.clear();
        self.invalidate_bounding_box();
    }

    /// Bring the volume list into role order
    ///
    /// A full sort orders strictly by [`VolumeType`]. The partial sort
    /// only moves support blockers/enforcers behind everything else,
    /// keeping the relative order of parts, negatives and modifiers. Both
    /// sorts are stable.
    pub fn sort_volumes(&mut self, full_sort: bool) {
        if full_sort {
            self.volumes.sort_by_key(|v| v.volume_type());
        } else {
            self.volumes
                .sort_by_key(|v| v.volume_type().max(VolumeType::ParameterModifier));
        }
    }

    // ------------------------------------------------------------------
    // Instance management
    // ------------------------------------------------------------------

    /// Add a default-placed instance
    pub fn add_instance(&mut self) -> &mut ModelInstance {
        self.instances.push(ModelInstance::new());
        self.invalidate_bounding_box();
        let idx = self.instances.len() - 1;
        &mut self.instances[idx]
    }

    /// Add a fresh-identity copy of `other`
    pub fn add_instance_from(&mut self, other: &ModelInstance) -> &mut ModelInstance {
        self.instances.push(ModelInstance::from_other(other));
        self.invalidate_bounding_box();
        let idx = self.instances.len() - 1;
        &mut self.instances[idx]
    }

    /// Add an instance with the given placement
    pub fn add_instance_with(
        &mut self,
        offset: Vector3<f64>,
        scaling_factor: Vector3<f64>,
        rotation: Vector3<f64>,
        mirror: Vector3<f64>,
    ) -> &mut ModelInstance {
        let instance = self.add_instance();
        instance.set_offset(offset);
        instance.set_scaling_factor(scaling_factor);
        instance.set_rotation(rotation);
        instance.set_mirror(mirror);
        instance
    }

    /// Remove the instance at `idx`
    pub fn delete_instance(&mut self, idx: usize) {
        self.instances.remove(idx);
        self.invalidate_bounding_box();
    }

    /// Remove the most recently added instance
    pub fn delete_last_instance(&mut self) {
        self.delete_instance(self.instances.len() - 1);
    }

    /// Remove all instances
    pub fn clear_instances(&mut self) {
        tracing::warn!(
            object = %self.name,
            instances = self.instances.len(),
            id = self.id.as_u64(),
            "Deleting all instances of an object"
        );
        self.instances.clear();
        self.invalidate_bounding_box();
    }

    // ------------------------------------------------------------------
    // Paint predicates
    // ------------------------------------------------------------------

    /// True when any volume carries support enforcer/blocker paint
    pub fn is_fdm_support_painted(&self) -> bool {
        self.volumes.iter().any(|v| v.is_fdm_support_painted())
    }

    /// True when any volume carries seam paint
    pub fn is_seam_painted(&self) -> bool {
        self.volumes.iter().any(|v| v.is_seam_painted())
    }

    /// True when any volume carries multi-material paint
    pub fn is_mm_painted(&self) -> bool {
        self.volumes.iter().any(|v| v.is_mm_painted())
    }

    // ------------------------------------------------------------------
    // Derived meshes and bounding boxes
    // ------------------------------------------------------------------

    /// The world-space mesh: the object-frame mesh stamped out once per
    /// instance and concatenated
    pub fn mesh(&self) -> TriangleMesh {
        let mut mesh = TriangleMesh::new();
        let raw_mesh = self.raw_mesh();
        for instance in &self.instances {
            let mut m = raw_mesh.clone();
            instance.transform_mesh(&mut m, false);
            mesh.merge(&m);
        }
        mesh
    }

    /// Model part meshes baked under their volume transforms and
    /// concatenated (object frame, no instance applied)
    pub fn raw_mesh(&self) -> TriangleMesh {
        let mut mesh = TriangleMesh::new();
        for v in &self.volumes {
            if v.is_model_part() {
                let mut m = v.mesh().clone();
                m.transform(&v.matrix(), true);
                mesh.merge(&m);
            }
        }
        mesh
    }

    /// As [`ModelObject::raw_mesh`], but over all volumes regardless of role
    pub fn full_raw_mesh(&self) -> TriangleMesh {
        let mut mesh = TriangleMesh::new();
        for v in &self.volumes {
            let mut m = v.mesh().clone();
            m.transform(&v.matrix(), true);
            mesh.merge(&m);
        }
        mesh
    }

    /// Approximate world bounding box: the object-frame box, transformed
    /// per instance and merged. Cheap, not snug
    pub fn bounding_box_approx(&self) -> BoundingBox3 {
        self.bounding_box_approx.get_or_compute(|| {
            let raw_bbox = self.raw_mesh_bounding_box();
            let mut bbox = BoundingBox3::new();
            for instance in &self.instances {
                bbox.merge(&instance.transform_bounding_box(&raw_bbox, false));
            }
            bbox
        })
    }

    /// Exact world bounding box: per-instance tight boxes merged
    pub fn bounding_box_exact(&self) -> BoundingBox3 {
        if !self.bounding_box_exact_valid.get() {
            let mut bbox = BoundingBox3::new();
            for idx in 0..self.instances.len() {
                bbox.merge(&self.instance_bounding_box(idx, false));
            }
            *self.bounding_box_exact.borrow_mut() = bbox;
            self.bounding_box_exact_valid.set(true);
            self.min_max_z_valid.set(true);
        }
        *self.bounding_box_exact.borrow()
    }

    /// Lowest world Z over the model parts of the first instance
    pub fn min_z(&self) -> f64 {
        self.update_min_max_z();
        self.bounding_box_exact.borrow().min.z
    }

    /// Highest world Z over the model parts of the first instance
    pub fn max_z(&self) -> f64 {
        self.update_min_max_z();
        self.bounding_box_exact.borrow().max.z
    }

    /// Refresh only the Z slice of the exact bounding box
    ///
    /// A direct scan over the third row of the combined matrix per mesh
    /// vertex; much cheaper than transforming every vertex for the full
    /// box when only heights are needed (bed placement runs this a lot).
    fn update_min_max_z(&self) {
        debug_assert!(!self.instances.is_empty());
        if self.min_max_z_valid.get() || self.instances.is_empty() {
            return;
        }
        let mat_instance = self.instances[0].matrix();
        let mut global_min_z = f64::MAX;
        let mut global_max_z = -f64::MAX;
        for v in &self.volumes {
            if !v.is_model_part() {
                continue;
            }
            let m = mat_instance * v.matrix();
            for p in &v.mesh().vertices {
                let z = m[(2, 0)] * f64::from(p.x)
                    + m[(2, 1)] * f64::from(p.y)
                    + m[(2, 2)] * f64::from(p.z)
                    + m[(2, 3)];
                global_min_z = global_min_z.min(z);
                global_max_z = global_max_z.max(z);
            }
        }
        if global_min_z == f64::MAX {
            global_min_z = 0.0;
            global_max_z = 0.0;
        }
        let mut bbox = self.bounding_box_exact.borrow_mut();
        bbox.min.z = global_min_z;
        bbox.max.z = global_max_z;
        self.min_max_z_valid.set(true);
    }

    /// Object-frame box under the first instance's rotation, scaling and
    /// mirroring (its offset is left out)
    ///
    /// Fails with `[E1001]` when the object has no instances.
    pub fn raw_bounding_box(&self) -> Result<BoundingBox3> {
        if let Some(bbox) = self.raw_bounding_box.get() {
            return Ok(bbox);
        }
        let first = self
            .instances
            .first()
            .ok_or_else(|| Error::invalid_argument("raw_bounding_box", "object has no instances"))?;
        let inst_matrix = first.matrix_no_offset();
        let mut bbox = BoundingBox3::new();
        for v in &self.volumes {
            if v.is_model_part() {
                bbox.merge(&v.mesh().transformed_bounding_box(&(inst_matrix * v.matrix())));
            }
        }
        self.raw_bounding_box.set(bbox);
        Ok(bbox)
    }

    /// Object-frame box of the model parts (volume transforms applied)
    pub fn raw_mesh_bounding_box(&self) -> BoundingBox3 {
        self.raw_mesh_bounding_box.get_or_compute(|| {
            let mut bbox = BoundingBox3::new();
            for v in &self.volumes {
                if v.is_model_part() {
                    bbox.merge(&v.mesh().transformed_bounding_box(&v.matrix()));
                }
            }
            bbox
        })
    }

    /// Object-frame box over all volumes regardless of role (uncached)
    pub fn full_raw_mesh_bounding_box(&self) -> BoundingBox3 {
        let mut bbox = BoundingBox3::new();
        for v in &self.volumes {
            bbox.merge(&v.mesh().transformed_bounding_box(&v.matrix()));
        }
        bbox
    }

    /// Tight world box of one instance (model parts only)
    pub fn instance_bounding_box(&self, instance_idx: usize, dont_translate: bool) -> BoundingBox3 {
        let inst_matrix = if dont_translate {
            self.instances[instance_idx].matrix_no_offset()
        } else {
            self.instances[instance_idx].matrix()
        };
        let mut bbox = BoundingBox3::new();
        for v in &self.volumes {
            if v.is_model_part() {
                bbox.merge(&v.mesh().transformed_bounding_box(&(inst_matrix * v.matrix())));
            }
        }
        bbox
    }

    /// As [`ModelObject::instance_bounding_box`], from the volume convex
    /// hulls instead of the full meshes
    pub fn instance_convex_hull_bounding_box(
        &self,
        instance_idx: usize,
        dont_translate: bool,
    ) -> BoundingBox3 {
        let inst_matrix = if dont_translate {
            self.instances[instance_idx].matrix_no_offset()
        } else {
            self.instances[instance_idx].matrix()
        };
        let mut bbox = BoundingBox3::new();
        for v in &self.volumes {
            if v.is_model_part() {
                bbox.merge(
                    &v.get_convex_hull()
                        .transformed_bounding_box(&(inst_matrix * v.matrix())),
                );
            }
        }
        bbox
    }

    /// Convex footprint of the object under an instance transform: the
    /// per-volume 2D hulls concatenated and hulled again
    pub fn convex_hull_2d(&self, trafo_instance: &Matrix4<f64>) -> Polygon {
        let mut points = Vec::new();
        for v in &self.volumes {
            if v.is_model_part() {
                points.extend(v.get_convex_hull_2d(trafo_instance).points);
            }
        }
        convex_hull(&points)
    }

    /// Drop all derived bounding boxes; the next query recomputes
    pub fn invalidate_bounding_box(&self) {
        self.bounding_box_approx.invalidate();
        self.bounding_box_exact_valid.set(false);
        self.min_max_z_valid.set(false);
        self.raw_bounding_box.invalidate();
        self.raw_mesh_bounding_box.invalidate();
    }

    // ------------------------------------------------------------------
    // Placement
    // ------------------------------------------------------------------

    /// Shift the volumes so the object-frame box is centered on the
    /// origin, accumulating the shift into `origin_translation`
    pub fn center_around_origin(&mut self, include_modifiers: bool) {
        let bb = if include_modifiers {
            self.full_raw_mesh_bounding_box()
        } else {
            self.raw_mesh_bounding_box()
        };
        let shift = -bb.center().coords;
        self.translate(shift);
        self.origin_translation += shift;
    }

    /// Lift or drop the instances so the object rests on the bed
    ///
    /// With `allow_negative_z`, a deliberately sunk single-part object is
    /// left alone unless it sits within [`SINKING_Z_THRESHOLD`] of the bed
    /// or entirely below it; a multi-part object only gets lifted when
    /// less than [`SINKING_MIN_Z_THRESHOLD`] of it pokes above the bed.
    pub fn ensure_on_bed(&mut self, allow_negative_z: bool) {
        let mut z_offset = 0.0;

        if allow_negative_z {
            if self.parts_count() == 1 {
                let min_z = self.min_z();
                let max_z = self.max_z();
                if min_z >= SINKING_Z_THRESHOLD || max_z < 0.0 {
                    z_offset = -min_z;
                }
            } else {
                let max_z = self.max_z();
                if max_z < SINKING_MIN_Z_THRESHOLD {
                    z_offset = SINKING_MIN_Z_THRESHOLD - max_z;
                }
            }
        } else {
            z_offset = -self.min_z();
        }

        if z_offset != 0.0 {
            self.translate_instances(z_offset * Vector3::z());
        }
    }

    /// Shift every instance by `shift`
    pub fn translate_instances(&mut self, shift: Vector3<f64>) {
        for idx in 0..self.instances.len() {
            self.translate_instance(idx, shift);
        }
    }

    /// Shift one instance by `shift`
    pub fn translate_instance(&mut self, instance_idx: usize, shift: Vector3<f64>) {
        let instance = &mut self.instances[instance_idx];
        instance.set_offset(instance.offset() + shift);
        self.invalidate_bounding_box();
    }

    /// Shift every volume by `shift`
    ///
    /// Still-valid world boxes are moved along instead of invalidated;
    /// the object-frame caches are left untouched.
    pub fn translate(&mut self, shift: Vector3<f64>) {
        for v in &mut self.volumes {
            v.translate(shift);
        }

        self.bounding_box_approx.update(|bbox| bbox.translate(shift));
        if self.bounding_box_exact_valid.get() {
            self.bounding_box_exact.borrow_mut().translate(shift);
        }
    }

    /// Scale every volume by the per-axis factors
    pub fn scale(&mut self, versor: Vector3<f64>) {
        for v in &mut self.volumes {
            v.scale(versor);
        }
        self.invalidate_bounding_box();
    }

    /// Rotate every volume around `axis`, keeping the assembly view in
    /// place by counter-rotating the instances' assembly transforms
    pub fn rotate(&mut self, angle: f64, axis: Vector3<f64>) {
        for v in &mut self.volumes {
            v.rotate(angle, axis);
        }
        for instance in &mut self.instances {
            instance.rotate_assemble(-angle, axis);
        }

        self.center_around_origin(true);
        self.invalidate_bounding_box();
    }

    /// Mirror every volume along the world axis `0|1|2` (X|Y|Z)
    pub fn mirror(&mut self, axis: usize) {
        for v in &mut self.volumes {
            v.mirror_axis(axis);
        }
        self.invalidate_bounding_box();
    }

    /// Scale the vertex data of every volume in place (offsets follow)
    pub fn scale_mesh_after_creation(&mut self, scale: f32) {
        for v in &mut self.volumes {
            v.scale_geometry_after_creation(Vector3::repeat(scale));
            v.set_offset(f64::from(scale) * v.offset());
        }
        self.invalidate_bounding_box();
    }

    /// Uniformly scale the object so it fits inside `size`
    pub fn scale_to_fit(&mut self, size: Vector3<f64>) {
        let orig_size = self.bounding_box_exact().size();
        let factor = (size.x / orig_size.x)
            .min(size.y / orig_size.y)
            .min(size.z / orig_size.z);
        self.scale(Vector3::repeat(factor));
    }

    /// Produce a unit-converted copy of this object
    ///
    /// The copy gets fresh identities throughout. With a non-empty
    /// `volume_idxs` only the listed volumes (indices into this object's
    /// volume list) are rescaled; the rest are carried over unchanged,
    /// which supports files mixing converted and native volumes. Volumes
    /// with empty meshes are dropped but still consume an index.
    pub fn convert_units(&self, conv_type: ConversionType, volume_idxs: &[usize]) -> ModelObject {
        let mut new_object = self.clone();
        new_object.assign_new_unique_ids_recursive();
        let factor = conv_type.factor();

        new_object.volumes.clear();
        new_object.input_file.clear();

        for (vol_idx, volume) in self.volumes.iter().enumerate() {
            if volume.mesh().is_empty() {
                continue;
            }
            let mesh = volume.mesh().clone();

            let vol = new_object.add_volume(mesh);
            vol.name = volume.name.clone();
            vol.set_volume_type(volume.volume_type());
            // Content only; the fresh volume keeps its own config identity.
            vol.config.apply(&volume.config);
            vol.set_material_id(volume.material_id().to_owned());
            vol.source.input_file = volume.source.input_file.clone();
            vol.source.object_idx = -1;
            vol.source.volume_idx = vol_idx as i32;
            vol.source.is_converted_from_inches = volume.source.is_converted_from_inches;
            vol.source.is_converted_from_meters = volume.source.is_converted_from_meters;

            vol.supported_facets.assign(&volume.supported_facets);
            vol.seam_facets.assign(&volume.seam_facets);
            vol.mmu_segmentation_facets.assign(&volume.mmu_segmentation_facets);

            if volume_idxs.is_empty() || volume_idxs.contains(&vol_idx) {
                vol.scale_geometry_after_creation(Vector3::repeat(factor as f32));
                vol.set_offset(factor * volume.offset());
                match conv_type {
                    ConversionType::FromInches | ConversionType::ToInches => {
                        vol.source.is_converted_from_inches =
                            conv_type == ConversionType::FromInches;
                    }
                    ConversionType::FromMeters | ConversionType::ToMeters => {
                        vol.source.is_converted_from_meters =
                            conv_type == ConversionType::FromMeters;
                    }
                }
            } else {
                vol.set_offset(volume.offset());
            }
        }
        new_object.invalidate_bounding_box();
        new_object
    }

    // ------------------------------------------------------------------
    // Counts
    // ------------------------------------------------------------------

    /// Number of distinct material ids over all volumes (the empty id
    /// counts as one)
    pub fn materials_count(&self) -> usize {
        let mut material_ids = BTreeSet::new();
        for v in &self.volumes {
            material_ids.insert(v.material_id());
        }
        material_ids.len()
    }

    /// Total triangle count over the model parts
    pub fn facets_count(&self) -> usize {
        self.volumes
            .iter()
            .filter(|v| v.is_model_part())
            .map(|v| v.mesh().facets_count())
            .sum()
    }

    /// Number of model part volumes
    pub fn parts_count(&self) -> usize {
        self.volumes.iter().filter(|v| v.is_model_part()).count()
    }

    /// True when at least one volume contributes solid geometry
    pub fn has_solid_mesh(&self) -> bool {
        self.volumes.iter().any(|v| v.is_model_part())
    }

    // ------------------------------------------------------------------
    // Cut bookkeeping
    // ------------------------------------------------------------------

    /// True when this object is a piece of a cut
    pub fn is_cut(&self) -> bool {
        self.cut_id.is_valid()
    }

    /// True when any volume is a cut connector
    pub fn has_connectors(&self) -> bool {
        debug_assert!(self.is_cut());
        self.volumes.iter().any(|v| v.cut_info.is_connector)
    }

    /// Detach the object from its cut: drop the cut id and every volume's
    /// connector bookkeeping
    pub fn invalidate_cut(&mut self) {
        self.cut_id.invalidate();
        for volume in &mut self.volumes {
            volume.invalidate_cut_info();
        }
    }

    /// Delete all connector volumes
    pub fn delete_connectors(&mut self) {
        for idx in (0..self.volumes.len()).rev() {
            if self.volumes[idx].is_cut_connector() {
                self.delete_volume(idx);
            }
        }
    }

    // ------------------------------------------------------------------
    // Restructuring
    // ------------------------------------------------------------------

    /// Split the object into per-component objects
    ///
    /// A single-volume object is split along its mesh's connectivity; a
    /// multi-volume object is split into one object per model part volume
    /// (each kept whole, multi-material paint carried along). Components
    /// with fewer than three facets are discarded. Every produced object
    /// receives copies of all instances, adjusted so the pieces keep
    /// their world positions, and the layered config of its source
    /// (object config with the volume config applied on top).
    pub fn split(&mut self) -> Vec<ModelObject> {
        let is_multi_volume_object = self.volumes.len() > 1;

        let mut groups: Vec<(usize, Vec<TriangleMesh>)> = Vec::new();
        for vol_idx in 0..self.volumes.len() {
            if !self.volumes[vol_idx].is_model_part() {
                continue;
            }
            // Split pieces never stay text objects.
            self.volumes[vol_idx].text_info = None;

            let meshes: Vec<TriangleMesh> = if is_multi_volume_object {
                let mesh = self.volumes[vol_idx].mesh().clone();
                if mesh.facets_count() >= 3 {
                    vec![mesh]
                } else {
                    Vec::new()
                }
            } else {
                self.volumes[vol_idx]
                    .mesh()
                    .split()
                    .into_iter()
                    .filter(|m| m.facets_count() >= 3)
                    .collect()
            };
            if !meshes.is_empty() {
                groups.push((vol_idx, meshes));
            }
        }

        let mut new_objects = Vec::new();
        for (vol_idx, meshes) in groups {
            let meshes_count = meshes.len();
            let mut counter = 1;
            for mesh in meshes {
                let volume = &self.volumes[vol_idx];
                let mut new_object = ModelObject::new();
                if meshes_count == 1 {
                    new_object.name = volume.name.clone();
                } else {
                    new_object.name = format!("{}_{}", self.name, counter);
                    counter += 1;
                }
                // Object config as the base, the volume config layered on
                // top; the new object keeps its own config identity.
                new_object.config.apply(&self.config);
                new_object.config.apply(&volume.config);

                for instance in &self.instances {
                    new_object.add_instance_from(instance);
                }

                let vol_offset = {
                    let new_vol = new_object.add_volume_from_with_mesh(volume, mesh);
                    if is_multi_volume_object {
                        // The geometry is unchanged, so the color paint can
                        // be carried over. A pristine annotation shares the
                        // initial timestamp with a pristine source, which
                        // would make the guarded assign a no-op.
                        if new_vol
                            .mmu_segmentation_facets
                            .timestamp_matches(&volume.mmu_segmentation_facets)
                        {
                            new_vol.mmu_segmentation_facets.reset();
                        }
                        new_vol
                            .mmu_segmentation_facets
                            .assign(&volume.mmu_segmentation_facets);
                    }
                    // The volume config moved into the object config above.
                    new_vol.config.clear();
                    new_vol.offset()
                };

                for instance in &mut new_object.instances {
                    let shift = instance
                        .matrix_no_offset()
                        .transform_point(&Point3::from(vol_offset))
                        .coords;
                    instance.set_offset(instance.offset() + shift);

                    // Rebuild the assembly-view placement so the piece stays
                    // where the whole object was shown in the assembly.
                    let mut transformation_copy = instance.transformation().clone();
                    transformation_copy.set_offset(-vol_offset);
                    let assemble_matrix = instance.assemble_transformation().matrix();
                    let instance_inverse_matrix = transformation_copy
                        .matrix()
                        .try_inverse()
                        .unwrap_or_else(Matrix4::identity);
                    let new_instance_inverse_matrix = instance_inverse_matrix
                        * instance
                            .matrix_no_offset()
                            .try_inverse()
                            .unwrap_or_else(Matrix4::identity);
                    let new_assemble_transform = assemble_matrix * new_instance_inverse_matrix;
                    instance.set_assemble_from_transform(&new_assemble_transform);
                    instance.set_offset_to_assembly(vol_offset);
                }

                if let Some(new_vol) = new_object.volumes.last_mut() {
                    new_vol.set_offset(Vector3::zeros());
                    // Detach from the source file; the piece cannot be
                    // reloaded from disk.
                    new_vol.source = VolumeSource::default();
                }
                new_objects.push(new_object);
            }
        }
        new_objects
    }

    /// Concatenate all volume meshes into a single volume
    ///
    /// Meshes are merged as stored, without applying the volume
    /// transforms; use [`ModelObject::merge_volumes`] to bake placements.
    pub fn merge(&mut self) {
        if self.volumes.len() == 1 {
            return;
        }

        let mut mesh = TriangleMesh::new();
        for volume in &self.volumes {
            if !volume.mesh().is_empty() {
                mesh.merge(volume.mesh());
            }
        }

        self.clear_volumes();
        self.add_volume(mesh);
    }

    /// Merge the selected volumes into one, under their baked transforms
    ///
    /// Returns a fresh-identity copy of this object in which the selected
    /// volumes are replaced by a single `<name>_merged` volume and the
    /// remaining volumes are carried over. The selected volumes of *this*
    /// object have their meshes emptied in the process. Returns `None`
    /// when there is only one volume to begin with.
    pub fn merge_volumes(&mut self, volume_idxs: &[usize]) -> Option<ModelObject> {
        if self.volumes.len() == 1 {
            return None;
        }

        let mut upper = self.clone();
        upper.assign_new_unique_ids_recursive();
        upper.clear_volumes();
        upper.input_file.clear();

        let mut mesh = TriangleMesh::new();
        for &i in volume_idxs {
            if !self.volumes[i].mesh().is_empty() {
                let volume_matrix = self.volumes[i].matrix();
                let mut m = self.volumes[i].mesh().clone();
                m.transform(&volume_matrix, true);
                self.volumes[i].reset_mesh();
                mesh.merge(&m);
            }
        }

        upper.add_volume(mesh);
        for i in 0..self.volumes.len() {
            if volume_idxs.contains(&i) {
                let vol = &mut upper.volumes[0];
                vol.name = format!("{}_merged", self.volumes[i].name);
                vol.config.clear();
                vol.config.apply(&self.volumes[i].config);
            } else {
                upper.add_volume_from(&self.volumes[i]);
            }
        }
        upper.invalidate_bounding_box();
        Some(upper)
    }

    /// Split the volume at `volume_idx` into its connected components,
    /// in place
    ///
    /// The first component replaces the source volume (fresh identity,
    /// paint reset); further components are inserted right behind it as
    /// copies carrying the split meshes. All pieces are renamed
    /// `<name>_<n>`, re-centered at the source volume's position and
    /// pinned to the source volume's extruder. Pieces whose convex hull
    /// comes out degenerate are deleted again. Returns the number of
    /// pieces that remain (1 when the mesh was a single component).
    pub fn split_volume(&mut self, volume_idx: usize) -> Result<usize> {
        if volume_idx >= self.volumes.len() {
            return Err(Error::invalid_argument(
                "split_volume",
                "volume index out of range",
            ));
        }

        let meshes = self.volumes[volume_idx].mesh().split();
        if meshes.len() <= 1 {
            return Ok(1);
        }

        self.volumes[volume_idx].text_info = None;

        let name = self.volumes[volume_idx].name.clone();
        let offset = self.volumes[volume_idx].offset();
        let extruder = self.volumes[volume_idx]
            .config
            .get("extruder")
            .and_then(ConfigValue::as_int)
            .unwrap_or(0);

        let mut ivolume = volume_idx;
        let mut idx = 0usize;
        for mesh in meshes {
            if mesh.is_empty() {
                continue;
            }

            if idx == 0 {
                let volume = &mut self.volumes[ivolume];
                volume.set_mesh(mesh);
                volume.calculate_convex_hull();
                volume.invalidate_convex_hull_2d();
                // A new identity, so consumers see a changed volume.
                volume.set_new_unique_id();
                volume.source = VolumeSource::default();
                volume.supported_facets.reset();
                volume.seam_facets.reset();
                volume.mmu_segmentation_facets.reset();
            } else {
                ivolume += 1;
                let sibling = ModelVolume::from_copy_with_mesh(&self.volumes[volume_idx], mesh);
                self.volumes.insert(ivolume, sibling);
            }

            let volume = &mut self.volumes[ivolume];
            volume.set_offset(Vector3::zeros());
            volume.center_geometry_after_creation(true);
            volume.translate(offset);
            volume.name = format!("{}_{}", name, idx + 1);
            volume.set_extruder_config(extruder);
            volume.set_splittable(false);
            idx += 1;
        }

        // Discard pieces (and any other volume) whose convex hull is
        // degenerate.
        let mut count = idx;
        for i in (0..self.volumes.len()).rev() {
            let hull = self.volumes[i].get_convex_hull();
            if hull.vertices.is_empty() || hull.faces.is_empty() {
                tracing::warn!(
                    object = %self.name,
                    volume = %self.volumes[i].name,
                    "Discarding split piece with a degenerate convex hull"
                );
                self.delete_volume(i);
                count = count.saturating_sub(1);
            }
        }

        Ok(count)
    }

    /// Bake non-Z rotation (and non-uniform scaling or mirroring) of the
    /// reference instance into the volume meshes
    ///
    /// If an instance is rotated by angles that are not multiples of
    /// ninety degrees, scaling in world coordinates is not representable
    /// by [`Transformation`]. This resolves the situation by transforming
    /// the mesh vertices instead: afterwards every instance carries only
    /// a Z rotation (relative to the reference) and uniform scaling, and
    /// every volume transform is reduced to an offset, while the world
    /// placement of instance `instance_idx` is preserved.
    pub fn bake_xy_rotation_into_meshes(&mut self, instance_idx: usize) {
        let reference_trafo = self.instances[instance_idx].transformation().clone();
        if is_rotation_ninety_degrees(reference_trafo.rotation()) {
            // Nothing to bake; world-space scaling stays representable.
            return;
        }

        let left_handed = reference_trafo.is_left_handed();
        let has_mirroring = (reference_trafo.mirror() - Vector3::repeat(1.0)).norm() > EPSILON;
        let scaling = reference_trafo.scaling_factor();
        let uniform_scaling =
            (scaling.x - scaling.y).abs() < EPSILON && (scaling.x - scaling.z).abs() < EPSILON;
        let new_scaling_factor = if uniform_scaling { scaling.x } else { 1.0 };

        // Adjust the instances.
        for instance in &mut self.instances {
            instance.set_rotation(Vector3::new(
                0.0,
                0.0,
                rotation_diff_z(reference_trafo.rotation(), instance.rotation()),
            ));
            instance.set_scaling_factor(Vector3::repeat(new_scaling_factor));
            instance.set_mirror(Vector3::repeat(1.0));
        }

        // Adjust the meshes: what the instances no longer express moves
        // into the vertices.
        let mut reference_trafo_mod = reference_trafo.clone();
        reference_trafo_mod.reset_offset();
        if uniform_scaling {
            reference_trafo_mod.reset_scaling_factor();
        }
        if !has_mirroring {
            reference_trafo_mod.reset_mirror();
        }
        let mesh_trafo_3x3 = reference_trafo_mod
            .matrix()
            .fixed_view::<3, 3>(0, 0)
            .into_owned();
        // The instances were updated above, so this cancels exactly what
        // the reference instance lost.
        let volume_offset_correction = self.instances[instance_idx]
            .matrix()
            .try_inverse()
            .unwrap_or_else(Matrix4::identity)
            * reference_trafo.matrix();

        for volume in &mut self.volumes {
            let volume_trafo = volume.transformation().clone();
            let volume_left_handed = volume_trafo.is_left_handed();
            let volume_has_mirroring =
                (volume_trafo.mirror() - Vector3::repeat(1.0)).norm() > EPSILON;
            let volume_scaling = volume_trafo.scaling_factor();
            let volume_uniform_scaling = (volume_scaling.x - volume_scaling.y).abs() < EPSILON
                && (volume_scaling.x - volume_scaling.z).abs() < EPSILON;
            let volume_new_scaling_factor = if volume_uniform_scaling {
                volume_scaling.x
            } else {
                1.0
            };

            let mut volume_trafo_mod = volume_trafo.clone();
            volume_trafo_mod.reset_offset();
            if volume_uniform_scaling {
                volume_trafo_mod.reset_scaling_factor();
            }
            if !volume_has_mirroring {
                volume_trafo_mod.reset_mirror();
            }
            let volume_trafo_3x3 = volume_trafo_mod
                .matrix()
                .fixed_view::<3, 3>(0, 0)
                .into_owned();

            volume.transform_this_mesh(
                &(mesh_trafo_3x3 * volume_trafo_3x3).to_homogeneous(),
                left_handed != volume_left_handed,
            );
            volume.set_rotation(Vector3::zeros());
            volume.set_scaling_factor(Vector3::repeat(volume_new_scaling_factor));
            volume.set_mirror(Vector3::repeat(1.0));
            volume.set_offset(
                volume_offset_correction
                    .transform_point(&Point3::from(volume_trafo.offset()))
                    .coords,
            );
            // Detach from the source file; the stored vertices no longer
            // match it.
            volume.source = VolumeSource::default();
        }

        self.invalidate_bounding_box();
    }

    /// Replace this object's geometry with the result of a CSG operation
    /// against `tool`, computed by `engine`
    ///
    /// Requires this object to hold exactly one volume (`[E3001]`
    /// otherwise). Both operands are baked into world space first. Result
    /// pieces become volumes named `<name>_<n>`; an empty result is a
    /// legitimate outcome and leaves the object without volumes.
    pub fn make_boolean(
        &mut self,
        tool: &ModelObject,
        op: BooleanOp,
        engine: &dyn MeshBoolean,
    ) -> Result<()> {
        if self.volumes.len() != 1 {
            return Err(Error::BooleanMultiVolume {
                volumes: self.volumes.len(),
            });
        }

        let pieces = engine.boolean(&self.mesh(), &tool.mesh(), op)?;

        self.clear_volumes();
        for (i, piece) in pieces.into_iter().enumerate() {
            let name = format!("{}_{}", self.name, i + 1);
            let vol = self.add_volume(piece);
            vol.name = name;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Per-instance queries
    // ------------------------------------------------------------------

    /// Lowest world Z of one instance, from the volume convex hulls
    ///
    /// Hulls can come out degenerate for flat geometry; such volumes fall
    /// back to scanning the mesh itself.
    pub fn get_instance_min_z(&self, instance_idx: usize) -> f64 {
        let instance = &self.instances[instance_idx];
        let mi = instance.matrix_no_offset();

        let mut min_z = f64::MAX;
        for v in &self.volumes {
            if !v.is_model_part() {
                continue;
            }
            let mv = mi * v.matrix();
            let hull = v.get_convex_hull();
            let source: &TriangleMesh = if hull.facets_count() == 0 {
                v.mesh()
            } else {
                &hull
            };
            for face in &source.faces {
                for &vertex_idx in face {
                    let p = source.vertices[vertex_idx as usize].cast::<f64>();
                    min_z = min_z.min(mv.transform_point(&p).z);
                }
            }
        }

        if min_z == f64::MAX {
            min_z = 0.0;
        }
        min_z + instance.offset().z
    }

    /// Highest world Z of one instance, from the volume convex hulls
    pub fn get_instance_max_z(&self, instance_idx: usize) -> f64 {
        let instance = &self.instances[instance_idx];
        let mi = instance.matrix_no_offset();

        let mut max_z = -f64::MAX;
        for v in &self.volumes {
            if !v.is_model_part() {
                continue;
            }
            let mv = mi * v.matrix();
            let hull = v.get_convex_hull();
            for face in &hull.faces {
                for &vertex_idx in face {
                    let p = hull.vertices[vertex_idx as usize].cast::<f64>();
                    max_z = max_z.max(mv.transform_point(&p).z);
                }
            }
        }

        max_z + instance.offset().z
    }

    /// Classify every instance against the build volume and store the
    /// result on the instance; returns how many are fully inside
    ///
    /// A volume is inside/outside per its own placement; an instance is
    /// partly outside as soon as its parts disagree. Parts entirely below
    /// the bed do not count either way. Degenerate volumes (zero-size
    /// hull box) are skipped.
    pub fn update_instances_print_volume_state(&mut self, build_volume: &BuildVolume) -> usize {
        const INSIDE: u8 = 1;
        const OUTSIDE: u8 = 2;

        let mut num_printable = 0;
        for instance in &mut self.instances {
            let mut inside_outside = 0u8;
            for vol in &self.volumes {
                if !vol.is_model_part() {
                    continue;
                }
                let bb = vol.get_convex_hull().bounding_box();
                let size = bb.size();
                if size.x == 0.0 || size.y == 0.0 || size.z == 0.0 {
                    tracing::warn!(
                        object = %self.name,
                        volume = %vol.name,
                        "Skipping degenerate volume while classifying print volume state"
                    );
                    continue;
                }

                let matrix = instance.matrix() * vol.matrix();
                match build_volume.object_state(vol.mesh(), &matrix, true) {
                    ObjectState::Inside => inside_outside |= INSIDE,
                    ObjectState::Outside => inside_outside |= OUTSIDE,
                    // Below the bed: outside, but not a reason to mark the
                    // whole instance unprintable when other parts are in.
                    ObjectState::Below => {}
                    ObjectState::Colliding => inside_outside |= INSIDE | OUTSIDE,
                }
            }
            instance.print_volume_state = if inside_outside == (INSIDE | OUTSIDE) {
                InstancePrintVolumeState::PartlyOutside
            } else if inside_outside == INSIDE {
                InstancePrintVolumeState::Inside
            } else {
                InstancePrintVolumeState::FullyOutside
            };
            if inside_outside == INSIDE {
                num_printable += 1;
            }
        }
        tracing::debug!(
            object = %self.name,
            printable = num_printable,
            "Classified instances against the build volume"
        );
        num_printable
    }

    /// Apply an arrangement result to one instance
    pub fn apply_arrange_result(
        &mut self,
        instance_idx: usize,
        offset: Vector2<f64>,
        rotation: f64,
    ) {
        self.instances[instance_idx].apply_arrange_result(offset, rotation);
        self.invalidate_bounding_box();
    }
}

impl Default for ModelObject {
    fn default() -> Self {
        ModelObject::new()
    }
}
