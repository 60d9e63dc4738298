//! Mesh-carrying volumes and their roles
//!
//! A [`ModelVolume`] couples one triangle mesh with a placement inside its
//! object, a print role ([`VolumeType`]), paint annotations and provenance.
//! The mesh is behind an [`Arc`] so copies of an object share geometry;
//! everything derived from the mesh (3D convex hull, projected 2D hull,
//! splittability) is cached per volume and invalidated when the mesh is
//! replaced.

use std::cell::Cell;
use std::sync::Arc;

use nalgebra::{Matrix4, Point2, Point3, Rotation3, Unit, Vector2, Vector3};

use crate::config::{self, ConfigValue, ObjectConfig};
use crate::id::{Cached, ObjectId};
use crate::mesh::TriangleMesh;
use crate::paint::FacetsAnnotation;
use crate::polygon::{convex_hull, Polygon};
use crate::transform::Transformation;

use super::object::ModelObject;

/// Print role of a volume within its object.
///
/// The declaration order doubles as the sort rank used by
/// [`ModelObject::sort_volumes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum VolumeType {
    /// Printable geometry
    ModelPart,
    /// Carved out of the model parts it overlaps
    NegativeVolume,
    /// Overrides print settings inside its boundary, adds no geometry
    ParameterModifier,
    /// Region where support generation is suppressed
    SupportBlocker,
    /// Region where support generation is forced
    SupportEnforcer,
}

impl Default for VolumeType {
    fn default() -> Self {
        VolumeType::ModelPart
    }
}

/// Provenance of a volume's mesh: which file it came from, where inside
/// that file, and which lossy conversions have been applied since.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VolumeSource {
    /// Path of the file the mesh was loaded from, empty when generated
    pub input_file: String,
    /// Object index inside the source file, -1 when unknown
    pub object_idx: i32,
    /// Volume index inside the source object, -1 when unknown
    pub volume_idx: i32,
    /// Shift applied by [`ModelVolume::center_geometry_after_creation`],
    /// needed to reconstruct original coordinates on reload
    pub mesh_offset: Vector3<f64>,
    /// Volume placement at load time
    pub transform: Transformation,
    /// Mesh was scaled ×25.4 after being detected as inches
    pub is_converted_from_inches: bool,
    /// Mesh was scaled ×1000 after being detected as meters
    pub is_converted_from_meters: bool,
    /// Mesh came from the built-in shape gallery, not a user file
    pub is_from_builtin_objects: bool,
}

impl Default for VolumeSource {
    fn default() -> Self {
        VolumeSource {
            input_file: String::new(),
            object_idx: -1,
            volume_idx: -1,
            mesh_offset: Vector3::zeros(),
            transform: Transformation::default(),
            is_converted_from_inches: false,
            is_converted_from_meters: false,
            is_from_builtin_objects: false,
        }
    }
}

/// Cut-tool bookkeeping carried by every volume of a cut object.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CutInfo {
    /// Volume belongs to the upper part of the cut
    pub is_from_upper: bool,
    /// Volume is a connector (plug or dowel) joining the cut halves
    pub is_connector: bool,
    /// Connector geometry has been carved into the surrounding parts
    pub is_processed: bool,
}

impl Default for CutInfo {
    fn default() -> Self {
        CutInfo {
            is_from_upper: true,
            is_connector: false,
            is_processed: true,
        }
    }
}

impl CutInfo {
    /// Mark the connector geometry as carved in
    pub fn set_processed(&mut self) {
        self.is_processed = true;
    }

    /// Demote a connector back to an ordinary volume
    pub fn invalidate(&mut self) {
        self.is_connector = false;
    }

    /// Back to the default upper-part marker
    pub fn reset_from_upper(&mut self) {
        self.is_from_upper = true;
    }
}

/// Marker carried by volumes generated from embossed text. A split or any
/// other operation that regenerates the geometry from scratch clears it.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TextInfo {
    /// The embossed text
    pub text: String,
}

/// Cached 2D projection of the volume's convex hull.
///
/// `base` is the hull projected under the rotation/scale/mirror part of
/// `matrix` only, so a change of offset alone re-translates `base` instead
/// of re-projecting the hull.
#[derive(Debug, Clone)]
struct Hull2dCache {
    matrix: Matrix4<f64>,
    base: Polygon,
}

/// One mesh plus its placement, role and paint inside a
/// [`ModelObject`].
#[derive(Debug, Clone)]
pub struct ModelVolume {
    id: ObjectId,
    /// Display name, usually the source file stem or a `_<n>` split suffix
    pub name: String,
    /// Where the mesh came from and what has been done to it since
    pub source: VolumeSource,
    /// Per-volume overrides layered over the object config
    pub config: ObjectConfig,
    /// Support enforcer/blocker paint
    pub supported_facets: FacetsAnnotation,
    /// Seam placement paint
    pub seam_facets: FacetsAnnotation,
    /// Multi-material extruder paint
    pub mmu_segmentation_facets: FacetsAnnotation,
    /// Cut-tool bookkeeping
    pub cut_info: CutInfo,
    /// Present on volumes generated by the text tool
    pub text_info: Option<TextInfo>,
    volume_type: VolumeType,
    material_id: String,
    mesh: Arc<TriangleMesh>,
    transformation: Transformation,
    convex_hull: Cached<Arc<TriangleMesh>>,
    hull_2d: Cached<Hull2dCache>,
    splittable: Cell<Option<bool>>,
    mmuseg_extruders: Cached<Vec<i32>>,
    mmuseg_timestamp: Cell<u64>,
}

impl ModelVolume {
    /// Volume owning `mesh`, typed as a model part
    pub fn new(mesh: TriangleMesh) -> Self {
        ModelVolume::with_type(mesh, VolumeType::ModelPart)
    }

    /// Volume owning `mesh` with an explicit role
    pub fn with_type(mesh: TriangleMesh, volume_type: VolumeType) -> Self {
        ModelVolume {
            id: ObjectId::next(),
            name: String::new(),
            source: VolumeSource::default(),
            config: ObjectConfig::new(),
            supported_facets: FacetsAnnotation::new(),
            seam_facets: FacetsAnnotation::new(),
            mmu_segmentation_facets: FacetsAnnotation::new(),
            cut_info: CutInfo::default(),
            text_info: None,
            volume_type,
            material_id: String::new(),
            mesh: Arc::new(mesh),
            transformation: Transformation::default(),
            convex_hull: Cached::new(),
            hull_2d: Cached::new(),
            splittable: Cell::new(None),
            mmuseg_extruders: Cached::new(),
            mmuseg_timestamp: Cell::new(0),
        }
    }

    /// Volume sharing an existing mesh without copying it. Name, config and
    /// paint start fresh; only the geometry is shared.
    pub fn from_shared_mesh(mesh: Arc<TriangleMesh>, volume_type: VolumeType) -> Self {
        let mut volume = ModelVolume::with_type(TriangleMesh::new(), volume_type);
        volume.mesh = mesh;
        volume
    }

    /// Copy of `other` carrying a different mesh. The copy receives a fresh
    /// id, a fresh config id (values kept) and empty paint; name, role,
    /// placement, source, cut state and text marker come from `other`.
    pub fn from_copy_with_mesh(other: &ModelVolume, mesh: TriangleMesh) -> Self {
        ModelVolume {
            id: ObjectId::next(),
            name: other.name.clone(),
            source: other.source.clone(),
            config: other.config.clone_without_id(),
            supported_facets: FacetsAnnotation::new(),
            seam_facets: FacetsAnnotation::new(),
            mmu_segmentation_facets: FacetsAnnotation::new(),
            cut_info: other.cut_info.clone(),
            text_info: other.text_info.clone(),
            volume_type: other.volume_type,
            material_id: other.material_id.clone(),
            mesh: Arc::new(mesh),
            transformation: other.transformation.clone(),
            convex_hull: Cached::new(),
            hull_2d: Cached::new(),
            splittable: Cell::new(None),
            mmuseg_extruders: Cached::new(),
            mmuseg_timestamp: Cell::new(0),
        }
    }

    /// Stable identity of this volume
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Re-key the volume, its config and all three paint annotations with
    /// fresh ids so a copy can coexist with its source in one model
    pub fn set_new_unique_id(&mut self) {
        self.id = ObjectId::next();
        self.config.set_new_unique_id();
        self.supported_facets.set_new_unique_id();
        self.seam_facets.set_new_unique_id();
        self.mmu_segmentation_facets.set_new_unique_id();
    }

    // --- role ---

    /// Role of this volume within the object
    pub fn volume_type(&self) -> VolumeType {
        self.volume_type
    }

    /// Change the role of this volume
    pub fn set_volume_type(&mut self, volume_type: VolumeType) {
        self.volume_type = volume_type;
    }

    /// True for printable geometry
    pub fn is_model_part(&self) -> bool {
        self.volume_type == VolumeType::ModelPart
    }

    /// True for carve-out geometry
    pub fn is_negative_volume(&self) -> bool {
        self.volume_type == VolumeType::NegativeVolume
    }

    /// True for settings-override regions
    pub fn is_modifier(&self) -> bool {
        self.volume_type == VolumeType::ParameterModifier
    }

    /// True for support-forcing regions
    pub fn is_support_enforcer(&self) -> bool {
        self.volume_type == VolumeType::SupportEnforcer
    }

    /// True for support-suppressing regions
    pub fn is_support_blocker(&self) -> bool {
        self.volume_type == VolumeType::SupportBlocker
    }

    /// True for either kind of support region
    pub fn is_support_modifier(&self) -> bool {
        self.is_support_blocker() || self.is_support_enforcer()
    }

    /// True when this volume was generated from embossed text
    pub fn is_text(&self) -> bool {
        self.text_info.is_some()
    }

    /// True when this is the object's only model part. Modifiers, negatives
    /// and support volumes do not count.
    pub fn is_the_only_one_part(&self, object: &ModelObject) -> bool {
        if !self.is_model_part() {
            return false;
        }
        object
            .volumes
            .iter()
            .all(|sibling| sibling.id() == self.id || !sibling.is_model_part())
    }

    /// Serialized role name used by file formats
    pub fn type_to_string(volume_type: VolumeType) -> &'static str {
        match volume_type {
            VolumeType::ModelPart => "normal_part",
            VolumeType::NegativeVolume => "negative_part",
            VolumeType::ParameterModifier => "modifier_part",
            VolumeType::SupportEnforcer => "support_enforcer",
            VolumeType::SupportBlocker => "support_blocker",
        }
    }

    /// Parse a serialized role name; unknown strings fall back to
    /// [`VolumeType::ModelPart`]
    pub fn type_from_string(s: &str) -> VolumeType {
        match s {
            "normal_part" => VolumeType::ModelPart,
            "negative_part" => VolumeType::NegativeVolume,
            "modifier_part" => VolumeType::ParameterModifier,
            "support_enforcer" => VolumeType::SupportEnforcer,
            "support_blocker" => VolumeType::SupportBlocker,
            _ => VolumeType::ModelPart,
        }
    }

    // --- mesh and derived geometry ---

    /// The geometry in volume-local coordinates
    pub fn mesh(&self) -> &TriangleMesh {
        &self.mesh
    }

    /// Handle to the shared mesh, for constructing sharing volumes
    pub fn shared_mesh(&self) -> Arc<TriangleMesh> {
        Arc::clone(&self.mesh)
    }

    /// Replace the mesh and drop everything derived from the old one
    pub fn set_mesh(&mut self, mesh: TriangleMesh) {
        self.mesh = Arc::new(mesh);
        self.convex_hull.invalidate();
        self.hull_2d.invalidate();
        self.splittable.set(None);
    }

    /// Replace the mesh with an empty one, releasing the shared geometry
    pub fn reset_mesh(&mut self) {
        self.set_mesh(TriangleMesh::new());
    }

    /// The volume's 3D convex hull, computed on first use. Degenerate
    /// meshes (fewer than two facets, or an unhullable vertex cloud) yield
    /// an empty hull rather than an error.
    pub fn get_convex_hull(&self) -> Arc<TriangleMesh> {
        self.convex_hull
            .get_or_compute(|| Arc::new(self.compute_convex_hull()))
    }

    /// Recompute the hull now instead of on next use
    pub fn calculate_convex_hull(&mut self) {
        self.convex_hull.set(Arc::new(self.compute_convex_hull()));
    }

    fn compute_convex_hull(&self) -> TriangleMesh {
        if self.mesh.facets_count() <= 1 {
            return TriangleMesh::new();
        }
        match self.mesh.convex_hull_3d() {
            Ok(hull) => hull,
            Err(error) => {
                tracing::debug!(volume = %self.name, %error, "Convex hull failed, storing empty hull");
                TriangleMesh::new()
            }
        }
    }

    /// 2D convex hull of this volume under `trafo_instance · volume matrix`,
    /// in world XY coordinates.
    ///
    /// The projection is cached: when only the offset of the combined matrix
    /// changed since the last call, the cached base polygon is re-translated
    /// instead of re-projected.
    pub fn get_convex_hull_2d(&self, trafo_instance: &Matrix4<f64>) -> Polygon {
        let matrix = trafo_instance * self.transformation.matrix();
        let base = match self.hull_2d.get() {
            Some(cache) if cache.matrix == matrix => cache.base,
            Some(cache) if Self::placement_matches(&cache.matrix, &matrix) => {
                let base = cache.base;
                self.hull_2d.set(Hull2dCache {
                    matrix,
                    base: base.clone(),
                });
                base
            }
            _ => {
                let base = self.project_hull_base(&matrix);
                self.hull_2d.set(Hull2dCache {
                    matrix,
                    base: base.clone(),
                });
                base
            }
        };
        let mut hull = base;
        hull.translate(Vector2::new(matrix[(0, 3)], matrix[(1, 3)]));
        hull
    }

    /// Drop the cached 2D hull projection
    pub fn invalidate_convex_hull_2d(&self) {
        self.hull_2d.invalidate();
    }

    // Rotation, scale and mirror equal means the base polygon is reusable.
    fn placement_matches(old: &Matrix4<f64>, new: &Matrix4<f64>) -> bool {
        let old = Transformation::from_matrix(old);
        let new = Transformation::from_matrix(new);
        old.rotation() == new.rotation()
            && old.scaling_factor() == new.scaling_factor()
            && old.mirror() == new.mirror()
    }

    fn project_hull_base(&self, matrix: &Matrix4<f64>) -> Polygon {
        let hull = self.get_convex_hull();
        let mut linear = *matrix;
        linear[(0, 3)] = 0.0;
        linear[(1, 3)] = 0.0;
        linear[(2, 3)] = 0.0;
        let mut points = Vec::with_capacity(hull.vertices.len());
        for vertex in &hull.vertices {
            let p = linear.transform_point(&Point3::new(
                f64::from(vertex.x),
                f64::from(vertex.y),
                f64::from(vertex.z),
            ));
            points.push(Point2::new(p.x, p.y));
        }
        convex_hull(&points)
    }

    /// Whether the mesh has more than one connected component; memoized
    pub fn is_splittable(&self) -> bool {
        if let Some(splittable) = self.splittable.get() {
            return splittable;
        }
        let splittable = self.mesh.split().len() > 1;
        self.splittable.set(Some(splittable));
        splittable
    }

    // Seed the memo when the caller already knows the answer (split leaves
    // single-component pieces behind).
    pub(crate) fn set_splittable(&self, splittable: bool) {
        self.splittable.set(Some(splittable));
    }

    // --- placement ---

    /// Placement of the volume inside its object
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

    /// Shift the volume inside its object
    pub fn translate(&mut self, displacement: Vector3<f64>) {
        self.set_offset(self.offset() + displacement);
    }

    /// Multiply the per-axis scale factors
    pub fn scale(&mut self, scaling_factors: Vector3<f64>) {
        self.set_scaling_factor(
            self.scaling_factor()
                .component_mul(&scaling_factors),
        );
    }

    /// Compose an axis/angle rotation onto the Euler rotation
    pub fn rotate(&mut self, angle: f64, axis: Vector3<f64>) {
        let rotation = Rotation3::from_axis_angle(&Unit::new_normalize(axis), angle);
        let (roll, pitch, yaw) = rotation.euler_angles();
        self.set_rotation(self.rotation() + Vector3::new(roll, pitch, yaw));
    }

    /// Flip the mirror state of one axis (0 = X, 1 = Y, 2 = Z)
    pub fn mirror_axis(&mut self, axis: usize) {
        self.transformation.toggle_mirror_axis(axis);
    }

    // --- geometry rewrites ---

    /// Translate mesh and hull so the local origin sits at the mesh bbox
    /// center, compensating through the volume offset so world coordinates
    /// do not move. With `update_source_offset` the shift is recorded in
    /// [`VolumeSource::mesh_offset`].
    pub fn center_geometry_after_creation(&mut self, update_source_offset: bool) {
        let bbox = self.mesh.bounding_box();
        let shift = if bbox.is_defined() {
            bbox.center().coords
        } else {
            Vector3::zeros()
        };
        if shift != Vector3::zeros() {
            debug_assert_eq!(
                Arc::strong_count(&self.mesh),
                1,
                "centering a shared mesh would move it under other volumes"
            );
            let shift_f32 = shift.map(|c| c as f32);
            Arc::make_mut(&mut self.mesh).translate(-shift_f32);
            self.convex_hull
                .update(|hull| Arc::make_mut(hull).translate(-shift_f32));
            self.hull_2d.invalidate();
            self.translate(shift);
        }
        if update_source_offset {
            self.source.mesh_offset = shift;
        }
    }

    /// Scale mesh and hull in place, without touching the placement.
    /// Only meaningful before the mesh is shared.
    pub fn scale_geometry_after_creation(&mut self, versor: Vector3<f32>) {
        Arc::make_mut(&mut self.mesh).scale(versor);
        let hull_was_empty = self
            .convex_hull
            .get()
            .map(|hull| hull.is_empty())
            .unwrap_or(false);
        if hull_was_empty {
            // hulls of too-small meshes may have failed before scaling
            self.calculate_convex_hull();
        } else {
            self.convex_hull
                .update(|hull| Arc::make_mut(hull).scale(versor));
        }
        self.hull_2d.invalidate();
    }

    /// Bake `matrix` into mesh and hull, flipping triangle winding when the
    /// matrix is left-handed and `fix_left_handed` is set. The volume gets a
    /// new id so consumers reload the geometry.
    pub(crate) fn transform_this_mesh(&mut self, matrix: &Matrix4<f64>, fix_left_handed: bool) {
        let mut mesh = (*self.mesh).clone();
        mesh.transform(matrix, fix_left_handed);
        let mut hull = (*self.get_convex_hull()).clone();
        hull.transform(matrix, fix_left_handed);
        self.set_mesh(mesh);
        self.convex_hull.set(Arc::new(hull));
        self.set_new_unique_id();
    }

    /// Scale from inches to millimeters, zeroing the offset
    pub fn convert_from_imperial_units(&mut self) {
        debug_assert!(!self.source.is_converted_from_meters);
        self.scale_geometry_after_creation(Vector3::repeat(25.4));
        self.set_offset(Vector3::zeros());
        self.source.is_converted_from_inches = true;
    }

    /// Scale from meters to millimeters, zeroing the offset
    pub fn convert_from_meters(&mut self) {
        debug_assert!(!self.source.is_converted_from_inches);
        self.scale_geometry_after_creation(Vector3::repeat(1000.0));
        self.set_offset(Vector3::zeros());
        self.source.is_converted_from_meters = true;
    }

    // --- material ---

    /// Id of the referenced material, empty when none
    pub fn material_id(&self) -> &str {
        &self.material_id
    }

    /// Point this volume at a material id. Registration of the id in the
    /// model's material table happens through
    /// [`Model::add_material`](super::Model::add_material).
    pub fn set_material_id(&mut self, material_id: impl Into<String>) {
        self.material_id = material_id.into();
    }

    // --- extruders and paint ---

    /// Extruder assigned to this volume: its own `extruder` config key,
    /// falling back to the object's, defaulting to 1
    pub fn extruder_id(&self, object_config: &ObjectConfig) -> i32 {
        config::extruder_id(&self.config, object_config)
    }

    /// All extruders this volume prints with: the multi-material paint
    /// states (ascending) plus the configured volume extruder. Support
    /// blockers/enforcers and negative volumes print with none.
    pub fn get_extruders(&self, object_config: &ObjectConfig) -> Vec<i32> {
        if matches!(
            self.volume_type,
            VolumeType::NegativeVolume | VolumeType::SupportBlocker | VolumeType::SupportEnforcer
        ) {
            return Vec::new();
        }
        let paint_timestamp = self.mmu_segmentation_facets.timestamp().value();
        if self.mmuseg_timestamp.get() != paint_timestamp {
            let states = self
                .mmu_segmentation_facets
                .state_indices()
                .into_iter()
                .map(i32::from)
                .collect::<Vec<_>>();
            self.mmuseg_extruders.set(states);
            self.mmuseg_timestamp.set(paint_timestamp);
        }
        let mut extruders = self.mmuseg_extruders.get().unwrap_or_default();
        let volume_extruder = self.extruder_id(object_config);
        if volume_extruder > 0 {
            extruders.push(volume_extruder);
        }
        extruders
    }

    /// True when any facet carries support paint
    pub fn is_fdm_support_painted(&self) -> bool {
        !self.supported_facets.is_empty()
    }

    /// True when any facet carries seam paint
    pub fn is_seam_painted(&self) -> bool {
        !self.seam_facets.is_empty()
    }

    /// True when any facet carries multi-material paint
    pub fn is_mm_painted(&self) -> bool {
        !self.mmu_segmentation_facets.is_empty()
    }

    /// Clear support, seam and multi-material paint
    pub fn reset_extra_facets(&mut self) {
        self.supported_facets.reset();
        self.seam_facets.reset();
        self.mmu_segmentation_facets.reset();
    }

    // --- cut state ---

    /// A fully processed connector volume left over from a cut
    pub fn is_cut_connector(&self) -> bool {
        self.cut_info.is_processed && self.cut_info.is_connector
    }

    /// Demote this volume's connector marker
    pub fn invalidate_cut_info(&mut self) {
        self.cut_info.invalidate();
    }

    // Extruder config carried by split pieces.
    pub(crate) fn set_extruder_config(&mut self, extruder: i32) {
        self.config.set("extruder", ConfigValue::Int(extruder));
    }
}
