//! The model root: objects, shared materials and whole-model operations
//!
//! A [`Model`] owns its [`ModelObject`]s by value; there are no back
//! pointers anywhere in the tree, so borrowing an object never freezes
//! the rest of the model. Whole-model concerns live here: importer entry
//! points, material storage, backup-id allocation for project snapshots,
//! unit-system heuristics for freshly loaded files, and the comparison
//! helpers a background processor uses to decide how much of a changed
//! model needs re-slicing.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use nalgebra::{Vector2, Vector3};

use crate::build_volume::BuildVolume;
use crate::config::{ConfigValue, ObjectConfig};
use crate::error::{Error, Result};
use crate::id::ObjectId;
use crate::mesh::{BoundingBox3, TriangleMesh};
use crate::transform::{Transformation, EPSILON};

use super::object::ModelObject;
use super::volume::{ModelVolume, VolumeType};

/// Progress reporting for long-running import or repair pipelines
///
/// Invoked with a stage label and done/total counts. Returning `false`
/// requests cancellation; pipelines map that to [`Error::Cancelled`].
pub type ProgressCallback<'a> = Box<dyn FnMut(&str, usize, usize) -> bool + 'a>;

/// Objects smaller than this are assumed to have been modeled in inches
/// (a 2x2x2 in bounding volume is already a tiny print in millimeters).
const VOLUME_THRESHOLD_INCHES: f64 = 8.0;

/// As [`VOLUME_THRESHOLD_INCHES`], for geometry saved in meters.
const VOLUME_THRESHOLD_METERS: f64 = 0.008;

/// Below this an object encloses no printable volume at all.
const ZERO_VOLUME: f64 = 1e-10;

/// Material shared across the objects of a model
///
/// Volumes reference materials by their string key; the map entry owns
/// the attribute bag and the material specific config overrides.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ModelMaterial {
    id: ObjectId,
    /// Free-form attributes as carried by AMF/3MF material definitions
    pub attributes: BTreeMap<String, String>,
    /// Material specific print setting overrides
    pub config: ObjectConfig,
}

impl ModelMaterial {
    /// Empty material with a fresh identity
    pub fn new() -> Self {
        ModelMaterial {
            id: ObjectId::next(),
            attributes: BTreeMap::new(),
            config: ObjectConfig::new(),
        }
    }

    /// Identity of this material
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Re-identify the material and its config
    pub fn set_new_unique_id(&mut self) {
        self.id = ObjectId::next();
        self.config.set_new_unique_id();
    }

    /// Merge `attributes` in; keys already present keep their values
    pub fn apply(&mut self, attributes: &BTreeMap<String, String>) {
        for (key, value) in attributes {
            self.attributes
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
    }
}

impl Default for ModelMaterial {
    fn default() -> Self {
        ModelMaterial::new()
    }
}

/// The print bed content: objects, materials and model-wide bookkeeping
///
/// `Clone` is an identity-preserving deep copy, which is exactly what a
/// background processor snapshots before diffing;
/// [`Model::assign_new_unique_ids_recursive`] turns such a copy into an
/// independent model that can coexist with the original.
#[derive(Debug, Clone)]
pub struct Model {
    id: ObjectId,
    /// The printable objects, in presentation order
    pub objects: Vec<ModelObject>,
    /// Materials referenced by volumes through their string id
    pub materials: BTreeMap<String, ModelMaterial>,
    object_backup_id_map: HashMap<ObjectId, u32>,
    next_object_backup_id: u32,
}

impl Model {
    /// Empty model with a fresh identity
    pub fn new() -> Self {
        Model {
            id: ObjectId::next(),
            objects: Vec::new(),
            materials: BTreeMap::new(),
            object_backup_id_map: HashMap::new(),
            next_object_backup_id: 1,
        }
    }

    /// Identity of this model
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Re-identify the model itself, leaving its contents alone
    pub fn set_new_unique_id(&mut self) {
        self.id = ObjectId::next();
    }

    /// Re-identify the model and everything in it
    pub fn assign_new_unique_ids_recursive(&mut self) {
        self.set_new_unique_id();
        for material in self.materials.values_mut() {
            material.set_new_unique_id();
        }
        for object in &mut self.objects {
            object.assign_new_unique_ids_recursive();
        }
    }

    /// Identity-preserving snapshot of a whole model
    ///
    /// Every id in the tree survives, including the backup-id map, so the
    /// copy can stand in for the original (undo stacks, background
    /// slicing snapshots).
    pub fn from_copy(other: &Model) -> Model {
        other.clone()
    }

    /// Independent duplicate of a whole model, re-identified throughout
    pub fn from_clone(other: &Model) -> Model {
        let mut copy = other.clone();
        copy.assign_new_unique_ids_recursive();
        copy
    }

    /// Replace this model's contents with an identity-preserving snapshot
    /// of `other`
    pub fn assign_copy(&mut self, other: &Model) {
        *self = other.clone();
    }

    /// Replace this model's contents with a re-identified duplicate of
    /// `other`
    pub fn assign_clone(&mut self, other: &Model) {
        *self = Model::from_clone(other);
    }

    // ------------------------------------------------------------------
    // Object management
    // ------------------------------------------------------------------

    /// Add an object holding `mesh` as its single volume; the importer
    /// entry point
    ///
    /// Object and volume are both named `name`, the volume records where
    /// in `input_file` it came from, and objects without an extruder
    /// choice default to the first extruder. No instance is added; run
    /// [`Model::add_default_instances`] once loading is complete.
    pub fn add_object(&mut self, name: &str, input_file: &str, mesh: TriangleMesh) -> &mut ModelObject {
        let object_idx = self.objects.len() as i32;
        let mut object = ModelObject::new();
        object.name = name.to_owned();
        object.input_file = input_file.to_owned();
        {
            let volume = object.add_volume(mesh);
            volume.name = name.to_owned();
            volume.source.input_file = input_file.to_owned();
            volume.source.object_idx = object_idx;
            volume.source.volume_idx = 0;
        }
        ensure_default_extruder(&mut object.config);
        self.objects.push(object);
        let idx = self.objects.len() - 1;
        &mut self.objects[idx]
    }

    /// Add a fresh-identity copy of `other`
    ///
    /// When `other` is an object of this model that already has a backup
    /// id, the backup id follows the copy.
    pub fn add_object_from(&mut self, other: &ModelObject) -> &mut ModelObject {
        let mut object = other.clone();
        object.assign_new_unique_ids_recursive();
        ensure_default_extruder(&mut object.config);
        if let Some(backup_id) = self.object_backup_id_map.remove(&other.id()) {
            self.object_backup_id_map.insert(object.id(), backup_id);
        }
        self.objects.push(object);
        let idx = self.objects.len() - 1;
        &mut self.objects[idx]
    }

    /// Remove the object at `idx`
    pub fn delete_object(&mut self, idx: usize) {
        let object = &self.objects[idx];
        tracing::warn!(
            object = %object.name,
            id = object.id().as_u64(),
            volumes = object.volumes.len(),
            instances = object.instances.len(),
            "Deleting object from model"
        );
        self.objects.remove(idx);
    }

    /// Remove the object with the given identity; false when absent
    pub fn delete_object_by_id(&mut self, id: ObjectId) -> bool {
        if !id.is_valid() {
            return false;
        }
        if let Some(idx) = self.objects.iter().position(|o| o.id() == id) {
            self.delete_object(idx);
            return true;
        }
        false
    }

    /// Find an object by its identity
    pub fn object_by_id(&self, id: ObjectId) -> Option<&ModelObject> {
        self.objects.iter().find(|o| o.id() == id)
    }

    /// Remove all objects and reset the backup-id allocator
    pub fn clear_objects(&mut self) {
        tracing::warn!(objects = self.objects.len(), "Clearing all objects from model");
        self.objects.clear();
        self.object_backup_id_map.clear();
        self.next_object_backup_id = 1;
    }

    // ------------------------------------------------------------------
    // Backup ids
    // ------------------------------------------------------------------

    /// Small consecutive id keying an object's backup artifacts on disk;
    /// allocated on first request
    pub fn get_object_backup_id(&mut self, object_id: ObjectId) -> u32 {
        let next = &mut self.next_object_backup_id;
        *self.object_backup_id_map.entry(object_id).or_insert_with(|| {
            let id = *next;
            *next += 1;
            id
        })
    }

    /// Backup id already allocated for the object, if any
    pub fn peek_object_backup_id(&self, object_id: ObjectId) -> Option<u32> {
        self.object_backup_id_map.get(&object_id).copied()
    }

    /// Pin an object's backup id (used when restoring a saved project)
    /// and advance the allocator past it
    pub fn set_object_backup_id(&mut self, object_id: ObjectId, backup_id: u32) {
        self.object_backup_id_map.insert(object_id, backup_id);
        if backup_id >= self.next_object_backup_id {
            self.next_object_backup_id = backup_id + 1;
        }
    }

    // ------------------------------------------------------------------
    // Materials
    // ------------------------------------------------------------------

    /// Get or create the material `material_id`
    pub fn add_material(&mut self, material_id: &str) -> &mut ModelMaterial {
        debug_assert!(!material_id.is_empty());
        self.materials
            .entry(material_id.to_owned())
            .or_insert_with(ModelMaterial::new)
    }

    /// Insert (or replace) `material_id` with an identity-preserving copy
    /// of `other`
    pub fn add_material_from(&mut self, material_id: &str, other: &ModelMaterial) -> &mut ModelMaterial {
        debug_assert!(!material_id.is_empty());
        let material = self
            .materials
            .entry(material_id.to_owned())
            .or_insert_with(ModelMaterial::new);
        material.clone_from(other);
        material
    }

    /// Look up a material by its string id
    pub fn get_material(&self, material_id: &str) -> Option<&ModelMaterial> {
        self.materials.get(material_id)
    }

    /// Remove a material; volumes referencing it keep their string id and
    /// simply resolve to nothing afterwards
    pub fn delete_material(&mut self, material_id: &str) -> bool {
        self.materials.remove(material_id).is_some()
    }

    /// Remove all materials
    pub fn clear_materials(&mut self) {
        self.materials.clear();
    }

    // ------------------------------------------------------------------
    // Aggregates
    // ------------------------------------------------------------------

    /// Approximate world box over all objects
    pub fn bounding_box_approx(&self) -> BoundingBox3 {
        let mut bbox = BoundingBox3::new();
        for o in &self.objects {
            bbox.merge(&o.bounding_box_approx());
        }
        bbox
    }

    /// Exact world box over all objects
    pub fn bounding_box_exact(&self) -> BoundingBox3 {
        let mut bbox = BoundingBox3::new();
        for o in &self.objects {
            bbox.merge(&o.bounding_box_exact());
        }
        bbox
    }

    /// Highest world Z over all objects (0 for an empty model)
    pub fn max_z(&self) -> f64 {
        let mut z: f64 = 0.0;
        for o in &self.objects {
            z = z.max(o.max_z());
        }
        z
    }

    /// Everything flattened into a single world-space mesh
    pub fn mesh(&self) -> TriangleMesh {
        let mut mesh = TriangleMesh::new();
        for o in &self.objects {
            mesh.merge(&o.mesh());
        }
        mesh
    }

    /// Classify every instance of every object against the build volume;
    /// returns how many instances are fully inside
    pub fn update_print_volume_state(&mut self, build_volume: &BuildVolume) -> usize {
        let mut num_printable = 0;
        for object in &mut self.objects {
            num_printable += object.update_instances_print_volume_state(build_volume);
        }
        let print_volume = build_volume.bounding_volume();
        tracing::debug!(
            min = ?print_volume.min,
            max = ?print_volume.max,
            printable = num_printable,
            "Classified model against the print volume"
        );
        num_printable
    }

    /// Shift all instances so the model is centered on `point`; false
    /// when it already is
    pub fn center_instances_around_point(&mut self, point: Vector2<f64>) -> bool {
        let mut bb = BoundingBox3::new();
        for o in &self.objects {
            for i in 0..o.instances.len() {
                bb.merge(&o.instance_bounding_box(i, false));
            }
        }

        let center = bb.center();
        let shift2 = point - Vector2::new(center.x, center.y);
        if shift2.x.abs() < EPSILON && shift2.y.abs() < EPSILON {
            return false;
        }

        let shift3 = Vector3::new(shift2.x, shift2.y, 0.0);
        for o in &mut self.objects {
            for instance in &mut o.instances {
                instance.set_offset(instance.offset() + shift3);
            }
            o.invalidate_bounding_box();
        }
        true
    }

    /// Shift every object's volumes by `shift`
    pub fn translate(&mut self, shift: Vector3<f64>) {
        for o in &mut self.objects {
            o.translate(shift);
        }
    }

    /// Give every instance-less object one default-placed instance
    pub fn add_default_instances(&mut self) -> bool {
        for o in &mut self.objects {
            if o.instances.is_empty() {
                o.add_instance();
            }
        }
        true
    }

    /// Replace the single object's instances with an `x` by `y` grid,
    /// spaced by the object's footprint plus `dist`
    pub fn duplicate_objects_grid(&mut self, x: usize, y: usize, dist: f64) -> Result<()> {
        if self.objects.len() > 1 {
            return Err(Error::invalid_argument(
                "duplicate_objects_grid",
                "grid duplication is not supported with multiple objects",
            ));
        }
        let object = self.objects.first_mut().ok_or_else(|| {
            Error::invalid_argument("duplicate_objects_grid", "model has no objects")
        })?;
        object.clear_instances();

        // Each grid cell holds an identity-placed copy, so the object
        // frame box is the footprint of every copy.
        let ext_size = object.raw_mesh_bounding_box().size() + Vector3::repeat(dist);

        for x_copy in 0..x {
            for y_copy in 0..y {
                let instance = object.add_instance();
                instance.set_offset(Vector3::new(
                    ext_size.x * x_copy as f64,
                    ext_size.y * y_copy as f64,
                    0.0,
                ));
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Load-time heuristics
    // ------------------------------------------------------------------

    /// Heuristic: does this look like one part accidentally exported as
    /// many single-volume objects?
    ///
    /// Candidates are models of several plain objects (one volume, no
    /// config beyond the extruder). Genuinely independent parts all rest
    /// on the bed; parts of an exploded assembly keep their assembly
    /// heights, so differing bottom heights are the tell.
    pub fn looks_like_multipart_object(&self) -> bool {
        if self.objects.len() <= 1 {
            return false;
        }
        let mut zmin = f64::MAX;
        for obj in &self.objects {
            if obj.volumes.len() > 1 || obj.config.len() > 1 {
                return false;
            }
            let zmin_this = obj.min_z();
            if zmin == f64::MAX {
                zmin = zmin_this;
            } else if (zmin - zmin_this).abs() > EPSILON {
                return true;
            }
        }
        false
    }

    /// Flatten all objects into one multi-volume object
    ///
    /// Volume placements are rebuilt in world coordinates (one volume per
    /// source volume and instance), each named after its source object
    /// and pinned to that object's extruder choice (volume setting wins
    /// over object setting). The result carries no instances yet.
    pub fn convert_multipart_object(&mut self) {
        debug_assert!(self.objects.len() >= 2);
        if self.objects.len() < 2 {
            return;
        }

        let mut object = ModelObject::new();
        object.input_file = self.objects[0].input_file.clone();
        object.name = Path::new(&self.objects[0].input_file)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();

        for o in &self.objects {
            for v in &o.volumes {
                // Volume transforms are relative to their object; undo
                // the centering shift to get back to the object frame.
                let mut trafo_volume = v.transformation().clone();
                trafo_volume.set_offset(trafo_volume.offset() - o.origin_translation);

                let extruder = v
                    .config
                    .get("extruder")
                    .and_then(ConfigValue::as_int)
                    .or_else(|| o.config.get("extruder").and_then(ConfigValue::as_int));

                if o.instances.is_empty() {
                    let new_volume = object.add_volume_from(v);
                    new_volume.name = o.name.clone();
                    if let Some(extruder) = extruder {
                        new_volume.config.set("extruder", ConfigValue::Int(extruder));
                    }
                    new_volume.set_transformation(trafo_volume.clone());
                } else {
                    for instance in &o.instances {
                        let new_volume = object.add_volume_from(v);
                        new_volume.name = o.name.clone();
                        if let Some(extruder) = extruder {
                            new_volume.config.set("extruder", ConfigValue::Int(extruder));
                        }
                        new_volume.set_transformation(Transformation::from_matrix(
                            &(instance.matrix() * trafo_volume.matrix()),
                        ));
                    }
                }
            }
        }

        self.clear_objects();
        self.objects.push(object);
    }

    /// Heuristic: was this model authored in inches?
    ///
    /// A suspiciously small object suggests inches. Pieces of a cut are
    /// small by construction, so a cut piece only counts when every
    /// sibling of the same cut is small too.
    pub fn looks_like_imperial_units(&self) -> bool {
        for obj in &self.objects {
            if object_mesh_volume(obj) < VOLUME_THRESHOLD_INCHES {
                if !obj.is_cut() {
                    return true;
                }
                let has_large_sibling = self.objects.iter().any(|other| {
                    other.id() != obj.id()
                        && other.cut_id.is_equal(&obj.cut_id)
                        && object_mesh_volume(other) >= VOLUME_THRESHOLD_INCHES
                });
                if !has_large_sibling {
                    return true;
                }
            }
        }
        false
    }

    /// Rescale inch-authored geometry to millimeters, in place
    pub fn convert_from_imperial_units(&mut self, only_small_volumes: bool) {
        const IN_TO_MM: f32 = 25.4;
        for obj in &mut self.objects {
            if !only_small_volumes || object_mesh_volume(obj) < VOLUME_THRESHOLD_INCHES {
                obj.scale_mesh_after_creation(IN_TO_MM);
                for v in &mut obj.volumes {
                    debug_assert!(!v.source.is_converted_from_meters);
                    v.source.is_converted_from_inches = true;
                }
            }
        }
    }

    /// Heuristic: was this model saved in meters?
    pub fn looks_like_saved_in_meters(&self) -> bool {
        self.objects
            .iter()
            .any(|obj| object_mesh_volume(obj) < VOLUME_THRESHOLD_METERS)
    }

    /// Rescale meter-authored geometry to millimeters, in place
    pub fn convert_from_meters(&mut self, only_small_volumes: bool) {
        const M_TO_MM: f32 = 1000.0;
        for obj in &mut self.objects {
            if !only_small_volumes || object_mesh_volume(obj) < VOLUME_THRESHOLD_METERS {
                obj.scale_mesh_after_creation(M_TO_MM);
                for v in &mut obj.volumes {
                    debug_assert!(!v.source.is_converted_from_inches);
                    v.source.is_converted_from_meters = true;
                }
            }
        }
    }

    /// Drop objects that enclose no volume (degenerate imports); returns
    /// how many were removed
    pub fn removed_objects_with_zero_volume(&mut self) -> usize {
        let mut removed = 0;
        for i in (0..self.objects.len()).rev() {
            if object_mesh_volume(&self.objects[i]) < ZERO_VOLUME {
                self.delete_object(i);
                removed += 1;
            }
        }
        removed
    }

    /// Lift objects hanging below the bed back onto it
    pub fn adjust_min_z(&mut self) {
        if self.objects.is_empty() {
            return;
        }
        if self.bounding_box_exact().min.z < 0.0 {
            for obj in &mut self.objects {
                let min_z = obj.min_z();
                if min_z < 0.0 {
                    obj.translate_instances(Vector3::new(0.0, 0.0, -min_z));
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Paint queries
    // ------------------------------------------------------------------

    /// True when any object carries support paint
    pub fn is_fdm_support_painted(&self) -> bool {
        self.objects.iter().any(|o| o.is_fdm_support_painted())
    }

    /// True when any object carries seam paint
    pub fn is_seam_painted(&self) -> bool {
        self.objects.iter().any(|o| o.is_seam_painted())
    }

    /// True when any object carries multi-material paint
    pub fn is_mm_painted(&self) -> bool {
        self.objects.iter().any(|o| o.is_mm_painted())
    }
}

impl Default for Model {
    fn default() -> Self {
        Model::new()
    }
}

// Imported objects default to the first extruder.
fn ensure_default_extruder(config: &mut ObjectConfig) {
    let extruder = config.get("extruder").and_then(ConfigValue::as_int);
    if extruder.unwrap_or(0) == 0 {
        config.set("extruder", ConfigValue::Int(1));
    }
}

/// Raw mesh volume of an object, before any transforms are applied
///
/// Modifier volumes do not enclose printed material and are left out,
/// except that a single-volume object always reports its one mesh.
fn object_mesh_volume(object: &ModelObject) -> f64 {
    if object.volumes.len() == 1 {
        return object.volumes[0].mesh().volume();
    }
    object
        .volumes
        .iter()
        .filter(|v| v.volume_type() != VolumeType::ParameterModifier)
        .map(|v| v.mesh().volume())
        .sum()
}

// ----------------------------------------------------------------------
// Snapshot comparison
// ----------------------------------------------------------------------

/// True when both models hold the same objects (by identity) in the same
/// order
pub fn model_object_list_equal(model_old: &Model, model_new: &Model) -> bool {
    model_old.objects.len() == model_new.objects.len()
        && model_old
            .objects
            .iter()
            .zip(&model_new.objects)
            .all(|(o, n)| o.id() == n.id())
}

/// True when `model_new` is `model_old` with objects appended at the end
/// (background work on the common prefix can keep running)
pub fn model_object_list_extended(model_old: &Model, model_new: &Model) -> bool {
    model_old.objects.len() < model_new.objects.len()
        && model_old
            .objects
            .iter()
            .zip(&model_new.objects)
            .all(|(o, n)| o.id() == n.id())
}

fn model_volume_list_changed_by<F: Fn(VolumeType) -> bool>(
    model_object_old: &ModelObject,
    model_object_new: &ModelObject,
    type_filter: F,
) -> bool {
    let mut i_old = 0;
    let mut i_new = 0;
    while i_old < model_object_old.volumes.len() && i_new < model_object_new.volumes.len() {
        let mv_old = &model_object_old.volumes[i_old];
        let mv_new = &model_object_new.volumes[i_new];
        if !type_filter(mv_old.volume_type()) {
            i_old += 1;
            continue;
        }
        if !type_filter(mv_new.volume_type()) {
            i_new += 1;
            continue;
        }
        if mv_old.volume_type() != mv_new.volume_type() || mv_old.id() != mv_new.id() {
            return true;
        }
        if (mv_old.matrix() - mv_new.matrix()).amax() > EPSILON {
            return true;
        }
        i_old += 1;
        i_new += 1;
    }
    // Unpaired leftovers on either side are deletions or additions.
    model_object_old.volumes[i_old..]
        .iter()
        .any(|v| type_filter(v.volume_type()))
        || model_object_new.volumes[i_new..]
            .iter()
            .any(|v| type_filter(v.volume_type()))
}

/// True when the `volume_type` sublists of two snapshots of one object
/// differ in membership, order or placement
pub fn model_volume_list_changed(
    model_object_old: &ModelObject,
    model_object_new: &ModelObject,
    volume_type: VolumeType,
) -> bool {
    model_volume_list_changed_by(model_object_old, model_object_new, |t| t == volume_type)
}

/// As [`model_volume_list_changed`], over a set of roles at once
pub fn model_volume_list_changed_any(
    model_object_old: &ModelObject,
    model_object_new: &ModelObject,
    types: &[VolumeType],
) -> bool {
    model_volume_list_changed_by(model_object_old, model_object_new, |t| types.contains(&t))
}

fn model_property_changed<F, C>(
    model_object_old: &ModelObject,
    model_object_new: &ModelObject,
    type_filter: F,
    unchanged: C,
) -> bool
where
    F: Fn(VolumeType) -> bool,
    C: Fn(&ModelVolume, &ModelVolume) -> bool,
{
    debug_assert!(!model_volume_list_changed_by(
        model_object_old,
        model_object_new,
        &type_filter
    ));
    let mut i_old = 0;
    let mut i_new = 0;
    while i_old < model_object_old.volumes.len() && i_new < model_object_new.volumes.len() {
        let mv_old = &model_object_old.volumes[i_old];
        let mv_new = &model_object_new.volumes[i_new];
        if !type_filter(mv_old.volume_type()) {
            i_old += 1;
            continue;
        }
        if !type_filter(mv_new.volume_type()) {
            i_new += 1;
            continue;
        }
        debug_assert!(mv_old.volume_type() == mv_new.volume_type() && mv_old.id() == mv_new.id());
        if !unchanged(mv_old, mv_new) {
            return true;
        }
        i_old += 1;
        i_new += 1;
    }
    false
}

/// True when support paint differs between two snapshots of one object
/// (the volume lists themselves must pair up)
pub fn model_custom_supports_data_changed(mo: &ModelObject, mo_new: &ModelObject) -> bool {
    model_property_changed(
        mo,
        mo_new,
        |t| t == VolumeType::ModelPart,
        |mv_old, mv_new| mv_old.supported_facets.timestamp_matches(&mv_new.supported_facets),
    )
}

/// True when seam paint differs between two snapshots of one object
pub fn model_custom_seam_data_changed(mo: &ModelObject, mo_new: &ModelObject) -> bool {
    model_property_changed(
        mo,
        mo_new,
        |t| t == VolumeType::ModelPart,
        |mv_old, mv_new| mv_old.seam_facets.timestamp_matches(&mv_new.seam_facets),
    )
}

/// True when multi-material paint differs between two snapshots of one
/// object
pub fn model_mmu_segmentation_data_changed(mo: &ModelObject, mo_new: &ModelObject) -> bool {
    model_property_changed(
        mo,
        mo_new,
        |t| t == VolumeType::ModelPart,
        |mv_old, mv_new| {
            mv_old
                .mmu_segmentation_facets
                .timestamp_matches(&mv_new.mmu_segmentation_facets)
        },
    )
}

/// True when any object is more than a single plain part
pub fn model_has_multi_part_objects(model: &Model) -> bool {
    model
        .objects
        .iter()
        .any(|o| o.volumes.len() != 1 || !o.volumes[0].is_model_part())
}

/// True when the model uses anything beyond single-part objects with at
/// most an extruder override each
pub fn model_has_advanced_features(model: &Model) -> bool {
    fn config_is_advanced(config: &ObjectConfig) -> bool {
        !(config.is_empty() || (config.len() == 1 && config.get("extruder").is_some()))
    }
    for object in &model.objects {
        if object.instances.len() > 1 || config_is_advanced(&object.config) {
            return true;
        }
        for volume in &object.volumes {
            if !volume.is_model_part() || config_is_advanced(&volume.config) {
                return true;
            }
        }
    }
    false
}

/// Assert that every identity in the model is valid and unique
#[cfg(debug_assertions)]
pub fn check_model_ids_validity(model: &Model) {
    use std::collections::HashSet;
    let mut ids = HashSet::new();
    let mut check = |id: ObjectId| {
        assert!(id.is_valid());
        assert!(ids.insert(id), "duplicate object id {id}");
    };
    for object in &model.objects {
        check(object.id());
        check(object.config.id());
        for volume in &object.volumes {
            check(volume.id());
            check(volume.config.id());
        }
        for instance in &object.instances {
            check(instance.id());
        }
    }
    for material in model.materials.values() {
        check(material.id());
        check(material.config.id());
    }
}

/// Assert that two models carry pairwise identical identities
#[cfg(debug_assertions)]
pub fn check_model_ids_equal(model1: &Model, model2: &Model) {
    assert_eq!(model1.objects.len(), model2.objects.len());
    for (object1, object2) in model1.objects.iter().zip(&model2.objects) {
        assert_eq!(object1.id(), object2.id());
        assert_eq!(object1.config.id(), object2.config.id());
        assert_eq!(object1.volumes.len(), object2.volumes.len());
        assert_eq!(object1.instances.len(), object2.instances.len());
        for (volume1, volume2) in object1.volumes.iter().zip(&object2.volumes) {
            assert_eq!(volume1.id(), volume2.id());
            assert_eq!(volume1.config.id(), volume2.config.id());
        }
        for (instance1, instance2) in object1.instances.iter().zip(&object2.instances) {
            assert_eq!(instance1.id(), instance2.id());
        }
    }
    assert_eq!(model1.materials.len(), model2.materials.len());
    for ((key1, material1), (key2, material2)) in model1.materials.iter().zip(&model2.materials) {
        assert_eq!(key1, key2);
        assert_eq!(material1.id(), material2.id());
        assert_eq!(material1.config.id(), material2.config.id());
    }
}
