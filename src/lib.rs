//! # printmodel
//!
//! In-memory representation of a 3D print job: the objects on the
//! plate, the volumes (meshes) they are assembled from, the placed
//! instances, and the derived geometry a slicer front end keeps asking
//! for.
//!
//! The entity graph is strictly forward-owned (model to object to
//! volume/instance, never a parent pointer), so borrowing one part of
//! the tree never freezes the rest. Every expensive derived value
//! (bounding boxes, convex hulls, composed matrices) sits behind a
//! timestamp-validated cache, so repeated queries are cheap and edits
//! invalidate exactly what they touch.
//!
//! ## Features
//!
//! - Pure Rust implementation with no unsafe code
//! - Forward-only ownership: no back pointers, no reference cycles
//! - Timestamp-validated caches for transforms, bounding boxes and hulls
//! - Object editing: split, merge, unit conversion, mesh booleans
//! - Facet paint (supports, seams, multi-material) with cheap diffing
//! - Print volume classification of every placed instance
//!
//! ## Example
//!
//! ```
//! use nalgebra::Vector2;
//! use printmodel::{Model, TriangleMesh};
//!
//! let mut model = Model::new();
//! model.add_object("cube", "cube.stl", TriangleMesh::cube(10.0, 10.0, 10.0));
//! model.add_default_instances();
//! model.center_instances_around_point(Vector2::new(100.0, 100.0));
//!
//! let bbox = model.bounding_box_exact();
//! assert!((bbox.min.x - 95.0).abs() < 1e-6);
//! assert!((bbox.size().z - 10.0).abs() < 1e-6);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod boolean;
pub mod build_volume;
pub mod config;
pub mod error;
pub mod id;
pub mod mesh;
pub mod model;
pub mod paint;
pub mod polygon;
pub mod transform;

pub use boolean::{BooleanOp, MeshBoolean};
pub use build_volume::{BuildVolume, ObjectState};
pub use config::{ConfigValue, ObjectConfig};
pub use error::{Error, Result};
pub use id::{ObjectId, Timestamp};
pub use mesh::{BoundingBox3, TriangleMesh};
pub use model::{
    ArrangePolygon, ConversionType, CutId, CutInfo, ExtruderParams, InstancePrintVolumeState,
    LayerHeightProfile, LayerRange, Model, ModelInstance, ModelMaterial, ModelObject, ModelVolume,
    PrintParams, ProgressCallback, SpeedTable, TextInfo, VolumeSource, VolumeType,
    model_custom_seam_data_changed, model_custom_supports_data_changed,
    model_has_advanced_features, model_has_multi_part_objects,
    model_mmu_segmentation_data_changed, model_object_list_equal, model_object_list_extended,
    model_volume_list_changed, model_volume_list_changed_any,
};
pub use paint::{FacetState, FacetsAnnotation};
pub use polygon::Polygon;
pub use transform::Transformation;
