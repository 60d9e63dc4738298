//! Data structures representing the scene to print
//!
//! Ownership is strictly forward: a [`Model`] owns [`ModelObject`]s,
//! which own [`ModelVolume`]s (geometry) and [`ModelInstance`]s
//! (placements). Nothing points back up the tree; operations that need
//! the owner take it as a parameter.

// Declare all submodules
mod core;
mod instance;
mod object;
mod params;
mod volume;

// Re-export all public types from core module
pub use core::{
    Model, ModelMaterial, ProgressCallback, model_custom_seam_data_changed,
    model_custom_supports_data_changed, model_has_advanced_features, model_has_multi_part_objects,
    model_mmu_segmentation_data_changed, model_object_list_equal, model_object_list_extended,
    model_volume_list_changed, model_volume_list_changed_any,
};

#[cfg(debug_assertions)]
pub use core::{check_model_ids_equal, check_model_ids_validity};

// Re-export all public types from object module
pub use object::{
    ConversionType, CutId, LayerHeightProfile, LayerRange, ModelObject, SINKING_MIN_Z_THRESHOLD,
    SINKING_Z_THRESHOLD,
};

// Re-export all public types from volume module
pub use volume::{CutInfo, ModelVolume, TextInfo, VolumeSource, VolumeType};

// Re-export all public types from instance module
pub use instance::{ArrangePolygon, InstancePrintVolumeState, ModelInstance};

// Re-export all public types from params module
pub use params::{ExtruderParams, PrintParams, SpeedTable};
