//! Property-based tests for the model graph
//!
//! These tests use proptest to generate random paint payloads, transforms
//! and meshes, and verify the structural invariants hold across a wide
//! range of inputs.

use std::collections::BTreeMap;

use nalgebra::{Point3, Vector3};
use printmodel::{
    BoundingBox3, FacetState, FacetsAnnotation, Model, ObjectId, Transformation, TriangleMesh,
};
use proptest::prelude::*;

// ============================================================================
// Generators
// ============================================================================

/// Generate a finite offset vector within plausible bed coordinates
fn offset_strategy() -> impl Strategy<Value = Vector3<f64>> {
    (-1000.0..1000.0, -1000.0..1000.0, -1000.0..1000.0)
        .prop_map(|(x, y, z)| Vector3::new(x, y, z))
}

/// Generate a strictly positive per-axis scale
fn scale_strategy() -> impl Strategy<Value = Vector3<f64>> {
    (0.05..20.0, 0.05..20.0, 0.05..20.0).prop_map(|(x, y, z)| Vector3::new(x, y, z))
}

/// Generate XYZ Euler angles in the normalized range
fn rotation_strategy() -> impl Strategy<Value = Vector3<f64>> {
    let angle = 0.0..std::f64::consts::TAU;
    (angle.clone(), angle.clone(), angle).prop_map(|(x, y, z)| Vector3::new(x, y, z))
}

/// Generate sparse paint as facet index -> hex payload, ascending by key
fn paint_map_strategy() -> impl Strategy<Value = BTreeMap<u32, String>> {
    prop::collection::btree_map(0u32..10_000, "[0-9A-F]{1,8}", 0..40)
}

/// Generate facet states with multi-material codes, ascending by facet
fn state_map_strategy() -> impl Strategy<Value = BTreeMap<u32, u8>> {
    prop::collection::btree_map(0u32..5_000, 1u8..=15, 1..30)
}

/// Generate a point cloud within plausible scene coordinates
fn point_cloud_strategy() -> impl Strategy<Value = Vec<Point3<f64>>> {
    prop::collection::vec(
        (-500.0..500.0, -500.0..500.0, -500.0..500.0).prop_map(|(x, y, z)| Point3::new(x, y, z)),
        1..50,
    )
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    /// The hex codec is its own inverse for any payload, leading zeros
    /// and multi-digit groups included
    #[test]
    fn test_hex_codec_round_trips(paint_map in paint_map_strategy()) {
        let mut paint = FacetsAnnotation::new();
        for (facet_idx, hex) in &paint_map {
            paint.set_facet_from_hex(*facet_idx, hex);
        }

        prop_assert_eq!(
            paint.facet_indices(),
            paint_map.keys().copied().collect::<Vec<_>>()
        );
        for (facet_idx, hex) in &paint_map {
            let round_tripped = paint.facet_to_hex(*facet_idx);
            prop_assert_eq!(round_tripped.as_deref(), Some(hex.as_str()));
        }
    }

    /// Replaying identical facet states registers as no change
    #[test]
    fn test_set_facet_states_is_idempotent(state_map in state_map_strategy()) {
        let states: Vec<(u32, FacetState)> = state_map
            .iter()
            .map(|(idx, code)| (*idx, FacetState::extruder(*code)))
            .collect();

        let mut paint = FacetsAnnotation::new();
        prop_assert!(paint.set_facet_states(&states));
        let timestamp = paint.timestamp();

        prop_assert!(!paint.set_facet_states(&states));
        prop_assert!(paint.timestamp().matches(timestamp));
    }

    /// Decomposing a composed matrix reproduces it
    #[test]
    fn test_transformation_survives_matrix_round_trip(
        offset in offset_strategy(),
        rotation in rotation_strategy(),
        scale in scale_strategy(),
    ) {
        let mut transform = Transformation::new();
        transform.set_offset(offset);
        transform.set_rotation(rotation);
        transform.set_scaling_factor(scale);

        let matrix = transform.matrix();
        let rebuilt = Transformation::from_matrix(&matrix).matrix();
        let scale_bound = 1e-6 * matrix.amax().max(1.0);
        prop_assert!(
            (rebuilt - matrix).amax() < scale_bound,
            "matrix drifted by {}",
            (rebuilt - matrix).amax()
        );
    }

    /// A box grown from a point cloud contains every point of the cloud
    #[test]
    fn test_bounding_box_contains_merged_points(points in point_cloud_strategy()) {
        let mut bbox = BoundingBox3::new();
        for point in &points {
            bbox.merge_point(*point);
        }

        for point in &points {
            prop_assert!(bbox.min.x <= point.x && point.x <= bbox.max.x);
            prop_assert!(bbox.min.y <= point.y && point.y <= bbox.max.y);
            prop_assert!(bbox.min.z <= point.z && point.z <= bbox.max.z);
        }
        let size = bbox.size();
        prop_assert!(size.x >= 0.0 && size.y >= 0.0 && size.z >= 0.0);
    }

    /// Splitting disconnected geometry conserves components and facets
    #[test]
    fn test_mesh_split_conserves_facets(cube_count in 1usize..6, size in 1.0f32..20.0) {
        let mut mesh = TriangleMesh::new();
        for i in 0..cube_count {
            let mut cube = TriangleMesh::cube(size, size, size);
            cube.translate(Vector3::new(3.0 * size * i as f32, 0.0, 0.0));
            mesh.merge(&cube);
        }

        let pieces = mesh.split();
        prop_assert_eq!(pieces.len(), cube_count);
        let total: usize = pieces.iter().map(TriangleMesh::facets_count).sum();
        prop_assert_eq!(total, mesh.facets_count());
    }

    /// Moving an instance translates the world box without reshaping it
    #[test]
    fn test_instance_offset_translates_the_world_box(offset in offset_strategy()) {
        let mut model = Model::new();
        model.add_object("cube", "cube.stl", TriangleMesh::cube(10.0, 10.0, 10.0));
        model.add_default_instances();

        let before = model.objects[0].bounding_box_exact();
        model.objects[0].instances[0].set_offset(offset);
        model.objects[0].invalidate_bounding_box();
        let after = model.objects[0].bounding_box_exact();

        prop_assert!((after.min.x - (before.min.x + offset.x)).abs() < 1e-6);
        prop_assert!((after.min.y - (before.min.y + offset.y)).abs() < 1e-6);
        prop_assert!((after.min.z - (before.min.z + offset.z)).abs() < 1e-6);
        prop_assert!((after.size() - before.size()).amax() < 1e-6);
    }

    /// Sequential id allocation never repeats
    #[test]
    fn test_ids_stay_unique(count in 1usize..200) {
        let ids: Vec<ObjectId> = (0..count).map(|_| ObjectId::next()).collect();
        let distinct: std::collections::BTreeSet<_> = ids.iter().copied().collect();
        prop_assert_eq!(distinct.len(), ids.len());
        prop_assert!(ids.iter().all(|id| id.is_valid()));
    }
}

// ============================================================================
// Deterministic edge cases
// ============================================================================

#[test]
fn test_empty_mesh_split_yields_nothing() {
    assert!(TriangleMesh::new().split().is_empty());
}

#[test]
fn test_undefined_bounding_box_reports_zeros() {
    let bbox = BoundingBox3::new();
    assert_eq!(bbox.size(), Vector3::zeros());
    assert_eq!(bbox.center(), Point3::origin());

    // The first merge defines the box instead of extending from zero.
    let mut grown = bbox;
    grown.merge_point(Point3::new(5.0, 5.0, 5.0));
    assert_eq!(grown.min, Point3::new(5.0, 5.0, 5.0));
    assert_eq!(grown.max, Point3::new(5.0, 5.0, 5.0));
}

#[test]
fn test_empty_annotation_reports_nothing() {
    let paint = FacetsAnnotation::new();
    assert!(paint.is_empty());
    assert!(paint.facet_to_hex(0).is_none());
    assert!(paint.state_indices().is_empty());
    assert!(paint.facet_indices().is_empty());
}
