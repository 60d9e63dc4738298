//! Integration tests for load-time fixups and unit conversion
//!
//! Imports arrive in unknown units, sometimes exploded into one object
//! per part, sometimes hanging below the bed. These tests pin down the
//! detection heuristics and the conversions they trigger.

use nalgebra::Vector3;
use printmodel::{ConversionType, Error, Model, TriangleMesh};

/// Model holding one `size`-mm cube object with a default instance
fn cube_model(size: f32) -> Model {
    let mut model = Model::new();
    model.add_object("cube", "cube.stl", TriangleMesh::cube(size, size, size));
    model.add_default_instances();
    model
}

#[test]
fn test_multipart_heuristic_wants_differing_bottom_heights() {
    // A lone object is never a multipart candidate.
    let mut model = cube_model(10.0);
    assert!(!model.looks_like_multipart_object());

    // Two parts both resting on the bed are independent parts.
    model.add_object("second", "cube.stl", TriangleMesh::cube(10.0, 10.0, 10.0));
    model.add_default_instances();
    assert!(!model.looks_like_multipart_object());

    // One part floating at assembly height is the tell.
    model.objects[1].instances[0].set_offset(Vector3::new(0.0, 0.0, 20.0));
    model.objects[1].invalidate_bounding_box();
    assert!(model.looks_like_multipart_object());

    // Multi-volume objects were authored deliberately; never flatten them.
    model.objects[0].add_volume(TriangleMesh::cube(5.0, 5.0, 5.0));
    assert!(!model.looks_like_multipart_object());
}

#[test]
fn test_convert_multipart_object_flattens_without_moving_geometry() {
    let mut model = Model::new();
    model.add_object("left", "assembly.stl", TriangleMesh::cube(10.0, 10.0, 10.0));
    model.add_object("right", "assembly.stl", TriangleMesh::cube(10.0, 10.0, 10.0));
    model.add_default_instances();
    model.objects[1].instances[0].set_offset(Vector3::new(0.0, 0.0, 20.0));
    model.objects[1].invalidate_bounding_box();

    let before = model.bounding_box_exact();
    assert!(model.looks_like_multipart_object());

    model.convert_multipart_object();
    assert_eq!(model.objects.len(), 1);

    let object = &model.objects[0];
    // Named after the source file, volumes named after the source objects.
    assert_eq!(object.name, "assembly");
    assert_eq!(object.volumes.len(), 2);
    assert_eq!(object.volumes[0].name, "left");
    assert_eq!(object.volumes[1].name, "right");
    assert!(object.instances.is_empty());

    // With a fresh identity placement the parts sit where they were.
    model.add_default_instances();
    let after = model.bounding_box_exact();
    assert!((after.min.z - before.min.z).abs() < 1e-5);
    assert!((after.max.z - before.max.z).abs() < 1e-5);
    assert!((after.max.z - 30.0).abs() < 1e-5);
}

#[test]
fn test_imperial_heuristic_keys_on_tiny_mesh_volume() {
    // A 1mm cube encloses 1mm³, far below anything printable.
    assert!(cube_model(1.0).looks_like_imperial_units());
    assert!(!cube_model(10.0).looks_like_imperial_units());
}

#[test]
fn test_convert_from_imperial_units_can_spare_large_objects() {
    let mut model = cube_model(1.0);
    model.add_object("big", "big.stl", TriangleMesh::cube(60.0, 60.0, 60.0));
    model.add_default_instances();

    model.convert_from_imperial_units(true);

    // Only the small object was treated as inch-authored.
    let small = model.objects[0].raw_mesh_bounding_box().size();
    let big = model.objects[1].raw_mesh_bounding_box().size();
    assert!((small.x - 25.4).abs() < 1e-5, "got {}", small.x);
    assert!((big.x - 60.0).abs() < 1e-5, "got {}", big.x);
    assert!(model.objects[0].volumes[0].source.is_converted_from_inches);
    assert!(!model.objects[1].volumes[0].source.is_converted_from_inches);
}

#[test]
fn test_meters_heuristic_and_conversion() {
    let mut model = cube_model(0.05);
    assert!(model.looks_like_saved_in_meters());

    model.convert_from_meters(false);
    let size = model.objects[0].raw_mesh_bounding_box().size();
    assert!((size.x - 50.0).abs() < 1e-3, "got {}", size.x);
    assert!(model.objects[0].volumes[0].source.is_converted_from_meters);
    assert!(!model.looks_like_saved_in_meters());
}

#[test]
fn test_zero_volume_objects_are_removed() {
    let mut model = cube_model(10.0);
    let sheet = TriangleMesh::from_raw(
        vec![
            nalgebra::Point3::new(0.0, 0.0, 0.0),
            nalgebra::Point3::new(10.0, 0.0, 0.0),
            nalgebra::Point3::new(0.0, 10.0, 0.0),
        ],
        vec![[0, 1, 2]],
    );
    model.add_object("sheet", "sheet.stl", sheet);
    model.add_default_instances();

    assert_eq!(model.removed_objects_with_zero_volume(), 1);
    assert_eq!(model.objects.len(), 1);
    assert_eq!(model.objects[0].name, "cube");
}

#[test]
fn test_adjust_min_z_lifts_sunken_objects_only() {
    let mut model = cube_model(10.0);
    model.add_object("resting", "cube.stl", TriangleMesh::cube(10.0, 10.0, 10.0));
    model.add_default_instances();
    model.objects[0].instances[0].set_offset(Vector3::new(0.0, 0.0, -4.0));
    model.objects[0].invalidate_bounding_box();

    model.adjust_min_z();
    assert!((model.objects[0].min_z() - 0.0).abs() < 1e-9);
    assert!((model.objects[1].min_z() - 0.0).abs() < 1e-9);
    assert!(model.bounding_box_exact().min.z.abs() < 1e-9);
}

#[test]
fn test_duplicate_objects_grid_spaces_copies_by_footprint() {
    let mut model = cube_model(10.0);
    model.duplicate_objects_grid(2, 3, 5.0).unwrap();

    let object = &model.objects[0];
    assert_eq!(object.instances.len(), 6);

    // Cell pitch is the footprint plus the gap: 10 + 5.
    let world = object.bounding_box_exact();
    assert!((world.max.x - 25.0).abs() < 1e-5, "got {}", world.max.x);
    assert!((world.max.y - 40.0).abs() < 1e-5, "got {}", world.max.y);

    // Refused outright for multi-object models.
    let mut multi = cube_model(10.0);
    multi.add_object("second", "cube.stl", TriangleMesh::cube(10.0, 10.0, 10.0));
    match multi.duplicate_objects_grid(2, 2, 5.0) {
        Err(Error::InvalidArgument(message)) => assert!(message.contains("multiple")),
        other => panic!("expected an invalid-argument error, got {:?}", other),
    }

    // And for empty ones.
    assert!(Model::new().duplicate_objects_grid(2, 2, 5.0).is_err());
}

#[test]
fn test_convert_units_rescales_selected_volumes_into_a_copy() {
    let mut model = cube_model(10.0);
    {
        let object = &mut model.objects[0];
        let mut side = TriangleMesh::cube(5.0, 5.0, 5.0);
        side.translate(Vector3::new(20.0_f32, 0.0, 0.0));
        object.add_volume(side);
    }
    let source = &model.objects[0];

    // Full conversion scales every volume and its placement.
    let converted = source.convert_units(ConversionType::FromInches, &[]);
    assert_ne!(converted.id(), source.id());
    let size = converted.raw_mesh_bounding_box().size();
    assert!((size.x - 25.4 * 25.0).abs() < 1e-2, "got {}", size.x);
    assert!(converted.volumes[0].source.is_converted_from_inches);

    // A partial conversion touches only the listed volume.
    let partial = source.convert_units(ConversionType::FromInches, &[1]);
    let first = partial.volumes[0].mesh().bounding_box().size();
    let second = partial.volumes[1].mesh().bounding_box().size();
    assert!((first.x - 10.0).abs() < 1e-4, "got {}", first.x);
    assert!((second.x - 127.0).abs() < 1e-3, "got {}", second.x);
    assert!(!partial.volumes[0].source.is_converted_from_inches);
    assert!(partial.volumes[1].source.is_converted_from_inches);
}
