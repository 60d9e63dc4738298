//! Integration tests for entity identity and copy semantics
//!
//! The graph distinguishes two kinds of duplication: identity-preserving
//! snapshots (`from_copy`/`assign_copy`, for undo stacks and background
//! processing) and re-identified duplicates (`from_clone`/`assign_clone`,
//! for placing a copy next to the original in the same model). These tests
//! pin down which ids survive which path and that both paths produce
//! genuinely independent trees.

use nalgebra::Vector3;
use printmodel::{ConfigValue, FacetState, Model, ModelObject, TriangleMesh};

/// A model holding one cube object with one instance and one material
fn small_model() -> Model {
    let mut model = Model::new();
    {
        let object = model.add_object("cube", "cube.stl", TriangleMesh::cube(10.0, 10.0, 10.0));
        object.add_instance();
        object.volumes[0].set_material_id("pla");
    }
    model.add_material("pla");
    model
}

#[test]
fn test_live_entities_get_distinct_valid_ids() {
    let model = small_model();
    let object = &model.objects[0];
    let ids = [
        model.id().as_u64(),
        object.id().as_u64(),
        object.config.id().as_u64(),
        object.volumes[0].id().as_u64(),
        object.volumes[0].config.id().as_u64(),
        object.instances[0].id().as_u64(),
        model.get_material("pla").unwrap().id().as_u64(),
    ];
    for (i, a) in ids.iter().enumerate() {
        assert_ne!(*a, 0, "entity {} carries the reserved invalid id", i);
        for b in &ids[i + 1..] {
            assert_ne!(a, b, "two live entities share id {}", a);
        }
    }
}

#[test]
fn test_from_copy_preserves_every_id() {
    let mut model = small_model();
    let backup = model.get_object_backup_id(model.objects[0].id());

    let copy = Model::from_copy(&model);
    assert_eq!(copy.id(), model.id());

    let (a, b) = (&model.objects[0], &copy.objects[0]);
    assert_eq!(a.id(), b.id());
    assert_eq!(a.config.id(), b.config.id());
    assert_eq!(a.volumes[0].id(), b.volumes[0].id());
    assert_eq!(a.volumes[0].config.id(), b.volumes[0].config.id());
    assert_eq!(a.instances[0].id(), b.instances[0].id());
    assert_eq!(
        model.get_material("pla").unwrap().id(),
        copy.get_material("pla").unwrap().id()
    );
    // The backup-id map is part of the snapshot.
    assert_eq!(
        copy.peek_object_backup_id(copy.objects[0].id()),
        Some(backup)
    );

    #[cfg(debug_assertions)]
    printmodel::model::check_model_ids_equal(&model, &copy);
}

#[test]
fn test_from_clone_renews_every_id_recursively() {
    let model = small_model();
    let clone = Model::from_clone(&model);

    assert_ne!(clone.id(), model.id());
    let (a, b) = (&model.objects[0], &clone.objects[0]);
    assert_ne!(a.id(), b.id());
    assert_ne!(a.config.id(), b.config.id());
    assert_ne!(a.volumes[0].id(), b.volumes[0].id());
    assert_ne!(a.volumes[0].config.id(), b.volumes[0].config.id());
    assert_ne!(a.instances[0].id(), b.instances[0].id());
    assert_ne!(
        model.get_material("pla").unwrap().id(),
        clone.get_material("pla").unwrap().id()
    );

    // Content is untouched by the re-identification.
    assert_eq!(clone.objects[0].name, "cube");
    assert_eq!(clone.objects[0].volumes[0].mesh().facets_count(), 12);
    assert_eq!(clone.objects[0].volumes[0].material_id(), "pla");

    #[cfg(debug_assertions)]
    printmodel::model::check_model_ids_validity(&clone);
}

#[test]
fn test_assign_copy_and_assign_clone() {
    let model = small_model();

    let mut copy = Model::new();
    copy.assign_copy(&model);
    assert_eq!(copy.id(), model.id());
    assert_eq!(copy.objects[0].id(), model.objects[0].id());

    let mut clone = Model::new();
    clone.assign_clone(&model);
    assert_ne!(clone.id(), model.id());
    assert_ne!(clone.objects[0].id(), model.objects[0].id());
    assert_eq!(clone.objects.len(), 1);
}

#[test]
fn test_mutating_a_copy_leaves_the_original_alone() {
    let model = small_model();
    let original_box = model.objects[0].bounding_box_exact();

    let mut copy = Model::from_copy(&model);
    // Same identity, separate storage.
    assert_eq!(
        copy.objects[0].instances[0].id(),
        model.objects[0].instances[0].id()
    );

    copy.objects[0].instances[0].set_offset(Vector3::new(50.0, 0.0, 0.0));
    copy.objects[0].invalidate_bounding_box();
    copy.objects[0].volumes[0]
        .supported_facets
        .set_facet_states(&[(0, FacetState::ENFORCER)]);
    copy.objects[0]
        .config
        .set("extruder", ConfigValue::Int(3));

    let original = &model.objects[0];
    assert_eq!(original.instances[0].offset(), Vector3::zeros());
    assert!(!original.is_fdm_support_painted());
    assert_eq!(
        original.config.get("extruder").and_then(ConfigValue::as_int),
        Some(1)
    );
    assert_eq!(original.bounding_box_exact(), original_box);

    // And the mutated copy did move.
    let moved = copy.objects[0].bounding_box_exact();
    assert!((moved.min.x - (original_box.min.x + 50.0)).abs() < 1e-6);
}

#[test]
fn test_object_copy_and_clone_identity() {
    let mut model = Model::new();
    model.add_object("gear", "gear.stl", TriangleMesh::cube(8.0, 8.0, 8.0));
    model.objects[0].add_instance();
    let object = &model.objects[0];

    let copy = ModelObject::from_copy(object);
    assert_eq!(copy.id(), object.id());
    assert_eq!(copy.volumes[0].id(), object.volumes[0].id());
    assert_eq!(copy.instances[0].id(), object.instances[0].id());

    let clone = ModelObject::from_clone(object);
    assert_ne!(clone.id(), object.id());
    assert_ne!(clone.config.id(), object.config.id());
    assert_ne!(clone.volumes[0].id(), object.volumes[0].id());
    assert_ne!(clone.instances[0].id(), object.instances[0].id());
    assert_eq!(clone.bounding_box_exact(), object.bounding_box_exact());
}

#[test]
fn test_copy_transformation_caches_transfers_warm_boxes() {
    let mut model = Model::new();
    model.add_object("plate", "plate.stl", TriangleMesh::cube(30.0, 20.0, 2.0));
    model.objects[0].add_instance();
    let object = &model.objects[0];
    let expected = object.bounding_box_exact();

    let mut rebuilt = ModelObject::from_copy(object);
    rebuilt.invalidate_bounding_box();
    rebuilt.copy_transformation_caches(object);
    assert_eq!(rebuilt.bounding_box_exact(), expected);
    assert_eq!(
        rebuilt.raw_mesh_bounding_box(),
        object.raw_mesh_bounding_box()
    );
}

#[test]
fn test_backup_ids_allocate_low_consecutive_values() {
    let mut model = Model::new();
    model.add_object("a", "a.stl", TriangleMesh::cube(1.0, 1.0, 1.0));
    model.add_object("b", "b.stl", TriangleMesh::cube(2.0, 2.0, 2.0));
    let (a, b) = (model.objects[0].id(), model.objects[1].id());

    assert_eq!(model.peek_object_backup_id(a), None);
    assert_eq!(model.get_object_backup_id(a), 1);
    assert_eq!(model.get_object_backup_id(b), 2);
    // Repeated queries are stable.
    assert_eq!(model.get_object_backup_id(a), 1);

    // Pinning an id from a loaded file advances the allocator past it.
    model.add_object("c", "c.stl", TriangleMesh::cube(3.0, 3.0, 3.0));
    let c = model.objects[2].id();
    model.set_object_backup_id(c, 7);
    model.add_object("d", "d.stl", TriangleMesh::cube(4.0, 4.0, 4.0));
    let d = model.objects[3].id();
    assert_eq!(model.get_object_backup_id(d), 8);

    // Clearing the objects resets the allocator.
    model.clear_objects();
    model.add_object("e", "e.stl", TriangleMesh::cube(5.0, 5.0, 5.0));
    let e = model.objects[0].id();
    assert_eq!(model.get_object_backup_id(e), 1);
}

#[test]
fn test_materials_register_once_and_deletion_does_not_cascade() {
    let mut model = Model::new();
    {
        let material = model.add_material("petg");
        material
            .attributes
            .insert("displaycolor".into(), "#26A69A".into());
    }
    let first_id = model.get_material("petg").unwrap().id();

    // Registering the same key again keeps the entry and its attributes.
    model.add_material("petg");
    let material = model.get_material("petg").unwrap();
    assert_eq!(material.id(), first_id);
    assert_eq!(
        material.attributes.get("displaycolor").map(String::as_str),
        Some("#26A69A")
    );

    {
        let object = model.add_object("part", "part.stl", TriangleMesh::cube(5.0, 5.0, 5.0));
        object.volumes[0].set_material_id("petg");
    }

    // Deleting the material leaves the volume's reference dangling but safe.
    assert!(model.delete_material("petg"));
    assert!(model.get_material("petg").is_none());
    assert_eq!(model.objects[0].volumes[0].material_id(), "petg");
}
