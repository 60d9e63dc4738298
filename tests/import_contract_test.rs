//! Tests for the contract this crate offers to file importers
//!
//! Format parsers live outside this crate; what they get from it is the
//! progress-callback shape, a small set of load error kinds, and
//! [`Model::add_object`] as the entry point. The importer stub here
//! stands in for any such parser and pins the expected error mapping.

use std::path::Path;

use printmodel::{Error, Model, ProgressCallback, Result, TriangleMesh};

/// Minimal stand-in for a mesh file parser
///
/// "Parses" the mesh handed to it, reporting two stages through the
/// progress callback and mapping outcomes the way real importers are
/// expected to: unknown extension up front, cancellation whenever the
/// callback declines, an empty parse as [`Error::NothingLoaded`].
fn load_mesh_file(
    model: &mut Model,
    path: &str,
    contents: TriangleMesh,
    progress: &mut ProgressCallback,
) -> Result<usize> {
    let extension = Path::new(path)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    if extension != "stl" {
        return Err(Error::UnsupportedFormat(extension));
    }

    if !progress("reading", 0, 1) {
        return Err(Error::Cancelled);
    }
    if contents.is_empty() {
        return Err(Error::NothingLoaded);
    }
    if !progress("building", 1, 1) {
        return Err(Error::Cancelled);
    }

    let name = Path::new(path)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    model.add_object(&name, path, contents);
    model.add_default_instances();
    Ok(1)
}

#[test]
fn test_successful_load_builds_a_placed_object() {
    let mut model = Model::new();
    let mut stages: Vec<(String, usize, usize)> = Vec::new();
    let loaded = {
        let mut progress: ProgressCallback = Box::new(|stage, done, total| {
            stages.push((stage.to_owned(), done, total));
            true
        });
        load_mesh_file(
            &mut model,
            "parts/bracket.stl",
            TriangleMesh::cube(10.0, 10.0, 10.0),
            &mut progress,
        )
        .unwrap()
    };

    assert_eq!(loaded, 1);
    assert_eq!(model.objects.len(), 1);
    assert_eq!(model.objects[0].name, "bracket");
    assert_eq!(model.objects[0].input_file, "parts/bracket.stl");
    // The entry point leaves placement to the caller; the stub finishes
    // with the usual identity instance.
    assert_eq!(model.objects[0].instances.len(), 1);

    assert_eq!(stages.len(), 2);
    assert_eq!(stages[0], ("reading".to_owned(), 0, 1));
    assert_eq!(stages[1], ("building".to_owned(), 1, 1));
}

#[test]
fn test_unknown_extensions_are_rejected_before_any_work() {
    let mut model = Model::new();
    let mut calls = 0usize;
    let result = {
        let mut progress: ProgressCallback = Box::new(|_, _, _| {
            calls += 1;
            true
        });
        load_mesh_file(
            &mut model,
            "bracket.step",
            TriangleMesh::cube(10.0, 10.0, 10.0),
            &mut progress,
        )
    };

    match result {
        Err(Error::UnsupportedFormat(extension)) => assert_eq!(extension, "step"),
        other => panic!("expected an unsupported-format error, got {:?}", other),
    }
    assert_eq!(calls, 0, "the callback must not run for rejected files");
    assert!(model.objects.is_empty());
}

#[test]
fn test_declining_the_callback_cancels_the_load() {
    let mut model = Model::new();
    let mut progress: ProgressCallback = Box::new(|_, _, _| false);
    let result = load_mesh_file(
        &mut model,
        "bracket.stl",
        TriangleMesh::cube(10.0, 10.0, 10.0),
        &mut progress,
    );

    let err = result.unwrap_err();
    assert!(err.is_cancelled());
    assert!(model.objects.is_empty(), "a cancelled load must add nothing");
}

#[test]
fn test_cancellation_mid_pipeline_still_adds_nothing() {
    let mut model = Model::new();
    // Approve the first stage, decline the second.
    let mut approvals = vec![true, false].into_iter();
    let mut progress: ProgressCallback = Box::new(|_, _, _| approvals.next().unwrap_or(false));
    let result = load_mesh_file(
        &mut model,
        "bracket.stl",
        TriangleMesh::cube(10.0, 10.0, 10.0),
        &mut progress,
    );

    assert!(result.unwrap_err().is_cancelled());
    assert!(model.objects.is_empty());
}

#[test]
fn test_empty_contents_load_nothing() {
    let mut model = Model::new();
    let mut progress: ProgressCallback = Box::new(|_, _, _| true);
    let result = load_mesh_file(&mut model, "empty.stl", TriangleMesh::new(), &mut progress);

    match result {
        Err(Error::NothingLoaded) => {}
        other => panic!("expected the nothing-loaded error, got {:?}", other),
    }
    assert!(model.objects.is_empty());
}
