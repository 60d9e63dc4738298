#![no_main]

use libfuzzer_sys::fuzz_target;
use libfuzzer_sys::arbitrary::{Arbitrary, Result, Unstructured};

use nalgebra::{Matrix4, Point3, Vector3};
use printmodel::mesh::TriangleMesh;

#[derive(Debug)]
struct FuzzMesh {
    vertices: Vec<(f32, f32, f32)>,
    faces: Vec<(u32, u32, u32)>,
}

impl<'a> Arbitrary<'a> for FuzzMesh {
    fn arbitrary(u: &mut Unstructured<'a>) -> Result<Self> {
        let vertex_count = u.int_in_range(0..=100)?;
        let mut vertices = Vec::new();
        for _ in 0..vertex_count {
            vertices.push((u.arbitrary()?, u.arbitrary()?, u.arbitrary()?));
        }

        // Face indices stay inside the vertex range; the mesh type stores
        // them verbatim, so out-of-range indices would only crash the
        // harness instead of exercising the geometry.
        let face_count = u.int_in_range(0..=50)?;
        let mut faces = Vec::new();
        if vertex_count > 0 {
            let max = (vertex_count - 1) as u32;
            for _ in 0..face_count {
                faces.push((
                    u.int_in_range(0..=max)?,
                    u.int_in_range(0..=max)?,
                    u.int_in_range(0..=max)?,
                ));
            }
        }

        Ok(FuzzMesh { vertices, faces })
    }
}

fuzz_target!(|data: FuzzMesh| {
    let mut mesh = TriangleMesh::new();
    for (x, y, z) in &data.vertices {
        // Skip NaN and infinite coordinates
        if !x.is_finite() || !y.is_finite() || !z.is_finite() {
            continue;
        }
        mesh.vertices.push(Point3::new(*x, *y, *z));
    }
    let limit = mesh.vertices.len() as u32;
    for (a, b, c) in &data.faces {
        if *a < limit && *b < limit && *c < limit {
            mesh.faces.push([*a, *b, *c]);
        }
    }

    let bbox = mesh.bounding_box();
    let _ = bbox.size();
    let _ = bbox.center();
    let _ = mesh.volume();
    let _ = mesh.has_zero_volume();
    let _ = mesh.convex_hull_3d();

    let matrix = Matrix4::new_translation(&Vector3::new(1.5, -2.0, 3.25));
    let _ = mesh.transformed_bounding_box(&matrix);

    // Every face lands in exactly one connected component.
    let pieces = mesh.split();
    let total: usize = pieces.iter().map(TriangleMesh::facets_count).sum();
    assert_eq!(total, mesh.facets_count());
});
