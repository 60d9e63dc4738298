//! Triangle mesh value type and bounding boxes
//!
//! This module provides the geometry carrier the entity graph hangs onto:
//! - [`TriangleMesh`]: indexed triangle soup with volume, bounding box,
//!   transform, merge, split and convex hull operations
//! - [`BoundingBox3`]: axis-aligned box in f64 with an explicit
//!   defined/undefined state, so aggregations over zero entities stay
//!   distinguishable from a box at the origin
//!
//! Vertices are stored in f32 (matching the precision of the mesh file
//! formats this data comes from); placements and bounding boxes are f64
//! because instance transforms accumulate rotations.

use std::collections::HashMap;

use nalgebra::{Matrix4, Point3, Vector3};
use parry3d::shape::{Shape, TriMesh as ParryTriMesh};

use crate::error::{Error, Result};

/// Meshes whose enclosed volume is below this are treated as flat/degenerate
const ZERO_VOLUME: f64 = 1e-10;

/// Axis-aligned bounding box over f64 coordinates
///
/// A default-constructed box is *undefined*: merging the first point or box
/// into it replaces the bounds instead of extending them. Accessors on an
/// undefined box return zeros, which downstream degenerate-geometry checks
/// rely on (a zero size axis marks a box as unusable).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BoundingBox3 {
    /// Lower corner; zeros while the box is undefined
    pub min: Point3<f64>,
    /// Upper corner; zeros while the box is undefined
    pub max: Point3<f64>,
    defined: bool,
}

impl Default for BoundingBox3 {
    fn default() -> Self {
        BoundingBox3 {
            min: Point3::origin(),
            max: Point3::origin(),
            defined: false,
        }
    }
}

impl BoundingBox3 {
    /// An undefined (empty) box
    pub fn new() -> Self {
        BoundingBox3::default()
    }

    /// Box spanning two corners
    pub fn from_min_max(min: Point3<f64>, max: Point3<f64>) -> Self {
        BoundingBox3 {
            min,
            max,
            defined: min.x <= max.x && min.y <= max.y && min.z <= max.z,
        }
    }

    /// Whether any point has been merged in
    pub fn is_defined(&self) -> bool {
        self.defined
    }

    /// Extend the box to cover one point
    pub fn merge_point(&mut self, point: Point3<f64>) {
        if self.defined {
            self.min = self.min.inf(&point);
            self.max = self.max.sup(&point);
        } else {
            self.min = point;
            self.max = point;
            self.defined = true;
        }
    }

    /// Extend the box to cover another box; merging an undefined box is a
    /// no-op
    pub fn merge(&mut self, other: &BoundingBox3) {
        if other.defined {
            self.merge_point(other.min);
            self.merge_point(other.max);
        }
    }

    /// Edge lengths; zeros when undefined
    pub fn size(&self) -> Vector3<f64> {
        if self.defined {
            self.max - self.min
        } else {
            Vector3::zeros()
        }
    }

    /// Geometric center; origin when undefined
    pub fn center(&self) -> Point3<f64> {
        if self.defined {
            nalgebra::center(&self.min, &self.max)
        } else {
            Point3::origin()
        }
    }

    /// Shift the box without changing its size
    pub fn translate(&mut self, offset: Vector3<f64>) {
        if self.defined {
            self.min += offset;
            self.max += offset;
        }
    }

    /// Grow (or shrink, with a negative delta) by the same amount on every
    /// side
    pub fn inflated(&self, delta: f64) -> BoundingBox3 {
        if !self.defined {
            return *self;
        }
        let d = Vector3::new(delta, delta, delta);
        BoundingBox3::from_min_max(self.min - d, self.max + d)
    }

    /// The box covering this box under an affine transform
    ///
    /// Transforms the 8 corners and re-aggregates, so the result is a
    /// conservative (possibly larger) cover, not the tight box of the
    /// transformed contents.
    pub fn transformed(&self, matrix: &Matrix4<f64>) -> BoundingBox3 {
        if !self.defined {
            return *self;
        }
        let corners = [
            Point3::new(self.min.x, self.min.y, self.min.z),
            Point3::new(self.min.x, self.min.y, self.max.z),
            Point3::new(self.min.x, self.max.y, self.min.z),
            Point3::new(self.min.x, self.max.y, self.max.z),
            Point3::new(self.max.x, self.min.y, self.min.z),
            Point3::new(self.max.x, self.min.y, self.max.z),
            Point3::new(self.max.x, self.max.y, self.min.z),
            Point3::new(self.max.x, self.max.y, self.max.z),
        ];
        let mut out = BoundingBox3::new();
        for corner in &corners {
            out.merge_point(matrix.transform_point(corner));
        }
        out
    }

    /// True iff `other` lies entirely within this box
    pub fn contains(&self, other: &BoundingBox3) -> bool {
        self.defined
            && other.defined
            && self.min.x <= other.min.x
            && self.min.y <= other.min.y
            && self.min.z <= other.min.z
            && other.max.x <= self.max.x
            && other.max.y <= self.max.y
            && other.max.z <= self.max.z
    }

    /// True iff the boxes overlap (shared faces count as overlap)
    pub fn intersects(&self, other: &BoundingBox3) -> bool {
        self.defined
            && other.defined
            && self.min.x <= other.max.x
            && other.min.x <= self.max.x
            && self.min.y <= other.max.y
            && other.min.y <= self.max.y
            && self.min.z <= other.max.z
            && other.min.z <= self.max.z
    }
}

/// Indexed triangle mesh
///
/// The cheaply movable geometry value the entity graph owns and shares.
/// Vertices and faces are public: importers fill them directly and the
/// operations below treat them as plain data.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TriangleMesh {
    /// Vertex positions in single precision, as importers deliver them
    pub vertices: Vec<Point3<f32>>,
    /// Counter-clockwise vertex-index triples
    pub faces: Vec<[u32; 3]>,
}

impl TriangleMesh {
    /// Empty mesh
    pub fn new() -> Self {
        TriangleMesh::default()
    }

    /// Mesh from raw vertex and face lists
    pub fn from_raw(vertices: Vec<Point3<f32>>, faces: Vec<[u32; 3]>) -> Self {
        TriangleMesh { vertices, faces }
    }

    /// Axis-aligned box cuboid spanning `(0,0,0)` to `(x,y,z)`
    ///
    /// Convenience primitive; counter-clockwise winding, outward normals.
    pub fn cube(x: f32, y: f32, z: f32) -> Self {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(x, 0.0, 0.0),
            Point3::new(x, y, 0.0),
            Point3::new(0.0, y, 0.0),
            Point3::new(0.0, 0.0, z),
            Point3::new(x, 0.0, z),
            Point3::new(x, y, z),
            Point3::new(0.0, y, z),
        ];
        let faces = vec![
            [0, 2, 1],
            [0, 3, 2],
            [4, 5, 6],
            [4, 6, 7],
            [0, 1, 5],
            [0, 5, 4],
            [3, 7, 6],
            [3, 6, 2],
            [0, 4, 7],
            [0, 7, 3],
            [1, 2, 6],
            [1, 6, 5],
        ];
        TriangleMesh { vertices, faces }
    }

    /// True iff the mesh has no triangles
    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    /// Number of triangles
    pub fn facets_count(&self) -> usize {
        self.faces.len()
    }

    /// Enclosed volume via mass properties at unit density
    ///
    /// Zero for empty meshes; meaningful only for closed meshes with
    /// consistent winding, which is all this crate ever feeds it.
    pub fn volume(&self) -> f64 {
        if self.vertices.is_empty() || self.faces.is_empty() {
            return 0.0;
        }
        let trimesh = ParryTriMesh::new(self.vertices.clone(), self.faces.clone())
            .expect("faces checked non-empty above");
        trimesh.mass_properties(1.0).mass() as f64
    }

    /// True iff the enclosed volume is (numerically) zero
    ///
    /// Flat or unconnected leftovers from splits land here and get dropped
    /// by the callers.
    pub fn has_zero_volume(&self) -> bool {
        self.volume().abs() < ZERO_VOLUME
    }

    /// Tight bounding box of the raw (untransformed) vertices
    pub fn bounding_box(&self) -> BoundingBox3 {
        let mut bbox = BoundingBox3::new();
        for v in &self.vertices {
            bbox.merge_point(Point3::new(v.x as f64, v.y as f64, v.z as f64));
        }
        bbox
    }

    /// Tight bounding box of the mesh under an affine transform
    ///
    /// Transforms every vertex rather than the 8 box corners, so rotated
    /// meshes get an exact box instead of a conservative cover.
    pub fn transformed_bounding_box(&self, matrix: &Matrix4<f64>) -> BoundingBox3 {
        let mut bbox = BoundingBox3::new();
        for v in &self.vertices {
            let p = matrix.transform_point(&Point3::new(v.x as f64, v.y as f64, v.z as f64));
            bbox.merge_point(p);
        }
        bbox
    }

    /// Shift all vertices
    pub fn translate(&mut self, offset: Vector3<f32>) {
        for v in self.vertices.iter_mut() {
            *v += offset;
        }
    }

    /// Scale all vertices component-wise about the origin
    pub fn scale(&mut self, factor: Vector3<f32>) {
        for v in self.vertices.iter_mut() {
            v.x *= factor.x;
            v.y *= factor.y;
            v.z *= factor.z;
        }
    }

    /// Apply an affine transform to all vertices
    ///
    /// With `fix_left_handed` set, a transform that flips orientation
    /// (negative determinant) also reverses triangle winding so normals
    /// keep pointing outward.
    pub fn transform(&mut self, matrix: &Matrix4<f64>, fix_left_handed: bool) {
        for v in self.vertices.iter_mut() {
            let p = matrix.transform_point(&Point3::new(v.x as f64, v.y as f64, v.z as f64));
            *v = Point3::new(p.x as f32, p.y as f32, p.z as f32);
        }
        if fix_left_handed && matrix.fixed_view::<3, 3>(0, 0).determinant() < 0.0 {
            self.flip_triangles();
        }
    }

    /// Reverse the winding of every triangle
    pub fn flip_triangles(&mut self) {
        for face in self.faces.iter_mut() {
            face.swap(1, 2);
        }
    }

    /// Append another mesh (plain concatenation, no welding)
    pub fn merge(&mut self, other: &TriangleMesh) {
        let offset = self.vertices.len() as u32;
        self.vertices.extend_from_slice(&other.vertices);
        self.faces.extend(
            other
                .faces
                .iter()
                .map(|f| [f[0] + offset, f[1] + offset, f[2] + offset]),
        );
    }

    /// Split into connected components
    ///
    /// Faces are connected iff they share a vertex index. Returns the
    /// components in order of first face appearance, each with a compacted
    /// vertex list; an empty mesh yields no components.
    pub fn split(&self) -> Vec<TriangleMesh> {
        if self.faces.is_empty() {
            return Vec::new();
        }

        let mut parent: Vec<u32> = (0..self.vertices.len() as u32).collect();
        for face in &self.faces {
            union(&mut parent, face[0], face[1]);
            union(&mut parent, face[0], face[2]);
        }

        // Components numbered by first face appearance, so callers keeping
        // the "first" component preserve a stable choice
        let mut component_of_root: HashMap<u32, usize> = HashMap::new();
        let mut components: Vec<TriangleMesh> = Vec::new();
        let mut vertex_remap: Vec<HashMap<u32, u32>> = Vec::new();

        for face in &self.faces {
            let root = find(&mut parent, face[0]);
            let idx = *component_of_root.entry(root).or_insert_with(|| {
                components.push(TriangleMesh::new());
                vertex_remap.push(HashMap::new());
                components.len() - 1
            });
            let mesh = &mut components[idx];
            let remap = &mut vertex_remap[idx];
            let mut new_face = [0u32; 3];
            for (slot, &old) in new_face.iter_mut().zip(face.iter()) {
                *slot = *remap.entry(old).or_insert_with(|| {
                    mesh.vertices.push(self.vertices[old as usize]);
                    (mesh.vertices.len() - 1) as u32
                });
            }
            mesh.faces.push(new_face);
        }
        components
    }

    /// Convex hull of the vertex cloud as a new closed mesh
    ///
    /// Fails for degenerate input (fewer than 4 vertices, or all vertices
    /// coplanar); callers treat a failed hull as "this piece has no usable
    /// geometry".
    pub fn convex_hull_3d(&self) -> Result<TriangleMesh> {
        if self.vertices.len() < 4 {
            return Err(Error::ConvexHull(format!(
                "need at least 4 vertices, have {}",
                self.vertices.len()
            )));
        }
        match parry3d::transformation::try_convex_hull(&self.vertices) {
            Ok((vertices, faces)) => Ok(TriangleMesh { vertices, faces }),
            Err(e) => Err(Error::ConvexHull(format!("{e:?}"))),
        }
    }
}

/// Union-find root lookup with path halving
fn find(parent: &mut [u32], mut x: u32) -> u32 {
    while parent[x as usize] != x {
        parent[x as usize] = parent[parent[x as usize] as usize];
        x = parent[x as usize];
    }
    x
}

fn union(parent: &mut [u32], a: u32, b: u32) {
    let ra = find(parent, a);
    let rb = find(parent, b);
    if ra != rb {
        parent[rb as usize] = ra;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cube_volume() {
        let mesh = TriangleMesh::cube(1.0, 1.0, 1.0);
        assert!((mesh.volume() - 1.0).abs() < 0.01, "volume: {}", mesh.volume());
        assert!(!mesh.has_zero_volume());
        assert_eq!(mesh.facets_count(), 12);
    }

    #[test]
    fn test_empty_mesh_volume_and_bbox() {
        let mesh = TriangleMesh::new();
        assert_eq!(mesh.volume(), 0.0);
        assert!(mesh.has_zero_volume());
        assert!(!mesh.bounding_box().is_defined());
        assert_eq!(mesh.bounding_box().size(), Vector3::zeros());
    }

    #[test]
    fn test_bounding_box_merge_semantics() {
        let mut bbox = BoundingBox3::new();
        assert!(!bbox.is_defined());
        bbox.merge_point(Point3::new(1.0, 2.0, 3.0));
        assert!(bbox.is_defined());
        assert_eq!(bbox.min, Point3::new(1.0, 2.0, 3.0));
        assert_eq!(bbox.max, Point3::new(1.0, 2.0, 3.0));
        bbox.merge_point(Point3::new(-1.0, 5.0, 0.0));
        assert_eq!(bbox.min, Point3::new(-1.0, 2.0, 0.0));
        assert_eq!(bbox.max, Point3::new(1.0, 5.0, 3.0));
        assert_eq!(bbox.center(), Point3::new(0.0, 3.5, 1.5));

        let mut other = BoundingBox3::new();
        other.merge(&bbox);
        assert_eq!(other, bbox);
        other.merge(&BoundingBox3::new());
        assert_eq!(other, bbox);
    }

    #[test]
    fn test_transformed_bbox_translation() {
        let mesh = TriangleMesh::cube(2.0, 2.0, 2.0);
        let m = Matrix4::new_translation(&Vector3::new(5.0, 5.0, 5.0));
        let bbox = mesh.transformed_bounding_box(&m);
        assert_eq!(bbox.min, Point3::new(5.0, 5.0, 5.0));
        assert_eq!(bbox.max, Point3::new(7.0, 7.0, 7.0));
    }

    #[test]
    fn test_exact_vs_corner_transformed_bbox_under_rotation() {
        let mesh = TriangleMesh::cube(1.0, 1.0, 1.0);
        let m = nalgebra::Rotation3::from_euler_angles(0.0, 0.0, std::f64::consts::FRAC_PI_4)
            .to_homogeneous();
        let exact = mesh.transformed_bounding_box(&m);
        let cover = mesh.bounding_box().transformed(&m);
        // Corner cover can only be larger or equal, never smaller
        assert!(cover.size().x >= exact.size().x - 1e-9);
        assert!(cover.size().y >= exact.size().y - 1e-9);
        let expected = 2.0_f64.sqrt();
        assert!((exact.size().x - expected).abs() < 1e-6);
    }

    #[test]
    fn test_merge_concatenates() {
        let mut a = TriangleMesh::cube(1.0, 1.0, 1.0);
        let mut b = TriangleMesh::cube(1.0, 1.0, 1.0);
        b.translate(Vector3::new(5.0, 0.0, 0.0));
        a.merge(&b);
        assert_eq!(a.facets_count(), 24);
        assert_eq!(a.vertices.len(), 16);
        // Faces of the appended mesh point at the appended vertices
        assert!(a.faces[12..].iter().all(|f| f.iter().all(|&i| i >= 8)));
        assert_eq!(a.bounding_box().max, Point3::new(6.0, 1.0, 1.0));
    }

    #[test]
    fn test_split_disconnected_components() {
        let mut mesh = TriangleMesh::cube(1.0, 1.0, 1.0);
        let mut second = TriangleMesh::cube(1.0, 1.0, 1.0);
        second.translate(Vector3::new(10.0, 0.0, 0.0));
        mesh.merge(&second);

        let pieces = mesh.split();
        assert_eq!(pieces.len(), 2);
        assert_eq!(pieces[0].facets_count(), 12);
        assert_eq!(pieces[1].facets_count(), 12);
        // First-encountered component first, with compacted indices
        assert_eq!(pieces[0].bounding_box().max, Point3::new(1.0, 1.0, 1.0));
        assert_eq!(pieces[1].bounding_box().min, Point3::new(10.0, 0.0, 0.0));
        assert_eq!(pieces[1].vertices.len(), 8);
        assert!((pieces[1].volume() - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_split_connected_mesh_is_single_component() {
        let mesh = TriangleMesh::cube(1.0, 1.0, 1.0);
        let pieces = mesh.split();
        assert_eq!(pieces.len(), 1);
        assert_eq!(pieces[0].facets_count(), 12);
    }

    #[test]
    fn test_split_empty_mesh() {
        assert!(TriangleMesh::new().split().is_empty());
    }

    #[test]
    fn test_transform_fix_left_handed_restores_volume_sign() {
        let mut mesh = TriangleMesh::cube(1.0, 1.0, 1.0);
        let mirror = Matrix4::new_nonuniform_scaling(&Vector3::new(-1.0, 1.0, 1.0));
        mesh.transform(&mirror, true);
        // Winding was flipped along with the mirror, volume stays positive
        assert!((mesh.volume() - 1.0).abs() < 0.01, "volume: {}", mesh.volume());

        let mut unfixed = TriangleMesh::cube(1.0, 1.0, 1.0);
        unfixed.transform(&mirror, false);
        assert!(unfixed.volume() < 0.0, "volume: {}", unfixed.volume());
    }

    #[test]
    fn test_convex_hull_of_cube() {
        let mesh = TriangleMesh::cube(2.0, 2.0, 2.0);
        let hull = mesh.convex_hull_3d().unwrap();
        assert!(!hull.is_empty());
        assert!((hull.volume() - 8.0).abs() < 0.05, "volume: {}", hull.volume());
        assert_eq!(hull.bounding_box(), mesh.bounding_box());
    }

    #[test]
    fn test_convex_hull_degenerate() {
        let mesh = TriangleMesh::from_raw(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
            ],
            vec![[0, 1, 2]],
        );
        let result = mesh.convex_hull_3d();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("[E2002]"));
    }

    #[test]
    fn test_bbox_contains_and_intersects() {
        let outer = BoundingBox3::from_min_max(Point3::new(0.0, 0.0, 0.0), Point3::new(10.0, 10.0, 10.0));
        let inner = BoundingBox3::from_min_max(Point3::new(1.0, 1.0, 1.0), Point3::new(2.0, 2.0, 2.0));
        let outside = BoundingBox3::from_min_max(Point3::new(20.0, 0.0, 0.0), Point3::new(21.0, 1.0, 1.0));
        assert!(outer.contains(&inner));
        assert!(!outer.contains(&outside));
        assert!(outer.intersects(&inner));
        assert!(!outer.intersects(&outside));
        assert!(!BoundingBox3::new().intersects(&outer));
    }
}
