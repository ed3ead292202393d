//! Face spatial index used by the self-intersection guard
//!
//! Faces are bounded by the box around their minimum enclosing sphere. Moved
//! faces are only flagged while a collapse runs and refitted in one batch by
//! [`SpatialIndex::optimize`].

use crate::geometry::{bounding_sphere, Bounds};
use crate::mesh::{FaceId, Mesh};
use quadrix_core::Point3f;
use rstar::{RTree, RTreeObject, SelectionFunction, AABB};
use std::collections::{HashMap, HashSet};

/// Face container queried by bounding-volume predicates
pub trait SpatialIndex {
    fn insert(&mut self, mesh: &Mesh, face: FaceId);

    fn remove(&mut self, face: FaceId);

    /// Flag a face whose geometry changed
    fn mark_dirty(&mut self, face: FaceId);

    /// Refit every face flagged since the last call
    fn optimize(&mut self, mesh: &Mesh);

    /// Push every face whose volume satisfies `predicate` into `out`.
    /// The predicate must also hold for any volume enclosing a match.
    fn query<F: Fn(&Bounds) -> bool>(&self, predicate: F, out: &mut Vec<FaceId>);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq)]
struct FaceLeaf {
    face: FaceId,
    envelope: AABB<[f32; 3]>,
}

impl RTreeObject for FaceLeaf {
    type Envelope = AABB<[f32; 3]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

fn to_bounds(envelope: &AABB<[f32; 3]>) -> Bounds {
    let lo = envelope.lower();
    let hi = envelope.upper();
    Bounds::new(Point3f::new(lo[0], lo[1], lo[2]), Point3f::new(hi[0], hi[1], hi[2]))
}

fn face_envelope(mesh: &Mesh, face: FaceId) -> AABB<[f32; 3]> {
    let [a, b, c] = mesh.face_positions(face);
    let bounds = bounding_sphere(&a, &b, &c).bounds();
    AABB::from_corners(
        [bounds.min.x, bounds.min.y, bounds.min.z],
        [bounds.max.x, bounds.max.y, bounds.max.z],
    )
}

struct BoundsSelection<F>(F);

impl<F: Fn(&Bounds) -> bool> SelectionFunction<FaceLeaf> for BoundsSelection<F> {
    fn should_unpack_parent(&self, envelope: &AABB<[f32; 3]>) -> bool {
        (self.0)(&to_bounds(envelope))
    }

    fn should_unpack_leaf(&self, leaf: &FaceLeaf) -> bool {
        (self.0)(&to_bounds(&leaf.envelope))
    }
}

/// R*-tree over face bounding boxes
#[derive(Debug, Default)]
pub struct FaceRTree {
    tree: RTree<FaceLeaf>,
    envelopes: HashMap<FaceId, AABB<[f32; 3]>>,
    dirty: HashSet<FaceId>,
}

impl FaceRTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, face: FaceId) -> bool {
        self.envelopes.contains_key(&face)
    }

    /// Stored box of a face, as of its last refit
    pub fn bounds(&self, face: FaceId) -> Option<Bounds> {
        self.envelopes.get(&face).map(to_bounds)
    }
}

impl SpatialIndex for FaceRTree {
    fn insert(&mut self, mesh: &Mesh, face: FaceId) {
        self.remove(face);
        let envelope = face_envelope(mesh, face);
        self.envelopes.insert(face, envelope);
        self.tree.insert(FaceLeaf { face, envelope });
    }

    fn remove(&mut self, face: FaceId) {
        self.dirty.remove(&face);
        if let Some(envelope) = self.envelopes.remove(&face) {
            self.tree.remove(&FaceLeaf { face, envelope });
        }
    }

    fn mark_dirty(&mut self, face: FaceId) {
        if self.envelopes.contains_key(&face) {
            self.dirty.insert(face);
        }
    }

    fn optimize(&mut self, mesh: &Mesh) {
        let dirty: Vec<FaceId> = self.dirty.drain().collect();
        for face in dirty {
            if mesh.face(face).is_deleted() {
                self.remove(face);
            } else {
                self.insert(mesh, face);
            }
        }
    }

    fn query<F: Fn(&Bounds) -> bool>(&self, predicate: F, out: &mut Vec<FaceId>) {
        out.extend(
            self.tree
                .locate_with_selection_function(BoundsSelection(predicate))
                .map(|leaf| leaf.face),
        );
    }

    fn len(&self) -> usize {
        self.tree.size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quadrix_core::TriangleMesh;

    /// Two unit triangles, the second lifted to z = 5
    fn two_layers() -> Mesh {
        Mesh::from_triangle_mesh(&TriangleMesh::from_vertices_and_faces(
            vec![
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(1.0, 0.0, 0.0),
                Point3f::new(0.0, 1.0, 0.0),
                Point3f::new(0.0, 0.0, 5.0),
                Point3f::new(1.0, 0.0, 5.0),
                Point3f::new(0.0, 1.0, 5.0),
            ],
            vec![[0, 1, 2], [3, 4, 5]],
        ))
        .unwrap()
    }

    fn filled(mesh: &Mesh) -> FaceRTree {
        let mut index = FaceRTree::new();
        for f in mesh.face_ids() {
            index.insert(mesh, f);
        }
        index
    }

    #[test]
    fn test_insert_and_query() {
        let mesh = two_layers();
        let index = filled(&mesh);
        assert_eq!(index.len(), 2);

        let mut hits = Vec::new();
        let (a, b) = (Point3f::new(0.2, 0.2, -1.0), Point3f::new(0.2, 0.2, 1.0));
        index.query(|bounds| bounds.intersects_segment(&a, &b), &mut hits);
        assert_eq!(hits, vec![FaceId(0)]);

        hits.clear();
        let (a, b) = (Point3f::new(0.2, 0.2, -1.0), Point3f::new(0.2, 0.2, 6.0));
        index.query(|bounds| bounds.intersects_segment(&a, &b), &mut hits);
        hits.sort();
        assert_eq!(hits, vec![FaceId(0), FaceId(1)]);
    }

    #[test]
    fn test_leaf_is_sphere_box() {
        let mesh = two_layers();
        let index = filled(&mesh);
        let bounds = index.bounds(FaceId(0)).unwrap();
        // Right triangle: the hypotenuse is the diameter
        let r = 2f32.sqrt() * 0.5;
        assert!((bounds.max.x - (0.5 + r)).abs() < 1e-5);
        assert!((bounds.min.z + r).abs() < 1e-5);
    }

    #[test]
    fn test_remove() {
        let mesh = two_layers();
        let mut index = filled(&mesh);
        index.remove(FaceId(0));
        index.remove(FaceId(0));
        assert_eq!(index.len(), 1);
        assert!(!index.contains(FaceId(0)));

        let mut hits = Vec::new();
        index.query(|_| true, &mut hits);
        assert_eq!(hits, vec![FaceId(1)]);
    }

    #[test]
    fn test_refit_after_move() {
        let mut mesh = two_layers();
        let mut index = filled(&mesh);
        for v in 3..6 {
            mesh.vertex_mut(crate::mesh::VertexId(v)).position.z = 50.0;
        }
        index.mark_dirty(FaceId(1));

        let (a, b) = (Point3f::new(0.2, 0.2, 49.0), Point3f::new(0.2, 0.2, 51.0));
        let mut hits = Vec::new();
        index.query(|bounds| bounds.intersects_segment(&a, &b), &mut hits);
        assert!(hits.is_empty());

        index.optimize(&mesh);
        index.query(|bounds| bounds.intersects_segment(&a, &b), &mut hits);
        assert_eq!(hits, vec![FaceId(1)]);
        assert_eq!(index.len(), 2);
    }
}
