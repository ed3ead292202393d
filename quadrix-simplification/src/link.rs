//! Link condition for edge collapses
//!
//! Collapsing edge `(v0, v1)` keeps the surface a 2-manifold when the
//! intersection of the links of `v0` and `v1` equals the link of the edge.
//! Boundary vertices are closed off with a virtual vertex so the same test
//! covers open meshes.

use crate::mesh::{Mesh, VertexId};
use smallvec::SmallVec;
use std::collections::HashMap;

/// Link vertex; `None` stands for the virtual vertex closing a boundary
type LinkVertex = Option<VertexId>;

fn edge_key(a: LinkVertex, b: LinkVertex) -> (LinkVertex, LinkVertex) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Reusable scratch state for [`link_condition`]
#[derive(Debug, Default)]
pub struct LinkScratch {
    vertex_count: HashMap<LinkVertex, u32>,
    edge_count: HashMap<(LinkVertex, LinkVertex), u32>,
    boundary: SmallVec<[LinkVertex; 4]>,
    edge_link: SmallVec<[LinkVertex; 4]>,
}

impl LinkScratch {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Whether collapsing `v0` into `v1` preserves manifoldness
pub fn link_condition(mesh: &Mesh, v0: VertexId, v1: VertexId, scratch: &mut LinkScratch) -> bool {
    scratch.holds(mesh, v0, v1)
}

impl LinkScratch {
    fn holds(&mut self, mesh: &Mesh, v0: VertexId, v1: VertexId) -> bool {
        self.vertex_count.clear();
        self.edge_count.clear();

        // Every link vertex is counted twice per endpoint unless it lies on
        // the boundary
        for v in [v0, v1] {
            for c in mesh.fan(v) {
                let a = Some(mesh.corner_vertex(c, 1));
                let b = Some(mesh.corner_vertex(c, 2));
                *self.vertex_count.entry(a).or_insert(0) += 1;
                *self.vertex_count.entry(b).or_insert(0) += 1;
                *self.edge_count.entry(edge_key(a, b)).or_insert(0) += 1;
            }

            self.boundary.clear();
            self.boundary.extend(
                self.vertex_count
                    .iter()
                    .filter(|(_, &n)| n == 1)
                    .map(|(&v, _)| v),
            );
            if self.boundary.len() == 2 {
                let (b0, b1) = (self.boundary[0], self.boundary[1]);
                *self.vertex_count.entry(None).or_insert(0) += 2;
                *self.edge_count.entry((None, b0)).or_insert(0) += 1;
                *self.edge_count.entry((None, b1)).or_insert(0) += 1;
                *self.vertex_count.entry(b0).or_insert(0) += 1;
                *self.vertex_count.entry(b1).or_insert(0) += 1;
            }
        }

        self.edge_link.clear();
        for c in mesh.fan(v0) {
            let a = mesh.corner_vertex(c, 1);
            let b = mesh.corner_vertex(c, 2);
            if a == v1 {
                self.edge_link.push(Some(b));
            }
            if b == v1 {
                self.edge_link.push(Some(a));
            }
        }
        // A border edge has a single opposite vertex; the virtual one closes it
        if self.edge_link.len() == 1 {
            self.edge_link.push(None);
        }

        if self.edge_count.values().any(|&n| n == 2) {
            return false;
        }
        let shared = self.vertex_count.values().filter(|&&n| n == 4).count();
        shared == self.edge_link.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quadrix_core::{Point3f, TriangleMesh};

    fn build(vertices: Vec<Point3f>, faces: Vec<[usize; 3]>) -> Mesh {
        let mut m =
            Mesh::from_triangle_mesh(&TriangleMesh::from_vertices_and_faces(vertices, faces))
                .unwrap();
        m.build_vertex_face();
        m.build_face_border();
        m
    }

    fn tetrahedron() -> Mesh {
        build(
            vec![
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(1.0, 0.0, 0.0),
                Point3f::new(0.0, 1.0, 0.0),
                Point3f::new(0.0, 0.0, 1.0),
            ],
            vec![[0, 2, 1], [0, 1, 3], [0, 3, 2], [1, 2, 3]],
        )
    }

    fn octahedron() -> Mesh {
        build(
            vec![
                Point3f::new(0.0, 0.0, 1.0),
                Point3f::new(1.0, 0.0, 0.0),
                Point3f::new(0.0, 1.0, 0.0),
                Point3f::new(-1.0, 0.0, 0.0),
                Point3f::new(0.0, -1.0, 0.0),
                Point3f::new(0.0, 0.0, -1.0),
            ],
            vec![
                [0, 1, 2],
                [0, 2, 3],
                [0, 3, 4],
                [0, 4, 1],
                [5, 2, 1],
                [5, 3, 2],
                [5, 4, 3],
                [5, 1, 4],
            ],
        )
    }

    /// 3x3 vertex grid, 8 triangles
    fn grid() -> Mesh {
        let mut vertices = Vec::new();
        for y in 0..3 {
            for x in 0..3 {
                vertices.push(Point3f::new(x as f32, y as f32, 0.0));
            }
        }
        let mut faces = Vec::new();
        for y in 0..2 {
            for x in 0..2 {
                let i = y * 3 + x;
                faces.push([i, i + 1, i + 4]);
                faces.push([i, i + 4, i + 3]);
            }
        }
        build(vertices, faces)
    }

    #[test]
    fn test_tetrahedron_rejects() {
        let m = tetrahedron();
        let mut s = LinkScratch::new();
        assert!(!link_condition(&m, VertexId(0), VertexId(1), &mut s));
        assert!(!link_condition(&m, VertexId(2), VertexId(3), &mut s));
    }

    #[test]
    fn test_octahedron_accepts() {
        let m = octahedron();
        let mut s = LinkScratch::new();
        assert!(link_condition(&m, VertexId(0), VertexId(1), &mut s));
        assert!(link_condition(&m, VertexId(1), VertexId(0), &mut s));
    }

    #[test]
    fn test_grid_edges() {
        let m = grid();
        let mut s = LinkScratch::new();
        // Border vertex into the interior centre
        assert!(link_condition(&m, VertexId(1), VertexId(4), &mut s));
        // Along the border, toward the corner
        assert!(link_condition(&m, VertexId(0), VertexId(1), &mut s));
        assert!(link_condition(&m, VertexId(1), VertexId(0), &mut s));
        assert!(link_condition(&m, VertexId(3), VertexId(4), &mut s));
    }

    #[test]
    fn test_grid_rejects_pinching() {
        let m = grid();
        let mut s = LinkScratch::new();
        // Corner 2 sits on a single triangle; folding it away would leave
        // the border edge hanging
        assert!(!link_condition(&m, VertexId(1), VertexId(2), &mut s));
        // Vertices that share two neighbours without sharing an edge
        assert!(!link_condition(&m, VertexId(3), VertexId(1), &mut s));
    }
}
