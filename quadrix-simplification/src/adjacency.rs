//! Vertex-to-face fan adjacency
//!
//! Every vertex stores the first corner of its fan; every face stores, per
//! corner, the next corner in the fan of the vertex at that corner. The fan
//! of a vertex is therefore a singly linked list threaded through the faces
//! that reference it.

use crate::mesh::{Corner, FaceId, Mesh, VertexFlags, VertexId};
use quadrix_core::{Error, Result};
use smallvec::SmallVec;

/// Scratch buffer sized for typical vertex valences
pub type FanBuf = SmallVec<[Corner; 16]>;

/// Iterator over the corners incident to one vertex
#[derive(Clone)]
pub struct FanIter<'a> {
    mesh: &'a Mesh,
    start: Option<Corner>,
    next: Option<Corner>,
}

impl<'a> FanIter<'a> {
    /// Restart from the first corner of the fan
    pub fn reset(&mut self) {
        self.next = self.start;
    }
}

impl<'a> Iterator for FanIter<'a> {
    type Item = Corner;

    fn next(&mut self) -> Option<Corner> {
        let current = self.next?;
        self.next = self.mesh.face(current.face).fan_next[current.corner];
        Some(current)
    }
}

impl Mesh {
    /// Iterate the fan of `v`
    pub fn fan(&self, v: VertexId) -> FanIter<'_> {
        let start = self.vertex(v).fan;
        FanIter {
            mesh: self,
            start,
            next: start,
        }
    }

    /// Snapshot the fan of `v`, for loops that mutate the mesh
    pub fn collect_fan(&self, v: VertexId) -> FanBuf {
        self.fan(v).collect()
    }

    /// Vertex `offset` corners after `c` in its face
    #[inline]
    pub fn corner_vertex(&self, c: Corner, offset: usize) -> VertexId {
        self.face(c.face).vertex(c.corner + offset)
    }

    /// Distinct vertices sharing an edge with `v`
    pub fn neighbors(&self, v: VertexId) -> SmallVec<[VertexId; 16]> {
        let mut out: SmallVec<[VertexId; 16]> = SmallVec::new();
        for c in self.fan(v) {
            for n in [self.corner_vertex(c, 1), self.corner_vertex(c, 2)] {
                if !out.contains(&n) {
                    out.push(n);
                }
            }
        }
        out
    }

    /// Faces incident to both `a` and `b`
    pub fn edge_faces(&self, a: VertexId, b: VertexId) -> SmallVec<[FaceId; 2]> {
        self.fan(a)
            .filter(|c| self.face(c.face).contains(b))
            .map(|c| c.face)
            .collect()
    }

    /// Clear the visited flag on `v` and everything in its one-ring
    pub(crate) fn clear_visited_ring(&mut self, v: VertexId) {
        let fan = self.collect_fan(v);
        self.vertex_mut(v).set_visited(false);
        for c in fan {
            let v1 = self.corner_vertex(c, 1);
            let v2 = self.corner_vertex(c, 2);
            self.vertex_mut(v1).set_visited(false);
            self.vertex_mut(v2).set_visited(false);
        }
    }

    /// Thread every live face corner into the fan of its vertex.
    ///
    /// Each corner is pushed to the front, so a fan lists its faces in
    /// reverse order of face id.
    pub(crate) fn build_vertex_face(&mut self) {
        for v in self.vertices.iter_mut() {
            v.fan = None;
        }
        for fi in 0..self.faces.len() {
            if self.faces[fi].is_deleted() {
                continue;
            }
            for j in 0..3 {
                let v = self.faces[fi].vertices[j];
                self.faces[fi].fan_next[j] = self.vertices[v.0].fan;
                self.vertices[v.0].fan = Some(Corner::new(FaceId(fi), j));
            }
        }
    }

    /// Flag every edge used by exactly one face as a border edge, and mark
    /// both of its endpoints as boundary vertices.
    pub(crate) fn build_face_border(&mut self) {
        for vi in 0..self.vertices.len() {
            let v = VertexId(vi);
            if self.vertex(v).is_deleted() {
                continue;
            }
            self.clear_visited_ring(v);
            let fan = self.collect_fan(v);

            // An edge seen an odd number of times from v has a single face
            for c in &fan {
                for n in [self.corner_vertex(*c, 1), self.corner_vertex(*c, 2)] {
                    let vertex = self.vertex_mut(n);
                    let toggled = !vertex.is_visited();
                    vertex.set_visited(toggled);
                }
            }

            for c in &fan {
                let v1 = self.corner_vertex(*c, 1);
                let v2 = self.corner_vertex(*c, 2);
                if v < v1 && self.vertex(v1).is_visited() {
                    self.face_mut(c.face).set_border(c.corner);
                    self.mark_boundary(v, v1);
                }
                if v < v2 && self.vertex(v2).is_visited() {
                    self.face_mut(c.face).set_border((c.corner + 2) % 3);
                    self.mark_boundary(v, v2);
                }
            }
        }
    }

    fn mark_boundary(&mut self, a: VertexId, b: VertexId) {
        self.vertex_mut(a).flags.insert(VertexFlags::BOUNDARY);
        self.vertex_mut(b).flags.insert(VertexFlags::BOUNDARY);
    }

    /// Unlink corner `c` from the fan of the vertex it references
    pub(crate) fn detach(&mut self, c: Corner) -> Result<()> {
        let v = self.face(c.face).vertices[c.corner];
        let after = self.face(c.face).fan_next[c.corner];

        if self.vertex(v).fan == Some(c) {
            self.vertex_mut(v).fan = after;
            return Ok(());
        }

        let mut cursor = self.vertex(v).fan;
        while let Some(p) = cursor {
            let next = self.face(p.face).fan_next[p.corner];
            if next == Some(c) {
                self.face_mut(p.face).fan_next[p.corner] = after;
                return Ok(());
            }
            cursor = next;
        }

        Err(Error::Algorithm(format!(
            "Corner {} of face {} is not in the fan of vertex {}",
            c.corner,
            c.face.index(),
            v.index()
        )))
    }

    /// Point corner `c` at `v` and push it to the front of the fan of `v`
    pub(crate) fn attach(&mut self, c: Corner, v: VertexId) {
        let head = self.vertex(v).fan;
        let face = self.face_mut(c.face);
        face.vertices[c.corner] = v;
        face.fan_next[c.corner] = head;
        self.vertex_mut(v).fan = Some(c);
    }
}
