//! Per-vertex quadric storage
//!
//! Each vertex owns one geometric 3x3 quadric plus a short list of
//! full-dimension quadrics keyed by the distinct attribute vectors seen on
//! its corners. A vertex on a UV seam therefore carries one quadric per side
//! of the seam.

use crate::attributes::{AttributeLayout, AttributeVector};
use crate::mesh::{Mesh, VertexId};
use crate::quadric::{face_quadrics, FaceQuadricInput, Quadric};
use smallvec::SmallVec;

/// Attribute-keyed quadrics of one vertex
pub type KeyedQuadrics = SmallVec<[(AttributeVector, Quadric); 2]>;

#[derive(Debug, Clone)]
pub struct QuadricStore {
    geometric: Vec<Quadric>,
    keyed: Vec<KeyedQuadrics>,
    attribute_dim: usize,
}

impl QuadricStore {
    pub fn new(vertex_count: usize, attribute_dim: usize) -> Self {
        Self {
            geometric: vec![Quadric::zero(3); vertex_count],
            keyed: vec![KeyedQuadrics::new(); vertex_count],
            attribute_dim,
        }
    }

    /// Accumulate the quadrics of every live face.
    ///
    /// Border flags and vertex locks must already be set. Locked vertices
    /// only receive the geometric part.
    pub fn from_mesh(
        mesh: &Mesh,
        layout: &AttributeLayout,
        quality_quadric: bool,
        boundary_weight: f64,
    ) -> Self {
        let mut store = Self::new(mesh.vertex_capacity(), layout.dim());
        for f in mesh.face_ids() {
            let face = mesh.face(f);
            let input = FaceQuadricInput {
                positions: mesh.face_positions(f),
                attributes: face.attributes.map(|a| layout.pack(&a)),
                normal: face.normal,
                border: [face.is_border(0), face.is_border(1), face.is_border(2)],
            };
            let quadrics = face_quadrics(&input, quality_quadric, boundary_weight);

            if let Some(geo) = &quadrics.geometric {
                for &v in &face.vertices {
                    *store.geometric_mut(v) += geo;
                }
            }
            for (&v, key) in face.vertices.iter().zip(&input.attributes) {
                if !mesh.vertex(v).is_writable() {
                    continue;
                }
                if !store.contains(v, key) {
                    store.alloc(v, *key);
                }
                store.sum_all(v, key, &quadrics.full);
            }
        }
        store
    }

    /// Dimension of the keyed quadrics
    pub fn quadric_dim(&self) -> usize {
        3 + self.attribute_dim
    }

    pub fn geometric(&self, v: VertexId) -> &Quadric {
        &self.geometric[v.index()]
    }

    pub fn geometric_mut(&mut self, v: VertexId) -> &mut Quadric {
        &mut self.geometric[v.index()]
    }

    pub fn set_geometric(&mut self, v: VertexId, q: Quadric) {
        self.geometric[v.index()] = q;
    }

    pub fn keyed(&self, v: VertexId) -> &[(AttributeVector, Quadric)] {
        &self.keyed[v.index()]
    }

    pub fn set_keyed(&mut self, v: VertexId, list: KeyedQuadrics) {
        self.keyed[v.index()] = list;
    }

    pub fn contains(&self, v: VertexId, key: &AttributeVector) -> bool {
        self.keyed[v.index()].iter().any(|(k, _)| k == key)
    }

    /// Quadric stored under `key`, falling back to the first entry of the
    /// vertex; `None` when the vertex has no keyed quadrics at all.
    pub fn get(&self, v: VertexId, key: &AttributeVector) -> Option<&Quadric> {
        let list = &self.keyed[v.index()];
        list.iter()
            .find(|(k, _)| k == key)
            .or_else(|| list.first())
            .map(|(_, q)| q)
    }

    /// Owned copy of [`get`](Self::get), zero when nothing is stored
    pub fn get_or_zero(&self, v: VertexId, key: &AttributeVector) -> Quadric {
        self.get(v, key)
            .cloned()
            .unwrap_or_else(|| Quadric::zero(self.quadric_dim()))
    }

    /// Start a new keyed quadric seeded with the current geometric quadric
    /// of `v` and an attribute pull toward `key`.
    pub fn alloc(&mut self, v: VertexId, key: AttributeVector) {
        let mut q = Quadric::zero(self.quadric_dim());
        q.sum3(&self.geometric[v.index()], key.as_slice());
        self.keyed[v.index()].push((key, q));
    }

    /// Add a face quadric to the entry keyed `key`; every other entry of the
    /// vertex instead receives the geometric quadric with its own pull.
    pub fn sum_all(&mut self, v: VertexId, key: &AttributeVector, q: &Quadric) {
        let geo = &self.geometric[v.index()];
        for (k, entry) in self.keyed[v.index()].iter_mut() {
            if k == key {
                *entry += q;
            } else {
                entry.sum3(geo, k.as_slice());
            }
        }
    }
}
