//! Arena mesh used during decimation
//!
//! Vertices and faces live in contiguous arrays addressed by [`VertexId`] and
//! [`FaceId`]. Nothing is ever physically removed while a run is in progress;
//! a collapse only sets the deleted flag, so ids stay stable and the fan
//! links (see [`crate::adjacency`]) are plain index reassignments.

use crate::attributes::{AttributeLayout, AttributeMask, AttributeVector, CornerAttributes};
use crate::geometry::face_normal;
use bitflags::bitflags;
use itertools::Itertools;
use quadrix_core::{
    BoneWeight, Error, Point3f, Result, TriangleMesh, Vector3f, Vector4f, UV_CHANNELS,
};
use std::collections::HashMap;

/// Stable handle of a vertex inside a [`Mesh`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexId(pub(crate) usize);

impl VertexId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Stable handle of a face inside a [`Mesh`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FaceId(pub(crate) usize);

impl FaceId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// One corner of one face
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Corner {
    pub face: FaceId,
    pub corner: usize,
}

impl Corner {
    pub fn new(face: FaceId, corner: usize) -> Self {
        Self { face, corner }
    }
}

bitflags! {
    /// Per-vertex state bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct VertexFlags: u8 {
        const DELETED = 1 << 0;
        /// Excluded from collapses
        const LOCKED = 1 << 1;
        /// Scratch bit for fan traversals
        const VISITED = 1 << 2;
        const BOUNDARY = 1 << 3;
    }
}

bitflags! {
    /// Per-face state bits; `BORDER0..BORDER2` tag the three edges
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FaceFlags: u8 {
        const DELETED = 1 << 0;
        const LOCKED = 1 << 1;
        const BORDER0 = 1 << 3;
        const BORDER1 = 1 << 4;
        const BORDER2 = 1 << 5;
    }
}

impl FaceFlags {
    /// Border bit of edge `i`
    pub fn border(edge: usize) -> Self {
        Self::from_bits_truncate(Self::BORDER0.bits() << (edge % 3))
    }
}

/// A mesh vertex
#[derive(Debug, Clone)]
pub struct Vertex {
    pub position: Point3f,
    /// First corner of the incident-face fan
    pub(crate) fan: Option<Corner>,
    /// Value of the global mark when this vertex was last modified
    pub(crate) mark: u64,
    pub(crate) flags: VertexFlags,
}

impl Vertex {
    fn new(position: Point3f) -> Self {
        Self {
            position,
            fan: None,
            mark: 0,
            flags: VertexFlags::empty(),
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.flags.contains(VertexFlags::DELETED)
    }

    /// Writable vertices may be moved or removed by a collapse
    pub fn is_writable(&self) -> bool {
        !self.flags.contains(VertexFlags::LOCKED)
    }

    pub fn is_boundary(&self) -> bool {
        self.flags.contains(VertexFlags::BOUNDARY)
    }

    pub(crate) fn is_visited(&self) -> bool {
        self.flags.contains(VertexFlags::VISITED)
    }

    pub(crate) fn set_visited(&mut self, on: bool) {
        self.flags.set(VertexFlags::VISITED, on);
    }

    pub fn mark(&self) -> u64 {
        self.mark
    }
}

/// A mesh triangle with per-corner attributes
#[derive(Debug, Clone)]
pub struct Face {
    pub vertices: [VertexId; 3],
    pub attributes: [CornerAttributes; 3],
    /// Plane normal captured at load time
    pub normal: Vector3f,
    pub submesh: usize,
    /// Next corner in the fan of `vertices[i]`
    pub(crate) fan_next: [Option<Corner>; 3],
    pub(crate) flags: FaceFlags,
}

impl Face {
    pub fn is_deleted(&self) -> bool {
        self.flags.contains(FaceFlags::DELETED)
    }

    pub fn is_writable(&self) -> bool {
        !self.flags.contains(FaceFlags::LOCKED)
    }

    /// Edge `i` spans `vertices[i]` and `vertices[(i + 1) % 3]`
    pub fn is_border(&self, edge: usize) -> bool {
        self.flags.contains(FaceFlags::border(edge))
    }

    pub(crate) fn set_border(&mut self, edge: usize) {
        self.flags.insert(FaceFlags::border(edge));
    }

    /// Vertex at `corner`, wrapping around
    #[inline]
    pub fn vertex(&self, corner: usize) -> VertexId {
        self.vertices[corner % 3]
    }

    /// Corner index of `v`, if this face touches it
    pub fn corner_of(&self, v: VertexId) -> Option<usize> {
        self.vertices.iter().position(|&x| x == v)
    }

    pub fn contains(&self, v: VertexId) -> bool {
        self.vertices.contains(&v)
    }
}

/// Position key used for welding; `-0.0` and `0.0` weld together.
fn weld_key(p: &Point3f) -> [u32; 3] {
    let bits = |v: f32| if v == 0.0 { 0u32 } else { v.to_bits() };
    [bits(p.x), bits(p.y), bits(p.z)]
}

/// Mutable decimation mesh
#[derive(Debug, Clone)]
pub struct Mesh {
    pub(crate) vertices: Vec<Vertex>,
    pub(crate) faces: Vec<Face>,
    live_vertices: usize,
    live_faces: usize,
    present: AttributeMask,
    uv_sizes: [usize; UV_CHANNELS],
    submesh_count: usize,
    has_submeshes: bool,
}

impl Mesh {
    /// Build the decimation mesh from an exchange mesh.
    ///
    /// Vertices with bit-identical positions are welded; attributes are kept
    /// per face corner so seams survive the weld. Faces that collapse onto
    /// fewer than three distinct vertices are dropped.
    pub fn from_triangle_mesh(mesh: &TriangleMesh) -> Result<Self> {
        if mesh.is_empty() {
            return Err(Error::InvalidData("Mesh is empty".to_string()));
        }
        mesh.validate()?;

        let mut present = AttributeMask::empty();
        if mesh.normals.is_some() {
            present |= AttributeMask::NORMAL;
        }
        if mesh.tangents.is_some() {
            present |= AttributeMask::TANGENT;
        }
        if mesh.colors.is_some() {
            present |= AttributeMask::COLOR;
        }
        if mesh.bone_weights.is_some() {
            present |= AttributeMask::BONE_WEIGHT;
        }
        let mut uv_sizes = [0; UV_CHANNELS];
        for (channel, size) in uv_sizes.iter_mut().enumerate() {
            *size = mesh.uv_components(channel);
            if *size > 0 {
                present |= AttributeMask::uv(channel);
            }
        }

        // Canonical source index per weld class
        let mut first_of: HashMap<[u32; 3], usize> = HashMap::with_capacity(mesh.vertices.len());
        let canonical: Vec<usize> = mesh
            .vertices
            .iter()
            .enumerate()
            .map(|(i, p)| *first_of.entry(weld_key(p)).or_insert(i))
            .collect();

        let is_valid = |tri: &[usize; 3]| {
            let [a, b, c] = tri.map(|i| canonical[i]);
            a != b && b != c && c != a
        };
        let skipped = mesh.faces.iter().filter(|tri| !is_valid(*tri)).count();

        // Vertices are numbered in source order, keeping only those used by
        // a surviving face
        let mut referenced = vec![false; mesh.vertices.len()];
        for tri in mesh.faces.iter().filter(|tri| is_valid(*tri)) {
            for &i in tri {
                referenced[canonical[i]] = true;
            }
        }
        let mut id_of = vec![VertexId(usize::MAX); mesh.vertices.len()];
        let mut vertices: Vec<Vertex> = Vec::with_capacity(mesh.vertices.len());
        for (i, p) in mesh.vertices.iter().enumerate() {
            if referenced[i] {
                id_of[i] = VertexId(vertices.len());
                vertices.push(Vertex::new(*p));
            }
        }

        let mut faces: Vec<Face> = Vec::with_capacity(mesh.faces.len() - skipped);
        for (fi, tri) in mesh.faces.iter().enumerate() {
            if !is_valid(tri) {
                continue;
            }
            let ids = tri.map(|i| id_of[canonical[i]]);

            let mut attributes = [CornerAttributes::default(); 3];
            for (k, &src) in tri.iter().enumerate() {
                let a = &mut attributes[k];
                if let Some(n) = &mesh.normals {
                    a.normal = n[src];
                }
                if let Some(t) = &mesh.tangents {
                    a.tangent = t[src];
                }
                if let Some(c) = &mesh.colors {
                    a.color = c[src];
                }
                if let Some(b) = &mesh.bone_weights {
                    a.bone_weight = b[src];
                }
                for (channel, uvs) in mesh.uvs.iter().enumerate() {
                    if let Some(uvs) = uvs {
                        let mut uv = uvs[src];
                        for i in uv_sizes[channel]..4 {
                            uv[i] = 0.0;
                        }
                        a.uvs[channel] = uv;
                    }
                }
            }

            let normal = face_normal(
                &vertices[ids[0].0].position,
                &vertices[ids[1].0].position,
                &vertices[ids[2].0].position,
            );
            faces.push(Face {
                vertices: ids,
                attributes,
                normal,
                submesh: mesh.face_submeshes.as_ref().map_or(0, |s| s[fi]),
                fan_next: [None; 3],
                flags: FaceFlags::empty(),
            });
        }

        if skipped > 0 {
            log::warn!("Skipped {} degenerate faces with repeated vertices", skipped);
        }
        if faces.is_empty() {
            return Err(Error::InvalidData("Mesh has no valid triangles".to_string()));
        }

        Ok(Self {
            live_vertices: vertices.len(),
            live_faces: faces.len(),
            vertices,
            faces,
            present,
            uv_sizes,
            submesh_count: mesh.submesh_count(),
            has_submeshes: mesh.face_submeshes.is_some(),
        })
    }

    /// Number of live vertices
    pub fn vertex_count(&self) -> usize {
        self.live_vertices
    }

    /// Number of live faces
    pub fn face_count(&self) -> usize {
        self.live_faces
    }

    /// Size of the vertex arena, including deleted slots
    pub fn vertex_capacity(&self) -> usize {
        self.vertices.len()
    }

    /// Size of the face arena, including deleted slots
    pub fn face_capacity(&self) -> usize {
        self.faces.len()
    }

    pub fn vertex(&self, v: VertexId) -> &Vertex {
        &self.vertices[v.0]
    }

    pub(crate) fn vertex_mut(&mut self, v: VertexId) -> &mut Vertex {
        &mut self.vertices[v.0]
    }

    pub fn face(&self, f: FaceId) -> &Face {
        &self.faces[f.0]
    }

    pub(crate) fn face_mut(&mut self, f: FaceId) -> &mut Face {
        &mut self.faces[f.0]
    }

    pub fn position(&self, v: VertexId) -> Point3f {
        self.vertices[v.0].position
    }

    pub fn face_positions(&self, f: FaceId) -> [Point3f; 3] {
        let face = &self.faces[f.0];
        [
            self.position(face.vertices[0]),
            self.position(face.vertices[1]),
            self.position(face.vertices[2]),
        ]
    }

    /// Ids of all live vertices
    pub fn vertex_ids(&self) -> impl Iterator<Item = VertexId> + '_ {
        self.vertices
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.is_deleted())
            .map(|(i, _)| VertexId(i))
    }

    /// Ids of all live faces
    pub fn face_ids(&self) -> impl Iterator<Item = FaceId> + '_ {
        self.faces
            .iter()
            .enumerate()
            .filter(|(_, f)| !f.is_deleted())
            .map(|(i, _)| FaceId(i))
    }

    /// Attribute kinds carried by the source mesh
    pub fn present_attributes(&self) -> AttributeMask {
        self.present
    }

    /// Used components per UV channel (0 when absent)
    pub fn uv_sizes(&self) -> [usize; UV_CHANNELS] {
        self.uv_sizes
    }

    pub(crate) fn delete_face(&mut self, f: FaceId) {
        let face = &mut self.faces[f.0];
        if !face.is_deleted() {
            face.flags.insert(FaceFlags::DELETED);
            self.live_faces -= 1;
        }
    }

    pub(crate) fn delete_vertex(&mut self, v: VertexId) {
        let vertex = &mut self.vertices[v.0];
        if !vertex.is_deleted() {
            vertex.flags.insert(VertexFlags::DELETED);
            vertex.fan = None;
            self.live_vertices -= 1;
        }
    }

    /// Lock both endpoints of every border edge against collapse.
    ///
    /// Border flags must already be built.
    pub(crate) fn lock_border_vertices(&mut self) -> usize {
        let mut locked = 0;
        for fi in 0..self.faces.len() {
            let face = &self.faces[fi];
            if face.is_deleted() || !face.is_writable() {
                continue;
            }
            let verts = face.vertices;
            let borders = [face.is_border(0), face.is_border(1), face.is_border(2)];
            for j in 0..3 {
                if !borders[j] {
                    continue;
                }
                for v in [verts[j], verts[(j + 1) % 3]] {
                    let vertex = &mut self.vertices[v.0];
                    if vertex.is_writable() {
                        vertex.flags.insert(VertexFlags::LOCKED);
                        locked += 1;
                    }
                }
            }
        }
        locked
    }

    /// Replace every corner normal with the area-agnostic average of the
    /// current face normals around its vertex.
    pub fn recalculate_smooth_normals(&mut self) {
        for vi in 0..self.vertices.len() {
            let v = VertexId(vi);
            if self.vertices[vi].is_deleted() {
                continue;
            }
            let fan = self.collect_fan(v);
            let mut sum = Vector3f::zeros();
            for c in &fan {
                let [p0, p1, p2] = self.face_positions(c.face);
                sum += face_normal(&p0, &p1, &p2);
            }
            let normal = sum.try_normalize(f32::EPSILON).unwrap_or_else(Vector3f::zeros);
            for c in &fan {
                self.faces[c.face.0].attributes[c.corner].normal = normal;
            }
        }
        self.present |= AttributeMask::NORMAL;
    }

    /// Export to the exchange representation.
    ///
    /// Output vertices are deduplicated by position plus every present
    /// attribute, in order of first use; faces are grouped by submesh.
    pub fn to_triangle_mesh(&self) -> TriangleMesh {
        let layout = AttributeLayout::new(self.present, self.uv_sizes);
        let mut index: HashMap<([u32; 3], AttributeVector), usize> = HashMap::new();
        let mut out = TriangleMesh::new();
        let mut normals = Vec::new();
        let mut tangents = Vec::new();
        let mut colors = Vec::new();
        let mut bones: Vec<BoneWeight> = Vec::new();
        let mut uvs: Vec<Vec<Vector4f>> = vec![Vec::new(); UV_CHANNELS];
        let mut submeshes = Vec::new();

        let live = self
            .faces
            .iter()
            .filter(|f| !f.is_deleted())
            .sorted_by_key(|f| f.submesh);

        for face in live {
            let mut tri = [0usize; 3];
            for (k, slot) in tri.iter_mut().enumerate() {
                let p = self.position(face.vertices[k]);
                let attrs = &face.attributes[k];
                let key = (weld_key(&p), layout.pack(attrs));
                *slot = *index.entry(key).or_insert_with(|| {
                    out.vertices.push(p);
                    normals.push(attrs.normal);
                    tangents.push(attrs.tangent);
                    colors.push(attrs.color);
                    bones.push(attrs.bone_weight);
                    for (channel, list) in uvs.iter_mut().enumerate() {
                        list.push(attrs.uvs[channel]);
                    }
                    out.vertices.len() - 1
                });
            }
            out.faces.push(tri);
            submeshes.push(face.submesh);
        }

        if self.present.has(crate::AttributeKind::Normal) {
            out.normals = Some(normals);
        }
        if self.present.has(crate::AttributeKind::Tangent) {
            out.tangents = Some(tangents);
        }
        if self.present.has(crate::AttributeKind::Color) {
            out.colors = Some(colors);
        }
        if self.present.has(crate::AttributeKind::BoneWeight) {
            out.bone_weights = Some(bones);
        }
        for (channel, list) in uvs.into_iter().enumerate() {
            if self.uv_sizes[channel] > 0 {
                out.uvs[channel] = Some(list);
            }
        }
        if self.has_submeshes {
            out.face_submeshes = Some(submeshes);
        }
        out
    }

    /// Number of submeshes in the source mesh
    pub fn submesh_count(&self) -> usize {
        self.submesh_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::AttributeKind;

    fn make_quad() -> TriangleMesh {
        TriangleMesh::from_vertices_and_faces(
            vec![
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(1.0, 0.0, 0.0),
                Point3f::new(1.0, 1.0, 0.0),
                Point3f::new(0.0, 1.0, 0.0),
            ],
            vec![[0, 1, 2], [0, 2, 3]],
        )
    }

    #[test]
    fn test_empty_mesh_rejected() {
        assert!(Mesh::from_triangle_mesh(&TriangleMesh::new()).is_err());
    }

    #[test]
    fn test_welds_duplicate_positions() {
        // Two triangles that do not share indices but share positions
        let mesh = TriangleMesh::from_vertices_and_faces(
            vec![
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(1.0, 0.0, 0.0),
                Point3f::new(1.0, 1.0, 0.0),
                Point3f::new(-0.0, 0.0, 0.0),
                Point3f::new(1.0, 1.0, 0.0),
                Point3f::new(0.0, 1.0, 0.0),
            ],
            vec![[0, 1, 2], [3, 4, 5]],
        );
        let m = Mesh::from_triangle_mesh(&mesh).unwrap();
        assert_eq!(m.vertex_count(), 4);
        assert_eq!(m.face_count(), 2);
    }

    #[test]
    fn test_skips_degenerate_faces() {
        let mut mesh = make_quad();
        mesh.faces.push([1, 1, 2]);
        let m = Mesh::from_triangle_mesh(&mesh).unwrap();
        assert_eq!(m.face_count(), 2);
    }

    #[test]
    fn test_present_attributes() {
        let mut mesh = make_quad();
        mesh.set_normals(vec![Vector3f::z(); 4]);
        mesh.set_uvs2(0, &[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]])
            .unwrap();
        let m = Mesh::from_triangle_mesh(&mesh).unwrap();
        assert!(m.present_attributes().has(AttributeKind::Normal));
        assert!(m.present_attributes().has(AttributeKind::Uv(0)));
        assert!(!m.present_attributes().has(AttributeKind::Color));
        assert_eq!(m.uv_sizes()[0], 2);
        assert_eq!(m.face(FaceId(0)).attributes[1].uvs[0].x, 1.0);
    }

    #[test]
    fn test_face_normal_cached() {
        let m = Mesh::from_triangle_mesh(&make_quad()).unwrap();
        assert_eq!(m.face(FaceId(0)).normal, Vector3f::new(0.0, 0.0, 1.0));
    }

    #[test]
    fn test_export_round_trip() {
        let mut mesh = make_quad();
        mesh.set_uvs2(0, &[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]])
            .unwrap();
        let out = Mesh::from_triangle_mesh(&mesh).unwrap().to_triangle_mesh();
        assert_eq!(out.vertices, mesh.vertices);
        assert_eq!(out.faces, mesh.faces);
        assert_eq!(out.uvs[0], mesh.uvs[0]);
        assert!(out.normals.is_none());
        assert!(out.face_submeshes.is_none());
    }

    #[test]
    fn test_export_splits_seams() {
        // Same position, different UVs on each side of the diagonal
        let mut mesh = TriangleMesh::from_vertices_and_faces(
            vec![
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(1.0, 0.0, 0.0),
                Point3f::new(1.0, 1.0, 0.0),
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(1.0, 1.0, 0.0),
                Point3f::new(0.0, 1.0, 0.0),
            ],
            vec![[0, 1, 2], [3, 4, 5]],
        );
        mesh.set_uvs2(
            0,
            &[[0.0, 0.0], [0.5, 0.0], [0.5, 0.5], [0.6, 0.0], [0.9, 0.9], [0.6, 0.9]],
        )
        .unwrap();
        let m = Mesh::from_triangle_mesh(&mesh).unwrap();
        assert_eq!(m.vertex_count(), 4);
        let out = m.to_triangle_mesh();
        assert_eq!(out.vertex_count(), 6);
    }

    #[test]
    fn test_export_groups_submeshes() {
        let mut mesh = make_quad();
        mesh.faces.push([1, 3, 2]);
        mesh.set_face_submeshes(vec![1, 0, 1]);
        let out = Mesh::from_triangle_mesh(&mesh).unwrap().to_triangle_mesh();
        assert_eq!(out.face_submeshes, Some(vec![0, 1, 1]));
        assert_eq!(out.submesh_faces(0).len(), 1);
    }

    #[test]
    fn test_state_flags() {
        let mut m = Mesh::from_triangle_mesh(&make_quad()).unwrap();
        let v = m.vertex_mut(VertexId(0));
        assert!(v.is_writable());
        v.set_visited(true);
        assert!(v.is_visited());
        v.set_visited(false);
        assert!(!v.is_visited());
        assert_eq!(v.flags, VertexFlags::empty());

        m.face_mut(FaceId(0)).set_border(2);
        assert!(m.face(FaceId(0)).is_border(2));
        assert!(!m.face(FaceId(0)).is_border(0));
        assert_eq!(FaceFlags::border(1), FaceFlags::BORDER1);

        m.delete_face(FaceId(1));
        m.delete_face(FaceId(1));
        assert!(m.face(FaceId(1)).is_deleted());
        assert_eq!(m.face_count(), 1);
    }

    #[test]
    fn test_smooth_normals() {
        let mut m = Mesh::from_triangle_mesh(&make_quad()).unwrap();
        m.build_vertex_face();
        m.recalculate_smooth_normals();
        assert!(m.present_attributes().has(AttributeKind::Normal));
        for f in m.face_ids() {
            for a in &m.face(f).attributes {
                assert!((a.normal.z - 1.0).abs() < 1e-6);
            }
        }
    }
}
