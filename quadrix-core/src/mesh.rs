//! Mesh data structures and functionality

use crate::error::{Error, Result};
use crate::point::*;
use serde::{Deserialize, Serialize};

/// Maximum number of texture coordinate channels carried by a mesh
pub const UV_CHANNELS: usize = 8;

/// A triangle mesh with optional per-vertex attribute streams.
///
/// Every attribute stream, when present, has exactly one entry per vertex.
/// Texture coordinates are stored as 4-component vectors; unused trailing
/// components are expected to be zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriangleMesh {
    pub vertices: Vec<Point3f>,
    pub faces: Vec<[usize; 3]>,
    pub normals: Option<Vec<Vector3f>>,
    pub tangents: Option<Vec<Vector4f>>,
    pub colors: Option<Vec<Vector4f>>,
    pub uvs: [Option<Vec<Vector4f>>; UV_CHANNELS],
    pub bone_weights: Option<Vec<BoneWeight>>,
    /// Submesh id per face
    pub face_submeshes: Option<Vec<usize>>,
}

impl TriangleMesh {
    /// Create a new empty mesh
    pub fn new() -> Self {
        Self {
            vertices: Vec::new(),
            faces: Vec::new(),
            normals: None,
            tangents: None,
            colors: None,
            uvs: Default::default(),
            bone_weights: None,
            face_submeshes: None,
        }
    }

    /// Create a mesh from vertices and faces
    pub fn from_vertices_and_faces(vertices: Vec<Point3f>, faces: Vec<[usize; 3]>) -> Self {
        Self {
            vertices,
            faces,
            ..Self::new()
        }
    }

    /// Get the number of vertices
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Get the number of faces
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Check if the mesh is empty
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.faces.is_empty()
    }

    /// Add a vertex to the mesh
    pub fn add_vertex(&mut self, vertex: Point3f) -> usize {
        let index = self.vertices.len();
        self.vertices.push(vertex);
        index
    }

    /// Add a face to the mesh
    pub fn add_face(&mut self, face: [usize; 3]) {
        self.faces.push(face);
    }

    /// Calculate face normals
    pub fn calculate_face_normals(&self) -> Vec<Vector3f> {
        self.faces
            .iter()
            .map(|face| {
                let v0 = self.vertices[face[0]];
                let v1 = self.vertices[face[1]];
                let v2 = self.vertices[face[2]];

                let edge1 = v1 - v0;
                let edge2 = v2 - v0;

                edge1.cross(&edge2).normalize()
            })
            .collect()
    }

    /// Set vertex normals
    pub fn set_normals(&mut self, normals: Vec<Vector3f>) {
        if normals.len() == self.vertices.len() {
            self.normals = Some(normals);
        }
    }

    /// Set vertex tangents (xyz direction, w handedness)
    pub fn set_tangents(&mut self, tangents: Vec<Vector4f>) {
        if tangents.len() == self.vertices.len() {
            self.tangents = Some(tangents);
        }
    }

    /// Set RGBA vertex colors
    pub fn set_colors(&mut self, colors: Vec<Vector4f>) {
        if colors.len() == self.vertices.len() {
            self.colors = Some(colors);
        }
    }

    /// Set a texture coordinate channel
    pub fn set_uvs(&mut self, channel: usize, uvs: Vec<Vector4f>) -> Result<()> {
        if channel >= UV_CHANNELS {
            return Err(Error::Unsupported(format!(
                "UV channel {} (at most {} channels)",
                channel, UV_CHANNELS
            )));
        }
        if uvs.len() != self.vertices.len() {
            return Err(Error::InvalidData(format!(
                "UV channel {} has {} entries for {} vertices",
                channel,
                uvs.len(),
                self.vertices.len()
            )));
        }
        self.uvs[channel] = Some(uvs);
        Ok(())
    }

    /// Set a 2-component texture coordinate channel
    pub fn set_uvs2(&mut self, channel: usize, uvs: &[[f32; 2]]) -> Result<()> {
        let uvs = uvs
            .iter()
            .map(|uv| Vector4f::new(uv[0], uv[1], 0.0, 0.0))
            .collect();
        self.set_uvs(channel, uvs)
    }

    /// Set vertex bone weights
    pub fn set_bone_weights(&mut self, bone_weights: Vec<BoneWeight>) {
        if bone_weights.len() == self.vertices.len() {
            self.bone_weights = Some(bone_weights);
        }
    }

    /// Assign a submesh id to every face
    pub fn set_face_submeshes(&mut self, submeshes: Vec<usize>) {
        if submeshes.len() == self.faces.len() {
            self.face_submeshes = Some(submeshes);
        }
    }

    /// Number of submeshes (1 when no per-face ids are stored)
    pub fn submesh_count(&self) -> usize {
        match &self.face_submeshes {
            Some(ids) => ids.iter().max().map_or(1, |m| m + 1),
            None => 1,
        }
    }

    /// Faces belonging to one submesh
    pub fn submesh_faces(&self, submesh: usize) -> Vec<[usize; 3]> {
        match &self.face_submeshes {
            Some(ids) => self
                .faces
                .iter()
                .zip(ids)
                .filter(|(_, &id)| id == submesh)
                .map(|(f, _)| *f)
                .collect(),
            None if submesh == 0 => self.faces.clone(),
            None => Vec::new(),
        }
    }

    /// Number of texture coordinate components actually used by a channel.
    ///
    /// Returns 0 for an absent channel, otherwise 2, 3 or 4 depending on
    /// whether any z or w component is non-zero.
    pub fn uv_components(&self, channel: usize) -> usize {
        let Some(Some(uvs)) = self.uvs.get(channel) else {
            return 0;
        };
        if uvs.is_empty() {
            return 0;
        }
        let mut used = 2;
        for uv in uvs {
            if used < 3 && uv.z != 0.0 {
                used = 3;
            }
            if uv.w != 0.0 {
                return 4;
            }
        }
        used
    }

    /// Check indices and attribute stream lengths
    pub fn validate(&self) -> Result<()> {
        let n = self.vertices.len();
        for (i, face) in self.faces.iter().enumerate() {
            if let Some(&bad) = face.iter().find(|&&v| v >= n) {
                return Err(Error::InvalidData(format!(
                    "Face {} references vertex {} but mesh has {} vertices",
                    i, bad, n
                )));
            }
        }

        let check = |name: &str, len: Option<usize>| -> Result<()> {
            match len {
                Some(len) if len != n => Err(Error::InvalidData(format!(
                    "{} stream has {} entries for {} vertices",
                    name, len, n
                ))),
                _ => Ok(()),
            }
        };
        check("Normal", self.normals.as_ref().map(Vec::len))?;
        check("Tangent", self.tangents.as_ref().map(Vec::len))?;
        check("Color", self.colors.as_ref().map(Vec::len))?;
        check("Bone weight", self.bone_weights.as_ref().map(Vec::len))?;
        for uvs in &self.uvs {
            check("UV", uvs.as_ref().map(Vec::len))?;
        }

        if let Some(ids) = &self.face_submeshes {
            if ids.len() != self.faces.len() {
                return Err(Error::InvalidData(format!(
                    "{} submesh ids for {} faces",
                    ids.len(),
                    self.faces.len()
                )));
            }
        }
        Ok(())
    }

    /// Clear the mesh
    pub fn clear(&mut self) {
        *self = Self::new();
    }
}

impl Default for TriangleMesh {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

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
    fn test_counts() {
        let mesh = make_quad();
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.face_count(), 2);
        assert!(!mesh.is_empty());
        assert!(TriangleMesh::new().is_empty());
    }

    #[test]
    fn test_face_normals() {
        let mesh = make_quad();
        for n in mesh.calculate_face_normals() {
            assert_relative_eq!(n.z, 1.0);
        }
    }

    #[test]
    fn test_uv_components() {
        let mut mesh = make_quad();
        assert_eq!(mesh.uv_components(0), 0);

        mesh.set_uvs2(0, &[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]])
            .unwrap();
        assert_eq!(mesh.uv_components(0), 2);

        let mut uvs = vec![Vector4f::zeros(); 4];
        uvs[2].z = 0.5;
        mesh.set_uvs(1, uvs.clone()).unwrap();
        assert_eq!(mesh.uv_components(1), 3);

        uvs[3].w = 1.0;
        mesh.set_uvs(2, uvs).unwrap();
        assert_eq!(mesh.uv_components(2), 4);
    }

    #[test]
    fn test_set_uvs_rejects_bad_channel() {
        let mut mesh = make_quad();
        assert!(mesh.set_uvs(UV_CHANNELS, vec![Vector4f::zeros(); 4]).is_err());
        assert!(mesh.set_uvs(0, vec![Vector4f::zeros(); 3]).is_err());
    }

    #[test]
    fn test_validate() {
        let mut mesh = make_quad();
        assert!(mesh.validate().is_ok());

        mesh.normals = Some(vec![Vector3f::z(); 3]);
        assert!(mesh.validate().is_err());

        let mut mesh = make_quad();
        mesh.faces.push([0, 1, 9]);
        assert!(mesh.validate().is_err());
    }

    #[test]
    fn test_submeshes() {
        let mut mesh = make_quad();
        assert_eq!(mesh.submesh_count(), 1);
        assert_eq!(mesh.submesh_faces(0).len(), 2);

        mesh.set_face_submeshes(vec![0, 1]);
        assert_eq!(mesh.submesh_count(), 2);
        assert_eq!(mesh.submesh_faces(1), vec![[0, 2, 3]]);
    }
}
