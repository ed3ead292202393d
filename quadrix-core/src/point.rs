//! Point, vector and per-vertex attribute types

use nalgebra::{Point3, Vector3, Vector4};
use serde::{Deserialize, Serialize};
use bytemuck::{Pod, Zeroable};

/// A 3D point with floating point coordinates
pub type Point3f = Point3<f32>;

/// A 3D point with double precision coordinates
pub type Point3d = Point3<f64>;

/// A 3D vector with floating point components
pub type Vector3f = Vector3<f32>;

/// A 3D vector with double precision components
pub type Vector3d = Vector3<f64>;

/// A 4D vector with floating point components (tangents, colors, texture coordinates)
pub type Vector4f = Vector4<f32>;

/// Up to four bone influences on a single vertex.
///
/// Layout matches the usual GPU skinning stream: four indices followed by
/// four weights.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, Pod, Zeroable)]
#[repr(C)]
pub struct BoneWeight {
    pub indices: [u32; 4],
    pub weights: [f32; 4],
}

impl BoneWeight {
    /// Create a bone weight from index/weight pairs
    pub fn new(indices: [u32; 4], weights: [f32; 4]) -> Self {
        Self { indices, weights }
    }

    /// A vertex fully bound to a single bone
    pub fn single(index: u32) -> Self {
        Self {
            indices: [index, 0, 0, 0],
            weights: [1.0, 0.0, 0.0, 0.0],
        }
    }

    /// Sum of all four weights
    pub fn total_weight(&self) -> f32 {
        self.weights.iter().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_bone_weight_single() {
        let bw = BoneWeight::single(7);
        assert_eq!(bw.indices[0], 7);
        assert_relative_eq!(bw.total_weight(), 1.0);
    }

    #[test]
    fn test_bone_weight_is_pod() {
        let bw = BoneWeight::new([1, 2, 3, 4], [0.4, 0.3, 0.2, 0.1]);
        let bytes: &[u8] = bytemuck::bytes_of(&bw);
        assert_eq!(bytes.len(), 32);
        let back: BoneWeight = *bytemuck::from_bytes(bytes);
        assert_eq!(back, bw);
    }
}
