//! Mesh simplification by quadric edge collapse
//!
//! This crate reduces triangle count while preserving shape and per-vertex
//! attributes:
//! - Quadric error metrics extended with normals, tangents, colors, UVs and
//!   bone weights
//! - Link-condition checks that keep the surface a 2-manifold
//! - Greedy, lazily invalidated collapse scheduling
//! - Optional self-intersection prevention through an R*-tree face index

pub mod attributes;
pub mod mesh;
pub mod adjacency;
pub mod geometry;
pub mod quadric;
pub mod vertex_quadrics;
pub mod link;
pub mod heap;
pub mod params;
pub mod spatial;
pub mod collapse;
pub mod simplifier;

pub use attributes::{AttributeKind, AttributeLayout, AttributeMask, AttributeVector, CornerAttributes};
pub use mesh::{Corner, Face, FaceFlags, FaceId, Mesh, Vertex, VertexFlags, VertexId};
pub use adjacency::FanIter;
pub use quadric::Quadric;
pub use vertex_quadrics::QuadricStore;
pub use link::{link_condition, LinkScratch};
pub use heap::BinaryHeap;
pub use params::{AttributeSampler, AttributeSettings, EdgeCollapseParams, TargetConditions};
pub use spatial::{FaceRTree, SpatialIndex};
pub use collapse::{CollapseContext, EdgeCollapse};
pub use simplifier::{DecimationReport, Decimator, EdgeCollapseSimplifier, StopReason};

pub use quadrix_core::{Error, Result};

use quadrix_core::TriangleMesh;

/// Simplify a mesh by reducing the number of faces/vertices
pub trait MeshSimplifier {
    /// Simplify mesh with target reduction ratio (0.0 = no reduction, 1.0 = maximum reduction)
    fn simplify(&self, mesh: &TriangleMesh, reduction_ratio: f32) -> Result<TriangleMesh>;
}
