//! Core data structures for quadrix
//!
//! This crate provides the mesh exchange type consumed and produced by the
//! decimator, the point and attribute aliases it is built on, and the shared
//! error type.

pub mod point;
pub mod mesh;
pub mod error;

pub use point::*;
pub use mesh::*;
pub use error::*;

/// Re-export commonly used types from nalgebra
pub use nalgebra::{Point3, Vector3, Vector4};
