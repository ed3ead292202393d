//! Decimation parameters and stop targets

use crate::attributes::{AttributeKind, AttributeMask, ATTRIBUTE_KIND_COUNT};
use quadrix_core::Vector4f;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Maps a raw attribute value to the key used when counting distinct values
/// across an edge, e.g. a texture lookup for UVs.
pub type AttributeSampler = Arc<dyn Fn(Vector4f) -> Vector4f + Send + Sync>;

/// Per-attribute-kind behaviour
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributeSettings {
    /// Priority multiplier per distinct value merged beyond the first two
    pub extra_weight: f32,
    /// Borrow the value from the face across the collapsed edge when the new
    /// position falls outside a face and both values are close
    pub interpolate_with_adjacent_face: bool,
    /// Clamp barycentric coordinates to the triangle when the new position
    /// falls outside it
    pub interpolate_clamped: bool,
    /// Squared distance under which two values count as the same
    pub sqr_distance_threshold: f32,
    #[serde(skip)]
    pub sampler: Option<AttributeSampler>,
}

impl Default for AttributeSettings {
    fn default() -> Self {
        Self {
            extra_weight: 0.0,
            interpolate_with_adjacent_face: true,
            interpolate_clamped: true,
            sqr_distance_threshold: 0.003,
            sampler: None,
        }
    }
}

impl fmt::Debug for AttributeSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeSettings")
            .field("extra_weight", &self.extra_weight)
            .field("interpolate_with_adjacent_face", &self.interpolate_with_adjacent_face)
            .field("interpolate_clamped", &self.interpolate_clamped)
            .field("sqr_distance_threshold", &self.sqr_distance_threshold)
            .field("sampler", &self.sampler.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

impl AttributeSettings {
    pub fn with_extra_weight(mut self, weight: f32) -> Self {
        self.extra_weight = weight;
        self
    }

    pub fn with_sampler(mut self, sampler: AttributeSampler) -> Self {
        self.sampler = Some(sampler);
        self
    }

    /// Apply the sampler, if any
    pub(crate) fn sample(&self, value: Vector4f) -> Vector4f {
        match &self.sampler {
            Some(f) => f(value),
            None => value,
        }
    }
}

/// Configuration for quadric edge-collapse decimation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeCollapseParams {
    /// Attribute kinds folded into the quadrics
    pub used_attributes: AttributeMask,
    /// Weight of the virtual wall quadric on border edges
    pub boundary_weight: f64,
    /// Penalize collapses that rotate an adjacent face normal too far
    pub normal_check: bool,
    /// Minimum allowed cosine between old and new face normals
    pub normal_cosine_threshold: f32,
    /// Solve for the optimal position instead of sampling the edge
    pub optimal_placement: bool,
    /// Interior samples taken along the edge when the solve fails
    pub optimal_sample_count: i32,
    /// Lock both endpoints of every border edge
    pub preserve_boundary: bool,
    /// Floor of the quadric error in the priority
    pub quadric_epsilon: f64,
    /// Ceiling of the triangle quality in the priority
    pub quality_threshold: f32,
    /// Add low-weight wall quadrics on every edge, not only on borders
    pub quality_quadric: bool,
    /// Reject collapses that make the surface cross itself
    pub prevent_intersection: bool,
    /// Indexed by [`AttributeKind::index`]
    pub attribute_settings: [AttributeSettings; ATTRIBUTE_KIND_COUNT],
}

impl Default for EdgeCollapseParams {
    fn default() -> Self {
        Self {
            used_attributes: AttributeMask::UV0,
            boundary_weight: 0.5,
            normal_check: false,
            normal_cosine_threshold: std::f32::consts::FRAC_PI_2.cos(),
            optimal_placement: true,
            optimal_sample_count: 1,
            preserve_boundary: false,
            quadric_epsilon: 1e-15,
            quality_threshold: 0.1,
            quality_quadric: false,
            prevent_intersection: false,
            attribute_settings: std::array::from_fn(|_| AttributeSettings::default()),
        }
    }
}

impl EdgeCollapseParams {
    /// Preset for textured meshes: keeps open borders and UV seams in place
    /// and refuses fold-overs and self-intersections.
    pub fn seam_preserving() -> Self {
        let mut params = Self {
            quality_threshold: 0.3,
            optimal_sample_count: 3,
            preserve_boundary: true,
            boundary_weight: 1.0,
            normal_check: true,
            prevent_intersection: true,
            ..Self::default()
        };
        params.settings_mut(AttributeKind::Uv(0)).extra_weight = 1e4;
        params
    }

    pub fn with_used_attributes(mut self, mask: AttributeMask) -> Self {
        self.used_attributes = mask;
        self
    }

    pub fn with_boundary_weight(mut self, weight: f64) -> Self {
        self.boundary_weight = weight;
        self
    }

    pub fn with_normal_check(mut self, enabled: bool, cosine_threshold: f32) -> Self {
        self.normal_check = enabled;
        self.normal_cosine_threshold = cosine_threshold;
        self
    }

    pub fn with_optimal_placement(mut self, enabled: bool, sample_count: i32) -> Self {
        self.optimal_placement = enabled;
        self.optimal_sample_count = sample_count;
        self
    }

    pub fn with_preserve_boundary(mut self, enabled: bool) -> Self {
        self.preserve_boundary = enabled;
        self
    }

    pub fn with_quality_threshold(mut self, threshold: f32) -> Self {
        self.quality_threshold = threshold;
        self
    }

    pub fn with_quality_quadric(mut self, enabled: bool) -> Self {
        self.quality_quadric = enabled;
        self
    }

    pub fn with_prevent_intersection(mut self, enabled: bool) -> Self {
        self.prevent_intersection = enabled;
        self
    }

    pub fn with_attribute_settings(mut self, kind: AttributeKind, settings: AttributeSettings) -> Self {
        self.attribute_settings[kind.index()] = settings;
        self
    }

    pub fn settings(&self, kind: AttributeKind) -> &AttributeSettings {
        &self.attribute_settings[kind.index()]
    }

    pub fn settings_mut(&mut self, kind: AttributeKind) -> &mut AttributeSettings {
        &mut self.attribute_settings[kind.index()]
    }

    /// Clamp the sample count and drop used attributes the mesh lacks
    pub fn normalized(mut self, present: AttributeMask) -> Self {
        if self.optimal_sample_count < 1 {
            self.optimal_sample_count = 1;
        }
        self.used_attributes &= present;
        self
    }
}

/// Stop conditions; `None` leaves a target unset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConditions {
    pub face_count: Option<usize>,
    pub vertex_count: Option<usize>,
    pub max_operations: Option<usize>,
    pub max_error: Option<f32>,
    pub max_duration: Option<Duration>,
}

impl TargetConditions {
    pub fn faces(count: usize) -> Self {
        Self {
            face_count: Some(count),
            ..Self::default()
        }
    }

    pub fn with_vertex_count(mut self, count: usize) -> Self {
        self.vertex_count = Some(count);
        self
    }

    pub fn with_max_operations(mut self, count: usize) -> Self {
        self.max_operations = Some(count);
        self
    }

    pub fn with_max_error(mut self, error: f32) -> Self {
        self.max_error = Some(error);
        self
    }

    pub fn with_max_duration(mut self, duration: Duration) -> Self {
        self.max_duration = Some(duration);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_defaults() {
        let p = EdgeCollapseParams::default();
        assert_eq!(p.used_attributes, AttributeMask::UV0);
        assert_abs_diff_eq!(p.normal_cosine_threshold, 0.0, epsilon = 1e-6);
        assert!(p.optimal_placement);
        assert_eq!(p.optimal_sample_count, 1);
        assert!(!p.prevent_intersection);
        for kind in AttributeKind::ALL {
            let s = p.settings(kind);
            assert_eq!(s.extra_weight, 0.0);
            assert!(s.interpolate_with_adjacent_face);
            assert!(s.interpolate_clamped);
            assert_eq!(s.sqr_distance_threshold, 0.003);
            assert!(s.sampler.is_none());
        }
    }

    #[test]
    fn test_seam_preserving_preset() {
        let p = EdgeCollapseParams::seam_preserving();
        assert_eq!(p.quality_threshold, 0.3);
        assert_eq!(p.optimal_sample_count, 3);
        assert!(p.preserve_boundary && p.normal_check && p.prevent_intersection);
        assert_eq!(p.boundary_weight, 1.0);
        assert_eq!(p.settings(AttributeKind::Uv(0)).extra_weight, 1e4);
        assert_eq!(p.settings(AttributeKind::Uv(1)).extra_weight, 0.0);
    }

    #[test]
    fn test_normalized() {
        let p = EdgeCollapseParams::default()
            .with_used_attributes(AttributeMask::UV0 | AttributeMask::NORMAL)
            .with_optimal_placement(true, -3)
            .normalized(AttributeMask::NORMAL | AttributeMask::COLOR);
        assert_eq!(p.optimal_sample_count, 1);
        assert_eq!(p.used_attributes, AttributeMask::NORMAL);
    }

    #[test]
    fn test_sampler() {
        let settings = AttributeSettings::default()
            .with_sampler(Arc::new(|v: Vector4f| Vector4f::new(v.x.floor(), 0.0, 0.0, 0.0)));
        let out = settings.sample(Vector4f::new(2.7, 5.0, 0.0, 0.0));
        assert_eq!(out, Vector4f::new(2.0, 0.0, 0.0, 0.0));
        assert!(format!("{settings:?}").contains("<fn>"));

        let plain = AttributeSettings::default();
        assert_eq!(plain.sample(Vector4f::new(1.0, 2.0, 3.0, 4.0)), Vector4f::new(1.0, 2.0, 3.0, 4.0));
    }

    #[test]
    fn test_targets_builder() {
        let t = TargetConditions::faces(10)
            .with_max_error(0.5)
            .with_max_duration(Duration::from_secs(2));
        assert_eq!(t.face_count, Some(10));
        assert_eq!(t.vertex_count, None);
        assert_eq!(t.max_error, Some(0.5));
        assert_eq!(t.max_duration, Some(Duration::from_secs(2)));
    }
}
