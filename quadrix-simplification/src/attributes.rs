//! Vertex attribute kinds, masks and the fixed packing layout
//!
//! Quadrics operate on points of the form `[x, y, z, a0, a1, ...]` where the
//! trailing coordinates are the attributes selected for the metric. The
//! [`AttributeLayout`] fixes, once per run, where each enabled attribute kind
//! lives inside that vector so that corners can be packed and unpacked without
//! re-deciding per call which attributes are present.

use quadrix_core::{BoneWeight, Vector3f, Vector4f, UV_CHANNELS};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// Widest possible attribute vector: normal 3, tangent 4, color 4, 8 UV
/// channels of 4, bone indices 4 and bone weights 4.
pub const MAX_ATTRIBUTE_DIM: usize = 3 + 4 + 4 + 4 * UV_CHANNELS + 8;

/// Number of distinct [`AttributeKind`] values
pub const ATTRIBUTE_KIND_COUNT: usize = 4 + UV_CHANNELS;

/// A per-corner vertex attribute kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AttributeKind {
    Normal,
    Tangent,
    Color,
    Uv(u8),
    BoneWeight,
}

impl AttributeKind {
    /// All kinds in layout order
    pub const ALL: [AttributeKind; ATTRIBUTE_KIND_COUNT] = [
        AttributeKind::Normal,
        AttributeKind::Tangent,
        AttributeKind::Color,
        AttributeKind::Uv(0),
        AttributeKind::Uv(1),
        AttributeKind::Uv(2),
        AttributeKind::Uv(3),
        AttributeKind::Uv(4),
        AttributeKind::Uv(5),
        AttributeKind::Uv(6),
        AttributeKind::Uv(7),
        AttributeKind::BoneWeight,
    ];

    /// Dense index in `0..ATTRIBUTE_KIND_COUNT`
    pub fn index(self) -> usize {
        match self {
            AttributeKind::Normal => 0,
            AttributeKind::Tangent => 1,
            AttributeKind::Color => 2,
            AttributeKind::Uv(c) => 3 + c as usize,
            AttributeKind::BoneWeight => 3 + UV_CHANNELS,
        }
    }

    /// Single-bit mask for this kind
    pub fn mask(self) -> AttributeMask {
        AttributeMask::from_bits_truncate(1 << self.index())
    }
}

bitflags! {
    /// Set of attribute kinds
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct AttributeMask: u16 {
        const NORMAL = 1 << 0;
        const TANGENT = 1 << 1;
        const COLOR = 1 << 2;
        const UV0 = 1 << 3;
        const UV1 = 1 << 4;
        const UV2 = 1 << 5;
        const UV3 = 1 << 6;
        const UV4 = 1 << 7;
        const UV5 = 1 << 8;
        const UV6 = 1 << 9;
        const UV7 = 1 << 10;
        const BONE_WEIGHT = 1 << 11;
    }
}

impl AttributeMask {
    /// Mask of a single UV channel
    pub fn uv(channel: usize) -> Self {
        debug_assert!(channel < UV_CHANNELS);
        Self::from_bits_truncate(Self::UV0.bits() << channel)
    }

    pub fn has(self, kind: AttributeKind) -> bool {
        self.contains(kind.mask())
    }

    /// Kinds contained in this mask, in layout order
    pub fn kinds(self) -> impl Iterator<Item = AttributeKind> {
        AttributeKind::ALL.into_iter().filter(move |k| self.has(*k))
    }
}

/// Attribute values stored on one face corner
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CornerAttributes {
    pub normal: Vector3f,
    pub tangent: Vector4f,
    pub color: Vector4f,
    pub uvs: [Vector4f; UV_CHANNELS],
    pub bone_weight: BoneWeight,
}

impl CornerAttributes {
    /// Value of one attribute kind widened to 4 components (bone weights excluded)
    pub fn value4(&self, kind: AttributeKind) -> Vector4f {
        match kind {
            AttributeKind::Normal => self.normal.push(0.0),
            AttributeKind::Tangent => self.tangent,
            AttributeKind::Color => self.color,
            AttributeKind::Uv(c) => self.uvs[c as usize],
            AttributeKind::BoneWeight => Vector4f::from(self.bone_weight.weights),
        }
    }
}

/// Fixed-capacity packed attribute vector.
///
/// Equality and hashing are bitwise over the active prefix, with `-0.0`
/// folded into `0.0`. A NaN component equals only the same NaN bit pattern.
#[derive(Clone, Copy)]
pub struct AttributeVector {
    len: u8,
    data: [f32; MAX_ATTRIBUTE_DIM],
}

impl AttributeVector {
    pub fn zeros(len: usize) -> Self {
        debug_assert!(len <= MAX_ATTRIBUTE_DIM);
        Self {
            len: len as u8,
            data: [0.0; MAX_ATTRIBUTE_DIM],
        }
    }

    pub fn from_slice(values: &[f32]) -> Self {
        let mut v = Self::zeros(values.len());
        v.data[..values.len()].copy_from_slice(values);
        v
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data[..self.len as usize]
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data[..self.len as usize]
    }

    /// Components `offset..offset + len` widened to a 4-vector
    pub fn segment4(&self, offset: usize, len: usize) -> Vector4f {
        let mut out = Vector4f::zeros();
        for i in 0..len.min(4) {
            out[i] = self.data[offset + i];
        }
        out
    }

    /// Euclidean distance to another vector of the same length
    pub fn distance(&self, other: &Self) -> f32 {
        self.as_slice()
            .iter()
            .zip(other.as_slice())
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f32>()
            .sqrt()
    }
}

fn canonical_bits(v: f32) -> u32 {
    if v == 0.0 {
        0
    } else {
        v.to_bits()
    }
}

impl PartialEq for AttributeVector {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len
            && self
                .as_slice()
                .iter()
                .zip(other.as_slice())
                .all(|(a, b)| canonical_bits(*a) == canonical_bits(*b))
    }
}

impl Eq for AttributeVector {}

impl Hash for AttributeVector {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.len.hash(state);
        for v in self.as_slice() {
            canonical_bits(*v).hash(state);
        }
    }
}

impl std::fmt::Debug for AttributeVector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}

/// Position of one attribute kind inside a packed vector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeSlot {
    pub kind: AttributeKind,
    pub offset: usize,
    pub len: usize,
}

/// Fixed packing of the enabled attribute kinds, computed once per run
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeLayout {
    mask: AttributeMask,
    uv_sizes: [usize; UV_CHANNELS],
    slots: Vec<AttributeSlot>,
    dim: usize,
}

impl AttributeLayout {
    /// Build a layout for `mask`; UV channels use `uv_sizes` components.
    pub fn new(mask: AttributeMask, uv_sizes: [usize; UV_CHANNELS]) -> Self {
        let mut slots = Vec::new();
        let mut offset = 0;
        for kind in mask.kinds() {
            let len = Self::kind_len(kind, &uv_sizes);
            if len == 0 {
                continue;
            }
            slots.push(AttributeSlot { kind, offset, len });
            offset += len;
        }
        Self {
            mask,
            uv_sizes,
            slots,
            dim: offset,
        }
    }

    fn kind_len(kind: AttributeKind, uv_sizes: &[usize; UV_CHANNELS]) -> usize {
        match kind {
            AttributeKind::Normal => 3,
            AttributeKind::Tangent | AttributeKind::Color => 4,
            AttributeKind::Uv(c) => uv_sizes[c as usize],
            AttributeKind::BoneWeight => 8,
        }
    }

    pub fn mask(&self) -> AttributeMask {
        self.mask
    }

    /// Number of attribute coordinates (excluding the 3 geometric ones)
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Full quadric dimension
    pub fn quadric_dim(&self) -> usize {
        3 + self.dim
    }

    pub fn uv_size(&self, channel: usize) -> usize {
        self.uv_sizes[channel]
    }

    pub fn slots(&self) -> &[AttributeSlot] {
        &self.slots
    }

    pub fn slot(&self, kind: AttributeKind) -> Option<&AttributeSlot> {
        self.slots.iter().find(|s| s.kind == kind)
    }

    /// Pack the enabled attributes of one corner
    pub fn pack(&self, attrs: &CornerAttributes) -> AttributeVector {
        let mut out = AttributeVector::zeros(self.dim);
        let data = out.as_mut_slice();
        for slot in &self.slots {
            let dst = &mut data[slot.offset..slot.offset + slot.len];
            match slot.kind {
                AttributeKind::Normal => dst.copy_from_slice(attrs.normal.as_slice()),
                AttributeKind::Tangent => dst.copy_from_slice(attrs.tangent.as_slice()),
                AttributeKind::Color => dst.copy_from_slice(attrs.color.as_slice()),
                AttributeKind::Uv(c) => {
                    dst.copy_from_slice(&attrs.uvs[c as usize].as_slice()[..slot.len])
                }
                AttributeKind::BoneWeight => {
                    let bw = &attrs.bone_weight;
                    for i in 0..4 {
                        dst[i] = bw.indices[i] as f32;
                        dst[4 + i] = bw.weights[i];
                    }
                }
            }
        }
        out
    }

    /// Write packed values back into the enabled attributes of one corner
    pub fn unpack(&self, values: &[f32], attrs: &mut CornerAttributes) {
        debug_assert_eq!(values.len(), self.dim);
        for slot in &self.slots {
            let src = &values[slot.offset..slot.offset + slot.len];
            match slot.kind {
                AttributeKind::Normal => attrs.normal = Vector3f::from_column_slice(src),
                AttributeKind::Tangent => attrs.tangent = Vector4f::from_column_slice(src),
                AttributeKind::Color => attrs.color = Vector4f::from_column_slice(src),
                AttributeKind::Uv(c) => {
                    let uv = &mut attrs.uvs[c as usize];
                    for (i, v) in src.iter().enumerate() {
                        uv[i] = *v;
                    }
                }
                AttributeKind::BoneWeight => {
                    let bw = &mut attrs.bone_weight;
                    for i in 0..4 {
                        bw.indices[i] = src[i].max(0.0) as u32;
                        bw.weights[i] = src[4 + i];
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn sample_corner() -> CornerAttributes {
        let mut c = CornerAttributes {
            normal: Vector3f::new(0.0, 0.0, 1.0),
            tangent: Vector4f::new(1.0, 0.0, 0.0, -1.0),
            color: Vector4f::new(0.2, 0.4, 0.6, 1.0),
            bone_weight: BoneWeight::new([3, 1, 0, 0], [0.75, 0.25, 0.0, 0.0]),
            ..Default::default()
        };
        c.uvs[0] = Vector4f::new(0.5, 0.25, 0.0, 0.0);
        c.uvs[2] = Vector4f::new(0.1, 0.2, 0.3, 0.0);
        c
    }

    #[test]
    fn test_mask_ops() {
        let m = AttributeMask::NORMAL | AttributeMask::UV0;
        assert!(m.has(AttributeKind::Normal));
        assert!(m.has(AttributeKind::Uv(0)));
        assert!(!m.has(AttributeKind::Color));
        assert_eq!((m & AttributeMask::UV0), AttributeMask::UV0);
        assert!(!(!m).has(AttributeKind::Normal));
        assert!((!m).has(AttributeKind::BoneWeight));
        assert_eq!(m.kinds().collect::<Vec<_>>(), vec![AttributeKind::Normal, AttributeKind::Uv(0)]);
        assert_eq!(AttributeMask::uv(1), AttributeMask::UV1);
    }

    #[test]
    fn test_kind_index_is_dense() {
        for (i, k) in AttributeKind::ALL.iter().enumerate() {
            assert_eq!(k.index(), i);
        }
        assert_eq!(AttributeKind::BoneWeight.mask(), AttributeMask::BONE_WEIGHT);
    }

    #[test]
    fn test_layout_offsets() {
        let mut sizes = [0; UV_CHANNELS];
        sizes[0] = 2;
        sizes[2] = 3;
        let mask = AttributeMask::NORMAL | AttributeMask::uv(0) | AttributeMask::uv(2) | AttributeMask::BONE_WEIGHT;
        let layout = AttributeLayout::new(mask, sizes);

        assert_eq!(layout.dim(), 3 + 2 + 3 + 8);
        assert_eq!(layout.quadric_dim(), 19);
        let offsets: Vec<usize> = layout.slots().iter().map(|s| s.offset).collect();
        assert_eq!(offsets, vec![0, 3, 5, 8]);
    }

    #[test]
    fn test_layout_skips_empty_uv_channels() {
        let layout = AttributeLayout::new(AttributeMask::UV0, [0; UV_CHANNELS]);
        assert_eq!(layout.dim(), 0);
        assert!(layout.slots().is_empty());
    }

    #[test]
    fn test_pack_unpack() {
        let mut sizes = [0; UV_CHANNELS];
        sizes[0] = 2;
        sizes[2] = 3;
        let layout = AttributeLayout::new(AttributeMask::all(), sizes);
        let corner = sample_corner();

        let packed = layout.pack(&corner);
        assert_eq!(packed.len(), 3 + 4 + 4 + 2 + 3 + 8);

        let mut restored = CornerAttributes::default();
        layout.unpack(packed.as_slice(), &mut restored);
        assert_eq!(restored, corner);
    }

    #[test]
    fn test_vector_equality_and_hash() {
        let a = AttributeVector::from_slice(&[0.0, 1.0]);
        let b = AttributeVector::from_slice(&[-0.0, 1.0]);
        let c = AttributeVector::from_slice(&[0.0, 1.0, 2.0]);
        assert_eq!(a, b);
        assert_ne!(a, c);

        let set: HashSet<_> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_nan_key_is_reflexive() {
        let a = AttributeVector::from_slice(&[f32::NAN, 1.0]);
        assert_eq!(a, a);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&a));
        assert!(!set.contains(&AttributeVector::from_slice(&[0.0, 1.0])));
    }

    #[test]
    fn test_mask_complement_and_serde() {
        assert_eq!(!AttributeMask::empty(), AttributeMask::all());
        assert_eq!(AttributeMask::all().kinds().count(), ATTRIBUTE_KIND_COUNT);
        assert_eq!(AttributeMask::uv(7), AttributeMask::UV7);

        let m = AttributeMask::NORMAL | AttributeMask::UV0;
        let json = serde_json::to_string(&m).unwrap();
        let back: AttributeMask = serde_json::from_str(&json).unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn test_segment4() {
        let v = AttributeVector::from_slice(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(v.segment4(3, 2), Vector4f::new(4.0, 5.0, 0.0, 0.0));
    }
}
