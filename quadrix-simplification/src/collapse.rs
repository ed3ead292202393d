//! Edge-collapse candidate
//!
//! A candidate removes `v0` and moves the surviving `v1` to the position that
//! minimizes the summed quadrics of both endpoints. Candidates are cheap
//! value types: the heap holds many stale ones and the driver discards them
//! when popped (see [`EdgeCollapse::is_up_to_date`]).

use crate::attributes::{AttributeKind, AttributeLayout, AttributeMask, AttributeSlot, AttributeVector, CornerAttributes};
use crate::geometry::{
    barycentric, closest_point_on_triangle, face_normal, normalize_tangent,
    segment_intersects_box, segment_triangle_intersection, triangle_quality,
};
use crate::link::{link_condition, LinkScratch};
use crate::mesh::{Corner, Face, FaceId, Mesh, VertexId};
use crate::params::{AttributeSettings, EdgeCollapseParams};
use crate::quadric::{stack_point, Quadric};
use crate::spatial::SpatialIndex;
use crate::vertex_quadrics::{KeyedQuadrics, QuadricStore};
use nalgebra::DVector;
use quadrix_core::{BoneWeight, Error, Point3f, Result, Vector3f, Vector4f};
use smallvec::{smallvec, SmallVec};
use std::collections::HashSet;

/// Priority multiplier for collapses that tilt a face normal past the
/// configured cosine
const NORMAL_FLIP_PENALTY: f32 = 1000.0;

/// Run-wide state every candidate reads
#[derive(Debug, Clone, Copy)]
pub struct CollapseContext<'a> {
    pub params: &'a EdgeCollapseParams,
    pub layout: &'a AttributeLayout,
}

/// Attribute keys of the faces spanning the edge
#[derive(Debug, Clone, Copy)]
struct EdgeKeys {
    /// Number of distinct key pairs, 0 to 2
    count: usize,
    /// `(v0 key, v1 key)` on the first spanning face
    first: [AttributeVector; 2],
    /// `(v0 key, v1 key)` on the second spanning face
    second: [AttributeVector; 2],
}

impl EdgeKeys {
    fn matches_first(&self, key: &AttributeVector) -> bool {
        self.count > 0 && (*key == self.first[0] || *key == self.first[1])
    }

    fn matches_second(&self, key: &AttributeVector) -> bool {
        self.count > 1 && (*key == self.second[0] || *key == self.second[1])
    }
}

/// Placement and merged quadrics for one or two attribute sets
#[derive(Debug, Clone)]
struct CollapsePlan {
    keys: EdgeKeys,
    min1: DVector<f64>,
    min2: DVector<f64>,
    qsum1: Quadric,
    qsum2: Quadric,
    priority: f32,
}

/// Collapse of `v0` into `v1`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeCollapse {
    /// Removed endpoint
    pub v0: VertexId,
    /// Surviving endpoint
    pub v1: VertexId,
    mark: u64,
    priority: f32,
}

impl EdgeCollapse {
    pub fn new(v0: VertexId, v1: VertexId, mark: u64) -> Self {
        Self {
            v0,
            v1,
            mark,
            priority: f32::INFINITY,
        }
    }

    /// Create a candidate and compute its priority
    pub fn evaluate(
        v0: VertexId,
        v1: VertexId,
        mark: u64,
        mesh: &Mesh,
        quadrics: &QuadricStore,
        ctx: CollapseContext<'_>,
    ) -> Self {
        let mut collapse = Self::new(v0, v1, mark);
        collapse.compute_priority(mesh, quadrics, ctx);
        collapse
    }

    pub fn mark(&self) -> u64 {
        self.mark
    }

    /// Priority from the last [`compute_priority`](Self::compute_priority)
    pub fn priority(&self) -> f32 {
        self.priority
    }

    /// False once either endpoint was deleted or touched by a later collapse
    pub fn is_up_to_date(&self, mesh: &Mesh) -> bool {
        let a = mesh.vertex(self.v0);
        let b = mesh.vertex(self.v1);
        !a.is_deleted() && !b.is_deleted() && self.mark >= a.mark() && self.mark >= b.mark()
    }

    pub fn is_feasible(&self, mesh: &Mesh, scratch: &mut LinkScratch) -> bool {
        link_condition(mesh, self.v0, self.v1, scratch)
    }

    pub fn compute_priority(&mut self, mesh: &Mesh, quadrics: &QuadricStore, ctx: CollapseContext<'_>) -> f32 {
        self.priority = self.plan(mesh, quadrics, ctx).priority;
        self.priority
    }

    /// Perform the collapse.
    ///
    /// Returns `Ok(false)` without touching the mesh when the new position
    /// would make the surface cross itself. An `Err` means the adjacency was
    /// found broken; the mesh may then be partially modified.
    pub fn execute<S: SpatialIndex>(
        &self,
        mesh: &mut Mesh,
        quadrics: &mut QuadricStore,
        index: &mut S,
        ctx: CollapseContext<'_>,
    ) -> Result<bool> {
        let (v0, v1) = (self.v0, self.v1);
        let plan = self.plan(mesh, quadrics, ctx);
        if plan.keys.count == 0 {
            return Err(Error::Algorithm(format!(
                "Vertices {} and {} share no face",
                v0.index(),
                v1.index()
            )));
        }
        let new_pos = Point3f::new(plan.min1[0] as f32, plan.min1[1] as f32, plan.min1[2] as f32);
        let guarded = ctx.params.prevent_intersection;

        if guarded && self.intersection_count(mesh, index, &new_pos) > 0 {
            return Ok(false);
        }

        let interpolated = mesh.present_attributes() & !ctx.layout.mask();
        if !interpolated.is_empty() {
            self.interpolate_attributes(mesh, &new_pos, interpolated, ctx.params);
        }

        let merged_geo = quadrics.geometric(v0).clone() + quadrics.geometric(v1);
        let deleted = self.collapse_topology(mesh, new_pos)?;
        if guarded {
            for &f in &deleted {
                index.remove(f);
            }
        }

        let np1 = solved_key(ctx.layout, &plan.min1);
        let np2 = (plan.keys.count > 1).then(|| solved_key(ctx.layout, &plan.min2));
        let mut keyed: KeyedQuadrics = smallvec![(np1, plan.qsum1)];
        if let Some(np2) = np2 {
            keyed.push((np2, plan.qsum2));
        }

        for c in mesh.collect_fan(v1) {
            let key = ctx.layout.pack(&mesh.face(c.face).attributes[c.corner]);
            if plan.keys.matches_first(&key) {
                ctx.layout
                    .unpack(np1.as_slice(), &mut mesh.face_mut(c.face).attributes[c.corner]);
            } else if let Some(np2) = np2.filter(|_| plan.keys.matches_second(&key)) {
                ctx.layout
                    .unpack(np2.as_slice(), &mut mesh.face_mut(c.face).attributes[c.corner]);
            } else if !keyed.iter().any(|(k, _)| *k == key) {
                // A corner whose attributes did not take part in the collapse
                let q = if quadrics.contains(v0, &key) {
                    let mut q = quadrics.get_or_zero(v0, &key);
                    q.sum3(quadrics.geometric(v1), key.as_slice());
                    q
                } else if quadrics.contains(v1, &key) {
                    let mut q = quadrics.get_or_zero(v1, &key);
                    q.sum3(quadrics.geometric(v0), key.as_slice());
                    q
                } else {
                    let mut q = Quadric::zero(quadrics.quadric_dim());
                    q.sum3(&merged_geo, key.as_slice());
                    q
                };
                keyed.push((key, q));
            }
            if guarded {
                index.mark_dirty(c.face);
            }
        }
        if guarded {
            index.optimize(mesh);
        }

        quadrics.set_geometric(v1, merged_geo);
        quadrics.set_keyed(v1, keyed);
        Ok(true)
    }

    // ---- cost ----

    fn edge_keys(&self, mesh: &Mesh, layout: &AttributeLayout) -> EdgeKeys {
        let zero = AttributeVector::zeros(layout.dim());
        let mut keys = EdgeKeys {
            count: 0,
            first: [zero; 2],
            second: [zero; 2],
        };
        for c in mesh.fan(self.v0) {
            let face = mesh.face(c.face);
            let Some(z1) = face.corner_of(self.v1) else {
                continue;
            };
            let pair = [layout.pack(&face.attributes[c.corner]), layout.pack(&face.attributes[z1])];
            if keys.count == 0 {
                keys.first = pair;
                keys.count = 1;
            } else {
                keys.second = pair;
                if pair != keys.first {
                    keys.count = 2;
                }
                break;
            }
        }
        keys
    }

    fn plan(&self, mesh: &Mesh, quadrics: &QuadricStore, ctx: CollapseContext<'_>) -> CollapsePlan {
        let params = ctx.params;
        let keys = self.edge_keys(mesh, ctx.layout);
        let p0 = mesh.position(self.v0);
        let p1 = mesh.position(self.v1);

        let [k0, k1] = keys.first;
        let qsum1 = quadrics.get_or_zero(self.v0, &k0) + &quadrics.get_or_zero(self.v1, &k1);
        let (e0, e1) = (stack_point(&p0, k0.as_slice()), stack_point(&p1, k1.as_slice()));

        if keys.count == 0 {
            return CollapsePlan {
                keys,
                min2: e1.clone(),
                min1: e1,
                qsum2: qsum1.clone(),
                qsum1,
                priority: f32::INFINITY,
            };
        }

        let extra = 1.0 + self.extra_weight(quadrics, ctx);
        let mut min1 = compute_minimal(&e0, &e1, &qsum1, params);
        let mut priority1 = self.property_priority(&min1, &qsum1, mesh, params);

        if keys.count < 2 {
            return CollapsePlan {
                keys,
                min2: min1.clone(),
                min1,
                qsum2: Quadric::zero(qsum1.dim()),
                qsum1,
                priority: finite_or_inf(priority1 * extra),
            };
        }

        let [k0, k1] = keys.second;
        let qsum2 = quadrics.get_or_zero(self.v0, &k0) + &quadrics.get_or_zero(self.v1, &k1);
        let (f0, f1) = (stack_point(&p0, k0.as_slice()), stack_point(&p1, k1.as_slice()));
        let mut min2 = compute_minimal(&f0, &f1, &qsum2, params);
        let mut priority2 = self.property_priority(&min2, &qsum2, mesh, params);

        // The costlier set keeps its optimum; the other set is re-solved there
        if priority1 > priority2 {
            min2 = compute_minimal_at(&f0, &f1, &qsum2, &geometric_part(&min1), params);
            priority2 = self.property_priority(&min2, &qsum2, mesh, params);
        } else {
            min1 = compute_minimal_at(&e0, &e1, &qsum1, &geometric_part(&min2), params);
            priority1 = self.property_priority(&min1, &qsum1, mesh, params);
        }

        CollapsePlan {
            keys,
            min1,
            min2,
            qsum1,
            qsum2,
            priority: finite_or_inf(priority1.max(priority2) * extra),
        }
    }

    /// Positions of face `f` with both endpoints moved to `new_pos`
    fn moved_positions(&self, mesh: &Mesh, f: FaceId, new_pos: &Point3f) -> [Point3f; 3] {
        mesh.face(f).vertices.map(|v| {
            if v == self.v0 || v == self.v1 {
                *new_pos
            } else {
                mesh.position(v)
            }
        })
    }

    /// Quadric error over the worst surviving triangle shape
    fn property_priority(&self, x: &DVector<f64>, q: &Quadric, mesh: &Mesh, params: &EdgeCollapseParams) -> f32 {
        let new_pos = Point3f::new(x[0] as f32, x[1] as f32, x[2] as f32);
        let error = q.apply(x).max(params.quadric_epsilon);

        let mut min_quality = f32::MAX;
        let mut min_cos = f32::MAX;
        for (v, other) in [(self.v0, self.v1), (self.v1, self.v0)] {
            for c in mesh.fan(v) {
                let face = mesh.face(c.face);
                if face.contains(other) {
                    continue;
                }
                let [a, b, d] = self.moved_positions(mesh, c.face, &new_pos);
                min_quality = min_quality.min(triangle_quality(&a, &b, &d));
                if params.normal_check {
                    min_cos = min_cos.min(face_normal(&a, &b, &d).dot(&face.normal));
                }
            }
        }
        let min_quality = min_quality.min(params.quality_threshold);

        let mut priority = (error / min_quality as f64) as f32;
        if params.normal_check && min_cos < params.normal_cosine_threshold {
            priority *= NORMAL_FLIP_PENALTY;
        }
        finite_or_inf(priority)
    }

    /// Penalty for merging distinct attribute values across the edge
    fn extra_weight(&self, quadrics: &QuadricStore, ctx: CollapseContext<'_>) -> f32 {
        let mut weight = 0.0;
        for slot in ctx.layout.slots() {
            let settings = ctx.params.settings(slot.kind);
            let size: usize = [self.v0, self.v1]
                .iter()
                .map(|&v| distinct_values(quadrics.keyed(v), slot, settings))
                .sum();
            weight += settings.extra_weight * (size as f32 - 2.0);
        }
        weight
    }

    // ---- execution ----

    /// Number of surrounding faces crossed by the edges that would connect
    /// `new_pos` to the one-rings of both endpoints
    fn intersection_count<S: SpatialIndex>(&self, mesh: &Mesh, index: &S, new_pos: &Point3f) -> usize {
        let mut targets: SmallVec<[Point3f; 32]> = SmallVec::new();
        let mut exclude: HashSet<FaceId> = HashSet::new();
        for (v, other) in [(self.v0, self.v1), (self.v1, self.v0)] {
            let moves = mesh.position(v) != *new_pos;
            for c in mesh.fan(v) {
                exclude.insert(c.face);
                if !moves {
                    continue;
                }
                for n in [mesh.corner_vertex(c, 1), mesh.corner_vertex(c, 2)] {
                    let p = mesh.position(n);
                    if n != other && !targets.contains(&p) {
                        targets.push(p);
                    }
                }
            }
        }
        if targets.is_empty() {
            return 0;
        }

        let mut hits = Vec::new();
        index.query(
            |bounds| targets.iter().any(|p| segment_intersects_box(new_pos, p, bounds)),
            &mut hits,
        );

        let mut count = 0;
        for f in hits {
            if exclude.contains(&f) || mesh.face(f).is_deleted() {
                continue;
            }
            let [a, b, c] = mesh.face_positions(f);
            count += targets
                .iter()
                .filter(|p| {
                    matches!(
                        segment_triangle_intersection(new_pos, p, &a, &b, &c),
                        Some(hit) if hit != **p && hit != *new_pos
                    )
                })
                .count();
        }
        count
    }

    /// Re-interpolate the attributes the quadrics do not carry on every
    /// corner that survives around the edge
    fn interpolate_attributes(&self, mesh: &mut Mesh, new_pos: &Point3f, kinds: AttributeMask, params: &EdgeCollapseParams) {
        // Reference face: the spanning face closest to the new position
        let mut reference: Option<(FaceId, usize, usize)> = None;
        let mut min_distance = f32::MAX;
        for c in mesh.fan(self.v0) {
            let face = mesh.face(c.face);
            let z1 = if face.vertex(c.corner + 1) == self.v1 {
                (c.corner + 1) % 3
            } else if face.vertex(c.corner + 2) == self.v1 {
                (c.corner + 2) % 3
            } else {
                continue;
            };
            let [a, b, d] = mesh.face_positions(c.face);
            let closest = closest_point_on_triangle(new_pos, &a, &b, &d);
            if closest.sqr_distance < min_distance {
                min_distance = closest.sqr_distance;
                reference = Some((c.face, c.corner, z1));
            }
        }
        let Some((mf, z0, z1)) = reference else {
            return;
        };
        let mface = mesh.face(mf).clone();
        let [a, b, d] = mesh.face_positions(mf);
        let mut mcoord = barycentric(new_pos, &a, &b, &d);
        if is_outside(&mcoord) {
            mcoord = closest_point_on_triangle(new_pos, &a, &b, &d).barycentric;
        }

        let mut updates: SmallVec<[(Corner, CornerAttributes); 16]> = SmallVec::new();
        for (v, other, mid) in [(self.v0, self.v1, z0), (self.v1, self.v0, z1)] {
            for c in mesh.fan(v) {
                let face = mesh.face(c.face);
                if face.contains(other) {
                    continue;
                }
                let [a, b, d] = mesh.face_positions(c.face);
                let coord = barycentric(new_pos, &a, &b, &d);
                let closest = is_outside(&coord)
                    .then(|| closest_point_on_triangle(new_pos, &a, &b, &d).barycentric);

                let mut attrs = face.attributes[c.corner];
                for kind in kinds.kinds() {
                    let settings = params.settings(kind);
                    let adjacent = closest.is_some()
                        && settings.interpolate_with_adjacent_face
                        && same_value(kind, &face.attributes[c.corner], &mface.attributes[mid], settings);
                    if adjacent {
                        blend(&mface, kind, &mcoord, &mut attrs);
                        continue;
                    }
                    let w = match closest {
                        Some(clamped) if settings.interpolate_clamped => clamped,
                        _ => coord,
                    };
                    blend(face, kind, &w, &mut attrs);
                }
                updates.push((c, attrs));
            }
        }
        for (c, attrs) in updates {
            mesh.face_mut(c.face).attributes[c.corner] = attrs;
        }
    }

    /// Topology edit: drop the faces spanning the edge, move the rest of the
    /// fan of `v0` onto `v1`, and delete `v0`.
    fn collapse_topology(&self, mesh: &mut Mesh, new_pos: Point3f) -> Result<SmallVec<[FaceId; 2]>> {
        let mut deleted = SmallVec::new();
        let mut moved: SmallVec<[Corner; 16]> = SmallVec::new();
        for c in mesh.collect_fan(self.v0) {
            if mesh.face(c.face).contains(self.v1) {
                mesh.detach(Corner::new(c.face, (c.corner + 1) % 3))?;
                mesh.detach(Corner::new(c.face, (c.corner + 2) % 3))?;
                mesh.delete_face(c.face);
                deleted.push(c.face);
            } else {
                moved.push(c);
            }
        }
        for c in moved {
            mesh.attach(c, self.v1);
        }
        mesh.delete_vertex(self.v0);
        mesh.vertex_mut(self.v1).position = new_pos;
        Ok(deleted)
    }
}

fn finite_or_inf(priority: f32) -> f32 {
    if priority.is_nan() {
        f32::INFINITY
    } else {
        priority
    }
}

fn geometric_part(x: &DVector<f64>) -> [f64; 3] {
    [x[0], x[1], x[2]]
}

/// Number of evenly spaced intervals sampled along the edge
fn sample_intervals(params: &EdgeCollapseParams) -> usize {
    if params.optimal_placement {
        params.optimal_sample_count.max(1) as usize + 1
    } else {
        1
    }
}

/// Quadric minimizer, or the best evenly spaced sample between `e0` and
/// `e1` when the system is singular
fn compute_minimal(e0: &DVector<f64>, e1: &DVector<f64>, q: &Quadric, params: &EdgeCollapseParams) -> DVector<f64> {
    if params.optimal_placement {
        if let Some(x) = q.minimize() {
            return x;
        }
    }
    let steps = sample_intervals(params);
    let mut best = e0.clone();
    let mut best_error = f64::MAX;
    for k in 0..=steps {
        let t = k as f64 / steps as f64;
        let x = e0 * (1.0 - t) + e1 * t;
        let error = q.apply(&x);
        if error < best_error {
            best_error = error;
            best = x;
        }
    }
    best
}

/// Like [`compute_minimal`] with the position pinned to `geo`
fn compute_minimal_at(
    e0: &DVector<f64>,
    e1: &DVector<f64>,
    q: &Quadric,
    geo: &[f64; 3],
    params: &EdgeCollapseParams,
) -> DVector<f64> {
    if params.optimal_placement {
        if let Some(x) = q.minimize_with_geometric_constraint(geo) {
            return x;
        }
    }
    let steps = sample_intervals(params);
    let mut best: Option<(f64, DVector<f64>)> = None;
    for k in 0..=steps {
        let t = k as f64 / steps as f64;
        let mut x = e0 * (1.0 - t) + e1 * t;
        x[0] = geo[0];
        x[1] = geo[1];
        x[2] = geo[2];
        let error = q.apply(&x);
        if best.as_ref().map_or(true, |(e, _)| error < *e) {
            best = Some((error, x));
        }
    }
    best.map(|(_, x)| x).unwrap_or_else(|| e0.clone())
}

/// Attribute coordinates of a solved point, rounded through the corner
/// representation so that the key matches what the corners store
fn solved_key(layout: &AttributeLayout, x: &DVector<f64>) -> AttributeVector {
    let values: SmallVec<[f32; 16]> = x.iter().skip(3).map(|&v| v as f32).collect();
    let mut attrs = CornerAttributes::default();
    layout.unpack(&values, &mut attrs);
    layout.pack(&attrs)
}

/// Distinct values of one attribute kind among the keyed quadrics of a
/// vertex. With a sampler, values sharing a sampled key count once while
/// they stay within the squared distance threshold of each other.
fn distinct_values(list: &[(AttributeVector, Quadric)], slot: &AttributeSlot, settings: &AttributeSettings) -> usize {
    if slot.kind == AttributeKind::BoneWeight {
        let set: HashSet<[u32; 8]> = list
            .iter()
            .map(|(k, _)| {
                let mut bits = [0u32; 8];
                for (b, v) in bits.iter_mut().zip(&k.as_slice()[slot.offset..slot.offset + 8]) {
                    *b = v.to_bits();
                }
                bits
            })
            .collect();
        return set.len();
    }

    let values = list.iter().map(|(k, _)| k.segment4(slot.offset, slot.len));
    if settings.sampler.is_none() {
        let mut seen: SmallVec<[Vector4f; 4]> = SmallVec::new();
        for v in values {
            if !seen.contains(&v) {
                seen.push(v);
            }
        }
        return seen.len();
    }

    let mut groups: SmallVec<[(Vector4f, SmallVec<[Vector4f; 2]>); 4]> = SmallVec::new();
    for v in values {
        let key = settings.sample(v);
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, members)) => {
                let close = members
                    .iter()
                    .any(|m| (m - v).norm_squared() < settings.sqr_distance_threshold);
                if !close {
                    members.push(v);
                }
            }
            None => groups.push((key, smallvec![v])),
        }
    }
    groups.iter().map(|(_, members)| members.len()).sum()
}

fn is_outside(coord: &Vector3f) -> bool {
    // NaN coordinates from degenerate faces count as outside
    coord.iter().any(|c| !(*c >= 0.0))
}

fn same_value(kind: AttributeKind, a: &CornerAttributes, b: &CornerAttributes, settings: &AttributeSettings) -> bool {
    match kind {
        AttributeKind::BoneWeight => a.bone_weight == b.bone_weight,
        _ => (a.value4(kind) - b.value4(kind)).norm_squared() < settings.sqr_distance_threshold,
    }
}

/// Barycentric blend of one attribute kind of `face` into `out`
fn blend(face: &Face, kind: AttributeKind, w: &Vector3f, out: &mut CornerAttributes) {
    let [a, b, c] = &face.attributes;
    match kind {
        AttributeKind::Normal => {
            let n = a.normal * w.x + b.normal * w.y + c.normal * w.z;
            out.normal = n.try_normalize(1e-5).unwrap_or_else(Vector3f::zeros);
        }
        AttributeKind::Tangent => {
            out.tangent = normalize_tangent(&(a.tangent * w.x + b.tangent * w.y + c.tangent * w.z));
        }
        AttributeKind::Color => {
            out.color = a.color * w.x + b.color * w.y + c.color * w.z;
        }
        AttributeKind::Uv(ch) => {
            let ch = ch as usize;
            out.uvs[ch] = a.uvs[ch] * w.x + b.uvs[ch] * w.y + c.uvs[ch] * w.z;
        }
        AttributeKind::BoneWeight => {
            out.bone_weight = blend_bone_weights([&a.bone_weight, &b.bone_weight, &c.bone_weight], w);
        }
    }
}

/// Merge bone influences per bone index, keep the four heaviest and
/// renormalize them. Bones whose merged influence is not positive are
/// dropped; if none remain, the corner with the largest weight in `w` wins.
fn blend_bone_weights(weights: [&BoneWeight; 3], w: &Vector3f) -> BoneWeight {
    let mut bones: SmallVec<[(u32, f32); 12]> = SmallVec::new();
    for (bw, t) in weights.iter().zip(w.iter()) {
        for k in 0..4 {
            let value = bw.weights[k] * t;
            if value == 0.0 {
                continue;
            }
            match bones.iter_mut().find(|(i, _)| *i == bw.indices[k]) {
                Some(entry) => entry.1 += value,
                None => bones.push((bw.indices[k], value)),
            }
        }
    }
    bones.retain(|(_, v)| *v > 0.0);
    bones.sort_by(|a, b| b.1.total_cmp(&a.1));
    bones.truncate(4);

    let total: f32 = bones.iter().map(|(_, v)| v).sum();
    if total <= f32::EPSILON {
        let nearest = (0..3).max_by(|&i, &j| w[i].total_cmp(&w[j])).unwrap_or(0);
        return *weights[nearest];
    }
    let mut out = BoneWeight::default();
    for (k, (index, value)) in bones.into_iter().enumerate() {
        out.indices[k] = index;
        out.weights[k] = value / total;
    }
    out
}
