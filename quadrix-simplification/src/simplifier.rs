//! Greedy edge-collapse decimation
//!
//! [`Decimator`] owns one simplification session: the arena mesh, the vertex
//! quadrics, the candidate heap and the optional spatial index. Candidates
//! are invalidated lazily through vertex marks; a popped candidate whose
//! endpoints were touched after it was queued is simply dropped.
//!
//! [`EdgeCollapseSimplifier`] wraps a session behind the [`MeshSimplifier`]
//! trait.

use crate::attributes::AttributeLayout;
use crate::collapse::{CollapseContext, EdgeCollapse};
use crate::geometry::segment_triangle_intersection;
use crate::heap::BinaryHeap;
use crate::link::LinkScratch;
use crate::mesh::{FaceId, Mesh, VertexId};
use crate::params::{EdgeCollapseParams, TargetConditions};
use crate::spatial::{FaceRTree, SpatialIndex};
use crate::vertex_quadrics::QuadricStore;
use crate::MeshSimplifier;
use quadrix_core::{Error, Point3f, Result, TriangleMesh};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

/// Heap capacity per initial face
const HEAP_RATIO: usize = 4;

/// Executed collapses between two progress lines
const PRINT_FREQUENCY: usize = 200;

/// Why [`Decimator::run`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    FaceCount,
    VertexCount,
    MaxOperations,
    /// The cheapest remaining collapse costs more than the allowed error
    MaxError,
    MaxDuration,
    /// No candidate left to try
    QueueExhausted,
    /// A collapse found the adjacency broken; the mesh is kept as is
    Failed,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StopReason::FaceCount => "face count reached",
            StopReason::VertexCount => "vertex count reached",
            StopReason::MaxOperations => "operation limit reached",
            StopReason::MaxError => "error limit reached",
            StopReason::MaxDuration => "time limit reached",
            StopReason::QueueExhausted => "no collapsible edge left",
            StopReason::Failed => "collapse failed",
        };
        f.write_str(s)
    }
}

/// Summary of a [`Decimator::run`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecimationReport {
    pub initial_vertices: usize,
    pub initial_faces: usize,
    pub final_vertices: usize,
    pub final_faces: usize,
    /// Collapses performed
    pub executed: usize,
    /// Collapses rejected by the self-intersection guard
    pub aborted: usize,
    /// Popped candidates outdated by an earlier collapse
    pub stale: usize,
    /// Popped candidates failing the link condition
    pub infeasible: usize,
    /// Priority of the last candidate considered for execution
    pub last_error: f32,
    pub elapsed: Duration,
    pub stop_reason: StopReason,
}

/// One decimation session over a mesh
pub struct Decimator<S: SpatialIndex = FaceRTree> {
    source: TriangleMesh,
    mesh: Mesh,
    quadrics: QuadricStore,
    layout: AttributeLayout,
    params: EdgeCollapseParams,
    targets: TargetConditions,
    heap: BinaryHeap<f32, EdgeCollapse>,
    index: S,
    scratch: LinkScratch,
    global_mark: u64,
    initial_vertices: usize,
    initial_faces: usize,
    operations: usize,
    current_error: f32,
    elapsed: Duration,
    modified: bool,
}

impl Decimator<FaceRTree> {
    /// Prepare a session using the R*-tree face index
    pub fn new(mesh: &TriangleMesh, params: EdgeCollapseParams, targets: TargetConditions) -> Result<Self> {
        Self::with_index(mesh, params, targets, FaceRTree::new())
    }
}

impl<S: SpatialIndex> Decimator<S> {
    /// Prepare a session with a caller-supplied, empty spatial index.
    ///
    /// Welds the input, builds adjacency and border flags, locks border
    /// vertices if requested, accumulates the quadrics and queues one
    /// candidate per collapsible edge.
    pub fn with_index(
        mesh: &TriangleMesh,
        params: EdgeCollapseParams,
        targets: TargetConditions,
        index: S,
    ) -> Result<Self> {
        let start = Instant::now();
        let mut work = Mesh::from_triangle_mesh(mesh)?;
        let params = params.normalized(work.present_attributes());
        let layout = AttributeLayout::new(params.used_attributes, work.uv_sizes());

        work.build_vertex_face();
        work.build_face_border();
        if params.preserve_boundary {
            let locked = work.lock_border_vertices();
            log::debug!("Locked {} border vertices", locked);
        }

        let quadrics = QuadricStore::from_mesh(&work, &layout, params.quality_quadric, params.boundary_weight);
        let capacity = HEAP_RATIO * work.face_count();

        let mut decimator = Self {
            source: mesh.clone(),
            initial_vertices: work.vertex_count(),
            initial_faces: work.face_count(),
            mesh: work,
            quadrics,
            layout,
            params,
            targets,
            heap: BinaryHeap::new(capacity, f32::NEG_INFINITY, f32::INFINITY),
            index,
            scratch: LinkScratch::new(),
            global_mark: 0,
            operations: 0,
            current_error: 0.0,
            elapsed: Duration::ZERO,
            modified: false,
        };
        decimator.init_collapses();
        if decimator.params.prevent_intersection {
            let faces: Vec<FaceId> = decimator.mesh.face_ids().collect();
            for f in faces {
                decimator.index.insert(&decimator.mesh, f);
            }
        }

        log::debug!(
            "Decimator ready: {} vertices, {} faces, quadric dim {}, {} candidates (capacity {}), took {:?}",
            decimator.initial_vertices,
            decimator.initial_faces,
            decimator.layout.quadric_dim(),
            decimator.heap.len(),
            decimator.heap.capacity(),
            start.elapsed()
        );
        Ok(decimator)
    }

    /// Queue every edge once, removing the lower vertex id
    fn init_collapses(&mut self) {
        let ctx = CollapseContext {
            params: &self.params,
            layout: &self.layout,
        };
        for vi in 0..self.mesh.vertex_capacity() {
            let v = VertexId(vi);
            let vertex = self.mesh.vertex(v);
            if vertex.is_deleted() || !vertex.is_writable() {
                continue;
            }
            self.mesh.clear_visited_ring(v);
            for c in self.mesh.collect_fan(v) {
                for n in [self.mesh.corner_vertex(c, 1), self.mesh.corner_vertex(c, 2)] {
                    let far = self.mesh.vertex(n);
                    if v < n && far.is_writable() && !far.is_visited() {
                        self.mesh.vertex_mut(n).set_visited(true);
                        let collapse =
                            EdgeCollapse::evaluate(v, n, self.global_mark, &self.mesh, &self.quadrics, ctx);
                        self.heap.enqueue(collapse.priority(), collapse);
                    }
                }
            }
        }
    }

    /// Invalidate candidates around `v` and queue its current edges
    fn update_heap(&mut self, v: VertexId) {
        self.global_mark += 1;
        self.mesh.vertex_mut(v).mark = self.global_mark;
        self.mesh.clear_visited_ring(v);

        let fan = self.mesh.collect_fan(v);
        self.reserve(2 * fan.len());

        let ctx = CollapseContext {
            params: &self.params,
            layout: &self.layout,
        };
        for c in fan {
            for n in [self.mesh.corner_vertex(c, 1), self.mesh.corner_vertex(c, 2)] {
                let far = self.mesh.vertex(n);
                if far.is_writable() && !far.is_visited() {
                    self.mesh.vertex_mut(n).set_visited(true);
                    let collapse =
                        EdgeCollapse::evaluate(v, n, self.global_mark, &self.mesh, &self.quadrics, ctx);
                    self.heap.enqueue(collapse.priority(), collapse);
                }
            }
        }
    }

    /// Drop outdated candidates when `needed` more would not fit
    fn reserve(&mut self, needed: usize) {
        if self.heap.len() + needed <= self.heap.capacity() {
            return;
        }
        let before = self.heap.len();
        let mesh = &self.mesh;
        self.heap.retain(|_, c| c.is_up_to_date(mesh));
        log::warn!(
            "Heap compacted from {} to {} candidates (capacity {})",
            before,
            self.heap.len(),
            self.heap.capacity()
        );
    }

    /// Target condition met before the next pop, if any
    fn goal_reached(&self, elapsed: Duration) -> Option<StopReason> {
        let t = &self.targets;
        if t.face_count.is_some_and(|n| self.mesh.face_count() <= n) {
            return Some(StopReason::FaceCount);
        }
        if t.vertex_count.is_some_and(|n| self.mesh.vertex_count() <= n) {
            return Some(StopReason::VertexCount);
        }
        if t.max_operations.is_some_and(|n| self.operations > n) {
            return Some(StopReason::MaxOperations);
        }
        if t.max_error.is_some_and(|e| self.current_error > e) {
            return Some(StopReason::MaxError);
        }
        if t.max_duration.is_some_and(|d| elapsed > d) {
            return Some(StopReason::MaxDuration);
        }
        None
    }

    /// Collapse edges, cheapest first, until a target is met or no candidate
    /// is left.
    ///
    /// May be called again after changing the targets; counters and the
    /// elapsed time carry over.
    pub fn run(&mut self) -> DecimationReport {
        let start = Instant::now();
        let (mut aborted, mut stale, mut infeasible) = (0, 0, 0);
        let executed_before = self.operations;

        let stop_reason = loop {
            if let Some(reason) = self.goal_reached(self.elapsed + start.elapsed()) {
                break reason;
            }
            let Some((priority, collapse)) = self.heap.dequeue() else {
                break StopReason::QueueExhausted;
            };
            if !collapse.is_up_to_date(&self.mesh) {
                stale += 1;
                continue;
            }
            if !collapse.is_feasible(&self.mesh, &mut self.scratch) {
                infeasible += 1;
                continue;
            }

            self.current_error = priority;
            if self.targets.max_error.is_some_and(|e| priority > e) {
                break StopReason::MaxError;
            }

            let ctx = CollapseContext {
                params: &self.params,
                layout: &self.layout,
            };
            match collapse.execute(&mut self.mesh, &mut self.quadrics, &mut self.index, ctx) {
                Ok(true) => {
                    self.operations += 1;
                    self.modified = true;
                    self.update_heap(collapse.v1);
                    if self.operations % PRINT_FREQUENCY == 0 {
                        log::info!("{}", self.status());
                    }
                }
                Ok(false) => aborted += 1,
                Err(e) => {
                    log::error!(
                        "Collapse of {} into {} failed: {}",
                        collapse.v0.index(),
                        collapse.v1.index(),
                        e
                    );
                    break StopReason::Failed;
                }
            }
        };
        self.elapsed += start.elapsed();

        let report = DecimationReport {
            initial_vertices: self.initial_vertices,
            initial_faces: self.initial_faces,
            final_vertices: self.mesh.vertex_count(),
            final_faces: self.mesh.face_count(),
            executed: self.operations - executed_before,
            aborted,
            stale,
            infeasible,
            last_error: self.current_error,
            elapsed: self.elapsed,
            stop_reason,
        };
        log::debug!(
            "Decimation stopped ({}): {} -> {} faces, {} collapses, {} aborted, {} stale, {} infeasible in {:?}",
            stop_reason,
            report.initial_faces,
            report.final_faces,
            report.executed,
            aborted,
            stale,
            infeasible,
            report.elapsed
        );
        report
    }

    /// Fraction of the way to the nearest configured target, in `[0, 1]`
    pub fn progress(&self) -> f32 {
        fn toward(initial: usize, current: usize, target: usize) -> f32 {
            if initial <= target {
                1.0
            } else {
                initial.saturating_sub(current) as f32 / (initial - target) as f32
            }
        }

        let t = &self.targets;
        let candidates = [
            t.face_count
                .map(|n| toward(self.initial_faces, self.mesh.face_count(), n)),
            t.vertex_count
                .map(|n| toward(self.initial_vertices, self.mesh.vertex_count(), n)),
            t.max_operations
                .map(|n| if n == 0 { 1.0 } else { self.operations as f32 / n as f32 }),
            t.max_error
                .map(|e| if e > 0.0 { self.current_error / e } else { 1.0 }),
            t.max_duration
                .map(|d| self.elapsed.as_secs_f32() / d.as_secs_f32().max(f32::EPSILON)),
        ];
        candidates
            .into_iter()
            .flatten()
            .fold(0.0f32, f32::max)
            .clamp(0.0, 1.0)
    }

    /// One-line summary of the current state
    pub fn status(&self) -> String {
        format!(
            "vert: {} face: {} index: {} heap: {} error: {:e}",
            self.mesh.vertex_count(),
            self.mesh.face_count(),
            self.index.len(),
            self.heap.len(),
            self.current_error
        )
    }

    /// Face crossed by the segment whose centroid is closest to `start`
    pub fn pick_face(&self, start: &Point3f, end: &Point3f) -> Option<FaceId> {
        let candidates: Vec<FaceId> = if self.index.is_empty() {
            self.mesh.face_ids().collect()
        } else {
            let mut hits = Vec::new();
            self.index.query(|bounds| bounds.intersects_segment(start, end), &mut hits);
            hits
        };

        candidates
            .into_iter()
            .filter(|&f| !self.mesh.face(f).is_deleted())
            .filter_map(|f| {
                let [a, b, c] = self.mesh.face_positions(f);
                segment_triangle_intersection(start, end, &a, &b, &c)?;
                let centroid = Point3f::from((a.coords + b.coords + c.coords) / 3.0);
                Some((f, (centroid - start).norm_squared()))
            })
            .min_by(|x, y| x.1.total_cmp(&y.1))
            .map(|(f, _)| f)
    }

    /// Valid queued candidates lying on an edge of `face`, cheapest first
    pub fn pending_collapses(&self, face: FaceId) -> Vec<EdgeCollapse> {
        let f = self.mesh.face(face);
        let mut out: Vec<EdgeCollapse> = self
            .heap
            .iter()
            .map(|(_, c)| *c)
            .filter(|c| f.contains(c.v0) && f.contains(c.v1) && c.is_up_to_date(&self.mesh))
            .collect();
        out.sort_by(|a, b| a.priority().total_cmp(&b.priority()));
        out
    }

    /// Replace corner normals with smoothed per-vertex normals
    pub fn recalculate_smooth_normals(&mut self) {
        self.mesh.recalculate_smooth_normals();
        self.modified = true;
    }

    /// Export the current mesh. The input is returned untouched when nothing
    /// was changed.
    pub fn to_triangle_mesh(&self) -> TriangleMesh {
        if self.modified {
            self.mesh.to_triangle_mesh()
        } else {
            self.source.clone()
        }
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    pub fn quadrics(&self) -> &QuadricStore {
        &self.quadrics
    }

    pub fn params(&self) -> &EdgeCollapseParams {
        &self.params
    }

    pub fn targets(&self) -> &TargetConditions {
        &self.targets
    }

    pub fn set_targets(&mut self, targets: TargetConditions) {
        self.targets = targets;
    }

    /// Collapses executed so far
    pub fn operations(&self) -> usize {
        self.operations
    }

    pub fn current_error(&self) -> f32 {
        self.current_error
    }

    pub fn heap_len(&self) -> usize {
        self.heap.len()
    }

    pub fn index(&self) -> &S {
        &self.index
    }
}

/// Quadric edge-collapse simplifier
///
/// Collapses the cheapest edge under an attribute-aware quadric error metric
/// until the target is met, keeping the surface a 2-manifold.
#[derive(Debug, Clone, Default)]
pub struct EdgeCollapseSimplifier {
    pub params: EdgeCollapseParams,
}

impl EdgeCollapseSimplifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_params(params: EdgeCollapseParams) -> Self {
        Self { params }
    }

    /// Simplify until any of `targets` holds
    pub fn simplify_with_targets(
        &self,
        mesh: &TriangleMesh,
        targets: TargetConditions,
    ) -> Result<(TriangleMesh, DecimationReport)> {
        let mut decimator = Decimator::new(mesh, self.params.clone(), targets)?;
        let report = decimator.run();
        Ok((decimator.to_triangle_mesh(), report))
    }
}

impl MeshSimplifier for EdgeCollapseSimplifier {
    fn simplify(&self, mesh: &TriangleMesh, reduction_ratio: f32) -> Result<TriangleMesh> {
        if mesh.is_empty() {
            return Err(Error::InvalidData("Mesh is empty".to_string()));
        }
        if !(0.0..=1.0).contains(&reduction_ratio) {
            return Err(Error::InvalidParameter(
                "Reduction ratio must be between 0.0 and 1.0".to_string(),
            ));
        }
        if reduction_ratio == 0.0 {
            return Ok(mesh.clone());
        }

        let target = ((1.0 - reduction_ratio) * mesh.face_count() as f32) as usize;
        let (result, _) = self.simplify_with_targets(mesh, TargetConditions::faces(target))?;
        Ok(result)
    }
}
