//! Attribute-augmented quadric error metric
//!
//! A quadric of dimension `n` encodes `E(x) = xᵀAx + 2bᵀx + c` over vectors
//! whose first three coordinates are a position and whose remaining
//! coordinates are packed vertex attributes. The error measures squared
//! distance to the affine plane spanned by a triangle in that space.

use crate::attributes::AttributeVector;
use crate::geometry::triangle_quality;
use nalgebra::{DMatrix, DVector};
use quadrix_core::{Point3f, Vector3f};
use std::ops::{Add, AddAssign};

const NORM_EPSILON: f64 = 1e-12;
const OFFSET_TOLERANCE: f64 = 1e-9;
const SINGULAR_TOLERANCE: f64 = 1e-10;

/// Scale applied to shape-regularizing walls on interior edges
const QUALITY_WALL_WEIGHT: f64 = 0.05;

/// Symmetric quadric `(A, b, c)`
#[derive(Debug, Clone, PartialEq)]
pub struct Quadric {
    a: DMatrix<f64>,
    b: DVector<f64>,
    c: f64,
}

impl Quadric {
    /// Zero quadric of dimension `n`
    pub fn zero(n: usize) -> Self {
        Self {
            a: DMatrix::zeros(n, n),
            b: DVector::zeros(n),
            c: 0.0,
        }
    }

    pub fn dim(&self) -> usize {
        self.b.len()
    }

    pub fn a(&self) -> &DMatrix<f64> {
        &self.a
    }

    pub fn b(&self) -> &DVector<f64> {
        &self.b
    }

    pub fn c(&self) -> f64 {
        self.c
    }

    /// Quadric of the plane through three points.
    ///
    /// The plane frame is built by Gram-Schmidt from `p`. When the frame is
    /// numerically unusable the vertex order is permuted; if no order works
    /// the zero quadric is returned.
    pub fn from_points(p: &DVector<f64>, q: &DVector<f64>, r: &DVector<f64>) -> Self {
        debug_assert!(p.len() == q.len() && q.len() == r.len());

        let mut pts = [p, q, r];
        let mut best = f64::INFINITY;
        // Swaps visiting all six orderings
        const SWAPS: [Option<(usize, usize)>; 6] = [
            None,
            Some((1, 2)),
            Some((0, 2)),
            Some((1, 2)),
            Some((0, 2)),
            Some((1, 2)),
        ];
        for swap in SWAPS {
            if let Some((i, j)) = swap {
                pts.swap(i, j);
            }
            match Self::try_from_points(pts[0], pts[1], pts[2]) {
                Ok(quadric) => return quadric,
                Err(residual) => best = best.min(residual),
            }
        }

        log::trace!(
            "Degenerate plane frame in dimension {} (best residual {:e}), using zero quadric",
            p.len(),
            best
        );
        Self::zero(p.len())
    }

    /// Build from one vertex ordering; on failure returns the offending
    /// residual (infinite when the frame itself is degenerate).
    fn try_from_points(
        p: &DVector<f64>,
        q: &DVector<f64>,
        r: &DVector<f64>,
    ) -> std::result::Result<Self, f64> {
        let n = p.len();
        let d1 = q - p;
        let n1 = d1.norm();
        if !(n1 > NORM_EPSILON) {
            return Err(f64::INFINITY);
        }
        let e1 = d1 / n1;

        let dr = r - p;
        let d2 = &dr - &e1 * e1.dot(&dr);
        let n2 = d2.norm();
        if !(n2 > NORM_EPSILON) {
            return Err(f64::INFINITY);
        }
        let e2 = d2 / n2;

        let a = DMatrix::identity(n, n) - &e1 * e1.transpose() - &e2 * e2.transpose();
        let pe1 = p.dot(&e1);
        let pe2 = p.dot(&e2);
        let b = &e1 * pe1 + &e2 * pe2 - p;
        let c = p.dot(p) - pe1 * pe1 - pe2 * pe2;

        if !c.is_finite() || c < -OFFSET_TOLERANCE * (1.0 + p.norm_squared()) {
            return Err(if c.is_finite() { -c } else { f64::INFINITY });
        }
        Ok(Self { a, b, c: c.max(0.0) })
    }

    /// Add the geometric 3x3 part of this quadric into `q3`
    pub fn add_to_q3(&self, q3: &mut Quadric) {
        debug_assert_eq!(q3.dim(), 3);
        q3.a += self.a.view((0, 0), (3, 3));
        q3.b += self.b.rows(0, 3);
        q3.c += self.c;
    }

    /// Add a geometric quadric `q3` plus an identity penalty pulling the
    /// attribute coordinates toward `props`.
    pub fn sum3(&mut self, q3: &Quadric, props: &[f32]) {
        debug_assert_eq!(q3.dim(), 3);
        debug_assert_eq!(props.len() + 3, self.dim());

        let mut block = self.a.view_mut((0, 0), (3, 3));
        block += &q3.a;
        for i in 3..self.dim() {
            self.a[(i, i)] += 1.0;
        }

        for i in 0..3 {
            self.b[i] += q3.b[i];
        }
        let mut sq = 0.0;
        for (i, &v) in props.iter().enumerate() {
            let v = v as f64;
            self.b[i + 3] -= v;
            sq += v * v;
        }
        self.c += q3.c + sq;
    }

    pub fn scale(&mut self, s: f64) {
        self.a *= s;
        self.b *= s;
        self.c *= s;
    }

    /// Evaluate the error at `x`
    pub fn apply(&self, x: &DVector<f64>) -> f64 {
        (&self.a * x).dot(x) + 2.0 * self.b.dot(x) + self.c
    }

    /// Unconstrained minimizer `-A⁻¹b`, or `None` when `A` is singular
    pub fn minimize(&self) -> Option<DVector<f64>> {
        solve(&self.a, &(-&self.b))
    }

    /// Minimizer with the position fixed to `geo`; only the attribute
    /// coordinates are solved for.
    pub fn minimize_with_geometric_constraint(&self, geo: &[f64; 3]) -> Option<DVector<f64>> {
        let n = self.dim();
        let k = n - 3;
        let mut x = DVector::zeros(n);
        x[0] = geo[0];
        x[1] = geo[1];
        x[2] = geo[2];
        if k == 0 {
            return Some(x);
        }

        let m = self.a.view((3, 3), (k, k)).into_owned();
        let mut r = DVector::zeros(k);
        for i in 0..k {
            r[i] = self.b[i + 3]
                + self.a[(i + 3, 0)] * geo[0]
                + self.a[(i + 3, 1)] * geo[1]
                + self.a[(i + 3, 2)] * geo[2];
        }

        let attrs = solve(&m, &(-r))?;
        x.rows_mut(3, k).copy_from(&attrs);
        Some(x)
    }
}

/// LU solve with a scale-relative singularity test
fn solve(m: &DMatrix<f64>, rhs: &DVector<f64>) -> Option<DVector<f64>> {
    let n = m.nrows();
    let scale = m.amax();
    if scale == 0.0 || !scale.is_finite() {
        return None;
    }
    let lu = m.clone().lu();
    let det = lu.determinant();
    if !det.is_finite() || det.abs() <= SINGULAR_TOLERANCE * scale.powi(n as i32) {
        return None;
    }
    let x = lu.solve(rhs)?;
    x.iter().all(|v| v.is_finite()).then_some(x)
}

impl AddAssign<&Quadric> for Quadric {
    fn add_assign(&mut self, rhs: &Quadric) {
        self.a += &rhs.a;
        self.b += &rhs.b;
        self.c += rhs.c;
    }
}

impl AddAssign for Quadric {
    fn add_assign(&mut self, rhs: Quadric) {
        *self += &rhs;
    }
}

impl Add<&Quadric> for Quadric {
    type Output = Quadric;

    fn add(mut self, rhs: &Quadric) -> Quadric {
        self += rhs;
        self
    }
}

impl Add for Quadric {
    type Output = Quadric;

    fn add(mut self, rhs: Quadric) -> Quadric {
        self += &rhs;
        self
    }
}

/// Concatenate a position and packed attributes into a quadric-space point
pub fn stack_point(position: &Point3f, attrs: &[f32]) -> DVector<f64> {
    let mut v = DVector::zeros(3 + attrs.len());
    v[0] = position.x as f64;
    v[1] = position.y as f64;
    v[2] = position.z as f64;
    for (i, &a) in attrs.iter().enumerate() {
        v[3 + i] = a as f64;
    }
    v
}

/// Inputs for building the quadric of one face
#[derive(Debug, Clone)]
pub struct FaceQuadricInput {
    pub positions: [Point3f; 3],
    pub attributes: [AttributeVector; 3],
    /// Normal cached at load time
    pub normal: Vector3f,
    /// Border flag per edge `(i, i + 1)`
    pub border: [bool; 3],
}

/// Quadrics contributed by one face
#[derive(Debug, Clone)]
pub struct FaceQuadrics {
    /// Pure-geometry quadric to accumulate on each corner vertex; absent for
    /// zero-quality faces
    pub geometric: Option<Quadric>,
    /// Full-dimension quadric including boundary walls
    pub full: Quadric,
}

/// Build the quadrics of one face.
///
/// Border edges (and every edge when `quality_quadric` is set) get a wall: a
/// virtual triangle standing on the edge, perpendicular to the face, scaled
/// by `boundary_weight` on borders and by a small constant otherwise.
pub fn face_quadrics(face: &FaceQuadricInput, quality_quadric: bool, boundary_weight: f64) -> FaceQuadrics {
    let [p0, p1, p2] = &face.positions;
    let dim = face.attributes[0].len();
    let point = |pos: &Point3f, attrs: &AttributeVector| stack_point(pos, attrs.as_slice());

    if triangle_quality(p0, p1, p2) > 0.0 {
        let zeros = vec![0.0f32; dim];
        let geo = Quadric::from_points(
            &stack_point(p0, &zeros),
            &stack_point(p1, &zeros),
            &stack_point(p2, &zeros),
        );
        let mut q3 = Quadric::zero(3);
        geo.add_to_q3(&mut q3);

        let corners: [DVector<f64>; 3] = [
            point(p0, &face.attributes[0]),
            point(p1, &face.attributes[1]),
            point(p2, &face.attributes[2]),
        ];
        let mut full = Quadric::from_points(&corners[0], &corners[1], &corners[2]);

        for i in 0..3 {
            if !(face.border[i] || quality_quadric) {
                continue;
            }
            let a = &face.positions[i];
            let b = &face.positions[(i + 1) % 3];
            let wall_pos = nalgebra::center(a, b) + face.normal * (a - b).norm();
            let mut wall_attr = AttributeVector::zeros(dim);
            for (k, v) in wall_attr.as_mut_slice().iter_mut().enumerate() {
                *v = (face.attributes[i].as_slice()[k] + face.attributes[(i + 1) % 3].as_slice()[k]) * 0.5;
            }

            let mut pts = corners.clone();
            pts[(i + 2) % 3] = point(&wall_pos, &wall_attr);
            let mut wall = Quadric::from_points(&pts[0], &pts[1], &pts[2]);
            wall.scale(if face.border[i] {
                boundary_weight
            } else {
                QUALITY_WALL_WEIGHT
            });
            full += &wall;
        }

        FaceQuadrics {
            geometric: Some(q3),
            full,
        }
    } else {
        let [a0, a1, a2] = &face.attributes;
        let a = a0.distance(a1);
        let b = a1.distance(a2);
        let c = a2.distance(a0);
        let collinear = a + b == c || a + c == b || b + c == a;
        let full = if collinear {
            Quadric::zero(3 + dim)
        } else {
            Quadric::from_points(&point(p0, a0), &point(p1, a1), &point(p2, a2))
        };
        FaceQuadrics {
            geometric: None,
            full,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn v(values: &[f64]) -> DVector<f64> {
        DVector::from_column_slice(values)
    }

    fn plane_z(h: f64) -> Quadric {
        Quadric::from_points(&v(&[0.0, 0.0, h]), &v(&[1.0, 0.0, h]), &v(&[0.0, 1.0, h]))
    }

    // ---- construction ----

    #[test]
    fn test_plane_distance() {
        let q = plane_z(1.0);
        assert_relative_eq!(q.apply(&v(&[5.0, -3.0, 1.0])), 0.0, epsilon = 1e-9);
        assert_relative_eq!(q.apply(&v(&[0.0, 0.0, 3.0])), 4.0, epsilon = 1e-9);
        assert!(q.c() >= 0.0);
    }

    #[test]
    fn test_degenerate_points_give_zero() {
        let p = v(&[1.0, 1.0, 1.0]);
        let q = Quadric::from_points(&p, &p, &v(&[2.0, 2.0, 2.0]));
        // Permutation finds a usable frame only if the points are not collinear
        let collinear = Quadric::from_points(&p, &v(&[2.0, 2.0, 2.0]), &v(&[3.0, 3.0, 3.0]));
        assert_eq!(q, Quadric::zero(3));
        assert_eq!(collinear, Quadric::zero(3));
    }

    #[test]
    fn test_attribute_plane() {
        // Attribute varies linearly with x: a = x
        let q = Quadric::from_points(
            &v(&[0.0, 0.0, 0.0, 0.0]),
            &v(&[1.0, 0.0, 0.0, 1.0]),
            &v(&[0.0, 1.0, 0.0, 0.0]),
        );
        assert_relative_eq!(q.apply(&v(&[0.5, 0.5, 0.0, 0.5])), 0.0, epsilon = 1e-9);
        assert!(q.apply(&v(&[0.5, 0.5, 0.0, 0.9])) > 1e-3);
    }

    // ---- arithmetic ----

    #[test]
    fn test_add_and_scale() {
        let mut q = plane_z(0.0) + plane_z(1.0);
        let x = v(&[0.0, 0.0, 2.0]);
        assert_relative_eq!(q.apply(&x), 4.0 + 1.0, epsilon = 1e-9);
        q.scale(2.0);
        assert_relative_eq!(q.apply(&x), 10.0, epsilon = 1e-9);
    }

    #[test]
    fn test_add_to_q3() {
        let q = Quadric::from_points(
            &v(&[0.0, 0.0, 1.0, 0.0]),
            &v(&[1.0, 0.0, 1.0, 0.0]),
            &v(&[0.0, 1.0, 1.0, 0.0]),
        );
        let mut q3 = Quadric::zero(3);
        q.add_to_q3(&mut q3);
        assert_relative_eq!(q3.apply(&v(&[0.0, 0.0, 3.0])), 4.0, epsilon = 1e-9);
    }

    #[test]
    fn test_sum3_pulls_attributes() {
        let mut q = Quadric::zero(5);
        q.sum3(&plane_z(0.0), &[0.25, 0.75]);
        assert_relative_eq!(q.apply(&v(&[9.0, 9.0, 0.0, 0.25, 0.75])), 0.0, epsilon = 1e-9);
        assert_relative_eq!(q.apply(&v(&[0.0, 0.0, 1.0, 1.25, 0.75])), 2.0, epsilon = 1e-9);
    }

    // ---- minimization ----

    #[test]
    fn test_minimize_three_planes() {
        let qx = Quadric::from_points(&v(&[2.0, 0.0, 0.0]), &v(&[2.0, 1.0, 0.0]), &v(&[2.0, 0.0, 1.0]));
        let qy = Quadric::from_points(&v(&[0.0, 3.0, 0.0]), &v(&[1.0, 3.0, 0.0]), &v(&[0.0, 3.0, 1.0]));
        let q = qx + qy + plane_z(1.0);
        let x = q.minimize().unwrap();
        assert_relative_eq!(x[0], 2.0, epsilon = 1e-9);
        assert_relative_eq!(x[1], 3.0, epsilon = 1e-9);
        assert_relative_eq!(x[2], 1.0, epsilon = 1e-9);
        assert_relative_eq!(q.apply(&x), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_minimize_singular() {
        assert!(plane_z(1.0).minimize().is_none());
        assert!(Quadric::zero(4).minimize().is_none());
    }

    #[test]
    fn test_constrained_minimum() {
        let mut q = Quadric::zero(5);
        q.sum3(&plane_z(0.0), &[0.25, 0.75]);
        let x = q.minimize_with_geometric_constraint(&[1.0, 2.0, 3.0]).unwrap();
        assert_eq!((x[0], x[1], x[2]), (1.0, 2.0, 3.0));
        assert_relative_eq!(x[3], 0.25, epsilon = 1e-9);
        assert_relative_eq!(x[4], 0.75, epsilon = 1e-9);

        let geo_only = plane_z(0.0).minimize_with_geometric_constraint(&[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(geo_only.len(), 3);
    }

    // ---- face quadrics ----

    fn unit_face(border: [bool; 3]) -> FaceQuadricInput {
        FaceQuadricInput {
            positions: [
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(1.0, 0.0, 0.0),
                Point3f::new(0.0, 1.0, 0.0),
            ],
            attributes: [
                AttributeVector::from_slice(&[0.0]),
                AttributeVector::from_slice(&[1.0]),
                AttributeVector::from_slice(&[0.0]),
            ],
            normal: Vector3f::z(),
            border,
        }
    }

    #[test]
    fn test_face_quadric_interior() {
        let fq = face_quadrics(&unit_face([false; 3]), false, 1.0);
        let geo = fq.geometric.unwrap();
        assert_eq!(geo.dim(), 3);
        assert_relative_eq!(geo.apply(&v(&[0.3, 0.3, 2.0])), 4.0, epsilon = 1e-9);
        assert_eq!(fq.full.dim(), 4);
        assert_relative_eq!(fq.full.apply(&v(&[1.0, 0.0, 0.0, 1.0])), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_face_quadric_border_wall() {
        let open = face_quadrics(&unit_face([true, false, false]), false, 1.0).full;
        let closed = face_quadrics(&unit_face([false; 3]), false, 1.0).full;
        // Vertices stay exact; sliding away from the border edge costs more
        assert_relative_eq!(open.apply(&v(&[0.0, 0.0, 0.0, 0.0])), 0.0, epsilon = 1e-9);
        let off = v(&[0.5, -0.5, 0.0, 0.5]);
        assert!(open.apply(&off) > closed.apply(&off) + 0.1);
    }

    #[test]
    fn test_face_quadric_degenerate() {
        let mut face = unit_face([false; 3]);
        face.positions[2] = Point3f::new(2.0, 0.0, 0.0);
        let fq = face_quadrics(&face, false, 1.0);
        assert!(fq.geometric.is_none());
        // Attributes 0, 1, 0 are collinear in attribute space
        assert_eq!(fq.full, Quadric::zero(4));
    }
}
