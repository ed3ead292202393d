//! Triangle geometry helpers in single precision

use quadrix_core::{Point3f, Vector3f, Vector4f};

/// Shape quality of a triangle: twice its area over its longest squared edge.
///
/// Returns 0 for degenerate triangles.
pub fn triangle_quality(p0: &Point3f, p1: &Point3f, p2: &Point3f) -> f32 {
    let d10 = p1 - p0;
    let d20 = p2 - p0;
    let d12 = p1 - p2;
    let area = d10.cross(&d20).norm();
    if area == 0.0 {
        return 0.0;
    }
    let longest = d10
        .norm_squared()
        .max(d20.norm_squared())
        .max(d12.norm_squared());
    if longest == 0.0 {
        return 0.0;
    }
    area / longest
}

/// Unit normal of a triangle, zero when degenerate
pub fn face_normal(p0: &Point3f, p1: &Point3f, p2: &Point3f) -> Vector3f {
    (p1 - p0)
        .cross(&(p2 - p0))
        .try_normalize(f32::MIN_POSITIVE)
        .unwrap_or_else(Vector3f::zeros)
}

/// Barycentric coordinates of `p` with respect to triangle `abc`.
///
/// `p` is projected onto the triangle plane; components may be negative
/// when the projection falls outside.
pub fn barycentric(p: &Point3f, a: &Point3f, b: &Point3f, c: &Point3f) -> Vector3f {
    let v0 = b - a;
    let v1 = c - a;
    let v2 = p - a;
    let d00 = v0.dot(&v0);
    let d01 = v0.dot(&v1);
    let d11 = v1.dot(&v1);
    let d20 = v2.dot(&v0);
    let d21 = v2.dot(&v1);
    let denom = d00 * d11 - d01 * d01;
    let v = (d11 * d20 - d01 * d21) / denom;
    let w = (d00 * d21 - d01 * d20) / denom;
    Vector3f::new(1.0 - v - w, v, w)
}

/// Result of a point-to-triangle query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClosestPoint {
    pub point: Point3f,
    pub barycentric: Vector3f,
    pub sqr_distance: f32,
}

/// Closest point on triangle `abc` to `p`.
///
/// Minimizes the squared distance over the parameter domain
/// `s, t >= 0, s + t <= 1`, handling each of the seven regions of the
/// parameter plane explicitly.
pub fn closest_point_on_triangle(p: &Point3f, a: &Point3f, b: &Point3f, c: &Point3f) -> ClosestPoint {
    let diff = p - a;
    let edge0 = b - a;
    let edge1 = c - a;
    let a00 = edge0.dot(&edge0);
    let a01 = edge0.dot(&edge1);
    let a11 = edge1.dot(&edge1);
    let b0 = -diff.dot(&edge0);
    let b1 = -diff.dot(&edge1);
    let det = a00 * a11 - a01 * a01;
    let mut t0 = a01 * b1 - a11 * b0;
    let mut t1 = a01 * b0 - a00 * b1;

    // Clamp helper for a single edge parameter
    let edge_param = |b: f32, len2: f32| -> f32 {
        if b >= 0.0 {
            0.0
        } else if -b >= len2 {
            1.0
        } else {
            -b / len2
        }
    };

    if t0 + t1 <= det {
        if t0 < 0.0 {
            if t1 < 0.0 {
                // region 4
                if b0 < 0.0 {
                    t1 = 0.0;
                    t0 = if -b0 >= a00 { 1.0 } else { -b0 / a00 };
                } else {
                    t0 = 0.0;
                    t1 = edge_param(b1, a11);
                }
            } else {
                // region 3
                t0 = 0.0;
                t1 = edge_param(b1, a11);
            }
        } else if t1 < 0.0 {
            // region 5
            t1 = 0.0;
            t0 = edge_param(b0, a00);
        } else {
            // region 0
            let inv = 1.0 / det;
            t0 *= inv;
            t1 *= inv;
        }
    } else if t0 < 0.0 {
        // region 2
        let tmp0 = a01 + b0;
        let tmp1 = a11 + b1;
        if tmp1 > tmp0 {
            let numer = tmp1 - tmp0;
            let denom = a00 - 2.0 * a01 + a11;
            if numer >= denom {
                t0 = 1.0;
                t1 = 0.0;
            } else {
                t0 = numer / denom;
                t1 = 1.0 - t0;
            }
        } else {
            t0 = 0.0;
            t1 = if tmp1 <= 0.0 {
                1.0
            } else if b1 >= 0.0 {
                0.0
            } else {
                -b1 / a11
            };
        }
    } else if t1 < 0.0 {
        // region 6
        let tmp0 = a01 + b1;
        let tmp1 = a00 + b0;
        if tmp1 > tmp0 {
            let numer = tmp1 - tmp0;
            let denom = a00 - 2.0 * a01 + a11;
            if numer >= denom {
                t1 = 1.0;
                t0 = 0.0;
            } else {
                t1 = numer / denom;
                t0 = 1.0 - t1;
            }
        } else {
            t1 = 0.0;
            t0 = if tmp1 <= 0.0 {
                1.0
            } else if b0 >= 0.0 {
                0.0
            } else {
                -b0 / a00
            };
        }
    } else {
        // region 1
        let numer = a11 + b1 - a01 - b0;
        if numer <= 0.0 {
            t0 = 0.0;
            t1 = 1.0;
        } else {
            let denom = a00 - 2.0 * a01 + a11;
            if numer >= denom {
                t0 = 1.0;
                t1 = 0.0;
            } else {
                t0 = numer / denom;
                t1 = 1.0 - t0;
            }
        }
    }

    let point = a + edge0 * t0 + edge1 * t1;
    ClosestPoint {
        point,
        barycentric: Vector3f::new(1.0 - t0 - t1, t0, t1),
        sqr_distance: (p - point).norm_squared(),
    }
}

fn tetra_sign(a: &Point3f, b: &Point3f, c: &Point3f, d: &Point3f) -> i8 {
    let v = (b - a).cross(&(c - a)).dot(&(d - a));
    if v > 0.0 {
        1
    } else if v < 0.0 {
        -1
    } else {
        0
    }
}

/// Intersection point of segment `q0q1` with triangle `abc`, if any.
///
/// Uses the signs of tetrahedron volumes; touching configurations where a
/// sign is zero on one side only still count as crossings.
pub fn segment_triangle_intersection(
    q0: &Point3f,
    q1: &Point3f,
    a: &Point3f,
    b: &Point3f,
    c: &Point3f,
) -> Option<Point3f> {
    let s1 = tetra_sign(q0, a, b, c);
    let s2 = tetra_sign(q1, a, b, c);
    if s1 == s2 {
        return None;
    }
    let s3 = tetra_sign(q0, q1, a, b);
    let s4 = tetra_sign(q0, q1, b, c);
    let s5 = tetra_sign(q0, q1, c, a);
    if s3 != s4 || s4 != s5 {
        return None;
    }
    let n = (b - a).cross(&(c - a));
    let dir = q1 - q0;
    let m = dir.dot(&n);
    if m == 0.0 {
        return None;
    }
    let t = (a - q0).dot(&n) / m;
    Some(q0 + dir * t)
}

/// Unit tangent direction, keeping the handedness in `w`
pub fn normalize_tangent(t: &Vector4f) -> Vector4f {
    let xyz = t
        .xyz()
        .try_normalize(f32::MIN_POSITIVE)
        .unwrap_or_else(Vector3f::zeros);
    Vector4f::new(xyz.x, xyz.y, xyz.z, t.w)
}

/// Axis-aligned box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: Point3f,
    pub max: Point3f,
}

impl Bounds {
    pub fn new(min: Point3f, max: Point3f) -> Self {
        Self { min, max }
    }

    pub fn center(&self) -> Point3f {
        nalgebra::center(&self.min, &self.max)
    }

    /// Half size along each axis
    pub fn extents(&self) -> Vector3f {
        (self.max - self.min) * 0.5
    }

    pub fn intersects_segment(&self, a: &Point3f, b: &Point3f) -> bool {
        segment_intersects_box(a, b, self)
    }
}

/// Separating-axis test between segment `ab` and an axis-aligned box.
pub fn segment_intersects_box(a: &Point3f, b: &Point3f, bounds: &Bounds) -> bool {
    let center = bounds.center();
    let extents = bounds.extents();
    let a = a - center;
    let b = b - center;

    let mid = (a + b) * 0.5;
    let l = a - mid;
    let ext = l.abs();

    if mid.x.abs() > extents.x + ext.x
        || mid.y.abs() > extents.y + ext.y
        || mid.z.abs() > extents.z + ext.z
    {
        return false;
    }
    // Cross products of the segment with each axis
    if (mid.y * l.z - mid.z * l.y).abs() > extents.y * ext.z + extents.z * ext.y {
        return false;
    }
    if (mid.x * l.z - mid.z * l.x).abs() > extents.x * ext.z + extents.z * ext.x {
        return false;
    }
    if (mid.x * l.y - mid.y * l.x).abs() > extents.x * ext.y + extents.y * ext.x {
        return false;
    }
    true
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingSphere {
    pub center: Point3f,
    pub radius: f32,
}

impl BoundingSphere {
    /// Axis-aligned box enclosing the sphere
    pub fn bounds(&self) -> Bounds {
        let r = Vector3f::repeat(self.radius);
        Bounds::new(self.center - r, self.center + r)
    }
}

/// Smallest sphere enclosing triangle `p1p2p3`.
///
/// Obtuse and right triangles use the longest edge as diameter; acute ones
/// use the circumscribed sphere.
pub fn bounding_sphere(p1: &Point3f, p2: &Point3f, p3: &Point3f) -> BoundingSphere {
    // Side lengths, each opposite the vertex it is paired with
    let mut side_a = (p1 - p2).norm();
    let mut side_b = (p2 - p3).norm();
    let mut side_c = (p3 - p1).norm();
    let (mut a, mut b, mut c) = (*p3, *p1, *p2);

    if side_b < side_c {
        std::mem::swap(&mut side_b, &mut side_c);
        std::mem::swap(&mut b, &mut c);
    }
    if side_a < side_b {
        std::mem::swap(&mut side_a, &mut side_b);
        std::mem::swap(&mut a, &mut b);
    }

    let diameter = BoundingSphere {
        center: nalgebra::center(&b, &c),
        radius: side_a * 0.5,
    };
    if side_b * side_b + side_c * side_c <= side_a * side_a {
        return diameter;
    }

    let alpha = a - c;
    let beta = b - c;
    let axb = alpha.cross(&beta);
    let denom = 2.0 * axb.norm_squared();
    if denom == 0.0 {
        return diameter;
    }
    let center = c + (beta * alpha.norm_squared() - alpha * beta.norm_squared()).cross(&axb) / denom;
    BoundingSphere {
        center,
        radius: (a - center).norm(),
    }
}
