//! Minimal triangle mesh representation consumed by [`crate::mesh_level_set`]
//! and the `external` trait seam (§6): the core never loads a mesh file, it
//! only ever receives positions/indices/optional per-vertex velocities.

use crate::math::{Point3, Vec3};

#[derive(Clone, Debug)]
pub struct TriangleMesh {
    pub vertices: Vec<Point3>,
    pub velocities: Option<Vec<Vec3>>,
    pub triangles: Vec<[u32; 3]>,
}

impl TriangleMesh {
    pub fn new(vertices: Vec<Point3>, triangles: Vec<[u32; 3]>) -> Self {
        TriangleMesh {
            vertices,
            velocities: None,
            triangles,
        }
    }

    pub fn with_velocities(mut self, velocities: Vec<Vec3>) -> Self {
        debug_assert_eq!(velocities.len(), self.vertices.len());
        self.velocities = Some(velocities);
        self
    }

    pub fn triangle_positions(&self, t: usize) -> (Point3, Point3, Point3) {
        let [a, b, c] = self.triangles[t];
        (
            self.vertices[a as usize],
            self.vertices[b as usize],
            self.vertices[c as usize],
        )
    }

    pub fn triangle_velocities(&self, t: usize) -> Option<(Vec3, Vec3, Vec3)> {
        self.velocities.as_ref().map(|vel| {
            let [a, b, c] = self.triangles[t];
            (vel[a as usize], vel[b as usize], vel[c as usize])
        })
    }

    pub fn aabb(&self) -> crate::math::Aabb {
        let mut min = self.vertices[0];
        let mut max = self.vertices[0];
        for v in &self.vertices {
            min.x = min.x.min(v.x);
            min.y = min.y.min(v.y);
            min.z = min.z.min(v.z);
            max.x = max.x.max(v.x);
            max.y = max.y.max(v.y);
            max.z = max.z.max(v.z);
        }
        crate::math::Aabb::new(min, max)
    }
}

/// Closest point on triangle `(x1,x2,x3)` to `x0`, per §4.3a: barycentrics
/// in the triangle plane; clamp to the closest edge if any are negative.
/// Returns `(closest_point, barycentrics)`.
pub fn closest_point_on_triangle(x0: Point3, x1: Point3, x2: Point3, x3: Point3) -> (Point3, (f64, f64, f64)) {
    let x13 = x1 - x3;
    let x23 = x2 - x3;
    let x03 = x0 - x3;

    let m13 = x13.magnitude2();
    let m23 = x23.magnitude2();
    let d = x13.dot(x23);
    let invdet = 1.0 / (m13 * m23 - d * d).max(1e-30);
    let a = x13.dot(x03);
    let b = x23.dot(x03);
    let mut u = invdet * (m23 * a - d * b);
    let mut v = invdet * (m13 * b - d * a);
    let mut w = 1.0 - u - v;

    if u >= 0.0 && v >= 0.0 && w >= 0.0 {
        let p = Point3::from_vec(x1.to_vec() * u + x2.to_vec() * v + x3.to_vec() * w);
        return (p, (u, v, w));
    }

    // Clamp to whichever edge the projection escaped through; take the
    // minimum of the three point-segment distances.
    let (p1, t1) = closest_point_on_segment(x0, x1, x2);
    let (p2, t2) = closest_point_on_segment(x0, x2, x3);
    let (p3, t3) = closest_point_on_segment(x0, x3, x1);

    let d1 = (x0 - p1).magnitude2();
    let d2 = (x0 - p2).magnitude2();
    let d3 = (x0 - p3).magnitude2();

    if d1 <= d2 && d1 <= d3 {
        u = 1.0 - t1;
        v = t1;
        w = 0.0;
        (p1, (u, v, w))
    } else if d2 <= d3 {
        u = 0.0;
        v = 1.0 - t2;
        w = t2;
        (p2, (u, v, w))
    } else {
        u = t3;
        v = 0.0;
        w = 1.0 - t3;
        (p3, (u, v, w))
    }
}

fn closest_point_on_segment(p: Point3, a: Point3, b: Point3) -> (Point3, f64) {
    let ab = b - a;
    let len2 = ab.magnitude2();
    let t = if len2 > 1e-30 { ((p - a).dot(ab) / len2).clamp(0.0, 1.0) } else { 0.0 };
    (a + ab * t, t)
}

use cgmath::{EuclideanSpace, InnerSpace};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closest_point_on_triangle_interior_matches_projection() {
        let x1 = Point3::new(0.0, 0.0, 0.0);
        let x2 = Point3::new(1.0, 0.0, 0.0);
        let x3 = Point3::new(0.0, 1.0, 0.0);
        let p = Point3::new(0.25, 0.25, 1.0);
        let (cp, bary) = closest_point_on_triangle(p, x1, x2, x3);
        assert!((cp.z - 0.0).abs() < 1e-9);
        let sum = bary.0 + bary.1 + bary.2;
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn closest_point_outside_triangle_clamps_to_edge() {
        let x1 = Point3::new(0.0, 0.0, 0.0);
        let x2 = Point3::new(1.0, 0.0, 0.0);
        let x3 = Point3::new(0.0, 1.0, 0.0);
        let p = Point3::new(-1.0, -1.0, 0.0);
        let (cp, _) = closest_point_on_triangle(p, x1, x2, x3);
        assert!((cp - x1).magnitude() < 1e-9);
    }
}
