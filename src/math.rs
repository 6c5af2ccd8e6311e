//! Vector/point aliases, axis-aligned bounding boxes and trilinear
//! interpolation shared by every grid-based component.

pub type Vec3 = cgmath::Vector3<f64>;
pub type Point3 = cgmath::Point3<f64>;

pub use cgmath::{InnerSpace, Zero};

/// An axis-aligned bounding box in world space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: Point3,
    pub max: Point3,
}

impl Aabb {
    pub fn new(min: Point3, max: Point3) -> Self {
        Aabb { min, max }
    }

    pub fn from_center_radius(center: Point3, radius: f64) -> Self {
        let r = Vec3::new(radius, radius, radius);
        Aabb {
            min: center - r,
            max: center + r,
        }
    }

    pub fn contains(&self, p: Point3) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }

    /// Expand (or shrink, for negative `amount`) each face outward.
    pub fn expand(&self, amount: f64) -> Self {
        let v = Vec3::new(amount, amount, amount);
        Aabb {
            min: self.min - v,
            max: self.max + v,
        }
    }

    /// Closest point to `p` that lies inside the box.
    pub fn clamp_point(&self, p: Point3) -> Point3 {
        Point3::new(
            p.x.clamp(self.min.x, self.max.x),
            p.y.clamp(self.min.y, self.max.y),
            p.z.clamp(self.min.z, self.max.z),
        )
    }
}

/// Fractional cell-space coordinates produced by [`cell_and_fraction`].
pub struct CellFraction {
    pub i: isize,
    pub j: isize,
    pub k: isize,
    pub fx: f64,
    pub fy: f64,
    pub fz: f64,
}

/// Splits a position already in "grid units" (i.e. divided by cell width)
/// into a base cell index and the `[0,1)` fractional offset within it.
pub fn cell_and_fraction(gx: f64, gy: f64, gz: f64) -> CellFraction {
    let i = gx.floor();
    let j = gy.floor();
    let k = gz.floor();
    CellFraction {
        i: i as isize,
        j: j as isize,
        k: k as isize,
        fx: gx - i,
        fy: gy - j,
        fz: gz - k,
    }
}

/// Trilinear interpolation of 8 corner samples given fractional offsets
/// `(fx,fy,fz) ∈ [0,1]^3`. Corner order matches `cell_and_fraction`'s
/// `(i+di, j+dj, k+dk)` for `di,dj,dk ∈ {0,1}`, indexed as `c[di][dj][dk]`.
pub fn trilinear_weights(fx: f64, fy: f64, fz: f64) -> [[[f64; 2]; 2]; 2] {
    let mut w = [[[0.0; 2]; 2]; 2];
    for (di, wx) in [1.0 - fx, fx].into_iter().enumerate() {
        for (dj, wy) in [1.0 - fy, fy].into_iter().enumerate() {
            for (dk, wz) in [1.0 - fz, fz].into_iter().enumerate() {
                w[di][dj][dk] = wx * wy * wz;
            }
        }
    }
    w
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trilinear_weights_sum_to_one() {
        let w = trilinear_weights(0.3, 0.7, 0.1);
        let sum: f64 = w.iter().flatten().flatten().sum();
        assert!((sum - 1.0).abs() < 1e-12);
    }

    #[test]
    fn aabb_clamp_point_stays_inside() {
        let b = Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0));
        let p = b.clamp_point(Point3::new(-1.0, 0.5, 5.0));
        assert_eq!(p, Point3::new(0.0, 0.5, 1.0));
    }
}
