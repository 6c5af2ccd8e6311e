//! Dense 3-D array stored in `i + isize*(j + jsize*k)` order, and trilinear
//! sampling of cell-centred scalar fields built on top of it.

use crate::grid_index::GridIndex;
use crate::math::{cell_and_fraction, trilinear_weights, Point3, Vec3};

#[derive(Clone, Debug)]
pub struct Array3d<T> {
    isize_: usize,
    jsize: usize,
    ksize: usize,
    data: Vec<T>,
}

impl<T: Clone> Array3d<T> {
    pub fn new(isize_: usize, jsize: usize, ksize: usize, fill: T) -> Self {
        Array3d {
            isize_,
            jsize,
            ksize,
            data: vec![fill; isize_ * jsize * ksize],
        }
    }

    #[inline]
    pub fn dims(&self) -> (usize, usize, usize) {
        (self.isize_, self.jsize, self.ksize)
    }

    #[inline]
    pub fn in_bounds(&self, i: isize, j: isize, k: isize) -> bool {
        i >= 0
            && j >= 0
            && k >= 0
            && (i as usize) < self.isize_
            && (j as usize) < self.jsize
            && (k as usize) < self.ksize
    }

    #[inline]
    fn flat_index(&self, i: usize, j: usize, k: usize) -> usize {
        i + self.isize_ * (j + self.jsize * k)
    }

    #[inline]
    pub fn get(&self, i: isize, j: isize, k: isize) -> Option<&T> {
        if self.in_bounds(i, j, k) {
            Some(&self.data[self.flat_index(i as usize, j as usize, k as usize)])
        } else {
            None
        }
    }

    #[inline]
    pub fn get_idx(&self, g: GridIndex) -> Option<&T> {
        self.get(g.i, g.j, g.k)
    }

    /// Panics if out of range; the hot path for loops that already iterate
    /// within bounds.
    #[inline]
    pub fn at(&self, i: isize, j: isize, k: isize) -> &T {
        self.get(i, j, k).expect("Array3d index out of range")
    }

    #[inline]
    pub fn set(&mut self, i: isize, j: isize, k: isize, value: T) {
        more_asserts::assert_ge!(i, 0);
        more_asserts::assert_ge!(j, 0);
        more_asserts::assert_ge!(k, 0);
        let idx = self.flat_index(i as usize, j as usize, k as usize);
        self.data[idx] = value;
    }

    #[inline]
    pub fn set_idx(&mut self, g: GridIndex, value: T) {
        self.set(g.i, g.j, g.k, value);
    }

    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn iter_indices(&self) -> impl Iterator<Item = GridIndex> + '_ {
        let (is_, js, _ks) = (self.isize_, self.jsize, self.ksize);
        self.data.iter().enumerate().map(move |(idx, _)| {
            let k = idx / (is_ * js);
            let rem = idx % (is_ * js);
            let j = rem / is_;
            let i = rem % is_;
            GridIndex::new(i as isize, j as isize, k as isize)
        })
    }
}

impl Array3d<f64> {
    pub fn add(&mut self, i: isize, j: isize, k: isize, value: f64) {
        let idx = self.flat_index(i as usize, j as usize, k as usize);
        self.data[idx] += value;
    }

    /// Trilinear interpolation of this cell-centred field at world position
    /// `p`. Per §4.1, `p` is first shifted by `-h/2` before conversion to
    /// grid-fractional coordinates, since cell-centred samples live at
    /// `(i+0.5)h`.
    pub fn interpolate(&self, p: Point3, h: f64) -> f64 {
        let shifted = p - Vec3::new(0.5 * h, 0.5 * h, 0.5 * h);
        let cf = cell_and_fraction(shifted.x / h, shifted.y / h, shifted.z / h);
        let w = trilinear_weights(cf.fx, cf.fy, cf.fz);
        let mut sum = 0.0;
        for di in 0..2isize {
            for dj in 0..2isize {
                for dk in 0..2isize {
                    if let Some(v) = self.get(cf.i + di, cf.j + dj, cf.k + dk) {
                        sum += v * w[di as usize][dj as usize][dk as usize];
                    }
                }
            }
        }
        sum
    }

    /// Gradient via bilinear interpolation of the six pairwise first
    /// differences around `p`, per §4.1.
    pub fn interpolate_gradient(&self, p: Point3, h: f64) -> Vec3 {
        let shifted = p - Vec3::new(0.5 * h, 0.5 * h, 0.5 * h);
        let cf = cell_and_fraction(shifted.x / h, shifted.y / h, shifted.z / h);
        let get = |di: isize, dj: isize, dk: isize| -> f64 {
            self.get(cf.i + di, cf.j + dj, cf.k + dk).copied().unwrap_or(0.0)
        };

        let bilerp = |v00: f64, v10: f64, v01: f64, v11: f64, a: f64, b: f64| -> f64 {
            (1.0 - a) * (1.0 - b) * v00 + a * (1.0 - b) * v10 + (1.0 - a) * b * v01 + a * b * v11
        };

        let (fx, fy, fz) = (cf.fx, cf.fy, cf.fz);

        let dx = bilerp(
            get(1, 0, 0) - get(0, 0, 0),
            get(1, 1, 0) - get(0, 1, 0),
            get(1, 0, 1) - get(0, 0, 1),
            get(1, 1, 1) - get(0, 1, 1),
            fy,
            fz,
        ) / h;
        let dy = bilerp(
            get(0, 1, 0) - get(0, 0, 0),
            get(1, 1, 0) - get(1, 0, 0),
            get(0, 1, 1) - get(0, 0, 1),
            get(1, 1, 1) - get(1, 0, 1),
            fx,
            fz,
        ) / h;
        let dz = bilerp(
            get(0, 0, 1) - get(0, 0, 0),
            get(1, 0, 1) - get(1, 0, 0),
            get(0, 1, 1) - get(0, 1, 0),
            get(1, 1, 1) - get(1, 1, 0),
            fx,
            fy,
        ) / h;

        Vec3::new(dx, dy, dz)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpolate_constant_field_returns_constant() {
        let a = Array3d::new(4, 4, 4, 2.5_f64);
        let p = Point3::new(0.17, 0.23, 0.08);
        assert!((a.interpolate(p, 0.1) - 2.5).abs() < 1e-9);
    }

    #[test]
    fn interpolate_linear_ramp_matches_analytic_value() {
        let mut a = Array3d::new(8, 2, 2, 0.0_f64);
        for i in 0..8isize {
            for j in 0..2isize {
                for k in 0..2isize {
                    a.set(i, j, k, i as f64);
                }
            }
        }
        let h = 1.0;
        // cell-centred ramp f(x) = floor(x/h): at x=3.0 shifted by -h/2 gives 2.5 -> interpolates between i=2,3.
        let v = a.interpolate(Point3::new(3.0, 1.0, 1.0), h);
        assert!((v - 2.5).abs() < 1e-9);
    }

    #[test]
    fn out_of_bounds_get_is_none() {
        let a: Array3d<f64> = Array3d::new(2, 2, 2, 0.0);
        assert!(a.get(-1, 0, 0).is_none());
        assert!(a.get(2, 0, 0).is_none());
    }
}
