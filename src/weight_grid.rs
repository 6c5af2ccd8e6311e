//! Face and cell fractions derived from the solid SDF (§3 "Weight grid",
//!), used by the pressure and viscosity solvers to scale contributions
//! at partially-solid cells/faces.

use crate::array3d::Array3d;
use crate::level_set_utils::fraction_inside_quad;
use crate::mesh_level_set::MeshLevelSet;

pub struct WeightGrid {
    /// Cell-centred fraction of the cell not occupied by solid.
    pub center: Array3d<f64>,
    /// `W_face = 1 - face-solid-weight`, on each staggered face.
    pub u: Array3d<f64>,
    pub v: Array3d<f64>,
    pub w: Array3d<f64>,
}

impl WeightGrid {
    pub fn from_solid_sdf(solid: &MeshLevelSet, isize_: usize, jsize: usize, ksize: usize) -> Self {
        let mut center = Array3d::new(isize_, jsize, ksize, 1.0);
        let mut u = Array3d::new(isize_ + 1, jsize, ksize, 1.0);
        let mut v = Array3d::new(isize_, jsize + 1, ksize, 1.0);
        let mut w = Array3d::new(isize_, jsize, ksize + 1, 1.0);

        let phi = |i: isize, j: isize, k: isize| solid.get(i, j, k);

        for i in 0..isize_ {
            for j in 0..jsize {
                for k in 0..ksize {
                    let (i, j, k) = (i as isize, j as isize, k as isize);
                    let frac = 1.0
                        - crate::level_set_utils::volume_fraction_cube(
                            phi(i, j, k),
                            phi(i + 1, j, k),
                            phi(i, j + 1, k),
                            phi(i + 1, j + 1, k),
                            phi(i, j, k + 1),
                            phi(i + 1, j, k + 1),
                            phi(i, j + 1, k + 1),
                            phi(i + 1, j + 1, k + 1),
                        );
                    center.set(i, j, k, frac.clamp(0.0, 1.0));
                }
            }
        }

        for i in 0..=isize_ {
            for j in 0..jsize {
                for k in 0..ksize {
                    let (i, j, k) = (i as isize, j as isize, k as isize);
                    let frac = 1.0 - fraction_inside_quad(phi(i, j, k), phi(i, j + 1, k), phi(i, j, k + 1), phi(i, j + 1, k + 1));
                    u.set(i, j, k, frac.clamp(0.0, 1.0));
                }
            }
        }

        for i in 0..isize_ {
            for j in 0..=jsize {
                for k in 0..ksize {
                    let (i, j, k) = (i as isize, j as isize, k as isize);
                    let frac = 1.0 - fraction_inside_quad(phi(i, j, k), phi(i + 1, j, k), phi(i, j, k + 1), phi(i + 1, j, k + 1));
                    v.set(i, j, k, frac.clamp(0.0, 1.0));
                }
            }
        }

        for i in 0..isize_ {
            for j in 0..jsize {
                for k in 0..=ksize {
                    let (i, j, k) = (i as isize, j as isize, k as isize);
                    let frac = 1.0 - fraction_inside_quad(phi(i, j, k), phi(i + 1, j, k), phi(i, j + 1, k), phi(i + 1, j + 1, k));
                    w.set(i, j, k, frac.clamp(0.0, 1.0));
                }
            }
        }

        WeightGrid { center, u, v, w }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::triangle_mesh::TriangleMesh;
    use crate::math::Point3;

    #[test]
    fn all_fluid_domain_has_unit_weights() {
        // Solid far away: every node stays at the +bandwidth fill value.
        let solid = MeshLevelSet::new(4, 4, 4, 1.0, 3.0);
        let wg = WeightGrid::from_solid_sdf(&solid, 4, 4, 4);
        assert!(wg.center.as_slice().iter().all(|&v| (v - 1.0).abs() < 1e-9));
        assert!(wg.u.as_slice().iter().all(|&v| (v - 1.0).abs() < 1e-9));
    }

    #[test]
    fn solid_box_reduces_center_weight_to_zero() {
        let v = |x: f64, y: f64, z: f64| Point3::new(x, y, z);
        let verts = vec![
            v(0.0, 0.0, 0.0), v(4.0, 0.0, 0.0), v(4.0, 4.0, 0.0), v(0.0, 4.0, 0.0),
            v(0.0, 0.0, 4.0), v(4.0, 0.0, 4.0), v(4.0, 4.0, 4.0), v(0.0, 4.0, 4.0),
        ];
        let tris: Vec<[u32; 3]> = vec![
            [0, 1, 2], [0, 2, 3], [4, 6, 5], [4, 7, 6], [0, 4, 5], [0, 5, 1],
            [1, 5, 6], [1, 6, 2], [2, 6, 7], [2, 7, 3], [3, 7, 4], [3, 4, 0],
        ];
        let mesh = TriangleMesh::new(verts, tris);
        let mut solid = MeshLevelSet::new(4, 4, 4, 1.0, 3.0);
        solid.calculate_signed_distance_field(&mesh, 0, false);
        let wg = WeightGrid::from_solid_sdf(&solid, 4, 4, 4);
        let interior = *wg.center.at(2, 2, 2);
        assert!(interior < 0.5, "expected mostly-solid cell, got weight {interior}");
    }
}
