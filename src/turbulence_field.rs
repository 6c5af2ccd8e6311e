//! Per-cell turbulence scalar field (§4.10), used to bias diffuse particle
//! emission toward regions of incoherent relative motion (foam/spray tend to
//! form where neighbouring fluid velocities disagree, not just where speed is
//! high). Grounded on `turbulencefield.h/.cpp`.

use cgmath::InnerSpace;
use rayon::prelude::*;

use crate::array3d::Array3d;
use crate::grid_index::GridIndex;
use crate::mac_velocity_field::MacVelocityField;
use crate::math::{Point3, Vec3};
use crate::particle_level_set::ParticleLevelSet;

pub struct TurbulenceField {
    isize_: usize,
    jsize: usize,
    ksize: usize,
    h: f64,
    radius: f64,
    field: Array3d<f64>,
}

impl TurbulenceField {
    pub fn new(isize_: usize, jsize: usize, ksize: usize, h: f64) -> Self {
        TurbulenceField {
            isize_,
            jsize,
            ksize,
            h,
            radius: (3.0 * (2.0 * h) * (2.0 * h)).sqrt(),
            field: Array3d::new(isize_, jsize, ksize, 0.0),
        }
    }

    pub fn field(&self) -> &Array3d<f64> {
        &self.field
    }

    /// Recomputes the field over every cell inside the liquid.
    pub fn calculate(&mut self, velocity: &MacVelocityField, liquid_sdf: &ParticleLevelSet) {
        let (isize_, jsize, ksize) = (self.isize_, self.jsize, self.ksize);
        let fluid_cells: Vec<GridIndex> = (0..ksize as isize)
            .flat_map(|k| (0..jsize as isize).flat_map(move |j| (0..isize_ as isize).map(move |i| (i, j, k))))
            .filter(|&(i, j, k)| liquid_sdf.get(i, j, k) < 0.0)
            .map(|(i, j, k)| GridIndex::new(i, j, k))
            .collect();
        self.calculate_for_cells(velocity, &fluid_cells);
    }

    fn calculate_for_cells(&mut self, velocity: &MacVelocityField, fluid_cells: &[GridIndex]) {
        let vgrid = self.cell_centered_velocity_grid(velocity);
        let inv_radius = 1.0 / self.radius;
        let isize_ = self.isize_;
        let jsize = self.jsize;
        let ksize = self.ksize;
        let h = self.h;

        let values: Vec<(GridIndex, f64)> = fluid_cells
            .par_iter()
            .map(|&g| {
                let (i, j, k) = (g.i as usize, g.j as usize, g.k as usize);
                let vi = *vgrid.at(g.i, g.j, g.k);
                let xi = crate::grid_index::cell_center(g, h);

                let k_lo = k.saturating_sub(2);
                let k_hi = (k + 2).min(ksize.saturating_sub(1));
                let j_lo = j.saturating_sub(2);
                let j_hi = (j + 2).min(jsize.saturating_sub(1));
                let i_lo = i.saturating_sub(2);
                let i_hi = (i + 2).min(isize_.saturating_sub(1));

                let mut turb = 0.0;
                for nk in k_lo..=k_hi {
                    for nj in j_lo..=j_hi {
                        for ni in i_lo..=i_hi {
                            let gn = GridIndex::new(ni as isize, nj as isize, nk as isize);
                            let vj = *vgrid.at(gn.i, gn.j, gn.k);
                            let vij = vi - vj;
                            let vlen = vij.magnitude();
                            if vlen < 1e-6 {
                                continue;
                            }
                            let xj = crate::grid_index::cell_center(gn, h);
                            let xij = xi - xj;
                            let xlen = xij.magnitude();
                            let vhat = vij / vlen;
                            let xhat = if xlen > 1e-9 { xij / xlen } else { Vec3::new(0.0, 0.0, 0.0) };
                            turb += vlen * (1.0 - vhat.dot(xhat)) * (1.0 - (xlen * inv_radius));
                        }
                    }
                }
                (g, turb.max(0.0))
            })
            .collect();

        for (g, v) in values {
            self.field.set_idx(g, v);
        }
    }

    fn cell_centered_velocity_grid(&self, velocity: &MacVelocityField) -> Array3d<Vec3> {
        let mut vgrid = Array3d::new(self.isize_, self.jsize, self.ksize, Vec3::new(0.0, 0.0, 0.0));
        for g in vgrid.iter_indices().collect::<Vec<_>>() {
            let p: Point3 = crate::grid_index::cell_center(g, self.h);
            vgrid.set_idx(g, velocity.evaluate_velocity_at_position(p));
        }
        vgrid
    }

    /// Trilinearly samples the field at an arbitrary world position, using
    /// the same cell-centred sampling convention as every other scalar grid
    /// in the crate (`Array3d::interpolate`).
    pub fn evaluate_at_position(&self, p: Point3) -> f64 {
        self.field.interpolate(p, self.h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mac_velocity_field::MacVelocityField;

    #[test]
    fn uniform_velocity_field_has_zero_turbulence() {
        let isize_ = 4;
        let jsize = 4;
        let ksize = 4;
        let h = 0.1;
        let mut velocity = MacVelocityField::new(isize_, jsize, ksize, h);
        for i in 0..=isize_ as isize {
            for j in 0..jsize as isize {
                for k in 0..ksize as isize {
                    velocity.set_u(i, j, k, 1.0);
                }
            }
        }
        // all cells liquid
        let liquid_sdf = {
            let mut phi = ParticleLevelSet::new(isize_, jsize, ksize, h);
            phi.calculate_signed_distance_field(
                &(0..isize_)
                    .flat_map(|i| {
                        (0..jsize).flat_map(move |j| {
                            (0..ksize).map(move |k| crate::grid_index::cell_center(GridIndex::new(i as isize, j as isize, k as isize), h))
                        })
                    })
                    .collect::<Vec<_>>(),
                h,
            );
            phi
        };
        let mut field = TurbulenceField::new(isize_, jsize, ksize, h);
        field.calculate(&velocity, &liquid_sdf);
        for g in field.field().iter_indices() {
            assert!((*field.field().at(g.i, g.j, g.k)).abs() < 1e-6);
        }
    }
}
