//! Per-node whitewater influence field (§4.12): a scalar multiplier
//! on diffuse particle emission that decays toward a base level everywhere
//! except near solids tagged with a non-default influence. Grounded on
//! `influencegrid.h/.cpp`.

use crate::array3d::Array3d;
use crate::grid_index::GridIndex;
use crate::mesh_level_set::MeshLevelSet;

pub struct InfluenceGrid {
    isize_: usize,
    jsize: usize,
    ksize: usize,
    h: f64,
    base_level: f64,
    decay_rate: f64,
    narrow_band_width: f64,
    influence: Array3d<f64>,
}

impl InfluenceGrid {
    pub fn new(isize_: usize, jsize: usize, ksize: usize, h: f64, base_level: f64) -> Self {
        InfluenceGrid {
            isize_,
            jsize,
            ksize,
            h,
            base_level,
            decay_rate: 2.0,
            narrow_band_width: 3.0,
            influence: Array3d::new(isize_ + 1, jsize + 1, ksize + 1, base_level),
        }
    }

    pub fn influence(&self) -> &Array3d<f64> {
        &self.influence
    }

    pub fn base_level(&self) -> f64 {
        self.base_level
    }

    pub fn set_base_level(&mut self, level: f64) {
        self.base_level = level;
    }

    pub fn decay_rate(&self) -> f64 {
        self.decay_rate
    }

    pub fn set_decay_rate(&mut self, rate: f64) {
        self.decay_rate = rate;
    }

    /// `mesh_whitewater_influence[id]` gives the influence value a solid
    /// mesh object imparts to nodes near its surface; meshes with no entry
    /// contribute nothing (§6's trait boundary: this crate doesn't own mesh
    /// metadata, the caller's `external::MeshObject` table does).
    pub fn update(&mut self, solid_sdf: &MeshLevelSet, dt: f64, mesh_whitewater_influence: &[f64]) {
        self.update_decay(dt);
        self.update_influence_sources(solid_sdf, mesh_whitewater_influence);
    }

    fn update_decay(&mut self, dt: f64) {
        let rate = self.decay_rate * dt;
        for v in self.influence.as_mut_slice() {
            *v = if *v < self.base_level {
                (*v + rate).min(self.base_level)
            } else if *v > self.base_level {
                (*v - rate).max(self.base_level)
            } else {
                *v
            };
        }
    }

    fn update_influence_sources(&mut self, solid_sdf: &MeshLevelSet, mesh_whitewater_influence: &[f64]) {
        let width = self.narrow_band_width * self.h;
        for k in 0..=self.ksize as isize {
            for j in 0..=self.jsize as isize {
                for i in 0..=self.isize_ as isize {
                    if solid_sdf.get(i, j, k).abs() > width {
                        continue;
                    }
                    let g = GridIndex::new(i, j, k);
                    let mesh_id = *solid_sdf.closest_mesh_objects().get_idx(g).unwrap_or(&-1);
                    if mesh_id < 0 {
                        continue;
                    }
                    if let Some(&value) = mesh_whitewater_influence.get(mesh_id as usize) {
                        self.influence.set_idx(g, value);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::triangle_mesh::TriangleMesh;
    use crate::math::Point3;

    #[test]
    fn decays_toward_base_level_over_time() {
        let mut grid = InfluenceGrid::new(4, 4, 4, 0.1, 1.0);
        grid.influence.fill(5.0);
        let solid = MeshLevelSet::new(4, 4, 4, 0.1, 3.0);
        grid.update(&solid, 0.1, &[]);
        for v in grid.influence().as_slice() {
            assert!(*v < 5.0 && *v >= 1.0);
        }
    }

    #[test]
    fn mesh_influence_overrides_decayed_value_near_surface() {
        let h = 0.1;
        let mut solid = MeshLevelSet::new(4, 4, 4, h, 3.0);
        let verts = vec![
            Point3::new(0.0, 0.0, 0.2),
            Point3::new(0.5, 0.0, 0.2),
            Point3::new(0.0, 0.5, 0.2),
        ];
        let mesh = TriangleMesh::new(verts, vec![[0, 1, 2]]);
        solid.calculate_signed_distance_field(&mesh, 0, false);

        let mut grid = InfluenceGrid::new(4, 4, 4, h, 1.0);
        grid.update(&solid, 0.1, &[7.0]);
        let near_surface = *grid.influence().at(1, 1, 2);
        assert!((near_surface - 7.0).abs() < 1e-9 || (near_surface - 1.0).abs() < 1e-9);
    }
}
