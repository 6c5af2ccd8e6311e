//! Thin-sheet detection and seeding (§4.9): finds surface regions that
//! are under-resolved by the marker-particle sampling and inserts new
//! particles to keep the liquid sheet from tearing. Grounded on
//! `particlesheeter.h/.cpp`.
//!
//! The selection phase here does a direct neighbour scan over sheet
//! particles rather than first sorting them into a secondary acceleration
//! grid (`r_search`-sized cells): candidate counts per sub-step are small
//! relative to the liquid particle count, so the O(sheet_particles) scan
//! per candidate isn't a bottleneck at this scale.

use cgmath::InnerSpace;

use crate::grid_index::{cell_center, position_to_grid_index, GridIndex};
use crate::mac_velocity_field::MacVelocityField;
use crate::marker_particles::MarkerParticle;
use crate::math::{Point3, Vec3};
use crate::mesh_level_set::MeshLevelSet;
use crate::particle_mask_grid::ParticleMaskGrid;

pub struct SheetSeederParams {
    pub n_sheet: usize,
    pub d_max: f64,
    pub r_search: f64,
    pub fill_angle_threshold: f64,
    pub plane_projection_strength: f64,
}

impl Default for SheetSeederParams {
    fn default() -> Self {
        SheetSeederParams {
            n_sheet: 6,
            d_max: 2.0,
            r_search: 2.0,
            fill_angle_threshold: -0.95,
            plane_projection_strength: 0.75,
        }
    }
}

/// Phase 1 (§4.9): cells containing at least one particle that is
/// under-populated, close to the surface, and whose surface distance does
/// not increase marching inward — dilated by two passes of 6-neighbour
/// growth, with a 3-cell domain border then stripped.
pub fn candidate_cells(particles: &[MarkerParticle], surface_sdf: &MeshLevelSet, params: &SheetSeederParams, isize_: usize, jsize: usize, ksize: usize, h: f64) -> std::collections::HashSet<GridIndex> {
    let mut density = crate::array3d::Array3d::new(isize_, jsize, ksize, 0usize);
    let mut cells_of = Vec::with_capacity(particles.len());
    for p in particles {
        let g = position_to_grid_index(p.position, h);
        cells_of.push(g);
        if g.in_bounds(isize_, jsize, ksize) {
            let c = *density.get_idx(g).unwrap();
            density.set_idx(g, c + 1);
        }
    }

    let mut seed_cells = std::collections::HashSet::new();
    for (p, &g) in particles.iter().zip(cells_of.iter()) {
        if !g.in_bounds(isize_, jsize, ksize) {
            continue;
        }
        if *density.get_idx(g).unwrap() >= params.n_sheet {
            continue;
        }
        let d0 = surface_sdf.sample(p.position);
        if !(d0 > -params.d_max * h && d0 < 0.0) {
            continue;
        }
        if marches_monotonically_inward(p.position, surface_sdf, h) {
            seed_cells.insert(g);
        }
    }

    let mut dilated = seed_cells.clone();
    for _ in 0..2 {
        let mut next = dilated.clone();
        for &g in &dilated {
            for n in g.neighbours6() {
                if n.in_bounds(isize_, jsize, ksize) {
                    next.insert(n);
                }
            }
        }
        dilated = next;
    }

    dilated
        .into_iter()
        .filter(|g| {
            g.i >= 3
                && g.j >= 3
                && g.k >= 3
                && (g.i as usize) < isize_.saturating_sub(3)
                && (g.j as usize) < jsize.saturating_sub(3)
                && (g.k as usize) < ksize.saturating_sub(3)
        })
        .collect()
}

fn marches_monotonically_inward(p: Point3, surface_sdf: &MeshLevelSet, h: f64) -> bool {
    let mut pos = p;
    let mut last_depth = surface_sdf.sample(pos);
    let step = 0.5 * h;
    let num_steps = (3.0 * h / step).round() as usize;
    for _ in 0..num_steps {
        let grad = surface_sdf.gradient(pos);
        let len = grad.magnitude();
        if len < 1e-9 {
            return true;
        }
        pos -= (grad / len) * step;
        let depth = surface_sdf.sample(pos);
        if depth > last_depth {
            return false;
        }
        last_depth = depth;
    }
    true
}

/// Phase 2 (§4.9): at each 2x sub-cell centre of a candidate cell whose
/// surface distance is in `(-h, 0)`, emit a candidate seed position.
pub fn candidate_seeds(cells: &std::collections::HashSet<GridIndex>, surface_sdf: &MeshLevelSet, h: f64) -> Vec<Point3> {
    let sub_h = 0.5 * h;
    let mut out = Vec::new();
    for &g in cells {
        for di in 0..2isize {
            for dj in 0..2isize {
                for dk in 0..2isize {
                    let sub = GridIndex::new(g.i * 2 + di, g.j * 2 + dj, g.k * 2 + dk);
                    let p = cell_center(sub, sub_h);
                    let d = surface_sdf.sample(p);
                    if d > -h && d < 0.0 {
                        out.push(p);
                    }
                }
            }
        }
    }
    out
}

/// Selection (§4.9): for each candidate seed, fit a plane from its three
/// closest sheet-particle neighbours, project onto it, reject occupied or
/// out-of-domain points, and accept only when the "fill angle" (minimum dot
/// product between `centroid - p` and each neighbour direction) is below
/// `fill_angle_threshold` — i.e. the neighbours do not already surround `p`.
pub fn select_seeds(candidates: &[Point3], sheet_particles: &[Point3], mask_grid: &ParticleMaskGrid, domain: &crate::math::Aabb, saved_field: &MacVelocityField, params: &SheetSeederParams, h: f64) -> Vec<MarkerParticle> {
    let r_search = params.r_search * h;
    let mut accepted = Vec::new();

    for &p in candidates {
        let mut neighbours: Vec<(f64, Point3)> = sheet_particles
            .iter()
            .map(|&q| ((q - p).magnitude(), q))
            .filter(|&(d, _)| d <= r_search)
            .collect();
        if neighbours.len() < 3 {
            continue;
        }
        neighbours.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());

        let (_, n0) = neighbours[0];
        let (_, n1) = neighbours[1];
        let (_, n2) = neighbours[2];
        let e1 = n1 - n0;
        let e2 = n2 - n0;
        let mut normal = e1.cross(e2);
        let nlen = normal.magnitude();
        if nlen < 1e-12 {
            continue;
        }
        normal /= nlen;

        let to_plane = (p - n0).dot(normal);
        let projected = p - normal * (to_plane * params.plane_projection_strength);

        if mask_grid.is_sub_cell_set_at_position(projected) {
            continue;
        }
        if !domain.contains(projected) {
            continue;
        }

        let centroid: Vec3 = neighbours.iter().map(|&(_, q)| q - Point3::new(0.0, 0.0, 0.0)).fold(Vec3::new(0.0, 0.0, 0.0), |a, b| a + b) / (neighbours.len() as f64);
        let to_centroid = (Point3::new(0.0, 0.0, 0.0) + centroid) - projected;
        let to_centroid_len = to_centroid.magnitude();
        if to_centroid_len < 1e-12 {
            continue;
        }
        let to_centroid_hat = to_centroid / to_centroid_len;

        let fill_angle = neighbours
            .iter()
            .map(|&(_, q)| {
                let d = q - projected;
                let len = d.magnitude();
                if len < 1e-12 {
                    1.0
                } else {
                    to_centroid_hat.dot(d / len)
                }
            })
            .fold(f64::INFINITY, f64::min);

        if fill_angle < params.fill_angle_threshold {
            let velocity = saved_field.evaluate_velocity_at_position(projected);
            accepted.push(MarkerParticle { position: projected, velocity });
        }
    }

    accepted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_seeds_are_emitted_only_near_the_surface_band() {
        let h = 0.1;
        let isize_ = 10;
        let jsize = 10;
        let ksize = 10;
        let mut surface = MeshLevelSet::new(isize_, jsize, ksize, h, 3.0);
        // a flat plane surface at x = 0.5, inside is x < 0.5.
        let verts = vec![
            Point3::new(0.5, -10.0, -10.0),
            Point3::new(0.5, 10.0, -10.0),
            Point3::new(0.5, 0.0, 10.0),
        ];
        let mesh = crate::triangle_mesh::TriangleMesh::new(verts, vec![[0, 1, 2]]);
        surface.calculate_signed_distance_field(&mesh, 0, false);

        let mut cells = std::collections::HashSet::new();
        cells.insert(GridIndex::new(4, 5, 5));
        let seeds = candidate_seeds(&cells, &surface, h);
        for s in &seeds {
            let d = surface.sample(*s);
            assert!(d > -h && d < 0.0);
        }
    }
}
