//! Marker-particle transfer, advection and removal pipeline (§4.8).
//! Grounded on `particlesystem.h/.cpp` (the particle container contract) and
//! the corresponding sections of `fluidsimulation.cpp` (transfer weighting,
//! RK3 advection, collision marching, removal passes).

use cgmath::InnerSpace;
use rayon::prelude::*;

use crate::array3d::Array3d;
use crate::grid_index::{position_to_grid_index, GridIndex};
use crate::mac_velocity_field::{extrapolate_velocity_field, Axis, MacVelocityField, ValidVelocityGrid};
use crate::math::{Aabb, Point3, Vec3};
use crate::mesh_level_set::MeshLevelSet;

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MarkerParticle {
    pub position: Point3,
    pub velocity: Vec3,
}

/// Linear-kernel splat of every particle's velocity onto the eight
/// surrounding faces of each of `U`, `V`, `W`. Per axis, the two
/// perpendicular directions use a linear (tent) kernel and the component's
/// own direction uses a one-sided weight; numerator/denominator accumulate
/// per face and the face value is `num/den` wherever `den > 0`.
pub fn transfer_to_grid(particles: &[MarkerParticle], isize_: usize, jsize: usize, ksize: usize, h: f64) -> (MacVelocityField, ValidVelocityGrid) {
    let mut field = MacVelocityField::new(isize_, jsize, ksize, h);
    let mut valid = ValidVelocityGrid::new(isize_, jsize, ksize);

    splat_component(particles, Axis::U, Vec3::new(0.0, 0.5 * h, 0.5 * h), h, field.component_mut(Axis::U), valid.component_mut(Axis::U), |v| v.x);
    splat_component(particles, Axis::V, Vec3::new(0.5 * h, 0.0, 0.5 * h), h, field.component_mut(Axis::V), valid.component_mut(Axis::V), |v| v.y);
    splat_component(particles, Axis::W, Vec3::new(0.5 * h, 0.5 * h, 0.0), h, field.component_mut(Axis::W), valid.component_mut(Axis::W), |v| v.z);

    (field, valid)
}

fn splat_component(
    particles: &[MarkerParticle],
    _axis: Axis,
    face_offset: Vec3,
    h: f64,
    out: &mut Array3d<f64>,
    valid: &mut Array3d<bool>,
    component: impl Fn(Vec3) -> f64,
) {
    let (isize_, jsize, ksize) = out.dims();
    let mut numerator = Array3d::new(isize_, jsize, ksize, 0.0);
    let mut denominator = Array3d::new(isize_, jsize, ksize, 0.0);

    for p in particles {
        let local = p.position - face_offset;
        let gx = local.x / h;
        let gy = local.y / h;
        let gz = local.z / h;
        let i0 = gx.floor() as isize;
        let j0 = gy.floor() as isize;
        let k0 = gz.floor() as isize;
        let fx = gx - i0 as f64;
        let fy = gy - j0 as f64;
        let fz = gz - k0 as f64;
        let val = component(p.velocity);

        for di in 0..2isize {
            for dj in 0..2isize {
                for dk in 0..2isize {
                    let g = GridIndex::new(i0 + di, j0 + dj, k0 + dk);
                    if !g.in_bounds(isize_, jsize, ksize) {
                        continue;
                    }
                    let wx = if di == 0 { 1.0 - fx } else { fx };
                    let wy = if dj == 0 { 1.0 - fy } else { fy };
                    let wz = if dk == 0 { 1.0 - fz } else { fz };
                    let w = wx * wy * wz;
                    if w <= 0.0 {
                        continue;
                    }
                    numerator.add(g.i, g.j, g.k, w * val);
                    denominator.add(g.i, g.j, g.k, w);
                }
            }
        }
    }

    for g in out.iter_indices().collect::<Vec<_>>() {
        let den = *denominator.get_idx(g).unwrap();
        if den > 0.0 {
            out.set_idx(g, *numerator.get_idx(g).unwrap() / den);
            valid.set_idx(g, true);
        }
    }
}

/// Completes the transfer with extrapolation, per §4.2/§4.8: `L = ceil(CFL) + 2`.
pub fn extrapolate_transferred_velocity(field: &mut MacVelocityField, valid: &ValidVelocityGrid, cfl: f64) {
    extrapolate_velocity_field(field, valid, cfl);
}

/// PIC/FLIP blend (§4.8): `v = alpha*v_PIC + (1-alpha)*v_FLIP` where
/// `v_FLIP = v_prev + (v_PIC - interp_saved(p))`.
pub fn pic_flip_update(particles: &mut [MarkerParticle], new_field: &MacVelocityField, saved_field: &MacVelocityField, alpha: f64) {
    for p in particles.iter_mut() {
        let v_pic = new_field.evaluate_velocity_at_position(p.position);
        let v_saved = saved_field.evaluate_velocity_at_position(p.position);
        let v_flip = p.velocity + (v_pic - v_saved);
        p.velocity = alpha * v_pic + (1.0 - alpha) * v_flip;
    }
}

/// Third-order Runge-Kutta advection of every particle's position through
/// `field`, in place (velocities are unchanged; advection moves position
/// only per §4.8).
pub fn advect_rk3(particles: &mut [MarkerParticle], field: &MacVelocityField, dt: f64) {
    particles.par_iter_mut().for_each(|p| {
        let k1 = field.evaluate_velocity_at_position(p.position);
        let k2 = field.evaluate_velocity_at_position(p.position + k1 * (0.5 * dt));
        let k3 = field.evaluate_velocity_at_position(p.position + k2 * (0.75 * dt));
        p.position += (dt / 9.0) * (2.0 * k1 + 3.0 * k2 + 4.0 * k3);
    });
}

/// Collision resolution for a single particle's displacement from `old_p` to
/// `new_p` (§4.8). Marches in `0.25h` steps; on first detected collision,
/// projects along the solid gradient sampled at the colliding point, with a
/// CFL-bounded rejection back to the last valid sample.
pub fn resolve_collision(old_p: Point3, new_p: Point3, solid_sdf: &MeshLevelSet, boundary: &Aabb, cfl: f64, h: f64, solid_buffer: f64) -> Point3 {
    let displacement = new_p - old_p;
    let dist = displacement.magnitude();
    if dist < 1e-12 {
        return new_p;
    }

    let step_dist = 0.25 * h;
    let num_steps = (dist / step_dist).ceil().max(1.0) as usize;
    let dir = displacement / dist;

    let mut last_position = old_p;
    let mut collided_at: Option<(Point3, f64)> = None;

    for step_idx in 0..num_steps {
        let current = if step_idx == num_steps - 1 {
            new_p
        } else {
            old_p + dir * (step_dist * (step_idx + 1) as f64)
        };
        let phi = solid_sdf.sample(current);
        if phi < 0.0 || !boundary.contains(current) {
            collided_at = Some((current, phi));
            break;
        }
        last_position = current;
    }

    let (collision_point, collision_phi) = match collided_at {
        None => return new_p,
        Some(c) => c,
    };

    let max_resolved_distance = cfl * h;
    let grad = solid_sdf.gradient(collision_point);
    let grad_len = grad.magnitude();

    let mut resolved = if grad_len > 1e-9 {
        let n = grad / grad_len;
        let candidate = collision_point - (collision_phi - solid_buffer * h) * n;
        let resolved_phi = solid_sdf.sample(candidate);
        let resolved_dist = (candidate - collision_point).magnitude();
        if resolved_phi < 0.0 || resolved_dist > max_resolved_distance {
            last_position
        } else {
            candidate
        }
    } else {
        last_position
    };

    if !boundary.contains(resolved) {
        let original = resolved;
        let clamped = boundary.clamp_point(resolved);
        let resolved_phi = solid_sdf.sample(clamped);
        let resolved_dist = (clamped - original).magnitude();
        resolved = if resolved_phi < 0.0 || resolved_dist > max_resolved_distance {
            last_position
        } else {
            clamped
        };
    }

    resolved
}

pub fn resolve_collisions(old_positions: &[Point3], new_positions: &mut [Point3], solid_sdf: &MeshLevelSet, boundary: &Aabb, cfl: f64, h: f64, solid_buffer: f64) {
    new_positions.par_iter_mut().zip(old_positions.par_iter()).for_each(|(new_p, &old_p)| {
        *new_p = resolve_collision(old_p, *new_p, solid_sdf, boundary, cfl, h, solid_buffer);
    });
}

/// §4.8 removal passes, run in order: inside-solid, per-cell density cap,
/// extreme-velocity speed-histogram cap. Diffuse-particle removal (step 4)
/// lives in `diffuse_particles`. Returns the surviving particles.
pub fn remove_particles(particles: &[MarkerParticle], solid_sdf: &MeshLevelSet, isize_: usize, jsize: usize, ksize: usize, h: f64, max_per_cell: usize, cfl: f64, dt: f64) -> Vec<MarkerParticle> {
    let n = particles.len();
    if n == 0 {
        return Vec::new();
    }

    let max_speed = marker_particle_speed_limit(particles, cfl, h, dt);
    let max_speed_sq = max_speed * max_speed;

    let mut removed = vec![false; n];
    for (i, p) in particles.iter().enumerate() {
        if solid_sdf.sample(p.position) < 0.0 {
            removed[i] = true;
        }
    }

    let mut count_grid = Array3d::new(isize_, jsize, ksize, 0usize);
    for (i, p) in particles.iter().enumerate() {
        if removed[i] {
            continue;
        }
        let g = position_to_grid_index(p.position, h);
        if !g.in_bounds(isize_, jsize, ksize) {
            removed[i] = true;
            continue;
        }
        let current = *count_grid.get_idx(g).unwrap();
        if current >= max_per_cell {
            removed[i] = true;
            continue;
        }
        count_grid.set_idx(g, current + 1);

        if p.velocity.magnitude2() > max_speed_sq {
            removed[i] = true;
        }
    }

    particles
        .iter()
        .zip(removed.iter())
        .filter(|(_, &r)| !r)
        .map(|(p, _)| *p)
        .collect()
}

const MAX_FRAME_TIME_STEPS: usize = 64;
const MAX_EXTREME_VELOCITY_REMOVAL_PERCENT: f64 = 0.01;
const MAX_EXTREME_VELOCITY_REMOVAL_ABSOLUTE: usize = 32;

/// Picks the largest speed such that removing everything above it removes at
/// most `min(0.01*N, 32)` particles, via a speed histogram (§4.8 step 3).
fn marker_particle_speed_limit(particles: &[MarkerParticle], cfl: f64, h: f64, dt: f64) -> f64 {
    if dt <= 0.0 {
        return f64::INFINITY;
    }
    let speed_limit_step = cfl * h / dt;
    let mut counts = vec![0usize; MAX_FRAME_TIME_STEPS];
    for p in particles {
        let speed = p.velocity.magnitude();
        let idx = ((speed / speed_limit_step).floor() as usize).min(MAX_FRAME_TIME_STEPS - 1);
        counts[idx] += 1;
    }

    let max_removal_count = ((particles.len() as f64 * MAX_EXTREME_VELOCITY_REMOVAL_PERCENT) as usize).min(MAX_EXTREME_VELOCITY_REMOVAL_ABSOLUTE);
    let mut max_speed = MAX_FRAME_TIME_STEPS as f64 * speed_limit_step;
    let mut current_removal_count = 0usize;
    for i in (1..counts.len()).rev() {
        if current_removal_count + counts[i] > max_removal_count {
            break;
        }
        current_removal_count += counts[i];
        max_speed = i as f64 * speed_limit_step;
    }
    max_speed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_round_trips_a_uniform_velocity_field() {
        let isize_ = 4;
        let jsize = 4;
        let ksize = 4;
        let h = 0.1;
        let mut particles = Vec::new();
        for i in 0..isize_ {
            for j in 0..jsize {
                for k in 0..ksize {
                    let c = crate::grid_index::cell_center(GridIndex::new(i as isize, j as isize, k as isize), h);
                    particles.push(MarkerParticle { position: c, velocity: Vec3::new(1.0, 0.0, 0.0) });
                }
            }
        }
        let (field, _valid) = transfer_to_grid(&particles, isize_, jsize, ksize, h);
        let v = field.evaluate_velocity_at_position(crate::grid_index::cell_center(GridIndex::new(2, 2, 2), h));
        assert!((v.x - 1.0).abs() < 1e-6);
    }

    #[test]
    fn advection_of_zero_velocity_field_does_not_move_particles() {
        let field = MacVelocityField::new(4, 4, 4, 0.1);
        let mut particles = vec![MarkerParticle { position: Point3::new(0.2, 0.2, 0.2), velocity: Vec3::new(0.0, 0.0, 0.0) }];
        let before = particles[0].position;
        advect_rk3(&mut particles, &field, 0.01);
        assert!((particles[0].position - before).magnitude() < 1e-9);
    }

    fn unit_box_mesh() -> crate::triangle_mesh::TriangleMesh {
        let v = |x: f64, y: f64, z: f64| Point3::new(x, y, z);
        let verts = vec![
            v(0.0, 0.0, 0.0),
            v(1.0, 0.0, 0.0),
            v(1.0, 1.0, 0.0),
            v(0.0, 1.0, 0.0),
            v(0.0, 0.0, 1.0),
            v(1.0, 0.0, 1.0),
            v(1.0, 1.0, 1.0),
            v(0.0, 1.0, 1.0),
        ];
        let tris: Vec<[u32; 3]> = vec![
            [0, 1, 2], [0, 2, 3],
            [4, 6, 5], [4, 7, 6],
            [0, 4, 5], [0, 5, 1],
            [1, 5, 6], [1, 6, 2],
            [2, 6, 7], [2, 7, 3],
            [3, 7, 4], [3, 4, 0],
        ];
        crate::triangle_mesh::TriangleMesh::new(verts, tris)
    }

    #[test]
    fn inside_solid_particles_are_removed() {
        let h = 0.2;
        let mut solid = MeshLevelSet::new(10, 10, 10, h, 3.0);
        solid.calculate_signed_distance_field(&unit_box_mesh(), 0, false);
        let particles = vec![MarkerParticle { position: Point3::new(0.5, 0.5, 0.5), velocity: Vec3::new(0.0, 0.0, 0.0) }];
        let survivors = remove_particles(&particles, &solid, 10, 10, 10, h, 16, 5.0, 0.01);
        assert!(survivors.is_empty());
    }
}
