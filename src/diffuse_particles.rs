//! Diffuse-particle (whitewater) simulation: emitter search, emission,
//! type classification, per-type advection and lifetime/removal (§4.10,
//! §4.11). Grounded on `diffuseparticle.h` (storage) and
//! `diffuseparticlesimulation.cpp` (emission/classification/advection).

use cgmath::InnerSpace;
use rand::Rng;
use strum_macros::EnumIter;

use crate::array3d::Array3d;
use crate::boundary::{ActiveSides, BoundaryBehaviour};
use crate::config::DiffuseMaterialConfig;
use crate::grid_index::position_to_grid_index;
use crate::mac_velocity_field::MacVelocityField;
use crate::math::{Aabb, Point3, Vec3};
use crate::mesh_level_set::MeshLevelSet;
use crate::particle_mask_grid::ParticleMaskGrid;

/// §4.10a: the `id` field's round-robin counter is what the 256-bin save
/// format (§6) keys on, not this classification — kept distinct fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, serde::Serialize, serde::Deserialize)]
pub enum DiffuseParticleType {
    Bubble,
    Foam,
    Spray,
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DiffuseParticle {
    pub position: Point3,
    pub velocity: Vec3,
    pub lifetime: f64,
    pub particle_type: DiffuseParticleType,
    pub id: u8,
}

struct Emitter {
    position: Point3,
    velocity: Vec3,
    energy_potential: f64,
    wavecrest_potential: f64,
    turbulence_potential: f64,
}

pub struct EmissionLimits {
    pub energy_min: f64,
    pub energy_max: f64,
    pub wavecrest_min_curvature: f64,
    pub wavecrest_max_curvature: f64,
    pub wavecrest_sharpness: f64,
    pub turbulence_min: f64,
    pub turbulence_max: f64,
    pub generation_rate: f64,
    pub narrow_band_cells: f64,
    pub emitter_radius_factor: f64,
    pub particle_radius: f64,
}

impl Default for EmissionLimits {
    fn default() -> Self {
        EmissionLimits {
            energy_min: 0.0,
            energy_max: 60.0,
            wavecrest_min_curvature: 0.4,
            wavecrest_max_curvature: 1.0,
            wavecrest_sharpness: 0.6,
            turbulence_min: 100.0,
            turbulence_max: 200.0,
            generation_rate: 1.0,
            narrow_band_cells: 1.0,
            emitter_radius_factor: 0.5,
            particle_radius: 0.5,
        }
    }
}

fn clamp01(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

fn energy_potential(speed_sq: f64, limits: &EmissionLimits) -> f64 {
    clamp01((0.5 * speed_sq - limits.energy_min) / (limits.energy_max - limits.energy_min))
}

/// `None` if the wave-crest criteria (curvature above threshold, velocity
/// aimed outward past `sharpness`) are not both met.
fn wavecrest_potential(kappa: f64, velocity: Vec3, normal: Vec3, limits: &EmissionLimits) -> Option<f64> {
    if kappa <= limits.wavecrest_min_curvature {
        return None;
    }
    let speed = velocity.magnitude();
    if speed < 1e-9 {
        return None;
    }
    if (velocity / speed).dot(normal) <= limits.wavecrest_sharpness {
        return None;
    }
    Some(clamp01((kappa - limits.wavecrest_min_curvature) / (limits.wavecrest_max_curvature - limits.wavecrest_min_curvature)))
}

fn turbulence_potential(t: f64, limits: &EmissionLimits) -> f64 {
    clamp01((t - limits.turbulence_min) / (limits.turbulence_max - limits.turbulence_min))
}

/// Trilinear sample of a node-centred scalar field (no `h/2` shift, unlike
/// `Array3d::interpolate`'s cell-centred convention) — mirrors
/// `MeshLevelSet::sample` for the curvature grid, which is built at node
/// positions by `ParticleLevelSet::calculate_curvature_grid`.
fn sample_node_centered(field: &Array3d<f64>, p: Point3, h: f64) -> f64 {
    let cf = crate::math::cell_and_fraction(p.x / h, p.y / h, p.z / h);
    let w = crate::math::trilinear_weights(cf.fx, cf.fy, cf.fz);
    let mut sum = 0.0;
    let mut total_w = 0.0;
    for di in 0..2isize {
        for dj in 0..2isize {
            for dk in 0..2isize {
                if let Some(v) = field.get(cf.i + di, cf.j + dj, cf.k + dk) {
                    let wt = w[di as usize][dj as usize][dk as usize];
                    sum += v * wt;
                    total_w += wt;
                }
            }
        }
    }
    if total_w > 0.0 {
        sum / total_w
    } else {
        0.0
    }
}

fn cell_borders_air(liquid_sdf: &crate::particle_level_set::ParticleLevelSet, isize_: usize, jsize: usize, ksize: usize, i: isize, j: isize, k: isize) -> bool {
    for (di, dj, dk) in [(-1, 0, 0), (1, 0, 0), (0, -1, 0), (0, 1, 0), (0, 0, -1), (0, 0, 1)] {
        let (ni, nj, nk) = (i + di, j + dj, k + dk);
        if ni < 0 || nj < 0 || nk < 0 || ni as usize >= isize_ || nj as usize >= jsize || nk as usize >= ksize {
            return true;
        }
        if liquid_sdf.get(ni, nj, nk) >= 0.0 {
            return true;
        }
    }
    false
}

/// Emitter search over marker particles (§4.10): for each particle classify
/// surface/inside by `|phi_surface| < d_narrow*h` and compute the relevant
/// potential(s); with probability `generation_rate`, emit.
fn search_emitters(
    marker_positions: &[Point3],
    marker_velocities: &[Vec3],
    surface_sdf: &MeshLevelSet,
    curvature: &Array3d<f64>,
    turbulence: &crate::turbulence_field::TurbulenceField,
    liquid_sdf: &crate::particle_level_set::ParticleLevelSet,
    isize_: usize,
    jsize: usize,
    ksize: usize,
    h: f64,
    limits: &EmissionLimits,
    rng: &mut impl Rng,
) -> Vec<Emitter> {
    let mut emitters = Vec::new();
    let band = limits.narrow_band_cells * h;

    for (&p, &v) in marker_positions.iter().zip(marker_velocities.iter()) {
        let d = surface_sdf.sample(p);
        let g = position_to_grid_index(p, h);
        let borders_air = g.in_bounds(isize_, jsize, ksize) && cell_borders_air(liquid_sdf, isize_, jsize, ksize, g.i, g.j, g.k);

        let (energy, wavecrest, turb) = if d.abs() < band && borders_air {
            let ie = energy_potential(v.magnitude2(), limits);
            let kappa = sample_node_centered(curvature, p, h);
            let normal = {
                let grad = surface_sdf.gradient(p);
                let len = grad.magnitude();
                if len > 1e-9 {
                    grad / len
                } else {
                    Vec3::new(0.0, 1.0, 0.0)
                }
            };
            let iwc = wavecrest_potential(kappa, v, normal, limits).unwrap_or(0.0);
            (ie, iwc, 0.0)
        } else if !borders_air {
            let t = turbulence.evaluate_at_position(p);
            (0.0, 0.0, turbulence_potential(t, limits))
        } else {
            (0.0, 0.0, 0.0)
        };

        if energy <= 0.0 && wavecrest <= 0.0 && turb <= 0.0 {
            continue;
        }
        if rng.gen::<f64>() >= limits.generation_rate {
            continue;
        }

        emitters.push(Emitter {
            position: p,
            velocity: v,
            energy_potential: energy,
            wavecrest_potential: wavecrest,
            turbulence_potential: turb,
        });
    }

    emitters
}

/// Emission (§4.10): `N = round(I_E*(r_wc*I_wc + r_t*I_t)*dt)` particles per
/// emitter, spawned in a cylinder of radius `r_emit` oriented along `v`, then
/// scaled by the obstacle whitewater-influence field (§4.12) sampled at
/// the emitter's position.
#[allow(clippy::too_many_arguments)]
fn emit_from_emitters(emitters: &[Emitter], config: &DiffuseMaterialConfig, limits: &EmissionLimits, dt: f64, influence: &Array3d<f64>, h: f64, id_counter: &mut u8, rng: &mut impl Rng) -> Vec<DiffuseParticle> {
    let mut out = Vec::new();

    for e in emitters {
        let influence_factor = sample_node_centered(influence, e.position, h);
        let n = (e.energy_potential * (config.wavecrest_rate * e.wavecrest_potential + config.turbulence_rate * e.turbulence_potential) * dt * influence_factor).round();
        if n <= 0.0 {
            continue;
        }
        let n = n as usize;

        let speed = e.velocity.magnitude();
        let dir = if speed > 1e-9 { e.velocity / speed } else { Vec3::new(0.0, 1.0, 0.0) };
        let (t1, t2) = orthonormal_basis(dir);
        let r_emit = limits.emitter_radius_factor * limits.particle_radius;

        for _ in 0..n {
            let theta = rng.gen::<f64>() * std::f64::consts::TAU;
            let radius = r_emit * rng.gen::<f64>().sqrt();
            let offset = t1 * (radius * theta.cos()) + t2 * (radius * theta.sin());
            let height = rng.gen::<f64>() * dt * speed;
            let position = e.position + offset + dir * height;

            let base = config.min_lifetime + rng.gen::<f64>() * (config.max_lifetime - config.min_lifetime);
            let variance = (rng.gen::<f64>() * 2.0 - 1.0) * config.lifetime_variance;
            let lifetime = (base + variance) * e.energy_potential;

            out.push(DiffuseParticle {
                position,
                velocity: e.velocity,
                lifetime,
                particle_type: DiffuseParticleType::Spray,
                id: *id_counter,
            });
            *id_counter = id_counter.wrapping_add(1);
        }
    }

    out
}

fn orthonormal_basis(n: Vec3) -> (Vec3, Vec3) {
    let helper = if n.x.abs() < 0.9 { Vec3::new(1.0, 0.0, 0.0) } else { Vec3::new(0.0, 1.0, 0.0) };
    let t1 = n.cross(helper).normalize();
    let t2 = n.cross(t1);
    (t1, t2)
}

pub struct ClassificationParams {
    pub foam_band_cells: f64,
    pub offset: f64,
    pub hysteresis: f64,
}

impl Default for ClassificationParams {
    fn default() -> Self {
        ClassificationParams { foam_band_cells: 0.5, offset: 0.0, hysteresis: 0.1 }
    }
}

/// Type classification (§4.10): distance-banded foam/bubble/spray with a
/// hysteresis buffer to stop foam<->bubble oscillation, and a hard override
/// to bubble whenever the particle's cell does not border air.
pub fn classify_types(particles: &mut [DiffuseParticle], surface_sdf: &MeshLevelSet, liquid_sdf: &crate::particle_level_set::ParticleLevelSet, isize_: usize, jsize: usize, ksize: usize, h: f64, params: &ClassificationParams) {
    let foam_upper = params.foam_band_cells * h + params.offset;
    let foam_lower = -params.foam_band_cells * h + params.offset;

    for p in particles.iter_mut() {
        let d = surface_sdf.sample(p.position);
        let g = position_to_grid_index(p.position, h);
        let borders_air = g.in_bounds(isize_, jsize, ksize) && cell_borders_air(liquid_sdf, isize_, jsize, ksize, g.i, g.j, g.k);

        if !borders_air {
            p.particle_type = DiffuseParticleType::Bubble;
            continue;
        }

        let hyst = params.hysteresis * h;
        let new_type = if p.particle_type == DiffuseParticleType::Foam {
            if d > foam_lower - hyst && d < foam_upper + hyst {
                DiffuseParticleType::Foam
            } else if d < foam_lower - hyst {
                DiffuseParticleType::Bubble
            } else {
                DiffuseParticleType::Spray
            }
        } else if d > foam_lower && d < foam_upper {
            DiffuseParticleType::Foam
        } else if d < foam_lower {
            DiffuseParticleType::Bubble
        } else {
            DiffuseParticleType::Spray
        };
        p.particle_type = new_type;
    }
}

/// Per-type advection (§4.10): spray drags through air under gravity,
/// bubbles buoy against the ambient field, foam is pushed ballistically by
/// `alpha_adv * V(p)`.
pub fn advect(particles: &mut [DiffuseParticle], velocity_field: &MacVelocityField, gravity: Vec3, dt: f64, config: &DiffuseMaterialConfig, alpha_foam_advection: f64) {
    for p in particles.iter_mut() {
        match p.particle_type {
            DiffuseParticleType::Spray => {
                p.velocity += gravity * dt - p.velocity * (config.drag_coefficient_spray * dt);
                p.position += p.velocity * dt;
            }
            DiffuseParticleType::Bubble => {
                let vf = velocity_field.evaluate_velocity_at_position(p.position);
                p.velocity += (-gravity * config.buoyancy_coefficient_bubble + (vf - p.velocity) * (config.drag_coefficient_bubble / dt.max(1e-9))) * dt;
                p.position += p.velocity * dt;
            }
            DiffuseParticleType::Foam => {
                let vf = velocity_field.evaluate_velocity_at_position(p.position);
                p.velocity = vf * alpha_foam_advection;
                p.position += p.velocity * dt;
            }
        }
    }
}

fn modifier_for(particle_type: DiffuseParticleType) -> f64 {
    match particle_type {
        DiffuseParticleType::Bubble => 1.0,
        DiffuseParticleType::Foam => 1.0,
        DiffuseParticleType::Spray => 1.0,
    }
}

pub struct LifetimeParams {
    pub preserve_foam: bool,
    pub min_density: usize,
    pub max_density: usize,
    pub density_bonus: f64,
}

/// Lifetime decrement and density-weighted foam preservation bonus, per
/// §4.10. Marking for removal (lifetime <= 0) is the caller's job via
/// `remove`, since removal also depends on boundary/solid tests.
pub fn tick_lifetime(particles: &mut [DiffuseParticle], dt: f64, isize_: usize, jsize: usize, ksize: usize, h: f64, params: &LifetimeParams) {
    let mut density = Array3d::new(isize_, jsize, ksize, 0usize);
    if params.preserve_foam {
        for p in particles.iter() {
            if p.particle_type != DiffuseParticleType::Foam {
                continue;
            }
            let g = position_to_grid_index(p.position, h);
            if g.in_bounds(isize_, jsize, ksize) {
                let c = *density.get_idx(g).unwrap();
                density.set_idx(g, c + 1);
            }
        }
    }

    for p in particles.iter_mut() {
        let mut decay = dt * modifier_for(p.particle_type);
        if params.preserve_foam && p.particle_type == DiffuseParticleType::Foam {
            let g = position_to_grid_index(p.position, h);
            if g.in_bounds(isize_, jsize, ksize) {
                let count = *density.get_idx(g).unwrap();
                if count >= params.min_density && count <= params.max_density {
                    decay -= params.density_bonus * dt;
                }
            }
        }
        p.lifetime -= decay.max(0.0);
    }
}

/// Per-particle speed ceiling (§4.10): `maxVelocityFactor*|v_new|` — particles
/// whose step displacement exceeds that speed are marked for removal by the
/// caller rather than clamped, matching the source's removal-not-clamp rule.
pub fn exceeds_speed_ceiling(old_position: Point3, new_position: Point3, max_velocity_factor: f64, new_velocity: Vec3, dt: f64) -> bool {
    if dt <= 0.0 {
        return false;
    }
    let displacement_speed = (new_position - old_position).magnitude() / dt;
    displacement_speed > max_velocity_factor * new_velocity.magnitude()
}

/// Collision resolution for diffuse particles (§4.11): type-aware dispatch
/// over `BoundaryBehaviour` — `Collide` reuses the marker-particle gradient
/// projection, `Ballistic` passes through inactive-side boundaries
/// unresolved, `Kill` is signalled by returning `None` for the caller to
/// remove the particle.
pub fn resolve_diffuse_collision(old_p: Point3, new_p: Point3, particle_type: DiffuseParticleType, solid_sdf: &MeshLevelSet, boundary: &Aabb, behaviours: &[BoundaryBehaviour; 3], active_sides: ActiveSides, cfl: f64, h: f64, solid_buffer: f64) -> Option<Point3> {
    let behaviour = behaviours[particle_type as usize];
    match behaviour {
        BoundaryBehaviour::Kill => {
            if solid_sdf.sample(new_p) < 0.0 || !boundary.contains(new_p) {
                None
            } else {
                Some(new_p)
            }
        }
        BoundaryBehaviour::Ballistic => {
            if solid_sdf.sample(new_p) < 0.0 {
                Some(crate::marker_particles::resolve_collision(old_p, new_p, solid_sdf, boundary, cfl, h, solid_buffer))
            } else if !boundary.contains(new_p) && crosses_inactive_side(new_p, boundary, active_sides) {
                Some(new_p)
            } else if !boundary.contains(new_p) {
                Some(boundary.clamp_point(new_p))
            } else {
                Some(new_p)
            }
        }
        BoundaryBehaviour::Collide => Some(crate::marker_particles::resolve_collision(old_p, new_p, solid_sdf, boundary, cfl, h, solid_buffer)),
    }
}

fn crosses_inactive_side(p: Point3, boundary: &Aabb, active_sides: ActiveSides) -> bool {
    (p.x < boundary.min.x && !active_sides.xmin())
        || (p.x > boundary.max.x && !active_sides.xmax())
        || (p.y < boundary.min.y && !active_sides.ymin())
        || (p.y > boundary.max.y && !active_sides.ymax())
        || (p.z < boundary.min.z && !active_sides.zmin())
        || (p.z > boundary.max.z && !active_sides.zmax())
}

/// Filters out particles with non-positive lifetime.
pub fn remove_expired(particles: Vec<DiffuseParticle>) -> Vec<DiffuseParticle> {
    particles.into_iter().filter(|p| p.lifetime > 0.0).collect()
}

/// Caps the live particle count by dropping the oldest-expiring particles
/// first when over `max_particles`.
pub fn enforce_particle_cap(mut particles: Vec<DiffuseParticle>, max_particles: usize) -> Vec<DiffuseParticle> {
    if particles.len() <= max_particles {
        return particles;
    }
    particles.sort_by(|a, b| b.lifetime.partial_cmp(&a.lifetime).unwrap());
    particles.truncate(max_particles);
    particles
}

#[allow(clippy::too_many_arguments)]
pub fn step(
    particles: Vec<DiffuseParticle>,
    marker_positions: &[Point3],
    marker_velocities: &[Vec3],
    surface_sdf: &MeshLevelSet,
    curvature: &Array3d<f64>,
    turbulence: &crate::turbulence_field::TurbulenceField,
    liquid_sdf: &crate::particle_level_set::ParticleLevelSet,
    solid_sdf: &MeshLevelSet,
    velocity_field: &MacVelocityField,
    boundary: &Aabb,
    mask_grid: &mut ParticleMaskGrid,
    influence: &Array3d<f64>,
    isize_: usize,
    jsize: usize,
    ksize: usize,
    h: f64,
    dt: f64,
    gravity: Vec3,
    cfl: f64,
    solid_buffer: f64,
    config: &DiffuseMaterialConfig,
    limits: &EmissionLimits,
    classification: &ClassificationParams,
    lifetime_params: &LifetimeParams,
    max_velocity_factor: f64,
    id_counter: &mut u8,
    rng: &mut impl Rng,
) -> Vec<DiffuseParticle> {
    let emitters = search_emitters(marker_positions, marker_velocities, surface_sdf, curvature, turbulence, liquid_sdf, isize_, jsize, ksize, h, limits, rng);
    let emitted = emit_from_emitters(&emitters, config, limits, dt, influence, h, id_counter, rng);

    let mut all = particles;
    all.extend(emitted);

    classify_types(&mut all, surface_sdf, liquid_sdf, isize_, jsize, ksize, h, classification);

    let old_positions: Vec<Point3> = all.iter().map(|p| p.position).collect();
    advect(&mut all, velocity_field, gravity, dt, config, 1.0);

    let mut survivors = Vec::with_capacity(all.len());
    for (i, mut p) in all.into_iter().enumerate() {
        if exceeds_speed_ceiling(old_positions[i], p.position, max_velocity_factor, p.velocity, dt) {
            continue;
        }
        let behaviours = config.boundary_behaviour;
        match resolve_diffuse_collision(old_positions[i], p.position, p.particle_type, solid_sdf, boundary, &behaviours, config.active_sides, cfl, h, solid_buffer) {
            None => continue,
            Some(resolved) => p.position = resolved,
        }
        survivors.push(p);
    }

    tick_lifetime(&mut survivors, dt, isize_, jsize, ksize, h, lifetime_params);
    let survivors = remove_expired(survivors);

    mask_grid.clear();
    for p in &survivors {
        mask_grid.add_particle(p.position);
    }

    survivors
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn energy_potential_clamps_to_unit_interval() {
        let limits = EmissionLimits::default();
        assert_eq!(energy_potential(-1000.0, &limits), 0.0);
        assert_eq!(energy_potential(1e9, &limits), 1.0);
    }

    #[test]
    fn wavecrest_potential_rejects_flat_or_inward_velocity() {
        let limits = EmissionLimits::default();
        let normal = Vec3::new(0.0, 1.0, 0.0);
        assert!(wavecrest_potential(0.1, Vec3::new(0.0, 1.0, 0.0), normal, &limits).is_none());
        assert!(wavecrest_potential(0.9, Vec3::new(0.0, -1.0, 0.0), normal, &limits).is_none());
        assert!(wavecrest_potential(0.9, Vec3::new(0.0, 1.0, 0.0), normal, &limits).is_some());
    }

    #[test]
    fn non_air_bordering_cell_forces_bubble_classification() {
        let h = 0.1;
        let isize_ = 4;
        let jsize = 4;
        let ksize = 4;
        let mut liquid_sdf = crate::particle_level_set::ParticleLevelSet::new(isize_, jsize, ksize, h);
        let positions: Vec<Point3> = (0..isize_)
            .flat_map(|i| (0..jsize).flat_map(move |j| (0..ksize).map(move |k| (i, j, k))))
            .map(|(i, j, k)| crate::grid_index::cell_center(crate::grid_index::GridIndex::new(i as isize, j as isize, k as isize), h))
            .collect();
        liquid_sdf.calculate_signed_distance_field(&positions, h);

        let mut surface = MeshLevelSet::new(isize_, jsize, ksize, h, 3.0);
        let verts = vec![Point3::new(10.0, 10.0, 10.0), Point3::new(11.0, 10.0, 10.0), Point3::new(10.0, 11.0, 10.0)];
        surface.calculate_signed_distance_field(&crate::triangle_mesh::TriangleMesh::new(verts, vec![[0, 1, 2]]), 0, false);

        let mut particles = vec![DiffuseParticle {
            position: crate::grid_index::cell_center(crate::grid_index::GridIndex::new(1, 1, 1), h),
            velocity: Vec3::new(0.0, 0.0, 0.0),
            lifetime: 1.0,
            particle_type: DiffuseParticleType::Spray,
            id: 0,
        }];
        classify_types(&mut particles, &surface, &liquid_sdf, isize_, jsize, ksize, h, &ClassificationParams::default());
        assert_eq!(particles[0].particle_type, DiffuseParticleType::Bubble);
    }

    #[test]
    fn emission_count_scales_with_energy_and_wavecrest_potential() {
        let mut rng = rand::rngs::SmallRng::seed_from_u64(42);
        let emitters = vec![Emitter { position: Point3::new(0.0, 0.0, 0.0), velocity: Vec3::new(0.0, 1.0, 0.0), energy_potential: 1.0, wavecrest_potential: 1.0, turbulence_potential: 0.0 }];
        let config = DiffuseMaterialConfig::default();
        let limits = EmissionLimits::default();
        let influence = Array3d::new(2, 2, 2, 1.0);
        let mut id_counter = 0u8;
        let out = emit_from_emitters(&emitters, &config, &limits, 1.0, &influence, 0.1, &mut id_counter, &mut rng);
        assert!(!out.is_empty());
    }
}
