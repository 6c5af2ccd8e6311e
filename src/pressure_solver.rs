//! Variational pressure projection (§4.6).
//!
//! Based on the ghost-fluid variational method of Batty, Bertails & Bridson,
//! "A Fast Variational Framework for Accurate Solid-Fluid Coupling": builds
//! a symmetric Poisson system over fluid cells only, weighted by the solid
//! and free-surface fractions already computed in [`crate::weight_grid`] and
//! [`crate::level_set_utils`], solves it with [`crate::sparse_matrix`], and
//! removes the resulting pressure gradient from the MAC velocity field.

use crate::array3d::Array3d;
use crate::grid_index::GridIndex;
use crate::level_set_utils::fraction_inside_segment;
use crate::mac_velocity_field::{MacVelocityField, ValidVelocityGrid};
use crate::mesh_level_set::MeshLevelSet;
use crate::particle_level_set::ParticleLevelSet;
use crate::pressure_cell_index::PressureCellIndex;
use crate::sparse_matrix::{inf_norm, solve_pcg, PcgResult, SparseMatrix};
use crate::weight_grid::WeightGrid;

const MIN_FRACTION: f64 = 0.01;
const SOLID_FACE_EPS: f64 = 1e-6;

pub struct PressureSolverParams<'a> {
    pub cell_width: f64,
    pub delta_time: f64,
    pub tolerance: f64,
    pub acceptable_tolerance: f64,
    pub max_iterations: usize,
    pub liquid_sdf: &'a ParticleLevelSet,
    pub weight_grid: &'a WeightGrid,
    /// `(surface tension coefficient, cell-centred curvature)`, same
    /// dimensions as `liquid_sdf`. `None` disables the surface tension term.
    pub surface_tension: Option<(f64, &'a Array3d<f64>)>,
}

#[derive(Debug, Clone, Copy)]
pub struct PressureSolveReport {
    pub pcg: PcgResult,
    pub num_pressure_cells: usize,
    /// `true` when `pcg` converged, or stalled at the max iteration count
    /// within the looser acceptable tolerance (§4.6's two-tier contract).
    pub accepted: bool,
}

pub struct PressureSolver {
    isize_: usize,
    jsize: usize,
    ksize: usize,
}

impl PressureSolver {
    pub fn new(isize_: usize, jsize: usize, ksize: usize) -> Self {
        PressureSolver { isize_, jsize, ksize }
    }

    /// Mutates `velocity` in place (removes the pressure gradient, marking
    /// corrected faces valid) and `solid` in place (isolated-pocket
    /// conditioning zeroes a handful of boundary solid velocities).
    pub fn solve(
        &self,
        params: PressureSolverParams,
        velocity: &mut MacVelocityField,
        valid: &mut ValidVelocityGrid,
        solid: &mut MeshLevelSet,
    ) -> PressureSolveReport {
        condition_solid_velocity_field(self.isize_, self.jsize, self.ksize, params.liquid_sdf, params.weight_grid, solid);

        let pressure_cells = collect_pressure_cells(self.isize_, self.jsize, self.ksize, params.liquid_sdf);
        let mut index = PressureCellIndex::new(self.isize_, self.jsize, self.ksize);
        for (row, &g) in pressure_cells.iter().enumerate() {
            index.insert(g, row);
        }
        let n = pressure_cells.len();

        let mut rhs = vec![0.0; n];
        calculate_negative_divergence(&pressure_cells, velocity, solid, params.weight_grid, params.cell_width, &mut rhs);

        if inf_norm(&rhs) < params.tolerance {
            return PressureSolveReport {
                pcg: PcgResult { converged: true, residual: 0.0, iterations: 0 },
                num_pressure_cells: n,
                accepted: true,
            };
        }

        let mut matrix = SparseMatrix::new(n);
        calculate_matrix_coefficients(
            &pressure_cells,
            &index,
            params.liquid_sdf,
            params.weight_grid,
            params.cell_width,
            params.delta_time,
            params.surface_tension,
            &mut matrix,
            &mut rhs,
        );

        let mut soln = vec![0.0; n];
        let pcg = solve_pcg(&matrix, &rhs, params.tolerance, params.max_iterations, &mut soln);
        let accepted = pcg.converged
            || (pcg.iterations >= params.max_iterations && pcg.residual < params.acceptable_tolerance);

        let mut pressure = Array3d::new(self.isize_, self.jsize, self.ksize, 0.0);
        for (row, &g) in pressure_cells.iter().enumerate() {
            pressure.set_idx(g, soln[row]);
        }

        apply_pressure_gradient(
            &pressure,
            params.liquid_sdf,
            params.weight_grid,
            params.surface_tension,
            params.cell_width,
            params.delta_time,
            velocity,
            valid,
        );

        PressureSolveReport { pcg, num_pressure_cells: n, accepted }
    }
}

fn collect_pressure_cells(isize_: usize, jsize: usize, ksize: usize, liquid_sdf: &ParticleLevelSet) -> Vec<GridIndex> {
    let mut cells = Vec::new();
    for k in 1..ksize as isize - 1 {
        for j in 1..jsize as isize - 1 {
            for i in 1..isize_ as isize - 1 {
                if liquid_sdf.get(i, j, k) < 0.0 {
                    cells.push(GridIndex::new(i, j, k));
                }
            }
        }
    }
    cells
}

/// §4.6 step 0: detects sealed fluid pockets that border no air cell and
/// zeroes the solid velocities bounding them, so the projection doesn't
/// have to reconcile an over-determined all-solid boundary. Ported from
/// the condition-solid-velocity-field pass of the reference solver, using
/// the same `1e-6` open-face epsilon.
fn condition_solid_velocity_field(
    isize_: usize,
    jsize: usize,
    ksize: usize,
    liquid_sdf: &ParticleLevelSet,
    weights: &WeightGrid,
    solid: &mut MeshLevelSet,
) {
    let mut borders_air = Array3d::new(isize_, jsize, ksize, false);
    for k in 1..ksize as isize - 1 {
        for j in 1..jsize as isize - 1 {
            for i in 1..isize_ as isize - 1 {
                let open = |w: f64| w >= SOLID_FACE_EPS;
                let touches_air = (open(*weights.u.at(i, j, k)) && liquid_sdf.get(i - 1, j, k) >= 0.0)
                    || (open(*weights.u.at(i + 1, j, k)) && liquid_sdf.get(i + 1, j, k) >= 0.0)
                    || (open(*weights.v.at(i, j, k)) && liquid_sdf.get(i, j - 1, k) >= 0.0)
                    || (open(*weights.v.at(i, j + 1, k)) && liquid_sdf.get(i, j + 1, k) >= 0.0)
                    || (open(*weights.w.at(i, j, k)) && liquid_sdf.get(i, j, k - 1) >= 0.0)
                    || (open(*weights.w.at(i, j, k + 1)) && liquid_sdf.get(i, j, k + 1) >= 0.0);
                borders_air.set(i, j, k, touches_air);
            }
        }
    }

    let mut processed = Array3d::new(isize_, jsize, ksize, false);
    for k in 1..ksize as isize - 1 {
        for j in 1..jsize as isize - 1 {
            for i in 1..isize_ as isize - 1 {
                if liquid_sdf.get(i, j, k) >= 0.0 {
                    processed.set(i, j, k, true);
                    continue;
                }
                if *processed.at(i, j, k) {
                    continue;
                }

                let seed = GridIndex::new(i, j, k);
                let mut stack = vec![seed];
                processed.set_idx(seed, true);
                let mut group = Vec::new();

                while let Some(g) = stack.pop() {
                    for n in g.neighbours6() {
                        if !n.in_bounds(isize_, jsize, ksize) || *processed.get_idx(n).unwrap_or(&true) {
                            continue;
                        }
                        if liquid_sdf.get(n.i, n.j, n.k) < 0.0 && open_face_between(weights, g, n) {
                            stack.push(n);
                            processed.set_idx(n, true);
                        }
                    }
                    group.push(g);
                }

                if group.len() == 1 {
                    continue;
                }
                let isolated = group.iter().all(|&g| !*borders_air.get_idx(g).unwrap_or(&true));
                if isolated {
                    for &g in &group {
                        solid.set_face_velocity_u(g.i, g.j, g.k, 0.0);
                        solid.set_face_velocity_u(g.i + 1, g.j, g.k, 0.0);
                        solid.set_face_velocity_v(g.i, g.j, g.k, 0.0);
                        solid.set_face_velocity_v(g.i, g.j + 1, g.k, 0.0);
                        solid.set_face_velocity_w(g.i, g.j, g.k, 0.0);
                        solid.set_face_velocity_w(g.i, g.j, g.k + 1, 0.0);
                    }
                }
            }
        }
    }
}

/// The open-face weight governing whether fluid can move from cell `from`
/// into its neighbour `to`.
fn open_face_between(weights: &WeightGrid, from: GridIndex, to: GridIndex) -> bool {
    let eps = SOLID_FACE_EPS;
    if to.i == from.i - 1 {
        *weights.u.at(from.i, from.j, from.k) >= eps
    } else if to.i == from.i + 1 {
        *weights.u.at(to.i, to.j, to.k) >= eps
    } else if to.j == from.j - 1 {
        *weights.v.at(from.i, from.j, from.k) >= eps
    } else if to.j == from.j + 1 {
        *weights.v.at(to.i, to.j, to.k) >= eps
    } else if to.k == from.k - 1 {
        *weights.w.at(from.i, from.j, from.k) >= eps
    } else {
        *weights.w.at(to.i, to.j, to.k) >= eps
    }
}

fn calculate_negative_divergence(
    cells: &[GridIndex],
    velocity: &MacVelocityField,
    solid: &MeshLevelSet,
    weights: &WeightGrid,
    dx: f64,
    rhs: &mut [f64],
) {
    struct SyncPtr(*mut f64);
    unsafe impl Sync for SyncPtr {}

    let rhs_ptr = SyncPtr(rhs.as_mut_ptr());
    crate::threading::for_each_interval(cells.len(), move |start, end| {
        for idx in start..end {
            let g = cells[idx];
            let (i, j, k) = (g.i, g.j, g.k);

            let mut divergence = 0.0;
            divergence -= weights.u.at(i + 1, j, k) * velocity.u(i + 1, j, k);
            divergence += weights.u.at(i, j, k) * velocity.u(i, j, k);
            divergence -= weights.v.at(i, j + 1, k) * velocity.v(i, j + 1, k);
            divergence += weights.v.at(i, j, k) * velocity.v(i, j, k);
            divergence -= weights.w.at(i, j, k + 1) * velocity.w(i, j, k + 1);
            divergence += weights.w.at(i, j, k) * velocity.w(i, j, k);

            let vol = *weights.center.at(i, j, k);
            divergence += (weights.u.at(i + 1, j, k) - vol) * solid.face_velocity_u(i + 1, j, k);
            divergence -= (weights.u.at(i, j, k) - vol) * solid.face_velocity_u(i, j, k);
            divergence += (weights.v.at(i, j + 1, k) - vol) * solid.face_velocity_v(i, j + 1, k);
            divergence -= (weights.v.at(i, j, k) - vol) * solid.face_velocity_v(i, j, k);
            divergence += (weights.w.at(i, j, k + 1) - vol) * solid.face_velocity_w(i, j, k + 1);
            divergence -= (weights.w.at(i, j, k) - vol) * solid.face_velocity_w(i, j, k);

            divergence /= dx;
            // SAFETY: disjoint index ranges per interval, no aliasing writes.
            unsafe {
                *rhs_ptr.0.add(idx) = divergence;
            }
        }
    });
}

#[allow(clippy::too_many_arguments)]
fn calculate_matrix_coefficients(
    cells: &[GridIndex],
    index: &PressureCellIndex,
    liquid_sdf: &ParticleLevelSet,
    weights: &WeightGrid,
    dx: f64,
    dt: f64,
    surface_tension: Option<(f64, &Array3d<f64>)>,
    matrix: &mut SparseMatrix,
    rhs: &mut [f64],
) {
    let scale = dt / (dx * dx);

    for (row, &g) in cells.iter().enumerate() {
        let (i, j, k) = (g.i, g.j, g.k);
        let mut diag = 0.0;

        let mut couple = |neighbour: GridIndex, phi_self: f64, phi_neighbour: f64, weight: f64, diag: &mut f64| {
            let term = weight * scale;
            if term <= 0.0 {
                return;
            }
            if phi_neighbour < 0.0 {
                *diag += term;
                if let Some(col) = index.find(neighbour) {
                    matrix.add(row, col, -term);
                }
                // else: neighbour lies outside the solver's interior band; treated as a
                // zero-flux boundary, matching the reference solver's pressure-cell bounds.
            } else {
                let theta = fraction_inside_segment(phi_self, phi_neighbour).max(MIN_FRACTION);
                *diag += term / theta;
                if let Some((sigma, curvature)) = surface_tension {
                    let kappa = curvature.get_idx(neighbour).copied().unwrap_or(0.0);
                    rhs[row] -= (term / theta) * sigma * kappa;
                }
            }
        };

        let phi_c = liquid_sdf.get(i, j, k);
        couple(GridIndex::new(i + 1, j, k), phi_c, liquid_sdf.get(i + 1, j, k), *weights.u.at(i + 1, j, k), &mut diag);
        couple(GridIndex::new(i - 1, j, k), phi_c, liquid_sdf.get(i - 1, j, k), *weights.u.at(i, j, k), &mut diag);
        couple(GridIndex::new(i, j + 1, k), phi_c, liquid_sdf.get(i, j + 1, k), *weights.v.at(i, j + 1, k), &mut diag);
        couple(GridIndex::new(i, j - 1, k), phi_c, liquid_sdf.get(i, j - 1, k), *weights.v.at(i, j, k), &mut diag);
        couple(GridIndex::new(i, j, k + 1), phi_c, liquid_sdf.get(i, j, k + 1), *weights.w.at(i, j, k + 1), &mut diag);
        couple(GridIndex::new(i, j, k - 1), phi_c, liquid_sdf.get(i, j, k - 1), *weights.w.at(i, j, k), &mut diag);

        matrix.set(row, row, diag);
    }
}

#[allow(clippy::too_many_arguments)]
fn apply_pressure_gradient(
    pressure: &Array3d<f64>,
    liquid_sdf: &ParticleLevelSet,
    weights: &WeightGrid,
    surface_tension: Option<(f64, &Array3d<f64>)>,
    dx: f64,
    dt: f64,
    velocity: &mut MacVelocityField,
    valid: &mut ValidVelocityGrid,
) {
    let (isize_, jsize, ksize) = velocity.dims();
    let ghost_pressure = |g: GridIndex| -> f64 {
        surface_tension.map_or(0.0, |(sigma, curvature)| sigma * curvature.get_idx(g).copied().unwrap_or(0.0))
    };

    // Every interior face strictly between two in-range cells; whether it
    // actually carries a correction is decided per-face by `liquid_sdf`'s
    // sign in `pressure_face_gradient` below.
    let (is_, js, ks) = (isize_ as isize, jsize as isize, ksize as isize);

    for i in 1..is_ {
        for j in 0..js {
            for k in 0..ks {
                let w = *weights.u.at(i, j, k);
                if w <= 0.0 {
                    continue;
                }
                let left = GridIndex::new(i - 1, j, k);
                let right = GridIndex::new(i, j, k);
                if let Some(grad) = pressure_face_gradient(pressure, liquid_sdf, left, right, &ghost_pressure) {
                    velocity.add_u(i, j, k, -(dt / (dx * grad.1)) * w * grad.0);
                    valid.u.set(i, j, k, true);
                }
            }
        }
    }

    for i in 0..is_ {
        for j in 1..js {
            for k in 0..ks {
                let w = *weights.v.at(i, j, k);
                if w <= 0.0 {
                    continue;
                }
                let bottom = GridIndex::new(i, j - 1, k);
                let top = GridIndex::new(i, j, k);
                if let Some(grad) = pressure_face_gradient(pressure, liquid_sdf, bottom, top, &ghost_pressure) {
                    velocity.add_v(i, j, k, -(dt / (dx * grad.1)) * w * grad.0);
                    valid.v.set(i, j, k, true);
                }
            }
        }
    }

    for i in 0..is_ {
        for j in 0..js {
            for k in 1..ks {
                let w = *weights.w.at(i, j, k);
                if w <= 0.0 {
                    continue;
                }
                let near = GridIndex::new(i, j, k - 1);
                let far = GridIndex::new(i, j, k);
                if let Some(grad) = pressure_face_gradient(pressure, liquid_sdf, near, far, &ghost_pressure) {
                    velocity.add_w(i, j, k, -(dt / (dx * grad.1)) * w * grad.0);
                    valid.w.set(i, j, k, true);
                }
            }
        }
    }
}

/// Returns `(p_b - p_a, theta)` for the face between cells `a` and `b`, or
/// `None` if neither side is fluid (the face carries no pressure signal).
/// Mirrors [`calculate_matrix_coefficients`]'s ghost-fluid treatment: an air
/// neighbour contributes its surface-tension-jump pressure scaled by the
/// same `theta = fraction_inside_segment` used to assemble the diagonal.
fn pressure_face_gradient(
    pressure: &Array3d<f64>,
    liquid_sdf: &ParticleLevelSet,
    a: GridIndex,
    b: GridIndex,
    ghost_pressure: &dyn Fn(GridIndex) -> f64,
) -> Option<(f64, f64)> {
    let phi_a = liquid_sdf.get(a.i, a.j, a.k);
    let phi_b = liquid_sdf.get(b.i, b.j, b.k);
    if phi_a >= 0.0 && phi_b >= 0.0 {
        return None;
    }
    if phi_a < 0.0 && phi_b < 0.0 {
        let pa = pressure.get_idx(a).copied().unwrap_or(0.0);
        let pb = pressure.get_idx(b).copied().unwrap_or(0.0);
        return Some((pb - pa, 1.0));
    }
    let theta = fraction_inside_segment(phi_a, phi_b).max(MIN_FRACTION);
    let pa = if phi_a < 0.0 { pressure.get_idx(a).copied().unwrap_or(0.0) } else { ghost_pressure(a) };
    let pb = if phi_b < 0.0 { pressure.get_idx(b).copied().unwrap_or(0.0) } else { ghost_pressure(b) };
    Some((pb - pa, theta))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Point3;

    fn still_pool(n: usize, h: f64) -> (ParticleLevelSet, WeightGrid, MeshLevelSet) {
        let mut liquid = ParticleLevelSet::new(n, n, n, h);
        let mut points = Vec::new();
        for i in 1..n - 1 {
            for j in 1..(n / 2) {
                for k in 1..n - 1 {
                    points.push(Point3::new((i as f64 + 0.5) * h, (j as f64 + 0.5) * h, (k as f64 + 0.5) * h));
                }
            }
        }
        liquid.calculate_signed_distance_field(&points, 0.7 * h);
        let solid = MeshLevelSet::new(n, n, n, h, 3.0 * h);
        let weights = WeightGrid::from_solid_sdf(&solid, n, n, n);
        (liquid, weights, solid)
    }

    #[test]
    fn hydrostatic_column_produces_no_residual_divergence_after_solve() {
        let n = 6;
        let h = 1.0;
        let (liquid, weights, mut solid) = still_pool(n, h);
        let mut velocity = MacVelocityField::new(n, n, n, h);
        let mut valid = ValidVelocityGrid::new(n, n, n);

        // Inject a uniform divergence-producing inflow at the bottom layer.
        for i in 1..n as isize - 1 {
            for k in 1..n as isize - 1 {
                velocity.set_v(i, 1, k, 0.5);
            }
        }

        let solver = PressureSolver::new(n, n, n);
        let report = solver.solve(
            PressureSolverParams {
                cell_width: h,
                delta_time: 0.1,
                tolerance: 1e-7,
                acceptable_tolerance: 1e-1,
                max_iterations: 500,
                liquid_sdf: &liquid,
                weight_grid: &weights,
                surface_tension: None,
            },
            &mut velocity,
            &mut valid,
            &mut solid,
        );
        assert!(report.accepted, "expected an accepted pressure solve: {:?}", report.pcg);

        let pressure_cells = collect_pressure_cells(n, n, n, &liquid);
        let mut rhs_after = vec![0.0; pressure_cells.len()];
        calculate_negative_divergence(&pressure_cells, &velocity, &solid, &weights, h, &mut rhs_after);
        assert!(inf_norm(&rhs_after) < 1e-2, "residual divergence too large: {:?}", rhs_after);
    }

    #[test]
    fn zero_divergence_field_leaves_pressure_at_zero() {
        let n = 6;
        let h = 1.0;
        let (liquid, weights, mut solid) = still_pool(n, h);
        let mut velocity = MacVelocityField::new(n, n, n, h);
        let mut valid = ValidVelocityGrid::new(n, n, n);
        let solver = PressureSolver::new(n, n, n);
        let report = solver.solve(
            PressureSolverParams {
                cell_width: h,
                delta_time: 0.1,
                tolerance: 1e-7,
                acceptable_tolerance: 1e-1,
                max_iterations: 500,
                liquid_sdf: &liquid,
                weight_grid: &weights,
                surface_tension: None,
            },
            &mut velocity,
            &mut valid,
            &mut solid,
        );
        assert_eq!(report.pcg.iterations, 0);
        assert!(report.pcg.converged);
    }
}
