//! Variational viscosity solve (§4.7).
//!
//! Adapted from Christopher Batty & Robert Bridson's "Accurate Viscous Free
//! Surfaces for Buckling, Coiling, and Rotating Liquids": unlike the
//! pressure projection, viscosity couples all three velocity components
//! through shear stress, so every fluid-state U/V/W face gets its own
//! unknown, and seven "viscosity volume" fractions (one cell-centred, three
//! face-centred, three edge-centred) weight the normal- and shear-stress
//! terms of the discretised energy.

use crate::array3d::Array3d;
use crate::grid_index::{cell_center, GridIndex};
use crate::level_set_utils::volume_fraction_cube;
use crate::mac_velocity_field::MacVelocityField;
use crate::math::{Point3, Vec3};
use crate::mesh_level_set::MeshLevelSet;
use crate::particle_level_set::ParticleLevelSet;
use crate::sparse_matrix::{solve_pcg, PcgResult, SparseMatrix};

pub struct ViscositySolverParams<'a> {
    pub cell_width: f64,
    pub delta_time: f64,
    pub tolerance: f64,
    pub acceptable_tolerance: f64,
    pub max_iterations: usize,
    pub liquid_sdf: &'a ParticleLevelSet,
    pub solid_sdf: &'a MeshLevelSet,
    /// Node-centred, `(I+1)x(J+1)x(K+1)`.
    pub viscosity: &'a Array3d<f64>,
}

#[derive(Debug, Clone, Copy)]
pub struct ViscositySolveReport {
    pub pcg: PcgResult,
    pub matrix_size: usize,
    pub accepted: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum FaceState {
    Air,
    Fluid,
    Solid,
}

struct FaceStateGrid {
    u: Array3d<FaceState>,
    v: Array3d<FaceState>,
    w: Array3d<FaceState>,
}

impl FaceStateGrid {
    fn u(&self, i: isize, j: isize, k: isize) -> FaceState {
        self.u.get(i, j, k).copied().unwrap_or(FaceState::Air)
    }
    fn v(&self, i: isize, j: isize, k: isize) -> FaceState {
        self.v.get(i, j, k).copied().unwrap_or(FaceState::Air)
    }
    fn w(&self, i: isize, j: isize, k: isize) -> FaceState {
        self.w.get(i, j, k).copied().unwrap_or(FaceState::Air)
    }
}

/// The seven sub-cell volume fractions of §4.7: one cell-centred, three
/// face-centred (aligned with U/V/W), three edge-centred (aligned with the
/// edges shared by two axes, named for the axis they run along).
struct VolumeGrid {
    center: Array3d<f64>,
    u: Array3d<f64>,
    v: Array3d<f64>,
    w: Array3d<f64>,
    edge_u: Array3d<f64>,
    edge_v: Array3d<f64>,
    edge_w: Array3d<f64>,
}

impl VolumeGrid {
    fn center(&self, i: isize, j: isize, k: isize) -> f64 {
        self.center.get(i, j, k).copied().unwrap_or(0.0)
    }
    fn u(&self, i: isize, j: isize, k: isize) -> f64 {
        self.u.get(i, j, k).copied().unwrap_or(0.0)
    }
    fn v(&self, i: isize, j: isize, k: isize) -> f64 {
        self.v.get(i, j, k).copied().unwrap_or(0.0)
    }
    fn w(&self, i: isize, j: isize, k: isize) -> f64 {
        self.w.get(i, j, k).copied().unwrap_or(0.0)
    }
    fn edge_u(&self, i: isize, j: isize, k: isize) -> f64 {
        self.edge_u.get(i, j, k).copied().unwrap_or(0.0)
    }
    fn edge_v(&self, i: isize, j: isize, k: isize) -> f64 {
        self.edge_v.get(i, j, k).copied().unwrap_or(0.0)
    }
    fn edge_w(&self, i: isize, j: isize, k: isize) -> f64 {
        self.edge_w.get(i, j, k).copied().unwrap_or(0.0)
    }
}

/// Dense `face -> matrix row` lookup, one `Array3d<i32>` per axis (the
/// viscosity system has three separate unknown families, unlike the single
/// cell-centred family of the pressure solver's [`crate::pressure_cell_index`]).
struct FaceIndex {
    u: Array3d<i32>,
    v: Array3d<i32>,
    w: Array3d<i32>,
    size: usize,
}

impl FaceIndex {
    fn u(&self, i: isize, j: isize, k: isize) -> Option<usize> {
        self.u.get(i, j, k).copied().filter(|&v| v >= 0).map(|v| v as usize)
    }
    fn v(&self, i: isize, j: isize, k: isize) -> Option<usize> {
        self.v.get(i, j, k).copied().filter(|&v| v >= 0).map(|v| v as usize)
    }
    fn w(&self, i: isize, j: isize, k: isize) -> Option<usize> {
        self.w.get(i, j, k).copied().filter(|&v| v >= 0).map(|v| v as usize)
    }
}

pub struct ViscositySolver {
    isize_: usize,
    jsize: usize,
    ksize: usize,
}

impl ViscositySolver {
    pub fn new(isize_: usize, jsize: usize, ksize: usize) -> Self {
        ViscositySolver { isize_, jsize, ksize }
    }

    /// Mutates `velocity` in place: every face with a matrix row receives
    /// the solved value; every other face (solid, air, or a fluid face the
    /// matrix dropped because its control volume was entirely dry) is left
    /// untouched, per §4.7's "write solutions back ... for every face whose
    /// matrix index != -1" contract.
    pub fn solve(&self, params: ViscositySolverParams, velocity: &mut MacVelocityField) -> ViscositySolveReport {
        let (isize_, jsize, ksize) = (self.isize_, self.jsize, self.ksize);
        let h = params.cell_width;

        let state = compute_face_state_grid(isize_, jsize, ksize, h, params.solid_sdf);
        let volumes = compute_volume_grid(isize_, jsize, ksize, h, params.liquid_sdf);
        let index = compute_matrix_index(isize_, jsize, ksize, &state, &volumes);

        if index.size == 0 {
            return ViscositySolveReport {
                pcg: PcgResult { converged: true, residual: 0.0, iterations: 0 },
                matrix_size: 0,
                accepted: true,
            };
        }

        let mut matrix = SparseMatrix::new(index.size);
        let mut rhs = vec![0.0; index.size];
        let factor = params.delta_time / (h * h);

        assemble_u(isize_, jsize, ksize, &state, &volumes, &index, params.viscosity, velocity, factor, &mut matrix, &mut rhs);
        assemble_v(isize_, jsize, ksize, &state, &volumes, &index, params.viscosity, velocity, factor, &mut matrix, &mut rhs);
        assemble_w(isize_, jsize, ksize, &state, &volumes, &index, params.viscosity, velocity, factor, &mut matrix, &mut rhs);

        let mut soln = vec![0.0; index.size];
        let pcg = solve_pcg(&matrix, &rhs, params.tolerance, params.max_iterations, &mut soln);
        let accepted = pcg.converged
            || (pcg.iterations >= params.max_iterations && pcg.residual < params.acceptable_tolerance);

        apply_solution(isize_, jsize, ksize, &index, &soln, velocity);

        ViscositySolveReport { pcg, matrix_size: index.size, accepted }
    }
}

fn solid_center_phi(isize_: usize, jsize: usize, ksize: usize, h: f64, solid: &MeshLevelSet) -> Array3d<f64> {
    let mut out = Array3d::new(isize_, jsize, ksize, 0.0);
    for k in 0..ksize as isize {
        for j in 0..jsize as isize {
            for i in 0..isize_ as isize {
                let g = GridIndex::new(i, j, k);
                out.set(i, j, k, solid.sample(cell_center(g, h)));
            }
        }
    }
    out
}

/// §4.7 "face state": a face is solid if it sits on the domain boundary or
/// both cells it borders are (on average) inside the solid; otherwise fluid.
/// (Air-only faces never appear here since every face we visit borders at
/// least one non-solid cell by construction of the loop below; truly dry
/// faces simply never enter the matrix, handled by [`compute_matrix_index`].)
fn compute_face_state_grid(isize_: usize, jsize: usize, ksize: usize, h: f64, solid: &MeshLevelSet) -> FaceStateGrid {
    let center_phi = solid_center_phi(isize_, jsize, ksize, h, solid);

    let mut u = Array3d::new(isize_ + 1, jsize, ksize, FaceState::Air);
    for k in 0..ksize as isize {
        for j in 0..jsize as isize {
            for i in 0..=isize_ as isize {
                let is_edge = i == 0 || i as usize == isize_;
                let solid_face = is_edge || center_phi.at(i - 1, j, k) + center_phi.at(i, j, k) <= 0.0;
                u.set(i, j, k, if solid_face { FaceState::Solid } else { FaceState::Fluid });
            }
        }
    }

    let mut v = Array3d::new(isize_, jsize + 1, ksize, FaceState::Air);
    for k in 0..ksize as isize {
        for j in 0..=jsize as isize {
            for i in 0..isize_ as isize {
                let is_edge = j == 0 || j as usize == jsize;
                let solid_face = is_edge || center_phi.at(i, j - 1, k) + center_phi.at(i, j, k) <= 0.0;
                v.set(i, j, k, if solid_face { FaceState::Solid } else { FaceState::Fluid });
            }
        }
    }

    let mut w = Array3d::new(isize_, jsize, ksize + 1, FaceState::Air);
    for k in 0..=ksize as isize {
        for j in 0..jsize as isize {
            for i in 0..isize_ as isize {
                let is_edge = k == 0 || k as usize == ksize;
                let solid_face = is_edge || center_phi.at(i, j, k - 1) + center_phi.at(i, j, k) <= 0.0;
                w.set(i, j, k, if solid_face { FaceState::Solid } else { FaceState::Fluid });
            }
        }
    }

    FaceStateGrid { u, v, w }
}

/// Estimates, for every `0.5h` sub-cube of the domain, what fraction of it
/// lies inside the liquid (tetrahedralised cube fraction of the liquid SDF
/// sampled at its eight corners). Cells with no nearby liquid naturally
/// resolve to (approximately) zero since `liquid_sdf` is capped at `+3h`
/// outside its narrow band, so unlike the source solver this does not first
/// restrict the estimate to a liquid-adjacent region — a pure performance
/// optimisation there, not a correctness requirement.
fn compute_subcell_volumes(isize_: usize, jsize: usize, ksize: usize, h: f64, liquid_sdf: &ParticleLevelSet) -> Array3d<f64> {
    let (ni, nj, nk) = (2 * isize_, 2 * jsize, 2 * ksize);
    let mut out = Array3d::new(ni, nj, nk, 0.0);
    let sub_dx = 0.5 * h;
    let hdx = 0.25 * h;
    let phi_field = liquid_sdf.phi();

    for k in 0..nk as isize {
        for j in 0..nj as isize {
            for i in 0..ni as isize {
                let center = Point3::new(
                    0.25 * h + i as f64 * sub_dx,
                    0.25 * h + j as f64 * sub_dx,
                    0.25 * h + k as f64 * sub_dx,
                );
                let sample = |dx: f64, dy: f64, dz: f64| phi_field.interpolate(center + Vec3::new(dx, dy, dz), h);
                let phi000 = sample(-hdx, -hdx, -hdx);
                let phi100 = sample(hdx, -hdx, -hdx);
                let phi010 = sample(-hdx, hdx, -hdx);
                let phi110 = sample(hdx, hdx, -hdx);
                let phi001 = sample(-hdx, -hdx, hdx);
                let phi101 = sample(hdx, -hdx, hdx);
                let phi011 = sample(-hdx, hdx, hdx);
                let phi111 = sample(hdx, hdx, hdx);
                out.set(i, j, k, volume_fraction_cube(phi000, phi100, phi010, phi110, phi001, phi101, phi011, phi111));
            }
        }
    }
    out
}

/// Averages the eight `0.5h` sub-cubes offset by `offset` (in sub-cell
/// units) from `2*cell` into `out`, for every interior cell (the one-cell
/// border is left at zero, matching the pressure solver's interior band).
fn accumulate_volume(out: &mut Array3d<f64>, subcell: &Array3d<f64>, isize_: usize, jsize: usize, ksize: usize, offset: (isize, isize, isize)) {
    for k in 1..ksize as isize - 1 {
        for j in 1..jsize as isize - 1 {
            for i in 1..isize_ as isize - 1 {
                let base_i = 2 * i + offset.0;
                let base_j = 2 * j + offset.1;
                let base_k = 2 * k + offset.2;
                let mut sum = 0.0;
                for dk in 0..2isize {
                    for dj in 0..2isize {
                        for di in 0..2isize {
                            sum += subcell.get(base_i + di, base_j + dj, base_k + dk).copied().unwrap_or(0.0);
                        }
                    }
                }
                out.set(i, j, k, 0.125 * sum);
            }
        }
    }
}

fn compute_volume_grid(isize_: usize, jsize: usize, ksize: usize, h: f64, liquid_sdf: &ParticleLevelSet) -> VolumeGrid {
    let subcell = compute_subcell_volumes(isize_, jsize, ksize, h, liquid_sdf);

    let mut center = Array3d::new(isize_, jsize, ksize, 0.0);
    let mut u = Array3d::new(isize_ + 1, jsize, ksize, 0.0);
    let mut v = Array3d::new(isize_, jsize + 1, ksize, 0.0);
    let mut w = Array3d::new(isize_, jsize, ksize + 1, 0.0);
    let mut edge_u = Array3d::new(isize_, jsize + 1, ksize + 1, 0.0);
    let mut edge_v = Array3d::new(isize_ + 1, jsize, ksize + 1, 0.0);
    let mut edge_w = Array3d::new(isize_ + 1, jsize + 1, ksize, 0.0);

    accumulate_volume(&mut center, &subcell, isize_, jsize, ksize, (0, 0, 0));
    accumulate_volume(&mut u, &subcell, isize_, jsize, ksize, (-1, 0, 0));
    accumulate_volume(&mut v, &subcell, isize_, jsize, ksize, (0, -1, 0));
    accumulate_volume(&mut w, &subcell, isize_, jsize, ksize, (0, 0, -1));
    accumulate_volume(&mut edge_u, &subcell, isize_, jsize, ksize, (0, -1, -1));
    accumulate_volume(&mut edge_v, &subcell, isize_, jsize, ksize, (-1, 0, -1));
    accumulate_volume(&mut edge_w, &subcell, isize_, jsize, ksize, (-1, -1, 0));

    VolumeGrid { center, u, v, w, edge_u, edge_v, edge_w }
}

fn compute_matrix_index(isize_: usize, jsize: usize, ksize: usize, state: &FaceStateGrid, volumes: &VolumeGrid) -> FaceIndex {
    let mut u = Array3d::new(isize_ + 1, jsize, ksize, -1i32);
    let mut v = Array3d::new(isize_, jsize + 1, ksize, -1i32);
    let mut w = Array3d::new(isize_, jsize, ksize + 1, -1i32);
    let mut row = 0usize;

    for k in 1..ksize as isize - 1 {
        for j in 1..jsize as isize - 1 {
            for i in 1..isize_ as isize - 1 {
                if state.u(i, j, k) != FaceState::Fluid {
                    continue;
                }
                let touches_liquid = volumes.u(i, j, k) > 0.0
                    || volumes.center(i, j, k) > 0.0
                    || volumes.center(i - 1, j, k) > 0.0
                    || volumes.edge_w(i, j + 1, k) > 0.0
                    || volumes.edge_w(i, j, k) > 0.0
                    || volumes.edge_v(i, j, k + 1) > 0.0
                    || volumes.edge_v(i, j, k) > 0.0;
                if touches_liquid {
                    u.set(i, j, k, row as i32);
                    row += 1;
                }
            }
        }
    }

    for k in 1..ksize as isize - 1 {
        for j in 1..jsize as isize - 1 {
            for i in 1..isize_ as isize - 1 {
                if state.v(i, j, k) != FaceState::Fluid {
                    continue;
                }
                let touches_liquid = volumes.v(i, j, k) > 0.0
                    || volumes.edge_w(i + 1, j, k) > 0.0
                    || volumes.edge_w(i, j, k) > 0.0
                    || volumes.center(i, j, k) > 0.0
                    || volumes.center(i, j - 1, k) > 0.0
                    || volumes.edge_u(i, j, k + 1) > 0.0
                    || volumes.edge_u(i, j, k) > 0.0;
                if touches_liquid {
                    v.set(i, j, k, row as i32);
                    row += 1;
                }
            }
        }
    }

    for k in 1..ksize as isize - 1 {
        for j in 1..jsize as isize - 1 {
            for i in 1..isize_ as isize - 1 {
                if state.w(i, j, k) != FaceState::Fluid {
                    continue;
                }
                let touches_liquid = volumes.w(i, j, k) > 0.0
                    || volumes.edge_v(i + 1, j, k) > 0.0
                    || volumes.edge_v(i, j, k) > 0.0
                    || volumes.edge_u(i, j + 1, k) > 0.0
                    || volumes.edge_u(i, j, k) > 0.0
                    || volumes.center(i, j, k) > 0.0
                    || volumes.center(i, j, k - 1) > 0.0;
                if touches_liquid {
                    w.set(i, j, k, row as i32);
                    row += 1;
                }
            }
        }
    }

    FaceIndex { u, v, w, size: row }
}

fn visc(viscosity: &Array3d<f64>, i: isize, j: isize, k: isize) -> f64 {
    viscosity.get(i, j, k).copied().unwrap_or(0.0)
}

#[allow(clippy::too_many_arguments)]
fn assemble_u(
    isize_: usize,
    jsize: usize,
    ksize: usize,
    state: &FaceStateGrid,
    volumes: &VolumeGrid,
    index: &FaceIndex,
    viscosity: &Array3d<f64>,
    velocity: &MacVelocityField,
    factor: f64,
    matrix: &mut SparseMatrix,
    rhs: &mut [f64],
) {
    for k in 1..ksize as isize - 1 {
        for j in 1..jsize as isize - 1 {
            for i in 1..isize_ as isize - 1 {
                let row = match index.u(i, j, k) {
                    Some(r) => r,
                    None => continue,
                };

                let visc_right = visc(viscosity, i, j, k);
                let visc_left = visc(viscosity, i - 1, j, k);
                let visc_top = 0.25 * (visc(viscosity, i - 1, j + 1, k) + visc(viscosity, i - 1, j, k) + visc(viscosity, i, j + 1, k) + visc(viscosity, i, j, k));
                let visc_bottom = 0.25 * (visc(viscosity, i - 1, j, k) + visc(viscosity, i - 1, j - 1, k) + visc(viscosity, i, j, k) + visc(viscosity, i, j - 1, k));
                let visc_front = 0.25 * (visc(viscosity, i - 1, j, k + 1) + visc(viscosity, i - 1, j, k) + visc(viscosity, i, j, k + 1) + visc(viscosity, i, j, k));
                let visc_back = 0.25 * (visc(viscosity, i - 1, j, k) + visc(viscosity, i - 1, j, k - 1) + visc(viscosity, i, j, k) + visc(viscosity, i, j, k - 1));

                let vol_right = volumes.center(i, j, k);
                let vol_left = volumes.center(i - 1, j, k);
                let vol_top = volumes.edge_w(i, j + 1, k);
                let vol_bottom = volumes.edge_w(i, j, k);
                let vol_front = volumes.edge_v(i, j, k + 1);
                let vol_back = volumes.edge_v(i, j, k);

                let f_right = 2.0 * factor * visc_right * vol_right;
                let f_left = 2.0 * factor * visc_left * vol_left;
                let f_top = factor * visc_top * vol_top;
                let f_bottom = factor * visc_bottom * vol_bottom;
                let f_front = factor * visc_front * vol_front;
                let f_back = factor * visc_back * vol_back;

                let diag = volumes.u(i, j, k) + f_right + f_left + f_top + f_bottom + f_front + f_back;
                matrix.set(row, row, diag);

                let mut couple = |s: FaceState, col: Option<usize>, term: f64| {
                    if s == FaceState::Fluid {
                        if let Some(c) = col {
                            matrix.add(row, c, term);
                        }
                    }
                };
                couple(state.u(i + 1, j, k), index.u(i + 1, j, k), -f_right);
                couple(state.u(i - 1, j, k), index.u(i - 1, j, k), -f_left);
                couple(state.u(i, j + 1, k), index.u(i, j + 1, k), -f_top);
                couple(state.u(i, j - 1, k), index.u(i, j - 1, k), -f_bottom);
                couple(state.u(i, j, k + 1), index.u(i, j, k + 1), -f_front);
                couple(state.u(i, j, k - 1), index.u(i, j, k - 1), -f_back);

                couple(state.v(i, j + 1, k), index.v(i, j + 1, k), -f_top);
                couple(state.v(i - 1, j + 1, k), index.v(i - 1, j + 1, k), f_top);
                couple(state.v(i, j, k), index.v(i, j, k), f_bottom);
                couple(state.v(i - 1, j, k), index.v(i - 1, j, k), -f_bottom);

                couple(state.w(i, j, k + 1), index.w(i, j, k + 1), -f_front);
                couple(state.w(i - 1, j, k + 1), index.w(i - 1, j, k + 1), f_front);
                couple(state.w(i, j, k), index.w(i, j, k), f_back);
                couple(state.w(i - 1, j, k), index.w(i - 1, j, k), -f_back);

                let mut rval = volumes.u(i, j, k) * velocity.u(i, j, k);
                let mut solid_term = |s: FaceState, term: f64, value: f64| {
                    if s == FaceState::Solid {
                        rval -= term * value;
                    }
                };
                solid_term(state.u(i + 1, j, k), -f_right, velocity.u(i + 1, j, k));
                solid_term(state.u(i - 1, j, k), -f_left, velocity.u(i - 1, j, k));
                solid_term(state.u(i, j + 1, k), -f_top, velocity.u(i, j + 1, k));
                solid_term(state.u(i, j - 1, k), -f_bottom, velocity.u(i, j - 1, k));
                solid_term(state.u(i, j, k + 1), -f_front, velocity.u(i, j, k + 1));
                solid_term(state.u(i, j, k - 1), -f_back, velocity.u(i, j, k - 1));

                solid_term(state.v(i, j + 1, k), -f_top, velocity.v(i, j + 1, k));
                solid_term(state.v(i - 1, j + 1, k), f_top, velocity.v(i - 1, j + 1, k));
                solid_term(state.v(i, j, k), f_bottom, velocity.v(i, j, k));
                solid_term(state.v(i - 1, j, k), -f_bottom, velocity.v(i - 1, j, k));

                solid_term(state.w(i, j, k + 1), -f_front, velocity.w(i, j, k + 1));
                solid_term(state.w(i - 1, j, k + 1), f_front, velocity.w(i - 1, j, k + 1));
                solid_term(state.w(i, j, k), f_back, velocity.w(i, j, k));
                solid_term(state.w(i - 1, j, k), -f_back, velocity.w(i - 1, j, k));

                rhs[row] = rval;
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn assemble_v(
    isize_: usize,
    jsize: usize,
    ksize: usize,
    state: &FaceStateGrid,
    volumes: &VolumeGrid,
    index: &FaceIndex,
    viscosity: &Array3d<f64>,
    velocity: &MacVelocityField,
    factor: f64,
    matrix: &mut SparseMatrix,
    rhs: &mut [f64],
) {
    for k in 1..ksize as isize - 1 {
        for j in 1..jsize as isize - 1 {
            for i in 1..isize_ as isize - 1 {
                let row = match index.v(i, j, k) {
                    Some(r) => r,
                    None => continue,
                };

                let visc_right = 0.25 * (visc(viscosity, i, j - 1, k) + visc(viscosity, i + 1, j - 1, k) + visc(viscosity, i, j, k) + visc(viscosity, i + 1, j, k));
                let visc_left = 0.25 * (visc(viscosity, i, j - 1, k) + visc(viscosity, i - 1, j - 1, k) + visc(viscosity, i, j, k) + visc(viscosity, i - 1, j, k));
                let visc_top = visc(viscosity, i, j, k);
                let visc_bottom = visc(viscosity, i, j - 1, k);
                let visc_front = 0.25 * (visc(viscosity, i, j - 1, k) + visc(viscosity, i, j - 1, k + 1) + visc(viscosity, i, j, k) + visc(viscosity, i, j, k + 1));
                let visc_back = 0.25 * (visc(viscosity, i, j - 1, k) + visc(viscosity, i, j - 1, k - 1) + visc(viscosity, i, j, k) + visc(viscosity, i, j, k - 1));

                let vol_right = volumes.edge_w(i + 1, j, k);
                let vol_left = volumes.edge_w(i, j, k);
                let vol_top = volumes.center(i, j, k);
                let vol_bottom = volumes.center(i, j - 1, k);
                let vol_front = volumes.edge_u(i, j, k + 1);
                let vol_back = volumes.edge_u(i, j, k);

                let f_right = factor * visc_right * vol_right;
                let f_left = factor * visc_left * vol_left;
                let f_top = 2.0 * factor * visc_top * vol_top;
                let f_bottom = 2.0 * factor * visc_bottom * vol_bottom;
                let f_front = factor * visc_front * vol_front;
                let f_back = factor * visc_back * vol_back;

                let diag = volumes.v(i, j, k) + f_right + f_left + f_top + f_bottom + f_front + f_back;
                matrix.set(row, row, diag);

                let mut couple = |s: FaceState, col: Option<usize>, term: f64| {
                    if s == FaceState::Fluid {
                        if let Some(c) = col {
                            matrix.add(row, c, term);
                        }
                    }
                };
                couple(state.v(i + 1, j, k), index.v(i + 1, j, k), -f_right);
                couple(state.v(i - 1, j, k), index.v(i - 1, j, k), -f_left);
                couple(state.v(i, j + 1, k), index.v(i, j + 1, k), -f_top);
                couple(state.v(i, j - 1, k), index.v(i, j - 1, k), -f_bottom);
                couple(state.v(i, j, k + 1), index.v(i, j, k + 1), -f_front);
                couple(state.v(i, j, k - 1), index.v(i, j, k - 1), -f_back);

                couple(state.u(i + 1, j, k), index.u(i + 1, j, k), -f_right);
                couple(state.u(i + 1, j - 1, k), index.u(i + 1, j - 1, k), f_right);
                couple(state.u(i, j, k), index.u(i, j, k), f_left);
                couple(state.u(i, j - 1, k), index.u(i, j - 1, k), -f_left);

                couple(state.w(i, j, k + 1), index.w(i, j, k + 1), -f_front);
                couple(state.w(i, j - 1, k + 1), index.w(i, j - 1, k + 1), f_front);
                couple(state.w(i, j, k), index.w(i, j, k), f_back);
                couple(state.w(i, j - 1, k), index.w(i, j - 1, k), -f_back);

                let mut rval = volumes.v(i, j, k) * velocity.v(i, j, k);
                let mut solid_term = |s: FaceState, term: f64, value: f64| {
                    if s == FaceState::Solid {
                        rval -= term * value;
                    }
                };
                solid_term(state.v(i + 1, j, k), -f_right, velocity.v(i + 1, j, k));
                solid_term(state.v(i - 1, j, k), -f_left, velocity.v(i - 1, j, k));
                solid_term(state.v(i, j + 1, k), -f_top, velocity.v(i, j + 1, k));
                solid_term(state.v(i, j - 1, k), -f_bottom, velocity.v(i, j - 1, k));
                solid_term(state.v(i, j, k + 1), -f_front, velocity.v(i, j, k + 1));
                solid_term(state.v(i, j, k - 1), -f_back, velocity.v(i, j, k - 1));

                solid_term(state.u(i + 1, j, k), -f_right, velocity.u(i + 1, j, k));
                solid_term(state.u(i + 1, j - 1, k), f_right, velocity.u(i + 1, j - 1, k));
                solid_term(state.u(i, j, k), f_left, velocity.u(i, j, k));
                solid_term(state.u(i, j - 1, k), -f_left, velocity.u(i, j - 1, k));

                solid_term(state.w(i, j, k + 1), -f_front, velocity.w(i, j, k + 1));
                solid_term(state.w(i, j - 1, k + 1), f_front, velocity.w(i, j - 1, k + 1));
                solid_term(state.w(i, j, k), f_back, velocity.w(i, j, k));
                solid_term(state.w(i, j - 1, k), -f_back, velocity.w(i, j - 1, k));

                rhs[row] = rval;
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn assemble_w(
    isize_: usize,
    jsize: usize,
    ksize: usize,
    state: &FaceStateGrid,
    volumes: &VolumeGrid,
    index: &FaceIndex,
    viscosity: &Array3d<f64>,
    velocity: &MacVelocityField,
    factor: f64,
    matrix: &mut SparseMatrix,
    rhs: &mut [f64],
) {
    for k in 1..ksize as isize - 1 {
        for j in 1..jsize as isize - 1 {
            for i in 1..isize_ as isize - 1 {
                let row = match index.w(i, j, k) {
                    Some(r) => r,
                    None => continue,
                };

                let visc_right = 0.25 * (visc(viscosity, i, j, k) + visc(viscosity, i, j, k - 1) + visc(viscosity, i + 1, j, k) + visc(viscosity, i + 1, j, k - 1));
                let visc_left = 0.25 * (visc(viscosity, i, j, k) + visc(viscosity, i, j, k - 1) + visc(viscosity, i - 1, j, k) + visc(viscosity, i - 1, j, k - 1));
                let visc_top = 0.25 * (visc(viscosity, i, j, k) + visc(viscosity, i, j, k - 1) + visc(viscosity, i, j + 1, k) + visc(viscosity, i, j + 1, k - 1));
                let visc_bottom = 0.25 * (visc(viscosity, i, j, k) + visc(viscosity, i, j, k - 1) + visc(viscosity, i, j - 1, k) + visc(viscosity, i, j - 1, k - 1));
                let visc_front = visc(viscosity, i, j, k);
                let visc_back = visc(viscosity, i, j, k - 1);

                let vol_right = volumes.edge_v(i + 1, j, k);
                let vol_left = volumes.edge_v(i, j, k);
                let vol_top = volumes.edge_u(i, j + 1, k);
                let vol_bottom = volumes.edge_u(i, j, k);
                let vol_front = volumes.center(i, j, k);
                let vol_back = volumes.center(i, j, k - 1);

                let f_right = factor * visc_right * vol_right;
                let f_left = factor * visc_left * vol_left;
                let f_top = factor * visc_top * vol_top;
                let f_bottom = factor * visc_bottom * vol_bottom;
                let f_front = 2.0 * factor * visc_front * vol_front;
                let f_back = 2.0 * factor * visc_back * vol_back;

                let diag = volumes.w(i, j, k) + f_right + f_left + f_top + f_bottom + f_front + f_back;
                matrix.set(row, row, diag);

                let mut couple = |s: FaceState, col: Option<usize>, term: f64| {
                    if s == FaceState::Fluid {
                        if let Some(c) = col {
                            matrix.add(row, c, term);
                        }
                    }
                };
                couple(state.w(i + 1, j, k), index.w(i + 1, j, k), -f_right);
                couple(state.w(i - 1, j, k), index.w(i - 1, j, k), -f_left);
                couple(state.w(i, j + 1, k), index.w(i, j + 1, k), -f_top);
                couple(state.w(i, j - 1, k), index.w(i, j - 1, k), -f_bottom);
                couple(state.w(i, j, k + 1), index.w(i, j, k + 1), -f_front);
                couple(state.w(i, j, k - 1), index.w(i, j, k - 1), -f_back);

                couple(state.u(i + 1, j, k), index.u(i + 1, j, k), -f_right);
                couple(state.u(i + 1, j, k - 1), index.u(i + 1, j, k - 1), f_right);
                couple(state.u(i, j, k), index.u(i, j, k), f_left);
                couple(state.u(i, j, k - 1), index.u(i, j, k - 1), -f_left);

                couple(state.v(i, j + 1, k), index.v(i, j + 1, k), -f_top);
                couple(state.v(i, j + 1, k - 1), index.v(i, j + 1, k - 1), f_top);
                couple(state.v(i, j, k), index.v(i, j, k), f_bottom);
                couple(state.v(i, j, k - 1), index.v(i, j, k - 1), -f_bottom);

                let mut rval = volumes.w(i, j, k) * velocity.w(i, j, k);
                let mut solid_term = |s: FaceState, term: f64, value: f64| {
                    if s == FaceState::Solid {
                        rval -= term * value;
                    }
                };
                solid_term(state.w(i + 1, j, k), -f_right, velocity.w(i + 1, j, k));
                solid_term(state.w(i - 1, j, k), -f_left, velocity.w(i - 1, j, k));
                solid_term(state.w(i, j + 1, k), -f_top, velocity.w(i, j + 1, k));
                solid_term(state.w(i, j - 1, k), -f_bottom, velocity.w(i, j - 1, k));
                solid_term(state.w(i, j, k + 1), -f_front, velocity.w(i, j, k + 1));
                solid_term(state.w(i, j, k - 1), -f_back, velocity.w(i, j, k - 1));

                solid_term(state.u(i + 1, j, k), -f_right, velocity.u(i + 1, j, k));
                solid_term(state.u(i + 1, j, k - 1), f_right, velocity.u(i + 1, j, k - 1));
                solid_term(state.u(i, j, k), f_left, velocity.u(i, j, k));
                solid_term(state.u(i, j, k - 1), -f_left, velocity.u(i, j, k - 1));

                solid_term(state.v(i, j + 1, k), -f_top, velocity.v(i, j + 1, k));
                solid_term(state.v(i, j + 1, k - 1), f_top, velocity.v(i, j + 1, k - 1));
                solid_term(state.v(i, j, k), f_bottom, velocity.v(i, j, k));
                solid_term(state.v(i, j, k - 1), -f_bottom, velocity.v(i, j, k - 1));

                rhs[row] = rval;
            }
        }
    }
}

fn apply_solution(isize_: usize, jsize: usize, ksize: usize, index: &FaceIndex, soln: &[f64], velocity: &mut MacVelocityField) {
    for k in 0..ksize as isize {
        for j in 0..jsize as isize {
            for i in 0..=isize_ as isize {
                if let Some(row) = index.u(i, j, k) {
                    velocity.set_u(i, j, k, soln[row]);
                }
            }
        }
    }
    for k in 0..ksize as isize {
        for j in 0..=jsize as isize {
            for i in 0..isize_ as isize {
                if let Some(row) = index.v(i, j, k) {
                    velocity.set_v(i, j, k, soln[row]);
                }
            }
        }
    }
    for k in 0..=ksize as isize {
        for j in 0..jsize as isize {
            for i in 0..isize_ as isize {
                if let Some(row) = index.w(i, j, k) {
                    velocity.set_w(i, j, k, soln[row]);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn still_pool(n: usize, h: f64) -> (ParticleLevelSet, MeshLevelSet) {
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
        (liquid, solid)
    }

    #[test]
    fn zero_viscosity_field_leaves_velocity_unchanged_within_tolerance() {
        let n = 6;
        let h = 1.0;
        let (liquid, solid) = still_pool(n, h);
        let viscosity = Array3d::new(n + 1, n + 1, n + 1, 0.0);
        let mut velocity = MacVelocityField::new(n, n, n, h);
        for i in 1..n as isize - 1 {
            for k in 1..n as isize - 1 {
                velocity.set_v(i, 1, k, 0.3);
            }
        }

        let solver = ViscositySolver::new(n, n, n);
        let report = solver.solve(
            ViscositySolverParams {
                cell_width: h,
                delta_time: 0.1,
                tolerance: 1e-4,
                acceptable_tolerance: 10.0,
                max_iterations: 1400,
                liquid_sdf: &liquid,
                solid_sdf: &solid,
                viscosity: &viscosity,
            },
            &mut velocity,
        );

        assert!(report.accepted, "expected an accepted viscosity solve: {:?}", report.pcg);
        // zero viscosity means every factor term is zero, so the diagonal
        // collapses to the cell volume and the solve returns the input velocity.
        assert!((velocity.v(2, 1, 2) - 0.3).abs() < 1e-6);
    }

    #[test]
    fn viscous_column_damps_a_sheared_velocity_spike() {
        let n = 6;
        let h = 1.0;
        let (liquid, solid) = still_pool(n, h);
        let viscosity = Array3d::new(n + 1, n + 1, n + 1, 5.0);
        let mut velocity = MacVelocityField::new(n, n, n, h);
        velocity.set_v(2, 1, 2, 2.0);

        let solver = ViscositySolver::new(n, n, n);
        let report = solver.solve(
            ViscositySolverParams {
                cell_width: h,
                delta_time: 0.1,
                tolerance: 1e-4,
                acceptable_tolerance: 10.0,
                max_iterations: 1400,
                liquid_sdf: &liquid,
                solid_sdf: &solid,
                viscosity: &viscosity,
            },
            &mut velocity,
        );

        assert!(report.accepted, "expected an accepted viscosity solve: {:?}", report.pcg);
        assert!(velocity.v(2, 1, 2) < 2.0, "expected viscosity to damp the spike, got {}", velocity.v(2, 1, 2));
    }
}
