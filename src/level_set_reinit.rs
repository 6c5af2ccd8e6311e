//! Fast-sweep re-distancing of a scalar grid toward its zero iso-surface
//! (§4.13), used to keep the liquid/solid level sets honest signed
//! distances after advection has distorted them. Grounded on
//! `levelsetsolver.h/.cpp`'s upwind Hamilton-Jacobi solver: a pseudo-time
//! march of `∂φ/∂τ + S(φ)(|∇φ| - 1) = 0` with a smoothed sign function,
//! first-order one-sided differences, and a CFL-bounded pseudo-timestep.

use crate::array3d::Array3d;
use crate::grid_index::GridIndex;

const MAX_CFL: f64 = 0.5;

/// Smoothed sign function, `d / sqrt(d^2 + dx^2)`.
fn sign(d: f64, dx: f64) -> f64 {
    d / (d * d + dx * dx).sqrt()
}

fn pseudo_time_step(sdf: &Array3d<f64>, dx: f64) -> f64 {
    let mut dtau = MAX_CFL * dx;
    let max_s = sdf
        .as_slice()
        .iter()
        .map(|&d| sign(d, dx).abs())
        .fold(0.0, f64::max);
    while max_s > 0.0 && dtau * max_s / dx > MAX_CFL {
        dtau *= 0.5;
    }
    dtau
}

fn clamp_neighbour(i: isize, size: usize) -> isize {
    i.clamp(0, size as isize - 1)
}

/// One-sided first differences along each axis at cell `g`.
fn derivatives_upwind(sdf: &Array3d<f64>, g: GridIndex, dx: f64) -> ([f64; 2], [f64; 2], [f64; 2]) {
    let (isize_, jsize, ksize) = sdf.dims();
    let im1 = clamp_neighbour(g.i - 1, isize_);
    let ip1 = clamp_neighbour(g.i + 1, isize_);
    let jm1 = clamp_neighbour(g.j - 1, jsize);
    let jp1 = clamp_neighbour(g.j + 1, jsize);
    let km1 = clamp_neighbour(g.k - 1, ksize);
    let kp1 = clamp_neighbour(g.k + 1, ksize);

    let center = *sdf.at(g.i, g.j, g.k);
    let derx = [
        (center - *sdf.at(im1, g.j, g.k)) / dx,
        (*sdf.at(ip1, g.j, g.k) - center) / dx,
    ];
    let dery = [
        (center - *sdf.at(g.i, jm1, g.k)) / dx,
        (*sdf.at(g.i, jp1, g.k) - center) / dx,
    ];
    let derz = [
        (center - *sdf.at(g.i, g.j, km1)) / dx,
        (*sdf.at(g.i, g.j, kp1) - center) / dx,
    ];
    (derx, dery, derz)
}

fn step(sdf: &Array3d<f64>, original: &Array3d<f64>, dx: f64, dtau: f64, cells: &[GridIndex]) -> Array3d<f64> {
    let mut next = sdf.clone();
    for &g in cells {
        let s = sign(*original.at(g.i, g.j, g.k), dx);
        let (derx, dery, derz) = derivatives_upwind(sdf, g, dx);

        let pos = (derx[0].max(0.0).powi(2)
            + derx[1].min(0.0).powi(2)
            + dery[0].max(0.0).powi(2)
            + dery[1].min(0.0).powi(2)
            + derz[0].max(0.0).powi(2)
            + derz[1].min(0.0).powi(2))
        .sqrt();
        let neg = (derx[0].min(0.0).powi(2)
            + derx[1].max(0.0).powi(2)
            + dery[0].min(0.0).powi(2)
            + dery[1].max(0.0).powi(2)
            + derz[0].min(0.0).powi(2)
            + derz[1].max(0.0).powi(2))
        .sqrt();

        let val = *sdf.at(g.i, g.j, g.k) - dtau * s.max(0.0) * (pos - 1.0) - dtau * s.min(0.0) * (neg - 1.0);
        next.set_idx(g, val);
    }
    next
}

/// Re-distances `input` toward a true signed-distance field up to
/// `max_distance` from the interface, over the given `cells` (typically the
/// narrow band worth re-distancing, or the whole grid).
pub fn reinitialize_upwind(input: &Array3d<f64>, dx: f64, max_distance: f64, cells: &[GridIndex]) -> Array3d<f64> {
    let dtau = pseudo_time_step(input, dx);
    let num_iterations = (max_distance / dtau).ceil() as usize;

    let mut output = input.clone();
    let error_threshold = 1e-3;
    let mut last_max_diff = f64::INFINITY;

    for _ in 0..num_iterations {
        let next = step(&output, input, dx, dtau, cells);
        let mut max_diff = 0.0f64;
        for &g in cells {
            let diff = (*next.at(g.i, g.j, g.k) - *output.at(g.i, g.j, g.k)).abs();
            if diff > max_diff {
                max_diff = diff;
            }
        }
        output = next;
        if (max_diff - last_max_diff).abs() < error_threshold * dx {
            break;
        }
        last_max_diff = max_diff;
    }

    output
}

/// All cells, convenience for callers that don't want to compute a narrow
/// band of cells themselves.
pub fn all_cells(isize_: usize, jsize: usize, ksize: usize) -> Vec<GridIndex> {
    let mut cells = Vec::with_capacity(isize_ * jsize * ksize);
    for k in 0..ksize as isize {
        for j in 0..jsize as isize {
            for i in 0..isize_ as isize {
                cells.push(GridIndex::new(i, j, k));
            }
        }
    }
    cells
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reinitializing_an_already_correct_plane_distance_is_a_near_fixed_point() {
        let isize_ = 10;
        let jsize = 10;
        let ksize = 10;
        let dx = 0.1;
        let mut sdf = Array3d::new(isize_, jsize, ksize, 0.0);
        for k in 0..ksize as isize {
            for j in 0..jsize as isize {
                for i in 0..isize_ as isize {
                    sdf.set(i, j, k, (i as f64 - 5.0) * dx);
                }
            }
        }
        let cells = all_cells(isize_, jsize, ksize);
        let out = reinitialize_upwind(&sdf, dx, 3.0 * dx, &cells);
        for &g in &cells {
            let expected = (g.i as f64 - 5.0) * dx;
            assert!((*out.at(g.i, g.j, g.k) - expected).abs() < dx, "cell {:?}", g);
        }
    }
}
