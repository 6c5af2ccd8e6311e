//! Staggered (MAC) velocity field: `U[(I+1)xJxK]`, `V[Ix(J+1)xK]`,
//! `W[IxJx(K+1)]` storing the normal velocity component at each cell face,
//! plus the valid-face extrapolation pass of §4.2.

use crate::array3d::Array3d;
use crate::math::{Point3, Vec3};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Axis {
    U,
    V,
    W,
}

#[derive(Clone)]
pub struct MacVelocityField {
    isize_: usize,
    jsize: usize,
    ksize: usize,
    h: f64,
    u: Array3d<f64>,
    v: Array3d<f64>,
    w: Array3d<f64>,
}

impl MacVelocityField {
    pub fn new(isize_: usize, jsize: usize, ksize: usize, h: f64) -> Self {
        MacVelocityField {
            isize_,
            jsize,
            ksize,
            h,
            u: Array3d::new(isize_ + 1, jsize, ksize, 0.0),
            v: Array3d::new(isize_, jsize + 1, ksize, 0.0),
            w: Array3d::new(isize_, jsize, ksize + 1, 0.0),
        }
    }

    pub fn dims(&self) -> (usize, usize, usize) {
        (self.isize_, self.jsize, self.ksize)
    }

    pub fn cell_width(&self) -> f64 {
        self.h
    }

    pub fn component(&self, axis: Axis) -> &Array3d<f64> {
        match axis {
            Axis::U => &self.u,
            Axis::V => &self.v,
            Axis::W => &self.w,
        }
    }

    pub fn component_mut(&mut self, axis: Axis) -> &mut Array3d<f64> {
        match axis {
            Axis::U => &mut self.u,
            Axis::V => &mut self.v,
            Axis::W => &mut self.w,
        }
    }

    pub fn u(&self, i: isize, j: isize, k: isize) -> f64 {
        self.u.get(i, j, k).copied().unwrap_or(0.0)
    }
    pub fn v(&self, i: isize, j: isize, k: isize) -> f64 {
        self.v.get(i, j, k).copied().unwrap_or(0.0)
    }
    pub fn w(&self, i: isize, j: isize, k: isize) -> f64 {
        self.w.get(i, j, k).copied().unwrap_or(0.0)
    }

    pub fn set_u(&mut self, i: isize, j: isize, k: isize, value: f64) {
        self.u.set(i, j, k, value);
    }
    pub fn set_v(&mut self, i: isize, j: isize, k: isize, value: f64) {
        self.v.set(i, j, k, value);
    }
    pub fn set_w(&mut self, i: isize, j: isize, k: isize, value: f64) {
        self.w.set(i, j, k, value);
    }

    pub fn add_u(&mut self, i: isize, j: isize, k: isize, value: f64) {
        self.u.add(i, j, k, value);
    }
    pub fn add_v(&mut self, i: isize, j: isize, k: isize, value: f64) {
        self.v.add(i, j, k, value);
    }
    pub fn add_w(&mut self, i: isize, j: isize, k: isize, value: f64) {
        self.w.add(i, j, k, value);
    }

    pub fn clear(&mut self) {
        self.u.fill(0.0);
        self.v.fill(0.0);
        self.w.fill(0.0);
    }

    /// Per §4.2: sample each component at its own face-offset position.
    pub fn evaluate_velocity_at_position(&self, p: Point3) -> Vec3 {
        let h = self.h;
        let u = self.u.interpolate(p - Vec3::new(0.0, 0.5 * h, 0.5 * h), h);
        let v = self.v.interpolate(p - Vec3::new(0.5 * h, 0.0, 0.5 * h), h);
        let w = self.w.interpolate(p - Vec3::new(0.5 * h, 0.5 * h, 0.0), h);
        Vec3::new(u, v, w)
    }
}

/// Three boolean face grids marking which faces received a direct particle
/// transfer this sub-step (§3 "Valid-velocity grid").
pub struct ValidVelocityGrid {
    pub u: Array3d<bool>,
    pub v: Array3d<bool>,
    pub w: Array3d<bool>,
}

impl ValidVelocityGrid {
    pub fn new(isize_: usize, jsize: usize, ksize: usize) -> Self {
        ValidVelocityGrid {
            u: Array3d::new(isize_ + 1, jsize, ksize, false),
            v: Array3d::new(isize_, jsize + 1, ksize, false),
            w: Array3d::new(isize_, jsize, ksize + 1, false),
        }
    }

    pub fn reset(&mut self) {
        self.u.fill(false);
        self.v.fill(false);
        self.w.fill(false);
    }

    pub fn component(&self, axis: Axis) -> &Array3d<bool> {
        match axis {
            Axis::U => &self.u,
            Axis::V => &self.v,
            Axis::W => &self.w,
        }
    }

    pub fn component_mut(&mut self, axis: Axis) -> &mut Array3d<bool> {
        match axis {
            Axis::U => &mut self.u,
            Axis::V => &mut self.v,
            Axis::W => &mut self.w,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum LayerState {
    Unknown,
    Waiting,
    Known,
    Done,
}

/// Layered extrapolation of one velocity component, per §4.2: `L` layers,
/// each propagating the average of already-known 6-neighbours into the
/// next ring of unknown faces. Domain-border faces never propagate past
/// the boundary (`Done` from the start).
pub fn extrapolate_component(field: &mut Array3d<f64>, valid: &Array3d<bool>, layers: u32) {
    let (is_, js, ks) = field.dims();
    let mut state = Array3d::new(is_, js, ks, LayerState::Unknown);
    for g in field.iter_indices() {
        let known = *valid.at(g.i, g.j, g.k);
        let on_border = g.i == 0
            || g.j == 0
            || g.k == 0
            || g.i as usize == is_ - 1
            || g.j as usize == js - 1
            || g.k as usize == ks - 1;
        let s = if known {
            LayerState::Known
        } else if on_border {
            LayerState::Done
        } else {
            LayerState::Unknown
        };
        state.set_idx(g, s);
    }

    for _layer in 0..layers {
        let mut waiting: Vec<crate::grid_index::GridIndex> = Vec::new();
        for g in field.iter_indices() {
            if *state.get_idx(g).unwrap() != LayerState::Known {
                continue;
            }
            for n in g.neighbours6() {
                if let Some(s) = state.get_idx(n) {
                    if *s == LayerState::Unknown {
                        waiting.push(n);
                    }
                }
            }
        }
        waiting.sort();
        waiting.dedup();

        for n in &waiting {
            let mut sum = 0.0;
            let mut count = 0.0;
            for nb in n.neighbours6() {
                if let Some(s) = state.get_idx(nb) {
                    if *s == LayerState::Known {
                        sum += *field.get_idx(nb).unwrap();
                        count += 1.0;
                    }
                }
            }
            if count > 0.0 {
                field.set_idx(*n, sum / count);
            }
        }
        for n in &waiting {
            state.set_idx(*n, LayerState::Known);
        }
    }
}

/// `L = ceil(CFL) + 2` as specified in §4.2/§4.8.
pub fn extrapolation_layers(cfl: f64) -> u32 {
    cfl.ceil() as u32 + 2
}

pub fn extrapolate_velocity_field(field: &mut MacVelocityField, valid: &ValidVelocityGrid, cfl: f64) {
    let layers = extrapolation_layers(cfl);
    extrapolate_component(field.component_mut(Axis::U), valid.component(Axis::U), layers);
    extrapolate_component(field.component_mut(Axis::V), valid.component(Axis::V), layers);
    extrapolate_component(field.component_mut(Axis::W), valid.component(Axis::W), layers);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extrapolation_fills_every_face_within_layer_radius() {
        let mut field = Array3d::new(5, 5, 5, 0.0);
        let mut valid = Array3d::new(5, 5, 5, false);
        field.set(2, 2, 2, 3.0);
        valid.set(2, 2, 2, true);

        extrapolate_component(&mut field, &valid, 2);

        assert!((field.at(3, 2, 2) - 3.0).abs() < 1e-9);
        assert!((field.at(1, 2, 2) - 3.0).abs() < 1e-9);
    }

    #[test]
    fn evaluate_velocity_uses_face_offsets() {
        let mut mac = MacVelocityField::new(4, 4, 4, 1.0);
        for i in 0..=4isize {
            for j in 0..4isize {
                for k in 0..4isize {
                    mac.set_u(i, j, k, 1.0);
                }
            }
        }
        let v = mac.evaluate_velocity_at_position(Point3::new(2.0, 2.0, 2.0));
        assert!((v.x - 1.0).abs() < 1e-9);
    }
}
