//! Dense `GridIndex -> sparse-matrix-row` lookup used by the pressure and
//! viscosity solvers (§4.5/§4.6). A flat `Vec<i32>` rather than a hash map:
//! the index space is already bounded by the simulation grid, so a dense
//! array beats hashing per the same reasoning `GridIndexKeyMap` uses
//! upstream.

use crate::array3d::Array3d;
use crate::grid_index::GridIndex;

pub struct PressureCellIndex {
    indices: Array3d<i32>,
}

const NOT_FOUND: i32 = -1;

impl PressureCellIndex {
    pub fn new(isize_: usize, jsize: usize, ksize: usize) -> Self {
        PressureCellIndex {
            indices: Array3d::new(isize_, jsize, ksize, NOT_FOUND),
        }
    }

    pub fn insert(&mut self, g: GridIndex, row: usize) {
        self.indices.set_idx(g, row as i32);
    }

    pub fn find(&self, g: GridIndex) -> Option<usize> {
        match self.indices.get_idx(g) {
            Some(&NOT_FOUND) | None => None,
            Some(&idx) => Some(idx as usize),
        }
    }
}
