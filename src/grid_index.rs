//! Integer cell/node coordinates and the handful of grid-space conversions
//! every component needs (cell<->world, neighbour enumeration, bounds).

use crate::math::{Point3, Vec3};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridIndex {
    pub i: isize,
    pub j: isize,
    pub k: isize,
}

impl GridIndex {
    pub fn new(i: isize, j: isize, k: isize) -> Self {
        GridIndex { i, j, k }
    }

    pub fn in_bounds(&self, isize_: usize, jsize: usize, ksize: usize) -> bool {
        self.i >= 0
            && self.j >= 0
            && self.k >= 0
            && (self.i as usize) < isize_
            && (self.j as usize) < jsize
            && (self.k as usize) < ksize
    }

    /// The 6 face-adjacent neighbours, `-x,+x,-y,+y,-z,+z`.
    pub fn neighbours6(&self) -> [GridIndex; 6] {
        [
            GridIndex::new(self.i - 1, self.j, self.k),
            GridIndex::new(self.i + 1, self.j, self.k),
            GridIndex::new(self.i, self.j - 1, self.k),
            GridIndex::new(self.i, self.j + 1, self.k),
            GridIndex::new(self.i, self.j, self.k - 1),
            GridIndex::new(self.i, self.j, self.k + 1),
        ]
    }

    /// All 26 neighbours within a unit Chebyshev ball, excluding `self`.
    pub fn neighbours26(&self) -> Vec<GridIndex> {
        let mut out = Vec::with_capacity(26);
        for di in -1..=1 {
            for dj in -1..=1 {
                for dk in -1..=1 {
                    if di == 0 && dj == 0 && dk == 0 {
                        continue;
                    }
                    out.push(GridIndex::new(self.i + di, self.j + dj, self.k + dk));
                }
            }
        }
        out
    }
}

/// `floor(x/h), floor(y/h), floor(z/h)`.
pub fn position_to_grid_index(p: Point3, h: f64) -> GridIndex {
    let inv = 1.0 / h;
    GridIndex::new(
        (p.x * inv).floor() as isize,
        (p.y * inv).floor() as isize,
        (p.z * inv).floor() as isize,
    )
}

pub fn grid_index_to_position(g: GridIndex, h: f64) -> Point3 {
    Point3::new(g.i as f64 * h, g.j as f64 * h, g.k as f64 * h)
}

/// World-space centre of a cell-centred grid cell.
pub fn cell_center(g: GridIndex, h: f64) -> Point3 {
    grid_index_to_position(g, h) + Vec3::new(0.5 * h, 0.5 * h, 0.5 * h)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_cell_center() {
        let g = GridIndex::new(3, 4, 5);
        let p = cell_center(g, 0.1);
        let back = position_to_grid_index(p, 0.1);
        assert_eq!(g, back);
    }

    #[test]
    fn neighbours6_are_unit_distance() {
        let g = GridIndex::new(2, 2, 2);
        for n in g.neighbours6() {
            let d = (n.i - g.i).abs() + (n.j - g.j).abs() + (n.k - g.k).abs();
            assert_eq!(d, 1);
        }
    }
}
