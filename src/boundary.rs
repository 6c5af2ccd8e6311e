//! Domain boundary policy (§9 redesign): what happens to a marker particle
//! that reaches a grid boundary face, and which of the six boundary faces
//! are open at all.

use enumflags2::BitFlags;

/// What a marker particle does when it reaches an open domain boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum BoundaryBehaviour {
    /// Clamp the particle back inside the domain, as if the boundary were a
    /// solid wall.
    Collide,
    /// Let the particle leave the domain unimpeded; it is picked up by the
    /// removal pass on the next substep.
    Ballistic,
    /// Remove the particle the instant it crosses the boundary.
    Kill,
}

impl Default for BoundaryBehaviour {
    fn default() -> Self {
        BoundaryBehaviour::Collide
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, BitFlags)]
#[repr(u8)]
enum Side {
    XMin = 1 << 0,
    XMax = 1 << 1,
    YMin = 1 << 2,
    YMax = 1 << 3,
    ZMin = 1 << 4,
    ZMax = 1 << 5,
}

/// Which of the six domain boundary faces are currently active (i.e. not
/// overridden to stay closed, e.g. a floor that should behave as solid even
/// though the rest of the domain is open).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ActiveSides(BitFlags<Side>);

impl ActiveSides {
    pub fn all() -> Self {
        ActiveSides(BitFlags::all())
    }

    pub fn none() -> Self {
        ActiveSides(BitFlags::empty())
    }

    pub fn set_xmin(&mut self, active: bool) {
        self.set(Side::XMin, active);
    }
    pub fn set_xmax(&mut self, active: bool) {
        self.set(Side::XMax, active);
    }
    pub fn set_ymin(&mut self, active: bool) {
        self.set(Side::YMin, active);
    }
    pub fn set_ymax(&mut self, active: bool) {
        self.set(Side::YMax, active);
    }
    pub fn set_zmin(&mut self, active: bool) {
        self.set(Side::ZMin, active);
    }
    pub fn set_zmax(&mut self, active: bool) {
        self.set(Side::ZMax, active);
    }

    pub fn xmin(&self) -> bool {
        self.0.contains(Side::XMin)
    }
    pub fn xmax(&self) -> bool {
        self.0.contains(Side::XMax)
    }
    pub fn ymin(&self) -> bool {
        self.0.contains(Side::YMin)
    }
    pub fn ymax(&self) -> bool {
        self.0.contains(Side::YMax)
    }
    pub fn zmin(&self) -> bool {
        self.0.contains(Side::ZMin)
    }
    pub fn zmax(&self) -> bool {
        self.0.contains(Side::ZMax)
    }

    fn set(&mut self, side: Side, active: bool) {
        if active {
            self.0.insert(side);
        } else {
            self.0.remove(side);
        }
    }
}

impl Default for ActiveSides {
    fn default() -> Self {
        ActiveSides::all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_all_sides_active() {
        let sides = ActiveSides::default();
        assert!(sides.xmin() && sides.xmax());
        assert!(sides.ymin() && sides.ymax());
        assert!(sides.zmin() && sides.zmax());
    }

    #[test]
    fn individual_sides_toggle_independently() {
        let mut sides = ActiveSides::all();
        sides.set_ymax(false);
        assert!(!sides.ymax());
        assert!(sides.ymin());
        assert!(sides.xmin());
    }
}
