//! Simulation-wide configuration (§9 AMBIENT): a single serde-serializable
//! struct passed to `FluidSimulation::new`, with per-field setters that
//! validate and return `SimError::ConfigurationInvalid` on bad input. This
//! replaces the source's scattered `set_*` methods on `FluidSimulation`
//! while keeping their validation behaviour.

use serde::{Deserialize, Serialize};

use crate::boundary::{ActiveSides, BoundaryBehaviour};
use crate::error::{SimError, SimResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffuseMaterialConfig {
    pub wavecrest_rate: f64,
    pub turbulence_rate: f64,
    pub emission_rate: f64,
    pub min_lifetime: f64,
    pub max_lifetime: f64,
    pub lifetime_variance: f64,
    pub drag_coefficient_spray: f64,
    pub drag_coefficient_bubble: f64,
    pub buoyancy_coefficient_bubble: f64,
    /// Indexed by `DiffuseParticleType as usize`: `[Bubble, Foam, Spray]`.
    pub boundary_behaviour: [BoundaryBehaviour; 3],
    pub active_sides: ActiveSides,
}

impl Default for DiffuseMaterialConfig {
    fn default() -> Self {
        DiffuseMaterialConfig {
            wavecrest_rate: 1.0,
            turbulence_rate: 1.0,
            emission_rate: 1.0,
            min_lifetime: 2.0,
            max_lifetime: 5.0,
            lifetime_variance: 0.5,
            drag_coefficient_spray: 0.1,
            drag_coefficient_bubble: 2.0,
            buoyancy_coefficient_bubble: 1.0,
            boundary_behaviour: [BoundaryBehaviour::Collide; 3],
            active_sides: ActiveSides::all(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub isize: usize,
    pub jsize: usize,
    pub ksize: usize,
    pub cell_width: f64,
    pub density: f64,
    pub pic_flip_ratio: f64,
    pub cfl_number: f64,
    pub surface_tension: f64,
    pub min_substeps: u32,
    pub max_substeps: u32,
    pub sheet_fill_threshold: f64,
    pub sheet_fill_rate: f64,
    pub max_diffuse_particles: usize,
    pub diffuse: DiffuseMaterialConfig,
}

impl SimulationConfig {
    pub fn new(isize: usize, jsize: usize, ksize: usize, cell_width: f64) -> Self {
        SimulationConfig {
            isize,
            jsize,
            ksize,
            cell_width,
            density: 1000.0,
            pic_flip_ratio: 0.95,
            cfl_number: 5.0,
            surface_tension: 0.0,
            min_substeps: 1,
            max_substeps: 12,
            sheet_fill_threshold: -0.95,
            sheet_fill_rate: 1.0,
            max_diffuse_particles: 250_000,
            diffuse: DiffuseMaterialConfig::default(),
        }
    }

    pub fn set_pic_flip_ratio(&mut self, alpha: f64) -> SimResult<()> {
        if !(0.0..=1.0).contains(&alpha) {
            return Err(SimError::ConfigurationInvalid(format!(
                "pic_flip_ratio must be in [0,1], got {}",
                alpha
            )));
        }
        self.pic_flip_ratio = alpha;
        Ok(())
    }

    pub fn set_cfl_number(&mut self, cfl: f64) -> SimResult<()> {
        if cfl < 1.0 {
            return Err(SimError::ConfigurationInvalid(format!(
                "cfl_number must be >= 1, got {}",
                cfl
            )));
        }
        self.cfl_number = cfl;
        Ok(())
    }

    pub fn set_density(&mut self, density: f64) -> SimResult<()> {
        if density <= 0.0 {
            return Err(SimError::ConfigurationInvalid(format!(
                "density must be > 0, got {}",
                density
            )));
        }
        self.density = density;
        Ok(())
    }

    pub fn set_surface_tension(&mut self, sigma: f64) -> SimResult<()> {
        if sigma < 0.0 {
            return Err(SimError::ConfigurationInvalid(format!(
                "surface_tension must be >= 0, got {}",
                sigma
            )));
        }
        self.surface_tension = sigma;
        Ok(())
    }

    pub fn set_substep_bounds(&mut self, min_substeps: u32, max_substeps: u32) -> SimResult<()> {
        if min_substeps == 0 || min_substeps > max_substeps {
            return Err(SimError::ConfigurationInvalid(format!(
                "invalid substep bounds: min={}, max={}",
                min_substeps, max_substeps
            )));
        }
        self.min_substeps = min_substeps;
        self.max_substeps = max_substeps;
        Ok(())
    }

    pub fn set_max_diffuse_particles(&mut self, max: usize) -> SimResult<()> {
        self.max_diffuse_particles = max;
        Ok(())
    }

    /// Serializes this configuration to a JSON document, for the host
    /// application to persist alongside a saved simulation state.
    pub fn to_json(&self) -> SimResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| SimError::ConfigurationInvalid(format!("failed to serialize configuration: {}", e)))
    }

    pub fn from_json(json: &str) -> SimResult<Self> {
        serde_json::from_str(json).map_err(|e| SimError::ConfigurationInvalid(format!("failed to parse configuration: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_pic_flip_ratio_outside_unit_interval() {
        let mut cfg = SimulationConfig::new(4, 4, 4, 0.1);
        assert!(cfg.set_pic_flip_ratio(1.5).is_err());
        assert!(cfg.set_pic_flip_ratio(0.5).is_ok());
        assert!((cfg.pic_flip_ratio - 0.5).abs() < 1e-9);
    }

    #[test]
    fn rejects_cfl_below_one() {
        let mut cfg = SimulationConfig::new(4, 4, 4, 0.1);
        assert!(cfg.set_cfl_number(0.5).is_err());
        assert!(cfg.set_cfl_number(3.0).is_ok());
    }

    #[test]
    fn json_round_trip_preserves_settings() {
        let mut cfg = SimulationConfig::new(8, 8, 8, 0.05);
        cfg.set_surface_tension(0.02).unwrap();
        let json = cfg.to_json().unwrap();
        let back = SimulationConfig::from_json(&json).unwrap();
        assert_eq!(back.isize, 8);
        assert!((back.surface_tension - 0.02).abs() < 1e-12);
    }

    #[test]
    fn from_json_rejects_malformed_input() {
        assert!(SimulationConfig::from_json("not json").is_err());
    }
}
