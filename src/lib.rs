//! FLIP/PIC hybrid particle-in-cell liquid simulation core.
//!
//! This crate implements the grid-level numerics of the simulation: the
//! staggered MAC velocity field, level-set surface tracking, and the
//! variational pressure and viscosity solves that couple them. See
//! `SPEC_FULL.md` for the full module/operation contract and `DESIGN.md`
//! for how each piece is grounded.

pub mod array3d;
pub mod boundary;
pub mod config;
pub mod diffuse_particles;
pub mod error;
pub mod external;
pub mod fragmented_vector;
pub mod grid_index;
pub mod influence_grid;
pub mod io;
pub mod level_set_reinit;
pub mod level_set_utils;
pub mod mac_velocity_field;
pub mod marker_particles;
pub mod math;
pub mod mesh_level_set;
pub mod particle_level_set;
pub mod particle_mask_grid;
pub mod pressure_cell_index;
pub mod pressure_solver;
pub mod sheet_seeder;
pub mod simulation;
pub mod sparse_matrix;
pub mod threading;
pub mod triangle_mesh;
pub mod turbulence_field;
pub mod viscosity_solver;
pub mod weight_grid;

pub use boundary::{ActiveSides, BoundaryBehaviour};
pub use config::{DiffuseMaterialConfig, SimulationConfig};
pub use diffuse_particles::{DiffuseParticle, DiffuseParticleType};
pub use error::{SimError, SimResult};
pub use mac_velocity_field::{Axis, MacVelocityField, ValidVelocityGrid};
pub use marker_particles::MarkerParticle;
pub use mesh_level_set::MeshLevelSet;
pub use particle_level_set::ParticleLevelSet;
pub use pressure_solver::{PressureSolveReport, PressureSolver, PressureSolverParams};
pub use simulation::{FluidSimulation, FrameStats};
pub use sparse_matrix::{PcgResult, SparseMatrix};
pub use triangle_mesh::TriangleMesh;
pub use viscosity_solver::{ViscositySolveReport, ViscositySolver, ViscositySolverParams};
