//! Trait/struct seams for collaborators this crate never implements itself
//! (§1, §6): mesh authoring, SDF computation for registered meshes, and the
//! optional OpenCL offload points. The CPU paths in this crate satisfy the
//! sampler traits directly and are used by default.

use crate::math::{Point3, Vec3};
use crate::triangle_mesh::TriangleMesh;

/// A registered solid obstacle: identity, static transform (baked into the
/// mesh's vertex positions by the host before registration), and the two
/// per-object properties the simulation consults (§4.12's influence-grid
/// source, and boundary friction during collision resolution).
pub struct MeshObject {
    pub id: u32,
    pub mesh: TriangleMesh,
    pub whitewater_influence: f64,
    pub friction: f64,
}

impl MeshObject {
    pub fn new(id: u32, mesh: TriangleMesh) -> Self {
        MeshObject {
            id,
            mesh,
            whitewater_influence: 0.0,
            friction: 0.0,
        }
    }
}

/// A mesh-fluid source (inflow/outflow region). The core only ever consumes
/// the SDF this produces (and, for inflow, an optional velocity field); mesh
/// authoring, animation, and SDF computation are the host's job.
pub trait FluidSource {
    fn id(&self) -> u32;
    /// Signed distance to the source's volume at `p`; negative inside.
    fn sdf(&self, p: Point3) -> f64;
    /// Whether this source removes fluid (outflow) rather than adding it.
    fn is_outflow(&self) -> bool;
    /// Velocity to stamp onto newly-created particles, if the source drives
    /// an inflow velocity rather than inheriting the ambient field.
    fn velocity(&self, p: Point3) -> Option<Vec3>;
}

/// Batched trilinear sampling of a scalar field at `N` points — the first of
/// the two OpenCL offload points named in §1/§6. The CPU default simply
/// calls `Array3d::interpolate` per point.
pub trait ScalarFieldSampler {
    fn sample_batch(&self, field: &crate::array3d::Array3d<f64>, h: f64, points: &[Point3]) -> Vec<f64>;
}

/// Batched sampling of a `MacVelocityField` at `N` points — the second
/// OpenCL offload point.
pub trait VelocitySampler {
    fn sample_batch(&self, field: &crate::mac_velocity_field::MacVelocityField, points: &[Point3]) -> Vec<Vec3>;
}

/// Single-threaded CPU reference implementation of both sampler traits,
/// authoritative per §1: the OpenCL path is an optional accelerator, never
/// required for correctness.
pub struct CpuSampler;

impl ScalarFieldSampler for CpuSampler {
    fn sample_batch(&self, field: &crate::array3d::Array3d<f64>, h: f64, points: &[Point3]) -> Vec<f64> {
        points.iter().map(|&p| field.interpolate(p, h)).collect()
    }
}

impl VelocitySampler for CpuSampler {
    fn sample_batch(&self, field: &crate::mac_velocity_field::MacVelocityField, points: &[Point3]) -> Vec<Vec3> {
        points.iter().map(|&p| field.evaluate_velocity_at_position(p)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_sampler_matches_direct_interpolation() {
        let field = crate::array3d::Array3d::new(4, 4, 4, 2.0);
        let sampler = CpuSampler;
        let points = vec![Point3::new(0.25, 0.25, 0.25)];
        let batch = sampler.sample_batch(&field, 0.1, &points);
        assert!((batch[0] - 2.0).abs() < 1e-9);
    }
}
