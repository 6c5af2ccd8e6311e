//! Node-centred signed distance field built from a triangle mesh, plus the
//! closest-triangle index grid and staggered face-velocity grid (§4.3,
//! §4.3a). Used both for the solid SDF (the fixed-obstacle boundary)
//! and, transiently, for the surface SDF rebuilt at every curvature update.

use crate::array3d::Array3d;
use crate::grid_index::GridIndex;
use crate::math::{cell_and_fraction, Point3, Vec3};
use crate::mac_velocity_field::{Axis, MacVelocityField};
use crate::triangle_mesh::{closest_point_on_triangle, TriangleMesh};
use cgmath::InnerSpace;

/// Accumulated face velocity + total weight, normalised by [`MeshLevelSet::normalize_velocity`].
struct VelocityAccumGrid {
    u: Array3d<f64>,
    uw: Array3d<f64>,
    v: Array3d<f64>,
    vw: Array3d<f64>,
    w: Array3d<f64>,
    ww: Array3d<f64>,
}

impl VelocityAccumGrid {
    fn new(isize_: usize, jsize: usize, ksize: usize) -> Self {
        VelocityAccumGrid {
            u: Array3d::new(isize_ + 1, jsize, ksize, 0.0),
            uw: Array3d::new(isize_ + 1, jsize, ksize, 0.0),
            v: Array3d::new(isize_, jsize + 1, ksize, 0.0),
            vw: Array3d::new(isize_, jsize + 1, ksize, 0.0),
            w: Array3d::new(isize_, jsize, ksize + 1, 0.0),
            ww: Array3d::new(isize_, jsize, ksize + 1, 0.0),
        }
    }
}

pub struct MeshLevelSet {
    isize_: usize,
    jsize: usize,
    ksize: usize,
    h: f64,
    bandwidth: f64,
    /// Node-centred, `(I+1)x(J+1)x(K+1)`.
    phi: Array3d<f64>,
    closest_triangles: Array3d<i32>,
    closest_mesh_objects: Array3d<i32>,
    mesh: Option<TriangleMesh>,
    velocity: Option<VelocityAccumGrid>,
    face_velocity: Option<MacVelocityField>,
}

const UNSET_DISTANCE: f64 = 1e300;

impl MeshLevelSet {
    pub fn new(isize_: usize, jsize: usize, ksize: usize, h: f64, bandwidth: f64) -> Self {
        MeshLevelSet {
            isize_,
            jsize,
            ksize,
            h,
            bandwidth,
            phi: Array3d::new(isize_ + 1, jsize + 1, ksize + 1, UNSET_DISTANCE),
            closest_triangles: Array3d::new(isize_ + 1, jsize + 1, ksize + 1, -1),
            closest_mesh_objects: Array3d::new(isize_ + 1, jsize + 1, ksize + 1, -1),
            mesh: None,
            velocity: None,
            face_velocity: None,
        }
    }

    pub fn phi(&self) -> &Array3d<f64> {
        &self.phi
    }

    pub fn closest_triangles(&self) -> &Array3d<i32> {
        &self.closest_triangles
    }

    /// The `mesh_object_id` passed to `calculate_signed_distance_field` for
    /// whichever mesh is closest to each node, or `-1` where no mesh has
    /// stamped a value yet.
    pub fn closest_mesh_objects(&self) -> &Array3d<i32> {
        &self.closest_mesh_objects
    }

    pub fn face_velocity(&self) -> Option<&MacVelocityField> {
        self.face_velocity.as_ref()
    }

    pub fn face_velocity_u(&self, i: isize, j: isize, k: isize) -> f64 {
        self.face_velocity.as_ref().map_or(0.0, |m| m.u(i, j, k))
    }
    pub fn face_velocity_v(&self, i: isize, j: isize, k: isize) -> f64 {
        self.face_velocity.as_ref().map_or(0.0, |m| m.v(i, j, k))
    }
    pub fn face_velocity_w(&self, i: isize, j: isize, k: isize) -> f64 {
        self.face_velocity.as_ref().map_or(0.0, |m| m.w(i, j, k))
    }

    /// Used by the pressure solver's isolated-pocket conditioning pass
    /// (§4.6) to zero solid velocities bounding a sealed fluid pocket.
    pub fn set_face_velocity_u(&mut self, i: isize, j: isize, k: isize, value: f64) {
        self.face_velocity_mut().set_u(i, j, k, value);
    }
    pub fn set_face_velocity_v(&mut self, i: isize, j: isize, k: isize, value: f64) {
        self.face_velocity_mut().set_v(i, j, k, value);
    }
    pub fn set_face_velocity_w(&mut self, i: isize, j: isize, k: isize, value: f64) {
        self.face_velocity_mut().set_w(i, j, k, value);
    }

    fn face_velocity_mut(&mut self) -> &mut MacVelocityField {
        if self.face_velocity.is_none() {
            self.face_velocity = Some(MacVelocityField::new(self.isize_, self.jsize, self.ksize, self.h));
        }
        self.face_velocity.as_mut().unwrap()
    }

    pub fn get(&self, i: isize, j: isize, k: isize) -> f64 {
        self.phi.get(i, j, k).copied().unwrap_or(self.bandwidth.max(3.0 * self.h))
    }

    /// Trilinear sample of the node-centred field at world position `p`.
    /// Node-centred fields are *not* offset by `h/2` (nodes sit on grid
    /// corners, unlike cell-centred fields).
    pub fn sample(&self, p: Point3) -> f64 {
        let cf = cell_and_fraction(p.x / self.h, p.y / self.h, p.z / self.h);
        let w = crate::math::trilinear_weights(cf.fx, cf.fy, cf.fz);
        let mut sum = 0.0;
        let mut total_w = 0.0;
        for di in 0..2isize {
            for dj in 0..2isize {
                for dk in 0..2isize {
                    if let Some(v) = self.phi.get(cf.i + di, cf.j + dj, cf.k + dk) {
                        let wt = w[di as usize][dj as usize][dk as usize];
                        sum += v * wt;
                        total_w += wt;
                    }
                }
            }
        }
        if total_w > 0.0 {
            sum / total_w
        } else {
            self.bandwidth
        }
    }

    pub fn gradient(&self, p: Point3) -> Vec3 {
        self.phi.interpolate_gradient(p + Vec3::new(0.5 * self.h, 0.5 * self.h, 0.5 * self.h), self.h)
    }

    /// §4.3, full variant: closest-triangle sweep followed by BFS distance
    /// propagation and a sign pass.
    pub fn calculate_signed_distance_field(&mut self, mesh: &TriangleMesh, mesh_object_id: i32, with_velocity: bool) {
        self.reset();
        self.mesh = Some(mesh.clone());
        self.stamp_triangles(mesh, mesh_object_id);
        self.propagate_distance_bfs();
        self.sign_by_ray_cast(mesh);
        if with_velocity {
            self.accumulate_face_velocities(mesh);
            self.normalize_velocity();
            self.extrapolate_face_velocities();
        }
    }

    /// §4.3 `fast_calculate_signed_distance_field`: skip BFS propagation;
    /// closest-triangle/sign data is only valid within `bandwidth` cells of
    /// the mesh.
    pub fn fast_calculate_signed_distance_field(&mut self, mesh: &TriangleMesh, mesh_object_id: i32) {
        self.reset();
        self.mesh = Some(mesh.clone());
        self.stamp_triangles(mesh, mesh_object_id);
        self.sign_by_ray_cast(mesh);
    }

    fn reset(&mut self) {
        self.phi.fill(UNSET_DISTANCE);
        self.closest_triangles.fill(-1);
        self.closest_mesh_objects.fill(-1);
    }

    fn node_position(&self, g: GridIndex) -> Point3 {
        Point3::new(g.i as f64 * self.h, g.j as f64 * self.h, g.k as f64 * self.h)
    }

    fn stamp_triangles(&mut self, mesh: &TriangleMesh, mesh_object_id: i32) {
        let (is_, js, ks) = (self.isize_ + 1, self.jsize + 1, self.ksize + 1);
        for t in 0..mesh.triangles.len() {
            let (p, q, r) = mesh.triangle_positions(t);
            let min = Point3::new(p.x.min(q.x).min(r.x), p.y.min(q.y).min(r.y), p.z.min(q.z).min(r.z));
            let max = Point3::new(p.x.max(q.x).max(r.x), p.y.max(q.y).max(r.y), p.z.max(q.z).max(r.z));

            let gmin = GridIndex::new(
                ((min.x / self.h).floor() as isize - self.bandwidth.ceil() as isize).max(0),
                ((min.y / self.h).floor() as isize - self.bandwidth.ceil() as isize).max(0),
                ((min.z / self.h).floor() as isize - self.bandwidth.ceil() as isize).max(0),
            );
            let gmax = GridIndex::new(
                ((max.x / self.h).ceil() as isize + self.bandwidth.ceil() as isize).min(is_ as isize - 1),
                ((max.y / self.h).ceil() as isize + self.bandwidth.ceil() as isize).min(js_minus_one(js)),
                ((max.z / self.h).ceil() as isize + self.bandwidth.ceil() as isize).min(ks_minus_one(ks)),
            );

            for i in gmin.i..=gmax.i {
                for j in gmin.j..=gmax.j {
                    for k in gmin.k..=gmax.k {
                        let node = Point3::new(i as f64 * self.h, j as f64 * self.h, k as f64 * self.h);
                        let (closest, _) = closest_point_on_triangle(node, p, q, r);
                        let d = (node - closest).magnitude();
                        if d < self.phi.get(i, j, k).copied().unwrap_or(UNSET_DISTANCE) {
                            self.phi.set(i, j, k, d);
                            self.closest_triangles.set(i, j, k, t as i32);
                            self.closest_mesh_objects.set(i, j, k, mesh_object_id);
                        }
                    }
                }
            }
        }
    }

    /// §4.3 step 2: BFS from every stamped node, recomputing distance
    /// against the closest triangle of any already-known neighbour. We use
    /// a simple worklist rather than a classic FMM heap; correctness
    /// (monotone decreasing distance) holds regardless of traversal order.
    fn propagate_distance_bfs(&mut self) {
        let mesh = match &self.mesh {
            Some(m) => m.clone(),
            None => return,
        };
        let mut queue: std::collections::VecDeque<GridIndex> = std::collections::VecDeque::new();
        let mut in_queue = Array3d::new(self.isize_ + 1, self.jsize + 1, self.ksize + 1, false);
        for g in self.phi.iter_indices() {
            if *self.closest_triangles.get_idx(g).unwrap() != -1 {
                queue.push_back(g);
                in_queue.set_idx(g, true);
            }
        }

        while let Some(g) = queue.pop_front() {
            in_queue.set_idx(g, false);
            for n in g.neighbours6() {
                if !n.in_bounds(self.isize_ + 1, self.jsize + 1, self.ksize + 1) {
                    continue;
                }
                let t = *self.closest_triangles.get_idx(g).unwrap();
                if t < 0 {
                    continue;
                }
                let node = self.node_position(n);
                let (p, q, r) = mesh.triangle_positions(t as usize);
                let (closest, _) = closest_point_on_triangle(node, p, q, r);
                let d = (node - closest).magnitude();
                if d < *self.phi.get_idx(n).unwrap() {
                    self.phi.set_idx(n, d);
                    self.closest_triangles.set_idx(n, t);
                    self.closest_mesh_objects.set_idx(n, *self.closest_mesh_objects.get_idx(g).unwrap());
                    if !*in_queue.get_idx(n).unwrap() {
                        queue.push_back(n);
                        in_queue.set_idx(n, true);
                    }
                }
            }
        }

        for v in self.phi.as_mut_slice() {
            if *v >= UNSET_DISTANCE {
                *v = self.bandwidth.max(3.0 * self.h);
            }
        }
    }

    /// §4.3 step 3: parity of axis-aligned ray/triangle intersections along
    /// +z from each node determines inside/outside.
    fn sign_by_ray_cast(&mut self, mesh: &TriangleMesh) {
        let (is_, js, ks) = (self.isize_ + 1, self.jsize + 1, self.ksize + 1);
        for i in 0..is_ {
            for j in 0..js {
                let x = i as f64 * self.h;
                let y = j as f64 * self.h;
                let mut crossings: Vec<f64> = Vec::new();
                for t in 0..mesh.triangles.len() {
                    let (p, q, r) = mesh.triangle_positions(t);
                    if let Some(z) = ray_triangle_z_crossing(x, y, p, q, r) {
                        crossings.push(z);
                    }
                }
                crossings.sort_by(|a, b| a.partial_cmp(b).unwrap());
                for k in 0..ks {
                    let z = k as f64 * self.h;
                    let inside = crossings.iter().filter(|&&cz| cz > z).count() % 2 == 1;
                    if inside {
                        let v = self.phi.at(i as isize, j as isize, k as isize);
                        self.phi.set(i as isize, j as isize, k as isize, -v.abs());
                    }
                }
            }
        }
    }

    fn accumulate_face_velocities(&mut self, mesh: &TriangleMesh) {
        if mesh.velocities.is_none() {
            return;
        }
        let mut accum = VelocityAccumGrid::new(self.isize_, self.jsize, self.ksize);
        self.accumulate_axis(mesh, Axis::U, &mut accum);
        self.accumulate_axis(mesh, Axis::V, &mut accum);
        self.accumulate_axis(mesh, Axis::W, &mut accum);
        self.velocity = Some(accum);
    }

    /// For each staggered face, find the closest triangle among the 8
    /// surrounding SDF nodes, interpolate the vertex-velocity barycentric
    /// value there, and accumulate weighted by the fractional in-air area
    /// of that face (§4.3 step 4).
    fn accumulate_axis(&self, mesh: &TriangleMesh, axis: Axis, accum: &mut VelocityAccumGrid) {
        let h = self.h;
        let (face_dims, offset): ((usize, usize, usize), Vec3) = match axis {
            Axis::U => ((self.isize_ + 1, self.jsize, self.ksize), Vec3::new(0.0, 0.5 * h, 0.5 * h)),
            Axis::V => ((self.isize_, self.jsize + 1, self.ksize), Vec3::new(0.5 * h, 0.0, 0.5 * h)),
            Axis::W => ((self.isize_, self.jsize, self.ksize + 1), Vec3::new(0.5 * h, 0.5 * h, 0.0)),
        };

        for i in 0..face_dims.0 {
            for j in 0..face_dims.1 {
                for k in 0..face_dims.2 {
                    let face_center = Point3::new(i as f64 * h, j as f64 * h, k as f64 * h) + offset;

                    // 8 surrounding nodes around the face centre.
                    let base = crate::grid_index::position_to_grid_index(face_center, h);
                    let mut best_d = f64::MAX;
                    let mut best_t: i32 = -1;
                    for di in 0..2isize {
                        for dj in 0..2isize {
                            for dk in 0..2isize {
                                let n = GridIndex::new(base.i + di, base.j + dj, base.k + dk);
                                if !n.in_bounds(self.isize_ + 1, self.jsize + 1, self.ksize + 1) {
                                    continue;
                                }
                                let t = *self.closest_triangles.get_idx(n).unwrap();
                                if t < 0 {
                                    continue;
                                }
                                let d = self.phi.get_idx(n).copied().unwrap_or(UNSET_DISTANCE).abs();
                                if d < best_d {
                                    best_d = d;
                                    best_t = t;
                                }
                            }
                        }
                    }
                    if best_t < 0 {
                        continue;
                    }
                    let (p, q, r) = mesh.triangle_positions(best_t as usize);
                    let (closest, bary) = closest_point_on_triangle(face_center, p, q, r);
                    let _ = closest;
                    if let Some((va, vb, vc)) = mesh.triangle_velocities(best_t as usize) {
                        let velocity = va * bary.0 + vb * bary.1 + vc * bary.2;
                        let normal_v = match axis {
                            Axis::U => velocity.x,
                            Axis::V => velocity.y,
                            Axis::W => velocity.z,
                        };
                        // face-fractional in-air area from the 4 in-plane corner distances.
                        let weight = self.face_air_fraction(axis, i, j, k);
                        match axis {
                            Axis::U => {
                                accum.u.add(i as isize, j as isize, k as isize, normal_v * weight);
                                accum.uw.add(i as isize, j as isize, k as isize, weight);
                            }
                            Axis::V => {
                                accum.v.add(i as isize, j as isize, k as isize, normal_v * weight);
                                accum.vw.add(i as isize, j as isize, k as isize, weight);
                            }
                            Axis::W => {
                                accum.w.add(i as isize, j as isize, k as isize, normal_v * weight);
                                accum.ww.add(i as isize, j as isize, k as isize, weight);
                            }
                        }
                    }
                }
            }
        }
    }

    fn face_air_fraction(&self, axis: Axis, i: usize, j: usize, k: usize) -> f64 {
        let (c00, c10, c01, c11) = match axis {
            Axis::U => (
                self.get(i as isize, j as isize, k as isize),
                self.get(i as isize, j as isize + 1, k as isize),
                self.get(i as isize, j as isize, k as isize + 1),
                self.get(i as isize, j as isize + 1, k as isize + 1),
            ),
            Axis::V => (
                self.get(i as isize, j as isize, k as isize),
                self.get(i as isize + 1, j as isize, k as isize),
                self.get(i as isize, j as isize, k as isize + 1),
                self.get(i as isize + 1, j as isize, k as isize + 1),
            ),
            Axis::W => (
                self.get(i as isize, j as isize, k as isize),
                self.get(i as isize + 1, j as isize, k as isize),
                self.get(i as isize, j as isize + 1, k as isize),
                self.get(i as isize + 1, j as isize + 1, k as isize),
            ),
        };
        1.0 - crate::level_set_utils::fraction_inside_quad(c00, c10, c01, c11)
    }

    fn normalize_velocity(&mut self) {
        let h = self.h;
        let mut mac = MacVelocityField::new(self.isize_, self.jsize, self.ksize, h);
        if let Some(accum) = &self.velocity {
            for g in accum.u.iter_indices() {
                let w = *accum.uw.get_idx(g).unwrap();
                if w > 1e-9 {
                    mac.set_u(g.i, g.j, g.k, accum.u.get_idx(g).unwrap() / w);
                }
            }
            for g in accum.v.iter_indices() {
                let w = *accum.vw.get_idx(g).unwrap();
                if w > 1e-9 {
                    mac.set_v(g.i, g.j, g.k, accum.v.get_idx(g).unwrap() / w);
                }
            }
            for g in accum.w.iter_indices() {
                let w = *accum.ww.get_idx(g).unwrap();
                if w > 1e-9 {
                    mac.set_w(g.i, g.j, g.k, accum.w.get_idx(g).unwrap() / w);
                }
            }
        }
        self.face_velocity = Some(mac);
    }

    fn extrapolate_face_velocities(&mut self) {
        if let (Some(mac), Some(accum)) = (&mut self.face_velocity, &self.velocity) {
            let mut valid = crate::mac_velocity_field::ValidVelocityGrid::new(self.isize_, self.jsize, self.ksize);
            for g in accum.uw.iter_indices() {
                if *accum.uw.get_idx(g).unwrap() > 1e-9 {
                    valid.u.set_idx(g, true);
                }
            }
            for g in accum.vw.iter_indices() {
                if *accum.vw.get_idx(g).unwrap() > 1e-9 {
                    valid.v.set_idx(g, true);
                }
            }
            for g in accum.ww.iter_indices() {
                if *accum.ww.get_idx(g).unwrap() > 1e-9 {
                    valid.w.set_idx(g, true);
                }
            }
            crate::mac_velocity_field::extrapolate_velocity_field(mac, &valid, 3.0);
        }
    }

    /// `union(other)`: wherever `other` is closer, adopt its distance and
    /// closest-triangle reference; when velocity is tracked, accumulate
    /// weighted velocity on matching faces before a final `normalize`.
    pub fn union(&mut self, other: &MeshLevelSet) {
        for g in self.phi.iter_indices().collect::<Vec<_>>() {
            if let Some(&other_phi) = other.phi.get_idx(g) {
                if other_phi < *self.phi.get_idx(g).unwrap() {
                    self.phi.set_idx(g, other_phi);
                    self.closest_triangles.set_idx(g, *other.closest_triangles.get_idx(g).unwrap());
                    self.closest_mesh_objects.set_idx(g, *other.closest_mesh_objects.get_idx(g).unwrap());
                }
            }
        }
        if let (Some(dst), Some(src)) = (&mut self.velocity, &other.velocity) {
            for g in dst.u.iter_indices().collect::<Vec<_>>() {
                dst.u.set_idx(g, dst.u.get_idx(g).unwrap() + src.u.get_idx(g).unwrap());
                dst.uw.set_idx(g, dst.uw.get_idx(g).unwrap() + src.uw.get_idx(g).unwrap());
            }
            for g in dst.v.iter_indices().collect::<Vec<_>>() {
                dst.v.set_idx(g, dst.v.get_idx(g).unwrap() + src.v.get_idx(g).unwrap());
                dst.vw.set_idx(g, dst.vw.get_idx(g).unwrap() + src.vw.get_idx(g).unwrap());
            }
            for g in dst.w.iter_indices().collect::<Vec<_>>() {
                dst.w.set_idx(g, dst.w.get_idx(g).unwrap() + src.w.get_idx(g).unwrap());
                dst.ww.set_idx(g, dst.ww.get_idx(g).unwrap() + src.ww.get_idx(g).unwrap());
            }
            self.normalize_velocity();
            self.extrapolate_face_velocities();
        } else if other.velocity.is_some() && self.velocity.is_none() {
            self.velocity = other.velocity.as_ref().map(|a| VelocityAccumGrid {
                u: a.u.clone(),
                uw: a.uw.clone(),
                v: a.v.clone(),
                vw: a.vw.clone(),
                w: a.w.clone(),
                ww: a.ww.clone(),
            });
            self.normalize_velocity();
            self.extrapolate_face_velocities();
        }
    }

    /// `negate()`: invert sign of every node. The "inside" volume flips; a
    /// second call restores `phi` exactly (§8 idempotence property).
    pub fn negate(&mut self) {
        for v in self.phi.as_mut_slice() {
            *v = -*v;
        }
    }
}

fn js_minus_one(js: usize) -> isize {
    js as isize - 1
}
fn ks_minus_one(ks: usize) -> isize {
    ks as isize - 1
}

/// Intersection of the ray `(x, y, z=-inf..+inf)` with a triangle, returning
/// the crossing `z` if the ray's `(x,y)` projects inside the triangle.
fn ray_triangle_z_crossing(x: f64, y: f64, p: Point3, q: Point3, r: Point3) -> Option<f64> {
    let (x1, y1) = (p.x, p.y);
    let (x2, y2) = (q.x, q.y);
    let (x3, y3) = (r.x, r.y);

    let denom = (y2 - y3) * (x1 - x3) + (x3 - x2) * (y1 - y3);
    if denom.abs() < 1e-14 {
        return None;
    }
    let a = ((y2 - y3) * (x - x3) + (x3 - x2) * (y - y3)) / denom;
    let b = ((y3 - y1) * (x - x3) + (x1 - x3) * (y - y3)) / denom;
    let c = 1.0 - a - b;
    if a < 0.0 || b < 0.0 || c < 0.0 {
        return None;
    }
    Some(a * p.z + b * q.z + c * r.z)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box_mesh() -> TriangleMesh {
        // A closed unit cube [0,1]^3 made of 12 triangles.
        let v = |x: f64, y: f64, z: f64| Point3::new(x, y, z);
        let verts = vec![
            v(0.0, 0.0, 0.0),
            v(1.0, 0.0, 0.0),
            v(1.0, 1.0, 0.0),
            v(0.0, 1.0, 0.0),
            v(0.0, 0.0, 1.0),
            v(1.0, 0.0, 1.0),
            v(1.0, 1.0, 1.0),
            v(0.0, 1.0, 1.0),
        ];
        let tris: Vec<[u32; 3]> = vec![
            [0, 1, 2], [0, 2, 3], // bottom
            [4, 6, 5], [4, 7, 6], // top
            [0, 4, 5], [0, 5, 1], // front
            [1, 5, 6], [1, 6, 2], // right
            [2, 6, 7], [2, 7, 3], // back
            [3, 7, 4], [3, 4, 0], // left
        ];
        TriangleMesh::new(verts, tris)
    }

    #[test]
    fn negate_twice_is_identity() {
        let mesh = unit_box_mesh();
        let mut sdf = MeshLevelSet::new(10, 10, 10, 0.2, 3.0);
        sdf.calculate_signed_distance_field(&mesh, 0, false);
        let before: Vec<f64> = sdf.phi().as_slice().to_vec();
        sdf.negate();
        sdf.negate();
        let after: Vec<f64> = sdf.phi().as_slice().to_vec();
        for (a, b) in before.iter().zip(after.iter()) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn interior_point_is_negative() {
        let mesh = unit_box_mesh();
        let mut sdf = MeshLevelSet::new(10, 10, 10, 0.2, 3.0);
        sdf.calculate_signed_distance_field(&mesh, 0, false);
        let v = sdf.sample(Point3::new(0.5, 0.5, 0.5));
        assert!(v < 0.0, "expected interior sample negative, got {v}");
    }
}
