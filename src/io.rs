//! Particle/whitewater blob I/O (§6). Deliberately raw byte buffers rather
//! than serde: both formats are externally specified binary layouts, not
//! this crate's own serialization concern. The marker-particle blob is a
//! flat POD array, cast to bytes directly with `bytemuck` the same way the
//! GPU upload path casts vertex buffers; this assumes a little-endian host,
//! true of every realistic deployment target.

use bytemuck::{Pod, Zeroable};

use crate::math::{Point3, Vec3};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkerParticleRecord {
    pub position: Point3,
    pub velocity: Vec3,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct RawMarkerParticle {
    position: [f32; 3],
    velocity: [f32; 3],
}

/// Marker-particle blob: a flat array of `position(3xf32), velocity(3xf32)`
/// records, no header.
pub fn write_marker_particles(particles: &[MarkerParticleRecord]) -> Vec<u8> {
    let raw: Vec<RawMarkerParticle> = particles
        .iter()
        .map(|p| RawMarkerParticle {
            position: [p.position.x as f32, p.position.y as f32, p.position.z as f32],
            velocity: [p.velocity.x as f32, p.velocity.y as f32, p.velocity.z as f32],
        })
        .collect();
    bytemuck::cast_slice(&raw).to_vec()
}

pub fn read_marker_particles(bytes: &[u8]) -> Vec<MarkerParticleRecord> {
    let record_bytes = std::mem::size_of::<RawMarkerParticle>();
    let usable = bytes.len() - bytes.len() % record_bytes;
    let raw: &[RawMarkerParticle] = bytemuck::cast_slice(&bytes[..usable]);
    raw.iter()
        .map(|r| MarkerParticleRecord {
            position: Point3::new(r.position[0] as f64, r.position[1] as f64, r.position[2] as f64),
            velocity: Vec3::new(r.velocity[0] as f64, r.velocity[1] as f64, r.velocity[2] as f64),
        })
        .collect()
}

/// Diffuse-particle blob: particles are bucketed by their round-robin `id`
/// byte into 256 bins, written as a 256-entry bin-end table (cumulative
/// particle counts, as `u32`) followed by 3-float positions per particle in
/// bin order (§6, §4.10a).
pub fn write_diffuse_particles(positions: &[Point3], ids: &[u8]) -> Vec<u8> {
    debug_assert_eq!(positions.len(), ids.len());

    let mut bins: Vec<Vec<Point3>> = vec![Vec::new(); 256];
    for (&p, &id) in positions.iter().zip(ids.iter()) {
        bins[id as usize].push(p);
    }

    let mut buf = Vec::with_capacity(256 * 4 + positions.len() * 3 * 4);
    let mut running = 0u32;
    for bin in &bins {
        running += bin.len() as u32;
        buf.extend_from_slice(&running.to_le_bytes());
    }
    for bin in &bins {
        for p in bin {
            for v in [p.x, p.y, p.z] {
                buf.extend_from_slice(&(v as f32).to_le_bytes());
            }
        }
    }
    buf
}

/// Returns `(position, id)` pairs reconstructed from the bin-end table.
pub fn read_diffuse_particles(bytes: &[u8]) -> Vec<(Point3, u8)> {
    const TABLE_BYTES: usize = 256 * 4;
    if bytes.len() < TABLE_BYTES {
        return Vec::new();
    }

    let mut bin_ends = [0u32; 256];
    for i in 0..256 {
        let off = i * 4;
        bin_ends[i] = u32::from_le_bytes([bytes[off], bytes[off + 1], bytes[off + 2], bytes[off + 3]]);
    }

    let mut out = Vec::new();
    let data = &bytes[TABLE_BYTES..];
    let mut cursor = 0usize;
    let mut prev_end = 0u32;
    for (id, &end) in bin_ends.iter().enumerate() {
        let count = (end - prev_end) as usize;
        for _ in 0..count {
            let off = cursor * 12;
            if off + 12 > data.len() {
                break;
            }
            let read_f32 = |o: usize| -> f64 {
                f32::from_le_bytes([data[o], data[o + 1], data[o + 2], data[o + 3]]) as f64
            };
            out.push((Point3::new(read_f32(off), read_f32(off + 4), read_f32(off + 8)), id as u8));
            cursor += 1;
        }
        prev_end = end;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_particle_round_trip_preserves_position_and_velocity() {
        let particles = vec![
            MarkerParticleRecord {
                position: Point3::new(1.0, 2.0, 3.0),
                velocity: Vec3::new(-0.5, 0.25, 0.0),
            },
            MarkerParticleRecord {
                position: Point3::new(0.0, 0.0, 0.0),
                velocity: Vec3::new(1.0, 1.0, 1.0),
            },
        ];
        let bytes = write_marker_particles(&particles);
        let back = read_marker_particles(&bytes);
        assert_eq!(back.len(), particles.len());
        for (a, b) in particles.iter().zip(back.iter()) {
            assert!((a.position.x - b.position.x).abs() < 1e-5);
            assert!((a.velocity.y - b.velocity.y).abs() < 1e-5);
        }
    }

    #[test]
    fn diffuse_particle_round_trip_preserves_id_bucket_assignment() {
        let positions = vec![Point3::new(1.0, 0.0, 0.0), Point3::new(2.0, 0.0, 0.0), Point3::new(3.0, 0.0, 0.0)];
        let ids = vec![5u8, 0u8, 5u8];
        let bytes = write_diffuse_particles(&positions, &ids);
        let back = read_diffuse_particles(&bytes);
        assert_eq!(back.len(), 3);
        let bin0: Vec<_> = back.iter().filter(|(_, id)| *id == 0).collect();
        let bin5: Vec<_> = back.iter().filter(|(_, id)| *id == 5).collect();
        assert_eq!(bin0.len(), 1);
        assert_eq!(bin5.len(), 2);
    }
}
