//! Sphere-traced rendering of a small signed-distance scene.

use super::{shard_ranges, timed, KernelContext, Measurement};
use crate::calibration::WorkloadParams;
use crate::error::KernelError;
use serde_json::json;

const HIT_EPSILON: f64 = 1e-4;
const MAX_DISTANCE: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Vec3 {
    x: f64,
    y: f64,
    z: f64,
}

impl Vec3 {
    const fn new(x: f64, y: f64, z: f64) -> Self {
        Vec3 { x, y, z }
    }

    fn sub(self, o: Vec3) -> Vec3 {
        Vec3::new(self.x - o.x, self.y - o.y, self.z - o.z)
    }

    fn scale(self, s: f64) -> Vec3 {
        Vec3::new(self.x * s, self.y * s, self.z * s)
    }

    fn dot(self, o: Vec3) -> f64 {
        self.x * o.x + self.y * o.y + self.z * o.z
    }

    fn length(self) -> f64 {
        self.dot(self).sqrt()
    }

    fn normalize(self) -> Vec3 {
        let len = self.length();
        if len > 0.0 {
            self.scale(1.0 / len)
        } else {
            self
        }
    }
}

const SPHERES: [(Vec3, f64); 3] = [
    (Vec3::new(0.0, 0.0, 5.0), 1.0),
    (Vec3::new(-1.8, 0.4, 6.5), 0.8),
    (Vec3::new(1.6, -0.3, 4.2), 0.6),
];
const FLOOR_Y: f64 = -1.0;

/// Distance from `p` to the nearest surface.
fn scene_distance(p: Vec3) -> f64 {
    SPHERES
        .iter()
        .map(|&(center, radius)| p.sub(center).length() - radius)
        .fold(p.y - FLOOR_Y, f64::min)
}

fn surface_normal(p: Vec3) -> Vec3 {
    let e = 1e-4;
    Vec3::new(
        scene_distance(Vec3::new(p.x + e, p.y, p.z)) - scene_distance(Vec3::new(p.x - e, p.y, p.z)),
        scene_distance(Vec3::new(p.x, p.y + e, p.z)) - scene_distance(Vec3::new(p.x, p.y - e, p.z)),
        scene_distance(Vec3::new(p.x, p.y, p.z + e)) - scene_distance(Vec3::new(p.x, p.y, p.z - e)),
    )
    .normalize()
}

#[derive(Debug, Default, Clone, Copy)]
struct RowStats {
    steps: u64,
    hits: u64,
    luminance: f64,
}

/// March every pixel in `rows` of a `width` x `height` image.
fn render_rows(width: u32, height: u32, max_steps: u32, rows: std::ops::Range<usize>) -> RowStats {
    let light = Vec3::new(-0.5, 1.0, -0.6).normalize();
    let aspect = width as f64 / height as f64;
    let mut stats = RowStats::default();

    for y in rows {
        for x in 0..width {
            let u = (2.0 * (x as f64 + 0.5) / width as f64 - 1.0) * aspect;
            let v = 1.0 - 2.0 * (y as f64 + 0.5) / height as f64;
            let dir = Vec3::new(u, v, 1.5).normalize();

            let mut t = 0.0;
            for _ in 0..max_steps {
                stats.steps += 1;
                let p = dir.scale(t);
                let d = scene_distance(p);
                if d < HIT_EPSILON {
                    let n = surface_normal(p);
                    stats.hits += 1;
                    stats.luminance += n.dot(light).max(0.0);
                    break;
                }
                t += d;
                if t > MAX_DISTANCE {
                    break;
                }
            }
        }
    }
    stats
}

pub(super) fn ray_marching(
    params: &WorkloadParams,
    ctx: &KernelContext,
    multi: bool,
) -> Result<Measurement, KernelError> {
    let (width, height) = params.ray_marching_resolution;
    let max_steps = params.ray_marching_max_steps;
    let rows = height as usize;

    let (stats, elapsed) = timed(|| -> Result<RowStats, KernelError> {
        let parts = if multi {
            // Rows near the horizon cost more, so oversplit for balance.
            let tasks: Vec<_> = shard_ranges(rows, ctx.parallelism() * 4)
                .into_iter()
                .map(|range| move || render_rows(width, height, max_steps, range))
                .collect();
            ctx.scatter(tasks)?
        } else {
            vec![render_rows(width, height, max_steps, 0..rows)]
        };
        Ok(parts.into_iter().fold(RowStats::default(), |acc, s| RowStats {
            steps: acc.steps + s.steps,
            hits: acc.hits + s.hits,
            luminance: acc.luminance + s.luminance,
        }))
    });
    let stats = stats?;

    if stats.hits == 0 || !stats.luminance.is_finite() {
        return Err(KernelError::Verification(
            "no ray reached the scene".to_string(),
        ));
    }

    let pixels = width as u64 * height as u64;
    Ok(Measurement {
        elapsed,
        operations: stats.steps as f64,
        metrics: json!({
            "resolution": [width, height],
            "max_steps": max_steps,
            "hit_ratio": stats.hits as f64 / pixels as f64,
            "mean_luminance": stats.luminance / stats.hits as f64,
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_center_ray_hits_front_sphere() {
        let p = Vec3::new(0.0, 0.0, 4.0);
        assert!(scene_distance(p).abs() < 1e-12);
        let n = surface_normal(p);
        assert!((n.z + 1.0).abs() < 1e-3, "normal {:?}", n);
    }

    #[test]
    fn test_row_split_matches_full_render() {
        let full = render_rows(24, 16, 32, 0..16);
        let top = render_rows(24, 16, 32, 0..7);
        let bottom = render_rows(24, 16, 32, 7..16);
        assert_eq!(full.steps, top.steps + bottom.steps);
        assert_eq!(full.hits, top.hits + bottom.hits);
        assert!(full.hits > 0);
    }
}
