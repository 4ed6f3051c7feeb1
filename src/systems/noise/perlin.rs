use std::f32::consts::TAU;

use bevy::log::debug;
use bevy::math::Vec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::field::{FieldDimension, ScalarField};
use super::schedule::CellSchedule;

/// One octave of gradient noise with a unit gradient per lattice corner.
pub struct PerlinOctave {
    cells: usize,
    dimension: FieldDimension,
    gradients: Vec<Vec3>,
}

impl PerlinOctave {
    pub fn new(seed: u64, cells: usize, dimension: FieldDimension) -> Self {
        let cells = cells.max(1);
        let mut rng = StdRng::seed_from_u64(seed);
        let count = cells * cells * dimension.depth(cells);

        let gradients = (0..count)
            .map(|_| match dimension {
                FieldDimension::D2 => {
                    let phi = rng.random::<f32>() * TAU;
                    Vec3::new(phi.cos(), phi.sin(), 0.0)
                }
                FieldDimension::D3 => {
                    // uniform on the sphere: uniform height, uniform azimuth
                    let z = rng.random::<f32>() * 2.0 - 1.0;
                    let phi = rng.random::<f32>() * TAU;
                    let r = (1.0 - z * z).max(0.0).sqrt();
                    Vec3::new(r * phi.cos(), r * phi.sin(), z)
                }
            })
            .collect();

        Self {
            cells,
            dimension,
            gradients,
        }
    }

    fn gradient(&self, x: i64, y: i64, z: i64) -> Vec3 {
        let n = self.cells as i64;
        let x = x.rem_euclid(n) as usize;
        let y = y.rem_euclid(n) as usize;
        let z = match self.dimension {
            FieldDimension::D2 => 0,
            FieldDimension::D3 => z.rem_euclid(n) as usize,
        };

        self.gradients[(z * self.cells + y) * self.cells + x]
    }

    fn corner(&self, base: (i64, i64, i64), offset: Vec3, frac: Vec3) -> f32 {
        let g = self.gradient(
            base.0 + offset.x as i64,
            base.1 + offset.y as i64,
            base.2 + offset.z as i64,
        );
        (frac - offset).dot(g)
    }

    /// Value at a texel-space position of a field with `resolution` texels per period.
    pub fn evaluate(&self, p: Vec3, resolution: usize) -> f32 {
        let cell_pos = p * (self.cells as f32 / resolution as f32);
        let floor = cell_pos.floor();
        let frac = cell_pos - floor;
        let base = (floor.x as i64, floor.y as i64, floor.z as i64);

        let sx = smootherstep(frac.x);
        let sy = smootherstep(frac.y);

        let face = |z: f32| {
            let c00 = self.corner(base, Vec3::new(0.0, 0.0, z), frac);
            let c10 = self.corner(base, Vec3::new(1.0, 0.0, z), frac);
            let c01 = self.corner(base, Vec3::new(0.0, 1.0, z), frac);
            let c11 = self.corner(base, Vec3::new(1.0, 1.0, z), frac);
            lerp(lerp(c00, c10, sx), lerp(c01, c11, sx), sy)
        };

        match self.dimension {
            FieldDimension::D2 => face(0.0),
            FieldDimension::D3 => lerp(face(0.0), face(1.0), smootherstep(frac.z)),
        }
    }
}

/// Quintic fade `6t^5 - 15t^4 + 10t^3`, flat first and second derivative at 0 and 1.
pub fn smootherstep(t: f32) -> f32 {
    t * t * t * (t * (t * 6.0 - 15.0) + 10.0)
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Fractal gradient noise, tileable at `resolution`. Values are signed.
pub fn synthesize_perlin(
    seed: u64,
    resolution: usize,
    schedule: &CellSchedule,
    dimension: FieldDimension,
) -> ScalarField {
    let mut field = ScalarField::zeroed(resolution, dimension, 1);
    let resolution = field.resolution();

    for octave in schedule.octaves() {
        if octave.cell_count > resolution {
            debug!(
                "skipping perlin octave with {} cells at resolution {}",
                octave.cell_count, resolution
            );
            continue;
        }

        let lattice = PerlinOctave::new(seed, octave.cell_count, dimension);
        let weight = octave.weight;
        field.accumulate(|p| weight * lattice.evaluate(p, resolution));
    }

    field
}
