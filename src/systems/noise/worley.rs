use bevy::log::debug;
use bevy::math::Vec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::field::{FieldDimension, ScalarField};
use super::schedule::CellSchedule;

pub struct WorleyOctave {
    cells: usize,
    dimension: FieldDimension,
    points: Vec<Vec3>,
}

impl WorleyOctave {
    // restarts the stream from seed for every octave
    pub fn new(seed: u64, cells: usize, dimension: FieldDimension) -> Self {
        let cells = cells.max(1);
        let mut rng = StdRng::seed_from_u64(seed);
        let count = cells * cells * dimension.depth(cells);

        let points = (0..count)
            .map(|_| {
                let x = rng.random::<f32>();
                let y = rng.random::<f32>();
                let z = match dimension {
                    FieldDimension::D2 => 0.0,
                    FieldDimension::D3 => rng.random::<f32>(),
                };
                Vec3::new(x, y, z)
            })
            .collect();

        Self {
            cells,
            dimension,
            points,
        }
    }

    fn point(&self, x: i64, y: i64, z: i64) -> Vec3 {
        let n = self.cells as i64;
        let x = x.rem_euclid(n) as usize;
        let y = y.rem_euclid(n) as usize;
        let z = match self.dimension {
            FieldDimension::D2 => 0,
            FieldDimension::D3 => z.rem_euclid(n) as usize,
        };

        self.points[(z * self.cells + y) * self.cells + x]
    }

    // p in texels, distances in cell units
    pub fn evaluate(&self, p: Vec3, resolution: usize) -> f32 {
        let cell_pos = p * (self.cells as f32 / resolution as f32);
        let base = cell_pos.floor();
        let local = cell_pos - base;
        let (bx, by, bz) = (base.x as i64, base.y as i64, base.z as i64);

        let mut nearest = f32::MAX;
        let mut visit = |dx: i64, dy: i64, dz: i64| {
            let offset = Vec3::new(dx as f32, dy as f32, dz as f32);
            let jitter = self.point(bx + dx, by + dy, bz + dz) + offset;
            nearest = nearest.min((local - jitter).length_squared());
        };

        match self.dimension {
            FieldDimension::D3 => {
                for dz in -1..=1 {
                    for dy in -1..=1 {
                        for dx in -1..=1 {
                            visit(dx, dy, dz);
                        }
                    }
                }
            }
            FieldDimension::D2 => {
                // own cell plus the three cells facing the sample's quadrant
                let sx = if local.x < 0.5 { -1 } else { 1 };
                let sy = if local.y < 0.5 { -1 } else { 1 };
                for (dx, dy) in [(0, 0), (sx, 0), (0, sy), (sx, sy)] {
                    visit(dx, dy, 0);
                }
            }
        }

        (1.0 - nearest.sqrt()).max(0.0)
    }
}

pub fn synthesize_worley(
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
                "skipping worley octave with {} cells at resolution {}",
                octave.cell_count, resolution
            );
            continue;
        }

        let cells = WorleyOctave::new(seed, octave.cell_count, dimension);
        let weight = octave.weight;
        field.accumulate(|p| weight * cells.evaluate(p, resolution));
    }

    field
}
