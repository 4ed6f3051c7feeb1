use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::field::{FieldDimension, ScalarField};

/// Tileable dither pattern with suppressed low frequencies.
///
/// White noise minus its 3x3 toroidal mean, then rank-remapped so values are
/// evenly spread over `[0, 1)`.
pub fn synthesize_blue_noise(seed: u64, resolution: usize) -> ScalarField {
    let res = resolution.max(2);
    let mut rng = StdRng::seed_from_u64(seed);
    let white: Vec<f32> = (0..res * res).map(|_| rng.random::<f32>()).collect();

    let at = |x: i64, y: i64| {
        let n = res as i64;
        white[(y.rem_euclid(n) * n + x.rem_euclid(n)) as usize]
    };

    let high_pass: Vec<f32> = (0..res * res)
        .map(|i| {
            let (x, y) = ((i % res) as i64, (i / res) as i64);
            let mut mean = 0.0;
            for dy in -1..=1 {
                for dx in -1..=1 {
                    mean += at(x + dx, y + dy);
                }
            }
            at(x, y) - mean / 9.0
        })
        .collect();

    let mut order: Vec<usize> = (0..high_pass.len()).collect();
    order.sort_by(|a, b| high_pass[*a].total_cmp(&high_pass[*b]));

    let count = order.len() as f32;
    let mut ranks = vec![0.0; order.len()];
    for (rank, texel) in order.into_iter().enumerate() {
        ranks[texel] = rank as f32 / count;
    }

    let mut field = ScalarField::zeroed(res, FieldDimension::D2, 1);
    field.accumulate(|p| ranks[p.x as usize + p.y as usize * res]);

    field
}
