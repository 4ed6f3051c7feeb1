use std::sync::Arc;
use std::time::Instant;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

pub mod blue;
pub mod field;
pub mod perlin;
pub mod schedule;
pub mod worley;

pub use blue::synthesize_blue_noise;
pub use field::{FieldDimension, ScalarField};
pub use perlin::synthesize_perlin;
pub use schedule::{CellSchedule, Octave};
pub use worley::synthesize_worley;

use crate::config::{
    BLUE_NOISE_RESOLUTION, DETAIL_NOISE_CELLS, DETAIL_NOISE_OCTAVES, DETAIL_NOISE_RESOLUTION,
    NOISE_LACUNARITY, NOISE_SEED, SHAPE_NOISE_CELLS, SHAPE_NOISE_OCTAVES, SHAPE_NOISE_RESOLUTION,
    WEATHER_MAP_CELLS, WEATHER_MAP_OCTAVES, WEATHER_MAP_RESOLUTION,
};

// per-field seed offsets so the fields do not share jitter patterns
const DETAIL_SEED_OFFSET: u64 = 1;
const WEATHER_SEED_OFFSET: u64 = 2;
const BLUE_NOISE_SEED_OFFSET: u64 = 5;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NoiseLayerSettings {
    pub resolution: usize,
    pub base_cell_count: usize,
    pub octaves: usize,
    pub lacunarity: f32,
}

impl NoiseLayerSettings {
    pub fn schedule(&self) -> CellSchedule {
        CellSchedule::new(self.base_cell_count, self.octaves, self.lacunarity)
    }
}

/// Resolutions and octave plans for every cached field.
#[derive(Resource, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NoiseSettings {
    pub seed: u64,
    pub shape: NoiseLayerSettings,
    pub detail: NoiseLayerSettings,
    pub weather: NoiseLayerSettings,
    pub blue_noise_resolution: usize,
}

impl Default for NoiseSettings {
    fn default() -> Self {
        Self {
            seed: NOISE_SEED,
            shape: NoiseLayerSettings {
                resolution: SHAPE_NOISE_RESOLUTION,
                base_cell_count: SHAPE_NOISE_CELLS,
                octaves: SHAPE_NOISE_OCTAVES,
                lacunarity: NOISE_LACUNARITY,
            },
            detail: NoiseLayerSettings {
                resolution: DETAIL_NOISE_RESOLUTION,
                base_cell_count: DETAIL_NOISE_CELLS,
                octaves: DETAIL_NOISE_OCTAVES,
                lacunarity: NOISE_LACUNARITY,
            },
            weather: NoiseLayerSettings {
                resolution: WEATHER_MAP_RESOLUTION,
                base_cell_count: WEATHER_MAP_CELLS,
                octaves: WEATHER_MAP_OCTAVES,
                lacunarity: NOISE_LACUNARITY,
            },
            blue_noise_resolution: BLUE_NOISE_RESOLUTION,
        }
    }
}

impl NoiseSettings {
    /// Small fields, fast enough to synthesize in tests and previews.
    pub fn low_resolution(seed: u64) -> Self {
        let mut settings = Self {
            seed,
            ..default()
        };
        settings.shape.resolution = 32;
        settings.detail.resolution = 16;
        settings.detail.base_cell_count = 4;
        settings.weather.resolution = 64;
        settings.blue_noise_resolution = 32;
        settings
    }
}

/// Every field the raymarcher samples, synthesized together from one seed.
#[derive(Debug)]
pub struct NoiseFields {
    pub seed: u64,
    /// 3D worley, large scale cloud shape
    pub shape: ScalarField,
    /// 3D worley, edge erosion
    pub detail: ScalarField,
    /// 2D perlin: coverage in channel 0, domain warp xy in channels 1 and 2
    pub weather: ScalarField,
    /// 2D dither for the ray start offset
    pub blue_noise: ScalarField,
}

impl NoiseFields {
    pub fn synthesize(settings: &NoiseSettings) -> Self {
        let start = Instant::now();
        let seed = settings.seed;

        let shape = synthesize_worley(
            seed,
            settings.shape.resolution,
            &settings.shape.schedule(),
            FieldDimension::D3,
        );

        let detail = synthesize_worley(
            seed.wrapping_add(DETAIL_SEED_OFFSET),
            settings.detail.resolution,
            &settings.detail.schedule(),
            FieldDimension::D3,
        );

        let weather_schedule = settings.weather.schedule();
        let weather_channels: Vec<ScalarField> = (0..3)
            .map(|channel| {
                synthesize_perlin(
                    seed.wrapping_add(WEATHER_SEED_OFFSET + channel),
                    settings.weather.resolution,
                    &weather_schedule,
                    FieldDimension::D2,
                )
            })
            .collect();
        let weather = ScalarField::merge_channels(&weather_channels);

        let blue_noise = synthesize_blue_noise(
            seed.wrapping_add(BLUE_NOISE_SEED_OFFSET),
            settings.blue_noise_resolution,
        );

        info!(
            "synthesized cloud noise (seed {}, shape {}^3, detail {}^3, weather {}^2) in {:.2?}",
            seed,
            shape.resolution(),
            detail.resolution(),
            weather.resolution(),
            start.elapsed()
        );

        Self {
            seed,
            shape,
            detail,
            weather,
            blue_noise,
        }
    }
}

/// Owns the session's noise fields.
///
/// Frames take an `Arc` handle at frame start. A reseed builds the new fields
/// completely before swapping the handle, so a frame still holding the old
/// fields keeps them alive until it finishes.
pub struct NoiseFieldCache {
    settings: NoiseSettings,
    current: Arc<NoiseFields>,
}

impl NoiseFieldCache {
    pub fn generate(settings: &NoiseSettings) -> Self {
        Self {
            settings: settings.clone(),
            current: Arc::new(NoiseFields::synthesize(settings)),
        }
    }

    pub fn fields(&self) -> Arc<NoiseFields> {
        Arc::clone(&self.current)
    }

    pub fn seed(&self) -> u64 {
        self.settings.seed
    }

    pub fn settings(&self) -> &NoiseSettings {
        &self.settings
    }

    /// Blocks until fields for `seed` are ready, then swaps them in.
    pub fn reseed(&mut self, seed: u64) {
        let mut settings = self.settings.clone();
        settings.seed = seed;

        let fresh = Arc::new(NoiseFields::synthesize(&settings));
        self.current = fresh;
        self.settings = settings;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weather_map_packs_three_channels() {
        let fields = NoiseFields::synthesize(&NoiseSettings::low_resolution(0));

        assert_eq!(fields.weather.channels(), 3);
        assert_eq!(fields.weather.dimension(), FieldDimension::D2);
        assert_eq!(fields.shape.dimension(), FieldDimension::D3);
        assert_eq!(fields.shape.resolution(), 32);
    }

    #[test]
    fn reseed_swaps_fields_without_touching_held_handles() {
        let mut cache = NoiseFieldCache::generate(&NoiseSettings::low_resolution(1));
        let held = cache.fields();

        cache.reseed(2);

        assert_eq!(held.seed, 1);
        assert_eq!(cache.seed(), 2);
        assert_eq!(cache.fields().seed, 2);
        assert_ne!(held.shape.data(), cache.fields().shape.data());
    }

    #[test]
    fn regeneration_is_reproducible() {
        let settings = NoiseSettings::low_resolution(7);
        let a = NoiseFields::synthesize(&settings);
        let b = NoiseFields::synthesize(&settings);

        assert_eq!(a.shape.data(), b.shape.data());
        assert_eq!(a.weather.data(), b.weather.data());
        assert_eq!(a.blue_noise.data(), b.blue_noise.data());
    }
}
