// Planet measurements (in meters)
pub const PLANET_RADIUS: f32 = 1_274_200.0;
pub const CAMERA_FAR_CLIP: f32 = 250_000.0;
pub const NEAR_CAMERA_FAR_CLIP: f32 = 10_000.0;

// Noise seed, the session regenerates fields from this unless reseeded
pub const NOISE_SEED: u64 = 0;

// Shape noise (3D worley)
pub const SHAPE_NOISE_RESOLUTION: usize = 128;
pub const SHAPE_NOISE_CELLS: usize = 4;
pub const SHAPE_NOISE_OCTAVES: usize = 4;

// Detail noise (3D worley)
pub const DETAIL_NOISE_RESOLUTION: usize = 128;
pub const DETAIL_NOISE_CELLS: usize = 8;
pub const DETAIL_NOISE_OCTAVES: usize = 4;

// Weather map + domain warp (2D perlin, 3 channels)
pub const WEATHER_MAP_RESOLUTION: usize = 512;
pub const WEATHER_MAP_CELLS: usize = 4;
pub const WEATHER_MAP_OCTAVES: usize = 6;

// Dither pattern
pub const BLUE_NOISE_RESOLUTION: usize = 64;

pub const NOISE_LACUNARITY: f32 = 2.0;

// Raymarch limits
pub const MAX_LIGHT_SAMPLES: u32 = 50;
pub const MAX_RAYMARCH_STEPS: u32 = 256;
pub const MIN_TRANSMITTANCE: f32 = 0.01;
pub const MAX_DEPTH_FACTOR: f32 = 0.9;
pub const STEP_REFERENCE_DISTANCE: f32 = 10_000.0;

// Upscale tuning
pub const DEPTH_THRESHOLD_SCALE: f32 = 0.01;

// Demo preview size (software frame)
pub const PREVIEW_WIDTH: u32 = 320;
pub const PREVIEW_HEIGHT: u32 = 180;
pub const CONFIG_PATH: &str = "assets/volken.json";
