use std::fs;
use std::path::Path;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::MAX_LIGHT_SAMPLES;
use crate::error::CloudError;

/// Tunable cloud parameters, owned by the host and read once per frame.
///
/// Distances are in meters. Every field falls back to its default when missing
/// from a loaded file.
#[derive(Resource, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudConfig {
    /// toggled off by the host when the planet has no atmosphere
    pub enabled: bool,
    /// extinction per meter at full noise density
    pub density: f32,
    /// extinction on the path toward the light
    pub absorption: f32,
    pub ambient_light: f32,
    /// fraction of the sky covered, 0 clear to 1 overcast
    pub coverage: f32,
    /// world size of one shape noise period
    pub shape_scale: f32,
    /// world size of one detail noise period
    pub detail_scale: f32,
    pub detail_strength: f32,
    /// world size of one weather map period
    pub weather_map_scale: f32,
    /// how much the weather map moves local coverage
    pub weather_map_strength: f32,
    /// shape coordinate offset from the warp channels, in shape periods
    pub domain_warp_strength: f32,
    /// forward g, backward g, backward lobe weight, isotropic floor
    pub phase_parameters: Vec4,
    /// shape periods per second
    pub wind_speed: f32,
    /// degrees clockwise from north
    pub wind_direction: f32,
    pub scatter_strength: f32,
    pub cloud_color: Vec3,
    pub layer_heights: Vec2,
    pub layer_spreads: Vec2,
    pub layer_strengths: Vec2,
    /// top of the shell above the first layer
    pub max_cloud_height: f32,
    /// working resolution relative to the screen
    pub resolution_scale: f32,
    pub step_size: f32,
    pub step_size_falloff: f32,
    pub num_light_sample_points: u32,
    /// blue noise texels per working pixel
    pub blue_noise_scale: f32,
    /// start offset as a fraction of one step
    pub blue_noise_strength: f32,
    /// upscale edge rejection, scaled by 0.01 against normalized depth
    pub depth_threshold: f32,
    /// composite blur tap spacing in texels
    pub blur_radius: f32,
    /// weight of the new frame against history, 1 disables feedback
    pub history_blend: f32,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            density: 0.025,
            absorption: 0.5,
            ambient_light: 0.1,
            coverage: 0.25,
            shape_scale: 10_000.0,
            detail_scale: 2_000.0,
            detail_strength: 0.5,
            weather_map_scale: 200_000.0,
            weather_map_strength: 0.5,
            domain_warp_strength: 0.1,
            phase_parameters: Vec4::new(0.83, 0.3, 0.5, 0.5),
            wind_speed: 0.01,
            wind_direction: 0.0,
            scatter_strength: 10.0,
            cloud_color: Vec3::ONE,
            layer_heights: Vec2::new(2_000.0, 4_500.0),
            layer_spreads: Vec2::new(1_000.0, 750.0),
            layer_strengths: Vec2::new(3.0, 1.5),
            max_cloud_height: 6_500.0,
            resolution_scale: 0.5,
            step_size: 200.0,
            step_size_falloff: 1.0,
            num_light_sample_points: 10,
            blue_noise_scale: 1.0,
            blue_noise_strength: 0.0,
            depth_threshold: 0.1,
            blur_radius: 0.5,
            history_blend: 1.0,
        }
    }
}

impl CloudConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CloudError> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, CloudError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json_string(&self) -> Result<String, CloudError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Copy with every parameter pulled into its safe range.
    pub fn sanitized(&self) -> Self {
        let mut config = self.clone();

        config.density = config.density.max(0.0);
        config.absorption = config.absorption.max(0.0);
        config.ambient_light = config.ambient_light.max(0.0);
        config.coverage = config.coverage.clamp(0.0, 1.0);
        config.shape_scale = config.shape_scale.max(0.1);
        config.detail_scale = config.detail_scale.max(0.1);
        config.detail_strength = config.detail_strength.clamp(0.0, 1.0);
        config.weather_map_scale = config.weather_map_scale.max(0.1);
        config.weather_map_strength = config.weather_map_strength.max(0.0);
        config.scatter_strength = config.scatter_strength.max(0.0);
        config.cloud_color = config.cloud_color.max(Vec3::ZERO);
        config.layer_spreads = config.layer_spreads.max(Vec2::splat(0.1));
        config.layer_strengths = config.layer_strengths.max(Vec2::ZERO);
        config.max_cloud_height = config.max_cloud_height.max(0.001);
        config.resolution_scale = config.resolution_scale.clamp(0.1, 1.0);
        config.step_size = config.step_size.max(0.01);
        config.step_size_falloff = config.step_size_falloff.max(0.0);
        config.num_light_sample_points = config.num_light_sample_points.clamp(1, MAX_LIGHT_SAMPLES);
        config.blue_noise_scale = config.blue_noise_scale.max(0.001);
        config.blue_noise_strength = config.blue_noise_strength.max(0.0);
        config.depth_threshold = config.depth_threshold.max(0.0);
        config.blur_radius = config.blur_radius.max(0.0);
        config.history_blend = config.history_blend.clamp(0.0, 1.0);

        // g of exactly +-1 makes henyey-greenstein singular
        config.phase_parameters.x = config.phase_parameters.x.clamp(-0.999, 0.999);
        config.phase_parameters.y = config.phase_parameters.y.clamp(-0.999, 0.999);
        config.phase_parameters.z = config.phase_parameters.z.clamp(0.0, 1.0);
        config.phase_parameters.w = config.phase_parameters.w.clamp(0.0, 1.0);

        config
    }

    /// Inner and outer radius of the cloud shell around a planet of `radius`.
    pub fn shell_radii(&self, radius: f32) -> (f32, f32) {
        let bottom = (self.layer_heights - self.layer_spreads).min_element();
        let top = self.layer_heights.x + self.max_cloud_height;
        (radius + bottom, radius + top.max(bottom + 0.001))
    }

    /// Working buffer size for a screen of `width` x `height`.
    pub fn working_size(&self, width: u32, height: u32) -> UVec2 {
        let scale = self.resolution_scale;
        UVec2::new(
            ((width as f32 * scale).round() as u32).max(1),
            ((height as f32 * scale).round() as u32).max(1),
        )
    }
}
