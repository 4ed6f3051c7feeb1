use bevy::log::{debug, trace};
use bevy::math::{Quat, UVec2, Vec2, Vec3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::buffers::{BufferFormat, BufferRole, RenderBuffer, ResourceLifecycleManager};
use super::config::CloudConfig;
use super::passes::{self, CloudPass, GaussianKernel, RaymarchParams};
use super::wind::WindState;
use crate::config::MAX_DEPTH_FACTOR;
use crate::error::CloudError;
use crate::systems::noise::NoiseFields;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraState {
    pub position: Vec3,
    // looks down -Z with +Y up
    pub rotation: Quat,
    pub vertical_fov: f32,
    // far plane of the near camera
    pub near_far_clip: f32,
    pub far_clip: f32,
}

impl CameraState {
    // uv (0, 0) is the top left
    pub fn ray_direction(&self, uv: Vec2, aspect: f32) -> Vec3 {
        let ndc = Vec2::new(uv.x * 2.0 - 1.0, 1.0 - uv.y * 2.0);
        let tan = (self.vertical_fov * 0.5).tan();
        let view = Vec3::new(ndc.x * tan * aspect, ndc.y * tan, -1.0).normalize();

        self.rotation * view
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlanetState {
    pub center: Vec3,
    pub radius: f32,
    pub north: Vec3,
    pub east: Vec3,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LightState {
    // from the sun toward the scene
    pub direction: Vec3,
    pub color: Vec3,
}

/// Everything the host hands over for one frame.
///
/// Depth buffers hold linear distance along the view ray in world units. The
/// far depth may be a frame old and of a different size.
#[derive(Clone, Copy)]
pub struct FrameInputs<'a> {
    pub source: &'a RenderBuffer,
    pub near_depth: &'a RenderBuffer,
    pub far_depth: Option<&'a RenderBuffer>,
    pub camera: CameraState,
    pub planet: PlanetState,
    pub light: LightState,
    pub delta_time: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassThroughReason {
    Disabled,
    FarDepthMissing,
    // minimized window
    EmptyFrame,
    Failed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStatus {
    Composited,
    PassThrough(PassThroughReason),
}

#[derive(Clone, Debug)]
pub struct CloudFrame {
    pub color: RenderBuffer,
    pub status: FrameStatus,
}

impl CloudFrame {
    pub fn pass_through(source: &RenderBuffer, reason: PassThroughReason) -> Self {
        Self {
            color: source.clone(),
            status: FrameStatus::PassThrough(reason),
        }
    }
}

pub struct CloudPipeline {
    resources: ResourceLifecycleManager,
    kernel: GaussianKernel,
    wind: WindState,
    screen: Option<UVec2>,
    working: Option<UVec2>,
    history_valid: bool,
    rng: StdRng,
}

impl CloudPipeline {
    pub fn new(seed: u64) -> Self {
        Self::with_resources(ResourceLifecycleManager::new(), seed)
    }

    pub fn with_resources(resources: ResourceLifecycleManager, seed: u64) -> Self {
        Self {
            resources,
            kernel: GaussianKernel::default(),
            wind: WindState::default(),
            screen: None,
            working: None,
            history_valid: false,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn resources(&self) -> &ResourceLifecycleManager {
        &self.resources
    }

    pub fn wind(&self) -> &WindState {
        &self.wind
    }

    pub fn working_size(&self) -> Option<UVec2> {
        self.working
    }

    // true when the sizes changed since the last frame
    fn prepare(&mut self, screen: UVec2, working: UVec2) -> Result<bool, CloudError> {
        let resized = self.screen != Some(screen) || self.working != Some(working);

        if resized {
            if self.screen.is_some() {
                debug!(
                    "cloud resolution changed to {}x{} (screen {}x{})",
                    working.x, working.y, screen.x, screen.y
                );
            }
            self.resources.release_all();
            self.history_valid = false;
        }

        let resources = &mut self.resources;
        for (role, size, format) in [
            (BufferRole::CombinedDepth, screen, BufferFormat::R32Float),
            (BufferRole::LowResDepth, working, BufferFormat::R32Float),
            (BufferRole::LowResColor, working, BufferFormat::Rgba32Float),
            (BufferRole::History, working, BufferFormat::Rgba32Float),
            (BufferRole::UpscaledColor, screen, BufferFormat::Rgba32Float),
        ] {
            resources.ensure(role, size.x, size.y, format)?;
        }

        self.screen = Some(screen);
        self.working = Some(working);

        Ok(resized)
    }

    pub fn render(
        &mut self,
        config: &CloudConfig,
        fields: &NoiseFields,
        inputs: FrameInputs,
    ) -> Result<CloudFrame, CloudError> {
        let config = config.sanitized();

        if !config.enabled {
            debug!("clouds disabled, passing the frame through");
            return Ok(CloudFrame::pass_through(inputs.source, PassThroughReason::Disabled));
        }

        let Some(far_depth) = inputs.far_depth else {
            debug!("far depth not ready, passing the frame through");
            return Ok(CloudFrame::pass_through(
                inputs.source,
                PassThroughReason::FarDepthMissing,
            ));
        };

        if inputs.source.is_empty() || far_depth.is_empty() {
            debug!("empty frame, passing the frame through");
            return Ok(CloudFrame::pass_through(inputs.source, PassThroughReason::EmptyFrame));
        }

        let screen = inputs.source.size();
        if inputs.near_depth.size() != screen {
            return Err(CloudError::InputSize {
                name: "near depth",
                actual_width: inputs.near_depth.width(),
                actual_height: inputs.near_depth.height(),
                expected_width: screen.x,
                expected_height: screen.y,
            });
        }

        let working = config.working_size(screen.x, screen.y);
        let resized = self.prepare(screen, working)?;
        let alpha = if resized || !self.history_valid {
            1.0
        } else {
            config.history_blend
        };

        self.wind.advance(
            config.wind_speed,
            config.wind_direction,
            inputs.planet.north,
            inputs.planet.east,
            inputs.delta_time,
        );

        let params = RaymarchParams {
            config: &config,
            fields,
            camera: &inputs.camera,
            planet: &inputs.planet,
            light: &inputs.light,
            wind_offset: self.wind.offset,
            weather_offset: self.wind.weather_offset,
            blue_noise_offset: Vec2::new(self.rng.random(), self.rng.random()),
            max_depth: MAX_DEPTH_FACTOR * inputs.camera.far_clip,
        };

        let mut destination = inputs.source.clone();
        let buffers = self.resources.buffers()?;

        for pass in CloudPass::ORDER {
            trace!("running {:?}", pass);

            match pass {
                CloudPass::DepthFusion => passes::fuse_depth(
                    inputs.near_depth,
                    far_depth,
                    inputs.camera.near_far_clip,
                    buffers.combined_depth,
                ),
                CloudPass::Downsample => {
                    passes::downsample_depth(buffers.combined_depth, buffers.low_res_depth)
                }
                CloudPass::Raymarch => {
                    passes::raymarch(&params, buffers.low_res_depth, buffers.low_res_color)
                }
                CloudPass::TemporalBlend => {
                    passes::temporal_blend(buffers.low_res_color, buffers.history, alpha)
                }
                CloudPass::Upscale => passes::upscale(
                    buffers.history,
                    buffers.low_res_depth,
                    buffers.combined_depth,
                    params.max_depth,
                    config.depth_threshold,
                    buffers.upscaled_color,
                ),
                CloudPass::Composite => passes::composite(
                    &mut destination,
                    buffers.upscaled_color,
                    &self.kernel,
                    config.blur_radius,
                ),
            }
        }

        self.history_valid = true;

        Ok(CloudFrame {
            color: destination,
            status: FrameStatus::Composited,
        })
    }

    /// Drops every buffer. The next frame starts again without history.
    pub fn teardown(&mut self) {
        self.resources.release_all();
        self.screen = None;
        self.working = None;
        self.history_valid = false;
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::FRAC_PI_2;

    use bevy::math::Vec4;

    use super::*;
    use crate::config::{CAMERA_FAR_CLIP, NEAR_CAMERA_FAR_CLIP, PLANET_RADIUS};
    use crate::systems::noise::NoiseSettings;

    struct Scene {
        source: RenderBuffer,
        near: RenderBuffer,
        far: RenderBuffer,
    }

    impl Scene {
        fn new(width: u32, height: u32) -> Self {
            let pixels = (width * height) as usize;
            let colors: Vec<Vec4> = (0..pixels)
                .map(|i| Vec4::new(0.3, 0.5, i as f32 / pixels as f32, 1.0))
                .collect();

            Self {
                source: RenderBuffer::from_colors(width, height, &colors),
                near: RenderBuffer::from_depths(width, height, &vec![f32::MAX; pixels]),
                far: RenderBuffer::from_depths(width, height, &vec![CAMERA_FAR_CLIP; pixels]),
            }
        }

        fn inputs(&self, far: bool) -> FrameInputs<'_> {
            FrameInputs {
                source: &self.source,
                near_depth: &self.near,
                far_depth: far.then_some(&self.far),
                camera: CameraState {
                    position: Vec3::new(0.0, 500.0, 0.0),
                    rotation: Quat::from_rotation_x(FRAC_PI_2),
                    vertical_fov: 1.0,
                    near_far_clip: NEAR_CAMERA_FAR_CLIP,
                    far_clip: CAMERA_FAR_CLIP,
                },
                planet: PlanetState {
                    center: Vec3::new(0.0, -PLANET_RADIUS, 0.0),
                    radius: PLANET_RADIUS,
                    north: Vec3::NEG_Z,
                    east: Vec3::X,
                },
                light: LightState {
                    direction: Vec3::new(0.3, -1.0, 0.2).normalize(),
                    color: Vec3::ONE,
                },
                delta_time: 1.0 / 60.0,
            }
        }
    }

    fn fields() -> NoiseFields {
        NoiseFields::synthesize(&NoiseSettings::low_resolution(0))
    }

    fn test_config() -> CloudConfig {
        CloudConfig {
            step_size: 2_000.0,
            num_light_sample_points: 2,
            ..Default::default()
        }
    }

    #[test]
    fn disabled_clouds_pass_the_source_through() {
        let scene = Scene::new(8, 4);
        let mut pipeline = CloudPipeline::new(0);
        let config = CloudConfig {
            enabled: false,
            ..test_config()
        };

        let frame = pipeline.render(&config, &fields(), scene.inputs(true)).unwrap();

        assert_eq!(frame.status, FrameStatus::PassThrough(PassThroughReason::Disabled));
        assert_eq!(frame.color, scene.source);
        assert_eq!(pipeline.resources().allocation_count(), 0);
    }

    #[test]
    fn missing_far_depth_passes_the_source_through() {
        let scene = Scene::new(8, 4);
        let mut pipeline = CloudPipeline::new(0);

        let frame = pipeline.render(&test_config(), &fields(), scene.inputs(false)).unwrap();

        assert_eq!(
            frame.status,
            FrameStatus::PassThrough(PassThroughReason::FarDepthMissing)
        );
        assert_eq!(frame.color, scene.source);
    }

    #[test]
    fn zero_sized_frames_pass_the_source_through() {
        let fields = fields();
        let mut pipeline = CloudPipeline::new(0);

        let mut empty = Scene::new(8, 4);
        empty.source = RenderBuffer::from_colors(0, 0, &[]);
        empty.near = RenderBuffer::from_depths(0, 0, &[]);
        let frame = pipeline.render(&test_config(), &fields, empty.inputs(true)).unwrap();

        assert_eq!(frame.status, FrameStatus::PassThrough(PassThroughReason::EmptyFrame));
        assert_eq!(frame.color.size(), UVec2::ZERO);
        assert_eq!(pipeline.resources().allocation_count(), 0);

        let mut no_far = Scene::new(8, 4);
        no_far.far = RenderBuffer::from_depths(0, 4, &[]);
        let frame = pipeline.render(&test_config(), &fields, no_far.inputs(true)).unwrap();

        assert_eq!(frame.status, FrameStatus::PassThrough(PassThroughReason::EmptyFrame));
        assert_eq!(frame.color, no_far.source);
    }

    #[test]
    fn resolution_change_replaces_history() {
        let scene = Scene::new(8, 4);
        let fields = fields();
        let mut pipeline = CloudPipeline::new(0);
        let mut config = CloudConfig {
            history_blend: 0.2,
            ..test_config()
        };

        pipeline.render(&config, &fields, scene.inputs(true)).unwrap();
        pipeline.render(&config, &fields, scene.inputs(true)).unwrap();
        assert_eq!(pipeline.working_size(), Some(UVec2::new(4, 2)));

        config.resolution_scale = 1.0;
        pipeline.render(&config, &fields, scene.inputs(true)).unwrap();

        let resources = pipeline.resources();
        let history = resources.get(BufferRole::History).unwrap();
        let current = resources.get(BufferRole::LowResColor).unwrap();
        assert_eq!(history.size(), UVec2::new(8, 4));
        assert_eq!(history.data(), current.data());
    }

    #[test]
    fn output_matches_the_screen() {
        let scene = Scene::new(16, 8);
        let mut pipeline = CloudPipeline::new(0);

        let frame = pipeline.render(&test_config(), &fields(), scene.inputs(true)).unwrap();

        assert_eq!(frame.status, FrameStatus::Composited);
        assert_eq!(frame.color.size(), UVec2::new(16, 8));
        for y in 0..8 {
            for x in 0..16 {
                let color = frame.color.color(x, y);
                assert!(color.min_element() >= 0.0);
                assert_eq!(color.w, scene.source.color(x, y).w);
            }
        }
    }

    #[test]
    fn exhausted_budget_is_surfaced() {
        let scene = Scene::new(8, 4);
        let mut pipeline = CloudPipeline::with_resources(ResourceLifecycleManager::with_budget(64), 0);

        let result = pipeline.render(&test_config(), &fields(), scene.inputs(true));

        assert!(matches!(result, Err(CloudError::ResourceExhausted { .. })));
    }

    #[test]
    fn mismatched_near_depth_is_rejected() {
        let mut scene = Scene::new(8, 4);
        scene.near = RenderBuffer::from_depths(2, 2, &[0.0; 4]);
        let mut pipeline = CloudPipeline::new(0);

        let result = pipeline.render(&test_config(), &fields(), scene.inputs(true));

        assert!(matches!(result, Err(CloudError::InputSize { .. })));
    }

    #[test]
    fn teardown_releases_everything() {
        let scene = Scene::new(8, 4);
        let mut pipeline = CloudPipeline::new(0);
        pipeline.render(&test_config(), &fields(), scene.inputs(true)).unwrap();

        pipeline.teardown();

        assert_eq!(pipeline.resources().live_bytes(), 0);
        assert_eq!(pipeline.working_size(), None);
    }
}
