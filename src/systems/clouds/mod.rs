use bevy::prelude::*;

pub mod buffers;
pub mod config;
pub mod passes;
pub mod pipeline;
pub mod wind;

pub use buffers::{BufferFormat, BufferRole, RenderBuffer, ResourceLifecycleManager};
pub use config::CloudConfig;
pub use pipeline::{
    CameraState, CloudFrame, CloudPipeline, FrameInputs, FrameStatus, LightState,
    PassThroughReason, PlanetState,
};

use crate::error::CloudError;
use crate::systems::noise::{NoiseFieldCache, NoiseFields, NoiseSettings};

pub struct VolkenPlugin;

impl Plugin for VolkenPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<CloudConfig>()
            .init_resource::<NoiseSettings>()
            .init_resource::<CloudFrameOutput>()
            .add_event::<ReseedClouds>()
            .add_systems(Startup, start)
            .add_systems(
                Update,
                (reseed, render_clouds)
                    .chain()
                    .run_if(resource_exists::<VolkenContext>),
            )
            .add_systems(Last, teardown_on_exit);
    }
}

/// Session state behind the host hooks: the noise cache and the pipeline.
#[derive(Resource)]
pub struct VolkenContext {
    cache: NoiseFieldCache,
    pipeline: CloudPipeline,
}

impl VolkenContext {
    pub fn init(settings: &NoiseSettings) -> Self {
        Self {
            cache: NoiseFieldCache::generate(settings),
            pipeline: CloudPipeline::new(settings.seed),
        }
    }

    pub fn with_pipeline(settings: &NoiseSettings, pipeline: CloudPipeline) -> Self {
        Self {
            cache: NoiseFieldCache::generate(settings),
            pipeline,
        }
    }

    /// Renders one frame against the fields current at frame start.
    pub fn on_frame(
        &mut self,
        config: &CloudConfig,
        inputs: FrameInputs,
    ) -> Result<CloudFrame, CloudError> {
        let fields = self.cache.fields();
        self.pipeline.render(config, &fields, inputs)
    }

    pub fn teardown(&mut self) {
        self.pipeline.teardown();
    }

    pub fn reseed(&mut self, seed: u64) {
        self.cache.reseed(seed);
    }

    pub fn cache(&self) -> &NoiseFieldCache {
        &self.cache
    }

    pub fn pipeline(&self) -> &CloudPipeline {
        &self.pipeline
    }
}

/// Per-frame buffers and scene state published by the host.
#[derive(Resource)]
pub struct CloudFrameSource {
    pub source: RenderBuffer,
    pub near_depth: RenderBuffer,
    /// stays empty until the far camera has rendered once
    pub far_depth: Option<RenderBuffer>,
    pub camera: CameraState,
    pub planet: PlanetState,
    pub light: LightState,
}

impl CloudFrameSource {
    pub fn inputs(&self, delta_time: f32) -> FrameInputs<'_> {
        FrameInputs {
            source: &self.source,
            near_depth: &self.near_depth,
            far_depth: self.far_depth.as_ref(),
            camera: self.camera,
            planet: self.planet,
            light: self.light,
            delta_time,
        }
    }
}

#[derive(Resource, Default)]
pub struct CloudFrameOutput {
    pub frame: Option<CloudFrame>,
}

/// GPU copies of the cached noise fields, re-uploaded on every reseed.
///
/// Nothing in this crate samples them. The CPU passes read `NoiseFields`
/// directly, these handles are for a shader backend the host binds.
#[derive(Resource)]
pub struct CloudTextures {
    pub shape: Handle<Image>,
    pub detail: Handle<Image>,
    pub weather: Handle<Image>,
    pub blue_noise: Handle<Image>,
}

impl CloudTextures {
    fn upload(fields: &NoiseFields, images: &mut Assets<Image>) -> Self {
        Self {
            shape: images.add(fields.shape.to_image()),
            detail: images.add(fields.detail.to_image()),
            weather: images.add(fields.weather.to_image()),
            blue_noise: images.add(fields.blue_noise.to_image()),
        }
    }
}

#[derive(Event, Clone, Copy, Debug)]
pub struct ReseedClouds(pub u64);

fn start(
    mut commands: Commands,
    settings: Res<NoiseSettings>,
    images: Option<ResMut<Assets<Image>>>,
) {
    let context = VolkenContext::init(&settings);

    // headless apps have no image assets
    if let Some(mut images) = images {
        commands.insert_resource(CloudTextures::upload(&context.cache.fields(), &mut images));
    }

    commands.insert_resource(context);
}

fn reseed(
    mut commands: Commands,
    mut events: EventReader<ReseedClouds>,
    mut context: ResMut<VolkenContext>,
    mut settings: ResMut<NoiseSettings>,
    images: Option<ResMut<Assets<Image>>>,
) {
    // only the newest request matters
    let Some(ReseedClouds(seed)) = events.read().last().copied() else {
        return;
    };

    info!("reseeding cloud noise with {}", seed);
    context.reseed(seed);
    settings.seed = seed;

    if let Some(mut images) = images {
        commands.insert_resource(CloudTextures::upload(&context.cache.fields(), &mut images));
    }
}

fn render_clouds(
    mut context: ResMut<VolkenContext>,
    config: Res<CloudConfig>,
    source: Option<Res<CloudFrameSource>>,
    time: Res<Time>,
    mut output: ResMut<CloudFrameOutput>,
) {
    let Some(source) = source else {
        return;
    };

    let frame = match context.on_frame(&config, source.inputs(time.delta_secs())) {
        Ok(frame) => frame,
        Err(err) => {
            error!("cloud frame failed: {}", err);
            CloudFrame::pass_through(&source.source, PassThroughReason::Failed)
        }
    };

    output.frame = Some(frame);
}

fn teardown_on_exit(mut exit: EventReader<AppExit>, context: Option<ResMut<VolkenContext>>) {
    if exit.read().next().is_none() {
        return;
    }

    if let Some(mut context) = context {
        context.teardown();
        info!("released cloud buffers");
    }
}
