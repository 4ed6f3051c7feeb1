
pub mod config;
pub mod error;
pub mod systems;

pub use error::CloudError;
pub use systems::clouds::{
    CloudConfig, CloudFrame, CloudPipeline, FrameInputs, FrameStatus, VolkenContext, VolkenPlugin,
};
pub use systems::noise::{NoiseFieldCache, NoiseFields, NoiseSettings};
