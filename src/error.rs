use thiserror::Error;

use crate::systems::clouds::buffers::BufferRole;

#[derive(Debug, Error)]
pub enum CloudError {
    #[error("could not allocate {role:?} buffer ({width}x{height}, {bytes} bytes)")]
    ResourceExhausted {
        role: BufferRole,
        width: u32,
        height: u32,
        bytes: usize,
    },
    #[error("{0:?} buffer was used before it was allocated")]
    MissingBuffer(BufferRole),
    #[error("{name} is {actual_width}x{actual_height}, expected {expected_width}x{expected_height}")]
    InputSize {
        name: &'static str,
        actual_width: u32,
        actual_height: u32,
        expected_width: u32,
        expected_height: u32,
    },
    #[error("failed to read cloud config: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid cloud config: {0}")]
    Config(#[from] serde_json::Error),
    #[error("failed to write noise image: {0}")]
    Image(#[from] image::ImageError),
}
