use bevy::log::debug;
use bevy::math::{UVec2, Vec2, Vec4};

use crate::error::CloudError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferRole {
    /// raymarch output at the working resolution
    LowResColor,
    /// blended clouds carried into the next frame
    History,
    /// near and far depth fused at screen resolution
    CombinedDepth,
    LowResDepth,
    UpscaledColor,
}

impl BufferRole {
    pub const ALL: [BufferRole; 5] = [
        BufferRole::LowResColor,
        BufferRole::History,
        BufferRole::CombinedDepth,
        BufferRole::LowResDepth,
        BufferRole::UpscaledColor,
    ];
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferFormat {
    Rgba32Float,
    R32Float,
}

impl BufferFormat {
    pub fn channels(self) -> usize {
        match self {
            BufferFormat::Rgba32Float => 4,
            BufferFormat::R32Float => 1,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RenderBuffer {
    width: u32,
    height: u32,
    format: BufferFormat,
    data: Vec<f32>,
}

impl RenderBuffer {
    pub fn new(
        role: BufferRole,
        width: u32,
        height: u32,
        format: BufferFormat,
    ) -> Result<Self, CloudError> {
        let len = width as usize * height as usize * format.channels();
        let exhausted = || CloudError::ResourceExhausted {
            role,
            width,
            height,
            bytes: len * size_of::<f32>(),
        };

        let mut data = Vec::new();
        data.try_reserve_exact(len).map_err(|_| exhausted())?;
        data.resize(len, 0.0);

        Ok(Self {
            width,
            height,
            format,
            data,
        })
    }

    pub fn from_colors(width: u32, height: u32, colors: &[Vec4]) -> Self {
        debug_assert_eq!(colors.len(), width as usize * height as usize);

        Self {
            width,
            height,
            format: BufferFormat::Rgba32Float,
            data: colors.iter().flat_map(|c| c.to_array()).collect(),
        }
    }

    pub fn from_depths(width: u32, height: u32, depths: &[f32]) -> Self {
        debug_assert_eq!(depths.len(), width as usize * height as usize);

        Self {
            width,
            height,
            format: BufferFormat::R32Float,
            data: depths.to_vec(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> UVec2 {
        UVec2::new(self.width, self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn format(&self) -> BufferFormat {
        self.format
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub(crate) fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn byte_len(&self) -> usize {
        self.data.len() * size_of::<f32>()
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * self.format.channels()
    }

    pub fn color(&self, x: u32, y: u32) -> Vec4 {
        let i = self.offset(x, y);
        match self.format {
            BufferFormat::Rgba32Float => Vec4::from_slice(&self.data[i..i + 4]),
            BufferFormat::R32Float => Vec4::splat(self.data[i]),
        }
    }

    pub fn set_color(&mut self, x: u32, y: u32, color: Vec4) {
        let i = self.offset(x, y);
        match self.format {
            BufferFormat::Rgba32Float => color.write_to_slice(&mut self.data[i..i + 4]),
            BufferFormat::R32Float => self.data[i] = color.x,
        }
    }

    pub fn depth(&self, x: u32, y: u32) -> f32 {
        self.data[self.offset(x, y)]
    }

    pub fn set_depth(&mut self, x: u32, y: u32, depth: f32) {
        let i = self.offset(x, y);
        self.data[i] = depth;
    }

    pub fn texel_at_uv(&self, uv: Vec2) -> (u32, u32) {
        let x = (uv.x * self.width as f32).floor() as i64;
        let y = (uv.y * self.height as f32).floor() as i64;
        (
            x.clamp(0, self.width as i64 - 1) as u32,
            y.clamp(0, self.height as i64 - 1) as u32,
        )
    }
}

pub struct BufferSet<'a> {
    pub low_res_color: &'a mut RenderBuffer,
    pub history: &'a mut RenderBuffer,
    pub combined_depth: &'a mut RenderBuffer,
    pub low_res_depth: &'a mut RenderBuffer,
    pub upscaled_color: &'a mut RenderBuffer,
}

// at most one live buffer per role, the old one is dropped before its replacement
#[derive(Default)]
pub struct ResourceLifecycleManager {
    low_res_color: Option<RenderBuffer>,
    history: Option<RenderBuffer>,
    combined_depth: Option<RenderBuffer>,
    low_res_depth: Option<RenderBuffer>,
    upscaled_color: Option<RenderBuffer>,
    budget_bytes: Option<usize>,
    allocations: usize,
}

impl ResourceLifecycleManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_budget(budget_bytes: usize) -> Self {
        Self {
            budget_bytes: Some(budget_bytes),
            ..Self::default()
        }
    }

    fn slot(&self, role: BufferRole) -> &Option<RenderBuffer> {
        match role {
            BufferRole::LowResColor => &self.low_res_color,
            BufferRole::History => &self.history,
            BufferRole::CombinedDepth => &self.combined_depth,
            BufferRole::LowResDepth => &self.low_res_depth,
            BufferRole::UpscaledColor => &self.upscaled_color,
        }
    }

    fn slot_mut(&mut self, role: BufferRole) -> &mut Option<RenderBuffer> {
        match role {
            BufferRole::LowResColor => &mut self.low_res_color,
            BufferRole::History => &mut self.history,
            BufferRole::CombinedDepth => &mut self.combined_depth,
            BufferRole::LowResDepth => &mut self.low_res_depth,
            BufferRole::UpscaledColor => &mut self.upscaled_color,
        }
    }

    pub fn ensure(
        &mut self,
        role: BufferRole,
        width: u32,
        height: u32,
        format: BufferFormat,
    ) -> Result<&mut RenderBuffer, CloudError> {
        let matches = self.slot(role).as_ref().is_some_and(|buffer| {
            buffer.width == width && buffer.height == height && buffer.format == format
        });

        if !matches {
            self.release(role);

            let bytes = width as usize * height as usize * format.channels() * size_of::<f32>();
            if let Some(budget) = self.budget_bytes {
                if self.live_bytes() + bytes > budget {
                    return Err(CloudError::ResourceExhausted {
                        role,
                        width,
                        height,
                        bytes,
                    });
                }
            }

            let buffer = RenderBuffer::new(role, width, height, format)?;
            debug!("allocated {:?} buffer {}x{} ({} bytes)", role, width, height, bytes);
            self.allocations += 1;
            *self.slot_mut(role) = Some(buffer);
        }

        self.slot_mut(role)
            .as_mut()
            .ok_or(CloudError::MissingBuffer(role))
    }

    pub fn get(&self, role: BufferRole) -> Option<&RenderBuffer> {
        self.slot(role).as_ref()
    }

    pub fn release(&mut self, role: BufferRole) {
        if self.slot_mut(role).take().is_some() {
            debug!("released {:?} buffer", role);
        }
    }

    pub fn release_all(&mut self) {
        for role in BufferRole::ALL {
            self.release(role);
        }
    }

    pub fn is_allocated(&self, role: BufferRole) -> bool {
        self.slot(role).is_some()
    }

    // over the manager's lifetime
    pub fn allocation_count(&self) -> usize {
        self.allocations
    }

    pub fn live_bytes(&self) -> usize {
        BufferRole::ALL
            .iter()
            .filter_map(|role| self.get(*role))
            .map(RenderBuffer::byte_len)
            .sum()
    }

    pub fn buffers(&mut self) -> Result<BufferSet<'_>, CloudError> {
        Ok(BufferSet {
            low_res_color: self
                .low_res_color
                .as_mut()
                .ok_or(CloudError::MissingBuffer(BufferRole::LowResColor))?,
            history: self
                .history
                .as_mut()
                .ok_or(CloudError::MissingBuffer(BufferRole::History))?,
            combined_depth: self
                .combined_depth
                .as_mut()
                .ok_or(CloudError::MissingBuffer(BufferRole::CombinedDepth))?,
            low_res_depth: self
                .low_res_depth
                .as_mut()
                .ok_or(CloudError::MissingBuffer(BufferRole::LowResDepth))?,
            upscaled_color: self
                .upscaled_color
                .as_mut()
                .ok_or(CloudError::MissingBuffer(BufferRole::UpscaledColor))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_is_idempotent() {
        let mut manager = ResourceLifecycleManager::new();

        manager
            .ensure(BufferRole::History, 8, 4, BufferFormat::Rgba32Float)
            .unwrap()
            .set_color(1, 1, Vec4::ONE);
        let again = manager
            .ensure(BufferRole::History, 8, 4, BufferFormat::Rgba32Float)
            .unwrap();

        assert_eq!(again.color(1, 1), Vec4::ONE);
        assert_eq!(manager.allocation_count(), 1);
    }

    #[test]
    fn resize_replaces_the_old_buffer() {
        let mut manager = ResourceLifecycleManager::new();

        manager
            .ensure(BufferRole::LowResDepth, 8, 4, BufferFormat::R32Float)
            .unwrap();
        let resized = manager
            .ensure(BufferRole::LowResDepth, 16, 8, BufferFormat::R32Float)
            .unwrap();

        assert_eq!(resized.size(), UVec2::new(16, 8));
        assert_eq!(manager.allocation_count(), 2);
        assert_eq!(manager.live_bytes(), 16 * 8 * 4);
    }

    #[test]
    fn budget_counts_only_live_buffers() {
        // room for exactly one 4x4 rgba buffer
        let mut manager = ResourceLifecycleManager::with_budget(4 * 4 * 4 * 4);

        manager
            .ensure(BufferRole::LowResColor, 4, 4, BufferFormat::Rgba32Float)
            .unwrap();
        // a replacement of the same size fits because the old one goes first
        manager
            .ensure(BufferRole::LowResColor, 2, 8, BufferFormat::Rgba32Float)
            .unwrap();

        let result = manager.ensure(BufferRole::History, 4, 4, BufferFormat::Rgba32Float);
        assert!(matches!(
            result,
            Err(CloudError::ResourceExhausted {
                role: BufferRole::History,
                ..
            })
        ));
        assert!(!manager.is_allocated(BufferRole::History));
    }

    #[test]
    fn release_all_drops_everything() {
        let mut manager = ResourceLifecycleManager::new();
        for role in BufferRole::ALL {
            manager.ensure(role, 2, 2, BufferFormat::R32Float).unwrap();
        }

        assert!(manager.buffers().is_ok());
        manager.release_all();

        assert_eq!(manager.live_bytes(), 0);
        assert!(matches!(manager.buffers(), Err(CloudError::MissingBuffer(_))));
    }

    #[test]
    fn depth_buffer_reads_back_as_splatted_color() {
        let mut buffer = RenderBuffer::from_depths(2, 1, &[3.0, 5.0]);

        assert_eq!(buffer.color(1, 0), Vec4::splat(5.0));
        buffer.set_depth(0, 0, 7.0);
        assert_eq!(buffer.depth(0, 0), 7.0);
        assert_eq!(buffer.texel_at_uv(Vec2::new(0.99, 0.5)), (1, 0));
        assert_eq!(buffer.texel_at_uv(Vec2::new(-1.0, 2.0)), (0, 0));
    }
}
