use bevy::image::{Image, ImageAddressMode, ImageFilterMode, ImageSampler, ImageSamplerDescriptor};
use bevy::math::{Vec2, Vec3};
use bevy::render::render_asset::RenderAssetUsages;
use bevy::render::render_resource::{Extent3d, TextureDimension, TextureFormat};
use bevy::tasks::{ComputeTaskPool, ParallelSliceMut, TaskPool};
use image::{GrayImage, Luma};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldDimension {
    D2,
    D3,
}

impl FieldDimension {
    pub fn depth(self, resolution: usize) -> usize {
        match self {
            FieldDimension::D2 => 1,
            FieldDimension::D3 => resolution,
        }
    }
}

// channels interleaved per texel, every axis wraps
#[derive(Clone, Debug, PartialEq)]
pub struct ScalarField {
    resolution: usize,
    dimension: FieldDimension,
    channels: usize,
    data: Vec<f32>,
}

impl ScalarField {
    pub fn zeroed(resolution: usize, dimension: FieldDimension, channels: usize) -> Self {
        let resolution = resolution.max(1);
        let channels = channels.clamp(1, 4);
        let texels = resolution * resolution * dimension.depth(resolution);

        Self {
            resolution,
            dimension,
            channels,
            data: vec![0.0; texels * channels],
        }
    }

    pub fn merge_channels(fields: &[ScalarField]) -> Self {
        let first = &fields[0];
        let mut merged = Self::zeroed(first.resolution, first.dimension, fields.len());
        let channels = merged.channels;

        for (channel, field) in fields.iter().take(channels).enumerate() {
            debug_assert_eq!(field.resolution, first.resolution);
            debug_assert_eq!(field.dimension, first.dimension);

            for (texel, value) in field.data.iter().step_by(field.channels).enumerate() {
                merged.data[texel * channels + channel] = *value;
            }
        }

        merged
    }

    pub fn resolution(&self) -> usize {
        self.resolution
    }

    pub fn dimension(&self) -> FieldDimension {
        self.dimension
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn depth(&self) -> usize {
        self.dimension.depth(self.resolution)
    }

    // adds f(texel position) to every sample, rows in parallel
    pub(crate) fn accumulate<F>(&mut self, f: F)
    where
        F: Fn(Vec3) -> f32 + Send + Sync,
    {
        debug_assert_eq!(self.channels, 1);

        let res = self.resolution;
        let pool = ComputeTaskPool::get_or_init(TaskPool::default);

        self.data.par_chunk_map_mut(pool, res, |row, samples| {
            let y = (row % res) as f32;
            let z = (row / res) as f32;

            for (x, sample) in samples.iter_mut().enumerate() {
                *sample += f(Vec3::new(x as f32, y, z));
            }
        });
    }

    fn index(&self, x: i64, y: i64, z: i64) -> usize {
        let res = self.resolution as i64;
        let x = x.rem_euclid(res) as usize;
        let y = y.rem_euclid(res) as usize;
        let z = match self.dimension {
            FieldDimension::D2 => 0,
            FieldDimension::D3 => z.rem_euclid(res) as usize,
        };

        ((z * self.resolution + y) * self.resolution + x) * self.channels
    }

    pub fn texel(&self, x: i64, y: i64, z: i64, channel: usize) -> f32 {
        self.data[self.index(x, y, z) + channel.min(self.channels - 1)]
    }

    // one period per unit
    pub fn sample_bilinear(&self, uv: Vec2, channel: usize) -> f32 {
        let p = uv * self.resolution as f32 - 0.5;
        let base = p.floor();
        let t = p - base;
        let (x, y) = (base.x as i64, base.y as i64);

        let a = lerp(self.texel(x, y, 0, channel), self.texel(x + 1, y, 0, channel), t.x);
        let b = lerp(self.texel(x, y + 1, 0, channel), self.texel(x + 1, y + 1, 0, channel), t.x);
        lerp(a, b, t.y)
    }

    pub fn sample_trilinear(&self, uvw: Vec3, channel: usize) -> f32 {
        if self.dimension == FieldDimension::D2 {
            return self.sample_bilinear(uvw.truncate(), channel);
        }

        let p = uvw * self.resolution as f32 - 0.5;
        let base = p.floor();
        let t = p - base;
        let (x, y, z) = (base.x as i64, base.y as i64, base.z as i64);

        let plane = |z: i64| {
            let a = lerp(self.texel(x, y, z, channel), self.texel(x + 1, y, z, channel), t.x);
            let b = lerp(self.texel(x, y + 1, z, channel), self.texel(x + 1, y + 1, z, channel), t.x);
            lerp(a, b, t.y)
        };

        lerp(plane(z), plane(z + 1), t.z)
    }

    // stretched to the slice's own range
    pub fn slice_image(&self, z: usize, channel: usize) -> GrayImage {
        let res = self.resolution;
        let values: Vec<f32> = (0..res * res)
            .map(|i| self.texel((i % res) as i64, (i / res) as i64, z as i64, channel))
            .collect();

        let min = values.iter().copied().fold(f32::MAX, f32::min);
        let max = values.iter().copied().fold(f32::MIN, f32::max);
        let range = (max - min).max(f32::EPSILON);

        GrayImage::from_fn(res as u32, res as u32, |x, y| {
            let value = (values[x as usize + y as usize * res] - min) / range;
            Luma([(value * 255.0).round() as u8])
        })
    }

    pub fn to_image(&self) -> Image {
        let (format, stride) = match self.channels {
            1 => (TextureFormat::R32Float, 1),
            2 => (TextureFormat::Rg32Float, 2),
            _ => (TextureFormat::Rgba32Float, 4),
        };

        let mut bytes = Vec::with_capacity(self.data.len() / self.channels * stride * 4);
        for texel in self.data.chunks(self.channels) {
            for channel in 0..stride {
                let value = texel.get(channel).copied().unwrap_or(0.0);
                bytes.extend_from_slice(&value.to_le_bytes());
            }
        }

        let dimension = match self.dimension {
            FieldDimension::D2 => TextureDimension::D2,
            FieldDimension::D3 => TextureDimension::D3,
        };

        let mut image = Image::new(
            Extent3d {
                width: self.resolution as u32,
                height: self.resolution as u32,
                depth_or_array_layers: self.depth() as u32,
            },
            dimension,
            bytes,
            format,
            RenderAssetUsages::RENDER_WORLD | RenderAssetUsages::MAIN_WORLD,
        );

        image.sampler = ImageSampler::Descriptor(ImageSamplerDescriptor {
            address_mode_u: ImageAddressMode::Repeat,
            address_mode_v: ImageAddressMode::Repeat,
            address_mode_w: ImageAddressMode::Repeat,
            mag_filter: ImageFilterMode::Linear,
            min_filter: ImageFilterMode::Linear,
            ..Default::default()
        });

        image
    }
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(resolution: usize, dimension: FieldDimension) -> ScalarField {
        let mut field = ScalarField::zeroed(resolution, dimension, 1);
        for (i, value) in field.data.iter_mut().enumerate() {
            *value = i as f32;
        }
        field
    }

    #[test]
    fn texel_fetch_wraps_every_axis() {
        let field = ramp(4, FieldDimension::D3);

        for &(x, y, z) in &[(0, 0, 0), (1, 2, 3), (3, 3, 3)] {
            let value = field.texel(x, y, z, 0);
            assert_eq!(value, field.texel(x + 4, y, z, 0));
            assert_eq!(value, field.texel(x, y + 4, z, 0));
            assert_eq!(value, field.texel(x, y, z + 4, 0));
            assert_eq!(value, field.texel(x - 4, y - 4, z - 4, 0));
        }
    }

    #[test]
    fn filtered_fetch_hits_texel_centres() {
        let field = ramp(8, FieldDimension::D2);
        let uv = Vec2::new(2.5, 5.5) / 8.0;

        assert!((field.sample_bilinear(uv, 0) - field.texel(2, 5, 0, 0)).abs() < 1e-4);
        assert!((field.sample_bilinear(uv + Vec2::ONE, 0) - field.texel(2, 5, 0, 0)).abs() < 1e-3);
    }

    #[test]
    fn merged_channels_interleave() {
        let a = ramp(4, FieldDimension::D2);
        let mut b = ScalarField::zeroed(4, FieldDimension::D2, 1);
        b.data.iter_mut().for_each(|v| *v = -1.0);

        let merged = ScalarField::merge_channels(&[a.clone(), b]);

        assert_eq!(merged.channels(), 2);
        assert_eq!(merged.texel(3, 1, 0, 0), a.texel(3, 1, 0, 0));
        assert_eq!(merged.texel(3, 1, 0, 1), -1.0);
    }

    #[test]
    fn image_export_pads_three_channels() {
        let fields = vec![ramp(4, FieldDimension::D2); 3];
        let image = ScalarField::merge_channels(&fields).to_image();

        assert_eq!(image.texture_descriptor.format, TextureFormat::Rgba32Float);
        assert_eq!(image.data.as_ref().map(Vec::len), Some(4 * 4 * 4 * 4));
    }

    #[test]
    fn volume_export_keeps_depth() {
        let image = ramp(4, FieldDimension::D3).to_image();

        assert_eq!(image.texture_descriptor.dimension, TextureDimension::D3);
        assert_eq!(image.texture_descriptor.size.depth_or_array_layers, 4);
    }
}
