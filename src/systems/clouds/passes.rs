use std::f32::consts::PI;

use bevy::math::{Vec2, Vec3, Vec4, Vec4Swizzles};
use bevy::tasks::{ComputeTaskPool, ParallelSliceMut, TaskPool};

use super::buffers::{BufferRole, RenderBuffer};
use super::config::CloudConfig;
use super::pipeline::{CameraState, LightState, PlanetState};
use crate::config::{
    DEPTH_THRESHOLD_SCALE, MAX_RAYMARCH_STEPS, MIN_TRANSMITTANCE, STEP_REFERENCE_DISTANCE,
};
use crate::systems::noise::NoiseFields;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CloudPass {
    DepthFusion,
    Downsample,
    Raymarch,
    TemporalBlend,
    Upscale,
    Composite,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Binding {
    Source,
    NearDepth,
    FarDepth,
    NoiseFields,
    Buffer(BufferRole),
    Destination,
}

#[derive(Clone, Copy, Debug)]
pub struct PassBindings {
    pub inputs: &'static [Binding],
    pub output: Binding,
}

impl CloudPass {
    pub const ORDER: [CloudPass; 6] = [
        CloudPass::DepthFusion,
        CloudPass::Downsample,
        CloudPass::Raymarch,
        CloudPass::TemporalBlend,
        CloudPass::Upscale,
        CloudPass::Composite,
    ];

    pub fn bindings(self) -> PassBindings {
        use Binding::{Buffer, Destination, FarDepth, NearDepth, Source};
        use BufferRole::{CombinedDepth, History, LowResColor, LowResDepth, UpscaledColor};

        match self {
            CloudPass::DepthFusion => PassBindings {
                inputs: &[NearDepth, FarDepth],
                output: Buffer(CombinedDepth),
            },
            CloudPass::Downsample => PassBindings {
                inputs: &[Buffer(CombinedDepth)],
                output: Buffer(LowResDepth),
            },
            CloudPass::Raymarch => PassBindings {
                inputs: &[Buffer(LowResDepth), Binding::NoiseFields],
                output: Buffer(LowResColor),
            },
            // history is read and written, it carries the previous frame
            CloudPass::TemporalBlend => PassBindings {
                inputs: &[Buffer(LowResColor), Buffer(History)],
                output: Buffer(History),
            },
            CloudPass::Upscale => PassBindings {
                inputs: &[Buffer(History), Buffer(LowResDepth), Buffer(CombinedDepth)],
                output: Buffer(UpscaledColor),
            },
            CloudPass::Composite => PassBindings {
                inputs: &[Source, Buffer(UpscaledColor)],
                output: Destination,
            },
        }
    }
}

fn par_rows<F>(buffer: &mut RenderBuffer, f: F)
where
    F: Fn(u32, &mut [f32]) + Send + Sync,
{
    let stride = buffer.width() as usize * buffer.format().channels();
    if stride == 0 {
        return;
    }

    let pool = ComputeTaskPool::get_or_init(TaskPool::default);
    buffer
        .data_mut()
        .par_chunk_map_mut(pool, stride, |y, row| f(y as u32, row));
}

fn texel_uv(x: u32, y: u32, width: u32, height: u32) -> Vec2 {
    Vec2::new(
        (x as f32 + 0.5) / width as f32,
        (y as f32 + 0.5) / height as f32,
    )
}

// far depth may be a different size, read it at normalized coordinates
pub fn fuse_depth(
    near: &RenderBuffer,
    far: &RenderBuffer,
    near_far_clip: f32,
    combined: &mut RenderBuffer,
) {
    let (width, height) = (combined.width(), combined.height());

    par_rows(combined, |y, row| {
        for (x, out) in row.iter_mut().enumerate() {
            let x = x as u32;
            let near_depth = near.depth(x, y);

            *out = if near_depth < near_far_clip {
                near_depth
            } else {
                let (fx, fy) = far.texel_at_uv(texel_uv(x, y, width, height));
                far.depth(fx, fy)
            };
        }
    });
}

pub fn downsample_depth(combined: &RenderBuffer, low: &mut RenderBuffer) {
    let (width, height) = (low.width(), low.height());

    par_rows(low, |y, row| {
        for (x, out) in row.iter_mut().enumerate() {
            let (sx, sy) = combined.texel_at_uv(texel_uv(x as u32, y, width, height));
            *out = combined.depth(sx, sy);
        }
    });
}

// entry and exit distance, dir must be normalized
pub fn ray_sphere(origin: Vec3, dir: Vec3, center: Vec3, radius: f32) -> Option<(f32, f32)> {
    let oc = origin - center;
    let b = oc.dot(dir);
    let c = oc.length_squared() - radius * radius;
    let disc = b * b - c;

    if disc < 0.0 {
        return None;
    }

    let root = disc.sqrt();
    Some((-b - root, -b + root))
}

pub fn shell_segment(
    origin: Vec3,
    dir: Vec3,
    center: Vec3,
    inner: f32,
    outer: f32,
) -> Option<(f32, f32)> {
    let (outer_near, outer_far) = ray_sphere(origin, dir, center, outer)?;
    if outer_far <= 0.0 {
        return None;
    }

    let mut start = outer_near.max(0.0);
    let mut end = outer_far;

    if let Some((inner_near, inner_far)) = ray_sphere(origin, dir, center, inner) {
        if inner_near > 0.0 {
            // looking down into the core, stop at the cloud base
            end = end.min(inner_near);
        } else if inner_far > 0.0 {
            // starting below the cloud base
            start = start.max(inner_far);
        }
    }

    (end > start).then_some((start, end))
}

fn henyey_greenstein(cos_theta: f32, g: f32) -> f32 {
    let g2 = g * g;
    (1.0 - g2) / (4.0 * PI * (1.0 + g2 - 2.0 * g * cos_theta).powf(1.5))
}

// z blends the two lobes, w is an isotropic floor
pub fn dual_lobe_phase(cos_theta: f32, params: Vec4) -> f32 {
    let forward = henyey_greenstein(cos_theta, params.x);
    let backward = henyey_greenstein(cos_theta, -params.y);
    params.w + (1.0 - params.w) * ((1.0 - params.z) * forward + params.z * backward)
}

pub struct RaymarchParams<'a> {
    pub config: &'a CloudConfig,
    pub fields: &'a NoiseFields,
    pub camera: &'a CameraState,
    pub planet: &'a PlanetState,
    pub light: &'a LightState,
    pub wind_offset: Vec3,
    pub weather_offset: Vec2,
    pub blue_noise_offset: Vec2,
    pub max_depth: f32,
}

impl RaymarchParams<'_> {
    fn layer_profile(&self, altitude: f32) -> f32 {
        let c = self.config;
        let layer = |i: usize| {
            let d = (altitude - c.layer_heights[i]) / c.layer_spreads[i];
            c.layer_strengths[i] * (-d * d).exp()
        };
        layer(0) + layer(1)
    }

    // extinction per meter
    fn density(&self, p: Vec3) -> f32 {
        let c = self.config;
        let local = p - self.planet.center;
        let altitude = local.length() - self.planet.radius;

        let profile = self.layer_profile(altitude) * c.density;
        if profile <= 0.0 {
            return 0.0;
        }

        let fields = self.fields;
        let (east, north) = (self.planet.east, self.planet.north);

        let weather_uv = Vec2::new(local.dot(east), local.dot(north)) / c.weather_map_scale
            + self.weather_offset;
        let weather = fields.weather.sample_bilinear(weather_uv, 0);
        let warp = Vec2::new(
            fields.weather.sample_bilinear(weather_uv, 1),
            fields.weather.sample_bilinear(weather_uv, 2),
        ) * c.domain_warp_strength;

        let coverage = (c.coverage + c.weather_map_strength * weather).clamp(0.0, 1.0);

        let shape_pos =
            local / c.shape_scale + self.wind_offset + warp.x * east + warp.y * north;
        let shape = fields.shape.sample_trilinear(shape_pos, 0);
        let base = (shape + coverage - 1.0).max(0.0);
        if base <= 0.0 {
            return 0.0;
        }

        let detail_pos = local / c.detail_scale + self.wind_offset;
        let detail = fields.detail.sample_trilinear(detail_pos, 0);
        let eroded = base * (1.0 - c.detail_strength * (1.0 - detail));

        eroded.max(0.0) * profile
    }

    fn light_transmittance(&self, p: Vec3, to_light: Vec3, outer: f32) -> f32 {
        let Some((_, exit)) = ray_sphere(p, to_light, self.planet.center, outer) else {
            return 1.0;
        };

        let samples = self.config.num_light_sample_points;
        let step = exit.max(0.0) / samples as f32;
        let optical_depth: f32 = (0..samples)
            .map(|i| self.density(p + to_light * (i as f32 + 0.5) * step))
            .sum::<f32>()
            * step;

        (-optical_depth * self.config.absorption).exp()
    }

    fn step_at(&self, t: f32) -> f32 {
        let c = self.config;
        let distance = t.max(STEP_REFERENCE_DISTANCE) / STEP_REFERENCE_DISTANCE;
        c.step_size * distance.powf(c.step_size_falloff)
    }

    pub fn march(&self, origin: Vec3, dir: Vec3, depth: f32, dither: f32) -> Vec4 {
        let c = self.config;
        let (inner, outer) = c.shell_radii(self.planet.radius);

        let Some((start, end)) = shell_segment(origin, dir, self.planet.center, inner, outer)
        else {
            return Vec4::new(0.0, 0.0, 0.0, 1.0);
        };
        let end = end.min(depth).min(self.max_depth);
        if end <= start {
            return Vec4::new(0.0, 0.0, 0.0, 1.0);
        }

        let to_light = -self.light.direction.normalize_or_zero();
        let phase = dual_lobe_phase(dir.dot(to_light), c.phase_parameters);
        let tint = c.cloud_color * self.light.color;

        let mut transmittance = 1.0;
        let mut scattered = Vec3::ZERO;
        let mut t = start + self.step_at(start) * c.blue_noise_strength * dither;

        for _ in 0..MAX_RAYMARCH_STEPS {
            if t >= end || transmittance < MIN_TRANSMITTANCE {
                break;
            }

            let step = self.step_at(t).min(end - t);
            let p = origin + dir * (t + 0.5 * step);
            let sigma = self.density(p);

            if sigma > 0.0 {
                let light = self.light_transmittance(p, to_light, outer);
                let radiance = (light * phase * c.scatter_strength + c.ambient_light) * tint;

                // integrate in-scattering analytically over the step
                let step_transmittance = (-sigma * step).exp();
                scattered += transmittance * radiance * (1.0 - step_transmittance);
                transmittance *= step_transmittance;
            }

            t += step;
        }

        scattered.extend(transmittance)
    }
}

pub fn raymarch(params: &RaymarchParams, low_depth: &RenderBuffer, out: &mut RenderBuffer) {
    let (width, height) = (out.width(), out.height());
    let aspect = width as f32 / height as f32;
    let blue = &params.fields.blue_noise;
    let blue_res = blue.resolution() as f32;
    let blue_scale = params.config.blue_noise_scale;

    par_rows(out, |y, row| {
        for (x, texel) in row.chunks_exact_mut(4).enumerate() {
            let x = x as u32;
            let uv = texel_uv(x, y, width, height);
            let dir = params.camera.ray_direction(uv, aspect);

            let dither_uv =
                Vec2::new(x as f32, y as f32) * blue_scale / blue_res + params.blue_noise_offset;
            let dither = blue.sample_bilinear(dither_uv, 0);

            let color = params.march(params.camera.position, dir, low_depth.depth(x, y), dither);
            color.write_to_slice(texel);
        }
    });
}

pub fn temporal_blend(current: &RenderBuffer, history: &mut RenderBuffer, alpha: f32) {
    let current = current.data();
    for (h, c) in history.data_mut().iter_mut().zip(current) {
        *h = alpha * c + (1.0 - alpha) * *h;
    }
}

// bilinear taps too far off in depth are dropped, if all four go the best
// match of the 3x3 block is used
pub fn upscale(
    clouds: &RenderBuffer,
    low_depth: &RenderBuffer,
    combined: &RenderBuffer,
    max_depth: f32,
    depth_threshold: f32,
    out: &mut RenderBuffer,
) {
    if clouds.size() == out.size() {
        out.data_mut().copy_from_slice(clouds.data());
        return;
    }

    let (width, height) = (out.width(), out.height());
    let (low_w, low_h) = (clouds.width() as i64, clouds.height() as i64);
    let threshold = DEPTH_THRESHOLD_SCALE * depth_threshold;
    let max_depth = max_depth.max(f32::EPSILON);
    let normalize = |d: f32| (d / max_depth).min(1.0);

    let low_texel = |x: i64, y: i64| (x.clamp(0, low_w - 1) as u32, y.clamp(0, low_h - 1) as u32);

    par_rows(out, |y, row| {
        for (x, texel) in row.chunks_exact_mut(4).enumerate() {
            let x = x as u32;
            let full_depth = normalize(combined.depth(x, y));
            let p = texel_uv(x, y, width, height) * Vec2::new(low_w as f32, low_h as f32) - 0.5;
            let base = p.floor();
            let f = p - base;
            let (bx, by) = (base.x as i64, base.y as i64);

            let mut color = Vec4::ZERO;
            let mut weight = 0.0;
            for (dx, dy, w) in [
                (0, 0, (1.0 - f.x) * (1.0 - f.y)),
                (1, 0, f.x * (1.0 - f.y)),
                (0, 1, (1.0 - f.x) * f.y),
                (1, 1, f.x * f.y),
            ] {
                let (lx, ly) = low_texel(bx + dx, by + dy);
                if (normalize(low_depth.depth(lx, ly)) - full_depth).abs() <= threshold {
                    color += w * clouds.color(lx, ly);
                    weight += w;
                }
            }

            let result = if weight > 1e-4 {
                color / weight
            } else {
                let (cx, cy) = (p.x.round() as i64, p.y.round() as i64);
                let mut best = (f32::MAX, low_texel(cx, cy));
                for dy in -1..=1 {
                    for dx in -1..=1 {
                        let (lx, ly) = low_texel(cx + dx, cy + dy);
                        let diff = (normalize(low_depth.depth(lx, ly)) - full_depth).abs();
                        if diff < best.0 {
                            best = (diff, (lx, ly));
                        }
                    }
                }
                clouds.color(best.1.0, best.1.1)
            };

            result.write_to_slice(texel);
        }
    });
}

// binomial 7 tap, sigma 1.5
#[derive(Clone, Copy, Debug)]
pub struct GaussianKernel {
    weights: [f32; 7],
}

impl Default for GaussianKernel {
    fn default() -> Self {
        let taps: [f32; 7] = [1.0, 6.0, 15.0, 20.0, 15.0, 6.0, 1.0];
        let sum: f32 = taps.iter().sum();
        Self {
            weights: taps.map(|w| w / sum),
        }
    }
}

impl GaussianKernel {
    pub fn weights(&self) -> &[f32; 7] {
        &self.weights
    }

    pub fn blur(&self, buffer: &RenderBuffer, spacing: f32) -> Vec<Vec4> {
        let (width, height) = (buffer.width() as usize, buffer.height() as usize);
        let pixels: Vec<Vec4> = buffer.data().chunks_exact(4).map(Vec4::from_slice).collect();

        if spacing <= 0.0 {
            return pixels;
        }

        let pass = |src: &[Vec4], horizontal: bool| -> Vec<Vec4> {
            let mut dst = vec![Vec4::ZERO; src.len()];
            let pool = ComputeTaskPool::get_or_init(TaskPool::default);
            let (len, limit) = if horizontal { (width, width) } else { (width, height) };

            dst.par_chunk_map_mut(pool, len, |y, row| {
                for (x, out) in row.iter_mut().enumerate() {
                    let fetch = |offset: f32| {
                        let along = (if horizontal { x } else { y }) as f32 + offset;
                        let lo = along.floor();
                        let t = along - lo;
                        let at = |i: f32| {
                            let i = (i as i64).clamp(0, limit as i64 - 1) as usize;
                            if horizontal { src[y * width + i] } else { src[i * width + x] }
                        };
                        at(lo).lerp(at(lo + 1.0), t)
                    };

                    *out = self
                        .weights
                        .iter()
                        .enumerate()
                        .map(|(i, w)| *w * fetch((i as f32 - 3.0) * spacing))
                        .sum();
                }
            });

            dst
        };

        let horizontal = pass(&pixels, true);
        pass(&horizontal, false)
    }
}

pub fn composite(
    destination: &mut RenderBuffer,
    clouds: &RenderBuffer,
    kernel: &GaussianKernel,
    blur_radius: f32,
) {
    let blurred = kernel.blur(clouds, blur_radius);

    for (texel, cloud) in destination.data_mut().chunks_exact_mut(4).zip(blurred) {
        let scene = Vec4::from_slice(texel);
        let rgb = cloud.xyz() + scene.xyz() * cloud.w;
        rgb.extend(scene.w).write_to_slice(texel);
    }
}
