use std::f32::consts::FRAC_PI_2;

use bevy::math::{Quat, UVec2, Vec3, Vec4};
use bevy_volken::config::{CAMERA_FAR_CLIP, NEAR_CAMERA_FAR_CLIP, PLANET_RADIUS};
use bevy_volken::systems::clouds::{
    BufferRole, CameraState, FrameInputs, LightState, PlanetState, RenderBuffer,
};
use bevy_volken::{CloudConfig, FrameStatus, NoiseSettings, VolkenContext};

const WIDTH: u32 = 1920;
const HEIGHT: u32 = 1080;

struct Scene {
    source: RenderBuffer,
    near: RenderBuffer,
    far: RenderBuffer,
}

// sky overhead, a strip of nearby ground along the bottom edge
fn scene() -> Scene {
    let pixels = (WIDTH * HEIGHT) as usize;
    let ground_rows = HEIGHT - HEIGHT / 10;

    let mut colors = Vec::with_capacity(pixels);
    let mut near = Vec::with_capacity(pixels);
    for y in 0..HEIGHT {
        for _ in 0..WIDTH {
            if y >= ground_rows {
                colors.push(Vec4::new(0.2, 0.3, 0.1, 1.0));
                near.push(300.0);
            } else {
                colors.push(Vec4::new(0.4, 0.6, 0.9, 1.0));
                near.push(f32::MAX);
            }
        }
    }

    // the far camera renders at half size
    let far = vec![CAMERA_FAR_CLIP; (WIDTH / 2 * HEIGHT / 2) as usize];

    Scene {
        source: RenderBuffer::from_colors(WIDTH, HEIGHT, &colors),
        near: RenderBuffer::from_depths(WIDTH, HEIGHT, &near),
        far: RenderBuffer::from_depths(WIDTH / 2, HEIGHT / 2, &far),
    }
}

fn inputs(scene: &Scene) -> FrameInputs<'_> {
    FrameInputs {
        source: &scene.source,
        near_depth: &scene.near,
        far_depth: Some(&scene.far),
        camera: CameraState {
            position: Vec3::new(0.0, 500.0, 0.0),
            // looking straight up
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
            direction: Vec3::new(0.2, -1.0, 0.3).normalize(),
            color: Vec3::ONE,
        },
        delta_time: 1.0 / 60.0,
    }
}

#[test]
fn full_hd_frame_at_half_resolution() {
    let config = CloudConfig {
        density: 0.025,
        coverage: 0.25,
        resolution_scale: 0.5,
        num_light_sample_points: 10,
        step_size: 2_000.0,
        history_blend: 0.5,
        ..Default::default()
    };
    let scene = scene();
    let mut context = VolkenContext::init(&NoiseSettings::low_resolution(0));
    let mut last = None;

    // second frame blends against history
    for _ in 0..2 {
        let frame = context.on_frame(&config, inputs(&scene)).unwrap();

        assert_eq!(frame.status, FrameStatus::Composited);
        assert_eq!(frame.color.size(), UVec2::new(WIDTH, HEIGHT));

        for (out, source) in frame.color.data().chunks_exact(4).zip(scene.source.data().chunks_exact(4)) {
            assert!(out[..3].iter().all(|c| *c >= 0.0 && c.is_finite()));
            assert!((0.0..=1.0).contains(&out[3]));
            assert_eq!(out[3], source[3]);
        }
        last = Some(frame);
    }
    let frame = last.unwrap();

    let pipeline = context.pipeline();
    assert_eq!(pipeline.working_size(), Some(UVec2::new(960, 540)));

    let resources = pipeline.resources();
    for role in [BufferRole::LowResColor, BufferRole::History, BufferRole::LowResDepth] {
        assert_eq!(resources.get(role).unwrap().size(), UVec2::new(960, 540));
    }
    for role in [BufferRole::CombinedDepth, BufferRole::UpscaledColor] {
        assert_eq!(resources.get(role).unwrap().size(), UVec2::new(WIDTH, HEIGHT));
    }
    // five buffers, allocated once
    assert_eq!(resources.allocation_count(), 5);

    let history = resources.get(BufferRole::History).unwrap();
    for texel in history.data().chunks_exact(4) {
        assert!((0.0..=1.0).contains(&texel[3]));
        assert!(texel[..3].iter().all(|c| *c >= 0.0));
    }

    // ground below the cloud base keeps the sky fully transmitted there
    let combined = resources.get(BufferRole::CombinedDepth).unwrap();
    assert_eq!(combined.depth(0, HEIGHT - 1), 300.0);
    assert_eq!(combined.depth(0, 0), CAMERA_FAR_CLIP);
    assert_eq!(history.color(0, 539).w, 1.0);

    // some of the sky is actually covered
    let covered = history.data().chunks_exact(4).filter(|t| t[3] < 0.99).count();
    assert!(covered > 0, "no cloud texel in the working buffer");

    let ground_rows = HEIGHT - HEIGHT / 10;
    let mut changed_sky = 0;
    for y in 0..HEIGHT {
        for x in 0..WIDTH {
            let out = frame.color.color(x, y);
            let source = scene.source.color(x, y);

            if y < ground_rows {
                if (out - source).abs().max_element() > 1e-3 {
                    changed_sky += 1;
                }
            } else if y >= ground_rows + 8 {
                // ground in front of the cloud base, clear of the blur footprint
                assert!((out - source).abs().max_element() < 1e-5, "ground changed at {x},{y}");
            }
        }
    }
    assert!(changed_sky > 0, "clouds never reached the composited frame");
}
