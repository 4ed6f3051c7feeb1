use bevy::prelude::*;
use bevy::render::render_asset::RenderAssetUsages;
use bevy::render::render_resource::{Extent3d, TextureDimension, TextureFormat};

use crate::config::{
    CAMERA_FAR_CLIP, NEAR_CAMERA_FAR_CLIP, PLANET_RADIUS, PREVIEW_HEIGHT, PREVIEW_WIDTH,
};
use crate::systems::camera::PlanetCamera;
use crate::systems::clouds::passes::ray_sphere;
use crate::systems::clouds::{
    CameraState, CloudFrameOutput, CloudFrameSource, LightState, PlanetState, RenderBuffer,
};

// direction the sunlight travels
const SUN_DIRECTION: Vec3 = Vec3::new(-0.35, -0.8, -0.5);
const VERTICAL_FOV: f32 = 1.0;

pub struct PreviewPlugin;

impl Plugin for PreviewPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<StaleFarDepth>()
            .add_systems(Startup, start)
            .add_systems(PostUpdate, (show_frame, publish_frame).chain());
    }
}

#[derive(Resource)]
struct PreviewImage(Handle<Image>);

// the far camera renders a frame behind the near one
#[derive(Resource, Default)]
struct StaleFarDepth(Option<RenderBuffer>);

fn start(mut commands: Commands, mut images: ResMut<Assets<Image>>) {
    let image = Image::new_fill(
        Extent3d {
            width: PREVIEW_WIDTH,
            height: PREVIEW_HEIGHT,
            depth_or_array_layers: 1,
        },
        TextureDimension::D2,
        &[0, 0, 0, 255],
        TextureFormat::Rgba8UnormSrgb,
        RenderAssetUsages::RENDER_WORLD | RenderAssetUsages::MAIN_WORLD,
    );
    let handle = images.add(image);

    commands.spawn(Camera2d);
    commands.spawn((
        ImageNode::new(handle.clone()),
        Node {
            width: Val::Percent(100.0),
            height: Val::Percent(100.0),
            ..default()
        },
    ));
    commands.spawn((
        Transform::default(),
        PlanetCamera::new(500.0, 0.2).with_location(20.0, 0.0),
    ));

    commands.insert_resource(PreviewImage(handle));
}

/// Sky, ground and depth as the near and far cameras would see them.
pub fn software_scene(
    camera: &CameraState,
    planet: &PlanetState,
    light: &LightState,
    width: u32,
    height: u32,
) -> (RenderBuffer, RenderBuffer, RenderBuffer) {
    let aspect = width as f32 / height as f32;
    let pixels = (width * height) as usize;
    let to_sun = -light.direction.normalize_or_zero();

    let mut colors = Vec::with_capacity(pixels);
    let mut near = Vec::with_capacity(pixels);
    let mut far = Vec::with_capacity(pixels);

    for y in 0..height {
        for x in 0..width {
            let uv = Vec2::new(
                (x as f32 + 0.5) / width as f32,
                (y as f32 + 0.5) / height as f32,
            );
            let dir = camera.ray_direction(uv, aspect);

            let hit = ray_sphere(camera.position, dir, planet.center, planet.radius)
                .map(|(t, _)| t)
                .filter(|t| *t > 0.0);

            match hit {
                Some(t) => {
                    let normal = (camera.position + dir * t - planet.center).normalize();
                    let lit = normal.dot(to_sun).max(0.0) * 0.8 + 0.1;
                    colors.push((Vec3::new(0.25, 0.35, 0.18) * lit).extend(1.0));
                    near.push(if t < camera.near_far_clip { t } else { f32::MAX });
                    far.push(t.min(camera.far_clip));
                }
                None => {
                    let up = (camera.position - planet.center).normalize();
                    let elevation = dir.dot(up).max(0.0);
                    let sky = Vec3::new(0.55, 0.7, 0.9).lerp(Vec3::new(0.15, 0.3, 0.7), elevation);
                    colors.push(sky.extend(1.0));
                    near.push(f32::MAX);
                    far.push(camera.far_clip);
                }
            }
        }
    }

    (
        RenderBuffer::from_colors(width, height, &colors),
        RenderBuffer::from_depths(width, height, &near),
        RenderBuffer::from_depths(width, height, &far),
    )
}

fn publish_frame(
    mut commands: Commands,
    camera_query: Query<(&Transform, &PlanetCamera)>,
    mut stale_far: ResMut<StaleFarDepth>,
) {
    let Ok((transform, planet_camera)) = camera_query.single() else {
        return;
    };

    let (_, north, east) = planet_camera.local_basis();
    let camera = CameraState {
        position: transform.translation,
        rotation: transform.rotation,
        vertical_fov: VERTICAL_FOV,
        near_far_clip: NEAR_CAMERA_FAR_CLIP,
        far_clip: CAMERA_FAR_CLIP,
    };
    let planet = PlanetState {
        center: Vec3::ZERO,
        radius: PLANET_RADIUS,
        north,
        east,
    };
    let light = LightState {
        direction: SUN_DIRECTION.normalize(),
        color: Vec3::ONE,
    };

    let (source, near_depth, far_depth) =
        software_scene(&camera, &planet, &light, PREVIEW_WIDTH, PREVIEW_HEIGHT);

    commands.insert_resource(CloudFrameSource {
        source,
        near_depth,
        far_depth: stale_far.0.replace(far_depth),
        camera,
        planet,
        light,
    });
}

fn show_frame(
    output: Res<CloudFrameOutput>,
    preview: Res<PreviewImage>,
    mut images: ResMut<Assets<Image>>,
) {
    if !output.is_changed() {
        return;
    }
    let Some(frame) = output.frame.as_ref() else {
        return;
    };
    let Some(image) = images.get_mut(&preview.0) else {
        return;
    };

    let bytes = frame
        .color
        .data()
        .chunks_exact(4)
        .flat_map(|texel| {
            // simple reinhard on color, alpha as is
            let rgb = Vec3::from_slice(texel);
            let mapped = rgb / (Vec3::ONE + rgb);
            [mapped.x, mapped.y, mapped.z, texel[3]].map(|v| (v.clamp(0.0, 1.0) * 255.0) as u8)
        })
        .collect();

    image.data = Some(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn software_scene_splits_near_geometry_from_sky() {
        let position = Vec3::new(0.0, PLANET_RADIUS + 100.0, 0.0);
        let camera = CameraState {
            position,
            // level with the horizon, so the bottom half sees ground
            rotation: Quat::IDENTITY,
            vertical_fov: VERTICAL_FOV,
            near_far_clip: NEAR_CAMERA_FAR_CLIP,
            far_clip: CAMERA_FAR_CLIP,
        };
        let planet = PlanetState {
            center: Vec3::ZERO,
            radius: PLANET_RADIUS,
            north: Vec3::NEG_Z,
            east: Vec3::X,
        };
        let light = LightState {
            direction: Vec3::NEG_Y,
            color: Vec3::ONE,
        };

        let (source, near, far) = software_scene(&camera, &planet, &light, 8, 8);

        assert_eq!(source.size(), UVec2::new(8, 8));
        // top row is sky, bottom row is ground close below the camera
        assert_eq!(near.depth(4, 0), f32::MAX);
        assert_eq!(far.depth(4, 0), CAMERA_FAR_CLIP);
        assert!(near.depth(4, 7) < NEAR_CAMERA_FAR_CLIP);
        assert_eq!(far.depth(4, 7), near.depth(4, 7));
    }
}
