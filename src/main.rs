use bevy::prelude::*;

use bevy_volken::config::CONFIG_PATH;
use bevy_volken::systems::camera::SurfaceCamPlugin;
use bevy_volken::systems::clouds::ReseedClouds;
use bevy_volken::systems::preview::PreviewPlugin;
use bevy_volken::{CloudConfig, VolkenContext, VolkenPlugin};

fn main() -> bevy::app::AppExit {
    App::new()
        .add_plugins(DefaultPlugins)
        .add_plugins(VolkenPlugin)
        .add_plugins(SurfaceCamPlugin)
        .add_plugins(PreviewPlugin)
        .insert_resource(ClearColor(Color::srgb(0.0, 0.0, 0.0)))
        .add_systems(Startup, load_config)
        .add_systems(Update, controls)
        .run()
}

// falls back to the defaults when the file is missing or broken
fn load_config(mut config: ResMut<CloudConfig>) {
    match CloudConfig::load(CONFIG_PATH) {
        Ok(loaded) => {
            info!("loaded cloud config from {}", CONFIG_PATH);
            *config = loaded;
        }
        Err(err) => warn!("using default cloud config: {}", err),
    }
}

// C toggles clouds, R picks a new seed, +/- change the working resolution
fn controls(
    keys: Res<ButtonInput<KeyCode>>,
    mut config: ResMut<CloudConfig>,
    context: Option<Res<VolkenContext>>,
    mut reseed: EventWriter<ReseedClouds>,
) {
    if keys.just_pressed(KeyCode::KeyC) {
        config.enabled = !config.enabled;
    }

    if keys.just_pressed(KeyCode::KeyR) {
        if let Some(context) = context {
            reseed.write(ReseedClouds(context.cache().seed().wrapping_add(1)));
        }
    }

    if keys.just_pressed(KeyCode::Equal) {
        config.resolution_scale = (config.resolution_scale + 0.1).min(1.0);
    }
    if keys.just_pressed(KeyCode::Minus) {
        config.resolution_scale = (config.resolution_scale - 0.1).max(0.1);
    }
}
