use bevy::input::mouse::MouseWheel;
use bevy::prelude::*;

use crate::config::PLANET_RADIUS;

pub struct SurfaceCamPlugin;

impl Plugin for SurfaceCamPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Update, update);
    }
}

// convert latlon to cartesian, planet centered at the origin
pub fn latlon_to_pos(latitude: f32, longitude: f32, radius: f32) -> Vec3 {
    let lat_rad = latitude.to_radians();
    let lon_rad = longitude.to_radians();

    let x = radius * lat_rad.cos() * lon_rad.cos();
    let y = radius * lat_rad.sin();
    let z = radius * lat_rad.cos() * lon_rad.sin();

    Vec3::new(x, y, z)
}

// viewpoint standing on the planet surface, looking around with heading/pitch
// this is what the cloud pipeline renders from, not a bevy render camera
#[derive(Component, Debug)]
pub struct PlanetCamera {
    pub latitude: f32,
    pub longitude: f32,
    pub altitude: f32,
    // radians, 0 faces north, pi/2 faces east
    pub heading: f32,
    pub pitch: f32,
    pub speed: f32,
    pub is_dragging: bool,

    pub min_altitude: f32,
    pub max_altitude: f32,
}

impl Default for PlanetCamera {
    fn default() -> Self {
        Self {
            latitude: 0.0,
            longitude: 0.0,
            altitude: 500.0,
            heading: 0.0,
            pitch: 0.3,
            speed: 0.1,
            is_dragging: false,

            min_altitude: 10.0,
            max_altitude: 20_000.0,
        }
    }
}

impl PlanetCamera {
    pub fn new(altitude: f32, speed: f32) -> Self {
        Self {
            altitude,
            speed,
            ..default()
        }
    }

    pub fn with_location(mut self, latitude: f32, longitude: f32) -> Self {
        self.latitude = latitude;
        self.longitude = longitude;
        self
    }

    pub fn with_altitude_limits(mut self, min_altitude: f32, max_altitude: f32) -> Self {
        self.min_altitude = min_altitude;
        self.max_altitude = max_altitude;
        self
    }

    pub fn calculate_position(&self) -> Vec3 {
        latlon_to_pos(self.latitude, self.longitude, PLANET_RADIUS + self.altitude)
    }

    // local up, north and east at the camera's ground point
    pub fn local_basis(&self) -> (Vec3, Vec3, Vec3) {
        let lat = self.latitude.to_radians();
        let lon = self.longitude.to_radians();

        let up = Vec3::new(lat.cos() * lon.cos(), lat.sin(), lat.cos() * lon.sin());
        let north = Vec3::new(-lat.sin() * lon.cos(), lat.cos(), -lat.sin() * lon.sin());
        let east = Vec3::new(-lon.sin(), 0.0, lon.cos());

        (up, north, east)
    }

    pub fn forward(&self) -> Vec3 {
        let (up, north, east) = self.local_basis();
        let horizontal = self.heading.cos() * north + self.heading.sin() * east;

        (self.pitch.cos() * horizontal + self.pitch.sin() * up).normalize()
    }
}

fn update(
    mut camera_query: Query<(&mut Transform, &mut PlanetCamera)>,
    mouse_buttons: Res<ButtonInput<MouseButton>>,
    keys: Res<ButtonInput<KeyCode>>,
    time: Res<Time>,
    mut mouse_motion: EventReader<CursorMoved>,
    mut scroll_events: EventReader<MouseWheel>,
) {
    for (mut transform, mut camera) in camera_query.iter_mut() {
        if mouse_buttons.just_pressed(MouseButton::Right) {
            camera.is_dragging = true;
        }
        if mouse_buttons.just_released(MouseButton::Right) {
            camera.is_dragging = false;
        }

        // look around
        if camera.is_dragging {
            for motion in mouse_motion.read() {
                if let Some(delta) = motion.delta {
                    camera.heading += delta.x * camera.speed * 0.01;
                    camera.pitch -= delta.y * camera.speed * 0.01;
                }
                camera.pitch = camera.pitch.clamp(-1.5, 1.5);
            }
        }

        // climb and descend
        for scroll in scroll_events.read() {
            camera.altitude *= 1.0 - scroll.y * 0.1;
            camera.altitude = camera.altitude.clamp(camera.min_altitude, camera.max_altitude);
        }

        // walk along the surface, degrees per second
        let step = camera.speed * time.delta_secs();
        let (sin, cos) = camera.heading.sin_cos();
        let mut walk = Vec2::ZERO;
        if keys.pressed(KeyCode::KeyW) {
            walk += Vec2::new(cos, sin);
        }
        if keys.pressed(KeyCode::KeyS) {
            walk -= Vec2::new(cos, sin);
        }
        if keys.pressed(KeyCode::KeyD) {
            walk += Vec2::new(-sin, cos);
        }
        if keys.pressed(KeyCode::KeyA) {
            walk -= Vec2::new(-sin, cos);
        }
        camera.latitude = (camera.latitude + walk.x * step).clamp(-89.0, 89.0);
        camera.longitude += walk.y * step;

        let (up, _, _) = camera.local_basis();
        transform.translation = camera.calculate_position();
        transform.look_to(camera.forward(), up);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basis_is_orthonormal() {
        let camera = PlanetCamera::default().with_location(35.0, -120.0);
        let (up, north, east) = camera.local_basis();

        for v in [up, north, east] {
            assert!((v.length() - 1.0).abs() < 1e-5);
        }
        assert!(up.dot(north).abs() < 1e-5);
        assert!(up.dot(east).abs() < 1e-5);
        assert!(north.dot(east).abs() < 1e-5);
    }

    #[test]
    fn position_sits_above_the_surface() {
        let camera = PlanetCamera::new(750.0, 0.1).with_location(10.0, 20.0);
        let position = camera.calculate_position();

        assert!((position.length() - (PLANET_RADIUS + 750.0)).abs() < 1.0);
        assert!(position.normalize().dot(camera.local_basis().0) > 0.9999);
    }

    #[test]
    fn heading_turns_from_north_to_east() {
        let mut camera = PlanetCamera::default();
        camera.pitch = 0.0;
        let (_, north, east) = camera.local_basis();

        assert!(camera.forward().dot(north) > 0.9999);
        camera.heading = std::f32::consts::FRAC_PI_2;
        assert!(camera.forward().dot(east) > 0.9999);
    }
}
