use bevy::math::{Vec2, Vec3};

/// Noise sampling offsets scrolled by the wind, kept inside the unit range so
/// they never grow without bound.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct WindState {
    /// world space, for the shape and detail volumes
    pub offset: Vec3,
    /// (east, north) tangent plane, for the weather map
    pub weather_offset: Vec2,
}

impl WindState {
    /// `direction` is in degrees, 0 along `north` and 90 along `east`.
    pub fn advance(&mut self, speed: f32, direction: f32, north: Vec3, east: Vec3, dt: f32) {
        let (sin, cos) = direction.to_radians().sin_cos();
        let wind = cos * north + sin * east;

        self.offset = wrap_unit(self.offset + speed * dt * wind);

        let tangent = self.weather_offset + speed * dt * Vec2::new(sin, cos);
        self.weather_offset = Vec2::new(wrap(tangent.x), wrap(tangent.y));
    }
}

fn wrap(x: f32) -> f32 {
    let r = x.rem_euclid(1.0);
    // rem_euclid of a tiny negative rounds up to exactly 1
    if r >= 1.0 { 0.0 } else { r }
}

fn wrap_unit(v: Vec3) -> Vec3 {
    Vec3::new(wrap(v.x), wrap(v.y), wrap(v.z))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_stays_in_unit_range() {
        let mut wind = WindState::default();
        let (north, east) = (Vec3::Y, Vec3::X);

        for frame in 0..10_000 {
            let direction = frame as f32 * 7.3;
            let speed = if frame % 2 == 0 { 0.05 } else { -0.03 };
            wind.advance(speed, direction, north, east, 1.0 / 60.0 + frame as f32 * 1e-3);

            for v in wind.offset.to_array().into_iter().chain(wind.weather_offset.to_array()) {
                assert!((0.0..1.0).contains(&v), "{v} escaped at frame {frame}");
            }
        }
    }

    #[test]
    fn direction_follows_the_local_basis() {
        let mut wind = WindState::default();
        wind.advance(0.1, 90.0, Vec3::Y, Vec3::X, 1.0);

        assert!((wind.offset.x - 0.1).abs() < 1e-6);
        assert!(wind.offset.y.abs() < 1e-6 || (wind.offset.y - 1.0).abs() < 1e-6);
    }

    #[test]
    fn weather_map_scrolls_in_the_tangent_plane() {
        // a tilted basis, as seen away from the equator
        let north = Vec3::new(0.0, 0.94, -0.34).normalize();
        let east = Vec3::X;

        let mut due_north = WindState::default();
        due_north.advance(0.1, 0.0, north, east, 1.0);
        assert!(due_north.weather_offset.x.abs() < 1e-6);
        assert!((due_north.weather_offset.y - 0.1).abs() < 1e-6);

        let mut due_east = WindState::default();
        due_east.advance(0.1, 90.0, north, east, 1.0);
        assert!((due_east.weather_offset.x - 0.1).abs() < 1e-6);
        assert!(due_east.weather_offset.y.abs() < 1e-6 || (due_east.weather_offset.y - 1.0).abs() < 1e-6);
    }

    #[test]
    fn tiny_negative_steps_wrap_below_one() {
        assert_eq!(wrap_unit(Vec3::splat(-1e-9)), Vec3::ZERO);
    }
}
