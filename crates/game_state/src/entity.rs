//! Visible entity records and wire-unit conversions.

use waypoint_event_system::{PlayerId, Position, Rotation};

/// Fixed-point raw units per world unit.
const FIXED_POINT_SCALE: f64 = 32.0;

/// Converts an absolute fixed-point coordinate to world units.
pub(crate) fn fixed_to_world(raw: i32) -> f64 {
    f64::from(raw) / FIXED_POINT_SCALE
}

/// Converts a relative fixed-point delta to world units.
pub(crate) fn delta_to_world(raw: i8) -> f64 {
    f64::from(raw) / FIXED_POINT_SCALE
}

/// Converts an angle byte (fraction of a full turn) to degrees.
pub(crate) fn angle_to_degrees(raw: u8) -> f32 {
    f32::from(raw) / 256.0 * 360.0
}

/// One visible entity, keyed by its world entity id.
#[derive(Debug, Clone)]
pub struct EntityRecord {
    /// The owning player, when the player list knew the spawn's uuid.
    /// Spawn and list packets may race; `None` is expected, not an error.
    pub owner: Option<PlayerId>,
    pub position: Position,
    pub rotation: Rotation,
    pub on_ground: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_point_is_thirty_seconds() {
        assert_eq!(fixed_to_world(32), 1.0);
        assert_eq!(fixed_to_world(-16), -0.5);
        assert_eq!(delta_to_world(1), 1.0 / 32.0);
    }

    #[test]
    fn angle_bytes_are_turn_fractions() {
        assert_eq!(angle_to_degrees(0), 0.0);
        assert_eq!(angle_to_degrees(64), 90.0);
        assert_eq!(angle_to_degrees(128), 180.0);
    }
}
