use crate::JsonValue;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Width of a garden in local tiles.
pub const GARDEN_WIDTH: i64 = 23;

/// Height of a garden in local tiles.
pub const GARDEN_HEIGHT: i64 = 12;

/// Where the avatar stands in local coordinates right after spawning.
pub const LOCAL_SPAWN: Position = Position::new(11, 11);

/// Server coordinates of the spawn point of each seat.
///
/// Seats are ordered left to right, top to bottom; each column is 26 tiles
/// apart and the rows are 11 tiles apart.
pub const SPAWN_POSITIONS: [Position; 6] = [
    Position::new(14, 14),
    Position::new(40, 14),
    Position::new(66, 14),
    Position::new(14, 25),
    Position::new(40, 25),
    Position::new(66, 25),
];

/// A tile coordinate, either local to a garden or in server world space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
pub struct Position {
    pub x: i64,
    pub y: i64,
}

impl Position {
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    /// Spawn point of `seat` in server coordinates.
    pub fn spawn_for_seat(seat: usize) -> Option<Self> {
        SPAWN_POSITIONS.get(seat).copied()
    }

    /// A uniformly random tile inside a garden, in local coordinates.
    pub fn random_local() -> Self {
        let mut rng = rand::thread_rng();
        Self::new(
            rng.gen_range(0..GARDEN_WIDTH),
            rng.gen_range(0..GARDEN_HEIGHT),
        )
    }

    /// Whether this local coordinate lies inside the garden.
    pub fn is_inside_garden(&self) -> bool {
        (0..GARDEN_WIDTH).contains(&self.x) && (0..GARDEN_HEIGHT).contains(&self.y)
    }

    /// Convert a local garden coordinate of `seat` to server space.
    ///
    /// Local [`LOCAL_SPAWN`] maps onto the seat's spawn point. Returns `None`
    /// for a seat outside [`SPAWN_POSITIONS`].
    pub fn local_to_server(self, seat: usize) -> Option<Self> {
        let spawn = Self::spawn_for_seat(seat)?;
        Some(Self::new(
            spawn.x + (self.x - LOCAL_SPAWN.x),
            spawn.y + (self.y - LOCAL_SPAWN.y),
        ))
    }

    /// Inverse of [`Position::local_to_server`].
    pub fn server_to_local(self, seat: usize) -> Option<Self> {
        let spawn = Self::spawn_for_seat(seat)?;
        Some(Self::new(
            LOCAL_SPAWN.x + (self.x - spawn.x),
            LOCAL_SPAWN.y + (self.y - spawn.y),
        ))
    }

    /// `{"x": .., "y": ..}` as sent on the wire.
    pub fn to_json(self) -> JsonValue {
        serde_json::json!({"x": self.x, "y": self.y})
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_spawn_maps_to_seat_spawn() {
        for (seat, spawn) in SPAWN_POSITIONS.iter().enumerate() {
            assert_eq!(LOCAL_SPAWN.local_to_server(seat), Some(*spawn));
        }
    }

    #[test]
    fn conversion_is_reversible() {
        let local = Position::new(0, 3);
        let server = local.local_to_server(4).unwrap();
        assert_eq!(server, Position::new(29, 17));
        assert_eq!(server.server_to_local(4), Some(local));
    }

    #[test]
    fn unknown_seat_has_no_mapping() {
        assert_eq!(Position::new(1, 1).local_to_server(6), None);
    }

    #[test]
    fn random_local_stays_in_garden() {
        for _ in 0..200 {
            assert!(Position::random_local().is_inside_garden());
        }
    }

    #[test]
    fn serializes_as_xy_object() {
        assert_eq!(
            serde_json::to_value(Position::new(3, 4)).unwrap(),
            Position::new(3, 4).to_json()
        );
    }
}
