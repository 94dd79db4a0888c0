// Core types shared across the navigation core.
//
// Defines grid coordinates (`CellPos`), continuous positions (`Point3`),
// horizontal direction helpers, agent/target identifiers, and the small enums
// that travel through plan requests (`NavGoal`, `PursuitMode`, `PlanReason`).
//
// Coordinate conventions follow the host world:
// - X: east  (positive) / west  (negative)
// - Y: up    (positive) / down  (negative)
// - Z: south (positive) / north (negative)
//
// A cell's "feet" position is the cell itself; an agent occupies the feet
// cell and the cell directly above it (two-high footprint).
//
// See also: `snapshot.rs` and `survey.rs` which classify cells, `state.rs`
// which stores these types per agent.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Spatial types
// ---------------------------------------------------------------------------

/// A position in the voxel grid. Each component is in cell units.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl CellPos {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub const fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }

    pub const fn up(self, n: i32) -> Self {
        self.offset(0, n, 0)
    }

    pub const fn down(self, n: i32) -> Self {
        self.offset(0, -n, 0)
    }

    /// Step one cell in a horizontal direction, keeping the same level.
    pub fn step(self, dir: HorizontalDir) -> Self {
        let (dx, dz) = dir.offset();
        self.offset(dx, 0, dz)
    }

    /// Manhattan distance between two coordinates.
    pub fn manhattan_distance(self, other: Self) -> u32 {
        ((self.x - other.x).unsigned_abs())
            + ((self.y - other.y).unsigned_abs())
            + ((self.z - other.z).unsigned_abs())
    }

    /// Manhattan distance ignoring the vertical axis.
    pub fn horizontal_manhattan(self, other: Self) -> u32 {
        (self.x - other.x).unsigned_abs() + (self.z - other.z).unsigned_abs()
    }

    /// Euclidean distance ignoring the vertical axis.
    pub fn horizontal_distance(self, other: Self) -> f64 {
        let dx = f64::from(self.x - other.x);
        let dz = f64::from(self.z - other.z);
        (dx * dx + dz * dz).sqrt()
    }

    /// Squared Euclidean distance in all three axes.
    pub fn distance_sq(self, other: Self) -> i64 {
        let dx = i64::from(self.x - other.x);
        let dy = i64::from(self.y - other.y);
        let dz = i64::from(self.z - other.z);
        dx * dx + dy * dy + dz * dz
    }

    /// The point at the horizontal center of the cell's floor.
    pub fn center(self) -> Point3 {
        Point3::new(
            f64::from(self.x) + 0.5,
            f64::from(self.y),
            f64::from(self.z) + 0.5,
        )
    }

    /// True if `other` is one walking step away: one cardinal horizontal
    /// move combined with at most one level of climb or drop.
    pub fn is_single_step(self, other: Self) -> bool {
        self.horizontal_manhattan(other) == 1 && (self.y - other.y).abs() <= 1
    }
}

impl fmt::Display for CellPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// A continuous position in world space (cell units).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// The cell containing this point.
    pub fn cell(self) -> CellPos {
        CellPos::new(
            self.x.floor() as i32,
            self.y.floor() as i32,
            self.z.floor() as i32,
        )
    }

    pub fn distance(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    pub fn horizontal_distance(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dz = self.z - other.z;
        (dx * dx + dz * dz).sqrt()
    }

    /// Unit horizontal vector from `self` toward `other`, or `None` when the
    /// two points share a column.
    pub fn horizontal_direction_to(self, other: Self) -> Option<(f64, f64)> {
        let dx = other.x - self.x;
        let dz = other.z - self.z;
        let len = (dx * dx + dz * dz).sqrt();
        if len < 1e-6 {
            None
        } else {
            Some((dx / len, dz / len))
        }
    }
}

impl fmt::Display for Point3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.2}, {:.2}, {:.2})", self.x, self.y, self.z)
    }
}

// ---------------------------------------------------------------------------
// Horizontal directions
// ---------------------------------------------------------------------------

/// One of the eight horizontal neighbor directions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HorizontalDir {
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
}

impl HorizontalDir {
    /// All eight directions, clockwise starting north.
    pub const ALL: [HorizontalDir; 8] = [
        HorizontalDir::North,
        HorizontalDir::NorthEast,
        HorizontalDir::East,
        HorizontalDir::SouthEast,
        HorizontalDir::South,
        HorizontalDir::SouthWest,
        HorizontalDir::West,
        HorizontalDir::NorthWest,
    ];

    /// The four cardinal directions, clockwise starting north.
    pub const CARDINALS: [HorizontalDir; 4] = [
        HorizontalDir::North,
        HorizontalDir::East,
        HorizontalDir::South,
        HorizontalDir::West,
    ];

    /// `(dx, dz)` offset of one step in this direction.
    pub const fn offset(self) -> (i32, i32) {
        match self {
            HorizontalDir::North => (0, -1),
            HorizontalDir::NorthEast => (1, -1),
            HorizontalDir::East => (1, 0),
            HorizontalDir::SouthEast => (1, 1),
            HorizontalDir::South => (0, 1),
            HorizontalDir::SouthWest => (-1, 1),
            HorizontalDir::West => (-1, 0),
            HorizontalDir::NorthWest => (-1, -1),
        }
    }

    pub const fn is_diagonal(self) -> bool {
        let (dx, dz) = self.offset();
        dx != 0 && dz != 0
    }

    /// The two cardinal components of a diagonal direction. For cardinals
    /// both entries are the direction itself.
    pub fn components(self) -> [HorizontalDir; 2] {
        match self {
            HorizontalDir::NorthEast => [HorizontalDir::North, HorizontalDir::East],
            HorizontalDir::SouthEast => [HorizontalDir::South, HorizontalDir::East],
            HorizontalDir::SouthWest => [HorizontalDir::South, HorizontalDir::West],
            HorizontalDir::NorthWest => [HorizontalDir::North, HorizontalDir::West],
            cardinal => [cardinal, cardinal],
        }
    }

    pub fn opposite(self) -> Self {
        self.rotate(4)
    }

    /// 90° counter-clockwise (viewed from above).
    pub fn left(self) -> Self {
        self.rotate(6)
    }

    /// 90° clockwise (viewed from above).
    pub fn right(self) -> Self {
        self.rotate(2)
    }

    fn rotate(self, eighths: usize) -> Self {
        let idx = Self::ALL.iter().position(|&d| d == self).unwrap_or(0);
        Self::ALL[(idx + eighths) % 8]
    }

    /// Unit-length horizontal vector for this direction.
    pub fn unit(self) -> (f64, f64) {
        let (dx, dz) = self.offset();
        let len = f64::from(dx * dx + dz * dz).sqrt();
        (f64::from(dx) / len, f64::from(dz) / len)
    }

    /// The cardinal direction best aligned with a horizontal vector.
    pub fn cardinal_toward(dx: f64, dz: f64) -> Self {
        if dx.abs() >= dz.abs() {
            if dx >= 0.0 {
                HorizontalDir::East
            } else {
                HorizontalDir::West
            }
        } else if dz >= 0.0 {
            HorizontalDir::South
        } else {
            HorizontalDir::North
        }
    }
}

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

macro_rules! host_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

host_id!(/// Identity of a navigated agent, assigned by the host.
AgentId);
host_id!(/// Identity of a tracked world entity a plan may follow.
TargetId);

// ---------------------------------------------------------------------------
// Request enums
// ---------------------------------------------------------------------------

/// Door classification of a cell.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DoorKind {
    #[default]
    None,
    /// A barrier the agent can open itself.
    Soft,
    /// A barrier the agent cannot open; traversable only while open.
    Hard,
}

/// What a pursuit is heading for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NavGoal {
    Fixed(CellPos),
    Tracked(TargetId),
}

/// The external behavior currently driving the agent. Part of the pursuit
/// intent: a mode change invalidates in-flight plans.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PursuitMode {
    #[default]
    GoTo,
    Follow,
    Gather,
    Idle,
}

/// Why a plan was requested. Carried for logging only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlanReason {
    NewGoal,
    TargetMoved,
    PathExhausted,
    Stuck,
    Periodic,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manhattan_distance() {
        let a = CellPos::new(0, 0, 0);
        let b = CellPos::new(3, 4, 5);
        assert_eq!(a.manhattan_distance(b), 12);
        assert_eq!(b.manhattan_distance(a), 12);
        assert_eq!(a.horizontal_manhattan(b), 8);
    }

    #[test]
    fn point_cell_floors_negative_coordinates() {
        let p = Point3::new(-0.5, 64.0, -1.25);
        assert_eq!(p.cell(), CellPos::new(-1, 64, -2));
    }

    #[test]
    fn single_step_requires_one_cardinal_move() {
        let a = CellPos::new(0, 64, 0);
        assert!(a.is_single_step(CellPos::new(1, 64, 0)));
        assert!(a.is_single_step(CellPos::new(0, 65, 1)));
        assert!(!a.is_single_step(CellPos::new(1, 64, 1)));
        assert!(!a.is_single_step(CellPos::new(0, 65, 0)));
        assert!(!a.is_single_step(CellPos::new(1, 66, 0)));
    }

    #[test]
    fn direction_rotation() {
        assert_eq!(HorizontalDir::North.left(), HorizontalDir::West);
        assert_eq!(HorizontalDir::North.right(), HorizontalDir::East);
        assert_eq!(HorizontalDir::East.opposite(), HorizontalDir::West);
        assert_eq!(HorizontalDir::NorthWest.opposite(), HorizontalDir::SouthEast);
    }

    #[test]
    fn cardinal_toward_picks_dominant_axis() {
        assert_eq!(HorizontalDir::cardinal_toward(3.0, 1.0), HorizontalDir::East);
        assert_eq!(HorizontalDir::cardinal_toward(-0.2, -5.0), HorizontalDir::North);
        assert_eq!(HorizontalDir::cardinal_toward(0.0, 2.0), HorizontalDir::South);
    }

    #[test]
    fn diagonal_components() {
        assert!(HorizontalDir::SouthWest.is_diagonal());
        assert_eq!(
            HorizontalDir::SouthWest.components(),
            [HorizontalDir::South, HorizontalDir::West]
        );
        assert_eq!(
            HorizontalDir::East.components(),
            [HorizontalDir::East, HorizontalDir::East]
        );
    }
}
