use std::fmt;
use std::ops::{Add, AddAssign, Sub};

/// The baseline pointing-device resolution all motion is normalized to.
///
/// Deltas leaving the crate are expressed in units of a 1000 DPI mouse
/// (1/1000 inch per unit), so touchpads of different resolutions produce
/// comparable motion.
pub const DEFAULT_MOUSE_DPI: u32 = 1000;

/// A position in device coordinate space, as reported by the kernel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceCoords {
    /// Position on the x axis, in device units.
    pub x: i32,
    /// Position on the y axis, in device units.
    pub y: i32,
}

impl DeviceCoords {
    /// Creates a new position from device units.
    pub fn new(x: i32, y: i32) -> Self {
        DeviceCoords { x, y }
    }

    /// Delta between two positions, in device units.
    pub fn delta(self, other: DeviceCoords) -> DeviceFloatCoords {
        DeviceFloatCoords {
            x: (self.x - other.x) as f64,
            y: (self.y - other.y) as f64,
        }
    }

    /// Midpoint between two positions.
    pub fn average(self, other: DeviceCoords) -> DeviceFloatCoords {
        DeviceFloatCoords {
            x: (self.x + other.x) as f64 / 2.0,
            y: (self.y + other.y) as f64 / 2.0,
        }
    }
}

impl From<(i32, i32)> for DeviceCoords {
    fn from((x, y): (i32, i32)) -> Self {
        DeviceCoords { x, y }
    }
}

/// A sub-unit precise position or delta in device coordinate space.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DeviceFloatCoords {
    /// Position on the x axis, in device units.
    pub x: f64,
    /// Position on the y axis, in device units.
    pub y: f64,
}

impl DeviceFloatCoords {
    /// Creates new float coordinates from device units.
    pub fn new(x: f64, y: f64) -> Self {
        DeviceFloatCoords { x, y }
    }

    /// Midpoint between two positions.
    pub fn average(self, other: DeviceFloatCoords) -> DeviceFloatCoords {
        DeviceFloatCoords {
            x: (self.x + other.x) / 2.0,
            y: (self.y + other.y) / 2.0,
        }
    }
}

impl Sub for DeviceFloatCoords {
    type Output = DeviceFloatCoords;

    fn sub(self, rhs: DeviceFloatCoords) -> DeviceFloatCoords {
        DeviceFloatCoords {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
        }
    }
}

/// A motion delta normalized to [`DEFAULT_MOUSE_DPI`] units.
#[derive(Clone, Copy, Default, PartialEq)]
pub struct NormalizedCoords {
    /// Delta on the x axis.
    pub x: f64,
    /// Delta on the y axis.
    pub y: f64,
}

impl NormalizedCoords {
    /// A zero-motion delta.
    pub const ZERO: NormalizedCoords = NormalizedCoords { x: 0.0, y: 0.0 };

    /// Creates a new normalized delta.
    pub fn new(x: f64, y: f64) -> Self {
        NormalizedCoords { x, y }
    }

    /// Euclidean length of the delta.
    pub fn length(self) -> f64 {
        self.x.hypot(self.y)
    }

    /// Whether both components are exactly zero.
    pub fn is_zero(self) -> bool {
        self.x == 0.0 && self.y == 0.0
    }

    /// The octant set this delta points into.
    ///
    /// Motion shorter than 2 normalized units is too noisy to pin down to a
    /// single octant, so neighboring octants are included. Longer motion maps
    /// to the one or two octants closest to its angle. A zero delta yields
    /// [`Direction::UNDEFINED`].
    pub fn direction(self) -> Direction {
        use std::f64::consts::PI;

        let mut dir = Direction::UNDEFINED;

        if self.x.abs() < 2.0 && self.y.abs() < 2.0 {
            if self.x > 0.0 && self.y > 0.0 {
                dir = Direction::S | Direction::SE | Direction::E;
            } else if self.x > 0.0 && self.y < 0.0 {
                dir = Direction::N | Direction::NE | Direction::E;
            } else if self.x < 0.0 && self.y > 0.0 {
                dir = Direction::S | Direction::SW | Direction::W;
            } else if self.x < 0.0 && self.y < 0.0 {
                dir = Direction::N | Direction::NW | Direction::W;
            } else if self.x > 0.0 {
                dir = Direction::NE | Direction::E | Direction::SE;
            } else if self.x < 0.0 {
                dir = Direction::NW | Direction::W | Direction::SW;
            } else if self.y > 0.0 {
                dir = Direction::SE | Direction::S | Direction::SW;
            } else if self.y < 0.0 {
                dir = Direction::NE | Direction::N | Direction::NW;
            }
        } else {
            // Map the angle into [0, 8) with 0 pointing north, then mark the
            // one or two octants close enough to the exact angle.
            let mut r = self.y.atan2(self.x);
            r = (r + 2.5 * PI).rem_euclid(2.0 * PI);
            r *= 4.0 / PI;

            let d1 = (r + 0.9) as u32 % 8;
            let d2 = (r + 0.1) as u32 % 8;

            dir = Direction::from_bits_truncate((1 << d1) | (1 << d2));
        }

        dir
    }
}

impl Add for NormalizedCoords {
    type Output = NormalizedCoords;

    fn add(self, rhs: NormalizedCoords) -> NormalizedCoords {
        NormalizedCoords {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

impl AddAssign for NormalizedCoords {
    fn add_assign(&mut self, rhs: NormalizedCoords) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl fmt::Debug for NormalizedCoords {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.2}, {:.2})", self.x, self.y)
    }
}

bitflags::bitflags! {
    /// One of eight compass octants, N through NW, as a bit set.
    ///
    /// Several bits may be set at once for motion whose angle is close to an
    /// octant boundary. Adjacency wraps around between [`Direction::NW`] and
    /// [`Direction::N`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Direction: u8 {
        /// North (negative y).
        const N = 1 << 0;
        /// North-east.
        const NE = 1 << 1;
        /// East (positive x).
        const E = 1 << 2;
        /// South-east.
        const SE = 1 << 3;
        /// South (positive y).
        const S = 1 << 4;
        /// South-west.
        const SW = 1 << 5;
        /// West (negative x).
        const W = 1 << 6;
        /// North-west.
        const NW = 1 << 7;
        /// No direction can be determined.
        const UNDEFINED = 0xff;
    }
}

impl Direction {
    /// Whether this set carries no directional information.
    pub fn is_undefined(self) -> bool {
        self == Direction::UNDEFINED
    }
}

/// Converts a physical distance in mm into [`DEFAULT_MOUSE_DPI`]-normalized
/// units.
pub(crate) fn mm_to_normalized(mm: f64) -> f64 {
    mm * DEFAULT_MOUSE_DPI as f64 / 25.4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_cardinal_octants() {
        let east = NormalizedCoords::new(10.0, 0.0).direction();
        assert!(east.contains(Direction::E));
        assert!(!east.contains(Direction::W));
        assert!(!east.contains(Direction::N));

        let north = NormalizedCoords::new(0.0, -10.0).direction();
        assert!(north.contains(Direction::N));
        assert!(!north.contains(Direction::S));

        let south = NormalizedCoords::new(0.0, 10.0).direction();
        assert!(south.contains(Direction::S));

        let west = NormalizedCoords::new(-10.0, 0.0).direction();
        assert!(west.contains(Direction::W));
    }

    #[test]
    fn direction_diagonals() {
        let se = NormalizedCoords::new(10.0, 10.0).direction();
        assert!(se.contains(Direction::SE));
        assert!(!se.contains(Direction::NW));

        let nw = NormalizedCoords::new(-10.0, -10.0).direction();
        assert!(nw.contains(Direction::NW));
    }

    #[test]
    fn direction_small_motion_is_fuzzy() {
        let dir = NormalizedCoords::new(1.0, 1.0).direction();
        assert_eq!(dir, Direction::S | Direction::SE | Direction::E);

        let dir = NormalizedCoords::new(-1.0, 0.0).direction();
        assert_eq!(dir, Direction::NW | Direction::W | Direction::SW);
    }

    #[test]
    fn direction_zero_is_undefined() {
        assert!(NormalizedCoords::ZERO.direction().is_undefined());
    }

    #[test]
    fn mm_normalization() {
        // 25.4mm is an inch, i.e. DEFAULT_MOUSE_DPI units.
        assert_eq!(mm_to_normalized(25.4), DEFAULT_MOUSE_DPI as f64);
    }
}
