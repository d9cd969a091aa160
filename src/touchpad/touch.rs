//! Per-slot touch state.
//!
//! One [`Touch`] exists per slot for the lifetime of the device; the kernel
//! reuses slots, so touches are cleared in place rather than reallocated.

use crate::utils::{DeviceCoords, DeviceFloatCoords};

/// Depth of the per-touch motion history ring.
pub(crate) const TOUCHPAD_HISTORY_LENGTH: usize = 4;
/// Samples required before a touch reports motion.
pub(crate) const TOUCHPAD_MIN_SAMPLES: usize = 4;

/// Lifecycle state of a touch point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TouchState {
    /// The slot is not in use.
    #[default]
    None,
    /// A finger is above the surface but not touching.
    Hovering,
    /// The touch started this frame.
    Begin,
    /// The touch continues from a previous frame.
    Update,
    /// The touch ended this frame.
    End,
}

/// Why a touch is being ignored as a resting palm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PalmState {
    /// Not a palm.
    #[default]
    None,
    /// Touched down in the vertical edge exclusion zone.
    Edge,
    /// Touched down while the keyboard was in use.
    Typing,
    /// Touched down while the trackpoint was in use.
    Trackpoint,
}

/// Thumb classification of a touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThumbState {
    /// Could still become a thumb.
    #[default]
    Maybe,
    /// Definitely a thumb; ignored for pointer motion and gestures.
    Yes,
    /// Ruled out; a regular finger.
    No,
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct MotionHistory {
    samples: [DeviceCoords; TOUCHPAD_HISTORY_LENGTH],
    index: usize,
    count: usize,
}

impl MotionHistory {
    pub(crate) fn push(&mut self, point: DeviceCoords) {
        self.index = (self.index + 1) % TOUCHPAD_HISTORY_LENGTH;
        if self.count < TOUCHPAD_HISTORY_LENGTH {
            self.count += 1;
        }
        self.samples[self.index] = point;
    }

    pub(crate) fn offset(&self, offset: usize) -> DeviceCoords {
        let index = (self.index + TOUCHPAD_HISTORY_LENGTH - offset) % TOUCHPAD_HISTORY_LENGTH;
        self.samples[index]
    }

    pub(crate) fn reset(&mut self) {
        self.count = 0;
    }

    pub(crate) fn count(&self) -> usize {
        self.count
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct TouchPalm {
    pub(crate) state: PalmState,
    /// Position the touch first appeared at.
    pub(crate) first: DeviceCoords,
    /// Time the palm was tagged (edge) or the touch began (typing).
    pub(crate) time: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct TouchThumb {
    pub(crate) state: ThumbState,
    pub(crate) initial: DeviceCoords,
    pub(crate) first_touch_time: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct TouchPinned {
    pub(crate) is_pinned: bool,
    pub(crate) center: DeviceCoords,
}

/// The state of one hardware slot.
///
/// Mutation happens inside the frame pipeline; peer subsystems only ever see
/// shared references and the read accessors.
#[derive(Debug, Clone, Default)]
pub struct Touch {
    pub(crate) state: TouchState,
    /// Updated since the last frame.
    pub(crate) dirty: bool,
    /// The kernel ended the sequence (tracking id -1 seen).
    pub(crate) has_ended: bool,
    pub(crate) point: DeviceCoords,
    /// Hover distance, if the device reports one.
    pub(crate) distance: i32,
    pub(crate) pressure: i32,
    /// Time of the last update to this slot.
    pub(crate) time: u64,
    pub(crate) history: MotionHistory,
    pub(crate) hysteresis_center: DeviceCoords,
    pub(crate) palm: TouchPalm,
    pub(crate) thumb: TouchThumb,
    pub(crate) pinned: TouchPinned,
    /// Position snapshotted when the gesture machine picked this touch.
    pub(crate) gesture_initial: DeviceCoords,
    /// The next frame must drop this touch's motion history.
    pub(crate) reset_motion_history: bool,
}

impl Touch {
    /// Creates an unused touch; slots start out with their sequence ended.
    pub(crate) fn new() -> Self {
        Touch {
            has_ended: true,
            ..Default::default()
        }
    }

    /// Lifecycle state of this touch.
    pub fn state(&self) -> TouchState {
        self.state
    }

    /// Current position in device coordinates.
    pub fn position(&self) -> DeviceCoords {
        self.point
    }

    /// Current pressure, if the device reports one.
    pub fn pressure(&self) -> i32 {
        self.pressure
    }

    /// Time of the last update to this slot, in microseconds.
    pub fn time(&self) -> u64 {
        self.time
    }

    /// Whether this touch is tagged as a palm.
    pub fn is_palm(&self) -> bool {
        self.palm.state != PalmState::None
    }

    /// Whether this touch is classified as a resting thumb.
    pub fn is_thumb(&self) -> bool {
        self.thumb.state == ThumbState::Yes
    }

    /// The raw, history-smoothed motion of this touch in device units.
    ///
    /// A two-tap low-pass over the last four samples: the delta between the
    /// average of the two newest and the two oldest samples. Touches with a
    /// short history report no motion at all; the first usable delta arrives
    /// one frame late, which is the price of the jitter reduction.
    pub(crate) fn raw_delta(&self) -> DeviceFloatCoords {
        if self.history.count() < TOUCHPAD_MIN_SAMPLES {
            return DeviceFloatCoords::default();
        }

        let (s0, s1, s2, s3) = (
            self.history.offset(0),
            self.history.offset(1),
            self.history.offset(2),
            self.history.offset(3),
        );

        DeviceFloatCoords {
            x: estimate_delta(s0.x, s1.x, s2.x, s3.x),
            y: estimate_delta(s0.y, s1.y, s2.y, s3.y),
        }
    }

    /// Applies the per-axis deadband and pushes the filtered position as the
    /// new hysteresis center.
    pub(crate) fn motion_hysteresis(&mut self, margin: DeviceCoords) {
        if self.history.count() == 0 {
            self.hysteresis_center = self.point;
        } else {
            let x = hysteresis(self.point.x, self.hysteresis_center.x, margin.x);
            let y = hysteresis(self.point.y, self.hysteresis_center.y, margin.y);
            self.hysteresis_center = DeviceCoords::new(x, y);
            self.point = DeviceCoords::new(x, y);
        }
    }
}

fn estimate_delta(x0: i32, x1: i32, x2: i32, x3: i32) -> f64 {
    (x0 + x1 - x2 - x3) as f64 / 4.0
}

/// Deadband filter: motion within `margin` of `center` is swallowed, motion
/// beyond it keeps its residual.
fn hysteresis(input: i32, center: i32, margin: i32) -> i32 {
    let diff = input - center;
    if diff.abs() <= margin {
        return center;
    }

    if diff > margin {
        center + diff - margin
    } else {
        center + diff + margin
    }
}
