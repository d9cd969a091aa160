//! Output events emitted by the touchpad core.
//!
//! Events are queued inside [`Touchpad`](crate::touchpad::Touchpad) as they
//! are produced during frame processing and drained by the embedder with
//! [`poll_event`](crate::touchpad::Touchpad::poll_event). Within one frame
//! the queue order is the emission order, so a gesture's begin event always
//! precedes its first update and its end event follows the last one.

use crate::utils::{DeviceFloatCoords, NormalizedCoords};

/// A physical pointer button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    /// Left mouse button.
    Left,
    /// Middle mouse button.
    Middle,
    /// Right mouse button.
    Right,
}

impl Button {
    /// The evdev key code this button maps to.
    pub fn code(self) -> u32 {
        match self {
            Button::Left => 0x110,   // BTN_LEFT
            Button::Right => 0x111,  // BTN_RIGHT
            Button::Middle => 0x112, // BTN_MIDDLE
        }
    }
}

/// State of a button. Either pressed or released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ButtonState {
    /// Button is released.
    Released,
    /// Button is pressed.
    Pressed,
}

/// Axis when scrolling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    /// Horizontal axis.
    Horizontal,
    /// Vertical axis.
    Vertical,
}

/// Source of an axis event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisSource {
    /// Fingers on the touchpad surface.
    ///
    /// A finger scroll sequence is always terminated with an axis value of
    /// 0.0; consumers may use that to trigger kinetic scrolling.
    Finger,
    /// A continuous scrolling source with no guaranteed terminating event.
    Continuous,
}

/// An event produced by the touchpad core.
///
/// All variants carry `time`, the microsecond timestamp of the device frame
/// (or timer deadline) that produced them.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Relative pointer motion.
    PointerMotion {
        /// Timestamp in microseconds.
        time: u64,
        /// Accelerated motion delta in normalized units.
        delta: NormalizedCoords,
        /// Unaccelerated motion in device units.
        unaccel: DeviceFloatCoords,
    },
    /// A physical button changed state.
    PointerButton {
        /// Timestamp in microseconds.
        time: u64,
        /// The affected button, after left-handed mapping.
        button: Button,
        /// New state of the button.
        state: ButtonState,
    },
    /// Scroll motion on one axis.
    PointerAxis {
        /// Timestamp in microseconds.
        time: u64,
        /// The scrolled axis.
        axis: Axis,
        /// What produced the scroll motion.
        source: AxisSource,
        /// Scroll amount; 0.0 terminates a finger scroll sequence.
        value: f64,
    },
    /// A multi-finger swipe began.
    GestureSwipeBegin {
        /// Timestamp in microseconds.
        time: u64,
        /// Number of fingers performing the gesture.
        fingers: u32,
    },
    /// Motion within a swipe gesture.
    GestureSwipeUpdate {
        /// Timestamp in microseconds.
        time: u64,
        /// Number of fingers performing the gesture.
        fingers: u32,
        /// Accelerated motion delta in normalized units.
        delta: NormalizedCoords,
        /// Unaccelerated motion delta in normalized units.
        unaccel: NormalizedCoords,
    },
    /// A swipe gesture ended.
    GestureSwipeEnd {
        /// Timestamp in microseconds.
        time: u64,
        /// Number of fingers that performed the gesture.
        fingers: u32,
        /// Whether the gesture was cut short rather than finished.
        cancelled: bool,
    },
    /// A pinch gesture began.
    GesturePinchBegin {
        /// Timestamp in microseconds.
        time: u64,
        /// Number of fingers performing the gesture.
        fingers: u32,
    },
    /// Motion, scaling or rotation within a pinch gesture.
    GesturePinchUpdate {
        /// Timestamp in microseconds.
        time: u64,
        /// Number of fingers performing the gesture.
        fingers: u32,
        /// Accelerated motion of the gesture center in normalized units.
        delta: NormalizedCoords,
        /// Unaccelerated motion of the gesture center in normalized units.
        unaccel: NormalizedCoords,
        /// Finger distance relative to the distance at gesture begin.
        scale: f64,
        /// Rotation since the previous update, in degrees in (-180, 180].
        angle_delta: f64,
    },
    /// A pinch gesture ended.
    GesturePinchEnd {
        /// Timestamp in microseconds.
        time: u64,
        /// Number of fingers that performed the gesture.
        fingers: u32,
        /// Finger distance relative to the distance at gesture begin.
        scale: f64,
        /// Whether the gesture was cut short rather than finished.
        cancelled: bool,
    },
}

impl Event {
    /// The timestamp of the event in microseconds.
    pub fn time(&self) -> u64 {
        match *self {
            Event::PointerMotion { time, .. }
            | Event::PointerButton { time, .. }
            | Event::PointerAxis { time, .. }
            | Event::GestureSwipeBegin { time, .. }
            | Event::GestureSwipeUpdate { time, .. }
            | Event::GestureSwipeEnd { time, .. }
            | Event::GesturePinchBegin { time, .. }
            | Event::GesturePinchUpdate { time, .. }
            | Event::GesturePinchEnd { time, .. } => time,
        }
    }
}
