//! Gesture recognition: scroll, swipe and pinch disambiguation.
//!
//! Two to four active touches enter an UNKNOWN state in which two
//! representative touches are watched. Matching motion directions commit to
//! scroll (two fingers) or swipe; diverging directions commit to pinch.
//! Two unmoving fingers commit to scroll after a timeout so slow scrolling
//! still works, and a large vertical separation commits to pinch early to
//! catch thumb-plus-finger pinches.

use smallvec::SmallVec;
use tracing::{debug, warn};

use crate::config::ScrollMethod;
use crate::device::ModelFlags;
use crate::event::Event;
use crate::utils::time::ms2us;
use crate::utils::timer::Timer;
use crate::utils::{mm_to_normalized, DeviceFloatCoords, Direction, NormalizedCoords};

use super::Touchpad;

/// Debounce interval for finger-count changes mid-gesture.
const GESTURE_SWITCH_TIMEOUT: u64 = ms2us(100);
/// Two unmoving fingers commit to scroll after this long.
const GESTURE_2FG_SCROLL_TIMEOUT: u64 = ms2us(500);

/// Recognition state of the gesture machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum GestureMode {
    /// Fewer than two usable touches.
    #[default]
    None,
    /// Watching representative touches, not yet committed.
    Unknown,
    /// Committed to two-finger scrolling.
    Scroll,
    /// Committed to a swipe gesture.
    Swipe,
    /// Committed to a pinch gesture.
    Pinch,
}

#[derive(Debug, Clone)]
pub(crate) struct GestureState {
    /// Swipe/pinch recognition is enabled for this device.
    pub(crate) enabled: bool,
    pub(crate) mode: GestureMode,
    /// A begin event has been posted downstream.
    pub(crate) started: bool,
    pub(crate) finger_count: usize,
    pub(crate) finger_count_pending: usize,
    pub(crate) initial_time: u64,
    /// Slot indices of the two representative touches.
    pub(crate) touches: [usize; 2],
    pub(crate) prev_scale: f64,
    pub(crate) angle: f64,
    pub(crate) initial_distance: f64,
    pub(crate) center: DeviceFloatCoords,
    pub(crate) finger_count_switch_timer: Timer,
}

impl GestureState {
    pub(crate) fn new(enabled: bool) -> Self {
        GestureState {
            enabled,
            mode: GestureMode::None,
            started: false,
            finger_count: 0,
            finger_count_pending: 0,
            initial_time: 0,
            touches: [0; 2],
            prev_scale: 1.0,
            angle: 0.0,
            initial_distance: 0.0,
            center: DeviceFloatCoords::default(),
            finger_count_switch_timer: Timer::default(),
        }
    }
}

/// Whether two direction sets overlap or touch in neighboring octants.
///
/// Semi-mt touchpads may see one finger move N/NE while the other reports
/// W/NW for the same physical motion, so neighboring bits count as matching,
/// including the wrap-around between bit 7 and bit 0.
fn same_directions(dir1: Direction, dir2: Direction) -> bool {
    let d1 = dir1.bits();
    let d2 = dir2.bits();

    ((d1 | (d1 >> 1)) & d2) != 0
        || ((d2 | (d2 >> 1)) & d1) != 0
        || ((d1 & 0x80) != 0 && (d2 & 0x01) != 0)
        || ((d2 & 0x80) != 0 && (d1 & 0x01) != 0)
}

impl Touchpad {
    /// Sum (or average) of this frame's deltas of all active touches.
    fn get_touches_delta(&self, average: bool) -> NormalizedCoords {
        let mut delta = NormalizedCoords::ZERO;
        let mut nchanged = 0u32;

        for slot in 0..self.num_slots {
            if self.touch_active(slot) && self.touches[slot].dirty {
                nchanged += 1;
                delta += self.normalize_delta(self.touches[slot].raw_delta());
            }
        }

        if !average || nchanged == 0 {
            return delta;
        }

        NormalizedCoords::new(delta.x / nchanged as f64, delta.y / nchanged as f64)
    }

    fn get_combined_touches_delta(&self) -> NormalizedCoords {
        self.get_touches_delta(false)
    }

    fn get_average_touches_delta(&self) -> NormalizedCoords {
        self.get_touches_delta(true)
    }

    fn gesture_get_active_touches(&self, count: usize) -> SmallVec<[usize; 4]> {
        let mut touches = SmallVec::new();

        for slot in 0..self.ntouches {
            if self.touch_active(slot) {
                touches.push(slot);
                if touches.len() == count {
                    break;
                }
            }
        }

        // Fewer touches than the finger count can happen, e.g. first finger
        // in the center (active), second in a button area (inactive), third
        // reported as a fake finger sharing the first one's coordinates.
        touches
    }

    fn gesture_get_direction(&self, slot: usize) -> Direction {
        // Semi-mt touchpads have rather inaccurate coordinates when two
        // fingers are down, so they get a larger threshold. Elantech
        // semi-mt touchpads are accurate enough though.
        let move_threshold =
            if self.semi_mt && !self.model_flags.contains(ModelFlags::ELANTECH) {
                mm_to_normalized(4.0)
            } else {
                mm_to_normalized(1.0)
            };

        let touch = &self.touches[slot];
        let delta = touch.point.delta(touch.gesture_initial);
        let normalized = self.normalize_delta(delta);

        if normalized.length() < move_threshold {
            return Direction::UNDEFINED;
        }

        normalized.direction()
    }

    fn gesture_get_pinch_info(&self) -> (f64, f64, DeviceFloatCoords) {
        let first = &self.touches[self.gesture.touches[0]];
        let second = &self.touches[self.gesture.touches[1]];

        let delta = first.point.delta(second.point);
        let normalized = self.normalize_delta(delta);
        let distance = normalized.length();

        let angle = if self.semi_mt {
            0.0
        } else {
            normalized.y.atan2(normalized.x).to_degrees()
        };

        let center = first.point.average(second.point);

        (distance, angle, center)
    }

    fn gesture_set_scroll_buildup(&mut self) {
        let first = &self.touches[self.gesture.touches[0]];
        let second = &self.touches[self.gesture.touches[1]];

        let d0 = first.point.delta(first.gesture_initial);
        let d1 = second.point.delta(second.gesture_initial);

        self.scroll.buildup = self.normalize_delta(d0.average(d1));
    }

    fn gesture_init_pinch(&mut self) {
        let (distance, angle, center) = self.gesture_get_pinch_info();
        self.gesture.initial_distance = distance;
        self.gesture.angle = angle;
        self.gesture.center = center;
        self.gesture.prev_scale = 1.0;
    }

    /// Posts the begin event for the committed gesture, once.
    fn gesture_start(&mut self, time: u64) {
        if self.gesture.started {
            return;
        }

        let fingers = self.gesture.finger_count as u32;
        match self.gesture.mode {
            GestureMode::None | GestureMode::Unknown => {
                warn!("gesture start in unknown gesture mode");
            }
            // Scroll sequences announce themselves through the axis events.
            GestureMode::Scroll => {}
            GestureMode::Pinch => {
                self.queue
                    .push_back(Event::GesturePinchBegin { time, fingers });
            }
            GestureMode::Swipe => {
                self.queue
                    .push_back(Event::GestureSwipeBegin { time, fingers });
            }
        }

        self.gesture.started = true;
    }

    fn gesture_handle_state_none(&mut self, time: u64) -> GestureMode {
        let touches = self.gesture_get_active_touches(4);
        if touches.len() < 2 {
            return GestureMode::None;
        }

        let mut first = touches[0];
        let mut second = touches[1];

        // For gestures with more than two fingers we cheat: the fingers of
        // a hand roughly line up horizontally and move identically, so the
        // left- and right-most touches are representative of the whole
        // gesture. Fake touches share the position of a real touch, so
        // limiting the search to the real slots loses nothing.
        if touches.len() > 2 {
            second = touches[0];

            for &slot in touches.iter().take(self.num_slots).skip(1) {
                if self.touches[slot].point.x < self.touches[first].point.x {
                    first = slot;
                } else if self.touches[slot].point.x > self.touches[second].point.x {
                    second = slot;
                }
            }

            if first == second {
                return GestureMode::None;
            }
        }

        self.gesture.initial_time = time;
        self.touches[first].gesture_initial = self.touches[first].point;
        self.touches[second].gesture_initial = self.touches[second].point;
        self.gesture.touches = [first, second];

        GestureMode::Unknown
    }

    fn gesture_handle_state_unknown(&mut self, time: u64) -> GestureMode {
        let first = self.gesture.touches[0];
        let second = self.gesture.touches[1];

        // Two fingers resting for a while: assume (slow) scroll.
        if self.gesture.finger_count == 2
            && time >= self.gesture.initial_time + GESTURE_2FG_SCROLL_TIMEOUT
        {
            self.gesture_set_scroll_buildup();
            return GestureMode::Scroll;
        }

        // One finger more than 20mm below the other: thumb-plus-fingers
        // pinch configuration.
        let yres = self.abs_y.resolution;
        let vert_distance = (self.touches[first].point.y - self.touches[second].point.y).abs();
        if vert_distance > 20 * yres && self.gesture.enabled {
            self.gesture_init_pinch();
            return GestureMode::Pinch;
        }

        // Else wait for both fingers to have moved.
        let dir1 = self.gesture_get_direction(first);
        let dir2 = self.gesture_get_direction(second);
        if dir1.is_undefined() || dir2.is_undefined() {
            return GestureMode::Unknown;
        }

        // Matching directions are a scroll or swipe, diverging ones a pinch.
        if same_directions(dir1, dir2) {
            if self.gesture.finger_count == 2 {
                self.gesture_set_scroll_buildup();
                return GestureMode::Scroll;
            } else if self.gesture.enabled {
                return GestureMode::Swipe;
            }
        } else if self.gesture.enabled {
            self.gesture_init_pinch();
            return GestureMode::Pinch;
        }

        GestureMode::Unknown
    }

    fn gesture_handle_state_scroll(&mut self, time: u64) -> GestureMode {
        if self.scroll.method != ScrollMethod::TwoFinger {
            return GestureMode::Scroll;
        }

        let delta = if self.semi_mt {
            // On semi-mt models slot 0 is the more accurate one.
            if !self.touches[0].dirty {
                return GestureMode::Scroll;
            }
            self.normalize_delta(self.touches[0].raw_delta())
        } else {
            self.get_average_touches_delta()
        };

        // Scroll is not accelerated.
        let delta = self.filter.filter_unaccelerated(delta, time);

        if delta.is_zero() {
            return GestureMode::Scroll;
        }

        self.gesture_start(time);
        self.post_scroll(time, delta);

        GestureMode::Scroll
    }

    fn gesture_handle_state_swipe(&mut self, time: u64) -> GestureMode {
        let unaccel = self.get_average_touches_delta();
        let delta = self.filter_motion(unaccel, time);

        if !delta.is_zero() || !unaccel.is_zero() {
            self.gesture_start(time);
            let fingers = self.gesture.finger_count as u32;
            self.queue.push_back(Event::GestureSwipeUpdate {
                time,
                fingers,
                delta,
                unaccel,
            });
        }

        GestureMode::Swipe
    }

    fn gesture_handle_state_pinch(&mut self, time: u64) -> GestureMode {
        let (distance, angle, center) = self.gesture_get_pinch_info();

        let scale = distance / self.gesture.initial_distance;

        let mut angle_delta = angle - self.gesture.angle;
        self.gesture.angle = angle;
        if angle_delta > 180.0 {
            angle_delta -= 360.0;
        } else if angle_delta < -180.0 {
            angle_delta += 360.0;
        }

        let fdelta = center - self.gesture.center;
        self.gesture.center = center;

        let unaccel = self.normalize_delta(fdelta);
        let delta = self.filter_motion(unaccel, time);

        if delta.is_zero()
            && unaccel.is_zero()
            && scale == self.gesture.prev_scale
            && angle_delta == 0.0
        {
            return GestureMode::Pinch;
        }

        self.gesture_start(time);
        let fingers = self.gesture.finger_count as u32;
        self.queue.push_back(Event::GesturePinchUpdate {
            time,
            fingers,
            delta,
            unaccel,
            scale,
            angle_delta,
        });

        self.gesture.prev_scale = scale;

        GestureMode::Pinch
    }

    fn gesture_post_pointer_motion(&mut self, time: u64) {
        // With a clickpad clicked, the motion of all active touches is
        // combined so a drag keeps working while the clicking finger rests.
        let unaccel = if self.buttons.is_clickpad && self.buttons.any_pressed() {
            self.get_combined_touches_delta()
        } else {
            self.get_average_touches_delta()
        };

        let delta = self.filter_motion(unaccel, time);

        if !delta.is_zero() || !unaccel.is_zero() {
            let raw = self.unnormalize_for_xaxis(unaccel);
            self.queue.push_back(Event::PointerMotion {
                time,
                delta,
                unaccel: raw,
            });
        }
    }

    fn gesture_post_gesture(&mut self, time: u64) {
        let oldmode = self.gesture.mode;

        if self.gesture.mode == GestureMode::None {
            self.gesture.mode = self.gesture_handle_state_none(time);
        }

        if self.gesture.mode == GestureMode::Unknown {
            self.gesture.mode = self.gesture_handle_state_unknown(time);
        }

        if self.gesture.mode == GestureMode::Scroll {
            self.gesture.mode = self.gesture_handle_state_scroll(time);
        }

        if self.gesture.mode == GestureMode::Swipe {
            self.gesture.mode = self.gesture_handle_state_swipe(time);
        }

        if self.gesture.mode == GestureMode::Pinch {
            self.gesture.mode = self.gesture_handle_state_pinch(time);
        }

        if oldmode != self.gesture.mode {
            debug!("gesture state: {:?} -> {:?}", oldmode, self.gesture.mode);
        }
    }

    /// Posts this frame's pointer or gesture events.
    pub(super) fn gesture_post_events(&mut self, time: u64) {
        if self.gesture.finger_count == 0 {
            return;
        }

        // When tap-and-dragging, or when a clickpad is clicked, only
        // single-finger motion makes sense.
        if self.tap.is_dragging() || (self.buttons.is_clickpad && self.buttons.any_pressed()) {
            self.gesture_cancel(time);
            self.gesture.finger_count = 1;
            self.gesture.finger_count_pending = 0;
        }

        // Don't send events while unsure which mode we're in.
        if self.gesture.finger_count_pending != 0 {
            return;
        }

        match self.gesture.finger_count {
            1 => self.gesture_post_pointer_motion(time),
            2..=4 => self.gesture_post_gesture(time),
            _ => {}
        }
    }

    pub(super) fn gesture_stop_twofinger_scroll(&mut self, time: u64) {
        if self.scroll.method != ScrollMethod::TwoFinger {
            return;
        }

        self.stop_scroll(time);
    }

    fn gesture_end(&mut self, time: u64, cancelled: bool) {
        let mode = self.gesture.mode;
        self.gesture.mode = GestureMode::None;

        if !self.gesture.started {
            return;
        }

        let fingers = self.gesture.finger_count as u32;
        match mode {
            GestureMode::None | GestureMode::Unknown => {
                warn!("gesture end in unknown gesture mode");
            }
            GestureMode::Scroll => self.gesture_stop_twofinger_scroll(time),
            GestureMode::Pinch => {
                let scale = self.gesture.prev_scale;
                self.queue.push_back(Event::GesturePinchEnd {
                    time,
                    fingers,
                    scale,
                    cancelled,
                });
            }
            GestureMode::Swipe => {
                self.queue.push_back(Event::GestureSwipeEnd {
                    time,
                    fingers,
                    cancelled,
                });
            }
        }

        self.gesture.started = false;
    }

    /// Ends the gesture as cut short; downstream sees a cancelled end event.
    pub(super) fn gesture_cancel(&mut self, time: u64) {
        self.gesture_end(time, true);
    }

    /// Ends the gesture normally.
    pub(super) fn gesture_stop(&mut self, time: u64) {
        self.gesture_end(time, false);
    }

    pub(super) fn gesture_finger_count_switch_timeout(&mut self, now: u64) {
        if self.gesture.finger_count_pending == 0 {
            return;
        }

        // End the current gesture and switch to the settled count.
        self.gesture_cancel(now);
        self.gesture.finger_count = self.gesture.finger_count_pending;
        self.gesture.finger_count_pending = 0;
    }

    /// Tracks active-touch count changes, debouncing them mid-gesture.
    pub(super) fn gesture_handle_state(&mut self, time: u64) {
        let mut active_touches = 0;
        for slot in 0..self.ntouches {
            if self.touch_active(slot) {
                active_touches += 1;
            }
        }

        if active_touches != self.gesture.finger_count {
            if active_touches == 0 {
                // All fingers lifted: end the gesture immediately.
                self.gesture_stop(time);
                self.gesture.finger_count = 0;
                self.gesture.finger_count_pending = 0;
            } else if !self.gesture.started {
                // Switch immediately to avoid initial latency.
                self.gesture.finger_count = active_touches;
                self.gesture.finger_count_pending = 0;
            } else if active_touches != self.gesture.finger_count_pending {
                // Debounce changes mid-gesture.
                self.gesture.finger_count_pending = active_touches;
                self.gesture
                    .finger_count_switch_timer
                    .set(time + GESTURE_SWITCH_TIMEOUT);
            }
        } else {
            self.gesture.finger_count_pending = 0;
        }
    }
}
