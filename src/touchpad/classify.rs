//! Per-touch classifiers: palm, thumb, and pinned-finger detection.
//!
//! Each classifier is idempotent within a frame and runs from the frame
//! pipeline after a touch has been updated. Precedence on disagreement:
//! a palm always wins over a thumb (palm touches are ignored outright), a
//! pin wins over pointer motion but not over gesture entry, since pins are
//! lifted again once the finger moves far enough.

use tracing::debug;

use crate::config::ScrollMethod;
use crate::utils::time::ms2us;
use crate::utils::{mm_to_normalized, Direction, NormalizedCoords};

use super::touch::{PalmState, ThumbState, Touch, TouchState};
use super::Touchpad;

/// How long an edge palm has to move back inside to be un-tagged.
const PALM_TIMEOUT: u64 = ms2us(200);
/// A finger lingering below the lower thumb line this long becomes a thumb.
const THUMB_MOVE_TIMEOUT: u64 = ms2us(300);

/// Geometry and state of palm detection.
#[derive(Debug, Clone)]
pub(crate) struct PalmConfig {
    /// Left edge of the usable area; palms start at or left of it.
    pub(crate) left_edge: i32,
    /// Right edge of the usable area.
    pub(crate) right_edge: i32,
    /// Vertical center; palm-taps only count in the northern half.
    pub(crate) vert_center: i32,
}

impl Default for PalmConfig {
    fn default() -> Self {
        // Palm detection disabled: no touch is ever outside these.
        PalmConfig {
            left_edge: i32::MIN,
            right_edge: i32::MAX,
            vert_center: i32::MIN,
        }
    }
}

/// Geometry of thumb detection.
#[derive(Debug, Clone)]
pub(crate) struct ThumbConfig {
    pub(crate) detect_thumbs: bool,
    /// Above this line a touch can never become a thumb.
    pub(crate) upper_thumb_line: i32,
    /// Below this line a lingering touch becomes a thumb.
    pub(crate) lower_thumb_line: i32,
    /// Pressure above this is a thumb outright.
    pub(crate) pressure_threshold: i32,
}

impl Default for ThumbConfig {
    fn default() -> Self {
        ThumbConfig {
            detect_thumbs: false,
            upper_thumb_line: 0,
            lower_thumb_line: 0,
            pressure_threshold: i32::MAX,
        }
    }
}

impl Touchpad {
    /// Whether this touch is eligible for pointer motion and gestures.
    pub(super) fn touch_active(&self, slot: usize) -> bool {
        let touch = &self.touches[slot];

        matches!(touch.state, TouchState::Begin | TouchState::Update)
            && touch.palm.state == PalmState::None
            && !touch.pinned.is_pinned
            && touch.thumb.state != ThumbState::Yes
            && self.buttons_touch_active(touch)
            && self.edge_scroll.touch_active(touch)
    }

    /// Whether a tap of this touch should be treated as a palm.
    ///
    /// Intended for the tap peer: a touch beginning in the edge exclusion
    /// zone and in the northern half of the pad is a resting palm, not a tap.
    pub fn palm_tap_is_palm(&self, touch: &Touch) -> bool {
        if touch.state != TouchState::Begin {
            return false;
        }

        if touch.point.x > self.palm.left_edge && touch.point.x < self.palm.right_edge {
            return false;
        }

        if touch.point.y < self.palm.vert_center {
            debug!("palm: palm-tap detected");
            return true;
        }

        false
    }

    fn palm_detect_dwt(&mut self, slot: usize, _time: u64) -> bool {
        let keyboard_active = self.dwt.keyboard_active;
        let last_press = self.dwt.keyboard_last_press_time;
        let touch = &mut self.touches[slot];

        if self.dwt.enabled && keyboard_active && touch.state == TouchState::Begin {
            touch.palm.state = PalmState::Typing;
            touch.palm.first = touch.point;
            return true;
        } else if !keyboard_active
            && touch.state == TouchState::Update
            && touch.palm.state == PalmState::Typing
        {
            // A touch that started before the first or after the last key
            // press is released on timeout: a palm resting while typing
            // stays ignored, a touch started once typing stops gets to
            // control the pointer.
            if touch.palm.time == 0 || touch.palm.time >= last_press {
                touch.palm.state = PalmState::None;
                debug!("palm: touch released, timeout after typing");
            }
        }

        false
    }

    fn palm_detect_trackpoint(&mut self, slot: usize, _time: u64) -> bool {
        if !self.trackpoint.monitor {
            return false;
        }

        let trackpoint_active = self.trackpoint.active;
        let last_event = self.trackpoint.last_event_time;
        let touch = &mut self.touches[slot];

        if touch.palm.state == PalmState::None
            && touch.state == TouchState::Begin
            && trackpoint_active
        {
            touch.palm.state = PalmState::Trackpoint;
            return true;
        } else if touch.palm.state == PalmState::Trackpoint
            && touch.state == TouchState::Update
            && !trackpoint_active
        {
            if touch.palm.time == 0 || touch.palm.time >= last_event {
                touch.palm.state = PalmState::None;
                debug!("palm: touch released, timeout after trackpoint");
            }
        }

        false
    }

    pub(super) fn palm_detect(&mut self, slot: usize, time: u64) {
        const DIRECTIONS: Direction = Direction::NE
            .union(Direction::E)
            .union(Direction::SE)
            .union(Direction::SW)
            .union(Direction::W)
            .union(Direction::NW);

        if self.palm_detect_dwt(slot, time) {
            debug!("palm: palm detected (typing)");
            return;
        }

        if self.palm_detect_trackpoint(slot, time) {
            debug!("palm: palm detected (trackpoint)");
            return;
        }

        let left_edge = self.palm.left_edge;
        let right_edge = self.palm.right_edge;
        let x_scale = self.x_scale_coeff;
        let y_scale = self.y_scale_coeff;

        let touch = &mut self.touches[slot];

        // A tagged palm is un-tagged when it moves out of the edge zone
        // within the timeout, provided the motion is within 45 degrees of
        // the horizontal.
        if touch.palm.state == PalmState::Edge {
            if time < touch.palm.time + PALM_TIMEOUT
                && touch.point.x >= left_edge
                && touch.point.x <= right_edge
            {
                let delta = touch.point.delta(touch.palm.first);
                let dirs = NormalizedCoords::new(delta.x * x_scale, delta.y * y_scale)
                    .direction();
                if dirs.intersects(DIRECTIONS) && (dirs - DIRECTIONS).is_empty() {
                    touch.palm.state = PalmState::None;
                    debug!("palm: touch released, out of edge zone");
                }
            }
            return;
        }

        // A palm must start in the exclusion zone; moving into the zone
        // later is fine.
        if touch.state != TouchState::Begin
            || (touch.point.x >= left_edge && touch.point.x <= right_edge)
        {
            return;
        }

        // Legitimate touches often start in the area covered by the
        // exclusion zone on clickpads with software buttons.
        if self.buttons.is_clickpad && self.buttons_is_inside_softbutton_area(&self.touches[slot]) {
            return;
        }

        if self.edge_scroll.touch_in_right_edge(&self.touches[slot]) {
            return;
        }

        let touch = &mut self.touches[slot];
        touch.palm.state = PalmState::Edge;
        touch.palm.time = time;
        touch.palm.first = touch.point;

        debug!("palm: palm detected (edge)");
    }

    /// Software-button-area check for palm exclusion.
    ///
    /// Button area policy lives in the external buttons subsystem; without
    /// it no area is excluded.
    fn buttons_is_inside_softbutton_area(&self, _touch: &Touch) -> bool {
        false
    }

    pub(super) fn thumb_detect(&mut self, slot: usize, time: u64) {
        let upper_line = self.thumb.upper_thumb_line;
        let lower_line = self.thumb.lower_thumb_line;
        let pressure_threshold = self.thumb.pressure_threshold;
        let edge_scroll_active = self.scroll.method == ScrollMethod::Edge;
        let x_scale = self.x_scale_coeff;
        let y_scale = self.y_scale_coeff;

        let touch = &mut self.touches[slot];

        // Once a thumb always a thumb, once ruled out always ruled out.
        if !self.thumb.detect_thumbs || touch.thumb.state != ThumbState::Maybe {
            return;
        }

        let state = touch.thumb.state;

        if touch.point.y < upper_line {
            // A potential thumb above the line never labels as thumb.
            touch.thumb.state = ThumbState::No;
        } else {
            // A thumb that moves more than 7mm is not a resting thumb.
            if touch.state == TouchState::Begin {
                touch.thumb.initial = touch.point;
            } else if touch.state == TouchState::Update {
                let delta = touch.point.delta(touch.thumb.initial);
                let normalized =
                    NormalizedCoords::new(delta.x * x_scale, delta.y * y_scale);
                if normalized.length() > mm_to_normalized(7.0) {
                    touch.thumb.state = ThumbState::No;
                }
            }

            // A thumb at the very edge of the touchpad has too little
            // surface area to trip the pressure threshold, hence the
            // two-stage detection: pressure, and time spent at the very
            // bottom of the pad.
            if touch.thumb.state == ThumbState::Maybe {
                if touch.pressure > pressure_threshold {
                    touch.thumb.state = ThumbState::Yes;
                } else if touch.point.y > lower_line
                    && !edge_scroll_active
                    && touch.thumb.first_touch_time + THUMB_MOVE_TIMEOUT < time
                {
                    touch.thumb.state = ThumbState::Yes;
                }
            }
        }

        if touch.thumb.state != state {
            debug!(
                "thumb state: {:?} -> {:?}",
                state, touch.thumb.state
            );
        }
    }

    /// Lifts the pin of a finger that moved away from its pin center.
    pub(super) fn unpin_finger(&mut self, slot: usize) {
        let motion_dist_x = self.buttons.motion_dist_x;
        let motion_dist_y = self.buttons.motion_dist_y;
        let touch = &mut self.touches[slot];

        if !touch.pinned.is_pinned {
            return;
        }

        let xdist = (touch.point.x - touch.pinned.center.x).abs() as f64 * motion_dist_x;
        let ydist = (touch.point.y - touch.pinned.center.y).abs() as f64 * motion_dist_y;

        // 1.5mm of movement: unpin, so drag-and-drop stays possible.
        if xdist.hypot(ydist) >= 1.5 {
            touch.pinned.is_pinned = false;
        }
    }

    /// Pins every touch at its current position.
    ///
    /// Done on a clickpad's physical button press so the clicking finger
    /// does not produce spurious pointer motion.
    pub(super) fn pin_fingers(&mut self) {
        for touch in &mut self.touches {
            touch.pinned.is_pinned = true;
            touch.pinned.center = touch.point;
        }
    }
}
