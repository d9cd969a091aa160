//! Disable-while-typing and trackpoint suppression.
//!
//! Keyboard and trackpoint activity arrive through side channels rather
//! than the touchpad's own event stream. While either is active, gestures
//! and scrolling are cancelled, tapping is suspended, and new touches are
//! tagged as palms until the activity deadline runs out.

use tracing::debug;

use crate::utils::time::ms2us;
use crate::utils::timer::Timer;

use super::Touchpad;

pub(super) const TRACKPOINT_ACTIVITY_TIMEOUT: u64 = ms2us(300);
/// Deadline after the first keypress of a typing burst.
pub(super) const KEYBOARD_ACTIVITY_TIMEOUT_1: u64 = ms2us(200);
/// Deadline while typing is ongoing.
pub(super) const KEYBOARD_ACTIVITY_TIMEOUT_2: u64 = ms2us(500);

// The modifier set that never counts as typing, so ctrl-click, alt-tab and
// friends stay responsive.
const KEY_TAB: u32 = 15;
const KEY_LEFTCTRL: u32 = 29;
const KEY_LEFTSHIFT: u32 = 42;
const KEY_RIGHTSHIFT: u32 = 54;
const KEY_LEFTALT: u32 = 56;
const KEY_CAPSLOCK: u32 = 58;
const KEY_F1: u32 = 59;
const KEY_RIGHTCTRL: u32 = 97;
const KEY_RIGHTALT: u32 = 100;
const KEY_LEFTMETA: u32 = 125;
const KEY_RIGHTMETA: u32 = 126;
const KEY_COMPOSE: u32 = 127;
const KEY_FN: u32 = 0x1d0;

#[derive(Debug, Clone, Default)]
pub(crate) struct DwtState {
    pub(crate) enabled: bool,
    pub(crate) keyboard_active: bool,
    pub(crate) keyboard_last_press_time: u64,
    pub(crate) keyboard_timer: Timer,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct TrackpointState {
    /// Whether trackpoint palm monitoring is enabled for this device.
    pub(crate) monitor: bool,
    pub(crate) active: bool,
    pub(crate) last_event_time: u64,
    pub(crate) timer: Timer,
}

/// Keys that do not trigger disable-while-typing: modifiers, and everything
/// outside the typewriter set (F-keys, multimedia, numpad...).
fn key_ignored_for_dwt(keycode: u32) -> bool {
    match keycode {
        KEY_LEFTCTRL | KEY_RIGHTCTRL | KEY_LEFTALT | KEY_RIGHTALT | KEY_LEFTSHIFT
        | KEY_RIGHTSHIFT | KEY_FN | KEY_CAPSLOCK | KEY_TAB | KEY_COMPOSE | KEY_RIGHTMETA
        | KEY_LEFTMETA => true,
        keycode => keycode >= KEY_F1,
    }
}

impl Touchpad {
    /// Feeds a key event from the paired keyboard into typing detection.
    ///
    /// Call this for every key event of the keyboard associated with the
    /// touchpad. Only presses of typewriter keys arm the typing deadline;
    /// modifiers and keys above F1 in the evdev keymap are ignored so
    /// ctrl-click and shortcuts keep working.
    pub fn keyboard_key(&mut self, time: u64, keycode: u32, pressed: bool) {
        if !self.dwt.enabled {
            return;
        }

        // Only key down arms the timer.
        if !pressed {
            return;
        }

        if key_ignored_for_dwt(keycode) {
            return;
        }

        let timeout = if !self.dwt.keyboard_active {
            self.edge_scroll.stop_events(time);
            self.gesture_cancel(time);
            self.tap.suspend(time);
            self.dwt.keyboard_active = true;
            KEYBOARD_ACTIVITY_TIMEOUT_1
        } else {
            KEYBOARD_ACTIVITY_TIMEOUT_2
        };

        self.dwt.keyboard_last_press_time = time;
        self.dwt.keyboard_timer.set(time + timeout);
    }

    pub(super) fn keyboard_timeout(&mut self, now: u64) {
        self.tap.resume(now);
        self.dwt.keyboard_active = false;

        debug!("palm: keyboard timeout");
    }

    /// Feeds activity of the paired trackpoint into palm suppression.
    ///
    /// Buttons do not count as trackpoint activity, as people may use the
    /// trackpoint buttons in combination with the touchpad.
    pub fn trackpoint_activity(&mut self, time: u64, is_button: bool) {
        if !self.trackpoint.monitor {
            return;
        }

        if is_button {
            return;
        }

        if !self.trackpoint.active {
            self.edge_scroll.stop_events(time);
            self.gesture_cancel(time);
            self.tap.suspend(time);
            self.trackpoint.active = true;
        }

        self.trackpoint.last_event_time = time;
        self.trackpoint
            .timer
            .set(time + TRACKPOINT_ACTIVITY_TIMEOUT);
    }

    pub(super) fn trackpoint_timeout(&mut self, now: u64) {
        self.tap.resume(now);
        self.trackpoint.active = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modifiers_are_ignored() {
        assert!(key_ignored_for_dwt(KEY_LEFTCTRL));
        assert!(key_ignored_for_dwt(KEY_RIGHTMETA));
        assert!(key_ignored_for_dwt(KEY_TAB));
    }

    #[test]
    fn function_and_media_keys_are_ignored() {
        assert!(key_ignored_for_dwt(KEY_F1));
        assert!(key_ignored_for_dwt(103)); // KEY_UP
        assert!(key_ignored_for_dwt(464)); // KEY_FN
    }

    #[test]
    fn typewriter_keys_trigger() {
        assert!(!key_ignored_for_dwt(30)); // KEY_A
        assert!(!key_ignored_for_dwt(57)); // KEY_SPACE
        assert!(!key_ignored_for_dwt(28)); // KEY_ENTER
    }
}
