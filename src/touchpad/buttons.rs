//! Physical button state and event emission.
//!
//! Software-button areas and clickfinger policy belong to the external
//! buttons subsystem; this module tracks the raw physical button state the
//! core itself needs (clickpad pinning, left-handed emission, forced
//! single-finger mode) and emits the press/release transitions.

use crate::event::{Button, ButtonState, Event};

use super::touch::Touch;
use super::{QueuedEvents, Touchpad};

const BIT_LEFT: u32 = 1 << 0;
const BIT_RIGHT: u32 = 1 << 1;
const BIT_MIDDLE: u32 = 1 << 2;

/// Physical button state of the device.
#[derive(Debug, Clone)]
pub(crate) struct Buttons {
    /// The whole surface is one physical button.
    pub(crate) is_clickpad: bool,
    /// The device has trackpoint buttons above the pad.
    pub(crate) has_top_buttons: bool,
    /// Currently pressed buttons.
    pub(crate) state: u32,
    /// Buttons whose press has been emitted downstream, with the code each
    /// went out as, so its release matches even across a mapping change.
    emitted: [Option<Button>; 3],
    /// Millimeters per device unit, for the unpin distance.
    pub(crate) motion_dist_x: f64,
    pub(crate) motion_dist_y: f64,
}

impl Buttons {
    pub(crate) fn new(is_clickpad: bool, has_top_buttons: bool, res_x: i32, res_y: i32) -> Self {
        Buttons {
            is_clickpad,
            has_top_buttons,
            state: 0,
            emitted: [None; 3],
            motion_dist_x: 1.0 / res_x as f64,
            motion_dist_y: 1.0 / res_y as f64,
        }
    }

    /// Whether any physical button is down.
    pub(crate) fn any_pressed(&self) -> bool {
        self.state != 0
    }
}

fn button_bit(button: Button) -> u32 {
    match button {
        Button::Left => BIT_LEFT,
        Button::Right => BIT_RIGHT,
        Button::Middle => BIT_MIDDLE,
    }
}

impl Touchpad {
    /// Absorbs a physical button change into this frame's state.
    pub(super) fn process_button(&mut self, button: Button, pressed: bool, _time: u64) {
        let bit = button_bit(button);

        if pressed {
            self.buttons.state |= bit;
            self.queued |= QueuedEvents::BUTTON_PRESS;
        } else {
            self.buttons.state &= !bit;
            self.queued |= QueuedEvents::BUTTON_RELEASE;
        }
    }

    /// Button-subsystem part of the active predicate.
    ///
    /// Software-button area policy is external; without it every touch is
    /// acceptable to the buttons subsystem.
    pub(super) fn buttons_touch_active(&self, _touch: &Touch) -> bool {
        true
    }

    /// Runs per-frame button bookkeeping.
    pub(super) fn buttons_handle_state(&mut self, _time: u64) {
        // A pending left-handed change waits until all buttons are released,
        // so a press and its release always carry the same code.
        self.maybe_apply_left_handed();
    }

    /// Emits press/release transitions since the last emission.
    ///
    /// Returns whether button handling requires pointer motion to be
    /// filtered this frame (never, for raw physical buttons).
    pub(super) fn post_button_events(&mut self, time: u64) -> bool {
        for (index, button) in [Button::Left, Button::Middle, Button::Right]
            .into_iter()
            .enumerate()
        {
            let is_down = self.buttons.state & button_bit(button) != 0;

            match (is_down, self.buttons.emitted[index]) {
                (true, None) => {
                    let mapped = self.map_left_handed(button);
                    self.buttons.emitted[index] = Some(mapped);
                    self.notify_button(time, mapped, ButtonState::Pressed);
                }
                (false, Some(mapped)) => {
                    self.buttons.emitted[index] = None;
                    self.notify_button(time, mapped, ButtonState::Released);
                }
                _ => {}
            }
        }

        false
    }

    /// Releases all pressed buttons, e.g. when unrolling state on suspend.
    pub(super) fn release_all_buttons(&mut self, time: u64) {
        if self.buttons.state != 0 {
            self.buttons.state = 0;
            self.queued |= QueuedEvents::BUTTON_RELEASE;
            self.post_button_events(time);
        }
    }

    fn map_left_handed(&self, button: Button) -> Button {
        if self.left_handed.enabled {
            match button {
                Button::Left => Button::Right,
                Button::Right => Button::Left,
                Button::Middle => Button::Middle,
            }
        } else {
            button
        }
    }

    pub(super) fn maybe_apply_left_handed(&mut self) {
        if self.left_handed.want_enabled == self.left_handed.enabled {
            return;
        }

        // Tapping and clickfinger are unaffected by left-handed mode, so
        // physical button state is the only gate.
        if self.buttons.state & (BIT_LEFT | BIT_RIGHT) != 0 {
            return;
        }

        self.left_handed.enabled = self.left_handed.want_enabled;
    }

    pub(super) fn notify_button(&mut self, time: u64, button: Button, state: ButtonState) {
        self.queue.push_back(Event::PointerButton {
            time,
            button,
            state,
        });
    }
}
