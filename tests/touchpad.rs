//! End-to-end touchpad scenarios: pointer motion, scrolling, palm and thumb
//! suppression, typing/trackpoint gates, clickpad pinning and suspension.

mod common;

use common::Device;

use mt_touchpad::config::{ScrollMethod, SendEventsMode, TouchpadConfig};
use mt_touchpad::event::{Axis, AxisSource, Button, ButtonState, Event};

fn pointer_motions(events: &[Event]) -> Vec<(f64, f64)> {
    events
        .iter()
        .filter_map(|event| match event {
            Event::PointerMotion { delta, .. } => Some((delta.x, delta.y)),
            _ => None,
        })
        .collect()
}

fn vertical_axis_values(events: &[Event]) -> Vec<f64> {
    events
        .iter()
        .filter_map(|event| match event {
            Event::PointerAxis {
                axis: Axis::Vertical,
                value,
                source,
                ..
            } => {
                assert_eq!(*source, AxisSource::Finger);
                Some(*value)
            }
            _ => None,
        })
        .collect()
}

fn buttons(events: &[Event]) -> Vec<(Button, ButtonState)> {
    events
        .iter()
        .filter_map(|event| match event {
            Event::PointerButton { button, state, .. } => Some((*button, *state)),
            _ => None,
        })
        .collect()
}

/// Runs a plain two-finger vertical scroll and returns the nonzero vertical
/// axis values.
fn scroll_strokes(dev: &mut Device) -> Vec<f64> {
    dev.touch_down(0, 49.0, 30.0);
    dev.advance_ms(2);
    dev.touch_down(1, 55.0, 30.0);

    for step in 1..=10 {
        dev.advance_ms(10);
        let y = 30.0 + 2.0 * step as f64;
        dev.touch_move(0, 49.0, y);
        dev.touch_move(1, 55.0, y);
    }

    dev.touch_up(0);
    dev.advance_ms(2);
    dev.touch_up(1);

    let events = dev.drain();
    assert!(
        pointer_motions(&events).is_empty(),
        "scroll must not move the pointer"
    );

    let values = vertical_axis_values(&events);
    assert!(!values.is_empty(), "expected vertical axis events");
    assert_eq!(
        *values.last().unwrap(),
        0.0,
        "finger scroll must terminate with a 0 event"
    );

    values.into_iter().filter(|v| *v != 0.0).collect()
}

#[test]
fn single_finger_pointer_motion() {
    let mut dev = Device::new();

    dev.touch_down(0, 30.0, 50.0);
    for step in 1..=8 {
        dev.advance_ms(10);
        dev.touch_move(0, 30.0 + 2.0 * step as f64, 50.0);
    }
    dev.touch_up(0);

    let motions = pointer_motions(&dev.drain());
    assert!(!motions.is_empty());
    for (dx, dy) in motions {
        assert!(dx > 0.0, "expected eastward motion, got dx={dx}");
        assert_eq!(dy, 0.0);
    }
}

#[test]
fn motion_requires_four_history_samples() {
    let mut dev = Device::new();

    dev.touch_down(0, 30.0, 50.0);
    dev.advance_ms(10);
    dev.touch_move(0, 32.0, 50.0);
    dev.advance_ms(10);
    dev.touch_move(0, 34.0, 50.0);

    // Three samples: still no delta.
    assert!(pointer_motions(&dev.drain()).is_empty());

    dev.advance_ms(10);
    dev.touch_move(0, 36.0, 50.0);

    // Fourth sample: the centered difference kicks in.
    assert!(!pointer_motions(&dev.drain()).is_empty());
}

#[test]
fn two_finger_scroll_vertical() {
    let mut dev = Device::new();
    let values = scroll_strokes(&mut dev);
    let total: f64 = values.iter().sum();
    assert!(total > 0.0, "southward scroll must be positive, got {total}");
}

#[test]
fn natural_scroll_inverts_axis_values() {
    let mut config = TouchpadConfig::default();
    config.natural_scroll = true;
    let mut dev = Device::with_config(config);

    let values = scroll_strokes(&mut dev);
    let total: f64 = values.iter().sum();
    assert!(total < 0.0, "natural scroll must invert, got {total}");
}

#[test]
fn natural_scroll_double_toggle_is_identity() {
    let mut dev = Device::new();
    dev.tp.set_natural_scroll(true);
    dev.tp.set_natural_scroll(false);
    assert!(!dev.tp.natural_scroll());

    let values = scroll_strokes(&mut dev);
    assert!(values.iter().sum::<f64>() > 0.0);
}

#[test]
fn palm_on_right_edge_is_ignored() {
    let mut dev = Device::new();

    dev.touch_down(0, 98.0, 30.0);
    for step in 1..=5 {
        dev.advance_ms(10);
        dev.touch_move(0, 98.0, 30.0 + 2.0 * step as f64);
    }
    dev.touch_up(0);

    assert!(pointer_motions(&dev.drain()).is_empty());
}

#[test]
fn touch_exactly_on_left_edge_is_not_palm() {
    let mut dev = Device::new();

    // 5% of the width is the left palm edge; exactly on it is still inside.
    dev.touch_down(0, 5.0, 50.0);
    for step in 1..=6 {
        dev.advance_ms(10);
        dev.touch_move(0, 5.0 + 2.0 * step as f64, 50.0);
    }

    assert!(!pointer_motions(&dev.drain()).is_empty());
}

#[test]
fn edge_palm_crossing_inside_becomes_pointer() {
    let mut dev = Device::new();

    dev.touch_down(0, 98.0, 50.0);
    dev.advance_ms(10);
    assert!(pointer_motions(&dev.drain()).is_empty());

    // Move west into the usable area within the palm timeout.
    for step in 1..=6 {
        dev.touch_move(0, 98.0 - 8.0 * step as f64, 50.0);
        dev.advance_ms(10);
    }

    let motions = pointer_motions(&dev.drain());
    assert!(!motions.is_empty(), "westward escape must free the palm");
    assert!(motions.iter().all(|(dx, _)| *dx < 0.0));
}

#[test]
fn edge_palm_moving_north_stays_palm() {
    let mut dev = Device::new();

    dev.touch_down(0, 98.0, 60.0);
    // North-north-west into the usable area: the motion direction includes
    // due north, so the palm is not released.
    dev.advance_ms(10);
    dev.touch_move(0, 95.0, 45.0);
    for step in 1..=5 {
        dev.advance_ms(10);
        dev.touch_move(0, 95.0, 45.0 - 3.0 * step as f64);
    }
    dev.touch_up(0);

    assert!(pointer_motions(&dev.drain()).is_empty());
}

#[test]
fn dwt_suppresses_touches_while_typing() {
    let mut dev = Device::new();

    const KEY_A: u32 = 30;
    dev.tp.keyboard_key(dev.time, KEY_A, true);
    dev.tp.keyboard_key(dev.time, KEY_A, false);

    dev.advance_ms(50);
    dev.touch_down(0, 40.0, 50.0);
    for step in 1..=5 {
        dev.advance_ms(10);
        dev.touch_move(0, 40.0 + 2.0 * step as f64, 50.0);
    }

    assert!(
        pointer_motions(&dev.drain()).is_empty(),
        "typing must gate the touchpad"
    );

    // Quiet period: the 200ms first-activation deadline passes.
    dev.advance_ms(200);

    for step in 6..=12 {
        dev.advance_ms(10);
        dev.touch_move(0, 40.0 + 2.0 * step as f64, 50.0);
    }

    assert!(
        !pointer_motions(&dev.drain()).is_empty(),
        "pointer motion must resume after the typing deadline"
    );
}

#[test]
fn modifier_keys_do_not_trigger_dwt() {
    let mut dev = Device::new();

    const KEY_LEFTCTRL: u32 = 29;
    dev.tp.keyboard_key(dev.time, KEY_LEFTCTRL, true);

    dev.advance_ms(20);
    dev.touch_down(0, 40.0, 50.0);
    for step in 1..=6 {
        dev.advance_ms(10);
        dev.touch_move(0, 40.0 + 2.0 * step as f64, 50.0);
    }

    assert!(!pointer_motions(&dev.drain()).is_empty());
}

#[test]
fn trackpoint_activity_suppresses_touches() {
    let mut dev = Device::new();

    dev.tp.trackpoint_activity(dev.time, false);

    dev.advance_ms(20);
    dev.touch_down(0, 40.0, 50.0);
    for step in 1..=5 {
        dev.advance_ms(10);
        dev.touch_move(0, 40.0 + 2.0 * step as f64, 50.0);
    }
    assert!(pointer_motions(&dev.drain()).is_empty());

    // 300ms of trackpoint silence releases the touch.
    dev.advance_ms(300);
    for step in 6..=12 {
        dev.advance_ms(10);
        dev.touch_move(0, 40.0 + 2.0 * step as f64, 50.0);
    }
    assert!(!pointer_motions(&dev.drain()).is_empty());
}

#[test]
fn trackpoint_buttons_are_not_activity() {
    let mut dev = Device::new();

    dev.tp.trackpoint_activity(dev.time, true);

    dev.advance_ms(20);
    dev.touch_down(0, 40.0, 50.0);
    for step in 1..=6 {
        dev.advance_ms(10);
        dev.touch_move(0, 40.0 + 2.0 * step as f64, 50.0);
    }
    assert!(!pointer_motions(&dev.drain()).is_empty());
}

#[test]
fn clickpad_click_pins_fingers() {
    let mut dev = Device::new();

    dev.touch_down(0, 50.0, 50.0);
    for step in 1..=5 {
        dev.advance_ms(10);
        dev.touch_move(0, 50.0 + 2.0 * step as f64, 50.0);
    }
    dev.drain();

    dev.advance_ms(10);
    dev.click(true);
    assert_eq!(
        buttons(&dev.drain()),
        vec![(Button::Left, ButtonState::Pressed)]
    );

    // Wiggling within the pin radius produces no motion.
    dev.advance_ms(10);
    dev.touch_move(0, 60.6, 50.0);
    dev.advance_ms(10);
    dev.touch_move(0, 60.0, 50.0);
    assert!(pointer_motions(&dev.drain()).is_empty());

    // Moving past the pin radius unpins and drags.
    dev.advance_ms(10);
    dev.touch_move(0, 66.0, 50.0);
    dev.advance_ms(10);
    dev.touch_move(0, 70.0, 50.0);
    assert!(!pointer_motions(&dev.drain()).is_empty());

    dev.advance_ms(10);
    dev.click(false);
    assert_eq!(
        buttons(&dev.drain()),
        vec![(Button::Left, ButtonState::Released)]
    );
}

#[test]
fn left_handed_swaps_buttons() {
    let mut dev = Device::new();

    dev.tp.set_left_handed(true);
    dev.click(true);
    dev.advance_ms(10);
    dev.click(false);

    assert_eq!(
        buttons(&dev.drain()),
        vec![
            (Button::Right, ButtonState::Pressed),
            (Button::Right, ButtonState::Released),
        ]
    );
}

#[test]
fn left_handed_double_toggle_is_identity() {
    let mut dev = Device::new();

    dev.tp.set_left_handed(true);
    dev.tp.set_left_handed(false);

    dev.click(true);
    dev.advance_ms(10);
    dev.click(false);

    assert_eq!(
        buttons(&dev.drain()),
        vec![
            (Button::Left, ButtonState::Pressed),
            (Button::Left, ButtonState::Released),
        ]
    );
}

#[test]
fn left_handed_change_defers_until_release() {
    let mut dev = Device::new();

    dev.click(true);
    dev.drain();

    // The mapping change while the button is held must not split the
    // press/release pair.
    dev.tp.set_left_handed(true);
    dev.advance_ms(10);
    dev.click(false);
    assert_eq!(
        buttons(&dev.drain()),
        vec![(Button::Left, ButtonState::Released)]
    );

    // The next click uses the new mapping.
    dev.advance_ms(10);
    dev.click(true);
    dev.advance_ms(10);
    dev.click(false);
    assert_eq!(
        buttons(&dev.drain()),
        vec![
            (Button::Right, ButtonState::Pressed),
            (Button::Right, ButtonState::Released),
        ]
    );
}

#[test]
fn thumb_by_pressure_is_ignored() {
    let mut dev = Device::new();

    dev.touch_down_with_pressure(0, 50.0, 90.0, 150);
    for step in 1..=6 {
        dev.advance_ms(10);
        dev.touch_move(0, 50.0 + 2.0 * step as f64, 90.0);
    }
    dev.touch_up(0);

    assert!(pointer_motions(&dev.drain()).is_empty());
}

#[test]
fn thumb_by_lingering_at_bottom_is_ignored() {
    let mut dev = Device::new();

    dev.touch_down(0, 50.0, 92.0);
    dev.advance_ms(350);
    for step in 1..=6 {
        dev.touch_move(0, 50.0 + 2.0 * step as f64, 92.0);
        dev.advance_ms(10);
    }
    dev.touch_up(0);

    assert!(pointer_motions(&dev.drain()).is_empty());
}

#[test]
fn suspend_resume_without_events_is_silent() {
    let mut dev = Device::new();

    dev.tp.suspend(dev.time);
    dev.advance_ms(10);
    dev.tp.resume(dev.time);

    dev.assert_empty_queue();
}

#[test]
fn suspended_touchpad_emits_nothing() {
    let mut dev = Device::new();

    dev.tp.suspend(dev.time);

    dev.touch_down(0, 30.0, 50.0);
    for step in 1..=6 {
        dev.advance_ms(10);
        dev.touch_move(0, 30.0 + 2.0 * step as f64, 50.0);
    }
    dev.touch_up(0);
    dev.assert_empty_queue();

    dev.tp.resume(dev.time);
    dev.advance_ms(10);

    dev.touch_down(0, 30.0, 50.0);
    for step in 1..=8 {
        dev.advance_ms(10);
        dev.touch_move(0, 30.0 + 2.0 * step as f64, 50.0);
    }
    assert!(!pointer_motions(&dev.drain()).is_empty());
}

#[test]
fn disabled_on_external_mouse() {
    let mut dev = Device::new();

    dev.tp
        .set_send_events_mode(SendEventsMode::DisabledOnExternalMouse, dev.time);
    dev.tp.external_mouse_added(dev.time);

    dev.touch_down(0, 30.0, 50.0);
    for step in 1..=6 {
        dev.advance_ms(10);
        dev.touch_move(0, 30.0 + 2.0 * step as f64, 50.0);
    }
    dev.touch_up(0);
    dev.assert_empty_queue();

    dev.tp.external_mouse_removed(dev.time);
    dev.advance_ms(10);

    dev.touch_down(0, 30.0, 50.0);
    for step in 1..=8 {
        dev.advance_ms(10);
        dev.touch_move(0, 30.0 + 2.0 * step as f64, 50.0);
    }
    assert!(!pointer_motions(&dev.drain()).is_empty());
}

#[test]
fn scroll_method_none_disables_scrolling() {
    let mut config = TouchpadConfig::default();
    config.scroll_method = ScrollMethod::NoScroll;
    let mut dev = Device::with_config(config);

    dev.touch_down(0, 49.0, 30.0);
    dev.advance_ms(2);
    dev.touch_down(1, 55.0, 30.0);
    for step in 1..=8 {
        dev.advance_ms(10);
        let y = 30.0 + 2.0 * step as f64;
        dev.touch_move(0, 49.0, y);
        dev.touch_move(1, 55.0, y);
    }

    let events = dev.drain();
    assert!(vertical_axis_values(&events).is_empty());
    assert!(pointer_motions(&events).is_empty());
}
