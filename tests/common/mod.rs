//! A simulated touchpad device for end-to-end tests.
//!
//! Mirrors how the kernel delivers state for a multi-touch clickpad: slot
//! addressing, tracking ids, tool-count bits and sync reports. Positions are
//! given in percent of the touchpad size, times advance explicitly.
#![allow(dead_code)]

use mt_touchpad::config::TouchpadConfig;
use mt_touchpad::device::{AbsInfo, DeviceDescription};
use mt_touchpad::event::Event;
use mt_touchpad::touchpad::{AbsAxis, InputEvent, KeyCode, Touchpad};

/// 100mm x 50mm at 40 units/mm.
pub const ABS_X: AbsInfo = AbsInfo {
    minimum: 0,
    maximum: 4000,
    resolution: 40,
};
pub const ABS_Y: AbsInfo = AbsInfo {
    minimum: 0,
    maximum: 2000,
    resolution: 40,
};

pub const DEFAULT_PRESSURE: i32 = 30;

/// Opt-in log capture: run with `RUST_LOG=mt_touchpad=debug` to see the
/// classifier and gesture state transitions of a failing test.
fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub struct Device {
    pub tp: Touchpad,
    pub time: u64,
    slots: Vec<Option<i32>>,
    /// Finger count currently advertised through the tool bits.
    tool_count: usize,
    next_tracking_id: i32,
}

#[allow(dead_code)]
impl Device {
    pub fn new() -> Device {
        Device::with_config(TouchpadConfig::default())
    }

    pub fn with_config(config: TouchpadConfig) -> Device {
        Device::with_description(Device::description(), config)
    }

    pub fn with_description(description: DeviceDescription, config: TouchpadConfig) -> Device {
        init_logging();

        let slots = description.mt_slots.unwrap_or(1);
        Device {
            tp: Touchpad::new(&description, config).expect("simulated device is sane"),
            // Not starting at 0 keeps "time 0" sentinels out of the way,
            // like a device that has been running for a second.
            time: 1_000_000,
            slots: vec![None; slots],
            tool_count: 0,
            next_tracking_id: 1,
        }
    }

    pub fn description() -> DeviceDescription {
        let mut description = DeviceDescription::new("test clickpad", ABS_X, ABS_Y, 5);
        description.pressure = Some(AbsInfo {
            minimum: 0,
            maximum: 255,
            resolution: 0,
        });
        description
    }

    pub fn x(pct: f64) -> i32 {
        ABS_X.minimum + (pct / 100.0 * (ABS_X.maximum - ABS_X.minimum) as f64) as i32
    }

    pub fn y(pct: f64) -> i32 {
        ABS_Y.minimum + (pct / 100.0 * (ABS_Y.maximum - ABS_Y.minimum) as f64) as i32
    }

    /// Advances time and delivers any timer deadline that passed.
    pub fn advance_ms(&mut self, ms: u64) {
        self.time += ms * 1000;
        self.tp.dispatch_timers(self.time);
    }

    fn send(&mut self, event: InputEvent) {
        self.tp.process_event(self.time, event);
    }

    /// Sends a bare absolute event without closing the frame.
    pub fn abs(&mut self, axis: AbsAxis, value: i32) {
        self.send(InputEvent::Absolute { axis, value });
    }

    /// Sends a bare key event without closing the frame.
    pub fn key(&mut self, code: KeyCode, pressed: bool) {
        self.send(InputEvent::Key { code, pressed });
    }

    /// Closes the frame; an empty frame is valid and just runs the pipeline.
    pub fn sync(&mut self) {
        self.send(InputEvent::SynReport);
    }

    fn fingers_down(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    fn tool_code(count: usize) -> Option<KeyCode> {
        match count {
            0 => None,
            1 => Some(KeyCode::ToolFinger),
            2 => Some(KeyCode::ToolDoubleTap),
            3 => Some(KeyCode::ToolTripleTap),
            4 => Some(KeyCode::ToolQuadTap),
            _ => Some(KeyCode::ToolQuintTap),
        }
    }

    fn update_tool_state(&mut self, new: usize) {
        let old = self.tool_count;
        if old == new {
            return;
        }
        self.tool_count = new;

        if let Some(code) = Device::tool_code(old) {
            self.key(code, false);
        }
        if let Some(code) = Device::tool_code(new) {
            self.key(code, true);
        }

        if old == 0 && new > 0 {
            self.key(KeyCode::ButtonTouch, true);
        } else if new == 0 {
            self.key(KeyCode::ButtonTouch, false);
        }
    }

    pub fn touch_down(&mut self, slot: usize, x_pct: f64, y_pct: f64) {
        self.touch_down_with_pressure(slot, x_pct, y_pct, DEFAULT_PRESSURE);
    }

    pub fn touch_down_with_pressure(&mut self, slot: usize, x_pct: f64, y_pct: f64, pressure: i32) {
        let id = self.next_tracking_id;
        self.next_tracking_id += 1;
        self.slots[slot] = Some(id);

        self.abs(AbsAxis::MtSlot, slot as i32);
        self.abs(AbsAxis::MtTrackingId, id);
        self.abs(AbsAxis::MtPositionX, Device::x(x_pct));
        self.abs(AbsAxis::MtPositionY, Device::y(y_pct));
        self.abs(AbsAxis::MtPressure, pressure);
        self.update_tool_state(self.fingers_down());
        self.sync();
    }

    pub fn touch_move(&mut self, slot: usize, x_pct: f64, y_pct: f64) {
        assert!(self.slots[slot].is_some(), "slot {slot} is not down");
        self.abs(AbsAxis::MtSlot, slot as i32);
        self.abs(AbsAxis::MtPositionX, Device::x(x_pct));
        self.abs(AbsAxis::MtPositionY, Device::y(y_pct));
        self.sync();
    }

    pub fn touch_up(&mut self, slot: usize) {
        self.slots[slot] = None;

        self.abs(AbsAxis::MtSlot, slot as i32);
        self.abs(AbsAxis::MtTrackingId, -1);
        self.update_tool_state(self.fingers_down());
        self.sync();
    }

    /// Overrides the reported tool count without changing real touches,
    /// like devices that report more fingers than they have slots for.
    pub fn set_tool_count(&mut self, count: usize) {
        self.update_tool_state(count);
        self.sync();
    }

    pub fn click(&mut self, pressed: bool) {
        self.key(KeyCode::ButtonLeft, pressed);
        self.sync();
    }

    pub fn drain(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Some(event) = self.tp.poll_event() {
            events.push(event);
        }
        events
    }

    /// Asserts that no events at all are pending.
    pub fn assert_empty_queue(&mut self) {
        let events = self.drain();
        assert!(events.is_empty(), "unexpected events: {events:?}");
    }
}
