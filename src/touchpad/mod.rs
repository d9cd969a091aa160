//! The touchpad dispatch: slot table, frame assembler and frame pipeline.
//!
//! A [`Touchpad`] owns the complete state of one device: the per-slot touch
//! table, the gesture machine, the acceleration filter and the typing/
//! trackpoint suppression gates. Raw events accumulate between two
//! synchronization reports; the sync report runs the frame pipeline in a
//! fixed order and queues the resulting output events.
//!
//! Nothing here blocks or yields: a frame runs to completion, and the only
//! suspension points are the returns to the embedding event loop between
//! frames and between timer deliveries.

mod buttons;
mod classify;
mod dwt;
mod gestures;
mod peers;
mod scroll;
mod touch;

pub use self::peers::{EdgeScrollPeer, NoEdgeScroll, NoTap, TapPeer};
pub use self::touch::{PalmState, ThumbState, Touch, TouchState};

use std::collections::VecDeque;

use tracing::{debug, info, warn};

use crate::config::{ScrollMethod, SendEventsMode, TouchpadConfig};
use crate::device::{AbsInfo, DeviceDescription, DeviceError, ModelFlags};
use crate::event::{Button, Event};
use crate::filter::{MotionFilter, PointerAccelerator};
use crate::utils::{DeviceCoords, DeviceFloatCoords, NormalizedCoords, DEFAULT_MOUSE_DPI};

use self::buttons::Buttons;
use self::classify::{PalmConfig, ThumbConfig};
use self::dwt::{DwtState, TrackpointState};
use self::gestures::GestureState;
use self::scroll::ScrollState;

/// Absolute axes of the input contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbsAxis {
    /// `ABS_X`: single-touch x position.
    X,
    /// `ABS_Y`: single-touch y position.
    Y,
    /// `ABS_MT_SLOT`: selects the slot subsequent MT events apply to.
    MtSlot,
    /// `ABS_MT_POSITION_X`: per-slot x position.
    MtPositionX,
    /// `ABS_MT_POSITION_Y`: per-slot y position.
    MtPositionY,
    /// `ABS_MT_TRACKING_ID`: per-slot sequence id; -1 ends the sequence.
    MtTrackingId,
    /// `ABS_MT_PRESSURE`: per-slot pressure.
    MtPressure,
    /// `ABS_MT_DISTANCE`: per-slot hover distance.
    MtDistance,
}

/// Key codes of the input contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCode {
    /// `BTN_LEFT`.
    ButtonLeft,
    /// `BTN_MIDDLE`.
    ButtonMiddle,
    /// `BTN_RIGHT`.
    ButtonRight,
    /// `BTN_TOUCH`: at least one finger is touching.
    ButtonTouch,
    /// `BTN_TOOL_FINGER`: exactly one finger.
    ToolFinger,
    /// `BTN_TOOL_DOUBLETAP`: exactly two fingers.
    ToolDoubleTap,
    /// `BTN_TOOL_TRIPLETAP`: exactly three fingers.
    ToolTripleTap,
    /// `BTN_TOOL_QUADTAP`: exactly four fingers.
    ToolQuadTap,
    /// `BTN_TOOL_QUINTTAP`: five or more fingers.
    ToolQuintTap,
}

/// One typed event from the kernel stream.
///
/// Timestamps travel separately: see [`Touchpad::process_event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    /// An absolute axis changed.
    Absolute {
        /// The changed axis.
        axis: AbsAxis,
        /// New axis value.
        value: i32,
    },
    /// A button or tool-count key changed.
    Key {
        /// The changed key.
        code: KeyCode,
        /// Pressed or released.
        pressed: bool,
    },
    /// End of frame; all events since the last report form one state.
    SynReport,
}

bitflags::bitflags! {
    /// Kinds of events that arrived within the current frame.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    struct QueuedEvents: u32 {
        const MOTION = 1 << 0;
        const BUTTON_PRESS = 1 << 1;
        const BUTTON_RELEASE = 1 << 2;
    }
}

/// `BTN_TOOL_QUINTTAP` sets this instead of a counted bit: six or more
/// fingers may be down, the exact count is unknown.
const FAKE_FINGER_OVERFLOW: u32 = 1 << 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FakeFingerCount {
    Count(usize),
    Overflow,
}

#[derive(Debug, Clone, Copy, Default)]
struct LeftHanded {
    enabled: bool,
    want_enabled: bool,
}

#[derive(Debug, Clone, Copy)]
struct SendEvents {
    current_mode: SendEventsMode,
    external_mice: usize,
}

/// Per-device touchpad event processing.
///
/// See the [crate documentation](crate) for the data flow. All `time`/`now`
/// parameters are microseconds on the monotonic clock, taken from the event
/// being processed (or the deadline being delivered), never from a wall
/// clock.
#[derive(Debug)]
pub struct Touchpad {
    name: String,

    abs_x: AbsInfo,
    abs_y: AbsInfo,
    has_mt: bool,
    semi_mt: bool,
    reports_distance: bool,
    model_flags: ModelFlags,

    /// Real hardware slots.
    num_slots: usize,
    /// Highest finger count we can keep state for.
    ntouches: usize,
    /// Slot currently addressed by MT events.
    slot: usize,
    touches: Vec<Touch>,

    nfingers_down: usize,
    old_nfingers_down: usize,
    fake_touches: u32,
    fake_overflow_logged: bool,
    queued: QueuedEvents,

    hysteresis_margin: DeviceCoords,
    x_scale_coeff: f64,
    y_scale_coeff: f64,

    filter: Box<dyn MotionFilter>,

    palm: PalmConfig,
    thumb: ThumbConfig,
    dwt: DwtState,
    trackpoint: TrackpointState,
    gesture: GestureState,
    scroll: ScrollState,
    buttons: Buttons,
    left_handed: LeftHanded,
    sendevents: SendEvents,
    suspended: bool,

    tap: Box<dyn TapPeer>,
    edge_scroll: Box<dyn EdgeScrollPeer>,

    queue: VecDeque<Event>,
}

impl Touchpad {
    /// Creates the processing state for one touchpad device.
    ///
    /// Rejects devices that fail the touchpad sanity checks (missing
    /// absolute axes, `BTN_TOUCH` or `BTN_TOOL_FINGER`); such a device is a
    /// kernel driver bug and cannot be handled.
    pub fn new(
        description: &DeviceDescription,
        config: TouchpadConfig,
    ) -> Result<Touchpad, DeviceError> {
        let (mut abs_x, mut abs_y) = Self::sanity_check(description)?;

        Self::init_default_resolution(description, &mut abs_x, &mut abs_y);

        let semi_mt = description.semi_mt;
        let jumping_semi_mt = semi_mt && description.model_flags.contains(ModelFlags::JUMPING_SEMI_MT);

        // This device has a terrible resolution when two fingers are down:
        // the bounding-box touchpoints jump, while the single-touch
        // emulation stays accurate. Pretend it's a single-touch touchpad
        // with the BTN_TOOL bits.
        let (num_slots, has_mt) = match description.mt_slots {
            Some(slots) if !jumping_semi_mt => (slots.max(1), true),
            _ => (1, false),
        };

        let ntouches = num_slots.max(description.max_tool_fingers);

        let mut touches = vec![Touch::new(); ntouches];
        for (slot, touch) in touches.iter_mut().enumerate().take(num_slots) {
            if let Some(point) = description.initial_positions.get(slot) {
                touch.point = *point;
            }
        }

        let res_x = abs_x.resolution;
        let res_y = abs_y.resolution;
        let width_mm = abs_x.range() / res_x;
        let height_mm = abs_y.range() / res_y;

        let x_scale_coeff = (DEFAULT_MOUSE_DPI as f64 / 25.4) / res_x as f64;
        let y_scale_coeff = (DEFAULT_MOUSE_DPI as f64 / 25.4) / res_y as f64;

        let mut filter: Box<dyn MotionFilter> =
            if description.model_flags.contains(ModelFlags::LENOVO_X230) {
                Box::new(PointerAccelerator::lenovo_x230(description.dpi))
            } else {
                Box::new(PointerAccelerator::touchpad(description.dpi))
            };
        if let Err(err) = filter.set_speed(config.accel_speed) {
            warn!("{}: {err}, keeping default speed", description.name);
        }

        let palm = Self::init_palmdetect(description, &abs_x, &abs_y, width_mm);
        let monitor_trackpoint = palm.left_edge != i32::MIN;
        let thumb = Self::init_thumb(description, &abs_y, height_mm, res_x, res_y);

        let gesture_enabled = !jumping_semi_mt;

        let mut touchpad = Touchpad {
            name: description.name.clone(),
            abs_x,
            abs_y,
            has_mt,
            semi_mt,
            reports_distance: description.reports_distance,
            model_flags: description.model_flags,
            num_slots,
            ntouches,
            slot: 0,
            touches,
            nfingers_down: 0,
            old_nfingers_down: 0,
            fake_touches: 0,
            fake_overflow_logged: false,
            queued: QueuedEvents::empty(),
            hysteresis_margin: DeviceCoords::new(res_x / 2, res_y / 2),
            x_scale_coeff,
            y_scale_coeff,
            filter,
            palm,
            thumb,
            dwt: DwtState {
                enabled: config.dwt,
                ..Default::default()
            },
            trackpoint: TrackpointState {
                monitor: monitor_trackpoint,
                ..Default::default()
            },
            gesture: GestureState::new(gesture_enabled),
            scroll: ScrollState::new(config.scroll_method, config.natural_scroll),
            buttons: Buttons::new(
                description.is_clickpad,
                description.has_top_buttons,
                res_x,
                res_y,
            ),
            left_handed: LeftHanded {
                enabled: config.left_handed,
                want_enabled: config.left_handed,
            },
            sendevents: SendEvents {
                current_mode: config.send_events,
                external_mice: 0,
            },
            suspended: false,
            tap: Box::new(NoTap),
            edge_scroll: Box::new(NoEdgeScroll),
            queue: VecDeque::new(),
        };

        // Two-finger scrolling needs at least two trackable touches.
        if touchpad.ntouches < 2 && touchpad.scroll.method == ScrollMethod::TwoFinger {
            touchpad.scroll.method = ScrollMethod::Edge;
        }

        info!(
            "{}: initialized ({} slots, {} touches{}{})",
            touchpad.name,
            touchpad.num_slots,
            touchpad.ntouches,
            if touchpad.semi_mt { ", semi-mt" } else { "" },
            if touchpad.buttons.is_clickpad {
                ", clickpad"
            } else {
                ""
            },
        );

        Ok(touchpad)
    }

    fn sanity_check(description: &DeviceDescription) -> Result<(AbsInfo, AbsInfo), DeviceError> {
        let (abs_x, abs_y) = match (description.abs_x, description.abs_y) {
            (Some(x), Some(y)) => (x, y),
            _ => {
                warn!(
                    "kernel bug: device {} failed touchpad sanity checks",
                    description.name
                );
                return Err(DeviceError::MissingAbsAxis(description.name.clone()));
            }
        };

        if !description.has_button_touch {
            warn!(
                "kernel bug: device {} failed touchpad sanity checks",
                description.name
            );
            return Err(DeviceError::MissingButtonTouch(description.name.clone()));
        }

        if description.max_tool_fingers == 0 {
            warn!(
                "kernel bug: device {} failed touchpad sanity checks",
                description.name
            );
            return Err(DeviceError::MissingToolFinger(description.name.clone()));
        }

        Ok((abs_x, abs_y))
    }

    /// Devices without resolution, hwdb override or size hint are mostly
    /// old and small; assume a small pad and derive the resolution from it.
    fn init_default_resolution(
        description: &DeviceDescription,
        abs_x: &mut AbsInfo,
        abs_y: &mut AbsInfo,
    ) {
        const TOUCHPAD_WIDTH_MM: i32 = 69; // 1 under palm detection
        const TOUCHPAD_HEIGHT_MM: i32 = 50;

        if !description.fake_resolution && abs_x.resolution > 0 && abs_y.resolution > 0 {
            return;
        }

        info!(
            "{}: no resolution or size hints, assuming a size of {}x{}mm",
            description.name, TOUCHPAD_WIDTH_MM, TOUCHPAD_HEIGHT_MM
        );

        abs_x.resolution = (abs_x.range() / TOUCHPAD_WIDTH_MM).max(1);
        abs_y.resolution = (abs_y.range() / TOUCHPAD_HEIGHT_MM).max(1);
    }

    fn init_palmdetect(
        description: &DeviceDescription,
        abs_x: &AbsInfo,
        abs_y: &AbsInfo,
        width_mm: i32,
    ) -> PalmConfig {
        // Wacom doesn't make internal touchpads and Apple pads are always
        // large enough; anything below 70mm probably doesn't need palm
        // detection until proven otherwise.
        if description.model_flags.contains(ModelFlags::WACOM_TOUCHPAD) || width_mm < 70 {
            return PalmConfig::default();
        }

        let width = abs_x.range();
        let height = abs_y.range();

        // Palm edges are 5% of the width on each side.
        PalmConfig {
            left_edge: abs_x.minimum + (width as f64 * 0.05) as i32,
            right_edge: abs_x.maximum - (width as f64 * 0.05) as i32,
            vert_center: abs_y.minimum + height / 2,
        }
    }

    fn init_thumb(
        description: &DeviceDescription,
        abs_y: &AbsInfo,
        height_mm: i32,
        res_x: i32,
        res_y: i32,
    ) -> ThumbConfig {
        if !description.is_clickpad {
            return ThumbConfig::default();
        }

        // A touchpad below 50mm high is too small to meaningfully interact
        // with a thumb resting on it.
        if height_mm < 50 {
            return ThumbConfig::default();
        }

        // Thumbs are detected by pressure in the bottom 15mm and by
        // lingering in the bottom 8mm.
        let ymax = abs_y.maximum;
        let mut thumb = ThumbConfig {
            detect_thumbs: true,
            upper_thumb_line: ymax - res_y * 15,
            lower_thumb_line: ymax - res_y * 8,
            pressure_threshold: i32::MAX,
        };

        // The reference touchpad is the T440s at 42x42 units/mm with a
        // threshold of 100; higher-resolution pads report higher pressure
        // for the same interaction. "Thumb" here means a massive touch that
        // should not interact, not the tip of a thumb in a pinch gesture.
        if let Some(pressure) = description.pressure {
            if pressure.range() >= 255 {
                let threshold =
                    100.0 * (res_x as f64).hypot(res_y as f64) / 42.0_f64.hypot(42.0);
                thumb.pressure_threshold = 100.max(threshold as i32);
            }
        }

        debug!(
            "thumb: enabled thumb detection{} on '{}'",
            if thumb.pressure_threshold != i32::MAX {
                " (+pressure)"
            } else {
                ""
            },
            description.name
        );

        thumb
    }

    /// Replaces the tap peer subsystem.
    pub fn set_tap_peer(&mut self, tap: Box<dyn TapPeer>) {
        self.tap = tap;
    }

    /// Replaces the edge-scroll peer subsystem.
    pub fn set_edge_scroll_peer(&mut self, edge_scroll: Box<dyn EdgeScrollPeer>) {
        self.edge_scroll = edge_scroll;
    }

    /// Removes and returns the oldest queued output event.
    pub fn poll_event(&mut self) -> Option<Event> {
        self.queue.pop_front()
    }

    // ---- raw event intake ------------------------------------------------

    /// Feeds one kernel event into the current frame.
    ///
    /// `time` is the event's timestamp in microseconds. A
    /// [`InputEvent::SynReport`] closes the frame and runs the processing
    /// pipeline; output events become available via [`Touchpad::poll_event`]
    /// afterwards.
    pub fn process_event(&mut self, time: u64, event: InputEvent) {
        match event {
            InputEvent::Absolute { axis, value } => {
                if self.has_mt {
                    self.process_absolute(axis, value, time);
                } else {
                    self.process_absolute_st(axis, value, time);
                }
            }
            InputEvent::Key { code, pressed } => self.process_key(code, pressed, time),
            InputEvent::SynReport => self.handle_state(time),
        }
    }

    fn current_touch_index(&self) -> usize {
        self.slot.min(self.ntouches - 1)
    }

    fn process_absolute(&mut self, axis: AbsAxis, value: i32, time: u64) {
        let index = self.current_touch_index();

        match axis {
            AbsAxis::MtPositionX => {
                let touch = &mut self.touches[index];
                touch.point.x = value;
                touch.time = time;
                touch.dirty = true;
                self.queued |= QueuedEvents::MOTION;
            }
            AbsAxis::MtPositionY => {
                let touch = &mut self.touches[index];
                touch.point.y = value;
                touch.time = time;
                touch.dirty = true;
                self.queued |= QueuedEvents::MOTION;
            }
            AbsAxis::MtSlot => {
                self.slot = value.max(0) as usize;
            }
            AbsAxis::MtDistance => {
                self.touches[index].distance = value;
            }
            AbsAxis::MtTrackingId => {
                if value != -1 {
                    self.new_touch(index, time);
                } else {
                    self.end_sequence(index, time);
                }
            }
            AbsAxis::MtPressure => {
                let touch = &mut self.touches[index];
                touch.pressure = value;
                touch.dirty = true;
                self.queued |= QueuedEvents::MOTION;
            }
            AbsAxis::X | AbsAxis::Y => {}
        }
    }

    fn process_absolute_st(&mut self, axis: AbsAxis, value: i32, time: u64) {
        let index = self.current_touch_index();

        match axis {
            AbsAxis::X => {
                let touch = &mut self.touches[index];
                touch.point.x = value;
                touch.time = time;
                touch.dirty = true;
                self.queued |= QueuedEvents::MOTION;
            }
            AbsAxis::Y => {
                let touch = &mut self.touches[index];
                touch.point.y = value;
                touch.time = time;
                touch.dirty = true;
                self.queued |= QueuedEvents::MOTION;
            }
            _ => {}
        }
    }

    fn process_key(&mut self, code: KeyCode, pressed: bool, time: u64) {
        match code {
            KeyCode::ButtonLeft => self.process_button(Button::Left, pressed, time),
            KeyCode::ButtonMiddle => self.process_button(Button::Middle, pressed, time),
            KeyCode::ButtonRight => self.process_button(Button::Right, pressed, time),
            KeyCode::ButtonTouch
            | KeyCode::ToolFinger
            | KeyCode::ToolDoubleTap
            | KeyCode::ToolTripleTap
            | KeyCode::ToolQuadTap
            | KeyCode::ToolQuintTap => self.fake_finger_set(code, pressed),
        }
    }

    // ---- fake-touch bookkeeping ------------------------------------------

    fn fake_finger_set(&mut self, code: KeyCode, pressed: bool) {
        let shift = match code {
            KeyCode::ButtonTouch => {
                if !pressed {
                    self.fake_touches &= !FAKE_FINGER_OVERFLOW;
                }
                0
            }
            KeyCode::ToolFinger => 1,
            KeyCode::ToolDoubleTap => 2,
            KeyCode::ToolTripleTap => 3,
            KeyCode::ToolQuadTap => 4,
            // When QUINTTAP is released we're either switching to 6 fingers
            // (the flag stays until BTN_TOUCH is released) or to one of
            // DOUBLE/TRIPLE/QUADTAP (which clears the flag on press).
            KeyCode::ToolQuintTap => {
                if pressed {
                    self.fake_touches |= FAKE_FINGER_OVERFLOW;
                }
                return;
            }
            _ => return,
        };

        if pressed {
            self.fake_touches &= !FAKE_FINGER_OVERFLOW;
            self.fake_touches |= 1 << shift;
        } else {
            self.fake_touches &= !(1 << shift);
        }
    }

    fn fake_finger_count(&self) -> FakeFingerCount {
        if self.fake_touches & FAKE_FINGER_OVERFLOW != 0 {
            FakeFingerCount::Overflow
        } else {
            // BTN_TOUCH (bit 0) is not a finger count.
            let tools = self.fake_touches >> 1;
            if tools == 0 {
                FakeFingerCount::Count(0)
            } else {
                FakeFingerCount::Count(tools.trailing_zeros() as usize + 1)
            }
        }
    }

    fn fake_finger_is_touching(&self) -> bool {
        self.fake_touches & 0x1 != 0
    }

    // ---- touch lifecycle -------------------------------------------------

    fn new_touch(&mut self, slot: usize, time: u64) {
        let touch = &mut self.touches[slot];
        if matches!(
            touch.state,
            TouchState::Begin | TouchState::Update | TouchState::Hovering
        ) {
            return;
        }

        // The touch begins as hovering: until BTN_TOUCH arrives we don't
        // know whether it's a touch down, and BTN_TOUCH may come after
        // ABS_MT_TRACKING_ID.
        touch.history.reset();
        touch.dirty = true;
        touch.has_ended = false;
        touch.state = TouchState::Hovering;
        touch.pinned.is_pinned = false;
        touch.time = time;
        self.queued |= QueuedEvents::MOTION;
    }

    fn begin_touch(&mut self, slot: usize, time: u64) {
        let touch = &mut self.touches[slot];
        touch.dirty = true;
        touch.state = TouchState::Begin;
        touch.time = time;
        touch.palm.time = time;
        touch.thumb.state = ThumbState::Maybe;
        touch.thumb.first_touch_time = time;
        self.nfingers_down += 1;
    }

    /// Ends a touch, even if its kernel sequence is still active.
    fn end_touch(&mut self, slot: usize, time: u64) {
        let touch = &mut self.touches[slot];
        match touch.state {
            TouchState::Hovering => {
                touch.state = TouchState::None;
                return;
            }
            TouchState::None | TouchState::End => return,
            TouchState::Begin | TouchState::Update => {}
        }

        touch.dirty = true;
        touch.palm.state = PalmState::None;
        touch.palm.time = 0;
        touch.state = TouchState::End;
        touch.pinned.is_pinned = false;
        touch.time = time;
        debug_assert!(self.nfingers_down >= 1);
        self.nfingers_down -= 1;
        self.queued |= QueuedEvents::MOTION;
    }

    /// Ends the kernel sequence (tracking id -1 or tool-count release).
    fn end_sequence(&mut self, slot: usize, time: u64) {
        self.touches[slot].has_ended = true;
        self.end_touch(slot, time);
    }

    // ---- frame pipeline --------------------------------------------------

    /// Synaptics serial devices may end touch 2 on BTN_TOOL_TRIPLETAP and
    /// restart it the next frame with different coordinates. If a touch just
    /// ended despite the tool count saying 3+, revive it straight to update.
    fn restore_synaptics_touches(&mut self, time: u64) {
        let nfake = match self.fake_finger_count() {
            FakeFingerCount::Count(n) => n,
            FakeFingerCount::Overflow => return,
        };

        if nfake < 3 {
            return;
        }

        if self.nfingers_down >= nfake || self.nfingers_down == self.num_slots {
            return;
        }

        for slot in 0..self.num_slots {
            if self.touches[slot].state != TouchState::End {
                continue;
            }

            self.new_touch(slot, time);
            self.begin_touch(slot, time);
            self.touches[slot].state = TouchState::Update;
        }
    }

    fn process_fake_touches(&mut self, time: u64) {
        let nfake = match self.fake_finger_count() {
            FakeFingerCount::Count(n) => n,
            FakeFingerCount::Overflow => {
                if !self.fake_overflow_logged {
                    debug!("{}: too many fingers for fake-touch tracking", self.name);
                    self.fake_overflow_logged = true;
                }
                return;
            }
        };

        if self.model_flags.contains(ModelFlags::SYNAPTICS_SERIAL) {
            self.restore_synaptics_touches(time);
        }

        let start = if self.has_mt { self.num_slots } else { 0 };
        for slot in start..self.ntouches {
            if slot < nfake {
                self.new_touch(slot, time);
            } else {
                self.end_sequence(slot, time);
            }
        }
    }

    fn unhover_abs_distance(&mut self, time: u64) {
        for slot in 0..self.ntouches {
            match self.touches[slot].state {
                TouchState::Hovering => {
                    if self.touches[slot].distance == 0 {
                        // Avoid a jump when landing the finger.
                        self.touches[slot].history.reset();
                        self.begin_touch(slot, time);
                    }
                }
                _ => {
                    if self.touches[slot].distance > 0 {
                        self.end_touch(slot, time);
                    }
                }
            }
        }
    }

    fn unhover_fake_touches(&mut self, time: u64) {
        if self.fake_touches == 0 && self.nfingers_down == 0 {
            return;
        }

        let nfake = match self.fake_finger_count() {
            FakeFingerCount::Count(n) => n,
            FakeFingerCount::Overflow => return,
        };

        let touching = self.fake_finger_is_touching();

        if self.nfingers_down == nfake
            && ((self.nfingers_down == 0 && !touching) || (self.nfingers_down > 0 && touching))
        {
            return;
        }

        // BTN_TOUCH is set with fewer fingers down than fake touches: begin
        // hovering touches until the counts match.
        if touching && self.nfingers_down < nfake {
            for slot in 0..self.ntouches {
                if self.touches[slot].state == TouchState::Hovering {
                    self.begin_touch(slot, time);

                    if self.nfingers_down >= nfake {
                        break;
                    }
                }
            }
        }

        // BTN_TOUCH is unset (all hovering now) or too many touches are
        // down; end touches in reverse order until the counts match.
        if self.nfingers_down > nfake || !touching {
            for slot in (0..self.ntouches).rev() {
                if matches!(
                    self.touches[slot].state,
                    TouchState::Hovering | TouchState::None
                ) {
                    continue;
                }

                self.end_touch(slot, time);

                if touching && self.nfingers_down == nfake {
                    break;
                }
            }
        }
    }

    fn unhover_touches(&mut self, time: u64) {
        if self.reports_distance {
            self.unhover_abs_distance(time);
        } else {
            self.unhover_fake_touches(time);
        }
    }

    /// Copies the top-most real touch position into all fake touches, so
    /// downstream classifiers see physically plausible positions.
    fn position_fake_touches(&mut self) {
        if let FakeFingerCount::Count(n) = self.fake_finger_count() {
            if n <= self.num_slots {
                return;
            }
        }

        if self.nfingers_down == 0 {
            return;
        }

        // The top-most real touch is more reliable than just the first one.
        let mut topmost: Option<usize> = None;
        for slot in 0..self.num_slots {
            if matches!(
                self.touches[slot].state,
                TouchState::End | TouchState::None
            ) {
                continue;
            }

            topmost = match topmost {
                Some(best) if self.touches[best].point.y <= self.touches[slot].point.y => {
                    Some(best)
                }
                _ => Some(slot),
            };
        }

        let topmost = match topmost {
            Some(slot) => slot,
            None => {
                warn!("{}: unable to find topmost touch", self.name);
                return;
            }
        };

        let top_point = self.touches[topmost].point;
        let top_dirty = self.touches[topmost].dirty;

        let start = if self.has_mt { self.num_slots } else { 1 };
        for slot in start..self.ntouches {
            let touch = &mut self.touches[slot];
            if touch.state == TouchState::None {
                continue;
            }

            touch.point = top_point;
            if !touch.dirty {
                touch.dirty = top_dirty;
            }
        }
    }

    fn need_motion_history_reset(&self) -> bool {
        // Semi-mt finger positions may jump when the finger count changes.
        if self.semi_mt && self.nfingers_down != self.old_nfingers_down {
            return true;
        }

        // Transitioning between slots and fake touches in either direction
        // may produce a coordinate jump.
        if self.nfingers_down != self.old_nfingers_down
            && (self.nfingers_down > self.num_slots || self.old_nfingers_down > self.num_slots)
        {
            return true;
        }

        false
    }

    fn process_state(&mut self, time: u64) {
        self.process_fake_touches(time);
        self.unhover_touches(time);
        self.position_fake_touches();

        let want_motion_reset = self.need_motion_history_reset();
        let mut restart_filter = false;

        for slot in 0..self.ntouches {
            {
                let touch = &mut self.touches[slot];

                if want_motion_reset {
                    touch.history.reset();
                    touch.reset_motion_history = true;
                } else if touch.reset_motion_history {
                    touch.history.reset();
                    touch.reset_motion_history = false;
                }

                if !touch.dirty {
                    continue;
                }
            }

            self.thumb_detect(slot, time);
            self.palm_detect(slot, time);

            let margin = self.hysteresis_margin;
            let touch = &mut self.touches[slot];
            touch.motion_hysteresis(margin);
            let point = touch.point;
            touch.history.push(point);

            self.unpin_finger(slot);

            if self.touches[slot].state == TouchState::Begin {
                restart_filter = true;
            }
        }

        if restart_filter {
            self.filter.restart(time);
        }

        self.buttons_handle_state(time);
        self.edge_scroll.handle_state(time);

        // A physical button went down on a clickpad: pin all fingers so the
        // clicking finger doesn't move the pointer. Fingers unpin again
        // once they move past a threshold, which keeps drag-and-drop
        // working.
        if self.queued.contains(QueuedEvents::BUTTON_PRESS) && self.buttons.is_clickpad {
            self.pin_fingers();
        }

        self.gesture_handle_state(time);
    }

    fn post_events(&mut self, time: u64) {
        // Only (top) button events while suspended.
        if self.suspended {
            self.post_button_events(time);
            return;
        }

        let mut filter_motion = false;
        filter_motion |= self.tap.handle_state(time);
        filter_motion |= self.post_button_events(time);

        if filter_motion || self.trackpoint.active || self.dwt.keyboard_active {
            self.edge_scroll.stop_events(time);
            self.gesture_cancel(time);
            return;
        }

        if self.edge_scroll.post_events(time) {
            return;
        }

        self.gesture_post_events(time);
    }

    fn post_process_state(&mut self, _time: u64) {
        for touch in &mut self.touches {
            if !touch.dirty {
                continue;
            }

            match touch.state {
                TouchState::End => {
                    touch.state = if touch.has_ended {
                        TouchState::None
                    } else {
                        TouchState::Hovering
                    };
                }
                TouchState::Begin => touch.state = TouchState::Update,
                _ => {}
            }

            touch.dirty = false;
        }

        self.old_nfingers_down = self.nfingers_down;
        self.queued = QueuedEvents::empty();
    }

    fn handle_state(&mut self, time: u64) {
        self.process_state(time);
        self.post_events(time);
        self.post_process_state(time);
    }

    // ---- delta normalization ---------------------------------------------

    /// Normalizes a device-unit delta to [`DEFAULT_MOUSE_DPI`] units,
    /// evening out resolution differences between the axes so a circle on
    /// the pad doesn't become an ellipse on the screen.
    pub(crate) fn normalize_delta(&self, delta: DeviceFloatCoords) -> NormalizedCoords {
        NormalizedCoords::new(delta.x * self.x_scale_coeff, delta.y * self.y_scale_coeff)
    }

    /// Converts a normalized delta back to device units, using the x-axis
    /// coefficient for both axes.
    pub(crate) fn unnormalize_for_xaxis(&self, delta: NormalizedCoords) -> DeviceFloatCoords {
        DeviceFloatCoords::new(delta.x / self.x_scale_coeff, delta.y / self.x_scale_coeff)
    }

    pub(crate) fn filter_motion(&mut self, unaccelerated: NormalizedCoords, time: u64) -> NormalizedCoords {
        if unaccelerated.is_zero() {
            return unaccelerated;
        }

        self.filter.filter(unaccelerated, time)
    }

    // ---- timers ----------------------------------------------------------

    /// The earliest armed timer deadline, in microseconds.
    ///
    /// The embedding event loop should call [`Touchpad::dispatch_timers`]
    /// once this point in event time has passed.
    pub fn next_timer_deadline(&self) -> Option<u64> {
        [
            self.gesture.finger_count_switch_timer.deadline(),
            self.dwt.keyboard_timer.deadline(),
            self.trackpoint.timer.deadline(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    /// Delivers all timer deadlines that have passed.
    ///
    /// Safe to call at any point between frames; timers whose precondition
    /// has gone away in the meantime are no-ops.
    pub fn dispatch_timers(&mut self, now: u64) {
        if self.gesture.finger_count_switch_timer.expired(now) {
            self.gesture_finger_count_switch_timeout(now);
        }
        if self.dwt.keyboard_timer.expired(now) {
            self.keyboard_timeout(now);
        }
        if self.trackpoint.timer.expired(now) {
            self.trackpoint_timeout(now);
        }
    }

    // ---- suspend / resume ------------------------------------------------

    /// Unrolls the touchpad state: releases buttons, flushes taps, lifts
    /// all touches and runs one synthetic frame, leaving a neutral state.
    fn clear_state(&mut self, now: u64) {
        // Button releases must precede the touch up on clickpads.
        self.release_all_buttons(now);
        self.tap.release_all(now);

        for slot in 0..self.ntouches {
            self.end_sequence(slot, now);
        }
        self.fake_touches = 0;

        self.handle_state(now);
    }

    /// Stops event processing, driving all state machines to rest first.
    ///
    /// On devices with top software buttons those buttons keep working;
    /// everything else is silenced until [`Touchpad::resume`].
    pub fn suspend(&mut self, now: u64) {
        self.clear_state(now);
        self.suspended = true;
    }

    /// Resumes event processing after [`Touchpad::suspend`].
    pub fn resume(&mut self, now: u64) {
        if self.buttons.has_top_buttons {
            // The tap machine was offline while suspended; reset state.
            self.clear_state(now);
        }
        self.suspended = false;
    }

    /// Tells the touchpad an external pointing device appeared on the seat.
    pub fn external_mouse_added(&mut self, now: u64) {
        self.sendevents.external_mice += 1;
        if self.sendevents.current_mode == SendEventsMode::DisabledOnExternalMouse {
            self.suspend(now);
        }
    }

    /// Tells the touchpad an external pointing device disappeared.
    pub fn external_mouse_removed(&mut self, now: u64) {
        self.sendevents.external_mice = self.sendevents.external_mice.saturating_sub(1);
        if self.sendevents.current_mode == SendEventsMode::DisabledOnExternalMouse
            && self.sendevents.external_mice == 0
        {
            self.resume(now);
        }
    }

    // ---- configuration ---------------------------------------------------

    /// Switches the scrolling method, terminating in-flight scrolls.
    pub fn set_scroll_method(&mut self, method: ScrollMethod, now: u64) {
        if method == self.scroll.method {
            return;
        }

        self.edge_scroll.stop_events(now);
        self.gesture_stop_twofinger_scroll(now);

        self.scroll.method = method;
    }

    /// The active scrolling method.
    pub fn scroll_method(&self) -> ScrollMethod {
        self.scroll.method
    }

    /// Inverts the scroll direction on emission.
    pub fn set_natural_scroll(&mut self, enabled: bool) {
        self.scroll.natural_scrolling_enabled = enabled;
    }

    /// Whether natural scrolling is active.
    pub fn natural_scroll(&self) -> bool {
        self.scroll.natural_scrolling_enabled
    }

    /// Enables or disables disable-while-typing.
    pub fn set_dwt(&mut self, enabled: bool) {
        self.dwt.enabled = enabled;
    }

    /// Whether disable-while-typing is enabled.
    pub fn dwt(&self) -> bool {
        self.dwt.enabled
    }

    /// Swaps left and right buttons on emission.
    ///
    /// Deferred while a physical button is held so a press and its release
    /// always report the same button.
    pub fn set_left_handed(&mut self, enabled: bool) {
        self.left_handed.want_enabled = enabled;
        self.maybe_apply_left_handed();
    }

    /// Whether left-handed button mapping is requested.
    pub fn left_handed(&self) -> bool {
        self.left_handed.want_enabled
    }

    /// Sets the pointer acceleration speed in `[-1.0, 1.0]`.
    pub fn set_accel_speed(&mut self, speed: f64) -> Result<(), crate::config::ConfigError> {
        self.filter.set_speed(speed)
    }

    /// The current pointer acceleration speed.
    pub fn accel_speed(&self) -> f64 {
        self.filter.speed()
    }

    /// Enables or disables swipe/pinch recognition.
    ///
    /// Devices with jumping semi-mt coordinates have gestures disabled by
    /// default and won't produce usable gestures even if enabled.
    pub fn set_gestures_enabled(&mut self, enabled: bool) {
        self.gesture.enabled = enabled;
    }

    /// Whether swipe/pinch recognition is enabled.
    pub fn gestures_enabled(&self) -> bool {
        self.gesture.enabled
    }

    /// Changes when the device emits events, suspending or resuming as
    /// needed.
    pub fn set_send_events_mode(&mut self, mode: SendEventsMode, now: u64) {
        if mode == self.sendevents.current_mode {
            return;
        }

        match mode {
            SendEventsMode::Enabled => self.resume(now),
            SendEventsMode::Disabled => self.suspend(now),
            SendEventsMode::DisabledOnExternalMouse => {
                if self.sendevents.external_mice > 0 {
                    self.suspend(now);
                }
            }
        }

        self.sendevents.current_mode = mode;
    }

    /// The current send-events mode.
    pub fn send_events_mode(&self) -> SendEventsMode {
        self.sendevents.current_mode
    }

    // ---- introspection ---------------------------------------------------

    /// Number of real hardware slots.
    pub fn num_slots(&self) -> usize {
        self.num_slots
    }

    /// Number of trackable touches (slots plus fake-touch capacity).
    pub fn ntouches(&self) -> usize {
        self.ntouches
    }

    /// Count of non-hovering touches currently down.
    pub fn fingers_down(&self) -> usize {
        self.nfingers_down
    }

    /// Physical size of the touchpad in millimeters.
    pub fn size_mm(&self) -> (i32, i32) {
        (
            self.abs_x.range() / self.abs_x.resolution,
            self.abs_y.range() / self.abs_y.resolution,
        )
    }

    /// Read access to a touch slot, e.g. for peer subsystems.
    pub fn touch(&self, slot: usize) -> Option<&Touch> {
        self.touches.get(slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::AbsInfo;

    fn test_description() -> DeviceDescription {
        DeviceDescription::new(
            "test touchpad",
            AbsInfo {
                minimum: 0,
                maximum: 4000,
                resolution: 40,
            },
            AbsInfo {
                minimum: 0,
                maximum: 2000,
                resolution: 40,
            },
            5,
        )
    }

    #[test]
    fn rejects_device_without_axes() {
        let mut description = test_description();
        description.abs_x = None;
        let err = Touchpad::new(&description, TouchpadConfig::default()).unwrap_err();
        assert!(matches!(err, DeviceError::MissingAbsAxis(_)));
    }

    #[test]
    fn rejects_device_without_btn_touch() {
        let mut description = test_description();
        description.has_button_touch = false;
        let err = Touchpad::new(&description, TouchpadConfig::default()).unwrap_err();
        assert!(matches!(err, DeviceError::MissingButtonTouch(_)));
    }

    #[test]
    fn rejects_device_without_tool_finger() {
        let mut description = test_description();
        description.max_tool_fingers = 0;
        let err = Touchpad::new(&description, TouchpadConfig::default()).unwrap_err();
        assert!(matches!(err, DeviceError::MissingToolFinger(_)));
    }

    #[test]
    fn fake_finger_counting() {
        let description = test_description();
        let mut tp = Touchpad::new(&description, TouchpadConfig::default()).unwrap();

        assert_eq!(tp.fake_finger_count(), FakeFingerCount::Count(0));

        tp.fake_finger_set(KeyCode::ButtonTouch, true);
        assert_eq!(tp.fake_finger_count(), FakeFingerCount::Count(0));
        assert!(tp.fake_finger_is_touching());

        tp.fake_finger_set(KeyCode::ToolFinger, true);
        assert_eq!(tp.fake_finger_count(), FakeFingerCount::Count(1));

        tp.fake_finger_set(KeyCode::ToolFinger, false);
        tp.fake_finger_set(KeyCode::ToolTripleTap, true);
        assert_eq!(tp.fake_finger_count(), FakeFingerCount::Count(3));

        tp.fake_finger_set(KeyCode::ToolQuintTap, true);
        assert_eq!(tp.fake_finger_count(), FakeFingerCount::Overflow);

        // A counted tool bit clears the overflow again.
        tp.fake_finger_set(KeyCode::ToolQuadTap, true);
        assert_eq!(tp.fake_finger_count(), FakeFingerCount::Count(4));
    }

    #[test]
    fn jumping_semi_mt_demoted_to_single_touch() {
        let mut description = test_description();
        description.semi_mt = true;
        description.mt_slots = Some(2);
        description.model_flags = ModelFlags::JUMPING_SEMI_MT;

        let tp = Touchpad::new(&description, TouchpadConfig::default()).unwrap();
        assert_eq!(tp.num_slots(), 1);
        assert!(!tp.has_mt);
        assert!(!tp.gestures_enabled());
    }

    #[test]
    fn small_clickpad_has_no_thumb_detection() {
        let mut description = test_description();
        // 40mm high.
        description.abs_y = Some(AbsInfo {
            minimum: 0,
            maximum: 1600,
            resolution: 40,
        });
        let tp = Touchpad::new(&description, TouchpadConfig::default()).unwrap();
        assert!(!tp.thumb.detect_thumbs);
    }

    #[test]
    fn narrow_touchpad_has_no_palm_detection() {
        let mut description = test_description();
        // 50mm wide.
        description.abs_x = Some(AbsInfo {
            minimum: 0,
            maximum: 2000,
            resolution: 40,
        });
        let tp = Touchpad::new(&description, TouchpadConfig::default()).unwrap();
        assert_eq!(tp.palm.left_edge, i32::MIN);
        assert_eq!(tp.palm.right_edge, i32::MAX);
    }

    #[test]
    fn palm_edges_at_five_percent() {
        let description = test_description();
        let tp = Touchpad::new(&description, TouchpadConfig::default()).unwrap();
        assert_eq!(tp.palm.left_edge, 200);
        assert_eq!(tp.palm.right_edge, 3800);
        assert_eq!(tp.palm.vert_center, 1000);
    }
}
