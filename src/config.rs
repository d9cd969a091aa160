//! Runtime configuration surface of a touchpad.
//!
//! These types mirror the options an embedding compositor exposes to users.
//! They are applied through setters on [`Touchpad`](crate::touchpad::Touchpad)
//! and take effect at well-defined points (e.g. a left-handed change is
//! deferred while a physical button is held).

/// Which scrolling pipeline is active on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScrollMethod {
    /// No scrolling.
    NoScroll,
    /// Moving two fingers anywhere on the touchpad scrolls.
    #[default]
    TwoFinger,
    /// Moving one finger along the right/bottom edge scrolls.
    Edge,
}

/// How physical clicks generate button events.
///
/// The actual click handling lives in the buttons subsystem; the touchpad
/// core only stores the choice and hands it to the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClickMethod {
    /// Software-defined button areas at the bottom of a clickpad.
    #[default]
    ButtonAreas,
    /// Click with N fingers down generates a left/right/middle button event.
    ClickFinger,
    /// Clicks generate no button events.
    None,
}

/// When the device is allowed to emit events at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SendEventsMode {
    /// Events are processed and emitted normally.
    #[default]
    Enabled,
    /// The device is suspended; no events are emitted.
    Disabled,
    /// The device suspends whenever an external pointing device is present.
    DisabledOnExternalMouse,
}

/// Errors returned when rejecting an invalid configuration value.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// The pointer acceleration speed is outside the supported range.
    #[error("acceleration speed {0} is outside [-1.0, 1.0]")]
    SpeedOutOfRange(f64),
}

/// User-visible touchpad options, with their defaults.
#[derive(Debug, Clone)]
pub struct TouchpadConfig {
    /// Active scrolling method.
    pub scroll_method: ScrollMethod,
    /// Invert the sign of scroll axis values on emission.
    pub natural_scroll: bool,
    /// Suppress touchpad input while a paired keyboard is typing.
    pub dwt: bool,
    /// Whether tapping is enabled (handled by the tap peer).
    pub tap: bool,
    /// Swap left and right button events on emission.
    pub left_handed: bool,
    /// How physical clicks map to buttons.
    pub click_method: ClickMethod,
    /// Whether and when the device emits events.
    pub send_events: SendEventsMode,
    /// Pointer acceleration speed in `[-1.0, 1.0]`.
    pub accel_speed: f64,
}

impl Default for TouchpadConfig {
    fn default() -> Self {
        TouchpadConfig {
            scroll_method: ScrollMethod::default(),
            natural_scroll: false,
            dwt: true,
            tap: false,
            left_handed: false,
            click_method: ClickMethod::default(),
            send_events: SendEventsMode::default(),
            accel_speed: 0.0,
        }
    }
}
