//! Pointer acceleration filters.
//!
//! A motion filter turns unaccelerated, normalized deltas into the deltas a
//! user actually sees. The stock implementation, [`PointerAccelerator`],
//! estimates the current pointer velocity from a short ring of trackers and
//! applies a piecewise-linear acceleration profile to it. Different device
//! classes get different profile variants; a touchpad is deliberately slower
//! than a mouse at the same finger speed.

use std::fmt;

use crate::config::ConfigError;
use crate::utils::time::{ms2us, v_ms2us, v_us2ms};
use crate::utils::{Direction, NormalizedCoords};

/// Default velocity above which acceleration kicks in, in units/µs.
const DEFAULT_THRESHOLD: f64 = 0.0004;
/// Lowest the threshold may be tuned to, in units/µs.
const MINIMUM_THRESHOLD: f64 = 0.0002;
/// Default maximum acceleration factor.
const DEFAULT_ACCELERATION: f64 = 2.0;
/// Default incline of the acceleration function.
const DEFAULT_INCLINE: f64 = 1.1;

/// Largest velocity difference between trackers still considered one motion,
/// in units/µs.
const MAX_VELOCITY_DIFF: f64 = 0.001;
/// Trackers older than this no longer contribute to velocity estimation.
const MOTION_TIMEOUT: u64 = ms2us(1000);
/// Number of tracker slots in the ring.
const NUM_POINTER_TRACKERS: usize = 16;

/// Touchpads subjectively should feel slower than mice at equal finger
/// speed. Input and output of the touchpad profile are scaled by this.
const TP_MAGIC_SLOWDOWN: f64 = 0.4;
/// Fudge factor for the Lenovo X230's lower-than-advertised resolution.
const TP_MAGIC_LOW_RES_FACTOR: f64 = 4.0;

/// A motion filter shaping pointer deltas.
///
/// Filters are stateful: they remember recent motion to estimate velocity.
/// All times are microseconds on the monotonic event clock.
pub trait MotionFilter: fmt::Debug {
    /// Accelerates a delta.
    fn filter(&mut self, unaccelerated: NormalizedCoords, time: u64) -> NormalizedCoords;

    /// Passes a delta through without acceleration.
    ///
    /// Used for scroll motion, which tracks the fingers 1:1.
    fn filter_unaccelerated(
        &mut self,
        unaccelerated: NormalizedCoords,
        _time: u64,
    ) -> NormalizedCoords {
        unaccelerated
    }

    /// Forgets all motion history; the next delta is treated as the start of
    /// a fresh motion.
    fn restart(&mut self, time: u64);

    /// Tunes the filter speed, `speed` in `[-1.0, 1.0]`.
    fn set_speed(&mut self, speed: f64) -> Result<(), ConfigError>;

    /// The current speed setting.
    fn speed(&self) -> f64;
}

/// One entry of the velocity-estimation ring.
#[derive(Debug, Clone, Copy)]
struct PointerTracker {
    /// Accumulated delta since this tracker was the most recent one.
    delta: NormalizedCoords,
    /// Time this tracker was started, in µs.
    time: u64,
    /// Direction octants of the motion that started this tracker.
    dir: Direction,
}

impl Default for PointerTracker {
    fn default() -> Self {
        PointerTracker {
            delta: NormalizedCoords::ZERO,
            time: 0,
            dir: Direction::empty(),
        }
    }
}

/// Which acceleration profile a [`PointerAccelerator`] applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AccelProfile {
    /// Plain linear profile for normalized (1000 DPI) input.
    Linear,
    /// Linear profile operating on device units, for mice below 1000 DPI.
    LinearLowDpi,
    /// Linear profile with the touchpad magic slowdown applied.
    Touchpad,
    /// Trial-and-error profile for the Lenovo X230's bad touchpad.
    LenovoX230,
}

/// The stock velocity-tracking pointer accelerator.
pub struct PointerAccelerator {
    profile: AccelProfile,

    /// units/µs
    last_velocity: f64,

    trackers: [PointerTracker; NUM_POINTER_TRACKERS],
    cur_tracker: usize,

    /// units/µs
    threshold: f64,
    /// unitless factor
    accel: f64,
    /// incline of the acceleration function
    incline: f64,

    dpi_factor: f64,
    speed_adjustment: f64,
}

impl PointerAccelerator {
    fn new(profile: AccelProfile, dpi: u32) -> Self {
        PointerAccelerator {
            profile,
            last_velocity: 0.0,
            trackers: [PointerTracker::default(); NUM_POINTER_TRACKERS],
            cur_tracker: 0,
            threshold: DEFAULT_THRESHOLD,
            accel: DEFAULT_ACCELERATION,
            incline: DEFAULT_INCLINE,
            dpi_factor: dpi as f64 / crate::utils::DEFAULT_MOUSE_DPI as f64,
            speed_adjustment: 0.0,
        }
    }

    /// Creates the filter for regular pointing devices.
    pub fn linear(dpi: u32) -> Self {
        Self::new(AccelProfile::Linear, dpi)
    }

    /// Creates the filter for mice below 1000 DPI.
    pub fn linear_low_dpi(dpi: u32) -> Self {
        Self::new(AccelProfile::LinearLowDpi, dpi)
    }

    /// Creates the filter for touchpads.
    pub fn touchpad(dpi: u32) -> Self {
        Self::new(AccelProfile::Touchpad, dpi)
    }

    /// Creates the filter for the Lenovo X230 touchpad.
    ///
    /// This profile has been trial-and-error'd against the hardware; any
    /// change to it requires re-testing everything.
    pub fn lenovo_x230(dpi: u32) -> Self {
        Self::new(AccelProfile::LenovoX230, dpi)
    }

    fn feed_trackers(&mut self, delta: NormalizedCoords, time: u64) {
        for tracker in &mut self.trackers {
            tracker.delta += delta;
        }

        self.cur_tracker = (self.cur_tracker + 1) % NUM_POINTER_TRACKERS;
        self.trackers[self.cur_tracker] = PointerTracker {
            delta: NormalizedCoords::ZERO,
            time,
            dir: delta.direction(),
        };
    }

    fn tracker_by_offset(&self, offset: usize) -> PointerTracker {
        let index = (self.cur_tracker + NUM_POINTER_TRACKERS - offset) % NUM_POINTER_TRACKERS;
        self.trackers[index]
    }

    fn tracker_velocity(tracker: PointerTracker, time: u64) -> f64 {
        let tdelta = (time - tracker.time + 1) as f64;
        tracker.delta.length() / tdelta // units/µs
    }

    /// First movement after a pause needs special handling: the last tracker
    /// is too old for a meaningful velocity across multiple trackers, so the
    /// motion timeout itself serves as the time base. This errs on the side
    /// of being too fast for really slow movements but gives much more
    /// useful initial motion in the usual pause-move-pause-move pattern.
    fn velocity_after_timeout(tracker: PointerTracker) -> f64 {
        Self::tracker_velocity(tracker, tracker.time + MOTION_TIMEOUT)
    }

    /// Walks the ring for the least recent tracker within the time limit,
    /// direction overlap and maximum velocity difference, and reports its
    /// velocity in units/µs.
    fn calculate_velocity(&self, time: u64) -> f64 {
        let mut result = 0.0;
        let mut initial_velocity = 0.0;

        let mut dir = self.tracker_by_offset(0).dir;

        for offset in 1..NUM_POINTER_TRACKERS {
            let tracker = self.tracker_by_offset(offset);

            // Stop if too far away in time.
            if tracker.time > time || time - tracker.time > MOTION_TIMEOUT {
                if offset == 1 {
                    result = Self::velocity_after_timeout(tracker);
                }
                break;
            }

            let velocity = Self::tracker_velocity(tracker, time);

            // Stop if the direction changed.
            dir &= tracker.dir;
            if dir.is_empty() {
                // First movement after a direction change: the velocity is
                // that of the last movement.
                if offset == 1 {
                    result = velocity;
                }
                break;
            }

            if initial_velocity == 0.0 {
                initial_velocity = velocity;
                result = velocity;
            } else {
                // Stop if the velocity differs too much from the initial one.
                if (initial_velocity - velocity).abs() > MAX_VELOCITY_DIFF {
                    break;
                }
                result = velocity;
            }
        }

        result // units/µs
    }

    fn profile_factor(&self, speed_in: f64) -> f64 {
        match self.profile {
            AccelProfile::Linear => self.profile_linear(speed_in),
            AccelProfile::LinearLowDpi => self.profile_linear_low_dpi(speed_in),
            AccelProfile::Touchpad => self.profile_touchpad(speed_in),
            AccelProfile::LenovoX230 => self.profile_lenovo_x230(speed_in),
        }
    }

    /// The acceleration function is a double incline with a plateau:
    /// below 0.07 units/ms motion is decelerated down to 30% of input speed,
    /// up to the threshold the factor is 1 (1:1 movement), and above it the
    /// factor grows linearly with the configured incline until it hits the
    /// maximum acceleration cap.
    fn profile_linear(&self, speed_in: f64) -> f64 {
        let max_accel = self.accel;
        let threshold = self.threshold;
        let incline = self.incline;

        let factor = if v_us2ms(speed_in) < 0.07 {
            10.0 * v_us2ms(speed_in) + 0.3
        } else if speed_in < threshold {
            1.0
        } else {
            incline * v_us2ms(speed_in - threshold) + 1.0
        };

        factor.min(max_accel)
    }

    /// Variant for mice below 1000 DPI: at slow motion one device unit still
    /// causes a one-pixel movement, at high speeds the result approximates a
    /// high-DPI mouse. Input to this profile is in device units.
    fn profile_linear_low_dpi(&self, speed_in: f64) -> f64 {
        // dpi_factor is below 1.0: raise the cap and lower the threshold so
        // acceleration kicks in earlier.
        let max_accel = self.accel / self.dpi_factor;
        let threshold = self.threshold * self.dpi_factor;
        let incline = self.incline;

        let factor = if v_us2ms(speed_in) < 0.07 {
            10.0 * v_us2ms(speed_in) + 0.3
        } else if speed_in < threshold {
            1.0
        } else {
            incline * v_us2ms(speed_in - threshold) + 1.0
        };

        factor.min(max_accel)
    }

    fn profile_touchpad(&self, speed_in: f64) -> f64 {
        // Once normalized, a touchpad would see the same acceleration as a
        // mouse. Technically correct but subjectively wrong; a touchpad is
        // expected to be a lot slower at the same speed.
        self.profile_linear(speed_in * TP_MAGIC_SLOWDOWN) * TP_MAGIC_SLOWDOWN
    }

    /// These touchpads present a lower resolution than advertised, causing
    /// cursor jumps between reports. The compressed form of the linear
    /// profile below minimizes those jumps at low speed while keeping the
    /// regular touchpad feel at high speed. The values are trial-and-error
    /// against the hardware; no other meaning should be read into them.
    fn profile_lenovo_x230(&self, speed_in: f64) -> f64 {
        let max_accel = self.accel * TP_MAGIC_LOW_RES_FACTOR;
        let threshold = self.threshold / TP_MAGIC_LOW_RES_FACTOR;
        let incline = self.incline * TP_MAGIC_LOW_RES_FACTOR;

        let speed_in = speed_in * TP_MAGIC_SLOWDOWN / TP_MAGIC_LOW_RES_FACTOR;

        let f1 = (v_us2ms(speed_in) * 5.0).min(1.0);
        let f2 = 1.0 + (v_us2ms(speed_in) - v_us2ms(threshold)) * incline;

        let factor = if f2 > 1.0 { f2 } else { f1 }.min(max_accel);

        factor * TP_MAGIC_SLOWDOWN / TP_MAGIC_LOW_RES_FACTOR
    }

    /// Simpson's rule average of the profile between the previous motion and
    /// the most recent one.
    fn calculate_acceleration(&self, velocity: f64, last_velocity: f64) -> f64 {
        let mut factor = self.profile_factor(velocity);
        factor += self.profile_factor(last_velocity);
        factor += 4.0 * self.profile_factor((last_velocity + velocity) / 2.0);

        factor / 6.0
    }

    fn acceleration_factor(&mut self, unaccelerated: NormalizedCoords, time: u64) -> f64 {
        self.feed_trackers(unaccelerated, time);
        let velocity = self.calculate_velocity(time);
        let factor = self.calculate_acceleration(velocity, self.last_velocity);
        self.last_velocity = velocity;

        factor
    }
}

impl fmt::Debug for PointerAccelerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PointerAccelerator")
            .field("profile", &self.profile)
            .field("threshold", &self.threshold)
            .field("accel", &self.accel)
            .field("incline", &self.incline)
            .field("speed_adjustment", &self.speed_adjustment)
            .finish()
    }
}

impl MotionFilter for PointerAccelerator {
    fn filter(&mut self, unaccelerated: NormalizedCoords, time: u64) -> NormalizedCoords {
        let input = if self.profile == AccelProfile::LinearLowDpi {
            // Low-dpi mice work in device units, everything else in
            // 1000 DPI normalized units.
            let dpi_factor = self.dpi_factor.min(1.0);
            NormalizedCoords::new(unaccelerated.x * dpi_factor, unaccelerated.y * dpi_factor)
        } else {
            unaccelerated
        };

        let factor = self.acceleration_factor(input, time);

        NormalizedCoords::new(factor * input.x, factor * input.y)
    }

    fn restart(&mut self, time: u64) {
        for offset in 1..NUM_POINTER_TRACKERS {
            let index = (self.cur_tracker + NUM_POINTER_TRACKERS - offset) % NUM_POINTER_TRACKERS;
            self.trackers[index] = PointerTracker::default();
        }

        self.trackers[self.cur_tracker] = PointerTracker {
            delta: NormalizedCoords::ZERO,
            time,
            dir: Direction::UNDEFINED,
        };
    }

    fn set_speed(&mut self, speed: f64) -> Result<(), ConfigError> {
        if !(-1.0..=1.0).contains(&speed) {
            return Err(ConfigError::SpeedOutOfRange(speed));
        }

        // The numbers below are nothing but trial-and-error magic; don't
        // read more into them other than "they mostly worked ok".

        // Delay before acceleration kicks in.
        self.threshold = (DEFAULT_THRESHOLD - v_ms2us(0.25) * speed).max(MINIMUM_THRESHOLD);
        // Maximum acceleration factor.
        self.accel = DEFAULT_ACCELERATION + speed * 1.5;
        // Higher speed: faster to reach the maximum.
        self.incline = DEFAULT_INCLINE + speed * 0.75;

        self.speed_adjustment = speed;
        Ok(())
    }

    fn speed(&self) -> f64 {
        self.speed_adjustment
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_constant(
        filter: &mut PointerAccelerator,
        delta: NormalizedCoords,
        start: u64,
        interval: u64,
        count: usize,
    ) -> NormalizedCoords {
        let mut out = NormalizedCoords::ZERO;
        for i in 0..count {
            out = filter.filter(delta, start + interval * i as u64);
        }
        out
    }

    #[test]
    fn linear_profile_shape() {
        let filter = PointerAccelerator::linear(1000);

        // Deceleration region: below 0.07 units/ms.
        assert!(filter.profile_linear(v_ms2us(0.01)) < 1.0);
        // Plateau: factor 1 up to the threshold.
        assert_eq!(filter.profile_linear(v_ms2us(0.2)), 1.0);
        assert_eq!(filter.profile_linear(v_ms2us(0.39)), 1.0);
        // Acceleration region.
        assert!(filter.profile_linear(v_ms2us(1.0)) > 1.0);
        // Cap.
        assert_eq!(filter.profile_linear(v_ms2us(100.0)), DEFAULT_ACCELERATION);
    }

    #[test]
    fn touchpad_profile_is_slower() {
        let filter = PointerAccelerator::touchpad(1000);
        let speed = v_ms2us(0.5);
        assert!(filter.profile_touchpad(speed) < filter.profile_linear(speed));
        // In the scaled plateau the factor is exactly the magic slowdown.
        assert_eq!(filter.profile_touchpad(v_ms2us(0.5)), TP_MAGIC_SLOWDOWN);
    }

    #[test]
    fn x230_profile_is_capped() {
        let filter = PointerAccelerator::lenovo_x230(1000);
        let fast = filter.profile_lenovo_x230(v_ms2us(1000.0));
        let expected_cap = DEFAULT_ACCELERATION * TP_MAGIC_LOW_RES_FACTOR * TP_MAGIC_SLOWDOWN
            / TP_MAGIC_LOW_RES_FACTOR;
        assert!((fast - expected_cap).abs() < 1e-9);
    }

    #[test]
    fn velocity_of_constant_motion() {
        let mut filter = PointerAccelerator::linear(1000);
        filter.restart(0);
        // 10 units every 10ms comes out as 1 unit/ms.
        feed_constant(&mut filter, NormalizedCoords::new(10.0, 0.0), 10_000, 10_000, 6);
        assert!((v_us2ms(filter.last_velocity) - 1.0).abs() < 0.1);
    }

    #[test]
    fn restart_forgets_history() {
        let mut filter = PointerAccelerator::linear(1000);
        feed_constant(&mut filter, NormalizedCoords::new(50.0, 0.0), 0, 10_000, 8);
        filter.restart(100_000);
        // Only the current tracker survives, stamped with the restart time
        // and no usable direction.
        assert!(filter.tracker_by_offset(0).dir.is_undefined());
        assert!(filter.tracker_by_offset(1).delta.is_zero());
        assert_eq!(filter.tracker_by_offset(1).time, 0);
    }

    #[test]
    fn speed_adjustment_clamps_threshold() {
        let mut filter = PointerAccelerator::touchpad(1000);
        filter.set_speed(1.0).unwrap();
        assert_eq!(filter.threshold, MINIMUM_THRESHOLD);
        assert_eq!(filter.accel, 3.5);
        assert!((filter.incline - 1.85).abs() < 1e-9);
        assert_eq!(filter.speed(), 1.0);
    }

    #[test]
    fn speed_out_of_range_is_rejected() {
        let mut filter = PointerAccelerator::touchpad(1000);
        assert!(filter.set_speed(1.5).is_err());
        assert!(filter.set_speed(-2.0).is_err());
        assert!(filter.set_speed(-1.0).is_ok());
    }

    #[test]
    fn unaccelerated_passthrough() {
        let mut filter = PointerAccelerator::touchpad(1000);
        let delta = NormalizedCoords::new(3.0, -4.0);
        assert_eq!(filter.filter_unaccelerated(delta, 1000), delta);
    }

    #[test]
    fn motion_after_pause_is_responsive() {
        let mut filter = PointerAccelerator::linear(1000);
        filter.restart(0);
        feed_constant(&mut filter, NormalizedCoords::new(10.0, 0.0), 10_000, 10_000, 4);

        // Long pause, then one motion: the velocity is computed against the
        // motion timeout, not the stale tracker age.
        filter.filter(NormalizedCoords::new(10.0, 0.0), 5_000_000);
        assert!(filter.last_velocity > 0.0);
    }
}
