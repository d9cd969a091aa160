//! Finger-scroll emission.
//!
//! The gesture machine computes scroll deltas; this facade turns them into
//! per-axis pointer events. Scrolling starts once the buildup on an axis
//! passes the configured threshold (touchpads use 0, so the first real delta
//! starts it) and is terminated by a 0-valued event so consumers can trigger
//! kinetic scrolling.

use crate::config::ScrollMethod;
use crate::event::{Axis, AxisSource, Event};
use crate::utils::NormalizedCoords;

use super::Touchpad;

/// Motion a scroll sequence must build up before an axis starts scrolling,
/// in normalized units.
const DEFAULT_SCROLL_THRESHOLD: f64 = 0.0;
/// Speed required to open the second axis once one axis is scrolling.
const DEFAULT_DIRECTION_LOCK_THRESHOLD: f64 = 5.0;

#[derive(Debug, Clone)]
pub(crate) struct ScrollState {
    pub(crate) method: ScrollMethod,
    pub(crate) natural_scrolling_enabled: bool,
    /// Accumulated motion on axes that are not yet scrolling.
    pub(crate) buildup: NormalizedCoords,
    threshold: f64,
    direction_lock_threshold: f64,
    scrolling_horizontal: bool,
    scrolling_vertical: bool,
}

impl ScrollState {
    pub(crate) fn new(method: ScrollMethod, natural: bool) -> Self {
        ScrollState {
            method,
            natural_scrolling_enabled: natural,
            buildup: NormalizedCoords::ZERO,
            threshold: DEFAULT_SCROLL_THRESHOLD,
            direction_lock_threshold: DEFAULT_DIRECTION_LOCK_THRESHOLD,
            scrolling_horizontal: false,
            scrolling_vertical: false,
        }
    }

    fn is_scrolling(&self) -> bool {
        self.scrolling_horizontal || self.scrolling_vertical
    }
}

impl Touchpad {
    /// Posts finger-scroll motion, starting axes as their triggers are met.
    pub(super) fn post_scroll(&mut self, time: u64, delta: NormalizedCoords) {
        let scroll = &mut self.scroll;

        if !scroll.scrolling_vertical {
            scroll.buildup.y += delta.y;
        }
        if !scroll.scrolling_horizontal {
            scroll.buildup.x += delta.x;
        }

        if !scroll.is_scrolling() {
            // Not scrolling yet: a distance trigger starts scrolling.
            if scroll.buildup.y.abs() >= scroll.threshold {
                scroll.scrolling_vertical = true;
            }
            if scroll.buildup.x.abs() >= scroll.threshold {
                scroll.scrolling_horizontal = true;
            }
        } else {
            // Already scrolling in one direction: require some speed before
            // opening the other axis.
            if !scroll.scrolling_vertical && delta.y.abs() >= scroll.direction_lock_threshold {
                scroll.scrolling_vertical = true;
            }
            if !scroll.scrolling_horizontal && delta.x.abs() >= scroll.direction_lock_threshold {
                scroll.scrolling_horizontal = true;
            }
        }

        let mut event = delta;
        if !scroll.scrolling_vertical {
            event.y = 0.0;
        }
        if !scroll.scrolling_horizontal {
            event.x = 0.0;
        }

        if !event.is_zero() {
            if event.y != 0.0 {
                self.notify_axis(time, Axis::Vertical, event.y);
            }
            if event.x != 0.0 {
                self.notify_axis(time, Axis::Horizontal, event.x);
            }
        }
    }

    /// Terminates an active finger-scroll sequence with 0-valued events.
    pub(super) fn stop_scroll(&mut self, time: u64) {
        if self.scroll.scrolling_vertical {
            self.notify_axis(time, Axis::Vertical, 0.0);
        }
        if self.scroll.scrolling_horizontal {
            self.notify_axis(time, Axis::Horizontal, 0.0);
        }

        self.scroll.scrolling_vertical = false;
        self.scroll.scrolling_horizontal = false;
        self.scroll.buildup = NormalizedCoords::ZERO;
    }

    fn notify_axis(&mut self, time: u64, axis: Axis, value: f64) {
        let value = if self.scroll.natural_scrolling_enabled {
            -value
        } else {
            value
        };

        self.queue.push_back(Event::PointerAxis {
            time,
            axis,
            source: AxisSource::Finger,
            value,
        });
    }
}
