//! Contracts for the peer subsystems consulted during frame processing.
//!
//! Tapping and edge scrolling are full state machines of their own and live
//! outside this crate. The core only needs a handful of narrow capabilities
//! from them, expressed as the traits below; the no-op implementations are
//! used when a peer is absent. The core never reaches into peer state, and
//! peers mutate only within their own step of the frame pipeline.

use std::fmt;

use super::touch::Touch;

/// Capabilities the tap-and-drag state machine exposes to the core.
pub trait TapPeer: fmt::Debug {
    /// Runs the tap state machine for this frame.
    ///
    /// Returns `true` if tap handling consumed the motion and pointer,
    /// scroll and gesture events must be filtered this frame.
    fn handle_state(&mut self, _now: u64) -> bool {
        false
    }

    /// Whether a tap-and-drag is currently in progress.
    fn is_dragging(&self) -> bool {
        false
    }

    /// Stops tap processing until [`TapPeer::resume`] is called.
    fn suspend(&mut self, _now: u64) {}

    /// Resumes tap processing.
    fn resume(&mut self, _now: u64) {}

    /// Flushes pending tap state, triggering any final events.
    fn release_all(&mut self, _now: u64) {}
}

/// Capabilities the edge-scroll subsystem exposes to the core.
pub trait EdgeScrollPeer: fmt::Debug {
    /// Whether this touch may contribute to pointer motion and gestures.
    ///
    /// A touch captured by an edge-scroll zone is not available to the rest
    /// of the pipeline.
    fn touch_active(&self, _touch: &Touch) -> bool {
        true
    }

    /// Whether this touch currently sits on the right physical edge.
    fn touch_in_right_edge(&self, _touch: &Touch) -> bool {
        false
    }

    /// Runs the edge-scroll state machine for this frame.
    fn handle_state(&mut self, _now: u64) {}

    /// Posts this frame's edge-scroll events.
    ///
    /// Returns `true` if edge scrolling handled the motion, in which case no
    /// gesture or pointer events are posted this frame.
    fn post_events(&mut self, _now: u64) -> bool {
        false
    }

    /// Ends any in-progress edge scroll, posting the terminating event.
    fn stop_events(&mut self, _now: u64) {}
}

/// Tap peer used when tapping is not configured.
#[derive(Debug, Default)]
pub struct NoTap;

impl TapPeer for NoTap {}

/// Edge-scroll peer used when edge scrolling is not configured.
#[derive(Debug, Default)]
pub struct NoEdgeScroll;

impl EdgeScrollPeer for NoEdgeScroll {}
