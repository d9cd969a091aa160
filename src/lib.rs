#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]
#![allow(clippy::upper_case_acronyms)]

//! # mt-touchpad: multi-touch touchpad event processing
//!
//! This crate turns the raw multi-touch event stream of a touchpad (per-slot
//! finger positions, pressure, tool-type signals, button presses) into a
//! semantically typed pointer and gesture event stream: pointer motion,
//! finger scrolling, pinch and swipe gestures, physical button events, and
//! suppression of spurious input while a keyboard is typing or a trackpoint
//! is in use.
//!
//! ## Structure of the crate
//!
//! The entry point is [`touchpad::Touchpad`]. It is fed typed input events
//! ([`touchpad::InputEvent`]) carrying monotonic microsecond timestamps, one
//! synchronization frame at a time, and queues output events ([`event::Event`])
//! that the embedding event loop drains with [`touchpad::Touchpad::poll_event`].
//!
//! Internally, every frame runs through a fixed pipeline: the slot table
//! absorbs the raw events (including devices that fake multi-touch with
//! tool-count bits), per-touch classifiers tag palms, thumbs and pinned
//! fingers, the gesture state machine disambiguates scroll, swipe and pinch,
//! and the pointer-acceleration filter in [`filter`] shapes the resulting
//! deltas.
//!
//! ## The event loop and time
//!
//! The crate performs no I/O and owns no file descriptors. It is driven
//! cooperatively by an external event loop: the loop feeds device events as
//! they arrive and, between frames, asks
//! [`touchpad::Touchpad::next_timer_deadline`] when to wake up next and calls
//! [`touchpad::Touchpad::dispatch_timers`] once that deadline has passed.
//! All timestamps are microseconds on the monotonic clock; the canonical
//! source of "now" is the event stream itself.

pub mod config;
pub mod device;
pub mod event;
pub mod filter;
pub mod touchpad;
pub mod utils;
