//! Sparse visual feature tracking front-end.
//!
//! This crate turns a stream of synchronized grayscale camera frames into per-frame bags of
//! persistent 2D landmarks for consumption by a visual-inertial state estimator. Per frame it
//!
//! - propagates known landmarks with pyramidal Lucas-Kanade optical flow (optionally warm-started
//!   from an externally supplied motion prediction),
//! - rejects geometric outliers with a forward/backward consistency check and a fundamental-matrix
//!   RANSAC,
//! - keeps the landmark set bounded and spatially spread out by suppressing crowded tracks and
//!   detecting new Shi-Tomasi corners where there is room,
//! - lifts pixel coordinates onto the normalized camera plane through a pluggable intrinsic model,
//!   and
//! - estimates each landmark's velocity on that plane.
//!
//! The central type is [`Tracker`]; [`input::Pipeline`] wraps it in the frame-synchronization
//! threads used when the two camera streams arrive independently.

pub mod camera;
mod config;
pub mod detect;
pub mod flow;
pub mod frame;
pub mod fundamental;
pub mod input;
pub mod mask;
mod overlay;
mod store;
mod tracker;

pub use config::TrackerConfig;
pub use frame::{FeatureFrame, Observation};
pub use tracker::Tracker;

pub use kestrel_image::{Canvas, Image};
