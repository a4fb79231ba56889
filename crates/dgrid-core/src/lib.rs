#![forbid(unsafe_code)]

//! Core: geometry, input modifiers, and update throttling.
//!
//! # Role in dgrid
//! `dgrid-core` holds the leaf types shared by the layout engine and its
//! hosts. It has no knowledge of panels, stores, or sessions.
//!
//! # Primary responsibilities
//! - **Geometry**: [`Position`], [`Size`], [`Delta`], and [`Bounds`] in
//!   real-valued workspace coordinates.
//! - **Input**: [`Modifiers`] snapshots and [`NudgeDirection`] for keyboard
//!   moves.
//! - **Throttling**: [`CommitThrottle`] coalesces preview updates so the
//!   view layer sees at most one per frame.

pub mod geometry;
pub mod input;
pub mod throttle;

pub use geometry::{Bounds, Delta, Position, Size};
pub use input::{Modifiers, NudgeDirection};
pub use throttle::{CommitThrottle, DEFAULT_THROTTLE_INTERVAL};
