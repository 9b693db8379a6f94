//! Loopgrid View - quantum-grid view model and engine reconciliation
//!
//! This crate keeps a local view model faithful to the audio engine by
//! polling complete snapshots and diffing them against persistent state.
//! The hard parts live here: phase-to-pixel mapping with position
//! stability, live waveform accumulation from sparse polls, ghost
//! repetition tiling, and stable clustering for stack buttons. Rendering
//! itself is out of scope; consumers read pixel-space geometry from the
//! [`model::ViewModel`] after each cycle.

pub mod config;
pub mod geometry;
pub mod ghosts;
pub mod model;
pub mod peaks;
pub mod stacks;
pub mod sync;
