//! Loopgrid Core - engine bridge interface for the loopgrid editor

pub mod client;
pub mod error;
pub mod protocol;
pub mod types;

pub use types::*;
