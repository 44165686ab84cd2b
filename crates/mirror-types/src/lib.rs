//! Shared domain types for the device mirror.

pub mod config;
pub mod frame;
pub mod geometry;
pub mod gesture;
pub mod telemetry;

mod errors;

pub use errors::{MirrorError, Result};
