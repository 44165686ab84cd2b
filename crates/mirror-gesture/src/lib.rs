//! Canvas/device coordinate mapping and tap/swipe classification.

pub mod classifier;
pub mod layout;
pub mod tracker;

pub use classifier::GestureClassifier;
pub use layout::{CoordinateMapper, Layout};
pub use tracker::PointerTracker;
