//! Application layer: the background session task and its handle.

pub mod controller;
pub mod handle;

pub use controller::{ControllerConfig, SessionController};
pub use handle::TreadmillHandle;
