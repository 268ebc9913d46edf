//! Utility functions and helpers.

pub mod http;
pub mod log;
pub mod wait;

pub use wait::sleep_or_cancel;
