//! Utility functions and helpers.

pub mod clock;
pub mod http;
pub mod log;
pub mod text;

pub use text::normalize;
