//! Everything that observes the user: periodic samplers, the idle accumulator and key capture.

pub mod browser;
pub mod collector;
pub mod idle;
pub mod keys;
pub mod window;
