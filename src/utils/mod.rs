//! Utility helpers.

pub mod chinese;
pub mod duration;
