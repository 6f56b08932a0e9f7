//! Core resolution logic.

pub mod circuit_breaker;
pub mod fallback;
pub mod keywords;
pub mod merger;
pub mod orchestrator;
