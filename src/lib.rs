//! Metadata Resolver Library
//!
//! Resolves movie and TV metadata across several sources with a fallback
//! chain, per-source circuit breakers, AI keyword retries and partial
//! result merging.

pub mod cli;
pub mod core;
pub mod error;
pub mod models;
pub mod preflight;
pub mod providers;
pub mod services;
pub mod utils;

pub use error::{Error, Result};
