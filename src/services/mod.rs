//! External service clients.

pub mod ollama;
pub mod tmdb;
