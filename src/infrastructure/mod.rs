//! Infrastructure layer - backends, services and logging

pub mod cache;
pub mod logging;
pub mod services;
