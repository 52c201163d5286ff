//! Application services and seams between the cache core and its collaborators.

pub mod error;
pub mod loader;
