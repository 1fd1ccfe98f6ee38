//! Configuration, resource files, and world observation.

pub mod config;
pub mod resources;
pub mod world;
