//! Data structures for configuration and generated artifacts.

pub mod compose;
pub mod daemon;
pub mod host_config;
