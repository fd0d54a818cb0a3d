//! Utility modules for filesystem, process, and account operations.

pub mod command;
pub mod fs;
pub mod journald;
pub mod path;
pub mod privilege;
