//! Core business logic: step model, reconciler, artifact rendering and checks.

pub mod action;
pub mod audit_log;
pub mod backup;
pub mod config_file;
pub mod diff;
pub mod file_lock;
pub mod inspect;
pub mod paths;
pub mod preflight;
pub mod provision;
pub mod reconcile;
pub mod render;
pub mod sshd;
pub mod step;
