//! Baseline hardening for Debian/Ubuntu hosts that run one containerized service.
//!
//! `apply` walks nine fixed steps (packages, SSH, firewall, kernel, container
//! runtime, directories, manifest) through a reconciler that compares desired
//! state to the host before touching it, so re-runs converge without churn.
//!
//! ## Modules
//! - `cli`: Command-line handlers
//! - `core`: Step model, reconciler, rendering, verification, audit trail
//! - `models`: Config and artifact data structures
//! - `util`: System utilities (commands, fs, accounts)

pub mod cli;
pub mod constants;
pub mod core;
pub mod logging;
pub mod models;
pub mod util;
