//! Configuration management for the beads system.
//!
//! This crate handles loading and saving `.beads/config.yaml` files,
//! discovering `.beads/` directories in the filesystem, and providing
//! typed access to beads configuration values.

pub mod beads_dir;
pub mod config;

pub use config::{BeadsConfig, ConfigError, DaemonConfig, SyncConfig};
