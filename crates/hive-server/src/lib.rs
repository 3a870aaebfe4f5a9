//! Hive Server - composition root for the vehicle hub.
//!
//! This crate provides:
//! - Layered configuration (defaults, TOML, environment, command line)
//! - Tracing subscriber setup
//! - The [`Hub`] wiring store, telemetry, fence, task pool and actors
//! - A simulated vehicle for hardware-free runs

#![forbid(unsafe_code)]

pub mod cli;
pub mod config;
pub mod hub;
pub mod logging;
pub mod sim;

pub use cli::Cli;
pub use config::{CliOverrides, ConfigError, HubConfig};
pub use hub::{Hub, HubError};
