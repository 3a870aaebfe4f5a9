//! Command line arguments

use std::path::PathBuf;

use clap::Parser;

use crate::config::CliOverrides;

/// Hive hub - routes vehicles, pilots and dispatchers
#[derive(Parser, Debug)]
#[command(name = "hive-server")]
#[command(version, about = "Hive hub - routes vehicles, pilots and dispatchers")]
pub struct Cli {
    /// Config file path
    #[arg(long, short = 'c', env = "HIVE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Default log filter (RUST_LOG takes precedence)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub log_json: bool,

    /// Fence to install at startup (JSON array of two corner points)
    #[arg(long)]
    pub fence_file: Option<PathBuf>,

    /// Attach a simulated vehicle with this id
    #[arg(long, value_name = "VEHICLE_ID")]
    pub simulate: Option<String>,
}

impl Cli {
    pub fn overrides(&self) -> CliOverrides {
        CliOverrides {
            log_level: self.log_level.clone(),
            log_json: self.log_json,
            fence_file: self.fence_file.clone(),
            simulate: self.simulate.clone(),
        }
    }
}
