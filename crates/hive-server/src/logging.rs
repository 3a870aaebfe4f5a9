//! Tracing subscriber setup.

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::HubConfig;

/// Install the global subscriber. `RUST_LOG` overrides the configured level.
pub fn init(config: &HubConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.log_level)
            .with_context(|| format!("invalid log level {:?}", config.log_level))?,
    };

    let registry = tracing_subscriber::registry().with(filter);
    if config.log_json {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .try_init()
            .context("tracing already initialised")?;
    } else {
        registry
            .with(fmt::layer())
            .try_init()
            .context("tracing already initialised")?;
    }
    Ok(())
}
