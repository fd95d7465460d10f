//! Runtime configuration
//!
//! Sources, lowest precedence first:
//! 1. Built-in defaults
//! 2. `dream.toml` in the working directory, or the file given explicitly
//! 3. `DREAM_*` environment variables (a `.env` file is loaded first)

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::context::DEFAULT_MAX_STACK_DEPTH;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Activations allowed per execution context
    pub max_stack_depth: usize,

    /// Scheduler tick length in milliseconds
    pub tick_ms: u64,

    /// Tracing filter used when `RUST_LOG` is not set
    pub log_filter: String,

    /// Stop the tick driver after this many ticks
    pub max_ticks: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_stack_depth: DEFAULT_MAX_STACK_DEPTH,
            tick_ms: 50,
            log_filter: "info".to_string(),
            max_ticks: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    pub fn load_from(path: Option<&str>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let file = match path {
            Some(path) => config::File::with_name(path).required(true),
            None => config::File::with_name("dream").required(false),
        };

        let config: Config = config::Config::builder()
            .add_source(file)
            .add_source(config::Environment::with_prefix("DREAM").try_parsing(true))
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;

        if config.max_stack_depth == 0 {
            anyhow::bail!("max_stack_depth must be at least 1");
        }

        Ok(config)
    }
}
