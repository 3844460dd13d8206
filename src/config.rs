// src/config.rs

//! Configuration loading utilities.
//!
//! Convenience functions for loading the configuration file with or without
//! a fallback to defaults.

use std::path::Path;

use crate::error::{AppError, Result};
use crate::models::Config;

/// Load configuration from a TOML file.
///
/// Falls back to defaults if the file is missing or malformed.
pub fn load_config(path: &Path) -> Config {
    Config::load_or_default(path)
}

/// Load and validate configuration. Unlike [`load_config`], a missing or
/// malformed file is an error.
pub fn load_all(path: &Path) -> Result<Config> {
    let config = Config::load(path)
        .map_err(|e| AppError::config(format!("Failed to load {}: {e}", path.display())))?;
    config
        .validate()
        .map_err(|e| AppError::config(format!("Invalid configuration in {}: {e}", path.display())))?;
    Ok(config)
}
