// src/config.rs

//! File loading helpers shared by the CLI and library callers.

use std::path::Path;

use serde::Serialize;

use crate::error::Result;
use crate::models::{Config, GymStub};

/// Load and validate the configuration.
///
/// A missing file falls back to defaults; a malformed or invalid file is an
/// error, since bad thresholds are the one fatal condition of a run.
pub fn load_config(path: &Path) -> Result<Config> {
    let config = if path.exists() {
        Config::load(path)?
    } else {
        log::warn!("Config not found at {}. Using defaults.", path.display());
        Config::default()
    };
    config.validate()?;
    Ok(config)
}

/// Load the gym stubs to enrich.
pub fn load_stubs(path: &Path) -> Result<Vec<GymStub>> {
    let stubs = GymStub::load_all(path)?;
    log::info!("Loaded {} gyms from {}", stubs.len(), path.display());
    Ok(stubs)
}

/// Write `value` as pretty JSON, creating parent directories as needed.
pub async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let bytes = serde_json::to_vec_pretty(value)?;
    tokio::fs::write(path, bytes).await?;
    Ok(())
}
