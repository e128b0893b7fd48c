//! Subcommand implementations.

pub mod doctor;
pub mod init;
pub mod memory;
pub mod tools;

use cybermem_agent::WorkingMemory;
use cybermem_config::AppConfig;
use std::path::Path;
use tracing::info;

/// Load the configuration from `path`, or from the default location.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    };
    Ok(config.map_err(|e| format!("Failed to load config: {e}"))?)
}

/// Open working memory with the last snapshot and the bootstrap blocks.
pub async fn open_memory(config: &AppConfig) -> Result<WorkingMemory, Box<dyn std::error::Error>> {
    let mut memory = WorkingMemory::open(config)
        .map_err(|e| format!("{e} (run `cybermem init` to create the store)"))?;
    let restored = memory.restore().await;
    let pinned = memory.bootstrap().await;
    info!(
        base_dir = %config.base_dir().display(),
        restored,
        pinned,
        "Working memory opened"
    );
    Ok(memory)
}
