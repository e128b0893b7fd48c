//! `cybermem tools`: Show the tool surface handed to scripts.

use cybermem_tools::default_registry;
use std::path::Path;

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    let memory = super::open_memory(&config).await?;
    let registry = default_registry(memory.store());
    println!("{}", serde_json::to_string_pretty(&registry.definitions())?);
    Ok(())
}
