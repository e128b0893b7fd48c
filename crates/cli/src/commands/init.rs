//! `cybermem init`: First-time setup.

use cybermem_agent::context::IDENTITY_FILE;
use cybermem_config::AppConfig;
use std::path::Path;

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = match config_path {
        Some(path) => path.to_path_buf(),
        None => AppConfig::config_dir().join("config.toml"),
    };
    let config = super::load_config(Some(config_path.as_path()))?;

    println!("cybermem — First-Time Setup");
    println!("===========================\n");

    if let Some(dir) = config_path.parent()
        && !dir.exists()
    {
        std::fs::create_dir_all(dir)?;
        println!("✅ Created config directory: {}", dir.display());
    }

    // Namespace roots and the protected subtree
    let protected = config.personal_dir().join(&config.store.protected_marker);
    for dir in [&protected, &config.grid_dir()] {
        if dir.exists() {
            println!("  Directory exists: {}", dir.display());
        } else {
            std::fs::create_dir_all(dir)?;
            println!("✅ Created {}", dir.display());
        }
    }

    // The identity file lives in the protected subtree, so the store never writes it
    let identity_path = protected.join(IDENTITY_FILE);
    if !identity_path.exists() {
        let identity = serde_json::json!({
            "name": "cyber",
            "role": "autonomous agent",
            "home": "personal/",
            "shared": "grid/",
        });
        std::fs::write(&identity_path, serde_json::to_string_pretty(&identity)?)?;
        println!("✅ Created {IDENTITY_FILE}");
    }

    if config_path.exists() {
        println!("\n⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete and re-run init.\n");
    } else {
        std::fs::write(&config_path, AppConfig::default_toml())?;
        println!("✅ Created config.toml at: {}", config_path.display());
    }

    println!("🎉 Setup complete! Run `cybermem doctor` to verify.\n");
    Ok(())
}
