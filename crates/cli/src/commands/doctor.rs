//! `cybermem doctor`: Diagnose config and store health.

use cybermem_memory::SnapshotFile;
use std::path::Path;

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 cybermem Doctor — System Diagnostics");
    println!("======================================\n");

    let mut issues = 0;

    let config = match super::load_config(config_path) {
        Ok(config) => {
            println!("  ✅ Config valid");
            config
        }
        Err(e) => {
            println!("  ❌ {e}");
            println!("\n  ⚠️  Fix the config before anything else.");
            return Ok(());
        }
    };

    // Namespace roots
    for (name, dir) in [("personal", config.personal_dir()), ("grid", config.grid_dir())] {
        if dir.is_dir() {
            println!("  ✅ {name}/ root: {}", dir.display());
        } else {
            println!("  ❌ Missing {name}/ root at {} — run `cybermem init`", dir.display());
            issues += 1;
        }
    }

    // Snapshot
    let snapshot_path = config.snapshot_path();
    if !snapshot_path.exists() {
        println!("  ⚠️  No snapshot yet (written on first checkpoint)");
    } else {
        match SnapshotFile::load(&snapshot_path) {
            Some(snapshot) => println!(
                "  ✅ Snapshot readable: {} blocks, budget {}",
                snapshot.memories.len(),
                snapshot.max_tokens
            ),
            None => {
                println!("  ❌ Snapshot unreadable — the next run starts fresh");
                issues += 1;
            }
        }
    }

    // Leftovers from interrupted transactions
    let holding = config.holding_dir();
    if holding.is_dir() {
        let parked = std::fs::read_dir(&holding)?.count();
        if parked > 0 {
            println!(
                "  ⚠️  {parked} parked directory tree(s) in {} from an interrupted transaction",
                holding.display()
            );
            issues += 1;
        }
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
