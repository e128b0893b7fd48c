//! `cybermem memory`: Working-memory inspection commands.

use cybermem_agent::SelectionStrategy;
use cybermem_core::{ContentType, MemoryItem};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Command-line overrides for `memory select`.
pub struct SelectOverrides {
    pub strategy: Option<String>,
    pub max_tokens: Option<usize>,
    pub render: bool,
}

pub async fn stats(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    let memory = super::open_memory(&config).await?;
    let store = memory.store();
    let store = store.lock().await;
    let registry = store.registry();

    let mut by_type: BTreeMap<&str, usize> = BTreeMap::new();
    for block in registry.iter() {
        *by_type.entry(block.content_type().mime()).or_default() += 1;
    }
    let pinned = registry.iter().filter(|b| b.pinned()).count();
    let cache = store.loader().stats();

    println!("🧠 Working Memory Statistics");
    println!("============================");
    println!("  Base dir:   {}", config.base_dir().display());
    println!("  Budget:     {} tokens ({})", memory.max_tokens(), memory.strategy());
    if let Some(task) = memory.current_task_id() {
        println!("  Task:       {task}");
    }
    if !memory.active_topics().is_empty() {
        println!("  Topics:     {}", memory.active_topics().join(", "));
    }
    println!("  Blocks:     {} ({pinned} pinned)", registry.len());
    for (ty, count) in &by_type {
        println!("    {ty:<32} {count}");
    }
    println!(
        "  Cache:      {} entries, {} hits, {} misses",
        cache.entries, cache.hits, cache.misses
    );

    let snapshot = config.snapshot_path();
    if snapshot.exists() {
        let size_kb = std::fs::metadata(&snapshot)?.len() as f64 / 1024.0;
        println!("  Snapshot:   {} ({size_kb:.1} KB)", snapshot.display());
    } else {
        println!("  Snapshot:   (not written yet)");
    }

    Ok(())
}

pub async fn list(
    config_path: Option<&Path>,
    content_type: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    let filter = content_type.map(parse_content_type).transpose()?;
    let memory = super::open_memory(&config).await?;
    let store = memory.store();
    let store = store.lock().await;
    let registry = store.registry();

    let blocks = match filter {
        Some(ty) => registry.list_by_type(ty),
        None => registry.blocks(),
    };
    if blocks.is_empty() {
        println!("   No blocks registered.");
        return Ok(());
    }

    for block in blocks {
        let pin = if block.pinned() { "📌" } else { "  " };
        let seen = block
            .header()
            .timestamp
            .map(|ts| ts.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".into());
        println!(
            "  {pin} {:<13} {:.2}  {:<32} {seen}  {}",
            block.priority().name(),
            block.confidence(),
            block.content_type().mime(),
            block.id()
        );
    }

    Ok(())
}

pub async fn select(
    config_path: Option<&Path>,
    keywords: &[String],
    overrides: SelectOverrides,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    let mut memory = super::open_memory(&config).await?;
    if let Some(strategy) = overrides.strategy {
        memory.set_strategy(strategy.parse::<SelectionStrategy>()?);
    }
    if let Some(max_tokens) = overrides.max_tokens {
        memory.set_max_tokens(max_tokens);
    }

    let keywords: Vec<String> = keywords.iter().map(|k| k.to_lowercase()).collect();
    debug!(?keywords, strategy = %memory.strategy(), max_tokens = memory.max_tokens(), "Selecting");
    if overrides.render {
        print!("{}", memory.build_context(&keywords).await.render());
        return Ok(());
    }

    let report = memory.select(&keywords).await;
    println!(
        "🎯 Selection ({}, budget {} tokens): {} of {} blocks, ~{} tokens",
        report.strategy,
        report.max_tokens,
        report.selected.len(),
        report.candidates,
        report.total_tokens
    );
    if report.filtered_out > 0 {
        println!("   {} knowledge block(s) hidden by the tag filter", report.filtered_out);
    }
    if report.pinned_overflow {
        println!("   ⚠️  Pinned blocks alone exceed the budget");
    }
    for block in &report.selected {
        let pin = if block.pinned { "📌" } else { "  " };
        println!(
            "  {pin} [score: {:.2}] {:>6} tok  {:<13} {}",
            block.score,
            block.tokens,
            block.priority.name(),
            block.id
        );
    }

    Ok(())
}

pub async fn cleanup(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    let memory = super::open_memory(&config).await?;
    let removed = memory.cleanup().await;
    memory.checkpoint().await?;
    println!("🧹 Removed {removed} expired block(s); snapshot written.");
    Ok(())
}

/// Accept a full MIME-like tag or a short name.
fn parse_content_type(raw: &str) -> Result<ContentType, String> {
    let ty = match raw.trim().to_lowercase().as_str() {
        "text" | "txt" => ContentType::TextPlain,
        "markdown" | "md" => ContentType::Markdown,
        "json" => ContentType::Json,
        "yaml" => ContentType::Yaml,
        "message" => ContentType::Message,
        "knowledge" => ContentType::Knowledge,
        "binary" => ContentType::OctetStream,
        other => other.parse()?,
    };
    Ok(ty)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_short_names() {
        assert_eq!(parse_content_type("knowledge").unwrap(), ContentType::Knowledge);
        assert_eq!(parse_content_type("MD").unwrap(), ContentType::Markdown);
        assert_eq!(
            parse_content_type("application/x-cyber-message").unwrap(),
            ContentType::Message
        );
        assert!(parse_content_type("video").is_err());
    }
}
