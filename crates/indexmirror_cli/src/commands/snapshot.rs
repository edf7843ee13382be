//! Snapshot command implementation.

use super::connect;
use indexmirror_core::{CacheStats, CacheStore};
use indexmirror_sync::{SyncConfig, SyncDriver};
use serde::Serialize;

/// Snapshot result.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotResult {
    /// Endpoint that was loaded.
    pub endpoint: String,
    /// Checkpoint the snapshot was taken at, if the remote reported one.
    pub checkpoint: Option<u64>,
    /// Cache contents after the load.
    pub cache: CacheStats,
}

/// Runs the snapshot command.
pub async fn run(
    endpoint: &str,
    kind: Option<&str>,
    page_size: u32,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let kind = kind.map(CacheStore::resolve_kind).transpose()?;

    let config = SyncConfig::new(endpoint).with_page_size(page_size);
    let source = connect(&config)?;
    let driver = SyncDriver::new(config, source);
    let checkpoint = driver.initialize().await?;

    let mut cache = driver.store().stats();
    if let Some(kind) = kind {
        cache.entities.retain(|name, _| *name == kind.name());
    }

    let result = SnapshotResult {
        endpoint: endpoint.to_owned(),
        checkpoint,
        cache,
    };

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_text_output(&result);
    }
    Ok(())
}

fn print_text_output(result: &SnapshotResult) {
    println!("indexmirror snapshot");
    println!("====================");
    println!();
    println!("Endpoint:   {}", result.endpoint);
    match result.checkpoint {
        Some(checkpoint) => println!("Checkpoint: {checkpoint}"),
        None => println!("Checkpoint: (not reported)"),
    }
    println!("Total:      {} records", result.cache.total_records);
    println!();
    println!("Entities:");
    for (name, count) in &result.cache.entities {
        println!("  {name:<24} {count}");
    }
}
