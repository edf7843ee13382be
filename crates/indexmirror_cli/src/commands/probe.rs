//! Probe command implementation.

use super::connect;
use indexmirror_sync::{RemoteSource, SyncConfig};
use serde::Serialize;

/// Probe result.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResult {
    /// Endpoint that was queried.
    pub endpoint: String,
    /// Latest checkpoint reported by the remote.
    pub checkpoint: u64,
}

/// Runs the probe command.
pub async fn run(endpoint: &str, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = SyncConfig::new(endpoint);
    let source = connect(&config)?;
    let checkpoint = source.current_checkpoint().await?;

    let result = ProbeResult {
        endpoint: endpoint.to_owned(),
        checkpoint,
    };
    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{}: checkpoint {}", result.endpoint, result.checkpoint);
    }
    Ok(())
}
