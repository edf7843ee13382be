//! CLI command implementations.

pub mod probe;
pub mod run;
pub mod snapshot;

use indexmirror_sync::{GraphqlSource, ReqwestClient, SyncConfig};

/// Builds the HTTP-backed source described by `config`.
pub fn connect(config: &SyncConfig) -> Result<GraphqlSource<ReqwestClient>, Box<dyn std::error::Error>> {
    let client = ReqwestClient::new(&config.user_agent, config.retry.attempt_timeout)?;
    Ok(GraphqlSource::new(
        config.endpoint.clone(),
        client,
        config.retry.clone(),
    ))
}
