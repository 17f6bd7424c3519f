//! Background index rebuilds.
//!
//! Compilation runs on tokio's blocking pool while the engine keeps serving
//! the previous index. The result is published only if no newer build was
//! started in the meantime.

use std::sync::Arc;

use log::debug;
use sb_core::engine::Engine;
use sb_core::snapshot::{deserialize, SnapshotError};

use crate::builder::compile_filter_lists;

#[derive(Debug, thiserror::Error)]
pub enum ReloadError {
    #[error("Failed to load snapshot: {0}")]
    Snapshot(#[from] SnapshotError),
    #[error("Build worker failed: {0}")]
    Worker(String),
}

/// Recompile `sources` and publish the result. Returns `Ok(false)` when the
/// build was superseded and discarded.
pub async fn rebuild(engine: Arc<Engine>, sources: Vec<String>) -> Result<bool, ReloadError> {
    let ticket = engine.begin_build();
    debug!("Starting build {} from {} lists", ticket.generation(), sources.len());

    let index = tokio::task::spawn_blocking(move || {
        let lists: Vec<&str> = sources.iter().map(String::as_str).collect();
        compile_filter_lists(&lists)
    })
    .await
    .map_err(|e| ReloadError::Worker(e.to_string()))?;

    Ok(engine.publish(ticket, index))
}

/// Decode a snapshot off the async runtime and publish it. A snapshot that
/// fails to load leaves the live index in place.
pub async fn reload_snapshot(engine: Arc<Engine>, data: Vec<u8>) -> Result<bool, ReloadError> {
    let ticket = engine.begin_build();

    let index = tokio::task::spawn_blocking(move || deserialize(&data))
        .await
        .map_err(|e| ReloadError::Worker(e.to_string()))??;

    Ok(engine.publish(ticket, index))
}
