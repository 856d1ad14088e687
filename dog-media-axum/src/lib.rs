//! dog-media-axum: HTTP surface for dog-media.
//!
//! Exposes chunk upload, assembly, upload status and byte-range streaming
//! routes over an embedded [`MediaAdapter`](dog_media::MediaAdapter).

pub mod app;
pub mod config;
mod error;
pub mod rest;
mod state;

use std::sync::Arc;

use dog_media::{MediaAdapter, MemoryMetadataStore};
use tracing::info;

pub use app::MediaApp;
pub use config::ServerConfig;
pub use error::MediaHttpError;
pub use state::MediaState;

/// Build the server app: create the storage roots, recover staged
/// uploads and wire the in-memory metadata store.
pub async fn build(config: &ServerConfig) -> anyhow::Result<MediaApp> {
    tokio::fs::create_dir_all(&config.media.staging_dir).await?;
    tokio::fs::create_dir_all(&config.media.objects_dir).await?;

    let records = Arc::new(MemoryMetadataStore::new());
    let media = MediaAdapter::from_config(config.media.clone())
        .with_metadata_store(records.clone())
        .with_view_hook(records);

    let restored = media.recover().await?;
    if restored > 0 {
        info!(restored, "Recovered staged uploads");
    }

    Ok(MediaApp::new(media))
}
