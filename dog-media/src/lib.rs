//! # dog-media: Resumable chunked uploads and byte-range streaming
//!
//! `dog-media` takes large media files uploaded as independently sent,
//! numbered chunks, assembles them into one durable object, and serves that
//! object back with HTTP byte-range semantics for seekable playback.
//!
//! ## Key Features
//!
//! - **Resumable**: chunks arrive in any order, may be resent, and survive a restart
//! - **All-or-nothing assembly**: objects are concatenated into a temp file and renamed into place
//! - **Streaming-first**: concatenation and serving use bounded buffers regardless of size
//! - **Exclusive assembly**: a per-upload state machine rejects duplicate or late work
//! - **Range requests**: single `bytes=` ranges with 200/206/416 semantics
//! - **Server agnostic**: no HTTP coupling; see `dog-media-axum` for the HTTP surface
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dog_media::prelude::*;
//!
//! # #[tokio::main]
//! # async fn main() -> MediaResult<()> {
//! let media = MediaAdapter::from_config(MediaConfig::rooted_at("data"));
//! let upload = UploadId::parse("holiday.mp4")?;
//!
//! for (index, part) in [&b"first "[..], &b"second"[..]].into_iter().enumerate() {
//!     let body = futures_util::stream::once(async move { Ok::<_, std::io::Error>(bytes::Bytes::from(part)) });
//!     media.receive_chunk(&upload, index as u32, Box::pin(body)).await?;
//! }
//!
//! let object = media.assemble(&upload, 2, MediaMetadata::new().with_title("Holiday")).await?;
//! let response = media.serve(&object.id, Some("bytes=0-4")).await?;
//! assert_eq!(response.status, 206);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │               MediaAdapter               │  ← what services embed
//! ├──────────────┬─────────────┬─────────────┤
//! │ ChunkReceiver│  Assembler  │StreamServer │
//! ├──────────────┴──────┬──────┴─────────────┤
//! │   SessionRegistry   │    RangeResolver   │
//! ├─────────────────────┼────────────────────┤
//! │     ChunkStore      │    ObjectStore     │  ← storage primitives
//! └─────────────────────┴────────────────────┘
//! ```

mod adapter;
mod assembler;
mod config;
mod error;
mod fs_store;
mod hooks;
pub mod mime;
mod object;
pub mod range;
mod receiver;
pub mod registry;
pub mod store;
mod stream;
mod types;

pub use adapter::MediaAdapter;
pub use assembler::Assembler;
pub use config::MediaConfig;
pub use error::{MediaError, MediaResult};
pub use fs_store::{FsChunkStore, FsObjectStore};
pub use hooks::{MemoryMetadataStore, MetadataStore, ViewHook};
pub use object::{AssembledObject, MediaRecord};
pub use range::{resolve_range, RangeResolution, RangeWindow};
pub use receiver::ChunkReceiver;
pub use registry::{SessionRegistry, UploadSession, UploadState};
pub use store::{ChunkStore, ObjectHead, ObjectStore, PublishedObject};
pub use stream::{StreamResponse, StreamServer};
pub use types::{parse_chunk_index, ByteStream, ChunkAck, MediaMetadata, ObjectId, UploadId};

/// Convenient imports
pub mod prelude {
    pub use crate::{
        AssembledObject, ByteStream, ChunkAck, MediaAdapter, MediaConfig, MediaError,
        MediaMetadata, MediaResult, ObjectId, StreamResponse, UploadId, UploadSession,
        UploadState,
    };
}
