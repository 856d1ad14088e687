use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ByteStream, MediaResult, ObjectId, UploadId};

/// Staging area for chunk payloads, partitioned by upload id
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Store one chunk verbatim, replacing any earlier payload for the same
    /// key. Returns the stored byte length. A failed or oversized write
    /// leaves nothing behind under the chunk's key.
    async fn write_chunk(
        &self,
        upload_id: &UploadId,
        chunk_index: u32,
        body: ByteStream,
        max_bytes: u64,
    ) -> MediaResult<u64>;

    /// Size of a stored chunk, `None` when it does not exist
    async fn chunk_len(&self, upload_id: &UploadId, chunk_index: u32) -> MediaResult<Option<u64>>;

    /// Open a stored chunk for streaming
    async fn open_chunk(&self, upload_id: &UploadId, chunk_index: u32) -> MediaResult<ByteStream>;

    /// Delete a stored chunk. Deleting a missing chunk is not an error.
    async fn delete_chunk(&self, upload_id: &UploadId, chunk_index: u32) -> MediaResult<()>;

    /// All stored chunks of an upload as `(index, size)`, ascending
    async fn list_chunks(&self, upload_id: &UploadId) -> MediaResult<Vec<(u32, u64)>>;

    /// Every upload that has a staging namespace
    async fn list_uploads(&self) -> MediaResult<Vec<UploadId>>;

    /// Remove leftovers of interrupted writes. Only safe while no write
    /// for this upload is in flight. Returns how many were removed.
    async fn sweep_partial(&self, upload_id: &UploadId) -> MediaResult<usize>;

    /// Remove the whole namespace of an upload
    async fn purge(&self, upload_id: &UploadId) -> MediaResult<()>;
}

/// Durable home of assembled objects
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write an object from a stream and make it visible atomically.
    /// When `expected_len` is given and the stream yields a different number
    /// of bytes, nothing becomes visible.
    async fn publish(
        &self,
        id: &ObjectId,
        content_type: &str,
        body: ByteStream,
        expected_len: Option<u64>,
    ) -> MediaResult<PublishedObject>;

    /// Object metadata without content
    async fn head(&self, id: &ObjectId) -> MediaResult<ObjectHead>;

    /// Open `len` bytes of an object starting at `start`
    async fn open_range(&self, id: &ObjectId, start: u64, len: u64) -> MediaResult<ByteStream>;

    async fn exists(&self, id: &ObjectId) -> MediaResult<bool>;

    async fn delete(&self, id: &ObjectId) -> MediaResult<()>;

    /// Where the object lives (path or durable-store key)
    fn location(&self, id: &ObjectId) -> String;
}

/// Result of a successful publish
#[derive(Debug, Clone)]
pub struct PublishedObject {
    pub size_bytes: u64,
    pub checksum: Option<String>,
}

/// Metadata about a published object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectHead {
    pub size_bytes: u64,
    pub content_type: Option<String>,
    pub checksum: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}
