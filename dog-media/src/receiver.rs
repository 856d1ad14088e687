use std::sync::Arc;

use tracing::{debug, warn};

use crate::{ByteStream, ChunkAck, ChunkStore, MediaConfig, MediaError, MediaResult, SessionRegistry, UploadId};

/// Accepts chunk bodies and records them against their upload
pub struct ChunkReceiver {
    chunks: Arc<dyn ChunkStore>,
    sessions: SessionRegistry,
    config: MediaConfig,
}

impl ChunkReceiver {
    pub fn new(chunks: Arc<dyn ChunkStore>, sessions: SessionRegistry, config: MediaConfig) -> Self {
        Self {
            chunks,
            sessions,
            config,
        }
    }

    /// Store one chunk. Resending the same index replaces the earlier
    /// payload; writes to different indices never interfere.
    pub async fn receive(
        &self,
        upload_id: &UploadId,
        chunk_index: u32,
        body: ByteStream,
    ) -> MediaResult<ChunkAck> {
        if chunk_index >= self.config.max_chunks {
            return Err(MediaError::invalid(format!(
                "chunk index {} is out of range (must be below {})",
                chunk_index, self.config.max_chunks
            )));
        }

        // Held across the write so a concurrent assembly waits for it.
        let permit = self.sessions.begin_chunk(upload_id)?;

        let size_bytes = match self
            .chunks
            .write_chunk(upload_id, chunk_index, body, self.config.max_chunk_bytes)
            .await
        {
            Ok(size) => size,
            Err(e) => {
                warn!(upload_id = %upload_id, chunk_index, error = %e, "Chunk write failed");
                return Err(e);
            }
        };

        let chunks_received = permit.commit(chunk_index, size_bytes);
        debug!(upload_id = %upload_id, chunk_index, size_bytes, chunks_received, "Chunk received");

        Ok(ChunkAck {
            upload_id: upload_id.clone(),
            chunk_index,
            size_bytes,
            chunks_received,
        })
    }
}
