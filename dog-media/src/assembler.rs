use std::sync::Arc;

use futures_util::StreamExt;
use tracing::{info, instrument, warn};

use crate::mime::content_type_for;
use crate::registry::AssemblyTicket;
use crate::{
    AssembledObject, ByteStream, ChunkStore, MediaConfig, MediaError, MediaMetadata, MediaResult,
    ObjectId, ObjectStore, SessionRegistry, UploadId,
};

/// Concatenates the chunks of an upload into one published object
pub struct Assembler {
    chunks: Arc<dyn ChunkStore>,
    objects: Arc<dyn ObjectStore>,
    sessions: SessionRegistry,
    config: MediaConfig,
}

impl Assembler {
    pub fn new(
        chunks: Arc<dyn ChunkStore>,
        objects: Arc<dyn ObjectStore>,
        sessions: SessionRegistry,
        config: MediaConfig,
    ) -> Self {
        Self {
            chunks,
            objects,
            sessions,
            config,
        }
    }

    /// Assemble chunks `0..total_chunks` in index order.
    ///
    /// All-or-nothing: the object only becomes visible once every byte is
    /// written and the length matches the staged chunks. Chunks are kept
    /// on any failure so the client can resend and retry. Staged indices
    /// at or above `total_chunks` are ignored and removed with the rest of
    /// the namespace after success.
    ///
    /// An object already published under the upload id is adopted as
    /// [`MediaError::AlreadyComplete`]; chunks staged after it was
    /// published are discarded.
    #[instrument(skip_all, fields(upload_id = %upload_id, total_chunks = total_chunks))]
    pub async fn assemble(
        &self,
        upload_id: &UploadId,
        total_chunks: u32,
        metadata: MediaMetadata,
    ) -> MediaResult<AssembledObject> {
        if total_chunks == 0 || total_chunks > self.config.max_chunks {
            return Err(MediaError::invalid(format!(
                "total chunks must be 1-{}, got {}",
                self.config.max_chunks, total_chunks
            )));
        }

        let ticket = self.sessions.begin_assembly(upload_id, total_chunks)?;
        ticket.wait_for_writers().await;

        let object_id = ObjectId::from(upload_id);

        // A completion the registry no longer remembers, either from an
        // earlier process or evicted since.
        match self.objects.exists(&object_id).await {
            Ok(true) => {
                let err = self
                    .adopt_published(ticket, &object_id, total_chunks, metadata)
                    .await;
                if matches!(err, MediaError::AlreadyComplete { .. }) {
                    self.cleanup_staged_chunks(upload_id, total_chunks).await;
                }
                return Err(err);
            }
            Ok(false) => {}
            Err(e) => {
                let err = MediaError::assembly_failed(upload_id.as_str(), e.to_string());
                warn!(error = %err, "Could not check for a published object");
                ticket.fail(err.to_string());
                return Err(err);
            }
        }

        let expected_len = match self.verify_complete(upload_id, total_chunks).await {
            Ok(len) => len,
            Err(e) => {
                ticket.fail(e.to_string());
                return Err(e);
            }
        };

        if expected_len > self.config.max_object_bytes {
            let err = MediaError::invalid(format!(
                "assembled size {} exceeds maximum {}",
                expected_len, self.config.max_object_bytes
            ));
            ticket.fail(err.to_string());
            return Err(err);
        }

        let content_type = metadata
            .content_type
            .clone()
            .or_else(|| content_type_for(upload_id.as_str()).map(str::to_owned))
            .unwrap_or_else(|| self.config.default_content_type.clone());

        let body = self.concat_chunk_streams(upload_id.clone(), total_chunks);
        let published = match self
            .objects
            .publish(&object_id, &content_type, body, Some(expected_len))
            .await
        {
            Ok(published) if published.size_bytes == expected_len => published,
            Ok(published) => {
                let err = MediaError::assembly_failed(
                    upload_id.as_str(),
                    format!(
                        "published {} bytes but chunks total {} bytes",
                        published.size_bytes, expected_len
                    ),
                );
                ticket.fail(err.to_string());
                return Err(err);
            }
            Err(e) => {
                let err = match e {
                    MediaError::AssemblyFailed { .. } => e,
                    other => MediaError::assembly_failed(upload_id.as_str(), other.to_string()),
                };
                warn!(error = %err, "Assembly failed; chunks kept for retry");
                ticket.fail(err.to_string());
                return Err(err);
            }
        };

        let object = AssembledObject::new(
            upload_id.clone(),
            self.objects.location(&object_id),
            published.size_bytes,
            total_chunks,
        )
        .with_content_type(content_type)
        .with_checksum(published.checksum)
        .with_metadata(metadata);

        ticket.complete(object.clone());
        info!(
            bytes = object.size_bytes,
            chunks = total_chunks,
            location = %object.location,
            "Assembly complete"
        );

        self.cleanup_staged_chunks(upload_id, total_chunks).await;
        Ok(object)
    }

    /// Check every index exists and return the summed length
    async fn verify_complete(&self, upload_id: &UploadId, total_chunks: u32) -> MediaResult<u64> {
        let mut total: u64 = 0;
        for chunk_index in 0..total_chunks {
            match self.chunks.chunk_len(upload_id, chunk_index).await {
                Ok(Some(len)) => total += len,
                Ok(None) => {
                    return Err(MediaError::IncompleteUpload {
                        upload_id: upload_id.to_string(),
                        missing_index: chunk_index,
                    })
                }
                Err(e) => return Err(MediaError::assembly_failed(upload_id.as_str(), e.to_string())),
            }
        }
        Ok(total)
    }

    /// Concatenate staged chunks into a single stream, one bounded read at a time
    fn concat_chunk_streams(&self, upload_id: UploadId, total_chunks: u32) -> ByteStream {
        let chunks = Arc::clone(&self.chunks);
        let stream = async_stream::stream! {
            for chunk_index in 0..total_chunks {
                match chunks.open_chunk(&upload_id, chunk_index).await {
                    Ok(mut part) => {
                        while let Some(bytes) = part.next().await {
                            yield bytes;
                        }
                    }
                    Err(e) => {
                        yield Err(std::io::Error::new(
                            std::io::ErrorKind::Other,
                            format!("failed to read chunk {}: {}", chunk_index, e),
                        ));
                        return;
                    }
                }
            }
        };
        Box::pin(stream)
    }

    async fn adopt_published(
        &self,
        ticket: AssemblyTicket,
        object_id: &ObjectId,
        total_chunks: u32,
        metadata: MediaMetadata,
    ) -> MediaError {
        let upload_id = ticket.upload_id().clone();
        match self.objects.head(object_id).await {
            Ok(head) => {
                let object = AssembledObject::new(
                    upload_id.clone(),
                    self.objects.location(object_id),
                    head.size_bytes,
                    total_chunks,
                )
                .with_content_type(
                    head.content_type
                        .unwrap_or_else(|| self.config.default_content_type.clone()),
                )
                .with_checksum(head.checksum)
                .with_metadata(metadata);
                ticket.complete(object.clone());
                MediaError::AlreadyComplete {
                    upload_id: upload_id.to_string(),
                    object: Box::new(object),
                }
            }
            Err(e) => {
                ticket.fail(e.to_string());
                e
            }
        }
    }

    /// Best effort; a leftover chunk is only wasted space
    async fn cleanup_staged_chunks(&self, upload_id: &UploadId, total_chunks: u32) {
        for chunk_index in 0..total_chunks {
            if let Err(e) = self.chunks.delete_chunk(upload_id, chunk_index).await {
                warn!(upload_id = %upload_id, chunk_index, error = %e, "Failed to delete staged chunk");
            }
        }

        match self.chunks.list_chunks(upload_id).await {
            Ok(extra) if !extra.is_empty() => {
                warn!(
                    upload_id = %upload_id,
                    extra = extra.len(),
                    "Discarding chunks beyond the declared total"
                );
            }
            Ok(_) => {}
            Err(e) => warn!(upload_id = %upload_id, error = %e, "Failed to list leftover chunks"),
        }

        if let Err(e) = self.chunks.purge(upload_id).await {
            warn!(upload_id = %upload_id, error = %e, "Failed to remove staging namespace");
        }
    }
}
