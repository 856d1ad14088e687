use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::{
    Assembler, AssembledObject, ByteStream, ChunkAck, ChunkReceiver, ChunkStore, FsChunkStore,
    FsObjectStore, MediaConfig, MediaError, MediaMetadata, MediaRecord, MediaResult,
    MetadataStore, ObjectId, ObjectStore, SessionRegistry, StreamResponse, StreamServer,
    UploadId, UploadSession, ViewHook,
};

/// The media adapter - what services and HTTP layers embed.
///
/// Wires the chunk receiver, assembler and stream server to one shared
/// session registry and one pair of stores.
pub struct MediaAdapter {
    chunks: Arc<dyn ChunkStore>,
    objects: Arc<dyn ObjectStore>,
    sessions: SessionRegistry,
    receiver: ChunkReceiver,
    assembler: Assembler,
    streams: StreamServer,
    metadata: Option<Arc<dyn MetadataStore>>,
    config: MediaConfig,
}

impl MediaAdapter {
    /// Create an adapter over custom stores
    pub fn new<C, O>(chunks: C, objects: O, config: MediaConfig) -> Self
    where
        C: ChunkStore + 'static,
        O: ObjectStore + 'static,
    {
        Self::from_parts(Arc::new(chunks), Arc::new(objects), config)
    }

    /// Create an adapter over the filesystem directories named in `config`
    pub fn from_config(config: MediaConfig) -> Self {
        let chunks = FsChunkStore::new(&config.staging_dir).with_read_buffer(config.copy_buffer_bytes);
        let objects = FsObjectStore::new(&config.objects_dir)
            .with_read_buffer(config.copy_buffer_bytes)
            .with_checksum(config.compute_checksum);
        Self::new(chunks, objects, config)
    }

    pub fn from_parts(
        chunks: Arc<dyn ChunkStore>,
        objects: Arc<dyn ObjectStore>,
        config: MediaConfig,
    ) -> Self {
        let sessions = SessionRegistry::with_completed_limit(config.completed_sessions_retained);
        Self {
            receiver: ChunkReceiver::new(Arc::clone(&chunks), sessions.clone(), config.clone()),
            assembler: Assembler::new(
                Arc::clone(&chunks),
                Arc::clone(&objects),
                sessions.clone(),
                config.clone(),
            ),
            streams: StreamServer::new(Arc::clone(&objects), config.default_content_type.clone()),
            chunks,
            objects,
            sessions,
            metadata: None,
            config,
        }
    }

    /// Hand a record to `store` after every successful assembly
    pub fn with_metadata_store(mut self, store: Arc<dyn MetadataStore>) -> Self {
        self.metadata = Some(store);
        self
    }

    /// Report every successful serve to `hook`
    pub fn with_view_hook(mut self, hook: Arc<dyn ViewHook>) -> Self {
        self.streams = StreamServer::new(Arc::clone(&self.objects), self.config.default_content_type.clone())
            .with_view_hook(hook);
        self
    }

    pub fn config(&self) -> &MediaConfig {
        &self.config
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Store one chunk of an upload
    #[instrument(skip(self, body), fields(upload_id = %upload_id))]
    pub async fn receive_chunk(
        &self,
        upload_id: &UploadId,
        chunk_index: u32,
        body: ByteStream,
    ) -> MediaResult<ChunkAck> {
        self.receiver.receive(upload_id, chunk_index, body).await
    }

    /// Assemble an upload and hand the result to the metadata store.
    ///
    /// When the hand-off fails the object stays published and the error is
    /// reported as [`MediaError::Backend`]. A repeated call retries the
    /// hand-off until the store accepts the record, then returns
    /// [`MediaError::AlreadyComplete`] with the object. Uploads completed
    /// by an earlier process are handed off again, so stores must treat
    /// inserts as upserts keyed by object id.
    pub async fn assemble(
        &self,
        upload_id: &UploadId,
        total_chunks: u32,
        metadata: MediaMetadata,
    ) -> MediaResult<AssembledObject> {
        match self.assembler.assemble(upload_id, total_chunks, metadata).await {
            Ok(object) => {
                self.hand_off(&object).await?;
                Ok(object)
            }
            Err(MediaError::AlreadyComplete { upload_id, object }) => {
                if self.sessions.hand_off_pending(&object.upload_id) {
                    self.hand_off(&object).await?;
                }
                Err(MediaError::AlreadyComplete { upload_id, object })
            }
            Err(e) => Err(e),
        }
    }

    async fn hand_off(&self, object: &AssembledObject) -> MediaResult<()> {
        let Some(store) = &self.metadata else {
            return Ok(());
        };

        if let Err(e) = store.insert(MediaRecord::from(object)).await {
            warn!(object_id = %object.id, error = %e, "Metadata hand-off failed");
            return Err(match e {
                MediaError::Backend { .. } => e,
                other => MediaError::backend(other),
            });
        }

        self.sessions.mark_handed_off(&object.upload_id);
        Ok(())
    }

    /// Stream an object, honouring an optional `Range` header value
    pub async fn serve(&self, object_id: &ObjectId, range: Option<&str>) -> MediaResult<StreamResponse> {
        self.streams.serve(object_id, range).await
    }

    /// Status and headers of [`serve`](Self::serve) without a body
    pub async fn describe(&self, object_id: &ObjectId, range: Option<&str>) -> MediaResult<StreamResponse> {
        self.streams.describe(object_id, range).await
    }

    pub fn status(&self, upload_id: &UploadId) -> MediaResult<UploadSession> {
        self.sessions
            .status(upload_id)
            .ok_or_else(|| MediaError::upload_not_found(upload_id.as_str()))
    }

    /// Discard an unfinished upload and everything staged for it
    #[instrument(skip(self), fields(upload_id = %upload_id))]
    pub async fn abort(&self, upload_id: &UploadId) -> MediaResult<()> {
        let session = self.sessions.abort(upload_id)?;
        let staged = self.chunks.list_chunks(upload_id).await?;

        if session.is_none() && staged.is_empty() {
            return Err(MediaError::upload_not_found(upload_id.as_str()));
        }

        self.chunks.purge(upload_id).await?;
        info!(chunks = staged.len(), "Upload aborted");
        Ok(())
    }

    /// Re-register uploads left in staging by an earlier process.
    ///
    /// Each staged namespace becomes an `Open` session with the chunks found
    /// on disk; leftovers of interrupted writes are removed first. Uploads
    /// the registry already knows are skipped. Returns how many sessions
    /// were restored.
    #[instrument(skip(self))]
    pub async fn recover(&self) -> MediaResult<usize> {
        let mut restored = 0;

        for upload_id in self.chunks.list_uploads().await? {
            if self.sessions.status(&upload_id).is_some() {
                continue;
            }

            match self.chunks.sweep_partial(&upload_id).await {
                Ok(0) => {}
                Ok(swept) => info!(upload_id = %upload_id, swept, "Removed interrupted chunk writes"),
                Err(e) => warn!(upload_id = %upload_id, error = %e, "Failed to sweep partial chunks"),
            }

            let chunks = match self.chunks.list_chunks(&upload_id).await {
                Ok(chunks) => chunks,
                Err(e) => {
                    warn!(upload_id = %upload_id, error = %e, "Skipping unreadable staging namespace");
                    continue;
                }
            };

            if chunks.is_empty() {
                if let Err(e) = self.chunks.purge(&upload_id).await {
                    warn!(upload_id = %upload_id, error = %e, "Failed to remove empty staging namespace");
                }
                continue;
            }

            let mut session = UploadSession::new(upload_id.clone());
            session.received = chunks.into_iter().collect();
            let received = session.chunks_received();
            if self.sessions.restore(session) {
                info!(upload_id = %upload_id, chunks = received, "Restored upload");
                restored += 1;
            }
        }

        Ok(restored)
    }
}
