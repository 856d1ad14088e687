use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::Engine;
use chrono::Utc;
use futures_util::StreamExt;
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::mime::content_type_for;
use crate::{
    ByteStream, ChunkStore, MediaError, MediaResult, ObjectHead, ObjectId, ObjectStore,
    PublishedObject, UploadId,
};

const PART_SUFFIX: &str = ".part";
const CHUNK_PREFIX: &str = "chunk-";

fn chunk_file_name(chunk_index: u32) -> String {
    format!("{}{:08}", CHUNK_PREFIX, chunk_index)
}

fn parse_chunk_file_name(name: &str) -> Option<u32> {
    let digits = name.strip_prefix(CHUNK_PREFIX)?;
    if digits.len() != 8 {
        return None;
    }
    digits.parse().ok()
}

fn is_not_found(err: &std::io::Error) -> bool {
    err.kind() == std::io::ErrorKind::NotFound
}

/// Temporary file that is removed when dropped unless it was kept.
/// Covers errors, oversized bodies and writers dropped mid-stream.
struct PartFile {
    path: PathBuf,
    keep: bool,
}

impl PartFile {
    fn new(path: PathBuf) -> Self {
        Self { path, keep: false }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn keep(mut self) {
        self.keep = true;
    }
}

impl Drop for PartFile {
    fn drop(&mut self) {
        if !self.keep {
            if let Err(e) = std::fs::remove_file(&self.path) {
                if !is_not_found(&e) {
                    warn!(path = %self.path.display(), error = %e, "Failed to remove partial file");
                }
            }
        }
    }
}

/// Chunk staging on the local filesystem: `<root>/<upload_id>/chunk-NNNNNNNN`
#[derive(Debug, Clone)]
pub struct FsChunkStore {
    root: PathBuf,
    read_buffer: usize,
}

impl FsChunkStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            root: root.into(),
            read_buffer: 64 * 1024,
        }
    }

    pub fn with_read_buffer(mut self, bytes: usize) -> Self {
        self.read_buffer = bytes.max(1);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn upload_dir(&self, upload_id: &UploadId) -> PathBuf {
        self.root.join(upload_id.as_str())
    }

    fn chunk_path(&self, upload_id: &UploadId, chunk_index: u32) -> PathBuf {
        self.upload_dir(upload_id).join(chunk_file_name(chunk_index))
    }
}

#[async_trait]
impl ChunkStore for FsChunkStore {
    async fn write_chunk(
        &self,
        upload_id: &UploadId,
        chunk_index: u32,
        mut body: ByteStream,
        max_bytes: u64,
    ) -> MediaResult<u64> {
        let fail = |source: std::io::Error| MediaError::StorageWriteFailed {
            upload_id: upload_id.to_string(),
            chunk_index,
            source,
        };

        let dir = self.upload_dir(upload_id);
        fs::create_dir_all(&dir).await.map_err(fail)?;

        // Each writer gets its own part file; the rename below is the only
        // point where the chunk key changes content.
        let part = PartFile::new(dir.join(format!(
            "{}.{}{}",
            chunk_file_name(chunk_index),
            Uuid::new_v4().simple(),
            PART_SUFFIX
        )));
        let mut file = fs::File::create(part.path()).await.map_err(fail)?;

        let mut written: u64 = 0;
        while let Some(next) = body.next().await {
            let bytes = next.map_err(fail)?;
            written += bytes.len() as u64;
            if written > max_bytes {
                return Err(MediaError::invalid(format!(
                    "chunk {} exceeds maximum size of {} bytes",
                    chunk_index, max_bytes
                )));
            }
            file.write_all(&bytes).await.map_err(fail)?;
        }

        file.flush().await.map_err(fail)?;
        file.sync_all().await.map_err(fail)?;
        drop(file);

        fs::rename(part.path(), self.chunk_path(upload_id, chunk_index))
            .await
            .map_err(fail)?;
        part.keep();

        debug!(upload_id = %upload_id, chunk_index, bytes = written, "Stored chunk");
        Ok(written)
    }

    async fn chunk_len(&self, upload_id: &UploadId, chunk_index: u32) -> MediaResult<Option<u64>> {
        match fs::metadata(self.chunk_path(upload_id, chunk_index)).await {
            Ok(meta) if meta.is_file() => Ok(Some(meta.len())),
            Ok(_) => Ok(None),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn open_chunk(&self, upload_id: &UploadId, chunk_index: u32) -> MediaResult<ByteStream> {
        let file = fs::File::open(self.chunk_path(upload_id, chunk_index)).await?;
        Ok(Box::pin(ReaderStream::with_capacity(file, self.read_buffer)))
    }

    async fn delete_chunk(&self, upload_id: &UploadId, chunk_index: u32) -> MediaResult<()> {
        match fs::remove_file(self.chunk_path(upload_id, chunk_index)).await {
            Ok(()) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_chunks(&self, upload_id: &UploadId) -> MediaResult<Vec<(u32, u64)>> {
        let mut entries = match fs::read_dir(self.upload_dir(upload_id)).await {
            Ok(entries) => entries,
            Err(e) if is_not_found(&e) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut chunks = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(index) = name.to_str().and_then(parse_chunk_file_name) else {
                continue;
            };
            let meta = entry.metadata().await?;
            if meta.is_file() {
                chunks.push((index, meta.len()));
            }
        }
        chunks.sort_unstable_by_key(|(index, _)| *index);
        Ok(chunks)
    }

    async fn list_uploads(&self) -> MediaResult<Vec<UploadId>> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if is_not_found(&e) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut uploads = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            match UploadId::parse(name) {
                Ok(id) => uploads.push(id),
                Err(e) => warn!(error = %e, "Skipping unrecognised staging directory"),
            }
        }
        uploads.sort();
        Ok(uploads)
    }

    async fn sweep_partial(&self, upload_id: &UploadId) -> MediaResult<usize> {
        let mut entries = match fs::read_dir(self.upload_dir(upload_id)).await {
            Ok(entries) => entries,
            Err(e) if is_not_found(&e) => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let is_part = entry
                .file_name()
                .to_str()
                .map_or(false, |name| name.ends_with(PART_SUFFIX));
            if is_part {
                fs::remove_file(entry.path()).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn purge(&self, upload_id: &UploadId) -> MediaResult<()> {
        match fs::remove_dir_all(self.upload_dir(upload_id)).await {
            Ok(()) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Sidecar stored next to each published object
#[derive(serde::Serialize, serde::Deserialize)]
struct Sidecar {
    content_type: String,
    size_bytes: u64,
    checksum: Option<String>,
    created_at: chrono::DateTime<Utc>,
}

/// Published objects on the local filesystem.
///
/// Layout: `<root>/<id>` for content, `<root>/.meta/<id>.json` for the
/// sidecar and `<root>/.tmp/` for objects being written. Ids never start
/// with a dot, so the hidden directories cannot collide with objects.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
    read_buffer: usize,
    checksum: bool,
}

impl FsObjectStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            root: root.into(),
            read_buffer: 64 * 1024,
            checksum: true,
        }
    }

    pub fn with_read_buffer(mut self, bytes: usize) -> Self {
        self.read_buffer = bytes.max(1);
        self
    }

    pub fn with_checksum(mut self, enabled: bool) -> Self {
        self.checksum = enabled;
        self
    }

    fn object_path(&self, id: &ObjectId) -> PathBuf {
        self.root.join(id.as_str())
    }

    fn sidecar_path(&self, id: &ObjectId) -> PathBuf {
        self.root.join(".meta").join(format!("{}.json", id.as_str()))
    }

    fn tmp_dir(&self) -> PathBuf {
        self.root.join(".tmp")
    }

    async fn read_sidecar(&self, id: &ObjectId) -> Option<Sidecar> {
        let raw = fs::read(self.sidecar_path(id)).await.ok()?;
        match serde_json::from_slice(&raw) {
            Ok(sidecar) => Some(sidecar),
            Err(e) => {
                warn!(object_id = %id, error = %e, "Ignoring unreadable object sidecar");
                None
            }
        }
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn publish(
        &self,
        id: &ObjectId,
        content_type: &str,
        mut body: ByteStream,
        expected_len: Option<u64>,
    ) -> MediaResult<PublishedObject> {
        let tmp_dir = self.tmp_dir();
        fs::create_dir_all(&tmp_dir).await?;
        fs::create_dir_all(self.root.join(".meta")).await?;

        // Left in place on failure so it can be inspected.
        let tmp_path = tmp_dir.join(format!("{}.{}{}", id.as_str(), Uuid::new_v4().simple(), PART_SUFFIX));
        let mut file = fs::File::create(&tmp_path).await?;
        let mut hasher = self.checksum.then(Sha256::new);
        let mut written: u64 = 0;

        while let Some(next) = body.next().await {
            let bytes = next?;
            if let Some(hasher) = hasher.as_mut() {
                hasher.update(&bytes);
            }
            file.write_all(&bytes).await?;
            written += bytes.len() as u64;
        }
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        if let Some(expected) = expected_len {
            if written != expected {
                return Err(MediaError::assembly_failed(
                    id.as_str(),
                    format!(
                        "wrote {} bytes but chunks total {} bytes; partial object kept at {}",
                        written,
                        expected,
                        tmp_path.display()
                    ),
                ));
            }
        }

        let checksum = hasher.map(|h| {
            format!(
                "sha256:{}",
                base64::engine::general_purpose::STANDARD.encode(h.finalize())
            )
        });

        let sidecar = Sidecar {
            content_type: content_type.to_string(),
            size_bytes: written,
            checksum: checksum.clone(),
            created_at: Utc::now(),
        };
        let sidecar_tmp = tmp_dir.join(format!("{}.{}.json", id.as_str(), Uuid::new_v4().simple()));
        fs::write(&sidecar_tmp, serde_json::to_vec(&sidecar).map_err(MediaError::backend)?).await?;
        fs::rename(&sidecar_tmp, self.sidecar_path(id)).await?;

        fs::rename(&tmp_path, self.object_path(id)).await?;

        Ok(PublishedObject {
            size_bytes: written,
            checksum,
        })
    }

    async fn head(&self, id: &ObjectId) -> MediaResult<ObjectHead> {
        let meta = match fs::metadata(self.object_path(id)).await {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => return Err(MediaError::object_not_found(id.as_str())),
            Err(e) if is_not_found(&e) => return Err(MediaError::object_not_found(id.as_str())),
            Err(e) => return Err(e.into()),
        };

        let sidecar = self.read_sidecar(id).await;
        let content_type = sidecar
            .as_ref()
            .map(|s| s.content_type.clone())
            .or_else(|| content_type_for(id.as_str()).map(str::to_owned));

        Ok(ObjectHead {
            size_bytes: meta.len(),
            content_type,
            checksum: sidecar.as_ref().and_then(|s| s.checksum.clone()),
            created_at: sidecar.map(|s| s.created_at),
        })
    }

    async fn open_range(&self, id: &ObjectId, start: u64, len: u64) -> MediaResult<ByteStream> {
        let mut file = match fs::File::open(self.object_path(id)).await {
            Ok(file) => file,
            Err(e) if is_not_found(&e) => return Err(MediaError::object_not_found(id.as_str())),
            Err(e) => return Err(e.into()),
        };
        if start > 0 {
            file.seek(SeekFrom::Start(start)).await?;
        }
        let window = file.take(len);
        Ok(Box::pin(ReaderStream::with_capacity(window, self.read_buffer)))
    }

    async fn exists(&self, id: &ObjectId) -> MediaResult<bool> {
        match fs::metadata(self.object_path(id)).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, id: &ObjectId) -> MediaResult<()> {
        for path in [self.object_path(id), self.sidecar_path(id)] {
            match fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if is_not_found(&e) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn location(&self, id: &ObjectId) -> String {
        self.object_path(id).display().to_string()
    }
}
