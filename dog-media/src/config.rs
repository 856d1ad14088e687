use std::path::PathBuf;

use crate::registry::DEFAULT_COMPLETED_RETAINED;

/// Configuration for chunk staging, assembly and streaming
#[derive(Debug, Clone)]
pub struct MediaConfig {
    /// Root of the per-upload chunk namespaces
    pub staging_dir: PathBuf,

    /// Root of published objects
    pub objects_dir: PathBuf,

    /// Largest accepted chunk body
    pub max_chunk_bytes: u64,

    /// Chunk indices must stay below this, and declared totals at or below it
    pub max_chunks: u32,

    /// Absolute max size of an assembled object (safety guard)
    pub max_object_bytes: u64,

    /// Read buffer used for concatenation and range reads
    pub copy_buffer_bytes: usize,

    /// Compute a SHA-256 of the assembled object while it is written
    pub compute_checksum: bool,

    /// Used when neither the caller nor the file extension names a type
    pub default_content_type: String,

    /// Completed uploads remembered in memory; older ones are answered
    /// from the object store
    pub completed_sessions_retained: usize,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            staging_dir: PathBuf::from("data/staging"),
            objects_dir: PathBuf::from("data/objects"),
            max_chunk_bytes: 64 * 1024 * 1024, // 64MB
            max_chunks: 10_000,
            max_object_bytes: 5 * 1024 * 1024 * 1024, // 5GB
            copy_buffer_bytes: 64 * 1024,
            compute_checksum: true,
            default_content_type: "application/octet-stream".to_string(),
            completed_sessions_retained: DEFAULT_COMPLETED_RETAINED,
        }
    }
}

impl MediaConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place staging and objects under one root, e.g. a test temp dir
    pub fn rooted_at<P: Into<PathBuf>>(root: P) -> Self {
        let root = root.into();
        Self::default()
            .with_staging_dir(root.join("staging"))
            .with_objects_dir(root.join("objects"))
    }

    pub fn with_staging_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.staging_dir = dir.into();
        self
    }

    pub fn with_objects_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.objects_dir = dir.into();
        self
    }

    pub fn with_max_chunk_bytes(mut self, bytes: u64) -> Self {
        self.max_chunk_bytes = bytes;
        self
    }

    pub fn with_max_chunks(mut self, max: u32) -> Self {
        self.max_chunks = max;
        self
    }

    pub fn with_max_object_bytes(mut self, bytes: u64) -> Self {
        self.max_object_bytes = bytes;
        self
    }

    pub fn with_copy_buffer(mut self, bytes: usize) -> Self {
        self.copy_buffer_bytes = bytes.max(1);
        self
    }

    pub fn without_checksum(mut self) -> Self {
        self.compute_checksum = false;
        self
    }

    pub fn with_default_content_type<S: Into<String>>(mut self, content_type: S) -> Self {
        self.default_content_type = content_type.into();
        self
    }

    pub fn with_completed_sessions_retained(mut self, count: usize) -> Self {
        self.completed_sessions_retained = count;
        self
    }
}
