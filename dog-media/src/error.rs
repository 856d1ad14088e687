use thiserror::Error;

use crate::AssembledObject;

/// Result type for media operations
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while receiving, assembling or streaming media
#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Failed to store chunk {chunk_index} of upload {upload_id}: {source}")]
    StorageWriteFailed {
        upload_id: String,
        chunk_index: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("Upload {upload_id} is incomplete: chunk {missing_index} is missing")]
    IncompleteUpload { upload_id: String, missing_index: u32 },

    #[error("Assembly of upload {upload_id} failed: {reason}")]
    AssemblyFailed { upload_id: String, reason: String },

    #[error("Upload {upload_id} is already being assembled")]
    AlreadyAssembling { upload_id: String },

    #[error("Upload {upload_id} is already complete")]
    AlreadyComplete {
        upload_id: String,
        object: Box<AssembledObject>,
    },

    #[error("Upload {upload_id} is sealed and no longer accepts chunks")]
    UploadSealed { upload_id: String },

    #[error("Upload session not found: {upload_id}")]
    UploadNotFound { upload_id: String },

    #[error("Requested range not satisfiable for length {total_length}")]
    RangeNotSatisfiable { total_length: u64 },

    #[error("Object not found: {id}")]
    ObjectNotFound { id: String },

    #[error("Collaborator error: {source}")]
    Backend {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl MediaError {
    /// Create an invalid request error
    pub fn invalid<S: Into<String>>(message: S) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Create a collaborator error from any error type
    pub fn backend<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend {
            source: Box::new(error),
        }
    }

    /// Create an assembly failure error
    pub fn assembly_failed<U: Into<String>, R: Into<String>>(upload_id: U, reason: R) -> Self {
        Self::AssemblyFailed {
            upload_id: upload_id.into(),
            reason: reason.into(),
        }
    }

    /// Create an object not found error
    pub fn object_not_found<S: Into<String>>(id: S) -> Self {
        Self::ObjectNotFound { id: id.into() }
    }

    /// Create an upload not found error
    pub fn upload_not_found<S: Into<String>>(upload_id: S) -> Self {
        Self::UploadNotFound {
            upload_id: upload_id.into(),
        }
    }

    /// Whether repeating the same request (possibly after resending a chunk)
    /// can succeed. Concurrency-guard and client errors are terminal.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::StorageWriteFailed { .. }
                | Self::IncompleteUpload { .. }
                | Self::AssemblyFailed { .. }
                | Self::Backend { .. }
                | Self::Io { .. }
        )
    }

    /// HTTP-equivalent status code for transport layers
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidRequest { .. } => 400,
            Self::StorageWriteFailed { .. } => 500,
            Self::IncompleteUpload { .. } => 409,
            Self::AssemblyFailed { .. } => 500,
            Self::AlreadyAssembling { .. } => 409,
            Self::AlreadyComplete { .. } => 409,
            Self::UploadSealed { .. } => 409,
            Self::UploadNotFound { .. } => 404,
            Self::RangeNotSatisfiable { .. } => 416,
            Self::ObjectNotFound { .. } => 404,
            Self::Backend { .. } => 502,
            Self::Io { .. } => 500,
        }
    }

    /// Stable machine-readable name of the error kind
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::InvalidRequest { .. } => "InvalidRequest",
            Self::StorageWriteFailed { .. } => "StorageWriteFailed",
            Self::IncompleteUpload { .. } => "IncompleteUpload",
            Self::AssemblyFailed { .. } => "AssemblyFailed",
            Self::AlreadyAssembling { .. } => "AlreadyAssembling",
            Self::AlreadyComplete { .. } => "AlreadyComplete",
            Self::UploadSealed { .. } => "UploadSealed",
            Self::UploadNotFound { .. } => "UploadNotFound",
            Self::RangeNotSatisfiable { .. } => "RangeNotSatisfiable",
            Self::ObjectNotFound { .. } => "ObjectNotFound",
            Self::Backend { .. } => "Backend",
            Self::Io { .. } => "Io",
        }
    }

    /// The published object carried by an `AlreadyComplete` rejection
    pub fn completed_object(&self) -> Option<&AssembledObject> {
        match self {
            Self::AlreadyComplete { object, .. } => Some(object),
            _ => None,
        }
    }
}
