use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{MediaMetadata, ObjectId, UploadId};

/// The concatenated result of a completed upload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssembledObject {
    pub id: ObjectId,
    pub upload_id: UploadId,
    /// Local path or durable-store key
    pub location: String,
    pub size_bytes: u64,
    pub content_type: String,
    pub checksum: Option<String>,
    pub chunk_count: u32,
    pub created_at: DateTime<Utc>,
    pub metadata: MediaMetadata,
}

impl AssembledObject {
    pub fn new(upload_id: UploadId, location: String, size_bytes: u64, chunk_count: u32) -> Self {
        Self {
            id: ObjectId::from(&upload_id),
            upload_id,
            location,
            size_bytes,
            content_type: "application/octet-stream".to_string(),
            checksum: None,
            chunk_count,
            created_at: Utc::now(),
            metadata: MediaMetadata::default(),
        }
    }

    pub fn with_content_type<S: Into<String>>(mut self, content_type: S) -> Self {
        self.content_type = content_type.into();
        self
    }

    pub fn with_checksum(mut self, checksum: Option<String>) -> Self {
        self.checksum = checksum;
        self
    }

    pub fn with_metadata(mut self, metadata: MediaMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Record handed to the metadata store after assembly
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaRecord {
    pub object_id: ObjectId,
    pub location: String,
    pub size_bytes: u64,
    pub content_type: String,
    pub title: Option<String>,
    pub owner: Option<String>,
    pub tags: Vec<String>,
    pub attributes: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl From<&AssembledObject> for MediaRecord {
    fn from(object: &AssembledObject) -> Self {
        Self {
            object_id: object.id.clone(),
            location: object.location.clone(),
            size_bytes: object.size_bytes,
            content_type: object.content_type.clone(),
            title: object.metadata.title.clone(),
            owner: object.metadata.owner.clone(),
            tags: object.metadata.tags.clone(),
            attributes: object.metadata.attributes.clone(),
            created_at: object.created_at,
        }
    }
}
