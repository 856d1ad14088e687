use async_trait::async_trait;
use dashmap::DashMap;

use crate::{MediaRecord, MediaResult, ObjectId, RangeWindow};

/// External store that receives one record per assembled object
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn insert(&self, record: MediaRecord) -> MediaResult<()>;
}

/// Called after every successful serve (full or partial). The counter it
/// drives lives with the collaborator, not here.
pub trait ViewHook: Send + Sync {
    fn on_served(&self, object_id: &ObjectId, window: Option<&RangeWindow>);
}

/// In-memory metadata store with view counters, for development and tests
#[derive(Debug, Default)]
pub struct MemoryMetadataStore {
    records: DashMap<ObjectId, MediaRecord>,
    views: DashMap<ObjectId, u64>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, object_id: &ObjectId) -> Option<MediaRecord> {
        self.records.get(object_id).map(|record| record.clone())
    }

    pub fn views(&self, object_id: &ObjectId) -> u64 {
        self.views.get(object_id).map_or(0, |count| *count)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn insert(&self, record: MediaRecord) -> MediaResult<()> {
        self.records.insert(record.object_id.clone(), record);
        Ok(())
    }
}

impl ViewHook for MemoryMetadataStore {
    fn on_served(&self, object_id: &ObjectId, _window: Option<&RangeWindow>) {
        *self.views.entry(object_id.clone()).or_insert(0) += 1;
    }
}
