use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::{AssembledObject, MediaError, MediaResult, UploadId};

/// Completed sessions kept in memory when no limit is configured
pub const DEFAULT_COMPLETED_RETAINED: usize = 1024;

/// Lifecycle of one upload
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum UploadState {
    Open,
    Assembling,
    /// `handed_off` turns true once the metadata store accepted the record
    Complete {
        object: Box<AssembledObject>,
        handed_off: bool,
    },
    Failed { reason: String },
}

/// Bookkeeping for one upload
#[derive(Debug, Clone, Serialize)]
pub struct UploadSession {
    pub upload_id: UploadId,
    #[serde(flatten)]
    pub state: UploadState,
    /// chunk index -> stored size. Emptied once the upload completes.
    pub received: BTreeMap<u32, u64>,
    pub total_chunks: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UploadSession {
    pub fn new(upload_id: UploadId) -> Self {
        let now = Utc::now();
        Self {
            upload_id,
            state: UploadState::Open,
            received: BTreeMap::new(),
            total_chunks: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn chunks_received(&self) -> u32 {
        self.received.len() as u32
    }

    pub fn received_bytes(&self) -> u64 {
        self.received.values().sum()
    }

    /// Sealed sessions accept no further chunks
    pub fn is_sealed(&self) -> bool {
        matches!(self.state, UploadState::Assembling | UploadState::Complete { .. })
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

struct Entry {
    session: UploadSession,
    in_flight: u32,
    drained: Arc<Notify>,
}

impl Entry {
    fn new(upload_id: UploadId) -> Self {
        Self::restored(UploadSession::new(upload_id))
    }

    fn restored(session: UploadSession) -> Self {
        Self {
            session,
            in_flight: 0,
            drained: Arc::new(Notify::new()),
        }
    }
}

#[derive(Default)]
struct Sessions {
    entries: HashMap<UploadId, Entry>,
    /// Completed uploads, oldest first
    completed: VecDeque<UploadId>,
}

impl Sessions {
    fn entry(&mut self, upload_id: &UploadId) -> &mut Entry {
        self.entries
            .entry(upload_id.clone())
            .or_insert_with(|| Entry::new(upload_id.clone()))
    }

    /// Forget the oldest completed uploads beyond `limit`
    fn evict_completed(&mut self, limit: usize) {
        while self.completed.len() > limit {
            let Some(upload_id) = self.completed.pop_front() else {
                break;
            };
            let is_complete = self
                .entries
                .get(&upload_id)
                .is_some_and(|entry| matches!(entry.session.state, UploadState::Complete { .. }));
            if is_complete {
                self.entries.remove(&upload_id);
                debug!(upload_id = %upload_id, "Evicted completed upload");
            }
        }
    }
}

/// In-memory state machine per upload id.
///
/// All transitions happen under one lock, which is what makes
/// `open -> assembling` exclusive: exactly one caller gets the
/// [`AssemblyTicket`], everybody else sees `AlreadyAssembling` or
/// `AlreadyComplete`.
///
/// Only the most recent completed uploads stay in memory. Once one is
/// evicted its published object is the record of completion.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<Mutex<Sessions>>,
    completed_limit: usize,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::with_completed_limit(DEFAULT_COMPLETED_RETAINED)
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `limit` completed uploads in memory
    pub fn with_completed_limit(limit: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Sessions::default())),
            completed_limit: limit,
        }
    }

    /// Reserve the right to write one chunk. Creates the session on first
    /// use; a failed session is reopened so missing chunks can be resent.
    pub fn begin_chunk(&self, upload_id: &UploadId) -> MediaResult<ChunkPermit> {
        let mut sessions = self.inner.lock();
        let entry = sessions.entry(upload_id);

        match entry.session.state {
            UploadState::Assembling | UploadState::Complete { .. } => {
                return Err(MediaError::UploadSealed {
                    upload_id: upload_id.to_string(),
                });
            }
            UploadState::Failed { .. } => {
                debug!(upload_id = %upload_id, "Reopening failed upload");
                entry.session.state = UploadState::Open;
                entry.session.touch();
            }
            UploadState::Open => {}
        }

        entry.in_flight += 1;
        Ok(ChunkPermit {
            registry: self.clone(),
            upload_id: upload_id.clone(),
        })
    }

    /// Seal the upload and take the single assembly slot
    pub fn begin_assembly(&self, upload_id: &UploadId, total_chunks: u32) -> MediaResult<AssemblyTicket> {
        let mut sessions = self.inner.lock();
        let entry = sessions.entry(upload_id);

        match &entry.session.state {
            UploadState::Assembling => Err(MediaError::AlreadyAssembling {
                upload_id: upload_id.to_string(),
            }),
            UploadState::Complete { object, .. } => Err(MediaError::AlreadyComplete {
                upload_id: upload_id.to_string(),
                object: object.clone(),
            }),
            UploadState::Open | UploadState::Failed { .. } => {
                entry.session.state = UploadState::Assembling;
                entry.session.total_chunks = Some(total_chunks);
                entry.session.touch();
                Ok(AssemblyTicket {
                    registry: self.clone(),
                    upload_id: upload_id.clone(),
                    drained: Arc::clone(&entry.drained),
                    finished: false,
                })
            }
        }
    }

    pub fn status(&self, upload_id: &UploadId) -> Option<UploadSession> {
        self.inner
            .lock()
            .entries
            .get(upload_id)
            .map(|entry| entry.session.clone())
    }

    /// Whether the record of a completed upload still has to reach the
    /// metadata store. Unknown uploads count as pending.
    pub fn hand_off_pending(&self, upload_id: &UploadId) -> bool {
        match self.inner.lock().entries.get(upload_id) {
            Some(entry) => !matches!(
                entry.session.state,
                UploadState::Complete { handed_off: true, .. }
            ),
            None => true,
        }
    }

    /// Record that the metadata store accepted the completed upload
    pub fn mark_handed_off(&self, upload_id: &UploadId) {
        let mut sessions = self.inner.lock();
        if let Some(entry) = sessions.entries.get_mut(upload_id) {
            if let UploadState::Complete { handed_off, .. } = &mut entry.session.state {
                *handed_off = true;
                entry.session.touch();
            }
        }
    }

    /// Forget an upload that is not sealed. `Ok(None)` when it was unknown.
    pub fn abort(&self, upload_id: &UploadId) -> MediaResult<Option<UploadSession>> {
        let mut sessions = self.inner.lock();
        let Some(entry) = sessions.entries.get(upload_id) else {
            return Ok(None);
        };
        match &entry.session.state {
            UploadState::Assembling => Err(MediaError::AlreadyAssembling {
                upload_id: upload_id.to_string(),
            }),
            UploadState::Complete { object, .. } => Err(MediaError::AlreadyComplete {
                upload_id: upload_id.to_string(),
                object: object.clone(),
            }),
            UploadState::Open | UploadState::Failed { .. } => {
                Ok(sessions.entries.remove(upload_id).map(|entry| entry.session))
            }
        }
    }

    /// Re-register a session found on disk. Known sessions are left alone.
    pub fn restore(&self, session: UploadSession) -> bool {
        let mut sessions = self.inner.lock();
        if sessions.entries.contains_key(&session.upload_id) {
            return false;
        }
        sessions
            .entries
            .insert(session.upload_id.clone(), Entry::restored(session));
        true
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    fn in_flight(&self, upload_id: &UploadId) -> u32 {
        self.inner
            .lock()
            .entries
            .get(upload_id)
            .map_or(0, |entry| entry.in_flight)
    }

    fn set_failed(&self, upload_id: &UploadId, reason: String) {
        let mut sessions = self.inner.lock();
        match sessions.entries.get_mut(upload_id) {
            Some(entry) => {
                entry.session.state = UploadState::Failed { reason };
                entry.session.touch();
            }
            None => warn!(upload_id = %upload_id, "Upload vanished during assembly"),
        }
    }

    fn set_complete(&self, upload_id: &UploadId, object: AssembledObject) {
        let mut sessions = self.inner.lock();
        let Some(entry) = sessions.entries.get_mut(upload_id) else {
            warn!(upload_id = %upload_id, "Upload vanished during assembly");
            return;
        };
        entry.session.state = UploadState::Complete {
            object: Box::new(object),
            handed_off: false,
        };
        entry.session.received.clear();
        entry.session.touch();

        sessions.completed.push_back(upload_id.clone());
        sessions.evict_completed(self.completed_limit);
    }
}

/// Permission to write one chunk; holds an in-flight slot until dropped
pub struct ChunkPermit {
    registry: SessionRegistry,
    upload_id: UploadId,
}

impl ChunkPermit {
    /// Record a stored chunk and return how many distinct chunks the
    /// upload now has
    pub fn commit(self, chunk_index: u32, size_bytes: u64) -> u32 {
        let mut sessions = self.registry.inner.lock();
        let entry = sessions.entry(&self.upload_id);
        entry.session.received.insert(chunk_index, size_bytes);
        entry.session.touch();
        entry.session.chunks_received()
    }
}

impl Drop for ChunkPermit {
    fn drop(&mut self) {
        let mut sessions = self.registry.inner.lock();
        if let Some(entry) = sessions.entries.get_mut(&self.upload_id) {
            entry.in_flight = entry.in_flight.saturating_sub(1);
            if entry.in_flight == 0 {
                entry.drained.notify_waiters();
            }
        }
    }
}

/// The single assembly slot of a sealed upload. Dropping it without
/// calling [`complete`](Self::complete) or [`fail`](Self::fail) marks the
/// upload failed.
pub struct AssemblyTicket {
    registry: SessionRegistry,
    upload_id: UploadId,
    drained: Arc<Notify>,
    finished: bool,
}

impl AssemblyTicket {
    pub fn upload_id(&self) -> &UploadId {
        &self.upload_id
    }

    /// Wait until chunk writes accepted before sealing have finished
    pub async fn wait_for_writers(&self) {
        loop {
            let notified = self.drained.notified();
            if self.registry.in_flight(&self.upload_id) == 0 {
                return;
            }
            notified.await;
        }
    }

    pub fn complete(mut self, object: AssembledObject) {
        self.finished = true;
        self.registry.set_complete(&self.upload_id, object);
    }

    pub fn fail<S: Into<String>>(mut self, reason: S) {
        self.finished = true;
        self.registry.set_failed(&self.upload_id, reason.into());
    }
}

impl Drop for AssemblyTicket {
    fn drop(&mut self) {
        if !self.finished {
            warn!(upload_id = %self.upload_id, "Assembly abandoned before finishing");
            self.registry
                .set_failed(&self.upload_id, "assembly interrupted".to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn id(raw: &str) -> UploadId {
        UploadId::parse(raw).unwrap()
    }

    #[test]
    fn first_chunk_creates_open_session() {
        let registry = SessionRegistry::new();
        let upload = id("movie.mp4");

        let count = registry.begin_chunk(&upload).unwrap().commit(0, 10);
        assert_eq!(count, 1);

        let session = registry.status(&upload).unwrap();
        assert_eq!(session.state, UploadState::Open);
        assert_eq!(session.received_bytes(), 10);
    }

    #[test]
    fn resent_chunk_replaces_recorded_size() {
        let registry = SessionRegistry::new();
        let upload = id("movie.mp4");

        registry.begin_chunk(&upload).unwrap().commit(2, 10);
        let count = registry.begin_chunk(&upload).unwrap().commit(2, 7);

        assert_eq!(count, 1);
        assert_eq!(registry.status(&upload).unwrap().received[&2], 7);
    }

    #[test]
    fn assembly_seals_the_session() {
        let registry = SessionRegistry::new();
        let upload = id("movie.mp4");
        registry.begin_chunk(&upload).unwrap().commit(0, 1);

        let _ticket = registry.begin_assembly(&upload, 1).unwrap();

        assert!(matches!(
            registry.begin_chunk(&upload),
            Err(MediaError::UploadSealed { .. })
        ));
        assert!(matches!(
            registry.begin_assembly(&upload, 1),
            Err(MediaError::AlreadyAssembling { .. })
        ));
    }

    #[test]
    fn dropped_ticket_marks_failure_and_reopens_on_next_chunk() {
        let registry = SessionRegistry::new();
        let upload = id("movie.mp4");

        drop(registry.begin_assembly(&upload, 3).unwrap());
        assert!(matches!(
            registry.status(&upload).unwrap().state,
            UploadState::Failed { .. }
        ));

        registry.begin_chunk(&upload).unwrap().commit(0, 1);
        assert_eq!(registry.status(&upload).unwrap().state, UploadState::Open);
    }

    #[test]
    fn completed_session_rejects_abort_and_reassembly() {
        let registry = SessionRegistry::new();
        let upload = id("movie.mp4");
        let object = AssembledObject::new(upload.clone(), "objects/movie.mp4".into(), 5, 1);

        registry.begin_assembly(&upload, 1).unwrap().complete(object.clone());

        match registry.begin_assembly(&upload, 1) {
            Err(MediaError::AlreadyComplete { object: existing, .. }) => assert_eq!(*existing, object),
            other => panic!("expected AlreadyComplete, got {:?}", other.map(|_| ())),
        }
        assert!(matches!(
            registry.abort(&upload),
            Err(MediaError::AlreadyComplete { .. })
        ));
    }

    #[test]
    fn abort_removes_open_session() {
        let registry = SessionRegistry::new();
        let upload = id("movie.mp4");
        registry.begin_chunk(&upload).unwrap().commit(0, 1);

        assert!(registry.abort(&upload).unwrap().is_some());
        assert!(registry.status(&upload).is_none());
        assert!(registry.abort(&upload).unwrap().is_none());
    }

    #[test]
    fn completion_drops_chunk_sizes_and_tracks_hand_off() {
        let registry = SessionRegistry::new();
        let upload = id("movie.mp4");
        registry.begin_chunk(&upload).unwrap().commit(0, 5);
        let object = AssembledObject::new(upload.clone(), "objects/movie.mp4".into(), 5, 1);

        registry.begin_assembly(&upload, 1).unwrap().complete(object);
        let session = registry.status(&upload).unwrap();
        assert!(session.received.is_empty());
        assert!(matches!(
            session.state,
            UploadState::Complete { handed_off: false, .. }
        ));
        assert!(registry.hand_off_pending(&upload));

        registry.mark_handed_off(&upload);
        assert!(!registry.hand_off_pending(&upload));
    }

    #[test]
    fn oldest_completed_sessions_are_evicted() {
        let registry = SessionRegistry::with_completed_limit(2);
        let open = id("still-open.mp4");
        registry.begin_chunk(&open).unwrap().commit(0, 1);

        for name in ["a.mp4", "b.mp4", "c.mp4"] {
            let upload = id(name);
            let object = AssembledObject::new(upload.clone(), format!("objects/{name}"), 1, 1);
            registry.begin_assembly(&upload, 1).unwrap().complete(object);
        }

        assert_eq!(registry.len(), 3);
        assert!(registry.status(&id("a.mp4")).is_none());
        assert!(registry.status(&id("b.mp4")).is_some());
        assert!(registry.status(&id("c.mp4")).is_some());
        assert_eq!(registry.status(&open).unwrap().state, UploadState::Open);
    }

    #[tokio::test]
    async fn ticket_waits_for_writers_accepted_before_sealing() {
        let registry = SessionRegistry::new();
        let upload = id("movie.mp4");

        let permit = registry.begin_chunk(&upload).unwrap();
        let ticket = registry.begin_assembly(&upload, 1).unwrap();

        let waiter = tokio::spawn(async move {
            ticket.wait_for_writers().await;
            ticket
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        permit.commit(0, 4);
        let ticket = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("writer drain timed out")
            .unwrap();
        ticket.fail("test");
    }
}
